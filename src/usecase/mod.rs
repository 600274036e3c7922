pub mod count_notification_for_status;
pub mod count_user_notification;
pub mod discard_notification;
pub mod dispatch_scheduled_notifications;
pub mod list_notifications;
pub mod notify_unread_user;
pub mod retrieve_notification_detail;
pub mod send_notification;
pub mod set_user_notification_status;
pub mod upsert_notification;

pub use count_notification_for_status::CountNotificationForStatusUseCase;
pub use count_user_notification::CountUserNotificationUseCase;
pub use discard_notification::DiscardNotificationUseCase;
pub use dispatch_scheduled_notifications::DispatchScheduledNotificationsUseCase;
pub use list_notifications::ListNotificationsUseCase;
pub use notify_unread_user::NotifyUnreadUserUseCase;
pub use retrieve_notification_detail::RetrieveNotificationDetailUseCase;
pub use send_notification::SendNotificationUseCase;
pub use set_user_notification_status::SetUserNotificationStatusUseCase;
pub use upsert_notification::UpsertNotificationUseCase;
