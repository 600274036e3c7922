pub mod notification_repository;
pub mod user_notification_repository;

pub use notification_repository::NotificationRepository;
pub use user_notification_repository::UserNotificationRepository;
