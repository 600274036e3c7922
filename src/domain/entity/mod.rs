pub mod audience;
pub mod notification;
pub mod target_group;
pub mod user_notification;
