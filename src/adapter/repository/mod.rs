pub mod membership_in_memory;
pub mod notification_in_memory;
pub mod notification_postgres;
pub mod user_notification_postgres;
