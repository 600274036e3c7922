pub mod config;
pub mod database;
pub mod membership_client;
pub mod push_client;
pub mod retry;
pub mod scheduled_dispatcher;
