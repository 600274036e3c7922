pub mod lifecycle;
pub mod membership_oracle;
pub mod push_client;
pub mod target_group_resolver;

pub use membership_oracle::{MembershipError, MembershipOracle};
pub use push_client::{PushClient, PushError};
pub use target_group_resolver::TargetGroupResolver;
