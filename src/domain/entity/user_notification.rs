use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::audience::{Recipient, RecipientGroup};

/// UserNotificationStatus は受信者ごとの既読状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserNotificationStatus {
    New,
    Read,
}

impl std::fmt::Display for UserNotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Read => write!(f, "READ"),
        }
    }
}

impl UserNotificationStatus {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "NEW" => Ok(Self::New),
            "READ" => Ok(Self::Read),
            _ => anyhow::bail!("invalid user notification status: {}", s),
        }
    }
}

/// UserNotification は送信時に受信者ごとに作成される配信レコード。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UserNotification {
    pub id: Uuid,
    pub org_id: String,
    pub notification_id: Uuid,
    pub user_id: String,
    pub user_group: RecipientGroup,
    pub student_id: Option<String>,
    pub status: UserNotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserNotification {
    pub fn new(org_id: String, notification_id: Uuid, recipient: Recipient) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            org_id,
            notification_id,
            user_id: recipient.user_id,
            user_group: recipient.group,
            student_id: recipient.student_id,
            status: UserNotificationStatus::New,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_is_unread() {
        let notification_id = Uuid::new_v4();
        let row = UserNotification::new(
            "org-1".to_string(),
            notification_id,
            Recipient {
                user_id: "p1".to_string(),
                group: RecipientGroup::Parent,
                student_id: Some("s1".to_string()),
            },
        );
        assert_eq!(row.status, UserNotificationStatus::New);
        assert_eq!(row.notification_id, notification_id);
        assert_eq!(row.user_group, RecipientGroup::Parent);
        assert_eq!(row.student_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(UserNotificationStatus::New.to_string(), "NEW");
        assert_eq!(UserNotificationStatus::Read.to_string(), "READ");
        assert_eq!(
            UserNotificationStatus::from_str_value("READ").unwrap(),
            UserNotificationStatus::Read
        );
        assert!(UserNotificationStatus::from_str_value("DELETED").is_err());
    }
}
