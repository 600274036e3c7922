//! 通知ライフサイクルの状態遷移表。
//!
//! 許可される遷移:
//! - DRAFT / SCHEDULED --Edit--> DRAFT / SCHEDULED
//! - DRAFT / SCHEDULED --Send--> SENT
//! - DRAFT / SCHEDULED --Discard--> DISCARDED
//! - SENT --NotifyUnread--> SENT
//!
//! SENT と DISCARDED からはそれ以外の遷移を受け付けない。

use crate::domain::entity::notification::NotificationStatus;
use crate::domain::error::NotificationError;

pub const SENT_CONFLICT_MESSAGE: &str =
    "notification has been sent, you can no longer edit this notification";
pub const DISCARDED_CONFLICT_MESSAGE: &str =
    "notification has been deleted, you can no longer edit this notification";
pub const NOT_SENT_CONFLICT_MESSAGE: &str = "notification is not sent yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Edit { target: NotificationStatus },
    Send,
    Discard,
    NotifyUnread,
}

/// 現在の状態にイベントを適用した遷移先を返す。
pub fn transition(
    from: NotificationStatus,
    event: LifecycleEvent,
) -> Result<NotificationStatus, NotificationError> {
    use NotificationStatus::{Discarded, Draft, Scheduled, Sent};

    match (from, event) {
        (Sent, LifecycleEvent::NotifyUnread) => Ok(Sent),
        (Sent, _) => Err(NotificationError::StateConflict(
            SENT_CONFLICT_MESSAGE.to_string(),
        )),
        (Discarded, _) => Err(NotificationError::StateConflict(
            DISCARDED_CONFLICT_MESSAGE.to_string(),
        )),
        (Draft | Scheduled, LifecycleEvent::Edit { target }) => match target {
            Draft | Scheduled => Ok(target),
            Sent | Discarded => Err(NotificationError::validation(
                "status",
                "status must be DRAFT or SCHEDULED",
            )),
        },
        (Draft | Scheduled, LifecycleEvent::Send) => Ok(Sent),
        (Draft | Scheduled, LifecycleEvent::Discard) => Ok(Discarded),
        (Draft | Scheduled, LifecycleEvent::NotifyUnread) => Err(
            NotificationError::StateConflict(NOT_SENT_CONFLICT_MESSAGE.to_string()),
        ),
    }
}

/// CAS 更新に負けた際、現在の状態に応じた StateConflict を返す。
pub fn lost_race(current: Option<NotificationStatus>) -> NotificationError {
    match current {
        Some(NotificationStatus::Sent) => {
            NotificationError::StateConflict(SENT_CONFLICT_MESSAGE.to_string())
        }
        Some(NotificationStatus::Discarded) => {
            NotificationError::StateConflict(DISCARDED_CONFLICT_MESSAGE.to_string())
        }
        Some(status) => NotificationError::StateConflict(format!(
            "notification was modified concurrently, current status is {status}"
        )),
        None => NotificationError::NotFound("notification".to_string()),
    }
}
