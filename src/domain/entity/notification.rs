use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::target_group::{SelectType, TargetGroup};
use crate::domain::error::NotificationError;
use crate::domain::service::lifecycle::{self, LifecycleEvent};

/// NotificationStatus は通知のライフサイクル状態を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Draft,
    Scheduled,
    Sent,
    Discarded,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Sent => write!(f, "SENT"),
            Self::Discarded => write!(f, "DISCARDED"),
        }
    }
}

impl NotificationStatus {
    pub const ALL: [NotificationStatus; 4] = [
        NotificationStatus::Draft,
        NotificationStatus::Scheduled,
        NotificationStatus::Sent,
        NotificationStatus::Discarded,
    ];

    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SCHEDULED" => Ok(Self::Scheduled),
            "SENT" => Ok(Self::Sent),
            "DISCARDED" => Ok(Self::Discarded),
            _ => anyhow::bail!("invalid notification status: {}", s),
        }
    }

    /// 終端状態かどうかを返す。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Discarded)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotificationContent {
    pub raw: String,
    #[serde(default)]
    pub rendered_url: Option<String>,
}

/// NotificationFields は作成・編集で管理者が指定できる項目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFields {
    pub title: String,
    pub content: NotificationContent,
    pub media_ids: Vec<String>,
    pub target_group: TargetGroup,
    pub individual_receivers: Vec<String>,
    pub excluded_receivers: Vec<String>,
    pub is_important: bool,
    pub status: NotificationStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NotificationFields {
    /// 受信者の解決を伴わない項目のバリデーションを行う。
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), NotificationError> {
        if self.title.trim().is_empty() {
            return Err(NotificationError::validation("title", "title is required"));
        }
        if self.content.raw.trim().is_empty() {
            return Err(NotificationError::validation(
                "content",
                "content is required",
            ));
        }
        for (name, filter) in self.target_group.named_filters() {
            if filter.select_type == SelectType::List && filter.values.is_empty() {
                return Err(NotificationError::validation(
                    name,
                    "LIST selection requires at least one value",
                ));
            }
        }
        match self.status {
            NotificationStatus::Draft => {}
            NotificationStatus::Scheduled => match self.scheduled_at {
                Some(at) if at > now => {}
                Some(_) => {
                    return Err(NotificationError::validation(
                        "scheduled_at",
                        "scheduled_at must be in the future",
                    ))
                }
                None => {
                    return Err(NotificationError::validation(
                        "scheduled_at",
                        "scheduled_at is required for a scheduled notification",
                    ))
                }
            },
            NotificationStatus::Sent | NotificationStatus::Discarded => {
                return Err(NotificationError::validation(
                    "status",
                    "status must be DRAFT or SCHEDULED",
                ))
            }
        }
        Ok(())
    }
}

/// Notification は通知の集約ルート。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub org_id: String,
    pub title: String,
    pub content: NotificationContent,
    pub media_ids: Vec<String>,
    pub target_group: TargetGroup,
    pub individual_receivers: Vec<String>,
    pub excluded_receivers: Vec<String>,
    pub is_important: bool,
    pub status: NotificationStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub editor_id: String,
    pub created_by_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// 楽観的ロック用の版数。永続化される変更のたびに 1 増える。
    #[serde(default)]
    pub version: i64,
}

impl Notification {
    /// 新しい通知を DRAFT または SCHEDULED で作成する。
    pub fn create(
        org_id: String,
        editor_id: String,
        fields: NotificationFields,
        now: DateTime<Utc>,
    ) -> Result<Self, NotificationError> {
        fields.validate(now)?;
        let scheduled_at = Self::effective_schedule(&fields);
        Ok(Self {
            id: Uuid::new_v4(),
            org_id,
            title: fields.title,
            content: fields.content,
            media_ids: fields.media_ids,
            target_group: fields.target_group,
            individual_receivers: dedup(fields.individual_receivers),
            excluded_receivers: dedup(fields.excluded_receivers),
            is_important: fields.is_important,
            status: fields.status,
            scheduled_at,
            editor_id: editor_id.clone(),
            created_by_id: editor_id,
            created_at: now,
            updated_at: now,
            sent_at: None,
            version: 0,
        })
    }

    /// 編集内容を適用する。終端状態からの編集は StateConflict になる。
    pub fn apply_edit(
        &mut self,
        editor_id: String,
        fields: NotificationFields,
        now: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        let next = lifecycle::transition(
            self.status,
            LifecycleEvent::Edit {
                target: fields.status,
            },
        )?;
        fields.validate(now)?;

        self.scheduled_at = Self::effective_schedule(&fields);
        self.title = fields.title;
        self.content = fields.content;
        self.media_ids = fields.media_ids;
        self.target_group = fields.target_group;
        self.individual_receivers = dedup(fields.individual_receivers);
        self.excluded_receivers = dedup(fields.excluded_receivers);
        self.is_important = fields.is_important;
        self.status = next;
        self.editor_id = editor_id;
        self.touch(now);
        Ok(())
    }

    /// SENT へ遷移させ、送信日時を記録する。
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<(), NotificationError> {
        self.status = lifecycle::transition(self.status, LifecycleEvent::Send)?;
        self.sent_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// DISCARDED へ遷移させる。
    pub fn discard(&mut self, now: DateTime<Utc>) -> Result<(), NotificationError> {
        self.status = lifecycle::transition(self.status, LifecycleEvent::Discard)?;
        self.scheduled_at = None;
        self.touch(now);
        Ok(())
    }

    /// 予約日時を過ぎた SCHEDULED 通知かどうかを返す。
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Scheduled
            && self.scheduled_at.is_some_and(|at| at <= now)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    fn effective_schedule(fields: &NotificationFields) -> Option<DateTime<Utc>> {
        match fields.status {
            NotificationStatus::Scheduled => fields.scheduled_at,
            _ => None,
        }
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
