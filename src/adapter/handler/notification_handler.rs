use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::RequestContext;
use super::{AppState, ErrorResponse};
use crate::domain::entity::notification::{
    Notification, NotificationContent, NotificationFields, NotificationStatus,
};
use crate::domain::entity::target_group::TargetGroup;
use crate::domain::entity::user_notification::{UserNotification, UserNotificationStatus};
use crate::domain::error::NotificationError;
use crate::domain::repository::notification_repository::NotificationListParams;
use crate::usecase::set_user_notification_status::SetUserNotificationStatusInput;
use crate::usecase::upsert_notification::UpsertNotificationInput;

// --- Request / Response DTOs ---

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpsertNotificationRequest {
    pub title: String,
    pub content: NotificationContent,
    #[serde(default)]
    pub media_ids: Vec<String>,
    #[serde(default)]
    pub target_group: TargetGroup,
    #[serde(default)]
    pub individual_receivers: Vec<String>,
    #[serde(default)]
    pub excluded_receivers: Vec<String>,
    #[serde(default)]
    pub is_important: bool,
    /// DRAFT または SCHEDULED
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl UpsertNotificationRequest {
    fn into_fields(self) -> Result<NotificationFields, NotificationError> {
        let status = NotificationStatus::from_str_value(&self.status)
            .map_err(|e| NotificationError::validation("status", e.to_string()))?;
        Ok(NotificationFields {
            title: self.title,
            content: self.content,
            media_ids: self.media_ids,
            target_group: self.target_group,
            individual_receivers: self.individual_receivers,
            excluded_receivers: self.excluded_receivers,
            is_important: self.is_important,
            status,
            scheduled_at: self.scheduled_at,
        })
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UpsertNotificationResponse {
    pub notification_id: String,
    pub status: String,
}

/// プッシュ配信はバックグラウンドで行うため、応答には配信結果を含めない。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SendNotificationResponse {
    pub notification_id: String,
    pub status: String,
    pub recipient_count: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DiscardNotificationResponse {
    pub notification_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NotifyUnreadResponse {
    pub notified: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NotificationResponse {
    pub id: String,
    pub org_id: String,
    pub title: String,
    pub content: NotificationContent,
    pub media_ids: Vec<String>,
    pub target_group: TargetGroup,
    pub individual_receivers: Vec<String>,
    pub excluded_receivers: Vec<String>,
    pub is_important: bool,
    pub status: String,
    pub scheduled_at: Option<String>,
    pub editor_id: String,
    pub created_by_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub sent_at: Option<String>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id.to_string(),
            org_id: n.org_id,
            title: n.title,
            content: n.content,
            media_ids: n.media_ids,
            target_group: n.target_group,
            individual_receivers: n.individual_receivers,
            excluded_receivers: n.excluded_receivers,
            is_important: n.is_important,
            status: n.status.to_string(),
            scheduled_at: n.scheduled_at.map(|t| t.to_rfc3339()),
            editor_id: n.editor_id,
            created_by_id: n.created_by_id,
            created_at: n.created_at.to_rfc3339(),
            updated_at: n.updated_at.to_rfc3339(),
            sent_at: n.sent_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserNotificationResponse {
    pub user_id: String,
    pub user_group: String,
    pub student_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserNotification> for UserNotificationResponse {
    fn from(un: UserNotification) -> Self {
        Self {
            user_id: un.user_id,
            user_group: un.user_group.to_string(),
            student_id: un.student_id,
            status: un.status.to_string(),
            created_at: un.created_at.to_rfc3339(),
            updated_at: un.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NotificationDetailResponse {
    pub notification: NotificationResponse,
    pub user_notification: Option<UserNotificationResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i32,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

fn default_page() -> i32 {
    1
}

fn default_page_size() -> i32 {
    20
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<NotificationResponse>,
    pub pagination: PaginationResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaginationResponse {
    pub total_count: i64,
    pub page: i32,
    pub page_size: i32,
    pub has_next: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusCountResponse {
    /// DRAFT / SCHEDULED / SENT / DISCARDED / ALL
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NotificationCountsResponse {
    pub counts: Vec<StatusCountResponse>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetUserNotificationStatusRequest {
    pub notification_ids: Vec<Uuid>,
    /// NEW または READ
    pub status: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SetUserNotificationStatusResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct CountUserNotificationQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CountUserNotificationResponse {
    pub status: String,
    pub count: i64,
    pub total: i64,
}

// --- Handlers ---

#[utoipa::path(get, path = "/healthz", responses((status = 200, description = "Health check OK")))]
pub async fn healthz() -> &'static str {
    "ok"
}

#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "Not ready"),
    )
)]
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut db_status = "skipped";
    let mut overall_ok = true;

    if let Some(ref pool) = state.db_pool {
        if sqlx::query("SELECT 1").execute(pool).await.is_ok() {
            db_status = "ok";
        } else {
            db_status = "error";
            overall_ok = false;
        }
    }

    let status_code = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(serde_json::json!({
            "status": if overall_ok { "ready" } else { "not ready" },
            "checks": { "database": db_status }
        })),
    )
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    request_body = UpsertNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = UpsertNotificationResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
    )
)]
pub async fn create_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<UpsertNotificationRequest>,
) -> Result<(StatusCode, Json<UpsertNotificationResponse>), NotificationError> {
    let output = state
        .upsert_notification_uc
        .execute(&UpsertNotificationInput {
            org_id: ctx.org_id,
            editor_id: ctx.user_id,
            notification_id: None,
            fields: req.into_fields()?,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UpsertNotificationResponse {
            notification_id: output.notification_id.to_string(),
            status: output.status.to_string(),
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{id}",
    params(("id" = String, Path, description = "Notification ID")),
    request_body = UpsertNotificationRequest,
    responses(
        (status = 200, description = "Notification updated", body = UpsertNotificationResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
        (status = 409, description = "Notification already sent or discarded", body = ErrorResponse),
    )
)]
pub async fn update_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpsertNotificationRequest>,
) -> Result<Json<UpsertNotificationResponse>, NotificationError> {
    let output = state
        .upsert_notification_uc
        .execute(&UpsertNotificationInput {
            org_id: ctx.org_id,
            editor_id: ctx.user_id,
            notification_id: Some(id),
            fields: req.into_fields()?,
        })
        .await?;

    Ok(Json(UpsertNotificationResponse {
        notification_id: output.notification_id.to_string(),
        status: output.status.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/send",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification sent", body = SendNotificationResponse),
        (status = 400, description = "No recipients", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
        (status = 409, description = "Notification already sent or discarded", body = ErrorResponse),
    )
)]
pub async fn send_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SendNotificationResponse>, NotificationError> {
    let output = state.send_notification_uc.execute(&ctx.org_id, &id).await?;
    Ok(Json(SendNotificationResponse {
        notification_id: output.notification_id.to_string(),
        status: NotificationStatus::Sent.to_string(),
        recipient_count: output.recipient_count,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/discard",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification discarded", body = DiscardNotificationResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
        (status = 409, description = "Notification already sent or discarded", body = ErrorResponse),
    )
)]
pub async fn discard_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DiscardNotificationResponse>, NotificationError> {
    state.discard_notification_uc.execute(&ctx.org_id, &id).await?;
    Ok(Json(DiscardNotificationResponse {
        notification_id: id.to_string(),
        status: NotificationStatus::Discarded.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/notify-unread",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Unread recipients notified", body = NotifyUnreadResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
        (status = 409, description = "Notification is not sent yet", body = ErrorResponse),
    )
)]
pub async fn notify_unread(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<NotifyUnreadResponse>, NotificationError> {
    let output = state.notify_unread_uc.execute(&ctx.org_id, &id).await?;
    Ok(Json(NotifyUnreadResponse {
        notified: output.notified,
        failed: output.failed,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/{id}",
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification detail", body = NotificationDetailResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
    )
)]
pub async fn get_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationDetailResponse>, NotificationError> {
    let detail = state
        .retrieve_detail_uc
        .execute(&ctx.org_id, &ctx.user_id, &id)
        .await?;
    Ok(Json(NotificationDetailResponse {
        notification: detail.notification.into(),
        user_notification: detail.user_notification.map(Into::into),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("page" = Option<i32>, Query, description = "Page number"),
        ("page_size" = Option<i32>, Query, description = "Page size"),
    ),
    responses(
        (status = 200, description = "Notification list", body = ListNotificationsResponse),
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, NotificationError> {
    let status = query
        .status
        .as_deref()
        .map(NotificationStatus::from_str_value)
        .transpose()
        .map_err(|e| NotificationError::validation("status", e.to_string()))?;

    let output = state
        .list_notifications_uc
        .execute(
            &ctx.org_id,
            &NotificationListParams {
                status,
                page: query.page,
                page_size: query.page_size,
            },
        )
        .await?;

    Ok(Json(ListNotificationsResponse {
        notifications: output.notifications.into_iter().map(Into::into).collect(),
        pagination: PaginationResponse {
            total_count: output.total_count,
            page: output.page,
            page_size: output.page_size,
            has_next: output.has_next,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/counts",
    responses(
        (status = 200, description = "Notification counts per status", body = NotificationCountsResponse),
    )
)]
pub async fn count_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<NotificationCountsResponse>, NotificationError> {
    let output = state.count_for_status_uc.execute(&ctx.org_id).await?;
    let mut counts: Vec<StatusCountResponse> = output
        .counts
        .into_iter()
        .map(|(status, count)| StatusCountResponse {
            status: status.to_string(),
            count,
        })
        .collect();
    counts.push(StatusCountResponse {
        status: "ALL".to_string(),
        count: output.total,
    });
    Ok(Json(NotificationCountsResponse { counts }))
}

#[utoipa::path(
    put,
    path = "/api/v1/user-notifications/status",
    request_body = SetUserNotificationStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = SetUserNotificationStatusResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
    )
)]
pub async fn set_user_notification_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<SetUserNotificationStatusRequest>,
) -> Result<Json<SetUserNotificationStatusResponse>, NotificationError> {
    let status = UserNotificationStatus::from_str_value(&req.status)
        .map_err(|e| NotificationError::validation("status", e.to_string()))?;
    let updated = state
        .set_user_status_uc
        .execute(&SetUserNotificationStatusInput {
            user_id: ctx.user_id,
            notification_ids: req.notification_ids,
            status,
        })
        .await?;
    Ok(Json(SetUserNotificationStatusResponse { updated }))
}

#[utoipa::path(
    get,
    path = "/api/v1/user-notifications/count",
    params(("status" = Option<String>, Query, description = "NEW (default) or READ")),
    responses(
        (status = 200, description = "Count for status and total", body = CountUserNotificationResponse),
    )
)]
pub async fn count_user_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CountUserNotificationQuery>,
) -> Result<Json<CountUserNotificationResponse>, NotificationError> {
    let status = match query.status.as_deref() {
        None => UserNotificationStatus::New,
        Some(s) => UserNotificationStatus::from_str_value(s)
            .map_err(|e| NotificationError::validation("status", e.to_string()))?,
    };
    let output = state.count_user_uc.execute(&ctx.user_id, status).await?;
    Ok(Json(CountUserNotificationResponse {
        status: output.status.to_string(),
        count: output.count,
        total: output.total,
    }))
}
