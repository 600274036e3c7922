pub mod context;
pub mod error;
pub mod notification_handler;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::usecase::{
    CountNotificationForStatusUseCase, CountUserNotificationUseCase, DiscardNotificationUseCase,
    ListNotificationsUseCase, NotifyUnreadUserUseCase, RetrieveNotificationDetailUseCase,
    SendNotificationUseCase, SetUserNotificationStatusUseCase, UpsertNotificationUseCase,
};

/// AppState はアプリケーション全体の共有状態を表す。
#[derive(Clone)]
pub struct AppState {
    pub upsert_notification_uc: Arc<UpsertNotificationUseCase>,
    pub send_notification_uc: Arc<SendNotificationUseCase>,
    pub discard_notification_uc: Arc<DiscardNotificationUseCase>,
    pub notify_unread_uc: Arc<NotifyUnreadUserUseCase>,
    pub retrieve_detail_uc: Arc<RetrieveNotificationDetailUseCase>,
    pub list_notifications_uc: Arc<ListNotificationsUseCase>,
    pub count_for_status_uc: Arc<CountNotificationForStatusUseCase>,
    pub set_user_status_uc: Arc<SetUserNotificationStatusUseCase>,
    pub count_user_uc: Arc<CountUserNotificationUseCase>,
    pub db_pool: Option<sqlx::PgPool>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        notification_handler::healthz,
        notification_handler::readyz,
        notification_handler::create_notification,
        notification_handler::update_notification,
        notification_handler::send_notification,
        notification_handler::discard_notification,
        notification_handler::notify_unread,
        notification_handler::get_notification,
        notification_handler::list_notifications,
        notification_handler::count_notifications,
        notification_handler::set_user_notification_status,
        notification_handler::count_user_notifications,
    ),
    components(schemas(
        notification_handler::UpsertNotificationRequest,
        notification_handler::UpsertNotificationResponse,
        notification_handler::SendNotificationResponse,
        notification_handler::DiscardNotificationResponse,
        notification_handler::NotifyUnreadResponse,
        notification_handler::NotificationResponse,
        notification_handler::UserNotificationResponse,
        notification_handler::NotificationDetailResponse,
        notification_handler::ListNotificationsResponse,
        notification_handler::PaginationResponse,
        notification_handler::StatusCountResponse,
        notification_handler::NotificationCountsResponse,
        notification_handler::SetUserNotificationStatusRequest,
        notification_handler::SetUserNotificationStatusResponse,
        notification_handler::CountUserNotificationResponse,
        ErrorResponse,
        ErrorBody,
    )),
)]
pub struct ApiDoc;

/// REST API ルーターを構築する。
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/v1/notifications",
            post(notification_handler::create_notification)
                .get(notification_handler::list_notifications),
        )
        .route(
            "/api/v1/notifications/counts",
            get(notification_handler::count_notifications),
        )
        .route(
            "/api/v1/notifications/{id}",
            get(notification_handler::get_notification)
                .put(notification_handler::update_notification),
        )
        .route(
            "/api/v1/notifications/{id}/send",
            post(notification_handler::send_notification),
        )
        .route(
            "/api/v1/notifications/{id}/discard",
            post(notification_handler::discard_notification),
        )
        .route(
            "/api/v1/notifications/{id}/notify-unread",
            post(notification_handler::notify_unread),
        )
        .route(
            "/api/v1/user-notifications/status",
            put(notification_handler::set_user_notification_status),
        )
        .route(
            "/api/v1/user-notifications/count",
            get(notification_handler::count_user_notifications),
        );

    let public = Router::new()
        .route("/healthz", get(notification_handler::healthz))
        .route("/readyz", get(notification_handler::readyz))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );

    Router::new()
        .merge(api_routes)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// ErrorResponse は統一エラーレスポンス。
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                request_id: uuid::Uuid::new_v4().to_string(),
                details: vec![],
            },
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.error.details = details;
        self
    }
}
