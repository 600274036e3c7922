use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::info;

use k1s0_school_notification_server::adapter::handler::{self, AppState};
use k1s0_school_notification_server::adapter::repository::membership_in_memory::InMemoryMembershipOracle;
use k1s0_school_notification_server::adapter::repository::notification_in_memory::{
    InMemoryNotificationRepository, InMemoryUserNotificationRepository,
};
use k1s0_school_notification_server::adapter::repository::notification_postgres::NotificationPostgresRepository;
use k1s0_school_notification_server::adapter::repository::user_notification_postgres::UserNotificationPostgresRepository;
use k1s0_school_notification_server::domain::repository::{
    NotificationRepository, UserNotificationRepository,
};
use k1s0_school_notification_server::domain::service::{
    MembershipOracle, PushClient, TargetGroupResolver,
};
use k1s0_school_notification_server::infrastructure::config::Config;
use k1s0_school_notification_server::infrastructure::database;
use k1s0_school_notification_server::infrastructure::membership_client::HttpMembershipClient;
use k1s0_school_notification_server::infrastructure::push_client::{
    NoopPushClient, WebhookPushClient,
};
use k1s0_school_notification_server::infrastructure::retry::RetryPolicy;
use k1s0_school_notification_server::infrastructure::scheduled_dispatcher::ScheduledDispatcher;
use k1s0_school_notification_server::usecase;

/// プッシュ未設定時のファンアウト並列数。
const DEFAULT_PUSH_CONCURRENCY: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    // Config
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting school notification server"
    );

    // Database pool (optional)
    let db_pool = if let Some(ref db_config) = cfg.database {
        Some(database::connect(db_config).await?)
    } else {
        info!("no database configured, using in-memory repositories");
        None
    };

    let (notification_repo, user_notification_repo): (
        Arc<dyn NotificationRepository>,
        Arc<dyn UserNotificationRepository>,
    ) = if let Some(ref pool) = db_pool {
        let pool = Arc::new(pool.clone());
        (
            Arc::new(NotificationPostgresRepository::new(pool.clone())),
            Arc::new(UserNotificationPostgresRepository::new(pool)),
        )
    } else {
        (
            Arc::new(InMemoryNotificationRepository::new()),
            Arc::new(InMemoryUserNotificationRepository::new()),
        )
    };

    // Membership
    let oracle: Arc<dyn MembershipOracle> = if let Some(ref membership) = cfg.membership {
        info!(base_url = %membership.base_url, "using membership service");
        Arc::new(HttpMembershipClient::new(membership)?)
    } else {
        tracing::warn!("no membership configured, target groups resolve against an empty directory");
        Arc::new(InMemoryMembershipOracle::new())
    };
    let resolver = Arc::new(TargetGroupResolver::new(oracle));

    // Push
    let (push_client, push_concurrency): (Arc<dyn PushClient>, usize) =
        if let Some(ref push) = cfg.push {
            info!(webhook_url = %push.webhook_url, "push webhook enabled");
            (Arc::new(WebhookPushClient::new(push)?), push.concurrency)
        } else {
            info!("no push configured, notifications will not be pushed to devices");
            (Arc::new(NoopPushClient), DEFAULT_PUSH_CONCURRENCY)
        };

    let retry = RetryPolicy::from(&cfg.retry);
    let push_tasks = TaskTracker::new();

    // Use cases
    let send_notification_uc = Arc::new(
        usecase::SendNotificationUseCase::new(
            notification_repo.clone(),
            user_notification_repo.clone(),
            resolver.clone(),
            push_client.clone(),
            retry.clone(),
            push_concurrency,
        )
        .with_push_tracker(push_tasks.clone()),
    );
    let dispatch_uc = Arc::new(usecase::DispatchScheduledNotificationsUseCase::new(
        notification_repo.clone(),
        send_notification_uc.clone(),
        retry.clone(),
        cfg.dispatcher.batch_size,
    ));

    let state = AppState {
        upsert_notification_uc: Arc::new(usecase::UpsertNotificationUseCase::new(
            notification_repo.clone(),
            resolver,
        )),
        send_notification_uc,
        discard_notification_uc: Arc::new(usecase::DiscardNotificationUseCase::new(
            notification_repo.clone(),
        )),
        notify_unread_uc: Arc::new(usecase::NotifyUnreadUserUseCase::new(
            notification_repo.clone(),
            user_notification_repo.clone(),
            push_client,
            retry,
            push_concurrency,
        )),
        retrieve_detail_uc: Arc::new(usecase::RetrieveNotificationDetailUseCase::new(
            notification_repo.clone(),
            user_notification_repo.clone(),
        )),
        list_notifications_uc: Arc::new(usecase::ListNotificationsUseCase::new(
            notification_repo.clone(),
        )),
        count_for_status_uc: Arc::new(usecase::CountNotificationForStatusUseCase::new(
            notification_repo,
        )),
        set_user_status_uc: Arc::new(usecase::SetUserNotificationStatusUseCase::new(
            user_notification_repo.clone(),
        )),
        count_user_uc: Arc::new(usecase::CountUserNotificationUseCase::new(
            user_notification_repo,
        )),
        db_pool,
    };

    // Scheduled dispatcher
    let dispatcher = if cfg.dispatcher.enabled {
        let dispatcher = ScheduledDispatcher::new(
            dispatch_uc,
            Duration::from_secs(cfg.dispatcher.interval_secs.max(1)),
        );
        let handle = dispatcher.start();
        Some((dispatcher, handle))
    } else {
        info!("scheduled dispatcher disabled");
        None
    };

    // REST server
    let app = handler::router(state);
    let rest_addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("REST server starting on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((dispatcher, handle)) = dispatcher {
        dispatcher.stop();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "scheduled dispatcher task failed");
        }
    }

    push_tasks.close();
    if !push_tasks.is_empty() {
        info!(pending = push_tasks.len(), "waiting for push delivery to finish");
    }
    push_tasks.wait().await;

    info!("school notification server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
