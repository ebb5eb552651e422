use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_core::adapters::auth::{JwtTokenService, RevocationAwareSessionValidator};
use subscription_core::adapters::cache::{RedisArmStore, RedisSnapshotCache};
use subscription_core::adapters::http::{
    api_router, ApiState, AuthHandlers, RouterOptions, SubscriptionHandlers, WebhookHandlers,
    WinbackHandlers,
};
use subscription_core::adapters::postgres::{
    self, PostgresDunningRepository, PostgresGracePeriodRepository,
    PostgresSubscriptionRepository, PostgresTaskStore, PostgresTransactionRepository,
    PostgresWebhookEventRepository, PostgresWinbackRepository,
};
use subscription_core::adapters::rate_limiter::RedisRateLimiter;
use subscription_core::adapters::revocation::RedisRevocationStore;
use subscription_core::adapters::scheduler::{
    HandlerRegistry, RecurringScheduler, Scheduler, StaleTaskReaper, WorkerPool, WorkerPoolConfig,
};
use subscription_core::adapters::verification::{
    http_client, AppleWebhookVerifier, GoogleWebhookVerifier, HttpCurrencyRateSource,
    HttpReceiptVerifier, JwksKeySetProvider, StripeWebhookVerifier,
};
use subscription_core::application::handlers::{
    CancelSubscriptionHandler, CurrencyRefreshHandler, DailyAnalyticsHandler,
    ExperimentArmMaintenanceHandler, ExpireGracePeriodsHandler, ExpireWinbackOffersHandler,
    GetSubscriptionHandler, LedgerSyncHandler, LogoutHandler, LtvRecomputeHandler,
    NotificationSendHandler, ProcessReceiptHandler, ProcessWebhooksHandler, ReceiveWebhookHandler,
    RefreshSessionHandler, RespondToWinbackOfferHandler, ResolveGracePeriodHandler,
    StartGracePeriodHandler, SubscriptionLifecycle, TaskEnqueuer,
};
use subscription_core::config::{AppConfig, RedisConfig};
use subscription_core::domain::experiment::ArmMaintenance;
use subscription_core::domain::foundation::Timestamp;
use subscription_core::domain::jobs::TaskType;
use subscription_core::ports::{
    DunningRepository, GracePeriodRepository, KeySetProvider, RateLimiter, RevocationStore,
    SnapshotCache, SubscriptionRepository, TaskStore, TokenService, TransactionRepository,
    WebhookEventRepository, WebhookVerifier, WinbackRepository,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    tracing::info!(
        environment = ?config.server.environment,
        "Starting subscription-core on {}",
        config.server.socket_addr()
    );

    // Storage
    let pool = postgres::connect(&config.database).await?;
    let redis = connect_redis(&config.redis).await?;
    tracing::info!("Redis connection established");

    let subscriptions: Arc<dyn SubscriptionRepository> =
        Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let grace_periods: Arc<dyn GracePeriodRepository> =
        Arc::new(PostgresGracePeriodRepository::new(pool.clone()));
    let dunning: Arc<dyn DunningRepository> =
        Arc::new(PostgresDunningRepository::new(pool.clone()));
    let winback: Arc<dyn WinbackRepository> =
        Arc::new(PostgresWinbackRepository::new(pool.clone()));
    let events: Arc<dyn WebhookEventRepository> =
        Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let tasks: Arc<dyn TaskStore> = Arc::new(PostgresTaskStore::new(pool));

    let revocations: Arc<dyn RevocationStore> = Arc::new(
        RedisRevocationStore::new(redis.clone())
            .with_command_timeout(config.redis.command_timeout()),
    );
    let limiter: Arc<dyn RateLimiter> = Arc::new(
        RedisRateLimiter::new(redis.clone()).with_command_timeout(config.redis.command_timeout()),
    );
    let snapshots: Arc<dyn SnapshotCache> = Arc::new(RedisSnapshotCache::new(redis.clone()));
    let arms = Arc::new(RedisArmStore::new(redis));

    // Outbound verification
    let client = http_client(config.integrations.http_timeout())?;
    let apple_keys: Arc<dyn KeySetProvider> = Arc::new(JwksKeySetProvider::new(
        config.webhooks.apple_jwks_url.clone(),
        client.clone(),
        config.webhooks.jwks_cache_ttl(),
    ));
    let google_keys: Arc<dyn KeySetProvider> = Arc::new(JwksKeySetProvider::new(
        config.webhooks.google_jwks_url.clone(),
        client.clone(),
        config.webhooks.jwks_cache_ttl(),
    ));
    let verifiers: Vec<Arc<dyn WebhookVerifier>> = vec![
        Arc::new(StripeWebhookVerifier::new(
            config.webhooks.stripe_webhook_secret.clone(),
        )),
        Arc::new(AppleWebhookVerifier::new(apple_keys)),
        Arc::new(GoogleWebhookVerifier::new(
            google_keys,
            config.webhooks.google_audience.clone(),
        )),
    ];
    let receipt_verifier = Arc::new(HttpReceiptVerifier::new(
        config.integrations.receipt_verifier_url.clone(),
        client.clone(),
    ));
    let rates = Arc::new(HttpCurrencyRateSource::new(
        config.integrations.fx_rates_url.clone(),
        client,
    ));

    // Sessions
    let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::from_config(&config.auth)?);
    let validator = Arc::new(RevocationAwareSessionValidator::new(
        tokens.clone(),
        revocations.clone(),
    ));

    // Application handlers
    let enqueuer = TaskEnqueuer::new(tasks.clone(), config.scheduler.max_attempts);
    let catalog = config.catalog.products.clone();
    let batch_size = config.webhooks.sweep_batch_size;
    let resolve_grace = || {
        ResolveGracePeriodHandler::new(subscriptions.clone(), grace_periods.clone(), dunning.clone())
    };
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        subscriptions.clone(),
        transactions.clone(),
        StartGracePeriodHandler::new(
            subscriptions.clone(),
            grace_periods.clone(),
            dunning.clone(),
            enqueuer.clone(),
            config.catalog.grace_period_days,
            config.catalog.dunning_max_attempts,
        ),
        resolve_grace(),
        enqueuer.clone(),
        catalog.clone(),
    ));

    let registry = HandlerRegistry::new()
        .register(
            TaskType::WebhookSweep,
            Arc::new(ProcessWebhooksHandler::new(events.clone(), lifecycle, batch_size)),
        )
        .register(
            TaskType::GraceExpirySweep,
            Arc::new(ExpireGracePeriodsHandler::new(
                subscriptions.clone(),
                grace_periods.clone(),
                enqueuer.clone(),
                batch_size,
            )),
        )
        .register(
            TaskType::WinbackExpirySweep,
            Arc::new(ExpireWinbackOffersHandler::new(winback.clone(), batch_size)),
        )
        .register(
            TaskType::LtvRecompute,
            Arc::new(LtvRecomputeHandler::new(transactions.clone(), snapshots.clone())),
        )
        .register(
            TaskType::DailyAnalytics,
            Arc::new(DailyAnalyticsHandler::new(
                subscriptions.clone(),
                transactions.clone(),
                snapshots.clone(),
            )),
        )
        .register(
            TaskType::CurrencyRefresh,
            Arc::new(CurrencyRefreshHandler::new(
                rates,
                snapshots,
                config.catalog.fx_base_currencies.clone(),
            )),
        )
        .register(
            TaskType::ExperimentArmMaintenance,
            Arc::new(ExperimentArmMaintenanceHandler::new(
                arms,
                ArmMaintenance::default(),
            )),
        )
        .register(TaskType::NotificationSend, Arc::new(NotificationSendHandler::new()))
        .register(TaskType::LedgerSync, Arc::new(LedgerSyncHandler::new()));
    let missing = registry.missing();
    if !missing.is_empty() {
        tracing::warn!(?missing, "Task types without a handler will fail permanently");
    }

    // HTTP
    let state = ApiState {
        webhook: WebhookHandlers::new(Arc::new(ReceiveWebhookHandler::new(verifiers, events))),
        auth: AuthHandlers::new(
            Arc::new(RefreshSessionHandler::new(tokens.clone(), revocations.clone())),
            Arc::new(LogoutHandler::new(tokens, revocations)),
        ),
        subscriptions: SubscriptionHandlers::new(
            Arc::new(GetSubscriptionHandler::new(subscriptions.clone())),
            Arc::new(ProcessReceiptHandler::new(
                subscriptions.clone(),
                transactions,
                receipt_verifier,
                resolve_grace(),
                enqueuer.clone(),
                catalog.clone(),
            )),
            Arc::new(CancelSubscriptionHandler::new(subscriptions, enqueuer.clone())),
        ),
        winback: WinbackHandlers::new(Arc::new(RespondToWinbackOfferHandler::new(
            winback, catalog,
        ))),
        validator,
        limiter,
        rate_limits: config.rate_limits.clone(),
        trust_forwarded_for: config.server.trust_forwarded_for,
    };
    let options = RouterOptions {
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        cors_origins: config.server.cors_origins_list(),
    };
    let app = api_router(state, &options);

    // Background work
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = if config.scheduler.enabled {
        let scheduler = Scheduler {
            workers: Arc::new(WorkerPool::new(
                tasks.clone(),
                registry,
                WorkerPoolConfig {
                    workers: config.scheduler.workers,
                    poll_interval: config.scheduler.poll_interval(),
                    task_timeout: config.scheduler.task_timeout(),
                    weights: config.scheduler.weights(),
                    drain_timeout: config.scheduler.drain_timeout(),
                },
            )),
            recurring: Arc::new(RecurringScheduler::new(
                enqueuer,
                config.scheduler.recurring.parse()?,
                Timestamp::now(),
            )),
            reaper: Arc::new(StaleTaskReaper::new(tasks, config.scheduler.reaper_interval())),
        };
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { scheduler.run(rx).await }))
    } else {
        tracing::info!("Scheduler disabled; tasks will queue until a worker runs");
        None
    };

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    let mut server_shutdown = shutdown_rx;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = server_shutdown.changed() => {}
        }
    })
    .await?;

    tracing::info!("HTTP server stopped, draining scheduler");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_task {
        if let Err(e) = handle.await {
            tracing::error!("Scheduler task panicked: {}", e);
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// JSON lines in production, human-readable output elsewhere.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

async fn connect_redis(
    config: &RedisConfig,
) -> Result<redis::aio::MultiplexedConnection, BoxError> {
    let client = redis::Client::open(config.url.as_str())?;
    let conn = tokio::time::timeout(config.timeout(), client.get_multiplexed_tokio_connection())
        .await
        .map_err(|_| "timed out connecting to Redis")??;
    Ok(conn)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
