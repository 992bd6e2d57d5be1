use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use signal_service::cache::{AffinityCache, RedisTransientCache};
use signal_service::db::{PgEventStore, PgPostMetadata};
use signal_service::jobs::{self, AbandonedCheckoutDetector, AffinityAggregator, PeriodicJob};
use signal_service::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.clone().into()),
        )
        .with(fmt::layer().json().with_target(true))
        .init();

    config.validate().context("Invalid configuration")?;

    info!(service = %config.service.service_name, "Starting signal service");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database connection pool initialized");

    let redis_client =
        redis::Client::open(config.redis.url.clone()).context("Invalid Redis URL")?;
    let redis_manager = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Redis connection manager initialized");

    let events = Arc::new(PgEventStore::new(pool.clone()));
    let metadata = Arc::new(PgPostMetadata::new(pool.clone()));
    let affinity_cache = AffinityCache::new(
        Arc::new(RedisTransientCache::new(redis_manager)),
        config.redis.key_prefix.clone(),
        config.affinity.cache_ttl(),
    );

    let periodic_jobs: Vec<Arc<dyn PeriodicJob>> = vec![
        Arc::new(AffinityAggregator::new(
            events.clone(),
            metadata,
            affinity_cache,
            config.affinity.clone(),
        )),
        Arc::new(AbandonedCheckoutDetector::new(
            events.clone(),
            events,
            config.abandoned_checkout.clone(),
        )),
    ];

    // Single pass for external schedulers (e.g. Kubernetes CronJob)
    if std::env::args().any(|arg| arg == "--once") {
        for job in &periodic_jobs {
            match jobs::execute(job.as_ref()).await {
                Ok(run) => info!(job_name = job.name(), outcome = ?run, "Job finished"),
                Err(e) => error!(job_name = job.name(), error = %e, "Job failed"),
            }
        }
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let handles: Vec<_> = periodic_jobs
        .into_iter()
        .map(|job| tokio::spawn(jobs::run_job_loop(job, shutdown_tx.subscribe())))
        .collect();

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Job task panicked");
        }
    }

    pool.close().await;
    info!("Signal service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
