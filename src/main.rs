use quiz_proctor_backend::config::{get_config, init_config, LogFormat};
use quiz_proctor_backend::database::pool::{create_pool, run_migrations};
use quiz_proctor_backend::AppState;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Expiry reaper for in-progress attempts that are never read again.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(pool, config.recalculation_batch_limit);
    let interval = Duration::from_secs(config.expiry_sweep_interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "expiry reaper started");

    let reaper = {
        let state = app_state.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = state.attempt_service.expire_stale_attempts().await {
                    tracing::error!(error = ?e, "expiry sweep failed");
                }
                tokio::time::sleep(interval).await;
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
        res = reaper => {
            if let Err(e) = res {
                tracing::error!(error = ?e, "expiry reaper task ended unexpectedly");
            }
        }
    }

    Ok(())
}
