//! session-reconciler - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the reconciliation API.

use session_reconciler::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_reconciler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: store={}, data_dir={}, dev_mode={}",
        config.store_type.as_str(),
        config.data_dir.display(),
        config.dev_mode
    );
    if config.dev_mode {
        info!(
            "Dev mode enabled; requests act as '{}'",
            config.auth.dev_user_id
        );
    }

    // Start HTTP server
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting server on {}", addr);

    api::serve(config).await?;

    Ok(())
}
