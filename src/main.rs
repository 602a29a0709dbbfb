use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use clf_serve::config::{Cli, Config, Credentials};
use clf_serve::logging;
use clf_serve::server::api::{serve, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Configuration first: it decides where logs go.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);

    let log_file = logging::init(&cli, &config.logging)?;

    info!("clf-serve v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &log_file {
        info!(path = %path.display(), "Logging to file");
    }
    if !cli.config.exists() {
        warn!("Config file not found at {:?}, using defaults", cli.config);
    }

    let credentials = Credentials::from_env()?;

    info!(
        model = %config.model.artifact_path.display(),
        storage_dir = %config.monitoring.storage_dir.display(),
        flush_threshold = config.monitoring.flush_threshold,
        queue_capacity = config.monitoring.queue_capacity,
        max_body_bytes = config.server.max_body_bytes,
        "Configuration loaded"
    );

    // Model, sink and dispatch worker. Failure here is fatal.
    let (state, worker) = AppState::bootstrap(&config, credentials)?;
    info!(
        features = state.engine.feature_names().len(),
        "Inference engine ready"
    );

    let listener = TcpListener::bind(&config.server.listen).await?;
    info!("App running on http://{}", config.server.listen);

    let summary = serve(listener, state, worker, shutdown_signal()).await?;

    info!(
        path = %summary.path.display(),
        rows_written = summary.rows_written,
        "App shut down"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down app...");
}
