use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ztp_panel::server::config::ServerConfig;
use ztp_panel::services::AuthService;
use ztp_panel::web::{AppState, create_axum_router};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "ztp-panel.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %config.config_dir.display(),
        access_log = %config.access_log.display(),
        error_log = %config.error_log.display(),
        "Starting ZTP panel."
    );

    if !config.config_dir.is_dir() {
        warn!(config_dir = %config.config_dir.display(), "Config directory does not exist yet.");
    }

    let auth = AuthService::from_config(&config).map_err(|e| {
        error!(error = %e, "Failed to initialise authentication.");
        e
    })?;

    let addr: SocketAddr = config.listen_addr.parse()?;
    let app_state = Arc::new(AppState::new(Arc::new(config), auth));
    let app = create_axum_router(app_state);

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!(address = %addr, "HTTP server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Box::new)?;

    info!("Server stopped.");
    Ok(())
}
