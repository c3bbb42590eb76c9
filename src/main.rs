//! awsv4-gateway -- HTTP gateway that signs object-storage requests
//! with AWS Signature Version 4 and forwards them to an S3-compatible
//! backend.
//!
//! Settings merge in three layers: compiled-in defaults, an optional
//! YAML configuration file section, and command-line overrides (the
//! command line wins).  Missing signing settings fail the process at
//! startup, never per request.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use awsv4_gateway::config::{self, Settings};

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(
    name = "awsv4-gateway",
    version,
    about = "HTTP gateway that signs object-storage requests with an AWSv4 signature"
)]
struct Cli {
    /// Path to a YAML configuration file. Command-line arguments
    /// override settings from the file.
    #[arg(long, value_name = "file")]
    config: Option<String>,

    /// Section of the configuration file to use.
    #[arg(long, value_name = "NAME", default_value = "production")]
    section: String,

    /// API access key.
    #[arg(short = 'k', long = "key", value_name = "key")]
    access_key: Option<String>,

    /// API secret key.
    #[arg(short = 's', long = "secret", value_name = "key")]
    secret_key: Option<String>,

    /// Upstream endpoint (host[:port]).
    #[arg(short, long, value_name = "host")]
    endpoint: Option<String>,

    /// Bucket prefixed onto every outbound path.
    #[arg(short, long, value_name = "str")]
    bucket: Option<String>,

    /// Service name in the credential scope.
    #[arg(long, value_name = "str")]
    service: Option<String>,

    /// Region in the credential scope.
    #[arg(long, value_name = "str")]
    region: Option<String>,

    /// URL scheme for the upstream.
    #[arg(long, value_name = "str")]
    scheme: Option<String>,

    /// Port this HTTP service will listen on.
    #[arg(long, value_name = "N")]
    port: Option<u16>,

    /// Override the bind address (host:port).
    #[arg(long)]
    bind: Option<String>,

    /// Enable the administrative methods PUT and DELETE.
    #[arg(long)]
    admin: bool,

    /// Return signed headers without contacting the upstream.
    #[arg(long)]
    auth_only: bool,

    /// Drop timestamps from log output (journald supplies them).
    #[arg(long)]
    systemd: bool,

    /// Run with verbose messages enabled.
    #[arg(short, long)]
    verbose: bool,

    /// Run with noisy debug messages enabled.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing / logging. An explicit RUST_LOG wins over the
    // level flags.
    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if cli.systemd {
        builder.without_time().init();
    } else {
        builder.init();
    }

    let mut settings = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path);
            config::load_settings(path, &cli.section)?
        }
        None => Settings::default(),
    };

    // Command-line overrides.
    if let Some(access_key) = cli.access_key {
        settings.access_key = access_key;
    }
    if let Some(secret_key) = cli.secret_key {
        settings.secret_key = secret_key;
    }
    if let Some(endpoint) = cli.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(bucket) = cli.bucket {
        settings.bucket = bucket;
    }
    if let Some(service) = cli.service {
        settings.service = service;
    }
    if let Some(region) = cli.region {
        settings.region = region;
    }
    if let Some(scheme) = cli.scheme {
        settings.scheme = scheme;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if cli.admin {
        settings.admin = true;
    }
    if cli.auth_only {
        settings.auth_only = true;
    }

    // Missing signing settings are fatal here, never per request.
    settings.validate()?;

    if settings.admin {
        warn!("Application has administrative methods enabled!");
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", settings.host, settings.port));

    let upstream = awsv4_gateway::upstream::build_client(&settings)?;

    let state = Arc::new(awsv4_gateway::AppState { settings, upstream });
    let app = awsv4_gateway::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Started listening at http://{}/", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopped listening at http://{}/", bind_addr);

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
