//! Streamwall viewer binary
//!
//! Usage:
//!   streamwall --config streamwall.toml
//!   streamwall --config streamwall.toml --backend dry-run --log-format json

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use streamwall_core::MediaBackend;
use streamwall_viewer::ViewerConfig;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// GStreamer pipelines (needs the `gstreamer` feature)
    Gstreamer,
    /// Scripted healthy streams, no media
    DryRun,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-stream RTSP video wall", long_about = None)]
struct Args {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "streamwall.toml", env = "STREAMWALL_CONFIG")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "STREAMWALL_LOG_FORMAT")]
    log_format: LogFormat,

    /// Media backend
    #[arg(long, value_enum, default_value_t = BackendKind::Gstreamer, env = "STREAMWALL_BACKEND")]
    backend: BackendKind,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = ViewerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    info!(
        config = %args.config.display(),
        streams = config.streams.len(),
        profile = ?config.supervisor.profile,
        "Streamwall starting"
    );

    let backend = select_backend(args.backend)?;
    let report = streamwall_viewer::run(&config, backend, shutdown_signal()).await?;

    info!("Streamwall stopped");
    Ok(ExitCode::from(streamwall_viewer::exit_status(&report)))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn select_backend(kind: BackendKind) -> anyhow::Result<Arc<dyn MediaBackend>> {
    match kind {
        BackendKind::DryRun => Ok(Arc::new(streamwall_core::scripted::ScriptedBackend::new())),
        BackendKind::Gstreamer => gstreamer_backend(),
    }
}

#[cfg(feature = "gstreamer")]
fn gstreamer_backend() -> anyhow::Result<Arc<dyn MediaBackend>> {
    Ok(Arc::new(streamwall_core::backends::GstBackend::new()))
}

#[cfg(not(feature = "gstreamer"))]
fn gstreamer_backend() -> anyhow::Result<Arc<dyn MediaBackend>> {
    anyhow::bail!("built without the `gstreamer` feature; rebuild with it or use --backend dry-run")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
