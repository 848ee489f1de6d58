use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pm2watch::render::RenderContext;
use pm2watch::{DiagnosticsServer, Monitor, ProcessSnapshot, ProcessStatus, Renderer, Settings};
use pm2watch_types::current_timestamp_ms;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pm2watch")]
#[command(about = "Watch a PM2 process and keep a Discord status message up to date")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process to monitor (overrides the configured name)
    #[arg(short, long)]
    process: Option<String>,

    /// Validate the configuration, print it as JSON and exit
    #[arg(long, conflicts_with = "preview")]
    check_config: bool,

    /// Print the document rendered for a status (e.g. "online", "not-found") and exit
    #[arg(long, value_name = "STATUS")]
    preview: Option<String>,

    /// Log filter (e.g. "debug", "pm2watch=trace"); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(process) = args.process {
        settings.monitoring.process_name = process;
    }

    if let Some(status) = &args.preview {
        settings.validate_templates()?;
        return preview(&settings, status);
    }

    settings.validate()?;

    if args.check_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    pm2watch::logging::init(&settings.logging, args.log_level.as_deref())?;
    run(settings).await
}

async fn run(settings: Settings) -> Result<()> {
    let monitor = Monitor::from_settings(&settings).context("failed to set up monitor")?;

    if settings.features.enable_metrics {
        let addr: SocketAddr = format!(
            "{}:{}",
            settings.features.metrics_host, settings.features.metrics_port
        )
        .parse()
        .context("invalid metrics address")?;
        DiagnosticsServer::new(addr, monitor.diagnostics_handle())
            .start()
            .await
            .with_context(|| format!("failed to bind diagnostics server on {}", addr))?;
    }

    monitor.start().await;

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Failed to listen for shutdown signals");
    }
    info!("Shutdown signal received");

    if settings.advanced.graceful_shutdown {
        monitor.stop().await;
    }
    Ok(())
}

/// Render a sample document for `status` to stdout.
fn preview(settings: &Settings, status: &str) -> Result<()> {
    let raw = status.trim().to_ascii_lowercase();
    let status = ProcessStatus::from_pm2(&raw);
    if status == ProcessStatus::Unknown && raw != "unknown" {
        bail!(
            "unrecognized status {:?}, expected one of: online, launching, restarting, \
             stopping, stopped, errored, unknown, not-found",
            raw
        );
    }

    let name = match settings.monitoring.process_name.trim() {
        "" => "my-app",
        name => name,
    };
    let renderer = Renderer::from_settings(settings)?;
    let now = current_timestamp_ms();
    let snapshot = ProcessSnapshot::builder(name)
        .status(status)
        .started_at_ms(now.saturating_sub(125_000))
        .observed_at_ms(now)
        .pid(4242)
        .memory_bytes(52_428_800)
        .cpu_percent(1.5)
        .build();

    let mut ctx = RenderContext::new(name, status);
    if status != ProcessStatus::NotFound {
        ctx = ctx.snapshot(&snapshot);
    }
    let doc = renderer.render(&ctx);
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
