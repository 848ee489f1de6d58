//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingSettings;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Filter precedence: `level_override` (from the command line), then
/// `RUST_LOG`, then `logging.level`.
pub fn init(settings: &LoggingSettings, level_override: Option<&str>) -> Result<()> {
    let filter = build_filter(settings, level_override)?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if settings.json {
        layers.push(fmt::layer().json().with_writer(std::io::stdout).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_ansi(settings.show_colors)
                .with_writer(std::io::stdout)
                .boxed(),
        );
    }

    if let Some(path) = &settings.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

fn build_filter(settings: &LoggingSettings, level_override: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = level_override {
        return EnvFilter::try_new(level).with_context(|| format!("invalid log level {}", level));
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.level)
            .with_context(|| format!("invalid logging.level {}", settings.level)),
    }
}
