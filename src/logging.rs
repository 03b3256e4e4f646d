use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "slog.log";

/// Output style picked by the `ENV` variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Readable console output at INFO
    Local,
    /// JSON lines appended to `slog.log`
    Prod,
    /// Plain stdout at DEBUG
    Default,
}

impl LogMode {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("local") => LogMode::Local,
            Some("prod") => LogMode::Prod,
            _ => LogMode::Default,
        }
    }

    fn level(self) -> Level {
        match self {
            LogMode::Local => Level::INFO,
            LogMode::Prod | LogMode::Default => Level::DEBUG,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the mode's level.
pub fn init(mode: LogMode) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(mode.level().to_string().to_lowercase()));

    match mode {
        LogMode::Local => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogMode::Prod => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(LOG_FILE)
                .with_context(|| format!("Failed to open {}", LOG_FILE))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init()
        }
        LogMode::Default => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .init(),
    }

    Ok(())
}
