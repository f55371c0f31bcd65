use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Per-target filter override, e.g. `LINESOCK_LOG=linesock_channel=trace`.
pub const LOG_ENV: &str = "LINESOCK_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    // Completions run on named worker threads.
    fn shows_threads(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }
}

fn filter(level: LogLevel, overrides: Option<&str>) -> EnvFilter {
    overrides
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(level.directive()))
}

/// Install the stderr subscriber. Stdout stays reserved for received lines.
///
/// `--log-level` applies to every crate unless [`LOG_ENV`] holds a valid
/// filter; targets are then printed so the override can be tuned.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let overrides = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level, overrides.as_deref()))
        .with_thread_names(level.shows_threads())
        .with_ansi(false)
        .with_target(overrides.is_some());

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
