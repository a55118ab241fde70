#![forbid(unsafe_code)]

//! Process-wide tracing subscriber, driven by the `[logging]` section.

use crate::config::LoggingConfig;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("expected json or compact, got {other:?}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Compact => "compact",
        })
    }
}

/// `RUST_LOG` wins over `logging.level`; an unparsable directive falls through
/// to the next source and finally to `info`.
fn build_filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. Without a usable config (the file failed to
/// load) the defaults apply so the load error itself still gets logged.
pub fn init(cfg: Option<&LoggingConfig>) {
    let defaults = LoggingConfig::default();
    let cfg = cfg.unwrap_or(&defaults);
    let format = cfg.log_format().unwrap_or(LogFormat::Json);
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(&cfg.level, rust_log.as_deref()))
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = installed {
        eprintln!("claim-node: tracing subscriber already installed: {e}");
    }
}
