//! Support for structured logging.

use std::{io::stderr, str::FromStr};
use tracing_subscriber::{fmt, EnvFilter};

use crate::common::*;

/// Log filter used when `RUST_LOG` isn't set.
const DEFAULT_FILTER: &str = "warn,bqscript=info";

/// What log format we should use.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// Pretty, indented logs.
    Indented,
    /// Single-line log entries with all keys on each line.
    #[default]
    Flat,
    /// JSON records.
    Json,
}

impl LogFormat {
    /// Install a global `tracing` subscriber which writes to standard error in
    /// this format.
    pub fn install(self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
            .context("could not parse log filter")?;
        let builder = fmt().with_env_filter(filter).with_writer(stderr);
        let result = match self {
            Self::Indented => builder.pretty().try_init(),
            Self::Flat => builder.compact().try_init(),
            Self::Json => builder.json().try_init(),
        };
        result.map_err(|err| format_err!("could not install logger: {}", err))
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indented" => Ok(LogFormat::Indented),
            "flat" => Ok(LogFormat::Flat),
            "json" => Ok(LogFormat::Json),
            _ => Err(format_err!("unknown log format: {}", s)),
        }
    }
}

#[test]
fn parses_log_formats() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("flat".parse::<LogFormat>().unwrap(), LogFormat::default());
    assert!("xml".parse::<LogFormat>().is_err());
}
