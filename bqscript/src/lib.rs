//! A library for running multi-statement BigQuery SQL scripts.
//!
//! A script is split into statements (see [`script`]), each statement is sent
//! to a [`QueryEngine`](engine::QueryEngine), and the bytes processed by each
//! job are rolled up into a dollar estimate (see [`cost`]). The only engine
//! shipped here talks to the BigQuery REST API, but everything above
//! [`engine`] can run against any implementation.

#![warn(missing_docs, unused_extern_crates, clippy::all)]

pub(crate) mod clouds;
pub mod config;
pub mod cost;
pub mod dataset;
pub mod engine;
pub mod logging;
pub mod replace;
pub mod runner;
pub mod script;
pub(crate) mod tls;
pub(crate) mod wait;

pub use clouds::gcloud::bigquery::{BigQueryEngine, Labels};
pub use config::{Configuration, RunConfig};
pub use cost::{CostEstimate, ProcessedBytes, UsdPerTb};
pub use dataset::{DatasetId, TableName};
pub use engine::{JobSummary, QueryEngine};
pub use replace::Replacements;
pub use runner::{how_much, run_sql, run_statement, RunOptions};
pub use script::{split_script, ScriptError, Statement};

/// Standard error type for this library.
pub use anyhow::Error;

/// Standard result type for this library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Definitions included by all the files in this crate.
///
/// This is the dialect of Rust the rest of the crate is written in: `anyhow`
/// for errors, `tracing` for logs and `futures` for async glue.
#[allow(unused_imports)]
pub(crate) mod common {
    pub(crate) use anyhow::{format_err, Context as _};
    pub(crate) use futures::{Future, FutureExt};
    pub(crate) use tracing::{debug, error, info, instrument, trace, warn};
    pub(crate) use url::Url;

    pub(crate) use crate::{Error, Result};
}
