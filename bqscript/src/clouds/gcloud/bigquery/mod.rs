//! Interfaces to BigQuery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{error, fmt};

use crate::common::*;
use crate::config::RunConfig;
use crate::dataset::TableName;
use crate::engine::{JobSummary, QueryEngine};

mod jobs;
mod tables;

pub use jobs::Labels;
use jobs::{dry_run_job, run_job, Job, JobConfigurationQuery};

use super::Client;

/// A BigQuery error.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BigQueryError {
    /// The reason for this error.
    reason: String,

    /// If present, where this error occurred.
    location: Option<String>,

    /// Internal Google information about this error.
    debug_info: Option<String>,

    /// A human-readable description of this error.
    message: String,
}

impl fmt::Display for BigQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl error::Error for BigQueryError {}

/// Runs statements on Google BigQuery using the REST API.
#[derive(Clone, Debug)]
pub struct BigQueryEngine {
    client: Client,
    location: String,
    labels: Labels,
}

impl BigQueryEngine {
    /// Authenticate and prepare to run jobs in `config.location`, tagged with
    /// `config.labels`.
    pub async fn new(config: &RunConfig) -> Result<Self> {
        let client = Client::new().await?;
        Ok(Self {
            client,
            location: config.location.clone(),
            labels: config.labels.clone(),
        })
    }

    fn new_job(&self, project: &str, query: JobConfigurationQuery, dry_run: bool) -> Job {
        Job::new_query(
            project,
            &self.location,
            query,
            dry_run,
            self.labels.clone(),
        )
    }
}

#[async_trait]
impl QueryEngine for BigQueryEngine {
    #[instrument(level = "trace", skip(self, sql))]
    async fn dry_run(&self, project: &str, sql: &str) -> Result<JobSummary> {
        let job = self.new_job(project, JobConfigurationQuery::for_dry_run(sql), true);
        dry_run_job(&self.client, project, job)
            .await
            .context("could not estimate query size")
    }

    #[instrument(level = "trace", skip(self, sql))]
    async fn query_to_table(&self, sql: &str, dest: &TableName) -> Result<JobSummary> {
        let project = dest.project();
        let job = self.new_job(project, JobConfigurationQuery::to_table(sql, dest), false);
        run_job(&self.client, project, job)
            .await
            .and_then(|job| job.summary())
            .with_context(|| format!("could not load query results into {}", dest))
    }

    async fn delete_table(&self, name: &TableName) -> Result<()> {
        tables::delete_table(&self.client, name, true).await
    }

    async fn create_view(&self, name: &TableName, sql: &str) -> Result<()> {
        tables::create_view(&self.client, name, sql).await
    }

    async fn row_count(&self, name: &TableName) -> Result<u64> {
        tables::row_count(&self.client, name).await
    }
}
