//! BigQuery jobs.
//!
//! See the [REST reference][jobs] for the full shape of these types. We only
//! model the fields we read or write.
//!
//! [jobs]: https://cloud.google.com/bigquery/docs/reference/rest/v2/Job

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tokio::time::sleep;

use super::{
    super::{percent_encode, Client, Idempotency, NoQuery},
    BigQueryError,
};
use crate::common::*;
use crate::cost::ProcessedBytes;
use crate::dataset::TableName;
use crate::engine::JobSummary;

/// Key/value pairs attached to jobs, typically for billing reports.
pub type Labels = HashMap<String, String>;

/// A BigQuery job.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Job {
    /// The configuration for this job.
    pub(crate) configuration: JobConfiguration,

    /// Where the job runs. We fill in project and location; BigQuery fills
    /// in the ID.
    pub(crate) job_reference: Option<JobReference>,

    /// Output only. The status of this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) status: Option<JobStatus>,

    /// Output only. Statistics about this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) statistics: Option<JobStatistics>,
}

impl Job {
    /// Create a new query job.
    pub(crate) fn new_query(
        project_id: &str,
        location: &str,
        query_config: JobConfigurationQuery,
        dry_run: bool,
        labels: Labels,
    ) -> Self {
        Job {
            configuration: JobConfiguration {
                query: Some(query_config),
                dry_run: dry_run.then_some(true),
                labels,
            },
            job_reference: Some(JobReference {
                project_id: project_id.to_owned(),
                job_id: None,
                location: Some(location.to_owned()),
            }),
            status: None,
            statistics: None,
        }
    }

    /// Get our job reference.
    pub(crate) fn reference(&self) -> Result<&JobReference> {
        self.job_reference
            .as_ref()
            .ok_or_else(|| format_err!("newly created job has no jobReference"))
    }

    /// Has BigQuery finished with this job?
    pub(crate) fn is_done(&self) -> bool {
        self.status.as_ref().map(|s| s.state) == Some(JobState::Done)
    }

    /// Bytes processed, preferring the query-specific statistic.
    pub(crate) fn total_bytes_processed(&self) -> Result<ProcessedBytes> {
        let stats = match &self.statistics {
            Some(stats) => stats,
            None => return Ok(ProcessedBytes::zero()),
        };
        let raw = stats
            .query
            .as_ref()
            .and_then(|q| q.total_bytes_processed.as_deref())
            .or(stats.total_bytes_processed.as_deref());
        match raw {
            Some(raw) => raw.parse::<ProcessedBytes>(),
            None => Ok(ProcessedBytes::zero()),
        }
    }

    /// Summarize this job for the engine-independent code.
    pub(crate) fn summary(&self) -> Result<JobSummary> {
        Ok(JobSummary {
            done: self.is_done(),
            dry_run: self.configuration.dry_run == Some(true),
            total_bytes_processed: self.total_bytes_processed()?,
        })
    }
}

/// A compound job ID containing project and region information.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobReference {
    /// The project containing this job.
    pub(crate) project_id: String,

    /// The bare ID, suitable for use in URL. Dry runs don't get one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) job_id: Option<String>,

    /// The location of this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) location: Option<String>,
}

/// Configuration for a job.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobConfiguration {
    /// Configuration information for query jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) query: Option<JobConfigurationQuery>,

    /// Don't run the job, just calculate what we would need to do.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) dry_run: Option<bool>,

    /// Labels to attach to jobs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub(crate) labels: Labels,
}

/// Configuration for query jobs.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobConfigurationQuery {
    /// The SQL query to run.
    pub(crate) query: String,

    /// A table in which to save our query results. If this is `None`, a
    /// temporary table will be created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) destination_table: Option<TableReference>,

    /// Should we create a table if it doesn't exist?
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) create_disposition: Option<CreateDisposition>,

    /// What should we do with any existing data?
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) write_disposition: Option<WriteDisposition>,

    /// Should we use "legacy SQL" mode? Always false for us, but BigQuery
    /// defaults to true.
    pub(crate) use_legacy_sql: Option<bool>,

    /// May BigQuery answer from cached results? A cached answer would report
    /// zero bytes, which makes for a useless estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) use_query_cache: Option<bool>,
}

impl JobConfigurationQuery {
    /// Create a new query using standard SQL.
    pub(crate) fn new<S: Into<String>>(query: S) -> Self {
        JobConfigurationQuery {
            query: query.into(),
            destination_table: None,
            create_disposition: None,
            write_disposition: None,
            use_legacy_sql: Some(false),
            use_query_cache: None,
        }
    }

    /// Estimate-only configuration.
    pub(crate) fn for_dry_run<S: Into<String>>(query: S) -> Self {
        JobConfigurationQuery {
            use_query_cache: Some(false),
            ..Self::new(query)
        }
    }

    /// Configuration which replaces the contents of `dest`.
    pub(crate) fn to_table<S: Into<String>>(query: S, dest: &TableName) -> Self {
        JobConfigurationQuery {
            destination_table: Some(TableReference::from(dest)),
            create_disposition: Some(CreateDisposition::CreateIfNeeded),
            write_disposition: Some(WriteDisposition::WriteTruncate),
            ..Self::new(query)
        }
    }
}

/// The status of a job.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatus {
    /// The state of this job.
    state: JobState,

    /// If present, indicates that the job failed.
    error_result: Option<BigQueryError>,

    /// Errors encountered while running the job. These do not necessarily
    /// indicate that the job has finished or was unsuccessful.
    #[serde(default)]
    errors: Vec<BigQueryError>,
}

impl JobStatus {
    /// Check to see if we've encountered an error.
    fn check_for_error(&self) -> Result<(), BigQueryError> {
        for err in &self.errors {
            debug!("BigQuery reported: {}", err);
        }
        if let Some(err) = &self.error_result {
            Err(err.clone())
        } else {
            Ok(())
        }
    }
}

/// The state of a job.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum JobState {
    /// This job is waiting to run.
    Pending,
    /// This job is currently running.
    Running,
    /// This job has finished.
    Done,
}

/// Output-only job statistics. BigQuery sends `int64` values as strings.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    total_bytes_processed: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<QueryStatistics>,
}

/// Statistics specific to query jobs.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    total_bytes_processed: Option<String>,
}

/// The name of a table.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TableReference {
    pub(crate) project_id: String,
    pub(crate) dataset_id: String,
    pub(crate) table_id: String,
}

impl From<&TableName> for TableReference {
    fn from(name: &TableName) -> Self {
        Self {
            project_id: name.project().to_owned(),
            dataset_id: name.dataset().to_owned(),
            table_id: name.table().to_owned(),
        }
    }
}

/// Should this job create new tables?
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::enum_variant_names, dead_code)]
pub(crate) enum CreateDisposition {
    CreateIfNeeded,
    CreateNever,
}

/// What should this job do with existing data?
#[derive(Clone, Copy, Debug, Deserialize, Eq, Serialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::enum_variant_names, dead_code)]
pub(crate) enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
    WriteEmpty,
}

/// Query parameters for looking up a job.
#[derive(Debug, Serialize)]
struct JobGetQuery<'a> {
    location: &'a str,
}

/// Submit a job to BigQuery and return BigQuery's copy of it.
///
/// Never retried: sending the same insert twice could run the query twice.
#[instrument(level = "trace", skip(client, job))]
pub(crate) async fn insert_job(client: &Client, project_id: &str, job: Job) -> Result<Job> {
    trace!("starting BigQuery job on {} {:?}", project_id, job);
    let insert_url = format!(
        "https://bigquery.googleapis.com/bigquery/v2/projects/{}/jobs",
        percent_encode(project_id),
    );
    let job = client
        .post::<Job, _, _, _>(&insert_url, Idempotency::UnsafeToRetry, NoQuery, job)
        .await?;
    Ok(job)
}

/// Submit a dry-run job and summarize BigQuery's immediate answer.
///
/// A dry run never gets polled. If BigQuery doesn't report it as finished,
/// the summary says so and the caller decides what to do.
#[instrument(level = "trace", skip(client, job))]
pub(crate) async fn dry_run_job(
    client: &Client,
    project_id: &str,
    job: Job,
) -> Result<JobSummary> {
    let job = insert_job(client, project_id, job).await?;
    estimate_from_response(&job)
}

/// Summarize the response to a dry-run insert.
fn estimate_from_response(job: &Job) -> Result<JobSummary> {
    if let Some(status) = &job.status {
        status.check_for_error()?;
    }
    job.summary()
}

/// Run a BigQuery job and wait for it to finish.
///
/// There is no timeout. A job which never finishes blocks forever.
#[instrument(level = "trace", skip(client, job))]
pub(crate) async fn run_job(client: &Client, project_id: &str, job: Job) -> Result<Job> {
    let mut job = insert_job(client, project_id, job).await?;
    if !job.is_done() {
        let reference = job.reference()?.clone();
        let job_id = reference
            .job_id
            .as_deref()
            .ok_or_else(|| format_err!("newly created job has no jobId"))?;
        let job_url = format!(
            "https://bigquery.googleapis.com/bigquery/v2/projects/{}/jobs/{}",
            percent_encode(&reference.project_id),
            percent_encode(job_id),
        );
        let location = reference.location.as_deref().unwrap_or("US");

        let mut sleep_duration = Duration::from_secs(2);
        while !job.is_done() {
            debug!("waiting {:?} for job {}", sleep_duration, job_id);
            sleep(sleep_duration).await;
            if sleep_duration < Duration::from_secs(16) {
                sleep_duration *= 2;
            }
            job = client
                .get::<Job, _, _>(job_url.as_str(), JobGetQuery { location })
                .await?;
        }
    }

    if let Some(status) = &job.status {
        status.check_for_error()?;
    }
    Ok(job)
}
