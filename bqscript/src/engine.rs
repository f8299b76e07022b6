//! The operations we need from a query engine.
//!
//! Everything that talks to a real warehouse sits behind [`QueryEngine`], so
//! that the splitting, reporting and cost logic in [`crate::runner`] can be
//! exercised without any cloud credentials.

use async_trait::async_trait;

use crate::common::*;
use crate::cost::ProcessedBytes;
use crate::dataset::TableName;

/// What the engine told us about a finished (or estimated) job.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobSummary {
    /// Did the engine report the job as finished?
    pub done: bool,
    /// Did the engine confirm that this was an estimate-only dry run?
    pub dry_run: bool,
    /// How many bytes the job processed, or would process for a dry run.
    pub total_bytes_processed: ProcessedBytes,
}

/// A warehouse that can run SQL and manage tables and views.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Ask how many bytes `sql` would process, without running it or touching
    /// any stored data. Jobs are billed to `project`.
    async fn dry_run(&self, project: &str, sql: &str) -> Result<JobSummary>;

    /// Run `sql` and store its results in `dest`, waiting for the job to
    /// finish.
    async fn query_to_table(&self, sql: &str, dest: &TableName) -> Result<JobSummary>;

    /// Delete a table or view. Deleting something that doesn't exist succeeds.
    async fn delete_table(&self, name: &TableName) -> Result<()>;

    /// Create a standard SQL view named `name` which runs `sql`.
    async fn create_view(&self, name: &TableName, sql: &str) -> Result<()>;

    /// Count the rows in a table.
    async fn row_count(&self, name: &TableName) -> Result<u64>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! An in-memory engine which records every request.

    use std::sync::Mutex;

    use super::*;

    /// A request made to [`FakeEngine`].
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub(crate) enum Call {
        DryRun { project: String, sql: String },
        QueryToTable { sql: String, dest: String },
        DeleteTable { name: String },
        CreateView { name: String, sql: String },
        RowCount { name: String },
    }

    impl Call {
        /// Does this call change stored data?
        pub(crate) fn has_side_effects(&self) -> bool {
            matches!(
                self,
                Call::QueryToTable { .. } | Call::DeleteTable { .. } | Call::CreateView { .. }
            )
        }
    }

    /// Pretends to be a warehouse. Every job processes `bytes_per_job` bytes.
    pub(crate) struct FakeEngine {
        bytes_per_job: u64,
        rows_per_table: u64,
        confirm_dry_runs: bool,
        finish_dry_runs: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeEngine {
        pub(crate) fn new(bytes_per_job: u64) -> Self {
            Self {
                bytes_per_job,
                rows_per_table: 42,
                confirm_dry_runs: true,
                finish_dry_runs: true,
                calls: Mutex::new(vec![]),
            }
        }

        /// Answer dry runs with jobs that are not marked as dry runs.
        pub(crate) fn ignoring_dry_run_flag(mut self) -> Self {
            self.confirm_dry_runs = false;
            self
        }

        /// Answer dry runs with jobs that are still running.
        pub(crate) fn leaving_dry_runs_unfinished(mut self) -> Self {
            self.finish_dry_runs = false;
            self
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn summary(&self, dry_run: bool) -> JobSummary {
            JobSummary {
                done: true,
                dry_run,
                total_bytes_processed: ProcessedBytes::new(self.bytes_per_job),
            }
        }
    }

    #[async_trait]
    impl QueryEngine for FakeEngine {
        async fn dry_run(&self, project: &str, sql: &str) -> Result<JobSummary> {
            self.record(Call::DryRun {
                project: project.to_owned(),
                sql: sql.to_owned(),
            });
            Ok(JobSummary {
                done: self.finish_dry_runs,
                ..self.summary(self.confirm_dry_runs)
            })
        }

        async fn query_to_table(&self, sql: &str, dest: &TableName) -> Result<JobSummary> {
            self.record(Call::QueryToTable {
                sql: sql.to_owned(),
                dest: dest.to_string(),
            });
            Ok(self.summary(false))
        }

        async fn delete_table(&self, name: &TableName) -> Result<()> {
            self.record(Call::DeleteTable {
                name: name.to_string(),
            });
            Ok(())
        }

        async fn create_view(&self, name: &TableName, sql: &str) -> Result<()> {
            self.record(Call::CreateView {
                name: name.to_string(),
                sql: sql.to_owned(),
            });
            Ok(())
        }

        async fn row_count(&self, name: &TableName) -> Result<u64> {
            self.record(Call::RowCount {
                name: name.to_string(),
            });
            Ok(self.rows_per_table)
        }
    }
}
