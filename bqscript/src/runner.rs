//! Running statements and whole scripts against a [`QueryEngine`].

use std::{error, fmt, path::Path};

use crate::common::*;
use crate::config::RunConfig;
use crate::cost::{CostEstimate, ProcessedBytes};
use crate::dataset::{DatasetId, TableName};
use crate::engine::{JobSummary, QueryEngine};
use crate::replace::Replacements;
use crate::script::{read_script, Statement};

/// How to run each statement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOptions {
    /// Replace `<table>_view` with a view over the statement. Ignored for dry
    /// runs.
    pub create_view: bool,
    /// Only estimate how many bytes each statement would process.
    pub dry_run: bool,
    /// Print a report for each statement to standard output.
    pub verbose: bool,
    /// Return processed sizes to the caller.
    pub return_size: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            create_view: true,
            dry_run: false,
            verbose: true,
            return_size: false,
        }
    }
}

impl RunOptions {
    /// Options for a cost preview: dry run, no views, sizes returned.
    pub fn estimate() -> Self {
        Self {
            create_view: false,
            dry_run: true,
            verbose: true,
            return_size: true,
        }
    }
}

/// The engine was asked for a dry run, but didn't confirm that it performed
/// one. Any byte count it returned can't be trusted as an estimate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DryRunNotConfirmed {
    /// The 1-based number of the statement.
    pub statement: usize,
    /// What the engine returned.
    pub summary: JobSummary,
}

impl fmt::Display for DryRunNotConfirmed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dry run of statement {} was not confirmed (done: {}, dry run: {}), refusing to report its cost",
            self.statement, self.summary.done, self.summary.dry_run,
        )
    }
}

impl error::Error for DryRunNotConfirmed {}

/// What happened when we ran a single statement.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementReport {
    /// The 1-based number of the statement in its script.
    pub index: usize,
    /// Was this only an estimate?
    pub dry_run: bool,
    /// The table named by the statement, if it named one.
    pub target_table: Option<TableName>,
    /// The view we created, if any.
    pub view: Option<TableName>,
    /// Rows in the destination table after a materializing run.
    pub rows: Option<u64>,
    /// Bytes processed and the estimated price.
    pub cost: CostEstimate,
}

impl StatementReport {
    /// Bytes processed (or that would be processed) by this statement.
    pub fn bytes(&self) -> ProcessedBytes {
        self.cost.bytes()
    }
}

impl fmt::Display for StatementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(view) = &self.view {
            writeln!(f, "Successfully created view at {}", view)?;
        }
        if !self.dry_run {
            if let Some(table) = &self.target_table {
                writeln!(f, "Query results loaded to table {}", table)?;
            }
        }
        if let Some(rows) = self.rows {
            writeln!(f, "Number of rows: {}", rows)?;
        }
        let verb = if self.dry_run { "will process" } else { "processed" };
        writeln!(f, "Statement {} {} {}.", self.index, verb, self.bytes())?;
        writeln!(f, "Statement {} costs about {}.", self.index, self.cost)
    }
}

/// Reports for every statement in a script, plus their total.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptReport {
    /// One report per statement, in script order.
    pub statements: Vec<StatementReport>,
    /// The combined cost of all statements.
    pub total: CostEstimate,
}

impl ScriptReport {
    /// Processed sizes, in script order.
    pub fn sizes(&self) -> Vec<ProcessedBytes> {
        self.statements.iter().map(|s| s.bytes()).collect()
    }
}

impl fmt::Display for ScriptReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "These queries will process {} and cost about {}.",
            self.total.bytes(),
            self.total,
        )
    }
}

/// Run one statement and describe what happened.
///
/// A dry run asks `engine` for an estimate and nothing else. Otherwise we
/// optionally rebuild `<table>_view`, replace `<table>` with the statement's
/// results and count its rows.
#[instrument(
    level = "debug",
    skip_all,
    fields(statement = statement.index(), dataset = %dataset)
)]
pub async fn execute_statement(
    engine: &dyn QueryEngine,
    config: &RunConfig,
    statement: &Statement,
    dataset: &DatasetId,
    opts: &RunOptions,
) -> Result<StatementReport> {
    trace!("running SQL: {}", statement.sql());
    let report = if opts.dry_run {
        if opts.create_view {
            debug!("not creating a view during a dry run");
        }
        let summary = engine.dry_run(dataset.project(), statement.sql()).await?;
        if !(summary.done && summary.dry_run) {
            return Err(DryRunNotConfirmed {
                statement: statement.index(),
                summary,
            }
            .into());
        }
        let target_table = match statement.target_table_name().trim() {
            "" => None,
            name => Some(dataset.table(name)),
        };
        StatementReport {
            index: statement.index(),
            dry_run: true,
            target_table,
            view: None,
            rows: None,
            cost: summary.total_bytes_processed.estimated_cost(config.usd_per_tb),
        }
    } else {
        let table = dataset.table(statement.require_target_table()?);

        let view = if opts.create_view {
            let view = table.view_name();
            engine.delete_table(&view).await?;
            engine.create_view(&view, statement.sql()).await?;
            info!("created view {}", view);
            Some(view)
        } else {
            None
        };

        engine.delete_table(&table).await?;
        let summary = engine.query_to_table(statement.sql(), &table).await?;
        info!("loaded query results into {}", table);
        let rows = engine.row_count(&table).await?;

        StatementReport {
            index: statement.index(),
            dry_run: false,
            target_table: Some(table),
            view,
            rows: Some(rows),
            cost: summary.total_bytes_processed.estimated_cost(config.usd_per_tb),
        }
    };
    if opts.verbose {
        println!("{}", report);
    }
    Ok(report)
}

/// Run one statement, returning its processed size if `opts.return_size` is
/// set.
pub async fn run_statement(
    engine: &dyn QueryEngine,
    config: &RunConfig,
    statement: &Statement,
    dataset: &DatasetId,
    opts: &RunOptions,
) -> Result<Option<ProcessedBytes>> {
    let report = execute_statement(engine, config, statement, dataset, opts).await?;
    Ok(opts.return_size.then(|| report.bytes()))
}

/// Run `statements` one at a time, in order.
pub async fn execute_statements(
    engine: &dyn QueryEngine,
    config: &RunConfig,
    statements: &[Statement],
    dataset: &DatasetId,
    opts: &RunOptions,
) -> Result<ScriptReport> {
    let mut reports = Vec::with_capacity(statements.len());
    for statement in statements {
        reports.push(execute_statement(engine, config, statement, dataset, opts).await?);
    }
    let total = reports
        .iter()
        .map(|r| r.bytes())
        .sum::<ProcessedBytes>()
        .estimated_cost(config.usd_per_tb);
    Ok(ScriptReport {
        statements: reports,
        total,
    })
}

/// Run every query in the script at `path`.
///
/// Uses `dataset` if given, or the default dataset from `config`. Returns the
/// per-statement sizes if `opts.return_size` is set.
#[instrument(level = "debug", skip(engine, config, replacements))]
pub async fn run_sql(
    engine: &dyn QueryEngine,
    config: &RunConfig,
    path: &Path,
    dataset: Option<&DatasetId>,
    replacements: &Replacements,
    opts: &RunOptions,
) -> Result<Option<Vec<ProcessedBytes>>> {
    let dataset = config.dataset(dataset)?;
    let statements = read_script(path, replacements).await?;
    let report = execute_statements(engine, config, &statements, dataset, opts).await?;
    if opts.verbose && !report.statements.is_empty() {
        println!("{}", report);
    }
    Ok(opts.return_size.then(|| report.sizes()))
}

/// Estimate what running the script at `path` would cost, without running it.
#[instrument(level = "debug", skip(engine, config, replacements))]
pub async fn how_much(
    engine: &dyn QueryEngine,
    config: &RunConfig,
    path: &Path,
    replacements: &Replacements,
) -> Result<CostEstimate> {
    let dataset = config.dataset(None)?;
    let statements = read_script(path, replacements).await?;
    let opts = RunOptions::estimate();
    let report = execute_statements(engine, config, &statements, dataset, &opts).await?;
    println!("{}", report);
    Ok(report.total)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    use super::*;
    use crate::cost::UsdPerTb;
    use crate::engine::fake::{Call, FakeEngine};
    use crate::script::split_script;

    const SCRIPT: &str = "\
-- output: users
select * from raw.users;

-- nothing to see here
;
-- output: orders
select id, total from raw.orders;
";

    fn config() -> RunConfig {
        RunConfig {
            default_dataset: Some("proj.ds".parse().unwrap()),
            usd_per_tb: UsdPerTb::new(5.0).unwrap(),
            ..RunConfig::default()
        }
    }

    fn quiet(opts: RunOptions) -> RunOptions {
        RunOptions {
            verbose: false,
            ..opts
        }
    }

    fn script_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".sql").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn dry_runs_have_no_side_effects() {
        let engine = FakeEngine::new(1 << 30);
        let statements = split_script(SCRIPT, &Replacements::new());
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        // View creation is requested, but must be ignored.
        let opts = quiet(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });
        let report = execute_statements(&engine, &config(), &statements, &dataset, &opts)
            .await
            .unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.has_side_effects()));
        assert_eq!(
            calls[0],
            Call::DryRun {
                project: "proj".to_owned(),
                sql: "-- output: users\nselect * from raw.users".to_owned(),
            },
        );
        assert_eq!(report.statements.len(), 2);
        assert!(report.statements.iter().all(|s| s.view.is_none() && s.rows.is_none()));
        assert_eq!(report.total.bytes(), ProcessedBytes::new(2 << 30));
    }

    #[tokio::test]
    async fn materializing_run_rebuilds_view_and_table() {
        let engine = FakeEngine::new(1 << 20);
        let statements = split_script(SCRIPT, &Replacements::new());
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        let opts = quiet(RunOptions::default());
        let report = execute_statement(&engine, &config(), &statements[0], &dataset, &opts)
            .await
            .unwrap();

        let sql = "-- output: users\nselect * from raw.users".to_owned();
        assert_eq!(
            engine.calls(),
            vec![
                Call::DeleteTable {
                    name: "proj.ds.users_view".to_owned()
                },
                Call::CreateView {
                    name: "proj.ds.users_view".to_owned(),
                    sql: sql.clone(),
                },
                Call::DeleteTable {
                    name: "proj.ds.users".to_owned()
                },
                Call::QueryToTable {
                    sql,
                    dest: "proj.ds.users".to_owned(),
                },
                Call::RowCount {
                    name: "proj.ds.users".to_owned()
                },
            ],
        );
        assert_eq!(report.rows, Some(42));
        assert_eq!(report.view.unwrap().to_string(), "proj.ds.users_view");
        assert_eq!(report.target_table.unwrap().to_string(), "proj.ds.users");
    }

    #[tokio::test]
    async fn skipping_views_skips_view_calls() {
        let engine = FakeEngine::new(1);
        let statement = Statement::new(1, "-- output: t\nselect 1 from x");
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        let opts = quiet(RunOptions {
            create_view: false,
            ..RunOptions::default()
        });
        execute_statement(&engine, &config(), &statement, &dataset, &opts)
            .await
            .unwrap();
        assert!(!engine
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CreateView { .. })));
    }

    #[tokio::test]
    async fn unconfirmed_dry_run_aborts() {
        let engine = FakeEngine::new(1 << 40).ignoring_dry_run_flag();
        let statements = split_script(SCRIPT, &Replacements::new());
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        let opts = quiet(RunOptions::estimate());
        let err = execute_statements(&engine, &config(), &statements, &dataset, &opts)
            .await
            .unwrap_err();
        let err = err.downcast_ref::<DryRunNotConfirmed>().unwrap();
        assert_eq!(err.statement, 1);
        // We stop at the first bad answer.
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn unfinished_dry_run_aborts() {
        let engine = FakeEngine::new(1 << 40).leaving_dry_runs_unfinished();
        let statements = split_script(SCRIPT, &Replacements::new());
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        let opts = quiet(RunOptions::estimate());
        let err = execute_statements(&engine, &config(), &statements, &dataset, &opts)
            .await
            .unwrap_err();
        let err = err.downcast_ref::<DryRunNotConfirmed>().unwrap();
        assert_eq!(err.statement, 1);
        assert!(!err.summary.done);
        assert!(err.summary.dry_run);
        assert_eq!(engine.calls().len(), 1);
        assert!(!engine.calls().iter().any(Call::has_side_effects));
    }

    #[tokio::test]
    async fn materializing_needs_a_target_table() {
        let engine = FakeEngine::new(1);
        let statement = Statement::new(1, "select 1 from x");
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        let err = execute_statement(
            &engine,
            &config(),
            &statement,
            &dataset,
            &quiet(RunOptions::default()),
        )
        .await
        .unwrap_err();
        assert!(err.downcast_ref::<crate::script::ScriptError>().is_some());
        assert!(engine.calls().is_empty());

        // An estimate doesn't need somewhere to put the results.
        let report = execute_statement(
            &engine,
            &config(),
            &statement,
            &dataset,
            &quiet(RunOptions::estimate()),
        )
        .await
        .unwrap();
        assert_eq!(report.target_table, None);
    }

    #[tokio::test]
    async fn run_statement_only_returns_size_on_request() {
        let engine = FakeEngine::new(123);
        let statement = Statement::new(1, "-- output: t\nselect 1 from x");
        let dataset = "proj.ds".parse::<DatasetId>().unwrap();
        let mut opts = quiet(RunOptions::estimate());
        let size = run_statement(&engine, &config(), &statement, &dataset, &opts)
            .await
            .unwrap();
        assert_eq!(size, Some(ProcessedBytes::new(123)));

        opts.return_size = false;
        let size = run_statement(&engine, &config(), &statement, &dataset, &opts)
            .await
            .unwrap();
        assert_eq!(size, None);
    }

    #[tokio::test]
    async fn run_sql_without_queries_makes_no_calls() {
        let engine = FakeEngine::new(1);
        let file = script_file("-- only comments here\n;\n\n;");
        let opts = quiet(RunOptions {
            return_size: true,
            ..RunOptions::default()
        });
        let sizes = run_sql(&engine, &config(), file.path(), None, &Replacements::new(), &opts)
            .await
            .unwrap();
        assert_eq!(sizes, Some(vec![]));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn run_sql_accumulates_every_statement() {
        let engine = FakeEngine::new(10);
        let file = script_file(SCRIPT);
        let dataset = "other.place".parse::<DatasetId>().unwrap();
        let opts = quiet(RunOptions {
            create_view: false,
            return_size: true,
            ..RunOptions::default()
        });
        let sizes = run_sql(
            &engine,
            &config(),
            file.path(),
            Some(&dataset),
            &Replacements::new(),
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(sizes, Some(vec![ProcessedBytes::new(10), ProcessedBytes::new(10)]));
        assert!(engine.calls().contains(&Call::QueryToTable {
            sql: "-- output: orders\nselect id, total from raw.orders".to_owned(),
            dest: "other.place.orders".to_owned(),
        }));
    }

    #[tokio::test]
    async fn run_sql_needs_a_dataset() {
        let engine = FakeEngine::new(1);
        let file = script_file(SCRIPT);
        let result = run_sql(
            &engine,
            &RunConfig::default(),
            file.path(),
            None,
            &Replacements::new(),
            &quiet(RunOptions::default()),
        )
        .await;
        assert!(result.is_err());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn how_much_totals_dry_runs() {
        let engine = FakeEngine::new(1 << 40);
        let file = script_file("-- output: a\nselect * from {{src}};\n-- output: b\nselect * from {{src}}");
        let replacements = [("{{src}}", "raw.events")]
            .into_iter()
            .collect::<Replacements>();
        let cost = how_much(&engine, &config(), file.path(), &replacements)
            .await
            .unwrap();
        assert_eq!(cost.usd(), 10.0);
        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| matches!(c, Call::DryRun { sql, .. } if sql.contains("raw.events"))));
    }
}
