//! The `run` subcommand.

use anyhow::Result;
use bqscript::{config::Configuration, run_sql, BigQueryEngine, RunOptions};
use clap::Parser;
use tracing::debug;

use super::{EngineOpt, ScriptOpt};

/// Script-running arguments.
#[derive(Debug, Parser)]
pub(crate) struct Opt {
    #[command(flatten)]
    pub(crate) script: ScriptOpt,

    #[command(flatten)]
    pub(crate) engine: EngineOpt,

    /// Only estimate what each statement would process.
    #[arg(long = "dry-run")]
    pub(crate) dry_run: bool,

    /// Don't rebuild `<table>_view` for each statement.
    #[arg(long = "no-view")]
    pub(crate) no_view: bool,

    /// Don't print per-statement reports.
    #[arg(long = "quiet", short = 'q')]
    pub(crate) quiet: bool,
}

impl Opt {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            create_view: !self.no_view,
            dry_run: self.dry_run,
            verbose: !self.quiet,
            return_size: false,
        }
    }
}

/// Run a script.
pub(crate) async fn run(config: Configuration, opt: Opt) -> Result<()> {
    let run_config = opt.engine.run_config(&config)?;
    let run_options = opt.run_options();
    debug!("running {} with {:?}", opt.script.file.display(), run_options);
    let engine = BigQueryEngine::new(&run_config).await?;
    run_sql(
        &engine,
        &run_config,
        &opt.script.file,
        None,
        &opt.script.replacements()?,
        &run_options,
    )
    .await?;
    Ok(())
}

#[test]
fn flags_map_to_run_options() {
    let opt = Opt::try_parse_from(["run", "q.sql", "--dry-run", "--no-view", "-q"]).unwrap();
    assert_eq!(
        opt.run_options(),
        RunOptions {
            create_view: false,
            dry_run: true,
            verbose: false,
            return_size: false,
        },
    );
    let opt = Opt::try_parse_from(["run", "q.sql"]).unwrap();
    assert_eq!(opt.run_options(), RunOptions::default());
}
