//! The `how-much` subcommand.

use anyhow::Result;
use bqscript::{config::Configuration, how_much, BigQueryEngine};
use clap::Parser;
use tracing::debug;

use super::{EngineOpt, ScriptOpt};

/// Cost-estimate arguments.
#[derive(Debug, Parser)]
pub(crate) struct Opt {
    #[command(flatten)]
    pub(crate) script: ScriptOpt,

    #[command(flatten)]
    pub(crate) engine: EngineOpt,
}

/// Dry-run every statement and print the total.
pub(crate) async fn run(config: Configuration, opt: Opt) -> Result<()> {
    let run_config = opt.engine.run_config(&config)?;
    let engine = BigQueryEngine::new(&run_config).await?;
    let estimate = how_much(
        &engine,
        &run_config,
        &opt.script.file,
        &opt.script.replacements()?,
    )
    .await?;
    debug!("estimated {} for {}", estimate, opt.script.file.display());
    Ok(())
}
