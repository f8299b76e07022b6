//! Command parsing.

use anyhow::{format_err, Result};
use bqscript::{
    config::Configuration, logging::LogFormat, DatasetId, Labels,
    Replacements, RunConfig,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

pub(crate) mod config;
pub(crate) mod how_much;
pub(crate) mod run;
pub(crate) mod split;

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[command(
    name = "bqscript",
    version,
    about = "Run multi-statement BigQuery SQL scripts and estimate what they cost."
)]
pub(crate) struct Opt {
    /// Log format: indented, flat or json. Verbosity is set with RUST_LOG.
    #[arg(long = "log-format", global = true, default_value = "flat")]
    pub(crate) log_format: LogFormat,

    /// The command to run.
    #[command(subcommand)]
    pub(crate) cmd: Command,
}

/// The command to run.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run every statement in a script, loading each into its table.
    #[command(after_help = r#"SCRIPT FORMAT:
    Statements are separated by `;`. The first line of each statement names
    its destination table after a `: ` marker:

        -- output: daily_totals
        select day, count(*) from events group by day;
"#)]
    Run(run::Opt),

    /// Estimate what a script would cost, without running it.
    HowMuch(how_much::Opt),

    /// List the statements in a script and their target tables.
    Split(split::Opt),

    /// Show or edit the configuration file.
    Config(config::Opt),
}

/// Arguments shared by every command that reads a script.
#[derive(Debug, Args)]
pub(crate) struct ScriptOpt {
    /// The SQL script to read.
    pub(crate) file: PathBuf,

    /// Literal text substitution applied before splitting (can be repeated;
    /// applied in order).
    #[arg(long = "replace", value_name = "OLD=NEW")]
    pub(crate) replace: Vec<String>,
}

impl ScriptOpt {
    /// Our substitution rules, in command-line order.
    pub(crate) fn replacements(&self) -> Result<Replacements> {
        Replacements::from_cli_args(&self.replace)
    }
}

/// Arguments for commands that talk to BigQuery.
#[derive(Debug, Args)]
pub(crate) struct EngineOpt {
    /// The dataset to use, as `project.dataset`. Overrides the config file.
    #[arg(long = "dataset", value_name = "PROJECT.DATASET")]
    pub(crate) dataset: Option<DatasetId>,

    /// Attach a label to every BigQuery job (can be repeated).
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    pub(crate) labels: Vec<(String, String)>,
}

impl EngineOpt {
    /// Merge our arguments over the settings in `config`.
    pub(crate) fn run_config(&self, config: &Configuration) -> Result<RunConfig> {
        let mut run_config = config.run_config()?;
        if let Some(dataset) = &self.dataset {
            run_config.default_dataset = Some(dataset.clone());
        }
        run_config.labels = self.labels.iter().cloned().collect::<Labels>();
        Ok(run_config)
    }
}

/// Parse `KEY=VALUE`.
fn parse_label(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format_err!("expected label of the form KEY=VALUE, found {:?}", s))?;
    if key.is_empty() {
        return Err(format_err!("label key cannot be empty in {:?}", s));
    }
    Ok((key.to_owned(), value.to_owned()))
}

/// Run the command in `opt`. `split` works without a readable config file.
pub(crate) async fn run(opt: Opt) -> Result<()> {
    match opt.cmd {
        Command::Run(command) => run::run(load_config()?, command).await,
        Command::HowMuch(command) => how_much::run(load_config()?, command).await,
        Command::Split(command) => split::run(command).await,
        Command::Config(command) => config::run(load_config()?, command).await,
    }
}

fn load_config() -> Result<Configuration> {
    let config = Configuration::try_default()?;
    debug!("loaded config from {}", config.path().display());
    Ok(config)
}
