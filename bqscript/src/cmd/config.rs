//! The `config` subcommand.

use anyhow::Result;
use bqscript::config::{Configuration, Key};
use clap::{Args, Parser, Subcommand};
use tokio::task::spawn_blocking;

/// Configuration-editing arguments.
#[derive(Debug, Parser)]
pub(crate) struct Opt {
    /// The command to perform on the configuration.
    #[command(subcommand)]
    command: Command,
}

/// Shared options that specify a key.
#[derive(Debug, Args)]
pub(crate) struct KeyOpt {
    /// The configuration key to operate on [values: dataset, usd_per_tb,
    /// location].
    key: String,
}

impl KeyOpt {
    /// Get our configuration key.
    fn to_key(&self) -> Result<Key> {
        Key::from_name(&self.key)
    }
}

/// A command that we can perform on the configuration.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print the configuration file and where it lives.
    Show,

    /// Set a configuration key.
    Set {
        #[command(flatten)]
        key: KeyOpt,

        /// The new value.
        value: String,
    },

    /// Remove a configuration key.
    Unset {
        #[command(flatten)]
        key: KeyOpt,
    },
}

/// Show or edit our config file.
pub(crate) async fn run(mut config: Configuration, opt: Opt) -> Result<()> {
    match &opt.command {
        Command::Show => {
            println!("# {}", config.path().display());
            print!("{}", config);
            return Ok(());
        }
        Command::Set { key, value } => config.set(key.to_key()?, value)?,
        Command::Unset { key } => config.unset(key.to_key()?),
    }
    spawn_blocking(move || config.write()).await?
}
