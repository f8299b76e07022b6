//! Run multi-statement BigQuery SQL scripts from the command line.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cmd;

#[tokio::main]
async fn main() -> Result<()> {
    let opt = cmd::Opt::parse();
    opt.log_format.install()?;
    debug!("{:?}", opt);
    cmd::run(opt).await
}
