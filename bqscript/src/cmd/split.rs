//! The `split` subcommand.

use anyhow::Result;
use bqscript::script::{read_script, Statement};
use clap::Parser;

use super::ScriptOpt;

/// Splitting arguments.
#[derive(Debug, Parser)]
pub(crate) struct Opt {
    #[command(flatten)]
    pub(crate) script: ScriptOpt,
}

/// Print each statement the way `run` would see it. Never talks to BigQuery.
pub(crate) async fn run(opt: Opt) -> Result<()> {
    let statements = read_script(&opt.script.file, &opt.script.replacements()?).await?;
    for statement in &statements {
        print!("{}", describe(statement));
    }
    Ok(())
}

fn describe(statement: &Statement) -> String {
    let table = match statement.target_table_name().trim() {
        "" => "(no target table)".to_owned(),
        name => format!("table {}", name),
    };
    format!(
        "-- Statement {}: {}\n{};\n\n",
        statement.index(),
        table,
        statement.sql().trim(),
    )
}

#[test]
fn describes_statements() {
    let statement = Statement::new(2, "-- output: totals\nselect 1 from t");
    assert_eq!(
        describe(&statement),
        "-- Statement 2: table totals\n-- output: totals\nselect 1 from t;\n\n",
    );
    let statement = Statement::new(3, "select 1 from t");
    assert_eq!(
        describe(&statement),
        "-- Statement 3: (no target table)\nselect 1 from t;\n\n",
    );
}
