//! Splitting SQL scripts into individual statements.
//!
//! A script is a series of `;`-separated statements. The first line of each
//! statement names the table its results should be written to, using a line
//! comment of the form:
//!
//! ```sql
//! -- output: daily_sales
//! select day, sum(amount) from sales group by day;
//! ```
//!
//! Everything after the first `": "` on that line is the table name. Fragments
//! which contain neither `select` nor `from` (in any case) are assumed to be
//! comments or blank space and are dropped.

use lazy_static::lazy_static;
use regex::Regex;
use std::{error, fmt, path::Path};
use tokio::fs;

use crate::common::*;
use crate::replace::Replacements;

/// The separator between a statement's first-line comment and its table name.
pub const TARGET_TABLE_MARKER: &str = ": ";

/// An error found while interpreting a script.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptError {
    /// A statement needed a destination table, but its first line does not
    /// contain `": "`.
    MissingTargetTable {
        /// The 1-based number of the statement within the script.
        statement: usize,
        /// The first line of the statement, as written.
        first_line: String,
    },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::MissingTargetTable {
                statement,
                first_line,
            } => write!(
                f,
                "statement {} has no output table: expected a first line like \
                 \"-- output: my_table\", found {:?}",
                statement, first_line,
            ),
        }
    }
}

impl error::Error for ScriptError {}

/// A single query from a script.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Statement {
    index: usize,
    sql: String,
    target_table: String,
}

impl Statement {
    /// Build a statement from already-trimmed SQL. `index` is 1-based.
    pub fn new<S: Into<String>>(index: usize, sql: S) -> Self {
        let sql = sql.into();
        let target_table = target_table_name(first_line(&sql)).to_owned();
        Self {
            index,
            sql,
            target_table,
        }
    }

    /// The 1-based position of this statement among the queries in its script.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The SQL text of this statement, with surrounding whitespace removed.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The table name from our first-line comment. Empty if there was no `": "`
    /// marker.
    pub fn target_table_name(&self) -> &str {
        &self.target_table
    }

    /// The table name from our first-line comment, or an error if we don't
    /// have one.
    pub fn require_target_table(&self) -> Result<&str, ScriptError> {
        let name = self.target_table.trim();
        if name.is_empty() {
            Err(ScriptError::MissingTargetTable {
                statement: self.index,
                first_line: first_line(&self.sql).to_owned(),
            })
        } else {
            Ok(name)
        }
    }
}

/// Does this fragment look like a query?
///
/// This is a substring test, so `delete from t` and `-- selected rows` both
/// count.
pub fn looks_like_query(fragment: &str) -> bool {
    lazy_static! {
        static ref QUERY_KEYWORD_RE: Regex =
            Regex::new("(?i)select|from").expect("could not parse built-in regex");
    }
    QUERY_KEYWORD_RE.is_match(fragment)
}

/// Return everything after the first `": "` in `line`, or `""` if there is no
/// such marker.
pub fn target_table_name(line: &str) -> &str {
    match line.find(TARGET_TABLE_MARKER) {
        Some(pos) => &line[pos + TARGET_TABLE_MARKER.len()..],
        None => "",
    }
}

fn first_line(sql: &str) -> &str {
    sql.split('\n').next().unwrap_or("")
}

/// Apply `replacements` to `script`, then split it into statements.
///
/// Statements are returned in script order. Fragments which don't look like
/// queries are dropped without comment.
pub fn split_script(script: &str, replacements: &Replacements) -> Vec<Statement> {
    let script = replacements.apply(script);
    let mut statements = vec![];
    for fragment in script.split(';') {
        let sql = fragment.trim();
        if !looks_like_query(sql) {
            continue;
        }
        statements.push(Statement::new(statements.len() + 1, sql));
    }
    debug!("found {} statements", statements.len());
    statements
}

/// Read the script at `path` and split it into statements.
#[instrument(level = "trace", skip(replacements))]
pub async fn read_script(
    path: &Path,
    replacements: &Replacements,
) -> Result<Vec<Statement>> {
    let script = fs::read_to_string(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    Ok(split_script(&script, replacements))
}
