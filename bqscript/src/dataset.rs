//! BigQuery dataset and table names.

use std::{fmt, str::FromStr};

use crate::common::*;

/// A BigQuery dataset of the form `"project.dataset"`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatasetId {
    /// The name of the Google Cloud project.
    project: String,
    /// The BigQuery dataset.
    dataset: String,
}

impl DatasetId {
    /// Return the name of the dataset's project.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Name a table inside this dataset.
    pub fn table<S: Into<String>>(&self, table: S) -> TableName {
        TableName {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

impl FromStr for DatasetId {
    type Err = Error;

    /// Split on the first `.`. Anything after it, dots included, is the
    /// dataset.
    fn from_str(s: &str) -> Result<Self> {
        let (project, dataset) = s.split_once('.').ok_or_else(|| {
            format_err!("could not parse BigQuery dataset {:?}, expected project.dataset", s)
        })?;
        if project.is_empty() || dataset.is_empty() {
            return Err(format_err!(
                "could not parse BigQuery dataset {:?}, expected project.dataset",
                s,
            ));
        }
        Ok(DatasetId {
            project: project.to_owned(),
            dataset: dataset.to_owned(),
        })
    }
}

/// A fully-qualified BigQuery table name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableName {
    project: String,
    dataset: String,
    table: String,
}

impl TableName {
    /// Return the name of the table's project.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Return the name of the table's dataset.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Return the bare table name itself, without project or dataset.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The name of the view we keep next to this table.
    pub fn view_name(&self) -> TableName {
        TableName {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: format!("{}_view", self.table),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[test]
fn dataset_splits_on_first_dot() {
    let ds = "my-project.analytics".parse::<DatasetId>().unwrap();
    assert_eq!(ds.project(), "my-project");
    assert_eq!(ds.table("t").dataset(), "analytics");
    assert_eq!(ds.to_string(), "my-project.analytics");

    let ds = "p.d.extra".parse::<DatasetId>().unwrap();
    assert_eq!(ds.project(), "p");
    assert_eq!(ds.table("t").dataset(), "d.extra");
}

#[test]
fn dataset_requires_both_parts() {
    for bad in &["", "project", ".dataset", "project."] {
        assert!(bad.parse::<DatasetId>().is_err(), "{:?} should not parse", bad);
    }
}

#[test]
fn view_names_get_suffix() {
    let ds = "p.d".parse::<DatasetId>().unwrap();
    let table = ds.table("sales");
    assert_eq!(table.to_string(), "p.d.sales");
    assert_eq!(table.view_name().to_string(), "p.d.sales_view");
}
