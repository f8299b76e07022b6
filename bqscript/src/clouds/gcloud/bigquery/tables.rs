//! Table and view management.

use serde::{Deserialize, Serialize};

use super::super::{percent_encode, Client, ClientError, Idempotency, NoQuery};
use super::jobs::TableReference;
use crate::common::*;
use crate::dataset::TableName;

/// The REST URL of a single table.
fn table_url(name: &TableName) -> String {
    format!(
        "https://bigquery.googleapis.com/bigquery/v2/projects/{}/datasets/{}/tables/{}",
        percent_encode(name.project()),
        percent_encode(name.dataset()),
        percent_encode(name.table()),
    )
}

/// Delete a table or view. If `not_found_ok` is set, a missing table counts
/// as success.
#[instrument(level = "trace", skip(client))]
pub(crate) async fn delete_table(
    client: &Client,
    name: &TableName,
    not_found_ok: bool,
) -> Result<()> {
    debug!("deleting {}", name);
    match client.delete(table_url(name).as_str(), NoQuery).await {
        Ok(()) => Ok(()),
        Err(ClientError::NotFound { .. }) if not_found_ok => {
            trace!("{} was already gone", name);
            Ok(())
        }
        Err(ClientError::Other(err)) => Err(err),
        Err(err) => Err(err.into()),
    }
}

/// Request body for creating a view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewView<'a> {
    table_reference: TableReference,
    view: ViewDefinition<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewDefinition<'a> {
    query: &'a str,
    use_legacy_sql: bool,
}

/// The parts of a table resource we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    /// Sent as a decimal string. Views don't have one.
    #[serde(default)]
    num_rows: Option<String>,
}

/// Create a standard SQL view.
#[instrument(level = "trace", skip(client, view_sql))]
pub(crate) async fn create_view(
    client: &Client,
    name: &TableName,
    view_sql: &str,
) -> Result<()> {
    let url = format!(
        "https://bigquery.googleapis.com/bigquery/v2/projects/{}/datasets/{}/tables",
        percent_encode(name.project()),
        percent_encode(name.dataset()),
    );
    let body = NewView {
        table_reference: TableReference::from(name),
        view: ViewDefinition {
            query: view_sql,
            use_legacy_sql: false,
        },
    };

    // Sent once. A 403 here is usually a real permission error, and a resend
    // after a lost response would only fail with "already exists".
    client
        .post::<Table, _, _, _>(url.as_str(), Idempotency::UnsafeToRetry, NoQuery, body)
        .await
        .with_context(|| format!("could not create view {}", name))?;
    Ok(())
}

/// Look up the number of rows in a table.
#[instrument(level = "trace", skip(client))]
pub(crate) async fn row_count(client: &Client, name: &TableName) -> Result<u64> {
    let table = client
        .get::<Table, _, _>(table_url(name).as_str(), NoQuery)
        .await
        .with_context(|| format!("could not look up table {}", name))?;
    parse_num_rows(table.num_rows.as_deref())
        .with_context(|| format!("could not get row count for {}", name))
}

fn parse_num_rows(num_rows: Option<&str>) -> Result<u64> {
    match num_rows {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid numRows {:?}", raw)),
        None => Err(format_err!("BigQuery did not report numRows")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn view_request_uses_standard_sql() {
        let name = "p.d".parse::<crate::dataset::DatasetId>().unwrap().table("t_view");
        let body = NewView {
            table_reference: TableReference::from(&name),
            view: ViewDefinition {
                query: "select 1",
                use_legacy_sql: false,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "tableReference": { "projectId": "p", "datasetId": "d", "tableId": "t_view" },
                "view": { "query": "select 1", "useLegacySql": false },
            }),
        );
    }

    #[test]
    fn reads_row_counts() {
        let table = serde_json::from_value::<Table>(json!({
            "kind": "bigquery#table",
            "numRows": "12345",
            "numBytes": "999",
        }))
        .unwrap();
        assert_eq!(parse_num_rows(table.num_rows.as_deref()).unwrap(), 12345);
        assert!(parse_num_rows(None).is_err());
        assert!(parse_num_rows(Some("lots")).is_err());
    }
}
