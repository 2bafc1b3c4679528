//! Flattens warehouse result pages into records and wraps outcomes in the envelope.

use std::future::Future;

use chrono::{DateTime, SecondsFormat};
use serde_json::{Number, Value};
use tracing::warn;

use crate::envelope::{Envelope, ErrorCategory, Record, Vendor};

use super::{FieldSchema, RawRow, RowCursor, WarehouseError, WarehouseResult};

/// Reads every page from `cursor`, preserving row order.
///
/// Rows read before a failing page are discarded.
///
/// # Errors
/// Returns the first `WarehouseError` raised by the cursor or by row decoding.
pub async fn drain<C: RowCursor>(mut cursor: C) -> WarehouseResult<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(page) = cursor.next_page().await? {
        records.reserve(page.rows.len());
        for row in &page.rows {
            records.push(row_to_record(&page.schema.fields, row)?);
        }
    }
    Ok(records)
}

/// Awaits `producer` for a cursor, drains it, and maps the outcome to an envelope.
///
/// `not_found_context` prefixes the vendor message of a not-found failure.
pub async fn normalize<F, C>(producer: F, not_found_context: &str) -> Envelope
where
    F: Future<Output = WarehouseResult<C>>,
    C: RowCursor,
{
    let outcome = match producer.await {
        Ok(cursor) => drain(cursor).await,
        Err(err) => Err(err),
    };
    into_envelope(outcome, not_found_context)
}

#[must_use]
pub fn into_envelope(outcome: WarehouseResult<Vec<Record>>, not_found_context: &str) -> Envelope {
    match outcome {
        Ok(records) => Envelope::results(records),
        Err(WarehouseError::NotFound { message }) => {
            warn!(%message, "warehouse resource not found");
            Envelope::failure(
                ErrorCategory::NotFound,
                format!("{not_found_context}: {message}"),
                404,
            )
        }
        Err(WarehouseError::Api { code, message }) => {
            warn!(?code, %message, "warehouse rejected the request");
            Envelope::failure(
                ErrorCategory::VendorApi(Vendor::Google),
                message,
                code.unwrap_or(500),
            )
        }
        Err(err) => {
            warn!(error = %err, "warehouse call failed");
            Envelope::execution_error(err)
        }
    }
}

fn row_to_record(fields: &[FieldSchema], row: &RawRow) -> WarehouseResult<Record> {
    if row.f.len() != fields.len() {
        return Err(WarehouseError::Decode(format!(
            "row has {} cells but the schema has {} fields",
            row.f.len(),
            fields.len()
        )));
    }
    let mut record = Record::new();
    for (field, cell) in fields.iter().zip(&row.f) {
        record.insert(field.name.clone(), convert_cell(field, &cell.v)?);
    }
    Ok(record)
}

fn convert_cell(field: &FieldSchema, value: &Value) -> WarehouseResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if !field.is_repeated() {
        return convert_scalar(field, value);
    }
    let Value::Array(items) = value else {
        return Err(WarehouseError::Decode(format!(
            "repeated field {} is not an array",
            field.name
        )));
    };
    items
        .iter()
        .map(|item| {
            let inner = item.get("v").unwrap_or(&Value::Null);
            if inner.is_null() {
                Ok(Value::Null)
            } else {
                convert_scalar(field, inner)
            }
        })
        .collect::<WarehouseResult<Vec<_>>>()
        .map(Value::Array)
}

fn convert_scalar(field: &FieldSchema, value: &Value) -> WarehouseResult<Value> {
    let field_type = field.field_type.to_ascii_uppercase();
    if matches!(field_type.as_str(), "RECORD" | "STRUCT") {
        let row: RawRow = serde_json::from_value(value.clone())
            .map_err(|err| WarehouseError::Decode(format!("{}: {err}", field.name)))?;
        return row_to_record(&field.fields, &row).map(Value::Object);
    }

    let Some(text) = value.as_str() else {
        return Ok(value.clone());
    };
    let converted = match field_type.as_str() {
        "INTEGER" | "INT64" => text.parse::<i64>().ok().map(Value::from),
        "FLOAT" | "FLOAT64" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "BOOLEAN" | "BOOL" => match text.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "TIMESTAMP" => timestamp_to_rfc3339(text).map(Value::String),
        "JSON" => serde_json::from_str(text).ok(),
        _ => None,
    };
    Ok(converted.unwrap_or_else(|| Value::String(text.to_string())))
}

/// Timestamps arrive as epoch seconds, either plain (`1700000000.123456`) or
/// in scientific notation (`1.7E9`).
fn timestamp_to_rfc3339(text: &str) -> Option<String> {
    DateTime::from_timestamp_micros(epoch_micros(text)?)
        .map(|timestamp| timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_micros(text: &str) -> Option<i64> {
    if text.contains(['e', 'E']) {
        let seconds = text.parse::<f64>().ok()?;
        if !seconds.is_finite() {
            return None;
        }
        return Some((seconds * 1_000_000.0).round() as i64);
    }

    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let seconds = whole.parse::<i64>().ok()?;
    let mut digits = fraction.chars().take(6).collect::<String>();
    while digits.len() < 6 {
        digits.push('0');
    }
    let fraction = digits.parse::<i64>().ok()?;
    let micros = seconds.checked_mul(1_000_000)?;
    if whole.starts_with('-') {
        micros.checked_sub(fraction)
    } else {
        micros.checked_add(fraction)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::json;

    use super::*;
    use crate::warehouse::{RowPage, TableSchema};

    struct PagedCursor {
        pages: VecDeque<WarehouseResult<RowPage>>,
    }

    impl PagedCursor {
        fn new(pages: Vec<WarehouseResult<RowPage>>) -> Self {
            Self {
                pages: pages.into(),
            }
        }
    }

    impl RowCursor for PagedCursor {
        async fn next_page(&mut self) -> WarehouseResult<Option<RowPage>> {
            self.pages.pop_front().transpose()
        }
    }

    fn schema(value: Value) -> TableSchema {
        serde_json::from_value(value).expect("valid schema")
    }

    fn rows(value: Value) -> Vec<RawRow> {
        serde_json::from_value(value).expect("valid rows")
    }

    fn name_schema() -> TableSchema {
        schema(json!({"fields": [{"name": "table_name", "type": "STRING"}]}))
    }

    fn name_page(names: &[&str]) -> RowPage {
        let rows = names
            .iter()
            .map(|name| json!({"f": [{"v": name}]}))
            .collect::<Vec<_>>();
        RowPage {
            schema: name_schema(),
            rows: serde_json::from_value(Value::Array(rows)).expect("valid rows"),
        }
    }

    #[tokio::test]
    async fn empty_cursor_is_an_empty_success() {
        let cursor = PagedCursor::new(Vec::new());
        let envelope = normalize(async { Ok::<_, WarehouseError>(cursor) }, "ctx").await;
        assert_eq!(envelope, Envelope::results(Vec::new()));
    }

    #[tokio::test]
    async fn pages_are_concatenated_in_order() {
        let cursor = PagedCursor::new(vec![
            Ok(name_page(&["b", "a"])),
            Ok(RowPage {
                schema: name_schema(),
                rows: Vec::new(),
            }),
            Ok(name_page(&["c"])),
        ]);
        let records = drain(cursor).await.expect("drains");
        let names = records
            .iter()
            .map(|record| record["table_name"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn mid_stream_failure_discards_partial_rows() {
        let cursor = PagedCursor::new(vec![
            Ok(name_page(&["a"])),
            Err(WarehouseError::Api {
                code: Some(503),
                message: "backend error".to_string(),
            }),
        ]);
        let envelope = normalize(async { Ok::<_, WarehouseError>(cursor) }, "ctx").await;
        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error, ErrorCategory::VendorApi(Vendor::Google));
        assert_eq!(failure.code, 503);
        assert_eq!(failure.message, "backend error");
    }

    #[tokio::test]
    async fn not_found_gets_context_prefix() {
        let envelope = normalize::<_, PagedCursor>(
            async {
                Err(WarehouseError::NotFound {
                    message: "Not found: Dataset insightsprod:ds1".to_string(),
                })
            },
            "Dataset 'ds1' not found",
        )
        .await;
        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error, ErrorCategory::NotFound);
        assert_eq!(failure.code, 404);
        assert_eq!(
            failure.message,
            "Dataset 'ds1' not found: Not found: Dataset insightsprod:ds1"
        );
    }

    #[test]
    fn api_error_without_code_defaults_to_500() {
        let envelope = into_envelope(
            Err(WarehouseError::Api {
                code: None,
                message: "quota".to_string(),
            }),
            "ctx",
        );
        assert_eq!(envelope.as_failure().map(|f| f.code), Some(500));
    }

    #[test]
    fn uncategorized_errors_become_execution_errors() {
        let envelope = into_envelope(
            Err(WarehouseError::Credentials("no such file".to_string())),
            "ctx",
        );
        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error, ErrorCategory::Execution);
        assert_eq!(failure.code, 500);
        assert!(failure.message.contains("no such file"));
    }

    #[tokio::test]
    async fn cells_are_converted_by_column_type() {
        let page = RowPage {
            schema: schema(json!({"fields": [
                {"name": "client_id", "type": "INTEGER"},
                {"name": "score", "type": "FLOAT"},
                {"name": "active", "type": "BOOLEAN"},
                {"name": "updated_at", "type": "TIMESTAMP"},
                {"name": "client_name", "type": "STRING"},
                {"name": "git_url", "type": "STRING"},
                {"name": "sources", "type": "STRING", "mode": "REPEATED"},
                {"name": "owner", "type": "RECORD", "fields": [
                    {"name": "email", "type": "STRING"},
                    {"name": "seats", "type": "INT64"}
                ]},
                {"name": "payload", "type": "JSON"},
                {"name": "revenue", "type": "NUMERIC"}
            ]})),
            rows: rows(json!([{"f": [
                {"v": "42"},
                {"v": "0.5"},
                {"v": "true"},
                {"v": "1.7E9"},
                {"v": "Acme"},
                {"v": null},
                {"v": [{"v": "ga4"}, {"v": "meta"}]},
                {"v": {"f": [{"v": "ops@acme.test"}, {"v": "3"}]}},
                {"v": "{\"k\":1}"},
                {"v": "12.50"}
            ]}])),
        };
        let records = drain(PagedCursor::new(vec![Ok(page)]))
            .await
            .expect("drains");
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({
                "client_id": 42,
                "score": 0.5,
                "active": true,
                "updated_at": "2023-11-14T22:13:20Z",
                "client_name": "Acme",
                "git_url": null,
                "sources": ["ga4", "meta"],
                "owner": {"email": "ops@acme.test", "seats": 3},
                "payload": {"k": 1},
                "revenue": "12.50"
            })
        );
    }

    #[tokio::test]
    async fn cell_count_mismatch_is_a_decode_error() {
        let page = RowPage {
            schema: name_schema(),
            rows: rows(json!([{"f": [{"v": "a"}, {"v": "b"}]}])),
        };
        let err = drain(PagedCursor::new(vec![Ok(page)]))
            .await
            .expect_err("mismatch");
        assert!(matches!(err, WarehouseError::Decode(_)));
    }

    #[test]
    fn fractional_timestamps_keep_microseconds() {
        assert_eq!(
            timestamp_to_rfc3339("1700000000.123456").as_deref(),
            Some("2023-11-14T22:13:20.123456Z")
        );
        assert_eq!(timestamp_to_rfc3339("not a number"), None);
    }
}
