//! The uniform response shape returned by every tool.
//!
//! Serialized as `{"success": true, "results": [...]}` (or `"result"` for a
//! single document) on success and
//! `{"success": false, "error", "message", "code"}` on failure.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A flat column-name to value record.
pub type Record = Map<String, Value>;

/// Remote service a vendor error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Google,
    ClickUp,
}

impl Vendor {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::ClickUp => "ClickUp",
        }
    }
}

/// Failure category labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    VendorApi(Vendor),
    Authentication,
    Connection,
    Execution,
}

impl ErrorCategory {
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::NotFound => "Not Found".to_string(),
            Self::VendorApi(vendor) => format!("{} API Error", vendor.name()),
            Self::Authentication => "Authentication Error".to_string(),
            Self::Connection => "Connection Error".to_string(),
            Self::Execution => "Execution Error".to_string(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Results(Vec<Record>),
    Result(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub error: ErrorCategory,
    pub message: String,
    pub code: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Payload),
    Failure(Failure),
}

impl Envelope {
    #[must_use]
    pub const fn results(rows: Vec<Record>) -> Self {
        Self::Success(Payload::Results(rows))
    }

    #[must_use]
    pub const fn result(document: Value) -> Self {
        Self::Success(Payload::Result(document))
    }

    #[must_use]
    pub fn failure(error: ErrorCategory, message: impl Into<String>, code: u16) -> Self {
        Self::Failure(Failure {
            error,
            message: message.into(),
            code,
        })
    }

    /// Catch-all failure for local usage errors and uncategorized faults.
    #[must_use]
    pub fn execution_error(message: impl fmt::Display) -> Self {
        Self::failure(ErrorCategory::Execution, message.to_string(), 500)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub const fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Success(_) => None,
        }
    }

    #[must_use]
    pub fn rows(&self) -> Option<&[Record]> {
        match self {
            Self::Success(Payload::Results(rows)) => Some(rows.as_slice()),
            _ => None,
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(payload) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                match payload {
                    Payload::Results(rows) => map.serialize_entry("results", rows)?,
                    Payload::Result(document) => map.serialize_entry("result", document)?,
                }
                map.end()
            }
            Self::Failure(failure) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", &failure.error)?;
                map.serialize_entry("message", &failure.message)?;
                map.serialize_entry("code", &failure.code)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_serializes_results() {
        let mut row = Record::new();
        row.insert("table_name".to_string(), json!("events"));
        let value = serde_json::to_value(Envelope::results(vec![row])).expect("serializes");
        assert_eq!(
            value,
            json!({"success": true, "results": [{"table_name": "events"}]})
        );
    }

    #[test]
    fn empty_results_stay_a_success() {
        let value = serde_json::to_value(Envelope::results(Vec::new())).expect("serializes");
        assert_eq!(value, json!({"success": true, "results": []}));
    }

    #[test]
    fn single_document_uses_result_key() {
        let value =
            serde_json::to_value(Envelope::result(json!({"id": "abc"}))).expect("serializes");
        assert_eq!(value, json!({"success": true, "result": {"id": "abc"}}));
    }

    #[test]
    fn failure_carries_label_message_and_code() {
        let envelope = Envelope::failure(
            ErrorCategory::VendorApi(Vendor::Google),
            "Access Denied",
            403,
        );
        let value = serde_json::to_value(&envelope).expect("serializes");
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": "Google API Error",
                "message": "Access Denied",
                "code": 403
            })
        );
    }

    #[test]
    fn category_labels() {
        assert_eq!(ErrorCategory::NotFound.label(), "Not Found");
        assert_eq!(
            ErrorCategory::VendorApi(Vendor::ClickUp).label(),
            "ClickUp API Error"
        );
        assert_eq!(ErrorCategory::Authentication.label(), "Authentication Error");
        assert_eq!(ErrorCategory::Connection.label(), "Connection Error");
        assert_eq!(
            Envelope::execution_error("boom").as_failure().map(|f| f.code),
            Some(500)
        );
    }
}
