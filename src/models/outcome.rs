//! Response envelope shared by every tool.
//!
//! An [`Outcome`] always serializes with a leading `success` flag followed by
//! either the success body or a [`Failure`], never both.

use crate::error::DbError;
use serde::{Serialize, Serializer};

/// Failure half of the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Statement as submitted, before any rewrite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl Failure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            sql: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl From<&DbError> for Failure {
    fn from(err: &DbError) -> Self {
        let failure = Failure::new(err.envelope_message());
        match err {
            DbError::GuardRejection { kind } => failure.with_message(kind.message()),
            _ => failure,
        }
    }
}

/// Tagged success/failure result of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Fold a handler result into an envelope, dropping the error type.
    pub fn from_result(result: Result<T, DbError>) -> Self {
        match result {
            Ok(body) => Self::Success(body),
            Err(err) => Self::Failure(Failure::from(&err)),
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, B> {
            success: bool,
            #[serde(flatten)]
            body: &'a B,
        }

        match self {
            Outcome::Success(body) => Tagged {
                success: true,
                body,
            }
            .serialize(serializer),
            Outcome::Failure(failure) => Tagged {
                success: false,
                body: failure,
            }
            .serialize(serializer),
        }
    }
}

impl<T: Serialize> Outcome<T> {
    /// Render as pretty-printed JSON text.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize tool outcome");
            format!(
                "{{\n  \"success\": false,\n  \"error\": \"{}\"\n}}",
                crate::error::UNKNOWN_ERROR_MESSAGE
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Body {
        count: u64,
    }

    #[test]
    fn test_success_envelope() {
        let outcome = Outcome::Success(Body { count: 2 });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value, json!({ "success": true, "count": 2 }));
    }

    #[test]
    fn test_failure_envelope_omits_absent_fields() {
        let outcome: Outcome<Body> = Outcome::Failure(Failure::new("boom").with_sql("SELECT 1"));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({ "success": false, "error": "boom", "sql": "SELECT 1" })
        );
    }

    #[test]
    fn test_failure_envelope_fields() {
        let failure = Failure::new("boom")
            .with_message("detail")
            .with_sql("SELECT 1");
        let value = serde_json::to_value(&failure).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["error", "message", "sql"]);
    }

    #[test]
    fn test_from_result_unknown_error() {
        let outcome: Outcome<Body> = Outcome::from_result(Err(DbError::Unknown));
        assert!(!outcome.is_success());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["error"], "Unknown error occurred");
        assert!(value.get("count").is_none());
    }

    #[test]
    fn test_guard_rejection_carries_message() {
        let err = DbError::GuardRejection {
            kind: crate::tools::guard::ForbiddenKind::Alter,
        };
        let failure = Failure::from(&err);
        assert_eq!(failure.error, "Dangerous operation detected");
        assert_eq!(
            failure.message.as_deref(),
            Some("ALTER operations are not allowed for safety reasons")
        );
    }

    #[test]
    fn test_pretty_json_is_multiline() {
        let text = Outcome::Success(Body { count: 1 }).to_pretty_json();
        assert!(text.starts_with("{\n  \"success\": true"));
    }
}
