//! Query execution tool.
//!
//! This module implements the `query` MCP tool. Every statement passes the
//! same ordered gates: input validation, prefix classification, row limit
//! rewrite, execution, and envelope shaping.

use crate::db::QueryRunner;
use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_ROW_LIMIT, Failure, FieldInfo, MAX_ROW_LIMIT, MIN_ROW_LIMIT, Outcome, QueryParam,
};
use crate::tools::guard::{self, Classification};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

fn default_limit() -> i64 {
    DEFAULT_ROW_LIMIT
}

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// The SQL query to execute
    pub sql: String,
    /// Query parameters for parameterized queries
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Maximum number of rows to return (default: 1000, max: 10000)
    #[serde(default = "default_limit")]
    #[schemars(range(min = 1, max = 10000))]
    pub limit: i64,
}

impl QueryInput {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Reject malformed input before any database access.
    pub fn validate(&self) -> DbResult<()> {
        if self.sql.trim().is_empty() {
            return Err(DbError::validation("sql must not be empty"));
        }
        if !(MIN_ROW_LIMIT..=MAX_ROW_LIMIT).contains(&self.limit) {
            return Err(DbError::validation(format!(
                "limit must be between {} and {}, got {}",
                MIN_ROW_LIMIT, MAX_ROW_LIMIT, self.limit
            )));
        }
        Ok(())
    }
}

/// Success body of the query tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub row_count: u64,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub fields: Vec<FieldInfo>,
}

/// Handler for query execution.
pub struct QueryToolHandler<R> {
    runner: Arc<R>,
}

impl<R: QueryRunner> QueryToolHandler<R> {
    /// Create a new query tool handler.
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Handle the query tool call.
    ///
    /// Only invalid input is returned as `Err`. Rejected and failed
    /// statements come back as a failure envelope carrying the submitted text.
    pub async fn query(&self, input: QueryInput) -> DbResult<Outcome<QueryOutput>> {
        input.validate()?;

        let statement = match guard::classify(&input.sql) {
            Classification::Forbidden(kind) => {
                let rejection = DbError::GuardRejection { kind };
                warn!(error = %rejection, sql = %input.sql, "Rejected dangerous statement");
                return Ok(Outcome::Failure(
                    Failure::from(&rejection).with_sql(&input.sql),
                ));
            }
            Classification::RequiresRewrite => guard::apply_row_limit(&input.sql, input.limit),
            Classification::Safe => input.sql.clone(),
        };

        match self.runner.run_query(&statement, &input.params).await {
            Ok(result) => {
                info!(
                    row_count = result.row_count,
                    rows = result.rows.len(),
                    "Query executed"
                );
                Ok(Outcome::Success(QueryOutput {
                    row_count: result.row_count,
                    rows: result.rows,
                    fields: result.fields,
                }))
            }
            Err(e) => {
                warn!(error = %e, sql = %input.sql, "Query failed");
                Ok(Outcome::Failure(Failure::from(&e).with_sql(&input.sql)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_input_deserialization() {
        let json = r#"{
            "sql": "SELECT * FROM users WHERE id = $1",
            "params": [42]
        }"#;

        let input: QueryInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.sql, "SELECT * FROM users WHERE id = $1");
        assert_eq!(input.params, vec![QueryParam::Int(42)]);
        assert_eq!(input.limit, DEFAULT_ROW_LIMIT);
    }

    #[test]
    fn test_query_input_rejects_fractional_limit() {
        let json = r#"{ "sql": "SELECT 1", "limit": 5.5 }"#;
        assert!(serde_json::from_str::<QueryInput>(json).is_err());
    }

    #[test]
    fn test_validate_limit_bounds() {
        assert!(QueryInput::new("SELECT 1").with_limit(1).validate().is_ok());
        assert!(QueryInput::new("SELECT 1").with_limit(10000).validate().is_ok());
        assert!(QueryInput::new("SELECT 1").with_limit(0).validate().is_err());
        assert!(QueryInput::new("SELECT 1").with_limit(10001).validate().is_err());
    }

    #[test]
    fn test_validate_empty_sql() {
        for sql in ["", "   ", "\n\t"] {
            let err = QueryInput::new(sql).validate().unwrap_err();
            assert!(matches!(err, DbError::Validation { .. }), "{sql:?}");
        }
        assert!(QueryInput::new(" SELECT 1 ").validate().is_ok());
    }

    #[test]
    fn test_query_output_serialization() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), JsonValue::Number(1.into()));

        let outcome = Outcome::Success(QueryOutput {
            row_count: 1,
            rows: vec![row],
            fields: vec![FieldInfo::new("id", 23)],
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "rowCount": 1,
                "rows": [{ "id": 1 }],
                "fields": [{ "name": "id", "dataTypeID": 23 }]
            })
        );
    }
}
