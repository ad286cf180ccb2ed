//! Shared helpers for integration tests.

#![allow(dead_code)]

use pg_mcp_server::db::QueryRunner;
use pg_mcp_server::error::{DbError, DbResult};
use pg_mcp_server::models::{FieldInfo, QueryParam, RawQueryResult};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Runner that replays queued responses and records every statement.
///
/// When the queue is empty it answers with an empty result.
#[derive(Default)]
pub struct RecordingRunner {
    responses: Mutex<VecDeque<DbResult<RawQueryResult>>>,
    calls: Mutex<Vec<(String, Vec<QueryParam>)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: DbResult<RawQueryResult>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn respond_rows(self, rows: JsonValue) -> Self {
        self.respond(Ok(result_from(rows)))
    }

    pub fn respond_error(self, message: &str) -> Self {
        self.respond(Err(DbError::execution(message, None)))
    }

    pub fn calls(&self) -> Vec<(String, Vec<QueryParam>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|(sql, _)| sql).collect()
    }
}

impl QueryRunner for RecordingRunner {
    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> DbResult<RawQueryResult> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawQueryResult::default()))
    }
}

/// Build a result from a JSON array of row objects.
pub fn result_from(rows: JsonValue) -> RawQueryResult {
    let rows: Vec<_> = rows
        .as_array()
        .expect("rows must be an array")
        .iter()
        .map(|row| row.as_object().expect("row must be an object").clone())
        .collect();
    let fields = rows
        .first()
        .map(|row| row.keys().map(|name| FieldInfo::new(name, 25)).collect())
        .unwrap_or_default();
    RawQueryResult::from_rows(rows).with_fields(fields)
}

/// Serialize an envelope to a JSON value.
pub fn to_json<T: serde::Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).expect("envelope must serialize")
}
