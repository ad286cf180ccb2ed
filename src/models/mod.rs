//! Data models for the PostgreSQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod outcome;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use outcome::{Failure, Outcome};
pub use query::{
    DEFAULT_ROW_LIMIT, FieldInfo, MAX_ROW_LIMIT, MIN_ROW_LIMIT, QueryParam, RawQueryResult,
};
pub use schema::{
    ColumnDescriptor, ForeignKey, IndexInfo, RowCount, SchemaInfo, TableDescriptor, TableInfo,
    TableRef,
};
