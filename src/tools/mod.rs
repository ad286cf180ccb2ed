//! MCP tool implementations.
//!
//! - `query`: Execute a statement through the query guard
//! - `list_schemas`: List schemas in the current database
//! - `list_tables`: List base tables in a schema
//! - `describe_table`: Columns, keys and indexes of a table
//! - `guard`: Statement classification and row limit rewrite

pub mod guard;
pub mod query;
pub mod schema;

pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use schema::{
    DescribeTableInput, ListSchemasInput, ListSchemasOutput, ListTablesInput, ListTablesOutput,
    SchemaToolHandler,
};
