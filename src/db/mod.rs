//! Database access layer.
//!
//! - Connection lifecycle and the `QueryRunner` seam
//! - Statement execution and parameter binding
//! - Catalog queries
//! - Row to JSON conversion

pub mod connection;
pub mod executor;
pub mod params;
pub mod schema;
pub mod types;

pub use connection::{ConnectionManager, QueryRunner};
