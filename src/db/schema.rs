//! Catalog queries and their row mapping.
//!
//! # Architecture
//!
//! SQL is kept in the `queries` submodule as constants. Statements are run by
//! the introspection tools through a `QueryRunner`; the functions here only
//! build statement text and turn `RawQueryResult` rows into models.

use crate::models::{
    ColumnDescriptor, ForeignKey, IndexInfo, RawQueryResult, SchemaInfo, TableInfo,
};

// =============================================================================
// SQL Query Templates
// =============================================================================

pub mod queries {
    pub const LIST_SCHEMAS: &str =
        "SELECT schema_name::text AS schema_name, schema_owner::text AS schema_owner FROM information_schema.schemata";

    pub const EXCLUDE_SYSTEM_SCHEMAS: &str = " WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast') AND schema_name NOT LIKE 'pg_%'";

    pub const ORDER_BY_SCHEMA_NAME: &str = " ORDER BY schema_name";

    pub const LIST_TABLES: &str = r#"
        SELECT table_name::text AS table_name, table_type::text AS table_type
        FROM information_schema.tables
        WHERE table_schema = $1
        AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            character_maximum_length::int AS character_maximum_length,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default,
            ordinal_position::int AS ordinal_position
        FROM information_schema.columns
        WHERE table_schema = $1
        AND table_name = $2
        ORDER BY ordinal_position
        "#;

    pub const DESCRIBE_PRIMARY_KEYS: &str = r#"
        SELECT a.attname::text AS column_name
        FROM pg_index i
        JOIN pg_attribute a
            ON a.attrelid = i.indrelid
            AND a.attnum = ANY(i.indkey)
        WHERE i.indrelid = $1::regclass
        AND i.indisprimary
        "#;

    pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
        SELECT
            kcu.column_name::text AS column_name,
            ccu.table_name::text AS foreign_table_name,
            ccu.column_name::text AS foreign_column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
        "#;

    pub const DESCRIBE_INDEXES: &str = r#"
        SELECT indexname::text AS indexname, indexdef
        FROM pg_indexes
        WHERE schemaname = $1
        AND tablename = $2
        "#;
}

/// Schema listing statement, with or without the system-schema filter.
pub fn list_schemas_sql(include_system_schemas: bool) -> String {
    let mut sql = String::from(queries::LIST_SCHEMAS);
    if !include_system_schemas {
        sql.push_str(queries::EXCLUDE_SYSTEM_SCHEMAS);
    }
    sql.push_str(queries::ORDER_BY_SCHEMA_NAME);
    sql
}

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`, each part quoted.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Exact row count statement for one table.
pub fn count_rows_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) AS count FROM {}",
        qualified_name(schema, table)
    )
}

// =============================================================================
// Row Mapping
// =============================================================================

pub fn parse_schemas(result: &RawQueryResult) -> Vec<SchemaInfo> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(SchemaInfo {
                schema_name: RawQueryResult::text(row, "schema_name")?,
                schema_owner: RawQueryResult::text(row, "schema_owner"),
            })
        })
        .collect()
}

pub fn parse_tables(result: &RawQueryResult) -> Vec<TableInfo> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let name = RawQueryResult::text(row, "table_name")?;
            let table_type = RawQueryResult::text(row, "table_type").unwrap_or_default();
            Some(TableInfo::new(name, table_type))
        })
        .collect()
}

/// Count from a `count_rows_sql` result.
pub fn parse_count(result: &RawQueryResult) -> Option<i64> {
    result
        .rows
        .first()
        .and_then(|row| RawQueryResult::integer(row, "count"))
}

/// Column names from a primary key query.
pub fn parse_primary_keys(result: &RawQueryResult) -> Vec<String> {
    result
        .rows
        .iter()
        .filter_map(|row| RawQueryResult::text(row, "column_name"))
        .collect()
}

/// Columns in ordinal order, flagged against the primary key set.
pub fn parse_columns(result: &RawQueryResult, primary_keys: &[String]) -> Vec<ColumnDescriptor> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let name = RawQueryResult::text(row, "column_name")?;
            let is_primary_key = primary_keys.contains(&name);
            Some(ColumnDescriptor {
                data_type: RawQueryResult::text(row, "data_type").unwrap_or_default(),
                max_length: RawQueryResult::integer(row, "character_maximum_length"),
                nullable: RawQueryResult::text(row, "is_nullable").as_deref() == Some("YES"),
                default_value: RawQueryResult::text(row, "column_default"),
                is_primary_key,
                name,
            })
        })
        .collect()
}

pub fn parse_foreign_keys(result: &RawQueryResult) -> Vec<ForeignKey> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(ForeignKey {
                column: RawQueryResult::text(row, "column_name")?,
                foreign_table: RawQueryResult::text(row, "foreign_table_name")?,
                foreign_column: RawQueryResult::text(row, "foreign_column_name")?,
            })
        })
        .collect()
}

pub fn parse_indexes(result: &RawQueryResult) -> Vec<IndexInfo> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(IndexInfo {
                name: RawQueryResult::text(row, "indexname")?,
                definition: RawQueryResult::text(row, "indexdef").unwrap_or_default(),
            })
        })
        .collect()
}
