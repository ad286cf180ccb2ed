//! Schema introspection tools.
//!
//! This module implements the `list_schemas`, `list_tables` and
//! `describe_table` MCP tools. Catalog failures come back as a failure
//! envelope without `sql`.

use crate::db::QueryRunner;
use crate::db::schema::{self, queries};
use crate::error::{DbError, DbResult};
use crate::models::{
    Outcome, QueryParam, RowCount, SchemaInfo, TableDescriptor, TableInfo, TableRef,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Input for the list_schemas tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListSchemasInput {
    /// Include system schemas (pg_catalog, information_schema, etc.)
    #[serde(default)]
    pub include_system_schemas: bool,
}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesInput {
    /// Schema name (default: public)
    #[serde(default)]
    pub schema: Option<String>,
    /// Include an exact COUNT(*) row count for each table
    #[serde(default)]
    pub include_row_count: bool,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DescribeTableInput {
    /// Name of the table to describe
    pub table_name: String,
    /// Schema name (default: public)
    #[serde(default)]
    pub schema: Option<String>,
}

impl DescribeTableInput {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.table_name.trim().is_empty() {
            return Err(DbError::validation("tableName must not be empty"));
        }
        Ok(())
    }
}

/// Success body of the list_schemas tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSchemasOutput {
    pub schemas: Vec<SchemaInfo>,
    pub count: usize,
}

/// Success body of the list_tables tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListTablesOutput {
    pub schema: String,
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

pub struct SchemaToolHandler<R> {
    runner: Arc<R>,
    default_schema: String,
}

impl<R: QueryRunner> SchemaToolHandler<R> {
    pub fn new(runner: Arc<R>, default_schema: impl Into<String>) -> Self {
        Self {
            runner,
            default_schema: default_schema.into(),
        }
    }

    fn resolve_schema(&self, schema: Option<String>) -> String {
        schema.unwrap_or_else(|| self.default_schema.clone())
    }

    pub async fn list_schemas(&self, input: ListSchemasInput) -> Outcome<ListSchemasOutput> {
        let sql = schema::list_schemas_sql(input.include_system_schemas);

        let result = self.runner.run_query(&sql, &[]).await.map(|result| {
            let schemas = schema::parse_schemas(&result);
            let count = schemas.len();
            ListSchemasOutput { schemas, count }
        });

        match &result {
            Ok(output) => info!(count = output.count, "Listed schemas"),
            Err(e) => warn!(error = %e, "Failed to list schemas"),
        }
        Outcome::from_result(result)
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> Outcome<ListTablesOutput> {
        let schema_name = self.resolve_schema(input.schema);
        let result = self
            .fetch_tables(&schema_name, input.include_row_count)
            .await
            .map(|tables| ListTablesOutput {
                count: tables.len(),
                schema: schema_name.clone(),
                tables,
            });

        match &result {
            Ok(output) => info!(schema = %schema_name, count = output.count, "Listed tables"),
            Err(e) => warn!(schema = %schema_name, error = %e, "Failed to list tables"),
        }
        Outcome::from_result(result)
    }

    async fn fetch_tables(
        &self,
        schema_name: &str,
        include_row_count: bool,
    ) -> DbResult<Vec<TableInfo>> {
        let params = [QueryParam::String(schema_name.to_string())];
        let result = self.runner.run_query(queries::LIST_TABLES, &params).await?;
        let tables = schema::parse_tables(&result);

        if !include_row_count {
            return Ok(tables);
        }

        let mut counted = Vec::with_capacity(tables.len());
        for table in tables {
            let row_count = self.count_rows(schema_name, &table.table_name).await;
            counted.push(table.with_row_count(row_count));
        }
        Ok(counted)
    }

    /// A failed count is recorded as unavailable and does not stop the listing.
    async fn count_rows(&self, schema_name: &str, table_name: &str) -> RowCount {
        let sql = schema::count_rows_sql(schema_name, table_name);
        match self.runner.run_query(&sql, &[]).await {
            Ok(result) => schema::parse_count(&result)
                .map(RowCount::Counted)
                .unwrap_or(RowCount::Unavailable),
            Err(e) => {
                warn!(table = %table_name, error = %e, "Failed to count rows");
                RowCount::Unavailable
            }
        }
    }

    pub async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> DbResult<Outcome<TableDescriptor>> {
        input.validate()?;

        let table = TableRef {
            schema: self.resolve_schema(input.schema),
            name: input.table_name,
        };
        let result = self.fetch_descriptor(table).await;

        if let Err(e) = &result {
            warn!(error = %e, "Failed to describe table");
        }
        Ok(Outcome::from_result(result))
    }

    async fn fetch_descriptor(&self, table: TableRef) -> DbResult<TableDescriptor> {
        let by_name = [
            QueryParam::String(table.schema.clone()),
            QueryParam::String(table.name.clone()),
        ];
        let relation = [QueryParam::String(schema::qualified_name(
            &table.schema,
            &table.name,
        ))];

        let columns = self
            .runner
            .run_query(queries::DESCRIBE_COLUMNS, &by_name)
            .await?;
        let primary_keys = self
            .runner
            .run_query(queries::DESCRIBE_PRIMARY_KEYS, &relation)
            .await?;
        let foreign_keys = self
            .runner
            .run_query(queries::DESCRIBE_FOREIGN_KEYS, &by_name)
            .await?;
        let indexes = self
            .runner
            .run_query(queries::DESCRIBE_INDEXES, &by_name)
            .await?;

        let primary_keys = schema::parse_primary_keys(&primary_keys);
        let columns = schema::parse_columns(&columns, &primary_keys);

        info!(
            schema = %table.schema,
            table = %table.name,
            columns = columns.len(),
            "Described table"
        );

        Ok(TableDescriptor {
            table,
            columns,
            primary_keys,
            foreign_keys: schema::parse_foreign_keys(&foreign_keys),
            indexes: schema::parse_indexes(&indexes),
        })
    }
}
