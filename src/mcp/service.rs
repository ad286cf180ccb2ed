//! MCP service implementation using rmcp.
//!
//! This module defines the PgService struct with the four database tools
//! exposed via the MCP protocol using the rmcp framework's macros. Every
//! tool answers with one text content item holding a pretty-printed JSON
//! envelope.

use crate::db::ConnectionManager;
use crate::models::Outcome;
use crate::tools::query::{QueryInput, QueryToolHandler};
use crate::tools::schema::{
    DescribeTableInput, ListSchemasInput, ListTablesInput, SchemaToolHandler,
};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;

/// Render an envelope as the tool's single text content item.
fn envelope<T: Serialize>(outcome: Outcome<T>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(outcome.to_pretty_json())])
}

#[derive(Clone)]
pub struct PgService {
    /// Shared connection for all database operations
    connection_manager: Arc<ConnectionManager>,
    /// Schema used when a tool call omits one
    default_schema: String,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl PgService {
    /// Create a new PgService instance.
    ///
    /// # Arguments
    ///
    /// * `connection_manager` - Shared connection manager for database operations
    /// * `default_schema` - Schema for `list_tables` and `describe_table` when none is given
    pub fn new(connection_manager: Arc<ConnectionManager>, default_schema: impl Into<String>) -> Self {
        Self {
            connection_manager,
            default_schema: default_schema.into(),
            tool_router: Self::tool_router(),
        }
    }

    fn schema_handler(&self) -> SchemaToolHandler<ConnectionManager> {
        SchemaToolHandler::new(self.connection_manager.clone(), self.default_schema.clone())
    }
}

#[tool_router]
impl PgService {
    #[tool(
        description = "Execute a SQL query against the PostgreSQL database. Returns the results as JSON. For SELECT queries, returns rows of data. For INSERT/UPDATE/DELETE, returns affected row count."
    )]
    async fn query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<CallToolResult, McpError> {
        let handler = QueryToolHandler::new(self.connection_manager.clone());
        let outcome = handler.query(input).await?;
        Ok(envelope(outcome))
    }

    #[tool(description = "List all schemas in the current database")]
    async fn list_schemas(
        &self,
        Parameters(input): Parameters<ListSchemasInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(envelope(self.schema_handler().list_schemas(input).await))
    }

    #[tool(description = "List all tables in a schema, optionally including row counts")]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(envelope(self.schema_handler().list_tables(input).await))
    }

    #[tool(
        description = "Get detailed information about a table including columns, data types, constraints, and indexes"
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self.schema_handler().describe_table(input).await?;
        Ok(envelope(outcome))
    }
}

#[tool_handler]
impl ServerHandler for PgService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                title: Some("PostgreSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "PostgreSQL tools for exploring and querying one database.\n\
                \n\
                ## Workflow\n\
                1. Call `list_schemas` to see the schemas in the database\n\
                2. Call `list_tables` to see the tables of a schema (default: `{schema}`)\n\
                3. Call `describe_table` for columns, keys and indexes\n\
                4. Call `query` to run SQL\n\
                \n\
                ## Query Safety\n\
                - Statements starting with DROP, TRUNCATE, ALTER or DELETE are rejected\n\
                - A SELECT without LIMIT or FETCH gets `LIMIT <limit>` appended (default 1000)\n\
                - Use `$1`, `$2`, ... placeholders with `params` for values\n\
                \n\
                Every tool returns a JSON object with a `success` flag.",
                schema = self.default_schema
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    fn create_test_service() -> PgService {
        let config = ConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            user: "postgres".to_string(),
            password: None,
        };
        PgService::new(Arc::new(ConnectionManager::new(&config)), "public")
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "pg-mcp-server");
        assert_eq!(info.server_info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("`public`"));
    }

    #[test]
    fn test_registers_exactly_four_tools() {
        let service = create_test_service();
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["describe_table", "list_schemas", "list_tables", "query"]
        );
    }

    #[test]
    fn test_query_tool_schema_advertises_limit() {
        let service = create_test_service();
        let tool = service
            .tool_router
            .list_all()
            .into_iter()
            .find(|tool| tool.name == "query")
            .unwrap();
        let schema = serde_json::Value::Object((*tool.input_schema).clone());
        let limit = &schema["properties"]["limit"];
        assert_eq!(limit["default"], 1000);
        assert_eq!(limit["maximum"], 10000);
        assert_eq!(limit["minimum"], 1);
    }
}
