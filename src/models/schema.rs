//! Schema-related data models.
//!
//! This module defines the shapes returned by the introspection tools. Field
//! names on the wire follow the catalog column names for rows that come
//! straight from the catalog, and camelCase for derived objects.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaInfo {
    pub schema_name: String,
    pub schema_owner: Option<String>,
}

/// Row count of a table, or an explicit marker when counting failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RowCount {
    Counted(i64),
    /// Serialized as `null`
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub table_name: String,
    pub table_type: String,
    /// Present only when row counts were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<RowCount>,
}

impl TableInfo {
    pub fn new(table_name: impl Into<String>, table_type: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            table_type: table_type.into(),
            row_count: None,
        }
    }

    pub fn with_row_count(mut self, row_count: RowCount) -> Self {
        self.row_count = Some(row_count);
        self
    }
}

/// Schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared data type
    #[serde(rename = "type")]
    pub data_type: String,
    pub max_length: Option<i64>,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    #[serde(rename = "column_name")]
    pub column: String,
    #[serde(rename = "foreign_table_name")]
    pub foreign_table: String,
    #[serde(rename = "foreign_column_name")]
    pub foreign_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    #[serde(rename = "indexname")]
    pub name: String,
    /// `CREATE INDEX` statement as reported by pg_indexes
    #[serde(rename = "indexdef")]
    pub definition: String,
}

/// Merged description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub table: TableRef,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_count_serialization() {
        let counted = TableInfo::new("users", "BASE TABLE").with_row_count(RowCount::Counted(100));
        let unavailable =
            TableInfo::new("audit", "BASE TABLE").with_row_count(RowCount::Unavailable);
        let plain = TableInfo::new("posts", "BASE TABLE");

        assert_eq!(serde_json::to_value(&counted).unwrap()["row_count"], 100);
        assert_eq!(
            serde_json::to_value(&unavailable).unwrap()["row_count"],
            serde_json::Value::Null
        );
        assert!(serde_json::to_value(&plain).unwrap().get("row_count").is_none());
    }

    #[test]
    fn test_column_descriptor_serialization() {
        let column = ColumnDescriptor {
            name: "id".to_string(),
            data_type: "integer".to_string(),
            max_length: None,
            nullable: false,
            default_value: Some("nextval('users_id_seq'::regclass)".to_string()),
            is_primary_key: true,
        };
        assert_eq!(
            serde_json::to_value(&column).unwrap(),
            json!({
                "name": "id",
                "type": "integer",
                "maxLength": null,
                "nullable": false,
                "defaultValue": "nextval('users_id_seq'::regclass)",
                "isPrimaryKey": true
            })
        );
    }

    #[test]
    fn test_foreign_key_uses_catalog_names() {
        let fk = ForeignKey {
            column: "user_id".to_string(),
            foreign_table: "users".to_string(),
            foreign_column: "id".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&fk).unwrap(),
            json!({
                "column_name": "user_id",
                "foreign_table_name": "users",
                "foreign_column_name": "id"
            })
        );
    }
}
