//! Statement execution on a single Postgres connection.
//!
//! Parameterless statements go through the simple query protocol, so text
//! submitted by a client may contain several statements. Parameterized
//! statements are prepared first so each value can be converted to the type
//! the server inferred for its placeholder, then bound positionally.

use crate::db::params::{BoundParam, resolve_params};
use crate::db::types::{RowToJson, columns_to_fields, decodes_binary};
use crate::error::{DbError, DbResult};
use crate::models::{FieldInfo, QueryParam, RawQueryResult};
use futures_util::TryStreamExt;
use sqlx::postgres::{PgColumn, PgConnection, PgTypeInfo};
use sqlx::{Column, Either, Executor, Statement, TypeInfo};
use tracing::debug;

/// Run one statement and collect every row it returns.
///
/// `row_count` is the sum of rows reported by the server's command tags,
/// which is the row count for SELECT and the affected count for writes.
pub async fn run_statement(
    conn: &mut PgConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<RawQueryResult> {
    let param_types: Vec<&str> = params.iter().map(QueryParam::type_name).collect();
    debug!(sql = %sql, params = ?param_types, "Running statement");

    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut row_count: u64 = 0;

    let (bound, described) = if params.is_empty() {
        (Vec::new(), None)
    } else {
        let (bound, columns) = prepare_bound(conn, sql, params).await?;
        (bound, Some(columns))
    };

    {
        let mut stream = if params.is_empty() {
            (&mut *conn).fetch_many(sql)
        } else {
            let mut query = sqlx::query(sql);
            for value in bound {
                query = query.bind(value);
            }
            (&mut *conn).fetch_many(query)
        };

        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => row_count += done.rows_affected(),
                Either::Right(row) => {
                    if fields.is_empty() {
                        fields = row.field_infos();
                    }
                    rows.push(row.to_json_map()?);
                }
            }
        }
    }

    if rows.is_empty() {
        fields = match described {
            Some(columns) => columns,
            None => describe_fields(conn, sql).await,
        };
    }

    Ok(RawQueryResult {
        rows,
        row_count,
        fields,
    })
}

/// Prepare the statement, convert the parameters to the inferred types and
/// make sure every result column can be read back in binary format.
async fn prepare_bound(
    conn: &mut PgConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<(Vec<BoundParam>, Vec<FieldInfo>)> {
    let statement = (&mut *conn).prepare(sql).await?;

    let types: Vec<PgTypeInfo> = match statement.parameters() {
        Some(Either::Left(types)) => types.to_vec(),
        _ => Vec::new(),
    };
    check_result_columns(statement.columns())?;

    let bound = resolve_params(params, &types)?;
    Ok((bound, columns_to_fields(statement.columns())))
}

/// Refuse, before anything runs, result columns that would come back in a
/// binary format no decoder understands.
fn check_result_columns(columns: &[PgColumn]) -> DbResult<()> {
    match columns.iter().find(|col| !decodes_binary(col.type_info())) {
        Some(col) => Err(DbError::execution(
            format!(
                "column \"{}\" has type {}, which cannot be returned from a parameterized \
                 statement; cast it to text, e.g. {}::text",
                col.name(),
                col.type_info().name().to_lowercase(),
                col.name()
            ),
            None,
        )),
        None => Ok(()),
    }
}

/// Column descriptors of a statement that produced no rows.
///
/// Best effort: statements that cannot be prepared (several statements in
/// one text, utility commands) simply report no fields.
async fn describe_fields(conn: &mut PgConnection, sql: &str) -> Vec<FieldInfo> {
    match (&mut *conn).prepare(sql).await {
        Ok(statement) => columns_to_fields(statement.columns()),
        Err(e) => {
            debug!(error = %e, "Could not describe statement columns");
            Vec::new()
        }
    }
}
