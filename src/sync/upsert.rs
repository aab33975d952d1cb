use crate::models::Record;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::schema::TableSchema;
use rocket_db_pools::sqlx::{self, Sqlite, SqlitePool, query::Query, sqlite::SqliteArguments};
use serde_json::Value;

/// Apply one page of records to the object's local table.
///
/// The page is a unit: every row is written inside a single transaction and a
/// failure on any row rolls back the rest. Rows conflict on the identifier
/// column, so replaying a page leaves the row count unchanged.
pub async fn apply(pool: &SqlitePool, schema: &TableSchema, records: &[Record]) -> SyncResult<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    let upsert_error = |detail: String| SyncError::Upsert {
        table: schema.table.clone(),
        detail,
    };

    let mut tx = pool.begin().await?;

    for (index, record) in records.iter().enumerate() {
        match record.get(&schema.key) {
            Some(Value::String(id)) if !id.is_empty() => {}
            _ => {
                return Err(upsert_error(format!(
                    "record {index} has no usable '{}' value",
                    schema.key
                )));
            }
        }

        let mut query = sqlx::query(&schema.upsert);
        for value in schema.values(record) {
            query = bind_value(query, value);
        }

        query
            .execute(&mut *tx)
            .await
            .map_err(|e| upsert_error(format!("record {index}: {e}")))?;
    }

    tx.commit()
        .await
        .map_err(|e| upsert_error(format!("commit failed: {e}")))?;

    Ok(records.len())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                query.bind(int)
            } else {
                query.bind(number.as_f64())
            }
        }
        Value::String(text) => query.bind(text.clone()),
        // Compound values (addresses) are kept as their JSON text.
        compound @ (Value::Array(_) | Value::Object(_)) => query.bind(compound.to_string()),
    }
}
