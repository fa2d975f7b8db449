use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::results::ResultSet;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns the rusqlite error if the column cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, rusqlite::Error> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Build a result set from a row-returning `SQLite` statement.
///
/// # Errors
/// Returns the rusqlite error if execution or value extraction fails.
pub fn build_result_set(
    stmt: &mut Statement,
    params: &[Value],
) -> Result<ResultSet, rusqlite::Error> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Run one statement on `conn`.
///
/// Row-returning statements produce rows; everything else reports the number of
/// changed rows. Raw SQL (`params == None`) may hold several statements, which
/// are run as a batch.
///
/// # Errors
/// Returns the rusqlite error from preparation or execution.
pub fn execute(
    conn: &rusqlite::Connection,
    sql: &str,
    params: Option<&[Value]>,
) -> Result<ResultSet, rusqlite::Error> {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(rusqlite::Error::MultipleStatement) if params.is_none() => {
            let before = conn.total_changes();
            conn.execute_batch(sql)?;
            let changed = conn.total_changes().saturating_sub(before);
            return Ok(ResultSet::affected(
                usize::try_from(changed).unwrap_or_default(),
            ));
        }
        Err(err) => return Err(err),
    };

    let params = params.unwrap_or_default();
    if stmt.column_count() > 0 {
        build_result_set(&mut stmt, params)
    } else {
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(ResultSet::affected(affected))
    }
}
