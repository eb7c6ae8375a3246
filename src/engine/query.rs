use std::error::Error as StdError;

use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Row};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::model::{decode_timestamp, Edge, EdgeData, EdgeStatus};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Runs `sql` verbatim and maps each result row onto [`Edge`].
///
/// Columns are matched by name: recognised edge columns are decoded, others
/// are ignored, and edge fields without a column keep their defaults. No
/// statement inspection happens here; callers are responsible for only
/// forwarding statements from trusted sources.
pub(crate) fn run_query(conn: &Connection, sql: &str) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_ascii_lowercase)
        .collect();
    let mut rows = stmt.query([])?;
    let mut edges = Vec::new();
    while let Some(row) = rows.next()? {
        edges.push(edge_from_row(row, &columns)?);
    }
    Ok(edges)
}

fn edge_from_row(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Edge> {
    let mut edge = Edge::default();
    for (idx, column) in columns.iter().enumerate() {
        let value = row.get_ref(idx)?;
        match column.as_str() {
            "id" => edge.id = text_or_number(value),
            "name" => edge.name = text_or_number(value),
            "src_id" => edge.src_id = integer(idx, value)?.unwrap_or_default(),
            "dest_id" => edge.dest_id = integer(idx, value)?.unwrap_or_default(),
            "src_type" => edge.src_type = text_or_number(value),
            "dest_type" => edge.dest_type = text_or_number(value),
            "score" => edge.score = real(idx, value)?,
            "data" => edge.data = json_object(idx, value)?,
            "status" => {
                edge.status = match text_or_number(value) {
                    Some(raw) => Some(
                        raw.parse::<EdgeStatus>()
                            .map_err(|msg| conversion(idx, Type::Text, msg.into()))?,
                    ),
                    None => None,
                }
            }
            "updated" => {
                edge.updated = match text_or_number(value) {
                    Some(raw) => Some(
                        decode_timestamp(&raw)
                            .map_err(|err| conversion(idx, Type::Text, Box::new(err)))?,
                    ),
                    None => None,
                }
            }
            _ => {}
        }
    }
    Ok(edge)
}

fn conversion(idx: usize, ty: Type, err: BoxError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, err)
}

fn text_or_number(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn integer(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<Option<i64>> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(v) => Ok(Some(v)),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "integer".into(),
            other.data_type(),
        )),
    }
}

fn real(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<Option<f64>> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(v) => Ok(Some(v as f64)),
        ValueRef::Real(v) => Ok(Some(v)),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "real".into(),
            other.data_type(),
        )),
    }
}

fn json_object(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<Option<EdgeData>> {
    let bytes = match value {
        ValueRef::Null => return Ok(None),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes,
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                idx,
                "data".into(),
                other.data_type(),
            ))
        }
    };
    match serde_json::from_slice::<JsonValue>(bytes) {
        Ok(JsonValue::Object(map)) => Ok(Some(map)),
        Ok(JsonValue::Null) => Ok(None),
        Ok(_) => Err(conversion(idx, Type::Text, "data is not a JSON object".into())),
        Err(err) => Err(conversion(idx, Type::Text, Box::new(err))),
    }
}
