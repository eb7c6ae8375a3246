use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use rustc_hash::FxHashMap;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{EdgeError, Result};
use crate::model::{encode_timestamp, Edge, EdgeStatus};
use crate::storage::batch::{placeholder_group, row_chunks, values_clause};
use crate::storage::schema::{EDGE_COLUMNS, MERGED_COLUMNS};
use crate::storage::EdgeTypeName;

/// Edges of one type, in request order.
pub(crate) struct Group<'a> {
    pub name: EdgeTypeName,
    pub edges: Vec<&'a Edge>,
}

/// Summary of a successful save or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Edge-type groups written, one statement batch each.
    pub groups: usize,
    /// Rows submitted across all groups.
    pub rows: usize,
}

/// Partitions edges by type, keeping the order in which each type first appears.
pub(crate) fn group_by_type<'a>(edges: &'a [Edge], names: Vec<EdgeTypeName>) -> Vec<Group<'a>> {
    let mut slots: FxHashMap<EdgeTypeName, usize> = FxHashMap::default();
    let mut groups: Vec<Group<'a>> = Vec::new();
    for (edge, name) in edges.iter().zip(names) {
        let slot = *slots.entry(name.clone()).or_insert_with(|| {
            groups.push(Group {
                name,
                edges: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].edges.push(edge);
    }
    groups
}

/// `INSERT ... ON CONFLICT` text for `rows` edges of type `name`.
///
/// On an id conflict every mutable column takes the incoming value only when
/// the stored `updated` is strictly older; all columns share that one
/// comparison so a row is replaced whole or not at all. A NULL on either side
/// compares as unknown and keeps the stored row.
pub(crate) fn upsert_sql(name: &EdgeTypeName, rows: usize) -> String {
    let table = name.quoted();
    let merges = MERGED_COLUMNS
        .iter()
        .map(|col| {
            format!(
                "{col} = CASE WHEN {table}.updated < excluded.updated \
                 THEN excluded.{col} ELSE {table}.{col} END"
            )
        })
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        "INSERT INTO {table} ({columns}) VALUES {values}\nON CONFLICT (id) DO UPDATE SET\n    {merges}",
        columns = EDGE_COLUMNS.join(", "),
        values = values_clause(rows, EDGE_COLUMNS.len()),
    )
}

/// Unconditional soft-delete text for `rows` ids of type `name`.
pub(crate) fn soft_delete_sql(name: &EdgeTypeName, rows: usize) -> String {
    format!(
        "UPDATE {} SET status = ?1, updated = ?2 WHERE id IN {}",
        name.quoted(),
        placeholder_group(3, rows)
    )
}

fn bind_row(edge: &Edge, out: &mut Vec<Value>) -> Result<()> {
    let data = match &edge.data {
        Some(map) => Value::Text(
            serde_json::to_string(map).map_err(|err| EdgeError::Decode(err.to_string()))?,
        ),
        None => Value::Null,
    };
    let updated = match edge.updated {
        Some(ts) => Value::Text(
            encode_timestamp(ts).map_err(|err| EdgeError::Decode(err.to_string()))?,
        ),
        None => Value::Null,
    };
    out.extend([
        Value::Text(edge.derived_id()),
        Value::Integer(edge.src_id),
        edge.src_type.clone().map_or(Value::Null, Value::Text),
        Value::Integer(edge.dest_id),
        edge.dest_type.clone().map_or(Value::Null, Value::Text),
        edge.score.map_or(Value::Null, Value::Real),
        data,
        Value::Text(edge.status.unwrap_or(EdgeStatus::Active).as_str().to_string()),
        updated,
    ]);
    Ok(())
}

/// Writes each group in its own transaction, in group order.
///
/// A failing group aborts the call; groups already committed stay committed.
pub(crate) fn save_groups(
    conn: &mut Connection,
    groups: &[Group<'_>],
    max_rows: usize,
) -> Result<WriteReport> {
    let mut report = WriteReport::default();
    for group in groups {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for chunk in row_chunks(&group.edges, max_rows) {
            let mut values = Vec::with_capacity(chunk.len() * EDGE_COLUMNS.len());
            for edge in chunk {
                bind_row(edge, &mut values)?;
            }
            let sql = upsert_sql(&group.name, chunk.len());
            tx.execute(&sql, params_from_iter(values.iter()))?;
        }
        tx.commit()?;
        debug!(edge_type = %group.name, rows = group.edges.len(), "saved edge group");
        report.groups += 1;
        report.rows += group.edges.len();
    }
    Ok(report)
}

/// Marks every listed id deleted, stamping `now` regardless of the stored `updated`.
pub(crate) fn delete_groups(
    conn: &mut Connection,
    groups: &[Group<'_>],
    max_rows: usize,
    now: OffsetDateTime,
) -> Result<WriteReport> {
    let stamp = encode_timestamp(now).map_err(|err| EdgeError::Decode(err.to_string()))?;
    let mut report = WriteReport::default();
    for group in groups {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut touched = 0;
        for chunk in row_chunks(&group.edges, max_rows) {
            let mut values = Vec::with_capacity(chunk.len() + 2);
            values.push(Value::Text(EdgeStatus::Deleted.as_str().to_string()));
            values.push(Value::Text(stamp.clone()));
            values.extend(chunk.iter().map(|edge| Value::Text(edge.derived_id())));
            let sql = soft_delete_sql(&group.name, chunk.len());
            touched += tx.execute(&sql, params_from_iter(values.iter()))?;
        }
        tx.commit()?;
        debug!(
            edge_type = %group.name,
            rows = group.edges.len(),
            touched,
            "soft-deleted edge group"
        );
        report.groups += 1;
        report.rows += group.edges.len();
    }
    Ok(report)
}
