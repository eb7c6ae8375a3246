use time::OffsetDateTime;

use crate::error::{EdgeError, Result, Violation};
use crate::model::{timestamp_in_range, Edge, EdgeStatus, NULL_ENTITY_ID};
use crate::storage::EdgeTypeName;

/// Checks a write batch before anything touches storage.
///
/// Returns the parsed type name of every edge, in input order. The first
/// offending edge aborts validation and is reported with its JSON path.
pub fn validate_edges(edges: &[Edge]) -> Result<Vec<EdgeTypeName>> {
    if edges.is_empty() {
        return Err(EdgeError::invalid(
            "There has to be at least one edge in the request",
            "edges",
        ));
    }
    edges
        .iter()
        .enumerate()
        .map(|(idx, edge)| validate_edge(idx, edge))
        .collect()
}

fn validate_edge(idx: usize, edge: &Edge) -> Result<EdgeTypeName> {
    let name = match edge.name.as_deref() {
        None | Some("") => {
            return Err(EdgeError::invalid(
                format!("Edge at {idx} does not have `name`"),
                format!("edges.{idx}.name"),
            ))
        }
        Some(raw) => EdgeTypeName::parse(raw)
            .map_err(|reason| EdgeError::invalid(reason, format!("edges.{idx}.name")))?,
    };

    let mut missing = Vec::new();
    if edge.src_id == NULL_ENTITY_ID {
        missing.push(format!("edges.{idx}.src_id"));
    }
    if edge.dest_id == NULL_ENTITY_ID {
        missing.push(format!("edges.{idx}.dest_id"));
    }
    if !missing.is_empty() {
        return Err(EdgeError::Validation(Violation {
            message: format!("Edge at {idx} does not have `src_id` and `dest_id`"),
            fields: missing,
        }));
    }

    if let Some(updated) = edge.updated {
        if !timestamp_in_range(updated) {
            return Err(EdgeError::invalid(
                format!("Edge at {idx} has an `updated` outside years 0000-9999"),
                format!("edges.{idx}.updated"),
            ));
        }
    }
    Ok(name)
}

/// Applies the defaults both ingress adapters share.
///
/// Missing `status` becomes active and missing `updated` becomes `fallback`.
/// Caller-supplied ids are discarded; storage derives them.
pub fn normalize_edges(edges: &mut [Edge], fallback: OffsetDateTime) {
    for edge in edges {
        edge.id = None;
        edge.status.get_or_insert(EdgeStatus::Active);
        edge.updated.get_or_insert(fallback);
    }
}
