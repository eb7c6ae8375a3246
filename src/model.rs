//! Edge records and the timestamp encoding used for last-write-wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Source/destination entity identifier. Zero means "unset".
pub type EntityId = i64;

/// The reserved "unset" entity id.
pub const NULL_ENTITY_ID: EntityId = 0;

/// Opaque JSON payload attached to an edge.
pub type EdgeData = Map<String, Value>;

/// Soft-delete flag of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    /// The edge is live.
    Active,
    /// The edge was soft-deleted.
    Deleted,
}

impl EdgeStatus {
    /// Stored column value.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeStatus::Active => "active",
            EdgeStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(EdgeStatus::Active),
            "deleted" => Ok(EdgeStatus::Deleted),
            other => Err(format!("unknown edge status '{other}'")),
        }
    }
}

/// A directed, typed relationship between two entities.
///
/// `id` is never trusted on input; it is always derived from
/// `(src_id, dest_id)` by [`Edge::derived_id`]. It is populated on rows read
/// back from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Row id as stored, `"{src_id}:{dest_id}"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Edge type; selects the table.
    #[serde(default)]
    pub name: Option<String>,
    /// Source entity.
    #[serde(default)]
    pub src_id: EntityId,
    /// Denormalized source kind label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_type: Option<String>,
    /// Destination entity.
    #[serde(default)]
    pub dest_id: EntityId,
    /// Denormalized destination kind label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_type: Option<String>,
    /// Ranking value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Arbitrary JSON payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
    /// Soft-delete flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EdgeStatus>,
    /// Last-write marker compared by the upsert merge.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated: Option<OffsetDateTime>,
}

impl Edge {
    /// Creates an edge of type `name` from `src_id` to `dest_id`.
    pub fn new(name: impl Into<String>, src_id: EntityId, dest_id: EntityId) -> Self {
        Self {
            name: Some(name.into()),
            src_id,
            dest_id,
            ..Self::default()
        }
    }

    /// Sets the ranking score.
    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Sets the last-write marker.
    pub fn updated(mut self, updated: OffsetDateTime) -> Self {
        self.updated = Some(updated);
        self
    }

    /// Sets the status flag.
    pub fn status(mut self, status: EdgeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the JSON payload.
    pub fn data(mut self, data: EdgeData) -> Self {
        self.data = Some(data);
        self
    }

    /// The storage id: directional, so `(1,2)` and `(2,1)` differ.
    pub fn derived_id(&self) -> String {
        edge_id(self.src_id, self.dest_id)
    }
}

/// Builds the row id for an edge from `src` to `dest`.
pub fn edge_id(src: EntityId, dest: EntityId) -> String {
    format!("{src}:{dest}")
}

const STORED_TIMESTAMP: &[time::format_description::FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

/// Earliest and latest years that keep the stored encoding fixed-width.
pub(crate) const MIN_STORED_YEAR: i32 = 0;
pub(crate) const MAX_STORED_YEAR: i32 = 9999;

/// Encodes a timestamp as fixed-width UTC text.
///
/// Text ordering of encoded values equals chronological ordering, which the
/// upsert merge relies on when it compares `updated` columns in SQL.
/// Precision is one microsecond: instants that differ only below that encode
/// identically, so the later of two such writes is treated as a tie and
/// loses to the stored row.
pub fn encode_timestamp(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(UtcOffset::UTC).format(STORED_TIMESTAMP)
}

/// Decodes a stored timestamp. RFC 3339 text written by other tools is accepted too.
pub fn decode_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match PrimitiveDateTime::parse(raw, STORED_TIMESTAMP) {
        Ok(value) => Ok(value.assume_utc()),
        Err(_) => OffsetDateTime::parse(raw, &Rfc3339),
    }
}

pub(crate) fn timestamp_in_range(ts: OffsetDateTime) -> bool {
    let year = ts.to_offset(UtcOffset::UTC).year();
    (MIN_STORED_YEAR..=MAX_STORED_YEAR).contains(&year)
}
