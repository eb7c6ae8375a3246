use serde::Deserialize;
use time::OffsetDateTime;

use crate::model::Edge;

/// Operation carried by a relay message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayAction {
    /// Equivalent to `POST /v1/edges/save`.
    Save,
    /// Equivalent to `POST /v1/edges/delete`.
    Delete,
}

impl RelayAction {
    /// Parses the action path used on the wire.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim_end_matches('/') {
            "/edges/save" => Some(RelayAction::Save),
            "/edges/delete" => Some(RelayAction::Delete),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            RelayAction::Save => "/edges/save",
            RelayAction::Delete => "/edges/delete",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    payload: Option<Vec<Edge>>,
    #[serde(default)]
    edges: Option<Vec<Edge>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    timestamp: Option<OffsetDateTime>,
}

/// A decoded relay message.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    /// Operation to apply.
    pub action: RelayAction,
    /// Edges to apply it to.
    pub edges: Vec<Edge>,
    /// Publisher-side time; fallback `updated` for edges that carry none.
    pub timestamp: Option<OffsetDateTime>,
}

impl RelayMessage {
    /// Decodes a message body. Errors describe why the message can never succeed.
    ///
    /// `payload` is the edge list; `edges` is honoured when `payload` is absent.
    pub fn decode(data: &[u8]) -> Result<Self, String> {
        let raw: RawMessage = serde_json::from_slice(data)
            .map_err(|err| format!("could not parse relay message: {err}"))?;
        let action_name = raw.action.unwrap_or_default();
        let action = RelayAction::parse(&action_name)
            .ok_or_else(|| format!("unknown relay action '{action_name}'"))?;
        let edges = raw
            .payload
            .or(raw.edges)
            .ok_or_else(|| "no edges in payload".to_string())?;
        Ok(Self {
            action,
            edges,
            timestamp: raw.timestamp,
        })
    }
}
