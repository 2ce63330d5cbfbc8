//! Client event envelope
//!
//! Wire format: `{"event": "client_created" | "client_updated" | "client_deleted", "data": <snapshot>}`.
//! Decoding is the only place untyped JSON is inspected; everything past the
//! boundary works with the closed [`ClientEvent`] variant.

use crate::{
    ClientId, ClientRecord, EventError, EVENT_CLIENT_CREATED, EVENT_CLIENT_DELETED,
    EVENT_CLIENT_UPDATED,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three state changes a client can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientEventKind {
    Created,
    Updated,
    Deleted,
}

impl ClientEventKind {
    /// Name used in the `event` field of the envelope.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ClientEventKind::Created => EVENT_CLIENT_CREATED,
            ClientEventKind::Updated => EVENT_CLIENT_UPDATED,
            ClientEventKind::Deleted => EVENT_CLIENT_DELETED,
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            EVENT_CLIENT_CREATED => Some(ClientEventKind::Created),
            EVENT_CLIENT_UPDATED => Some(ClientEventKind::Updated),
            EVENT_CLIENT_DELETED => Some(ClientEventKind::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for ClientEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A decoded client event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Created(ClientRecord),
    Updated(ClientRecord),
    Deleted(ClientRecord),
    /// Well-formed envelope with an event name this build does not know.
    Unknown { event: String },
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    event: &'static str,
    data: &'a ClientRecord,
}

#[derive(Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl ClientEvent {
    pub fn new(kind: ClientEventKind, snapshot: ClientRecord) -> Self {
        match kind {
            ClientEventKind::Created => ClientEvent::Created(snapshot),
            ClientEventKind::Updated => ClientEvent::Updated(snapshot),
            ClientEventKind::Deleted => ClientEvent::Deleted(snapshot),
        }
    }

    pub fn kind(&self) -> Option<ClientEventKind> {
        match self {
            ClientEvent::Created(_) => Some(ClientEventKind::Created),
            ClientEvent::Updated(_) => Some(ClientEventKind::Updated),
            ClientEvent::Deleted(_) => Some(ClientEventKind::Deleted),
            ClientEvent::Unknown { .. } => None,
        }
    }

    /// Event name as it appears on the wire.
    pub fn event_type(&self) -> &str {
        match self {
            ClientEvent::Unknown { event } => event,
            other => other.kind().map(|k| k.wire_name()).unwrap_or_default(),
        }
    }

    pub fn snapshot(&self) -> Option<&ClientRecord> {
        match self {
            ClientEvent::Created(record)
            | ClientEvent::Updated(record)
            | ClientEvent::Deleted(record) => Some(record),
            ClientEvent::Unknown { .. } => None,
        }
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.snapshot().map(|record| record.id)
    }

    /// Serialize into the wire envelope.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        let (Some(kind), Some(data)) = (self.kind(), self.snapshot()) else {
            return Err(EventError::NotEncodable {
                event: self.event_type().to_string(),
            });
        };
        serde_json::to_vec(&OutboundEnvelope {
            event: kind.wire_name(),
            data,
        })
        .map_err(|e| EventError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Decode and validate a wire envelope.
    ///
    /// Created and Updated must carry a full snapshot (non-zero id, name and
    /// email). Deleted only needs the id. Unrecognized event names decode to
    /// [`ClientEvent::Unknown`] rather than failing.
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        let envelope: InboundEnvelope =
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed {
                reason: e.to_string(),
            })?;

        let Some(kind) = ClientEventKind::from_wire_name(&envelope.event) else {
            return Ok(ClientEvent::Unknown {
                event: envelope.event,
            });
        };

        let data = envelope.data.ok_or_else(|| EventError::Malformed {
            reason: format!("{} envelope has no data", kind),
        })?;
        let snapshot: ClientRecord =
            serde_json::from_value(data).map_err(|e| EventError::Malformed {
                reason: format!("{} snapshot: {}", kind, e),
            })?;

        if snapshot.id == 0 {
            return Err(EventError::Malformed {
                reason: format!("{} snapshot has no id", kind),
            });
        }
        if kind != ClientEventKind::Deleted
            && (snapshot.full_name.is_empty() || snapshot.email.is_empty())
        {
            return Err(EventError::Malformed {
                reason: format!("{} snapshot for id {} is incomplete", kind, snapshot.id),
            });
        }

        Ok(ClientEvent::new(kind, snapshot))
    }
}

// =============================================================================
// TESTS
// =============================================================================
