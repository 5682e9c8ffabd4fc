//! Envelope and payload types for one host call exchange

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identity of one envelope; replies point back at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg({})", self.0)
    }
}

/// Payload layout revision.
///
/// A reader accepts any revision with its own major number; minor bumps
/// only add optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible_with(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Errors when flattening or rebuilding an envelope frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,

    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One request or reply crossing the boundary.
///
/// `action` names the call family; the typed call lives, serialized, in
/// `payload` so that transports never depend on call types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub action: String,
    pub schema_version: SchemaVersion,
    /// Set on replies only.
    pub correlation_id: Option<MessageId>,
    pub payload: MessagePayload,
}

impl MessageEnvelope {
    pub fn new(
        action: impl Into<String>,
        schema_version: SchemaVersion,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: MessageId::new(),
            action: action.into(),
            schema_version,
            correlation_id: None,
            payload,
        }
    }

    /// Marks this envelope as the reply to `request`.
    pub fn with_correlation(mut self, request: MessageId) -> Self {
        self.correlation_id = Some(request);
        self
    }

    /// Flattens the envelope into the bytes a transport moves.
    pub fn to_frame(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Rebuilds an envelope from a frame produced by [`Self::to_frame`].
    pub fn from_frame(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.is_empty() {
            return Err(FrameError::Empty);
        }
        Ok(serde_json::from_slice(frame)?)
    }
}

/// Serialized call or reply body (JSON, which is what the host parses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload(Vec<u8>);

impl MessagePayload {
    pub fn new<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self)
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Chdir {
        path: Vec<u8>,
    }

    fn chdir(path: &[u8]) -> MessagePayload {
        MessagePayload::new(&Chdir {
            path: path.to_vec(),
        })
        .unwrap()
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn minor_revisions_interoperate() {
        let base = SchemaVersion::new(1, 0);
        assert!(base.is_compatible_with(&SchemaVersion::new(1, 4)));
        assert!(!base.is_compatible_with(&SchemaVersion::new(2, 0)));
        assert_eq!(SchemaVersion::new(1, 4).to_string(), "v1.4");
    }

    #[test]
    fn payload_keeps_non_utf8_paths() {
        let payload = chdir(&[b'/', 0xff, b'x']);
        let back: Chdir = payload.deserialize().unwrap();
        assert_eq!(back.path, vec![b'/', 0xff, b'x']);
        assert!(!payload.is_empty());
    }

    #[test]
    fn reply_points_at_request() {
        let request = MessageEnvelope::new("host_call", SchemaVersion::new(1, 0), chdir(b"/tmp"));
        let reply = MessageEnvelope::new("host_call_reply", SchemaVersion::new(1, 0), chdir(b""))
            .with_correlation(request.id);

        assert_eq!(request.correlation_id, None);
        assert_eq!(reply.correlation_id, Some(request.id));
    }

    #[test]
    fn frame_rebuilds_same_envelope() {
        let envelope = MessageEnvelope::new("host_call", SchemaVersion::new(1, 0), chdir(b"/tmp"));
        let rebuilt = MessageEnvelope::from_frame(&envelope.to_frame().unwrap()).unwrap();

        assert_eq!(rebuilt.id, envelope.id);
        assert_eq!(rebuilt.action, "host_call");
        assert_eq!(rebuilt.payload, envelope.payload);
    }

    #[test]
    fn bad_frames_rejected() {
        assert!(matches!(
            MessageEnvelope::from_frame(&[]),
            Err(FrameError::Empty)
        ));
        assert!(matches!(
            MessageEnvelope::from_frame(b"{not json"),
            Err(FrameError::Malformed(_))
        ));
    }
}
