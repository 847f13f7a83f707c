use serde::{de::DeserializeOwned, Serialize};

use crate::QueueError;

/// Encoding used by file-backed storage for a checkpointed backlog.
pub trait PayloadSerializer: Send + Sync {
    fn serialize_payloads<P>(payloads: &[P]) -> Result<Vec<u8>, QueueError>
    where
        P: Serialize;

    fn deserialize_payloads<P>(data: &[u8]) -> Result<Vec<P>, QueueError>
    where
        P: DeserializeOwned;
}

/// Pretty-printed JSON array. An empty file decodes to an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn serialize_payloads<P>(payloads: &[P]) -> Result<Vec<u8>, QueueError>
    where
        P: Serialize,
    {
        serde_json::to_vec_pretty(payloads)
            .map_err(|e| QueueError::Serialization(e.to_string()))
    }

    fn deserialize_payloads<P>(data: &[u8]) -> Result<Vec<P>, QueueError>
    where
        P: DeserializeOwned,
    {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(data)
            .map_err(|e| QueueError::Deserialization(e.to_string()))
    }
}
