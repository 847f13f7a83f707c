//! Capabilities a persisted payload has to provide for retry bookkeeping.

use serde::{Deserialize, Serialize};

/// Persisted payloads carry the number of the attempt they are on. The first
/// dispatch of a fresh payload is attempt `0`.
pub trait Attempt {
    fn attempt(&self) -> u32;

    /// Copy of the payload with the attempt counter replaced.
    fn with_attempt(&self, attempt: u32) -> Self
    where
        Self: Sized;
}

/// Ready-made persisted shape for payloads that do not track attempts
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempted<T> {
    pub payload: T,
    #[serde(default)]
    pub attempt: u32,
}

impl<T> Attempted<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            attempt: 0,
        }
    }
}

impl<T: Clone> Attempt for Attempted<T> {
    fn attempt(&self) -> u32 {
        self.attempt
    }

    fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            payload: self.payload.clone(),
            attempt,
        }
    }
}

impl<T> std::ops::Deref for Attempted<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.payload
    }
}
