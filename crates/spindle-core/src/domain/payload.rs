//! Payload encoding for the `data` column.
//!
//! Payloads are stored as JSON. Any `Serialize + DeserializeOwned` type can
//! ride in a job; `FilePayload` is the one the worker binary uses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Payload of an uploaded-file job: the stored file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub filename: String,
}

impl FilePayload {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

pub fn encode<P: Serialize>(payload: &P) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(payload)
}

pub fn decode<P: DeserializeOwned>(data: &serde_json::Value) -> Result<P, serde_json::Error> {
    P::deserialize(data)
}
