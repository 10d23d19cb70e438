//! Opaque pagination cursors.
//!
//! A feed puts whatever it needs inside its tokens; callers only thread them
//! back unchanged. The aggregator composes per-source tokens into a single
//! composite payload without ever inspecting the per-source blobs.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Handle for resuming pagination from where a prior page left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken(serde_json::Value);

impl ContinuationToken {
    /// Wrap a feed-private payload into an opaque token.
    pub fn encode<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self(
            serde_json::to_value(payload).context("encoding continuation payload")?,
        ))
    }

    /// Recover the feed-private payload. Fails on tokens minted by a
    /// different feed or a different logical search.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone()).context("decoding continuation payload")
    }

    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Handle for re-querying the same logical page set for newly indexed items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken(serde_json::Value);

impl RefreshToken {
    pub fn encode<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self(
            serde_json::to_value(payload).context("encoding refresh payload")?,
        ))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone()).context("decoding refresh payload")
    }

    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// Per-source resumption state inside a composite cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cursor", rename_all = "snake_case")]
pub enum SourceCursor {
    /// The source returned a token; its blob is routed back verbatim.
    Continue(serde_json::Value),
    /// The source has no further pages and must not be re-queried.
    Exhausted,
}

/// The aggregator's own token payload: one entry per source key.
/// A key missing from the map is treated as exhausted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeCursor {
    pub sources: HashMap<String, SourceCursor>,
}
