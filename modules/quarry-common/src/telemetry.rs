//! Telemetry checkpoints emitted while a search runs.
//!
//! Every variant describes something the engine did: starting a logical
//! search, summarizing the configured sources, completing a page. Delivery
//! and durability belong to the sink; the engine only shapes and orders the
//! events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::LoadingStatus;

/// Destination for telemetry events. Injected as an optional collaborator;
/// absence means emission is a no-op, never an error.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// A structured telemetry event for one logical search operation.
///
/// The `correlation_id` is shared by every event of one search and changes
/// only when a new search starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A brand-new search began. Emitted exactly once per search, before
    /// any other event of the same correlation id.
    Search {
        correlation_id: Uuid,
        /// Raw query text. PII; see [`TelemetryEvent::pii_fields`].
        query: String,
        include_prerelease: bool,
    },

    /// Counts of the configured sources by feed kind. Emitted exactly once
    /// per search, after `Search` and before the first page event.
    SearchSourceSummary {
        correlation_id: Uuid,
        http_sources: u32,
        local_sources: u32,
    },

    /// One successfully completed page fetch.
    SearchPage {
        correlation_id: Uuid,
        /// 0-based, incrementing once per completed page of this search.
        page_index: u32,
        status: LoadingStatus,
        result_count: usize,
        /// Wall-clock duration of the whole fetch.
        elapsed_ms: u64,
        /// Time spent merging after the last source returned.
        merge_ms: u64,
        /// Per-source fetch durations, keyed by source key.
        source_elapsed_ms: HashMap<String, u64>,
    },
}

impl TelemetryEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TelemetryEvent::Search { .. } => "search",
            TelemetryEvent::SearchSourceSummary { .. } => "search_source_summary",
            TelemetryEvent::SearchPage { .. } => "search_page",
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        match self {
            TelemetryEvent::Search { correlation_id, .. }
            | TelemetryEvent::SearchSourceSummary { correlation_id, .. }
            | TelemetryEvent::SearchPage { correlation_id, .. } => *correlation_id,
        }
    }

    /// Property names whose values are sensitive and must be scrubbed or
    /// hashed before leaving the process.
    pub fn pii_fields(&self) -> &'static [&'static str] {
        match self {
            TelemetryEvent::Search { .. } => &["query"],
            _ => &[],
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("TelemetryEvent serialization should never fail")
    }

    /// Deserialize a telemetry event from a JSON payload.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }
}
