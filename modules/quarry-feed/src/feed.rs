// Trait abstraction for package search sources.
//
// SearchFeed is the sole network-facing seam: concrete transports (registry
// HTTP APIs, local folders) live behind it, and MultiSourceFeed implements
// the same trait so an aggregate is substitutable wherever a single feed is
// expected.
//
// This enables deterministic testing with ScriptedFeed: no network, no
// registry. `cargo test` in seconds.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use quarry_common::types::{LoadingStatus, PackageHit, SearchQuery, SourceCounts};

use crate::cursor::{ContinuationToken, RefreshToken};

/// One batch of results from one fetch step.
///
/// `source_statuses` must contain an entry for every source that contributed
/// to (or failed during) this step, keyed by source key. `continuation` is
/// present iff more pages may exist; `refresh` is present iff the same
/// logical page set can later be re-polled for newly indexed packages.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub items: Vec<PackageHit>,
    pub source_statuses: HashMap<String, LoadingStatus>,
    pub continuation: Option<ContinuationToken>,
    pub refresh: Option<RefreshToken>,
    pub diagnostics: PageDiagnostics,
}

impl FeedPage {
    /// An empty page carrying a single source status and nothing else.
    pub fn status_only(source_key: &str, status: LoadingStatus) -> Self {
        Self {
            source_statuses: HashMap::from([(source_key.to_string(), status)]),
            ..Self::default()
        }
    }
}

/// Timing observations gathered while producing a page, consumed by the
/// loader's page telemetry.
#[derive(Debug, Clone, Default)]
pub struct PageDiagnostics {
    /// Fetch duration per source key.
    pub source_elapsed: HashMap<String, Duration>,
    /// Time spent merging and reducing after the last source returned.
    pub merge_elapsed: Duration,
}

/// A queryable source of package search results.
///
/// All three operations are cancellable through the shared token; sources
/// are expected to observe it promptly but are never forcibly terminated.
/// Errors crossing this boundary are absorbed by the caller and recorded as
/// that source's `ErrorOccurred` status; they never fail a whole page on
/// their own.
#[async_trait]
pub trait SearchFeed: Send + Sync {
    /// Identity used in status maps and telemetry breakdowns.
    fn source_key(&self) -> &str;

    /// Counts of underlying sources by transport kind, for source-summary
    /// telemetry. A leaf feed reports itself; an aggregate sums its sources.
    fn source_counts(&self) -> SourceCounts;

    /// Start a new logical search. Must not consult prior continuation state.
    async fn search(&self, query: &SearchQuery, cancel: &CancellationToken) -> Result<FeedPage>;

    /// Resume pagination from a token previously returned by this same feed.
    async fn continue_paging(
        &self,
        token: &ContinuationToken,
        cancel: &CancellationToken,
    ) -> Result<FeedPage>;

    /// Re-query the same logical search for a superset of prior results,
    /// picking up newly indexed packages without restarting pagination.
    async fn refresh(&self, token: &RefreshToken, cancel: &CancellationToken) -> Result<FeedPage>;
}
