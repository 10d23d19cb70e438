// Test mocks for the search engine.
//
// ScriptedFeed (SearchFeed) — serves a scripted page sequence with failure,
// delay, and hang switches, plus call-count assertion helpers. Used by the
// aggregator and loader tests: no network, no registry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use quarry_common::types::{
    FeedKind, LoadingStatus, PackageHit, PackageIdentity, SearchQuery, SourceCounts,
};

use crate::cursor::{ContinuationToken, RefreshToken};
use crate::feed::{FeedPage, SearchFeed};

// ---------------------------------------------------------------------------
// Item helpers
// ---------------------------------------------------------------------------

/// Create a minimal PackageHit for testing.
pub fn hit(name: &str, version: &str) -> PackageHit {
    PackageHit {
        identity: PackageIdentity::new(name, version),
        description: String::new(),
        authors: Vec::new(),
        icon_url: None,
        total_downloads: None,
        tags: Vec::new(),
        verified_namespace: false,
    }
}

/// Create a PackageHit whose namespace is verified-reserved on its source.
pub fn verified_hit(name: &str, version: &str) -> PackageHit {
    PackageHit {
        verified_namespace: true,
        ..hit(name, version)
    }
}

// ---------------------------------------------------------------------------
// ScriptedFeed
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct ScriptedCursor {
    next_page: usize,
}

#[derive(Serialize, Deserialize)]
struct ScriptedRefreshCursor {
    pages_served: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct CallCounts {
    search: u32,
    continue_paging: u32,
    refresh: u32,
}

/// Scripted in-memory feed. Builder pattern: `.page()`, `.newly_indexed()`,
/// `.failing_search()`, `.with_delay()`, `.hanging()`.
pub struct ScriptedFeed {
    key: String,
    kind: FeedKind,
    pages: Vec<Vec<PackageHit>>,
    newly_indexed: Vec<PackageHit>,
    fail_search: bool,
    fail_continue: bool,
    delay: Option<Duration>,
    hang: bool,
    hang_continue: bool,
    calls: Mutex<CallCounts>,
}

impl ScriptedFeed {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: FeedKind::Http,
            pages: Vec::new(),
            newly_indexed: Vec::new(),
            fail_search: false,
            fail_continue: false,
            delay: None,
            hang: false,
            hang_continue: false,
            calls: Mutex::new(CallCounts::default()),
        }
    }

    pub fn local(mut self) -> Self {
        self.kind = FeedKind::Local;
        self
    }

    /// Append one page to the script; pages are served in order.
    pub fn page(mut self, items: Vec<PackageHit>) -> Self {
        self.pages.push(items);
        self
    }

    /// Extra items served only by `refresh`, on top of every page already
    /// served: the "newly indexed since the last fetch" set.
    pub fn newly_indexed(mut self, items: Vec<PackageHit>) -> Self {
        self.newly_indexed = items;
        self
    }

    /// Make `search` return an error for every call.
    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Make `continue_paging` return an error for every call.
    pub fn failing_continue(mut self) -> Self {
        self.fail_continue = true;
        self
    }

    /// Sleep before answering any operation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block every operation until the cancellation token fires, then error.
    /// Models a source that never answers.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Like `hanging`, but only `continue_paging` blocks; the first page is
    /// served normally.
    pub fn hanging_continue(mut self) -> Self {
        self.hang_continue = true;
        self
    }

    // --- Assertion helpers ---

    pub fn search_calls(&self) -> u32 {
        self.calls.lock().unwrap().search
    }

    pub fn continue_calls(&self) -> u32 {
        self.calls.lock().unwrap().continue_paging
    }

    pub fn refresh_calls(&self) -> u32 {
        self.calls.lock().unwrap().refresh
    }

    // --- Internals ---

    async fn observe_switches(&self, cancel: &CancellationToken) -> Result<()> {
        if self.hang {
            cancel.cancelled().await;
            bail!("scripted feed cancelled while hanging");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn page_at(&self, index: usize) -> Result<FeedPage> {
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let has_more = index + 1 < self.pages.len();
        let status = if has_more {
            LoadingStatus::Ready
        } else {
            LoadingStatus::NoMoreItems
        };
        let continuation = if has_more {
            Some(ContinuationToken::encode(&ScriptedCursor {
                next_page: index + 1,
            })?)
        } else {
            None
        };
        let refresh = Some(RefreshToken::encode(&ScriptedRefreshCursor {
            pages_served: index + 1,
        })?);
        Ok(FeedPage {
            items,
            source_statuses: HashMap::from([(self.key.clone(), status)]),
            continuation,
            refresh,
            ..FeedPage::default()
        })
    }
}

#[async_trait]
impl SearchFeed for ScriptedFeed {
    fn source_key(&self) -> &str {
        &self.key
    }

    fn source_counts(&self) -> SourceCounts {
        SourceCounts::of(self.kind)
    }

    async fn search(&self, _query: &SearchQuery, cancel: &CancellationToken) -> Result<FeedPage> {
        self.calls.lock().unwrap().search += 1;
        self.observe_switches(cancel).await?;
        if self.fail_search {
            bail!("ScriptedFeed({}): search forced failure", self.key);
        }
        self.page_at(0)
    }

    async fn continue_paging(
        &self,
        token: &ContinuationToken,
        cancel: &CancellationToken,
    ) -> Result<FeedPage> {
        self.calls.lock().unwrap().continue_paging += 1;
        if self.hang_continue {
            cancel.cancelled().await;
            bail!("scripted feed cancelled while hanging");
        }
        self.observe_switches(cancel).await?;
        if self.fail_continue {
            bail!("ScriptedFeed({}): continue forced failure", self.key);
        }
        let cursor: ScriptedCursor = token.decode()?;
        self.page_at(cursor.next_page)
    }

    async fn refresh(&self, token: &RefreshToken, cancel: &CancellationToken) -> Result<FeedPage> {
        self.calls.lock().unwrap().refresh += 1;
        self.observe_switches(cancel).await?;
        let cursor: ScriptedRefreshCursor = token.decode()?;

        let mut items: Vec<PackageHit> = self
            .pages
            .iter()
            .take(cursor.pages_served)
            .flatten()
            .cloned()
            .collect();
        items.extend(self.newly_indexed.iter().cloned());

        let has_more = cursor.pages_served < self.pages.len();
        let status = if has_more {
            LoadingStatus::Ready
        } else {
            LoadingStatus::NoMoreItems
        };
        let continuation = if has_more {
            Some(ContinuationToken::encode(&ScriptedCursor {
                next_page: cursor.pages_served,
            })?)
        } else {
            None
        };
        Ok(FeedPage {
            items,
            source_statuses: HashMap::from([(self.key.clone(), status)]),
            continuation,
            refresh: Some(RefreshToken::encode(&ScriptedRefreshCursor {
                pages_served: cursor.pages_served,
            })?),
            ..FeedPage::default()
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedFeed self-tests
// ---------------------------------------------------------------------------
