//! Multi-source fan-out.
//!
//! `MultiSourceFeed` implements the `SearchFeed` contract by driving every
//! configured source concurrently and reducing their independent pages to
//! one. Source priority is configuration order. A failed or cancelled source
//! contributes zero items and its own status; it never fails the aggregated
//! page on its own.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quarry_common::config::DEFAULT_FANOUT_CONCURRENCY;
use quarry_common::types::{LoadingStatus, PackageHit, SearchQuery, SourceCounts};
use quarry_common::Config;

use crate::cursor::{CompositeCursor, ContinuationToken, RefreshToken, SourceCursor};
use crate::feed::{FeedPage, PageDiagnostics, SearchFeed};
use crate::merge::merge_ranked;
use crate::status::reduce_statuses;

pub struct MultiSourceFeed {
    key: String,
    sources: Vec<Arc<dyn SearchFeed>>,
    concurrency: usize,
}

impl MultiSourceFeed {
    pub fn new(sources: Vec<Arc<dyn SearchFeed>>) -> Self {
        let key = format!(
            "aggregate({})",
            sources
                .iter()
                .map(|s| s.source_key())
                .collect::<Vec<_>>()
                .join(",")
        );
        Self {
            key,
            sources,
            concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }

    pub fn with_config(sources: Vec<Arc<dyn SearchFeed>>, config: &Config) -> Self {
        let mut feed = Self::new(sources);
        feed.concurrency = config.fanout_concurrency.max(1);
        feed
    }

    /// Drive one plan per source concurrently, joining on completion of all
    /// (or cancellation). Reports come back in priority order.
    async fn fan_out(
        &self,
        plans: Vec<SourcePlan>,
        cancel: &CancellationToken,
    ) -> Vec<SourceReport> {
        let futures: Vec<Pin<Box<dyn Future<Output = SourceReport> + Send>>> = self
            .sources
            .iter()
            .zip(plans)
            .map(|(source, plan)| {
                let source = source.clone();
                let cancel = cancel.clone();
                Box::pin(drive_source(source, plan, cancel))
                    as Pin<Box<dyn Future<Output = SourceReport> + Send>>
            })
            .collect();

        let mut by_key: HashMap<String, SourceReport> = stream::iter(futures)
            .buffer_unordered(self.concurrency)
            .map(|report| (report.key.clone(), report))
            .collect()
            .await;

        self.sources
            .iter()
            .filter_map(|s| by_key.remove(s.source_key()))
            .collect()
    }

    /// Merge per-source reports into one page: interleaved items, flattened
    /// status map, composite cursors, timing breakdown.
    fn assemble(&self, reports: Vec<SourceReport>) -> Result<FeedPage> {
        let merge_started = Instant::now();
        let multi_source = self.sources.len() > 1;

        let mut source_statuses = HashMap::new();
        let mut source_elapsed = HashMap::new();
        let mut continuation_map = HashMap::new();
        let mut refresh_map = HashMap::new();
        let mut per_source_items = Vec::with_capacity(reports.len());

        for report in reports {
            source_elapsed.insert(report.key.clone(), report.elapsed);
            let cursor = match report.continuation {
                Some(token) => SourceCursor::Continue(token.into_value()),
                None => SourceCursor::Exhausted,
            };
            continuation_map.insert(report.key.clone(), cursor);
            if let Some(token) = report.refresh {
                refresh_map.insert(report.key, SourceCursor::Continue(token.into_value()));
            }
            source_statuses.extend(report.statuses);
            per_source_items.push(report.items);
        }

        let items = merge_ranked(per_source_items, multi_source);

        let any_continue = continuation_map
            .values()
            .any(|c| matches!(c, SourceCursor::Continue(_)));
        let continuation = if any_continue {
            Some(ContinuationToken::encode(&CompositeCursor {
                sources: continuation_map,
            })?)
        } else {
            None
        };
        let refresh = if refresh_map.is_empty() {
            None
        } else {
            Some(RefreshToken::encode(&CompositeCursor {
                sources: refresh_map,
            })?)
        };

        let merge_elapsed = merge_started.elapsed();
        debug!(
            items = items.len(),
            status = %reduce_statuses(source_statuses.values().copied()),
            merge_us = merge_elapsed.as_micros() as u64,
            "aggregated page assembled"
        );

        Ok(FeedPage {
            items,
            source_statuses,
            continuation,
            refresh,
            diagnostics: PageDiagnostics {
                source_elapsed,
                merge_elapsed,
            },
        })
    }
}

#[async_trait]
impl SearchFeed for MultiSourceFeed {
    fn source_key(&self) -> &str {
        &self.key
    }

    fn source_counts(&self) -> SourceCounts {
        self.sources
            .iter()
            .fold(SourceCounts::default(), |acc, s| acc.plus(s.source_counts()))
    }

    async fn search(&self, query: &SearchQuery, cancel: &CancellationToken) -> Result<FeedPage> {
        let plans = self
            .sources
            .iter()
            .map(|_| SourcePlan::Fresh(query.clone()))
            .collect();
        let reports = self.fan_out(plans, cancel).await;
        self.assemble(reports)
    }

    async fn continue_paging(
        &self,
        token: &ContinuationToken,
        cancel: &CancellationToken,
    ) -> Result<FeedPage> {
        let cursor: CompositeCursor = token
            .decode()
            .context("continuation token was not minted by this aggregate")?;
        let plans = self
            .sources
            .iter()
            .map(|s| match cursor.sources.get(s.source_key()) {
                Some(SourceCursor::Continue(blob)) => {
                    SourcePlan::Continue(ContinuationToken::from_value(blob.clone()))
                }
                Some(SourceCursor::Exhausted) | None => SourcePlan::Exhausted,
            })
            .collect();
        let reports = self.fan_out(plans, cancel).await;
        self.assemble(reports)
    }

    async fn refresh(&self, token: &RefreshToken, cancel: &CancellationToken) -> Result<FeedPage> {
        let cursor: CompositeCursor = token
            .decode()
            .context("refresh token was not minted by this aggregate")?;
        let plans = self
            .sources
            .iter()
            .map(|s| match cursor.sources.get(s.source_key()) {
                Some(SourceCursor::Continue(blob)) => {
                    SourcePlan::Refresh(RefreshToken::from_value(blob.clone()))
                }
                Some(SourceCursor::Exhausted) | None => SourcePlan::Exhausted,
            })
            .collect();
        let reports = self.fan_out(plans, cancel).await;
        self.assemble(reports)
    }
}

// ---------------------------------------------------------------------------
// Per-source driving
// ---------------------------------------------------------------------------

/// What to ask one source for in this step.
enum SourcePlan {
    Fresh(SearchQuery),
    Continue(ContinuationToken),
    Refresh(RefreshToken),
    /// The source reported no further pages on a prior step; it is not
    /// queried again and reports `NoMoreItems`.
    Exhausted,
}

/// One source's contribution to a page, including its own status map.
struct SourceReport {
    key: String,
    items: Vec<PackageHit>,
    statuses: HashMap<String, LoadingStatus>,
    continuation: Option<ContinuationToken>,
    refresh: Option<RefreshToken>,
    elapsed: Duration,
}

async fn run_plan(
    source: &Arc<dyn SearchFeed>,
    plan: &SourcePlan,
    cancel: &CancellationToken,
) -> Result<FeedPage> {
    match plan {
        SourcePlan::Fresh(query) => source.search(query, cancel).await,
        SourcePlan::Continue(token) => source.continue_paging(token, cancel).await,
        SourcePlan::Refresh(token) => source.refresh(token, cancel).await,
        SourcePlan::Exhausted => Ok(FeedPage::status_only(
            source.source_key(),
            LoadingStatus::NoMoreItems,
        )),
    }
}

async fn drive_source(
    source: Arc<dyn SearchFeed>,
    plan: SourcePlan,
    cancel: CancellationToken,
) -> SourceReport {
    let key = source.source_key().to_string();
    let started = Instant::now();

    // biased: a fired token must always read as cancellation, not as the
    // source erroring out in response to it.
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = run_plan(&source, &plan, &cancel) => Some(result),
    };
    let elapsed = started.elapsed();

    match outcome {
        Some(Ok(page)) => SourceReport {
            key,
            items: page.items,
            statuses: page.source_statuses,
            continuation: page.continuation,
            refresh: page.refresh,
            elapsed,
        },
        Some(Err(e)) => {
            warn!(source = key.as_str(), error = %e, "source fetch failed");
            SourceReport {
                statuses: HashMap::from([(key.clone(), LoadingStatus::ErrorOccurred)]),
                key,
                items: Vec::new(),
                continuation: None,
                refresh: None,
                elapsed,
            }
        }
        None => {
            debug!(source = key.as_str(), "source fetch cancelled");
            SourceReport {
                statuses: HashMap::from([(key.clone(), LoadingStatus::Cancelled)]),
                key,
                items: Vec::new(),
                continuation: None,
                refresh: None,
                elapsed,
            }
        }
    }
}
