//! Incremental search loader.
//!
//! `SearchLoader` owns the growing result list for one logical search and
//! drives its feed one page at a time: `load_next` launches a background
//! fetch and returns immediately, `update_state` is the non-blocking poll
//! that publishes a completed page, `current` is the snapshot a UI renders.
//! At most one fetch is in flight per loader; the completion handler is the
//! only writer of the visible list and composite status, published as a
//! whole-snapshot swap.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quarry_common::telemetry::{TelemetryEvent, TelemetrySink};
use quarry_common::types::{LoadingStatus, PackageHit, SearchQuery};
use quarry_common::{QuarryError, Result};
use quarry_feed::{reduce_statuses, ContinuationToken, FeedPage, RefreshToken, SearchFeed};

use crate::state::LoaderState;

pub struct SearchLoader {
    feed: Arc<dyn SearchFeed>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    inner: Mutex<LoaderInner>,
}

struct LoaderInner {
    query: SearchQuery,
    correlation_id: Uuid,
    status: LoadingStatus,
    items: Arc<Vec<PackageHit>>,
    /// Identity keys already visible, so continuation overlaps and refresh
    /// supersets never break monotonic growth.
    seen: HashSet<String>,
    continuation: Option<ContinuationToken>,
    refresh: Option<RefreshToken>,
    page_index: u32,
    search_event_sent: bool,
    in_flight: Option<InFlight>,
}

struct InFlight {
    rx: oneshot::Receiver<FetchOutcome>,
    cancel: CancellationToken,
}

struct FetchOutcome {
    result: anyhow::Result<FeedPage>,
    elapsed: Duration,
}

enum FetchPlan {
    Search(SearchQuery),
    Continue(ContinuationToken),
    Refresh(RefreshToken),
}

impl LoaderInner {
    fn fresh(query: SearchQuery) -> Self {
        Self {
            query,
            correlation_id: Uuid::new_v4(),
            status: LoadingStatus::Unknown,
            items: Arc::new(Vec::new()),
            seen: HashSet::new(),
            continuation: None,
            refresh: None,
            page_index: 0,
            search_event_sent: false,
            in_flight: None,
        }
    }

    fn snapshot(&self) -> LoaderState {
        LoaderState {
            status: self.status,
            correlation_id: self.correlation_id,
            item_count: self.items.len(),
        }
    }
}

impl SearchLoader {
    pub fn new(
        feed: Arc<dyn SearchFeed>,
        query: SearchQuery,
        telemetry: Option<Arc<dyn TelemetrySink>>,
    ) -> Self {
        Self {
            feed,
            telemetry,
            inner: Mutex::new(LoaderInner::fresh(query)),
        }
    }

    /// Start the next page fetch as a background operation. The composite
    /// status transitions to `Loading` before this returns.
    ///
    /// Rejects with [`QuarryError::FetchInFlight`] while a fetch is
    /// outstanding (callers serialize their own calls) and with
    /// [`QuarryError::NoContinuation`] once the search is exhausted. After
    /// `ErrorOccurred` or `Cancelled`, calling again retries the failed step.
    pub fn load_next(&self, cancel: &CancellationToken) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_flight.is_some() || inner.status == LoadingStatus::Loading {
            return Err(QuarryError::FetchInFlight);
        }
        if inner.status == LoadingStatus::NoMoreItems {
            return Err(QuarryError::NoContinuation);
        }

        let plan = match inner.continuation.clone() {
            Some(token) => FetchPlan::Continue(token),
            None => FetchPlan::Search(inner.query.clone()),
        };

        if !inner.search_event_sent {
            self.emit(TelemetryEvent::Search {
                correlation_id: inner.correlation_id,
                query: inner.query.text.clone(),
                include_prerelease: inner.query.include_prerelease,
            });
            let counts = self.feed.source_counts();
            self.emit(TelemetryEvent::SearchSourceSummary {
                correlation_id: inner.correlation_id,
                http_sources: counts.http,
                local_sources: counts.local,
            });
            inner.search_event_sent = true;
        }

        inner.status = LoadingStatus::Loading;
        inner.in_flight = Some(self.spawn_fetch(plan, cancel.clone()));
        debug!(correlation_id = %inner.correlation_id, "page fetch started");
        Ok(())
    }

    /// Re-poll the already-loaded page set for newly indexed packages, using
    /// the feed's refresh handle. Runs through the same one-fetch-at-a-time
    /// machinery as `load_next`; refreshed items that are already visible
    /// are not appended again.
    pub fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_flight.is_some() || inner.status == LoadingStatus::Loading {
            return Err(QuarryError::FetchInFlight);
        }
        let token = inner.refresh.clone().ok_or(QuarryError::NoRefresh)?;

        inner.status = LoadingStatus::Loading;
        inner.in_flight = Some(self.spawn_fetch(FetchPlan::Refresh(token), cancel.clone()));
        debug!(correlation_id = %inner.correlation_id, "refresh fetch started");
        Ok(())
    }

    /// Non-blocking poll. Publishes the in-flight fetch if it completed;
    /// otherwise has no visible effect. Safe to call repeatedly.
    pub fn update_state(&self) -> LoaderState {
        let mut inner = self.lock();
        if let Some(mut fetch) = inner.in_flight.take() {
            match fetch.rx.try_recv() {
                Ok(outcome) => self.publish(&mut inner, &fetch, outcome),
                Err(TryRecvError::Empty) => inner.in_flight = Some(fetch),
                Err(TryRecvError::Closed) => {
                    warn!(correlation_id = %inner.correlation_id, "page fetch task dropped without reporting");
                    inner.status = LoadingStatus::ErrorOccurred;
                }
            }
        }
        inner.snapshot()
    }

    /// Immutable snapshot of the accumulated items. Never blocks.
    pub fn current(&self) -> Arc<Vec<PackageHit>> {
        self.lock().items.clone()
    }

    pub fn state(&self) -> LoaderState {
        self.lock().snapshot()
    }

    /// Abandon the current search and begin a new one: clears the visible
    /// list, resets the status to `Unknown`, and issues a new correlation
    /// id. Any in-flight fetch is cancelled and its outcome discarded.
    pub fn start_search(&self, query: SearchQuery) {
        let mut inner = self.lock();
        if let Some(fetch) = inner.in_flight.take() {
            fetch.cancel.cancel();
        }
        *inner = LoaderInner::fresh(query);
        info!(correlation_id = %inner.correlation_id, query = inner.query.text.as_str(), "new search started");
    }

    /// Best-effort total match count across the feed set, capped: returns as
    /// soon as the running count reaches `cap` ("at least cap" semantics) or
    /// every source finishes. Runs its own pagination; loader state is not
    /// touched.
    pub async fn total_count(&self, cap: usize, cancel: &CancellationToken) -> Result<usize> {
        let query = self.lock().query.clone();
        let mut total = 0usize;
        let mut page = self.feed.search(&query, cancel).await?;
        loop {
            total += page.items.len();
            if total >= cap || cancel.is_cancelled() {
                break;
            }
            match page.continuation {
                Some(ref token) => page = self.feed.continue_paging(token, cancel).await?,
                None => break,
            }
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, LoaderInner> {
        self.inner.lock().expect("loader lock poisoned")
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(sink) = &self.telemetry {
            sink.emit(&event);
        }
    }

    fn spawn_fetch(&self, plan: FetchPlan, cancel: CancellationToken) -> InFlight {
        let feed = self.feed.clone();
        let (tx, rx) = oneshot::channel();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = match plan {
                FetchPlan::Search(query) => feed.search(&query, &task_cancel).await,
                FetchPlan::Continue(token) => feed.continue_paging(&token, &task_cancel).await,
                FetchPlan::Refresh(token) => feed.refresh(&token, &task_cancel).await,
            };
            let _ = tx.send(FetchOutcome {
                result,
                elapsed: started.elapsed(),
            });
        });
        InFlight { rx, cancel }
    }

    /// Completion handler: the only writer of the visible list and composite
    /// status. Runs under the inner lock, so publication is atomic and page
    /// N's items and telemetry strictly follow page N-1's.
    fn publish(&self, inner: &mut LoaderInner, fetch: &InFlight, outcome: FetchOutcome) {
        if fetch.cancel.is_cancelled() {
            info!(correlation_id = %inner.correlation_id, "page fetch cancelled, partial results discarded");
            inner.status = LoadingStatus::Cancelled;
            return;
        }

        let page = match outcome.result {
            Ok(page) => page,
            Err(e) => {
                warn!(correlation_id = %inner.correlation_id, error = %e, "page fetch failed");
                inner.status = LoadingStatus::ErrorOccurred;
                return;
            }
        };

        let composite = reduce_statuses(page.source_statuses.values().copied());
        let delivered = page.items.len();

        let mut items = (*inner.items).clone();
        for item in page.items {
            if inner.seen.insert(item.identity.key()) {
                items.push(item);
            }
        }
        inner.items = Arc::new(items);
        inner.continuation = page.continuation;
        inner.refresh = page.refresh;
        inner.status = composite;

        let source_elapsed_ms = page
            .diagnostics
            .source_elapsed
            .iter()
            .map(|(key, elapsed)| (key.clone(), elapsed.as_millis() as u64))
            .collect();
        self.emit(TelemetryEvent::SearchPage {
            correlation_id: inner.correlation_id,
            page_index: inner.page_index,
            status: composite,
            result_count: delivered,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            merge_ms: page.diagnostics.merge_elapsed.as_millis() as u64,
            source_elapsed_ms,
        });
        inner.page_index += 1;

        info!(
            correlation_id = %inner.correlation_id,
            items = delivered,
            total = inner.items.len(),
            status = %composite,
            "page published"
        );
    }
}
