//! Loader state machine tests — MOCK → FUNCTION → OUTPUT.
//!
//! Script the feeds, drive the loader through load_next/update_state, assert
//! the visible snapshot, the status transitions, and the telemetry stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use quarry_common::telemetry::{TelemetryEvent, TelemetrySink};
use quarry_common::types::{LoadingStatus, SearchQuery};
use quarry_common::QuarryError;
use quarry_feed::testing::{hit, ScriptedFeed};
use quarry_feed::{MultiSourceFeed, SearchFeed};
use quarry_loader::{LoaderState, SearchLoader};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Telemetry sink recording every event in emission order.
#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingSink {
    fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }
}

impl TelemetrySink for CollectingSink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn aggregate(feeds: Vec<Arc<ScriptedFeed>>) -> Arc<dyn SearchFeed> {
    Arc::new(MultiSourceFeed::new(
        feeds
            .into_iter()
            .map(|f| f as Arc<dyn SearchFeed>)
            .collect(),
    ))
}

fn loader_with_sink(feed: Arc<dyn SearchFeed>, query: &str) -> (SearchLoader, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let loader = SearchLoader::new(
        feed,
        SearchQuery::new(query),
        Some(sink.clone() as Arc<dyn TelemetrySink>),
    );
    (loader, sink)
}

async fn poll_until_settled(loader: &SearchLoader) -> LoaderState {
    for _ in 0..500 {
        let state = loader.update_state();
        if state.status != LoadingStatus::Loading {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("loader never settled");
}

// ---------------------------------------------------------------------------
// Incremental paging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pages_accumulate_and_telemetry_is_ordered() {
    let a = Arc::new(
        ScriptedFeed::new("nuget.org")
            .page(vec![hit("serde", "1.0.219")])
            .page(vec![hit("serde_json", "1.0.145")]),
    );
    let b = Arc::new(ScriptedFeed::new("contoso").local().page(vec![hit("tokio", "1.47.0")]));
    let (loader, sink) = loader_with_sink(aggregate(vec![a, b]), "serde");
    let cancel = CancellationToken::new();

    assert_eq!(loader.state().status, LoadingStatus::Unknown);
    assert!(loader.current().is_empty());

    loader.load_next(&cancel).unwrap();
    assert_eq!(loader.state().status, LoadingStatus::Loading);

    let state = poll_until_settled(&loader).await;
    assert_eq!(state.status, LoadingStatus::Ready);
    assert_eq!(state.item_count, 2);
    let after_first = loader.current().len();

    loader.load_next(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert_eq!(state.status, LoadingStatus::NoMoreItems);
    assert_eq!(state.item_count, 3);
    assert!(loader.current().len() >= after_first);

    // Exhausted: a further page request is a caller error.
    assert!(matches!(
        loader.load_next(&cancel),
        Err(QuarryError::NoContinuation)
    ));

    assert_eq!(
        sink.event_types(),
        vec!["search", "search_source_summary", "search_page", "search_page"]
    );
    let events = sink.events();
    let correlation = events[0].correlation_id();
    assert!(events.iter().all(|e| e.correlation_id() == correlation));
    let page_indexes: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            TelemetryEvent::SearchPage { page_index, .. } => Some(*page_index),
            _ => None,
        })
        .collect();
    assert_eq!(page_indexes, vec![0, 1]);

    match &events[2] {
        TelemetryEvent::SearchPage {
            status,
            result_count,
            source_elapsed_ms,
            ..
        } => {
            assert_eq!(*status, LoadingStatus::Ready);
            assert_eq!(*result_count, 2);
            assert!(source_elapsed_ms.contains_key("nuget.org"));
            assert!(source_elapsed_ms.contains_key("contoso"));
        }
        other => panic!("expected SearchPage, got {other:?}"),
    }
}

#[tokio::test]
async fn single_source_then_exhaustion_scenario() {
    // Source returns one item on the fresh search, then an empty page with
    // no continuation on the first continue.
    let a = Arc::new(
        ScriptedFeed::new("nuget.org")
            .page(vec![hit("B", "2.0.0")])
            .page(vec![]),
    );
    let (loader, _sink) = loader_with_sink(aggregate(vec![a]), "B");
    let cancel = CancellationToken::new();

    loader.load_next(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert!(state.item_count > 0);
    assert_eq!(loader.current()[0].identity.to_string(), "B@2.0.0");

    loader.load_next(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert_eq!(state.status, LoadingStatus::NoMoreItems);
}

// ---------------------------------------------------------------------------
// Misuse and failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_next_while_loading_is_rejected() {
    let a = Arc::new(
        ScriptedFeed::new("slow")
            .with_delay(Duration::from_millis(100))
            .page(vec![hit("serde", "1.0.219")]),
    );
    let (loader, _sink) = loader_with_sink(aggregate(vec![a]), "serde");
    let cancel = CancellationToken::new();

    loader.load_next(&cancel).unwrap();
    assert!(matches!(
        loader.load_next(&cancel),
        Err(QuarryError::FetchInFlight)
    ));

    poll_until_settled(&loader).await;
}

#[tokio::test]
async fn all_sources_failing_surfaces_error_status() {
    let a = Arc::new(ScriptedFeed::new("flaky-a").failing_search());
    let b = Arc::new(ScriptedFeed::new("flaky-b").failing_search());
    let (loader, sink) = loader_with_sink(aggregate(vec![a, b]), "serde");
    let cancel = CancellationToken::new();

    loader.load_next(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert_eq!(state.status, LoadingStatus::ErrorOccurred);
    assert_eq!(state.item_count, 0);

    // An all-error page still completes; its telemetry carries the failure.
    let events = sink.events();
    match events.last() {
        Some(TelemetryEvent::SearchPage { status, .. }) => {
            assert_eq!(*status, LoadingStatus::ErrorOccurred)
        }
        other => panic!("expected SearchPage, got {other:?}"),
    }

    // The loader stays usable: a new search resets it.
    loader.start_search(SearchQuery::new("tokio"));
    assert_eq!(loader.state().status, LoadingStatus::Unknown);
}

// ---------------------------------------------------------------------------
// New search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_search_clears_items_and_rotates_correlation_id() {
    let a = Arc::new(ScriptedFeed::new("nuget.org").page(vec![hit("serde", "1.0.219")]));
    let (loader, sink) = loader_with_sink(aggregate(vec![a]), "serde");
    let cancel = CancellationToken::new();

    loader.load_next(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert_eq!(state.item_count, 1);
    let first_correlation = state.correlation_id;

    loader.start_search(SearchQuery::new("tokio"));
    let state = loader.state();
    assert_eq!(state.status, LoadingStatus::Unknown);
    assert_eq!(state.item_count, 0);
    assert!(loader.current().is_empty());
    assert_ne!(state.correlation_id, first_correlation);

    loader.load_next(&cancel).unwrap();
    assert_eq!(loader.state().status, LoadingStatus::Loading);
    poll_until_settled(&loader).await;

    // The second search emitted its own Search event under the new id.
    let searches: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.event_type() == "search")
        .collect();
    assert_eq!(searches.len(), 2);
    assert_ne!(searches[0].correlation_id(), searches[1].correlation_id());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelling_a_fetch_keeps_published_items() {
    let a = Arc::new(
        ScriptedFeed::new("nuget.org")
            .page(vec![hit("serde", "1.0.219")])
            .page(vec![hit("serde_json", "1.0.145")])
            .hanging_continue(),
    );
    let (loader, sink) = loader_with_sink(a as Arc<dyn SearchFeed>, "serde");
    let cancel = CancellationToken::new();

    loader.load_next(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert_eq!(state.item_count, 1);
    let events_before = sink.events().len();

    let fetch_cancel = CancellationToken::new();
    loader.load_next(&fetch_cancel).unwrap();
    fetch_cancel.cancel();

    let state = poll_until_settled(&loader).await;
    assert_eq!(state.status, LoadingStatus::Cancelled);
    assert_eq!(loader.current().len(), 1, "published items survive");

    // A cancelled fetch is not a completed page: no SearchPage event.
    assert_eq!(sink.events().len(), events_before);
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_appends_only_newly_indexed_items() {
    let a = Arc::new(
        ScriptedFeed::new("nuget.org")
            .page(vec![hit("serde", "1.0.219")])
            .newly_indexed(vec![hit("axum", "0.8.0")]),
    );
    let (loader, _sink) = loader_with_sink(a as Arc<dyn SearchFeed>, "serde");
    let cancel = CancellationToken::new();

    loader.load_next(&cancel).unwrap();
    poll_until_settled(&loader).await;
    assert_eq!(loader.current().len(), 1);

    loader.refresh(&cancel).unwrap();
    let state = poll_until_settled(&loader).await;
    assert_eq!(state.item_count, 2);

    let names: Vec<String> = loader
        .current()
        .iter()
        .map(|i| i.identity.name.clone())
        .collect();
    assert_eq!(names, vec!["serde", "axum"], "existing order preserved");
}

// ---------------------------------------------------------------------------
// Total count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn total_count_reports_at_least_cap_semantics() {
    let first: Vec<_> = (0..60).map(|i| hit(&format!("pkg{i}"), "1.0")).collect();
    let second: Vec<_> = (60..120).map(|i| hit(&format!("pkg{i}"), "1.0")).collect();
    let a = Arc::new(ScriptedFeed::new("nuget.org").page(first).page(second));
    let (loader, _sink) = loader_with_sink(aggregate(vec![a]), "pkg");
    let cancel = CancellationToken::new();

    let count = loader.total_count(100, &cancel).await.unwrap();
    assert!(count >= 100, "cap exceeded means at-least-cap, got {count}");

    // Counting never mutates the loader's visible state.
    assert!(loader.current().is_empty());
    assert_eq!(loader.state().status, LoadingStatus::Unknown);
}
