//! Composite status reduction.
//!
//! The per-source status map is folded into one page-level outcome by an
//! explicit total order rather than ad-hoc branching, so the tie-breaks are
//! testable without any feed in the picture.

use quarry_common::types::LoadingStatus;

/// Reduce per-source statuses to the composite status.
///
/// Priority, highest first:
/// - `ErrorOccurred` only when every source errored; a partial failure
///   degrades to the surviving sources' outcome.
/// - `Loading` when any source still has a fetch outstanding (`Loading`, or
///   `Unknown` mixed with completed sources).
/// - `Ready` when any source has more pages and none is fetching.
/// - `NoMoreItems` when every surviving source is exhausted.
/// - `Cancelled` only when nothing above applies (cancelled before any
///   source responded).
///
/// An empty or entirely pre-query map stays `Unknown`.
pub fn reduce_statuses<I>(statuses: I) -> LoadingStatus
where
    I: IntoIterator<Item = LoadingStatus>,
{
    let mut total = 0usize;
    let mut unknown = 0usize;
    let mut loading = 0usize;
    let mut ready = 0usize;
    let mut exhausted = 0usize;
    let mut errored = 0usize;
    let mut cancelled = 0usize;

    for status in statuses {
        total += 1;
        match status {
            LoadingStatus::Unknown => unknown += 1,
            LoadingStatus::Loading => loading += 1,
            LoadingStatus::Ready => ready += 1,
            LoadingStatus::NoMoreItems => exhausted += 1,
            LoadingStatus::ErrorOccurred => errored += 1,
            LoadingStatus::Cancelled => cancelled += 1,
        }
    }

    if total == 0 || unknown == total {
        return LoadingStatus::Unknown;
    }
    if errored == total {
        return LoadingStatus::ErrorOccurred;
    }
    if loading > 0 || unknown > 0 {
        return LoadingStatus::Loading;
    }
    if ready > 0 {
        return LoadingStatus::Ready;
    }
    if exhausted > 0 {
        return LoadingStatus::NoMoreItems;
    }
    if cancelled > 0 {
        return LoadingStatus::Cancelled;
    }
    LoadingStatus::ErrorOccurred
}
