//! Merging per-source result pages into one ordered page.
//!
//! Each source already ranked its own items by relevance. The merge
//! interleaves by rank (rank 0 of every source, then rank 1, and so on),
//! breaking rank ties by source priority (configuration order), and
//! deduplicates by case-insensitive package name with the higher-priority
//! source winning.

use std::collections::HashSet;

use quarry_common::types::PackageHit;

/// Merge per-source item lists given in priority order.
///
/// When `clear_verified` is set (any multi-source query), every merged
/// item's `verified_namespace` flag is forced to `false`: the flag is only
/// trustworthy when a single source answered.
pub fn merge_ranked(per_source: Vec<Vec<PackageHit>>, clear_verified: bool) -> Vec<PackageHit> {
    let max_rank = per_source.iter().map(Vec::len).max().unwrap_or(0);
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();

    for rank in 0..max_rank {
        for items in &per_source {
            let Some(item) = items.get(rank) else {
                continue;
            };
            if !seen.insert(item.identity.key()) {
                continue;
            }
            let mut item = item.clone();
            if clear_verified {
                item.verified_namespace = false;
            }
            merged.push(item);
        }
    }

    merged
}
