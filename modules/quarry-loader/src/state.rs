use serde::Serialize;
use uuid::Uuid;

use quarry_common::types::LoadingStatus;

/// Externally observable snapshot of a loader: the composite status, the
/// correlation id of the current logical search, and how many items are
/// visible. Returned by every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoaderState {
    pub status: LoadingStatus,
    pub correlation_id: Uuid,
    pub item_count: usize,
}
