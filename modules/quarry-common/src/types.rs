use serde::{Deserialize, Serialize};

// --- Loading state ---

/// Progress of one source (or of the whole query, once reduced).
///
/// `Unknown` is the pre-query state. `Loading` means a fetch is outstanding.
/// `Ready` means at least one page arrived and more may exist. `NoMoreItems`
/// is terminal success; `ErrorOccurred` and `Cancelled` are terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingStatus {
    Unknown,
    Loading,
    Ready,
    NoMoreItems,
    ErrorOccurred,
    Cancelled,
}

impl std::fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadingStatus::Unknown => write!(f, "unknown"),
            LoadingStatus::Loading => write!(f, "loading"),
            LoadingStatus::Ready => write!(f, "ready"),
            LoadingStatus::NoMoreItems => write!(f, "no_more_items"),
            LoadingStatus::ErrorOccurred => write!(f, "error_occurred"),
            LoadingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl LoadingStatus {
    /// Terminal states are stable until a new search resets the loader.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoadingStatus::NoMoreItems | LoadingStatus::ErrorOccurred | LoadingStatus::Cancelled
        )
    }
}

// --- Feed classification ---

/// Transport class of a feed, reported in source summary telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Http,
    Local,
}

/// Per-kind source tally feeding the search source summary event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub http: u32,
    pub local: u32,
}

impl SourceCounts {
    pub fn of(kind: FeedKind) -> Self {
        match kind {
            FeedKind::Http => Self { http: 1, local: 0 },
            FeedKind::Local => Self { http: 0, local: 1 },
        }
    }

    pub fn plus(self, other: Self) -> Self {
        Self {
            http: self.http + other.http,
            local: self.local + other.local,
        }
    }
}

// --- Package search results ---

/// Stable identity of a package: name plus version. Name comparison is
/// case-insensitive everywhere; use [`PackageIdentity::key`] for map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Case-folded name, the dedup key across sources.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl std::fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// One package search result. Immutable once produced by a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageHit {
    pub identity: PackageIdentity,
    pub description: String,
    pub authors: Vec<String>,
    pub icon_url: Option<String>,
    pub total_downloads: Option<u64>,
    pub tags: Vec<String>,
    /// The package's namespace/prefix is verified-reserved on its source.
    /// Only trustworthy for single-source queries; the aggregator clears it
    /// whenever more than one source contributed to a page.
    pub verified_namespace: bool,
}

impl PackageHit {
    pub fn name(&self) -> &str {
        &self.identity.name
    }
}

// --- Query ---

/// A logical search: the text plus the filter knobs every feed receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub include_prerelease: bool,
    pub page_size: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            include_prerelease: false,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn include_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }
}
