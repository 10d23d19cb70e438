use std::env;

/// Default result-page size requested from each feed.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Default number of source queries driven concurrently by the aggregator.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 8;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Items requested per page from each source (`QUARRY_PAGE_SIZE`).
    pub page_size: usize,

    /// Width of the aggregator's concurrent fan-out
    /// (`QUARRY_FANOUT_CONCURRENCY`). Every source is always attempted;
    /// this only bounds how many are in flight at once.
    pub fanout_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if a set variable fails to parse.
    pub fn from_env() -> Self {
        Self {
            page_size: numeric_env("QUARRY_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            fanout_concurrency: numeric_env(
                "QUARRY_FANOUT_CONCURRENCY",
                DEFAULT_FANOUT_CONCURRENCY,
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }
}

fn numeric_env(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a positive number, got {raw:?}")),
        Err(_) => default,
    }
}
