pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use error::{QuarryError, Result};
pub use telemetry::{TelemetryEvent, TelemetrySink};
pub use types::*;
