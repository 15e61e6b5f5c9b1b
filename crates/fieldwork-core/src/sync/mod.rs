//! Synchronization engine: delivery, detection, and resolution

mod api;
mod backoff;
mod detector;
mod driver;
mod http;
pub mod merge;
mod resolver;

pub use api::{ApiClient, ApplyOutcome};
pub use backoff::BackoffPolicy;
pub use detector::ConflictDetector;
pub use driver::{DriverConfig, DriverStats, SyncDriver};
pub use http::HttpApiClient;
pub use merge::{MergeOverrides, MergeSide};
pub use resolver::ConflictResolver;
