//! Utility modules supporting collection runs.
//!
//! - [`RecordMerger`]: Cross-source deduplication and field-priority merging
//! - [`ProviderClient`]: Rate-limited, retrying HTTP client bound to one provider
//! - [`RateGate`]: Per-provider minimum-interval request gate
//! - [`RetryConfig`] / [`with_retry`]: Retry with exponential backoff and jitter
//! - [`normalize_doi`], [`title_key`]: Identity keys used for deduplication
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use literature_collector::sources::SourceError;
//! use literature_collector::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let config = RetryConfig::default().max_retries(3);
//! let data = with_retry(config, || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod dedup;
mod http;
mod normalize;
mod rate_limit;
mod retry;

pub use dedup::{result_order, RecordMerger};
pub use http::{HttpSettings, ProviderClient};
pub use normalize::{normalize_doi, normalize_whitespace, strip_markup, title_key};
pub use rate_limit::RateGate;
pub use retry::{with_retry, RetryConfig, TransientError};
