//! Fallback-Chain Fetcher
//!
//! Ordered data sources with per-source timeout and retry. The chain is
//! sequential: the first source whose result passes validation wins, and a
//! fully exhausted chain is an ordinary "no data" result rather than an error.

pub mod chain;
pub mod retry;

pub use chain::{
    create_data_source, fetch_with_fallback, AttemptOutcome, DataSource, FallbackResult,
    SourceAttempt, SourceDefinition, Validator,
};
pub use retry::{backoff_delay, retry_operation, with_timeout};
