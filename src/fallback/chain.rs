use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::retry::{retry_operation, with_timeout};
use crate::error::{AgentError, Result};

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Optional acceptance check applied to each fetched value
pub type Validator<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// A named zero-argument source; lower priority is tried first
pub struct DataSource<T> {
    pub name: String,
    pub priority: u32,
    fetch: FetchFn<T>,
}

impl<T> Clone for DataSource<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            fetch: Arc::clone(&self.fetch),
        }
    }
}

impl<T: Send + 'static> DataSource<T> {
    pub fn new<F, Fut>(name: impl Into<String>, priority: u32, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            fetch: Arc::new(move || fetch().boxed()),
        }
    }

    pub async fn fetch(&self) -> Result<T> {
        (self.fetch)().await
    }
}

impl<T> std::fmt::Debug for DataSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Declarative source settings for `create_data_source`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinition {
    pub name: String,
    pub priority: u32,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Total attempts; retry only kicks in above 1
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    250
}

impl SourceDefinition {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            timeout_ms: None,
            retry_count: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Wrap a raw fetcher: timeout (if set) inside retry (if more than one attempt)
pub fn create_data_source<T, F, Fut>(definition: SourceDefinition, fetcher: F) -> DataSource<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let fetcher = Arc::new(fetcher);
    let timeout = definition.timeout_ms.map(Duration::from_millis);
    let attempts = definition.retry_count;
    let base_delay = Duration::from_millis(definition.retry_delay_ms);
    let name = definition.name.clone();

    DataSource::new(definition.name, definition.priority, move || {
        let fetcher = Arc::clone(&fetcher);
        let name = name.clone();
        async move {
            let attempt = || {
                let fut = fetcher();
                let name = name.clone();
                async move {
                    match timeout {
                        Some(limit) => {
                            with_timeout(fut, limit, format!("{} timed out after {:?}", name, limit))
                                .await
                        }
                        None => fut.await,
                    }
                }
            };
            if attempts > 1 {
                retry_operation(attempt, attempts, base_delay).await
            } else {
                attempt().await
            }
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed(String),
    /// Fetched, but the validator refused the value
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttempt {
    pub source: String,
    pub priority: u32,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResult<T> {
    pub data: Option<T>,
    pub source: Option<String>,
    pub attempts: Vec<SourceAttempt>,
}

impl<T> FallbackResult<T> {
    pub fn is_found(&self) -> bool {
        self.data.is_some()
    }

    /// Source names in the order they were tried
    pub fn tried(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.source.as_str()).collect()
    }

    /// `(data, source)` or `AllSourcesExhausted` summarizing every attempt
    pub fn into_result(self) -> Result<(T, String)> {
        match (self.data, self.source) {
            (Some(data), Some(source)) => Ok((data, source)),
            _ => {
                let summary = self
                    .attempts
                    .iter()
                    .map(|a| match &a.outcome {
                        AttemptOutcome::Failed(reason) => format!("{}: {}", a.source, reason),
                        AttemptOutcome::Rejected => format!("{}: rejected", a.source),
                        AttemptOutcome::Success => format!("{}: ok", a.source),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(AgentError::AllSourcesExhausted(if summary.is_empty() {
                    "no sources configured".to_string()
                } else {
                    summary
                }))
            }
        }
    }
}

/// Try sources in ascending priority (stable for ties) until one yields a
/// value the validator accepts
pub async fn fetch_with_fallback<T>(
    sources: &[DataSource<T>],
    validator: Option<Validator<'_, T>>,
) -> FallbackResult<T>
where
    T: Send + 'static,
{
    let mut ordered: Vec<&DataSource<T>> = sources.iter().collect();
    ordered.sort_by_key(|source| source.priority);

    let mut attempts = Vec::with_capacity(ordered.len());
    for source in ordered {
        let started = Instant::now();
        let outcome = source.fetch().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(data) => {
                let accepted = validator.map(|check| check(&data)).unwrap_or(true);
                if accepted {
                    debug!("Source {} answered in {:.1}ms", source.name, elapsed_ms);
                    attempts.push(SourceAttempt {
                        source: source.name.clone(),
                        priority: source.priority,
                        outcome: AttemptOutcome::Success,
                        elapsed_ms,
                    });
                    return FallbackResult {
                        data: Some(data),
                        source: Some(source.name.clone()),
                        attempts,
                    };
                }
                info!("Source {} returned invalid data, trying next", source.name);
                attempts.push(SourceAttempt {
                    source: source.name.clone(),
                    priority: source.priority,
                    outcome: AttemptOutcome::Rejected,
                    elapsed_ms,
                });
            }
            Err(e) => {
                warn!("Source {} failed: {}", source.name, e);
                attempts.push(SourceAttempt {
                    source: source.name.clone(),
                    priority: source.priority,
                    outcome: AttemptOutcome::Failed(e.to_string()),
                    elapsed_ms,
                });
            }
        }
    }

    warn!("All {} data sources exhausted", attempts.len());
    FallbackResult {
        data: None,
        source: None,
        attempts,
    }
}
