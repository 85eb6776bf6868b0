use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Outcome of one agent operation
///
/// Failures are values: callers branch on `success` instead of catching errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub execution_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cache_hit: false,
            execution_time_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            cache_hit: false,
            execution_time_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timing(mut self, execution_time_ms: f64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    /// Transform the payload, keeping status and timing
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            cache_hit: self.cache_hit,
            execution_time_ms: self.execution_time_ms,
            timestamp: self.timestamp,
        }
    }

    pub fn into_result(self) -> crate::error::Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(AgentError::Operation(
                self.error.unwrap_or_else(|| "operation returned no data".to_string()),
            )),
        }
    }
}

impl<T: Serialize> OperationResult<T> {
    /// Erase the payload type for transport through the orchestrator
    pub fn into_json(self) -> OperationResult<serde_json::Value> {
        let data = match self.data.map(serde_json::to_value).transpose() {
            Ok(data) => data,
            Err(e) => {
                return OperationResult::failed(format!("failed to serialize result: {}", e))
                    .with_timing(self.execution_time_ms)
            }
        };
        OperationResult {
            success: self.success,
            data,
            error: self.error,
            cache_hit: self.cache_hit,
            execution_time_ms: self.execution_time_ms,
            timestamp: self.timestamp,
        }
    }
}

impl<T> From<AgentError> for OperationResult<T> {
    fn from(err: AgentError) -> Self {
        OperationResult::failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_shape() {
        let result: OperationResult<u32> = OperationResult::failed("boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(OperationResult::ok(7).into_result().unwrap(), 7);
        let err = OperationResult::<u32>::failed("nope").into_result().unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
