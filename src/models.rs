use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body for the async job endpoints; the synchronous endpoint takes the raw
/// pasted text directly as the request body.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleRequest {
    pub input: String,
}

/// Per-job accounting returned from job status polling and logged after
/// synchronous runs. The archive bytes themselves travel separately.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BundleSummary {
    pub records: usize,
    pub urls: usize,
    pub fetched: usize,
    pub failed: usize,
    pub quota_rejected: usize,
    pub archive_bytes: usize,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
