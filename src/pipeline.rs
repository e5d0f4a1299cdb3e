use crate::archive;
use crate::fetch::{self, FetchFailure};
use crate::http::build_client;
use crate::models::{BundleSummary, StageReport};
use crate::parser;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;

/// The bulk asset retrieval & archival pipeline: parse the pasted export,
/// fetch every URL under the quota, assemble the zip. Cheap to clone; the
/// reqwest client is shared.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    client: reqwest::Client,
}

#[derive(Clone)]
pub struct PipelineConfig {
    /// Tier ceiling on fetches per job; never user-supplied.
    pub max_total_fetches: usize,
    pub fetch_concurrency: usize,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            max_total_fetches: env_usize("MAX_TOTAL_FETCHES", 100),
            fetch_concurrency: env_usize("FETCH_CONCURRENCY", 8),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_total_fetches: 100,
            fetch_concurrency: 8,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

/// A finished job: the archive bytes plus the accounting that rides along in
/// job status responses and logs.
#[derive(Debug, Clone)]
pub struct BundleArtifact {
    pub archive: Vec<u8>,
    pub summary: BundleSummary,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
struct StageOutcome<T> {
    value: T,
    output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: build_client(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(PipelineConfig::from_env())
    }

    /// Run one job to completion. Per-URL failures are recovered into the
    /// archive's failure report; only archive construction failure surfaces
    /// here as an error.
    pub async fn run(&self, input: &str) -> Result<BundleArtifact, PipelineError> {
        let mut stages = Vec::new();

        let records = self
            .capture_stage("parse_records", &mut stages, async {
                let records = parser::parse_records(input);
                let urls: usize = records.iter().map(|r| r.urls.len()).sum();
                let output = json!({
                    "records": records.len(),
                    "urls": urls,
                });
                Ok(StageOutcome::new(records, output))
            })
            .await?;

        let record_count = records.len();
        let url_count: usize = records.iter().map(|r| r.urls.len()).sum();

        let outcomes = self
            .capture_stage("fetch_assets", &mut stages, {
                let client = self.client.clone();
                let config = self.config.clone();
                let records = records.clone();
                async move {
                    let outcomes = fetch::fetch_assets(
                        &client,
                        &records,
                        config.max_total_fetches,
                        config.fetch_concurrency,
                    )
                    .await;
                    let fetched = outcomes.iter().filter(|o| o.result.is_ok()).count();
                    let output = json!({
                        "attempted": outcomes
                            .iter()
                            .filter(|o| o.result != Err(FetchFailure::QuotaExceeded))
                            .count(),
                        "fetched": fetched,
                        "quota": config.max_total_fetches,
                    });
                    Ok(StageOutcome::new(outcomes, output))
                }
            })
            .await?;

        let fetched = outcomes.iter().filter(|o| o.result.is_ok()).count();
        let quota_rejected = outcomes
            .iter()
            .filter(|o| o.result == Err(FetchFailure::QuotaExceeded))
            .count();
        let failed = outcomes.len() - fetched - quota_rejected;

        let archive = self
            .capture_stage("build_archive", &mut stages, async {
                let bytes = archive::build_archive(&outcomes)
                    .map_err(|err| PipelineError::internal("build_archive", err.to_string()))?;
                let output = json!({
                    "entries": fetched,
                    "report": failed + quota_rejected > 0,
                    "bytes": bytes.len(),
                });
                Ok(StageOutcome::new(bytes, output))
            })
            .await?;

        let summary = BundleSummary {
            records: record_count,
            urls: url_count,
            fetched,
            failed,
            quota_rejected,
            archive_bytes: archive.len(),
            stages,
        };

        Ok(BundleArtifact { archive, summary })
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}
