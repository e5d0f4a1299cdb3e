//! Retrieves every URL of a parsed job under a per-job fetch quota. Workers
//! run concurrently against a shared work queue; outcomes are reassembled in
//! original flattened order so downstream output never depends on scheduling.

use crate::parser::AssetRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// One flattened unit of work. `flat_index` is the position in the flattened
/// `(key, ordinal, url)` stream and restores output order after the pool has
/// scrambled completion order. `ordinal` is the URL's 0-based position within
/// its key and later decides the archive filename.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub flat_index: usize,
    pub key: String,
    pub ordinal: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Http(u16),
    #[error("fetch quota exhausted")]
    QuotaExceeded,
}

impl FetchFailure {
    /// Stable token for the archive's failure report.
    pub fn report_token(&self) -> &'static str {
        match self {
            FetchFailure::Transport(_) | FetchFailure::Http(_) => "fetch-failed",
            FetchFailure::QuotaExceeded => "quota-exceeded",
        }
    }
}

/// Result of one attempted (or quota-rejected) URL. Exactly one of payload /
/// failure, enforced by the `Result`.
#[derive(Debug)]
pub struct FetchOutcome {
    pub flat_index: usize,
    pub key: String,
    pub ordinal: usize,
    pub url: String,
    pub result: Result<Vec<u8>, FetchFailure>,
}

/// Flatten records into the ordered fetch stream, preserving record order and
/// within-record URL order. Records with no URLs contribute nothing.
pub fn flatten(records: &[AssetRecord]) -> Vec<FetchJob> {
    let mut jobs = Vec::new();
    for record in records {
        for (ordinal, url) in record.urls.iter().enumerate() {
            jobs.push(FetchJob {
                flat_index: jobs.len(),
                key: record.key.clone(),
                ordinal,
                url: url.clone(),
            });
        }
    }
    jobs
}

/// Fetch every URL of `records` with at most `concurrency` in-flight requests
/// and at most `max_total_fetches` requests issued in total. URLs beyond the
/// quota are never attempted and come back as `QuotaExceeded`. Returns one
/// outcome per flattened URL, in flattened order.
pub async fn fetch_assets(
    client: &reqwest::Client,
    records: &[AssetRecord],
    max_total_fetches: usize,
    concurrency: usize,
) -> Vec<FetchOutcome> {
    let jobs = flatten(records);
    if jobs.is_empty() {
        return Vec::new();
    }
    let total = jobs.len();

    let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
    // Request-scoped quota counter; check-and-increment happens under the
    // lock so no more than `max_total_fetches` requests are ever issued.
    let quota_used = Arc::new(Mutex::new(0usize));
    let (tx, mut rx) = mpsc::channel::<FetchOutcome>(total);

    let workers = concurrency.clamp(1, total);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        handles.push(tokio::spawn(worker(
            client.clone(),
            queue.clone(),
            quota_used.clone(),
            max_total_fetches,
            tx.clone(),
        )));
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    for handle in handles {
        let _ = handle.await;
    }

    outcomes.sort_by_key(|outcome| outcome.flat_index);
    outcomes
}

async fn worker(
    client: reqwest::Client,
    queue: Arc<Mutex<VecDeque<FetchJob>>>,
    quota_used: Arc<Mutex<usize>>,
    max_total_fetches: usize,
    tx: mpsc::Sender<FetchOutcome>,
) {
    loop {
        let job = { queue.lock().await.pop_front() };
        let Some(job) = job else { break };

        let permitted = {
            let mut used = quota_used.lock().await;
            if *used >= max_total_fetches {
                false
            } else {
                *used += 1;
                true
            }
        };

        let result = if permitted {
            fetch_one(&client, &job.url).await
        } else {
            Err(FetchFailure::QuotaExceeded)
        };

        match &result {
            Ok(payload) => {
                debug!(
                    target = "satchel.fetch",
                    key = %job.key,
                    ordinal = job.ordinal,
                    bytes = payload.len(),
                    "fetched"
                );
                crate::metrics::fetch_outcome("ok");
            }
            Err(failure) => {
                debug!(
                    target = "satchel.fetch",
                    key = %job.key,
                    url = %job.url,
                    error = %failure,
                    "fetch failed"
                );
                crate::metrics::fetch_outcome(failure.report_token());
            }
        }

        let outcome = FetchOutcome {
            flat_index: job.flat_index,
            key: job.key,
            ordinal: job.ordinal,
            url: job.url,
            result,
        };
        if tx.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchFailure> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| FetchFailure::Transport(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchFailure::Http(status.as_u16()));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| FetchFailure::Transport(err.to_string()))?;
    Ok(bytes.to_vec())
}
