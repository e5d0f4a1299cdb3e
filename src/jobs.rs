use crate::{
    models::{ApiError, BundleSummary},
    pipeline::Pipeline,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::info;
use uuid::Uuid;

/// In-memory queue for asynchronous bundle jobs. A large paste at the quota
/// ceiling can take minutes to fetch, so callers may enqueue and poll instead
/// of holding the synchronous request open. Finished archives are kept in
/// memory for download; nothing is persisted.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Arc<Mutex<HashMap<Uuid, JobState>>>,
    archives: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
}

struct Job {
    id: Uuid,
    input: String,
}

#[derive(Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed { summary: BundleSummary },
    Failed { error: String, stage: Option<String> },
}

#[derive(Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    pub fn spawn(pipeline: Pipeline) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_capacity_from_env());
        let statuses = Arc::new(Mutex::new(HashMap::new()));
        let archives = Arc::new(Mutex::new(HashMap::new()));
        let statuses_bg = statuses.clone();
        let archives_bg = archives.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                {
                    let mut guard = statuses_bg.lock().await;
                    guard.insert(job.id, JobState::Running);
                }

                let result = pipeline.run(&job.input).await;
                let mut guard = statuses_bg.lock().await;
                match result {
                    Ok(artifact) => {
                        info!(
                            target = "satchel.jobs",
                            job_id = %job.id,
                            fetched = artifact.summary.fetched,
                            failed = artifact.summary.failed,
                            "bundle job completed"
                        );
                        archives_bg.lock().await.insert(job.id, artifact.archive);
                        guard.insert(
                            job.id,
                            JobState::Completed {
                                summary: artifact.summary,
                            },
                        );
                    }
                    Err(err) => {
                        guard.insert(
                            job.id,
                            JobState::Failed {
                                error: err.detail().to_string(),
                                stage: Some(err.stage().to_string()),
                            },
                        );
                    }
                }
            }
        });

        (
            Self {
                tx,
                statuses,
                archives,
            },
            handle,
        )
    }

    pub async fn enqueue_bundle(&self, input: String) -> Result<Uuid, ApiError> {
        let id = Uuid::new_v4();
        {
            let mut guard = self.statuses.lock().await;
            guard.insert(id, JobState::Queued);
        }
        let job = Job { id, input };
        self.tx.send(job).await.map_err(|_| ApiError {
            error: "queue_send_failed".into(),
            detail: Some("worker not available".into()),
        })?;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        let guard = self.statuses.lock().await;
        guard.get(&id).cloned().map(|state| JobInfo {
            id: id.to_string(),
            state,
        })
    }

    /// Archive bytes of a completed job, if the job exists and succeeded.
    pub async fn get_archive(&self, id: Uuid) -> Option<Vec<u8>> {
        let guard = self.archives.lock().await;
        guard.get(&id).cloned()
    }
}

fn queue_capacity_from_env() -> usize {
    std::env::var("QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn enqueued_job_completes_and_serves_its_archive() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let (queue, _worker) = JobQueue::spawn(pipeline);

        // Empty input still produces a valid (empty) archive.
        let id = queue.enqueue_bundle(String::new()).await.expect("enqueue");

        let mut completed = None;
        for _ in 0..50 {
            if let Some(info) = queue.get(id).await
                && let JobState::Completed { summary } = info.state
            {
                completed = Some(summary);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let summary = completed.expect("job completed");
        assert_eq!(summary.records, 0);

        let archive = queue.get_archive(id).await.expect("archive retained");
        assert_eq!(archive.len(), summary.archive_bytes);
    }

    #[tokio::test]
    async fn unknown_job_id_returns_nothing() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let (queue, _worker) = JobQueue::spawn(pipeline);
        assert!(queue.get(Uuid::new_v4()).await.is_none());
        assert!(queue.get_archive(Uuid::new_v4()).await.is_none());
    }
}
