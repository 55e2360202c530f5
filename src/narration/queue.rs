// SYNOID Narration Job Queue
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Every job runs its own pipeline on its own task. Jobs share nothing but
// the rewrite service handle; intervals inside a job stay sequential.

use crate::narration::config::NarrationConfig;
use crate::narration::error::NarrationError;
use crate::narration::pipeline::{NarrationOptions, NarrationPipeline, NarrationResult};
use crate::narration::rewrite::RewriteService;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed { duration_secs: f64 },
    Cancelled,
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Cancelled | JobStatus::Failed { .. }
        )
    }
}

#[derive(Debug, Default)]
struct JobProgress {
    done: AtomicUsize,
    total: AtomicUsize,
}

struct NarrationJob {
    id: Uuid,
    options: NarrationOptions,
    status: JobStatus,
    created_at: Instant,
    cancel: CancellationToken,
    progress: Arc<JobProgress>,
    result: Option<NarrationResult>,
}

impl NarrationJob {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status.clone(),
            intervals_done: self.progress.done.load(Ordering::SeqCst),
            intervals_total: self.progress.total.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub intervals_done: usize,
    pub intervals_total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub options: NarrationOptions,
    pub result: Option<NarrationResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

/// Drop the oldest finished jobs until at most `keep` remain. Jobs that
/// are still queued or processing are never dropped.
fn evict_finished(jobs: &mut Vec<NarrationJob>, keep: usize) {
    let finished = jobs.iter().filter(|j| j.status.is_finished()).count();
    let mut excess = finished.saturating_sub(keep);
    if excess == 0 {
        return;
    }
    jobs.retain(|job| {
        if excess > 0 && job.status.is_finished() {
            excess -= 1;
            debug!("[QUEUE] Evicting finished job {}", job.id);
            false
        } else {
            true
        }
    });
}

#[derive(Clone)]
pub struct NarrationQueue {
    jobs: Arc<Mutex<Vec<NarrationJob>>>,
    config: Arc<NarrationConfig>,
    service: Arc<dyn RewriteService>,
}

impl NarrationQueue {
    pub fn new(config: NarrationConfig, service: Arc<dyn RewriteService>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(config),
            service,
        }
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    /// Register a job and start it right away on its own task.
    pub async fn add_job(&self, analysis: serde_json::Value, options: NarrationOptions) -> Uuid {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let progress = Arc::new(JobProgress::default());

        {
            let mut jobs = self.jobs.lock().await;
            evict_finished(&mut jobs, self.config.max_finished_jobs);
            jobs.push(NarrationJob {
                id,
                options: options.clone(),
                status: JobStatus::Queued,
                created_at: Instant::now(),
                cancel: cancel.clone(),
                progress: progress.clone(),
                result: None,
            });
        }
        info!("[QUEUE] Added job {}", id);

        let jobs = self.jobs.clone();
        let pipeline = NarrationPipeline::new((*self.config).clone(), self.service.clone());
        tokio::spawn(async move {
            {
                let mut jobs = jobs.lock().await;
                if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                    job.status = JobStatus::Processing;
                }
            }
            info!("[QUEUE] Processing job {}", id);

            let tracker = progress.clone();
            let on_interval = move |done: usize, total: usize| {
                tracker.done.store(done, Ordering::SeqCst);
                tracker.total.store(total, Ordering::SeqCst);
            };
            let outcome = pipeline
                .run(
                    &analysis,
                    &options,
                    &cancel,
                    Some(&on_interval as &(dyn Fn(usize, usize) + Send + Sync)),
                )
                .await;

            let mut jobs = jobs.lock().await;
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return;
            };
            match outcome {
                Ok(result) => {
                    job.progress.total.store(result.report.total_intervals, Ordering::SeqCst);
                    if result.report.cancelled {
                        warn!("[QUEUE] Job {} cancelled with {} intervals done", id, result.intervals.len());
                        job.status = JobStatus::Cancelled;
                    } else {
                        let duration = job.created_at.elapsed().as_secs_f64();
                        info!("[QUEUE] Job {} completed in {:.1}s", id, duration);
                        job.status = JobStatus::Completed { duration_secs: duration };
                    }
                    job.result = Some(result);
                }
                Err(NarrationError::Cancelled) => job.status = JobStatus::Cancelled,
                Err(e) => {
                    error!("[QUEUE] Job {} failed: {}", id, e);
                    job.status = JobStatus::Failed { error: e.to_string() };
                }
            }
        });

        id
    }

    pub async fn get_job_status(&self, id: Uuid) -> Option<JobStatus> {
        let jobs = self.jobs.lock().await;
        jobs.iter().find(|j| j.id == id).map(|j| j.status.clone())
    }

    pub async fn get_job(&self, id: Uuid) -> Option<JobSnapshot> {
        let jobs = self.jobs.lock().await;
        jobs.iter().find(|j| j.id == id).map(|j| JobSnapshot {
            summary: j.summary(),
            options: j.options.clone(),
            result: j.result.clone(),
        })
    }

    pub async fn list_jobs(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.lock().await;
        jobs.iter().map(NarrationJob::summary).collect()
    }

    /// Signal a running job to stop. Returns `None` for unknown ids and
    /// `Some(false)` when the job had already finished.
    pub async fn cancel_job(&self, id: Uuid) -> Option<bool> {
        let jobs = self.jobs.lock().await;
        let job = jobs.iter().find(|j| j.id == id)?;
        if job.status.is_finished() {
            return Some(false);
        }
        info!("[QUEUE] Cancelling job {}", id);
        job.cancel.cancel();
        Some(true)
    }

    pub async fn counts(&self) -> QueueCounts {
        let jobs = self.jobs.lock().await;
        let mut counts = QueueCounts::default();
        for job in jobs.iter() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed { .. } => counts.completed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
                JobStatus::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::error::Result;
    use crate::narration::prompt::ChatMessage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct EchoService;

    #[async_trait]
    impl RewriteService for EchoService {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok("word ".repeat(14))
        }
    }

    async fn wait_finished(queue: &NarrationQueue, id: Uuid) -> JobStatus {
        for _ in 0..200 {
            if let Some(status) = queue.get_job_status(id).await {
                if status.is_finished() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[tokio::test]
    async fn test_job_completes_with_result() {
        let queue = NarrationQueue::new(NarrationConfig::default(), Arc::new(EchoService));
        let analysis = json!([{"startTimeMs": 0, "endTimeMs": 4000, "description": "A field.", "transcriptPhraseCount": 0}]);

        let id = queue.add_job(analysis, NarrationOptions::default()).await;
        assert!(matches!(wait_finished(&queue, id).await, JobStatus::Completed { .. }));

        let snapshot = queue.get_job(id).await.unwrap();
        let result = snapshot.result.unwrap();
        assert_eq!(result.intervals.len(), 1);
        assert_eq!(result.report.accepted, 1);
        assert_eq!(snapshot.summary.intervals_done, 1);
        assert_eq!(queue.counts().await.completed, 1);
    }

    #[tokio::test]
    async fn test_invalid_analysis_fails_job() {
        let queue = NarrationQueue::new(NarrationConfig::default(), Arc::new(EchoService));
        let id = queue.add_job(json!({"contents": []}), NarrationOptions::default()).await;

        match wait_finished(&queue, id).await {
            JobStatus::Failed { error } => assert!(error.contains("invalid analysis input")),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(queue.cancel_job(id).await, Some(false));
        assert_eq!(queue.cancel_job(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_are_evicted() {
        let config = NarrationConfig {
            max_finished_jobs: 1,
            ..NarrationConfig::default()
        };
        let queue = NarrationQueue::new(config, Arc::new(EchoService));
        let analysis = json!([{"startTimeMs": 0, "endTimeMs": 4000, "description": "A field.", "transcriptPhraseCount": 0}]);

        let first = queue.add_job(analysis.clone(), NarrationOptions::default()).await;
        wait_finished(&queue, first).await;
        let second = queue.add_job(analysis.clone(), NarrationOptions::default()).await;
        wait_finished(&queue, second).await;

        let third = queue.add_job(analysis, NarrationOptions::default()).await;
        assert!(queue.get_job(first).await.is_none());
        assert!(queue.get_job(second).await.is_some());
        assert!(queue.get_job(third).await.is_some());
        wait_finished(&queue, third).await;
        assert_eq!(queue.list_jobs().await.len(), 2);
    }
}
