// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Job Queue
//!
//! Keyed work list for development, testing, and single-node deployments.
//! Guarantees at most one live job per registration id: while a key has a
//! pending or running job, further enqueues are absorbed and handed the
//! existing job handle. Per-key uniqueness is the only concurrency-control
//! primitive the pipeline needs; duplicate work is structurally impossible
//! to enqueue.
//!
//! Finished jobs are kept in a bounded window for observability and then
//! discarded. Production deployments use `PostgresJobQueue`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;

use crate::domain::job::{FinishedJob, Job, JobHandle, JobKind, JobOutcome, QueueError};
use crate::domain::registration::RegistrationId;
use crate::domain::repository::{EnqueueReceipt, JobQueue};

pub struct InMemoryJobQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    retention: usize,
}

struct QueueInner {
    /// Jobs waiting for a worker, including ones parked until `next_retry_at`.
    pending: Vec<Job>,
    /// Every reserved key (pending or running) and the handle absorbing
    /// duplicate enqueues for it.
    live: HashMap<RegistrationId, JobHandle>,
    /// Newest-first retention window of finished jobs.
    finished: VecDeque<FinishedJob>,
}

impl InMemoryJobQueue {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: Vec::new(),
                live: HashMap::new(),
                finished: VecDeque::new(),
            }),
            notify: Notify::new(),
            retention,
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        registration_id: RegistrationId,
    ) -> Result<EnqueueReceipt, QueueError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.live.get(&registration_id) {
            return Ok(EnqueueReceipt {
                handle: *existing,
                deduplicated: true,
            });
        }

        let job = Job::new(kind, registration_id);
        let handle = job.handle();
        inner.live.insert(registration_id, handle);
        inner.pending.push(job);
        drop(inner);

        self.notify.notify_waiters();
        Ok(EnqueueReceipt {
            handle,
            deduplicated: false,
        })
    }

    async fn dequeue(&self) -> Result<Job, QueueError> {
        loop {
            // Register interest before inspecting state so a concurrent
            // enqueue cannot slip between the check and the wait.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let earliest = {
                let mut inner = self.inner.lock();
                let now = Utc::now();
                if let Some(idx) = inner
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, j)| j.next_retry_at <= now)
                    .min_by_key(|(_, j)| j.next_retry_at)
                    .map(|(i, _)| i)
                {
                    return Ok(inner.pending.swap_remove(idx));
                }
                inner.pending.iter().map(|j| j.next_retry_at).min()
            };

            match earliest {
                Some(due) => {
                    let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn complete(&self, job: &Job, outcome: JobOutcome) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner.live.remove(&job.registration_id);
        inner.finished.push_front(FinishedJob {
            job: job.clone(),
            outcome,
            finished_at: Utc::now(),
        });
        inner.finished.truncate(self.retention);
        Ok(())
    }

    async fn retry(&self, job: &Job, delay: Duration, error: String) -> Result<(), QueueError> {
        let mut rescheduled = job.clone();
        rescheduled.attempt += 1;
        rescheduled.next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| QueueError::Backend(format!("retry delay out of range: {e}")))?;

        tracing::debug!(
            job_id = %job.id,
            registration_id = %job.registration_id,
            attempt = rescheduled.attempt,
            error = %error,
            "Rescheduling job"
        );

        let mut inner = self.inner.lock();
        inner.pending.push(rescheduled);
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().live.len())
    }

    async fn recent(&self) -> Result<Vec<FinishedJob>, QueueError> {
        Ok(self.inner.lock().finished.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn enqueue_then_dequeue_returns_the_job() {
        let queue = InMemoryJobQueue::default();
        let registration_id = RegistrationId::new();

        let receipt = queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();
        assert!(!receipt.deduplicated);

        let job = queue.dequeue().await.unwrap();
        assert_eq!(job.registration_id, registration_id);
        assert_eq!(job.kind, JobKind::GenerateFullCredential);
        assert_eq!(job.attempt, 0);
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_absorbed() {
        let queue = InMemoryJobQueue::default();
        let registration_id = RegistrationId::new();

        let first = queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();
        let second = queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.handle.id, second.handle.id);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn key_stays_reserved_while_job_is_running() {
        let queue = InMemoryJobQueue::default();
        let registration_id = RegistrationId::new();

        queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();
        let job = queue.dequeue().await.unwrap();

        // Job is running (not pending), but the key is still held.
        let receipt = queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();
        assert!(receipt.deduplicated);

        queue.complete(&job, JobOutcome::Completed).await.unwrap();

        // Key released; a fresh enqueue creates a new job.
        let receipt = queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();
        assert!(!receipt.deduplicated);
    }

    #[tokio::test]
    async fn concurrent_enqueues_for_one_key_yield_one_job() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let registration_id = RegistrationId::new();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    queue
                        .enqueue(JobKind::GenerateFullCredential, registration_id)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut fresh = 0;
        for task in tasks {
            if !task.await.unwrap().deduplicated {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retried_job_is_withheld_until_due() {
        let queue = InMemoryJobQueue::default();
        let registration_id = RegistrationId::new();

        queue
            .enqueue(JobKind::GenerateFullCredential, registration_id)
            .await
            .unwrap();
        let job = queue.dequeue().await.unwrap();

        queue
            .retry(&job, Duration::from_millis(150), "storage hiccup".to_string())
            .await
            .unwrap();

        // Not due yet.
        let premature =
            tokio::time::timeout(Duration::from_millis(20), queue.dequeue()).await;
        assert!(premature.is_err());

        // After the delay elapses the job comes back with the bumped attempt.
        let job = tokio::time::timeout(Duration::from_secs(5), queue.dequeue())
            .await
            .expect("job should be due")
            .unwrap();
        assert_eq!(job.attempt, 1);
    }

    #[tokio::test]
    async fn finished_jobs_are_retained_up_to_the_cap() {
        let queue = InMemoryJobQueue::new(3);
        for _ in 0..5 {
            let registration_id = RegistrationId::new();
            queue
                .enqueue(JobKind::GenerateSimpleCredential, registration_id)
                .await
                .unwrap();
            let job = queue.dequeue().await.unwrap();
            queue.complete(&job, JobOutcome::Completed).await.unwrap();
        }

        let recent = queue.recent().await.unwrap();
        assert_eq!(recent.len(), 3);
        // Newest first.
        assert!(recent[0].finished_at >= recent[2].finished_at);
    }
}
