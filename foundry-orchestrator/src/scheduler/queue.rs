//! Priority queue of pending jobs
//!
//! Entries are served by priority (highest first), then by submission time
//! (earliest first), then by insertion order. The queue only ever holds
//! job identifiers; the job store stays the authority on status.

use chrono::{DateTime, Utc};
use foundry_core::dto::job::QueueEntry;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

/// Sort key: priority descending, submission ascending, insertion ascending
type QueueKey = (Reverse<i32>, DateTime<Utc>, u64);

/// Queue error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job {0} is already queued")]
    DuplicateEntry(Uuid),
}

#[derive(Debug, Default)]
struct QueueState {
    ordered: BTreeMap<QueueKey, Uuid>,
    index: HashMap<Uuid, QueueKey>,
    next_seq: u64,
}

/// Shared priority queue with blocking, bounded-wait dequeue
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Puts a previously dequeued entry back
    pub fn requeue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        self.enqueue(entry.job_id, entry.priority, entry.submitted_at)
    }

    /// Adds a job. Fails if the job is already queued.
    pub fn enqueue(
        &self,
        job_id: Uuid,
        priority: i32,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        {
            let mut state = self.state();
            if state.index.contains_key(&job_id) {
                return Err(QueueError::DuplicateEntry(job_id));
            }

            let key = (Reverse(priority), submitted_at, state.next_seq);
            state.next_seq += 1;
            state.ordered.insert(key, job_id);
            state.index.insert(job_id, key);
        }

        self.available.notify_one();
        Ok(())
    }

    /// Removes and returns the most urgent job, if any, without waiting
    ///
    /// The entry keeps the job's ordering fields so it can be put back.
    pub fn try_dequeue(&self) -> Option<QueueEntry> {
        let mut state = self.state();
        let ((Reverse(priority), submitted_at, _), job_id) = state.ordered.pop_first()?;
        state.index.remove(&job_id);
        Some(QueueEntry {
            job_id,
            priority,
            submitted_at,
        })
    }

    /// Removes and returns the most urgent job, waiting up to `timeout`
    ///
    /// Returns `None` when nothing became available in time.
    pub async fn dequeue(&self, timeout: Duration) -> Option<QueueEntry> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so an enqueue in between is not missed
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_dequeue() {
                return Some(entry);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Removes a job if it is still queued
    ///
    /// Returns whether an entry was removed. Not finding the job is normal:
    /// an executor may already have taken it.
    pub fn remove(&self, job_id: Uuid) -> bool {
        let mut state = self.state();
        match state.index.remove(&job_id) {
            Some(key) => {
                state.ordered.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, job_id: Uuid) -> bool {
        self.state().index.contains_key(&job_id)
    }

    /// Zero-based dispatch position of a queued job
    pub fn position(&self, job_id: Uuid) -> Option<usize> {
        let state = self.state();
        let key = state.index.get(&job_id)?;
        state.ordered.keys().position(|k| k == key)
    }

    pub fn len(&self) -> usize {
        self.state().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().ordered.is_empty()
    }

    /// Entries in dispatch order
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.state()
            .ordered
            .iter()
            .map(|((Reverse(priority), submitted_at, _), job_id)| QueueEntry {
                job_id: *job_id,
                priority: *priority,
                submitted_at: *submitted_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_higher_priority_served_first() {
        let queue = JobQueue::new();
        let t0 = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        queue.enqueue(a, 5, t0).unwrap();
        queue.enqueue(b, 9, t0 + ChronoDuration::seconds(1)).unwrap();

        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(b));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(a));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), None);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let queue = JobQueue::new();
        let t0 = Utc::now();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        queue.enqueue(second, 3, t0 + ChronoDuration::milliseconds(5)).unwrap();
        queue.enqueue(first, 3, t0).unwrap();

        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(first));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(second));
    }

    #[test]
    fn test_identical_instant_breaks_tie_by_insertion() {
        let queue = JobQueue::new();
        let t0 = Utc::now();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            queue.enqueue(*id, 1, t0).unwrap();
        }

        let served: Vec<Uuid> =
            std::iter::from_fn(|| queue.try_dequeue().map(|e| e.job_id)).collect();
        assert_eq!(served, ids);
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let queue = JobQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(id, 1, Utc::now()).unwrap();

        assert_eq!(
            queue.enqueue(id, 7, Utc::now()),
            Err(QueueError::DuplicateEntry(id))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_job_can_be_requeued_after_dequeue() {
        let queue = JobQueue::new();
        let id = Uuid::new_v4();
        queue.enqueue(id, 1, Utc::now()).unwrap();
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(id));
        assert!(queue.enqueue(id, 1, Utc::now()).is_ok());
    }

    #[test]
    fn test_requeued_entry_keeps_its_place() {
        let queue = JobQueue::new();
        let t0 = Utc::now();
        let early = Uuid::new_v4();
        let late = Uuid::new_v4();
        queue.enqueue(early, 4, t0).unwrap();
        queue.enqueue(late, 4, t0 + ChronoDuration::seconds(1)).unwrap();

        let entry = queue.try_dequeue().unwrap();
        assert_eq!(entry.job_id, early);
        assert_eq!(entry.priority, 4);
        assert_eq!(entry.submitted_at, t0);

        queue.requeue(&entry).unwrap();
        assert_eq!(queue.position(early), Some(0));
        assert_eq!(queue.requeue(&entry), Err(QueueError::DuplicateEntry(early)));
    }

    #[test]
    fn test_remove() {
        let queue = JobQueue::new();
        let keep = Uuid::new_v4();
        let drop = Uuid::new_v4();
        queue.enqueue(keep, 1, Utc::now()).unwrap();
        queue.enqueue(drop, 9, Utc::now()).unwrap();

        assert!(queue.remove(drop));
        assert!(!queue.remove(drop));
        assert!(!queue.contains(drop));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(keep));
    }

    #[test]
    fn test_position_and_snapshot() {
        let queue = JobQueue::new();
        let t0 = Utc::now();
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        queue.enqueue(low, 1, t0).unwrap();
        queue.enqueue(high, 8, t0).unwrap();

        assert_eq!(queue.position(high), Some(0));
        assert_eq!(queue.position(low), Some(1));
        assert_eq!(queue.position(Uuid::new_v4()), None);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].job_id, high);
        assert_eq!(snapshot[0].priority, 8);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = JobQueue::new();
        let started = std::time::Instant::now();
        assert_eq!(queue.dequeue(Duration::from_millis(50)).await, None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(JobQueue::new());
        let id = Uuid::new_v4();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(id, 1, Utc::now()).unwrap();

        assert_eq!(waiter.await.unwrap().map(|e| e.job_id), Some(id));
    }

    #[tokio::test]
    async fn test_each_entry_dequeued_exactly_once() {
        let queue = Arc::new(JobQueue::new());
        let ids: Vec<Uuid> = (0..50).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            queue.enqueue(*id, (i % 4) as i32, Utc::now()).unwrap();
        }

        let mut workers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            workers.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(entry) = queue.dequeue(Duration::from_millis(20)).await {
                    taken.push(entry.job_id);
                }
                taken
            }));
        }

        let mut taken = Vec::new();
        for worker in workers {
            taken.extend(worker.await.unwrap());
        }
        taken.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(taken, expected);
    }

    proptest! {
        #[test]
        fn prop_dequeue_order_matches_priority_then_submission(
            entries in proptest::collection::vec((0i32..=10, 0i64..5), 1..40)
        ) {
            let queue = JobQueue::new();
            let t0 = Utc::now();
            let mut expected = Vec::new();

            for (seq, (priority, offset)) in entries.iter().enumerate() {
                let id = Uuid::new_v4();
                let submitted_at = t0 + ChronoDuration::seconds(*offset);
                queue.enqueue(id, *priority, submitted_at).unwrap();
                expected.push((Reverse(*priority), submitted_at, seq, id));
            }
            expected.sort();

            let served: Vec<Uuid> =
            std::iter::from_fn(|| queue.try_dequeue().map(|e| e.job_id)).collect();
            let expected: Vec<Uuid> = expected.into_iter().map(|(_, _, _, id)| id).collect();
            prop_assert_eq!(served, expected);
        }
    }
}
