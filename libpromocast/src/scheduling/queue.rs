//! Time-ordered holding area for publish jobs
//!
//! Jobs are ordered by due time, ties broken by insertion order. Nothing is
//! dropped: every stored job is released by [`SchedulingQueue::drain_due`]
//! once its time arrives, or handed back by [`SchedulingQueue::drain_all`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::types::{JobState, PublishJob};

/// Result of handing a job to the queue
#[derive(Debug)]
pub enum Enqueued {
    /// No future time: dispatch now
    Due(PublishJob),
    /// Held until its time
    Scheduled,
}

#[derive(Debug)]
struct Entry {
    due: DateTime<Utc>,
    seq: u64,
    job: PublishJob,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Debug, Default)]
pub struct SchedulingQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl SchedulingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a job, releasing it at once when `scheduled_at` is absent or not
    /// after `now`. Held jobs move to [`JobState::Scheduled`].
    pub fn enqueue(&mut self, mut job: PublishJob, now: DateTime<Utc>) -> Enqueued {
        match job.scheduled_at {
            Some(at) if at > now => {
                job.state = JobState::Scheduled;
                self.push(at, job);
                Enqueued::Scheduled
            }
            _ => Enqueued::Due(job),
        }
    }

    /// Re-submit a job to be released at `at`, keeping its state.
    ///
    /// Used for rate-limit deferrals and retry backoff.
    pub fn enqueue_at(&mut self, job: PublishJob, at: DateTime<Utc>) {
        self.push(at, job);
    }

    fn push(&mut self, due: DateTime<Utc>, job: PublishJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { due, seq, job }));
    }

    /// Lazily remove and yield every job due at `now`, earliest first
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> DrainDue<'_> {
        DrainDue { queue: self, now }
    }

    /// Remove every held job regardless of due time, in due order
    pub fn drain_all(&mut self) -> Vec<PublishJob> {
        let mut jobs = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(entry)) = self.heap.pop() {
            jobs.push(entry.job);
        }
        jobs
    }

    /// Earliest due time among held jobs
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(entry)| entry.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether any held job belongs to `run_id`
    pub fn holds_run(&self, run_id: &str) -> bool {
        self.heap.iter().any(|Reverse(entry)| entry.job.run_id == run_id)
    }

    /// Remove every held job of `run_id`, in due order; other runs keep their order
    pub fn remove_run(&mut self, run_id: &str) -> Vec<PublishJob> {
        if !self.holds_run(run_id) {
            return Vec::new();
        }
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|Reverse(entry)| entry.job.run_id == run_id);
        self.heap = kept.into_iter().collect();

        let mut removed: Vec<Entry> = removed.into_iter().map(|Reverse(entry)| entry).collect();
        removed.sort();
        removed.into_iter().map(|entry| entry.job).collect()
    }
}

/// Iterator returned by [`SchedulingQueue::drain_due`]
pub struct DrainDue<'a> {
    queue: &'a mut SchedulingQueue,
    now: DateTime<Utc>,
}

impl Iterator for DrainDue<'_> {
    type Item = PublishJob;

    fn next(&mut self) -> Option<PublishJob> {
        match self.queue.heap.peek() {
            Some(Reverse(entry)) if entry.due <= self.now => {
                self.queue.heap.pop().map(|Reverse(entry)| entry.job)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlatformPayload;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn job(platform: &str, at: Option<DateTime<Utc>>) -> PublishJob {
        let payload = PlatformPayload {
            platform: platform.to_string(),
            title: String::new(),
            rendered_text: "hello".to_string(),
            media: vec![],
            metadata: Default::default(),
            requires_manual_action: false,
        };
        PublishJob::new("run", payload, at)
    }

    fn platforms(jobs: impl IntoIterator<Item = PublishJob>) -> Vec<String> {
        jobs.into_iter().map(|job| job.platform).collect()
    }

    #[test]
    fn test_absent_or_past_time_is_due_immediately() {
        let mut queue = SchedulingQueue::new();

        assert!(matches!(queue.enqueue(job("a", None), now()), Enqueued::Due(_)));
        assert!(matches!(
            queue.enqueue(job("b", Some(now() - Duration::minutes(5))), now()),
            Enqueued::Due(_)
        ));
        assert!(matches!(queue.enqueue(job("c", Some(now())), now()), Enqueued::Due(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_future_job_is_held_and_marked_scheduled() {
        let mut queue = SchedulingQueue::new();
        let at = now() + Duration::hours(1);

        assert!(matches!(queue.enqueue(job("a", Some(at)), now()), Enqueued::Scheduled));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due_at(), Some(at));
        assert!(queue.holds_run("run"));
        assert_eq!(queue.drain_due(now()).count(), 0);

        let released: Vec<PublishJob> = queue.drain_due(at).collect();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].state, JobState::Scheduled);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_orders_by_time_then_insertion() {
        let mut queue = SchedulingQueue::new();
        let t1 = now() + Duration::minutes(1);
        let t2 = now() + Duration::minutes(2);

        queue.enqueue(job("late", Some(t2)), now());
        queue.enqueue(job("first", Some(t1)), now());
        queue.enqueue(job("second", Some(t1)), now());
        queue.enqueue(job("third", Some(t1)), now());

        assert_eq!(
            platforms(queue.drain_due(t2)),
            vec!["first", "second", "third", "late"]
        );
    }

    #[test]
    fn test_drain_is_restartable_and_never_repeats() {
        let mut queue = SchedulingQueue::new();
        for minutes in 1..=3 {
            queue.enqueue(
                job(&format!("m{}", minutes), Some(now() + Duration::minutes(minutes))),
                now(),
            );
        }

        assert_eq!(platforms(queue.drain_due(now() + Duration::minutes(1))), vec!["m1"]);
        assert_eq!(platforms(queue.drain_due(now() + Duration::minutes(1))), Vec::<String>::new());
        assert_eq!(
            platforms(queue.drain_due(now() + Duration::minutes(5))),
            vec!["m2", "m3"]
        );
    }

    #[test]
    fn test_drain_is_lazy() {
        let mut queue = SchedulingQueue::new();
        queue.enqueue(job("a", Some(now() + Duration::seconds(1))), now());
        queue.enqueue(job("b", Some(now() + Duration::seconds(2))), now());

        let first = queue.drain_due(now() + Duration::seconds(10)).next();
        assert_eq!(first.map(|job| job.platform), Some("a".to_string()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_enqueue_at_keeps_state() {
        let mut queue = SchedulingQueue::new();
        let mut deferred = job("a", None);
        deferred.state = JobState::Pending;
        queue.enqueue_at(deferred, now() + Duration::seconds(5));

        let released: Vec<PublishJob> = queue.drain_due(now() + Duration::seconds(5)).collect();
        assert_eq!(released[0].state, JobState::Pending);
    }

    #[test]
    fn test_drain_all_empties_queue() {
        let mut queue = SchedulingQueue::new();
        queue.enqueue(job("b", Some(now() + Duration::days(2))), now());
        queue.enqueue(job("a", Some(now() + Duration::days(1))), now());

        assert_eq!(platforms(queue.drain_all()), vec!["a", "b"]);
        assert!(queue.next_due_at().is_none());
    }

    #[test]
    fn test_remove_run_leaves_other_runs_in_order() {
        let mut queue = SchedulingQueue::new();
        let other = |platform: &str, minutes: i64| {
            let mut job = job(platform, Some(now() + Duration::minutes(minutes)));
            job.run_id = "other".to_string();
            job
        };
        let (o1, o2) = (other("o1", 1), other("o2", 4));
        queue.enqueue(o1, now());
        queue.enqueue(job("b", Some(now() + Duration::minutes(3))), now());
        queue.enqueue(o2, now());
        queue.enqueue(job("a", Some(now() + Duration::minutes(2))), now());

        assert_eq!(platforms(queue.remove_run("run")), vec!["a", "b"]);
        assert!(!queue.holds_run("run"));
        assert!(queue.remove_run("run").is_empty());
        assert_eq!(platforms(queue.drain_all()), vec!["o1", "o2"]);
    }
}
