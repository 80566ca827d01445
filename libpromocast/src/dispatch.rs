//! Dispatch executor
//!
//! [`DispatchExecutor::dispatch`] makes at most one publish call per
//! invocation. Waiting is never done here: a rate-limit deferral or a
//! transient failure with attempts left comes back as an outcome carrying the
//! time at which the caller should re-submit the job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{DispatchConfig, PlatformRegistry};
use crate::error::SkipReason;
use crate::publishers::PublisherRegistry;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::scheduling::Clock;
use crate::types::{JobState, PublishJob};

/// Result of one dispatch invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Posted, or prepared for manual posting when `manual` is set
    Succeeded {
        external_id: Option<String>,
        manual: bool,
    },
    /// Terminal failure; the error is recorded on the job
    Failed { error: String },
    /// Nothing to publish with
    Skipped { reason: SkipReason },
    /// Rate limit exhausted; no call was made and no attempt counted
    Deferred { retry_at: DateTime<Utc> },
    /// Transient failure with attempts left
    Retry { retry_at: DateTime<Utc>, error: String },
}

impl JobOutcome {
    /// Whether the job must be re-submitted
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobOutcome::Deferred { retry_at } | JobOutcome::Retry { retry_at, .. } => Some(*retry_at),
            _ => None,
        }
    }

    /// Outcome for a job stopped by cancellation before its next call
    pub(crate) fn cancelled(job: &PublishJob) -> Self {
        if job.attempt_count == 0 {
            return JobOutcome::Skipped {
                reason: SkipReason::Cancelled,
            };
        }
        JobOutcome::Failed {
            error: format!(
                "cancelled after {} attempt(s): {}",
                job.attempt_count,
                job.last_error.as_deref().unwrap_or("no error recorded")
            ),
        }
    }
}

pub struct DispatchExecutor {
    registry: Arc<PlatformRegistry>,
    publishers: PublisherRegistry,
    limiter: RateLimiter,
    settings: DispatchConfig,
    permits: Semaphore,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl DispatchExecutor {
    pub fn new(
        registry: Arc<PlatformRegistry>,
        publishers: PublisherRegistry,
        settings: DispatchConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            publishers,
            limiter: RateLimiter::new(),
            permits: Semaphore::new(settings.max_concurrent.max(1)),
            settings,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting publish calls once `cancel` fires, even for jobs already
    /// waiting on a call slot
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether a job for `platform` can reach a publisher at all
    pub fn can_publish(&self, platform: &str) -> bool {
        self.publishers.contains(platform)
    }

    /// Make one attempt at `job`, updating its state, attempt count and error
    pub async fn dispatch(&self, job: &mut PublishJob) -> JobOutcome {
        self.dispatch_unless(job, &CancellationToken::new()).await
    }

    /// Like [`dispatch`](Self::dispatch), but also gives up before the call
    /// when `run` is cancelled, e.g. by cancelling one run only
    pub async fn dispatch_unless(&self, job: &mut PublishJob, run: &CancellationToken) -> JobOutcome {
        let outcome = self.attempt(job, run).await;

        match &outcome {
            JobOutcome::Succeeded { .. } => {
                job.state = JobState::Succeeded;
                job.last_error = None;
            }
            JobOutcome::Failed { error } => {
                job.state = JobState::Failed;
                job.last_error = Some(error.clone());
            }
            JobOutcome::Skipped { reason } => {
                job.state = JobState::Skipped;
                job.last_error = Some(reason.to_string());
            }
            JobOutcome::Deferred { .. } => {
                job.state = JobState::Pending;
            }
            JobOutcome::Retry { error, .. } => {
                job.state = JobState::Pending;
                job.last_error = Some(error.clone());
            }
        }

        outcome
    }

    async fn attempt(&self, job: &mut PublishJob, run: &CancellationToken) -> JobOutcome {
        if job.payload.is_none() {
            return JobOutcome::Failed {
                error: "job has no payload".to_string(),
            };
        }

        if job.requires_manual_action() {
            info!(platform = %job.platform, "Content prepared for manual publishing");
            return JobOutcome::Succeeded {
                external_id: None,
                manual: true,
            };
        }

        let Some(publisher) = self.publishers.get(&job.platform) else {
            return JobOutcome::Skipped {
                reason: SkipReason::NoPublisher(job.platform.clone()),
            };
        };

        // Waiting for a permit is not a dispatch; the state flips once a call slot is held.
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return JobOutcome::cancelled(job),
            _ = run.cancelled() => return JobOutcome::cancelled(job),
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return JobOutcome::Failed {
                        error: "dispatch executor is shut down".to_string(),
                    }
                }
            },
        };
        if self.cancel.is_cancelled() || run.is_cancelled() {
            return JobOutcome::cancelled(job);
        }

        let limit = self
            .registry
            .get(&job.platform)
            .and_then(|spec| spec.rate_limit.as_ref());
        let now = self.clock.now();
        if let Admission::Deferred { window_reset } =
            self.limiter.try_acquire(&job.platform, limit, now).await
        {
            let retry_at = (now + to_chrono(self.settings.rate_limit_backoff())).min(window_reset);
            if let Some(limit) = limit {
                let used = self.limiter.usage(&job.platform, limit, now).await;
                debug!(
                    platform = %job.platform,
                    used,
                    max_calls = limit.max_calls,
                    %retry_at,
                    "Rate limited, deferring"
                );
            }
            return JobOutcome::Deferred { retry_at };
        }

        job.state = JobState::Dispatching;
        job.attempt_count += 1;
        let attempt = job.attempt_count;
        let max_attempts = self.settings.max_attempts;
        let Some(payload) = job.payload.as_ref() else {
            return JobOutcome::Failed {
                error: "job has no payload".to_string(),
            };
        };

        match publisher.publish(payload).await {
            Ok(external_id) => {
                if attempt > 1 {
                    info!(platform = %job.platform, attempt, "Published after retry");
                } else {
                    info!(platform = %job.platform, ?external_id, "Published");
                }
                JobOutcome::Succeeded {
                    external_id,
                    manual: false,
                }
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = self.backoff(attempt);
                warn!(
                    "Transient error publishing to {} (attempt {}/{}): {}. Retrying in {:?}",
                    job.platform, attempt, max_attempts, e, delay
                );
                JobOutcome::Retry {
                    retry_at: self.clock.now() + to_chrono(delay),
                    error: e.to_string(),
                }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(
                        "Failed to publish to {} after {} attempts: {}",
                        job.platform, attempt, e
                    );
                } else {
                    warn!(platform = %job.platform, error = %e, "Permanent publish failure");
                }
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Delay before retry number `attempt`: `base * 2^(attempt - 1)`, plus jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.settings.backoff_base().saturating_mul(factor);
        let jitter = self.settings.backoff_jitter;
        if jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = delay.mul_f64(rand::thread_rng().gen_range(0.0..=jitter));
        delay.saturating_add(extra)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterKind;
    use crate::config::{PlatformSpec, RateLimitSpec};
    use crate::error::PlatformError;
    use crate::publishers::{MockPublisher, MockResponse};
    use crate::scheduling::ManualClock;
    use crate::types::PlatformPayload;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn job(platform: &str, manual: bool) -> PublishJob {
        PublishJob::new(
            "run",
            PlatformPayload {
                platform: platform.to_string(),
                title: String::new(),
                rendered_text: "hello".to_string(),
                media: vec![],
                metadata: Default::default(),
                requires_manual_action: manual,
            },
            None,
        )
    }

    fn executor(
        specs: Vec<PlatformSpec>,
        mocks: &[&MockPublisher],
        clock: Arc<ManualClock>,
    ) -> DispatchExecutor {
        let mut publishers = PublisherRegistry::new();
        for mock in mocks {
            publishers.register(Arc::new((*mock).clone()));
        }
        DispatchExecutor::new(
            Arc::new(PlatformRegistry::new(specs)),
            publishers,
            DispatchConfig::default(),
            clock,
        )
    }

    #[tokio::test]
    async fn test_success_records_external_id() {
        let mock = MockPublisher::success("x");
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(vec![PlatformSpec::new("x", AdapterKind::Text)], &[&mock], clock);

        let mut job = job("x", false);
        let outcome = exec.dispatch(&mut job).await;

        assert_eq!(
            outcome,
            JobOutcome::Succeeded {
                external_id: Some("x-1".to_string()),
                manual: false
            }
        );
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_manual_payload_never_calls_publisher() {
        let mock = MockPublisher::success("douyin");
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(
            vec![PlatformSpec::new("douyin", AdapterKind::Manual).with_rate_limit(1, Duration::from_secs(60))],
            &[&mock],
            clock.clone(),
        );

        for _ in 0..3 {
            let mut job = job("douyin", true);
            let outcome = exec.dispatch(&mut job).await;
            assert_eq!(
                outcome,
                JobOutcome::Succeeded {
                    external_id: None,
                    manual: true
                }
            );
            assert_eq!(job.attempt_count, 0);
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_backs_off_exponentially() {
        let mock = MockPublisher::failing("x", PlatformError::Server("503".to_string()));
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(vec![PlatformSpec::new("x", AdapterKind::Text)], &[&mock], clock.clone());
        let mut job = job("x", false);

        let first = exec.dispatch(&mut job).await;
        assert_eq!(first.retry_at(), Some(start() + chrono::Duration::seconds(1)));
        assert_eq!(job.state, JobState::Pending);

        let second = exec.dispatch(&mut job).await;
        assert_eq!(second.retry_at(), Some(start() + chrono::Duration::seconds(2)));

        let third = exec.dispatch(&mut job).await;
        assert!(matches!(third, JobOutcome::Failed { .. }));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempt_count, 3);
        assert_eq!(mock.call_count(), 3);
        assert!(job.last_error.as_deref().unwrap_or_default().contains("503"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mock = MockPublisher::failing("x", PlatformError::Authentication("bad token".to_string()));
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(vec![PlatformSpec::new("x", AdapterKind::Text)], &[&mock], clock);
        let mut job = job("x", false);

        let outcome = exec.dispatch(&mut job).await;
        assert!(matches!(outcome, JobOutcome::Failed { .. }));
        assert_eq!(outcome.retry_at(), None);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_defers_without_counting_attempt() {
        let mock = MockPublisher::success("x");
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(
            vec![PlatformSpec::new("x", AdapterKind::Text).with_rate_limit(1, Duration::from_secs(3600))],
            &[&mock],
            clock.clone(),
        );

        let mut first = job("x", false);
        exec.dispatch(&mut first).await;

        let mut second = job("x", false);
        let outcome = exec.dispatch(&mut second).await;
        assert_eq!(
            outcome,
            JobOutcome::Deferred {
                retry_at: start() + chrono::Duration::seconds(5)
            }
        );
        assert_eq!(second.state, JobState::Pending);
        assert_eq!(second.attempt_count, 0);
        assert_eq!(mock.call_count(), 1);

        // Near the end of the window the deferral is capped at the reset.
        clock.set(start() + chrono::Duration::seconds(3598));
        let outcome = exec.dispatch(&mut second).await;
        assert_eq!(outcome.retry_at(), Some(start() + chrono::Duration::hours(1)));

        clock.set(start() + chrono::Duration::hours(1));
        let outcome = exec.dispatch(&mut second).await;
        assert!(matches!(outcome, JobOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_missing_publisher_is_skipped() {
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(vec![PlatformSpec::new("x", AdapterKind::Text)], &[], clock);
        let mut job = job("x", false);

        let outcome = exec.dispatch(&mut job).await;
        assert_eq!(
            outcome,
            JobOutcome::Skipped {
                reason: SkipReason::NoPublisher("x".to_string())
            }
        );
        assert_eq!(job.state, JobState::Skipped);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mock = MockPublisher::scripted(
            "x",
            [MockResponse::Failure(PlatformError::Network("reset".to_string()))],
        );
        let clock = Arc::new(ManualClock::new(start()));
        let exec = executor(vec![PlatformSpec::new("x", AdapterKind::Text)], &[&mock], clock);
        let mut job = job("x", false);

        assert!(matches!(exec.dispatch(&mut job).await, JobOutcome::Retry { .. }));
        assert!(matches!(exec.dispatch(&mut job).await, JobOutcome::Succeeded { .. }));
        assert_eq!(job.attempt_count, 2);
        assert_eq!(job.last_error, None);
    }

    #[tokio::test]
    async fn test_cancelled_job_takes_no_call_and_no_rate_slot() {
        let clock = Arc::new(ManualClock::new(start()));
        let x = MockPublisher::success("x");
        let limit = RateLimitSpec::new(1, Duration::from_secs(3600));
        let spec = PlatformSpec::new("x", AdapterKind::Text).with_rate_limit(1, Duration::from_secs(3600));
        let token = CancellationToken::new();
        let exec = executor(vec![spec], &[&x], clock).with_cancellation(token.clone());

        token.cancel();
        let mut job = job("x", false);
        let outcome = exec.dispatch(&mut job).await;

        assert_eq!(
            outcome,
            JobOutcome::Skipped {
                reason: SkipReason::Cancelled
            }
        );
        assert_eq!(job.state, JobState::Skipped);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(x.call_count(), 0);
        assert_eq!(exec.limiter.usage("x", &limit, start()).await, 0);
    }

    #[tokio::test]
    async fn test_run_cancellation_after_attempts_fails_with_last_error() {
        let clock = Arc::new(ManualClock::new(start()));
        let x = MockPublisher::failing("x", PlatformError::Timeout("slow".to_string()));
        let exec = executor(vec![PlatformSpec::new("x", AdapterKind::Text)], &[&x], clock);
        let run = CancellationToken::new();

        let mut job = job("x", false);
        assert!(exec.dispatch_unless(&mut job, &run).await.retry_at().is_some());

        run.cancel();
        let outcome = exec.dispatch_unless(&mut job, &run).await;
        assert!(matches!(outcome, JobOutcome::Failed { .. }));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempt_count, 1);
        assert!(job.last_error.as_deref().unwrap().starts_with("cancelled after 1 attempt(s)"));
        assert_eq!(x.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_job_waiting_for_call_slot() {
        let clock = Arc::new(ManualClock::new(start()));
        let x = MockPublisher::success("x").with_delay(Duration::from_millis(200));
        let reddit = MockPublisher::success("reddit");
        let token = CancellationToken::new();
        let mut publishers = PublisherRegistry::new();
        publishers.register(Arc::new(x.clone()));
        publishers.register(Arc::new(reddit.clone()));
        let exec = Arc::new(
            DispatchExecutor::new(
                Arc::new(PlatformRegistry::new(vec![
                    PlatformSpec::new("x", AdapterKind::Text),
                    PlatformSpec::new("reddit", AdapterKind::Text),
                ])),
                publishers,
                DispatchConfig {
                    max_concurrent: 1,
                    ..DispatchConfig::default()
                },
                clock,
            )
            .with_cancellation(token.clone()),
        );

        let slow = {
            let exec = exec.clone();
            tokio::spawn(async move {
                let mut pending = job("x", false);
                exec.dispatch(&mut pending).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = {
            let exec = exec.clone();
            tokio::spawn(async move {
                let mut pending = job("reddit", false);
                exec.dispatch(&mut pending).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        assert!(matches!(waiting.await.unwrap(), JobOutcome::Skipped { .. }));
        assert!(matches!(slow.await.unwrap(), JobOutcome::Succeeded { .. }));
        assert_eq!(reddit.call_count(), 0);
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let settings = DispatchConfig {
            backoff_jitter: 0.5,
            ..Default::default()
        };
        let exec = DispatchExecutor::new(
            Arc::new(PlatformRegistry::default()),
            PublisherRegistry::new(),
            settings,
            Arc::new(ManualClock::new(start())),
        );
        for _ in 0..20 {
            let delay = exec.backoff(3);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(6));
        }
    }
}
