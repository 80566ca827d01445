//! Publish orchestrator
//!
//! Drives one content bundle through adaptation, scheduling and dispatch for
//! every requested platform and aggregates a [`PublishReport`].
//!
//! Per platform:
//!
//! ```text
//! queued -> skipped | failed (adaptation)
//!        -> scheduled -> dispatching -> succeeded | failed
//!                                    -> pending (deferred or backing off) -> dispatching ...
//! ```
//!
//! Waiting is expressed as re-submission into the shared [`SchedulingQueue`].
//! [`PublishOrchestrator::pump`] dispatches whatever is due; a blocking run
//! pumps in a loop, sleeping on the [`Clock`] until the next due time.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use libpromocast::config::Config;
//! use libpromocast::orchestrator::{PublishOptions, PublishOrchestrator};
//! use libpromocast::publishers::{MockPublisher, PublisherRegistry};
//! use libpromocast::types::{ContentBundle, JobState};
//!
//! # async fn example() -> libpromocast::error::Result<()> {
//! let config = Config::default_config();
//! let x = MockPublisher::success("x");
//! let orchestrator = PublishOrchestrator::builder(
//!     config.registry(),
//!     PublisherRegistry::new().with(Arc::new(x.clone())),
//! )
//! .build();
//!
//! let bundle = ContentBundle::new("Launch", "Promocast 1.0 is out.");
//! let report = orchestrator
//!     .process_and_publish(&bundle, &["x", "tiktok"], None, PublishOptions::default())
//!     .await?;
//!
//! assert_eq!(report.entry("x").map(|e| e.state), Some(JobState::Succeeded));
//! assert_eq!(report.entry("tiktok").map(|e| e.state), Some(JobState::Skipped));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::{Archive, RunRecord};
use crate::cancel::CancellationToken;
use crate::config::{Config, DispatchConfig, PlatformRegistry};
use crate::dispatch::{DispatchExecutor, JobOutcome};
use crate::engine::{Adaptation, ContentAdaptationEngine};
use crate::error::{PromocastError, Result, SkipReason};
use crate::events::{Event, EventBus};
use crate::publishers::PublisherRegistry;
use crate::scheduling::{Clock, Enqueued, SchedulingQueue, SystemClock};
use crate::types::{
    ContentBundle, JobState, PublishJob, PublishReport, ReportEntry, MANUAL_ACTION_KEY,
};

/// Metadata key set when a future-only platform was given a past time
pub const SCHEDULING_CONFLICT_KEY: &str = "scheduling_conflict";

/// Metadata key describing what a manual success means
pub const MANUAL_STATUS_KEY: &str = "manual_status";

/// Fallback poll interval when a blocking run waits on work held by another caller
const IDLE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Adapt only; report `would_publish` and make no publish calls
    pub dry_run: bool,
    /// Return only once every platform is terminal
    pub wait: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            wait: true,
        }
    }
}

impl PublishOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            wait: true,
        }
    }

    /// Dispatch what is due now and return a snapshot
    pub fn non_blocking() -> Self {
        Self {
            dry_run: false,
            wait: false,
        }
    }
}

/// Result of [`PublishOrchestrator::cancel_run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Queued jobs of the run were skipped; calls in flight still finish
    Cancelled,
    /// Every platform of the run had already reached a terminal state
    AlreadyExecuted,
    /// No such run in memory
    NotFound,
}

struct RunState {
    report: PublishReport,
    /// Platform name to index in `report.per_platform`
    index: HashMap<String, usize>,
    completed: bool,
    cancel: CancellationToken,
}

impl RunState {
    /// Apply `entry`; returns the report when this update completed the run
    fn update(&mut self, entry: ReportEntry) -> Option<PublishReport> {
        let slot = self.index.get(&entry.platform).copied()?;
        self.report.per_platform[slot] = entry;
        self.take_completion()
    }

    fn take_completion(&mut self) -> Option<PublishReport> {
        if self.completed || !self.report.is_complete() {
            return None;
        }
        self.completed = true;
        Some(self.report.clone())
    }
}

pub struct OrchestratorBuilder {
    registry: Arc<PlatformRegistry>,
    publishers: PublisherRegistry,
    settings: DispatchConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    archive: Option<Archive>,
    cancel: CancellationToken,
}

impl OrchestratorBuilder {
    pub fn dispatch(mut self, settings: DispatchConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn archive(mut self, archive: Archive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> PublishOrchestrator {
        PublishOrchestrator {
            engine: ContentAdaptationEngine::new(self.registry.clone()),
            executor: DispatchExecutor::new(
                self.registry,
                self.publishers,
                self.settings,
                self.clock.clone(),
            )
            .with_cancellation(self.cancel.clone()),
            queue: Mutex::new(SchedulingQueue::new()),
            runs: Mutex::new(HashMap::new()),
            queue_changed: Notify::new(),
            clock: self.clock,
            events: self.events,
            archive: self.archive,
            cancel: self.cancel,
        }
    }
}

pub struct PublishOrchestrator {
    engine: ContentAdaptationEngine,
    executor: DispatchExecutor,
    queue: Mutex<SchedulingQueue>,
    runs: Mutex<HashMap<String, RunState>>,
    queue_changed: Notify,
    clock: Arc<dyn Clock>,
    events: EventBus,
    archive: Option<Archive>,
    cancel: CancellationToken,
}

impl PublishOrchestrator {
    pub fn builder(registry: Arc<PlatformRegistry>, publishers: PublisherRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            publishers,
            settings: DispatchConfig::default(),
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            archive: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Build from configuration, opening the archive when one is configured
    pub async fn from_config(config: &Config, publishers: PublisherRegistry) -> Result<Self> {
        let mut builder =
            Self::builder(config.registry(), publishers).dispatch(config.dispatch.clone());
        if let Some(archive) = &config.archive {
            let path = crate::config::resolve_archive_path(archive);
            builder = builder.archive(Archive::open(&path.to_string_lossy()).await?);
        }
        Ok(builder.build())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A handle that cancels this orchestrator from elsewhere
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Adapt `bundle` for `platforms` and publish it, now or at `schedule_at`.
    ///
    /// Every requested platform (after name normalization and de-duplication)
    /// gets exactly one report entry, in request order. With
    /// [`PublishOptions::wait`] unset, the returned report is a snapshot; later
    /// [`pump`](Self::pump) calls progress the run and [`report`](Self::report)
    /// reads it.
    pub async fn process_and_publish<S: AsRef<str>>(
        &self,
        bundle: &ContentBundle,
        platforms: &[S],
        schedule_at: Option<DateTime<Utc>>,
        options: PublishOptions,
    ) -> Result<PublishReport> {
        if platforms.iter().all(|name| name.as_ref().trim().is_empty()) {
            return Err(PromocastError::InvalidInput(
                "at least one platform must be requested".to_string(),
            ));
        }

        let run_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let adaptations = self.engine.adapt_all(bundle, platforms);

        info!(
            run_id = %run_id,
            platforms = adaptations.len(),
            dry_run = options.dry_run,
            scheduled = ?schedule_at,
            "Starting publish run"
        );
        self.events.emit(Event::RunStarted {
            run_id: run_id.clone(),
            platforms: adaptations.iter().map(|a| a.platform().to_string()).collect(),
            dry_run: options.dry_run,
        });

        let jobs: Vec<PublishJob> = adaptations
            .into_iter()
            .map(|adaptation| self.prepare_job(adaptation, &run_id, schedule_at, now, options.dry_run))
            .collect();

        let report = PublishReport {
            run_id: run_id.clone(),
            dry_run: options.dry_run,
            created_at: now,
            per_platform: jobs.iter().map(|job| entry_from_job(job, None)).collect(),
        };
        self.archive_run(&report, bundle, schedule_at).await;

        let mut state = RunState {
            index: report
                .per_platform
                .iter()
                .enumerate()
                .map(|(i, entry)| (entry.platform.clone(), i))
                .collect(),
            report,
            completed: false,
            cancel: CancellationToken::new(),
        };
        let completed = state.take_completion();
        self.runs.lock().await.insert(run_id.clone(), state);

        let (settled, pending): (Vec<_>, Vec<_>) =
            jobs.into_iter().partition(|job| job.state.is_terminal());
        for job in &settled {
            self.announce(job, None);
            self.archive_outcome(&run_id, &entry_from_job(job, None)).await;
        }

        let mut due = Vec::new();
        let mut scheduled = Vec::new();
        {
            let mut queue = self.queue.lock().await;
            for job in pending {
                let mut snapshot = job.clone();
                match queue.enqueue(job, now) {
                    Enqueued::Due(job) => due.push(job),
                    Enqueued::Scheduled => {
                        snapshot.state = JobState::Scheduled;
                        scheduled.push(snapshot);
                    }
                }
            }
        }
        self.queue_changed.notify_waiters();
        for job in &scheduled {
            debug!(run_id = %run_id, platform = %job.platform, "Job scheduled");
            self.record(job, None).await;
        }

        if let Some(report) = completed {
            self.finish_run(&report).await;
        }

        self.dispatch_all(due).await;
        if options.wait {
            self.drive(&run_id).await;
            // The caller holds the final report; nothing else reads a finished blocking run.
            if let Some(report) = self.take_report(&run_id).await {
                return Ok(report);
            }
        }

        self.report(&run_id).await.ok_or_else(|| {
            PromocastError::InvalidInput(format!("run {} disappeared", run_id))
        })
    }

    /// Turn one adaptation into a job in its starting state
    fn prepare_job(
        &self,
        adaptation: Adaptation,
        run_id: &str,
        schedule_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> PublishJob {
        let adaptation = match adaptation {
            Adaptation::Ready(mut payload) => {
                let future_only = self
                    .engine
                    .registry()
                    .get(&payload.platform)
                    .is_some_and(|spec| spec.future_only_scheduling);
                if let Some(at) = schedule_at.filter(|at| future_only && *at <= now) {
                    warn!(
                        platform = %payload.platform,
                        scheduled = %at,
                        "Platform only accepts future times; dispatching immediately"
                    );
                    payload.metadata.insert(
                        SCHEDULING_CONFLICT_KEY.to_string(),
                        format!("requested time {} already passed", at.to_rfc3339()),
                    );
                }
                Adaptation::Ready(payload)
            }
            other => other,
        };

        let ready = adaptation.is_ready();
        let mut job = adaptation.into_job(run_id, schedule_at);
        if !ready {
            return job;
        }

        if dry_run {
            job.state = JobState::WouldPublish;
        } else if self.cancel.is_cancelled() {
            job.state = JobState::Skipped;
            job.last_error = Some(SkipReason::Cancelled.to_string());
        } else if !job.requires_manual_action() && !self.executor.can_publish(&job.platform) {
            warn!(platform = %job.platform, "No publisher registered; skipping");
            job.state = JobState::Skipped;
            job.last_error = Some(SkipReason::NoPublisher(job.platform.clone()).to_string());
        }
        job
    }

    /// Dispatch every job due now; returns how many were dispatched
    pub async fn pump(&self) -> usize {
        if self.cancel.is_cancelled() {
            self.cancel_pending().await;
            return 0;
        }
        let now = self.clock.now();
        let due: Vec<PublishJob> = self.queue.lock().await.drain_due(now).collect();
        self.dispatch_all(due).await
    }

    async fn dispatch_all(&self, jobs: Vec<PublishJob>) -> usize {
        let count = jobs.len();
        if count > 0 {
            debug!(jobs = count, "Dispatching due jobs");
        }
        join_all(jobs.into_iter().map(|job| self.dispatch_one(job))).await;
        count
    }

    async fn dispatch_one(&self, mut job: PublishJob) {
        let run_cancel = self.run_cancellation(&job.run_id).await;
        if self.cancel.is_cancelled() || run_cancel.is_cancelled() {
            self.abandon(job).await;
            return;
        }

        let outcome = self.executor.dispatch_unless(&mut job, &run_cancel).await;
        match outcome.retry_at() {
            Some(_) if self.cancel.is_cancelled() || run_cancel.is_cancelled() => {
                self.abandon(job).await
            }
            Some(at) => {
                self.record(&job, Some(&outcome)).await;
                self.queue.lock().await.enqueue_at(job, at);
                self.queue_changed.notify_waiters();
            }
            None => self.record(&job, Some(&outcome)).await,
        }
    }

    /// Drive `run_id` until it is complete or the orchestrator is cancelled
    async fn drive(&self, run_id: &str) {
        loop {
            self.pump().await;
            if self.is_complete(run_id).await {
                return;
            }
            if self.cancel.is_cancelled() {
                self.cancel_pending().await;
                if self.is_complete(run_id).await {
                    return;
                }
            }

            let changed = self.queue_changed.notified();
            let next_due = self.queue.lock().await.next_due_at();
            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = self.clock.sleep_until(at) => {}
                        _ = changed => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = changed => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
            }
        }
    }

    /// Stop all further dispatch and settle every queued job.
    ///
    /// Calls already in flight finish and are recorded.
    pub async fn cancel(&self) {
        info!("Cancelling publish orchestrator");
        self.cancel.cancel();
        self.cancel_pending().await;
    }

    async fn cancel_pending(&self) {
        let jobs = self.queue.lock().await.drain_all();
        for job in jobs {
            self.abandon(job).await;
        }
    }

    /// Cancel one run: its queued jobs are settled at once, and any of its
    /// jobs still waiting for a call slot give up before calling out.
    pub async fn cancel_run(&self, run_id: &str) -> CancelOutcome {
        {
            let runs = self.runs.lock().await;
            match runs.get(run_id) {
                None => return CancelOutcome::NotFound,
                Some(run) if run.report.is_complete() => return CancelOutcome::AlreadyExecuted,
                Some(run) => run.cancel.cancel(),
            }
        }

        info!(run_id, "Cancelling publish run");
        let jobs = self.queue.lock().await.remove_run(run_id);
        for job in jobs {
            self.abandon(job).await;
        }
        self.queue_changed.notify_waiters();
        CancelOutcome::Cancelled
    }

    async fn run_cancellation(&self, run_id: &str) -> CancellationToken {
        self.runs
            .lock()
            .await
            .get(run_id)
            .map(|run| run.cancel.clone())
            .unwrap_or_default()
    }

    /// Settle a job that will not be dispatched again
    async fn abandon(&self, mut job: PublishJob) {
        match JobOutcome::cancelled(&job) {
            JobOutcome::Skipped { reason } => {
                job.state = JobState::Skipped;
                job.last_error = Some(reason.to_string());
            }
            JobOutcome::Failed { error } => {
                job.state = JobState::Failed;
                job.last_error = Some(error);
            }
            _ => {}
        }
        debug!(platform = %job.platform, run_id = %job.run_id, "Job abandoned on cancellation");
        self.record(&job, None).await;
    }

    /// Write the job's current state into its run's report
    async fn record(&self, job: &PublishJob, outcome: Option<&JobOutcome>) {
        let entry = entry_from_job(job, outcome);
        self.announce(job, outcome);

        let completed = {
            let mut runs = self.runs.lock().await;
            match runs.get_mut(&job.run_id) {
                Some(run) => run.update(entry.clone()),
                None => None,
            }
        };

        if entry.state.is_terminal() {
            self.archive_outcome(&job.run_id, &entry).await;
        }
        if let Some(report) = completed {
            self.finish_run(&report).await;
        }
    }

    fn announce(&self, job: &PublishJob, outcome: Option<&JobOutcome>) {
        let detail = match outcome {
            Some(JobOutcome::Deferred { retry_at }) => Some(format!("rate limited until {}", retry_at)),
            _ => job.last_error.clone(),
        };
        self.events.emit(Event::JobStateChanged {
            run_id: job.run_id.clone(),
            platform: job.platform.clone(),
            state: job.state,
            attempts: job.attempt_count,
            detail,
        });
    }

    async fn finish_run(&self, report: &PublishReport) {
        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            summary = %summary,
            succeeded = report.count(JobState::Succeeded),
            failed = report.count(JobState::Failed),
            skipped = report.count(JobState::Skipped),
            "Publish run complete"
        );
        let manual = report.manual_platforms();
        if !manual.is_empty() {
            info!(run_id = %report.run_id, platforms = ?manual, "Content prepared for manual posting");
        }

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.update_summary(&report.run_id, summary).await {
                warn!(run_id = %report.run_id, error = %e, "Failed to archive run summary");
            }
        }
        self.events.emit(Event::RunCompleted {
            run_id: report.run_id.clone(),
            summary,
        });
    }

    async fn archive_run(
        &self,
        report: &PublishReport,
        bundle: &ContentBundle,
        schedule_at: Option<DateTime<Utc>>,
    ) {
        let Some(archive) = &self.archive else {
            return;
        };
        let record = RunRecord {
            id: report.run_id.clone(),
            created_at: report.created_at,
            scheduled_at: schedule_at,
            dry_run: report.dry_run,
            bundle: bundle.clone(),
            summary: report.summary(),
        };
        if let Err(e) = archive.record_run(&record).await {
            warn!(run_id = %report.run_id, error = %e, "Failed to archive run");
        }
    }

    async fn archive_outcome(&self, run_id: &str, entry: &ReportEntry) {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.record_outcome(run_id, entry).await {
                warn!(run_id, platform = %entry.platform, error = %e, "Failed to archive outcome");
            }
        }
    }

    /// Current state of a run that has not been taken yet
    pub async fn report(&self, run_id: &str) -> Option<PublishReport> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .map(|run| run.report.clone())
    }

    /// Remove a completed run from memory and return its final report.
    ///
    /// Blocking runs are removed when `process_and_publish` returns. Runs
    /// started with `wait = false` stay readable through
    /// [`report`](Self::report) until taken here, so a long-lived caller must
    /// take them once complete.
    pub async fn take_report(&self, run_id: &str) -> Option<PublishReport> {
        let mut runs = self.runs.lock().await;
        if runs.get(run_id).is_some_and(|run| run.completed) {
            runs.remove(run_id).map(|run| run.report)
        } else {
            None
        }
    }

    async fn is_complete(&self, run_id: &str) -> bool {
        self.runs
            .lock()
            .await
            .get(run_id)
            .map_or(true, |run| run.report.is_complete())
    }

    /// Jobs waiting in the queue, across all runs
    pub async fn queued_jobs(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Earliest time a queued job becomes due
    pub async fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.queue.lock().await.next_due_at()
    }
}

fn entry_from_job(job: &PublishJob, outcome: Option<&JobOutcome>) -> ReportEntry {
    let mut entry = ReportEntry::new(&job.platform, job.state);
    entry.attempts = job.attempt_count;
    entry.scheduled_at = job.scheduled_at;
    entry.error = match job.state {
        JobState::Failed | JobState::Skipped | JobState::Pending => job.last_error.clone(),
        _ => None,
    };

    if let Some(payload) = &job.payload {
        entry.metadata = payload.metadata.clone();
        if job.state == JobState::WouldPublish {
            entry.payload = Some(payload.clone());
        }
    }

    if let Some(JobOutcome::Succeeded {
        external_id,
        manual,
    }) = outcome
    {
        entry.external_id = external_id.clone();
        if *manual {
            entry
                .metadata
                .insert(MANUAL_ACTION_KEY.to_string(), "true".to_string());
            entry.metadata.insert(
                MANUAL_STATUS_KEY.to_string(),
                "content prepared, not posted".to_string(),
            );
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterKind;
    use crate::config::PlatformSpec;
    use crate::publishers::MockPublisher;
    use crate::scheduling::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn orchestrator(specs: Vec<PlatformSpec>, mocks: &[&MockPublisher]) -> PublishOrchestrator {
        let mut publishers = PublisherRegistry::new();
        for mock in mocks {
            publishers.register(Arc::new((*mock).clone()));
        }
        PublishOrchestrator::builder(Arc::new(PlatformRegistry::new(specs)), publishers)
            .clock(Arc::new(ManualClock::new(start())))
            .build()
    }

    #[tokio::test]
    async fn test_rejects_empty_platform_list() {
        let orch = orchestrator(vec![], &[]);
        let bundle = ContentBundle::new("T", "Body");

        let empty: [&str; 0] = [];
        assert!(orch
            .process_and_publish(&bundle, &empty, None, PublishOptions::default())
            .await
            .is_err());
        assert!(orch
            .process_and_publish(&bundle, &["  "], None, PublishOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unregistered_publisher_is_skipped() {
        let orch = orchestrator(vec![PlatformSpec::new("reddit", AdapterKind::Text)], &[]);
        let report = orch
            .process_and_publish(
                &ContentBundle::new("T", "Body"),
                &["reddit"],
                None,
                PublishOptions::default(),
            )
            .await
            .unwrap();

        let entry = report.entry("reddit").unwrap();
        assert_eq!(entry.state, JobState::Skipped);
        assert_eq!(
            entry.error.as_deref(),
            Some("no publisher registered for platform 'reddit'")
        );
    }

    #[tokio::test]
    async fn test_past_time_on_future_only_platform_dispatches_now() {
        let tiktok = MockPublisher::success("tiktok");
        let orch = orchestrator(
            vec![PlatformSpec::new("tiktok", AdapterKind::Media).future_only()],
            &[&tiktok],
        );
        let bundle = ContentBundle::new("T", "Body").with_media(crate::types::MediaRef::video("v.mp4"));

        let report = orch
            .process_and_publish(
                &bundle,
                &["tiktok"],
                Some(start() - chrono::Duration::hours(1)),
                PublishOptions::non_blocking(),
            )
            .await
            .unwrap();

        let entry = report.entry("tiktok").unwrap();
        assert_eq!(entry.state, JobState::Succeeded);
        assert!(entry.metadata.contains_key(SCHEDULING_CONFLICT_KEY));
        assert_eq!(tiktok.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_retention_and_single_run_cancel() {
        let x = MockPublisher::success("x");
        let orch = orchestrator(vec![PlatformSpec::new("x", AdapterKind::Text)], &[&x]);
        let bundle = ContentBundle::new("T", "Body");

        let scheduled = orch
            .process_and_publish(
                &bundle,
                &["x"],
                Some(start() + chrono::Duration::minutes(5)),
                PublishOptions::non_blocking(),
            )
            .await
            .unwrap();
        assert!(orch.take_report(&scheduled.run_id).await.is_none());

        let done = orch
            .process_and_publish(&bundle, &["x"], None, PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(done.entry("x").unwrap().state, JobState::Succeeded);
        assert!(orch.report(&done.run_id).await.is_none(), "blocking runs are not retained");

        assert_eq!(orch.cancel_run(&scheduled.run_id).await, CancelOutcome::Cancelled);
        assert_eq!(orch.cancel_run(&scheduled.run_id).await, CancelOutcome::AlreadyExecuted);
        let taken = orch.take_report(&scheduled.run_id).await.unwrap();
        assert_eq!(taken.entry("x").unwrap().state, JobState::Skipped);
        assert_eq!(orch.cancel_run(&scheduled.run_id).await, CancelOutcome::NotFound);
        assert_eq!(orch.queued_jobs().await, 0);
        assert_eq!(x.call_count(), 1);
    }
}
