//! Core types for Promocast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// ============================================================================
// Content
// ============================================================================

/// Kind of a media reference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(format!(
                "Invalid media kind: '{}'. Valid options: image, video",
                s
            )),
        }
    }
}

/// Pixel dimensions of a media item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale down so the longest side is at most `max`, keeping the aspect ratio.
    ///
    /// Returns `None` when no scaling is needed.
    pub fn fit_within(&self, max: u32) -> Option<Self> {
        let longest = self.width.max(self.height);
        if longest <= max || longest == 0 {
            return None;
        }
        let scale = |side: u32| -> u32 {
            let scaled = (u64::from(side) * u64::from(max)) / u64::from(longest);
            (scaled as u32).max(1)
        };
        Some(Self {
            width: scale(self.width),
            height: scale(self.height),
        })
    }
}

/// Reference to an image or video produced by the generation collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    /// Local path or URI of the media file
    pub uri: String,
    pub kind: MediaKind,
    pub dimensions: Option<Dimensions>,
}

impl MediaRef {
    pub fn new(uri: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            uri: uri.into(),
            kind,
            dimensions: None,
        }
    }

    pub fn image(uri: impl Into<String>) -> Self {
        Self::new(uri, MediaKind::Image)
    }

    pub fn video(uri: impl Into<String>) -> Self {
        Self::new(uri, MediaKind::Video)
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some(Dimensions::new(width, height));
        self
    }
}

/// Generated content handed to the orchestrator
///
/// Produced once by the ingestion/generation collaborators and only read by
/// the core. Tags are kept sorted so adaptation is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentBundle {
    pub title: String,
    pub body: String,
    pub media: Vec<MediaRef>,
    pub tags: BTreeSet<String>,
}

impl ContentBundle {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            media: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    /// Add a tag; a leading `#` is stripped and blank tags are ignored.
    pub fn with_tag(mut self, tag: impl AsRef<str>) -> Self {
        let tag = tag.as_ref().trim().trim_start_matches('#');
        if !tag.is_empty() {
            self.tags.insert(tag.to_string());
        }
        self
    }

    pub fn with_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter().fold(self, |bundle, tag| bundle.with_tag(tag))
    }
}

/// Adapter output for a single platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformPayload {
    pub platform: String,
    pub title: String,
    pub rendered_text: String,
    pub media: Vec<MediaRef>,
    pub metadata: BTreeMap<String, String>,
    /// Content is prepared for a human to post; dispatch never calls a publisher.
    pub requires_manual_action: bool,
}

impl PlatformPayload {
    /// Length of the rendered text in characters (not bytes)
    pub fn char_count(&self) -> usize {
        self.rendered_text.chars().count()
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Lifecycle state of a publish job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Adapted, waiting to enter the queue
    Queued,
    /// Held in the queue until its scheduled time
    Scheduled,
    /// Deferred by a rate limit or waiting out a retry backoff
    Pending,
    /// A publish call is in flight
    Dispatching,
    Succeeded,
    Failed,
    Skipped,
    /// Dry run: adapted and ready, nothing was sent
    WouldPublish,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::WouldPublish
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::WouldPublish => "would_publish",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "scheduled" => Ok(Self::Scheduled),
            "pending" => Ok(Self::Pending),
            "dispatching" => Ok(Self::Dispatching),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "would_publish" => Ok(Self::WouldPublish),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One platform's unit of work within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: String,
    pub run_id: String,
    pub platform: String,
    /// Absent for jobs that were skipped or failed during adaptation
    pub payload: Option<PlatformPayload>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Number of publish calls issued so far
    pub attempt_count: u32,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl PublishJob {
    pub fn new(
        run_id: impl Into<String>,
        payload: PlatformPayload,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            platform: payload.platform.clone(),
            payload: Some(payload),
            scheduled_at,
            attempt_count: 0,
            state: JobState::Queued,
            last_error: None,
        }
    }

    /// A job that ends before adaptation or dispatch, in the given terminal state.
    pub fn terminal(
        run_id: impl Into<String>,
        platform: impl Into<String>,
        state: JobState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            platform: platform.into(),
            payload: None,
            scheduled_at: None,
            attempt_count: 0,
            state,
            last_error: Some(reason.into()),
        }
    }

    pub fn requires_manual_action(&self) -> bool {
        self.payload
            .as_ref()
            .is_some_and(|payload| payload.requires_manual_action)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Per-platform outcome within a report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    pub platform: String,
    pub state: JobState,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    /// Rendered payload, kept for dry-run inspection
    pub payload: Option<PlatformPayload>,
}

impl ReportEntry {
    pub fn new(platform: impl Into<String>, state: JobState) -> Self {
        Self {
            platform: platform.into(),
            state,
            external_id: None,
            error: None,
            attempts: 0,
            scheduled_at: None,
            metadata: BTreeMap::new(),
            payload: None,
        }
    }

    /// Manual platforms succeed with "content prepared", not "content posted".
    pub fn requires_manual_action(&self) -> bool {
        self.metadata
            .get(MANUAL_ACTION_KEY)
            .is_some_and(|value| value == "true")
    }
}

/// Metadata key marking payloads and report entries that need a human to post
pub const MANUAL_ACTION_KEY: &str = "requires_manual_action";

/// Overall outcome of a run, using the status vocabulary of the task store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunSummary {
    InProgress,
    Completed,
    PartialFailure,
    Failed,
}

impl RunSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunSummary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "partial_failure" => Ok(Self::PartialFailure),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run summary '{}'", other)),
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated result of one `process_and_publish` call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishReport {
    pub run_id: String,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    /// One entry per requested platform, in request order
    pub per_platform: Vec<ReportEntry>,
}

impl PublishReport {
    pub fn entry(&self, platform: &str) -> Option<&ReportEntry> {
        self.per_platform
            .iter()
            .find(|entry| entry.platform == platform)
    }

    pub fn is_complete(&self) -> bool {
        self.per_platform.iter().all(|entry| entry.state.is_terminal())
    }

    pub fn count(&self, state: JobState) -> usize {
        self.per_platform
            .iter()
            .filter(|entry| entry.state == state)
            .count()
    }

    /// Platforms whose content was prepared for manual posting
    pub fn manual_platforms(&self) -> Vec<&str> {
        self.per_platform
            .iter()
            .filter(|entry| entry.requires_manual_action())
            .map(|entry| entry.platform.as_str())
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        if !self.is_complete() {
            return RunSummary::InProgress;
        }
        let succeeded = self
            .per_platform
            .iter()
            .filter(|entry| matches!(entry.state, JobState::Succeeded | JobState::WouldPublish))
            .count();
        if succeeded == 0 {
            RunSummary::Failed
        } else if succeeded == self.per_platform.len() {
            RunSummary::Completed
        } else {
            RunSummary::PartialFailure
        }
    }
}
