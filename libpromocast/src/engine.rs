//! Content adaptation engine
//!
//! Resolves each requested platform against the registry, runs its adapter and
//! re-checks the result against the platform's constraints.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{normalize_platform_name, PlatformRegistry, PlatformSpec};
use crate::error::{ConstraintViolation, SkipReason};
use crate::types::{ContentBundle, JobState, PlatformPayload, PublishJob};

/// Result of adapting a bundle for one requested platform
#[derive(Debug, Clone, PartialEq)]
pub enum Adaptation {
    Ready(PlatformPayload),
    /// Unknown or disabled; no adapter was invoked
    Skipped { platform: String, reason: SkipReason },
    /// The content cannot satisfy the platform's constraints
    Rejected {
        platform: String,
        violation: ConstraintViolation,
    },
}

impl Adaptation {
    pub fn platform(&self) -> &str {
        match self {
            Adaptation::Ready(payload) => &payload.platform,
            Adaptation::Skipped { platform, .. } | Adaptation::Rejected { platform, .. } => platform,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Adaptation::Ready(_))
    }

    /// Wrap the outcome as a job of `run_id`.
    ///
    /// Skipped and rejected outcomes become jobs already in their terminal state.
    pub fn into_job(self, run_id: &str, scheduled_at: Option<DateTime<Utc>>) -> PublishJob {
        match self {
            Adaptation::Ready(payload) => PublishJob::new(run_id, payload, scheduled_at),
            Adaptation::Skipped { platform, reason } => {
                PublishJob::terminal(run_id, platform, JobState::Skipped, reason.to_string())
            }
            Adaptation::Rejected {
                platform,
                violation,
            } => PublishJob::terminal(run_id, platform, JobState::Failed, violation.to_string()),
        }
    }
}

pub struct ContentAdaptationEngine {
    registry: Arc<PlatformRegistry>,
}

impl ContentAdaptationEngine {
    pub fn new(registry: Arc<PlatformRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    /// Adapt `bundle` for every requested platform, in request order.
    ///
    /// Names are matched case-insensitively and through aliases. A platform
    /// requested twice, directly or by alias, is adapted once at its first
    /// position.
    pub fn adapt_all<S: AsRef<str>>(&self, bundle: &ContentBundle, platforms: &[S]) -> Vec<Adaptation> {
        let mut seen = HashSet::new();
        let mut adaptations = Vec::with_capacity(platforms.len());

        for requested in platforms {
            let requested = normalize_platform_name(requested.as_ref());
            let resolved = self
                .registry
                .get(&requested)
                .map(|spec| spec.name.clone())
                .unwrap_or_else(|| requested.clone());

            if !seen.insert(resolved) {
                debug!(platform = %requested, "Ignoring duplicate platform request");
                continue;
            }
            adaptations.push(self.adapt_one(bundle, &requested));
        }

        adaptations
    }

    /// Adapt `bundle` for a single platform name
    pub fn adapt_one(&self, bundle: &ContentBundle, requested: &str) -> Adaptation {
        let requested = normalize_platform_name(requested);
        let Some(spec) = self.registry.get(&requested) else {
            debug!(platform = %requested, "Skipping unknown platform");
            return Adaptation::Skipped {
                reason: SkipReason::UnknownPlatform(requested.clone()),
                platform: requested,
            };
        };

        if !spec.enabled {
            debug!(platform = %spec.name, "Skipping disabled platform");
            return Adaptation::Skipped {
                platform: spec.name.clone(),
                reason: SkipReason::Disabled(spec.name.clone()),
            };
        }

        let result = match spec.adapter_kind() {
            Some(kind) => kind
                .adapt(bundle, spec)
                .and_then(|payload| validate(payload, spec)),
            None => Err(ConstraintViolation::new(
                &spec.name,
                "no adapter is configured for this platform",
            )),
        };

        match result {
            Ok(payload) => {
                debug!(
                    platform = %spec.name,
                    chars = payload.char_count(),
                    media = payload.media.len(),
                    manual = payload.requires_manual_action,
                    "Adapted content"
                );
                Adaptation::Ready(payload)
            }
            Err(violation) => {
                warn!(platform = %spec.name, reason = %violation.reason, "Content rejected by adapter");
                Adaptation::Rejected {
                    platform: spec.name.clone(),
                    violation,
                }
            }
        }
    }
}

/// Re-check adapter output against the platform constraints
fn validate(payload: PlatformPayload, spec: &PlatformSpec) -> Result<PlatformPayload, ConstraintViolation> {
    if let Some(limit) = spec.char_limit {
        if payload.char_count() > limit {
            return Err(ConstraintViolation::new(
                &spec.name,
                format!(
                    "rendered text is {} characters, limit is {}",
                    payload.char_count(),
                    limit
                ),
            ));
        }
    }
    if let Some(media) = payload
        .media
        .iter()
        .find(|media| !spec.media_kinds.contains(&media.kind))
    {
        return Err(ConstraintViolation::new(
            &spec.name,
            format!("media '{}' of kind {} is not accepted", media.uri, media.kind),
        ));
    }
    if let Some(max) = spec.max_media {
        if payload.media.len() > max {
            return Err(ConstraintViolation::new(
                &spec.name,
                format!("{} media items exceed the maximum of {}", payload.media.len(), max),
            ));
        }
    }
    Ok(payload)
}
