//! Platform adapters
//!
//! An adapter turns one [`ContentBundle`] into the [`PlatformPayload`] a
//! platform can accept, given that platform's static [`PlatformSpec`]. Adapters
//! are pure: no I/O, no clock, no shared state.
//!
//! The set of adapters is closed. Each platform is handled by one
//! [`AdapterKind`] variant, picked by configuration or by platform name:
//!
//! | Variant  | Rules |
//! |----------|-------|
//! | `Text`   | word-preserving truncation to `char_limit`, tags appended when they fit, media filtered |
//! | `Media`  | caption built from title and body, media filtered and at least one item required |
//! | `Manual` | like `Text`, but marked `requires_manual_action` for a human to post |
//!
//! Adding a platform means adding a spec entry, and a variant only when none
//! of the existing rule sets fit.
//!
//! # Examples
//!
//! ```
//! use libpromocast::adapters::AdapterKind;
//! use libpromocast::config::PlatformSpec;
//! use libpromocast::types::ContentBundle;
//!
//! let spec = PlatformSpec::new("x", AdapterKind::Text).with_char_limit(280);
//! let bundle = ContentBundle::new("Launch", "We shipped it.").with_tag("rust");
//!
//! let payload = AdapterKind::Text.adapt(&bundle, &spec).unwrap();
//! assert_eq!(payload.rendered_text, "We shipped it.\n\n#rust");
//! ```

use serde::{Deserialize, Serialize};

use crate::config::PlatformSpec;
use crate::error::ConstraintViolation;
use crate::types::{ContentBundle, PlatformPayload};

pub mod manual;
pub mod media;
pub mod text;

/// The closed set of adapter variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Character-limited text platforms (Reddit, X)
    Text,
    /// Media-first platforms that need at least one media item (TikTok, Bilibili)
    Media,
    /// Semi-automatic platforms without a usable publish API (Xiaohongshu, Douyin)
    Manual,
}

impl AdapterKind {
    /// Adapter used for a well-known platform when the config does not name one
    pub fn default_for(platform: &str) -> Option<Self> {
        match platform.trim().to_lowercase().as_str() {
            "reddit" | "x" | "twitter" => Some(Self::Text),
            "tiktok" | "bilibili" => Some(Self::Media),
            "xiaohongshu" | "douyin" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Media => "media",
            Self::Manual => "manual",
        }
    }

    /// Produce the payload for `spec.name`, or explain why the content cannot fit.
    pub fn adapt(
        &self,
        bundle: &ContentBundle,
        spec: &PlatformSpec,
    ) -> Result<PlatformPayload, ConstraintViolation> {
        let mut payload = match self {
            Self::Text => text::adapt(bundle, spec)?,
            Self::Media => media::adapt(bundle, spec)?,
            Self::Manual => manual::adapt(bundle, spec)?,
        };
        payload
            .metadata
            .insert("adapter".to_string(), self.as_str().to_string());
        Ok(payload)
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
