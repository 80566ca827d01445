//! Platform publish collaborators
//!
//! A [`Publisher`] performs the single network call that puts a payload on a
//! platform. The dispatch executor owns retries, backoff and rate limits, so
//! implementations make exactly one attempt per call and classify failures
//! through [`PlatformError`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use libpromocast::publishers::{mock::MockPublisher, PublisherRegistry};
//!
//! let x = MockPublisher::success("x");
//! let publishers = PublisherRegistry::new().with(Arc::new(x.clone()));
//!
//! assert!(publishers.get("X").is_some());
//! assert_eq!(x.call_count(), 0);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::normalize_platform_name;
use crate::error::PlatformError;
use crate::types::PlatformPayload;

pub mod http;
// Available in all builds so integration tests can script platform behavior
pub mod mock;

pub use http::{build_publishers, HttpPublisher};
pub use mock::{MockPublisher, MockResponse};

/// External identifier assigned by the platform, when it returns one
pub type PublishResult = std::result::Result<Option<String>, PlatformError>;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Canonical platform name this publisher serves
    fn platform(&self) -> &str;

    /// Make one publish attempt
    async fn publish(&self, payload: &PlatformPayload) -> PublishResult;
}

/// Publishers keyed by platform name
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<String, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `publisher`, replacing any previous one for its platform
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers
            .insert(normalize_platform_name(publisher.platform()), publisher);
    }

    pub fn with(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.register(publisher);
        self
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn Publisher>> {
        self.publishers
            .get(&normalize_platform_name(platform))
            .cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.publishers
            .contains_key(&normalize_platform_name(platform))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.publishers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl std::fmt::Debug for PublisherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("PublisherRegistry")
            .field("platforms", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replaces_by_platform() {
        let first = MockPublisher::success("x");
        let second = MockPublisher::failing("x", PlatformError::Network("down".to_string()));

        let mut registry = PublisherRegistry::new();
        registry.register(Arc::new(first));
        registry.register(Arc::new(second));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(" X "));
        assert!(!registry.contains("reddit"));
    }

    #[test]
    fn test_debug_lists_platforms() {
        let registry = PublisherRegistry::new()
            .with(Arc::new(MockPublisher::success("reddit")))
            .with(Arc::new(MockPublisher::success("x")));
        assert_eq!(
            format!("{:?}", registry),
            "PublisherRegistry { platforms: [\"reddit\", \"x\"] }"
        );
    }
}
