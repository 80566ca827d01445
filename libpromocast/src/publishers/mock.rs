//! Scriptable publisher for tests
//!
//! Clones share state, so a test can register one clone and keep another to
//! inspect call counts and recorded payloads afterwards.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::PlatformPayload;

use super::{PublishResult, Publisher};

/// Outcome of one scripted call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Succeed; `None` generates an id like `x-1`
    Success(Option<String>),
    /// Succeed without returning an external id
    SuccessWithoutId,
    Failure(PlatformError),
}

#[derive(Debug)]
struct MockState {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    published: Mutex<Vec<PlatformPayload>>,
    script: Mutex<VecDeque<MockResponse>>,
}

#[derive(Debug, Clone)]
pub struct MockPublisher {
    platform: String,
    delay: Duration,
    fallback: MockResponse,
    state: Arc<MockState>,
}

impl MockPublisher {
    fn new(platform: &str, fallback: MockResponse) -> Self {
        Self {
            platform: platform.to_string(),
            delay: Duration::ZERO,
            fallback,
            state: Arc::new(MockState {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                published: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Always succeeds with a generated id
    pub fn success(platform: &str) -> Self {
        Self::new(platform, MockResponse::Success(None))
    }

    /// Always fails with `error`
    pub fn failing(platform: &str, error: PlatformError) -> Self {
        Self::new(platform, MockResponse::Failure(error))
    }

    /// Plays `responses` in order, then succeeds
    pub fn scripted<I: IntoIterator<Item = MockResponse>>(platform: &str, responses: I) -> Self {
        let publisher = Self::success(platform);
        lock(&publisher.state.script).extend(responses);
        publisher
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Payloads received, in call order, failed calls included
    pub fn published(&self) -> Vec<PlatformPayload> {
        lock(&self.state.published).clone()
    }

    /// Highest number of calls that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn publish(&self, payload: &PlatformPayload) -> PublishResult {
        let call = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.state.published).push(payload.clone());

        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = lock(&self.state.script)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match response {
            MockResponse::Success(Some(id)) => Ok(Some(id)),
            MockResponse::Success(None) => Ok(Some(format!("{}-{}", self.platform, call))),
            MockResponse::SuccessWithoutId => Ok(None),
            MockResponse::Failure(error) => Err(error),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
