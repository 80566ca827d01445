//! Generic JSON-over-HTTP publisher
//!
//! Posts the rendered payload to a configured endpoint, typically a small
//! bridge service in front of the platform's own API:
//!
//! ```text
//! POST <endpoint.url>
//! Authorization: Bearer $<endpoint.token_env>
//! { "platform": "x", "title": "...", "text": "...", "media": [...], "metadata": {...} }
//! ```
//!
//! A 2xx response succeeds; `id` or `post_id` in a JSON body becomes the
//! external id.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::adapters::AdapterKind;
use crate::config::{Config, EndpointConfig, PlatformSpec};
use crate::error::{ConfigError, PlatformError, Result};
use crate::types::{MediaRef, PlatformPayload};

use super::{PublishResult, Publisher, PublisherRegistry};

#[derive(Debug, Clone)]
pub struct HttpPublisher {
    platform: String,
    url: String,
    token: Option<String>,
    client: Client,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    platform: &'a str,
    title: &'a str,
    text: &'a str,
    media: &'a [MediaRef],
    metadata: &'a std::collections::BTreeMap<String, String>,
}

impl HttpPublisher {
    pub fn new(
        platform: impl Into<String>,
        endpoint: &EndpointConfig,
        token: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;
        Ok(Self {
            platform: platform.into(),
            url: endpoint.url.clone(),
            token,
            client,
        })
    }

    /// Build from a platform spec, reading the token from `endpoint.token_env`.
    ///
    /// Returns `Ok(None)` when the platform has no endpoint.
    pub fn from_spec(spec: &PlatformSpec) -> Result<Option<Self>> {
        let Some(endpoint) = &spec.endpoint else {
            return Ok(None);
        };
        let token = match &endpoint.token_env {
            Some(var) => match std::env::var(var) {
                Ok(token) if !token.trim().is_empty() => Some(token),
                _ if spec.requires_auth => {
                    return Err(ConfigError::MissingField(format!(
                        "environment variable {} (token for {})",
                        var, spec.name
                    ))
                    .into())
                }
                _ => None,
            },
            None => None,
        };
        Self::new(&spec.name, endpoint, token).map(Some)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    #[instrument(skip(self, payload), fields(platform = %self.platform))]
    async fn publish(&self, payload: &PlatformPayload) -> PublishResult {
        let body = PublishRequest {
            platform: &payload.platform,
            title: &payload.title,
            text: &payload.rendered_text,
            media: &payload.media,
            metadata: &payload.metadata,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(%status, "Publish endpoint returned an error");
            return Err(classify_status(status, &text));
        }

        let external_id = extract_external_id(&text);
        debug!(?external_id, "Publish endpoint accepted payload");
        Ok(external_id)
    }
}

fn classify_transport(error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout(error.to_string())
    } else if error.is_connect() || error.is_request() {
        PlatformError::Network(error.to_string())
    } else {
        PlatformError::Posting(error.to_string())
    }
}

/// Map a non-success status to the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> PlatformError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(detail),
        StatusCode::REQUEST_TIMEOUT => PlatformError::Timeout(detail),
        s if s.is_client_error() => PlatformError::Validation(detail),
        s if s.is_server_error() => PlatformError::Server(detail),
        _ => PlatformError::Posting(detail),
    }
}

fn extract_external_id(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["id", "post_id"].iter().find_map(|key| match value.get(key)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Create an HTTP publisher for every enabled, automatic platform with an endpoint.
///
/// A platform whose token is missing is left out with a warning, so it is
/// reported as skipped instead of failing the whole run.
pub fn build_publishers(config: &Config) -> Result<PublisherRegistry> {
    let mut publishers = PublisherRegistry::new();

    for spec in config.platforms.values() {
        if !spec.enabled || spec.adapter_kind() == Some(AdapterKind::Manual) {
            continue;
        }
        match HttpPublisher::from_spec(spec) {
            Ok(Some(publisher)) => {
                info!(platform = %spec.name, url = %publisher.url, "Created HTTP publisher");
                publishers.register(std::sync::Arc::new(publisher));
            }
            Ok(None) => debug!(platform = %spec.name, "No endpoint configured"),
            Err(crate::error::PromocastError::Config(ConfigError::MissingField(field))) => {
                warn!(platform = %spec.name, missing = %field, "Publisher not created");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(publishers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn endpoint(url: &str) -> EndpointConfig {
        EndpointConfig {
            url: url.to_string(),
            token_env: Some("PROMOCAST_TEST_X_TOKEN".to_string()),
            timeout_secs: 2,
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "suspended"),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "too long"),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            PlatformError::Server(_)
        ));

        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn test_classify_status_keeps_body() {
        let err = classify_status(StatusCode::BAD_REQUEST, " title missing ");
        assert_eq!(
            err,
            PlatformError::Validation("400 Bad Request: title missing".to_string())
        );
    }

    #[test]
    fn test_extract_external_id() {
        assert_eq!(extract_external_id(r#"{"id":"t3_abc"}"#), Some("t3_abc".to_string()));
        assert_eq!(extract_external_id(r#"{"post_id":12345}"#), Some("12345".to_string()));
        assert_eq!(extract_external_id(r#"{"ok":true}"#), None);
        assert_eq!(extract_external_id("accepted"), None);
        assert_eq!(extract_external_id(""), None);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let publisher = HttpPublisher::new("x", &endpoint("http://127.0.0.1:9/publish"), None).unwrap();
        let payload = PlatformPayload {
            platform: "x".to_string(),
            title: String::new(),
            rendered_text: "hello".to_string(),
            media: vec![],
            metadata: Default::default(),
            requires_manual_action: false,
        };

        let err = publisher.publish(&payload).await.unwrap_err();
        assert!(err.is_transient(), "unexpected {:?}", err);
    }

    #[test]
    #[serial]
    fn test_from_spec_requires_token_when_auth_needed() {
        std::env::remove_var("PROMOCAST_TEST_X_TOKEN");
        let spec = PlatformSpec::new("x", AdapterKind::Text)
            .with_auth()
            .with_endpoint(endpoint("http://localhost/publish"));
        assert!(HttpPublisher::from_spec(&spec).is_err());

        std::env::set_var("PROMOCAST_TEST_X_TOKEN", "secret");
        let publisher = HttpPublisher::from_spec(&spec).unwrap().unwrap();
        assert_eq!(publisher.token.as_deref(), Some("secret"));
        std::env::remove_var("PROMOCAST_TEST_X_TOKEN");
    }

    #[test]
    #[serial]
    fn test_build_publishers_skips_manual_disabled_and_tokenless() {
        std::env::remove_var("PROMOCAST_TEST_X_TOKEN");
        let toml = r#"
[platforms.x]
char_limit = 280
requires_auth = true
endpoint = { url = "http://localhost/x", token_env = "PROMOCAST_TEST_X_TOKEN" }

[platforms.reddit]
endpoint = { url = "http://localhost/reddit" }

[platforms.tiktok]
enabled = false
endpoint = { url = "http://localhost/tiktok" }

[platforms.douyin]
endpoint = { url = "http://localhost/douyin" }
"#;
        let config = Config::from_toml_str(toml).unwrap();
        let publishers = build_publishers(&config).unwrap();

        let mut names: Vec<&str> = publishers.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["reddit"]);
    }
}
