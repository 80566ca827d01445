//! Configuration management for Promocast
//!
//! The configuration file declares one `[platforms.<name>]` table per
//! publishing target plus dispatch tuning. It is loaded once at startup and
//! turned into an immutable [`PlatformRegistry`] that is passed explicitly to
//! the engine, executor and orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::AdapterKind;
use crate::error::{ConfigError, Result};
use crate::types::MediaKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformSpec>,
}

/// Retry, backoff and concurrency tuning for the dispatch executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Fraction of the backoff added as random jitter (0.0 disables it)
    #[serde(default)]
    pub backoff_jitter: f64,
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    /// Global cap on simultaneous outbound publish calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_rate_limit_backoff_ms() -> u64 {
    5000
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter: 0.0,
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl DispatchConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub path: String,
}

/// Call budget of a platform: at most `max_calls` publish calls per window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitSpec {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl RateLimitSpec {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window_secs: window.as_secs(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Where an HTTP publisher sends payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    /// Environment variable holding the bearer token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Static description of one publishing platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformSpec {
    /// Filled from the table key when loaded from a file
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Adapter variant; defaults by platform name when omitted
    #[serde(default)]
    pub adapter: Option<AdapterKind>,
    #[serde(default)]
    pub char_limit: Option<usize>,
    /// Longest title the platform accepts, in characters
    #[serde(default)]
    pub title_limit: Option<usize>,
    #[serde(default = "default_media_kinds")]
    pub media_kinds: BTreeSet<MediaKind>,
    /// Minimum number of media items that must survive filtering
    #[serde(default)]
    pub min_media: usize,
    #[serde(default)]
    pub max_media: Option<usize>,
    /// Longest side, in pixels, a media item may have
    #[serde(default)]
    pub max_dimension: Option<u32>,
    #[serde(default)]
    pub requires_auth: bool,
    /// Platform only accepts future publish times; past times dispatch immediately
    #[serde(default)]
    pub future_only_scheduling: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
    #[serde(default)]
    pub endpoint: Option<EndpointConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_media_kinds() -> BTreeSet<MediaKind> {
    [MediaKind::Image, MediaKind::Video].into_iter().collect()
}

impl PlatformSpec {
    /// A permissive, enabled spec; narrow it with the `with_*` builders.
    pub fn new(name: impl Into<String>, adapter: AdapterKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            adapter: Some(adapter),
            char_limit: None,
            title_limit: None,
            media_kinds: default_media_kinds(),
            min_media: 0,
            max_media: None,
            max_dimension: None,
            requires_auth: false,
            future_only_scheduling: false,
            aliases: Vec::new(),
            rate_limit: None,
            endpoint: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_char_limit(mut self, limit: usize) -> Self {
        self.char_limit = Some(limit);
        self
    }

    pub fn with_title_limit(mut self, limit: usize) -> Self {
        self.title_limit = Some(limit);
        self
    }

    pub fn with_media_kinds<I: IntoIterator<Item = MediaKind>>(mut self, kinds: I) -> Self {
        self.media_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_min_media(mut self, min: usize) -> Self {
        self.min_media = min;
        self
    }

    pub fn with_max_media(mut self, max: usize) -> Self {
        self.max_media = Some(max);
        self
    }

    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = Some(max);
        self
    }

    pub fn with_rate_limit(mut self, max_calls: u32, window: Duration) -> Self {
        self.rate_limit = Some(RateLimitSpec::new(max_calls, window));
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn future_only(mut self) -> Self {
        self.future_only_scheduling = true;
        self
    }

    pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// The adapter variant that handles this platform, if any
    pub fn adapter_kind(&self) -> Option<AdapterKind> {
        self.adapter.or_else(|| AdapterKind::default_for(&self.name))
    }
}

/// Immutable lookup table of platform specs
///
/// Lookups are case-insensitive and resolve configured aliases.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    specs: BTreeMap<String, PlatformSpec>,
    aliases: HashMap<String, String>,
}

impl PlatformRegistry {
    pub fn new<I: IntoIterator<Item = PlatformSpec>>(specs: I) -> Self {
        let mut registry = Self::default();
        for mut spec in specs {
            spec.name = normalize_platform_name(&spec.name);
            for alias in &spec.aliases {
                registry
                    .aliases
                    .insert(normalize_platform_name(alias), spec.name.clone());
            }
            registry.specs.insert(spec.name.clone(), spec);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&PlatformSpec> {
        let name = normalize_platform_name(name);
        self.specs.get(&name).or_else(|| {
            self.aliases
                .get(&name)
                .and_then(|canonical| self.specs.get(canonical))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &PlatformSpec> {
        self.specs.values().filter(|spec| spec.enabled)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Trim and lowercase a platform name as given by a caller or config file
pub fn normalize_platform_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        for (name, spec) in config.platforms.iter_mut() {
            spec.name = normalize_platform_name(name);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_attempts == 0 {
            return Err(invalid("dispatch.max_attempts must be at least 1"));
        }
        if self.dispatch.max_concurrent == 0 {
            return Err(invalid("dispatch.max_concurrent must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.dispatch.backoff_jitter) {
            return Err(invalid("dispatch.backoff_jitter must be between 0.0 and 1.0"));
        }

        for spec in self.platforms.values() {
            if spec.adapter_kind().is_none() {
                return Err(ConfigError::MissingField(format!("platforms.{}.adapter", spec.name)).into());
            }
            if let Some(limit) = &spec.rate_limit {
                if limit.max_calls == 0 || limit.window_secs == 0 {
                    return Err(invalid(format!(
                        "platforms.{}.rate_limit needs max_calls and window_secs above zero",
                        spec.name
                    )));
                }
            }
            if spec.title_limit == Some(0) {
                return Err(invalid(format!(
                    "platforms.{}.title_limit must be at least 1",
                    spec.name
                )));
            }
            if let Some(max) = spec.max_media {
                if spec.min_media > max {
                    return Err(invalid(format!(
                        "platforms.{}: min_media ({}) exceeds max_media ({})",
                        spec.name, spec.min_media, max
                    )));
                }
            }
        }

        Ok(())
    }

    /// Build the immutable platform registry shared by the core components
    pub fn registry(&self) -> Arc<PlatformRegistry> {
        Arc::new(PlatformRegistry::new(self.platforms.values().cloned()))
    }

    /// Create a default configuration covering the supported platforms
    pub fn default_config() -> Self {
        let hour = Duration::from_secs(3600);
        let day = Duration::from_secs(24 * 3600);

        let specs = vec![
            PlatformSpec::new("reddit", AdapterKind::Text)
                .with_char_limit(40_000)
                .with_title_limit(300)
                .with_media_kinds([MediaKind::Image])
                .with_max_media(1)
                .with_auth()
                .with_rate_limit(10, hour),
            PlatformSpec::new("x", AdapterKind::Text)
                .with_char_limit(280)
                .with_max_media(4)
                .with_alias("twitter")
                .with_auth()
                .with_rate_limit(50, day),
            PlatformSpec::new("tiktok", AdapterKind::Media)
                .with_char_limit(150)
                .with_media_kinds([MediaKind::Video])
                .with_min_media(1)
                .with_max_media(1)
                .with_auth()
                .future_only()
                .with_rate_limit(6, hour)
                .disabled(),
            PlatformSpec::new("bilibili", AdapterKind::Media)
                .with_char_limit(2000)
                .with_min_media(1)
                .with_auth()
                .future_only()
                .with_rate_limit(5, hour)
                .disabled(),
            PlatformSpec::new("xiaohongshu", AdapterKind::Manual)
                .with_char_limit(1000)
                .with_media_kinds([MediaKind::Image])
                .with_max_media(9)
                .with_max_dimension(4096),
            PlatformSpec::new("douyin", AdapterKind::Manual)
                .with_char_limit(80)
                .with_media_kinds([MediaKind::Video])
                .with_max_media(1),
        ];

        Self {
            dispatch: DispatchConfig::default(),
            archive: Some(ArchiveConfig {
                path: "~/.local/share/promocast/runs.db".to_string(),
            }),
            platforms: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }
}

fn invalid(message: impl Into<String>) -> crate::error::PromocastError {
    ConfigError::Invalid(message.into()).into()
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PROMOCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("promocast").join("config.toml"))
}

/// Resolve the archive database path, expanding `~`
pub fn resolve_archive_path(archive: &ArchiveConfig) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&archive.path).to_string())
}
