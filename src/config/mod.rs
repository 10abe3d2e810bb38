//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `LITERATURE_COLLECTOR__<SECTION>__<KEY>` environment variables. Command
//! line flags are applied on top by the binary. Provider credentials are also
//! read from their conventional variables (`NCBI_API_KEY`, ...).

mod file_config;

pub use file_config::{default_config_toml, find_config_file, ConfigFileError, CONFIG_FILE_NAME};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HarvestError;
use crate::models::{KeywordJoin, SourceKind};
use crate::utils::{HttpSettings, RetryConfig};

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "LITERATURE_COLLECTOR";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryPolicyConfig,

    #[serde(default)]
    pub credentials: Credentials,
}

/// What to collect and how far to page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Comma-separated keywords
    #[serde(default = "default_keywords")]
    pub keywords: String,

    /// Comma-separated source ids; empty selects every provider
    #[serde(default = "default_sources")]
    pub sources: String,

    #[serde(default)]
    pub keyword_join: KeywordJoin,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Deadline for the whole fetch phase
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Field-conflict priority, highest first
    #[serde(default = "default_source_priority")]
    pub source_priority: Vec<SourceKind>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            sources: default_sources(),
            keyword_join: KeywordJoin::default(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            deadline_secs: default_deadline_secs(),
            source_priority: default_source_priority(),
        }
    }
}

impl RunConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

fn default_keywords() -> String {
    "aortic stenosis, mitral regurgitation, valvular heart disease, deep learning".to_string()
}

fn default_sources() -> String {
    "pubmed,crossref,openalex".to_string()
}

fn default_page_size() -> usize {
    20
}

fn default_max_pages() -> usize {
    5
}

fn default_deadline_secs() -> u64 {
    300
}

fn default_source_priority() -> Vec<SourceKind> {
    vec![SourceKind::CrossRef, SourceKind::PubMed, SourceKind::OpenAlex]
}

/// Output location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Contact address advertised in the User-Agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            contact_email: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl HttpConfig {
    /// Client settings, falling back to a credential email for the User-Agent contact
    pub fn settings(&self, credentials: &Credentials) -> HttpSettings {
        let contact = self
            .contact_email
            .as_deref()
            .or(credentials.crossref_mailto.as_deref())
            .or(credentials.openalex_email.as_deref())
            .or(credentials.ncbi_email.as_deref());

        let user_agent = match contact {
            Some(email) => format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                email
            ),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        HttpSettings {
            user_agent,
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per second for providers without credentials
    #[serde(default = "default_rps")]
    pub default_requests_per_second: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubmed: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossref: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openalex: Option<f32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_requests_per_second: default_rps(),
            pubmed: None,
            crossref: None,
            openalex: None,
        }
    }
}

fn default_rps() -> f32 {
    1.0
}

impl RateLimitConfig {
    /// Effective rate for a provider.
    ///
    /// An explicit per-source value wins; otherwise credentials select the
    /// provider's higher tier.
    pub fn requests_per_second(&self, source: SourceKind, credentials: &Credentials) -> f32 {
        let explicit = match source {
            SourceKind::PubMed => self.pubmed,
            SourceKind::CrossRef => self.crossref,
            SourceKind::OpenAlex => self.openalex,
        };
        if let Some(rps) = explicit {
            return rps;
        }

        match source {
            SourceKind::PubMed if credentials.ncbi_api_key.is_some() => 10.0,
            SourceKind::CrossRef if credentials.crossref_mailto.is_some() => 3.0,
            SourceKind::OpenAlex
                if credentials.openalex_email.is_some() || credentials.openalex_api_key.is_some() =>
            {
                10.0
            }
            _ => self.default_requests_per_second,
        }
    }
}

/// Retry policy for transient HTTP failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.25
}

impl From<&RetryPolicyConfig> for RetryConfig {
    fn from(policy: &RetryPolicyConfig) -> Self {
        RetryConfig {
            max_retries: policy.max_retries,
            initial_delay: Duration::from_millis(policy.initial_delay_ms),
            max_delay: Duration::from_millis(policy.max_delay_ms),
            backoff_multiplier: policy.backoff_multiplier.max(1.0),
            jitter: policy.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Provider credentials; all optional
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncbi_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncbi_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossref_mailto: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openalex_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openalex_api_key: Option<String>,
}

impl Credentials {
    /// Fill missing values from `NCBI_API_KEY`, `NCBI_EMAIL`, `CROSSREF_MAILTO`,
    /// `OPENALEX_EMAIL` and `OPENALEX_API_KEY`
    pub fn with_env(self) -> Self {
        self.with_lookup(|name| std::env::var(name).ok())
    }

    fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fill = |slot: &mut Option<String>, name: &str| {
            if slot.is_none() {
                *slot = lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            }
        };
        fill(&mut self.ncbi_api_key, "NCBI_API_KEY");
        fill(&mut self.ncbi_email, "NCBI_EMAIL");
        fill(&mut self.crossref_mailto, "CROSSREF_MAILTO");
        fill(&mut self.openalex_email, "OPENALEX_EMAIL");
        fill(&mut self.openalex_api_key, "OPENALEX_API_KEY");
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("ncbi_api_key", &redact(&self.ncbi_api_key))
            .field("ncbi_email", &self.ncbi_email)
            .field("crossref_mailto", &self.crossref_mailto)
            .field("openalex_email", &self.openalex_email)
            .field("openalex_api_key", &redact(&self.openalex_api_key))
            .finish()
    }
}

/// Load configuration from an optional file plus environment overrides.
///
/// An explicitly given `path` must exist; otherwise the standard locations
/// are searched and skipped when absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, HarvestError> {
    let mut builder = config::Config::builder();

    match find_config_file(path)? {
        Some(file) => {
            tracing::debug!("Loading configuration from {}", file.display());
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }
        None => tracing::debug!("No configuration file found, using defaults"),
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config: Config = settings.try_deserialize()?;
    config.credentials = config.credentials.with_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.page_size, 20);
        assert_eq!(config.run.keyword_join, KeywordJoin::Or);
        assert_eq!(config.output.directory, PathBuf::from("data"));
        assert_eq!(config.rate_limits.default_requests_per_second, 1.0);
        assert_eq!(
            config.run.source_priority,
            vec![SourceKind::CrossRef, SourceKind::PubMed, SourceKind::OpenAlex]
        );
        assert!(config.run.keywords.contains("aortic stenosis"));
    }

    #[test]
    fn test_credential_tiers() {
        let limits = RateLimitConfig::default();
        let none = Credentials::default();
        for source in SourceKind::ALL {
            assert_eq!(limits.requests_per_second(source, &none), 1.0);
        }

        let credentials = Credentials {
            ncbi_api_key: Some("key".into()),
            crossref_mailto: Some("lab@example.org".into()),
            openalex_email: Some("lab@example.org".into()),
            ..Credentials::default()
        };
        assert_eq!(limits.requests_per_second(SourceKind::PubMed, &credentials), 10.0);
        assert_eq!(limits.requests_per_second(SourceKind::CrossRef, &credentials), 3.0);
        assert_eq!(limits.requests_per_second(SourceKind::OpenAlex, &credentials), 10.0);

        let limits = RateLimitConfig {
            pubmed: Some(2.5),
            ..RateLimitConfig::default()
        };
        assert_eq!(limits.requests_per_second(SourceKind::PubMed, &credentials), 2.5);
    }

    #[test]
    fn test_credentials_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("NCBI_API_KEY", "abc"),
            ("CROSSREF_MAILTO", "  "),
            ("OPENALEX_EMAIL", "lab@example.org"),
        ]
        .into_iter()
        .collect();

        let credentials = Credentials {
            openalex_email: Some("file@example.org".into()),
            ..Credentials::default()
        }
        .with_lookup(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(credentials.ncbi_api_key.as_deref(), Some("abc"));
        assert_eq!(credentials.crossref_mailto, None);
        // Values from the config file are kept
        assert_eq!(credentials.openalex_email.as_deref(), Some("file@example.org"));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials {
            ncbi_api_key: Some("super-secret".into()),
            ..Credentials::default()
        };
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_user_agent_contact() {
        let credentials = Credentials {
            crossref_mailto: Some("lab@example.org".into()),
            ..Credentials::default()
        };
        let settings = HttpConfig::default().settings(&credentials);
        assert!(settings.user_agent.ends_with("(mailto:lab@example.org)"));
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = RetryPolicyConfig {
            jitter: 3.0,
            ..RetryPolicyConfig::default()
        };
        let retry = RetryConfig::from(&policy);
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.jitter, 1.0);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(
            &path,
            r#"
[run]
keywords = "tavr"
sources = "pubmed"
keyword_join = "and"
max_pages = 2
source_priority = ["pubmed", "openalex", "crossref"]

[output]
directory = "/tmp/out"

[rate_limits]
crossref = 0.5
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.run.keywords, "tavr");
        assert_eq!(config.run.keyword_join, KeywordJoin::And);
        assert_eq!(config.run.max_pages, 2);
        assert_eq!(config.run.page_size, 20);
        assert_eq!(config.run.source_priority[0], SourceKind::PubMed);
        assert_eq!(config.output.directory, PathBuf::from("/tmp/out"));
        assert_eq!(config.rate_limits.crossref, Some(0.5));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let result = load_config(Some(Path::new("/nonexistent/collector.toml")));
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "invalid = toml = content").unwrap();

        assert!(matches!(load_config(Some(&path)), Err(HarvestError::Config(_))));
    }
}
