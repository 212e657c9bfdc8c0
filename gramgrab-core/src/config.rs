use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Desktop Chrome user agent sent to media CDNs.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Filename used when a download request does not suggest one.
pub const DEFAULT_FILENAME: &str = "instagram-video.mp4";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub proxy: ProxyConfig,
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Outbound settings for the streaming download proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub user_agent: String,
    pub connect_timeout_seconds: u64,
    /// Maximum idle time between two upstream chunks
    pub read_timeout_seconds: u64,
    pub default_filename: String,
    /// Accept plain `http://` upstreams. Local development only.
    pub allow_insecure_upstream: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_seconds: 10,
            read_timeout_seconds: 30,
            default_filename: DEFAULT_FILENAME.to_string(),
            allow_insecure_upstream: false,
        }
    }
}

/// Content resolution API used by the `download` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL; the post shortcode is appended as the last path segment.
    /// Empty disables resolution.
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            timeout_seconds: 15,
        }
    }
}

/// Short-lived cache of resolved posts, keyed by shortcode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 5 * 60,
            max_entries: 256,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // GRAMGRAB_SERVER__HTTP_PORT=9000, GRAMGRAB_PROXY__ALLOW_INSECURE_UPSTREAM=true
        builder = builder.add_source(
            Environment::with_prefix("GRAMGRAB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check every section and report all problems at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }

        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if self.proxy.user_agent.trim().is_empty() {
            errors.push("proxy.user_agent must not be empty".to_string());
        }
        if self.proxy.connect_timeout_seconds == 0 {
            errors.push("proxy.connect_timeout_seconds must be non-zero".to_string());
        }
        if self.proxy.read_timeout_seconds == 0 {
            errors.push("proxy.read_timeout_seconds must be non-zero".to_string());
        }
        if self.proxy.default_filename.trim().is_empty() {
            errors.push("proxy.default_filename must not be empty".to_string());
        }

        if !self.resolver.api_base_url.is_empty() {
            match url::Url::parse(&self.resolver.api_base_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => errors.push(format!(
                    "resolver.api_base_url has unsupported scheme '{}'",
                    parsed.scheme()
                )),
                Err(e) => errors.push(format!("resolver.api_base_url is invalid: {e}")),
            }
        }
        if self.resolver.timeout_seconds == 0 {
            errors.push("resolver.timeout_seconds must be non-zero".to_string());
        }

        if self.cache.ttl_seconds == 0 {
            errors.push("cache.ttl_seconds must be non-zero".to_string());
        }
        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
