//! API Configuration Module
//!
//! Configuration for CORS, rate limiting, the user lifecycle, storage
//! deadlines, the identity cache and outbound mail. Everything loads from
//! environment variables with development defaults.

use crate::constants::*;
use agora_core::ConfigError;
use agora_storage::CacheConfig;
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| s.to_lowercase() != "false")
        .unwrap_or(default)
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Which backend holds the identity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    #[default]
    Lmdb,
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lmdb" => Ok(Self::Lmdb),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "AGORA_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected 'lmdb' or 'memory'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    pub path: String,
    pub max_size_mb: usize,
    pub ttl: Duration,
    pub timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::default(),
            path: DEFAULT_CACHE_PATH.to_string(),
            max_size_mb: DEFAULT_CACHE_MAX_MB,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            timeout: Duration::from_millis(DEFAULT_CACHE_TIMEOUT_MS),
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(self.ttl)
            .with_timeout(self.timeout)
    }
}

// ============================================================================
// MAIL CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct MailConfig {
    /// SendGrid API key. `None` selects the log-only mailer.
    pub sendgrid_api_key: Option<SecretString>,
    pub from_email: String,
    pub from_name: String,
    pub max_retries: u32,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field(
                "sendgrid_api_key",
                &self.sendgrid_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: None,
            from_email: DEFAULT_MAIL_FROM_EMAIL.to_string(),
            from_name: DEFAULT_MAIL_FROM_NAME.to_string(),
            max_retries: DEFAULT_MAIL_MAX_RETRIES,
        }
    }
}

impl MailConfig {
    /// Environment variables:
    /// - `AGORA_SENDGRID_API_KEY`: enables SendGrid delivery when set
    /// - `AGORA_MAIL_FROM_EMAIL`, `AGORA_MAIL_FROM_NAME`: sender identity
    /// - `AGORA_MAIL_MAX_RETRIES`: send attempts (default: 3)
    pub fn from_env() -> Self {
        Self {
            sendgrid_api_key: std::env::var("AGORA_SENDGRID_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(|k| SecretString::new(k.into())),
            from_email: std::env::var("AGORA_MAIL_FROM_EMAIL")
                .unwrap_or_else(|_| DEFAULT_MAIL_FROM_EMAIL.to_string()),
            from_name: std::env::var("AGORA_MAIL_FROM_NAME")
                .unwrap_or_else(|_| DEFAULT_MAIL_FROM_NAME.to_string()),
            max_retries: env_parse("AGORA_MAIL_MAX_RETRIES", DEFAULT_MAIL_MAX_RETRIES),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, rate limiting, lifecycle and storage.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// "development", "production", ...
    pub environment: String,

    /// Base URL of the web frontend, used in activation links.
    pub frontend_url: String,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Requests admitted per client per window.
    pub rate_limit_requests: u32,

    /// Fixed window length.
    pub rate_limit_window: Duration,

    /// How often expired counters are swept.
    pub rate_limit_sweep_interval: Duration,

    // ========================================================================
    // Lifecycle and storage
    // ========================================================================
    pub invitation_expiry: Duration,

    /// Deadline on each relational store call.
    pub store_timeout: Duration,

    pub cache: CacheSettings,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let window = Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS);
        Self {
            environment: "development".to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            rate_limit_enabled: true,
            rate_limit_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            rate_limit_window: window,
            rate_limit_sweep_interval: window,
            invitation_expiry: Duration::from_secs(DEFAULT_INVITATION_EXPIRY_SECS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            cache: CacheSettings::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `AGORA_ENVIRONMENT` (default: development)
    /// - `AGORA_FRONTEND_URL` (default: http://localhost:4000)
    /// - `AGORA_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `AGORA_RATE_LIMIT_ENABLED`, `AGORA_RATE_LIMIT_REQUESTS`,
    ///   `AGORA_RATE_LIMIT_WINDOW_SECS`, `AGORA_RATE_LIMIT_SWEEP_SECS`
    /// - `AGORA_INVITATION_EXPIRY_SECS`, `AGORA_STORE_TIMEOUT_MS`
    /// - `AGORA_CACHE_ENABLED`, `AGORA_CACHE_BACKEND`, `AGORA_CACHE_PATH`,
    ///   `AGORA_CACHE_MAX_MB`, `AGORA_CACHE_TTL_SECS`, `AGORA_CACHE_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("AGORA_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let window_secs = env_parse("AGORA_RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS).max(1);
        let sweep_secs = env_parse("AGORA_RATE_LIMIT_SWEEP_SECS", window_secs).max(1);

        let cache_backend = match std::env::var("AGORA_CACHE_BACKEND") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: ConfigError| {
                tracing::warn!(error = %e, "Falling back to default cache backend");
                CacheBackendKind::default()
            }),
            Err(_) => CacheBackendKind::default(),
        };

        Self {
            environment: std::env::var("AGORA_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .to_lowercase(),
            frontend_url: std::env::var("AGORA_FRONTEND_URL")
                .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string()),
            cors_origins,
            cors_max_age_secs: env_parse("AGORA_CORS_MAX_AGE_SECS", DEFAULT_CORS_MAX_AGE_SECS),
            rate_limit_enabled: env_flag("AGORA_RATE_LIMIT_ENABLED", true),
            rate_limit_requests: env_parse("AGORA_RATE_LIMIT_REQUESTS", DEFAULT_RATE_LIMIT_REQUESTS),
            rate_limit_window: Duration::from_secs(window_secs),
            rate_limit_sweep_interval: Duration::from_secs(sweep_secs),
            invitation_expiry: Duration::from_secs(env_parse(
                "AGORA_INVITATION_EXPIRY_SECS",
                DEFAULT_INVITATION_EXPIRY_SECS,
            )),
            store_timeout: Duration::from_millis(env_parse(
                "AGORA_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )),
            cache: CacheSettings {
                enabled: env_flag("AGORA_CACHE_ENABLED", true),
                backend: cache_backend,
                path: std::env::var("AGORA_CACHE_PATH")
                    .unwrap_or_else(|_| DEFAULT_CACHE_PATH.to_string()),
                max_size_mb: env_parse("AGORA_CACHE_MAX_MB", DEFAULT_CACHE_MAX_MB),
                ttl: Duration::from_secs(env_parse("AGORA_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)),
                timeout: Duration::from_millis(env_parse(
                    "AGORA_CACHE_TIMEOUT_MS",
                    DEFAULT_CACHE_TIMEOUT_MS,
                )),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production" || self.environment == "prod"
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_enabled && self.rate_limit_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AGORA_RATE_LIMIT_REQUESTS".to_string(),
                value: "0".to_string(),
                reason: "must admit at least one request per window".to_string(),
            });
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "AGORA_STORE_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
                reason: "store deadline must be positive".to_string(),
            });
        }
        if !(self.frontend_url.starts_with("http://") || self.frontend_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "AGORA_FRONTEND_URL".to_string(),
                value: self.frontend_url.clone(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        Ok(())
    }

    /// Activation link for a plaintext token.
    pub fn activation_url(&self, token: &str) -> String {
        format!(
            "{}{}{}",
            self.frontend_url.trim_end_matches('/'),
            ACTIVATION_PATH,
            token
        )
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            // Dev mode: allow all
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.agora.social
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_requests, 20);
        assert_eq!(config.rate_limit_window, Duration::from_secs(5));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.invitation_expiry, Duration::from_secs(3 * 24 * 3600));
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_activation_url() {
        let mut config = ApiConfig::default();
        assert_eq!(
            config.activation_url("abc"),
            "http://localhost:4000/confirm/abc"
        );
        config.frontend_url = "https://agora.social/".to_string();
        assert_eq!(
            config.activation_url("abc"),
            "https://agora.social/confirm/abc"
        );
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = ApiConfig {
            rate_limit_requests: 0,
            ..ApiConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(config.is_origin_allowed("http://localhost:4000"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec!["https://agora.social".to_string()],
            ..ApiConfig::default()
        };
        assert!(config.is_origin_allowed("https://agora.social"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notagora.social"));
    }

    #[test]
    fn test_wildcard_subdomain() {
        let config = ApiConfig {
            cors_origins: vec!["*.agora.social".to_string()],
            ..ApiConfig::default()
        };
        assert!(config.is_origin_allowed("https://app.agora.social"));
        assert!(!config.is_origin_allowed("https://evilagora.social"));
    }

    #[test]
    fn test_cache_backend_parse() {
        assert_eq!("lmdb".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Lmdb));
        assert_eq!("Memory".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Memory));
        assert!("redis".parse::<CacheBackendKind>().is_err());
    }
}
