//! Authentication Module
//!
//! Issues and validates HS256 bearer tokens carrying typed [`Claims`].
//!
//! Validation order is fixed: signature first (nothing in the payload is
//! trusted before that), then the time window against an injected clock,
//! then issuer and audience equality.

use crate::constants::{
    DEFAULT_JWT_AUDIENCE, DEFAULT_JWT_CLOCK_SKEW_SECS, DEFAULT_JWT_EXPIRATION_SECS,
    DEFAULT_JWT_ISSUER, INSECURE_DEFAULT_SECRET, MIN_PRODUCTION_SECRET_LEN,
};
use crate::error::{ApiError, ApiResult};
use agora_core::{ConfigError, Role, User, UserId};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock abstraction for token time checks.
///
/// Time validation is done here rather than inside `jsonwebtoken` so tests
/// can pin the clock and a broken host clock fails loudly instead of
/// panicking.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds. Negative for pre-1970 clocks.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}


// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// Signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for key construction).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

fn build_jwt_secret(secret_str: String) -> JwtSecret {
    let normalized = if secret_str.trim().is_empty() {
        INSECURE_DEFAULT_SECRET.to_string()
    } else {
        secret_str
    };

    match JwtSecret::new(normalized) {
        Ok(secret) => secret,
        Err(_) => JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into())),
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret for signing and verification
    pub jwt_secret: JwtSecret,

    /// Always HS256 in practice; kept explicit for the header
    pub jwt_algorithm: Algorithm,

    /// Token lifetime in seconds (default: 3 days)
    pub jwt_expiration_secs: i64,

    /// Expected `iss`
    pub jwt_issuer: String,

    /// Expected `aud`
    pub jwt_audience: String,

    /// Tolerance applied to `exp` and `nbf` (default: 0)
    pub jwt_clock_skew_secs: i64,

    /// Clock for time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let secret_str =
            std::env::var("AGORA_JWT_SECRET").unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            jwt_audience: DEFAULT_JWT_AUDIENCE.to_string(),
            jwt_clock_skew_secs: DEFAULT_JWT_CLOCK_SKEW_SECS,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `AGORA_JWT_SECRET`: signing secret
    /// - `AGORA_JWT_EXPIRATION_SECS`: token lifetime (default: 259200)
    /// - `AGORA_JWT_ISSUER`: expected issuer (default: "agora")
    /// - `AGORA_JWT_AUDIENCE`: expected audience (default: "agora")
    /// - `AGORA_JWT_CLOCK_SKEW_SECS`: clock skew tolerance (default: 0)
    pub fn from_env() -> Self {
        let secret_str =
            std::env::var("AGORA_JWT_SECRET").unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("AGORA_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_EXPIRATION_SECS),
            jwt_issuer: std::env::var("AGORA_JWT_ISSUER")
                .unwrap_or_else(|_| DEFAULT_JWT_ISSUER.to_string()),
            jwt_audience: std::env::var("AGORA_JWT_AUDIENCE")
                .unwrap_or_else(|_| DEFAULT_JWT_AUDIENCE.to_string()),
            jwt_clock_skew_secs: std::env::var("AGORA_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_JWT_CLOCK_SKEW_SECS),
            clock: Arc::new(SystemClock),
        }
    }

    /// Refuse insecure secrets in production; warn about them elsewhere.
    ///
    /// Called once at startup.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("AGORA_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();

        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start server in production with insecure JWT secret. \
                     Set AGORA_JWT_SECRET to a secure value. \
                     AGORA_ENVIRONMENT={}",
                    environment
                )));
            }
            tracing::warn!(
                "SECURITY WARNING: Using insecure default JWT secret. \
                 Set AGORA_JWT_SECRET to a secure random value (minimum 32 characters) \
                 before deploying."
            );
        }

        if self.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least {} characters long.",
                    self.jwt_secret.len(),
                    MIN_PRODUCTION_SECRET_LEN
                )));
            } else if !self.jwt_secret.is_insecure_default() {
                tracing::warn!(
                    secret_len = self.jwt_secret.len(),
                    "SECURITY WARNING: JWT secret is short. For production, use at least 32 characters."
                );
            }
        }

        Ok(())
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Token claims. Every field is required on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    pub iss: String,

    pub aud: String,
}

impl Claims {
    /// Claims for a user, valid from now for `ttl_secs`.
    ///
    /// `iat`, `nbf` and `exp` all derive from a single clock reading.
    pub fn for_subject(
        user_id: UserId,
        ttl_secs: i64,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        clock: &dyn JwtClock,
    ) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: user_id.to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl_secs),
            iss: issuer.into(),
            aud: audience.into(),
        }
    }

    /// The subject as a user id.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Malformed)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token issuer is not accepted")]
    InvalidIssuer,

    #[error("token audience is not accepted")]
    InvalidAudience,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("server clock returned a pre-epoch time")]
    ClockError,
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(reason) => {
                tracing::error!(reason = %reason, "Token signing failed");
                ApiError::internal_error("Failed to issue token")
            }
            TokenError::ClockError => {
                ApiError::internal_error("Server time configuration error - please contact support")
            }
            other => {
                // Which check failed stays in the logs.
                tracing::debug!(reason = %other, "Rejected bearer token");
                ApiError::unauthorized("Invalid or expired token")
            }
        }
    }
}

/// Check `now` against the token's time window.
fn validate_claim_times(now: i64, exp: i64, nbf: i64, leeway_secs: i64) -> Result<(), TokenError> {
    if now.saturating_add(leeway_secs) < nbf {
        return Err(TokenError::NotYetValid);
    }
    if now >= exp.saturating_add(leeway_secs) {
        return Err(TokenError::Expired);
    }
    Ok(())
}

// ============================================================================
// AUTHENTICATOR
// ============================================================================

/// Issues and validates bearer tokens. Holds no mutable state.
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<AuthConfig>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Arc<Validation>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        let secret = config.jwt_secret.expose().as_bytes();
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);

        // Signature and claim presence only; time, iss and aud are ours.
        let mut validation = Validation::new(config.jwt_algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = ["exp", "nbf", "iss", "aud", "sub"]
            .into_iter()
            .map(String::from)
            .collect::<HashSet<_>>();

        Self {
            config: Arc::new(config),
            encoding_key,
            decoding_key,
            validation: Arc::new(validation),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Sign arbitrary claims.
    pub fn generate_token(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = Header::new(self.config.jwt_algorithm);
        encode(&header, claims, &self.encoding_key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Build and sign claims for a user with the configured lifetime.
    pub fn issue_for(&self, user_id: UserId) -> Result<String, TokenError> {
        let claims = Claims::for_subject(
            user_id,
            self.config.jwt_expiration_secs,
            &self.config.jwt_issuer,
            &self.config.jwt_audience,
            &*self.config.clock,
        );
        self.generate_token(&claims)
    }

    /// Verify a token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })?
            .claims;

        let now = self.config.clock.now_epoch_secs();
        if now < 0 {
            tracing::error!(
                timestamp = now,
                "System clock returned pre-epoch time - server time is broken"
            );
            return Err(TokenError::ClockError);
        }

        validate_claim_times(now, claims.exp, claims.nbf, self.config.jwt_clock_skew_secs)?;

        if claims.iss != self.config.jwt_issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if claims.aud != self.config.jwt_audience {
            return Err(TokenError::InvalidAudience);
        }

        Ok(claims)
    }
}

// ============================================================================
// PRINCIPAL
// ============================================================================

/// The authenticated caller of a request.
///
/// Built by `auth_middleware` and handed to services as an explicit argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user: User,
}

impl Principal {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role()
    }

    /// Whether this principal's role is at least `required`.
    pub fn has_role_at_least(&self, required: Role) -> bool {
        self.role().level() >= required.level()
    }
}
