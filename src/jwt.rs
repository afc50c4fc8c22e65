//! JWT issuance and verification for the three token kinds.
//!
//! - Access tokens: short-lived, stateless, carry identity and role
//! - Refresh tokens: bound to a client id, carry the session's token id (`jti`)
//! - Email verification tokens: carry the address to activate
//!
//! Each kind has its own claims struct with `deny_unknown_fields`, so a token
//! of one kind never deserializes as another. Expiry is checked against the
//! injected [`Clock`] rather than the system time.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::store::{UserInfo, UserRole};

/// Issuer claim written into and required on every token.
pub const ISSUER: &str = "authkeep";

/// Access token lifetime default: 15 minutes
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;

/// Email verification token lifetime default: 24 hours
pub const DEFAULT_EMAIL_VERIFY_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest configurable token lifetime: 10 years
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Token kind, used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
            TokenKind::EmailVerification => write!(f, "email verification"),
        }
    }
}

/// Claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub iat: u64,
    pub exp: u64,
}

/// Claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub iss: String,
    pub client_id: String,
    /// Token id, must match the session row to be usable
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

/// Claims for email verification tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailVerifyClaims {
    pub iss: String,
    pub email: String,
    pub iat: u64,
    pub exp: u64,
}

trait Expiring {
    fn exp(&self) -> u64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> u64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> u64 {
        self.exp
    }
}

impl Expiring for EmailVerifyClaims {
    fn exp(&self) -> u64 {
        self.exp
    }
}

/// Identity recovered from a valid refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSubject {
    pub client_id: String,
    pub token_id: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token signature or claims are invalid")]
    Invalid,
    #[error("token is malformed")]
    Malformed,
    #[error("token lifetime runs past the end of the clock")]
    ExpiryOverflow,
    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

/// Absolute expiry `ttl_secs` after `now`.
pub fn expiry_after(now: u64, ttl_secs: u64) -> Result<u64, TokenError> {
    now.checked_add(ttl_secs).ok_or(TokenError::ExpiryOverflow)
}

/// Lifetimes for tokens whose expiry the issuer chooses.
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub access_ttl_secs: u64,
    pub email_verify_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            email_verify_ttl_secs: DEFAULT_EMAIL_VERIFY_TTL_SECS,
        }
    }
}

/// Signs and verifies tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue an access token for `user`, expiring after the access lifetime.
    pub fn issue_access(&self, user: &UserInfo) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            iss: ISSUER.to_string(),
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: expiry_after(now, self.config.access_ttl_secs)?,
        };
        self.encode(&claims)
    }

    /// Issue a refresh token. The caller chooses the token id and expiry so that
    /// session creation and rotation stay consistent with the stored row.
    pub fn issue_refresh(
        &self,
        client_id: &str,
        token_id: &str,
        expires_at: u64,
    ) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            iss: ISSUER.to_string(),
            client_id: client_id.to_string(),
            jti: token_id.to_string(),
            iat: self.clock.now(),
            exp: expires_at,
        };
        self.encode(&claims)
    }

    /// Issue an email verification token for `email`.
    pub fn issue_email_verification(&self, email: &str) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = EmailVerifyClaims {
            iss: ISSUER.to_string(),
            email: email.to_string(),
            iat: now,
            exp: expiry_after(now, self.config.email_verify_ttl_secs)?,
        };
        self.encode(&claims)
    }

    /// Verify an access token and recover the embedded identity.
    pub fn verify_access(&self, token: &str) -> Result<UserInfo, TokenError> {
        let claims: AccessClaims = self.decode(token)?;

        if claims.username.is_empty() || claims.email.is_empty() {
            return Err(TokenError::Invalid);
        }
        let id = claims.sub.parse::<i64>().map_err(|_| TokenError::Invalid)?;

        Ok(UserInfo {
            id,
            username: claims.username,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Verify a refresh token and recover its client id and token id.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshSubject, TokenError> {
        let claims: RefreshClaims = self.decode(token)?;

        if claims.client_id.is_empty() || claims.jti.is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(RefreshSubject {
            client_id: claims.client_id,
            token_id: claims.jti,
        })
    }

    /// Verify an email verification token and recover the address.
    /// Malformed input is reported as `Invalid` for this kind.
    pub fn verify_email_verification(&self, token: &str) -> Result<String, TokenError> {
        let claims: EmailVerifyClaims = self.decode(token).map_err(|e| match e {
            TokenError::Malformed => TokenError::Invalid,
            other => other,
        })?;

        if claims.email.is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(claims.email)
    }

    fn encode<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    fn decode<C: DeserializeOwned + Expiring>(&self, token: &str) -> Result<C, TokenError> {
        if !is_well_formed(token) {
            return Err(TokenError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the injected clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[ISSUER]);

        let data = jsonwebtoken::decode::<C>(token, &self.decoding_key, &validation)
            .map_err(|e| classify(e.kind()))?;

        if self.clock.now() >= data.claims.exp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

/// Three non-empty base64url segments. Anything else is not a JWT at all.
fn is_well_formed(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        // Structure was checked up front, so every remaining failure (bad
        // signature, undecodable segment, missing or unknown claims, wrong
        // issuer or algorithm) means the token is not one of ours.
        _ => TokenError::Invalid,
    }
}
