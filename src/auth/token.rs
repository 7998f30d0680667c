//! Bearer token issuance and validation.
//!
//! Tokens are compact JWTs signed with HS256. The algorithm is fixed here in
//! code: the header's `alg` field is never used to pick a verification method,
//! it is only checked against the pinned value.
use actix_web::http::header::HeaderValue;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// User id
    pub sub: String,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

/// Claims as presented by a caller. `sub` stays untyped so a non-string
/// subject is reported as malformed rather than as a broken token.
#[derive(Deserialize)]
struct PresentedClaims {
    sub: serde_json::Value,
}

/// Why a presented token was refused. Callers only ever see "unauthorized";
/// the variant is kept for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("invalid signature or token structure")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed subject")]
    MalformedSubject,

    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        }
    }

    pub fn issue(&self, subject: Uuid, lifetime: Duration) -> Result<String, TokenError> {
        self.issue_at(subject, lifetime, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: Uuid,
        lifetime: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
        };

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &SecretString, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Runs the full admission check against an `Authorization` header value.
    pub fn authorize_header(&self, header: Option<&HeaderValue>) -> Result<Uuid, TokenError> {
        let token = header
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::MissingCredential)?;

        self.validate(token)
    }

    /// Verifies signature and expiry, then returns the subject.
    pub fn validate(&self, token: &str) -> Result<Uuid, TokenError> {
        let claims = decode::<PresentedClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => TokenError::MalformedSubject,
                _ => TokenError::InvalidSignature,
            })?
            .claims;

        claims
            .sub
            .as_str()
            .and_then(|sub| Uuid::parse_str(sub).ok())
            .ok_or(TokenError::MalformedSubject)
    }
}
