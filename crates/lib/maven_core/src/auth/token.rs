//! Signed-token codec (HS256) shared by the session, SSO and admin-link flows.
//!
//! A token is a claims bag wrapped in a registered-claims envelope
//! (`aud`, optional `iss`, `sub`, `iat`, `exp`). The codec is built once from
//! an explicit secret and injected wherever tokens are minted or checked.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Registered claims wrapped around a custom claims bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope<C> {
    #[serde(flatten)]
    claims: C,
    aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Audience and issuer binding for a token namespace.
#[derive(Debug, Clone, Copy)]
pub struct TokenScope<'a> {
    pub audience: &'a str,
    pub issuer: Option<&'a str>,
}

impl<'a> TokenScope<'a> {
    pub fn new(audience: &'a str) -> Self {
        Self {
            audience,
            issuer: None,
        }
    }

    pub fn with_issuer(mut self, issuer: &'a str) -> Self {
        self.issuer = Some(issuer);
        self
    }
}

/// A successfully verified token.
#[derive(Debug, Clone)]
pub struct VerifiedToken<C> {
    pub claims: C,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// HMAC-SHA256 sign/verify over a single shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Build a codec from an optional configured secret.
    ///
    /// `name` is the configuration key reported when the secret is absent.
    pub fn from_config(secret: Option<&str>, name: &str) -> Result<Self, AuthError> {
        match secret {
            Some(s) if !s.is_empty() => Ok(Self::new(s.as_bytes())),
            _ => Err(AuthError::Configuration(format!("missing {name}"))),
        }
    }

    /// Sign `claims` for `scope`, valid for `ttl` from now.
    pub fn issue<C: Serialize>(
        &self,
        claims: &C,
        scope: TokenScope<'_>,
        subject: &str,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        self.issue_at(claims, scope, subject, ttl, Utc::now())
    }

    /// Sign `claims` as if issued at `now`.
    pub fn issue_at<C: Serialize>(
        &self,
        claims: &C,
        scope: TokenScope<'_>,
        subject: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let iat = now.timestamp();
        let envelope = Envelope {
            claims,
            aud: scope.audience.to_string(),
            iss: scope.issuer.map(str::to_string),
            sub: subject.to_string(),
            iat,
            exp: iat + ttl.num_seconds(),
        };
        encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify a token against `scope` at the current time.
    pub fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
        scope: TokenScope<'_>,
    ) -> Result<VerifiedToken<C>, AuthError> {
        self.verify_at(token, scope, Utc::now())
    }

    /// Verify a token against `scope` at instant `now`.
    ///
    /// Valid iff the signature, audience and issuer match and
    /// `iat <= now <= exp` (millisecond resolution, no leeway).
    pub fn verify_at<C: DeserializeOwned>(
        &self,
        token: &str,
        scope: TokenScope<'_>,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken<C>, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Time window is checked below against the caller's clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["exp", "iat", "aud", "sub"]);
        validation.set_audience(&[scope.audience]);
        if let Some(issuer) = scope.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<Envelope<C>>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;
        let envelope = data.claims;

        let now_ms = now.timestamp_millis();
        if now_ms < envelope.iat.saturating_mul(1000) {
            return Err(AuthError::TokenInvalid("token used before issue time".into()));
        }
        if now_ms > envelope.exp.saturating_mul(1000) {
            return Err(AuthError::TokenInvalid("token expired".into()));
        }

        Ok(VerifiedToken {
            claims: envelope.claims,
            subject: envelope.sub,
            issued_at: timestamp(envelope.iat)?,
            expires_at: timestamp(envelope.exp)?,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AuthError::TokenInvalid("timestamp out of range".into()))
}
