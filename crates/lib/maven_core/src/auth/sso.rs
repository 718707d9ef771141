//! Cross-domain SSO bridge.
//!
//! The auth center mints a short-lived handshake token from the current
//! principal and forwards it to an allow-listed satellite origin, which
//! verifies it and opens its own local session.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use url::form_urlencoded::byte_serialize;

use super::AuthError;
use super::redirect::safe_redirect_url;
use super::token::{TokenCodec, TokenScope};
use crate::models::auth::{BridgedFields, BridgedPrincipal, Principal};

/// Audience namespace of SSO handshake tokens.
pub const SSO_AUDIENCE: &str = "maven-sso";

/// Handshake token lifetime: 2 minutes.
pub const SSO_TOKEN_TTL_SECS: i64 = 2 * 60;

/// Path of the handshake entry point on the auth center.
pub const SSO_START_PATH: &str = "/sso/start";

const PLAYER_LOGIN_PATH: &str = "/login";
const ADMIN_LOGIN_PATH: &str = "/admin-login";

/// Claims carried by an SSO handshake token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl SsoClaims {
    /// `player:<id>` when a player id is present, else `admin:<id>`.
    /// Empty ids count as absent.
    pub fn subject(&self) -> Option<String> {
        match (non_empty(&self.player_id), non_empty(&self.admin_id)) {
            (Some(p), _) => Some(format!("player:{p}")),
            (None, Some(a)) => Some(format!("admin:{a}")),
            (None, None) => None,
        }
    }
}

fn non_empty(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|s| !s.is_empty())
}

impl From<&Principal> for SsoClaims {
    fn from(principal: &Principal) -> Self {
        let owned = |s: Option<&str>| s.map(str::to_string);
        Self {
            player_id: owned(principal.player_id()),
            admin_id: owned(principal.admin_id()),
            role: owned(principal.role()),
            name: owned(principal.name()),
            email: owned(principal.email()),
            image: owned(principal.image()),
        }
    }
}

impl From<SsoClaims> for BridgedFields {
    fn from(c: SsoClaims) -> Self {
        Self {
            player_id: c.player_id.filter(|s| !s.is_empty()),
            admin_id: c.admin_id.filter(|s| !s.is_empty()),
            role: c.role,
            name: c.name,
            email: c.email,
            image: c.image,
        }
    }
}

/// Which login page an unauthenticated handshake is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMode {
    Admin,
    #[default]
    Player,
}

impl LoginMode {
    /// Anything other than `admin` is treated as player mode.
    pub fn from_param(mode: Option<&str>) -> Self {
        match mode {
            Some("admin") => LoginMode::Admin,
            _ => LoginMode::Player,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoginMode::Admin => "admin",
            LoginMode::Player => "player",
        }
    }

    fn login_path(self) -> &'static str {
        match self {
            LoginMode::Admin => ADMIN_LOGIN_PATH,
            LoginMode::Player => PLAYER_LOGIN_PATH,
        }
    }
}

/// Parameters of `GET /sso/start`.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    pub redirect: Option<String>,
    pub next: Option<String>,
    pub mode: LoginMode,
}

/// Where the browser goes after `start_handshake`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Redirect target was not allow-listed; go to the safe default.
    Rejected,
    /// No session yet; log in first, then re-enter the handshake.
    Login(String),
    /// Session exists; forward to the satellite with the token attached.
    Forward(Url),
}

impl HandshakeOutcome {
    pub fn location(&self) -> String {
        match self {
            HandshakeOutcome::Rejected => super::redirect::SAFE_DEFAULT.to_string(),
            HandshakeOutcome::Login(location) => location.clone(),
            HandshakeOutcome::Forward(url) => url.to_string(),
        }
    }
}

/// Configuration consumed by the bridge.
#[derive(Debug, Clone, Default)]
pub struct SsoSettings {
    pub secret: Option<String>,
    pub issuer: Option<String>,
    pub auth_center_url: Option<String>,
    pub allowed_domain: Option<String>,
}

/// Issues and verifies SSO handshake tokens.
#[derive(Debug)]
pub struct SsoBridge {
    codec: Result<TokenCodec, String>,
    issuer: Option<String>,
    auth_center_url: Option<String>,
    allowed_domain: Option<String>,
}

impl SsoBridge {
    pub fn new(settings: SsoSettings) -> Self {
        let codec = TokenCodec::from_config(settings.secret.as_deref(), "SSO_JWT_SECRET")
            .map_err(|e| e.to_string());
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            codec,
            issuer: non_empty(settings.issuer),
            auth_center_url: non_empty(settings.auth_center_url),
            allowed_domain: non_empty(settings.allowed_domain),
        }
    }

    fn codec(&self) -> Result<&TokenCodec, AuthError> {
        self.codec
            .as_ref()
            .map_err(|e| AuthError::Configuration(e.clone()))
    }

    fn scope(&self) -> Result<TokenScope<'_>, AuthError> {
        let issuer = self.issuer.as_deref().ok_or_else(|| {
            AuthError::Configuration("missing SSO_ISSUER or AUTH_CENTER_URL".into())
        })?;
        Ok(TokenScope::new(SSO_AUDIENCE).with_issuer(issuer))
    }

    fn allowed_domain(&self) -> Result<&str, AuthError> {
        self.allowed_domain
            .as_deref()
            .ok_or_else(|| AuthError::Configuration("missing SSO_ALLOWED_DOMAIN".into()))
    }

    /// Validate a redirect target against the configured root domain.
    pub fn safe_redirect(&self, input: &str) -> Result<Url, AuthError> {
        safe_redirect_url(input, self.allowed_domain()?).ok_or(AuthError::InvalidRedirectTarget)
    }

    /// Mint a handshake token carrying the principal's fields.
    pub fn issue_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let claims = SsoClaims::from(principal);
        let subject = claims
            .subject()
            .ok_or_else(|| AuthError::Internal("principal without id".into()))?;
        self.codec()?.issue(
            &claims,
            self.scope()?,
            &subject,
            Duration::seconds(SSO_TOKEN_TTL_SECS),
        )
    }

    /// Verify a handshake token and rebuild the bridged principal.
    pub fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        let verified = self.codec()?.verify::<SsoClaims>(token, self.scope()?)?;
        if verified.claims.subject().as_deref() != Some(verified.subject.as_str()) {
            return Err(AuthError::TokenInvalid("subject does not match claims".into()));
        }
        let bridged = BridgedPrincipal::new(verified.claims.into())
            .ok_or_else(|| AuthError::TokenInvalid("token carries no principal".into()))?;
        Ok(Principal::Bridged(bridged))
    }

    /// Decide where `GET /sso/start` sends the browser.
    pub fn start_handshake(
        &self,
        session: Option<&Principal>,
        request: &HandshakeRequest,
    ) -> Result<HandshakeOutcome, AuthError> {
        let target = match request.redirect.as_deref().filter(|r| !r.is_empty()) {
            Some(raw) => match self.safe_redirect(raw) {
                Ok(url) => url,
                Err(AuthError::InvalidRedirectTarget) => {
                    debug!("sso handshake rejected: redirect target not allow-listed");
                    return Ok(HandshakeOutcome::Rejected);
                }
                Err(e) => return Err(e),
            },
            None => return Ok(HandshakeOutcome::Rejected),
        };

        let Some(principal) = session else {
            return self.login_redirect(&target, request).map(HandshakeOutcome::Login);
        };

        let token = self.issue_token(principal)?;
        let mut forward = target;
        set_query_params(
            &mut forward,
            &[("token", Some(token.as_str())), ("next", request.next.as_deref())],
        );
        info!(
            host = forward.host_str().unwrap_or_default(),
            admin = principal.is_admin(),
            "sso handshake forwarded"
        );
        Ok(HandshakeOutcome::Forward(forward))
    }

    fn login_redirect(&self, target: &Url, request: &HandshakeRequest) -> Result<String, AuthError> {
        let base = self
            .auth_center_url
            .as_deref()
            .ok_or_else(|| AuthError::Configuration("missing AUTH_CENTER_URL".into()))?;
        let mut callback = Url::parse(base)
            .and_then(|b| b.join(SSO_START_PATH))
            .map_err(|e| AuthError::Configuration(format!("invalid AUTH_CENTER_URL: {e}")))?;
        {
            let mut query = callback.query_pairs_mut();
            query.append_pair("redirect", target.as_str());
            if let Some(next) = request.next.as_deref() {
                query.append_pair("next", next);
            }
            query.append_pair("mode", request.mode.as_str());
        }
        let encoded: String = byte_serialize(callback.as_str().as_bytes()).collect();
        Ok(format!("{}?callbackUrl={encoded}", request.mode.login_path()))
    }
}

/// Set (replace) query parameters, keeping any other existing ones.
fn set_query_params(url: &mut Url, params: &[(&str, Option<&str>)]) {
    let keep: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(name, _)| &**k == *name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut query = url.query_pairs_mut();
    query.clear();
    query.extend_pairs(keep);
    for (name, value) in params {
        if let Some(value) = value {
            query.append_pair(name, value);
        }
    }
}
