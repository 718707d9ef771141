#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use maven_api::{AppState, config::ApiConfig};
use maven_core::auth::password::hash_password;
use maven_core::auth::sso::SsoBridge;
use maven_core::identity::{IdentityStore, MemoryIdentityStore};
use maven_core::models::auth::{GrantRequest, PlayerPrincipal, Principal};
use tower::ServiceExt;

pub const AUTH_CENTER: &str = "https://mavenmc.com.br";
pub const ADMIN_PASSWORD: &str = "hunter22";

pub fn test_config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: String::new(),
        session_secret: Some("session-secret".into()),
        sso_secret: Some("sso-secret".into()),
        admin_link_secret: Some("link-secret".into()),
        auth_center_url: Some(AUTH_CENTER.into()),
        sso_issuer: Some(AUTH_CENTER.into()),
        sso_allowed_domain: Some("mavenmc.com.br".into()),
        admin_email_domain: "mavenmc.local".into(),
        discord_client_id: Some("client".into()),
        discord_client_secret: Some("secret".into()),
        discord_redirect_uri: Some(format!("{AUTH_CENTER}/auth/discord/callback")),
        discord_webhook_url: None,
        cookie_secure: false,
    }
}

pub struct TestApp {
    pub store: Arc<MemoryIdentityStore>,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let store = Arc::new(MemoryIdentityStore::new());
        let state = AppState::new(config, store.clone());
        let router = maven_api::router(state.clone());
        Self {
            store,
            state,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("request")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    /// Credential admin `root` with role `owner`; returns its id.
    pub async fn create_admin(&self) -> String {
        let hash = hash_password(ADMIN_PASSWORD).expect("hash");
        self.store
            .create_admin_user("root@mavenmc.local", Some("Root"), &hash, "owner")
            .await
            .expect("create admin")
    }

    pub async fn grant(&self, discord_id: &str) {
        self.store
            .upsert_admin_grant(&GrantRequest {
                discord_id: discord_id.into(),
                discord_username: None,
                access_level: "admin".into(),
                granted_by: None,
            })
            .await
            .expect("grant");
    }

    /// Log in `root` and return the session cookie pair.
    pub async fn admin_cookie(&self) -> String {
        let resp = self
            .post_json(
                "/auth/credentials",
                None,
                serde_json::json!({ "username": "root", "password": ADMIN_PASSWORD }),
            )
            .await;
        session_cookie(&resp).expect("admin session cookie")
    }

    /// A player session for `discord_id`, established through `/auth/sso`.
    pub async fn player_cookie(&self, discord_id: &str) -> String {
        let token = self.sso_token_for_player(discord_id);
        let resp = self
            .post_json("/auth/sso", None, serde_json::json!({ "token": token }))
            .await;
        session_cookie(&resp).expect("player session cookie")
    }

    pub fn bridge(&self) -> SsoBridge {
        SsoBridge::new(self.state.config.sso_settings())
    }

    pub fn sso_token_for_player(&self, discord_id: &str) -> String {
        let player = Principal::Player(PlayerPrincipal {
            player_id: discord_id.into(),
            name: Some("Foo".into()),
            email: None,
            image: None,
            admin_id: None,
        });
        self.bridge().issue_token(&player).expect("sso token")
    }
}

/// `name=value` of the session cookie set by the response, if any.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("maven_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub async fn read_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8")
}
