//! Login notification webhook.
//!
//! Posts a Discord embed describing the player after each provider login.
//! Delivery is best effort: failures are logged and dropped.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::models::auth::IdentityRecord;

const EMBED_COLOR: u32 = 0x5865F2;

#[derive(Clone)]
pub struct LoginNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl LoginNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url: webhook_url.filter(|u| !u.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// A notifier that never sends.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub async fn notify_login(&self, player: &IdentityRecord) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        match self.client.post(url).json(&login_payload(player)).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(discord_id = ?player.discord_id, "login notification sent");
            }
            Ok(resp) => warn!(status = %resp.status(), "login notification rejected"),
            Err(e) => warn!(error = %e, "login notification failed"),
        }
    }
}

fn login_payload(player: &IdentityRecord) -> Value {
    let unknown = "-";
    let mut embed = json!({
        "title": "Player login",
        "color": EMBED_COLOR,
        "fields": [
            { "name": "Discord", "value": player.discord_username.as_deref().unwrap_or(unknown), "inline": true },
            { "name": "Minecraft", "value": player.minecraft_name.as_deref().unwrap_or(unknown), "inline": true },
            { "name": "Account", "value": player.account_type, "inline": true },
            { "name": "Verified", "value": if player.verified { "yes" } else { "no" }, "inline": true },
        ],
        "timestamp": player.last_updated.to_rfc3339(),
    });
    if let Some(avatar) = &player.discord_avatar {
        embed["thumbnail"] = json!({ "url": avatar });
    }
    json!({ "embeds": [embed] })
}
