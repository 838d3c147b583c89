//! Slack transport over the Web API.
//!
//! Outbound messages go through `chat.postMessage`; inbound owner DMs are
//! polled from `conversations.history`; button clicks arrive on the
//! interactivity webhook.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;
use tokio::time::{interval, Duration};

use draftmill_schema::{ChatEvent, DraftAction};

use crate::{ChatEventHandler, ChatTransport};

const DEFAULT_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot token (xoxb-...)
    pub bot_token: String,
    /// DM channel with the configured owner.
    pub owner_channel: String,
    /// Slack user id of the owner; messages from anyone else are ignored.
    pub owner_user_id: String,
    /// Poll interval in seconds.
    pub poll_interval_secs: u64,
}

impl SlackConfig {
    pub fn new(
        bot_token: impl Into<String>,
        owner_channel: impl Into<String>,
        owner_user_id: impl Into<String>,
    ) -> Self {
        Self {
            bot_token: bot_token.into(),
            owner_channel: owner_channel.into(),
            owner_user_id: owner_user_id.into(),
            poll_interval_secs: 5,
        }
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SlackTransport {
    client: reqwest::Client,
    config: SlackConfig,
    api_base: String,
}

impl SlackTransport {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn post_message(&self, body: serde_json::Value) -> Result<String> {
        #[derive(Deserialize)]
        struct PostMessageResponse {
            ok: bool,
            #[serde(default)]
            ts: Option<String>,
            #[serde(default)]
            error: Option<String>,
        }

        let resp: PostMessageResponse = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.config.bot_token)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(anyhow!(
                "slack chat.postMessage failed: {}",
                resp.error.unwrap_or_else(|| "unknown".into())
            ));
        }
        resp.ts.ok_or_else(|| anyhow!("slack response missing ts"))
    }
}

/// Block Kit payload for a draft card: the draft text plus the three
/// action buttons, each carrying the draft id as its value.
pub fn draft_card_blocks(text: &str, draft_id: &str) -> serde_json::Value {
    serde_json::json!([
        {
            "type": "section",
            "text": { "type": "mrkdwn", "text": text }
        },
        {
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "action_id": "approve",
                    "text": { "type": "plain_text", "text": "Approve" },
                    "style": "primary",
                    "value": draft_id
                },
                {
                    "type": "button",
                    "action_id": "rework",
                    "text": { "type": "plain_text", "text": "Rework" },
                    "value": draft_id
                },
                {
                    "type": "button",
                    "action_id": "syndicate",
                    "text": { "type": "plain_text", "text": "Syndicate" },
                    "value": draft_id
                }
            ]
        }
    ])
}

#[async_trait]
impl ChatTransport for SlackTransport {
    async fn send_dm(&self, text: &str) -> Result<String> {
        self.post_message(serde_json::json!({
            "channel": self.config.owner_channel,
            "text": text,
        }))
        .await
    }

    async fn reply_in_thread(&self, thread_ts: &str, text: &str) -> Result<()> {
        self.post_message(serde_json::json!({
            "channel": self.config.owner_channel,
            "text": text,
            "thread_ts": thread_ts,
        }))
        .await
        .map(|_| ())
    }

    async fn send_draft_card(&self, text: &str, draft_id: &str) -> Result<String> {
        self.post_message(serde_json::json!({
            "channel": self.config.owner_channel,
            "text": text,
            "blocks": draft_card_blocks(text, draft_id),
        }))
        .await
    }
}

/// Polls the owner DM channel for new messages and forwards them as chat
/// events. Runs until the task is aborted.
pub struct SlackDmPoller {
    client: reqwest::Client,
    config: SlackConfig,
    api_base: String,
    handler: Arc<dyn ChatEventHandler>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

impl SlackDmPoller {
    pub fn new(config: SlackConfig, handler: Arc<dyn ChatEventHandler>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
            api_base: DEFAULT_API_BASE.to_string(),
            handler,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn run(self) -> Result<()> {
        let mut last_ts: Option<String> = None;
        let mut timer = interval(Duration::from_secs(self.config.poll_interval_secs));
        loop {
            timer.tick().await;
            match self.poll_once(last_ts.as_deref()).await {
                Ok(Some(newest)) => last_ts = Some(newest),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("slack DM poll failed: {e}");
                }
            }
        }
    }

    /// One history fetch. Returns the newest ts seen, if any.
    pub async fn poll_once(&self, oldest: Option<&str>) -> Result<Option<String>> {
        let mut query = vec![
            ("channel".to_string(), self.config.owner_channel.clone()),
            ("limit".to_string(), "20".to_string()),
        ];
        if let Some(ts) = oldest {
            query.push(("oldest".to_string(), ts.to_string()));
        }

        let resp: HistoryResponse = self
            .client
            .get(format!("{}/conversations.history", self.api_base))
            .bearer_auth(&self.config.bot_token)
            .query(&query)
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(anyhow!(
                "slack conversations.history failed: {}",
                resp.error.unwrap_or_else(|| "unknown".into())
            ));
        }

        let mut newest: Option<String> = None;
        // History arrives newest-first; process in arrival order.
        for msg in resp.messages.into_iter().rev() {
            if newest.as_deref().map_or(true, |n| msg.ts.as_str() > n) {
                newest = Some(msg.ts.clone());
            }
            if let Some(prev) = oldest {
                if msg.ts.as_str() <= prev {
                    continue;
                }
            }
            if msg.bot_id.is_some() {
                continue;
            }
            if msg.user.as_deref() != Some(self.config.owner_user_id.as_str()) {
                continue;
            }
            let Some(text) = msg.text.filter(|t| !t.is_empty()) else {
                continue;
            };

            let event = ChatEvent::Message {
                text,
                thread_ts: msg.thread_ts,
            };
            if let Err(e) = self.handler.handle_event(event).await {
                tracing::error!("failed to handle slack message: {e}");
            }
        }

        Ok(newest)
    }
}

#[derive(Debug, Deserialize)]
struct InteractionForm {
    payload: String,
}

/// Decode a Slack interactivity payload into a chat event. Anything that
/// is not a recognized block action yields `None`.
pub fn parse_interaction_payload(payload: &str) -> Option<ChatEvent> {
    #[derive(Deserialize)]
    struct Payload {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        actions: Vec<PayloadAction>,
    }
    #[derive(Deserialize)]
    struct PayloadAction {
        action_id: String,
        #[serde(default)]
        value: Option<String>,
    }

    let parsed: Payload = serde_json::from_str(payload).ok()?;
    if parsed.kind != "block_actions" {
        return None;
    }
    let action = parsed.actions.into_iter().next()?;
    let kind = DraftAction::parse(&action.action_id)?;
    Some(ChatEvent::Action {
        kind,
        draft_id: action.value?,
    })
}

async fn interactions(
    State(handler): State<Arc<dyn ChatEventHandler>>,
    Form(form): Form<InteractionForm>,
) -> &'static str {
    match parse_interaction_payload(&form.payload) {
        Some(event) => {
            if let Err(e) = handler.handle_event(event).await {
                tracing::error!("failed to handle slack interaction: {e}");
            }
        }
        None => {
            tracing::debug!("ignoring unrecognized slack interaction payload");
        }
    }
    // Slack only needs a quick 200.
    ""
}

pub fn interactions_router(handler: Arc<dyn ChatEventHandler>) -> Router {
    Router::new()
        .route("/slack/interactions", post(interactions))
        .with_state(handler)
}
