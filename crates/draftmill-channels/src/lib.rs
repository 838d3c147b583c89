use anyhow::Result;
use async_trait::async_trait;

use draftmill_schema::ChatEvent;

/// Outbound chat surface: direct messages, threaded replies, and draft
/// cards carrying the approve/rework/syndicate button set.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a plain DM. Returns the message ts (thread anchor).
    async fn send_dm(&self, text: &str) -> Result<String>;

    async fn reply_in_thread(&self, thread_ts: &str, text: &str) -> Result<()>;

    /// Deliver a draft with action controls. Returns the message ts.
    async fn send_draft_card(&self, text: &str, draft_id: &str) -> Result<String>;
}

/// Consumer of inbound chat events (messages and button clicks).
#[async_trait]
pub trait ChatEventHandler: Send + Sync {
    async fn handle_event(&self, event: ChatEvent) -> Result<()>;
}

pub mod slack;
