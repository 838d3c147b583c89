//! The pipeline orchestrator: chat-driven command routing, the interview
//! and draft lifecycle, and the periodic content cycle.
//!
//! Shared state lives behind tokio mutexes whose scopes end before any
//! external-service await. Between an external call's suspension and its
//! resumption other events may interleave, so nothing here assumes state
//! is unchanged across an await — the rework handler's clear-before-call
//! is the template.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use draftmill_channels::{ChatEventHandler, ChatTransport};
use draftmill_drafting::{DraftingService, VoiceProfile};
use draftmill_schema::{
    ChatEvent, ContentDraft, ContentIdea, DraftAction, DraftStatus, IdeaStatus, InterviewMessage,
    MessageRole, OutputFormat, PendingRework,
};
use draftmill_scheduler::CycleTask;
use draftmill_store::RecordStore;
use draftmill_tldv::TranscriptFeed;

use crate::mining::MiningQueue;
use crate::registry::IdeaRegistry;
use crate::routing::{route, Command, DraftTarget, Route};
use crate::session::SessionBook;

/// Conversational circuit-breaker: at this many messages the interview is
/// judged "enough" regardless of the drafting service's opinion.
const MAX_INTERVIEW_MESSAGES: usize = 10;
/// Below this many author replies the judgment is never even asked.
const MIN_USER_EXCHANGES: usize = 2;

const CYCLE_MINING_WINDOW_DAYS: i64 = 7;
const COMMAND_MINING_WINDOW_DAYS: i64 = 90;
const IDEAS_LISTING_LIMIT: usize = 10;

const HELP_TEXT: &str = "Commands:\n\
• `status` — pipeline counts\n\
• `ideas` — list unprocessed ideas\n\
• `mine` — dig the last 90 days of transcripts\n\
• `draft <n>` or a bare number — start interviewing an idea\n\
• `stop` / `done` — park the current interview\n\
• `cancel` — drop a pending rework\n\
Anything else mid-interview is treated as your answer.";

pub struct Pipeline {
    registry: Arc<Mutex<IdeaRegistry>>,
    book: Mutex<SessionBook>,
    mining: Arc<MiningQueue>,
    drafting: Arc<dyn DraftingService>,
    store: Arc<dyn RecordStore>,
    chat: Arc<dyn ChatTransport>,
    feed: Arc<dyn TranscriptFeed>,
    voice: VoiceProfile,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Mutex<IdeaRegistry>>,
        mining: Arc<MiningQueue>,
        drafting: Arc<dyn DraftingService>,
        store: Arc<dyn RecordStore>,
        chat: Arc<dyn ChatTransport>,
        feed: Arc<dyn TranscriptFeed>,
        voice: VoiceProfile,
    ) -> Self {
        Self {
            registry,
            book: Mutex::new(SessionBook::new()),
            mining,
            drafting,
            store,
            chat,
            feed,
            voice,
        }
    }

    /// Seed the registry from the durable snapshot. Load failures degrade
    /// to an empty registry; the system re-discovers ideas instead of
    /// refusing to start.
    pub async fn seed_from_store(&self) {
        let ideas = match self.store.load_ideas().await {
            Ok(ideas) => ideas,
            Err(e) => {
                tracing::warn!("idea snapshot load failed, starting with an empty registry: {e}");
                return;
            }
        };
        let transcript_ids = match self.store.transcript_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("transcript id load failed, legacy mined fallback disabled: {e}");
                vec![]
            }
        };
        let mut registry = self.registry.lock().await;
        registry.load_existing(ideas, &transcript_ids);
        tracing::info!(
            "seeded {} idea(s); {} transcript(s) marked mined",
            registry.len(),
            registry.mined_count()
        );
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    pub async fn handle_message(&self, text: &str, thread_ts: Option<&str>) -> Result<()> {
        let snapshot = { self.book.lock().await.routing_snapshot() };
        match route(text, thread_ts, &snapshot) {
            Route::InterviewReply { session_id } => {
                self.handle_interview_reply(&session_id, text).await
            }
            Route::ReworkFeedback => self.handle_rework_feedback(text).await,
            Route::Command(cmd) => {
                // Any command issued while a rework is pending abandons it.
                let had_pending = {
                    let mut book = self.book.lock().await;
                    book.take_pending_rework().is_some()
                };
                if cmd == Command::Cancel {
                    if had_pending {
                        self.say("Rework canceled — the draft stands as delivered.").await;
                    } else {
                        self.say("Nothing pending to cancel.").await;
                    }
                    return Ok(());
                }
                self.dispatch_command(cmd).await
            }
            Route::Passive => {
                self.say("Noted. Say `help` if you want the command list.").await;
                Ok(())
            }
        }
    }

    async fn handle_action(&self, kind: DraftAction, draft_id: &str) -> Result<()> {
        match kind {
            DraftAction::Approve => self.approve_draft(draft_id).await,
            DraftAction::Rework => self.request_rework(draft_id).await,
            DraftAction::Syndicate => self.syndicate_draft(draft_id).await,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Interview lifecycle
    // ------------------------------------------------------------------

    /// Open an interview session for an idea: opening question from the
    /// drafting service, delivered as a DM whose ts anchors the thread.
    pub async fn start_interview(&self, idea: ContentIdea) -> Result<()> {
        let opening = self
            .drafting
            .opening_message(&idea)
            .await
            .context("opening message generation failed")?;
        let thread_ts = self
            .chat
            .send_dm(&opening)
            .await
            .context("interview delivery failed")?;

        {
            let mut book = self.book.lock().await;
            book.start_session(
                Uuid::new_v4().to_string(),
                idea.id.clone(),
                thread_ts,
                InterviewMessage::agent(opening),
            );
        }
        self.set_idea_status(&idea.id, IdeaStatus::Interviewing).await;
        Ok(())
    }

    async fn handle_interview_reply(&self, session_id: &str, text: &str) -> Result<()> {
        let (idea_id, thread_ts, messages) = {
            let mut book = self.book.lock().await;
            if !book.append_message(session_id, InterviewMessage::user(text)) {
                // The session ended while this message was in flight.
                return Ok(());
            }
            let session = book.get(session_id).expect("message appended above");
            (
                session.idea_id.clone(),
                session.thread_ts.clone(),
                session.messages.clone(),
            )
        };

        let idea = { self.registry.lock().await.get(&idea_id).cloned() };
        let Some(idea) = idea else {
            self.say("I lost the idea behind this interview — run `ideas` to restart it.")
                .await;
            return Ok(());
        };

        if self.judge_enough(&idea, &messages).await {
            self.finish_interview(session_id, idea, &messages, &thread_ts)
                .await
        } else {
            match self.drafting.follow_up_question(&idea, &messages).await {
                Ok(question) => {
                    {
                        let mut book = self.book.lock().await;
                        book.append_message(session_id, InterviewMessage::agent(&question));
                    }
                    self.say_in_thread(&thread_ts, &question).await;
                }
                Err(e) => {
                    tracing::warn!("follow-up generation failed: {e:#}");
                    self.say_in_thread(
                        &thread_ts,
                        "I couldn't come up with the next question — reply again, or `stop` to park this one.",
                    )
                    .await;
                }
            }
            Ok(())
        }
    }

    async fn judge_enough(&self, idea: &ContentIdea, messages: &[InterviewMessage]) -> bool {
        if messages.len() >= MAX_INTERVIEW_MESSAGES {
            return true;
        }
        let user_turns = messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();
        if user_turns < MIN_USER_EXCHANGES {
            return false;
        }
        match self.drafting.has_enough_material(idea, messages).await {
            Ok(enough) => enough,
            Err(e) => {
                tracing::warn!("enough-material judgment failed, continuing interview: {e:#}");
                false
            }
        }
    }

    async fn finish_interview(
        &self,
        session_id: &str,
        idea: ContentIdea,
        messages: &[InterviewMessage],
        thread_ts: &str,
    ) -> Result<()> {
        {
            let mut book = self.book.lock().await;
            book.complete(session_id);
        }
        self.set_idea_status(&idea.id, IdeaStatus::Drafting).await;

        let format = idea.suggested_format;
        let body = match self
            .drafting
            .write_draft(&idea, messages, format, &self.voice)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("draft generation failed: {e:#}");
                // Back to the backlog so `ideas` can offer it again.
                self.set_idea_status(&idea.id, IdeaStatus::Extracted).await;
                self.say_in_thread(
                    thread_ts,
                    "Drafting failed on my side — run `ideas` and pick it again to retry.",
                )
                .await;
                return Ok(());
            }
        };

        let draft = ContentDraft {
            id: Uuid::new_v4().to_string(),
            idea_id: idea.id.clone(),
            format,
            title: body.title,
            body: body.body,
            version: 1,
            status: DraftStatus::Draft,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_draft(&draft).await {
            tracing::warn!("failed to persist draft {}: {e}", draft.id);
        }
        self.set_idea_status(&idea.id, IdeaStatus::DraftReady).await;
        {
            self.book.lock().await.cache_draft(draft.clone());
        }
        self.deliver_draft(&draft).await;

        // LinkedIn posts also get an automatic short-form companion.
        if format == OutputFormat::LinkedinPost {
            match self.drafting.to_thread(&draft.body).await {
                Ok(thread) => {
                    self.say(&format!("Short-form thread variant:\n\n{thread}")).await;
                }
                Err(e) => tracing::warn!("thread conversion failed: {e:#}"),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rework and actions
    // ------------------------------------------------------------------

    async fn handle_rework_feedback(&self, feedback: &str) -> Result<()> {
        let source = {
            let mut book = self.book.lock().await;
            // Clear before calling out: a second message arriving while
            // the rework request is in flight must not read a stale flag
            // and be merged into the same rework.
            let Some(pending) = book.take_pending_rework() else {
                return Ok(());
            };
            book.draft(&pending.draft_id).cloned()
        };
        let Some(source) = source else {
            self.say("I lost track of that draft — run `ideas` and draft it again.")
                .await;
            return Ok(());
        };

        let new_body = match self.drafting.rework_draft(&source.body, feedback).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("rework failed: {e:#}");
                self.say("Rework failed — hit the Rework button again to retry.").await;
                return Ok(());
            }
        };

        let draft = ContentDraft {
            id: Uuid::new_v4().to_string(),
            idea_id: source.idea_id.clone(),
            format: source.format,
            title: source.title.clone(),
            body: new_body,
            version: source.version + 1,
            status: DraftStatus::Draft,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_draft(&draft).await {
            tracing::warn!("failed to persist draft {}: {e}", draft.id);
        }
        {
            self.book.lock().await.cache_draft(draft.clone());
        }
        self.deliver_draft(&draft).await;
        Ok(())
    }

    async fn approve_draft(&self, draft_id: &str) {
        let approved = {
            let mut book = self.book.lock().await;
            if book.set_draft_status(draft_id, DraftStatus::Approved) {
                book.draft(draft_id).cloned()
            } else {
                None
            }
        };
        match approved {
            Some(draft) => {
                if let Err(e) = self.store.set_draft_status(draft_id, DraftStatus::Approved).await {
                    tracing::warn!("approve propagation failed for {draft_id}: {e}");
                }
                self.set_idea_status(&draft.idea_id, IdeaStatus::Approved).await;
                self.say(&format!("Approved — \"{}\" is ready to publish.", draft.title))
                    .await;
            }
            None => {
                self.say("I can't find that draft anymore — run `ideas` to see what's in flight.")
                    .await;
            }
        }
    }

    async fn request_rework(&self, draft_id: &str) {
        let known = {
            let mut book = self.book.lock().await;
            match book.draft(draft_id).map(|d| d.idea_id.clone()) {
                Some(idea_id) => {
                    // A second rework request simply replaces the first.
                    book.set_pending_rework(PendingRework {
                        draft_id: draft_id.to_string(),
                        idea_id,
                    });
                    true
                }
                None => false,
            }
        };
        if known {
            self.say("What should change? Reply with feedback, or `cancel`.").await;
        } else {
            self.say("I can't find that draft anymore — run `ideas` to see what's in flight.")
                .await;
        }
    }

    async fn syndicate_draft(&self, draft_id: &str) {
        let draft = { self.book.lock().await.draft(draft_id).cloned() };
        match draft {
            None => {
                self.say("I can't find that draft anymore — run `ideas` to see what's in flight.")
                    .await;
            }
            Some(d) if d.format != OutputFormat::LinkedinPost => {
                self.say(&format!(
                    "Syndication turns LinkedIn posts into threads — this one is a {}.",
                    d.format.as_str()
                ))
                .await;
            }
            Some(d) => match self.drafting.to_thread(&d.body).await {
                Ok(thread) => {
                    self.say(&format!("Short-form thread:\n\n{thread}")).await;
                }
                Err(e) => {
                    tracing::warn!("thread conversion failed: {e:#}");
                    self.say("Thread conversion failed — hit Syndicate again to retry.").await;
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn dispatch_command(&self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Status => self.cmd_status().await,
            Command::Ideas => self.cmd_ideas().await,
            Command::Mine => self.cmd_mine().await,
            Command::Draft(target) => self.cmd_draft(target).await,
            Command::Stop => self.cmd_stop().await,
            Command::Help => self.say(HELP_TEXT).await,
            // Cancel with nothing pending; the pending case is handled
            // before dispatch.
            Command::Cancel => self.say("Nothing pending to cancel.").await,
        }
        Ok(())
    }

    async fn cmd_status(&self) {
        let (total, extracted, interviewing, ready, approved, published, mined) = {
            let registry = self.registry.lock().await;
            (
                registry.len(),
                registry.count_by_status(IdeaStatus::Extracted),
                registry.count_by_status(IdeaStatus::Interviewing),
                registry.count_by_status(IdeaStatus::DraftReady),
                registry.count_by_status(IdeaStatus::Approved),
                registry.count_by_status(IdeaStatus::Published),
                registry.mined_count(),
            )
        };
        let (active, rework) = {
            let book = self.book.lock().await;
            (book.active_count(), book.rework_pending())
        };
        let mut text = format!(
            "Pipeline: {total} ideas — {extracted} waiting, {interviewing} interviewing, \
{ready} draft-ready, {approved} approved, {published} published.\n\
{mined} transcripts mined. Active interviews: {active}."
        );
        if rework {
            text.push_str(" A rework is waiting for your feedback.");
        }
        self.say(&text).await;
    }

    async fn cmd_ideas(&self) {
        let listed: Vec<(String, String)> = {
            let registry = self.registry.lock().await;
            registry
                .unprocessed()
                .iter()
                .take(IDEAS_LISTING_LIMIT)
                .enumerate()
                .map(|(n, idea)| {
                    (
                        idea.id.clone(),
                        format!("{}. [{}] {}", n + 1, idea.suggested_format.as_str(), idea.hook),
                    )
                })
                .collect()
        };
        if listed.is_empty() {
            self.say("No unprocessed ideas right now — `mine` to dig for more.").await;
            return;
        }
        let ids = listed.iter().map(|(id, _)| id.clone()).collect();
        {
            self.book.lock().await.set_last_listing(ids);
        }
        let lines: Vec<&str> = listed.iter().map(|(_, line)| line.as_str()).collect();
        self.say(&format!(
            "Unprocessed ideas:\n{}\n\nReply with a number to start drafting one.",
            lines.join("\n")
        ))
        .await;
    }

    async fn cmd_mine(&self) {
        self.say("Mining the last 90 days of transcripts…").await;
        let since = Utc::now() - Duration::days(COMMAND_MINING_WINDOW_DAYS);
        let transcripts = match self.store.recent_transcripts(since).await {
            Ok(transcripts) => transcripts,
            Err(e) => {
                tracing::warn!("transcript window load failed: {e}");
                self.say("Couldn't load transcripts from the store — try `mine` again shortly.")
                    .await;
                return;
            }
        };
        let minted = self.mining.mine_on_demand(transcripts).await;
        if minted.is_empty() {
            self.say("Nothing new — recent transcripts are already mined or only yielded duplicates.")
                .await;
        } else {
            self.say(&format!(
                "Mined {} new idea(s). Run `ideas` to see them.",
                minted.len()
            ))
            .await;
        }
    }

    async fn cmd_draft(&self, target: DraftTarget) {
        let idea = match target {
            DraftTarget::Number(n) => {
                let id = { self.book.lock().await.listed_idea(n).map(String::from) };
                match id {
                    Some(id) => self.registry.lock().await.get(&id).cloned(),
                    None => {
                        self.say(&format!(
                            "No idea at position {n} — run `ideas` to see the current list."
                        ))
                        .await;
                        return;
                    }
                }
            }
            DraftTarget::Id(fragment) => self.registry.lock().await.resolve(&fragment).cloned(),
        };
        let Some(idea) = idea else {
            self.say("No idea matches that — run `ideas` for the current list.").await;
            return;
        };
        if let Err(e) = self.start_interview(idea).await {
            tracing::warn!("interview start failed: {e:#}");
            self.say("Couldn't start the interview — try the same command again.").await;
        }
    }

    async fn cmd_stop(&self) {
        let idea_id = { self.book.lock().await.abandon_latest() };
        match idea_id {
            Some(idea_id) => {
                // Back to the backlog so it shows up in `ideas` again.
                self.set_idea_status(&idea_id, IdeaStatus::Extracted).await;
                self.say("Stopped — the idea stays in the backlog.").await;
            }
            None => {
                self.say("No active interview to stop.").await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Scheduled content cycle
    // ------------------------------------------------------------------

    /// One deterministic cycle: poll for fresh transcripts, pick the first
    /// unprocessed idea (mining a recent window if the backlog is empty),
    /// and open an interview for it. No retries within a firing; the next
    /// firing recovers.
    pub async fn run_content_cycle(&self) -> Result<()> {
        self.feed.poll_new().await.context("transcript poll failed")?;

        let next = {
            let registry = self.registry.lock().await;
            registry.unprocessed().first().map(|idea| (*idea).clone())
        };
        let idea = match next {
            Some(idea) => Some(idea),
            None => {
                let since = Utc::now() - Duration::days(CYCLE_MINING_WINDOW_DAYS);
                let transcripts = self
                    .store
                    .recent_transcripts(since)
                    .await
                    .context("transcript window load failed")?;
                self.mining.mine_on_demand(transcripts).await.into_iter().next()
            }
        };

        let Some(idea) = idea else {
            tracing::info!("content cycle: nothing to draft this round");
            return Ok(());
        };
        self.start_interview(idea).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// In-memory transition plus best-effort store propagation. The
    /// in-memory state stays authoritative for routing even when the
    /// store write fails.
    async fn set_idea_status(&self, id: &str, status: IdeaStatus) {
        let changed = { self.registry.lock().await.set_status(id, status) };
        if !changed {
            return;
        }
        if let Err(e) = self.store.set_idea_status(id, status).await {
            tracing::warn!(
                "idea status propagation failed for {id} ({}): {e}",
                status.as_str()
            );
        }
    }

    async fn deliver_draft(&self, draft: &ContentDraft) {
        let card = format!("*{}* (v{})\n\n{}", draft.title, draft.version, draft.body);
        if let Err(e) = self.chat.send_draft_card(&card, &draft.id).await {
            tracing::warn!("draft delivery failed for {}: {e}", draft.id);
        }
    }

    async fn say(&self, text: &str) {
        if let Err(e) = self.chat.send_dm(text).await {
            tracing::warn!("chat delivery failed: {e}");
        }
    }

    async fn say_in_thread(&self, thread_ts: &str, text: &str) {
        if let Err(e) = self.chat.reply_in_thread(thread_ts, text).await {
            tracing::warn!("threaded chat delivery failed: {e}");
        }
    }
}

#[async_trait]
impl ChatEventHandler for Pipeline {
    async fn handle_event(&self, event: ChatEvent) -> Result<()> {
        match event {
            ChatEvent::Message { text, thread_ts } => {
                self.handle_message(&text, thread_ts.as_deref()).await
            }
            ChatEvent::Action { kind, draft_id } => self.handle_action(kind, &draft_id).await,
        }
    }
}

/// The 30-minute poll job: fetch new transcripts and hand them to the
/// mining queue.
pub struct PollJob {
    feed: Arc<dyn TranscriptFeed>,
    mining: Arc<MiningQueue>,
}

impl PollJob {
    pub fn new(feed: Arc<dyn TranscriptFeed>, mining: Arc<MiningQueue>) -> Self {
        Self { feed, mining }
    }
}

#[async_trait]
impl CycleTask for PollJob {
    async fn run_cycle(&self) -> Result<()> {
        let fresh = self.feed.poll_new().await?;
        for transcript in fresh {
            self.mining.enqueue(transcript).await;
        }
        Ok(())
    }
}

/// The scheduled content cycle, also runnable on demand.
pub struct ContentCycleJob {
    pipeline: Arc<Pipeline>,
}

impl ContentCycleJob {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl CycleTask for ContentCycleJob {
    async fn run_cycle(&self) -> Result<()> {
        self.pipeline.run_content_cycle().await
    }
}
