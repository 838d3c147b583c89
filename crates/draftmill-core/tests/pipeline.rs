//! End-to-end pipeline tests over stub collaborators: scripted drafting
//! service, recording chat transport, in-memory record store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use draftmill_channels::{ChatEventHandler, ChatTransport};
use draftmill_core::{IdeaRegistry, MiningQueue, Pipeline};
use draftmill_drafting::{DraftBody, DraftingService, VoiceProfile};
use draftmill_schema::{
    ChatEvent, ContentIdea, DraftAction, DraftStatus, IdeaSeed, IdeaStatus, InterviewMessage,
    OutputFormat, Transcript, TranscriptSource,
};
use draftmill_store::{MemRecordStore, RecordStore};
use draftmill_tldv::TranscriptFeed;

// ----------------------------------------------------------------------
// Test doubles
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Dm(String),
    Thread { thread_ts: String, text: String },
    Card { text: String, draft_id: String },
}

#[derive(Default)]
struct RecordingChat {
    sent: StdMutex<Vec<Sent>>,
    counter: AtomicUsize,
}

impl RecordingChat {
    fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn dms(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Dm(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn cards(&self) -> Vec<(String, String)> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Card { text, draft_id } => Some((text, draft_id)),
                _ => None,
            })
            .collect()
    }

    fn last_dm(&self) -> Option<String> {
        self.dms().pop()
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send_dm(&self, text: &str) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent::Dm(text.to_string()));
        Ok(format!("{n}.000"))
    }

    async fn reply_in_thread(&self, thread_ts: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Thread {
            thread_ts: thread_ts.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_draft_card(&self, text: &str, draft_id: &str) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent::Card {
            text: text.to_string(),
            draft_id: draft_id.to_string(),
        });
        Ok(format!("{n}.000"))
    }
}

#[derive(Default)]
struct ScriptedDrafter {
    /// Popped per enough-material call; empty queue means "not enough".
    judgments: StdMutex<VecDeque<bool>>,
    /// Popped per extraction call; one hook list per call.
    extract_hooks: StdMutex<VecDeque<Vec<String>>>,
    opening_calls: AtomicUsize,
    judge_calls: AtomicUsize,
    extract_calls: AtomicUsize,
    rework_calls: AtomicUsize,
    to_thread_calls: AtomicUsize,
}

impl ScriptedDrafter {
    fn with_judgments(judgments: Vec<bool>) -> Self {
        Self {
            judgments: StdMutex::new(judgments.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DraftingService for ScriptedDrafter {
    async fn extract_ideas(&self, transcripts: &[Transcript]) -> Result<Vec<IdeaSeed>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let _ = transcripts;
        let hooks = self
            .extract_hooks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(hooks
            .into_iter()
            .map(|hook| IdeaSeed {
                theme: "mined theme".into(),
                hook,
                quotes: vec![],
                suggested_format: OutputFormat::LinkedinPost,
            })
            .collect())
    }

    async fn opening_message(&self, idea: &ContentIdea) -> Result<String> {
        self.opening_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Opening: {}", idea.hook))
    }

    async fn follow_up_question(
        &self,
        _idea: &ContentIdea,
        _messages: &[InterviewMessage],
    ) -> Result<String> {
        Ok("And then what happened?".into())
    }

    async fn has_enough_material(
        &self,
        _idea: &ContentIdea,
        _messages: &[InterviewMessage],
    ) -> Result<bool> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.judgments.lock().unwrap().pop_front().unwrap_or(false))
    }

    async fn write_draft(
        &self,
        idea: &ContentIdea,
        _messages: &[InterviewMessage],
        _format: OutputFormat,
        _voice: &VoiceProfile,
    ) -> Result<DraftBody> {
        Ok(DraftBody {
            title: format!("Draft of {}", idea.theme),
            body: format!("BODY[{}]", idea.hook),
        })
    }

    async fn rework_draft(&self, body: &str, feedback: &str) -> Result<String> {
        self.rework_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{body} | {feedback}"))
    }

    async fn to_thread(&self, body: &str) -> Result<String> {
        self.to_thread_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("THREAD[{body}]"))
    }
}

struct NullFeed;

#[async_trait]
impl TranscriptFeed for NullFeed {
    async fn poll_new(&self) -> Result<Vec<Transcript>> {
        Ok(vec![])
    }
}

struct Fixture {
    pipeline: Arc<Pipeline>,
    chat: Arc<RecordingChat>,
    drafter: Arc<ScriptedDrafter>,
    store: Arc<MemRecordStore>,
    registry: Arc<Mutex<IdeaRegistry>>,
}

fn fixture(drafter: ScriptedDrafter) -> Fixture {
    let drafter = Arc::new(drafter);
    let chat = Arc::new(RecordingChat::default());
    let store = Arc::new(MemRecordStore::new());
    let registry = Arc::new(Mutex::new(IdeaRegistry::new()));
    let mining = Arc::new(MiningQueue::new(
        registry.clone(),
        drafter.clone(),
        store.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        registry.clone(),
        mining,
        drafter.clone(),
        store.clone(),
        chat.clone(),
        Arc::new(NullFeed),
        VoiceProfile::default(),
    ));
    Fixture {
        pipeline,
        chat,
        drafter,
        store,
        registry,
    }
}

fn idea(id: &str, hook: &str, format: OutputFormat) -> ContentIdea {
    ContentIdea {
        id: id.into(),
        source_transcript_ids: vec![],
        theme: format!("theme of {id}"),
        hook: hook.into(),
        quotes: vec![],
        suggested_format: format,
        status: IdeaStatus::Extracted,
        created_at: Utc::now(),
    }
}

async fn seed(fix: &Fixture, ideas: Vec<ContentIdea>) {
    let mut registry = fix.registry.lock().await;
    for i in ideas {
        registry.record_idea(i);
    }
}

/// List ideas and pick the first, landing in an active interview.
async fn start_first_idea(fix: &Fixture) {
    fix.pipeline.handle_message("ideas", None).await.unwrap();
    fix.pipeline.handle_message("1", None).await.unwrap();
}

/// Simulate a button click, going through the transport-facing entry.
async fn click(fix: &Fixture, kind: DraftAction, draft_id: &str) {
    fix.pipeline
        .handle_event(ChatEvent::Action {
            kind,
            draft_id: draft_id.to_string(),
        })
        .await
        .unwrap();
}

// ----------------------------------------------------------------------
// Interview lifecycle
// ----------------------------------------------------------------------

#[tokio::test]
async fn interview_runs_to_draft_with_thread_variant() {
    // Reply 1 never reaches the judge (under the exchange floor); reply 2
    // gets "no"; reply 3 gets "yes".
    let fix = fixture(ScriptedDrafter::with_judgments(vec![false, true]));
    seed(&fix, vec![idea("i-1", "Ship it, then talk", OutputFormat::LinkedinPost)]).await;

    start_first_idea(&fix).await;
    assert_eq!(fix.drafter.opening_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        fix.registry.lock().await.get("i-1").unwrap().status,
        IdeaStatus::Interviewing
    );

    fix.pipeline.handle_message("it started with a lost deal", None).await.unwrap();
    fix.pipeline.handle_message("we changed the tier names", None).await.unwrap();
    assert!(fix.chat.cards().is_empty());

    fix.pipeline.handle_message("conversion doubled", None).await.unwrap();

    let cards = fix.chat.cards();
    assert_eq!(cards.len(), 1);
    assert!(cards[0].0.contains("BODY[Ship it, then talk]"));
    assert!(cards[0].0.contains("(v1)"));

    // Persisted, status advanced, and the LinkedIn auto-thread delivered.
    let stored = fix.store.draft(&cards[0].1).unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(
        fix.registry.lock().await.get("i-1").unwrap().status,
        IdeaStatus::DraftReady
    );
    assert!(fix.chat.dms().iter().any(|d| d.contains("THREAD[")));
    assert_eq!(fix.drafter.to_thread_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ten_messages_force_enough_without_a_yes() {
    // The judge never says yes; the cap alone must finish the interview.
    let fix = fixture(ScriptedDrafter::default());
    seed(&fix, vec![idea("i-1", "hook", OutputFormat::LinkedinPost)]).await;
    start_first_idea(&fix).await;

    // Opening = 1 message. Each unfinished reply adds user + follow-up.
    // Reply 5 brings the log to 10 and trips the cap.
    for n in 0..5 {
        fix.pipeline
            .handle_message(&format!("answer {n}"), None)
            .await
            .unwrap();
    }

    assert_eq!(fix.chat.cards().len(), 1);
}

#[tokio::test]
async fn non_linkedin_draft_gets_no_auto_thread() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    seed(&fix, vec![idea("i-1", "hook", OutputFormat::Newsletter)]).await;
    start_first_idea(&fix).await;

    fix.pipeline.handle_message("answer one", None).await.unwrap();
    fix.pipeline.handle_message("answer two", None).await.unwrap();

    assert_eq!(fix.chat.cards().len(), 1);
    assert_eq!(fix.drafter.to_thread_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn threaded_reply_routes_to_its_session_not_latest() {
    let fix = fixture(ScriptedDrafter::default());
    seed(
        &fix,
        vec![
            idea("i-1", "first hook", OutputFormat::LinkedinPost),
            idea("i-2", "second hook", OutputFormat::LinkedinPost),
        ],
    )
    .await;

    // Start both interviews; the second is "latest".
    fix.pipeline.handle_message("ideas", None).await.unwrap();
    fix.pipeline.handle_message("1", None).await.unwrap();
    fix.pipeline.handle_message("ideas", None).await.unwrap();
    fix.pipeline.handle_message("1", None).await.unwrap();

    // The first interview's opening DM was the second send overall
    // (listing came first), so its thread anchor is "1.000".
    fix.pipeline
        .handle_message("reply meant for the first idea", Some("1.000"))
        .await
        .unwrap();

    // The follow-up question lands in that same thread.
    let threads: Vec<Sent> = fix
        .chat
        .all()
        .into_iter()
        .filter(|s| matches!(s, Sent::Thread { .. }))
        .collect();
    assert_eq!(
        threads,
        vec![Sent::Thread {
            thread_ts: "1.000".into(),
            text: "And then what happened?".into()
        }]
    );
}

// ----------------------------------------------------------------------
// Rework
// ----------------------------------------------------------------------

async fn draft_one(fix: &Fixture) -> String {
    seed(fix, vec![idea("i-1", "hook", OutputFormat::LinkedinPost)]).await;
    start_first_idea(fix).await;
    fix.pipeline.handle_message("answer one", None).await.unwrap();
    fix.pipeline.handle_message("answer two", None).await.unwrap();
    fix.chat.cards()[0].1.clone()
}

#[tokio::test]
async fn rework_chain_yields_gap_free_versions() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    let v1 = draft_one(&fix).await;

    click(&fix, DraftAction::Rework, &v1).await;
    fix.pipeline.handle_message("punchier", None).await.unwrap();
    let cards = fix.chat.cards();
    assert_eq!(cards.len(), 2);
    let v2 = cards[1].1.clone();
    assert_ne!(v1, v2);
    assert_eq!(fix.store.draft(&v2).unwrap().version, 2);

    click(&fix, DraftAction::Rework, &v2).await;
    fix.pipeline.handle_message("shorter", None).await.unwrap();
    let cards = fix.chat.cards();
    assert_eq!(cards.len(), 3);
    let v3 = cards[2].1.clone();
    assert_eq!(fix.store.draft(&v3).unwrap().version, 3);

    // Lineage is exactly 1, 2, 3 with fresh ids.
    let versions: Vec<u32> = [&v1, &v2, &v3]
        .iter()
        .map(|id| fix.store.draft(id).unwrap().version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn second_feedback_message_is_not_merged_into_the_rework() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    let v1 = draft_one(&fix).await;

    click(&fix, DraftAction::Rework, &v1).await;
    fix.pipeline.handle_message("feedback one", None).await.unwrap();
    // The pending flag was cleared before the rework call, so this second
    // message is ordinary text, not feedback.
    fix.pipeline.handle_message("feedback two", None).await.unwrap();

    assert_eq!(fix.drafter.rework_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fix.chat.cards().len(), 2);
    assert!(fix.chat.last_dm().unwrap().contains("Noted"));
}

#[tokio::test]
async fn cancel_clears_pending_rework() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    let v1 = draft_one(&fix).await;

    click(&fix, DraftAction::Rework, &v1).await;
    fix.pipeline.handle_message("cancel", None).await.unwrap();
    assert!(fix.chat.last_dm().unwrap().contains("canceled"));

    // Follow-up text is no longer feedback.
    fix.pipeline.handle_message("this would have been feedback", None).await.unwrap();
    assert_eq!(fix.drafter.rework_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn command_while_rework_pending_clears_it_and_runs() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    let v1 = draft_one(&fix).await;

    click(&fix, DraftAction::Rework, &v1).await;
    fix.pipeline.handle_message("status", None).await.unwrap();
    assert!(fix.chat.last_dm().unwrap().contains("Pipeline:"));

    fix.pipeline.handle_message("free text now", None).await.unwrap();
    assert_eq!(fix.drafter.rework_calls.load(Ordering::SeqCst), 0);
}

// ----------------------------------------------------------------------
// Actions
// ----------------------------------------------------------------------

#[tokio::test]
async fn approve_reflects_to_store_and_idea() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    let draft_id = draft_one(&fix).await;

    click(&fix, DraftAction::Approve, &draft_id).await;

    assert_eq!(fix.store.draft(&draft_id).unwrap().status, DraftStatus::Approved);
    assert_eq!(
        fix.registry.lock().await.get("i-1").unwrap().status,
        IdeaStatus::Approved
    );
    assert!(fix.chat.last_dm().unwrap().contains("Approved"));

    // Clicking it again is harmless.
    click(&fix, DraftAction::Approve, &draft_id).await;
    assert_eq!(fix.store.draft(&draft_id).unwrap().status, DraftStatus::Approved);
}

#[tokio::test]
async fn action_on_unknown_draft_reports_not_found() {
    let fix = fixture(ScriptedDrafter::default());
    click(&fix, DraftAction::Approve, "d-stale").await;
    assert!(fix.chat.last_dm().unwrap().contains("can't find that draft"));
}

#[tokio::test]
async fn syndicate_rejects_non_linkedin_formats() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    seed(&fix, vec![idea("i-1", "hook", OutputFormat::Newsletter)]).await;
    start_first_idea(&fix).await;
    fix.pipeline.handle_message("a", None).await.unwrap();
    fix.pipeline.handle_message("b", None).await.unwrap();
    let draft_id = fix.chat.cards()[0].1.clone();

    click(&fix, DraftAction::Syndicate, &draft_id).await;
    assert!(fix.chat.last_dm().unwrap().contains("LinkedIn posts"));
    assert_eq!(fix.drafter.to_thread_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn syndicate_converts_linkedin_drafts() {
    let fix = fixture(ScriptedDrafter::with_judgments(vec![true]));
    let draft_id = draft_one(&fix).await;
    let before = fix.drafter.to_thread_calls.load(Ordering::SeqCst);

    click(&fix, DraftAction::Syndicate, &draft_id).await;
    assert_eq!(fix.drafter.to_thread_calls.load(Ordering::SeqCst), before + 1);
    assert!(fix.chat.last_dm().unwrap().contains("THREAD["));
}

// ----------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------

#[tokio::test]
async fn draft_by_out_of_range_number_makes_no_calls() {
    let fix = fixture(ScriptedDrafter::default());
    seed(
        &fix,
        vec![
            idea("i-1", "one", OutputFormat::LinkedinPost),
            idea("i-2", "two", OutputFormat::LinkedinPost),
        ],
    )
    .await;

    fix.pipeline.handle_message("ideas", None).await.unwrap();
    fix.pipeline.handle_message("3", None).await.unwrap();

    assert!(fix.chat.last_dm().unwrap().contains("No idea at position 3"));
    assert_eq!(fix.drafter.opening_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        fix.registry.lock().await.get("i-1").unwrap().status,
        IdeaStatus::Extracted
    );
}

#[tokio::test]
async fn stop_returns_the_idea_to_the_backlog() {
    let fix = fixture(ScriptedDrafter::default());
    seed(&fix, vec![idea("i-1", "hook one", OutputFormat::LinkedinPost)]).await;
    start_first_idea(&fix).await;

    fix.pipeline.handle_message("stop", None).await.unwrap();
    assert!(fix.chat.last_dm().unwrap().contains("Stopped"));
    assert_eq!(
        fix.registry.lock().await.get("i-1").unwrap().status,
        IdeaStatus::Extracted
    );

    fix.pipeline.handle_message("ideas", None).await.unwrap();
    assert!(fix.chat.last_dm().unwrap().contains("hook one"));
}

#[tokio::test]
async fn stop_with_no_session_is_a_gentle_no_op() {
    let fix = fixture(ScriptedDrafter::default());
    fix.pipeline.handle_message("stop", None).await.unwrap();
    assert!(fix.chat.last_dm().unwrap().contains("No active interview"));
}

#[tokio::test]
async fn passive_text_is_acknowledged_and_discarded() {
    let fix = fixture(ScriptedDrafter::default());
    fix.pipeline
        .handle_message("interesting weather today", None)
        .await
        .unwrap();
    assert!(fix.chat.last_dm().unwrap().contains("Noted"));
    assert_eq!(fix.drafter.opening_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn status_reports_counts() {
    let fix = fixture(ScriptedDrafter::default());
    seed(&fix, vec![idea("i-1", "hook", OutputFormat::LinkedinPost)]).await;
    fix.pipeline.handle_message("status", None).await.unwrap();
    let dm = fix.chat.last_dm().unwrap();
    assert!(dm.contains("1 ideas"));
    assert!(dm.contains("1 waiting"));
}

// ----------------------------------------------------------------------
// Content cycle
// ----------------------------------------------------------------------

#[tokio::test]
async fn content_cycle_is_quiet_when_there_is_nothing_to_do() {
    let fix = fixture(ScriptedDrafter::default());
    fix.pipeline.run_content_cycle().await.unwrap();
    assert!(fix.chat.all().is_empty());
    assert_eq!(fix.drafter.opening_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn content_cycle_prefers_the_existing_backlog() {
    let fix = fixture(ScriptedDrafter::default());
    seed(&fix, vec![idea("i-1", "backlog hook", OutputFormat::LinkedinPost)]).await;

    fix.pipeline.run_content_cycle().await.unwrap();

    assert_eq!(fix.drafter.extract_calls.load(Ordering::SeqCst), 0);
    assert!(fix.chat.dms().iter().any(|d| d.contains("Opening: backlog hook")));
}

#[tokio::test]
async fn content_cycle_mines_a_recent_window_when_backlog_is_empty() {
    let drafter = ScriptedDrafter::default();
    drafter
        .extract_hooks
        .lock()
        .unwrap()
        .push_back(vec!["cycle hook".into()]);
    let fix = fixture(drafter);

    fix.store
        .put_transcript(&Transcript {
            id: "t-1".into(),
            meeting_id: "m-1".into(),
            title: "recent call".into(),
            recorded_at: Utc::now(),
            participants: vec![],
            content: Some("plenty of material".into()),
            source: TranscriptSource::Tldv,
        })
        .await
        .unwrap();

    fix.pipeline.run_content_cycle().await.unwrap();

    assert_eq!(fix.drafter.extract_calls.load(Ordering::SeqCst), 1);
    assert!(fix.chat.dms().iter().any(|d| d.contains("Opening: cycle hook")));
}
