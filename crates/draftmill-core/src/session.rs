//! Interview session state.
//!
//! The book owns every InterviewSession, the single pending-rework slot,
//! the short-lived draft cache, and the last `ideas` listing. It is pure
//! in-memory bookkeeping; all external calls live in the pipeline.

use std::collections::HashMap;

use chrono::Utc;
use draftmill_schema::{
    ContentDraft, DraftStatus, InterviewMessage, InterviewSession, PendingRework, SessionStatus,
};

use crate::routing::RoutingSnapshot;

#[derive(Default)]
pub struct SessionBook {
    sessions: HashMap<String, InterviewSession>,
    pending_rework: Option<PendingRework>,
    /// Recently delivered drafts, keyed by id. Sized by recent activity;
    /// no eviction — volume is low and process lifetime is short.
    drafts: HashMap<String, ContentDraft>,
    /// Idea ids as last shown by the `ideas` command, for numeric picks.
    last_listing: Vec<String>,
}

impl SessionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for an idea. Any session still active for the same
    /// idea is abandoned first: at most one active session per idea.
    pub fn start_session(
        &mut self,
        session_id: impl Into<String>,
        idea_id: impl Into<String>,
        thread_ts: impl Into<String>,
        opening: InterviewMessage,
    ) {
        let session_id = session_id.into();
        let idea_id = idea_id.into();

        if let Some(existing) = self
            .sessions
            .values_mut()
            .find(|s| s.idea_id == idea_id && s.status == SessionStatus::Active)
        {
            existing.status = SessionStatus::Abandoned;
            existing.completed_at = Some(Utc::now());
        }

        let session = InterviewSession {
            id: session_id.clone(),
            idea_id,
            thread_ts: thread_ts.into(),
            messages: vec![opening],
            status: SessionStatus::Active,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.sessions.insert(session_id, session);
    }

    pub fn get(&self, session_id: &str) -> Option<&InterviewSession> {
        self.sessions.get(session_id)
    }

    /// Append to the ordered message log. Returns false for unknown or
    /// non-active sessions.
    pub fn append_message(&mut self, session_id: &str, message: InterviewMessage) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(s) if s.status == SessionStatus::Active => {
                s.messages.push(message);
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, session_id: &str) -> bool {
        self.transition(session_id, SessionStatus::Completed)
    }

    pub fn abandon(&mut self, session_id: &str) -> bool {
        self.transition(session_id, SessionStatus::Abandoned)
    }

    /// Only active sessions transition; completed/abandoned are terminal.
    fn transition(&mut self, session_id: &str, to: SessionStatus) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(s) if s.status == SessionStatus::Active => {
                s.status = to;
                s.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn latest_active(&self) -> Option<&InterviewSession> {
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .max_by_key(|s| s.started_at)
    }

    /// Abandon the most recently started active session; returns its idea
    /// id. Other sessions are untouched.
    pub fn abandon_latest(&mut self) -> Option<String> {
        let session_id = self.latest_active()?.id.clone();
        self.abandon(&session_id);
        self.sessions.get(&session_id).map(|s| s.idea_id.clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .count()
    }

    /// Latest intent wins: a new rework request overwrites any pending one.
    pub fn set_pending_rework(&mut self, pending: PendingRework) {
        self.pending_rework = Some(pending);
    }

    /// Take-and-clear. Callers clear *before* any external call so a
    /// second message arriving mid-rework can never read a stale flag.
    pub fn take_pending_rework(&mut self) -> Option<PendingRework> {
        self.pending_rework.take()
    }

    pub fn rework_pending(&self) -> bool {
        self.pending_rework.is_some()
    }

    pub fn cache_draft(&mut self, draft: ContentDraft) {
        self.drafts.insert(draft.id.clone(), draft);
    }

    pub fn draft(&self, draft_id: &str) -> Option<&ContentDraft> {
        self.drafts.get(draft_id)
    }

    pub fn set_draft_status(&mut self, draft_id: &str, status: DraftStatus) -> bool {
        match self.drafts.get_mut(draft_id) {
            Some(d) => {
                d.status = status;
                true
            }
            None => false,
        }
    }

    pub fn set_last_listing(&mut self, idea_ids: Vec<String>) {
        self.last_listing = idea_ids;
    }

    /// 1-based lookup into the last listing.
    pub fn listed_idea(&self, position: usize) -> Option<&str> {
        if position == 0 {
            return None;
        }
        self.last_listing.get(position - 1).map(String::as_str)
    }

    pub fn routing_snapshot(&self) -> RoutingSnapshot {
        RoutingSnapshot {
            thread_sessions: self
                .sessions
                .values()
                .filter(|s| s.status == SessionStatus::Active)
                .map(|s| (s.thread_ts.clone(), s.id.clone()))
                .collect(),
            latest_active: self.latest_active().map(|s| s.id.clone()),
            rework_pending: self.pending_rework.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftmill_schema::OutputFormat;

    fn book_with_session(id: &str, idea: &str, ts: &str) -> SessionBook {
        let mut book = SessionBook::new();
        book.start_session(id, idea, ts, InterviewMessage::agent("opening"));
        book
    }

    fn draft(id: &str, idea: &str, version: u32) -> ContentDraft {
        ContentDraft {
            id: id.into(),
            idea_id: idea.into(),
            format: OutputFormat::LinkedinPost,
            title: "t".into(),
            body: "b".into(),
            version,
            status: DraftStatus::Draft,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn starting_a_second_session_for_same_idea_abandons_the_first() {
        let mut book = book_with_session("s-1", "i-1", "100.1");
        book.start_session("s-2", "i-1", "100.2", InterviewMessage::agent("again"));

        assert_eq!(book.get("s-1").unwrap().status, SessionStatus::Abandoned);
        assert_eq!(book.get("s-2").unwrap().status, SessionStatus::Active);
        assert_eq!(book.active_count(), 1);
    }

    #[test]
    fn sessions_for_different_ideas_coexist() {
        let mut book = book_with_session("s-1", "i-1", "100.1");
        book.start_session("s-2", "i-2", "100.2", InterviewMessage::agent("hi"));
        assert_eq!(book.active_count(), 2);
    }

    #[test]
    fn stop_abandons_only_the_latest_session() {
        let mut book = book_with_session("s-1", "i-1", "100.1");
        // Force distinct start times.
        std::thread::sleep(std::time::Duration::from_millis(5));
        book.start_session("s-2", "i-2", "100.2", InterviewMessage::agent("hi"));

        let idea = book.abandon_latest().unwrap();
        assert_eq!(idea, "i-2");
        assert_eq!(book.get("s-1").unwrap().status, SessionStatus::Active);
        assert_eq!(book.get("s-2").unwrap().status, SessionStatus::Abandoned);
    }

    #[test]
    fn terminal_sessions_reject_messages_and_transitions() {
        let mut book = book_with_session("s-1", "i-1", "100.1");
        book.complete("s-1");

        assert!(!book.append_message("s-1", InterviewMessage::user("late")));
        assert!(!book.abandon("s-1"));
        assert_eq!(book.get("s-1").unwrap().status, SessionStatus::Completed);
        assert_eq!(book.get("s-1").unwrap().messages.len(), 1);
    }

    #[test]
    fn message_order_is_append_only() {
        let mut book = book_with_session("s-1", "i-1", "100.1");
        book.append_message("s-1", InterviewMessage::user("one"));
        book.append_message("s-1", InterviewMessage::user("two"));

        let texts: Vec<&str> = book
            .get("s-1")
            .unwrap()
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["opening", "one", "two"]);
    }

    #[test]
    fn pending_rework_take_clears_and_overwrite_wins() {
        let mut book = SessionBook::new();
        book.set_pending_rework(PendingRework {
            draft_id: "d-1".into(),
            idea_id: "i-1".into(),
        });
        book.set_pending_rework(PendingRework {
            draft_id: "d-2".into(),
            idea_id: "i-1".into(),
        });

        let taken = book.take_pending_rework().unwrap();
        assert_eq!(taken.draft_id, "d-2");
        assert!(book.take_pending_rework().is_none());
        assert!(!book.rework_pending());
    }

    #[test]
    fn listed_idea_is_one_based_and_bounded() {
        let mut book = SessionBook::new();
        book.set_last_listing(vec!["i-1".into(), "i-2".into()]);
        assert_eq!(book.listed_idea(1), Some("i-1"));
        assert_eq!(book.listed_idea(2), Some("i-2"));
        assert_eq!(book.listed_idea(3), None);
        assert_eq!(book.listed_idea(0), None);
    }

    #[test]
    fn routing_snapshot_reflects_active_threads_only() {
        let mut book = book_with_session("s-1", "i-1", "100.1");
        std::thread::sleep(std::time::Duration::from_millis(5));
        book.start_session("s-2", "i-2", "100.2", InterviewMessage::agent("hi"));
        book.complete("s-1");

        let snap = book.routing_snapshot();
        assert!(!snap.thread_sessions.contains_key("100.1"));
        assert_eq!(snap.thread_sessions.get("100.2").map(String::as_str), Some("s-2"));
        assert_eq!(snap.latest_active.as_deref(), Some("s-2"));
    }

    #[test]
    fn draft_cache_roundtrip() {
        let mut book = SessionBook::new();
        book.cache_draft(draft("d-1", "i-1", 1));
        assert!(book.set_draft_status("d-1", DraftStatus::Approved));
        assert_eq!(book.draft("d-1").unwrap().status, DraftStatus::Approved);
        assert!(!book.set_draft_status("ghost", DraftStatus::Approved));
    }
}
