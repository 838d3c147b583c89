use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested conversation. Immutable after creation except for lazy
/// population of `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Full text. `None` until loaded from the record store.
    #[serde(default)]
    pub content: Option<String>,
    pub source: TranscriptSource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Tldv,
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    LinkedinPost,
    YoutubeScript,
    Newsletter,
    XThread,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedinPost => "linkedin_post",
            Self::YoutubeScript => "youtube_script",
            Self::Newsletter => "newsletter",
            Self::XThread => "x_thread",
        }
    }
}

/// Lifecycle of a content idea.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Extracted,
    Interviewing,
    Drafting,
    DraftReady,
    Approved,
    Published,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Interviewing => "interviewing",
            Self::Drafting => "drafting",
            Self::DraftReady => "draft_ready",
            Self::Approved => "approved",
            Self::Published => "published",
        }
    }
}

/// What the drafting service returns per extracted candidate, before an
/// identifier and status are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaSeed {
    pub theme: String,
    pub hook: String,
    #[serde(default)]
    pub quotes: Vec<String>,
    pub suggested_format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentIdea {
    pub id: String,
    #[serde(default)]
    pub source_transcript_ids: Vec<String>,
    pub theme: String,
    /// Opening line; display text and the sole dedup key.
    pub hook: String,
    #[serde(default)]
    pub quotes: Vec<String>,
    pub suggested_format: OutputFormat,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
}

impl ContentIdea {
    pub fn from_seed(id: impl Into<String>, seed: IdeaSeed, sources: Vec<String>) -> Self {
        Self {
            id: id.into(),
            source_transcript_ids: sources,
            theme: seed.theme,
            hook: seed.hook,
            quotes: seed.quotes,
            suggested_format: seed.suggested_format,
            status: IdeaStatus::Extracted,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Agent,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewMessage {
    pub role: MessageRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl InterviewMessage {
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Agent,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// One human interview for exactly one idea. Message order is append-only
/// chronological.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: String,
    pub idea_id: String,
    /// Chat thread anchor (the ts of the opening DM).
    pub thread_ts: String,
    pub messages: Vec<InterviewMessage>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Review,
    Approved,
    Published,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Published => "published",
        }
    }
}

/// A generated artifact. Rework never mutates an existing draft; it
/// produces a new one with `version + 1` and a fresh id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDraft {
    pub id: String,
    pub idea_id: String,
    pub format: OutputFormat,
    pub title: String,
    pub body: String,
    pub version: u32,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral intent record: the draft awaiting rework feedback.
/// At most one exists at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRework {
    pub draft_id: String,
    pub idea_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftAction {
    Approve,
    Rework,
    Syndicate,
}

impl DraftAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Rework => "rework",
            Self::Syndicate => "syndicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "rework" => Some(Self::Rework),
            "syndicate" => Some(Self::Syndicate),
            _ => None,
        }
    }
}

/// Transport-neutral inbound chat event, as produced by the channel
/// adapters and consumed by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChatEvent {
    Message {
        text: String,
        #[serde(default)]
        thread_ts: Option<String>,
    },
    Action {
        kind: DraftAction,
        draft_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idea_status_serde_is_snake_case() {
        let json = serde_json::to_string(&IdeaStatus::DraftReady).unwrap();
        assert_eq!(json, "\"draft_ready\"");
        let back: IdeaStatus = serde_json::from_str("\"interviewing\"").unwrap();
        assert_eq!(back, IdeaStatus::Interviewing);
    }

    #[test]
    fn idea_from_seed_starts_extracted() {
        let seed = IdeaSeed {
            theme: "pricing".into(),
            hook: "Nobody reads your pricing page".into(),
            quotes: vec!["we lost the deal on tier naming".into()],
            suggested_format: OutputFormat::LinkedinPost,
        };
        let idea = ContentIdea::from_seed("idea-1", seed, vec!["t-1".into()]);
        assert_eq!(idea.status, IdeaStatus::Extracted);
        assert_eq!(idea.source_transcript_ids, vec!["t-1".to_string()]);
        assert_eq!(idea.hook, "Nobody reads your pricing page");
    }

    #[test]
    fn transcript_backward_compat_defaults() {
        // Older store records lack participants/content.
        let old_json = r#"{
            "id": "t-1",
            "meeting_id": "m-1",
            "title": "Weekly sync",
            "recorded_at": "2025-06-01T10:00:00Z",
            "source": "tldv"
        }"#;
        let t: Transcript = serde_json::from_str(old_json).unwrap();
        assert!(t.participants.is_empty());
        assert!(t.content.is_none());
        assert_eq!(t.source, TranscriptSource::Tldv);
    }

    #[test]
    fn chat_event_serde_roundtrip() {
        let event = ChatEvent::Action {
            kind: DraftAction::Rework,
            draft_id: "d-9".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        match back {
            ChatEvent::Action { kind, draft_id } => {
                assert_eq!(kind, DraftAction::Rework);
                assert_eq!(draft_id, "d-9");
            }
            _ => panic!("expected Action variant"),
        }

        let msg = ChatEvent::Message {
            text: "sounds good".into(),
            thread_ts: Some("1718000000.000100".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        match back {
            ChatEvent::Message { text, thread_ts } => {
                assert_eq!(text, "sounds good");
                assert_eq!(thread_ts.as_deref(), Some("1718000000.000100"));
            }
            _ => panic!("expected Message variant"),
        }
    }

    #[test]
    fn draft_action_parse() {
        assert_eq!(DraftAction::parse("approve"), Some(DraftAction::Approve));
        assert_eq!(DraftAction::parse("syndicate"), Some(DraftAction::Syndicate));
        assert_eq!(DraftAction::parse("publish"), None);
    }

    #[test]
    fn interview_message_constructors() {
        let m = InterviewMessage::agent("why did that work?");
        assert_eq!(m.role, MessageRole::Agent);
        let m = InterviewMessage::user("because we shipped it");
        assert_eq!(m.role, MessageRole::User);
    }
}
