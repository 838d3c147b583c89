pub mod llm;
pub mod parse;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use draftmill_schema::{ContentIdea, IdeaSeed, InterviewMessage, OutputFormat, Transcript};

pub use llm::LlmDrafter;

/// Title/body pair returned by draft generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftBody {
    pub title: String,
    pub body: String,
}

/// Voice-style configuration passed to draft generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Short description of how the author writes.
    #[serde(default)]
    pub voice_summary: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub no_go_topics: Vec<String>,
}

/// The external text-generation capability. All operations are
/// request/response; a malformed model answer yields an empty or neutral
/// result, never a parse error.
#[async_trait]
pub trait DraftingService: Send + Sync {
    /// Mine a batch of transcripts for content-worthy ideas.
    async fn extract_ideas(&self, transcripts: &[Transcript]) -> Result<Vec<IdeaSeed>>;

    /// Opening interview message for a fresh idea.
    async fn opening_message(&self, idea: &ContentIdea) -> Result<String>;

    /// One follow-up question given the conversation so far.
    async fn follow_up_question(
        &self,
        idea: &ContentIdea,
        messages: &[InterviewMessage],
    ) -> Result<String>;

    /// Whether the conversation holds enough material to draft from.
    async fn has_enough_material(
        &self,
        idea: &ContentIdea,
        messages: &[InterviewMessage],
    ) -> Result<bool>;

    /// Produce a draft in the requested format, in the configured voice.
    async fn write_draft(
        &self,
        idea: &ContentIdea,
        messages: &[InterviewMessage],
        format: OutputFormat,
        voice: &VoiceProfile,
    ) -> Result<DraftBody>;

    /// Rewrite a draft body according to feedback.
    async fn rework_draft(&self, body: &str, feedback: &str) -> Result<String>;

    /// Convert a long-form post into a short-form thread.
    async fn to_thread(&self, body: &str) -> Result<String>;
}

/// Deterministic canned drafter for tests and offline runs.
pub struct StubDrafter;

#[async_trait]
impl DraftingService for StubDrafter {
    async fn extract_ideas(&self, transcripts: &[Transcript]) -> Result<Vec<IdeaSeed>> {
        Ok(transcripts
            .iter()
            .map(|t| IdeaSeed {
                theme: t.title.clone(),
                hook: format!("{}: the part nobody says out loud", t.title),
                quotes: vec![],
                suggested_format: OutputFormat::LinkedinPost,
            })
            .collect())
    }

    async fn opening_message(&self, idea: &ContentIdea) -> Result<String> {
        Ok(format!(
            "I pulled this from your recent calls: \"{}\". What prompted it?",
            idea.hook
        ))
    }

    async fn follow_up_question(
        &self,
        _idea: &ContentIdea,
        _messages: &[InterviewMessage],
    ) -> Result<String> {
        Ok("[stub] And what happened next?".to_string())
    }

    async fn has_enough_material(
        &self,
        _idea: &ContentIdea,
        messages: &[InterviewMessage],
    ) -> Result<bool> {
        Ok(messages.len() >= 4)
    }

    async fn write_draft(
        &self,
        idea: &ContentIdea,
        _messages: &[InterviewMessage],
        format: OutputFormat,
        _voice: &VoiceProfile,
    ) -> Result<DraftBody> {
        Ok(DraftBody {
            title: idea.theme.clone(),
            body: format!("[stub:{}] {}", format.as_str(), idea.hook),
        })
    }

    async fn rework_draft(&self, body: &str, feedback: &str) -> Result<String> {
        Ok(format!("{body}\n\n[reworked: {feedback}]"))
    }

    async fn to_thread(&self, body: &str) -> Result<String> {
        Ok(format!("[thread] {body}"))
    }
}
