//! HTTP drafting service backed by an Anthropic-style messages endpoint.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use draftmill_schema::{ContentIdea, IdeaSeed, InterviewMessage, MessageRole, OutputFormat, Transcript};

use crate::parse::{lenient_bool, lenient_json};
use crate::{DraftBody, DraftingService, VoiceProfile};

const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Clone)]
pub struct LlmDrafter {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl LlmDrafter {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.api_base);
        let payload = ApiRequest {
            model: self.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: system.to_string(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: user.to_string(),
            }],
        };

        let resp = match self
            .client
            .post(url)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "drafting api error (timeout) [retryable]: request timed out after 60s"
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("drafting api error (connect) [retryable]: {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            return Err(format_api_error(status, &text));
        }

        let body: ApiResponse = resp.json().await?;
        let text = body
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }
}

fn format_api_error(status: StatusCode, body: &str) -> anyhow::Error {
    let detail: String = body.chars().take(300).collect();
    let retryable = matches!(status.as_u16(), 429 | 500..=599);
    if retryable {
        anyhow!("drafting api error ({status}) [retryable]: {detail}")
    } else {
        anyhow!("drafting api error ({status}): {detail}")
    }
}

fn render_history(messages: &[InterviewMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let who = match m.role {
                MessageRole::Agent => "Interviewer",
                MessageRole::User => "Author",
            };
            format!("{who}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_transcripts(transcripts: &[Transcript]) -> String {
    transcripts
        .iter()
        .map(|t| {
            format!(
                "## {} ({})\n{}",
                t.title,
                t.recorded_at.format("%Y-%m-%d"),
                t.content.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

const EXTRACT_SYSTEM: &str = "You mine conversation transcripts for content-worthy ideas. \
Reply with a JSON array of objects: \
{\"theme\", \"hook\", \"quotes\", \"suggested_format\"} where suggested_format is one of \
linkedin_post, youtube_script, newsletter, x_thread. The hook is a single strong opening \
line. No commentary outside the JSON.";

const JUDGE_SYSTEM: &str = "You decide whether an interview has gathered enough concrete \
material (specifics, stories, numbers) to write from. Answer with exactly 'yes' or 'no'.";

#[async_trait]
impl DraftingService for LlmDrafter {
    async fn extract_ideas(&self, transcripts: &[Transcript]) -> Result<Vec<IdeaSeed>> {
        if transcripts.is_empty() {
            return Ok(vec![]);
        }
        let user = render_transcripts(transcripts);
        let text = self.complete(EXTRACT_SYSTEM, &user).await?;
        match lenient_json::<Vec<IdeaSeed>>(&text) {
            Some(seeds) => Ok(seeds),
            None => {
                tracing::warn!("unparseable extraction response, treating as zero ideas");
                Ok(vec![])
            }
        }
    }

    async fn opening_message(&self, idea: &ContentIdea) -> Result<String> {
        let system = "You open a short interview with the author about one of their own \
ideas. One friendly message: show them the hook, then ask one concrete question. \
No preamble.";
        let user = format!(
            "Idea theme: {}\nHook: {}\nSupporting quotes: {}",
            idea.theme,
            idea.hook,
            idea.quotes.join(" | ")
        );
        Ok(self.complete(system, &user).await?.trim().to_string())
    }

    async fn follow_up_question(
        &self,
        idea: &ContentIdea,
        messages: &[InterviewMessage],
    ) -> Result<String> {
        let system = "You are mid-interview. Ask exactly one follow-up question that digs \
for specifics the conversation is still missing. Just the question.";
        let user = format!(
            "Idea: {} — {}\n\nConversation so far:\n{}",
            idea.theme,
            idea.hook,
            render_history(messages)
        );
        Ok(self.complete(system, &user).await?.trim().to_string())
    }

    async fn has_enough_material(
        &self,
        idea: &ContentIdea,
        messages: &[InterviewMessage],
    ) -> Result<bool> {
        let user = format!(
            "Idea: {} — {}\n\nConversation:\n{}",
            idea.theme,
            idea.hook,
            render_history(messages)
        );
        let text = self.complete(JUDGE_SYSTEM, &user).await?;
        Ok(lenient_bool(&text))
    }

    async fn write_draft(
        &self,
        idea: &ContentIdea,
        messages: &[InterviewMessage],
        format: OutputFormat,
        voice: &VoiceProfile,
    ) -> Result<DraftBody> {
        let system = format!(
            "You ghostwrite in the author's voice. Voice: {}. Audience: {}. \
Never touch these topics: {}. Write a {} from the interview material. \
Reply with JSON: {{\"title\", \"body\"}}.",
            voice.voice_summary,
            voice.audience,
            voice.no_go_topics.join(", "),
            format.as_str()
        );
        let user = format!(
            "Idea: {} — {}\nQuotes: {}\n\nInterview:\n{}",
            idea.theme,
            idea.hook,
            idea.quotes.join(" | "),
            render_history(messages)
        );
        let text = self.complete(&system, &user).await?;
        match lenient_json::<DraftBody>(&text) {
            Some(draft) => Ok(draft),
            None => {
                // Neutral fallback: the raw response is the body.
                tracing::warn!("unparseable draft response, using raw text as body");
                Ok(DraftBody {
                    title: idea.theme.clone(),
                    body: text.trim().to_string(),
                })
            }
        }
    }

    async fn rework_draft(&self, body: &str, feedback: &str) -> Result<String> {
        let system = "Rewrite the draft applying the feedback. Keep the format and voice. \
Reply with the rewritten draft only.";
        let user = format!("Draft:\n{body}\n\nFeedback:\n{feedback}");
        Ok(self.complete(system, &user).await?.trim().to_string())
    }

    async fn to_thread(&self, body: &str) -> Result<String> {
        let system = "Convert this long-form post into a short-form thread of 4-8 numbered \
posts, each under 280 characters. Reply with the thread only.";
        Ok(self.complete(system, body).await?.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}
