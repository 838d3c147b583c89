//! tl;dv meeting-transcription client and polling feed.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;

use draftmill_schema::{Transcript, TranscriptSource};
use draftmill_store::RecordStore;

const PAGE_LIMIT: u32 = 10;

/// Anything that can surface newly available transcripts. The scheduler's
/// poll job and the content cycle both consume this.
#[async_trait]
pub trait TranscriptFeed: Send + Sync {
    /// Fetch, persist, and return transcripts that appeared since the
    /// last check.
    async fn poll_new(&self) -> Result<Vec<Transcript>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub name: String,
    pub happened_at: DateTime<Utc>,
    #[serde(default)]
    pub invitees: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingPage {
    pub meetings: Vec<Meeting>,
    #[serde(default)]
    pub has_more: bool,
}

/// Transcript text may lag the meeting record by minutes. "Not ready" is
/// an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptFetch {
    Ready(String),
    NotReady,
}

#[derive(Debug, Clone)]
pub struct TldvClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl TldvClient {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_meetings_since(
        &self,
        since: DateTime<Utc>,
        page: u32,
    ) -> Result<MeetingPage> {
        let resp = self
            .client
            .get(format!("{}/v1alpha1/meetings", self.api_base))
            .header("x-api-key", &self.api_key)
            .query(&[
                ("from", since.to_rfc3339()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("tldv meeting listing returned {status}");
        }
        Ok(resp.json::<MeetingPage>().await?)
    }

    pub async fn get_transcript(&self, meeting_id: &str) -> Result<TranscriptFetch> {
        #[derive(Deserialize)]
        struct TranscriptBody {
            #[serde(default)]
            data: Vec<TranscriptSegment>,
        }
        #[derive(Deserialize)]
        struct TranscriptSegment {
            #[serde(default)]
            speaker: String,
            text: String,
        }

        let resp = self
            .client
            .get(format!(
                "{}/v1alpha1/meetings/{meeting_id}/transcript",
                self.api_base
            ))
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::ACCEPTED => Ok(TranscriptFetch::NotReady),
            s if s.is_success() => {
                let body: TranscriptBody = resp.json().await?;
                let text = body
                    .data
                    .iter()
                    .map(|seg| {
                        if seg.speaker.is_empty() {
                            seg.text.clone()
                        } else {
                            format!("{}: {}", seg.speaker, seg.text)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(TranscriptFetch::Ready(text))
            }
            s => anyhow::bail!("tldv transcript fetch returned {s} for {meeting_id}"),
        }
    }
}

/// Polls tl;dv for new meetings, persists ready transcripts, and returns
/// them for mining. Owns the "last checked" watermark.
pub struct TranscriptPoller {
    client: TldvClient,
    store: Arc<dyn RecordStore>,
    last_checked: Mutex<DateTime<Utc>>,
}

impl TranscriptPoller {
    pub fn new(client: TldvClient, store: Arc<dyn RecordStore>, start_from: DateTime<Utc>) -> Self {
        Self {
            client,
            store,
            last_checked: Mutex::new(start_from),
        }
    }

    fn to_transcript(meeting: &Meeting, content: String) -> Transcript {
        Transcript {
            id: format!("tr-{}", meeting.id),
            meeting_id: meeting.id.clone(),
            title: meeting.name.clone(),
            recorded_at: meeting.happened_at,
            participants: meeting.invitees.clone(),
            content: Some(content),
            source: TranscriptSource::Tldv,
        }
    }
}

#[async_trait]
impl TranscriptFeed for TranscriptPoller {
    async fn poll_new(&self) -> Result<Vec<Transcript>> {
        let since = *self.last_checked.lock().await;

        let mut meetings: Vec<Meeting> = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.client.list_meetings_since(since, page).await?;
            let more = batch.has_more;
            meetings.extend(batch.meetings);
            page += 1;
            if !more || page > PAGE_LIMIT {
                break;
            }
        }
        // Oldest first, so the watermark can advance one ready meeting at
        // a time and a not-ready transcript is retried on the next poll.
        meetings.sort_by_key(|m| m.happened_at);

        let mut ingested = Vec::new();
        let mut watermark = since;
        for meeting in &meetings {
            if meeting.happened_at <= since {
                continue;
            }
            match self.client.get_transcript(&meeting.id).await {
                Ok(TranscriptFetch::Ready(content)) => {
                    let transcript = Self::to_transcript(meeting, content);
                    if let Err(e) = self.store.put_transcript(&transcript).await {
                        tracing::warn!("failed to persist transcript {}: {e}", transcript.id);
                    }
                    watermark = meeting.happened_at;
                    ingested.push(transcript);
                }
                Ok(TranscriptFetch::NotReady) => {
                    tracing::debug!("transcript for {} not ready yet", meeting.id);
                    break;
                }
                Err(e) => {
                    tracing::warn!("transcript fetch failed for {}: {e}", meeting.id);
                    break;
                }
            }
        }

        *self.last_checked.lock().await = watermark;
        if !ingested.is_empty() {
            tracing::info!("ingested {} new transcript(s)", ingested.len());
        }
        Ok(ingested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_page_deserializes_without_has_more() {
        let page: MeetingPage = serde_json::from_str(
            r#"{"meetings": [{"id": "m1", "name": "sync",
                 "happened_at": "2025-06-01T10:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(page.meetings.len(), 1);
        assert!(!page.has_more);
        assert!(page.meetings[0].invitees.is_empty());
    }
}
