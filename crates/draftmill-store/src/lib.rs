pub mod http;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use draftmill_schema::{ContentDraft, ContentIdea, DraftStatus, IdeaStatus, Transcript};

pub use http::HttpRecordStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("record store request failed: {0}")]
    Transport(String),
    #[error("record store returned malformed data: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The durable system of record: transcripts plus content records (ideas
/// and drafts). Everything draftmill holds in memory is rebuildable from
/// this store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// One-time startup step; a no-op when the schema already exists.
    async fn ensure_schema(&self) -> StoreResult<()>;

    async fn put_transcript(&self, transcript: &Transcript) -> StoreResult<()>;
    async fn recent_transcripts(&self, since: DateTime<Utc>) -> StoreResult<Vec<Transcript>>;
    async fn transcript_ids(&self) -> StoreResult<Vec<String>>;
    /// Lazy full-text load for a transcript stored without inline content.
    async fn load_transcript_content(&self, id: &str) -> StoreResult<String>;

    async fn put_idea(&self, idea: &ContentIdea) -> StoreResult<()>;
    async fn set_idea_status(&self, id: &str, status: IdeaStatus) -> StoreResult<()>;
    async fn load_ideas(&self) -> StoreResult<Vec<ContentIdea>>;

    async fn put_draft(&self, draft: &ContentDraft) -> StoreResult<()>;
    async fn set_draft_status(&self, id: &str, status: DraftStatus) -> StoreResult<()>;
}

/// In-memory store for tests and offline runs.
#[derive(Default)]
pub struct MemRecordStore {
    inner: Mutex<MemInner>,
}

#[derive(Default)]
struct MemInner {
    transcripts: HashMap<String, Transcript>,
    ideas: HashMap<String, ContentIdea>,
    drafts: HashMap<String, ContentDraft>,
}

impl MemRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self, id: &str) -> Option<ContentDraft> {
        self.inner.lock().unwrap().drafts.get(id).cloned()
    }

    pub fn idea(&self, id: &str) -> Option<ContentIdea> {
        self.inner.lock().unwrap().ideas.get(id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemRecordStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn put_transcript(&self, transcript: &Transcript) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .transcripts
            .insert(transcript.id.clone(), transcript.clone());
        Ok(())
    }

    async fn recent_transcripts(&self, since: DateTime<Utc>) -> StoreResult<Vec<Transcript>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Transcript> = inner
            .transcripts
            .values()
            .filter(|t| t.recorded_at >= since)
            .cloned()
            .collect();
        out.sort_by_key(|t| std::cmp::Reverse(t.recorded_at));
        Ok(out)
    }

    async fn transcript_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.lock().unwrap().transcripts.keys().cloned().collect())
    }

    async fn load_transcript_content(&self, id: &str) -> StoreResult<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .transcripts
            .get(id)
            .and_then(|t| t.content.clone())
            .ok_or_else(|| StoreError::NotFound {
                collection: "transcripts".into(),
                id: id.into(),
            })
    }

    async fn put_idea(&self, idea: &ContentIdea) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .ideas
            .insert(idea.id.clone(), idea.clone());
        Ok(())
    }

    async fn set_idea_status(&self, id: &str, status: IdeaStatus) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.ideas.get_mut(id) {
            Some(idea) => {
                idea.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: "content".into(),
                id: id.into(),
            }),
        }
    }

    async fn load_ideas(&self) -> StoreResult<Vec<ContentIdea>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<ContentIdea> = inner.ideas.values().cloned().collect();
        out.sort_by_key(|i| i.created_at);
        Ok(out)
    }

    async fn put_draft(&self, draft: &ContentDraft) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .drafts
            .insert(draft.id.clone(), draft.clone());
        Ok(())
    }

    async fn set_draft_status(&self, id: &str, status: DraftStatus) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.drafts.get_mut(id) {
            Some(draft) => {
                draft.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: "content".into(),
                id: id.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use draftmill_schema::{OutputFormat, TranscriptSource};

    fn transcript(id: &str, age_days: i64) -> Transcript {
        Transcript {
            id: id.into(),
            meeting_id: format!("m-{id}"),
            title: "call".into(),
            recorded_at: Utc::now() - Duration::days(age_days),
            participants: vec![],
            content: Some("text".into()),
            source: TranscriptSource::Tldv,
        }
    }

    fn idea(id: &str) -> ContentIdea {
        ContentIdea {
            id: id.into(),
            source_transcript_ids: vec![],
            theme: "t".into(),
            hook: format!("hook {id}"),
            quotes: vec![],
            suggested_format: OutputFormat::Newsletter,
            status: IdeaStatus::Extracted,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn recent_transcripts_filters_by_window() {
        let store = MemRecordStore::new();
        store.put_transcript(&transcript("old", 30)).await.unwrap();
        store.put_transcript(&transcript("new", 1)).await.unwrap();

        let recent = store
            .recent_transcripts(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
    }

    #[tokio::test]
    async fn load_content_missing_is_not_found() {
        let store = MemRecordStore::new();
        let err = store.load_transcript_content("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn set_idea_status_updates_in_place() {
        let store = MemRecordStore::new();
        store.put_idea(&idea("i-1")).await.unwrap();
        store
            .set_idea_status("i-1", IdeaStatus::Interviewing)
            .await
            .unwrap();
        assert_eq!(store.idea("i-1").unwrap().status, IdeaStatus::Interviewing);
    }

    #[tokio::test]
    async fn set_status_on_missing_idea_fails() {
        let store = MemRecordStore::new();
        let err = store
            .set_idea_status("ghost", IdeaStatus::Published)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
