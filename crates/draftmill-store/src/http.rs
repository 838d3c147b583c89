//! REST document-store client.
//!
//! Speaks a simple collections/records API: records are upserted by id,
//! listed by recency, and patched for status changes. Transcript bodies
//! live behind a separate `/content` resource so listings stay small.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use draftmill_schema::{ContentDraft, ContentIdea, DraftStatus, IdeaStatus, Transcript};

use crate::{RecordStore, StoreError, StoreResult};

const TRANSCRIPTS: &str = "transcripts";
const CONTENT: &str = "content";

#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl HttpRecordStore {
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

    fn records_url(&self, collection: &str) -> String {
        format!("{}/collections/{collection}/records", self.api_base)
    }

    async fn put_record<T: serde::Serialize>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> StoreResult<()> {
        let resp = self
            .client
            .put(format!("{}/{id}", self.records_url(collection)))
            .bearer_auth(&self.api_key)
            .json(record)
            .send()
            .await?;
        check_ok(collection, id, resp.status())
    }

    async fn patch_status(&self, collection: &str, id: &str, status: &str) -> StoreResult<()> {
        let resp = self
            .client
            .patch(format!("{}/{id}", self.records_url(collection)))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        check_ok(collection, id, resp.status())
    }
}

fn check_ok(collection: &str, id: &str, status: StatusCode) -> StoreResult<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(StoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }),
        s => Err(StoreError::Transport(format!(
            "record store returned {s} for {collection}/{id}"
        ))),
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        let resp = self
            .client
            .post(format!("{}/schema", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "collections": [TRANSCRIPTS, CONTENT] }))
            .send()
            .await?;
        // 409 means the schema already exists; that is the startup no-op.
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            s => Err(StoreError::Transport(format!("schema ensure returned {s}"))),
        }
    }

    async fn put_transcript(&self, transcript: &Transcript) -> StoreResult<()> {
        self.put_record(TRANSCRIPTS, &transcript.id, transcript).await
    }

    async fn recent_transcripts(&self, since: DateTime<Utc>) -> StoreResult<Vec<Transcript>> {
        let resp = self
            .client
            .get(self.records_url(TRANSCRIPTS))
            .bearer_auth(&self.api_key)
            .query(&[("since", since.to_rfc3339())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!(
                "transcript listing returned {status}"
            )));
        }
        resp.json::<Vec<Transcript>>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn transcript_ids(&self) -> StoreResult<Vec<String>> {
        #[derive(Deserialize)]
        struct IdRow {
            id: String,
        }
        let resp = self
            .client
            .get(self.records_url(TRANSCRIPTS))
            .bearer_auth(&self.api_key)
            .query(&[("fields", "id")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!(
                "transcript id listing returned {status}"
            )));
        }
        let rows = resp
            .json::<Vec<IdRow>>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn load_transcript_content(&self, id: &str) -> StoreResult<String> {
        #[derive(Deserialize)]
        struct ContentBody {
            content: String,
        }
        let resp = self
            .client
            .get(format!("{}/{id}/content", self.records_url(TRANSCRIPTS)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => resp
                .json::<ContentBody>()
                .await
                .map(|b| b.content)
                .map_err(|e| StoreError::Malformed(e.to_string())),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                collection: TRANSCRIPTS.into(),
                id: id.into(),
            }),
            s => Err(StoreError::Transport(format!(
                "content load returned {s} for {id}"
            ))),
        }
    }

    async fn put_idea(&self, idea: &ContentIdea) -> StoreResult<()> {
        self.put_record(CONTENT, &idea.id, idea).await
    }

    async fn set_idea_status(&self, id: &str, status: IdeaStatus) -> StoreResult<()> {
        self.patch_status(CONTENT, id, status.as_str()).await
    }

    async fn load_ideas(&self) -> StoreResult<Vec<ContentIdea>> {
        let resp = self
            .client
            .get(self.records_url(CONTENT))
            .bearer_auth(&self.api_key)
            .query(&[("kind", "idea")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!("idea listing returned {status}")));
        }
        resp.json::<Vec<ContentIdea>>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn put_draft(&self, draft: &ContentDraft) -> StoreResult<()> {
        self.put_record(CONTENT, &draft.id, draft).await
    }

    async fn set_draft_status(&self, id: &str, status: DraftStatus) -> StoreResult<()> {
        self.patch_status(CONTENT, id, status.as_str()).await
    }
}
