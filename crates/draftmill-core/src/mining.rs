//! Transcript mining: live ingestion drain plus on-demand batch mining.
//!
//! Idea extraction is the most expensive external call in the system.
//! Batching bounds per-call cost, and the mined-transcript set makes
//! re-mining a guaranteed no-op.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use uuid::Uuid;

use draftmill_drafting::DraftingService;
use draftmill_schema::{ContentIdea, Transcript};
use draftmill_store::RecordStore;

use crate::registry::IdeaRegistry;

/// Live-ingestion drain batch.
const LIVE_BATCH: usize = 5;
/// On-demand batch: this path runs rarely and tolerates more latency.
const ON_DEMAND_BATCH: usize = 10;
/// Content beyond this is truncated before submission to bound prompt cost.
const MAX_CONTENT_CHARS: usize = 4000;

pub struct MiningQueue {
    registry: Arc<Mutex<IdeaRegistry>>,
    drafting: Arc<dyn DraftingService>,
    store: Arc<dyn RecordStore>,
    pending: StdMutex<VecDeque<Transcript>>,
    /// Single drain in flight at a time.
    draining: AtomicBool,
}

impl MiningQueue {
    pub fn new(
        registry: Arc<Mutex<IdeaRegistry>>,
        drafting: Arc<dyn DraftingService>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            registry,
            drafting,
            store,
            pending: StdMutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Append a freshly ingested transcript and drain unless a drain is
    /// already running.
    pub async fn enqueue(&self, transcript: Transcript) {
        self.pending
            .lock()
            .expect("pending queue lock poisoned")
            .push_back(transcript);
        self.drain().await;
    }

    /// Drain pending transcripts in enqueue order, LIVE_BATCH at a time.
    /// Re-entrant calls while a drain is running return immediately; the
    /// running drain re-checks the queue after releasing the guard so
    /// nothing enqueued in the gap is stranded.
    pub async fn drain(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            loop {
                let batch: Vec<Transcript> = {
                    let mut pending = self.pending.lock().expect("pending queue lock poisoned");
                    let take = LIVE_BATCH.min(pending.len());
                    pending.drain(..take).collect()
                };
                if batch.is_empty() {
                    break;
                }
                if let Err(e) = self.extract_batch(&batch).await {
                    tracing::warn!("idea extraction failed for a live batch: {e:#}");
                }
            }

            self.draining.store(false, Ordering::SeqCst);

            if self
                .pending
                .lock()
                .expect("pending queue lock poisoned")
                .is_empty()
            {
                return;
            }
            // Something arrived between the empty check and the guard
            // release; take another pass.
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending queue lock poisoned").len()
    }

    /// Mine a caller-supplied transcript window. Already-mined transcripts
    /// are filtered out first; missing content is lazily fetched (a fetch
    /// failure skips that transcript only). Every attempted transcript is
    /// marked mined, including ones skipped for empty content, so empty
    /// fetches are never repeated.
    pub async fn mine_on_demand(&self, transcripts: Vec<Transcript>) -> Vec<ContentIdea> {
        let fresh: Vec<Transcript> = {
            let registry = self.registry.lock().await;
            transcripts
                .into_iter()
                .filter(|t| !registry.is_mined(&t.id))
                .collect()
        };
        if fresh.is_empty() {
            return vec![];
        }

        let mut attempted_ids: Vec<String> = Vec::with_capacity(fresh.len());
        let mut ready: Vec<Transcript> = Vec::new();
        for mut transcript in fresh {
            attempted_ids.push(transcript.id.clone());
            if transcript.content.as_deref().map_or(true, str::is_empty) {
                match self.store.load_transcript_content(&transcript.id).await {
                    Ok(content) => transcript.content = Some(content),
                    Err(e) => {
                        tracing::warn!(
                            "skipping transcript {} (content load failed): {e}",
                            transcript.id
                        );
                        continue;
                    }
                }
            }
            if transcript.content.as_deref().map_or(true, str::is_empty) {
                tracing::debug!("skipping transcript {} (empty content)", transcript.id);
                continue;
            }
            transcript.content = transcript.content.map(|c| truncate_chars(&c, MAX_CONTENT_CHARS));
            ready.push(transcript);
        }

        let mut minted = Vec::new();
        for batch in ready.chunks(ON_DEMAND_BATCH) {
            match self.extract_batch(batch).await {
                Ok(mut ideas) => minted.append(&mut ideas),
                Err(e) => {
                    tracing::warn!("idea extraction failed for a batch, continuing: {e:#}");
                }
            }
        }

        {
            let mut registry = self.registry.lock().await;
            for id in &attempted_ids {
                registry.mark_transcript_mined(id);
            }
        }

        minted
    }

    /// Submit one batch for extraction and register every unique result.
    /// Duplicates by normalized hook are discarded with no side effects.
    async fn extract_batch(&self, batch: &[Transcript]) -> anyhow::Result<Vec<ContentIdea>> {
        let seeds = self.drafting.extract_ideas(batch).await?;
        let sources: Vec<String> = batch.iter().map(|t| t.id.clone()).collect();

        let mut accepted = Vec::new();
        {
            let mut registry = self.registry.lock().await;
            for seed in seeds {
                if registry.is_duplicate(&seed.hook) {
                    tracing::debug!("dropping duplicate hook: {}", seed.hook);
                    continue;
                }
                let idea =
                    ContentIdea::from_seed(Uuid::new_v4().to_string(), seed, sources.clone());
                registry.record_idea(idea.clone());
                accepted.push(idea);
            }
            for id in &sources {
                registry.mark_transcript_mined(id);
            }
        }

        // Persist outside the registry lock; the store is eventually
        // consistent with in-memory state.
        for idea in &accepted {
            if let Err(e) = self.store.put_idea(idea).await {
                tracing::warn!("failed to persist idea {}: {e}", idea.id);
            }
        }

        if !accepted.is_empty() {
            tracing::info!("recorded {} new idea(s)", accepted.len());
        }
        Ok(accepted)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
