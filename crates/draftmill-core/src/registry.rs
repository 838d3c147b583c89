//! In-memory idea registry and deduplicator.
//!
//! Owns the ContentIdea lifecycle, the normalized-hook set used for
//! duplicate suppression, and the mined-transcript set. All state here is
//! a rebuildable cache; the record store is the system of record.

use std::collections::{HashMap, HashSet};

use draftmill_schema::{ContentIdea, IdeaStatus};

/// Dedup key: lowercase, punctuation stripped, whitespace collapsed.
/// This is the sole duplicate test; no semantic similarity is attempted.
pub fn normalize_hook(hook: &str) -> String {
    hook.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
pub struct IdeaRegistry {
    ideas: HashMap<String, ContentIdea>,
    /// Insertion order, so `unprocessed` listings are stable.
    order: Vec<String>,
    hooks: HashSet<String>,
    mined: HashSet<String>,
}

impl IdeaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a durable snapshot. Ideas with recorded source transcripts
    /// mark those transcripts mined. If any idea predates source tracking,
    /// every known transcript is marked mined instead — re-mining old
    /// transcripts is cheaper to forgo than duplicate ideas are to clean up.
    pub fn load_existing(&mut self, ideas: Vec<ContentIdea>, all_known_transcript_ids: &[String]) {
        let mut legacy_seen = false;
        for idea in ideas {
            if idea.source_transcript_ids.is_empty() {
                legacy_seen = true;
            }
            for tid in &idea.source_transcript_ids {
                self.mined.insert(tid.clone());
            }
            self.record_idea(idea);
        }
        if legacy_seen {
            for tid in all_known_transcript_ids {
                self.mined.insert(tid.clone());
            }
        }
    }

    /// Insert an idea and its normalized hook. Repeat insertion by id is a
    /// no-op.
    pub fn record_idea(&mut self, idea: ContentIdea) {
        if self.ideas.contains_key(&idea.id) {
            return;
        }
        self.hooks.insert(normalize_hook(&idea.hook));
        self.order.push(idea.id.clone());
        self.ideas.insert(idea.id.clone(), idea);
    }

    /// Callers check this before `record_idea` and skip duplicates
    /// entirely (no persistence, no registration).
    pub fn is_duplicate(&self, hook: &str) -> bool {
        self.hooks.contains(&normalize_hook(hook))
    }

    pub fn mark_transcript_mined(&mut self, id: &str) {
        self.mined.insert(id.to_string());
    }

    pub fn is_mined(&self, id: &str) -> bool {
        self.mined.contains(id)
    }

    pub fn mined_count(&self) -> usize {
        self.mined.len()
    }

    /// Ideas still waiting to be interviewed, in insertion order.
    pub fn unprocessed(&self) -> Vec<&ContentIdea> {
        self.order
            .iter()
            .filter_map(|id| self.ideas.get(id))
            .filter(|idea| idea.status == IdeaStatus::Extracted)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ContentIdea> {
        self.ideas.get(id)
    }

    /// Exact match first, then unique prefix, for `draft <id>` typed by a
    /// human who pasted half an identifier.
    pub fn resolve(&self, id_fragment: &str) -> Option<&ContentIdea> {
        if let Some(idea) = self.ideas.get(id_fragment) {
            return Some(idea);
        }
        let mut matches = self
            .ideas
            .values()
            .filter(|idea| idea.id.starts_with(id_fragment));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Pure in-memory transition. The caller propagates to the store and
    /// absorbs propagation failures without rolling this back: routing
    /// decisions read this state, the store is eventually consistent.
    pub fn set_status(&mut self, id: &str, status: IdeaStatus) -> bool {
        match self.ideas.get_mut(id) {
            Some(idea) => {
                idea.status = status;
                true
            }
            None => false,
        }
    }

    pub fn count_by_status(&self, status: IdeaStatus) -> usize {
        self.ideas.values().filter(|i| i.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use draftmill_schema::OutputFormat;

    fn idea(id: &str, hook: &str, sources: Vec<&str>) -> ContentIdea {
        ContentIdea {
            id: id.into(),
            source_transcript_ids: sources.into_iter().map(String::from).collect(),
            theme: "theme".into(),
            hook: hook.into(),
            quotes: vec![],
            suggested_format: OutputFormat::LinkedinPost,
            status: IdeaStatus::Extracted,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn normalization_collapses_case_punctuation_whitespace() {
        assert_eq!(
            normalize_hook("  Nobody  reads your PRICING page!!! "),
            "nobody reads your pricing page"
        );
        assert_eq!(normalize_hook("a-b c"), "a b c");
    }

    #[test]
    fn equal_normalized_hooks_are_duplicates() {
        let mut reg = IdeaRegistry::new();
        reg.record_idea(idea("i-1", "Ship it, then talk.", vec![]));
        assert!(reg.is_duplicate("ship it then TALK"));
        assert!(reg.is_duplicate("  Ship it... then talk  "));
        assert!(!reg.is_duplicate("ship it and then talk"));
    }

    #[test]
    fn record_is_idempotent_by_id() {
        let mut reg = IdeaRegistry::new();
        reg.record_idea(idea("i-1", "hook one", vec![]));
        reg.record_idea(idea("i-1", "hook one", vec![]));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.unprocessed().len(), 1);
    }

    #[test]
    fn load_existing_marks_sources_mined() {
        let mut reg = IdeaRegistry::new();
        reg.load_existing(
            vec![idea("i-1", "h1", vec!["t-1", "t-2"])],
            &["t-1".into(), "t-2".into(), "t-3".into()],
        );
        assert!(reg.is_mined("t-1"));
        assert!(reg.is_mined("t-2"));
        assert!(!reg.is_mined("t-3"));
        assert!(reg.is_duplicate("h1"));
    }

    #[test]
    fn legacy_idea_marks_all_known_transcripts_mined() {
        let all: Vec<String> = (1..=5).map(|n| format!("t-{n}")).collect();
        let mut reg = IdeaRegistry::new();
        reg.load_existing(vec![idea("i-legacy", "old hook", vec![])], &all);
        for tid in &all {
            assert!(reg.is_mined(tid), "{tid} should be mined");
        }
    }

    #[test]
    fn unprocessed_is_insertion_ordered_and_status_filtered() {
        let mut reg = IdeaRegistry::new();
        reg.record_idea(idea("i-1", "h1", vec![]));
        reg.record_idea(idea("i-2", "h2", vec![]));
        reg.record_idea(idea("i-3", "h3", vec![]));
        reg.set_status("i-2", IdeaStatus::Interviewing);

        let ids: Vec<&str> = reg.unprocessed().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-3"]);
    }

    #[test]
    fn set_status_on_unknown_id_is_false() {
        let mut reg = IdeaRegistry::new();
        assert!(!reg.set_status("ghost", IdeaStatus::Published));
    }

    #[test]
    fn resolve_matches_exact_then_unique_prefix() {
        let mut reg = IdeaRegistry::new();
        reg.record_idea(idea("abc-123", "h1", vec![]));
        reg.record_idea(idea("abd-456", "h2", vec![]));

        assert_eq!(reg.resolve("abc-123").unwrap().id, "abc-123");
        assert_eq!(reg.resolve("abd").unwrap().id, "abd-456");
        // Ambiguous prefix resolves to nothing.
        assert!(reg.resolve("ab").is_none());
        assert!(reg.resolve("zzz").is_none());
    }

    #[test]
    fn mark_mined_is_idempotent() {
        let mut reg = IdeaRegistry::new();
        reg.mark_transcript_mined("t-1");
        reg.mark_transcript_mined("t-1");
        assert_eq!(reg.mined_count(), 1);
    }
}
