//! Inbound-message classification.
//!
//! Every owner message resolves to exactly one route. The function is
//! pure over a snapshot of session state so it can be tested without any
//! transport.

use std::collections::HashMap;

/// Where an inbound text message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    InterviewReply { session_id: String },
    ReworkFeedback,
    Command(Command),
    Passive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Ideas,
    Mine,
    Draft(DraftTarget),
    Stop,
    Cancel,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftTarget {
    /// Position in the last `ideas` listing (1-based).
    Number(usize),
    /// Idea identifier, possibly partial.
    Id(String),
}

/// The slice of session state routing needs.
#[derive(Debug, Default, Clone)]
pub struct RoutingSnapshot {
    /// thread_ts -> session id, active sessions only.
    pub thread_sessions: HashMap<String, String>,
    /// Most recently started active session, if any.
    pub latest_active: Option<String>,
    pub rework_pending: bool,
}

pub fn route(text: &str, thread_ts: Option<&str>, snap: &RoutingSnapshot) -> Route {
    // 1. A reply in an active session's thread is always interview input.
    if let Some(ts) = thread_ts {
        if let Some(session_id) = snap.thread_sessions.get(ts) {
            return Route::InterviewReply {
                session_id: session_id.clone(),
            };
        }
    }

    let command = parse_command(text);

    // 2. Unthreaded non-command text falls through to the latest active
    // session, so the owner can answer without using the thread.
    if thread_ts.is_none() && command.is_none() {
        if let Some(session_id) = &snap.latest_active {
            return Route::InterviewReply {
                session_id: session_id.clone(),
            };
        }
    }

    // 3. With a rework outstanding, free text is feedback. Commands fall
    // through (the dispatcher clears the pending rework first).
    if snap.rework_pending && command.is_none() {
        return Route::ReworkFeedback;
    }

    // 4. Command or passive context.
    match command {
        Some(cmd) => Route::Command(cmd),
        None => Route::Passive,
    }
}

/// Case-insensitive, punctuation-stripped command recognition, with a
/// small set of phrase synonyms and bare 1-2 digit numbers.
pub fn parse_command(text: &str) -> Option<Command> {
    if text.trim() == "?" {
        return Some(Command::Help);
    }

    let normalized = normalize(text);
    match normalized.as_str() {
        "status" | "pipeline" => return Some(Command::Status),
        "ideas" | "list" | "list ideas" | "show ideas" => return Some(Command::Ideas),
        "mine" | "dig" | "find ideas" => return Some(Command::Mine),
        "stop" | "done" | "thats all" | "enough" | "finish" => return Some(Command::Stop),
        "cancel" | "nevermind" | "never mind" => return Some(Command::Cancel),
        "help" | "commands" => return Some(Command::Help),
        _ => {}
    }

    // Bare 1-2 digit number selects from the last listing.
    if normalized.len() <= 2 && !normalized.is_empty() {
        if let Ok(n) = normalized.parse::<usize>() {
            return Some(Command::Draft(DraftTarget::Number(n)));
        }
    }

    // `draft 3` or `draft <id>`. The id is taken from the raw text so
    // hyphenated identifiers survive.
    let mut raw_tokens = text.split_whitespace();
    if raw_tokens
        .next()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .as_deref()
        == Some("draft")
    {
        let rest = raw_tokens.collect::<Vec<_>>().join(" ");
        if rest.is_empty() {
            return None;
        }
        if let Ok(n) = rest.parse::<usize>() {
            return Some(Command::Draft(DraftTarget::Number(n)));
        }
        return Some(Command::Draft(DraftTarget::Id(rest)));
    }

    None
}

fn normalize(text: &str) -> String {
    // Apostrophes vanish ("that's" -> "thats"); other punctuation splits.
    text.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
