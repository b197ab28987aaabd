//! Rename Trigger
//!
//! After a threshold of completed exchanges the conversation gets a generated
//! name. Generation runs off the critical path; failure only logs.

use crate::runtime::AssistantBackend;
use crate::transcript::MessageEntry;
use std::time::Duration;
use tokio::time::timeout;

const RENAME_PROMPT: &str =
    "Based on this conversation, generate a brief, relevant conversation name (max 40 chars):";

const RENAME_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_NAME_CHARS: usize = 40;

/// Per-session counter of completed exchanges
#[derive(Debug, Clone)]
pub struct RenameTrigger {
    threshold: u32,
    completed: u32,
}

impl RenameTrigger {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            completed: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[cfg(test)]
    pub fn completed(&self) -> u32 {
        self.completed
    }

    /// Count one completed exchange. True exactly when the threshold is reached.
    pub fn record_completion(&mut self) -> bool {
        self.completed = self.completed.saturating_add(1);
        self.threshold > 0 && self.completed == self.threshold
    }

    /// The user moved to another conversation
    pub fn reset(&mut self) {
        self.completed = 0;
    }
}

/// Last `max_messages` non-empty, non-opening messages as `role: content` lines
pub fn conversation_summary(entries: &[MessageEntry], max_messages: usize) -> String {
    let lines: Vec<String> = entries
        .iter()
        .filter(|e| !e.opening_statement)
        .filter_map(|e| {
            let text = e.display_text().trim();
            if text.is_empty() {
                return None;
            }
            let role = if e.is_answer() { "assistant" } else { "user" };
            Some(format!("{role}: {text}"))
        })
        .collect();
    let skip = lines.len().saturating_sub(max_messages);
    lines[skip..].join("\n")
}

pub fn rename_prompt(summary: &str) -> String {
    format!("{RENAME_PROMPT}\n\n{summary}")
}

/// Ask the backend to name a conversation.
///
/// Returns None on timeout or error; the conversation keeps its old name.
pub async fn generate_name<B>(backend: &B, conversation_id: &str, summary: &str) -> Option<String>
where
    B: AssistantBackend + ?Sized,
{
    let prompt = rename_prompt(summary);
    let result = timeout(
        RENAME_TIMEOUT,
        backend.rename_conversation(conversation_id, &prompt, true),
    )
    .await;

    match result {
        Ok(Ok(name)) => {
            let name = sanitize_name(&name);
            (!name.is_empty()).then_some(name)
        }
        Ok(Err(e)) => {
            tracing::warn!(conv_id = %conversation_id, error = %e, "Conversation rename failed");
            None
        }
        Err(_) => {
            tracing::warn!(conv_id = %conversation_id, "Conversation rename timed out");
            None
        }
    }
}

/// Single line, no wrapping quotes, at most 40 characters cut at a word boundary
fn sanitize_name(name: &str) -> String {
    let line = name.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let cleaned = line
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.chars().count() <= MAX_NAME_CHARS {
        return cleaned;
    }
    let truncated: String = cleaned.chars().take(MAX_NAME_CHARS).collect();
    match truncated.rfind(' ') {
        Some(space) if space > 0 => truncated.split_at(space).0.to_string(),
        _ => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_fires_once_at_threshold() {
        let mut trigger = RenameTrigger::new(3);
        assert!(!trigger.record_completion());
        assert!(!trigger.record_completion());
        assert!(trigger.record_completion());
        assert!(!trigger.record_completion());

        trigger.reset();
        assert_eq!(trigger.completed(), 0);
    }

    #[test]
    fn test_zero_threshold_never_fires() {
        let mut trigger = RenameTrigger::new(0);
        assert!(!trigger.record_completion());
    }

    #[test]
    fn test_summary_skips_opening_and_empty() {
        let entries = vec![
            MessageEntry::opening("g", "Hello, how can I help?"),
            MessageEntry::question("q1", "pricing?"),
            MessageEntry::answer("a1", "It is $10."),
            MessageEntry::answer("p", ""),
            MessageEntry::question("q2", "discounts?"),
            MessageEntry::answer("a2", "Yes, 10%."),
        ];
        assert_eq!(
            conversation_summary(&entries, 3),
            "assistant: It is $10.\nuser: discounts?\nassistant: Yes, 10%."
        );
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("\"Pricing Questions\"\n"), "Pricing Questions");
        assert_eq!(sanitize_name("  many   spaces  "), "many spaces");

        let long = "A very long conversation name that goes well past the limit";
        let result = sanitize_name(long);
        assert!(result.chars().count() <= MAX_NAME_CHARS);
        assert!(long.starts_with(&result));
        assert!(!result.ends_with(' '));
    }

    #[test]
    fn test_sanitize_multibyte() {
        let name = "é".repeat(50);
        assert_eq!(sanitize_name(&name).chars().count(), MAX_NAME_CHARS);
    }
}
