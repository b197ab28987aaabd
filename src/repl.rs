//! Terminal front end
//!
//! Line commands and an incremental transcript renderer. Streaming answers
//! are printed as they grow instead of redrawing the whole transcript.

use crate::transcript::{MessageEntry, Rating, Role, TranscriptSnapshot};

pub const HELP: &str = "\
Commands:
  <text>              send a message (end a line with \\ to continue it)
  /new                start a new conversation
  /list               list conversations
  /open <id>          switch conversation
  /delete <id>        delete a conversation
  /like <id>          rate an answer
  /dislike <id>
  /unrate <id>
  /set key=value      bind a prompt variable for the new conversation
  /image <url>        attach an image to the next message
  /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    /// Line ended with a backslash: keep composing
    Continue(String),
    New,
    List,
    Open(String),
    Delete(String),
    Rate {
        message_id: String,
        rating: Option<Rating>,
    },
    Set { key: String, value: String },
    Image(String),
    Help,
    Quit,
    Invalid(String),
}

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return match line.strip_suffix('\\') {
            Some(partial) => Command::Continue(partial.to_string()),
            None => Command::Say(line.to_string()),
        };
    };

    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, arg)| (name, arg.trim()));
    let needs_arg = |make: fn(String) -> Command| {
        if arg.is_empty() {
            Command::Invalid(format!("/{name} needs an argument"))
        } else {
            make(arg.to_string())
        }
    };

    match name {
        "new" => Command::New,
        "list" => Command::List,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "open" => needs_arg(Command::Open),
        "delete" => needs_arg(Command::Delete),
        "image" => needs_arg(Command::Image),
        "like" => needs_arg(|id| rate(id, Some(Rating::Like))),
        "dislike" => needs_arg(|id| rate(id, Some(Rating::Dislike))),
        "unrate" => needs_arg(|id| rate(id, None)),
        "set" => match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Command::Set {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            },
            _ => Command::Invalid("usage: /set key=value".to_string()),
        },
        other => Command::Invalid(format!("unknown command /{other}")),
    }
}

fn rate(message_id: String, rating: Option<Rating>) -> Command {
    Command::Rate { message_id, rating }
}

/// Visible text of an entry; agent answers show their thoughts
fn entry_text(entry: &MessageEntry) -> String {
    if !entry.content.is_empty() || entry.thought_steps.is_empty() {
        return entry.content.clone();
    }
    entry
        .thought_steps
        .iter()
        .map(|step| step.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn header(entry: &MessageEntry) -> String {
    match entry.role {
        Role::Question => "\nyou> ".to_string(),
        Role::Answer if entry.opening_statement => "\n".to_string(),
        Role::Answer => format!("\nassistant [{}]> ", entry.id),
    }
}

#[derive(Debug, Default)]
pub struct Renderer {
    shown: Vec<(String, String)>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for this snapshot
    pub fn render(&mut self, snapshot: &TranscriptSnapshot) -> String {
        let entries = snapshot.entries.as_slice();
        let mut out = String::new();

        let reset = match (self.shown.first(), entries.first()) {
            (Some((shown_id, _)), Some(entry)) => *shown_id != entry.id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if reset {
            out.push_str("\n----------------------------------------");
            self.shown.clear();
        }

        for (index, entry) in entries.iter().enumerate() {
            let text = entry_text(entry);
            let grown = self
                .shown
                .get(index)
                .and_then(|(_, shown)| text.strip_prefix(shown.as_str()));
            match grown {
                Some(rest) => out.push_str(rest),
                // New entry, or rewritten in place
                None => {
                    out.push_str(&header(entry));
                    out.push_str(&text);
                }
            }
        }

        self.shown = entries
            .iter()
            .map(|entry| (entry.id.clone(), entry_text(entry)))
            .collect();
        out
    }
}
