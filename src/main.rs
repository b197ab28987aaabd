//! Phoenix Chat - terminal client for a conversational assistant
//!
//! Streams answers from a Dify-compatible backend and keeps a local
//! transcript consistent while the user switches between conversations.

mod client;
mod composer;
mod config;
mod db;
mod prompt;
mod reconcile;
mod registry;
mod rename;
mod repl;
mod runtime;
mod session;
mod stream;
mod switch;
mod transcript;

use client::HttpBackend;
use composer::{Composer, KeyEvent};
use config::ClientConfig;
use db::Database;
use registry::{ConversationSummary, Inputs};
use repl::{Command, Renderer, HELP};
use runtime::{ChatRuntime, DatabaseStore, Input, RuntimeHandle};
use serde_json::Value;
use session::{ChatSession, NotificationLevel, SessionEvent};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use transcript::{Attachment, Owner, TranscriptSnapshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the REPL
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phoenix_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Configuration
    let config = ClientConfig::from_env();
    let mut session = ChatSession::new(config.session_config());
    let (Some(api_key), None) = (config.api_key.clone(), config.unavailable_reason()) else {
        let reason = config.unavailable_reason().unwrap_or_default();
        session.mark_unavailable(reason.as_str());
        println!("App unavailable: {reason}");
        return Ok(());
    };

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;
    let backend = HttpBackend::new(&config.api_url, api_key, config.user.clone());
    tracing::info!(api_url = %config.api_url, user = %config.user, "Backend configured");

    let snapshots = session.subscribe_transcript();
    let events = session.subscribe();
    let (runtime, handle) = ChatRuntime::new(session, backend, DatabaseStore::new(db));
    let runtime_task = tokio::spawn(runtime.run());

    let (conversations_tx, conversations_rx) = watch::channel(ConversationView::default());
    let printer = tokio::spawn(print_updates(
        snapshots,
        events,
        conversations_tx,
        config.show_prompt,
    ));

    println!("{HELP}");
    repl(&handle, conversations_rx).await?;

    handle.send(Input::Shutdown).await;
    handle.shutdown();
    runtime_task.await?;
    printer.abort();
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct ConversationView {
    conversations: Vec<ConversationSummary>,
    current_id: Option<String>,
}

async fn repl(
    handle: &RuntimeHandle,
    conversations: watch::Receiver<ConversationView>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut composer = Composer::new();
    let mut pending = String::new();
    let mut inputs = Inputs::new();

    while let Some(line) = lines.next_line().await? {
        match repl::parse(&line) {
            Command::Continue(partial) => {
                // Shift+Enter: newline without submitting
                pending.push_str(&partial);
                pending.push('\n');
                let shift = KeyEvent {
                    shift: true,
                    ..KeyEvent::enter()
                };
                composer.set_query(pending.clone());
                composer.key_down(shift);
                composer.key_up(shift);
            }
            Command::Say(text) => {
                composer.set_query(format!("{pending}{text}\n"));
                pending.clear();
                composer.key_down(KeyEvent::enter());
                match composer.key_up(KeyEvent::enter()) {
                    Some(Ok(submission)) => {
                        if handle.submit(submission).await.is_ok() {
                            composer.accepted();
                        }
                    }
                    Some(Err(e)) => println!("[error] {e}"),
                    None => {}
                }
            }
            Command::New => {
                handle.send(Input::NewConversation).await;
            }
            Command::List => print_conversations(&conversations.borrow()),
            Command::Open(id) => {
                handle.send(Input::SelectConversation(id)).await;
            }
            Command::Delete(id) => {
                handle.send(Input::DeleteConversation(id)).await;
            }
            Command::Rate { message_id, rating } => {
                handle.send(Input::Feedback { message_id, rating }).await;
            }
            Command::Set { key, value } => {
                inputs.insert(key, Value::String(value));
                handle.send(Input::SetInputs(inputs.clone())).await;
            }
            Command::Image(url) => {
                let id = uuid::Uuid::new_v4().to_string();
                composer.attach(Attachment::remote_image(id, url, Owner::User));
                println!("[info] {} image(s) attached", composer.files().len());
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(message) => println!("[error] {message}"),
        }
    }
    Ok(())
}

async fn print_updates(
    mut snapshots: broadcast::Receiver<TranscriptSnapshot>,
    mut events: broadcast::Receiver<SessionEvent>,
    conversations: watch::Sender<ConversationView>,
    show_prompt: bool,
) {
    let mut renderer = Renderer::new();
    loop {
        tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Ok(snapshot) => print_flush(&renderer.render(&snapshot)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Renderer lagged behind transcript");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = events.recv() => match event {
                Ok(event) => handle_event(event, &conversations, show_prompt),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn handle_event(event: SessionEvent, conversations: &watch::Sender<ConversationView>, show_prompt: bool) {
    match event {
        SessionEvent::Notification(notification) => {
            let tag = match notification.level {
                NotificationLevel::Info => "info",
                NotificationLevel::Success => "ok",
                NotificationLevel::Error => "error",
            };
            print_flush(&format!("\n[{tag}] {}\n", notification.message));
        }
        SessionEvent::ConversationsChanged {
            conversations: list,
            current_id,
        } => {
            conversations.send_replace(ConversationView {
                conversations: list,
                current_id,
            });
        }
        SessionEvent::StatusChanged(status) => {
            print_flush(&format!("\n[status] {status:?}\n"));
        }
        SessionEvent::RespondingChanged(false) => print_flush("\n"),
        SessionEvent::RespondingChanged(true) => {}
        SessionEvent::PromptLoaded {
            variables,
            introduction,
        } if show_prompt => {
            let mut out = String::from("\nPrompt variables:\n");
            for variable in &variables {
                let required = if variable.required { " (required)" } else { "" };
                out.push_str(&format!("  {} - {}{required}\n", variable.key, variable.name));
            }
            out.push_str(&format!("Introduction: {introduction}\n"));
            print_flush(&out);
        }
        SessionEvent::PromptLoaded { .. } => {}
    }
}

fn print_conversations(view: &ConversationView) {
    for conversation in &view.conversations {
        let marker = if view.current_id.as_deref() == Some(conversation.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {}  {}", conversation.id, conversation.name);
    }
}

fn print_flush(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}
