//! Chat runtime executor

use super::traits::{AssistantBackend, ConversationPointerStore};
use super::{Input, RuntimeHandle};

use crate::client::ClientErrorKind;
use crate::rename::generate_name;
use crate::session::{ChatSession, Task};
use crate::stream::{StreamError, StreamEvent};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INPUT_CAPACITY: usize = 256;

/// Generic runtime that can work with any backend and pointer store
pub struct ChatRuntime<B, P>
where
    B: AssistantBackend + 'static,
    P: ConversationPointerStore + 'static,
{
    session: ChatSession,
    backend: Arc<B>,
    pointers: Arc<P>,
    input_rx: mpsc::Receiver<Input>,
    input_tx: mpsc::Sender<Input>,
    /// Cancels the loop and every spawned task
    cancel: CancellationToken,
}

impl<B, P> ChatRuntime<B, P>
where
    B: AssistantBackend + 'static,
    P: ConversationPointerStore + 'static,
{
    pub fn new(session: ChatSession, backend: B, pointers: P) -> (Self, RuntimeHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let cancel = CancellationToken::new();
        let handle = RuntimeHandle {
            input_tx: input_tx.clone(),
            cancel: cancel.clone(),
        };
        let runtime = Self {
            session,
            backend: Arc::new(backend),
            pointers: Arc::new(pointers),
            input_rx,
            input_tx,
            cancel,
        };
        (runtime, handle)
    }

    /// Run until shutdown; hands the session back for inspection
    pub async fn run(mut self) -> ChatSession {
        tracing::info!(app_id = %self.session.config().app_id, "Starting chat runtime");

        let tasks = self.session.start();
        self.execute_all(tasks).await;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some(input) = self.input_rx.recv() => {
                    let Some(tasks) = self.handle_input(input) else {
                        break;
                    };
                    self.execute_all(tasks).await;
                }

                else => break,
            }
        }

        self.cancel.cancel();
        tracing::info!("Chat runtime stopped");
        self.session
    }

    /// Tasks to run for this input; `None` stops the loop
    fn handle_input(&mut self, input: Input) -> Option<Vec<Task>> {
        let session = &mut self.session;
        let tasks = match input {
            Input::Send { submission, reply } => {
                let (tasks, verdict) = match session.send(submission) {
                    Ok(tasks) => (tasks, Ok(())),
                    Err(e) => (vec![], Err(e)),
                };
                if let Some(reply) = reply {
                    let _ = reply.send(verdict);
                }
                tasks
            }
            Input::SelectConversation(id) => session.select_conversation(&id),
            Input::NewConversation => session.new_conversation(),
            Input::DeleteConversation(id) => session.request_delete(&id),
            // Rejections are already surfaced as notifications.
            Input::Feedback { message_id, rating } => session
                .request_feedback(&message_id, rating)
                .unwrap_or_default(),
            Input::SetInputs(inputs) => {
                session.set_new_conversation_inputs(inputs);
                vec![]
            }
            Input::Shutdown => return None,

            Input::AppParametersLoaded(result) => session.app_parameters_loaded(result),
            Input::ConversationsLoaded {
                result,
                stored_id,
                initial,
            } => session.conversations_loaded(result, stored_id, initial),
            Input::Stream { seq, event } => session.apply_stream_event(seq, event),
            Input::HistoryLoaded { ticket, result } => session.history_loaded(ticket, result),
            Input::Renamed {
                conversation_id,
                name,
            } => {
                session.rename_completed(&conversation_id, name);
                vec![]
            }
            Input::Deleted {
                conversation_id,
                result,
            } => session.conversation_deleted(&conversation_id, result),
            Input::FeedbackSubmitted {
                message_id,
                rating,
                result,
            } => {
                session.feedback_submitted(&message_id, rating, result);
                vec![]
            }
        };
        Some(tasks)
    }

    async fn execute_all(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.execute(task).await;
        }
    }

    /// Persist writes are awaited in the loop so they land in the order the
    /// session issued them. Everything else runs in its own task.
    #[allow(clippy::too_many_lines)]
    async fn execute(&self, task: Task) {
        tracing::debug!(task = task.name(), "Executing task");
        let backend = self.backend.clone();
        let input_tx = self.input_tx.clone();
        let cancel = self.cancel.clone();

        match task {
            Task::LoadAppParameters => {
                tokio::spawn(async move {
                    let result = backend.app_parameters().await;
                    let _ = input_tx.send(Input::AppParametersLoaded(result)).await;
                });
            }

            Task::LoadConversations { limit, initial } => {
                let pointers = self.pointers.clone();
                let app_id = self.session.config().app_id.clone();
                tokio::spawn(async move {
                    let stored_id = if initial {
                        pointers.get_current(&app_id).await.unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "Failed to read current conversation");
                            None
                        })
                    } else {
                        None
                    };
                    let result = backend.conversations(limit).await;
                    let _ = input_tx
                        .send(Input::ConversationsLoaded {
                            result,
                            stored_id,
                            initial,
                        })
                        .await;
                });
            }

            Task::OpenStream { seq, request } => {
                tokio::spawn(async move {
                    let mut stream = match backend.open_stream(&request).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!(exchange = seq, error = %e, "Failed to open stream");
                            let error = match e.kind {
                                ClientErrorKind::Network => StreamError::transport(e.message),
                                _ => StreamError::server(e.message, None),
                            };
                            let _ = input_tx
                                .send(Input::Stream {
                                    seq,
                                    event: StreamEvent::Error(error),
                                })
                                .await;
                            return;
                        }
                    };

                    loop {
                        tokio::select! {
                            biased;

                            () = cancel.cancelled() => {
                                tracing::debug!(exchange = seq, "Stream dropped on shutdown");
                                break;
                            }

                            next = stream.next() => {
                                let Some(event) = next else { break };
                                let terminal = event.is_terminal();
                                if input_tx.send(Input::Stream { seq, event }).await.is_err() || terminal {
                                    break;
                                }
                            }
                        }
                    }
                });
            }

            Task::FetchHistory(plan) => {
                tokio::spawn(async move {
                    let result = backend.messages(&plan.conversation_id).await;
                    let _ = input_tx
                        .send(Input::HistoryLoaded {
                            ticket: plan.ticket,
                            result,
                        })
                        .await;
                });
            }

            Task::Rename {
                conversation_id,
                summary,
            } => {
                tokio::spawn(async move {
                    let name = generate_name(backend.as_ref(), &conversation_id, &summary).await;
                    let _ = input_tx
                        .send(Input::Renamed {
                            conversation_id,
                            name,
                        })
                        .await;
                });
            }

            Task::Delete { conversation_id } => {
                tokio::spawn(async move {
                    let result = backend.delete_conversation(&conversation_id).await;
                    let _ = input_tx
                        .send(Input::Deleted {
                            conversation_id,
                            result,
                        })
                        .await;
                });
            }

            Task::SubmitFeedback { message_id, rating } => {
                tokio::spawn(async move {
                    let result = backend.submit_feedback(&message_id, rating).await;
                    let _ = input_tx
                        .send(Input::FeedbackSubmitted {
                            message_id,
                            rating,
                            result,
                        })
                        .await;
                });
            }

            Task::PersistCurrent { conversation_id } => {
                let app_id = &self.session.config().app_id;
                if let Err(e) = self.pointers.set_current(app_id, &conversation_id).await {
                    tracing::warn!(conv_id = %conversation_id, error = %e, "Failed to persist current conversation");
                }
            }
        }
    }
}
