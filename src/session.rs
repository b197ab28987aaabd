//! Chat Session
//!
//! `ChatSession` is the only writer of the transcript, the registry and the
//! active exchange. Each operation is synchronous: it updates state,
//! publishes at most one transcript snapshot, and returns the I/O the runtime
//! should start. Results come back through the `*_loaded` / `*_submitted`
//! methods.

mod error;
mod task;

pub use error::{FeedbackError, Notification, NotificationLevel, SendError};
pub use task::{FetchPlan, Task};

use crate::client::{AppParameters, ChatRequest, ClientError, HistoryRecord, VisionSettings};
use crate::composer::Submission;
use crate::prompt::{missing_required, variables_from_form, PromptVariable};
use crate::reconcile::{self, Effect, ExchangeContext, Reconciled};
use crate::registry::{
    is_new_conversation, ConversationRegistry, ConversationSummary, Inputs, NEW_CONVERSATION_ID,
};
use crate::rename::{conversation_summary, RenameTrigger};
use crate::stream::{StreamError, StreamEvent};
use crate::switch::{
    by_position, opening_entries, plan_switch, rebuild_transcript, SwitchContext, SwitchPlan,
};
use crate::transcript::{
    Feedback, MessageEntry, Owner, Rating, TranscriptEdit, TranscriptSnapshot, TranscriptStore,
};
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub app_id: String,
    /// Text of the synthesized greeting entry
    pub greeting: String,
    pub new_conversation_name: String,
    pub conversation_limit: u32,
    pub rename_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            greeting: "Hello! How can I help you today?".to_string(),
            new_conversation_name: "New Chat".to_string(),
            conversation_limit: 100,
            rename_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStatus {
    Loading,
    Ready,
    /// Terminal: the app cannot be used
    Unavailable { reason: String },
}

/// Pushed to observers besides transcript snapshots
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Notification(Notification),
    ConversationsChanged {
        conversations: Vec<ConversationSummary>,
        current_id: Option<String>,
    },
    StatusChanged(AppStatus),
    RespondingChanged(bool),
    /// App parameters arrived
    PromptLoaded {
        variables: Vec<PromptVariable>,
        introduction: String,
    },
}

pub struct ChatSession {
    config: SessionConfig,
    store: TranscriptStore,
    registry: ConversationRegistry,
    status: AppStatus,
    initialized: bool,
    variables: Vec<PromptVariable>,
    vision: VisionSettings,
    /// Bumped on every change of the current conversation
    epoch: u64,
    next_seq: u64,
    next_ticket: u64,
    active: Option<ExchangeContext>,
    pending_fetch: Option<FetchPlan>,
    /// Conversation whose history fetch waits for the active exchange to end
    deferred_fetch: Option<String>,
    /// Conversation the transcript was last populated for
    showing: Option<String>,
    rename: RenameTrigger,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: ConversationRegistry::new(config.new_conversation_name.clone()),
            rename: RenameTrigger::new(config.rename_threshold),
            config,
            store: TranscriptStore::new(),
            status: AppStatus::Loading,
            initialized: false,
            variables: Vec::new(),
            vision: VisionSettings::default(),
            epoch: 0,
            next_seq: 0,
            next_ticket: 0,
            active: None,
            pending_fetch: None,
            deferred_fetch: None,
            showing: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptSnapshot> {
        self.store.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn transcript(&self) -> &TranscriptStore {
        &self.store
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn status(&self) -> &AppStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn is_responding(&self) -> bool {
        self.active.is_some()
    }

    /// Initial loads
    pub fn start(&mut self) -> Vec<Task> {
        if matches!(self.status, AppStatus::Unavailable { .. }) {
            return vec![];
        }
        vec![
            Task::LoadAppParameters,
            Task::LoadConversations {
                limit: self.config.conversation_limit,
                initial: true,
            },
        ]
    }

    pub fn mark_unavailable(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "App unavailable");
        self.initialized = false;
        self.set_status(AppStatus::Unavailable { reason });
    }

    pub fn app_parameters_loaded(&mut self, result: Result<AppParameters, ClientError>) -> Vec<Task> {
        let params = match result {
            Ok(params) => params,
            Err(e) => {
                self.notify(Notification::error(e.to_string()));
                self.mark_unavailable(e.to_string());
                return vec![];
            }
        };
        if matches!(self.status, AppStatus::Unavailable { .. }) {
            return vec![];
        }

        self.variables = variables_from_form(&params.user_input_form);
        self.vision = params.file_upload.image;
        self.registry
            .set_new_conversation_introduction(params.opening_statement);
        self.initialized = true;
        self.emit(SessionEvent::PromptLoaded {
            variables: self.variables.clone(),
            introduction: self.registry.new_conversation_introduction().to_string(),
        });
        self.set_status(AppStatus::Ready);
        tracing::info!(
            variables = self.variables.len(),
            vision = self.vision.enabled,
            "App parameters loaded"
        );

        // A switch may have been waiting for initialization.
        self.populate()
    }

    pub fn conversations_loaded(
        &mut self,
        result: Result<Vec<ConversationSummary>, ClientError>,
        stored_id: Option<String>,
        initial: bool,
    ) -> Vec<Task> {
        let fetched = match result {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversations");
                self.notify(Notification::error(e.to_string()));
                if !initial {
                    return vec![];
                }
                Vec::new()
            }
        };
        tracing::debug!(count = fetched.len(), initial, "Conversations loaded");
        self.registry.replace_committed(fetched);
        self.emit_conversations();

        if !initial || self.registry.current_id().is_some() {
            return vec![];
        }
        match stored_id.filter(|id| !is_new_conversation(id) && self.registry.contains(id)) {
            Some(id) => self.change_current(&id),
            None => self.new_conversation(),
        }
    }

    /// Switch to the "new conversation" placeholder, creating it if needed
    pub fn new_conversation(&mut self) -> Vec<Task> {
        if !self.registry.has_placeholder() {
            self.registry.ensure_placeholder();
            self.emit_conversations();
        }
        self.change_current(NEW_CONVERSATION_ID)
    }

    pub fn select_conversation(&mut self, conversation_id: &str) -> Vec<Task> {
        if is_new_conversation(conversation_id) {
            return self.new_conversation();
        }
        if !self.registry.contains(conversation_id) {
            self.notify(Notification::error(format!(
                "Conversation not found: {conversation_id}"
            )));
            return vec![];
        }
        self.change_current(conversation_id)
    }

    pub fn set_new_conversation_inputs(&mut self, inputs: Inputs) {
        self.registry.set_new_conversation_inputs(inputs);
        let only_opening = self.store.entries().iter().all(|e| e.opening_statement);
        if self.initialized
            && self.registry.is_new_conversation_current()
            && self.active.is_none()
            && only_opening
        {
            let entries = self.opening_for(NEW_CONVERSATION_ID);
            self.show(NEW_CONVERSATION_ID, entries);
        }
    }

    pub fn send(&mut self, submission: Submission) -> Result<Vec<Task>, SendError> {
        if let Some(active) = &self.active {
            tracing::info!(exchange = active.seq, "Send rejected, exchange in flight");
            return Err(self.ask_to_wait(SendError::Busy));
        }
        if !self.initialized {
            return Err(self.reject(SendError::NotReady));
        }
        let Some(conversation_id) = self.registry.current_id().map(str::to_string) else {
            return Err(self.reject(SendError::NotReady));
        };
        // The transcript still shows the previous conversation.
        if self
            .pending_fetch
            .as_ref()
            .is_some_and(|plan| plan.conversation_id == conversation_id)
        {
            tracing::info!(conv_id = %conversation_id, "Send rejected, history still loading");
            return Err(self.ask_to_wait(SendError::Loading));
        }
        if submission.query.trim().is_empty() {
            return Err(self.reject(SendError::EmptyMessage));
        }
        let is_new = is_new_conversation(&conversation_id);
        let (inputs, _) = self.registry.info_for(&conversation_id);
        if is_new {
            let missing = missing_required(&self.variables, &inputs);
            if !missing.is_empty() {
                let missing = missing.into_iter().map(str::to_string).collect();
                return Err(self.reject(SendError::MissingInputs(missing)));
            }
        }

        let mut files = submission.files;
        if !self.vision.enabled && !files.is_empty() {
            tracing::debug!(count = files.len(), "Image upload disabled, dropping attachments");
            files.clear();
        }
        if self.vision.number_limits > 0 {
            files.truncate(self.vision.number_limits as usize);
        }
        for file in &mut files {
            file.owner = Owner::User;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let question = MessageEntry::question(
            format!("question-{}", Uuid::new_v4()),
            submission.query.clone(),
        )
        .with_attachments(files.clone());
        let exchange = ExchangeContext::new(seq, self.epoch, conversation_id.clone(), question.clone());
        if self.showing.as_deref() == Some(conversation_id.as_str()) {
            self.store
                .apply(vec![TranscriptEdit::Append(vec![question, exchange.placeholder()])]);
        } else {
            // History never arrived; start from the opening entries instead of
            // appending under another conversation's messages.
            let mut entries = self.opening_for(&conversation_id);
            entries.extend([question, exchange.placeholder()]);
            self.show(&conversation_id, entries);
        }

        let request = ChatRequest {
            inputs,
            query: submission.query,
            conversation_id: (!is_new).then(|| conversation_id.clone()),
            files: Vec::new(),
        }
        .with_files(files);

        tracing::info!(exchange = seq, conv_id = %conversation_id, epoch = self.epoch, "Exchange started");
        self.active = Some(exchange);
        self.emit(SessionEvent::RespondingChanged(true));
        Ok(vec![Task::OpenStream { seq, request }])
    }

    /// Fold one decoded event into the active exchange
    pub fn apply_stream_event(&mut self, seq: u64, event: StreamEvent) -> Vec<Task> {
        let Some(exchange) = self.active.as_ref().filter(|e| e.seq == seq) else {
            tracing::debug!(exchange = seq, kind = event.kind(), "Event for inactive exchange");
            return vec![];
        };
        let owns = exchange.epoch == self.epoch;
        let Reconciled { exchange, effects } = match reconcile::apply(exchange, event) {
            Ok(reconciled) => reconciled,
            Err(e) => {
                tracing::warn!(exchange = seq, error = %e, "Dropping stream event");
                return vec![];
            }
        };

        let edits: Vec<TranscriptEdit> = effects.iter().filter_map(Effect::to_edit).collect();
        if owns {
            self.store.apply(edits);
        } else if !edits.is_empty() {
            tracing::debug!(exchange = seq, "Zombie exchange, transcript left alone");
        }

        let outcome = effects.into_iter().find_map(|effect| match effect {
            Effect::Complete {
                server_conversation_id,
            } => Some(Ok(server_conversation_id)),
            Effect::Fail { error } => Some(Err(error)),
            _ => None,
        });
        match outcome {
            Some(outcome) => self.finish_exchange(&exchange, owns, outcome),
            None => {
                self.active = Some(exchange);
                vec![]
            }
        }
    }

    pub fn history_loaded(
        &mut self,
        ticket: u64,
        result: Result<Vec<HistoryRecord>, ClientError>,
    ) -> Vec<Task> {
        if self.pending_fetch.as_ref().map(|p| p.ticket) != Some(ticket) {
            tracing::debug!(ticket, "Discarding superseded history result");
            return vec![];
        }
        let Some(plan) = self.pending_fetch.take() else {
            return vec![];
        };
        if plan.epoch != self.epoch || !self.registry.is_current(&plan.conversation_id) {
            tracing::debug!(conv_id = %plan.conversation_id, "Discarding stale history result");
            return vec![];
        }
        if self.active.as_ref().is_some_and(|e| e.epoch == self.epoch) {
            tracing::info!(conv_id = %plan.conversation_id, "Exchange started during fetch, deferring");
            self.deferred_fetch = Some(plan.conversation_id);
            return vec![];
        }

        match result {
            Ok(records) => {
                tracing::debug!(conv_id = %plan.conversation_id, records = records.len(), "History loaded");
                let opening = opening_entries(
                    &self.config.greeting,
                    &plan.introduction,
                    &self.variables,
                    &plan.inputs,
                );
                let entries = rebuild_transcript(opening, records, by_position);
                self.show(&plan.conversation_id, entries);
            }
            Err(e) => {
                tracing::warn!(conv_id = %plan.conversation_id, error = %e, "Failed to load history");
                self.notify(Notification::error(e.to_string()));
            }
        }
        vec![]
    }

    pub fn rename_completed(&mut self, conversation_id: &str, name: Option<String>) {
        let Some(name) = name else {
            return;
        };
        if self.registry.rename(conversation_id, name.as_str()) {
            tracing::info!(conv_id = %conversation_id, %name, "Conversation renamed");
            self.emit_conversations();
        }
    }

    pub fn request_delete(&mut self, conversation_id: &str) -> Vec<Task> {
        if !self.registry.contains(conversation_id) {
            self.notify(Notification::error(format!(
                "Conversation not found: {conversation_id}"
            )));
            return vec![];
        }
        // The placeholder only exists locally.
        if is_new_conversation(conversation_id) {
            return self.conversation_deleted(conversation_id, Ok(()));
        }
        vec![Task::Delete {
            conversation_id: conversation_id.to_string(),
        }]
    }

    pub fn conversation_deleted(
        &mut self,
        conversation_id: &str,
        result: Result<(), ClientError>,
    ) -> Vec<Task> {
        if let Err(e) = result {
            tracing::warn!(conv_id = %conversation_id, error = %e, "Failed to delete conversation");
            self.notify(Notification::error(format!(
                "Failed to delete conversation: {e}"
            )));
            return vec![];
        }
        let was_current = self.registry.is_current(conversation_id);
        let Some(index) = self.registry.remove(conversation_id) else {
            return vec![];
        };
        tracing::info!(conv_id = %conversation_id, was_current, "Conversation deleted");
        if self.registry.committed().next().is_none() {
            self.registry.ensure_placeholder();
        }
        self.emit_conversations();
        if !is_new_conversation(conversation_id) {
            self.notify(Notification::success("Conversation deleted"));
        }
        if !was_current {
            return vec![];
        }

        let conversations = self.registry.conversations();
        let next = index
            .checked_sub(1)
            .and_then(|i| conversations.get(i))
            .or_else(|| conversations.first())
            .map(|c| c.id.clone());
        match next {
            Some(next) => self.change_current(&next),
            None => self.new_conversation(),
        }
    }

    pub fn request_feedback(
        &mut self,
        message_id: &str,
        rating: Option<Rating>,
    ) -> Result<Vec<Task>, FeedbackError> {
        let id = message_id.to_string();
        let Some(entry) = self.store.get(message_id) else {
            return Err(self.reject(FeedbackError::UnknownMessage(id)));
        };
        if entry.opening_statement {
            return Err(self.reject(FeedbackError::OpeningStatement(id)));
        }
        if !entry.is_answer() {
            return Err(self.reject(FeedbackError::NotAnAnswer(id)));
        }
        if self
            .active
            .as_ref()
            .is_some_and(|e| e.answer.id == message_id || e.placeholder_id == message_id)
        {
            return Err(self.reject(FeedbackError::Streaming(id)));
        }
        Ok(vec![Task::SubmitFeedback {
            message_id: id,
            rating,
        }])
    }

    pub fn feedback_submitted(
        &mut self,
        message_id: &str,
        rating: Option<Rating>,
        result: Result<(), ClientError>,
    ) {
        match result {
            Ok(()) => {
                self.store.apply(vec![TranscriptEdit::SetFeedback {
                    id: message_id.to_string(),
                    feedback: Feedback { rating },
                }]);
                self.notify(Notification::success("Feedback submitted"));
            }
            Err(e) => {
                tracing::warn!(message_id, error = %e, "Failed to submit feedback");
                self.notify(Notification::error(e.to_string()));
            }
        }
    }

    fn change_current(&mut self, conversation_id: &str) -> Vec<Task> {
        if !self.registry.set_current(conversation_id) {
            return vec![];
        }
        self.epoch += 1;
        self.rename.reset();
        self.deferred_fetch = None;
        self.emit_conversations();
        if let Some(active) = &self.active {
            tracing::info!(
                exchange = active.seq,
                conv_id = %conversation_id,
                epoch = self.epoch,
                "Switched away from streaming exchange"
            );
        }

        let mut tasks = Vec::new();
        if !is_new_conversation(conversation_id) {
            tasks.push(Task::PersistCurrent {
                conversation_id: conversation_id.to_string(),
            });
        }
        tasks.extend(self.populate());
        tasks
    }

    /// Fill the transcript for the current conversation
    fn populate(&mut self) -> Vec<Task> {
        let Some(target) = self.registry.current_id().map(str::to_string) else {
            return vec![];
        };
        let live = self.active.as_ref().map(|e| e.conversation_id().to_string());
        let plan = plan_switch(SwitchContext {
            initialized: self.initialized,
            target_id: &target,
            live_exchange_conversation: live.as_deref(),
            pending_fetch: self
                .pending_fetch
                .as_ref()
                .map(|p| p.conversation_id.as_str()),
        });
        tracing::debug!(conv_id = %target, ?plan, epoch = self.epoch, "Populating transcript");

        match plan {
            SwitchPlan::NotReady => vec![],
            SwitchPlan::Opening => {
                self.pending_fetch = None;
                let entries = self.opening_for(&target);
                self.show(&target, entries);
                vec![]
            }
            SwitchPlan::Fetch => vec![self.start_fetch(target)],
            SwitchPlan::AlreadyPending => {
                if let Some(pending) = self.pending_fetch.as_mut() {
                    pending.epoch = self.epoch;
                }
                vec![]
            }
            SwitchPlan::Defer => {
                tracing::info!(conv_id = %target, "Exchange still streaming into conversation, deferring fetch");
                self.pending_fetch = None;
                let entries = self.opening_for(&target);
                self.show(&target, entries);
                self.deferred_fetch = Some(target);
                vec![]
            }
        }
    }

    fn show(&mut self, conversation_id: &str, entries: Vec<MessageEntry>) {
        self.showing = Some(conversation_id.to_string());
        self.store.reset(entries);
    }

    fn start_fetch(&mut self, conversation_id: String) -> Task {
        self.next_ticket += 1;
        let (inputs, introduction) = self.registry.info_for(&conversation_id);
        let plan = FetchPlan {
            ticket: self.next_ticket,
            conversation_id,
            epoch: self.epoch,
            introduction,
            inputs,
        };
        self.pending_fetch = Some(plan.clone());
        Task::FetchHistory(plan)
    }

    fn opening_for(&self, conversation_id: &str) -> Vec<MessageEntry> {
        let (inputs, introduction) = self.registry.info_for(conversation_id);
        opening_entries(&self.config.greeting, &introduction, &self.variables, &inputs)
    }

    fn finish_exchange(
        &mut self,
        exchange: &ExchangeContext,
        owns: bool,
        outcome: Result<Option<String>, StreamError>,
    ) -> Vec<Task> {
        self.active = None;
        self.emit(SessionEvent::RespondingChanged(false));
        let mut tasks = Vec::new();

        match outcome {
            Ok(server_conversation_id) => {
                let conversation_id = exchange.conversation_id().to_string();
                tracing::info!(
                    exchange = exchange.seq,
                    conv_id = %conversation_id,
                    zombie = !owns,
                    "Exchange completed"
                );
                if is_new_conversation(&exchange.owner_conversation_id) {
                    tasks.extend(self.commit_new_conversation(server_conversation_id.as_deref(), owns));
                }
                if owns && !is_new_conversation(&conversation_id) {
                    tasks.push(Task::PersistCurrent {
                        conversation_id: conversation_id.clone(),
                    });
                    if self.rename.record_completion() {
                        let summary = conversation_summary(
                            self.store.entries(),
                            self.rename.threshold() as usize,
                        );
                        tasks.push(Task::Rename {
                            conversation_id,
                            summary,
                        });
                    }
                }
            }
            Err(error) => {
                tracing::warn!(exchange = exchange.seq, error = %error, zombie = !owns, "Exchange failed");
                self.notify(Notification::error(error.message));
            }
        }

        if let Some(id) = self.deferred_fetch.take() {
            if self.registry.is_current(&id) {
                tasks.push(self.start_fetch(id));
            }
        }
        tasks
    }

    fn commit_new_conversation(&mut self, server_id: Option<&str>, owns: bool) -> Vec<Task> {
        let Some(server_id) = server_id else {
            tracing::warn!("New conversation completed without a conversation id");
            return vec![];
        };
        if !owns && self.registry.is_new_conversation_current() {
            // The user is composing a fresh conversation in the placeholder;
            // the refresh lists the committed one.
            tracing::debug!(conv_id = %server_id, "Keeping placeholder for the current new conversation");
        } else if self.registry.promote_placeholder(server_id) {
            tracing::info!(conv_id = %server_id, "New conversation committed");
            if owns {
                self.showing = Some(server_id.to_string());
            }
            self.registry.set_new_conversation_inputs(Inputs::new());
            self.emit_conversations();
        }
        vec![Task::LoadConversations {
            limit: self.config.conversation_limit,
            initial: false,
        }]
    }

    fn reject<E: std::fmt::Display>(&self, error: E) -> E {
        self.notify(Notification::error(error.to_string()));
        error
    }

    /// Rejections the user resolves by waiting are informational
    fn ask_to_wait(&self, error: SendError) -> SendError {
        self.notify(Notification::info(error.to_string()));
        error
    }

    fn notify(&self, notification: Notification) {
        let _ = self.events.send(SessionEvent::Notification(notification));
    }

    fn emit_conversations(&self) {
        self.emit(SessionEvent::ConversationsChanged {
            conversations: self.registry.conversations().to_vec(),
            current_id: self.registry.current_id().map(str::to_string),
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&mut self, status: AppStatus) {
        if self.status != status {
            self.status = status.clone();
            self.emit(SessionEvent::StatusChanged(status));
        }
    }
}
