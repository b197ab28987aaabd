//! Runtime for a chat session
//!
//! One loop owns the [`ChatSession`](crate::session::ChatSession) and drains
//! a single input queue. User commands and I/O results both arrive there, so
//! every session mutation happens on one logical thread. I/O runs in spawned
//! tasks that report back through the same queue.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ChatRuntime;
pub use traits::*;

use crate::client::{AppParameters, ClientError, HistoryRecord};
use crate::composer::Submission;
use crate::registry::{ConversationSummary, Inputs};
use crate::session::SendError;
use crate::stream::StreamEvent;
use crate::transcript::Rating;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Everything the runtime loop reacts to
#[derive(Debug)]
pub enum Input {
    Send {
        submission: Submission,
        /// Told whether the session accepted the submission
        reply: Option<oneshot::Sender<Result<(), SendError>>>,
    },
    SelectConversation(String),
    NewConversation,
    DeleteConversation(String),
    Feedback {
        message_id: String,
        rating: Option<Rating>,
    },
    SetInputs(Inputs),
    Shutdown,

    AppParametersLoaded(Result<AppParameters, ClientError>),
    ConversationsLoaded {
        result: Result<Vec<ConversationSummary>, ClientError>,
        stored_id: Option<String>,
        initial: bool,
    },
    Stream {
        seq: u64,
        event: StreamEvent,
    },
    HistoryLoaded {
        ticket: u64,
        result: Result<Vec<HistoryRecord>, ClientError>,
    },
    Renamed {
        conversation_id: String,
        name: Option<String>,
    },
    Deleted {
        conversation_id: String,
        result: Result<(), ClientError>,
    },
    FeedbackSubmitted {
        message_id: String,
        rating: Option<Rating>,
        result: Result<(), ClientError>,
    },
}

/// Front-end side of a running [`ChatRuntime`]
#[derive(Clone)]
pub struct RuntimeHandle {
    input_tx: mpsc::Sender<Input>,
    cancel: CancellationToken,
}

impl RuntimeHandle {
    /// Queue an input; false once the runtime has stopped
    pub async fn send(&self, input: Input) -> bool {
        self.input_tx.send(input).await.is_ok()
    }

    /// Submit a message and wait for the session's verdict
    pub async fn submit(&self, submission: Submission) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        let input = Input::Send {
            submission,
            reply: Some(reply),
        };
        if !self.send(input).await {
            return Err(SendError::NotReady);
        }
        rx.await.unwrap_or(Err(SendError::NotReady))
    }

    /// Stop the loop and every stream it started
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
