use chrono::Utc;
use tracing::{debug, warn};

use crate::types::{ChatResponse, Message, MessageId, Role, StreamEvent};

/// Shown when the request could not be completed at the transport level
pub const CONNECTION_ERROR_MESSAGE: &str =
    "Error connecting to the chatbot server. Is it running?";

/// Progress of the current question/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    Sending,
    AwaitingResponse,
    Streaming,
    ReceivingTokens,
    Done,
    Error,
}

impl ExchangeState {
    /// True while a request is outstanding
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            ExchangeState::Sending
                | ExchangeState::AwaitingResponse
                | ExchangeState::Streaming
                | ExchangeState::ReceivingTokens
        )
    }
}

/// Ordered message list plus the state of the exchange in flight.
///
/// Messages are only ever appended, with one exception: while a stream is
/// open, the placeholder assistant message it created is rewritten by each
/// event. Once the stream ends (or fails) the placeholder is sealed.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    state: ExchangeState,
    in_progress: Option<MessageId>,
    next_id: MessageId,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Id of the placeholder currently being filled by a stream
    pub fn in_progress(&self) -> Option<MessageId> {
        self.in_progress
    }

    /// The placeholder the open stream is writing into, if any
    pub fn in_progress_message(&self) -> Option<&Message> {
        let id = self.in_progress?;
        self.messages.iter().rev().find(|m| m.id == Some(id))
    }

    /// Drops all messages. Ignored while an exchange is in flight.
    pub fn clear(&mut self) -> bool {
        if self.is_loading() {
            return false;
        }
        self.messages.clear();
        self.state = ExchangeState::Idle;
        true
    }

    /// Starts an exchange for `input`.
    ///
    /// Returns the trimmed text to send, or `None` when the input is blank or
    /// another exchange is still in flight. On success the user message is
    /// already in the list.
    pub fn begin_exchange(&mut self, input: &str) -> Option<String> {
        let text = input.trim();
        if text.is_empty() {
            debug!("Ignoring blank input");
            return None;
        }
        if self.is_loading() {
            debug!("Ignoring input while a request is outstanding");
            return None;
        }

        self.messages.push(Message::user(text));
        self.state = ExchangeState::Sending;
        Some(text.to_string())
    }

    pub fn await_response(&mut self) {
        self.state = ExchangeState::AwaitingResponse;
    }

    /// Appends the answer of a non-streamed exchange.
    pub fn complete_with_response(&mut self, response: ChatResponse) {
        self.messages
            .push(Message::assistant(response.response, response.sources));
        self.state = ExchangeState::Done;
    }

    /// Appends an error message (`Error: <description>`) and ends the
    /// exchange.
    pub fn fail(&mut self, description: &str) {
        self.seal();
        self.messages
            .push(Message::error(format!("Error: {}", description)));
        self.state = ExchangeState::Error;
    }

    /// Ends a streamed exchange that broke at the transport level: an empty
    /// placeholder is removed, then exactly one connection error is appended.
    pub fn fail_connection(&mut self) {
        if let Some(id) = self.in_progress.take() {
            self.messages
                .retain(|m| !(m.id == Some(id) && m.is_empty_placeholder()));
        }
        self.messages.push(Message::error(CONNECTION_ERROR_MESSAGE));
        self.state = ExchangeState::Error;
    }

    /// Appends the empty assistant message that streamed events will fill.
    pub fn start_stream(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message::placeholder(id));
        self.in_progress = Some(id);
        self.state = ExchangeState::Streaming;
        id
    }

    /// Folds one streamed event into the placeholder.
    ///
    /// Every event replaces the placeholder content; an `error` event also
    /// turns the placeholder into an error message in place. Returns whether
    /// the list changed.
    pub fn apply_event(&mut self, event: &StreamEvent) -> bool {
        let Some(id) = self.in_progress else {
            warn!("Stream event received with no message in progress");
            return false;
        };
        let Some(message) = self.messages.iter_mut().find(|m| m.id == Some(id)) else {
            warn!("In-progress message {} is missing", id);
            return false;
        };

        match event {
            StreamEvent::AssistantResponse { content } => {
                message.content = content.clone();
                if self.state == ExchangeState::Streaming {
                    self.state = ExchangeState::ReceivingTokens;
                }
            }
            StreamEvent::Error { content } => {
                warn!("Backend error: {}", content);
                message.content = format!("Error: {}", content);
                message.role = Role::Error;
                self.state = ExchangeState::ReceivingTokens;
            }
            StreamEvent::Unknown => return false,
        }
        message.timestamp = Utc::now();
        true
    }

    /// Seals the placeholder once the body has been read to the end.
    pub fn finish_stream(&mut self) {
        let errored = self
            .in_progress
            .and_then(|id| self.messages.iter().find(|m| m.id == Some(id)))
            .is_some_and(|m| m.role == Role::Error);
        self.seal();
        self.state = if errored {
            ExchangeState::Error
        } else {
            ExchangeState::Done
        };
    }

    fn seal(&mut self) {
        if let Some(id) = self.in_progress.take() {
            debug!("Sealed message {}", id);
        }
    }
}
