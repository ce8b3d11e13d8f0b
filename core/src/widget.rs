use std::cell::RefCell;
use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::conversation::{Conversation, ExchangeState};
use crate::errors::{ChatError, ChatResult};
use crate::session::SessionId;
use crate::stream::EventDecoder;
use crate::transport::ChatTransportRef;
use crate::types::{ChatPayload, Message, PayloadFormat, StreamEvent};

/// What happened to a submitted question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Input was empty or whitespace; nothing appended, nothing sent
    Blank,
    /// Another question is still outstanding; nothing appended, nothing sent
    Busy,
    /// The exchange ran to a terminal state (`Done` or `Error`)
    Completed(ExchangeState),
}

/// One chat surface: a session, its message list and a backend.
///
/// All state sits behind `RefCell`s so a widget can be shared by reference
/// on a single-threaded executor. Borrows are never held across an
/// `.await`, and the loading state of the conversation keeps a second
/// submit from dispatching while one is in flight.
#[derive(Debug)]
pub struct ChatWidget {
    transport: ChatTransportRef,
    session_id: SessionId,
    conversation: RefCell<Conversation>,
    context: RefCell<Option<String>>,
    streaming: bool,
    payload_format: PayloadFormat,
    timeout: Duration,
}

impl ChatWidget {
    pub fn new(transport: ChatTransportRef, config: &ChatConfig) -> Self {
        let session_id = SessionId::from_option(config.session_id.clone());
        info!("Chat session: {}", session_id);
        Self {
            transport,
            session_id,
            conversation: RefCell::new(Conversation::new()),
            context: RefCell::new(None),
            streaming: config.streaming(),
            payload_format: config.payload_format(),
            timeout: config.timeout(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_loading(&self) -> bool {
        self.conversation.borrow().is_loading()
    }

    pub fn state(&self) -> ExchangeState {
        self.conversation.borrow().state()
    }

    pub fn len(&self) -> usize {
        self.conversation.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversation.borrow().is_empty()
    }

    /// Snapshot of the message list from index `start` on
    pub fn messages_from(&self, start: usize) -> Vec<Message> {
        self.conversation
            .borrow()
            .messages()
            .iter()
            .skip(start)
            .cloned()
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages_from(0)
    }

    /// Selected text to ground the next question in. Consumed by the next
    /// dispatched question.
    pub fn set_context(&self, context: Option<String>) {
        *self.context.borrow_mut() = context.filter(|c| !c.trim().is_empty());
    }

    pub fn context(&self) -> Option<String> {
        self.context.borrow().clone()
    }

    /// Clears the local message list. Refused while a question is in flight.
    pub fn clear(&self) -> bool {
        self.conversation.borrow_mut().clear()
    }

    /// Sends `input` to the backend and records the exchange.
    ///
    /// Failures never escape: they end up as an error message in the list
    /// and an `ExchangeState::Error` outcome.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        self.submit_with_progress(input, &mut |_| {}).await
    }

    /// Like [`ChatWidget::submit`], but calls `progress` with a snapshot of
    /// the streamed placeholder when it is created and after every event
    /// that changes it. Never called for single JSON answers.
    pub async fn submit_with_progress(
        &self,
        input: &str,
        progress: &mut dyn FnMut(&Message),
    ) -> SubmitOutcome {
        let text = {
            let mut conversation = self.conversation.borrow_mut();
            if conversation.is_loading() {
                debug!("Submit ignored: request outstanding");
                return SubmitOutcome::Busy;
            }
            match conversation.begin_exchange(input) {
                Some(text) => text,
                None => return SubmitOutcome::Blank,
            }
        };

        let context = self.context.borrow_mut().take();
        let payload = ChatPayload::build(
            self.payload_format,
            self.streaming,
            self.session_id.as_str(),
            &text,
            context.as_deref(),
        );
        debug!("Dispatching: {}", payload.message());

        let state = if self.streaming {
            self.run_streaming(&payload, progress).await
        } else {
            self.run_request(&payload).await
        };
        SubmitOutcome::Completed(state)
    }

    async fn run_request(&self, payload: &ChatPayload) -> ExchangeState {
        self.conversation.borrow_mut().await_response();

        let result = self.bounded(self.transport.send(payload)).await;

        let mut conversation = self.conversation.borrow_mut();
        match result {
            Ok(response) => {
                debug!("Received response with {} sources", response.sources.len());
                conversation.complete_with_response(response);
            }
            Err(e) => {
                error!("Error sending message: {}", e);
                conversation.fail(&e.display_for_chat());
            }
        }
        conversation.state()
    }

    async fn run_streaming(
        &self,
        payload: &ChatPayload,
        progress: &mut dyn FnMut(&Message),
    ) -> ExchangeState {
        match self.bounded(self.consume_stream(payload, progress)).await {
            Ok(()) => self.conversation.borrow_mut().finish_stream(),
            Err(e) if e.is_timeout() => {
                warn!("Chat stream timed out after {:?}", self.timeout);
                self.conversation.borrow_mut().fail_connection();
            }
            Err(e) => {
                error!("Error sending message: {}", e);
                self.conversation.borrow_mut().fail_connection();
            }
        }
        self.conversation.borrow().state()
    }

    async fn consume_stream(
        &self,
        payload: &ChatPayload,
        progress: &mut dyn FnMut(&Message),
    ) -> ChatResult<()> {
        let mut body = self.transport.open_stream(payload).await?;
        self.conversation.borrow_mut().start_stream();
        self.report_progress(progress);

        let mut decoder = EventDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                self.apply_and_report(&event, progress);
            }
        }
        if let Some(event) = decoder.finish() {
            self.apply_and_report(&event, progress);
        }

        if decoder.skipped() > 0 {
            debug!("Skipped {} malformed stream lines", decoder.skipped());
        }
        Ok(())
    }

    fn apply_and_report(&self, event: &StreamEvent, progress: &mut dyn FnMut(&Message)) {
        let changed = self.conversation.borrow_mut().apply_event(event);
        if changed {
            self.report_progress(progress);
        }
    }

    /// Hands a copy of the placeholder to `progress`; the borrow is released
    /// before the callback runs.
    fn report_progress(&self, progress: &mut dyn FnMut(&Message)) {
        let snapshot = self.conversation.borrow().in_progress_message().cloned();
        if let Some(message) = snapshot {
            progress(&message);
        }
    }

    /// Runs `fut` under the configured timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = ChatResult<T>>) -> ChatResult<T> {
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout(self.timeout)),
        }
    }

    /// Messages the backend has stored for this session.
    pub async fn history(&self) -> ChatResult<Vec<Message>> {
        let history = self
            .bounded(self.transport.fetch_history(self.session_id.as_str()))
            .await?;
        Ok(history.messages.iter().map(|entry| entry.to_message()).collect())
    }

    /// Ends this session on the backend; returns the backend's status message.
    pub async fn end_session(&self) -> ChatResult<String> {
        let response = self
            .bounded(self.transport.delete_session(self.session_id.as_str()))
            .await?;
        info!("Session {} ended: {}", self.session_id, response.status);
        Ok(response.message)
    }
}
