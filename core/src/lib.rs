// Client side of the curriculum assistant's chat API:
// - Request/response data structures
// - Configuration loading
// - HTTP transport and streamed-answer decoding
// - Message list state for one chat surface

// Export types module - Request/response data structures
pub mod types;
pub use types::*;

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;

pub mod session;
pub use session::SessionId;

// Streamed answer decoding (`data: ` lines)
pub mod stream;
pub use stream::{parse_event_line, EventDecoder, LineDecoder};

pub mod conversation;
pub use conversation::{Conversation, ExchangeState, CONNECTION_ERROR_MESSAGE};

// Export transport module - Backend access
pub mod transport;
pub use transport::{ByteStream, ChatTransport, ChatTransportRef, HttpTransport};

pub mod widget;
pub use widget::{ChatWidget, SubmitOutcome};
