//! Client side of a DocIQ conversation.
//!
//! [`ChatSession`] owns the transcript and runs one streaming turn at a time
//! against a [`ChatTransport`]; the presentation layer only reads snapshots.

pub mod message;
pub mod samples;
mod session;
mod transport;

pub use message::{
    Message, MessageId, MessageStatus, StreamState, StreamTransition, StreamTransitionRejection,
    Transcript, TurnId,
};
pub use samples::{DocumentStats, SAMPLE_DOCS, STARTER_QUESTIONS, SampleDoc, find_sample};
pub use session::{APOLOGY_MESSAGE, ChatSession, LoadedDocument, SubmitOutcome};
pub use transport::{
    CHAT_PATH, ChatTransport, DEFAULT_GATEWAY_URL, HttpChatTransport, ReplyStream,
    TransportError, TransportResult,
};
