//! Model backend plumbing for DocIQ.
//!
//! Holds the wire types shared by the gateway and its clients, the event-stream
//! delta decoder, and the backend seam with its Anthropic implementation.

mod anthropic;
mod delta;
mod message;
mod provider;
mod utf8;

pub use anthropic::{
    ANTHROPIC_BACKEND_ID, AnthropicBackend, AnthropicConfig, DEFAULT_API_BASE, DEFAULT_API_VERSION,
    DEFAULT_MODEL,
};
pub use delta::{
    DATA_PREFIX, DONE_SENTINEL, DeltaDecoder, StreamDelta, StreamEvent, decode_deltas,
    parse_data_line,
};
pub use message::{ChatMessage, ChatRequest, Role};
pub use provider::{
    BackendError, BackendResult, BoxFuture, ByteStream, CompletionBackend, CompletionRequest,
    UpstreamResponse,
};
pub use utf8::Utf8StreamDecoder;
