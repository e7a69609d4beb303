//! `backfill-agent` — single-turn text completion through the `claude` CLI.
//!
//! Speaks the `--output-format stream-json` protocol: the prompt goes in as
//! one user message on stdin, JSONL messages come back on stdout, and the
//! terminal `result` message carries the reply.
//!
//! ```text
//! CompletionOptions
//!     │
//!     ▼
//! AgentProcess    ← spawns `claude --print --output-format stream-json …`
//!     │
//!     ▼
//! MessageStream   ← futures::Stream<Item = Result<Message>>
//!     │
//!     ▼
//! complete()      ← bounded by a timeout, returns a Completion
//! ```

pub mod error;
pub mod runner;
pub mod stream;
pub mod types;

pub(crate) mod process;


pub use error::AgentError;
pub use runner::{complete, Completion};
pub use stream::MessageStream;
pub use types::{CompletionOptions, ContentBlock, Message, ResultMessage};

pub type Result<T> = std::result::Result<T, AgentError>;

/// Start a completion and stream its messages.
pub fn query(prompt: impl Into<String>, opts: CompletionOptions) -> MessageStream {
    MessageStream::new(prompt.into(), opts)
}
