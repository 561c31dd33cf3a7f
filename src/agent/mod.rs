//! C11 — ReAct Agent.

pub mod compaction;
pub mod message;
pub mod react;
pub mod transport;

pub use message::{ContentBlock, Message, ToolResultBlock};
pub use react::{ReactAgent, RunOutcome};
pub use transport::{LlmTransport, LlmResponse, OllamaTransport, ToolSpec};
