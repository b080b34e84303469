//! Typed access to the chat API for Rust front ends.

pub mod context;
pub mod decode;
pub mod model;
pub mod transport;

pub use context::{ChatContext, ChatState, SendOutcome};
pub use model::{ChatMessage, InfiniteMessages, MessagesPage};
pub use transport::{ChatTransport, ClientError, HttpChatTransport};
