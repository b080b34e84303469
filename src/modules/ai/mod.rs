pub mod model;
pub mod openai;
pub mod prompt;

use futures_util::stream::BoxStream;

use crate::api::error::SystemError;
use model::ChatTurn;

/// Text deltas of a streamed completion, in arrival order.
pub type TextStream = BoxStream<'static, Result<String, SystemError>>;

#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SystemError>;
}

#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, messages: Vec<ChatTurn>) -> Result<TextStream, SystemError>;
}
