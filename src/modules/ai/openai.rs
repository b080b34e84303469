use futures_util::{stream, StreamExt};
use std::collections::VecDeque;

use crate::{
    api::error::SystemError,
    modules::ai::{
        model::{ChatTurn, CompletionChunk, CompletionRequest, EmbeddingRequest, EmbeddingResponse},
        ChatModel, Embedder, TextStream,
    },
    utils::ensure_success,
};

/// Client for an OpenAI-compatible `/chat/completions` and `/embeddings` API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.post(format!("{}{}", self.base_url, path));
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SystemError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .post("/embeddings")
            .json(&EmbeddingRequest { model: &self.embedding_model, input: inputs })
            .send()
            .await?;
        let mut body: EmbeddingResponse = ensure_success(resp).await?.json().await?;

        if body.data.len() != inputs.len() {
            return Err(SystemError::Upstream {
                status: 502,
                message: format!(
                    "expected {} embeddings, received {}",
                    inputs.len(),
                    body.data.len()
                ),
            });
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiClient {
    async fn stream_chat(&self, messages: Vec<ChatTurn>) -> Result<TextStream, SystemError> {
        let resp = self
            .post("/chat/completions")
            .json(&CompletionRequest {
                model: &self.chat_model,
                messages,
                temperature: 0.0,
                stream: true,
            })
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let state = (resp.bytes_stream().boxed(), SseDeltaParser::default(), VecDeque::new());
        let deltas = stream::unfold(state, |(mut bytes, mut parser, mut pending)| async move {
            loop {
                if let Some(delta) = pending.pop_front() {
                    return Some((Ok(delta), (bytes, parser, pending)));
                }
                if parser.is_done() {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => match parser.push(&chunk) {
                        Ok(found) => pending.extend(found),
                        Err(e) => {
                            parser.finish();
                            return Some((Err(e), (bytes, parser, pending)));
                        }
                    },
                    Some(Err(e)) => {
                        parser.finish();
                        return Some((Err(e.into()), (bytes, parser, pending)));
                    }
                    None => return None,
                }
            }
        });

        Ok(deltas.boxed())
    }
}

/// Incremental parser for the `data:` lines of a streamed completion.
#[derive(Default)]
pub(crate) struct SseDeltaParser {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDeltaParser {
    /// Feeds raw bytes and returns the text deltas of every line completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, SystemError> {
        self.buffer.extend_from_slice(chunk);
        let mut deltas = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }

            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                continue;
            }

            let chunk: CompletionChunk = serde_json::from_str(data)?;
            deltas.extend(
                chunk.choices.into_iter().filter_map(|c| c.delta.content).filter(|c| !c.is_empty()),
            );
        }

        Ok(deltas)
    }

    pub fn finish(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
