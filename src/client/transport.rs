use bytes::Bytes;
use futures_util::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::model::MessagesPage;

pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Response stream interrupted: {0}")]
    Stream(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// The two calls the chat view makes against the API.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Posts a question; the body is the answer as it is generated.
    async fn send_message(&self, file_id: Uuid, message: &str) -> Result<ByteStream, ClientError>;

    async fn fetch_messages(
        &self,
        file_id: Uuid,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<MessagesPage, ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    file_id: Uuid,
    message: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Clone)]
pub struct HttpChatTransport {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status: status.as_u16(), message })
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send_message(&self, file_id: Uuid, message: &str) -> Result<ByteStream, ClientError> {
        let response = self
            .authorize(self.http.post(self.url("/message")))
            .json(&SendMessageBody { file_id, message })
            .send()
            .await?;

        let body = Self::check(response)
            .await?
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Stream(e.to_string())));

        Ok(body.boxed())
    }

    async fn fetch_messages(
        &self,
        file_id: Uuid,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<MessagesPage, ClientError> {
        let mut request = self
            .authorize(self.http.get(self.url(&format!("/files/{file_id}/messages"))))
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let envelope: Envelope<MessagesPage> = Self::check(request.send().await?).await?.json().await?;

        envelope.data.ok_or_else(|| ClientError::Decode("missing message page".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_api_prefix() {
        let transport = HttpChatTransport::new("http://localhost:8080/");
        assert_eq!(transport.url("/message"), "http://localhost:8080/api/message");
    }

    #[test]
    fn test_send_body_is_camel_case() {
        let id = Uuid::nil();
        let body = serde_json::to_value(SendMessageBody { file_id: id, message: "hi" }).unwrap();
        assert_eq!(body, serde_json::json!({ "fileId": id, "message": "hi" }));
    }
}
