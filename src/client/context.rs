use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

use crate::client::{
    decode::Utf8Accumulator,
    model::{ChatMessage, InfiniteMessages},
    transport::{ChatTransport, ClientError},
};
use crate::constants::INFINITE_QUERY_LIMIT;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub input: String,
    pub is_loading: bool,
    pub messages: InfiniteMessages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was blank; nothing was sent.
    Skipped,
    Sent,
}

/// Chat state of one file, updated optimistically while answers stream in.
///
/// Every list fetch records the fetch generation it started under and is
/// dropped when the generation moved on before it returned, so a send
/// always wins over a refresh that was already in flight.
pub struct ChatContext<T: ChatTransport> {
    file_id: Uuid,
    transport: T,
    page_size: usize,
    state: watch::Sender<ChatState>,
    fetch_generation: AtomicU64,
}

impl<T: ChatTransport> ChatContext<T> {
    pub fn new(transport: T, file_id: Uuid) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            file_id,
            transport,
            page_size: INFINITE_QUERY_LIMIT,
            state,
            fetch_generation: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn handle_input_change(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|s| s.input = text);
    }

    pub fn cancel_fetches(&self) {
        self.fetch_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Replaces the list with the server's first page.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let generation = self.fetch_generation.load(Ordering::SeqCst);
        let page = self.transport.fetch_messages(self.file_id, None, self.page_size).await?;

        if self.fetch_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Discarding cancelled refresh of file {}", self.file_id);
            return Ok(());
        }

        self.state.send_modify(|s| s.messages = InfiniteMessages::single(page));
        Ok(())
    }

    /// Appends the next older page. Returns false when there is none or the fetch was cancelled.
    pub async fn load_more(&self) -> Result<bool, ClientError> {
        let cursor = match self.state.borrow().messages.next_cursor() {
            Some(cursor) => cursor.to_string(),
            None => return Ok(false),
        };

        let generation = self.fetch_generation.load(Ordering::SeqCst);
        let page =
            self.transport.fetch_messages(self.file_id, Some(&cursor), self.page_size).await?;

        if self.fetch_generation.load(Ordering::SeqCst) != generation {
            return Ok(false);
        }

        self.state.send_modify(|s| s.messages.pages.push(page));
        Ok(true)
    }

    /// Sends the current input and streams the answer into the list.
    ///
    /// On failure the list and input are restored to what they were before
    /// the send and the error is returned. Either way the list is refreshed
    /// from the server afterwards.
    pub async fn add_message(&self) -> Result<SendOutcome, ClientError> {
        let message = self.state.borrow().input.clone();
        if message.trim().is_empty() {
            return Ok(SendOutcome::Skipped);
        }

        self.cancel_fetches();

        let mut snapshot = InfiniteMessages::default();
        self.state.send_modify(|s| {
            s.input.clear();
            snapshot = s.messages.clone();
            s.messages.prepend(ChatMessage::optimistic(message.clone()));
            s.is_loading = true;
        });

        let result = self.stream_answer(&message).await;

        if let Err(e) = &result {
            tracing::warn!("Sending message on file {} failed: {}", self.file_id, e);
            self.state.send_modify(|s| {
                s.messages = snapshot;
                s.input = message;
            });
        }

        self.state.send_modify(|s| s.is_loading = false);
        if let Err(e) = self.refresh().await {
            tracing::warn!("Refreshing messages of file {} failed: {}", self.file_id, e);
        }

        result.map(|_| SendOutcome::Sent)
    }

    async fn stream_answer(&self, message: &str) -> Result<(), ClientError> {
        let mut body = self.transport.send_message(self.file_id, message).await?;
        self.state.send_modify(|s| s.is_loading = false);

        let mut decoder = Utf8Accumulator::default();
        while let Some(chunk) = body.next().await {
            if decoder.push(&chunk?) {
                self.state.send_modify(|s| s.messages.upsert_sentinel(decoder.text()));
            }
        }

        if decoder.finish() {
            self.state.send_modify(|s| s.messages.upsert_sentinel(decoder.text()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{model::MessagesPage, transport::ByteStream};
    use bytes::Bytes;
    use chrono::Utc;
    use futures_util::{stream, FutureExt};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    type Chunk = Result<Bytes, ClientError>;

    /// Scripted API. Fetches pop queued pages; the first fetch can be held at a gate.
    #[derive(Default)]
    struct FakeApi {
        pages: Mutex<VecDeque<MessagesPage>>,
        gate: Mutex<Option<Arc<Notify>>>,
        reply: Mutex<Option<Result<Vec<Chunk>, ClientError>>>,
        observer: Mutex<Option<watch::Receiver<ChatState>>>,
        state_at_send: Mutex<Vec<ChatState>>,
        sentinel_log: Arc<Mutex<Vec<String>>>,
        sends: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn queue(&self, page: MessagesPage) {
            self.pages.lock().unwrap().push_back(page);
        }

        fn reply(&self, reply: Result<Vec<Chunk>, ClientError>) {
            *self.reply.lock().unwrap() = Some(reply);
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for Arc<FakeApi> {
        async fn send_message(&self, _file_id: Uuid, message: &str) -> Result<ByteStream, ClientError> {
            self.sends.lock().unwrap().push(message.to_string());
            let observer = self.observer.lock().unwrap().clone();
            if let Some(rx) = &observer {
                self.state_at_send.lock().unwrap().push(rx.borrow().clone());
            }

            let chunks = self.reply.lock().unwrap().take().unwrap_or(Ok(vec![]))?;
            let log = self.sentinel_log.clone();

            // Records the visible answer each time the reader asks for more.
            let body = stream::unfold(
                (chunks.into_iter(), observer, log),
                |(mut chunks, observer, log)| async move {
                    if let Some(rx) = &observer {
                        let text = rx.borrow().messages.sentinel().map(|m| m.text.clone());
                        log.lock().unwrap().push(text.unwrap_or_default());
                    }
                    let next = chunks.next()?;
                    Some((next, (chunks, observer, log)))
                },
            );
            Ok(body.boxed())
        }

        async fn fetch_messages(
            &self,
            _file_id: Uuid,
            _cursor: Option<&str>,
            _limit: usize,
        ) -> Result<MessagesPage, ClientError> {
            let page = self.pages.lock().unwrap().pop_front();
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            page.ok_or_else(|| ClientError::Status { status: 503, message: "unavailable".into() })
        }
    }

    fn stored(text: &str, is_user_message: bool) -> ChatMessage {
        ChatMessage {
            id: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            text: text.into(),
            is_user_message,
        }
    }

    fn page(messages: Vec<ChatMessage>) -> MessagesPage {
        MessagesPage { messages, next_cursor: None }
    }

    fn chunks(parts: &[&[u8]]) -> Vec<Chunk> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    async fn context_with_history() -> (ChatContext<Arc<FakeApi>>, Arc<FakeApi>) {
        let api = Arc::new(FakeApi::default());
        let ctx = ChatContext::new(api.clone(), Uuid::now_v7());
        *api.observer.lock().unwrap() = Some(ctx.subscribe());

        api.queue(page(vec![stored("It is a lease.", false), stored("What is this?", true)]));
        ctx.refresh().await.unwrap();
        (ctx, api)
    }

    #[tokio::test]
    async fn test_blank_input_is_skipped() {
        let (ctx, api) = context_with_history().await;
        ctx.handle_input_change("   \n");

        assert_eq!(ctx.add_message().await.unwrap(), SendOutcome::Skipped);
        assert!(api.sends.lock().unwrap().is_empty());
        assert_eq!(ctx.state().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_exactly_one_optimistic_message_before_response() {
        let (ctx, api) = context_with_history().await;
        let before = ctx.state().messages;
        api.reply(Ok(chunks(&[b"Twelve months."])));
        api.queue(page(vec![]));

        ctx.handle_input_change("How long?");
        assert_eq!(ctx.add_message().await.unwrap(), SendOutcome::Sent);

        let at_send = api.state_at_send.lock().unwrap()[0].clone();
        assert_eq!(at_send.messages.len(), before.len() + 1);
        assert!(at_send.is_loading);
        assert!(at_send.input.is_empty());

        let head = &at_send.messages.pages[0].messages[0];
        assert!(head.is_user_message);
        assert_eq!(head.text, "How long?");
        assert!(Uuid::parse_str(&head.id).is_ok());
        assert!(at_send.messages.iter().skip(1).eq(before.iter()));
    }

    #[tokio::test]
    async fn test_optimistic_message_on_empty_list() {
        let api = Arc::new(FakeApi::default());
        let ctx = ChatContext::new(api.clone(), Uuid::now_v7());
        *api.observer.lock().unwrap() = Some(ctx.subscribe());

        ctx.handle_input_change("First question");
        ctx.add_message().await.unwrap();

        let at_send = api.state_at_send.lock().unwrap()[0].clone();
        assert_eq!(at_send.messages.pages.len(), 1);
        assert_eq!(at_send.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_streamed_answer_only_grows() {
        let (ctx, api) = context_with_history().await;
        api.reply(Ok(chunks(&[b"The ", b"term is ", b"twelve ", b"months."])));

        ctx.handle_input_change("How long?");
        ctx.add_message().await.unwrap();

        let log = api.sentinel_log.lock().unwrap().clone();
        assert_eq!(log.first().map(String::as_str), Some(""));
        assert_eq!(log.last().map(String::as_str), Some("The term is twelve months."));
        for pair in log.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
            assert!(pair[1].len() > pair[0].len());
        }
    }

    #[tokio::test]
    async fn test_answer_decodes_split_utf8() {
        let (ctx, api) = context_with_history().await;
        let text = "Prix: 12 €";
        let bytes = text.as_bytes();
        let split = bytes.len() - 2;
        api.reply(Ok(chunks(&[&bytes[..split], &bytes[split..]])));

        ctx.handle_input_change("Combien?");
        ctx.add_message().await.unwrap();

        let log = api.sentinel_log.lock().unwrap().clone();
        assert_eq!(log.last().map(String::as_str), Some(text));
        assert!(log.iter().all(|t| !t.contains('\u{FFFD}')));
    }

    #[tokio::test]
    async fn test_send_failure_restores_list_and_input() {
        let (ctx, api) = context_with_history().await;
        let before = ctx.state().messages;
        api.reply(Err(ClientError::Status { status: 500, message: "boom".into() }));

        ctx.handle_input_change("Will this fail?");
        let err = ctx.add_message().await.unwrap_err();

        assert!(matches!(err, ClientError::Status { status: 500, .. }));
        assert_eq!(api.sends.lock().unwrap().len(), 1);
        let state = ctx.state();
        assert_eq!(state.messages, before);
        assert_eq!(state.input, "Will this fail?");
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_stream_error_rolls_back_partial_answer() {
        let (ctx, api) = context_with_history().await;
        let before = ctx.state().messages;
        let mut reply = chunks(&[b"Partial"]);
        reply.push(Err(ClientError::Stream("reset".into())));
        api.reply(Ok(reply));

        ctx.handle_input_change("Summarize");
        assert!(ctx.add_message().await.is_err());

        let state = ctx.state();
        assert_eq!(state.messages, before);
        assert!(state.messages.sentinel().is_none());
        assert_eq!(state.input, "Summarize");
    }

    #[tokio::test]
    async fn test_completion_refresh_replaces_sentinel() {
        let (ctx, api) = context_with_history().await;
        api.reply(Ok(chunks(&[b"Twelve months."])));
        let persisted = page(vec![
            stored("Twelve months.", false),
            stored("How long?", true),
            stored("It is a lease.", false),
            stored("What is this?", true),
        ]);
        api.queue(persisted.clone());

        ctx.handle_input_change("How long?");
        ctx.add_message().await.unwrap();

        let state = ctx.state();
        assert_eq!(state.messages, InfiniteMessages::single(persisted));
        assert!(state.messages.sentinel().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_refresh_does_not_overwrite_list() {
        let api = Arc::new(FakeApi::default());
        let ctx = ChatContext::new(api.clone(), Uuid::now_v7());
        let gate = Arc::new(Notify::new());
        *api.gate.lock().unwrap() = Some(gate.clone());

        let stale = page(vec![stored("stale", false)]);
        let fresh = page(vec![stored("Answer", false), stored("Question", true)]);
        api.queue(stale);
        api.queue(fresh.clone());
        api.reply(Ok(chunks(&[b"Answer"])));

        let pending = ctx.refresh();
        tokio::pin!(pending);
        assert!(pending.as_mut().now_or_never().is_none());

        ctx.handle_input_change("Question");
        ctx.add_message().await.unwrap();
        assert_eq!(ctx.state().messages, InfiniteMessages::single(fresh.clone()));

        gate.notify_one();
        pending.await.unwrap();
        assert_eq!(ctx.state().messages, InfiniteMessages::single(fresh));
    }

    #[tokio::test]
    async fn test_load_more_appends_next_page() {
        let api = Arc::new(FakeApi::default());
        let ctx = ChatContext::new(api.clone(), Uuid::now_v7()).with_page_size(1);

        let newest = stored("newer", false);
        api.queue(MessagesPage { messages: vec![newest], next_cursor: Some("cursor-1".into()) });
        api.queue(page(vec![stored("older", true)]));
        ctx.refresh().await.unwrap();

        assert!(ctx.load_more().await.unwrap());
        let state = ctx.state();
        assert_eq!(state.messages.pages.len(), 2);
        assert_eq!(state.messages.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["newer", "older"]);

        assert!(!ctx.load_more().await.unwrap());
    }
}
