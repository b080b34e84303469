use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::error;
use crate::configs::vector_store::VectorStore;
use crate::constants::{CONTEXT_TOP_K, HISTORY_WINDOW};
use crate::modules::ai::{prompt::build_prompt, ChatModel, Embedder, TextStream};
use crate::modules::file::repository::FileRepository;
use crate::modules::message::{
    model::{InsertMessage, MessagePage, MessageQuery, SendMessageModel},
    repository::MessageRepository,
    schema::MessageEntity,
};

pub struct MessageService<M, F>
where
    M: MessageRepository + Send + Sync,
    F: FileRepository + Send + Sync,
{
    message_repo: Arc<M>,
    file_repo: Arc<F>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chat_model: Arc<dyn ChatModel>,
}

impl<M, F> Clone for MessageService<M, F>
where
    M: MessageRepository + Send + Sync,
    F: FileRepository + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            message_repo: self.message_repo.clone(),
            file_repo: self.file_repo.clone(),
            vector_store: self.vector_store.clone(),
            embedder: self.embedder.clone(),
            chat_model: self.chat_model.clone(),
        }
    }
}

/// Splits `limit + 1` rows into a page and the cursor of the next one.
pub fn paginate(mut rows: Vec<MessageEntity>, limit: usize) -> MessagePage {
    let next_cursor = if rows.len() > limit { rows.pop().map(|m| m.id) } else { None };

    MessagePage { messages: rows.into_iter().map(Into::into).collect(), next_cursor }
}

impl<M, F> MessageService<M, F>
where
    M: MessageRepository + Send + Sync + 'static,
    F: FileRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        message_repo: Arc<M>,
        file_repo: Arc<F>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
    ) -> Self {
        Self { message_repo, file_repo, vector_store, embedder, chat_model }
    }

    async fn ensure_owner(&self, user_id: &Uuid, file_id: &Uuid) -> Result<(), error::SystemError> {
        self.file_repo
            .find_owned(file_id, user_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| error::SystemError::not_found("File not found"))
    }

    /// One page of the file's conversation, newest first.
    pub async fn list_messages(
        &self,
        user_id: &Uuid,
        file_id: &Uuid,
        query: &MessageQuery,
    ) -> Result<MessagePage, error::SystemError> {
        self.ensure_owner(user_id, file_id).await?;

        let limit = query.limit();
        let rows = self.message_repo.find_page(file_id, query.cursor, limit + 1).await?;

        Ok(paginate(rows, limit))
    }

    /// Stores the question and streams the answer grounded in the file's chunks.
    ///
    /// The answer is stored once the completion finishes, before the stream ends.
    /// A failed completion ends the stream with that error and nothing is stored.
    pub async fn answer(
        &self,
        user_id: Uuid,
        model: SendMessageModel,
    ) -> Result<TextStream, error::SystemError> {
        let SendMessageModel { file_id, message } = model;

        self.ensure_owner(&user_id, &file_id).await?;

        let mut history = self.message_repo.find_recent(&file_id, HISTORY_WINDOW).await?;
        history.reverse();

        self.message_repo
            .create(&InsertMessage {
                file_id,
                user_id,
                text: message.clone(),
                is_user_message: true,
            })
            .await?;

        let embedding = self
            .embedder
            .embed(std::slice::from_ref(&message))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| error::SystemError::Upstream {
                status: 200,
                message: "Embedding response was empty".into(),
            })?;

        let context =
            self.vector_store.query(&file_id.to_string(), embedding, CONTEXT_TOP_K).await?;

        let mut deltas = self.chat_model.stream_chat(build_prompt(&message, &history, &context)).await?;

        let (tx, rx) = mpsc::channel::<Result<String, error::SystemError>>(32);
        let message_repo = self.message_repo.clone();

        tokio::spawn(async move {
            let mut answer = String::new();
            let mut listening = true;

            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        answer.push_str(&text);
                        if listening && tx.send(Ok(text)).await.is_err() {
                            tracing::debug!("Client left while answering on file {}", file_id);
                            listening = false;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Completion for file {} failed: {}", file_id, e);
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let saved = message_repo
                .create(&InsertMessage { file_id, user_id, text: answer, is_user_message: false })
                .await;

            if let Err(e) = saved {
                tracing::error!("Failed to store answer on file {}: {}", file_id, e);
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::vector_store::{ScoredChunk, VectorRecord};
    use crate::modules::ai::model::ChatTurn;
    use crate::modules::file::{
        model::NewFile,
        schema::{FileEntity, UploadStatus},
    };
    use chrono::{DateTime, Duration, Utc};
    use futures_util::TryStreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Messages {
        rows: Mutex<Vec<MessageEntity>>,
    }

    impl Messages {
        fn seed(&self, file_id: Uuid, count: usize) -> Vec<Uuid> {
            let start = Utc::now() - Duration::minutes(count as i64);
            let mut rows = self.rows.lock().unwrap();
            (0..count)
                .map(|i| {
                    let entity = MessageEntity {
                        id: Uuid::now_v7(),
                        file_id,
                        user_id: Uuid::nil(),
                        text: format!("message {i}"),
                        is_user_message: i % 2 == 0,
                        created_at: start + Duration::seconds(i as i64),
                    };
                    rows.push(entity.clone());
                    entity.id
                })
                .collect()
        }

        fn newest_first(&self, file_id: &Uuid) -> Vec<MessageEntity> {
            let mut rows: Vec<_> =
                self.rows.lock().unwrap().iter().filter(|m| m.file_id == *file_id).cloned().collect();
            rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            rows
        }
    }

    #[async_trait::async_trait]
    impl MessageRepository for Messages {
        async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError> {
            let entity = MessageEntity {
                id: Uuid::now_v7(),
                file_id: message.file_id,
                user_id: message.user_id,
                text: message.text.clone(),
                is_user_message: message.is_user_message,
                created_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(entity.clone());
            Ok(entity)
        }

        async fn find_page(
            &self,
            file_id: &Uuid,
            cursor: Option<Uuid>,
            limit: usize,
        ) -> Result<Vec<MessageEntity>, error::SystemError> {
            let rows = self.newest_first(file_id);
            let start = cursor.and_then(|c| rows.iter().position(|m| m.id == c)).unwrap_or(0);
            Ok(rows.into_iter().skip(start).take(limit).collect())
        }

        async fn find_recent(
            &self,
            file_id: &Uuid,
            limit: i64,
        ) -> Result<Vec<MessageEntity>, error::SystemError> {
            Ok(self.newest_first(file_id).into_iter().take(limit as usize).collect())
        }
    }

    struct Files(FileEntity);

    #[async_trait::async_trait]
    impl FileRepository for Files {
        async fn create_within_quota(
            &self,
            _file: &NewFile,
            _since: DateTime<Utc>,
            _quota: i64,
        ) -> Result<Option<FileEntity>, error::SystemError> {
            unreachable!()
        }

        async fn find_owned(
            &self,
            file_id: &Uuid,
            user_id: &Uuid,
        ) -> Result<Option<FileEntity>, error::SystemError> {
            Ok((self.0.id == *file_id && self.0.user_id == *user_id).then(|| self.0.clone()))
        }

        async fn list_by_user(&self, _user_id: &Uuid) -> Result<Vec<FileEntity>, error::SystemError> {
            Ok(vec![self.0.clone()])
        }

        async fn update_status(
            &self,
            _file_id: &Uuid,
            _status: UploadStatus,
            _page_count: Option<i32>,
        ) -> Result<(), error::SystemError> {
            Ok(())
        }

        async fn delete(&self, _file_id: &Uuid) -> Result<bool, error::SystemError> {
            Ok(false)
        }
    }

    #[derive(Default)]
    struct Vectors {
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait::async_trait]
    impl VectorStore for Vectors {
        async fn upsert(
            &self,
            _namespace: &str,
            _records: Vec<VectorRecord>,
        ) -> Result<(), error::SystemError> {
            Ok(())
        }

        async fn query(
            &self,
            namespace: &str,
            _vector: Vec<f32>,
            top_k: usize,
        ) -> Result<Vec<ScoredChunk>, error::SystemError> {
            self.queries.lock().unwrap().push((namespace.to_string(), top_k));
            Ok(vec![ScoredChunk { id: "c0".into(), score: 0.9, text: "The term is 12 months.".into() }])
        }

        async fn delete_namespace(&self, _namespace: &str) -> Result<(), error::SystemError> {
            Ok(())
        }
    }

    struct UnitEmbedder;

    #[async_trait::async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, error::SystemError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Replays scripted deltas, optionally failing after them.
    struct Scripted {
        deltas: Vec<&'static str>,
        fail: bool,
        prompts: Mutex<Vec<Vec<ChatTurn>>>,
    }

    #[async_trait::async_trait]
    impl ChatModel for Scripted {
        async fn stream_chat(&self, messages: Vec<ChatTurn>) -> Result<TextStream, error::SystemError> {
            self.prompts.lock().unwrap().push(messages);
            let mut items: Vec<Result<String, error::SystemError>> =
                self.deltas.iter().map(|d| Ok(d.to_string())).collect();
            if self.fail {
                items.push(Err(error::SystemError::Upstream {
                    status: 500,
                    message: "connection reset".into(),
                }));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    fn file(user_id: Uuid) -> FileEntity {
        FileEntity {
            id: Uuid::now_v7(),
            user_id,
            name: "lease.pdf".into(),
            key: "lease.pdf".into(),
            url: "/uploads/lease.pdf".into(),
            upload_status: UploadStatus::Success,
            page_count: Some(3),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Fixture {
        service: MessageService<Messages, Files>,
        messages: Arc<Messages>,
        vectors: Arc<Vectors>,
        chat: Arc<Scripted>,
        user_id: Uuid,
        file_id: Uuid,
    }

    fn fixture(deltas: Vec<&'static str>, fail: bool) -> Fixture {
        let user_id = Uuid::now_v7();
        let file = file(user_id);
        let file_id = file.id;
        let messages = Arc::new(Messages::default());
        let vectors = Arc::new(Vectors::default());
        let chat = Arc::new(Scripted { deltas, fail, prompts: Mutex::new(vec![]) });
        let service = MessageService::with_dependencies(
            messages.clone(),
            Arc::new(Files(file)),
            vectors.clone(),
            Arc::new(UnitEmbedder),
            chat.clone(),
        );
        Fixture { service, messages, vectors, chat, user_id, file_id }
    }

    fn query(limit: Option<usize>, cursor: Option<Uuid>) -> MessageQuery {
        MessageQuery { limit, cursor }
    }

    #[test]
    fn test_paginate_pops_extra_row_as_cursor() {
        let messages = Messages::default();
        let file_id = Uuid::now_v7();
        messages.seed(file_id, 3);
        let rows = messages.newest_first(&file_id);
        let expected_cursor = rows[2].id;

        let page = paginate(rows.clone(), 2);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.next_cursor, Some(expected_cursor));

        let page = paginate(rows, 3);
        assert_eq!(page.messages.len(), 3);
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn test_list_messages_walks_pages_without_gaps() {
        let fx = fixture(vec![], false);
        fx.messages.seed(fx.file_id, 25);

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = fx
                .service
                .list_messages(&fx.user_id, &fx.file_id, &query(None, cursor))
                .await
                .unwrap();
            assert!(page.messages.len() <= 10);
            seen.extend(page.messages.iter().map(|m| m.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let expected: Vec<_> = fx.messages.newest_first(&fx.file_id).iter().map(|m| m.id).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_list_messages_rejects_foreign_file() {
        let fx = fixture(vec![], false);
        let err = fx
            .service
            .list_messages(&Uuid::now_v7(), &fx.file_id, &query(Some(5), None))
            .await
            .unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_answer_streams_and_stores_both_turns() {
        let fx = fixture(vec!["The term ", "is 12 ", "months."], false);
        fx.messages.seed(fx.file_id, 8);

        let body = SendMessageModel { file_id: fx.file_id, message: "How long is the lease?".into() };
        let chunks: Vec<String> =
            fx.service.answer(fx.user_id, body).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), "The term is 12 months.");

        let stored = fx.messages.newest_first(&fx.file_id);
        assert_eq!(stored.len(), 10);
        assert!(!stored[0].is_user_message);
        assert_eq!(stored[0].text, "The term is 12 months.");
        assert!(stored[1].is_user_message);
        assert_eq!(stored[1].text, "How long is the lease?");

        assert_eq!(*fx.vectors.queries.lock().unwrap(), vec![(fx.file_id.to_string(), 4)]);

        let prompts = fx.chat.prompts.lock().unwrap();
        let prompt = &prompts[0][1].content;
        assert!(prompt.contains("The term is 12 months."));
        assert!(!prompt.contains("message 1\n"));
        assert!(prompt.contains("message 2"));
        assert!(prompt.find("message 2").unwrap() < prompt.find("message 7").unwrap());
        assert_eq!(prompt.matches("How long is the lease?").count(), 1);
    }

    #[tokio::test]
    async fn test_answer_failure_mid_stream_keeps_only_question() {
        let fx = fixture(vec!["Partial "], true);

        let body = SendMessageModel { file_id: fx.file_id, message: "Summarize".into() };
        let mut answer = fx.service.answer(fx.user_id, body).await.unwrap();

        assert_eq!(answer.next().await.unwrap().unwrap(), "Partial ");
        assert!(matches!(answer.next().await, Some(Err(error::SystemError::Upstream { .. }))));
        assert!(answer.next().await.is_none());

        let stored = fx.messages.newest_first(&fx.file_id);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_user_message);
    }

    #[tokio::test]
    async fn test_answer_rejects_foreign_file_before_storing() {
        let fx = fixture(vec!["unused"], false);

        let body = SendMessageModel { file_id: fx.file_id, message: "Hello".into() };
        let result = fx.service.answer(Uuid::now_v7(), body).await;

        assert!(matches!(result, Err(error::SystemError::NotFound(_))));
        assert!(fx.messages.newest_first(&fx.file_id).is_empty());
        assert!(fx.chat.prompts.lock().unwrap().is_empty());
    }
}
