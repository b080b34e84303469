use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{model::InsertMessage, repository::MessageRepository, schema::MessageEntity},
};

#[derive(Clone)]
pub struct MessageRepositoryPg {
    pool: sqlx::PgPool,
}

impl MessageRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessageRepositoryPg {
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>(
            "INSERT INTO messages (id, file_id, user_id, text, is_user_message) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(message.file_id)
        .bind(message.user_id)
        .bind(&message.text)
        .bind(message.is_user_message)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn find_page(
        &self,
        file_id: &Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        // has index on (file_id, created_at DESC, id DESC)

        let messages = if let Some(cursor) = cursor {
            sqlx::query_as::<_, MessageEntity>(
                r#"
                SELECT * FROM messages
                WHERE file_id = $1
                  AND (created_at, id) <= (SELECT created_at, id FROM messages WHERE id = $2)
                ORDER BY created_at DESC, id DESC
                LIMIT $3
                "#,
            )
            .bind(file_id)
            .bind(cursor)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, MessageEntity>(
                "SELECT * FROM messages WHERE file_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
            )
            .bind(file_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(messages)
    }

    async fn find_recent(
        &self,
        file_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let messages = sqlx::query_as::<_, MessageEntity>(
            "SELECT * FROM messages WHERE file_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(file_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
