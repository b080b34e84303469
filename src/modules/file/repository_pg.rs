use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::file::{
        model::NewFile,
        repository::FileRepository,
        schema::{FileEntity, UploadStatus},
    },
};

#[derive(Clone)]
pub struct FilePgRepository {
    pool: sqlx::PgPool,
}

impl FilePgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FileRepository for FilePgRepository {
    async fn create_within_quota(
        &self,
        file: &NewFile,
        since: DateTime<Utc>,
        quota: i64,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        // serializes concurrent uploads of the same user until commit
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(file.user_id)
            .execute(&mut *tx)
            .await?;

        let used: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(file.user_id)
        .bind(since)
        .fetch_one(&mut *tx)
        .await?;

        if used >= quota {
            tx.rollback().await?;
            return Ok(None);
        }

        let entity = sqlx::query_as::<_, FileEntity>(
            r#"
            INSERT INTO files (id, user_id, name, key, url, upload_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(file.user_id)
        .bind(&file.name)
        .bind(&file.key)
        .bind(&file.url)
        .bind(file.upload_status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(entity))
    }

    async fn find_owned(
        &self,
        file_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        let file = sqlx::query_as::<_, FileEntity>(
            "SELECT * FROM files WHERE id = $1 AND user_id = $2",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<FileEntity>, error::SystemError> {
        let files = sqlx::query_as::<_, FileEntity>(
            "SELECT * FROM files WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    async fn update_status(
        &self,
        file_id: &Uuid,
        status: UploadStatus,
        page_count: Option<i32>,
    ) -> Result<(), error::SystemError> {
        sqlx::query(
            r#"
            UPDATE files
            SET upload_status = $2,
                page_count    = COALESCE($3, page_count),
                updated_at    = NOW()
            WHERE id = $1
            "#,
        )
        .bind(file_id)
        .bind(status)
        .bind(page_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, file_id: &Uuid) -> Result<bool, error::SystemError> {
        let rows = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }
}
