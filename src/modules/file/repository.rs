use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    modules::file::{
        model::NewFile,
        schema::{FileEntity, UploadStatus},
    },
};

#[async_trait::async_trait]
pub trait FileRepository {
    /// Inserts `file` unless its owner already has `quota` uploads since `since`.
    /// The count and the insert happen under one per-user lock. `None` means the quota is used up.
    async fn create_within_quota(
        &self,
        file: &NewFile,
        since: DateTime<Utc>,
        quota: i64,
    ) -> Result<Option<FileEntity>, error::SystemError>;

    /// The file with `file_id`, only when it belongs to `user_id`.
    async fn find_owned(
        &self,
        file_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<FileEntity>, error::SystemError>;

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<FileEntity>, error::SystemError>;

    async fn update_status(
        &self,
        file_id: &Uuid,
        status: UploadStatus,
        page_count: Option<i32>,
    ) -> Result<(), error::SystemError>;

    /// Removes the file and, through the foreign key, its messages.
    async fn delete(&self, file_id: &Uuid) -> Result<bool, error::SystemError>;
}
