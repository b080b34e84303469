use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "upload_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Pending,
    Processing,
    Failed,
    Success,
}

/// Uploaded PDF owned by a single user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Name of the stored copy inside the upload directory.
    pub key: String,
    pub url: String,
    pub upload_status: UploadStatus,
    pub page_count: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
