use serde::Serialize;
use uuid::Uuid;

use crate::modules::file::schema::{FileEntity, UploadStatus};

#[derive(Debug, Clone)]
pub struct NewFile {
    pub user_id: Uuid,
    pub name: String,
    pub key: String,
    pub url: String,
    pub upload_status: UploadStatus,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub upload_dir: String,
    pub base_url: String,
    pub allowed_mime_type: String,
}

impl UploadConfig {
    pub fn new(upload_dir: impl Into<String>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            base_url: "/uploads".to_string(),
            allowed_mime_type: "application/pdf".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileStatusResponse {
    pub status: UploadStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub file: FileEntity,
    pub is_subscribed: bool,
}
