use chrono::{DateTime, Datelike, NaiveTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error;
use crate::configs::vector_store::{VectorRecord, VectorStore};
use crate::constants::{CHUNK_OVERLAP, CHUNK_SIZE};
use crate::modules::ai::Embedder;
use crate::modules::file::{
    document::{chunk_text, count_pages, extract_text},
    model::{NewFile, UploadConfig},
    repository::FileRepository,
    schema::{FileEntity, UploadStatus},
};
use crate::modules::plan::{model::Plan, service::PlanService};

const EMBED_BATCH_SIZE: usize = 64;

pub struct FileService<R>
where
    R: FileRepository + Send + Sync,
{
    file_repo: Arc<R>,
    plan_service: PlanService,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: UploadConfig,
}

impl<R> Clone for FileService<R>
where
    R: FileRepository + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            file_repo: self.file_repo.clone(),
            plan_service: self.plan_service.clone(),
            vector_store: self.vector_store.clone(),
            embedder: self.embedder.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R> FileService<R>
where
    R: FileRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        file_repo: Arc<R>,
        plan_service: PlanService,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: UploadConfig,
    ) -> Self {
        Self { file_repo, plan_service, vector_store, embedder, config }
    }

    pub fn plan_service(&self) -> &PlanService {
        &self.plan_service
    }

    /// Validate file type and size against the caller's plan
    fn validate_file(
        &self,
        filename: &str,
        file_size: usize,
        mime_type: Option<&str>,
        plan: &Plan,
    ) -> Result<(), error::SystemError> {
        let mime_type = match mime_type {
            Some(m) if m != "application/octet-stream" => m.to_string(),
            _ => mime_guess::from_path(filename).first_or_octet_stream().to_string(),
        };

        if mime_type != self.config.allowed_mime_type {
            return Err(error::SystemError::bad_request(format!(
                "File type '{}' is not allowed, only PDF files are supported",
                mime_type
            )));
        }

        if file_size == 0 {
            return Err(error::SystemError::bad_request("File is empty"));
        }

        if file_size > plan.max_file_size {
            return Err(error::SystemError::bad_request(format!(
                "File size exceeds the {} MB limit of the {} plan",
                plan.max_file_size / (1024 * 1024),
                plan.name
            )));
        }

        Ok(())
    }

    async fn save_file(&self, key: &str, bytes: &[u8]) -> Result<String, error::SystemError> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;

        let file_path = self.storage_path(key);
        tokio::fs::write(&file_path, bytes).await?;

        Ok(file_path)
    }

    fn storage_path(&self, key: &str) -> String {
        format!("{}/{}", self.config.upload_dir.trim_end_matches('/'), key)
    }

    /// Stores the PDF, records it as `PROCESSING` and indexes it in the background.
    pub async fn upload_file(
        &self,
        user_id: Uuid,
        original_filename: String,
        bytes: Vec<u8>,
        mime_type: Option<String>,
    ) -> Result<FileEntity, error::SystemError> {
        let plan = self.plan_service.subscription_for(&user_id).await?.plan;

        self.validate_file(&original_filename, bytes.len(), mime_type.as_deref(), plan)?;

        let key = format!("{}.pdf", Uuid::now_v7());
        let stored_path = self.save_file(&key, &bytes).await?;

        let created = self
            .file_repo
            .create_within_quota(
                &NewFile {
                    user_id,
                    name: original_filename,
                    url: format!("{}/{}", self.config.base_url, key),
                    key,
                    upload_status: UploadStatus::Processing,
                },
                month_start(Utc::now()),
                i64::from(plan.quota),
            )
            .await;

        let file = match created {
            Ok(Some(file)) => file,
            Ok(None) => {
                discard_stored(&stored_path).await;
                return Err(error::SystemError::forbidden(format!(
                    "Monthly quota of {} PDFs reached on the {} plan",
                    plan.quota, plan.name
                )));
            }
            Err(e) => {
                discard_stored(&stored_path).await;
                return Err(e);
            }
        };
        tracing::info!("File {} uploaded by user {}", file.id, user_id);

        let service = self.clone();
        let pages_limit = plan.pages_per_pdf;
        let file_id = file.id;
        tokio::spawn(async move {
            service.process_upload(file_id, bytes, pages_limit).await;
        });

        Ok(file)
    }

    /// Runs ingestion and records the outcome on the file.
    pub async fn process_upload(&self, file_id: Uuid, bytes: Vec<u8>, pages_limit: u32) {
        let (status, page_count) = match self.ingest(file_id, bytes, pages_limit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Ingestion of file {} failed: {}", file_id, e);
                (UploadStatus::Failed, None)
            }
        };

        if let Err(e) = self.file_repo.update_status(&file_id, status, page_count).await {
            tracing::error!("Failed to record status of file {}: {}", file_id, e);
        }
    }

    async fn ingest(
        &self,
        file_id: Uuid,
        bytes: Vec<u8>,
        pages_limit: u32,
    ) -> Result<(UploadStatus, Option<i32>), error::SystemError> {
        let (pages, text) = tokio::task::spawn_blocking(
            move || -> Result<(u32, Option<String>), error::SystemError> {
                let pages = count_pages(&bytes)?;
                if pages > pages_limit {
                    return Ok((pages, None));
                }
                Ok((pages, Some(extract_text(&bytes)?)))
            },
        )
        .await
        .map_err(|e| error::SystemError::InternalError(Box::new(e)))??;

        let page_count = i32::try_from(pages).ok();
        let Some(text) = text else {
            tracing::warn!(
                "File {} has {} pages, above the plan limit of {}",
                file_id,
                pages,
                pages_limit
            );
            return Ok((UploadStatus::Failed, page_count));
        };

        let indexed = self.index_text(&file_id, &text).await?;
        if indexed == 0 {
            tracing::warn!("File {} has no extractable text", file_id);
            return Ok((UploadStatus::Failed, page_count));
        }

        Ok((UploadStatus::Success, page_count))
    }

    /// Chunks, embeds and upserts `text` into the file's namespace. Returns the chunk count.
    pub async fn index_text(&self, file_id: &Uuid, text: &str) -> Result<usize, error::SystemError> {
        let chunks = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut records = Vec::with_capacity(chunks.len());
        for (batch_index, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
            let embeddings = self.embedder.embed(batch).await?;
            for (offset, (text, values)) in batch.iter().zip(embeddings).enumerate() {
                records.push(VectorRecord {
                    id: format!("{}-{}", file_id, batch_index * EMBED_BATCH_SIZE + offset),
                    values,
                    text: text.clone(),
                });
            }
        }

        let count = records.len();
        self.vector_store.upsert(&file_id.to_string(), records).await?;
        tracing::info!("Indexed {} chunks for file {}", count, file_id);
        Ok(count)
    }

    pub async fn get_owned_file(
        &self,
        user_id: &Uuid,
        file_id: &Uuid,
    ) -> Result<FileEntity, error::SystemError> {
        self.file_repo
            .find_owned(file_id, user_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("File not found"))
    }

    pub async fn list_files(&self, user_id: &Uuid) -> Result<Vec<FileEntity>, error::SystemError> {
        self.file_repo.list_by_user(user_id).await
    }

    pub async fn delete_file(
        &self,
        user_id: &Uuid,
        file_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let file = self.get_owned_file(user_id, file_id).await?;

        if !self.file_repo.delete(file_id).await? {
            return Err(error::SystemError::not_found("File not found"));
        }

        tokio::fs::remove_file(self.storage_path(&file.key)).await.ok();

        if let Err(e) = self.vector_store.delete_namespace(&file_id.to_string()).await {
            tracing::warn!("Failed to drop vectors of file {}: {}", file_id, e);
        }

        Ok(())
    }
}

async fn discard_stored(path: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove unrecorded upload {}: {}", path, e);
    }
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().with_day(1).unwrap_or(now.date_naive()).and_time(NaiveTime::MIN).and_utc()
}
