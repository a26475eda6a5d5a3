//! File uploads: book cover images and PDF copies

use std::path::Path;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::UploadsConfig,
    error::{AppError, AppResult},
};

/// Kind of file accepted by an upload endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Pdf,
}

impl UploadKind {
    /// Multipart field carrying the file
    pub fn field_name(&self) -> &'static str {
        match self {
            UploadKind::Image => "image",
            UploadKind::Pdf => "pdf",
        }
    }

    fn accepts(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        match self {
            UploadKind::Image => content_type.starts_with("image/"),
            UploadKind::Pdf => content_type == "application/pdf",
        }
    }

    /// Sub-directory under the upload root
    fn subdir(&self) -> Option<&'static str> {
        match self {
            UploadKind::Image => None,
            UploadKind::Pdf => Some("pdfs"),
        }
    }

    fn rejection(&self) -> &'static str {
        match self {
            UploadKind::Image => "Only image files are allowed",
            UploadKind::Pdf => "Only PDF files are allowed",
        }
    }

    /// File extension from the client's file name, falling back to the mime subtype
    fn extension(&self, file_name: Option<&str>, content_type: &str) -> String {
        file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| match self {
                UploadKind::Pdf => "pdf".to_string(),
                UploadKind::Image => content_type
                    .split('/')
                    .nth(1)
                    .map(|sub| sub.split(['+', ';']).next().unwrap_or(sub).to_ascii_lowercase())
                    .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
                    .unwrap_or_else(|| "img".to_string()),
            })
    }
}

/// Upload response
#[derive(Debug, Serialize, ToSchema)]
pub struct StoredFile {
    pub message: String,
    pub filename: String,
    /// Public URL the file is served under
    pub url: String,
}

#[derive(Clone)]
pub struct UploadsService {
    config: UploadsConfig,
}

impl UploadsService {
    pub fn new(config: UploadsConfig) -> Self {
        Self { config }
    }

    pub fn max_file_size(&self) -> usize {
        self.config.max_file_size
    }

    /// Check and persist one uploaded file
    pub async fn store(
        &self,
        kind: UploadKind,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> AppResult<StoredFile> {
        if data.is_empty() {
            return Err(AppError::Validation("No file uploaded".to_string()));
        }
        if data.len() > self.config.max_file_size {
            return Err(AppError::Validation(format!(
                "File too large (maximum {} bytes)",
                self.config.max_file_size
            )));
        }
        let content_type = content_type.unwrap_or_default();
        if !kind.accepts(content_type) {
            return Err(AppError::Validation(kind.rejection().to_string()));
        }

        let filename = format!(
            "{}-{}-{}.{}",
            kind.field_name(),
            Utc::now().timestamp_millis(),
            rand::thread_rng().gen_range(0..1_000_000_000u32),
            kind.extension(file_name, content_type)
        );

        let mut dir = self.config.dir.clone();
        let mut url = self.config.public_path.trim_end_matches('/').to_string();
        if let Some(subdir) = kind.subdir() {
            dir.push(subdir);
            url.push('/');
            url.push_str(subdir);
        }
        url.push('/');
        url.push_str(&filename);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;
        tokio::fs::write(dir.join(&filename), data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

        tracing::info!(filename = %filename, size = data.len(), "File uploaded");

        Ok(StoredFile {
            message: match kind {
                UploadKind::Image => "Image uploaded successfully".to_string(),
                UploadKind::Pdf => "PDF uploaded successfully".to_string(),
            },
            filename,
            url,
        })
    }
}
