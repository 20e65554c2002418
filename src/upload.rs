use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::client::WorkspaceClient;
use crate::errors::{ChatError, ChatResult};
use crate::jobs::JobTrigger;

/// Storage endpoints that accept a file. They differ only in how the bytes
/// and the destination travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadBackend {
    /// JSON body, base64 `content`, `format: AUTO`.
    WorkspaceImport,
    /// JSON body, base64 `contents`.
    DbfsPut,
    /// Multipart body, path and overwrite in the query string.
    FilesUpload,
    /// Multipart body against the volumes API.
    VolumesFiles,
    /// Content handed to a job as base64 notebook parameters.
    JobRelay,
}

impl UploadBackend {
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            UploadBackend::WorkspaceImport => Some("/api/2.0/workspace/import"),
            UploadBackend::DbfsPut => Some("/api/2.0/dbfs/put"),
            UploadBackend::FilesUpload => Some("/api/2.0/files/upload"),
            UploadBackend::VolumesFiles => Some("/api/2.1/unity-catalog/volumes/files"),
            UploadBackend::JobRelay => None,
        }
    }
}

/// File types the uploader accepts. Only pdf and txt are ever read for text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
    Docx,
    Xlsx,
}

impl FileKind {
    pub fn from_name(name: &str) -> ChatResult<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(FileKind::Pdf),
            Some("txt") => Ok(FileKind::Text),
            Some("docx") => Ok(FileKind::Docx),
            Some("xlsx") => Ok(FileKind::Xlsx),
            _ => Err(ChatError::UnsupportedFileType(name.to_string())),
        }
    }

    pub fn is_inspectable(&self) -> bool {
        matches!(self, FileKind::Pdf | FileKind::Text)
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: String,
    pub file_name: String,
    pub payload: Vec<u8>,
    pub overwrite: bool,
}

impl UploadRequest {
    pub fn new(root: &str, file_name: &str, payload: &[u8], overwrite: bool) -> Self {
        Self {
            path: destination_path(root, file_name),
            file_name: file_name.to_string(),
            payload: payload.to_vec(),
            overwrite,
        }
    }

    fn encoded(&self) -> String {
        STANDARD.encode(&self.payload)
    }
}

pub fn destination_path(root: &str, file_name: &str) -> String {
    format!("{}/{}", root, file_name)
}

/// One file of a batch upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct Uploader {
    client: WorkspaceClient,
    backend: UploadBackend,
    relay_job_id: Option<String>,
}

impl Uploader {
    pub fn new(client: WorkspaceClient, backend: UploadBackend) -> Self {
        Self {
            client,
            backend,
            relay_job_id: None,
        }
    }

    pub fn with_relay_job(mut self, job_id: impl Into<String>) -> Self {
        self.relay_job_id = Some(job_id.into());
        self
    }

    pub fn backend(&self) -> UploadBackend {
        self.backend
    }

    /// Writes `bytes` to `root/file_name` and returns that path.
    pub fn upload(
        &self,
        root: &str,
        file_name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> ChatResult<String> {
        let request = UploadRequest::new(root, file_name, bytes, overwrite);
        tracing::debug!(
            backend = ?self.backend,
            path = %request.path,
            bytes = request.payload.len(),
            "uploading file"
        );

        match self.backend {
            UploadBackend::JobRelay => self.relay(&request)?,
            backend => self.put(backend, &request)?,
        }

        tracing::info!(path = %request.path, "upload complete");
        Ok(request.path)
    }

    /// Uploads every file on its own; one failure never stops the others.
    pub fn upload_batch(
        &self,
        root: &str,
        files: &[UploadFile],
        overwrite: bool,
    ) -> Vec<(String, ChatResult<String>)> {
        files
            .iter()
            .map(|file| {
                let result = FileKind::from_name(&file.name)
                    .and_then(|_| self.upload(root, &file.name, &file.bytes, overwrite));
                if let Err(e) = &result {
                    tracing::warn!(file = %file.name, error = %e, "upload failed");
                }
                (file.name.clone(), result)
            })
            .collect()
    }

    fn put(&self, backend: UploadBackend, request: &UploadRequest) -> ChatResult<()> {
        let endpoint = backend
            .endpoint()
            .ok_or_else(|| ChatError::config(format!("{:?} has no storage endpoint", backend)))?;

        let builder = match json_body(backend, request) {
            Some(body) => self.client.post(endpoint).json(&body),
            None => {
                let part = Part::bytes(request.payload.clone()).file_name(request.file_name.clone());
                let overwrite = if request.overwrite { "true" } else { "false" };
                self.client
                    .post(endpoint)
                    .query(&[("path", request.path.as_str()), ("overwrite", overwrite)])
                    .multipart(Form::new().part("file", part))
            }
        };

        self.client
            .send(builder)?
            .success_or(|status, body| ChatError::UploadFailed { status, body })?;
        Ok(())
    }

    fn relay(&self, request: &UploadRequest) -> ChatResult<()> {
        let job_id = self.relay_job_id.as_deref().ok_or_else(|| {
            ChatError::config("job_relay backend needs jobs.relay_job_id to be set")
        })?;

        let mut params = BTreeMap::new();
        params.insert("file_name".to_string(), request.file_name.clone());
        params.insert("file_base64".to_string(), request.encoded());
        params.insert("destination_path".to_string(), request.path.clone());

        match JobTrigger::new(self.client.clone()).trigger(job_id, &params) {
            Ok(run_id) => {
                tracing::debug!(run_id = %run_id, "relay job accepted upload");
                Ok(())
            }
            Err(ChatError::JobTriggerFailed { status, body }) => {
                Err(ChatError::UploadFailed { status, body })
            }
            Err(e) => Err(e),
        }
    }
}

/// JSON body for the base64 backends, `None` for the multipart ones.
pub(crate) fn json_body(backend: UploadBackend, request: &UploadRequest) -> Option<Value> {
    match backend {
        UploadBackend::WorkspaceImport => Some(json!({
            "path": request.path,
            "format": "AUTO",
            "overwrite": request.overwrite,
            "content": request.encoded(),
        })),
        UploadBackend::DbfsPut => Some(json!({
            "path": request.path,
            "overwrite": request.overwrite,
            "contents": request.encoded(),
        })),
        UploadBackend::FilesUpload | UploadBackend::VolumesFiles | UploadBackend::JobRelay => None,
    }
}
