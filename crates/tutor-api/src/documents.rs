//! Document endpoints: upload, list, fetch, flashcards, delete
//!
//! Uploads are sent as `multipart/form-data`. The body is encoded up front into
//! bytes so the request can be replayed after a token refresh.

use serde_json::Value;
use tracing::debug;
use tutor_session::{ApiRequest, Result};

use crate::TutorApi;

/// Default flashcard count for generation.
pub const DEFAULT_FLASHCARD_COUNT: u32 = 10;

/// Default reading level for generated content.
pub const DEFAULT_READING_LEVEL: &str = "high_school";

/// A file to upload.
#[derive(Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub course_id: Option<i64>,
}

impl Upload {
    /// Content type is guessed from the file extension.
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = guess_content_type(&filename).to_string();
        Self {
            filename,
            content_type,
            data,
            course_id: None,
        }
    }

    pub fn course(mut self, course_id: i64) -> Self {
        self.course_id = Some(course_id);
        self
    }

    /// Encode as a multipart body with the given boundary.
    fn encode(&self, boundary: &str) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.data.len() + 512);
        // quotes and line breaks would break the part header
        let filename: String = self
            .filename
            .chars()
            .filter(|c| !matches!(c, '"' | '\r' | '\n'))
            .collect();

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", self.content_type).as_bytes());
        body.extend_from_slice(&self.data);
        body.extend_from_slice(b"\r\n");

        if let Some(course_id) = self.course_id {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Disposition: form-data; name=\"course_id\"\r\n\r\n");
            body.extend_from_slice(course_id.to_string().as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .field("course_id", &self.course_id)
            .finish()
    }
}

fn guess_content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

impl TutorApi {
    /// `POST /docs/upload`
    pub async fn upload_document(&self, upload: &Upload) -> Result<Value> {
        let boundary = format!("tutor-{}", uuid::Uuid::new_v4().as_simple());
        debug!(filename = %upload.filename, bytes = upload.data.len(), "uploading document");
        let request = ApiRequest::post("/docs/upload").raw(
            format!("multipart/form-data; boundary={boundary}"),
            upload.encode(&boundary),
        );
        self.send_json(request).await
    }

    /// `GET /docs/`
    pub async fn documents(&self) -> Result<Value> {
        self.get("/docs/").await
    }

    /// `GET /docs/{id}`
    pub async fn document(&self, document_id: i64) -> Result<Value> {
        self.get(&format!("/docs/{document_id}")).await
    }

    /// `GET /docs/{id}/flashcards`
    pub async fn flashcards(&self, document_id: i64) -> Result<Value> {
        self.get(&format!("/docs/{document_id}/flashcards")).await
    }

    /// `POST /docs/{id}/generate-flashcards?count=N&reading_level=L`
    pub async fn generate_flashcards(
        &self,
        document_id: i64,
        count: u32,
        reading_level: &str,
    ) -> Result<Value> {
        let request = ApiRequest::post(format!("/docs/{document_id}/generate-flashcards"))
            .query("count", count)
            .query("reading_level", reading_level);
        self.send_json(request).await
    }

    /// `DELETE /docs/{id}`
    pub async fn delete_document(&self, document_id: i64) -> Result<Value> {
        self.send_json(ApiRequest::delete(format!("/docs/{document_id}")))
            .await
    }
}
