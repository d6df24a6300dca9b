//! Tutor domain endpoints over the authenticated session
//!
//! Thin wrappers for the document, tutor chat and progress endpoints. Every
//! call goes through `SessionClient::send`, so bearer injection, refresh and
//! replay apply uniformly. Response bodies are opaque to this crate and are
//! returned as `serde_json::Value`.

pub mod documents;
pub mod progress;
pub mod tutor;

pub use documents::Upload;
pub use tutor::{AnswerRequest, BoostRequest, ChatRequest};

use serde::Serialize;
use serde_json::Value;
use tutor_session::{ApiRequest, Result, SessionClient};

/// Domain API handle. Cheap to clone; shares the session.
#[derive(Debug, Clone)]
pub struct TutorApi {
    client: SessionClient,
}

impl TutorApi {
    pub fn new(client: SessionClient) -> Self {
        Self { client }
    }

    pub fn session(&self) -> &SessionClient {
        &self.client
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.client.get_json(path).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let body = serde_json::to_value(body)
            .map_err(|e| tutor_session::Error::Decode(format!("encoding request: {e}")))?;
        self.client.post_json(path, body).await
    }

    async fn send_json(&self, request: ApiRequest) -> Result<Value> {
        let response = self.client.send(request).await?;
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }
}
