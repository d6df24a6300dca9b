//! Tutor chat and brain boost endpoints

use serde::Serialize;
use serde_json::Value;
use tutor_session::Result;

use crate::TutorApi;

/// Body for `POST /tutor/chat`. Unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_steps: Option<bool>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Body for `POST /tutor/boost/start`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timebox_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

/// Body for `POST /tutor/boost/answer`.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRequest {
    pub quiz_id: i64,
    pub question_id: i64,
    pub answer: String,
}

impl TutorApi {
    /// `POST /tutor/chat`
    pub async fn chat(&self, request: &ChatRequest) -> Result<Value> {
        self.post("/tutor/chat", request).await
    }

    /// `POST /tutor/boost/start`
    pub async fn start_brain_boost(&self, request: &BoostRequest) -> Result<Value> {
        self.post("/tutor/boost/start", request).await
    }

    /// `POST /tutor/boost/answer`
    pub async fn submit_answer(&self, request: &AnswerRequest) -> Result<Value> {
        self.post("/tutor/boost/answer", request).await
    }

    /// `GET /tutor/sessions`
    pub async fn sessions(&self) -> Result<Value> {
        self.get("/tutor/sessions").await
    }

    /// `GET /tutor/sessions/{id}/messages`
    pub async fn session_messages(&self, session_id: i64) -> Result<Value> {
        self.get(&format!("/tutor/sessions/{session_id}/messages"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{body_json, last, start};

    #[tokio::test]
    async fn chat_omits_unset_fields() {
        let (api, calls, _dir) = start().await;
        let mut request = ChatRequest::new("What is mitosis?");
        request.show_steps = Some(true);
        api.chat(&request).await.unwrap();

        let call = last(&calls);
        assert_eq!(call.path, "/tutor/chat");
        let body = body_json(&call);
        assert_eq!(body["message"], "What is mitosis?");
        assert_eq!(body["show_steps"], true);
        assert!(body.get("session_id").is_none());
    }

    #[tokio::test]
    async fn brain_boost_flow() {
        let (api, calls, _dir) = start().await;

        let start_request = BoostRequest {
            timebox_minutes: Some(5),
            topic: Some("photosynthesis".into()),
            difficulty: None,
        };
        api.start_brain_boost(&start_request).await.unwrap();
        let body = body_json(&last(&calls));
        assert_eq!(body["timebox_minutes"], 5);
        assert!(body.get("difficulty").is_none());

        api.submit_answer(&AnswerRequest {
            quiz_id: 1,
            question_id: 2,
            answer: "chlorophyll".into(),
        })
        .await
        .unwrap();
        let call = last(&calls);
        assert_eq!(call.path, "/tutor/boost/answer");
        assert_eq!(body_json(&call)["answer"], "chlorophyll");
    }

    #[tokio::test]
    async fn session_history_routes() {
        let (api, _calls, _dir) = start().await;
        assert_eq!(api.sessions().await.unwrap()["path"], "/tutor/sessions");
        assert_eq!(
            api.session_messages(9).await.unwrap()["path"],
            "/tutor/sessions/9/messages"
        );
    }
}
