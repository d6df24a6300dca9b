//! Progress dashboard endpoints

use serde_json::Value;
use tutor_session::{ApiRequest, Result};

use crate::TutorApi;

/// Default activity window in days.
pub const DEFAULT_ACTIVITY_DAYS: u32 = 30;

impl TutorApi {
    /// `GET /progress/overview`
    pub async fn progress_overview(&self) -> Result<Value> {
        self.get("/progress/overview").await
    }

    /// `GET /progress/topics`
    pub async fn topics(&self) -> Result<Value> {
        self.get("/progress/topics").await
    }

    /// `GET /progress/weak-areas`
    pub async fn weak_areas(&self) -> Result<Value> {
        self.get("/progress/weak-areas").await
    }

    /// `GET /progress/activity?days=N`
    pub async fn activity(&self, days: u32) -> Result<Value> {
        self.send_json(ApiRequest::get("/progress/activity").query("days", days))
            .await
    }

    /// `GET /progress/stats`
    pub async fn stats(&self) -> Result<Value> {
        self.get("/progress/stats").await
    }
}
