use crate::jobs::{RunRecord, RunState};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunCreatedResponse {
    pub run_id: String,
    pub status_url: String,
    pub video_url: String,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: RunState,
}

impl From<RunRecord> for RunStatusResponse {
    fn from(record: RunRecord) -> Self {
        Self {
            run_id: record.id,
            file_name: record.file_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
            finished_at: record.finished_at,
            state: record.state,
        }
    }
}

/// Body of every failed video request.
#[derive(Debug, Serialize)]
pub struct RunErrorResponse {
    pub error: String,
    pub stage: String,
    pub run_id: Option<String>,
}
