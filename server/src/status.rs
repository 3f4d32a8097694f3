use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use tts_core::StatusNotifier;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLine {
    pub title: String,
    pub detail: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Keeps the latest status update for `GET /status`.
#[derive(Debug, Default)]
pub struct StatusBoard {
    latest: RwLock<StatusLine>,
}

impl StatusBoard {
    pub fn latest(&self) -> StatusLine {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusNotifier for StatusBoard {
    fn update_status(&self, title: &str, detail: &str) {
        info!(title, detail, "Status update");
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = StatusLine {
            title: title.to_string(),
            detail: detail.to_string(),
            updated_at: Some(Utc::now()),
        };
    }
}
