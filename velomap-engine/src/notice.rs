use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// User-visible, dismissible message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Notices in arrival order
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>) -> Uuid {
        let notice = Notice {
            id: Uuid::now_v7(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        let id = notice.id;

        match level {
            NoticeLevel::Error => tracing::warn!("Notice: {}", notice.message),
            _ => tracing::debug!("Notice: {}", notice.message),
        }

        self.notices.push(notice);
        id
    }

    pub fn info(&mut self, message: impl Into<String>) -> Uuid {
        self.push(NoticeLevel::Info, message)
    }

    pub fn success(&mut self, message: impl Into<String>) -> Uuid {
        self.push(NoticeLevel::Success, message)
    }

    pub fn error(&mut self, message: impl Into<String>) -> Uuid {
        self.push(NoticeLevel::Error, message)
    }

    /// Remove a notice; false if it was already gone
    pub fn dismiss(&mut self, id: Uuid) -> bool {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != id);
        self.notices.len() != before
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
