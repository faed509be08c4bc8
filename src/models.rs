use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("unknown {kind} status `{value}`")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

macro_rules! status_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseStatusError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

status_enum!(QueueStatus, "queue", {
    Queued => "queued",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

status_enum!(ProcessingStatus, "processing", {
    Success => "success",
    PendingApproval => "pending_approval",
    Failed => "failed",
    Rejected => "rejected",
});

status_enum!(ApprovalStatus, "approval", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

impl QueueStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub paperless_url: String,
    #[serde(skip_serializing)]
    pub paperless_token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(
        username: impl Into<String>,
        paperless_url: impl Into<String>,
        paperless_token: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            paperless_url: paperless_url.into(),
            paperless_token: paperless_token.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub paperless_document_id: i64,
    pub priority: i32,
    pub status: QueueStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

impl QueueItem {
    pub fn new(user_id: Uuid, paperless_document_id: i64, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            paperless_document_id,
            priority,
            status: QueueStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub paperless_document_id: i64,
    pub processed_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    pub confidence_score: Option<f64>,
    pub original_data: Option<Value>,
    pub suggested_data: Option<Value>,
    pub applied_data: Option<Value>,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub reprocess_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalEntry {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub suggestions: Value,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
    pub status: ApprovalStatus,
}

/// Everything a successful run persists, committed together with the
/// queue item's transition to `Completed`.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub user_id: Uuid,
    pub paperless_document_id: i64,
    pub status: ProcessingStatus,
    pub confidence_score: f64,
    pub original_data: Value,
    pub suggested_data: Value,
    pub applied_data: Option<Value>,
    pub processing_time_ms: i64,
    /// Present when the result was diverted to the approval queue.
    pub approval_suggestions: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl QueueCounts {
    pub fn record(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Queued => self.queued += 1,
            QueueStatus::Processing => self.processing += 1,
            QueueStatus::Completed => self.completed += 1,
            QueueStatus::Failed => self.failed += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearedCounts {
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueSummary {
    pub added: u64,
    pub already_queued: u64,
    pub queue_was_reset: bool,
    pub cleared: ClearedCounts,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProcessingStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub pending_approval: u64,
    pub rejected: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ApprovalStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub approval_rate: f64,
}

pub(crate) fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
