use tybridge_common::now_ms;

/// Queue item lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklogStatus {
    /// Waiting for the worker.
    Pending,
    /// Picked up; visible so a crash leaves evidence of what was in flight.
    Processing,
    /// Retries exhausted. Kept in the table for manual inspection; the
    /// worker never touches it again.
    Failed,
}

impl BacklogStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One deferred polling work unit: pull and process whatever accumulated on
/// a service account. The queue stores where to look, never message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogItem {
    pub id: i64,
    pub tenant_id: String,
    /// Channel service account to poll.
    pub resource: String,
    pub status: BacklogStatus,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl BacklogItem {
    #[must_use]
    pub fn new(tenant_id: &str, resource: &str) -> Self {
        let now = now_ms();
        Self {
            id: 0,
            tenant_id: tenant_id.to_string(),
            resource: resource.to_string(),
            status: BacklogStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
