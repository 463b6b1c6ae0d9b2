//! Notes and coverage requests attached to an instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{CoverageRequestId, InstanceId, NoteId, UserId};

/// Append-only free-text annotation on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNote {
    pub id: NoteId,
    pub instance_id: InstanceId,
    pub author: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a coverage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

impl CoverageStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Pending => "pending",
            CoverageStatus::Accepted => "accepted",
            CoverageStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CoverageStatus::Pending),
            "accepted" => Ok(CoverageStatus::Accepted),
            "declined" => Ok(CoverageStatus::Declined),
            other => Err(format!("unknown coverage status '{}'", other)),
        }
    }
}

/// Proposal asking another user to take over one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRequest {
    pub id: CoverageRequestId,
    pub instance_id: InstanceId,
    pub requested_by: UserId,
    /// Responder, set only once accepted.
    pub covered_by: Option<UserId>,
    pub status: CoverageStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl CoverageRequest {
    #[must_use]
    pub fn new(
        id: CoverageRequestId,
        instance_id: InstanceId,
        requested_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            instance_id,
            requested_by,
            covered_by: None,
            status: CoverageStatus::Pending,
            requested_at: now,
            responded_at: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == CoverageStatus::Pending
    }

    pub fn accept(&mut self, responder: UserId, now: DateTime<Utc>) {
        self.status = CoverageStatus::Accepted;
        self.covered_by = Some(responder);
        self.responded_at = Some(now);
    }

    pub fn decline(&mut self, now: DateTime<Utc>) {
        self.status = CoverageStatus::Declined;
        self.covered_by = None;
        self.responded_at = Some(now);
    }
}
