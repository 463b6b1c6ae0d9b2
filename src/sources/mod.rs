//! Collaborator ports for the entities a timeline is built from.
//!
//! The task, routine and calendar collaborators own their entities and
//! recurrence rules; daybook only asks them what exists on a date.
//!
//! - [`TaskSource`] - one-shot tasks scheduled on a date
//! - [`RoutineSource`] - active routines whose recurrence fires on a date
//! - [`CalendarSource`] - calendar events starting on a date
//!
//! [`FileSources`] implements all three over a JSON document.

pub mod file;

pub use file::FileSources;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, TaskId, UserId};

// ============================================================================
// Records
// ============================================================================

/// When a one-shot task is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schedule {
    /// A specific time, with the offset it was entered in.
    At(DateTime<FixedOffset>),
    /// Some time on a date.
    Date(NaiveDate),
}

impl Schedule {
    /// Calendar date in the convention the schedule was stored with.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        match self {
            Schedule::At(at) => at.date_naive(),
            Schedule::Date(date) => *date,
        }
    }

    /// Wall-clock start, if the task has a time.
    #[must_use]
    pub fn start(&self) -> Option<NaiveDateTime> {
        match self {
            Schedule::At(at) => Some(at.naive_local()),
            Schedule::Date(_) => None,
        }
    }
}

/// A one-shot task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    pub scheduled_for: Schedule,
    #[serde(default)]
    pub assignee: Option<UserId>,
    #[serde(default)]
    pub assignees: Vec<UserId>,
    #[serde(default)]
    pub completed: bool,
}

/// A recurring routine as seen on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub time_of_day: Option<NaiveTime>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub assignee: Option<UserId>,
    #[serde(default)]
    pub assignees: Vec<UserId>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// An externally sourced calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventRecord {
    pub id: EntityId,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub all_day: bool,
}

// ============================================================================
// Ports
// ============================================================================

/// Task collaborator.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Tasks scheduled on `date` visible to `user`.
    async fn tasks_for_date(&self, user: &UserId, date: NaiveDate) -> Result<Vec<TaskRecord>>;
}

/// Routine collaborator. Owns the recurrence rule.
#[async_trait]
pub trait RoutineSource: Send + Sync {
    /// Active routines whose recurrence fires on `date`.
    async fn routines_for_date(&self, user: &UserId, date: NaiveDate)
        -> Result<Vec<RoutineRecord>>;

    /// Look up one routine regardless of whether it fires today.
    async fn routine(&self, user: &UserId, id: &EntityId) -> Result<Option<RoutineRecord>>;
}

/// Calendar collaborator.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Events starting on `date`, including duplicates from overlapping feeds.
    async fn events_for_date(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEventRecord>>;

    async fn event(&self, user: &UserId, id: &EntityId) -> Result<Option<CalendarEventRecord>>;
}
