//! JSON-file backed collaborators.
//!
//! One document holds tasks, routines and events:
//!
//! ```json
//! {
//!   "tasks": [
//!     {"id": "t1", "title": "Pay rent", "scheduled_for": "2024-01-15", "owner": "alice"}
//!   ],
//!   "routines": [
//!     {"id": "r1", "name": "Stretch", "time_of_day": "07:30:00", "weekdays": ["Mon", "Thu"]}
//!   ],
//!   "events": [
//!     {"id": "e1", "title": "Standup", "start": "2024-01-15T09:00:00+01:00"}
//!   ]
//! }
//! ```
//!
//! Records without an `owner` are visible to every user. A routine with no
//! `weekdays` fires every day.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{
    CalendarEventRecord, CalendarSource, RoutineRecord, RoutineSource, TaskRecord, TaskSource,
};
use crate::model::{EntityId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnedTask {
    #[serde(flatten)]
    record: TaskRecord,
    #[serde(default)]
    owner: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRoutine {
    #[serde(flatten)]
    record: RoutineRecord,
    #[serde(default)]
    owner: Option<UserId>,
    #[serde(default)]
    weekdays: Vec<Weekday>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnedEvent {
    #[serde(flatten)]
    record: CalendarEventRecord,
    #[serde(default)]
    owner: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SourceDocument {
    #[serde(default)]
    tasks: Vec<OwnedTask>,
    #[serde(default)]
    routines: Vec<FileRoutine>,
    #[serde(default)]
    events: Vec<OwnedEvent>,
}

fn visible(owner: &Option<UserId>, user: &UserId) -> bool {
    owner.as_ref().map_or(true, |o| o == user)
}

impl FileRoutine {
    fn fires_on(&self, date: NaiveDate) -> bool {
        self.record.active && (self.weekdays.is_empty() || self.weekdays.contains(&date.weekday()))
    }
}

/// Tasks, routines and events loaded from one JSON document.
#[derive(Debug, Clone, Default)]
pub struct FileSources {
    document: SourceDocument,
}

impl FileSources {
    /// No entities at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sources file: {}", path.display()))?;
        let sources = Self::from_json(&content)
            .with_context(|| format!("Failed to parse sources file: {}", path.display()))?;
        debug!(
            path = %path.display(),
            tasks = sources.document.tasks.len(),
            routines = sources.document.routines.len(),
            events = sources.document.events.len(),
            "Loaded sources"
        );
        Ok(sources)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let document: SourceDocument = serde_json::from_str(content)?;
        Ok(Self { document })
    }
}

#[async_trait]
impl TaskSource for FileSources {
    async fn tasks_for_date(&self, user: &UserId, date: NaiveDate) -> Result<Vec<TaskRecord>> {
        Ok(self
            .document
            .tasks
            .iter()
            .filter(|t| visible(&t.owner, user) && t.record.scheduled_for.date() == date)
            .map(|t| t.record.clone())
            .collect())
    }
}

#[async_trait]
impl RoutineSource for FileSources {
    async fn routines_for_date(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<RoutineRecord>> {
        Ok(self
            .document
            .routines
            .iter()
            .filter(|r| visible(&r.owner, user) && r.fires_on(date))
            .map(|r| r.record.clone())
            .collect())
    }

    async fn routine(&self, user: &UserId, id: &EntityId) -> Result<Option<RoutineRecord>> {
        Ok(self
            .document
            .routines
            .iter()
            .find(|r| visible(&r.owner, user) && &r.record.id == id)
            .map(|r| r.record.clone()))
    }
}

#[async_trait]
impl CalendarSource for FileSources {
    async fn events_for_date(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEventRecord>> {
        Ok(self
            .document
            .events
            .iter()
            .filter(|e| visible(&e.owner, user) && e.record.start.date_naive() == date)
            .map(|e| e.record.clone())
            .collect())
    }

    async fn event(&self, user: &UserId, id: &EntityId) -> Result<Option<CalendarEventRecord>> {
        Ok(self
            .document
            .events
            .iter()
            .find(|e| visible(&e.owner, user) && &e.record.id == id)
            .map(|e| e.record.clone()))
    }
}
