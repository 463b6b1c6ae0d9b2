//! Mock collaborators.
//!
//! Builder-configured, in-memory stand-ins for the task, routine and
//! calendar sources. Clones share their call counters, so a test can keep
//! one handle while the aggregator owns another.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::model::{EntityId, UserId};
use crate::sources::{
    CalendarEventRecord, CalendarSource, RoutineRecord, RoutineSource, TaskRecord, TaskSource,
};

/// Mock task collaborator.
///
/// # Example
///
/// ```rust,ignore
/// let tasks = MockTaskSource::new()
///     .with_task(task("rent", "Pay rent", "2024-01-15"));
///
/// assert_eq!(tasks.tasks_for_date(&alice, jan_15).await.unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTaskSource {
    tasks: Vec<TaskRecord>,
    error: Option<String>,
    calls: Arc<AtomicU32>,
}

impl MockTaskSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; it is returned for its scheduled date only.
    #[must_use]
    pub fn with_task(mut self, task: TaskRecord) -> Self {
        self.tasks.push(task);
        self
    }

    /// Fail every call with `error`.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Number of `tasks_for_date` calls so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskSource for MockTaskSource {
    async fn tasks_for_date(&self, _user: &UserId, date: NaiveDate) -> Result<Vec<TaskRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            bail!("{}", error);
        }
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.scheduled_for.date() == date)
            .cloned()
            .collect())
    }
}

/// Mock routine collaborator.
///
/// Routines added with [`with_routine`](Self::with_routine) fire every day;
/// [`with_routine_on`](Self::with_routine_on) restricts one to a single date.
#[derive(Debug, Clone, Default)]
pub struct MockRoutineSource {
    routines: Vec<(RoutineRecord, Option<NaiveDate>)>,
    error: Option<String>,
    calls: Arc<AtomicU32>,
    lookups: Arc<AtomicU32>,
}

impl MockRoutineSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_routine(mut self, routine: RoutineRecord) -> Self {
        self.routines.push((routine, None));
        self
    }

    #[must_use]
    pub fn with_routine_on(mut self, routine: RoutineRecord, date: NaiveDate) -> Self {
        self.routines.push((routine, Some(date)));
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of single-routine lookups so far.
    pub fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<()> {
        match &self.error {
            Some(error) => bail!("{}", error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RoutineSource for MockRoutineSource {
    async fn routines_for_date(
        &self,
        _user: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<RoutineRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fail()?;
        Ok(self
            .routines
            .iter()
            .filter(|(_, on)| on.map_or(true, |d| d == date))
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn routine(&self, _user: &UserId, id: &EntityId) -> Result<Option<RoutineRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.fail()?;
        Ok(self
            .routines
            .iter()
            .find(|(r, _)| &r.id == id)
            .map(|(r, _)| r.clone()))
    }
}

/// Mock calendar collaborator. Events are returned on their start date,
/// read in the offset they were given with.
#[derive(Debug, Clone, Default)]
pub struct MockCalendarSource {
    events: Vec<CalendarEventRecord>,
    error: Option<String>,
    calls: Arc<AtomicU32>,
    lookups: Arc<AtomicU32>,
}

impl MockCalendarSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event(mut self, event: CalendarEventRecord) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarSource for MockCalendarSource {
    async fn events_for_date(
        &self,
        _user: &UserId,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEventRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            bail!("{}", error);
        }
        Ok(self
            .events
            .iter()
            .filter(|e| e.start.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn event(&self, _user: &UserId, id: &EntityId) -> Result<Option<CalendarEventRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            bail!("{}", error);
        }
        Ok(self.events.iter().find(|e| &e.id == id).cloned())
    }
}
