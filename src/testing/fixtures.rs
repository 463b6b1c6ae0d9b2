//! Test fixtures.
//!
//! [`Harness`] wires an in-memory backend, a switchable session signed in
//! as `alice` and sequential ids. The free functions build source records
//! from short string literals.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use std::sync::Arc;

use super::mocks::{MockCalendarSource, MockRoutineSource, MockTaskSource};
use crate::delegation::Delegation;
use crate::identity::{SequentialIdGenerator, SwitchableSession};
use crate::instances::InstanceStore;
use crate::model::{EntityId, TaskId};
use crate::sources::{CalendarEventRecord, RoutineRecord, Schedule, TaskRecord};
use crate::store::MemoryBackend;
use crate::timeline::TimelineAggregator;

/// A fully wired store for one test.
///
/// # Example
///
/// ```rust,ignore
/// let harness = Harness::new();
/// harness.store.mark_done(EntityKind::Routine, &stretch, today).await;
///
/// harness.session.sign_in("bob");
/// assert!(harness.store.get_instances_for_date(today).await.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Harness {
    pub backend: MemoryBackend,
    pub session: SwitchableSession,
    pub store: InstanceStore,
    pub delegation: Delegation,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Fresh harness signed in as `alice`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    #[must_use]
    pub fn with_backend(backend: MemoryBackend) -> Self {
        let session = SwitchableSession::new();
        session.sign_in("alice");
        let store = InstanceStore::new(
            Arc::new(backend.clone()),
            Arc::new(session.clone()),
            Arc::new(SequentialIdGenerator::new()),
        );
        let delegation = Delegation::new(store.clone());
        Self {
            backend,
            session,
            store,
            delegation,
        }
    }

    /// Aggregator over this harness's store and the given mocks.
    #[must_use]
    pub fn aggregator(
        &self,
        tasks: MockTaskSource,
        routines: MockRoutineSource,
        calendar: MockCalendarSource,
    ) -> TimelineAggregator {
        TimelineAggregator::new(
            self.store.clone(),
            Arc::new(tasks),
            Arc::new(routines),
            Arc::new(calendar),
        )
    }
}

/// Parse `YYYY-MM-DD`.
///
/// # Panics
///
/// Panics on a malformed date.
#[must_use]
pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("Invalid fixture date")
}

/// Parse an RFC 3339 timestamp, keeping its offset.
///
/// # Panics
///
/// Panics on a malformed timestamp.
#[must_use]
pub fn at(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).expect("Invalid fixture timestamp")
}

/// An active, unassigned routine. `time` is `HH:MM`.
///
/// # Panics
///
/// Panics on a malformed time.
#[must_use]
pub fn routine(id: &str, name: &str, time: Option<&str>) -> RoutineRecord {
    RoutineRecord {
        id: EntityId::new(id),
        name: name.to_string(),
        time_of_day: time
            .map(|t| NaiveTime::parse_from_str(t, "%H:%M").expect("Invalid fixture time")),
        duration_minutes: None,
        assignee: None,
        assignees: Vec::new(),
        active: true,
    }
}

/// A one-hour event starting at the RFC 3339 `start`.
#[must_use]
pub fn event(id: &str, title: &str, start: &str) -> CalendarEventRecord {
    let start = at(start);
    CalendarEventRecord {
        id: EntityId::new(id),
        title: title.to_string(),
        start,
        end: Some(start + chrono::Duration::hours(1)),
        all_day: false,
    }
}

/// An open task. `scheduled` is a bare date or an RFC 3339 timestamp.
#[must_use]
pub fn task(id: &str, title: &str, scheduled: &str) -> TaskRecord {
    let scheduled_for = if scheduled.contains('T') {
        Schedule::At(at(scheduled))
    } else {
        Schedule::Date(date(scheduled))
    };
    TaskRecord {
        id: TaskId::new(id),
        title: title.to_string(),
        scheduled_for,
        assignee: None,
        assignees: Vec::new(),
        completed: false,
    }
}
