//! Daily timeline aggregation.
//!
//! A [`Timeline`] merges one-shot tasks, routines and calendar events for a
//! date into day sections, with each routine and event projected through
//! its resolved instance state.
//!
//! - [`TimelineAggregator`] - fans out to the sources and the instance store
//! - [`AssigneeFilter`] - all / unassigned / one user
//! - [`SectionBounds`] / [`DaySection`] - hour boundaries and buckets
//! - [`resolve_instances`] - tie-break between same-day and carried-over rows

pub mod aggregator;
pub mod filter;
pub mod resolve;
pub mod sections;

pub use aggregator::TimelineAggregator;
pub use filter::AssigneeFilter;
pub use resolve::{resolve_instances, Resolution};
pub use sections::{DaySection, SectionBounds};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, EntityKind, InstanceId, InstanceStatus, TaskId, UserId};
use crate::sources::{CalendarEventRecord, RoutineRecord, TaskRecord};

// ============================================================================
// Timeline Item
// ============================================================================

/// Which source entity an item projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Task(TaskId),
    Routine(EntityId),
    CalendarEvent(EntityId),
}

impl ItemRef {
    /// Instance kind and id, for entities that track per-date instances.
    #[must_use]
    pub fn entity(&self) -> Option<(EntityKind, &EntityId)> {
        match self {
            ItemRef::Task(_) => None,
            ItemRef::Routine(id) => Some((EntityKind::Routine, id)),
            ItemRef::CalendarEvent(id) => Some((EntityKind::CalendarEvent, id)),
        }
    }
}

/// Ephemeral projection of a source entity plus its resolved state.
///
/// `start` and `end` are wall-clock times in the convention the source
/// stored them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub item: ItemRef,
    pub title: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
    pub status: InstanceStatus,
    pub instance_id: Option<InstanceId>,
    pub assignee: Option<UserId>,
    pub assignees: Vec<UserId>,
    /// Start replaced by a deferral target.
    pub time_overridden: bool,
    /// Deferred onto this date from an earlier one.
    pub carried_over: bool,
}

impl TimelineItem {
    #[must_use]
    pub fn from_task(task: &TaskRecord) -> Self {
        Self {
            item: ItemRef::Task(task.id.clone()),
            title: task.title.clone(),
            start: task.scheduled_for.start(),
            end: None,
            all_day: false,
            status: if task.completed {
                InstanceStatus::Completed
            } else {
                InstanceStatus::Pending
            },
            instance_id: None,
            assignee: task.assignee.clone(),
            assignees: task.assignees.clone(),
            time_overridden: false,
            carried_over: false,
        }
    }

    /// Project `routine` onto `date`.
    #[must_use]
    pub fn from_routine(routine: &RoutineRecord, date: NaiveDate) -> Self {
        let start = routine.time_of_day.map(|t| date.and_time(t));
        let end = start.zip(routine.duration_minutes).map(|(s, minutes)| {
            s + Duration::minutes(i64::from(minutes))
        });
        Self {
            item: ItemRef::Routine(routine.id.clone()),
            title: routine.name.clone(),
            start,
            end,
            all_day: false,
            status: InstanceStatus::Pending,
            instance_id: None,
            assignee: routine.assignee.clone(),
            assignees: routine.assignees.clone(),
            time_overridden: false,
            carried_over: false,
        }
    }

    #[must_use]
    pub fn from_event(event: &CalendarEventRecord) -> Self {
        Self {
            item: ItemRef::CalendarEvent(event.id.clone()),
            title: event.title.clone(),
            start: Some(event.start.naive_local()),
            end: event.end.map(|e| e.naive_local()),
            all_day: event.all_day,
            status: InstanceStatus::Pending,
            instance_id: None,
            assignee: None,
            assignees: Vec::new(),
            time_overridden: false,
            carried_over: false,
        }
    }

    /// Counts toward the day's total.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !matches!(
            self.status,
            InstanceStatus::Skipped | InstanceStatus::Deferred
        )
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == InstanceStatus::Completed
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// Items in one day section, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSection {
    pub section: DaySection,
    pub items: Vec<TimelineItem>,
}

/// Aggregated view of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub date: NaiveDate,
    /// Every [`DaySection`], in order, including empty ones.
    pub sections: Vec<TimelineSection>,
    pub completed: usize,
    pub total: usize,
}

impl Timeline {
    /// A timeline with no items.
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self::build(date, Vec::new(), &SectionBounds::default())
    }

    /// Bucket `items` and compute the completion counters.
    #[must_use]
    pub fn build(date: NaiveDate, items: Vec<TimelineItem>, bounds: &SectionBounds) -> Self {
        let completed = items.iter().filter(|i| i.is_completed()).count();
        let total = items.iter().filter(|i| i.is_actionable()).count();
        let sections = sections::bucket(items, bounds)
            .into_iter()
            .map(|(section, items)| TimelineSection { section, items })
            .collect();
        Self {
            date,
            sections,
            completed,
            total,
        }
    }

    /// Items in `section`.
    #[must_use]
    pub fn section(&self, section: DaySection) -> &[TimelineItem] {
        self.sections
            .iter()
            .find(|s| s.section == section)
            .map(|s| s.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn items(&self) -> impl Iterator<Item = &TimelineItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    /// Find the item projecting `item`.
    #[must_use]
    pub fn find(&self, item: &ItemRef) -> Option<&TimelineItem> {
        self.items().find(|i| &i.item == item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
