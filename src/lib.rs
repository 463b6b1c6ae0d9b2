//! daybook - per-occurrence completion tracking and daily timelines
//!
//! Tracks what happened to each occurrence of a routine or calendar event on
//! a given date, lets users annotate and hand off occurrences, and merges
//! tasks, routines and events into one sectioned view of a day.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`instances`] - Per-date instance store (done / undo / skip / defer / assign)
//! - [`delegation`] - Instance notes and coverage requests
//! - [`timeline`] - Daily aggregation, assignee filter and day sections
//! - [`store`] - Persistence backends (memory, SQLite)
//! - [`sources`] - Task, routine and calendar collaborator ports
//! - [`identity`] - Session and id generation
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Mock collaborators, fixtures and assertions
//!
//! # Example
//!
//! ```rust,ignore
//! use daybook::{AssigneeFilter, EntityKind, EntityId, InstanceStore, TimelineAggregator};
//!
//! let store = InstanceStore::new(backend, session, ids);
//! store.mark_done(EntityKind::Routine, &EntityId::new("stretch"), today).await;
//!
//! let aggregator = TimelineAggregator::new(store, tasks, routines, calendar);
//! let timeline = aggregator.timeline(today, &AssigneeFilter::All).await;
//! println!("{}/{} done", timeline.completed, timeline.total);
//! ```

pub mod config;
pub mod delegation;
pub mod error;
pub mod identity;
pub mod instances;
pub mod model;
pub mod sources;
pub mod store;
pub mod testing;
pub mod timeline;

// Re-export commonly used types
pub use error::{DaybookError, IntoDaybookError, LastError, Result};

pub use config::{DaybookConfig, StoreConfig, TimelineConfig};
pub use delegation::Delegation;
pub use identity::{
    IdGenerator, SequentialIdGenerator, SessionProvider, StaticSession, SwitchableSession,
    UuidGenerator,
};
pub use instances::InstanceStore;

pub use model::{
    ActionableInstance, CoverageRequest, CoverageRequestId, CoverageStatus, EntityId, EntityKind,
    InstanceId, InstanceKey, InstanceNote, InstanceStatus, NoteId, TaskId, UserId,
};

pub use sources::{
    CalendarEventRecord, CalendarSource, FileSources, RoutineRecord, RoutineSource, Schedule,
    TaskRecord, TaskSource,
};
pub use store::{MemoryBackend, SqliteBackend, StoreBackend};

pub use timeline::{
    AssigneeFilter, DaySection, ItemRef, SectionBounds, Timeline, TimelineAggregator,
    TimelineItem, TimelineSection,
};
