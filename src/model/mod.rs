//! Persisted data model: instances, notes and coverage requests.

pub mod delegation;
pub mod ids;
pub mod instance;

pub use delegation::{CoverageRequest, CoverageStatus, InstanceNote};
pub use ids::{CoverageRequestId, EntityId, InstanceId, NoteId, TaskId, UserId};
pub use instance::{ActionableInstance, EntityKind, InstanceKey, InstanceStatus};
