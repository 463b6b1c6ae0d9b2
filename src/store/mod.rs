//! Persistent store abstraction.
//!
//! [`StoreBackend`] is the boundary to the relational store holding three
//! logical tables: instances, notes and coverage requests. Instance rows are
//! scoped to their owning user; notes are writable only by their author;
//! coverage requests are the explicit cross-user delegation path and are
//! readable by any authenticated caller.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryBackend`] - in-process tables, used by tests and embedders
//! - [`SqliteBackend`] - a SQLite file via `rusqlite`, used by the CLI
//!
//! Neither backend deduplicates instances unless built with the
//! unique-instance option; readers tolerate duplicates (see
//! [`latest_of`]).

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{
    ActionableInstance, CoverageRequest, CoverageRequestId, InstanceId, InstanceKey, InstanceNote,
    NoteId, UserId,
};

/// CRUD against the instance, note and coverage-request tables.
///
/// Every method may suspend on I/O. Implementations must be `Send + Sync`
/// so one backend can be shared by the instance store, the delegation
/// subsystem and the timeline aggregator.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// All rows for `user` matching `key`. More than one row means a
    /// duplicate slipped in.
    async fn find_instances(
        &self,
        user: &UserId,
        key: &InstanceKey,
    ) -> Result<Vec<ActionableInstance>>;

    /// All rows for `user` dated within `from..=to`, ordered by date then
    /// creation time.
    async fn list_instances(
        &self,
        user: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActionableInstance>>;

    /// Insert a row. With a uniqueness constraint on the key, returns the
    /// existing row instead of inserting a second one.
    async fn insert_instance(&self, instance: ActionableInstance) -> Result<ActionableInstance>;

    /// Overwrite the mutable columns of an existing row owned by
    /// `instance.user_id`. Returns `false` when no such row exists.
    async fn update_instance(&self, instance: &ActionableInstance) -> Result<bool>;

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Notes on `instance`, oldest first.
    async fn list_notes(&self, instance: InstanceId) -> Result<Vec<InstanceNote>>;

    async fn insert_note(&self, note: InstanceNote) -> Result<InstanceNote>;

    /// Delete `note` if `author` wrote it. Returns `false` otherwise.
    async fn delete_note(&self, author: &UserId, note: NoteId) -> Result<bool>;

    // ------------------------------------------------------------------
    // Coverage requests
    // ------------------------------------------------------------------

    /// Requests on `instance`, oldest first.
    async fn list_coverage(&self, instance: InstanceId) -> Result<Vec<CoverageRequest>>;

    async fn get_coverage(&self, id: CoverageRequestId) -> Result<Option<CoverageRequest>>;

    async fn insert_coverage(&self, request: CoverageRequest) -> Result<CoverageRequest>;

    /// Overwrite responder, status and responded-at of a pending request.
    /// Returns `false` when the request does not exist or was already
    /// answered.
    async fn update_coverage(&self, request: &CoverageRequest) -> Result<bool>;

    /// Pending requests made by anyone other than `excluding`, oldest first.
    async fn list_open_coverage(&self, excluding: &UserId) -> Result<Vec<CoverageRequest>>;
}

/// Pick the canonical row among duplicates sharing one key: the most
/// recently updated, then the most recently created.
#[must_use]
pub fn latest_of(instances: Vec<ActionableInstance>) -> Option<ActionableInstance> {
    instances
        .into_iter()
        .max_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then(a.created_at.cmp(&b.created_at))
        })
}
