//! Per-occurrence instance store.
//!
//! [`InstanceStore`] is the sole source of truth for occurrence state. Each
//! public operation maps to one user action and never returns an error:
//! reads fold failures into `None` / an empty vector, writes into `false`
//! plus a message in the shared [`LastError`] slot. The `try_*` variants
//! expose the underlying [`Result`] for callers inside the crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use daybook::{InstanceStore, EntityKind, EntityId};
//!
//! let store = InstanceStore::new(backend, session, ids);
//! let stretch = EntityId::new("stretch");
//! store.mark_done(EntityKind::Routine, &stretch, today).await;
//! assert_eq!(store.get_instances_for_date(today).await.len(), 1);
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{DaybookError, LastError, Result};
use crate::identity::{IdGenerator, SessionProvider};
use crate::model::{ActionableInstance, EntityId, EntityKind, InstanceId, InstanceKey, UserId};
use crate::store::{latest_of, StoreBackend};

/// Instance store bound to one session.
///
/// Cheap to clone; clones share the backend, session and error slot.
#[derive(Clone)]
pub struct InstanceStore {
    backend: Arc<dyn StoreBackend>,
    session: Arc<dyn SessionProvider>,
    ids: Arc<dyn IdGenerator>,
    last_error: LastError,
}

impl std::fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStore")
            .field("user", &self.session.current_user())
            .field("last_error", &self.last_error.get())
            .finish_non_exhaustive()
    }
}

impl InstanceStore {
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        session: Arc<dyn SessionProvider>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            backend,
            session,
            ids,
            last_error: LastError::new(),
        }
    }

    /// Report write failures into an existing slot.
    #[must_use]
    pub fn with_last_error(mut self, slot: LastError) -> Self {
        self.last_error = slot;
        self
    }

    /// Most recent write failure, for display only.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }

    pub fn clear_last_error(&self) {
        self.last_error.clear();
    }

    /// Handle on the shared error slot.
    pub fn error_slot(&self) -> LastError {
        self.last_error.clone()
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.session.current_user()
    }

    // ------------------------------------------------------------------
    // Crate-internal plumbing shared with delegation and the timeline
    // ------------------------------------------------------------------

    pub(crate) fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    pub(crate) fn next_id(&self) -> uuid::Uuid {
        self.ids.next_id()
    }

    pub(crate) fn require_user(&self) -> Result<UserId> {
        self.session
            .current_user()
            .ok_or(DaybookError::NotAuthenticated)
    }

    /// Fold a read failure into `empty`.
    pub(crate) fn fold_read<T>(&self, operation: &str, result: Result<T>, empty: T) -> T {
        match result {
            Ok(value) => value,
            Err(DaybookError::NotAuthenticated) => {
                debug!(operation, "No session; returning empty result");
                empty
            }
            Err(err) => {
                warn!(operation, error = %err, "Read failed; returning empty result");
                empty
            }
        }
    }

    /// Fold a write failure into `fallback` and record it for display.
    pub(crate) fn fold_write<T>(&self, operation: &str, result: Result<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(operation, error = %err, "Write failed");
                self.last_error.set(format!("{}: {}", operation, err));
                fallback
            }
        }
    }

    // ------------------------------------------------------------------
    // Fallible core
    // ------------------------------------------------------------------

    async fn find_latest(
        &self,
        user: &UserId,
        key: &InstanceKey,
    ) -> Result<Option<ActionableInstance>> {
        let rows = self.backend.find_instances(user, key).await?;
        if rows.len() > 1 {
            debug!(key = %key, count = rows.len(), "Duplicate instances; using latest write");
        }
        Ok(latest_of(rows))
    }

    pub async fn try_get_instance(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
    ) -> Result<Option<ActionableInstance>> {
        let user = self.require_user()?;
        self.find_latest(&user, &InstanceKey::new(kind, entity_id, date))
            .await
    }

    pub(crate) async fn get_or_create_for(
        &self,
        user: &UserId,
        key: InstanceKey,
    ) -> Result<ActionableInstance> {
        if let Some(existing) = self.find_latest(user, &key).await? {
            return Ok(existing);
        }
        let fresh = ActionableInstance::pending(
            InstanceId::from_uuid(self.ids.next_id()),
            user.clone(),
            key,
            Utc::now(),
        );
        let stored = self.backend.insert_instance(fresh).await?;
        debug!(id = %stored.id, key = %stored.key(), "Created instance");
        Ok(stored)
    }

    pub async fn try_get_or_create_instance(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
    ) -> Result<ActionableInstance> {
        let user = self.require_user()?;
        self.get_or_create_for(&user, InstanceKey::new(kind, entity_id, date))
            .await
    }

    pub(crate) async fn instances_in_range_for(
        &self,
        user: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActionableInstance>> {
        if from > to {
            return Err(DaybookError::invalid_input(
                "range",
                format!("{} is after {}", from, to),
            ));
        }
        self.backend.list_instances(user, from, to).await
    }

    pub async fn try_instances_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActionableInstance>> {
        let user = self.require_user()?;
        self.instances_in_range_for(&user, from, to).await
    }

    /// Apply `change` to the instance for `key`.
    ///
    /// With `create` unset a missing instance is a successful no-op.
    async fn try_mutate<F>(&self, key: InstanceKey, create: bool, change: F) -> Result<()>
    where
        F: FnOnce(&mut ActionableInstance, DateTime<Utc>) + Send,
    {
        let user = self.require_user()?;
        let current = if create {
            Some(self.get_or_create_for(&user, key.clone()).await?)
        } else {
            self.find_latest(&user, &key).await?
        };
        let Some(mut instance) = current else {
            debug!(key = %key, "Nothing to change");
            return Ok(());
        };

        let before = instance.status;
        change(&mut instance, Utc::now());
        if !self.backend.update_instance(&instance).await? {
            return Err(DaybookError::not_found("instance", instance.id));
        }
        info!(
            id = %instance.id,
            key = %instance.key(),
            from = %before,
            to = %instance.status,
            "Instance updated"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    pub async fn get_instance(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
    ) -> Option<ActionableInstance> {
        let result = self.try_get_instance(kind, entity_id, date).await;
        self.fold_read("get_instance", result, None)
    }

    /// Existing instance for the key, or a freshly inserted pending one.
    pub async fn get_or_create_instance(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
    ) -> Option<ActionableInstance> {
        let result = self
            .try_get_or_create_instance(kind, entity_id, date)
            .await
            .map(Some);
        self.fold_write("get_or_create_instance", result, None)
    }

    /// Every instance of the current user dated `date`, of any kind.
    pub async fn get_instances_for_date(&self, date: NaiveDate) -> Vec<ActionableInstance> {
        let result = self.try_instances_in_range(date, date).await;
        self.fold_read("get_instances_for_date", result, Vec::new())
    }

    /// Every instance of the current user dated within `from..=to`.
    pub async fn get_instances_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<ActionableInstance> {
        let result = self.try_instances_in_range(from, to).await;
        self.fold_read("get_instances_in_range", result, Vec::new())
    }

    pub async fn mark_done(&self, kind: EntityKind, entity_id: &EntityId, date: NaiveDate) -> bool {
        let key = InstanceKey::new(kind, entity_id, date);
        let result = self
            .try_mutate(key, true, |inst, now| inst.mark_done(now))
            .await
            .map(|()| true);
        self.fold_write("mark_done", result, false)
    }

    /// Back to pending. Succeeds without touching the store when there is
    /// no instance to undo.
    pub async fn undo_done(&self, kind: EntityKind, entity_id: &EntityId, date: NaiveDate) -> bool {
        let key = InstanceKey::new(kind, entity_id, date);
        let result = self
            .try_mutate(key, false, |inst, now| inst.undo_done(now))
            .await
            .map(|()| true);
        self.fold_write("undo_done", result, false)
    }

    pub async fn skip(&self, kind: EntityKind, entity_id: &EntityId, date: NaiveDate) -> bool {
        let key = InstanceKey::new(kind, entity_id, date);
        let result = self
            .try_mutate(key, true, |inst, now| inst.skip(now))
            .await
            .map(|()| true);
        self.fold_write("skip", result, false)
    }

    /// Move the occurrence to `target`. Same-day targets keep it pending
    /// with a shifted time; other days mark it deferred.
    pub async fn defer(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
        target: DateTime<FixedOffset>,
    ) -> bool {
        let key = InstanceKey::new(kind, entity_id, date);
        let result = self
            .try_mutate(key, true, move |inst, now| inst.defer(target, now))
            .await
            .map(|()| true);
        self.fold_write("defer", result, false)
    }

    /// Set or clear the assignee for this occurrence only.
    pub async fn assign(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
        assignee: Option<UserId>,
    ) -> bool {
        let key = InstanceKey::new(kind, entity_id, date);
        let result = self
            .try_mutate(key, true, move |inst, now| inst.assign(assignee, now))
            .await
            .map(|()| true);
        self.fold_write("assign", result, false)
    }
}
