//! Coverage requests and instance notes.
//!
//! Both hang off an instance, so every write that names an occurrence
//! first gets-or-creates it through the [`InstanceStore`]. Failure policy
//! matches the store: reads fold to empty, writes fold to `false`/`None`
//! and record the message in the shared error slot.

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::{DaybookError, Result};
use crate::instances::InstanceStore;
use crate::model::{
    CoverageRequest, CoverageRequestId, EntityId, EntityKind, InstanceId, InstanceKey,
    InstanceNote, NoteId,
};

/// Notes and coverage requests for the session's user.
#[derive(Debug, Clone)]
pub struct Delegation {
    store: InstanceStore,
}

impl Delegation {
    /// Share the store's backend, session, ids and error slot.
    pub fn new(store: InstanceStore) -> Self {
        Self { store }
    }

    pub fn last_error(&self) -> Option<String> {
        self.store.last_error()
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub async fn try_get_notes(&self, instance: InstanceId) -> Result<Vec<InstanceNote>> {
        self.store.require_user()?;
        self.store.backend().list_notes(instance).await
    }

    pub async fn try_add_note(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
        text: &str,
    ) -> Result<InstanceNote> {
        let user = self.store.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DaybookError::invalid_input("text", "note text is blank"));
        }
        let instance = self
            .store
            .get_or_create_for(&user, InstanceKey::new(kind, entity_id, date))
            .await?;
        let note = InstanceNote {
            id: NoteId::from_uuid(self.store.next_id()),
            instance_id: instance.id,
            author: user,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let note = self.store.backend().insert_note(note).await?;
        debug!(note = %note.id, instance = %note.instance_id, "Note added");
        Ok(note)
    }

    pub async fn try_delete_note(&self, note: NoteId) -> Result<()> {
        let user = self.store.require_user()?;
        if self.store.backend().delete_note(&user, note).await? {
            debug!(note = %note, "Note deleted");
            Ok(())
        } else {
            Err(DaybookError::not_found("note", note))
        }
    }

    /// Notes on `instance`, oldest first.
    pub async fn get_notes(&self, instance: InstanceId) -> Vec<InstanceNote> {
        let result = self.try_get_notes(instance).await;
        self.store.fold_read("get_notes", result, Vec::new())
    }

    /// Attach a note to the occurrence, creating its instance if needed.
    pub async fn add_note(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
        text: &str,
    ) -> Option<InstanceNote> {
        let result = self
            .try_add_note(kind, entity_id, date, text)
            .await
            .map(Some);
        self.store.fold_write("add_note", result, None)
    }

    /// Delete one of the current user's notes.
    pub async fn delete_note(&self, note: NoteId) -> bool {
        let result = self.try_delete_note(note).await.map(|()| true);
        self.store.fold_write("delete_note", result, false)
    }

    // ------------------------------------------------------------------
    // Coverage requests
    // ------------------------------------------------------------------

    pub async fn try_request_coverage(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
    ) -> Result<CoverageRequest> {
        let user = self.store.require_user()?;
        let instance = self
            .store
            .get_or_create_for(&user, InstanceKey::new(kind, entity_id, date))
            .await?;
        let request = CoverageRequest::new(
            CoverageRequestId::from_uuid(self.store.next_id()),
            instance.id,
            user,
            Utc::now(),
        );
        let request = self.store.backend().insert_coverage(request).await?;
        info!(request = %request.id, instance = %request.instance_id, "Coverage requested");
        Ok(request)
    }

    pub async fn try_get_coverage_requests(
        &self,
        instance: InstanceId,
    ) -> Result<Vec<CoverageRequest>> {
        self.store.require_user()?;
        self.store.backend().list_coverage(instance).await
    }

    pub async fn try_respond_to_coverage(
        &self,
        request: CoverageRequestId,
        accept: bool,
    ) -> Result<CoverageRequest> {
        let user = self.store.require_user()?;
        let backend = self.store.backend();
        let mut current = backend
            .get_coverage(request)
            .await?
            .ok_or_else(|| DaybookError::not_found("coverage request", request))?;
        if !current.is_open() {
            return Err(already_answered(&current));
        }

        if accept {
            current.accept(user, Utc::now());
        } else {
            current.decline(Utc::now());
        }
        // The write only lands while the row is still pending.
        if !backend.update_coverage(&current).await? {
            return match backend.get_coverage(request).await? {
                Some(winner) => Err(already_answered(&winner)),
                None => Err(DaybookError::not_found("coverage request", request)),
            };
        }
        info!(request = %request, status = %current.status, "Coverage answered");
        Ok(current)
    }

    pub async fn try_open_coverage_requests(&self) -> Result<Vec<CoverageRequest>> {
        let user = self.store.require_user()?;
        self.store.backend().list_open_coverage(&user).await
    }

    /// Ask someone else to take over this occurrence.
    pub async fn request_coverage(
        &self,
        kind: EntityKind,
        entity_id: &EntityId,
        date: NaiveDate,
    ) -> Option<CoverageRequest> {
        let result = self
            .try_request_coverage(kind, entity_id, date)
            .await
            .map(Some);
        self.store.fold_write("request_coverage", result, None)
    }

    /// Requests on `instance`, oldest first.
    pub async fn get_coverage_requests(&self, instance: InstanceId) -> Vec<CoverageRequest> {
        let result = self.try_get_coverage_requests(instance).await;
        self.store.fold_read("get_coverage_requests", result, Vec::new())
    }

    /// Accept (responder becomes the current user) or decline a pending request.
    pub async fn respond_to_coverage(&self, request: CoverageRequestId, accept: bool) -> bool {
        let result = self
            .try_respond_to_coverage(request, accept)
            .await
            .map(|_| true);
        self.store.fold_write("respond_to_coverage", result, false)
    }

    /// Pending requests other users have made.
    pub async fn open_coverage_requests(&self) -> Vec<CoverageRequest> {
        let result = self.try_open_coverage_requests().await;
        self.store.fold_read("open_coverage_requests", result, Vec::new())
    }
}

fn already_answered(request: &CoverageRequest) -> DaybookError {
    DaybookError::invalid_input(
        "request",
        format!("coverage request {} is already {}", request.id, request.status),
    )
}
