//! In-process store backend.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::StoreBackend;
use crate::error::{DaybookError, Result};
use crate::model::{
    ActionableInstance, CoverageRequest, CoverageRequestId, InstanceId, InstanceKey, InstanceNote,
    NoteId, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    instances: Vec<ActionableInstance>,
    notes: Vec<InstanceNote>,
    coverage: Vec<CoverageRequest>,
}

/// Store backend keeping all rows in memory.
///
/// Clones share the same tables. A failure message can be injected with
/// [`MemoryBackend::fail_with`] to exercise store-error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
    unique_instances: bool,
    failure: Arc<std::sync::RwLock<Option<String>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject a second instance row for the same (user, kind, entity, date).
    #[must_use]
    pub fn with_unique_instances(mut self) -> Self {
        self.unique_instances = true;
        self
    }

    /// Make every subsequent call fail with `message`.
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut slot) = self.failure.write() {
            *slot = Some(message.to_string());
        }
    }

    /// Stop injecting failures.
    pub fn recover(&self) {
        if let Ok(mut slot) = self.failure.write() {
            *slot = None;
        }
    }

    /// Total instance rows across all users.
    pub async fn instance_count(&self) -> usize {
        self.tables.read().await.instances.len()
    }

    fn check(&self, operation: &str) -> Result<()> {
        match self.failure.read().ok().and_then(|slot| slot.clone()) {
            Some(message) => Err(DaybookError::store(operation, message)),
            None => Ok(()),
        }
    }
}

fn matches_key(instance: &ActionableInstance, user: &UserId, key: &InstanceKey) -> bool {
    &instance.user_id == user
        && instance.kind == key.kind
        && instance.entity_id == key.entity_id
        && instance.date == key.date
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn find_instances(
        &self,
        user: &UserId,
        key: &InstanceKey,
    ) -> Result<Vec<ActionableInstance>> {
        self.check("find_instances")?;
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .iter()
            .filter(|i| matches_key(i, user, key))
            .cloned()
            .collect())
    }

    async fn list_instances(
        &self,
        user: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActionableInstance>> {
        self.check("list_instances")?;
        let tables = self.tables.read().await;
        let mut rows: Vec<ActionableInstance> = tables
            .instances
            .iter()
            .filter(|i| &i.user_id == user && i.date >= from && i.date <= to)
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal keys.
        rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        Ok(rows)
    }

    async fn insert_instance(&self, instance: ActionableInstance) -> Result<ActionableInstance> {
        self.check("insert_instance")?;
        let mut tables = self.tables.write().await;
        if self.unique_instances {
            let key = instance.key();
            if let Some(existing) = tables
                .instances
                .iter()
                .find(|i| matches_key(i, &instance.user_id, &key))
            {
                debug!(key = %key, "Unique instance already present");
                return Ok(existing.clone());
            }
        }
        tables.instances.push(instance.clone());
        Ok(instance)
    }

    async fn update_instance(&self, instance: &ActionableInstance) -> Result<bool> {
        self.check("update_instance")?;
        let mut tables = self.tables.write().await;
        match tables
            .instances
            .iter_mut()
            .find(|i| i.id == instance.id && i.user_id == instance.user_id)
        {
            Some(row) => {
                *row = instance.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_notes(&self, instance: InstanceId) -> Result<Vec<InstanceNote>> {
        self.check("list_notes")?;
        let tables = self.tables.read().await;
        let mut notes: Vec<InstanceNote> = tables
            .notes
            .iter()
            .filter(|n| n.instance_id == instance)
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    async fn insert_note(&self, note: InstanceNote) -> Result<InstanceNote> {
        self.check("insert_note")?;
        self.tables.write().await.notes.push(note.clone());
        Ok(note)
    }

    async fn delete_note(&self, author: &UserId, note: NoteId) -> Result<bool> {
        self.check("delete_note")?;
        let mut tables = self.tables.write().await;
        let before = tables.notes.len();
        tables
            .notes
            .retain(|n| !(n.id == note && &n.author == author));
        Ok(tables.notes.len() < before)
    }

    async fn list_coverage(&self, instance: InstanceId) -> Result<Vec<CoverageRequest>> {
        self.check("list_coverage")?;
        let tables = self.tables.read().await;
        let mut requests: Vec<CoverageRequest> = tables
            .coverage
            .iter()
            .filter(|r| r.instance_id == instance)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }

    async fn get_coverage(&self, id: CoverageRequestId) -> Result<Option<CoverageRequest>> {
        self.check("get_coverage")?;
        let tables = self.tables.read().await;
        Ok(tables.coverage.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_coverage(&self, request: CoverageRequest) -> Result<CoverageRequest> {
        self.check("insert_coverage")?;
        self.tables.write().await.coverage.push(request.clone());
        Ok(request)
    }

    async fn update_coverage(&self, request: &CoverageRequest) -> Result<bool> {
        self.check("update_coverage")?;
        let mut tables = self.tables.write().await;
        match tables
            .coverage
            .iter_mut()
            .find(|r| r.id == request.id && r.is_open())
        {
            Some(row) => {
                row.covered_by = request.covered_by.clone();
                row.status = request.status;
                row.responded_at = request.responded_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_open_coverage(&self, excluding: &UserId) -> Result<Vec<CoverageRequest>> {
        self.check("list_open_coverage")?;
        let tables = self.tables.read().await;
        let mut requests: Vec<CoverageRequest> = tables
            .coverage
            .iter()
            .filter(|r| r.is_open() && &r.requested_by != excluding)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        Ok(requests)
    }
}
