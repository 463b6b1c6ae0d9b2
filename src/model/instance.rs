//! Occurrence state types and transitions.
//!
//! - [`EntityKind`] - Which recurring source an occurrence belongs to
//! - [`InstanceStatus`] - Status of one occurrence on one date
//! - [`ActionableInstance`] - The persisted per-date record

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{EntityId, InstanceId, UserId};

// ============================================================================
// Entity Kind
// ============================================================================

/// Kind of recurring entity an instance tracks.
///
/// One-shot tasks carry their own completion flag and never get instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Routine,
    CalendarEvent,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Routine => "routine",
            EntityKind::CalendarEvent => "calendar_event",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Ok(EntityKind::Routine),
            "calendar_event" | "event" => Ok(EntityKind::CalendarEvent),
            other => Err(format!(
                "unknown entity kind '{}' (expected routine or calendar_event)",
                other
            )),
        }
    }
}

// ============================================================================
// Instance Status
// ============================================================================

/// Status of one occurrence.
///
/// # State Transitions
///
/// - `Pending` -> `Completed`: mark done
/// - `Completed` -> `Pending`: undo done
/// - `Pending` -> `Skipped`: skip
/// - `Pending` -> `Pending`: defer within the same day (time overridden)
/// - `Pending` -> `Deferred`: defer to another day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
    Deferred,
}

impl InstanceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Skipped => "skipped",
            InstanceStatus::Deferred => "deferred",
        }
    }

    /// Terminal for the instance's own date.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstanceStatus::Pending)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstanceStatus::Pending),
            "completed" => Ok(InstanceStatus::Completed),
            "skipped" => Ok(InstanceStatus::Skipped),
            "deferred" => Ok(InstanceStatus::Deferred),
            other => Err(format!("unknown instance status '{}'", other)),
        }
    }
}

// ============================================================================
// Instance Key
// ============================================================================

/// Logical identity of an occurrence, minus the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub date: NaiveDate,
}

impl InstanceKey {
    pub fn new(kind: EntityKind, entity_id: &EntityId, date: NaiveDate) -> Self {
        Self {
            kind,
            entity_id: entity_id.clone(),
            date,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.entity_id, self.date)
    }
}

// ============================================================================
// Actionable Instance
// ============================================================================

/// Status of one occurrence of a routine or calendar event on one date.
///
/// Created lazily with status `Pending` on first interaction and only
/// mutated by explicit user actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableInstance {
    pub id: InstanceId,
    pub user_id: UserId,
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub date: NaiveDate,
    pub status: InstanceStatus,
    /// Assignee for this occurrence only.
    pub assignee_override: Option<UserId>,
    /// Target of a deferral, or a same-day time shift while still pending.
    pub deferred_to: Option<DateTime<FixedOffset>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionableInstance {
    /// Build a fresh pending instance for `key`.
    #[must_use]
    pub fn pending(id: InstanceId, user_id: UserId, key: InstanceKey, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            kind: key.kind,
            entity_id: key.entity_id,
            date: key.date,
            status: InstanceStatus::Pending,
            assignee_override: None,
            deferred_to: None,
            completed_at: None,
            skipped_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.kind, &self.entity_id, self.date)
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(now);
        self.skipped_at = None;
        self.updated_at = now;
    }

    pub fn undo_done(&mut self, now: DateTime<Utc>) {
        self.status = InstanceStatus::Pending;
        self.completed_at = None;
        self.skipped_at = None;
        self.updated_at = now;
    }

    pub fn skip(&mut self, now: DateTime<Utc>) {
        self.status = InstanceStatus::Skipped;
        self.skipped_at = Some(now);
        self.completed_at = None;
        self.updated_at = now;
    }

    /// Defer to `target`.
    ///
    /// A target on the instance's own date only shifts the time and keeps
    /// the occurrence pending; any other date moves it away.
    pub fn defer(&mut self, target: DateTime<FixedOffset>, now: DateTime<Utc>) {
        self.status = if target.date_naive() == self.date {
            InstanceStatus::Pending
        } else {
            InstanceStatus::Deferred
        };
        self.deferred_to = Some(target);
        self.completed_at = None;
        self.skipped_at = None;
        self.updated_at = now;
    }

    pub fn assign(&mut self, assignee: Option<UserId>, now: DateTime<Utc>) {
        self.assignee_override = assignee;
        self.updated_at = now;
    }

    /// Calendar date of the deferral target, read in the offset it was stored with.
    #[must_use]
    pub fn deferred_date(&self) -> Option<NaiveDate> {
        self.deferred_to.map(|t| t.date_naive())
    }

    /// Whether this instance was deferred onto `date` from another day.
    #[must_use]
    pub fn lands_on(&self, date: NaiveDate) -> bool {
        self.status == InstanceStatus::Deferred
            && self.date != date
            && self.deferred_date() == Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn instance(on: &str) -> ActionableInstance {
        ActionableInstance::pending(
            InstanceId::from_uuid(Uuid::from_u128(1)),
            UserId::new("alice"),
            InstanceKey::new(EntityKind::Routine, &EntityId::new("stretch"), date(on)),
            Utc::now(),
        )
    }

    fn at(offset_hours: i32, y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("routine".parse::<EntityKind>().unwrap(), EntityKind::Routine);
        assert_eq!("event".parse::<EntityKind>().unwrap(), EntityKind::CalendarEvent);
        assert_eq!(
            "Calendar_Event".parse::<EntityKind>().unwrap(),
            EntityKind::CalendarEvent
        );
        assert!("task".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EntityKind::CalendarEvent).unwrap(),
            "\"calendar_event\""
        );
    }

    #[test]
    fn test_done_and_undo() {
        let mut inst = instance("2024-01-15");
        inst.mark_done(Utc::now());
        assert_eq!(inst.status, InstanceStatus::Completed);
        assert!(inst.completed_at.is_some());

        inst.undo_done(Utc::now());
        assert_eq!(inst.status, InstanceStatus::Pending);
        assert!(inst.completed_at.is_none());
    }

    #[test]
    fn test_transitions_clear_other_terminal_time() {
        let mut inst = instance("2024-01-15");
        inst.mark_done(Utc::now());
        inst.skip(Utc::now());
        assert_eq!(inst.status, InstanceStatus::Skipped);
        assert!(inst.completed_at.is_none());
        assert!(inst.skipped_at.is_some());

        inst.mark_done(Utc::now());
        assert!(inst.completed_at.is_some());
        assert!(inst.skipped_at.is_none());

        inst.defer(at(0, 2024, 1, 16, 9), Utc::now());
        assert_eq!(inst.status, InstanceStatus::Deferred);
        assert!(inst.completed_at.is_none());
        assert!(inst.skipped_at.is_none());
    }

    #[test]
    fn test_defer_same_day_stays_pending() {
        let mut inst = instance("2024-01-15");
        let target = at(0, 2024, 1, 15, 18);
        inst.defer(target, Utc::now());
        assert_eq!(inst.status, InstanceStatus::Pending);
        assert_eq!(inst.deferred_to, Some(target));
    }

    #[test]
    fn test_defer_other_day_is_deferred() {
        let mut inst = instance("2024-01-15");
        let target = at(0, 2024, 1, 16, 9);
        inst.defer(target, Utc::now());
        assert_eq!(inst.status, InstanceStatus::Deferred);
        assert!(inst.lands_on(date("2024-01-16")));
        assert!(!inst.lands_on(date("2024-01-15")));
    }

    #[test]
    fn test_deferred_date_uses_stored_offset() {
        // 08:30 at +09:00 is 23:30 on the 14th in UTC.
        let mut inst = instance("2024-01-14");
        let target = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, 8, 30, 0)
            .unwrap();
        assert_eq!(target.with_timezone(&Utc).date_naive(), date("2024-01-14"));
        inst.defer(target, Utc::now());
        assert_eq!(inst.deferred_date(), Some(date("2024-01-15")));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!InstanceStatus::Pending.is_terminal());
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Skipped.is_terminal());
        assert!(InstanceStatus::Deferred.is_terminal());
    }
}
