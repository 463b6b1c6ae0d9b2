//! Instance resolution for one date.
//!
//! Several stored rows can speak for the same entity on a date: the row
//! dated that day, duplicates of it, and rows from earlier days deferred
//! onto it. A same-day row always wins; carry-over rows count only when
//! nothing is stored for the day itself.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::TimelineItem;
use crate::model::{ActionableInstance, EntityId, EntityKind, InstanceStatus};

/// The instance chosen for one entity on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub instance: ActionableInstance,
    /// Dated earlier and deferred onto the date.
    pub carried_over: bool,
}

fn newer(candidate: &ActionableInstance, current: &ActionableInstance) -> bool {
    (candidate.updated_at, candidate.created_at) > (current.updated_at, current.created_at)
}

/// Pick one instance per entity for `date`.
///
/// Rows dated after `date` and earlier rows not deferred onto it are ignored.
#[must_use]
pub fn resolve_instances(
    rows: Vec<ActionableInstance>,
    date: NaiveDate,
) -> HashMap<(EntityKind, EntityId), Resolution> {
    let mut resolved: HashMap<(EntityKind, EntityId), Resolution> = HashMap::new();
    for row in rows {
        let carried_over = if row.date == date {
            false
        } else if row.lands_on(date) {
            true
        } else {
            continue;
        };

        let key = (row.kind, row.entity_id.clone());
        let replace = match resolved.get(&key) {
            None => true,
            Some(current) => match (current.carried_over, carried_over) {
                (true, false) => true,
                (false, true) => false,
                _ => newer(&row, &current.instance),
            },
        };
        if replace {
            resolved.insert(
                key,
                Resolution {
                    instance: row,
                    carried_over,
                },
            );
        }
    }
    resolved
}

/// Project a resolved instance onto `item` as displayed on `date`.
pub fn apply_resolution(item: &mut TimelineItem, resolution: &Resolution, date: NaiveDate) {
    let instance = &resolution.instance;
    item.instance_id = Some(instance.id);
    item.carried_over = resolution.carried_over;

    if let Some(assignee) = &instance.assignee_override {
        item.assignee = Some(assignee.clone());
        item.assignees.clear();
    }

    let lands_today = instance.deferred_date() == Some(date);
    item.status = match instance.status {
        InstanceStatus::Deferred if lands_today => InstanceStatus::Pending,
        other => other,
    };

    // Completed and skipped rows keep the source time.
    let shifted = lands_today
        && matches!(
            instance.status,
            InstanceStatus::Pending | InstanceStatus::Deferred
        );
    if let Some(target) = instance.deferred_to.filter(|_| shifted) {
        let start = target.naive_local();
        item.end = match (item.start, item.end) {
            (Some(old_start), Some(old_end)) => Some(start + (old_end - old_start)),
            _ => None,
        };
        item.start = Some(start);
        item.all_day = false;
        item.time_overridden = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceId, InstanceKey, UserId};
    use crate::timeline::ItemRef;
    use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn row(n: u128, on: &str, age_minutes: i64) -> ActionableInstance {
        ActionableInstance::pending(
            InstanceId::from_uuid(Uuid::from_u128(n)),
            UserId::new("alice"),
            InstanceKey::new(EntityKind::Routine, &EntityId::new("stretch"), d(on)),
            Utc::now() - Duration::minutes(age_minutes),
        )
    }

    fn at(offset_hours: i32, day: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, day, h, m, 0)
            .unwrap()
    }

    fn stretch_item(start: &str, end: &str) -> TimelineItem {
        let parse = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap();
        TimelineItem {
            item: ItemRef::Routine(EntityId::new("stretch")),
            title: "Stretch".to_string(),
            start: Some(parse(start)),
            end: Some(parse(end)),
            all_day: false,
            status: InstanceStatus::Pending,
            instance_id: None,
            assignee: None,
            assignees: vec![UserId::new("alice"), UserId::new("carol")],
            time_overridden: false,
            carried_over: false,
        }
    }

    fn only(map: HashMap<(EntityKind, EntityId), Resolution>) -> Resolution {
        assert_eq!(map.len(), 1);
        map.into_values().next().unwrap()
    }

    #[test]
    fn test_same_day_row_beats_carry_over() {
        let mut yesterday = row(1, "2024-01-14", 10);
        yesterday.defer(at(0, 15, 9, 0), Utc::now());
        let today = row(2, "2024-01-15", 60);

        let picked = only(resolve_instances(
            vec![yesterday, today.clone()],
            d("2024-01-15"),
        ));
        assert_eq!(picked.instance.id, today.id);
        assert!(!picked.carried_over);
    }

    #[test]
    fn test_carry_over_when_nothing_stored_today() {
        let mut yesterday = row(1, "2024-01-14", 10);
        yesterday.defer(at(0, 15, 9, 0), Utc::now());

        let picked = only(resolve_instances(vec![yesterday.clone()], d("2024-01-15")));
        assert_eq!(picked.instance.id, yesterday.id);
        assert!(picked.carried_over);
    }

    #[test]
    fn test_unrelated_rows_are_ignored() {
        let pending_yesterday = row(1, "2024-01-14", 10);
        let mut elsewhere = row(2, "2024-01-14", 10);
        elsewhere.defer(at(0, 17, 9, 0), Utc::now());
        let tomorrow = row(3, "2024-01-16", 10);

        let map = resolve_instances(
            vec![pending_yesterday, elsewhere, tomorrow],
            d("2024-01-15"),
        );
        assert!(map.is_empty());
    }

    #[test]
    fn test_duplicates_resolve_to_latest_write() {
        let older = row(1, "2024-01-15", 30);
        let mut newer = row(2, "2024-01-15", 20);
        newer.skip(Utc::now());

        let picked = only(resolve_instances(vec![newer.clone(), older], d("2024-01-15")));
        assert_eq!(picked.instance.id, newer.id);
    }

    #[test]
    fn test_apply_completed_keeps_time() {
        let mut inst = row(1, "2024-01-15", 0);
        inst.mark_done(Utc::now());
        let mut item = stretch_item("2024-01-15 07:00", "2024-01-15 07:30");
        let resolution = Resolution {
            instance: inst.clone(),
            carried_over: false,
        };
        apply_resolution(&mut item, &resolution, d("2024-01-15"));
        assert_eq!(item.status, InstanceStatus::Completed);
        assert_eq!(item.instance_id, Some(inst.id));
        assert!(!item.time_overridden);
    }

    #[test]
    fn test_apply_same_day_shift_moves_window() {
        let mut inst = row(1, "2024-01-15", 0);
        inst.defer(at(0, 15, 18, 0), Utc::now());
        let mut item = stretch_item("2024-01-15 07:00", "2024-01-15 07:30");
        apply_resolution(
            &mut item,
            &Resolution {
                instance: inst,
                carried_over: false,
            },
            d("2024-01-15"),
        );
        assert_eq!(item.status, InstanceStatus::Pending);
        assert!(item.time_overridden);
        assert_eq!(item.start.unwrap().to_string(), "2024-01-15 18:00:00");
        assert_eq!(item.end.unwrap().to_string(), "2024-01-15 18:30:00");
    }

    #[test]
    fn test_apply_finished_after_shift_keeps_source_time() {
        let finish: [fn(&mut ActionableInstance); 2] = [
            |inst| inst.mark_done(Utc::now()),
            |inst| inst.skip(Utc::now()),
        ];
        for close in finish {
            let mut inst = row(1, "2024-01-15", 0);
            inst.defer(at(0, 15, 18, 0), Utc::now());
            close(&mut inst);
            let expected = inst.status;
            let mut item = stretch_item("2024-01-15 07:00", "2024-01-15 07:30");
            apply_resolution(
                &mut item,
                &Resolution {
                    instance: inst,
                    carried_over: false,
                },
                d("2024-01-15"),
            );
            assert_eq!(item.status, expected);
            assert!(!item.time_overridden);
            assert_eq!(item.start.unwrap().to_string(), "2024-01-15 07:00:00");
            assert_eq!(item.end.unwrap().to_string(), "2024-01-15 07:30:00");
        }
    }

    #[test]
    fn test_apply_deferred_away_stays_deferred() {
        let mut inst = row(1, "2024-01-15", 0);
        inst.defer(at(0, 16, 9, 0), Utc::now());
        let mut item = stretch_item("2024-01-15 07:00", "2024-01-15 07:30");
        apply_resolution(
            &mut item,
            &Resolution {
                instance: inst,
                carried_over: false,
            },
            d("2024-01-15"),
        );
        assert_eq!(item.status, InstanceStatus::Deferred);
        assert!(!item.time_overridden);
        assert_eq!(item.start.unwrap().to_string(), "2024-01-15 07:00:00");
    }

    #[test]
    fn test_apply_carry_over_uses_stored_offset() {
        // 23:30 at +09:00 is still the 15th where it was entered.
        let mut inst = row(1, "2024-01-14", 0);
        inst.defer(at(9, 15, 23, 30), Utc::now());
        let mut item = stretch_item("2024-01-15 07:00", "2024-01-15 07:30");
        apply_resolution(
            &mut item,
            &Resolution {
                instance: inst,
                carried_over: true,
            },
            d("2024-01-15"),
        );
        assert_eq!(item.status, InstanceStatus::Pending);
        assert!(item.carried_over);
        assert_eq!(item.start.unwrap().to_string(), "2024-01-15 23:30:00");
    }

    #[test]
    fn test_apply_assignee_override_replaces_both_fields() {
        let mut inst = row(1, "2024-01-15", 0);
        inst.assign(Some(UserId::new("bob")), Utc::now());
        let mut item = stretch_item("2024-01-15 07:00", "2024-01-15 07:30");
        apply_resolution(
            &mut item,
            &Resolution {
                instance: inst,
                carried_over: false,
            },
            d("2024-01-15"),
        );
        assert_eq!(item.assignee, Some(UserId::new("bob")));
        assert!(item.assignees.is_empty());
    }
}
