//! Day-section bucketing.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::TimelineItem;

/// Display bucket within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaySection {
    AllDay,
    Morning,
    Afternoon,
    Evening,
    Unscheduled,
}

impl DaySection {
    pub const ALL: [DaySection; 5] = [
        DaySection::AllDay,
        DaySection::Morning,
        DaySection::Afternoon,
        DaySection::Evening,
        DaySection::Unscheduled,
    ];

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            DaySection::AllDay => "All day",
            DaySection::Morning => "Morning",
            DaySection::Afternoon => "Afternoon",
            DaySection::Evening => "Evening",
            DaySection::Unscheduled => "Unscheduled",
        }
    }
}

impl fmt::Display for DaySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hours at which the afternoon and evening sections begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionBounds {
    afternoon_start_hour: u32,
    evening_start_hour: u32,
}

impl Default for SectionBounds {
    fn default() -> Self {
        Self::new(12, 17)
    }
}

impl SectionBounds {
    #[must_use]
    pub fn new(afternoon_start_hour: u32, evening_start_hour: u32) -> Self {
        Self {
            afternoon_start_hour,
            evening_start_hour,
        }
    }

    /// Section for `item`, judged on its (possibly overridden) start.
    #[must_use]
    pub fn section_for(&self, item: &TimelineItem) -> DaySection {
        if item.all_day {
            return DaySection::AllDay;
        }
        match item.start.map(|s| s.hour()) {
            None => DaySection::Unscheduled,
            Some(h) if h < self.afternoon_start_hour => DaySection::Morning,
            Some(h) if h < self.evening_start_hour => DaySection::Afternoon,
            Some(_) => DaySection::Evening,
        }
    }
}

/// Group `items` by section, every section present, each sorted by start
/// then title.
#[must_use]
pub fn bucket(
    items: Vec<TimelineItem>,
    bounds: &SectionBounds,
) -> BTreeMap<DaySection, Vec<TimelineItem>> {
    let mut buckets: BTreeMap<DaySection, Vec<TimelineItem>> =
        DaySection::ALL.iter().map(|s| (*s, Vec::new())).collect();
    for item in items {
        buckets
            .entry(bounds.section_for(&item))
            .or_default()
            .push(item);
    }
    for items in buckets.values_mut() {
        items.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, InstanceStatus};
    use crate::timeline::ItemRef;
    use chrono::NaiveDateTime;

    fn item(title: &str, start: Option<&str>, all_day: bool) -> TimelineItem {
        TimelineItem {
            item: ItemRef::Routine(EntityId::new(title)),
            title: title.to_string(),
            start: start.map(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()),
            end: None,
            all_day,
            status: InstanceStatus::Pending,
            instance_id: None,
            assignee: None,
            assignees: Vec::new(),
            time_overridden: false,
            carried_over: false,
        }
    }

    #[test]
    fn test_boundaries() {
        let bounds = SectionBounds::default();
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 00:00"), false)),
            DaySection::Morning
        );
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 11:59"), false)),
            DaySection::Morning
        );
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 12:00"), false)),
            DaySection::Afternoon
        );
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 17:00"), false)),
            DaySection::Evening
        );
        assert_eq!(
            bounds.section_for(&item("a", None, false)),
            DaySection::Unscheduled
        );
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 09:00"), true)),
            DaySection::AllDay
        );
    }

    #[test]
    fn test_custom_bounds() {
        let bounds = SectionBounds::new(11, 19);
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 11:30"), false)),
            DaySection::Afternoon
        );
        assert_eq!(
            bounds.section_for(&item("a", Some("2024-01-15 18:30"), false)),
            DaySection::Afternoon
        );
    }

    #[test]
    fn test_bucket_sorts_within_section() {
        let buckets = bucket(
            vec![
                item("lunch", Some("2024-01-15 12:30"), false),
                item("b-call", Some("2024-01-15 09:00"), false),
                item("a-call", Some("2024-01-15 09:00"), false),
                item("coffee", Some("2024-01-15 07:00"), false),
            ],
            &SectionBounds::default(),
        );
        assert_eq!(buckets.len(), 5);
        let morning: Vec<&str> = buckets[&DaySection::Morning]
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(morning, vec!["coffee", "a-call", "b-call"]);
        assert_eq!(buckets[&DaySection::Afternoon].len(), 1);
        assert!(buckets[&DaySection::Evening].is_empty());
    }
}
