//! Custom assertions for timelines.

use crate::model::InstanceStatus;
use crate::timeline::{DaySection, ItemRef, Timeline};

/// Assert that `item` is on the timeline with `status`.
///
/// # Panics
///
/// Panics with the timeline's items if the item is missing or differs.
///
/// # Example
///
/// ```rust,ignore
/// let timeline = aggregator.timeline(today, &AssigneeFilter::All).await;
/// assert_item_status(&timeline, &ItemRef::Routine(stretch), InstanceStatus::Completed);
/// ```
pub fn assert_item_status(timeline: &Timeline, item: &ItemRef, status: InstanceStatus) {
    let found = timeline.find(item).unwrap_or_else(|| {
        panic!(
            "Expected {:?} on {}, but it is missing.\nItems: {:?}",
            item,
            timeline.date,
            timeline.items().map(|i| &i.item).collect::<Vec<_>>()
        )
    });
    assert_eq!(
        found.status, status,
        "Expected {:?} to be {}, but it is {}",
        item, status, found.status
    );
}

/// Assert that `item` sits in `section`.
///
/// # Panics
///
/// Panics if the item is in another section or missing.
pub fn assert_in_section(timeline: &Timeline, item: &ItemRef, section: DaySection) {
    let actual = timeline
        .sections
        .iter()
        .find(|s| s.items.iter().any(|i| &i.item == item))
        .map(|s| s.section);
    assert_eq!(
        actual,
        Some(section),
        "Expected {:?} in {}, found in {:?}",
        item,
        section,
        actual
    );
}

/// Assert the completion counters.
///
/// # Panics
///
/// Panics if either counter differs.
pub fn assert_progress(timeline: &Timeline, completed: usize, total: usize) {
    assert_eq!(
        (timeline.completed, timeline.total),
        (completed, total),
        "Expected {}/{} completed on {}, got {}/{}",
        completed,
        total,
        timeline.date,
        timeline.completed,
        timeline.total
    );
}
