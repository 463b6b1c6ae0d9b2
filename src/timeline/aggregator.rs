//! Timeline aggregation for one date.

use chrono::{Days, NaiveDate};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::filter::AssigneeFilter;
use super::resolve::{apply_resolution, resolve_instances, Resolution};
use super::{Timeline, TimelineItem};
use crate::config::TimelineConfig;
use crate::instances::InstanceStore;
use crate::model::{EntityKind, UserId};
use crate::sources::{CalendarEventRecord, CalendarSource, RoutineSource, TaskSource};

/// Builds [`Timeline`]s from the collaborators and the instance store.
///
/// Aggregation never fails: a collaborator that errors contributes nothing,
/// is logged, and its message lands in the store's last-error slot.
#[derive(Clone)]
pub struct TimelineAggregator {
    store: InstanceStore,
    tasks: Arc<dyn TaskSource>,
    routines: Arc<dyn RoutineSource>,
    calendar: Arc<dyn CalendarSource>,
    config: TimelineConfig,
}

impl std::fmt::Debug for TimelineAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineAggregator")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TimelineAggregator {
    pub fn new(
        store: InstanceStore,
        tasks: Arc<dyn TaskSource>,
        routines: Arc<dyn RoutineSource>,
        calendar: Arc<dyn CalendarSource>,
    ) -> Self {
        Self {
            store,
            tasks,
            routines,
            calendar,
            config: TimelineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: TimelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Aggregated, filtered and bucketed view of `date` for the current user.
    pub async fn timeline(&self, date: NaiveDate, filter: &AssigneeFilter) -> Timeline {
        let bounds = self.config.section_bounds();
        let Some(user) = self.store.current_user() else {
            debug!(%date, "No session; empty timeline");
            return Timeline::build(date, Vec::new(), &bounds);
        };

        let window_start = date
            .checked_sub_days(Days::new(u64::from(self.config.carry_over_days)))
            .unwrap_or(date);
        let (tasks, routines, events, instances) = futures::join!(
            self.tasks.tasks_for_date(&user, date),
            self.routines.routines_for_date(&user, date),
            self.calendar.events_for_date(&user, date),
            self.store.instances_in_range_for(&user, window_start, date),
        );
        let tasks = self.degrade("tasks", tasks);
        let routines = self.degrade("routines", routines);
        let events = self.degrade("events", events);
        let instances = self.degrade("instances", instances.map_err(anyhow::Error::from));
        debug!(
            %date,
            tasks = tasks.len(),
            routines = routines.len(),
            events = events.len(),
            instances = instances.len(),
            "Fetched timeline sources"
        );

        let events = if self.config.dedupe_events {
            dedupe_events(events)
        } else {
            events
        };

        let mut items: Vec<TimelineItem> = tasks.iter().map(TimelineItem::from_task).collect();
        items.extend(
            routines
                .iter()
                .filter(|r| r.active)
                .map(|r| TimelineItem::from_routine(r, date)),
        );
        items.extend(events.iter().map(TimelineItem::from_event));

        let resolved = resolve_instances(instances, date);
        let mut present = HashSet::new();
        for item in &mut items {
            let Some(key) = item.item.entity().map(|(kind, id)| (kind, id.clone())) else {
                continue;
            };
            if let Some(resolution) = resolved.get(&key) {
                apply_resolution(item, resolution, date);
            }
            present.insert(key);
        }

        let stranded: Vec<&Resolution> = resolved
            .iter()
            .filter(|(key, r)| r.carried_over && !present.contains(*key))
            .map(|(_, r)| r)
            .collect();
        if !stranded.is_empty() {
            let lookups = stranded
                .into_iter()
                .map(|r| self.carry_over_item(&user, r, date));
            items.extend(join_all(lookups).await.into_iter().flatten());
        }

        items.retain(|item| filter.matches_item(item));
        let timeline = Timeline::build(date, items, &bounds);
        debug!(
            %date,
            %filter,
            items = timeline.len(),
            completed = timeline.completed,
            total = timeline.total,
            "Built timeline"
        );
        timeline
    }

    /// Project an instance deferred onto `date` whose entity is not on
    /// today's source lists.
    async fn carry_over_item(
        &self,
        user: &UserId,
        resolution: &Resolution,
        date: NaiveDate,
    ) -> Option<TimelineItem> {
        let instance = &resolution.instance;
        let found = match instance.kind {
            EntityKind::Routine => self
                .routines
                .routine(user, &instance.entity_id)
                .await
                .map(|r| {
                    r.filter(|r| r.active)
                        .map(|r| TimelineItem::from_routine(&r, date))
                }),
            EntityKind::CalendarEvent => self
                .calendar
                .event(user, &instance.entity_id)
                .await
                .map(|e| e.map(|e| TimelineItem::from_event(&e))),
        };
        match found {
            Ok(Some(mut item)) => {
                apply_resolution(&mut item, resolution, date);
                Some(item)
            }
            Ok(None) => {
                debug!(key = %instance.key(), "Carried-over entity no longer exists");
                None
            }
            Err(err) => {
                self.degrade::<TimelineItem>(instance.kind.as_str(), Err(err));
                None
            }
        }
    }

    fn degrade<T>(&self, source: &str, result: anyhow::Result<Vec<T>>) -> Vec<T> {
        result.unwrap_or_else(|err| {
            warn!(source, error = %err, "Timeline source failed; continuing without it");
            self.store
                .error_slot()
                .set(format!("timeline {}: {:#}", source, err));
            Vec::new()
        })
    }
}

/// Keep the first event for each (title, start).
fn dedupe_events(events: Vec<CalendarEventRecord>) -> Vec<CalendarEventRecord> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert((e.title.clone(), e.start)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, InstanceStatus};
    use crate::testing::{
        at, date, event, routine, task, Harness, MockCalendarSource, MockRoutineSource,
        MockTaskSource,
    };
    use crate::timeline::{DaySection, ItemRef};

    fn standup() -> ItemRef {
        ItemRef::CalendarEvent(EntityId::new("standup"))
    }

    fn stretch() -> ItemRef {
        ItemRef::Routine(EntityId::new("stretch"))
    }

    #[tokio::test]
    async fn test_merges_and_buckets_sources() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new().with_task(task("rent", "Pay rent", "2024-01-15")),
            MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
            MockCalendarSource::new().with_event(event("standup", "Standup", "2024-01-15T09:00:00+00:00")),
        );

        let timeline = aggregator
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await;
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.section(DaySection::Morning).len(), 2);
        assert_eq!(timeline.section(DaySection::Unscheduled).len(), 1);
        assert_eq!((timeline.completed, timeline.total), (0, 3));
    }

    #[tokio::test]
    async fn test_duplicate_events_collapse() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new(),
            MockCalendarSource::new()
                .with_event(event("standup", "Standup", "2024-01-15T09:00:00+00:00"))
                .with_event(event("standup-copy", "Standup", "2024-01-15T09:00:00+00:00"))
                .with_event(event("retro", "Standup", "2024-01-15T15:00:00+00:00")),
        );
        let timeline = aggregator
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await;
        assert_eq!(timeline.len(), 2);
        assert!(timeline.find(&standup()).is_some());

        let mut config = TimelineConfig::default();
        config.dedupe_events = false;
        let timeline = aggregator
            .with_config(config)
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await;
        assert_eq!(timeline.len(), 3);
    }

    #[tokio::test]
    async fn test_completed_and_skipped_propagate() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
            MockCalendarSource::new().with_event(event("standup", "Standup", "2024-01-15T09:00:00+00:00")),
        );
        let d = date("2024-01-15");
        harness
            .store
            .mark_done(EntityKind::Routine, &EntityId::new("stretch"), d)
            .await;
        harness
            .store
            .skip(EntityKind::CalendarEvent, &EntityId::new("standup"), d)
            .await;

        let timeline = aggregator.timeline(d, &AssigneeFilter::All).await;
        assert_eq!(timeline.find(&stretch()).unwrap().status, InstanceStatus::Completed);
        assert_eq!(timeline.find(&standup()).unwrap().status, InstanceStatus::Skipped);
        assert_eq!((timeline.completed, timeline.total), (1, 1));
    }

    #[tokio::test]
    async fn test_same_day_deferral_moves_section() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
            MockCalendarSource::new(),
        );
        let d = date("2024-01-15");
        harness
            .store
            .defer(
                EntityKind::Routine,
                &EntityId::new("stretch"),
                d,
                at("2024-01-15T18:00:00+00:00"),
            )
            .await;

        let timeline = aggregator.timeline(d, &AssigneeFilter::All).await;
        let evening = timeline.section(DaySection::Evening);
        assert_eq!(evening.len(), 1);
        assert!(evening[0].time_overridden);
        assert_eq!(evening[0].status, InstanceStatus::Pending);
    }

    #[tokio::test]
    async fn test_completed_after_shift_returns_to_source_section() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
            MockCalendarSource::new(),
        );
        let d = date("2024-01-15");
        let stretch = EntityId::new("stretch");
        harness
            .store
            .defer(
                EntityKind::Routine,
                &stretch,
                d,
                at("2024-01-15T18:00:00+00:00"),
            )
            .await;
        assert!(harness.store.mark_done(EntityKind::Routine, &stretch, d).await);

        let timeline = aggregator.timeline(d, &AssigneeFilter::All).await;
        assert!(timeline.section(DaySection::Evening).is_empty());
        let morning = timeline.section(DaySection::Morning);
        assert_eq!(morning.len(), 1);
        assert_eq!(morning[0].status, InstanceStatus::Completed);
        assert!(!morning[0].time_overridden);
    }

    #[tokio::test]
    async fn test_deferral_lands_on_next_day() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
            MockCalendarSource::new(),
        );
        harness
            .store
            .defer(
                EntityKind::Routine,
                &EntityId::new("stretch"),
                date("2024-01-15"),
                at("2024-01-16T14:00:00+00:00"),
            )
            .await;

        let today = aggregator
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await;
        assert_eq!(today.find(&stretch()).unwrap().status, InstanceStatus::Deferred);
        assert_eq!(today.total, 0);

        let tomorrow = aggregator
            .timeline(date("2024-01-16"), &AssigneeFilter::All)
            .await;
        let item = tomorrow.find(&stretch()).unwrap();
        assert_eq!(item.status, InstanceStatus::Pending);
        assert!(item.carried_over);
        assert_eq!(tomorrow.section(DaySection::Afternoon).len(), 1);
    }

    #[tokio::test]
    async fn test_today_action_beats_carry_over() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(routine("stretch", "Stretch", Some("07:30"))),
            MockCalendarSource::new(),
        );
        let stretch_id = EntityId::new("stretch");
        harness
            .store
            .defer(
                EntityKind::Routine,
                &stretch_id,
                date("2024-01-15"),
                at("2024-01-16T14:00:00+00:00"),
            )
            .await;
        harness
            .store
            .mark_done(EntityKind::Routine, &stretch_id, date("2024-01-16"))
            .await;

        let timeline = aggregator
            .timeline(date("2024-01-16"), &AssigneeFilter::All)
            .await;
        let item = timeline.find(&stretch()).unwrap();
        assert_eq!(item.status, InstanceStatus::Completed);
        assert!(!item.carried_over);
        assert!(!item.time_overridden);
    }

    #[tokio::test]
    async fn test_carried_over_event_is_looked_up() {
        let harness = Harness::new();
        let calendar = MockCalendarSource::new().with_event(event(
            "dentist",
            "Dentist",
            "2024-01-15T10:00:00+00:00",
        ));
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new(),
            calendar.clone(),
        );
        harness
            .store
            .defer(
                EntityKind::CalendarEvent,
                &EntityId::new("dentist"),
                date("2024-01-15"),
                at("2024-01-16T08:00:00+00:00"),
            )
            .await;

        let timeline = aggregator
            .timeline(date("2024-01-16"), &AssigneeFilter::All)
            .await;
        let morning = timeline.section(DaySection::Morning);
        assert_eq!(morning.len(), 1);
        assert_eq!(morning[0].title, "Dentist");
        assert!(morning[0].carried_over);
        assert_eq!(calendar.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_assignee_override_feeds_filter() {
        let harness = Harness::new();
        let mut shared = routine("stretch", "Stretch", Some("07:30"));
        shared.assignees = vec![UserId::new("alice")];
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(shared),
            MockCalendarSource::new(),
        );
        let d = date("2024-01-15");
        let only_bob = AssigneeFilter::User(UserId::new("bob"));
        assert!(aggregator.timeline(d, &only_bob).await.is_empty());

        harness
            .store
            .assign(
                EntityKind::Routine,
                &EntityId::new("stretch"),
                d,
                Some(UserId::new("bob")),
            )
            .await;
        assert_eq!(aggregator.timeline(d, &only_bob).await.len(), 1);
        assert!(aggregator
            .timeline(d, &AssigneeFilter::User(UserId::new("alice")))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_inactive_routines_are_dropped() {
        let harness = Harness::new();
        let mut paused = routine("water", "Water plants", None);
        paused.active = false;
        let aggregator = harness.aggregator(
            MockTaskSource::new(),
            MockRoutineSource::new().with_routine(paused),
            MockCalendarSource::new(),
        );
        assert!(aggregator
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_degrades() {
        let harness = Harness::new();
        let aggregator = harness.aggregator(
            MockTaskSource::new().with_task(task("rent", "Pay rent", "2024-01-15")),
            MockRoutineSource::new().with_error("routine service unavailable"),
            MockCalendarSource::new(),
        );
        let timeline = aggregator
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await;
        assert_eq!(timeline.len(), 1);
        let message = harness.store.last_error().unwrap();
        assert!(message.contains("routine service unavailable"));
    }

    #[tokio::test]
    async fn test_no_session_is_empty() {
        let harness = Harness::new();
        let tasks = MockTaskSource::new().with_task(task("rent", "Pay rent", "2024-01-15"));
        let aggregator = harness.aggregator(
            tasks.clone(),
            MockRoutineSource::new(),
            MockCalendarSource::new(),
        );
        harness.session.sign_out();

        let timeline = aggregator
            .timeline(date("2024-01-15"), &AssigneeFilter::All)
            .await;
        assert!(timeline.is_empty());
        assert_eq!(timeline.sections.len(), 5);
        assert_eq!(tasks.call_count(), 0);
    }
}
