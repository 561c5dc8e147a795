use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_activities::{ActivityEvent, ActivityId, ActivityKind, ActivityStatus, Priority};
use forgecrm_auth::Visibility;
use forgecrm_core::UserId;
use forgecrm_directory::ContactId;
use forgecrm_events::EventEnvelope;
use forgecrm_pipeline::LeadId;

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::read_model::Store;

/// Queryable activity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReadModel {
    pub activity_id: ActivityId,
    pub kind: ActivityKind,
    pub subject: String,
    pub description: Option<String>,
    pub contact_id: Option<ContactId>,
    pub lead_id: Option<LeadId>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: ActivityStatus,
    pub assigned_to: Option<UserId>,
    pub priority: Priority,
    pub outcome: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}

/// Activity board projection.
#[derive(Debug)]
pub struct ActivityBoardProjection<S>
where
    S: Store<ActivityId, ActivityReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> ActivityBoardProjection<S>
where
    S: Store<ActivityId, ActivityReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, activity_id: &ActivityId) -> Option<ActivityReadModel> {
        self.store.get(activity_id)
    }

    /// Activities visible to the caller, most recently scheduled first.
    pub fn list_visible(&self, visibility: Visibility) -> Vec<ActivityReadModel> {
        let mut activities: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|a| visibility.allows(&[a.assigned_to, a.completed_by]))
            .collect();
        activities.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        activities
    }

    /// Activities scheduled within `[start, end)`, for calendars and reports.
    pub fn scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<ActivityReadModel> {
        let mut activities: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|a| a.scheduled_at >= start && a.scheduled_at < end)
            .collect();
        activities.sort_by_key(|a| a.scheduled_at);
        activities
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::ACTIVITY {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: ActivityEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            ActivityEvent::ActivityScheduled(e) => {
                self.store.upsert(
                    e.activity_id,
                    ActivityReadModel {
                        activity_id: e.activity_id,
                        kind: e.kind,
                        subject: e.subject,
                        description: e.description,
                        contact_id: e.contact_id,
                        lead_id: e.lead_id,
                        scheduled_at: e.scheduled_at,
                        duration_minutes: e.duration_minutes,
                        status: ActivityStatus::Scheduled,
                        assigned_to: e.assigned_to,
                        priority: e.priority,
                        outcome: None,
                        completed_at: None,
                        completed_by: None,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ActivityEvent::ActivityRescheduled(e) => {
                if let Some(mut rm) = self.store.get(&e.activity_id) {
                    rm.scheduled_at = e.scheduled_at;
                    rm.duration_minutes = e.duration_minutes;
                    rm.status = ActivityStatus::Rescheduled;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.activity_id, rm);
                }
            }
            ActivityEvent::ActivityCompleted(e) => {
                if let Some(mut rm) = self.store.get(&e.activity_id) {
                    rm.status = ActivityStatus::Completed;
                    rm.completed_at = Some(e.occurred_at);
                    rm.completed_by = Some(e.completed_by);
                    if e.outcome.is_some() {
                        rm.outcome = e.outcome;
                    }
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.activity_id, rm);
                }
            }
            ActivityEvent::ActivityCancelled(e) => {
                if let Some(mut rm) = self.store.get(&e.activity_id) {
                    rm.status = ActivityStatus::Cancelled;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.activity_id, rm);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryStore;
    use forgecrm_activities::activity::{ActivityCompleted, ActivityScheduled};
    use forgecrm_core::AggregateId;
    use std::sync::Arc;
    use uuid::Uuid;

    type TestProjection =
        ActivityBoardProjection<Arc<InMemoryStore<ActivityId, ActivityReadModel>>>;

    fn projection() -> TestProjection {
        ActivityBoardProjection::new(Arc::new(InMemoryStore::new()))
    }

    fn envelope(
        event: &ActivityEvent,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            None,
            aggregate_id,
            aggregate_types::ACTIVITY,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn scheduled(projection: &TestProjection, assigned_to: Option<UserId>) -> (AggregateId, ActivityId) {
        let agg = AggregateId::new();
        let activity_id = ActivityId::new(agg);
        let event = ActivityEvent::ActivityScheduled(ActivityScheduled {
            activity_id,
            kind: ActivityKind::Call,
            subject: "Follow up".to_string(),
            description: None,
            contact_id: Some(ContactId::new(AggregateId::new())),
            lead_id: None,
            scheduled_at: Utc::now(),
            duration_minutes: 30,
            assigned_to,
            priority: Priority::Medium,
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();
        (agg, activity_id)
    }

    #[test]
    fn completion_updates_status_and_stamps() {
        let projection = projection();
        let user = UserId::new();
        let (agg, activity_id) = scheduled(&projection, Some(user));

        let completed = ActivityEvent::ActivityCompleted(ActivityCompleted {
            activity_id,
            completed_by: user,
            outcome: Some("Reached decision maker".to_string()),
            next_action: None,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(&completed, agg, 2))
            .unwrap();

        let rm = projection.get(&activity_id).unwrap();
        assert_eq!(rm.status, ActivityStatus::Completed);
        assert_eq!(rm.completed_by, Some(user));
        assert!(rm.completed_at.is_some());
    }

    #[test]
    fn visibility_narrows_to_assignee() {
        let projection = projection();
        let mine = UserId::new();
        scheduled(&projection, Some(mine));
        scheduled(&projection, Some(UserId::new()));
        scheduled(&projection, None);

        assert_eq!(projection.list_visible(Visibility::Everything).len(), 3);
        assert_eq!(projection.list_visible(Visibility::Own(mine)).len(), 1);
    }
}
