use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_directory::ContactId;
use forgecrm_events::Event;
use forgecrm_pipeline::LeadId;

/// Activity identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(pub AggregateId);

impl ActivityId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What kind of interaction this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Call,
    Email,
    Meeting,
    SiteVisit,
    Demo,
    FollowUp,
    Quotation,
    Negotiation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Scheduled,
    Completed,
    Cancelled,
    Rescheduled,
}

/// Aggregate root: Activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    id: ActivityId,
    kind: ActivityKind,
    subject: String,
    description: Option<String>,
    contact_id: Option<ContactId>,
    lead_id: Option<LeadId>,
    scheduled_at: DateTime<Utc>,
    duration_minutes: u32,
    status: ActivityStatus,
    assigned_to: Option<UserId>,
    priority: Priority,
    outcome: Option<String>,
    next_action: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl Activity {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ActivityId) -> Self {
        Self {
            id,
            kind: ActivityKind::Other,
            subject: String::new(),
            description: None,
            contact_id: None,
            lead_id: None,
            scheduled_at: DateTime::<Utc>::UNIX_EPOCH,
            duration_minutes: 0,
            status: ActivityStatus::Scheduled,
            assigned_to: None,
            priority: Priority::default(),
            outcome: None,
            next_action: None,
            completed_at: None,
            completed_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ActivityId {
        self.id
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn contact_id(&self) -> Option<ContactId> {
        self.contact_id
    }

    pub fn lead_id(&self) -> Option<LeadId> {
        self.lead_id
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn status(&self) -> ActivityStatus {
        self.status
    }

    pub fn assigned_to(&self) -> Option<UserId> {
        self.assigned_to
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn completed_by(&self) -> Option<UserId> {
        self.completed_by
    }
}

impl AggregateRoot for Activity {
    type Id = ActivityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ScheduleActivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleActivity {
    pub activity_id: ActivityId,
    pub kind: ActivityKind,
    pub subject: String,
    pub description: Option<String>,
    pub contact_id: Option<ContactId>,
    pub lead_id: Option<LeadId>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub assigned_to: Option<UserId>,
    pub priority: Priority,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RescheduleActivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleActivity {
    pub activity_id: ActivityId,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteActivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteActivity {
    pub activity_id: ActivityId,
    pub completed_by: UserId,
    pub outcome: Option<String>,
    pub next_action: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelActivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelActivity {
    pub activity_id: ActivityId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityCommand {
    ScheduleActivity(ScheduleActivity),
    RescheduleActivity(RescheduleActivity),
    CompleteActivity(CompleteActivity),
    CancelActivity(CancelActivity),
}

/// Event: ActivityScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityScheduled {
    pub activity_id: ActivityId,
    pub kind: ActivityKind,
    pub subject: String,
    pub description: Option<String>,
    pub contact_id: Option<ContactId>,
    pub lead_id: Option<LeadId>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub assigned_to: Option<UserId>,
    pub priority: Priority,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActivityRescheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRescheduled {
    pub activity_id: ActivityId,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActivityCompleted — stamps actor and completion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCompleted {
    pub activity_id: ActivityId,
    pub completed_by: UserId,
    pub outcome: Option<String>,
    pub next_action: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActivityCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCancelled {
    pub activity_id: ActivityId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityEvent {
    ActivityScheduled(ActivityScheduled),
    ActivityRescheduled(ActivityRescheduled),
    ActivityCompleted(ActivityCompleted),
    ActivityCancelled(ActivityCancelled),
}

impl Event for ActivityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ActivityEvent::ActivityScheduled(_) => "activities.activity.scheduled",
            ActivityEvent::ActivityRescheduled(_) => "activities.activity.rescheduled",
            ActivityEvent::ActivityCompleted(_) => "activities.activity.completed",
            ActivityEvent::ActivityCancelled(_) => "activities.activity.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ActivityEvent::ActivityScheduled(e) => e.occurred_at,
            ActivityEvent::ActivityRescheduled(e) => e.occurred_at,
            ActivityEvent::ActivityCompleted(e) => e.occurred_at,
            ActivityEvent::ActivityCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Activity {
    type Command = ActivityCommand;
    type Event = ActivityEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ActivityEvent::ActivityScheduled(e) => {
                self.id = e.activity_id;
                self.kind = e.kind;
                self.subject = e.subject.clone();
                self.description = e.description.clone();
                self.contact_id = e.contact_id;
                self.lead_id = e.lead_id;
                self.scheduled_at = e.scheduled_at;
                self.duration_minutes = e.duration_minutes;
                self.status = ActivityStatus::Scheduled;
                self.assigned_to = e.assigned_to;
                self.priority = e.priority;
                self.created = true;
            }
            ActivityEvent::ActivityRescheduled(e) => {
                self.scheduled_at = e.scheduled_at;
                self.duration_minutes = e.duration_minutes;
                self.status = ActivityStatus::Rescheduled;
            }
            ActivityEvent::ActivityCompleted(e) => {
                self.status = ActivityStatus::Completed;
                self.completed_at = Some(e.occurred_at);
                self.completed_by = Some(e.completed_by);
                if e.outcome.is_some() {
                    self.outcome = e.outcome.clone();
                }
                self.next_action = e.next_action.clone();
            }
            ActivityEvent::ActivityCancelled(_) => {
                self.status = ActivityStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ActivityCommand::ScheduleActivity(cmd) => self.handle_schedule(cmd),
            ActivityCommand::RescheduleActivity(cmd) => self.handle_reschedule(cmd),
            ActivityCommand::CompleteActivity(cmd) => self.handle_complete(cmd),
            ActivityCommand::CancelActivity(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Activity {
    fn ensure_activity_id(&self, activity_id: ActivityId) -> Result<(), DomainError> {
        if self.id != activity_id {
            return Err(DomainError::invariant("activity_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        match self.status {
            ActivityStatus::Scheduled | ActivityStatus::Rescheduled => Ok(()),
            ActivityStatus::Completed => Err(DomainError::conflict("activity is completed")),
            ActivityStatus::Cancelled => Err(DomainError::conflict("activity is cancelled")),
        }
    }

    fn handle_schedule(&self, cmd: &ScheduleActivity) -> Result<Vec<ActivityEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("activity already exists"));
        }
        if cmd.subject.trim().is_empty() {
            return Err(DomainError::validation("subject cannot be empty"));
        }
        if cmd.contact_id.is_none() && cmd.lead_id.is_none() {
            return Err(DomainError::validation(
                "activity must reference a contact or a lead",
            ));
        }
        if cmd.duration_minutes == 0 {
            return Err(DomainError::validation("duration must be positive"));
        }

        Ok(vec![ActivityEvent::ActivityScheduled(ActivityScheduled {
            activity_id: cmd.activity_id,
            kind: cmd.kind,
            subject: cmd.subject.clone(),
            description: cmd.description.clone(),
            contact_id: cmd.contact_id,
            lead_id: cmd.lead_id,
            scheduled_at: cmd.scheduled_at,
            duration_minutes: cmd.duration_minutes,
            assigned_to: cmd.assigned_to,
            priority: cmd.priority,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reschedule(
        &self,
        cmd: &RescheduleActivity,
    ) -> Result<Vec<ActivityEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_activity_id(cmd.activity_id)?;

        let duration_minutes = cmd.duration_minutes.unwrap_or(self.duration_minutes);
        if duration_minutes == 0 {
            return Err(DomainError::validation("duration must be positive"));
        }

        Ok(vec![ActivityEvent::ActivityRescheduled(
            ActivityRescheduled {
                activity_id: cmd.activity_id,
                scheduled_at: cmd.scheduled_at,
                duration_minutes,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_complete(&self, cmd: &CompleteActivity) -> Result<Vec<ActivityEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_activity_id(cmd.activity_id)?;

        Ok(vec![ActivityEvent::ActivityCompleted(ActivityCompleted {
            activity_id: cmd.activity_id,
            completed_by: cmd.completed_by,
            outcome: cmd.outcome.clone(),
            next_action: cmd.next_action.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelActivity) -> Result<Vec<ActivityEvent>, DomainError> {
        self.ensure_open()?;
        self.ensure_activity_id(cmd.activity_id)?;

        Ok(vec![ActivityEvent::ActivityCancelled(ActivityCancelled {
            activity_id: cmd.activity_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_activity_id() -> ActivityId {
        ActivityId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn scheduled(id: ActivityId) -> Activity {
        let mut activity = Activity::empty(id);
        let events = activity
            .handle(&ActivityCommand::ScheduleActivity(ScheduleActivity {
                activity_id: id,
                kind: ActivityKind::SiteVisit,
                subject: "Factory walkthrough".to_string(),
                description: None,
                contact_id: Some(ContactId::new(AggregateId::new())),
                lead_id: None,
                scheduled_at: test_time(),
                duration_minutes: 60,
                assigned_to: Some(UserId::new()),
                priority: Priority::High,
                occurred_at: test_time(),
            }))
            .unwrap();
        activity.apply(&events[0]);
        activity
    }

    #[test]
    fn schedule_requires_a_contact_or_lead() {
        let id = test_activity_id();
        let activity = Activity::empty(id);
        let err = activity
            .handle(&ActivityCommand::ScheduleActivity(ScheduleActivity {
                activity_id: id,
                kind: ActivityKind::Call,
                subject: "Untethered call".to_string(),
                description: None,
                contact_id: None,
                lead_id: None,
                scheduled_at: test_time(),
                duration_minutes: 30,
                assigned_to: None,
                priority: Priority::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn complete_stamps_actor_and_time_once() {
        let mut activity = scheduled(test_activity_id());
        let completer = UserId::new();
        let when = test_time();

        let events = activity
            .handle(&ActivityCommand::CompleteActivity(CompleteActivity {
                activity_id: activity.id_typed(),
                completed_by: completer,
                outcome: Some("Quoted three spindle drives".to_string()),
                next_action: Some("Send datasheets".to_string()),
                occurred_at: when,
            }))
            .unwrap();
        activity.apply(&events[0]);

        assert_eq!(activity.status(), ActivityStatus::Completed);
        assert_eq!(activity.completed_by(), Some(completer));
        assert_eq!(activity.completed_at(), Some(when));

        // One-way transition: completing again is a conflict.
        let err = activity
            .handle(&ActivityCommand::CompleteActivity(CompleteActivity {
                activity_id: activity.id_typed(),
                completed_by: UserId::new(),
                outcome: None,
                next_action: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(activity.completed_by(), Some(completer));
    }

    #[test]
    fn reschedule_then_complete_is_allowed() {
        let mut activity = scheduled(test_activity_id());

        let events = activity
            .handle(&ActivityCommand::RescheduleActivity(RescheduleActivity {
                activity_id: activity.id_typed(),
                scheduled_at: test_time(),
                duration_minutes: Some(45),
                occurred_at: test_time(),
            }))
            .unwrap();
        activity.apply(&events[0]);
        assert_eq!(activity.status(), ActivityStatus::Rescheduled);
        assert_eq!(activity.duration_minutes(), 45);

        assert!(
            activity
                .handle(&ActivityCommand::CompleteActivity(CompleteActivity {
                    activity_id: activity.id_typed(),
                    completed_by: UserId::new(),
                    outcome: None,
                    next_action: None,
                    occurred_at: test_time(),
                }))
                .is_ok()
        );
    }

    #[test]
    fn cancelled_activity_rejects_further_transitions() {
        let mut activity = scheduled(test_activity_id());
        let events = activity
            .handle(&ActivityCommand::CancelActivity(CancelActivity {
                activity_id: activity.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        activity.apply(&events[0]);

        let err = activity
            .handle(&ActivityCommand::RescheduleActivity(RescheduleActivity {
                activity_id: activity.id_typed(),
                scheduled_at: test_time(),
                duration_minutes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
