use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_auth::Visibility;
use forgecrm_core::UserId;
use forgecrm_directory::{CompanyId, ContactId, StakeholderId};
use forgecrm_events::EventEnvelope;
use forgecrm_pipeline::{Approval, LeadEvent, LeadId, LeadNumber, LeadStage, LineItem, RateType};

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::lead_numbers::LeadNumberAllocator;
use crate::read_model::Store;

/// Queryable lead entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadReadModel {
    pub lead_id: LeadId,
    pub number: LeadNumber,
    pub title: String,
    pub contact_id: ContactId,
    pub company_id: Option<CompanyId>,
    pub stakeholder_id: Option<StakeholderId>,
    pub source: Option<String>,
    pub stage: LeadStage,
    pub estimated_value_minor: Option<i64>,
    pub probability: u8,
    pub weighted_value_minor: Option<i64>,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<NaiveDate>,
    pub owner: Option<UserId>,
    pub collaborators: Vec<UserId>,
    pub rate_type: RateType,
    pub requires_approval: bool,
    pub approval: Option<Approval>,
    pub line_items: Vec<LineItem>,
    pub deleted: bool,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadReadModel {
    /// Users involved in this lead for visibility filtering.
    pub fn involved(&self) -> Vec<Option<UserId>> {
        let mut involved = vec![self.owner];
        involved.extend(self.collaborators.iter().copied().map(Some));
        involved
    }
}

/// One pipeline column in the status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub stage: String,
    pub order: u32,
    pub count: usize,
    pub estimated_value_minor: i64,
}

/// Lead pipeline projection.
///
/// Optionally feeds committed lead numbers back into the allocator so a
/// rebuild (or the persistent path's warm-up replay) seeds the month counters.
pub struct LeadPipelineProjection<S>
where
    S: Store<LeadId, LeadReadModel>,
{
    store: S,
    cursors: SequenceCursors,
    allocator: Option<Arc<dyn LeadNumberAllocator>>,
}

impl<S> LeadPipelineProjection<S>
where
    S: Store<LeadId, LeadReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
            allocator: None,
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn LeadNumberAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn get(&self, lead_id: &LeadId) -> Option<LeadReadModel> {
        self.store.get(lead_id)
    }

    /// Live leads visible to the caller, newest first.
    pub fn list_visible(&self, visibility: Visibility) -> Vec<LeadReadModel> {
        let mut leads: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|l| !l.deleted)
            .filter(|l| visibility.allows(&l.involved()))
            .collect();
        leads.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        leads
    }

    /// Per-stage count and value totals over the caller's visible leads,
    /// ordered by pipeline position.
    pub fn pipeline_status(&self, visibility: Visibility) -> Vec<StageSnapshot> {
        let mut by_stage: Vec<StageSnapshot> = Vec::new();
        for lead in self.list_visible(visibility) {
            match by_stage.iter_mut().find(|s| s.stage == lead.stage.name) {
                Some(snapshot) => {
                    snapshot.count += 1;
                    snapshot.estimated_value_minor += lead.estimated_value_minor.unwrap_or(0);
                }
                None => by_stage.push(StageSnapshot {
                    stage: lead.stage.name.clone(),
                    order: lead.stage.order,
                    count: 1,
                    estimated_value_minor: lead.estimated_value_minor.unwrap_or(0),
                }),
            }
        }
        by_stage.sort_by_key(|s| s.order);
        by_stage
    }

    /// Leads opened within `[start, end)`, for the month-scoped reports.
    pub fn opened_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<LeadReadModel> {
        let mut leads: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|l| !l.deleted && l.opened_at >= start && l.opened_at < end)
            .collect();
        leads.sort_by_key(|l| l.number);
        leads
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::LEAD {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: LeadEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            LeadEvent::LeadOpened(e) => {
                if let Some(allocator) = &self.allocator {
                    allocator.observe(e.number);
                }
                self.store.upsert(
                    e.lead_id,
                    LeadReadModel {
                        lead_id: e.lead_id,
                        number: e.number,
                        title: e.title,
                        contact_id: e.contact_id,
                        company_id: e.company_id,
                        stakeholder_id: e.stakeholder_id,
                        source: e.source,
                        stage: e.stage,
                        estimated_value_minor: e.estimated_value_minor,
                        probability: e.probability,
                        weighted_value_minor: e.weighted_value_minor,
                        expected_close_date: e.expected_close_date,
                        actual_close_date: None,
                        owner: e.owner,
                        collaborators: e.collaborators,
                        rate_type: e.rate_type,
                        requires_approval: e.requires_approval,
                        approval: None,
                        line_items: Vec::new(),
                        deleted: false,
                        opened_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            LeadEvent::LeadUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.title = e.title;
                    rm.source = e.source;
                    rm.estimated_value_minor = e.estimated_value_minor;
                    rm.probability = e.probability;
                    rm.weighted_value_minor = e.weighted_value_minor;
                    rm.expected_close_date = e.expected_close_date;
                    rm.owner = e.owner;
                    rm.collaborators = e.collaborators;
                    rm.rate_type = e.rate_type;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::StageChanged(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.stage = e.stage;
                    if e.requires_approval {
                        rm.requires_approval = true;
                    }
                    if e.approval_reset {
                        rm.approval = None;
                    }
                    if e.actual_close_date.is_some() {
                        rm.actual_close_date = e.actual_close_date;
                    }
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::LeadApproved(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.approval = Some(Approval {
                        approved_by: e.approved_by,
                        approved_at: e.occurred_at,
                        notes: e.notes,
                    });
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::LineItemAdded(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.line_items.push(e.line);
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::LineItemUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    if let Some(line) = rm
                        .line_items
                        .iter_mut()
                        .find(|l| l.product_id == e.line.product_id)
                    {
                        *line = e.line;
                    }
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::LineItemRemoved(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.line_items.retain(|l| l.product_id != e.product_id);
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::LeadDeleted(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.deleted = true;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
            LeadEvent::LeadRestored(e) => {
                if let Some(mut rm) = self.store.get(&e.lead_id) {
                    rm.deleted = false;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.lead_id, rm);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead_numbers::InMemoryLeadNumberAllocator;
    use crate::read_model::InMemoryStore;
    use chrono::TimeZone;
    use forgecrm_core::AggregateId;
    use forgecrm_pipeline::StageCatalog;
    use forgecrm_pipeline::lead::LeadOpened;
    use uuid::Uuid;

    type TestProjection = LeadPipelineProjection<Arc<InMemoryStore<LeadId, LeadReadModel>>>;

    fn opened(owner: Option<UserId>, stage: &str, value: i64, seq_in_month: u32) -> (AggregateId, LeadEvent) {
        let agg = AggregateId::new();
        let catalog = StageCatalog::standard();
        (
            agg,
            LeadEvent::LeadOpened(LeadOpened {
                lead_id: LeadId::new(agg),
                number: LeadNumber::new(2026, 8, seq_in_month).unwrap(),
                title: "Deal".to_string(),
                contact_id: ContactId::new(AggregateId::new()),
                company_id: None,
                stakeholder_id: None,
                source: None,
                stage: catalog.by_name(stage).unwrap().clone(),
                estimated_value_minor: Some(value),
                probability: 50,
                weighted_value_minor: Some(value / 2),
                expected_close_date: None,
                owner,
                collaborators: vec![],
                rate_type: RateType::Proposed,
                delivery: None,
                requires_approval: false,
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn envelope(event: &LeadEvent, aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            None,
            aggregate_id,
            aggregate_types::LEAD,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn visibility_narrows_to_owned_and_collaborated() {
        let projection: TestProjection = LeadPipelineProjection::new(Arc::new(InMemoryStore::new()));
        let mine = UserId::new();
        let other = UserId::new();

        let (agg1, e1) = opened(Some(mine), "New", 100, 1);
        let (agg2, e2) = opened(Some(other), "New", 100, 2);
        projection.apply_envelope(&envelope(&e1, agg1, 1)).unwrap();
        projection.apply_envelope(&envelope(&e2, agg2, 1)).unwrap();

        assert_eq!(projection.list_visible(Visibility::Everything).len(), 2);
        assert_eq!(projection.list_visible(Visibility::Own(mine)).len(), 1);
    }

    #[test]
    fn pipeline_status_groups_by_stage_in_order() {
        let projection: TestProjection = LeadPipelineProjection::new(Arc::new(InMemoryStore::new()));

        for (i, (stage, value)) in [("Qualified", 200), ("New", 100), ("Qualified", 300)]
            .into_iter()
            .enumerate()
        {
            let (agg, event) = opened(None, stage, value, (i + 1) as u32);
            projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();
        }

        let status = projection.pipeline_status(Visibility::Everything);
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].stage, "New");
        assert_eq!(status[0].count, 1);
        assert_eq!(status[1].stage, "Qualified");
        assert_eq!(status[1].count, 2);
        assert_eq!(status[1].estimated_value_minor, 500);
    }

    #[test]
    fn replayed_numbers_seed_the_allocator() {
        let allocator = Arc::new(InMemoryLeadNumberAllocator::new());
        let projection: TestProjection =
            LeadPipelineProjection::new(Arc::new(InMemoryStore::new()))
                .with_allocator(allocator.clone());

        let (agg, event) = opened(None, "New", 100, 17);
        projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();

        let next = allocator
            .allocate(Utc.with_ymd_and_hms(2026, 8, 20, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(next.sequence(), 18);
    }
}
