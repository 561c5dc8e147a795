use std::collections::HashSet;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_directory::{CompanyId, ContactId, StakeholderDetails, StakeholderEvent, StakeholderId};
use forgecrm_events::EventEnvelope;

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::read_model::Store;

/// Queryable stakeholder entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderReadModel {
    pub stakeholder_id: StakeholderId,
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role_type: String,
    pub details: StakeholderDetails,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

type Triple = (ContactId, CompanyId, String);

/// Stakeholder directory projection.
///
/// Besides the per-id read model, it maintains a (contact, company, role)
/// triple index: the service layer consults it before dispatching a
/// registration, and the projection rejects a duplicate so a lost race
/// surfaces as an error instead of silent divergence.
#[derive(Debug)]
pub struct StakeholderDirectoryProjection<S>
where
    S: Store<StakeholderId, StakeholderReadModel>,
{
    store: S,
    cursors: SequenceCursors,
    triples: RwLock<HashSet<Triple>>,
}

impl<S> StakeholderDirectoryProjection<S>
where
    S: Store<StakeholderId, StakeholderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
            triples: RwLock::new(HashSet::new()),
        }
    }

    pub fn get(&self, stakeholder_id: &StakeholderId) -> Option<StakeholderReadModel> {
        self.store.get(stakeholder_id)
    }

    /// Live stakeholders, sorted by company then contact.
    pub fn list(&self) -> Vec<StakeholderReadModel> {
        let mut stakeholders: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|s| !s.deleted)
            .collect();
        stakeholders.sort_by(|a, b| {
            a.company_id
                .0
                .as_uuid()
                .cmp(b.company_id.0.as_uuid())
                .then(a.contact_id.0.as_uuid().cmp(b.contact_id.0.as_uuid()))
        });
        stakeholders
    }

    /// Whether the (contact, company, role) triple is already taken.
    pub fn triple_exists(&self, contact: ContactId, company: CompanyId, role_type: &str) -> bool {
        self.triples
            .read()
            .map(|t| t.contains(&(contact, company, role_type.to_string())))
            .unwrap_or(false)
    }

    fn triple_of(rm: &StakeholderReadModel) -> Triple {
        (rm.contact_id, rm.company_id, rm.role_type.clone())
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::STAKEHOLDER {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: StakeholderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            StakeholderEvent::StakeholderRegistered(e) => {
                let triple = (e.contact_id, e.company_id, e.role_type.clone());
                {
                    let mut triples = self
                        .triples
                        .write()
                        .map_err(|_| ProjectionError::Conflict("triple lock poisoned".to_string()))?;
                    if !triples.insert(triple) {
                        return Err(ProjectionError::Conflict(format!(
                            "duplicate stakeholder triple (contact={}, company={}, role={})",
                            e.contact_id, e.company_id, e.role_type
                        )));
                    }
                }

                self.store.upsert(
                    e.stakeholder_id,
                    StakeholderReadModel {
                        stakeholder_id: e.stakeholder_id,
                        contact_id: e.contact_id,
                        company_id: e.company_id,
                        role_type: e.role_type,
                        details: e.details,
                        deleted: false,
                        updated_at: e.occurred_at,
                    },
                );
            }
            StakeholderEvent::StakeholderUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.stakeholder_id) {
                    if rm.role_type != e.role_type
                        && let Ok(mut triples) = self.triples.write()
                    {
                        triples.remove(&Self::triple_of(&rm));
                        triples.insert((rm.contact_id, rm.company_id, e.role_type.clone()));
                    }
                    rm.role_type = e.role_type;
                    rm.details = e.details;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.stakeholder_id, rm);
                }
            }
            StakeholderEvent::StakeholderDeleted(e) => {
                if let Some(mut rm) = self.store.get(&e.stakeholder_id) {
                    if let Ok(mut triples) = self.triples.write() {
                        triples.remove(&Self::triple_of(&rm));
                    }
                    rm.deleted = true;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.stakeholder_id, rm);
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
    use forgecrm_core::AggregateId;
    use forgecrm_directory::stakeholder::{StakeholderDeleted, StakeholderRegistered};
    use std::sync::Arc;
    use uuid::Uuid;

    type TestProjection =
        StakeholderDirectoryProjection<Arc<InMemoryStore<StakeholderId, StakeholderReadModel>>>;

    fn projection() -> TestProjection {
        StakeholderDirectoryProjection::new(Arc::new(InMemoryStore::new()))
    }

    fn registered(
        contact: ContactId,
        company: CompanyId,
        role: &str,
    ) -> (AggregateId, StakeholderEvent) {
        let agg = AggregateId::new();
        (
            agg,
            StakeholderEvent::StakeholderRegistered(StakeholderRegistered {
                stakeholder_id: StakeholderId::new(agg),
                contact_id: contact,
                company_id: company,
                role_type: role.to_string(),
                details: StakeholderDetails::default(),
                occurred_at: Utc::now(),
            }),
        )
    }

    fn envelope(
        event: &StakeholderEvent,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            None,
            aggregate_id,
            aggregate_types::STAKEHOLDER,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn duplicate_triples_are_refused() {
        let projection = projection();
        let contact = ContactId::new(AggregateId::new());
        let company = CompanyId::new(AggregateId::new());

        let (agg, event) = registered(contact, company, "decision_maker");
        projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();
        assert!(projection.triple_exists(contact, company, "decision_maker"));

        let (agg2, dup) = registered(contact, company, "decision_maker");
        let err = projection
            .apply_envelope(&envelope(&dup, agg2, 1))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Conflict(_)));

        // A different role for the same pair is fine.
        let (agg3, other) = registered(contact, company, "consultant");
        projection.apply_envelope(&envelope(&other, agg3, 1)).unwrap();
        assert_eq!(projection.list().len(), 2);
    }

    #[test]
    fn deletion_frees_the_triple() {
        let projection = projection();
        let contact = ContactId::new(AggregateId::new());
        let company = CompanyId::new(AggregateId::new());

        let (agg, event) = registered(contact, company, "decision_maker");
        let StakeholderEvent::StakeholderRegistered(ref reg) = event else {
            unreachable!()
        };
        let stakeholder_id = reg.stakeholder_id;
        projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();

        let deleted = StakeholderEvent::StakeholderDeleted(StakeholderDeleted {
            stakeholder_id,
            deleted_by: None,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(&deleted, agg, 2))
            .unwrap();

        assert!(!projection.triple_exists(contact, company, "decision_maker"));

        let (agg2, again) = registered(contact, company, "decision_maker");
        projection
            .apply_envelope(&envelope(&again, agg2, 1))
            .unwrap();
    }
}
