use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_directory::{CompanyEvent, CompanyId, CompanyProfile};
use forgecrm_events::EventEnvelope;

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::read_model::Store;

/// Queryable company directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyReadModel {
    pub company_id: CompanyId,
    pub name: String,
    pub profile: CompanyProfile,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

/// Company directory projection.
#[derive(Debug)]
pub struct CompanyDirectoryProjection<S>
where
    S: Store<CompanyId, CompanyReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> CompanyDirectoryProjection<S>
where
    S: Store<CompanyId, CompanyReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, company_id: &CompanyId) -> Option<CompanyReadModel> {
        self.store.get(company_id)
    }

    /// Live (non-deleted) companies, sorted by name.
    pub fn list(&self) -> Vec<CompanyReadModel> {
        let mut companies: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|c| !c.deleted)
            .collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        companies
    }

    /// Case-insensitive substring search by name.
    pub fn search_by_name(&self, query: &str) -> Vec<CompanyReadModel> {
        let q = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|c| c.name.to_lowercase().contains(&q))
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        // Ignore other aggregates; the bus is shared across modules.
        if envelope.aggregate_type() != aggregate_types::COMPANY {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: CompanyEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            CompanyEvent::CompanyRegistered(e) => {
                self.store.upsert(
                    e.company_id,
                    CompanyReadModel {
                        company_id: e.company_id,
                        name: e.name,
                        profile: e.profile,
                        deleted: false,
                        updated_at: e.occurred_at,
                    },
                );
            }
            CompanyEvent::CompanyUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.company_id) {
                    rm.name = e.name;
                    rm.profile = e.profile;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.company_id, rm);
                }
            }
            CompanyEvent::CompanyDeleted(e) => {
                if let Some(mut rm) = self.store.get(&e.company_id) {
                    rm.deleted = true;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.company_id, rm);
                }
            }
            CompanyEvent::CompanyRestored(e) => {
                if let Some(mut rm) = self.store.get(&e.company_id) {
                    rm.deleted = false;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.company_id, rm);
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
    use forgecrm_events::Event as _;
    use forgecrm_directory::company::{CompanyRegistered, CompanyDeleted};
    use std::sync::Arc;
    use uuid::Uuid;

    fn envelope(event: &CompanyEvent, aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            None,
            aggregate_id,
            aggregate_types::COMPANY,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn projection() -> CompanyDirectoryProjection<Arc<InMemoryStore<CompanyId, CompanyReadModel>>> {
        CompanyDirectoryProjection::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn registered_companies_become_queryable() {
        let projection = projection();
        let agg = AggregateId::new();
        let company_id = CompanyId::new(agg);

        let event = CompanyEvent::CompanyRegistered(CompanyRegistered {
            company_id,
            name: "Acme Textiles".to_string(),
            profile: CompanyProfile::default(),
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();

        assert_eq!(projection.get(&company_id).unwrap().name, "Acme Textiles");
        assert_eq!(projection.search_by_name("acme").len(), 1);
        assert_eq!(event.event_type(), "directory.company.registered");
    }

    #[test]
    fn soft_deleted_companies_leave_listings_but_stay_fetchable() {
        let projection = projection();
        let agg = AggregateId::new();
        let company_id = CompanyId::new(agg);

        let registered = CompanyEvent::CompanyRegistered(CompanyRegistered {
            company_id,
            name: "Acme".to_string(),
            profile: CompanyProfile::default(),
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(&registered, agg, 1))
            .unwrap();

        let deleted = CompanyEvent::CompanyDeleted(CompanyDeleted {
            company_id,
            deleted_by: None,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(&deleted, agg, 2))
            .unwrap();

        assert!(projection.list().is_empty());
        assert!(projection.get(&company_id).unwrap().deleted);
    }

    #[test]
    fn replayed_envelopes_are_ignored() {
        let projection = projection();
        let agg = AggregateId::new();
        let company_id = CompanyId::new(agg);

        let registered = CompanyEvent::CompanyRegistered(CompanyRegistered {
            company_id,
            name: "Acme".to_string(),
            profile: CompanyProfile::default(),
            occurred_at: Utc::now(),
        });
        let env = envelope(&registered, agg, 1);
        projection.apply_envelope(&env).unwrap();
        projection.apply_envelope(&env).unwrap();

        assert_eq!(projection.list().len(), 1);
    }

    #[test]
    fn other_aggregates_are_ignored() {
        let projection = projection();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            None,
            AggregateId::new(),
            aggregate_types::PRODUCT,
            1,
            serde_json::json!({"whatever": true}),
        );
        projection.apply_envelope(&env).unwrap();
        assert!(projection.list().is_empty());
    }
}
