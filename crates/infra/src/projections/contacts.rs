use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_directory::{CompanyId, ContactEvent, ContactId, ContactProfile, Employment};
use forgecrm_events::EventEnvelope;

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::read_model::Store;

/// Queryable contact entry, including the employment timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactReadModel {
    pub contact_id: ContactId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub profile: ContactProfile,
    pub current_company: Option<CompanyId>,
    pub employment: Vec<Employment>,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

/// Contact directory projection.
#[derive(Debug)]
pub struct ContactDirectoryProjection<S>
where
    S: Store<ContactId, ContactReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> ContactDirectoryProjection<S>
where
    S: Store<ContactId, ContactReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, contact_id: &ContactId) -> Option<ContactReadModel> {
        self.store.get(contact_id)
    }

    /// Live contacts, sorted by name.
    pub fn list(&self) -> Vec<ContactReadModel> {
        let mut contacts: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|c| !c.deleted)
            .collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name));
        contacts
    }

    /// Duplicate check: exact phone match preferred, email fallback.
    ///
    /// Mirrors the duplicate-check endpoint contract: phone wins when both are
    /// given, matching is over live contacts only, and `exclude` drops the
    /// record being edited.
    pub fn find_duplicates(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
        exclude: Option<ContactId>,
    ) -> Vec<ContactReadModel> {
        let candidates = self
            .list()
            .into_iter()
            .filter(|c| Some(c.contact_id) != exclude);

        if let Some(phone) = phone.filter(|p| !p.is_empty()) {
            candidates
                .filter(|c| c.phone.as_deref() == Some(phone))
                .collect()
        } else if let Some(email) = email.filter(|e| !e.is_empty()) {
            let email = email.to_lowercase();
            candidates
                .filter(|c| c.email.as_deref() == Some(email.as_str()))
                .collect()
        } else {
            Vec::new()
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::CONTACT {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: ContactEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            ContactEvent::ContactCreated(e) => {
                self.store.upsert(
                    e.contact_id,
                    ContactReadModel {
                        contact_id: e.contact_id,
                        name: e.name,
                        phone: e.phone,
                        email: e.email,
                        profile: e.profile,
                        current_company: None,
                        employment: Vec::new(),
                        deleted: false,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ContactEvent::ContactUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.contact_id) {
                    rm.name = e.name;
                    rm.phone = e.phone;
                    rm.email = e.email;
                    rm.profile = e.profile;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.contact_id, rm);
                }
            }
            ContactEvent::EmploymentRecorded(e) => {
                if let Some(mut rm) = self.store.get(&e.contact_id) {
                    for entry in &mut rm.employment {
                        if entry.is_current {
                            entry.is_current = false;
                            if entry.end_date.is_none() {
                                entry.end_date = e.start_date;
                            }
                        }
                    }
                    rm.employment.push(Employment {
                        company_id: e.company_id,
                        designation: e.designation.clone(),
                        start_date: e.start_date,
                        end_date: None,
                        is_current: true,
                        notes: e.notes,
                    });
                    rm.current_company = Some(e.company_id);
                    rm.profile.designation = e.designation;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.contact_id, rm);
                }
            }
            ContactEvent::EmploymentEnded(e) => {
                if let Some(mut rm) = self.store.get(&e.contact_id) {
                    for entry in &mut rm.employment {
                        if entry.is_current {
                            entry.is_current = false;
                            entry.end_date = e.end_date;
                        }
                    }
                    rm.current_company = None;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.contact_id, rm);
                }
            }
            ContactEvent::ContactDeleted(e) => {
                if let Some(mut rm) = self.store.get(&e.contact_id) {
                    rm.deleted = true;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.contact_id, rm);
                }
            }
            ContactEvent::ContactRestored(e) => {
                if let Some(mut rm) = self.store.get(&e.contact_id) {
                    rm.deleted = false;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.contact_id, rm);
                }
            }
        }

        Ok(())
    }
}
