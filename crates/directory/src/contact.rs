use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_events::Event;

use crate::company::CompanyId;
use crate::phone::normalize_phone;

/// Contact identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub AggregateId);

impl ContactId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ContactId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Which site the contact sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactLocation {
    #[default]
    HeadOffice,
    Factory,
    Branch,
}

/// Profile data beyond the identifying fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContactProfile {
    pub designation: Option<String>,
    pub location: ContactLocation,
    pub linkedin: Option<String>,
    pub address: Option<String>,
    /// Product category codes the contact has expressed interest in.
    pub product_interests: Vec<String>,
    pub reference_source: Option<String>,
    pub notes: Option<String>,
}

/// One entry in a contact's employment timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employment {
    pub company_id: CompanyId,
    pub designation: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_current: bool,
    pub notes: Option<String>,
}

/// Aggregate root: Contact.
///
/// The employment timeline lives inside the aggregate, which makes
/// "at most one current employment" a structural invariant: recording a new
/// employment closes the previous current entry in the same event application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    id: ContactId,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    profile: ContactProfile,
    employment_history: Vec<Employment>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Contact {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ContactId) -> Self {
        Self {
            id,
            name: String::new(),
            phone: None,
            email: None,
            profile: ContactProfile::default(),
            employment_history: Vec::new(),
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ContactId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn profile(&self) -> &ContactProfile {
        &self.profile
    }

    pub fn employment_history(&self) -> &[Employment] {
        &self.employment_history
    }

    /// The single current employment, if any.
    pub fn current_employment(&self) -> Option<&Employment> {
        self.employment_history.iter().find(|e| e.is_current)
    }

    pub fn current_company(&self) -> Option<CompanyId> {
        self.current_employment().map(|e| e.company_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Contact {
    type Id = ContactId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContact {
    pub contact_id: ContactId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub profile: Option<ContactProfile>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub contact_id: ContactId,
    pub name: Option<String>,
    /// `Some(None)` clears the phone, `None` keeps it.
    pub phone: Option<Option<String>>,
    /// `Some(None)` clears the email, `None` keeps it.
    pub email: Option<Option<String>>,
    pub profile: Option<ContactProfile>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordEmployment — the contact moved to (or was first linked to)
/// a company. Closes the previous current employment, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEmployment {
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub designation: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EndEmployment — the contact left their current company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndEmployment {
    pub contact_id: ContactId,
    pub end_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteContact {
    pub contact_id: ContactId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreContact {
    pub contact_id: ContactId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactCommand {
    CreateContact(CreateContact),
    UpdateContact(UpdateContact),
    RecordEmployment(RecordEmployment),
    EndEmployment(EndEmployment),
    SoftDeleteContact(SoftDeleteContact),
    RestoreContact(RestoreContact),
}

/// Event: ContactCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCreated {
    pub contact_id: ContactId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub profile: ContactProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactUpdated (full post-update identifying state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdated {
    pub contact_id: ContactId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub profile: ContactProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EmploymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentRecorded {
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub designation: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EmploymentEnded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentEnded {
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub end_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactDeleted (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDeleted {
    pub contact_id: ContactId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRestored {
    pub contact_id: ContactId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactEvent {
    ContactCreated(ContactCreated),
    ContactUpdated(ContactUpdated),
    EmploymentRecorded(EmploymentRecorded),
    EmploymentEnded(EmploymentEnded),
    ContactDeleted(ContactDeleted),
    ContactRestored(ContactRestored),
}

impl Event for ContactEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContactEvent::ContactCreated(_) => "directory.contact.created",
            ContactEvent::ContactUpdated(_) => "directory.contact.updated",
            ContactEvent::EmploymentRecorded(_) => "directory.contact.employment_recorded",
            ContactEvent::EmploymentEnded(_) => "directory.contact.employment_ended",
            ContactEvent::ContactDeleted(_) => "directory.contact.deleted",
            ContactEvent::ContactRestored(_) => "directory.contact.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ContactEvent::ContactCreated(e) => e.occurred_at,
            ContactEvent::ContactUpdated(e) => e.occurred_at,
            ContactEvent::EmploymentRecorded(e) => e.occurred_at,
            ContactEvent::EmploymentEnded(e) => e.occurred_at,
            ContactEvent::ContactDeleted(e) => e.occurred_at,
            ContactEvent::ContactRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Contact {
    type Command = ContactCommand;
    type Event = ContactEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ContactEvent::ContactCreated(e) => {
                self.id = e.contact_id;
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.email = e.email.clone();
                self.profile = e.profile.clone();
                self.deleted = false;
                self.created = true;
            }
            ContactEvent::ContactUpdated(e) => {
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.email = e.email.clone();
                self.profile = e.profile.clone();
            }
            ContactEvent::EmploymentRecorded(e) => {
                // Close the previous current entry; the timeline keeps it.
                for entry in &mut self.employment_history {
                    if entry.is_current {
                        entry.is_current = false;
                        if entry.end_date.is_none() {
                            entry.end_date = e.start_date;
                        }
                    }
                }
                self.employment_history.push(Employment {
                    company_id: e.company_id,
                    designation: e.designation.clone(),
                    start_date: e.start_date,
                    end_date: None,
                    is_current: true,
                    notes: e.notes.clone(),
                });
                self.profile.designation = e.designation.clone();
            }
            ContactEvent::EmploymentEnded(e) => {
                for entry in &mut self.employment_history {
                    if entry.is_current {
                        entry.is_current = false;
                        entry.end_date = e.end_date;
                    }
                }
            }
            ContactEvent::ContactDeleted(_) => {
                self.deleted = true;
            }
            ContactEvent::ContactRestored(_) => {
                self.deleted = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ContactCommand::CreateContact(cmd) => self.handle_create(cmd),
            ContactCommand::UpdateContact(cmd) => self.handle_update(cmd),
            ContactCommand::RecordEmployment(cmd) => self.handle_record_employment(cmd),
            ContactCommand::EndEmployment(cmd) => self.handle_end_employment(cmd),
            ContactCommand::SoftDeleteContact(cmd) => self.handle_delete(cmd),
            ContactCommand::RestoreContact(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Contact {
    fn ensure_contact_id(&self, contact_id: ContactId) -> Result<(), DomainError> {
        if self.id != contact_id {
            return Err(DomainError::invariant("contact_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::conflict("contact is deleted"));
        }
        Ok(())
    }

    /// Reachability rule: a contact without a phone or an email is useless.
    fn check_identifiers(phone: &Option<String>, email: &Option<String>) -> Result<(), DomainError> {
        let has_phone = phone.as_deref().is_some_and(|p| !p.trim().is_empty());
        let has_email = email.as_deref().is_some_and(|e| !e.trim().is_empty());
        if !has_phone && !has_email {
            return Err(DomainError::validation(
                "contact requires a phone number or an email address",
            ));
        }
        Ok(())
    }

    fn normalize_identifiers(
        phone: Option<String>,
        email: Option<String>,
    ) -> Result<(Option<String>, Option<String>), DomainError> {
        let phone = match phone.filter(|p| !p.trim().is_empty()) {
            Some(p) => Some(normalize_phone(&p)?),
            None => None,
        };
        let email = email
            .filter(|e| !e.trim().is_empty())
            .map(|e| e.trim().to_lowercase());
        Ok((phone, email))
    }

    fn handle_create(&self, cmd: &CreateContact) -> Result<Vec<ContactEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("contact already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let (phone, email) = Self::normalize_identifiers(cmd.phone.clone(), cmd.email.clone())?;
        Self::check_identifiers(&phone, &email)?;

        Ok(vec![ContactEvent::ContactCreated(ContactCreated {
            contact_id: cmd.contact_id,
            name: cmd.name.clone(),
            phone,
            email,
            profile: cmd.profile.clone().unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateContact) -> Result<Vec<ContactEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_contact_id(cmd.contact_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let phone = cmd.phone.clone().unwrap_or_else(|| self.phone.clone());
        let email = cmd.email.clone().unwrap_or_else(|| self.email.clone());
        let (phone, email) = Self::normalize_identifiers(phone, email)?;
        Self::check_identifiers(&phone, &email)?;

        let new_profile = cmd.profile.clone().unwrap_or_else(|| self.profile.clone());

        Ok(vec![ContactEvent::ContactUpdated(ContactUpdated {
            contact_id: cmd.contact_id,
            name: new_name,
            phone,
            email,
            profile: new_profile,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_employment(
        &self,
        cmd: &RecordEmployment,
    ) -> Result<Vec<ContactEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_contact_id(cmd.contact_id)?;

        if let Some(current) = self.current_employment() {
            if current.company_id == cmd.company_id
                && current.designation == cmd.designation
            {
                return Err(DomainError::conflict(
                    "employment is already current for this company and designation",
                ));
            }
        }

        Ok(vec![ContactEvent::EmploymentRecorded(EmploymentRecorded {
            contact_id: cmd.contact_id,
            company_id: cmd.company_id,
            designation: cmd.designation.clone(),
            start_date: cmd.start_date,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_end_employment(&self, cmd: &EndEmployment) -> Result<Vec<ContactEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_contact_id(cmd.contact_id)?;

        let current = self
            .current_employment()
            .ok_or_else(|| DomainError::conflict("contact has no current employment"))?;

        Ok(vec![ContactEvent::EmploymentEnded(EmploymentEnded {
            contact_id: cmd.contact_id,
            company_id: current.company_id,
            end_date: cmd.end_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &SoftDeleteContact) -> Result<Vec<ContactEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_contact_id(cmd.contact_id)?;
        if self.deleted {
            return Err(DomainError::conflict("contact is already deleted"));
        }

        Ok(vec![ContactEvent::ContactDeleted(ContactDeleted {
            contact_id: cmd.contact_id,
            deleted_by: cmd.deleted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreContact) -> Result<Vec<ContactEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_contact_id(cmd.contact_id)?;
        if !self.deleted {
            return Err(DomainError::conflict("contact is not deleted"));
        }

        Ok(vec![ContactEvent::ContactRestored(ContactRestored {
            contact_id: cmd.contact_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_contact_id() -> ContactId {
        ContactId::new(AggregateId::new())
    }

    fn test_company_id() -> CompanyId {
        CompanyId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(id: ContactId) -> Contact {
        let mut contact = Contact::empty(id);
        let events = contact
            .handle(&ContactCommand::CreateContact(CreateContact {
                contact_id: id,
                name: "Rahim Uddin".to_string(),
                phone: Some("01712345678".to_string()),
                email: Some("Rahim@Example.com".to_string()),
                profile: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        contact.apply(&events[0]);
        contact
    }

    fn record_employment(contact: &mut Contact, company_id: CompanyId, designation: &str) {
        let events = contact
            .handle(&ContactCommand::RecordEmployment(RecordEmployment {
                contact_id: contact.id_typed(),
                company_id,
                designation: Some(designation.to_string()),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        contact.apply(&events[0]);
    }

    #[test]
    fn create_normalizes_phone_and_email() {
        let contact = created(test_contact_id());
        assert_eq!(contact.phone(), Some("+8801712345678"));
        assert_eq!(contact.email(), Some("rahim@example.com"));
    }

    #[test]
    fn create_requires_phone_or_email() {
        let id = test_contact_id();
        let contact = Contact::empty(id);
        let err = contact
            .handle(&ContactCommand::CreateContact(CreateContact {
                contact_id: id,
                name: "No Identifiers".to_string(),
                phone: None,
                email: Some("   ".to_string()),
                profile: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_cannot_clear_both_identifiers() {
        let mut contact = created(test_contact_id());
        let err = contact
            .handle(&ContactCommand::UpdateContact(UpdateContact {
                contact_id: contact.id_typed(),
                name: None,
                phone: Some(None),
                email: Some(None),
                profile: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Clearing just one is fine.
        let events = contact
            .handle(&ContactCommand::UpdateContact(UpdateContact {
                contact_id: contact.id_typed(),
                name: None,
                phone: Some(None),
                email: None,
                profile: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        contact.apply(&events[0]);
        assert_eq!(contact.phone(), None);
        assert_eq!(contact.email(), Some("rahim@example.com"));
    }

    #[test]
    fn at_most_one_current_employment_after_moves() {
        let mut contact = created(test_contact_id());
        let first = test_company_id();
        let second = test_company_id();

        record_employment(&mut contact, first, "Engineer");
        assert_eq!(contact.current_company(), Some(first));

        record_employment(&mut contact, second, "Manager");
        assert_eq!(contact.current_company(), Some(second));

        let current_count = contact
            .employment_history()
            .iter()
            .filter(|e| e.is_current)
            .count();
        assert_eq!(current_count, 1);
        assert_eq!(contact.employment_history().len(), 2);

        // The closed entry keeps its place in the timeline with an end date.
        let closed = &contact.employment_history()[0];
        assert_eq!(closed.company_id, first);
        assert!(!closed.is_current);
        assert_eq!(closed.end_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn re_recording_identical_employment_is_a_conflict() {
        let mut contact = created(test_contact_id());
        let company = test_company_id();
        record_employment(&mut contact, company, "Engineer");

        let err = contact
            .handle(&ContactCommand::RecordEmployment(RecordEmployment {
                contact_id: contact.id_typed(),
                company_id: company,
                designation: Some("Engineer".to_string()),
                start_date: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn end_employment_clears_current() {
        let mut contact = created(test_contact_id());
        let company = test_company_id();
        record_employment(&mut contact, company, "Engineer");

        let events = contact
            .handle(&ContactCommand::EndEmployment(EndEmployment {
                contact_id: contact.id_typed(),
                end_date: NaiveDate::from_ymd_opt(2025, 6, 30),
                occurred_at: test_time(),
            }))
            .unwrap();
        contact.apply(&events[0]);

        assert_eq!(contact.current_employment(), None);
        assert_eq!(
            contact.employment_history()[0].end_date,
            NaiveDate::from_ymd_opt(2025, 6, 30)
        );

        let err = contact
            .handle(&ContactCommand::EndEmployment(EndEmployment {
                contact_id: contact.id_typed(),
                end_date: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let contact = created(test_contact_id());
        let before = contact.clone();

        let _ = contact
            .handle(&ContactCommand::RecordEmployment(RecordEmployment {
                contact_id: contact.id_typed(),
                company_id: test_company_id(),
                designation: None,
                start_date: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();

        assert_eq!(contact, before);
    }
}
