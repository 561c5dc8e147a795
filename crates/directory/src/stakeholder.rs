use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_events::Event;

use crate::company::CompanyId;
use crate::contact::ContactId;

/// Stakeholder identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StakeholderId(pub AggregateId);

impl StakeholderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StakeholderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stakeholder-specific contact details (distinct from the contact's own).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StakeholderDetails {
    pub group_name: Option<String>,
    pub zone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub bank_details: Option<String>,
    pub notes: Option<String>,
}

/// Aggregate root: Stakeholder — a role-qualified (contact, company) link.
///
/// The uniqueness of the (contact, company, role_type) triple is a
/// cross-aggregate rule: the application layer checks the stakeholder read
/// model before dispatching a registration, and the projection rejects a
/// duplicate that slips past the check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stakeholder {
    id: StakeholderId,
    contact_id: Option<ContactId>,
    company_id: Option<CompanyId>,
    role_type: String,
    details: StakeholderDetails,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Stakeholder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StakeholderId) -> Self {
        Self {
            id,
            contact_id: None,
            company_id: None,
            role_type: String::new(),
            details: StakeholderDetails::default(),
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StakeholderId {
        self.id
    }

    pub fn contact_id(&self) -> Option<ContactId> {
        self.contact_id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn role_type(&self) -> &str {
        &self.role_type
    }

    pub fn details(&self) -> &StakeholderDetails {
        &self.details
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Stakeholder {
    type Id = StakeholderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterStakeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStakeholder {
    pub stakeholder_id: StakeholderId,
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role_type: String,
    pub details: Option<StakeholderDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStakeholder (role and details; the link itself is fixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStakeholder {
    pub stakeholder_id: StakeholderId,
    pub role_type: Option<String>,
    pub details: Option<StakeholderDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteStakeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteStakeholder {
    pub stakeholder_id: StakeholderId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeholderCommand {
    RegisterStakeholder(RegisterStakeholder),
    UpdateStakeholder(UpdateStakeholder),
    SoftDeleteStakeholder(SoftDeleteStakeholder),
}

/// Event: StakeholderRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderRegistered {
    pub stakeholder_id: StakeholderId,
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role_type: String,
    pub details: StakeholderDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StakeholderUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderUpdated {
    pub stakeholder_id: StakeholderId,
    pub role_type: String,
    pub details: StakeholderDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StakeholderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeholderDeleted {
    pub stakeholder_id: StakeholderId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeholderEvent {
    StakeholderRegistered(StakeholderRegistered),
    StakeholderUpdated(StakeholderUpdated),
    StakeholderDeleted(StakeholderDeleted),
}

impl Event for StakeholderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StakeholderEvent::StakeholderRegistered(_) => "directory.stakeholder.registered",
            StakeholderEvent::StakeholderUpdated(_) => "directory.stakeholder.updated",
            StakeholderEvent::StakeholderDeleted(_) => "directory.stakeholder.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StakeholderEvent::StakeholderRegistered(e) => e.occurred_at,
            StakeholderEvent::StakeholderUpdated(e) => e.occurred_at,
            StakeholderEvent::StakeholderDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Stakeholder {
    type Command = StakeholderCommand;
    type Event = StakeholderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StakeholderEvent::StakeholderRegistered(e) => {
                self.id = e.stakeholder_id;
                self.contact_id = Some(e.contact_id);
                self.company_id = Some(e.company_id);
                self.role_type = e.role_type.clone();
                self.details = e.details.clone();
                self.deleted = false;
                self.created = true;
            }
            StakeholderEvent::StakeholderUpdated(e) => {
                self.role_type = e.role_type.clone();
                self.details = e.details.clone();
            }
            StakeholderEvent::StakeholderDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StakeholderCommand::RegisterStakeholder(cmd) => self.handle_register(cmd),
            StakeholderCommand::UpdateStakeholder(cmd) => self.handle_update(cmd),
            StakeholderCommand::SoftDeleteStakeholder(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Stakeholder {
    fn handle_register(
        &self,
        cmd: &RegisterStakeholder,
    ) -> Result<Vec<StakeholderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stakeholder already exists"));
        }
        if cmd.role_type.trim().is_empty() {
            return Err(DomainError::validation("role_type cannot be empty"));
        }

        Ok(vec![StakeholderEvent::StakeholderRegistered(
            StakeholderRegistered {
                stakeholder_id: cmd.stakeholder_id,
                contact_id: cmd.contact_id,
                company_id: cmd.company_id,
                role_type: cmd.role_type.clone(),
                details: cmd.details.clone().unwrap_or_default(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_update(&self, cmd: &UpdateStakeholder) -> Result<Vec<StakeholderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.stakeholder_id {
            return Err(DomainError::invariant("stakeholder_id mismatch"));
        }
        if self.deleted {
            return Err(DomainError::conflict("stakeholder is deleted"));
        }

        let role_type = cmd.role_type.clone().unwrap_or_else(|| self.role_type.clone());
        if role_type.trim().is_empty() {
            return Err(DomainError::validation("role_type cannot be empty"));
        }

        Ok(vec![StakeholderEvent::StakeholderUpdated(
            StakeholderUpdated {
                stakeholder_id: cmd.stakeholder_id,
                role_type,
                details: cmd.details.clone().unwrap_or_else(|| self.details.clone()),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_delete(
        &self,
        cmd: &SoftDeleteStakeholder,
    ) -> Result<Vec<StakeholderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.stakeholder_id {
            return Err(DomainError::invariant("stakeholder_id mismatch"));
        }
        if self.deleted {
            return Err(DomainError::conflict("stakeholder is already deleted"));
        }

        Ok(vec![StakeholderEvent::StakeholderDeleted(
            StakeholderDeleted {
                stakeholder_id: cmd.stakeholder_id,
                deleted_by: cmd.deleted_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (StakeholderId, ContactId, CompanyId) {
        (
            StakeholderId::new(AggregateId::new()),
            ContactId::new(AggregateId::new()),
            CompanyId::new(AggregateId::new()),
        )
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn register_links_contact_company_and_role() {
        let (sid, contact, company) = ids();
        let mut stakeholder = Stakeholder::empty(sid);

        let events = stakeholder
            .handle(&StakeholderCommand::RegisterStakeholder(
                RegisterStakeholder {
                    stakeholder_id: sid,
                    contact_id: contact,
                    company_id: company,
                    role_type: "decision_maker".to_string(),
                    details: None,
                    occurred_at: test_time(),
                },
            ))
            .unwrap();
        stakeholder.apply(&events[0]);

        assert_eq!(stakeholder.contact_id(), Some(contact));
        assert_eq!(stakeholder.company_id(), Some(company));
        assert_eq!(stakeholder.role_type(), "decision_maker");
    }

    #[test]
    fn register_rejects_blank_role() {
        let (sid, contact, company) = ids();
        let stakeholder = Stakeholder::empty(sid);

        let err = stakeholder
            .handle(&StakeholderCommand::RegisterStakeholder(
                RegisterStakeholder {
                    stakeholder_id: sid,
                    contact_id: contact,
                    company_id: company,
                    role_type: " ".to_string(),
                    details: None,
                    occurred_at: test_time(),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_changes_role_but_not_the_link() {
        let (sid, contact, company) = ids();
        let mut stakeholder = Stakeholder::empty(sid);
        let events = stakeholder
            .handle(&StakeholderCommand::RegisterStakeholder(
                RegisterStakeholder {
                    stakeholder_id: sid,
                    contact_id: contact,
                    company_id: company,
                    role_type: "consultant".to_string(),
                    details: None,
                    occurred_at: test_time(),
                },
            ))
            .unwrap();
        stakeholder.apply(&events[0]);

        let events = stakeholder
            .handle(&StakeholderCommand::UpdateStakeholder(UpdateStakeholder {
                stakeholder_id: sid,
                role_type: Some("decision_maker".to_string()),
                details: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        stakeholder.apply(&events[0]);

        assert_eq!(stakeholder.role_type(), "decision_maker");
        assert_eq!(stakeholder.contact_id(), Some(contact));
        assert_eq!(stakeholder.company_id(), Some(company));
    }
}
