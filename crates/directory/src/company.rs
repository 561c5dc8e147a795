use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_events::Event;

/// Company identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub AggregateId);

impl CompanyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Headcount band, as captured on the company form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    UpTo10,
    UpTo50,
    UpTo200,
    UpTo500,
    Over500,
}

/// Banking details captured for invoicing/payment follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BankDetails {
    pub bank_name: Option<String>,
    pub account: Option<String>,
    pub branch: Option<String>,
}

/// Commercial profile of a company (everything besides the name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompanyProfile {
    pub industry: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub zone: Option<String>,
    pub size: Option<CompanySize>,
    /// Annual revenue in minor currency units.
    pub annual_revenue_minor: Option<i64>,
    pub tax_id: Option<String>,
    pub bank: BankDetails,
    pub notes: Option<String>,
}

/// Aggregate root: Company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    id: CompanyId,
    name: String,
    profile: CompanyProfile,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Company {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CompanyId) -> Self {
        Self {
            id,
            name: String::new(),
            profile: CompanyProfile::default(),
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CompanyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &CompanyProfile {
        &self.profile
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCompany {
    pub company_id: CompanyId,
    pub name: String,
    pub profile: Option<CompanyProfile>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCompany {
    pub company_id: CompanyId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new profile (if None, keep existing).
    pub profile: Option<CompanyProfile>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteCompany {
    pub company_id: CompanyId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreCompany.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCompany {
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyCommand {
    RegisterCompany(RegisterCompany),
    UpdateCompany(UpdateCompany),
    SoftDeleteCompany(SoftDeleteCompany),
    RestoreCompany(RestoreCompany),
}

/// Event: CompanyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistered {
    pub company_id: CompanyId,
    pub name: String,
    pub profile: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompanyUpdated (carries full post-update state for audit diffing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyUpdated {
    pub company_id: CompanyId,
    pub name: String,
    pub profile: CompanyProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompanyDeleted (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDeleted {
    pub company_id: CompanyId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CompanyRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRestored {
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyEvent {
    CompanyRegistered(CompanyRegistered),
    CompanyUpdated(CompanyUpdated),
    CompanyDeleted(CompanyDeleted),
    CompanyRestored(CompanyRestored),
}

impl Event for CompanyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::CompanyRegistered(_) => "directory.company.registered",
            CompanyEvent::CompanyUpdated(_) => "directory.company.updated",
            CompanyEvent::CompanyDeleted(_) => "directory.company.deleted",
            CompanyEvent::CompanyRestored(_) => "directory.company.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CompanyEvent::CompanyRegistered(e) => e.occurred_at,
            CompanyEvent::CompanyUpdated(e) => e.occurred_at,
            CompanyEvent::CompanyDeleted(e) => e.occurred_at,
            CompanyEvent::CompanyRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Company {
    type Command = CompanyCommand;
    type Event = CompanyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CompanyEvent::CompanyRegistered(e) => {
                self.id = e.company_id;
                self.name = e.name.clone();
                self.profile = e.profile.clone();
                self.deleted = false;
                self.created = true;
            }
            CompanyEvent::CompanyUpdated(e) => {
                self.name = e.name.clone();
                self.profile = e.profile.clone();
            }
            CompanyEvent::CompanyDeleted(_) => {
                self.deleted = true;
            }
            CompanyEvent::CompanyRestored(_) => {
                self.deleted = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CompanyCommand::RegisterCompany(cmd) => self.handle_register(cmd),
            CompanyCommand::UpdateCompany(cmd) => self.handle_update(cmd),
            CompanyCommand::SoftDeleteCompany(cmd) => self.handle_delete(cmd),
            CompanyCommand::RestoreCompany(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Company {
    fn ensure_company_id(&self, company_id: CompanyId) -> Result<(), DomainError> {
        if self.id != company_id {
            return Err(DomainError::invariant("company_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::conflict("company is deleted"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("company already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![CompanyEvent::CompanyRegistered(CompanyRegistered {
            company_id: cmd.company_id,
            name: cmd.name.clone(),
            profile: cmd.profile.clone().unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_company_id(cmd.company_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let new_profile = cmd.profile.clone().unwrap_or_else(|| self.profile.clone());

        Ok(vec![CompanyEvent::CompanyUpdated(CompanyUpdated {
            company_id: cmd.company_id,
            name: new_name,
            profile: new_profile,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &SoftDeleteCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_company_id(cmd.company_id)?;
        if self.deleted {
            return Err(DomainError::conflict("company is already deleted"));
        }

        Ok(vec![CompanyEvent::CompanyDeleted(CompanyDeleted {
            company_id: cmd.company_id,
            deleted_by: cmd.deleted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_company_id(cmd.company_id)?;
        if !self.deleted {
            return Err(DomainError::conflict("company is not deleted"));
        }

        Ok(vec![CompanyEvent::CompanyRestored(CompanyRestored {
            company_id: cmd.company_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
