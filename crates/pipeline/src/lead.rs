use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use forgecrm_catalog::ProductId;
use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_directory::{CompanyId, ContactId, StakeholderId};
use forgecrm_events::Event;

use crate::number::LeadNumber;
use crate::stage::LeadStage;

/// Lead identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct LeadId(pub AggregateId);

impl LeadId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LeadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Whether the quoted figures are proposed or final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    #[default]
    Proposed,
    Final,
}

/// What the deal delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Installation,
    DeliveryOnly,
    WithTraining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub delivery_type: DeliveryType,
    pub expected_date: Option<NaiveDate>,
}

/// Approval record; immutable once granted (only a stage change clears it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_by: UserId,
    pub approved_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A product line on a lead. One line per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price_minor: Option<i64>,
    /// `quantity * unit_price_minor` whenever a unit price is present.
    pub total_minor: Option<i64>,
    /// Free-text description for items that are not in the catalog yet.
    pub custom_description: Option<String>,
    pub notes: Option<String>,
}

fn line_total(quantity: i64, unit_price_minor: Option<i64>) -> Option<i64> {
    unit_price_minor.map(|p| p * quantity)
}

fn weighted(estimated_value_minor: Option<i64>, probability: u8) -> Option<i64> {
    estimated_value_minor.map(|v| v * i64::from(probability) / 100)
}

/// Aggregate root: Lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    id: LeadId,
    number: Option<LeadNumber>,
    title: String,
    contact_id: Option<ContactId>,
    company_id: Option<CompanyId>,
    stakeholder_id: Option<StakeholderId>,
    source: Option<String>,
    stage: Option<LeadStage>,
    estimated_value_minor: Option<i64>,
    probability: u8,
    weighted_value_minor: Option<i64>,
    expected_close_date: Option<NaiveDate>,
    actual_close_date: Option<NaiveDate>,
    owner: Option<UserId>,
    collaborators: Vec<UserId>,
    rate_type: RateType,
    delivery: Option<DeliveryInfo>,
    requires_approval: bool,
    approval: Option<Approval>,
    line_items: Vec<LineItem>,
    notes: Option<String>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Lead {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LeadId) -> Self {
        Self {
            id,
            number: None,
            title: String::new(),
            contact_id: None,
            company_id: None,
            stakeholder_id: None,
            source: None,
            stage: None,
            estimated_value_minor: None,
            probability: 0,
            weighted_value_minor: None,
            expected_close_date: None,
            actual_close_date: None,
            owner: None,
            collaborators: Vec::new(),
            rate_type: RateType::default(),
            delivery: None,
            requires_approval: false,
            approval: None,
            line_items: Vec::new(),
            notes: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LeadId {
        self.id
    }

    pub fn number(&self) -> Option<LeadNumber> {
        self.number
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn contact_id(&self) -> Option<ContactId> {
        self.contact_id
    }

    pub fn stage(&self) -> Option<&LeadStage> {
        self.stage.as_ref()
    }

    pub fn estimated_value_minor(&self) -> Option<i64> {
        self.estimated_value_minor
    }

    pub fn probability(&self) -> u8 {
        self.probability
    }

    pub fn weighted_value_minor(&self) -> Option<i64> {
        self.weighted_value_minor
    }

    pub fn actual_close_date(&self) -> Option<NaiveDate> {
        self.actual_close_date
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn collaborators(&self) -> &[UserId] {
        &self.collaborators
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn approval(&self) -> Option<&Approval> {
        self.approval.as_ref()
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn line_for(&self, product_id: ProductId) -> Option<&LineItem> {
        self.line_items.iter().find(|l| l.product_id == product_id)
    }
}

impl AggregateRoot for Lead {
    type Id = LeadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenLead.
///
/// The lead number must already be allocated by the month-scoped allocator;
/// allocation is cross-aggregate and cannot be decided here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLead {
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
    pub expected_close_date: Option<NaiveDate>,
    pub owner: Option<UserId>,
    pub collaborators: Vec<UserId>,
    pub rate_type: RateType,
    pub delivery: Option<DeliveryInfo>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLead. `Some(None)` clears an optional field, `None` keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLead {
    pub lead_id: LeadId,
    pub title: Option<String>,
    pub source: Option<Option<String>>,
    pub estimated_value_minor: Option<Option<i64>>,
    pub probability: Option<u8>,
    pub expected_close_date: Option<Option<NaiveDate>>,
    pub owner: Option<Option<UserId>>,
    pub collaborators: Option<Vec<UserId>>,
    pub rate_type: Option<RateType>,
    pub delivery: Option<Option<DeliveryInfo>>,
    pub notes: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

impl UpdateLead {
    /// A no-op update targeting `lead_id` at `occurred_at`; set fields on top.
    pub fn noop(lead_id: LeadId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            lead_id,
            title: None,
            source: None,
            estimated_value_minor: None,
            probability: None,
            expected_close_date: None,
            owner: None,
            collaborators: None,
            rate_type: None,
            delivery: None,
            notes: None,
            occurred_at,
        }
    }
}

/// Command: ChangeStage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStage {
    pub lead_id: LeadId,
    pub stage: LeadStage,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub lead_id: LeadId,
    pub approved_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub lead_id: LeadId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price_minor: Option<i64>,
    pub custom_description: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineItem {
    pub lead_id: LeadId,
    pub product_id: ProductId,
    pub quantity: Option<i64>,
    pub unit_price_minor: Option<Option<i64>>,
    pub custom_description: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLineItem {
    pub lead_id: LeadId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteLead {
    pub lead_id: LeadId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreLead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreLead {
    pub lead_id: LeadId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadCommand {
    OpenLead(OpenLead),
    UpdateLead(UpdateLead),
    ChangeStage(ChangeStage),
    Approve(Approve),
    AddLineItem(AddLineItem),
    UpdateLineItem(UpdateLineItem),
    RemoveLineItem(RemoveLineItem),
    SoftDeleteLead(SoftDeleteLead),
    RestoreLead(RestoreLead),
}

/// Event: LeadOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadOpened {
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
    pub owner: Option<UserId>,
    pub collaborators: Vec<UserId>,
    pub rate_type: RateType,
    pub delivery: Option<DeliveryInfo>,
    pub requires_approval: bool,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadUpdated (full post-update state of the mutable header fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadUpdated {
    pub lead_id: LeadId,
    pub title: String,
    pub source: Option<String>,
    pub estimated_value_minor: Option<i64>,
    pub probability: u8,
    pub weighted_value_minor: Option<i64>,
    pub expected_close_date: Option<NaiveDate>,
    pub owner: Option<UserId>,
    pub collaborators: Vec<UserId>,
    pub rate_type: RateType,
    pub delivery: Option<DeliveryInfo>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StageChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChanged {
    pub lead_id: LeadId,
    pub stage: LeadStage,
    pub requires_approval: bool,
    /// True when a previously granted approval was reset by this change.
    pub approval_reset: bool,
    /// Set when the stage closes the lead (won or lost).
    pub actual_close_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadApproved {
    pub lead_id: LeadId,
    pub approved_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdded {
    pub lead_id: LeadId,
    pub line: LineItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemUpdated (full post-update line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemUpdated {
    pub lead_id: LeadId,
    pub line: LineItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRemoved {
    pub lead_id: LeadId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadDeleted (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDeleted {
    pub lead_id: LeadId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LeadRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRestored {
    pub lead_id: LeadId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadEvent {
    LeadOpened(LeadOpened),
    LeadUpdated(LeadUpdated),
    StageChanged(StageChanged),
    LeadApproved(LeadApproved),
    LineItemAdded(LineItemAdded),
    LineItemUpdated(LineItemUpdated),
    LineItemRemoved(LineItemRemoved),
    LeadDeleted(LeadDeleted),
    LeadRestored(LeadRestored),
}

impl Event for LeadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeadEvent::LeadOpened(_) => "pipeline.lead.opened",
            LeadEvent::LeadUpdated(_) => "pipeline.lead.updated",
            LeadEvent::StageChanged(_) => "pipeline.lead.stage_changed",
            LeadEvent::LeadApproved(_) => "pipeline.lead.approved",
            LeadEvent::LineItemAdded(_) => "pipeline.lead.line_item_added",
            LeadEvent::LineItemUpdated(_) => "pipeline.lead.line_item_updated",
            LeadEvent::LineItemRemoved(_) => "pipeline.lead.line_item_removed",
            LeadEvent::LeadDeleted(_) => "pipeline.lead.deleted",
            LeadEvent::LeadRestored(_) => "pipeline.lead.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LeadEvent::LeadOpened(e) => e.occurred_at,
            LeadEvent::LeadUpdated(e) => e.occurred_at,
            LeadEvent::StageChanged(e) => e.occurred_at,
            LeadEvent::LeadApproved(e) => e.occurred_at,
            LeadEvent::LineItemAdded(e) => e.occurred_at,
            LeadEvent::LineItemUpdated(e) => e.occurred_at,
            LeadEvent::LineItemRemoved(e) => e.occurred_at,
            LeadEvent::LeadDeleted(e) => e.occurred_at,
            LeadEvent::LeadRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lead {
    type Command = LeadCommand;
    type Event = LeadEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeadEvent::LeadOpened(e) => {
                self.id = e.lead_id;
                self.number = Some(e.number);
                self.title = e.title.clone();
                self.contact_id = Some(e.contact_id);
                self.company_id = e.company_id;
                self.stakeholder_id = e.stakeholder_id;
                self.source = e.source.clone();
                self.stage = Some(e.stage.clone());
                self.estimated_value_minor = e.estimated_value_minor;
                self.probability = e.probability;
                self.weighted_value_minor = e.weighted_value_minor;
                self.expected_close_date = e.expected_close_date;
                self.owner = e.owner;
                self.collaborators = e.collaborators.clone();
                self.rate_type = e.rate_type;
                self.delivery = e.delivery.clone();
                self.requires_approval = e.requires_approval;
                self.notes = e.notes.clone();
                self.deleted = false;
                self.created = true;
            }
            LeadEvent::LeadUpdated(e) => {
                self.title = e.title.clone();
                self.source = e.source.clone();
                self.estimated_value_minor = e.estimated_value_minor;
                self.probability = e.probability;
                self.weighted_value_minor = e.weighted_value_minor;
                self.expected_close_date = e.expected_close_date;
                self.owner = e.owner;
                self.collaborators = e.collaborators.clone();
                self.rate_type = e.rate_type;
                self.delivery = e.delivery.clone();
                self.notes = e.notes.clone();
            }
            LeadEvent::StageChanged(e) => {
                self.stage = Some(e.stage.clone());
                if e.requires_approval {
                    self.requires_approval = true;
                }
                if e.approval_reset {
                    self.approval = None;
                }
                if let Some(closed) = e.actual_close_date {
                    self.actual_close_date = Some(closed);
                }
            }
            LeadEvent::LeadApproved(e) => {
                self.approval = Some(Approval {
                    approved_by: e.approved_by,
                    approved_at: e.occurred_at,
                    notes: e.notes.clone(),
                });
            }
            LeadEvent::LineItemAdded(e) => {
                self.line_items.push(e.line.clone());
            }
            LeadEvent::LineItemUpdated(e) => {
                if let Some(existing) = self
                    .line_items
                    .iter_mut()
                    .find(|l| l.product_id == e.line.product_id)
                {
                    *existing = e.line.clone();
                }
            }
            LeadEvent::LineItemRemoved(e) => {
                self.line_items.retain(|l| l.product_id != e.product_id);
            }
            LeadEvent::LeadDeleted(_) => {
                self.deleted = true;
            }
            LeadEvent::LeadRestored(_) => {
                self.deleted = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LeadCommand::OpenLead(cmd) => self.handle_open(cmd),
            LeadCommand::UpdateLead(cmd) => self.handle_update(cmd),
            LeadCommand::ChangeStage(cmd) => self.handle_change_stage(cmd),
            LeadCommand::Approve(cmd) => self.handle_approve(cmd),
            LeadCommand::AddLineItem(cmd) => self.handle_add_line(cmd),
            LeadCommand::UpdateLineItem(cmd) => self.handle_update_line(cmd),
            LeadCommand::RemoveLineItem(cmd) => self.handle_remove_line(cmd),
            LeadCommand::SoftDeleteLead(cmd) => self.handle_delete(cmd),
            LeadCommand::RestoreLead(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Lead {
    fn ensure_lead_id(&self, lead_id: LeadId) -> Result<(), DomainError> {
        if self.id != lead_id {
            return Err(DomainError::invariant("lead_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::conflict("lead is deleted"));
        }
        Ok(())
    }

    fn check_probability(probability: u8) -> Result<(), DomainError> {
        if probability > 100 {
            return Err(DomainError::validation(
                "probability must be between 0 and 100",
            ));
        }
        Ok(())
    }

    fn check_value(value: Option<i64>) -> Result<(), DomainError> {
        if value.is_some_and(|v| v < 0) {
            return Err(DomainError::validation("estimated value cannot be negative"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenLead) -> Result<Vec<LeadEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lead already exists"));
        }
        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        Self::check_probability(cmd.probability)?;
        Self::check_value(cmd.estimated_value_minor)?;

        Ok(vec![LeadEvent::LeadOpened(LeadOpened {
            lead_id: cmd.lead_id,
            number: cmd.number,
            title: cmd.title.clone(),
            contact_id: cmd.contact_id,
            company_id: cmd.company_id,
            stakeholder_id: cmd.stakeholder_id,
            source: cmd.source.clone(),
            stage: cmd.stage.clone(),
            estimated_value_minor: cmd.estimated_value_minor,
            probability: cmd.probability,
            weighted_value_minor: weighted(cmd.estimated_value_minor, cmd.probability),
            expected_close_date: cmd.expected_close_date,
            owner: cmd.owner,
            collaborators: cmd.collaborators.clone(),
            rate_type: cmd.rate_type,
            delivery: cmd.delivery.clone(),
            requires_approval: cmd.stage.requires_approval,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_lead_id(cmd.lead_id)?;

        let title = cmd.title.clone().unwrap_or_else(|| self.title.clone());
        if title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        let probability = cmd.probability.unwrap_or(self.probability);
        Self::check_probability(probability)?;
        let estimated_value_minor = cmd
            .estimated_value_minor
            .unwrap_or(self.estimated_value_minor);
        Self::check_value(estimated_value_minor)?;

        Ok(vec![LeadEvent::LeadUpdated(LeadUpdated {
            lead_id: cmd.lead_id,
            title,
            source: cmd.source.clone().unwrap_or_else(|| self.source.clone()),
            estimated_value_minor,
            probability,
            weighted_value_minor: weighted(estimated_value_minor, probability),
            expected_close_date: cmd
                .expected_close_date
                .unwrap_or(self.expected_close_date),
            owner: cmd.owner.unwrap_or(self.owner),
            collaborators: cmd
                .collaborators
                .clone()
                .unwrap_or_else(|| self.collaborators.clone()),
            rate_type: cmd.rate_type.unwrap_or(self.rate_type),
            delivery: cmd.delivery.clone().unwrap_or_else(|| self.delivery.clone()),
            notes: cmd.notes.clone().unwrap_or_else(|| self.notes.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_stage(&self, cmd: &ChangeStage) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_lead_id(cmd.lead_id)?;

        if self.stage.as_ref() == Some(&cmd.stage) {
            // Re-saving the same stage is not a change.
            return Ok(vec![]);
        }

        // Moving into an approval-requiring stage resets any prior sign-off.
        let approval_reset = cmd.stage.requires_approval && self.approval.is_some();
        let actual_close_date = cmd
            .stage
            .is_closed()
            .then(|| cmd.occurred_at.date_naive());

        Ok(vec![LeadEvent::StageChanged(StageChanged {
            lead_id: cmd.lead_id,
            stage: cmd.stage.clone(),
            requires_approval: cmd.stage.requires_approval,
            approval_reset,
            actual_close_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_lead_id(cmd.lead_id)?;

        if !self.requires_approval {
            return Err(DomainError::invariant("lead does not require approval"));
        }
        if self.approval.is_some() {
            return Err(DomainError::conflict("lead is already approved"));
        }

        Ok(vec![LeadEvent::LeadApproved(LeadApproved {
            lead_id: cmd.lead_id,
            approved_by: cmd.approved_by,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLineItem) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_lead_id(cmd.lead_id)?;

        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if cmd.unit_price_minor.is_some_and(|p| p < 0) {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if self.line_for(cmd.product_id).is_some() {
            return Err(DomainError::conflict(
                "lead already has a line for this product",
            ));
        }

        Ok(vec![LeadEvent::LineItemAdded(LineItemAdded {
            lead_id: cmd.lead_id,
            line: LineItem {
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                unit_price_minor: cmd.unit_price_minor,
                total_minor: line_total(cmd.quantity, cmd.unit_price_minor),
                custom_description: cmd.custom_description.clone(),
                notes: cmd.notes.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLineItem) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_lead_id(cmd.lead_id)?;

        let existing = self
            .line_for(cmd.product_id)
            .ok_or_else(DomainError::not_found)?;

        let quantity = cmd.quantity.unwrap_or(existing.quantity);
        if quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        let unit_price_minor = cmd.unit_price_minor.unwrap_or(existing.unit_price_minor);
        if unit_price_minor.is_some_and(|p| p < 0) {
            return Err(DomainError::validation("unit price cannot be negative"));
        }

        Ok(vec![LeadEvent::LineItemUpdated(LineItemUpdated {
            lead_id: cmd.lead_id,
            line: LineItem {
                product_id: cmd.product_id,
                quantity,
                unit_price_minor,
                total_minor: line_total(quantity, unit_price_minor),
                custom_description: cmd
                    .custom_description
                    .clone()
                    .unwrap_or_else(|| existing.custom_description.clone()),
                notes: cmd.notes.clone().unwrap_or_else(|| existing.notes.clone()),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLineItem) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_lead_id(cmd.lead_id)?;

        if self.line_for(cmd.product_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![LeadEvent::LineItemRemoved(LineItemRemoved {
            lead_id: cmd.lead_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &SoftDeleteLead) -> Result<Vec<LeadEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lead_id(cmd.lead_id)?;
        if self.deleted {
            return Err(DomainError::conflict("lead is already deleted"));
        }

        Ok(vec![LeadEvent::LeadDeleted(LeadDeleted {
            lead_id: cmd.lead_id,
            deleted_by: cmd.deleted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreLead) -> Result<Vec<LeadEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lead_id(cmd.lead_id)?;
        if !self.deleted {
            return Err(DomainError::conflict("lead is not deleted"));
        }

        Ok(vec![LeadEvent::LeadRestored(LeadRestored {
            lead_id: cmd.lead_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageCatalog;
    use proptest::prelude::*;

    fn test_lead_id() -> LeadId {
        LeadId::new(AggregateId::new())
    }

    fn test_contact_id() -> ContactId {
        ContactId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn stage(name: &str) -> LeadStage {
        StageCatalog::standard().by_name(name).unwrap().clone()
    }

    fn opened(id: LeadId, value: Option<i64>, probability: u8) -> Lead {
        let mut lead = Lead::empty(id);
        let events = lead
            .handle(&LeadCommand::OpenLead(OpenLead {
                lead_id: id,
                number: LeadNumber::new(2026, 8, 1).unwrap(),
                title: "PLC system for textile mill".to_string(),
                contact_id: test_contact_id(),
                company_id: None,
                stakeholder_id: None,
                source: Some("referral".to_string()),
                stage: stage("New"),
                estimated_value_minor: value,
                probability,
                expected_close_date: None,
                owner: Some(UserId::new()),
                collaborators: vec![],
                rate_type: RateType::Proposed,
                delivery: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);
        lead
    }

    #[test]
    fn open_computes_weighted_value() {
        let lead = opened(test_lead_id(), Some(1_000_000), 40);
        assert_eq!(lead.weighted_value_minor(), Some(400_000));
        assert!(!lead.requires_approval());
    }

    #[test]
    fn open_rejects_probability_over_100() {
        let id = test_lead_id();
        let lead = Lead::empty(id);
        let err = lead
            .handle(&LeadCommand::OpenLead(OpenLead {
                lead_id: id,
                number: LeadNumber::new(2026, 8, 1).unwrap(),
                title: "Bad".to_string(),
                contact_id: test_contact_id(),
                company_id: None,
                stakeholder_id: None,
                source: None,
                stage: stage("New"),
                estimated_value_minor: None,
                probability: 101,
                expected_close_date: None,
                owner: None,
                collaborators: vec![],
                rate_type: RateType::Proposed,
                delivery: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_recomputes_weighted_value() {
        let mut lead = opened(test_lead_id(), Some(1_000_000), 40);
        let events = lead
            .handle(&LeadCommand::UpdateLead(UpdateLead {
                probability: Some(75),
                ..UpdateLead::noop(lead.id_typed(), test_time())
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert_eq!(lead.weighted_value_minor(), Some(750_000));

        // Clearing the value clears the derivation too.
        let events = lead
            .handle(&LeadCommand::UpdateLead(UpdateLead {
                estimated_value_minor: Some(None),
                ..UpdateLead::noop(lead.id_typed(), test_time())
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert_eq!(lead.weighted_value_minor(), None);
    }

    #[test]
    fn stage_change_into_approval_stage_sets_flag_and_resets_sign_off() {
        let mut lead = opened(test_lead_id(), Some(500_000), 50);
        let approver = UserId::new();

        let events = lead
            .handle(&LeadCommand::ChangeStage(ChangeStage {
                lead_id: lead.id_typed(),
                stage: stage("Negotiation"),
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert!(lead.requires_approval());

        let events = lead
            .handle(&LeadCommand::Approve(Approve {
                lead_id: lead.id_typed(),
                approved_by: approver,
                notes: Some("within discount policy".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert_eq!(lead.approval().unwrap().approved_by, approver);

        // Moving to Won (another approval stage) resets the sign-off.
        let events = lead
            .handle(&LeadCommand::ChangeStage(ChangeStage {
                lead_id: lead.id_typed(),
                stage: stage("Won"),
                occurred_at: test_time(),
            }))
            .unwrap();
        match &events[0] {
            LeadEvent::StageChanged(e) => {
                assert!(e.approval_reset);
                assert!(e.actual_close_date.is_some());
            }
            _ => panic!("Expected StageChanged event"),
        }
        lead.apply(&events[0]);
        assert!(lead.approval().is_none());
        assert!(lead.actual_close_date().is_some());
    }

    #[test]
    fn approve_twice_is_a_conflict_and_approval_is_immutable() {
        let mut lead = opened(test_lead_id(), None, 0);
        let events = lead
            .handle(&LeadCommand::ChangeStage(ChangeStage {
                lead_id: lead.id_typed(),
                stage: stage("Negotiation"),
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);

        let approve = |by| {
            LeadCommand::Approve(Approve {
                lead_id: lead.id_typed(),
                approved_by: by,
                notes: None,
                occurred_at: test_time(),
            })
        };

        let first = UserId::new();
        let events = lead.handle(&approve(first)).unwrap();
        let mut lead2 = lead.clone();
        lead2.apply(&events[0]);

        let err = lead2.handle(&approve(UserId::new())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(lead2.approval().unwrap().approved_by, first);
    }

    #[test]
    fn approve_without_requirement_is_an_invariant_violation() {
        let lead = opened(test_lead_id(), None, 0);
        let err = lead
            .handle(&LeadCommand::Approve(Approve {
                lead_id: lead.id_typed(),
                approved_by: UserId::new(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn same_stage_change_emits_nothing() {
        let lead = opened(test_lead_id(), None, 0);
        let events = lead
            .handle(&LeadCommand::ChangeStage(ChangeStage {
                lead_id: lead.id_typed(),
                stage: stage("New"),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn line_items_derive_totals_and_reject_duplicates() {
        let mut lead = opened(test_lead_id(), None, 0);
        let product = test_product_id();

        let events = lead
            .handle(&LeadCommand::AddLineItem(AddLineItem {
                lead_id: lead.id_typed(),
                product_id: product,
                quantity: 4,
                unit_price_minor: Some(250_000),
                custom_description: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert_eq!(lead.line_items()[0].total_minor, Some(1_000_000));

        let err = lead
            .handle(&LeadCommand::AddLineItem(AddLineItem {
                lead_id: lead.id_typed(),
                product_id: product,
                quantity: 1,
                unit_price_minor: None,
                custom_description: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let events = lead
            .handle(&LeadCommand::UpdateLineItem(UpdateLineItem {
                lead_id: lead.id_typed(),
                product_id: product,
                quantity: Some(2),
                unit_price_minor: None,
                custom_description: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert_eq!(lead.line_items()[0].total_minor, Some(500_000));

        let events = lead
            .handle(&LeadCommand::RemoveLineItem(RemoveLineItem {
                lead_id: lead.id_typed(),
                product_id: product,
                occurred_at: test_time(),
            }))
            .unwrap();
        lead.apply(&events[0]);
        assert!(lead.line_items().is_empty());
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let lead = opened(test_lead_id(), None, 0);
        let err = lead
            .handle(&LeadCommand::AddLineItem(AddLineItem {
                lead_id: lead.id_typed(),
                product_id: test_product_id(),
                quantity: 0,
                unit_price_minor: Some(100),
                custom_description: None,
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #[test]
        fn weighted_value_matches_definition(
            value in 0i64..=10_000_000_000,
            probability in 0u8..=100,
        ) {
            let lead = opened(test_lead_id(), Some(value), probability);
            prop_assert_eq!(
                lead.weighted_value_minor(),
                Some(value * i64::from(probability) / 100)
            );
        }

        #[test]
        fn line_total_matches_definition(
            quantity in 1i64..=100_000,
            unit_price in 0i64..=100_000_000,
        ) {
            let mut lead = opened(test_lead_id(), None, 0);
            let product = test_product_id();
            let events = lead
                .handle(&LeadCommand::AddLineItem(AddLineItem {
                    lead_id: lead.id_typed(),
                    product_id: product,
                    quantity,
                    unit_price_minor: Some(unit_price),
                    custom_description: None,
                    notes: None,
                    occurred_at: test_time(),
                }))
                .unwrap();
            lead.apply(&events[0]);
            prop_assert_eq!(lead.line_items()[0].total_minor, Some(quantity * unit_price));
        }
    }
}
