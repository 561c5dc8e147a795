//! Request DTOs and JSON mapping helpers.
//!
//! Requests embed domain value objects directly (they already serde); the
//! double-`Option` fields distinguish "leave unchanged" (absent) from "clear"
//! (null) on PATCH bodies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use forgecrm_activities::{ActivityKind, Priority};
use forgecrm_catalog::ProductDetails;
use forgecrm_catalog::ProductId;
use forgecrm_core::UserId;
use forgecrm_directory::{
    CompanyId, CompanyProfile, ContactId, ContactProfile, StakeholderDetails, StakeholderId,
};
use forgecrm_documents::DocumentKind;
use forgecrm_infra::projections::{
    ActivityReadModel, AuditEntry, CompanyReadModel, ContactReadModel, DocumentReadModel,
    LeadReadModel, ProductReadModel, StageSnapshot, StakeholderReadModel,
};
use forgecrm_pipeline::{DeliveryInfo, LeadId, RateType};

// ── Companies ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub name: String,
    #[serde(default)]
    pub profile: Option<CompanyProfile>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: Option<CompanyProfile>,
}

// ── Contacts ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub email: Option<Option<String>>,
    #[serde(default)]
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
pub struct RecordEmploymentRequest {
    pub company_id: CompanyId,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndEmploymentRequest {
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateCheckRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exclude_id: Option<ContactId>,
}

// ── Stakeholders ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterStakeholderRequest {
    pub contact_id: ContactId,
    pub company_id: CompanyId,
    pub role_type: String,
    #[serde(default)]
    pub details: Option<StakeholderDetails>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStakeholderRequest {
    #[serde(default)]
    pub role_type: Option<String>,
    #[serde(default)]
    pub details: Option<StakeholderDetails>,
}

// ── Products ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub brand: String,
    /// Absent: a SKU is generated.
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub details: Option<ProductDetails>,
    #[serde(default)]
    pub stock_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub details: Option<ProductDetails>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: i64,
}

// ── Leads ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenLeadRequest {
    pub title: String,
    pub contact_id: ContactId,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub stakeholder_id: Option<StakeholderId>,
    #[serde(default)]
    pub source: Option<String>,
    /// Stage name; defaults to the catalog's entry stage.
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub estimated_value_minor: Option<i64>,
    #[serde(default)]
    pub probability: u8,
    #[serde(default)]
    pub expected_close_date: Option<NaiveDate>,
    /// Defaults to the caller.
    #[serde(default)]
    pub owner: Option<UserId>,
    #[serde(default)]
    pub collaborators: Vec<UserId>,
    #[serde(default)]
    pub rate_type: Option<RateType>,
    #[serde(default)]
    pub delivery: Option<DeliveryInfo>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateLeadRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<Option<String>>,
    #[serde(default)]
    pub estimated_value_minor: Option<Option<i64>>,
    #[serde(default)]
    pub probability: Option<u8>,
    #[serde(default)]
    pub expected_close_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub owner: Option<Option<UserId>>,
    #[serde(default)]
    pub collaborators: Option<Vec<UserId>>,
    #[serde(default)]
    pub rate_type: Option<RateType>,
    #[serde(default)]
    pub delivery: Option<Option<DeliveryInfo>>,
    #[serde(default)]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStageRequest {
    pub stage: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveLeadRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLineItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price_minor: Option<i64>,
    #[serde(default)]
    pub custom_description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateLineItemRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit_price_minor: Option<Option<i64>>,
    #[serde(default)]
    pub custom_description: Option<Option<String>>,
    #[serde(default)]
    pub notes: Option<Option<String>>,
}

// ── Activities ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScheduleActivityRequest {
    pub kind: ActivityKind,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub contact_id: Option<ContactId>,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    /// Defaults to the caller.
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub priority: Priority,
}

fn default_duration() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
pub struct RescheduleActivityRequest {
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteActivityRequest {
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub next_action: Option<String>,
}

// ── Documents ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AttachDocumentQuery {
    pub file_name: String,
    #[serde(default)]
    pub kind: DocumentKind,
    #[serde(default)]
    pub parent_kind: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListDocumentsQuery {
    #[serde(default)]
    pub parent_kind: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DescribeDocumentRequest {
    #[serde(default)]
    pub kind: Option<DocumentKind>,
    #[serde(default)]
    pub description: Option<Option<String>>,
}

// ── Response mapping ─────────────────────────────────────────────────────────

pub fn company_to_json(rm: &CompanyReadModel) -> JsonValue {
    json!({
        "id": rm.company_id,
        "name": rm.name,
        "profile": rm.profile,
        "deleted": rm.deleted,
        "updated_at": rm.updated_at,
    })
}

pub fn contact_to_json(rm: &ContactReadModel) -> JsonValue {
    json!({
        "id": rm.contact_id,
        "name": rm.name,
        "phone": rm.phone,
        "email": rm.email,
        "profile": rm.profile,
        "current_company": rm.current_company,
        "employment": rm.employment,
        "deleted": rm.deleted,
        "updated_at": rm.updated_at,
    })
}

pub fn stakeholder_to_json(rm: &StakeholderReadModel) -> JsonValue {
    json!({
        "id": rm.stakeholder_id,
        "contact_id": rm.contact_id,
        "company_id": rm.company_id,
        "role_type": rm.role_type,
        "details": rm.details,
        "deleted": rm.deleted,
        "updated_at": rm.updated_at,
    })
}

pub fn product_to_json(rm: &ProductReadModel) -> JsonValue {
    json!({
        "id": rm.product_id,
        "sku": rm.sku,
        "name": rm.name,
        "brand": rm.brand,
        "details": rm.details,
        "stock_quantity": rm.stock_quantity,
        "active": rm.active,
        "imported": rm.imported,
        "external_id": rm.external_id,
        "deleted": rm.deleted,
        "updated_at": rm.updated_at,
    })
}

/// Compact search hit used by the product search endpoint.
pub fn product_to_search_hit(rm: &ProductReadModel) -> JsonValue {
    json!({
        "id": rm.product_id,
        "text": format!("{} - {}", rm.brand, rm.name),
        "sku": rm.sku,
        "price_minor": rm.details.price_minor,
        "stock": rm.stock_quantity,
    })
}

pub fn lead_to_json(rm: &LeadReadModel) -> JsonValue {
    json!({
        "id": rm.lead_id,
        "number": rm.number,
        "title": rm.title,
        "contact_id": rm.contact_id,
        "company_id": rm.company_id,
        "stakeholder_id": rm.stakeholder_id,
        "source": rm.source,
        "stage": rm.stage,
        "estimated_value_minor": rm.estimated_value_minor,
        "probability": rm.probability,
        "weighted_value_minor": rm.weighted_value_minor,
        "expected_close_date": rm.expected_close_date,
        "actual_close_date": rm.actual_close_date,
        "owner": rm.owner,
        "collaborators": rm.collaborators,
        "rate_type": rm.rate_type,
        "requires_approval": rm.requires_approval,
        "approval": rm.approval,
        "line_items": rm.line_items,
        "deleted": rm.deleted,
        "opened_at": rm.opened_at,
    })
}

pub fn stage_snapshot_to_json(s: &StageSnapshot) -> JsonValue {
    json!({
        "stage": s.stage,
        "order": s.order,
        "count": s.count,
        "estimated_value_minor": s.estimated_value_minor,
    })
}

pub fn activity_to_json(rm: &ActivityReadModel) -> JsonValue {
    json!({
        "id": rm.activity_id,
        "kind": rm.kind,
        "subject": rm.subject,
        "description": rm.description,
        "contact_id": rm.contact_id,
        "lead_id": rm.lead_id,
        "scheduled_at": rm.scheduled_at,
        "duration_minutes": rm.duration_minutes,
        "status": rm.status,
        "assigned_to": rm.assigned_to,
        "priority": rm.priority,
        "outcome": rm.outcome,
        "completed_at": rm.completed_at,
        "completed_by": rm.completed_by,
    })
}

pub fn document_to_json(rm: &DocumentReadModel) -> JsonValue {
    json!({
        "id": rm.document_id,
        "parent": rm.parent,
        "file_name": rm.file_name,
        "file_type": rm.file_type,
        "size_bytes": rm.size_bytes,
        "kind": rm.kind,
        "description": rm.description,
        "uploaded_by": rm.uploaded_by,
        "uploaded_at": rm.uploaded_at,
    })
}

pub fn audit_entry_to_json(entry: &AuditEntry) -> JsonValue {
    json!({
        "id": entry.entry_id,
        "entity_type": entry.entity_type,
        "entity_id": entry.entity_id,
        "change_type": entry.change_type,
        "field_name": entry.field_name,
        "old_value": entry.old_value,
        "new_value": entry.new_value,
        "changed_by": entry.changed_by,
        "changed_at": entry.changed_at,
    })
}
