//! Read-model projections.
//!
//! Each projection consumes published envelopes (JSON payloads) and maintains
//! a disposable, queryable view. All of them are idempotent under the bus's
//! at-least-once delivery: a per-stream sequence cursor drops duplicates and
//! replays.

pub mod activities;
pub mod audit_trail;
pub mod companies;
pub mod contacts;
pub mod cursor;
pub mod documents;
pub mod leads;
pub mod products;
pub mod stakeholders;

use thiserror::Error;

pub use activities::{ActivityBoardProjection, ActivityReadModel};
pub use audit_trail::{AuditChangeType, AuditEntry, AuditTrailProjection};
pub use companies::{CompanyDirectoryProjection, CompanyReadModel};
pub use contacts::{ContactDirectoryProjection, ContactReadModel};
pub use cursor::SequenceCursors;
pub use documents::{DocumentLibraryProjection, DocumentReadModel};
pub use leads::{LeadPipelineProjection, LeadReadModel, StageSnapshot};
pub use products::{ProductCatalogProjection, ProductReadModel};
pub use stakeholders::{StakeholderDirectoryProjection, StakeholderReadModel};

/// Stream identifiers used when dispatching and when filtering envelopes.
pub mod aggregate_types {
    pub const COMPANY: &str = "directory.company";
    pub const CONTACT: &str = "directory.contact";
    pub const STAKEHOLDER: &str = "directory.stakeholder";
    pub const PRODUCT: &str = "catalog.product";
    pub const LEAD: &str = "pipeline.lead";
    pub const ACTIVITY: &str = "activities.activity";
    pub const DOCUMENT: &str = "documents.document";
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("invalid sequence number {found} for stream")]
    InvalidSequence { found: u64 },

    #[error("projection conflict: {0}")]
    Conflict(String),
}
