//! `forgecrm-pipeline` — leads, stages, and the pipeline lifecycle.
//!
//! A [`Lead`] is the unit of selling: a numbered opportunity tied to a contact,
//! carrying an estimated value, a win probability, an ordered stage, product
//! line items, and an approval workflow for stages that demand sign-off.
//!
//! Derivations are aggregate invariants, not save-time side effects:
//! `weighted_value = estimated_value * probability / 100` and line totals are
//! recomputed inside the events that change their inputs.

pub mod lead;
pub mod number;
pub mod stage;

pub use lead::{
    Approval, DeliveryInfo, DeliveryType, Lead, LeadCommand, LeadEvent, LeadId, LineItem, RateType,
};
pub use number::LeadNumber;
pub use stage::{LeadStage, StageCatalog};
