//! `forgecrm-directory` — companies, contacts, and stakeholder relationships.
//!
//! Three aggregates cover the "who do we sell to" half of the domain:
//!
//! - [`Company`]: an organization record with commercial profile data.
//! - [`Contact`]: an individual; owns their employment timeline, so the
//!   "at most one current employment" rule is an aggregate invariant rather
//!   than a cross-row fixup.
//! - [`Stakeholder`]: a role-qualified link between a contact and a company.
//!   The (contact, company, role) uniqueness is cross-aggregate and is
//!   enforced where the records meet (service layer + projection).

pub mod company;
pub mod contact;
pub mod phone;
pub mod stakeholder;

pub use company::{
    BankDetails, Company, CompanyCommand, CompanyEvent, CompanyId, CompanyProfile, CompanySize,
};
pub use contact::{
    Contact, ContactCommand, ContactEvent, ContactId, ContactLocation, ContactProfile, Employment,
};
pub use phone::normalize_phone;
pub use stakeholder::{
    Stakeholder, StakeholderCommand, StakeholderDetails, StakeholderEvent, StakeholderId,
};
