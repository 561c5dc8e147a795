//! `forgecrm-activities` — scheduled tasks and interactions.
//!
//! An [`Activity`] is a schedulable piece of sales work (a call, a site visit,
//! a demo) tied to a contact and/or a lead. Completion is a one-way transition
//! that stamps who completed it and when.

pub mod activity;

pub use activity::{
    Activity, ActivityCommand, ActivityEvent, ActivityId, ActivityKind, ActivityStatus, Priority,
};
