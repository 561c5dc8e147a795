//! Pipeline stages.
//!
//! The stage catalog is code-defined; stage *snapshots* travel inside lead
//! events, so historical leads keep the flags that were in force when their
//! stage changed, regardless of later catalog edits.

use serde::{Deserialize, Serialize};

use forgecrm_core::ValueObject;

/// A pipeline stage snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadStage {
    pub name: String,
    /// Position in the pipeline, ascending from entry to close.
    pub order: u32,
    pub is_won: bool,
    pub is_lost: bool,
    pub requires_approval: bool,
}

impl LeadStage {
    pub fn is_closed(&self) -> bool {
        self.is_won || self.is_lost
    }
}

impl ValueObject for LeadStage {}

/// The ordered set of stages a lead can move through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCatalog {
    stages: Vec<LeadStage>,
}

impl StageCatalog {
    pub fn new(mut stages: Vec<LeadStage>) -> Self {
        stages.sort_by_key(|s| s.order);
        Self { stages }
    }

    /// The standard distributor pipeline.
    pub fn standard() -> Self {
        fn stage(
            name: &str,
            order: u32,
            is_won: bool,
            is_lost: bool,
            requires_approval: bool,
        ) -> LeadStage {
            LeadStage {
                name: name.to_string(),
                order,
                is_won,
                is_lost,
                requires_approval,
            }
        }

        Self::new(vec![
            stage("New", 1, false, false, false),
            stage("Qualified", 2, false, false, false),
            stage("Proposal", 3, false, false, false),
            stage("Negotiation", 4, false, false, true),
            stage("Won", 5, true, false, true),
            stage("Lost", 6, false, true, false),
        ])
    }

    pub fn ordered(&self) -> &[LeadStage] {
        &self.stages
    }

    pub fn by_name(&self, name: &str) -> Option<&LeadStage> {
        self.stages
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn entry_stage(&self) -> Option<&LeadStage> {
        self.stages.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_ordered_and_complete() {
        let catalog = StageCatalog::standard();
        let orders: Vec<u32> = catalog.ordered().iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(catalog.entry_stage().unwrap().name, "New");
        assert!(catalog.by_name("won").unwrap().is_won);
        assert!(catalog.by_name("Lost").unwrap().is_lost);
        assert!(catalog.by_name("Negotiation").unwrap().requires_approval);
    }

    #[test]
    fn lookup_is_case_insensitive_and_total() {
        let catalog = StageCatalog::standard();
        assert!(catalog.by_name("QUALIFIED").is_some());
        assert!(catalog.by_name("Archived").is_none());
    }
}
