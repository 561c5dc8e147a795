//! Field-level audit trail, derived from the event streams.
//!
//! The event store is already the authoritative change record; this projection
//! renders it as the flat, human-queryable view the sales organization expects:
//! one row per changed field, with old and new values, the actor, and the time.
//!
//! The mechanism: every stream's last-known payload state is cached, and each
//! incoming event body is diffed against it key by key. Creation-style events
//! produce a single `Created` row and seed the cache; soft deletes and
//! restores produce their own rows; everything else becomes per-field
//! `Updated` rows. The projection has no update or delete path; entries only
//! accumulate.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use forgecrm_core::{AggregateId, UserId};
use forgecrm_events::EventEnvelope;

use super::{ProjectionError, SequenceCursors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditChangeType {
    Created,
    Updated,
    Deleted,
    Restored,
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub entity_type: String,
    pub entity_id: AggregateId,
    pub change_type: AuditChangeType,
    /// Set on `Updated` rows; `Created`/`Deleted`/`Restored` rows are whole-record.
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
}

/// Append-only audit trail projection over every aggregate type.
#[derive(Debug, Default)]
pub struct AuditTrailProjection {
    cursors: SequenceCursors,
    entries: RwLock<Vec<AuditEntry>>,
    // Last-known flattened payload per stream, for field diffing.
    state: RwLock<HashMap<AggregateId, Map<String, JsonValue>>>,
}

impl AuditTrailProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for one entity, oldest first.
    pub fn for_entity(&self, entity_type: &str, entity_id: AggregateId) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Entries within `[start, end)`, oldest first.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.changed_at >= start && e.changed_at < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        // Domain events serialize with external tagging: {"VariantName": {..}}.
        let Some((variant, body)) = split_tagged_payload(envelope.payload()) else {
            return Err(ProjectionError::Deserialize(
                "event payload is not an externally tagged object".to_string(),
            ));
        };

        let changed_at = body
            .get("occurred_at")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(Utc::now);

        let mut new_entries = Vec::new();
        let entry = |change_type: AuditChangeType,
                     field_name: Option<String>,
                     old_value: Option<String>,
                     new_value: Option<String>| AuditEntry {
            entry_id: Uuid::now_v7(),
            entity_type: envelope.aggregate_type().to_string(),
            entity_id: envelope.aggregate_id(),
            change_type,
            field_name,
            old_value,
            new_value,
            changed_by: envelope.actor(),
            changed_at,
        };

        match classify_variant(&variant) {
            AuditChangeType::Created => {
                new_entries.push(entry(AuditChangeType::Created, None, None, None));
                self.replace_state(envelope.aggregate_id(), body);
            }
            AuditChangeType::Deleted => {
                new_entries.push(entry(AuditChangeType::Deleted, None, None, None));
            }
            AuditChangeType::Restored => {
                new_entries.push(entry(AuditChangeType::Restored, None, None, None));
            }
            AuditChangeType::Updated => {
                let previous = self
                    .state
                    .read()
                    .ok()
                    .and_then(|s| s.get(&envelope.aggregate_id()).cloned())
                    .unwrap_or_default();

                for (field, new_value) in &body {
                    if is_diff_exempt(field) {
                        continue;
                    }
                    let old_value = previous.get(field);
                    if old_value != Some(new_value) {
                        new_entries.push(entry(
                            AuditChangeType::Updated,
                            Some(field.clone()),
                            old_value.map(render_value),
                            Some(render_value(new_value)),
                        ));
                    }
                }
                self.merge_state(envelope.aggregate_id(), body);
            }
        }

        if let Ok(mut entries) = self.entries.write() {
            entries.extend(new_entries);
        }
        Ok(())
    }

    fn replace_state(&self, aggregate_id: AggregateId, body: Map<String, JsonValue>) {
        if let Ok(mut state) = self.state.write() {
            state.insert(aggregate_id, body);
        }
    }

    fn merge_state(&self, aggregate_id: AggregateId, body: Map<String, JsonValue>) {
        if let Ok(mut state) = self.state.write() {
            let existing = state.entry(aggregate_id).or_default();
            for (k, v) in body {
                existing.insert(k, v);
            }
        }
    }
}

fn split_tagged_payload(payload: &JsonValue) -> Option<(String, Map<String, JsonValue>)> {
    let object = payload.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let (variant, body) = object.iter().next()?;
    Some((variant.clone(), body.as_object()?.clone()))
}

/// Map an event variant name onto a change type.
///
/// Creation-style variants carry full initial state; soft deletes/restores are
/// their own categories; everything else is treated as an update and diffed.
fn classify_variant(variant: &str) -> AuditChangeType {
    const CREATED_SUFFIXES: [&str; 6] = [
        "Registered",
        "Created",
        "Opened",
        "Scheduled",
        "Attached",
        "Imported",
    ];

    if variant.contains("Deleted") {
        AuditChangeType::Deleted
    } else if variant.contains("Restored") {
        AuditChangeType::Restored
    } else if CREATED_SUFFIXES.iter().any(|s| variant.ends_with(s)) {
        AuditChangeType::Created
    } else {
        AuditChangeType::Updated
    }
}

/// Fields that never produce diff rows.
fn is_diff_exempt(field: &str) -> bool {
    // Business time is on every event; the aggregate's own id never changes.
    field == "occurred_at"
}

/// Render a JSON value as audit text: strings bare, the rest as JSON.
fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::aggregate_types;
    use forgecrm_directory::company::{
        CompanyDeleted, CompanyEvent, CompanyProfile, CompanyRegistered, CompanyUpdated,
    };
    use forgecrm_directory::CompanyId;

    fn envelope(
        event: &CompanyEvent,
        aggregate_id: AggregateId,
        seq: u64,
        actor: Option<UserId>,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            actor,
            aggregate_id,
            aggregate_types::COMPANY,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn registered(company_id: CompanyId, name: &str) -> CompanyEvent {
        CompanyEvent::CompanyRegistered(CompanyRegistered {
            company_id,
            name: name.to_string(),
            profile: CompanyProfile::default(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn creation_produces_one_created_row() {
        let audit = AuditTrailProjection::new();
        let agg = AggregateId::new();
        let actor = UserId::new();

        audit
            .apply_envelope(&envelope(
                &registered(CompanyId::new(agg), "Acme"),
                agg,
                1,
                Some(actor),
            ))
            .unwrap();

        let entries = audit.for_entity(aggregate_types::COMPANY, agg);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change_type, AuditChangeType::Created);
        assert_eq!(entries[0].field_name, None);
        assert_eq!(entries[0].changed_by, Some(actor));
    }

    #[test]
    fn update_produces_per_field_diff_rows() {
        let audit = AuditTrailProjection::new();
        let agg = AggregateId::new();
        let company_id = CompanyId::new(agg);

        audit
            .apply_envelope(&envelope(&registered(company_id, "Old Name"), agg, 1, None))
            .unwrap();

        let updated = CompanyEvent::CompanyUpdated(CompanyUpdated {
            company_id,
            name: "New Name".to_string(),
            profile: CompanyProfile::default(),
            occurred_at: Utc::now(),
        });
        audit
            .apply_envelope(&envelope(&updated, agg, 2, None))
            .unwrap();

        let entries = audit.for_entity(aggregate_types::COMPANY, agg);
        // Created row + exactly one diff row: only the name changed.
        assert_eq!(entries.len(), 2);
        let diff = &entries[1];
        assert_eq!(diff.change_type, AuditChangeType::Updated);
        assert_eq!(diff.field_name.as_deref(), Some("name"));
        assert_eq!(diff.old_value.as_deref(), Some("Old Name"));
        assert_eq!(diff.new_value.as_deref(), Some("New Name"));
    }

    #[test]
    fn soft_delete_is_its_own_row_and_attribution_is_kept() {
        let audit = AuditTrailProjection::new();
        let agg = AggregateId::new();
        let company_id = CompanyId::new(agg);
        let deleter = UserId::new();

        audit
            .apply_envelope(&envelope(&registered(company_id, "Acme"), agg, 1, None))
            .unwrap();
        let deleted = CompanyEvent::CompanyDeleted(CompanyDeleted {
            company_id,
            deleted_by: Some(deleter),
            occurred_at: Utc::now(),
        });
        audit
            .apply_envelope(&envelope(&deleted, agg, 2, Some(deleter)))
            .unwrap();

        let entries = audit.for_entity(aggregate_types::COMPANY, agg);
        assert_eq!(entries[1].change_type, AuditChangeType::Deleted);
        assert_eq!(entries[1].changed_by, Some(deleter));
    }

    #[test]
    fn replays_do_not_duplicate_entries() {
        let audit = AuditTrailProjection::new();
        let agg = AggregateId::new();
        let env = envelope(&registered(CompanyId::new(agg), "Acme"), agg, 1, None);

        audit.apply_envelope(&env).unwrap();
        audit.apply_envelope(&env).unwrap();
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn entries_are_append_only_in_time_order() {
        let audit = AuditTrailProjection::new();
        let agg = AggregateId::new();
        let company_id = CompanyId::new(agg);

        audit
            .apply_envelope(&envelope(&registered(company_id, "Acme"), agg, 1, None))
            .unwrap();
        for seq in 2..5 {
            let updated = CompanyEvent::CompanyUpdated(CompanyUpdated {
                company_id,
                name: format!("Acme v{seq}"),
                profile: CompanyProfile::default(),
                occurred_at: Utc::now(),
            });
            audit
                .apply_envelope(&envelope(&updated, agg, seq, None))
                .unwrap();
        }

        let entries = audit.for_entity(aggregate_types::COMPANY, agg);
        assert_eq!(entries.len(), 4);
        assert!(
            entries
                .windows(2)
                .all(|pair| pair[0].changed_at <= pair[1].changed_at)
        );
        assert_eq!(audit.recent(2).len(), 2);
    }
}
