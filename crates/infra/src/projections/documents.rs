use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_core::UserId;
use forgecrm_documents::{DocumentEvent, DocumentId, DocumentKind, DocumentParent};
use forgecrm_events::EventEnvelope;

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::read_model::Store;

/// Queryable document entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReadModel {
    pub document_id: DocumentId,
    pub parent: Option<DocumentParent>,
    pub file_name: String,
    pub file_type: String,
    pub size_bytes: u64,
    pub kind: DocumentKind,
    pub description: Option<String>,
    pub uploaded_by: Option<UserId>,
    pub uploaded_at: DateTime<Utc>,
}

/// Document library projection.
#[derive(Debug)]
pub struct DocumentLibraryProjection<S>
where
    S: Store<DocumentId, DocumentReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> DocumentLibraryProjection<S>
where
    S: Store<DocumentId, DocumentReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, document_id: &DocumentId) -> Option<DocumentReadModel> {
        self.store.get(document_id)
    }

    /// All documents, newest first.
    pub fn list(&self) -> Vec<DocumentReadModel> {
        let mut documents = self.store.list();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        documents
    }

    /// Documents attached to one parent record, newest first.
    pub fn for_parent(&self, parent: DocumentParent) -> Vec<DocumentReadModel> {
        self.list()
            .into_iter()
            .filter(|d| d.parent == Some(parent))
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::DOCUMENT {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: DocumentEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            DocumentEvent::DocumentAttached(e) => {
                self.store.upsert(
                    e.document_id,
                    DocumentReadModel {
                        document_id: e.document_id,
                        parent: e.parent,
                        file_name: e.file_name,
                        file_type: e.file_type,
                        size_bytes: e.size_bytes,
                        kind: e.kind,
                        description: e.description,
                        uploaded_by: e.uploaded_by,
                        uploaded_at: e.occurred_at,
                    },
                );
            }
            DocumentEvent::DocumentDescribed(e) => {
                if let Some(mut rm) = self.store.get(&e.document_id) {
                    rm.kind = e.kind;
                    rm.description = e.description;
                    self.store.upsert(e.document_id, rm);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryStore;
    use forgecrm_core::AggregateId;
    use forgecrm_documents::document::DocumentAttached;
    use forgecrm_pipeline::LeadId;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn documents_are_listed_per_parent() {
        let projection =
            DocumentLibraryProjection::new(Arc::new(InMemoryStore::<DocumentId, DocumentReadModel>::new()));
        let lead = DocumentParent::Lead(LeadId::new(AggregateId::new()));

        for i in 0..2 {
            let agg = AggregateId::new();
            let event = DocumentEvent::DocumentAttached(DocumentAttached {
                document_id: DocumentId::new(agg),
                parent: Some(lead),
                file_name: format!("quotation_{i}.pdf"),
                file_type: "PDF".to_string(),
                size_bytes: 100,
                kind: DocumentKind::Quotation,
                description: None,
                uploaded_by: None,
                occurred_at: Utc::now(),
            });
            let env = EventEnvelope::new(
                Uuid::now_v7(),
                None,
                agg,
                aggregate_types::DOCUMENT,
                1,
                serde_json::to_value(&event).unwrap(),
            );
            projection.apply_envelope(&env).unwrap();
        }

        assert_eq!(projection.for_parent(lead).len(), 2);
        let other = DocumentParent::Lead(LeadId::new(AggregateId::new()));
        assert!(projection.for_parent(other).is_empty());
    }
}
