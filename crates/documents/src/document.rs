use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgecrm_catalog::ProductId;
use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_directory::{CompanyId, ContactId};
use forgecrm_events::Event;
use forgecrm_pipeline::LeadId;

use crate::validate::{derive_file_type, sanitize_filename, validate_upload};

/// Document identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub AggregateId);

impl DocumentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The one record a document is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum DocumentParent {
    Contact(ContactId),
    Company(CompanyId),
    Lead(LeadId),
    Product(ProductId),
}

/// Business classification of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quotation,
    Invoice,
    PurchaseOrder,
    Contract,
    Technical,
    Presentation,
    #[default]
    Other,
}

/// Aggregate root: Document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    parent: Option<DocumentParent>,
    file_name: String,
    file_type: String,
    size_bytes: u64,
    kind: DocumentKind,
    description: Option<String>,
    uploaded_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl Document {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DocumentId) -> Self {
        Self {
            id,
            parent: None,
            file_name: String::new(),
            file_type: String::new(),
            size_bytes: 0,
            kind: DocumentKind::default(),
            description: None,
            uploaded_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DocumentId {
        self.id
    }

    pub fn parent(&self) -> Option<DocumentParent> {
        self.parent
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn uploaded_by(&self) -> Option<UserId> {
        self.uploaded_by
    }
}

impl AggregateRoot for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AttachDocument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachDocument {
    pub document_id: DocumentId,
    /// At most one parent; `None` for a free-standing document.
    pub parent: Option<DocumentParent>,
    pub file_name: String,
    pub size_bytes: u64,
    pub kind: DocumentKind,
    pub description: Option<String>,
    pub uploaded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DescribeDocument (reclassify / describe after upload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeDocument {
    pub document_id: DocumentId,
    pub kind: Option<DocumentKind>,
    pub description: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentCommand {
    AttachDocument(AttachDocument),
    DescribeDocument(DescribeDocument),
}

/// Event: DocumentAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAttached {
    pub document_id: DocumentId,
    pub parent: Option<DocumentParent>,
    /// Sanitized name the file is stored under.
    pub file_name: String,
    /// Derived from the extension (e.g. `PDF`).
    pub file_type: String,
    pub size_bytes: u64,
    pub kind: DocumentKind,
    pub description: Option<String>,
    pub uploaded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DocumentDescribed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescribed {
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentEvent {
    DocumentAttached(DocumentAttached),
    DocumentDescribed(DocumentDescribed),
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::DocumentAttached(_) => "documents.document.attached",
            DocumentEvent::DocumentDescribed(_) => "documents.document.described",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::DocumentAttached(e) => e.occurred_at,
            DocumentEvent::DocumentDescribed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Document {
    type Command = DocumentCommand;
    type Event = DocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DocumentEvent::DocumentAttached(e) => {
                self.id = e.document_id;
                self.parent = e.parent;
                self.file_name = e.file_name.clone();
                self.file_type = e.file_type.clone();
                self.size_bytes = e.size_bytes;
                self.kind = e.kind;
                self.description = e.description.clone();
                self.uploaded_by = e.uploaded_by;
                self.created = true;
            }
            DocumentEvent::DocumentDescribed(e) => {
                self.kind = e.kind;
                self.description = e.description.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DocumentCommand::AttachDocument(cmd) => self.handle_attach(cmd),
            DocumentCommand::DescribeDocument(cmd) => self.handle_describe(cmd),
        }
    }
}

impl Document {
    fn handle_attach(&self, cmd: &AttachDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("document already exists"));
        }

        validate_upload(&cmd.file_name, cmd.size_bytes)?;
        let file_name = sanitize_filename(&cmd.file_name);

        Ok(vec![DocumentEvent::DocumentAttached(DocumentAttached {
            document_id: cmd.document_id,
            parent: cmd.parent,
            file_type: derive_file_type(&file_name),
            file_name,
            size_bytes: cmd.size_bytes,
            kind: cmd.kind,
            description: cmd.description.clone(),
            uploaded_by: cmd.uploaded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_describe(&self, cmd: &DescribeDocument) -> Result<Vec<DocumentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.document_id {
            return Err(DomainError::invariant("document_id mismatch"));
        }

        Ok(vec![DocumentEvent::DocumentDescribed(DocumentDescribed {
            document_id: cmd.document_id,
            kind: cmd.kind.unwrap_or(self.kind),
            description: cmd
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_document_id() -> DocumentId {
        DocumentId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn lead_parent() -> Option<DocumentParent> {
        Some(DocumentParent::Lead(LeadId::new(AggregateId::new())))
    }

    #[test]
    fn attach_sanitizes_name_and_derives_type() {
        let id = test_document_id();
        let mut document = Document::empty(id);

        let events = document
            .handle(&DocumentCommand::AttachDocument(AttachDocument {
                document_id: id,
                parent: lead_parent(),
                file_name: "Final Quotation (rev 2).PDF".to_string(),
                size_bytes: 20_000,
                kind: DocumentKind::Quotation,
                description: None,
                uploaded_by: Some(UserId::new()),
                occurred_at: test_time(),
            }))
            .unwrap();
        document.apply(&events[0]);

        assert_eq!(document.file_name(), "Final_Quotation_rev_2.PDF");
        assert_eq!(document.file_type(), "PDF");
        assert!(matches!(document.parent(), Some(DocumentParent::Lead(_))));
    }

    #[test]
    fn attach_rejects_oversized_or_disallowed_files() {
        let id = test_document_id();
        let document = Document::empty(id);

        let oversized = document
            .handle(&DocumentCommand::AttachDocument(AttachDocument {
                document_id: id,
                parent: lead_parent(),
                file_name: "big.pdf".to_string(),
                size_bytes: 11 * 1024 * 1024,
                kind: DocumentKind::Other,
                description: None,
                uploaded_by: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(oversized, DomainError::Validation(_)));

        let binary = document
            .handle(&DocumentCommand::AttachDocument(AttachDocument {
                document_id: id,
                parent: lead_parent(),
                file_name: "tool.exe".to_string(),
                size_bytes: 100,
                kind: DocumentKind::Other,
                description: None,
                uploaded_by: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(binary, DomainError::Validation(_)));
    }

    #[test]
    fn describe_reclassifies_without_touching_the_file() {
        let id = test_document_id();
        let mut document = Document::empty(id);
        let events = document
            .handle(&DocumentCommand::AttachDocument(AttachDocument {
                document_id: id,
                parent: lead_parent(),
                file_name: "scan.pdf".to_string(),
                size_bytes: 100,
                kind: DocumentKind::Other,
                description: None,
                uploaded_by: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        document.apply(&events[0]);

        let events = document
            .handle(&DocumentCommand::DescribeDocument(DescribeDocument {
                document_id: id,
                kind: Some(DocumentKind::Contract),
                description: Some(Some("Signed frame contract".to_string())),
                occurred_at: test_time(),
            }))
            .unwrap();
        document.apply(&events[0]);

        assert_eq!(document.kind(), DocumentKind::Contract);
        assert_eq!(document.file_name(), "scan.pdf");
    }
}
