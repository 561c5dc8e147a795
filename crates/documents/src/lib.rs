//! `forgecrm-documents` — file attachments.
//!
//! A [`Document`] is a stored upload (quotation, contract, datasheet) attached
//! to exactly one parent record. Upload validation (size cap, extension
//! allowlist, name sanitization) lives in [`validate`] so the API and CLI can
//! reject bad files before anything touches the store.

pub mod document;
pub mod validate;

pub use document::{
    Document, DocumentCommand, DocumentEvent, DocumentId, DocumentKind, DocumentParent,
};
pub use validate::{
    ALLOWED_EXTENSIONS, MAX_FILE_SIZE_BYTES, derive_file_type, sanitize_filename, validate_upload,
};
