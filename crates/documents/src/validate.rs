//! Upload validation and filename hygiene.

use forgecrm_core::{DomainError, DomainResult};

/// Uploads above this size are rejected.
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions we accept, lowercase, without the dot.
pub const ALLOWED_EXTENSIONS: [&str; 9] = [
    "pdf", "doc", "docx", "xls", "xlsx", "png", "jpg", "jpeg", "txt",
];

fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

/// Validate an upload's name and size against the allowlist and size cap.
pub fn validate_upload(file_name: &str, size_bytes: u64) -> DomainResult<()> {
    if size_bytes > MAX_FILE_SIZE_BYTES {
        return Err(DomainError::validation(format!(
            "file size {size_bytes} exceeds the {} MiB limit",
            MAX_FILE_SIZE_BYTES / (1024 * 1024)
        )));
    }

    match extension_of(file_name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(DomainError::validation(format!(
            "file type not allowed; allowed types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

/// The stored file-type tag, derived from the extension (e.g. `PDF`).
pub fn derive_file_type(file_name: &str) -> String {
    extension_of(file_name)
        .map(|e| e.to_uppercase())
        .unwrap_or_default()
}

/// Sanitize a filename for safe storage.
///
/// Non-ASCII characters are dropped, whitespace runs become `_`, everything
/// outside `[A-Za-z0-9._-]` is stripped, and the stem is capped at 100 chars.
pub fn sanitize_filename(file_name: &str) -> String {
    let mut out = String::with_capacity(file_name.len());
    let mut last_was_space = false;
    for c in file_name.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push('_');
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        }
    }

    let (stem, ext) = match out.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (out.clone(), None),
    };

    let mut stem: String = stem.chars().take(100).collect();
    if stem.chars().all(|c| c == '_') {
        stem = "file".to_string();
    }

    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_types_under_the_cap() {
        assert!(validate_upload("quotation.pdf", 1024).is_ok());
        assert!(validate_upload("photo.JPG", MAX_FILE_SIZE_BYTES).is_ok());
    }

    #[test]
    fn rejects_oversized_files() {
        let err = validate_upload("quotation.pdf", MAX_FILE_SIZE_BYTES + 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_disallowed_extensions() {
        for name in ["payload.exe", "archive.zip", "noextension", "dotfile."] {
            assert!(validate_upload(name, 10).is_err(), "{name}");
        }
    }

    #[test]
    fn derives_uppercase_file_type() {
        assert_eq!(derive_file_type("sheet.xlsx"), "XLSX");
        assert_eq!(derive_file_type("noext"), "");
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(
            sanitize_filename("Q3 report (final).pdf"),
            "Q3_report_final.pdf"
        );
        assert_eq!(sanitize_filename("übersicht.txt"), "bersicht.txt");
        assert_eq!(sanitize_filename("   "), "file");

        let long = format!("{}.pdf", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), 104);
        assert!(sanitized.ends_with(".pdf"));
    }
}
