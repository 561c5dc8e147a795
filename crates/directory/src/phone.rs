//! Phone number cleaning and canonicalization.

use forgecrm_core::{DomainError, DomainResult};

/// Mobile prefixes considered valid for the canonical `+880` form.
const MOBILE_PREFIXES: [&str; 7] = ["13", "14", "15", "16", "17", "18", "19"];

/// Normalize a phone number for storage and duplicate matching.
///
/// Separators (spaces, dashes, parentheses, dots) are stripped. Numbers that
/// match the local mobile pattern in any of its spellings (`+8801...`,
/// `8801...`, `01...`, `1...`) canonicalize to `+880` followed by ten digits.
/// Other numbers are kept as cleaned digits (with an optional leading `+`)
/// when they are a plausible length; anything else is a validation error.
pub fn normalize_phone(raw: &str) -> DomainResult<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if cleaned.is_empty() {
        return Err(DomainError::validation("phone number is empty"));
    }

    let (plus, digits) = match cleaned.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::validation(format!(
            "phone number contains non-digits: {raw}"
        )));
    }

    // Local mobile spellings collapse to the canonical +880 form.
    let local = digits
        .strip_prefix("880")
        .or_else(|| if plus { None } else { digits.strip_prefix('0') })
        .unwrap_or(digits);
    if local.len() == 10 && MOBILE_PREFIXES.contains(&&local[..2]) {
        return Ok(format!("+880{local}"));
    }

    if (8..=15).contains(&digits.len()) {
        Ok(if plus {
            format!("+{digits}")
        } else {
            digits.to_string()
        })
    } else {
        Err(DomainError::validation(format!(
            "phone number has implausible length: {raw}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_local_mobile_spellings() {
        for raw in [
            "+880 17 1234 5678",
            "8801712345678",
            "01712345678",
            "1712345678",
            "017-1234-5678",
        ] {
            assert_eq!(normalize_phone(raw).unwrap(), "+8801712345678", "{raw}");
        }
    }

    #[test]
    fn keeps_plausible_foreign_numbers_cleaned() {
        assert_eq!(normalize_phone("+81 3 1234 5678").unwrap(), "+81312345678");
        assert_eq!(normalize_phone("02-9876-5432").unwrap(), "0298765432");
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("call me").is_err());
        assert!(normalize_phone("12345").is_err());
    }
}
