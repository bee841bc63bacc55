//! SQL identifier safety
//!
//! Table, column, index, constraint and trigger names are concatenated
//! straight into executed DDL, so every name is checked before use.

use crate::error::ModelError;
use regex::Regex;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
    })
}

/// Check that `name` is a plain unquoted identifier (letters, digits, underscore,
/// not starting with a digit, at most 63 bytes).
pub fn validate_identifier(name: &str) -> Result<&str, ModelError> {
    if identifier_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(ModelError::InvalidIdentifier(name.to_string()))
    }
}

/// Longest identifier PostgreSQL keeps, in bytes (`NAMEDATALEN - 1`)
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// The name PostgreSQL stores for an unquoted identifier
///
/// Unquoted names are folded to lower case and anything past
/// [`MAX_IDENTIFIER_LEN`] bytes is dropped. Catalog lookups must compare
/// against this form.
pub fn stored_identifier(name: &str) -> String {
    let folded = name.to_lowercase();
    if folded.len() <= MAX_IDENTIFIER_LEN {
        return folded;
    }
    let mut end = MAX_IDENTIFIER_LEN;
    while !folded.is_char_boundary(end) {
        end -= 1;
    }
    folded[..end].to_string()
}

/// Validate several identifiers at once, failing on the first bad one
pub fn validate_identifiers(names: &[&str]) -> Result<(), ModelError> {
    for name in names {
        validate_identifier(name)?;
    }
    Ok(())
}
