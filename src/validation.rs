//! Input validation for identifiers.
//!
//! Every identifier that reaches a store is checked here first, so a malformed
//! request is rejected before any query runs.

use crate::error::{PolicyError, Result};

/// Maximum length for company, package and actor ids.
const MAX_ID_LENGTH: usize = 128;

/// Validate a company id.
///
/// Company ids must:
/// - Not be empty
/// - Not exceed 128 characters
/// - Contain only alphanumeric characters, underscores, and hyphens
///
/// ```rust,ignore
/// validate_company_id("agency_42")?;   // Ok
/// validate_company_id("")?;            // Err - empty
/// ```
pub fn validate_company_id(id: &str) -> Result<()> {
    validate_id("company_id", id)
}

/// Validate a package id. Same rules as [`validate_company_id`].
pub fn validate_package_id(id: &str) -> Result<()> {
    validate_id("package_id", id)
}

/// Validate the id of the admin performing a plan change.
pub fn validate_actor_id(id: &str) -> Result<()> {
    validate_id("actor_id", id)
}

fn validate_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(PolicyError::invalid_input(format!(
            "{} cannot be empty",
            field
        )));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(PolicyError::invalid_input(format!(
            "{} '{}' exceeds maximum length of {}",
            field,
            truncate_for_error(id),
            MAX_ID_LENGTH
        )));
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(PolicyError::invalid_input(format!(
            "{} '{}' contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
            field,
            sanitize_for_error(id)
        )));
    }

    Ok(())
}

fn truncate_for_error(s: &str) -> String {
    if s.chars().count() <= 50 {
        s.to_string()
    } else {
        let head: String = s.chars().take(47).collect();
        format!("{}...", head)
    }
}

/// Replace anything outside the id alphabet so error messages cannot inject
/// into logs.
fn sanitize_for_error(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .take(50)
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '?' })
        .collect();

    if s.chars().count() > 50 {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
