//! Input validation for warehouse identifiers
//!
//! Destination names end up in request paths and job configurations, so they
//! are checked before any call is made:
//! - Project IDs follow the Cloud project naming rules
//! - Dataset IDs are letters, digits and underscores
//! - Table IDs reject path separators and control characters

use crate::{AuditError, Result};

/// Maximum length for a project ID (without a domain prefix)
pub const MAX_PROJECT_ID_LEN: usize = 30;

/// Minimum length for a project ID (without a domain prefix)
pub const MIN_PROJECT_ID_LEN: usize = 6;

/// Maximum length for dataset IDs
pub const MAX_DATASET_ID_LEN: usize = 1024;

/// Maximum length for table IDs
pub const MAX_TABLE_ID_LEN: usize = 1024;

/// Validate project ID
///
/// Requirements:
/// - 6 to 30 characters
/// - Lowercase letters, digits, hyphens
/// - Starts with a letter, does not end with a hyphen
/// - May carry a legacy domain prefix (`example.com:my-project`)
pub fn validate_project_id(project_id: &str) -> Result<()> {
    let name = match project_id.rsplit_once(':') {
        Some((domain, name)) => {
            if domain.is_empty() {
                return Err(AuditError::Validation(
                    "Project ID domain prefix cannot be empty".to_string(),
                ));
            }
            name
        }
        None => project_id,
    };

    if name.len() < MIN_PROJECT_ID_LEN || name.len() > MAX_PROJECT_ID_LEN {
        return Err(AuditError::Validation(format!(
            "Project ID must be {}-{} characters: '{}'",
            MIN_PROJECT_ID_LEN, MAX_PROJECT_ID_LEN, project_id
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AuditError::Validation(format!(
            "Project ID contains invalid characters (allowed: a-z, 0-9, -): '{}'",
            project_id
        )));
    }

    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(AuditError::Validation(format!(
            "Project ID must start with a letter: '{}'",
            project_id
        )));
    }

    if name.ends_with('-') {
        return Err(AuditError::Validation(format!(
            "Project ID cannot end with hyphen: '{}'",
            project_id
        )));
    }

    Ok(())
}

/// Validate dataset ID
///
/// Requirements:
/// - Not empty
/// - <= 1024 characters
/// - Letters, digits, underscore only
pub fn validate_dataset_id(dataset_id: &str) -> Result<()> {
    if dataset_id.is_empty() {
        return Err(AuditError::Validation(
            "Dataset ID cannot be empty".to_string(),
        ));
    }

    if dataset_id.len() > MAX_DATASET_ID_LEN {
        return Err(AuditError::Validation(format!(
            "Dataset ID too long: {} > {} characters",
            dataset_id.len(),
            MAX_DATASET_ID_LEN
        )));
    }

    if !dataset_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuditError::Validation(format!(
            "Dataset ID contains invalid characters (allowed: letters, digits, _): '{}'",
            dataset_id
        )));
    }

    Ok(())
}

/// Validate table ID
///
/// Requirements:
/// - Not empty
/// - <= 1024 bytes
/// - Letters, marks, digits, connectors, dashes and spaces (no dots or slashes)
pub fn validate_table_id(table_id: &str) -> Result<()> {
    if table_id.is_empty() {
        return Err(AuditError::Validation(
            "Table ID cannot be empty".to_string(),
        ));
    }

    if table_id.len() > MAX_TABLE_ID_LEN {
        return Err(AuditError::Validation(format!(
            "Table ID too long: {} > {} bytes",
            table_id.len(),
            MAX_TABLE_ID_LEN
        )));
    }

    if !table_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ')
    {
        return Err(AuditError::Validation(format!(
            "Table ID contains invalid characters (allowed: letters, digits, _, -, space): '{}'",
            table_id
        )));
    }

    Ok(())
}

/// Validate a destination column name
///
/// Requirements:
/// - Not empty, <= 300 characters
/// - Letters, digits, underscore; cannot start with a digit
pub fn validate_column_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 300 {
        return Err(AuditError::Validation(format!(
            "Column name must be 1-300 characters: '{}'",
            name
        )));
    }

    if name.starts_with(|c: char| c.is_ascii_digit())
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuditError::Validation(format!(
            "Column name contains invalid characters: '{}'",
            name
        )));
    }

    Ok(())
}
