//! Dataset metadata and access entry types.

use crate::principal::PrincipalType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a dataset within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetReference {
    pub project_id: String,
    pub dataset_id: String,
}

impl DatasetReference {
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
        }
    }
}

impl fmt::Display for DatasetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project_id, self.dataset_id)
    }
}

/// One grant discovered while scanning a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// Dataset the grant belongs to
    pub dataset_id: String,
    /// Principal identifier, e.g. an email address or special group name
    pub principal_id: String,
    /// Role name (READER, WRITER, OWNER, or an IAM role). Authorized views,
    /// routines and datasets carry no role.
    pub role: Option<String>,
    /// Discriminator used to filter entries; never persisted
    pub principal_type: PrincipalType,
}

impl AccessEntry {
    pub fn new(
        dataset_id: impl Into<String>,
        principal_type: PrincipalType,
        principal_id: impl Into<String>,
        role: Option<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            principal_id: principal_id.into(),
            role,
            principal_type,
        }
    }
}

/// Full metadata for one dataset, including its access entries in the order
/// the warehouse returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub reference: DatasetReference,
    #[serde(default)]
    pub access_entries: Vec<AccessEntry>,
}

impl DatasetMetadata {
    pub fn new(reference: DatasetReference, access_entries: Vec<AccessEntry>) -> Self {
        Self {
            reference,
            access_entries,
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.reference.dataset_id
    }
}

/// A persisted row: one user-level grant on one dataset.
///
/// Field names are the destination column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntryRecord {
    pub dataset: String,
    pub entity_id: String,
    pub role: Option<String>,
}

impl AccessEntryRecord {
    /// Destination column names, in schema order.
    pub const COLUMNS: [&'static str; 3] = ["dataset", "entity_id", "role"];

    pub fn new(
        dataset: impl Into<String>,
        entity_id: impl Into<String>,
        role: Option<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            entity_id: entity_id.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_with_column_names() {
        let record = AccessEntryRecord::new("A", "alice@x.com", Some("READER".to_string()));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"dataset": "A", "entity_id": "alice@x.com", "role": "READER"})
        );
        let object = json.as_object().unwrap();
        for column in AccessEntryRecord::COLUMNS {
            assert!(object.contains_key(column), "missing column {column}");
        }
    }

    #[test]
    fn test_missing_role_serializes_as_null() {
        let record = AccessEntryRecord::new("A", "alice@x.com", None);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["role"].is_null());
    }

    #[test]
    fn test_dataset_reference_display() {
        let reference = DatasetReference::new("my-project", "sales");
        assert_eq!(reference.to_string(), "my-project.sales");
    }
}
