//! Destination table, its declared schema, and the write disposition.

use crate::entry::AccessEntryRecord;
use crate::validation;
use crate::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully qualified destination table: `{project}.{dataset}.{table}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDestination {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableDestination {
    /// Build a destination, validating all three parts.
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Result<Self> {
        let destination = Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        };
        destination.validate()?;
        Ok(destination)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_project_id(&self.project_id)?;
        validation::validate_dataset_id(&self.dataset_id)?;
        validation::validate_table_id(&self.table_id)?;
        Ok(())
    }
}

impl fmt::Display for TableDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

impl FromStr for TableDestination {
    type Err = AuditError;

    /// Parse `project.dataset.table`. Split from the right so that legacy
    /// domain-scoped projects (`example.com:proj`) keep their dot.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.rsplitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(table), Some(dataset), Some(project)) => Self::new(project, dataset, table),
            _ => Err(AuditError::Validation(format!(
                "Destination must be 'project.dataset.table': '{}'",
                s
            ))),
        }
    }
}

/// How the bulk write treats an existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Replace the table contents. Re-running against unchanged state gives
    /// identical contents.
    #[default]
    WriteTruncate,
    /// Append rows to whatever the table already holds.
    WriteAppend,
    /// Fail unless the table is empty or missing.
    WriteEmpty,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
            WriteDisposition::WriteAppend => "WRITE_APPEND",
            WriteDisposition::WriteEmpty => "WRITE_EMPTY",
        }
    }
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteDisposition {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" | "write_truncate" | "replace" => Ok(WriteDisposition::WriteTruncate),
            "append" | "write_append" => Ok(WriteDisposition::WriteAppend),
            "empty" | "write_empty" | "fail" => Ok(WriteDisposition::WriteEmpty),
            other => Err(AuditError::Validation(format!(
                "Unknown write disposition '{}' (expected truncate, append, or empty)",
                other
            ))),
        }
    }
}

/// One column of the destination schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    /// Warehouse column type, e.g. `STRING`
    #[serde(rename = "type")]
    pub field_type: String,
    /// `NULLABLE`, `REQUIRED`, or `REPEATED`
    pub mode: String,
}

impl SchemaField {
    pub fn string(name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: "STRING".to_string(),
            mode: mode.into(),
        }
    }
}

/// Declared schema of the destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<SchemaField>,
}

impl TableSchema {
    /// The three-column STRING schema that [`AccessEntryRecord`] rows load into.
    ///
    /// Every column is NULLABLE to match existing audit tables; a mode change
    /// fails an append. `role` is empty for grants to authorized resources.
    pub fn access_records() -> Self {
        Self {
            fields: vec![
                SchemaField::string("dataset", "NULLABLE"),
                SchemaField::string("entity_id", "NULLABLE"),
                SchemaField::string("role", "NULLABLE"),
            ],
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check that this schema can hold [`AccessEntryRecord`] rows: exactly the
    /// record columns, in order, all STRING.
    pub fn validate_for_records(&self) -> Result<()> {
        for field in &self.fields {
            validation::validate_column_name(&field.name)?;
        }

        let names: Vec<&str> = self.column_names().collect();
        if names != AccessEntryRecord::COLUMNS {
            return Err(AuditError::Config(format!(
                "Destination schema columns {:?} do not match record columns {:?}",
                names,
                AccessEntryRecord::COLUMNS
            )));
        }

        if let Some(field) = self.fields.iter().find(|f| f.field_type != "STRING") {
            return Err(AuditError::Config(format!(
                "Destination column '{}' must be STRING, found {}",
                field.name, field.field_type
            )));
        }

        Ok(())
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::access_records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination() {
        let dest: TableDestination = "yhcr-prd-phm-bia-core.CB_SAM_TEST.gbq_dataset_permissions"
            .parse()
            .unwrap();
        assert_eq!(dest.project_id, "yhcr-prd-phm-bia-core");
        assert_eq!(dest.dataset_id, "CB_SAM_TEST");
        assert_eq!(dest.table_id, "gbq_dataset_permissions");
        assert_eq!(
            dest.to_string(),
            "yhcr-prd-phm-bia-core.CB_SAM_TEST.gbq_dataset_permissions"
        );
    }

    #[test]
    fn test_parse_domain_scoped_destination() {
        let dest: TableDestination = "example.com:my-project.audit.roles".parse().unwrap();
        assert_eq!(dest.project_id, "example.com:my-project");
        assert_eq!(dest.dataset_id, "audit");
        assert_eq!(dest.table_id, "roles");
    }

    #[test]
    fn test_parse_destination_rejects_short_names() {
        assert!("dataset.table".parse::<TableDestination>().is_err());
        assert!("table".parse::<TableDestination>().is_err());
        assert!("my-project..table".parse::<TableDestination>().is_err());
    }

    #[test]
    fn test_write_disposition_parse() {
        assert_eq!(
            "truncate".parse::<WriteDisposition>().unwrap(),
            WriteDisposition::WriteTruncate
        );
        assert_eq!(
            "WRITE_APPEND".parse::<WriteDisposition>().unwrap(),
            WriteDisposition::WriteAppend
        );
        assert_eq!(
            "empty".parse::<WriteDisposition>().unwrap(),
            WriteDisposition::WriteEmpty
        );
        assert!("overwrite-ish".parse::<WriteDisposition>().is_err());
        assert_eq!(WriteDisposition::default(), WriteDisposition::WriteTruncate);
    }

    #[test]
    fn test_write_disposition_serializes_as_api_value() {
        let json = serde_json::to_string(&WriteDisposition::WriteEmpty).unwrap();
        assert_eq!(json, "\"WRITE_EMPTY\"");
    }

    #[test]
    fn test_access_records_schema() {
        let schema = TableSchema::access_records();
        let names: Vec<&str> = schema.column_names().collect();
        assert_eq!(names, vec!["dataset", "entity_id", "role"]);
        assert!(schema.fields.iter().all(|f| f.field_type == "STRING"));
        assert!(schema.validate_for_records().is_ok());
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let mut schema = TableSchema::access_records();
        schema.fields.swap(0, 1);
        assert!(schema.validate_for_records().is_err());

        let mut schema = TableSchema::access_records();
        schema.fields[2].field_type = "INT64".to_string();
        assert!(schema.validate_for_records().is_err());

        let mut schema = TableSchema::access_records();
        schema.fields.push(SchemaField::string("extra", "NULLABLE"));
        assert!(schema.validate_for_records().is_err());
    }

    #[test]
    fn test_schema_field_serializes_type_key() {
        let json = serde_json::to_value(SchemaField::string("role", "NULLABLE")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "role", "type": "STRING", "mode": "NULLABLE"})
        );
    }
}
