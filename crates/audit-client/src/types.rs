//! Wire types for the BigQuery v2 REST API.
//!
//! Only the fields this client reads or writes are modelled; everything else
//! in the responses is ignored.

use access_audit_core::{
    AccessEntry, DatasetMetadata, DatasetReference, PrincipalType, TableDestination,
    TableSchema, WriteDisposition,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `datasetReference` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub project_id: String,
    pub dataset_id: String,
}

impl From<DatasetRef> for DatasetReference {
    fn from(r: DatasetRef) -> Self {
        DatasetReference::new(r.project_id, r.dataset_id)
    }
}

/// One page of `datasets.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetList {
    pub etag: Option<String>,
    /// Present when more pages follow
    pub next_page_token: Option<String>,
    /// Omitted entirely when the project has no datasets
    #[serde(default)]
    pub datasets: Vec<DatasetListEntry>,
}

/// Summary entry from `datasets.list`. Carries no access entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListEntry {
    /// `project:dataset`
    pub id: Option<String>,
    pub dataset_reference: DatasetRef,
    pub friendly_name: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Full dataset resource from `datasets.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: Option<String>,
    pub dataset_reference: DatasetRef,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Milliseconds since the epoch, encoded as a string
    pub creation_time: Option<String>,
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub access: Vec<DatasetAccessEntry>,
}

impl Dataset {
    /// Convert to the core model, keeping access entries in wire order.
    pub fn into_metadata(self) -> DatasetMetadata {
        let dataset_id = self.dataset_reference.dataset_id.clone();
        let access_entries = self
            .access
            .iter()
            .filter_map(|entry| entry.to_access_entry(&dataset_id))
            .collect();
        DatasetMetadata::new(self.dataset_reference.into(), access_entries)
    }
}

/// One element of a dataset's `access` array.
///
/// The entry holds `role` plus exactly one entity key whose name is the
/// principal type: `{"role": "READER", "userByEmail": "alice@x.com"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetAccessEntry {
    pub role: Option<String>,
    #[serde(flatten)]
    pub entity: serde_json::Map<String, serde_json::Value>,
}

impl DatasetAccessEntry {
    /// The entity key and its identifier. Known keys win over unknown ones;
    /// object-valued identifiers (authorized views, routines, datasets) are
    /// rendered as compact JSON.
    pub fn principal(&self) -> Option<(PrincipalType, String)> {
        let known = PrincipalType::KNOWN_KEYS
            .iter()
            .find(|k| self.entity.contains_key(**k));
        let key: &str = match known {
            Some(k) => *k,
            None => self.entity.keys().next()?.as_str(),
        };

        let id = match self.entity.get(key)? {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some((PrincipalType::from_key(key), id))
    }

    /// Entries with no entity key at all are skipped.
    pub fn to_access_entry(&self, dataset_id: &str) -> Option<AccessEntry> {
        let (principal_type, principal_id) = self.principal()?;
        Some(AccessEntry::new(
            dataset_id,
            principal_type,
            principal_id,
            self.role.clone(),
        ))
    }
}

/// `tableReference` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl From<&TableDestination> for TableRef {
    fn from(d: &TableDestination) -> Self {
        Self {
            project_id: d.project_id.clone(),
            dataset_id: d.dataset_id.clone(),
            table_id: d.table_id.clone(),
        }
    }
}

/// `jobReference` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub project_id: String,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Body of a `jobs.insert` call for a load job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJobRequest {
    pub job_reference: JobRef,
    pub configuration: JobConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub load: LoadConfiguration,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadConfiguration {
    pub destination_table: TableRef,
    pub schema: TableSchema,
    pub source_format: String,
    pub write_disposition: WriteDisposition,
    pub create_disposition: String,
}

impl LoadConfiguration {
    /// Newline-delimited JSON load into `destination`, creating the table
    /// with `schema` when it does not exist.
    pub fn ndjson(
        destination: &TableDestination,
        schema: &TableSchema,
        write_disposition: WriteDisposition,
    ) -> Self {
        Self {
            destination_table: destination.into(),
            schema: schema.clone(),
            source_format: "NEWLINE_DELIMITED_JSON".to_string(),
            write_disposition,
            create_disposition: "CREATE_IF_NEEDED".to_string(),
        }
    }
}

/// Job resource returned by `jobs.insert` and `jobs.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Option<String>,
    pub job_reference: JobRef,
    pub status: Option<JobStatus>,
    pub statistics: Option<JobStatistics>,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "DONE")
    }

    /// Rows loaded, once the job has finished.
    pub fn output_rows(&self) -> Option<u64> {
        self.statistics
            .as_ref()?
            .load
            .as_ref()?
            .output_rows
            .as_deref()?
            .parse()
            .ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// PENDING, RUNNING, or DONE
    pub state: String,
    /// Set when a DONE job failed
    pub error_result: Option<ErrorProto>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    pub creation_time: Option<String>,
    pub end_time: Option<String>,
    pub load: Option<LoadStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatistics {
    /// int64 encoded as a string
    pub output_rows: Option<String>,
    pub input_files: Option<String>,
}

/// Error detail used in job status and API error bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    pub reason: Option<String>,
    pub message: Option<String>,
    pub location: Option<String>,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    pub message: String,
    /// Canonical status, e.g. PERMISSION_DENIED
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

impl ApiError {
    /// First detailed reason, e.g. "accessDenied" or "rateLimitExceeded".
    pub fn reason(&self) -> Option<&str> {
        self.errors.iter().find_map(|e| e.reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_configuration_columns_all_nullable() {
        let destination =
            TableDestination::new("yhcr-prd-phm-bia-core", "CB_SAM_TEST", "gbq_dataset_permissions")
                .unwrap();
        let load = LoadConfiguration::ndjson(
            &destination,
            &TableSchema::access_records(),
            WriteDisposition::WriteAppend,
        );

        let json = serde_json::to_value(&load).unwrap();
        assert_eq!(json["writeDisposition"], "WRITE_APPEND");
        assert_eq!(json["createDisposition"], "CREATE_IF_NEEDED");

        let fields = json["schema"]["fields"].as_array().unwrap();
        let columns: Vec<(&str, &str, &str)> = fields
            .iter()
            .map(|f| {
                (
                    f["name"].as_str().unwrap(),
                    f["type"].as_str().unwrap(),
                    f["mode"].as_str().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            columns,
            vec![
                ("dataset", "STRING", "NULLABLE"),
                ("entity_id", "STRING", "NULLABLE"),
                ("role", "STRING", "NULLABLE"),
            ]
        );
    }

    #[test]
    fn test_dataset_list_deserialize() {
        let json = r#"{
            "kind": "bigquery#datasetList",
            "etag": "abc",
            "nextPageToken": "page-2",
            "datasets": [
                {
                    "kind": "bigquery#dataset",
                    "id": "proj:sales",
                    "datasetReference": {"datasetId": "sales", "projectId": "proj"},
                    "location": "EU"
                }
            ]
        }"#;

        let list: DatasetList = serde_json::from_str(json).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(list.datasets.len(), 1);
        assert_eq!(list.datasets[0].dataset_reference.dataset_id, "sales");
    }

    #[test]
    fn test_empty_dataset_list() {
        let list: DatasetList =
            serde_json::from_str(r#"{"kind": "bigquery#datasetList", "etag": "x"}"#).unwrap();
        assert!(list.datasets.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[test]
    fn test_dataset_access_entries_convert_in_order() {
        let json = r#"{
            "id": "proj:A",
            "datasetReference": {"datasetId": "A", "projectId": "proj"},
            "access": [
                {"role": "WRITER", "specialGroup": "projectWriters"},
                {"role": "READER", "userByEmail": "alice@x.com"},
                {"role": "OWNER", "groupByEmail": "admins@x.com"},
                {"view": {"projectId": "proj", "datasetId": "B", "tableId": "v"}},
                {"role": "READER", "userByEmail": "bob@x.com"}
            ]
        }"#;

        let dataset: Dataset = serde_json::from_str(json).unwrap();
        let metadata = dataset.into_metadata();

        assert_eq!(metadata.dataset_id(), "A");
        assert_eq!(metadata.access_entries.len(), 5);

        let kinds: Vec<&str> = metadata
            .access_entries
            .iter()
            .map(|e| e.principal_type.as_str())
            .collect();
        assert_eq!(
            kinds,
            vec!["specialGroup", "userByEmail", "groupByEmail", "view", "userByEmail"]
        );
        assert_eq!(metadata.access_entries[1].principal_id, "alice@x.com");
        assert_eq!(metadata.access_entries[1].role.as_deref(), Some("READER"));
        assert_eq!(metadata.access_entries[1].dataset_id, "A");
        assert!(metadata.access_entries[3].role.is_none());
        assert!(metadata.access_entries[3].principal_id.contains("\"tableId\":\"v\""));
    }

    #[test]
    fn test_dataset_without_access_field() {
        let json = r#"{"datasetReference": {"datasetId": "A", "projectId": "proj"}}"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        assert!(dataset.into_metadata().access_entries.is_empty());
    }

    #[test]
    fn test_unknown_entity_key_is_kept() {
        let entry: DatasetAccessEntry =
            serde_json::from_str(r#"{"role": "READER", "newKind": "x"}"#).unwrap();
        let (kind, id) = entry.principal().unwrap();
        assert_eq!(kind, PrincipalType::Other("newKind".to_string()));
        assert_eq!(id, "x");
    }

    #[test]
    fn test_entry_without_entity_is_skipped() {
        let entry: DatasetAccessEntry = serde_json::from_str(r#"{"role": "READER"}"#).unwrap();
        assert!(entry.to_access_entry("A").is_none());
    }

    #[test]
    fn test_load_job_request_serialize() {
        let destination = TableDestination::new("my-project", "audit", "roles").unwrap();
        let request = LoadJobRequest {
            job_reference: JobRef {
                project_id: "my-project".to_string(),
                job_id: "access_audit_1".to_string(),
                location: None,
            },
            configuration: JobConfiguration {
                load: LoadConfiguration::ndjson(
                    &destination,
                    &TableSchema::access_records(),
                    WriteDisposition::WriteTruncate,
                ),
                labels: HashMap::new(),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        let load = &json["configuration"]["load"];
        assert_eq!(load["destinationTable"]["tableId"], "roles");
        assert_eq!(load["writeDisposition"], "WRITE_TRUNCATE");
        assert_eq!(load["createDisposition"], "CREATE_IF_NEEDED");
        assert_eq!(load["sourceFormat"], "NEWLINE_DELIMITED_JSON");
        assert_eq!(load["schema"]["fields"][1]["name"], "entity_id");
        assert_eq!(load["schema"]["fields"][1]["type"], "STRING");
        assert!(json["jobReference"].get("location").is_none());
        assert!(json["configuration"].get("labels").is_none());
    }

    #[test]
    fn test_job_output_rows() {
        let json = r#"{
            "jobReference": {"projectId": "p", "jobId": "j", "location": "EU"},
            "status": {"state": "DONE"},
            "statistics": {"load": {"outputRows": "42"}}
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert!(job.is_done());
        assert_eq!(job.output_rows(), Some(42));
    }

    #[test]
    fn test_api_error_reason() {
        let json = r#"{
            "error": {
                "code": 403,
                "message": "Exceeded rate limits",
                "status": "PERMISSION_DENIED",
                "errors": [{"reason": "rateLimitExceeded", "message": "Exceeded rate limits"}]
            }
        }"#;
        let error: ApiErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.reason(), Some("rateLimitExceeded"));
        assert_eq!(error.error.code, Some(403));
    }
}
