//! Projection of dataset access entries into output records.
//!
//! Only grants to individual users (`userByEmail`) survive. Groups, domains,
//! special groups, IAM members and authorized resources are dropped without
//! error.

use crate::entry::{AccessEntryRecord, DatasetMetadata};

/// Records for one dataset's user-level grants, in source entry order.
pub fn flatten(dataset: &DatasetMetadata) -> impl Iterator<Item = AccessEntryRecord> + '_ {
    dataset
        .access_entries
        .iter()
        .filter(|entry| entry.principal_type.is_individual_user())
        .map(move |entry| {
            AccessEntryRecord::new(
                dataset.dataset_id(),
                entry.principal_id.clone(),
                entry.role.clone(),
            )
        })
}

/// Records for a sequence of datasets, preserving dataset order and then
/// entry order within each dataset.
pub fn flatten_all<'a, I>(datasets: I) -> Vec<AccessEntryRecord>
where
    I: IntoIterator<Item = &'a DatasetMetadata>,
{
    datasets.into_iter().flat_map(|ds| flatten(ds)).collect()
}
