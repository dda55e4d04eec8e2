//! Dataset enumeration.

use crate::entry::{DatasetMetadata, DatasetReference};
use crate::Result;
use async_trait::async_trait;

/// Read side of the warehouse.
///
/// Listing returns references only; access entries require a second call per
/// dataset.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Every dataset visible to the caller, in the order the warehouse lists them.
    async fn list_datasets(&self) -> Result<Vec<DatasetReference>>;

    /// Full metadata for one dataset, including its access entries.
    async fn get_dataset(&self, dataset: &DatasetReference) -> Result<DatasetMetadata>;
}

#[async_trait]
impl<T: DatasetSource + ?Sized> DatasetSource for std::sync::Arc<T> {
    async fn list_datasets(&self) -> Result<Vec<DatasetReference>> {
        (**self).list_datasets().await
    }

    async fn get_dataset(&self, dataset: &DatasetReference) -> Result<DatasetMetadata> {
        (**self).get_dataset(dataset).await
    }
}

/// Enumerates datasets and fetches their full metadata one at a time.
pub struct Lister<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: DatasetSource + ?Sized> Lister<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// References for every visible dataset.
    pub async fn references(&self) -> Result<Vec<DatasetReference>> {
        let references = self.source.list_datasets().await?;
        tracing::debug!(count = references.len(), "Listed datasets");
        Ok(references)
    }

    /// Full metadata for one dataset.
    pub async fn fetch(&self, reference: &DatasetReference) -> Result<DatasetMetadata> {
        let metadata = self.source.get_dataset(reference).await?;
        tracing::debug!(
            dataset = %reference,
            entries = metadata.access_entries.len(),
            "Fetched dataset metadata"
        );
        Ok(metadata)
    }

    /// Fetch every visible dataset sequentially in listing order (N+1 calls
    /// for N datasets), handing each one to `visit` before the next fetch.
    /// Returns the number of datasets visited.
    pub async fn for_each<F>(&self, mut visit: F) -> Result<usize>
    where
        F: FnMut(DatasetMetadata) + Send,
    {
        let references = self.references().await?;
        for reference in &references {
            visit(self.fetch(reference).await?);
        }
        Ok(references.len())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{dataset, FakeSource};
    use super::*;
    use crate::AuditError;

    async fn fetch_all(source: &FakeSource) -> Result<Vec<DatasetMetadata>> {
        let mut datasets = Vec::new();
        Lister::new(source).for_each(|ds| datasets.push(ds)).await?;
        Ok(datasets)
    }

    #[tokio::test]
    async fn test_fetches_each_dataset_in_listing_order() {
        let source = FakeSource::new(vec![
            dataset("b", &[("userByEmail", "b@x.com", "READER")]),
            dataset("a", &[]),
        ]);

        let datasets = fetch_all(&source).await.unwrap();

        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].dataset_id(), "b");
        assert_eq!(datasets[1].dataset_id(), "a");
        assert_eq!(source.calls(), vec!["list", "get:b", "get:a"]);
    }

    #[tokio::test]
    async fn test_no_datasets() {
        let source = FakeSource::default();
        let datasets = fetch_all(&source).await.unwrap();
        assert!(datasets.is_empty());
        assert_eq!(source.calls(), vec!["list"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_listing() {
        let mut source = FakeSource::new(vec![
            dataset("a", &[]),
            dataset("b", &[]),
            dataset("c", &[]),
        ]);
        source.failing = Some("b".to_string());

        let err = fetch_all(&source).await.unwrap_err();
        assert!(matches!(err, AuditError::Network(_)));
        // Nothing after the failing dataset is fetched
        assert_eq!(source.calls(), vec!["list", "get:a", "get:b"]);
    }
}
