use chrono::{DateTime, Utc};

use crate::models::{KeyRecord, KeyStatus};
use crate::services::key_format;
use crate::store::{KeyStore, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum IssuanceError {
    #[error("Invalid key format")]
    InvalidFormat,

    #[error("Key already exists")]
    AlreadyExists,

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

/// Request to register a new license key
#[derive(Debug, Clone)]
pub struct IssueKeyRequest {
    pub key: String,
    pub issued_date: DateTime<Utc>,
    pub status: KeyStatus,
}

/// Registers a new key.
///
/// The format check runs first; uniqueness is decided by the store's
/// insert-if-absent, so two concurrent issues of the same key cannot both win.
#[tracing::instrument(skip(store, request), fields(key = %request.key, status = %request.status))]
pub async fn issue_key(
    store: &KeyStore,
    request: IssueKeyRequest,
) -> Result<KeyRecord, IssuanceError> {
    if !key_format::is_valid_key(&request.key) {
        tracing::info!("Rejected key with invalid format");
        return Err(IssuanceError::InvalidFormat);
    }

    let record = KeyRecord::new(request.key, request.issued_date, request.status);

    match store.insert_if_absent(record).await {
        Ok(inserted) => {
            tracing::info!(
                issued_date = %inserted.record.issued_date.to_rfc3339(),
                "Key issued"
            );
            Ok(inserted.record)
        }
        Err(StoreError::AlreadyExists(_)) => {
            tracing::info!("Rejected duplicate key");
            Err(IssuanceError::AlreadyExists)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to store issued key");
            Err(IssuanceError::Storage(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileKeyStore;
    use std::sync::Arc;

    async fn file_store(dir: &tempfile::TempDir) -> KeyStore {
        KeyStore::File(
            FileKeyStore::open(dir.path().join("keys.json"))
                .await
                .unwrap(),
        )
    }

    fn request(key: &str) -> IssueKeyRequest {
        IssueKeyRequest {
            key: key.to_string(),
            issued_date: Utc::now(),
            status: KeyStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_issue_valid_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;

        let record = issue_key(&store, request("Moon-AB12CD34")).await.unwrap();

        assert_eq!(record.key, "Moon-AB12CD34");
        assert_eq!(record.status, KeyStatus::Active);
        assert!(record.hwid.is_none());
        assert!(record.activated_at.is_none());
        assert_eq!(store.list().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_lowercase_key_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;

        let result = issue_key(&store, request("moon-ab12cd34")).await;

        assert!(matches!(result, Err(IssuanceError::InvalidFormat)));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_issue_reports_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir).await;

        issue_key(&store, request("Moon-AB12CD34")).await.unwrap();
        let again = issue_key(&store, request("Moon-AB12CD34")).await;

        assert!(matches!(again, Err(IssuanceError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_concurrent_issue_has_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(&dir).await);

        let a = {
            let store = store.clone();
            tokio::spawn(async move { issue_key(&store, request("Moon-AB12CD34")).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { issue_key(&store, request("Moon-AB12CD34")).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let duplicate = results
            .iter()
            .filter(|r| matches!(r, Err(IssuanceError::AlreadyExists)))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(duplicate, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
