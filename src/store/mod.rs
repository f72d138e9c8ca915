// Store module - durable, versioned collection of license keys

pub mod file;
pub mod gate;
pub mod postgres;

pub use file::FileKeyStore;
pub use gate::WriteGate;
pub use postgres::PgKeyStore;

use crate::models::KeyRecord;

/// Version assigned to a record when it is first inserted or loaded
pub const INITIAL_VERSION: u64 = 1;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invariant violated for {key}: {reason}")]
    InvariantViolation { key: String, reason: &'static str },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt key store: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True for failures of the storage medium itself, as opposed to
    /// conflicts the caller can act on.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_)
                | StoreError::Serialization(_)
                | StoreError::Corrupt(_)
                | StoreError::Database(_)
        )
    }
}

/// A record together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub record: KeyRecord,
    pub version: u64,
}

/// Applies `mutator` to a copy of `current` and checks that the result still
/// honours the record invariants.
pub(crate) fn apply_mutation<F>(current: &KeyRecord, mutator: F) -> Result<KeyRecord, StoreError>
where
    F: FnOnce(&mut KeyRecord),
{
    let mut next = current.clone();
    mutator(&mut next);

    let violation = if next.key != current.key {
        Some("key is immutable")
    } else if next.issued_date != current.issued_date {
        Some("issued date is immutable")
    } else if current.hwid.is_some()
        && (next.hwid != current.hwid || next.activated_at != current.activated_at)
    {
        Some("hardware binding is append-once")
    } else if !next.binding_is_consistent() {
        Some("hwid and activatedAt must be set together")
    } else {
        None
    };

    match violation {
        Some(reason) => Err(StoreError::InvariantViolation {
            key: current.key.clone(),
            reason,
        }),
        None => Ok(next),
    }
}

/// The key store behind the engines.
///
/// Both backends offer the same contract: `insert_if_absent` and
/// `compare_and_update` are the only mutations, and a successful mutation is
/// durable before it returns.
pub enum KeyStore {
    File(FileKeyStore),
    Postgres(PgKeyStore),
}

impl KeyStore {
    pub fn backend_name(&self) -> &'static str {
        match self {
            KeyStore::File(_) => "file",
            KeyStore::Postgres(_) => "postgres",
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        match self {
            KeyStore::File(store) => Ok(store.get(key).await),
            KeyStore::Postgres(store) => store.get(key).await,
        }
    }

    pub async fn insert_if_absent(&self, record: KeyRecord) -> Result<Versioned, StoreError> {
        match self {
            KeyStore::File(store) => store.insert_if_absent(record).await,
            KeyStore::Postgres(store) => store.insert_if_absent(record).await,
        }
    }

    /// Applies `mutator` only if the stored version still equals `expected_version`.
    pub async fn compare_and_update<F>(
        &self,
        key: &str,
        expected_version: u64,
        mutator: F,
    ) -> Result<Versioned, StoreError>
    where
        F: FnOnce(&mut KeyRecord),
    {
        match self {
            KeyStore::File(store) => store.compare_and_update(key, expected_version, mutator).await,
            KeyStore::Postgres(store) => {
                store
                    .compare_and_update(key, expected_version, mutator)
                    .await
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<KeyRecord>, StoreError> {
        match self {
            KeyStore::File(store) => Ok(store.list().await),
            KeyStore::Postgres(store) => store.list().await,
        }
    }

    /// Checks the backing medium is reachable and returns the record count
    pub async fn ping(&self) -> Result<usize, StoreError> {
        match self {
            KeyStore::File(store) => store.ping().await,
            KeyStore::Postgres(store) => store.ping().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyStatus;
    use chrono::Utc;

    fn record() -> KeyRecord {
        KeyRecord::new("Moon-AB12CD34", Utc::now(), KeyStatus::Active)
    }

    #[test]
    fn test_mutation_may_change_status() {
        let current = record();
        let next = apply_mutation(&current, |r| r.status = KeyStatus::Revoked).unwrap();
        assert_eq!(next.status, KeyStatus::Revoked);
        assert_eq!(current.status, KeyStatus::Active);
    }

    #[test]
    fn test_mutation_cannot_rebind_hardware() {
        let mut current = record();
        current.bind_hardware("device-1", Utc::now());

        let result = apply_mutation(&current, |r| r.hwid = Some("device-2".to_string()));
        assert!(matches!(
            result,
            Err(StoreError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_mutation_cannot_split_binding() {
        let current = record();
        let result = apply_mutation(&current, |r| r.hwid = Some("device-1".to_string()));
        assert!(matches!(
            result,
            Err(StoreError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_mutation_cannot_rename_key() {
        let current = record();
        let result = apply_mutation(&current, |r| r.key = "Moon-00000000".to_string());
        assert!(matches!(
            result,
            Err(StoreError::InvariantViolation { .. })
        ));
    }
}
