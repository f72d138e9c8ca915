use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{apply_mutation, StoreError, Versioned, WriteGate, INITIAL_VERSION};
use crate::models::KeyRecord;

/// In-memory image of the keys file, in file order
#[derive(Debug, Clone, Default)]
struct KeySet {
    entries: Vec<Versioned>,
    index: HashMap<String, usize>,
}

impl KeySet {
    fn from_records(records: Vec<KeyRecord>) -> Result<Self, StoreError> {
        let mut set = KeySet::default();

        for record in records {
            if set.index.contains_key(&record.key) {
                return Err(StoreError::Corrupt(format!(
                    "duplicate key {} in keys file",
                    record.key
                )));
            }
            if !record.binding_is_consistent() {
                return Err(StoreError::Corrupt(format!(
                    "key {} has hwid and activatedAt out of step",
                    record.key
                )));
            }
            set.push(Versioned {
                record,
                version: INITIAL_VERSION,
            });
        }

        Ok(set)
    }

    fn push(&mut self, entry: Versioned) {
        self.index.insert(entry.record.key.clone(), self.entries.len());
        self.entries.push(entry);
    }

    fn get(&self, key: &str) -> Option<&Versioned> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let records: Vec<&KeyRecord> = self.entries.iter().map(|e| &e.record).collect();
        serde_json::to_vec_pretty(&records)
    }
}

/// Key store backed by a single JSON document.
///
/// Every commit rewrites the whole document to a temp file in the same
/// directory and renames it over the original. The in-memory snapshot is only
/// replaced after the rename succeeded.
pub struct FileKeyStore {
    path: PathBuf,
    snapshot: RwLock<Arc<KeySet>>,
    gate: WriteGate,
}

impl FileKeyStore {
    /// Opens the keys file, creating it as an empty array if it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice::<Vec<KeyRecord>>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_atomically(&path, b"[]").await?;
                tracing::info!(path = %path.display(), "Created empty keys file");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let set = KeySet::from_records(records)?;

        tracing::info!(
            path = %path.display(),
            keys = set.entries.len(),
            "Loaded keys file"
        );

        Ok(Self {
            path,
            snapshot: RwLock::new(Arc::new(set)),
            gate: WriteGate::new(),
        })
    }

    async fn snapshot(&self) -> Arc<KeySet> {
        self.snapshot.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Versioned> {
        self.snapshot().await.get(key).cloned()
    }

    pub async fn list(&self) -> Vec<KeyRecord> {
        self.snapshot()
            .await
            .entries
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    pub async fn insert_if_absent(&self, record: KeyRecord) -> Result<Versioned, StoreError> {
        let _permit = self.gate.enter().await;
        let current = self.snapshot().await;

        if current.get(&record.key).is_some() {
            return Err(StoreError::AlreadyExists(record.key));
        }
        if !record.binding_is_consistent() {
            return Err(StoreError::InvariantViolation {
                key: record.key,
                reason: "hwid and activatedAt must be set together",
            });
        }

        let entry = Versioned {
            record,
            version: INITIAL_VERSION,
        };

        let mut next = (*current).clone();
        next.push(entry.clone());
        self.commit(next).await?;

        Ok(entry)
    }

    pub async fn compare_and_update<F>(
        &self,
        key: &str,
        expected_version: u64,
        mutator: F,
    ) -> Result<Versioned, StoreError>
    where
        F: FnOnce(&mut KeyRecord),
    {
        let _permit = self.gate.enter().await;
        let current = self.snapshot().await;

        let position = *current
            .index
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let stored = &current.entries[position];

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        let updated = Versioned {
            record: apply_mutation(&stored.record, mutator)?,
            version: stored.version + 1,
        };

        let mut next = (*current).clone();
        next.entries[position] = updated.clone();
        self.commit(next).await?;

        Ok(updated)
    }

    pub async fn ping(&self) -> Result<usize, StoreError> {
        tokio::fs::metadata(&self.path).await?;
        Ok(self.snapshot().await.entries.len())
    }

    /// Persists `next` and publishes it. Caller must hold a commit permit.
    ///
    /// Success is only reported once the directory entry is synced too. If that
    /// last sync fails the renamed file is already visible, so the snapshot is
    /// still published to match it and the error is returned.
    async fn commit(&self, next: KeySet) -> Result<(), StoreError> {
        let payload = next.to_json()?;

        if let Err(e) = replace_file(&self.path, &payload).await {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist keys file, mutation rejected"
            );
            return Err(e);
        }

        *self.snapshot.write().await = Arc::new(next);

        if let Err(e) = sync_parent_dir(&self.path).await {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Keys file replaced but its directory could not be synced"
            );
            return Err(e.into());
        }

        Ok(())
    }
}

async fn write_atomically(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    replace_file(path, payload).await?;
    sync_parent_dir(path).await?;
    Ok(())
}

/// Writes `payload` to a synced temp file next to `path` and renames it over `path`
async fn replace_file(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

    let written = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(())
}

/// Flushes the directory entry of `path` so a completed rename survives a crash
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
