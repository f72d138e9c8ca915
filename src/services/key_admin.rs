use crate::models::{KeyRecord, KeyStatus};
use crate::store::{KeyStore, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum StatusUpdateError {
    #[error("Key not found")]
    NotFound,

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: KeyStatus, to: KeyStatus },

    #[error("Key {key} kept changing during status update ({attempts} attempts)")]
    RetriesExhausted { key: String, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub record: KeyRecord,
    pub previous: KeyStatus,
    pub changed: bool,
}

/// Revoked keys stay revoked.
pub fn transition_allowed(from: KeyStatus, to: KeyStatus) -> bool {
    from == to || from != KeyStatus::Revoked
}

/// Administrative status change. Never touches the hardware binding.
#[tracing::instrument(skip(store), fields(key = %key, status = %status))]
pub async fn set_key_status(
    store: &KeyStore,
    key: &str,
    status: KeyStatus,
    retry_limit: u32,
) -> Result<StatusChange, StatusUpdateError> {
    let attempts = retry_limit.saturating_add(1);

    for attempt in 1..=attempts {
        let current = store
            .get(key)
            .await?
            .ok_or(StatusUpdateError::NotFound)?;
        let previous = current.record.status;

        if previous == status {
            return Ok(StatusChange {
                record: current.record,
                previous,
                changed: false,
            });
        }

        if !transition_allowed(previous, status) {
            tracing::warn!(from = %previous, "Refused status transition");
            return Err(StatusUpdateError::InvalidTransition {
                from: previous,
                to: status,
            });
        }

        match store
            .compare_and_update(key, current.version, |record| record.status = status)
            .await
        {
            Ok(updated) => {
                tracing::info!(from = %previous, to = %status, "Key status changed");
                return Ok(StatusChange {
                    record: updated.record,
                    previous,
                    changed: true,
                });
            }
            Err(StoreError::VersionConflict { .. }) => {
                tracing::debug!(attempt, "Key changed during status update, retrying");
            }
            Err(StoreError::NotFound(_)) => return Err(StatusUpdateError::NotFound),
            Err(e) => return Err(e.into()),
        }
    }

    Err(StatusUpdateError::RetriesExhausted {
        key: key.to_string(),
        attempts,
    })
}
