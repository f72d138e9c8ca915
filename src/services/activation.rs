use chrono::Utc;

use crate::models::{KeyRecord, KeyStatus};
use crate::store::{KeyStore, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum ActivationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Key {key} kept changing during activation ({attempts} attempts)")]
    RetriesExhausted { key: String, attempts: u32 },
}

/// Why an activation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NotActive,
    HardwareMismatch,
}

impl RejectionReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::NotActive => "not active",
            RejectionReason::HardwareMismatch => "hardware mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The key is bound to the caller's hardware. `new_activation` is true
    /// only for the call that performed the binding.
    Activated {
        record: KeyRecord,
        new_activation: bool,
    },
    Rejected(RejectionReason),
    NotFound,
}

impl ActivationOutcome {
    /// Returns the outcome as a string for logging
    pub fn result_type(&self) -> &'static str {
        match self {
            ActivationOutcome::Activated {
                new_activation: true,
                ..
            } => "activated_new",
            ActivationOutcome::Activated { .. } => "activated_existing",
            ActivationOutcome::Rejected(RejectionReason::NotActive) => "rejected_not_active",
            ActivationOutcome::Rejected(RejectionReason::HardwareMismatch) => {
                "rejected_hardware_mismatch"
            }
            ActivationOutcome::NotFound => "not_found",
        }
    }
}

/// Evaluates the activation rule against a record without touching the store.
/// `None` means the record is active and unbound, so the caller should bind it.
fn evaluate(record: &KeyRecord, hwid: &str) -> Option<ActivationOutcome> {
    if record.status != KeyStatus::Active {
        return Some(ActivationOutcome::Rejected(RejectionReason::NotActive));
    }

    match record.hwid.as_deref() {
        Some(bound) if bound == hwid => Some(ActivationOutcome::Activated {
            record: record.clone(),
            new_activation: false,
        }),
        Some(_) => Some(ActivationOutcome::Rejected(
            RejectionReason::HardwareMismatch,
        )),
        None => None,
    }
}

/// Validates `key` for the device `hwid`, binding it on first use.
///
/// The binding goes through compare-and-update. When another request changed
/// the record between our read and our write, the record is read again and the
/// rule re-evaluated against the new state, up to `retry_limit` times.
#[tracing::instrument(skip(store, hwid), fields(key = %key))]
pub async fn activate_key(
    store: &KeyStore,
    key: &str,
    hwid: &str,
    retry_limit: u32,
) -> Result<ActivationOutcome, ActivationError> {
    let attempts = retry_limit.saturating_add(1);

    for attempt in 1..=attempts {
        let Some(current) = store.get(key).await? else {
            tracing::info!("Activation for unknown key");
            return Ok(ActivationOutcome::NotFound);
        };

        if let Some(outcome) = evaluate(&current.record, hwid) {
            tracing::info!(result = outcome.result_type(), "Activation evaluated");
            return Ok(outcome);
        }

        let activated_at = Utc::now();
        match store
            .compare_and_update(key, current.version, |record| {
                record.bind_hardware(hwid, activated_at);
            })
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    activated_at = %activated_at.to_rfc3339(),
                    version = updated.version,
                    "Key bound to hardware"
                );
                return Ok(ActivationOutcome::Activated {
                    record: updated.record,
                    new_activation: true,
                });
            }
            Err(StoreError::VersionConflict { actual, .. }) => {
                tracing::debug!(
                    attempt,
                    expected = current.version,
                    actual,
                    "Key changed during activation, re-evaluating"
                );
            }
            Err(StoreError::NotFound(_)) => return Ok(ActivationOutcome::NotFound),
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist activation");
                return Err(e.into());
            }
        }
    }

    tracing::warn!(attempts, "Activation gave up after repeated conflicts");
    Err(ActivationError::RetriesExhausted {
        key: key.to_string(),
        attempts,
    })
}
