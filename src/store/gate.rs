use tokio::sync::{Mutex, MutexGuard};

/// Serializes commits against one store.
///
/// A commit is the version check, the durable write and the publication of the
/// new snapshot. Holding the permit for the whole commit keeps the published
/// snapshot identical to what is on disk. Readers never take the gate.
#[derive(Debug, Default)]
pub struct WriteGate {
    lock: Mutex<()>,
}

/// Proof that the holder is the only committer
pub struct CommitPermit<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self) -> CommitPermit<'_> {
        CommitPermit {
            _guard: self.lock.lock().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_commits_never_overlap() {
        let gate = Arc::new(WriteGate::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.enter().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
