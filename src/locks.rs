use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// One async mutex per student, created on first use.
#[derive(Debug)]
pub struct StudentLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl StudentLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Waits up to the configured timeout, then fails with `Busy`.
    pub async fn acquire(&self, student_id: Uuid) -> EngineResult<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(student_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                tracing::warn!(
                    %student_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "student lock busy"
                );
                Err(EngineError::Busy(student_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_holder_times_out_as_busy() {
        let locks = StudentLocks::new(Duration::from_millis(20));
        let student = Uuid::new_v4();
        let _held = locks.acquire(student).await.unwrap();

        let err = locks.acquire(student).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy(id) if id == student));
    }

    #[tokio::test]
    async fn different_students_do_not_contend() {
        let locks = StudentLocks::new(Duration::from_millis(20));
        let _first = locks.acquire(Uuid::new_v4()).await.unwrap();
        assert!(locks.acquire(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn lock_is_reusable_after_release() {
        let locks = StudentLocks::new(Duration::from_millis(20));
        let student = Uuid::new_v4();
        drop(locks.acquire(student).await.unwrap());
        assert!(locks.acquire(student).await.is_ok());
    }
}
