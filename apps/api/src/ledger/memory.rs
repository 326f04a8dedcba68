use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Fingerprint, IdempotencyLedger, LedgerError, LedgerState, Reservation};

/// Process-local ledger for tests.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, (Uuid, LedgerState)>>,
    acquired: AtomicUsize,
}

impl MemoryLedger {
    /// Number of `Acquired` reservations handed out so far.
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn state_of(&self, fingerprint: &Fingerprint) -> Option<LedgerState> {
        self.entries
            .lock()
            .unwrap()
            .get(fingerprint.as_str())
            .map(|(_, state)| *state)
    }

    pub fn in_flight_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|(_, state)| *state == LedgerState::InFlight)
            .count()
    }
}

#[async_trait]
impl IdempotencyLedger for MemoryLedger {
    async fn reserve(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<Reservation, LedgerError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some((existing, state)) = entries.get(fingerprint.as_str()) {
            return Ok(Reservation::AlreadyExists {
                record_id: *existing,
                state: *state,
            });
        }
        entries.insert(
            fingerprint.as_str().to_string(),
            (record_id, LedgerState::InFlight),
        );
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Reservation::Acquired)
    }

    async fn finish(
        &self,
        fingerprint: &Fingerprint,
        state: LedgerState,
    ) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(fingerprint.as_str()) {
            if entry.1 == LedgerState::InFlight {
                entry.1 = state;
            }
        }
        Ok(())
    }

    async fn release(&self, fingerprint: &Fingerprint) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(fingerprint.as_str()) {
            Some((_, LedgerState::Completed)) | None => Ok(false),
            Some(_) => {
                entries.remove(fingerprint.as_str());
                Ok(true)
            }
        }
    }

    async fn release_failed(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(fingerprint.as_str()) {
            Some((owner, LedgerState::Failed)) if *owner == record_id => {
                entries.remove(fingerprint.as_str());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ledger::UnitOfWork;

    fn fingerprint() -> Fingerprint {
        UnitOfWork::Application {
            user_id: "u1",
            resume_id: Uuid::nil(),
            job_id: "job-1",
        }
        .fingerprint()
    }

    #[tokio::test]
    async fn test_concurrent_reserve_has_single_winner() {
        let ledger = Arc::new(MemoryLedger::default());
        let fp = fingerprint();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let fp = fp.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&fp, Uuid::new_v4()).await.unwrap()
            }));
        }

        let mut acquired = 0;
        for handle in handles {
            if handle.await.unwrap() == Reservation::Acquired {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
        assert_eq!(ledger.acquired_count(), 1);
    }

    #[tokio::test]
    async fn test_completed_entries_are_permanent() {
        let ledger = MemoryLedger::default();
        let fp = fingerprint();
        let record = Uuid::new_v4();

        ledger.reserve(&fp, record).await.unwrap();
        ledger.finish(&fp, LedgerState::Completed).await.unwrap();

        assert!(!ledger.release(&fp).await.unwrap());
        assert_eq!(
            ledger.reserve(&fp, Uuid::new_v4()).await.unwrap(),
            Reservation::AlreadyExists {
                record_id: record,
                state: LedgerState::Completed
            }
        );
    }

    #[tokio::test]
    async fn test_failed_entries_can_be_released() {
        let ledger = MemoryLedger::default();
        let fp = fingerprint();

        ledger.reserve(&fp, Uuid::new_v4()).await.unwrap();
        ledger.finish(&fp, LedgerState::Failed).await.unwrap();

        assert!(ledger.release(&fp).await.unwrap());
        assert_eq!(
            ledger.reserve(&fp, Uuid::new_v4()).await.unwrap(),
            Reservation::Acquired
        );
    }

    #[tokio::test]
    async fn test_release_failed_leaves_new_reservation_alone() {
        let ledger = MemoryLedger::default();
        let fp = fingerprint();
        let failed = Uuid::new_v4();

        ledger.reserve(&fp, failed).await.unwrap();
        assert!(!ledger.release_failed(&fp, failed).await.unwrap());
        ledger.finish(&fp, LedgerState::Failed).await.unwrap();
        assert!(!ledger.release_failed(&fp, Uuid::new_v4()).await.unwrap());

        assert!(ledger.release_failed(&fp, failed).await.unwrap());
        let retry = Uuid::new_v4();
        assert_eq!(ledger.reserve(&fp, retry).await.unwrap(), Reservation::Acquired);

        // A second retrier still holding the old id cannot take over.
        assert!(!ledger.release_failed(&fp, failed).await.unwrap());
        assert_eq!(ledger.state_of(&fp), Some(LedgerState::InFlight));
        assert_eq!(
            ledger.reserve(&fp, Uuid::new_v4()).await.unwrap(),
            Reservation::AlreadyExists {
                record_id: retry,
                state: LedgerState::InFlight
            }
        );
    }
}
