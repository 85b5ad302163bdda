//! Fault-injecting blob store for crash and retry scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::{BlobStore, ObjectStoreBlob, PutOutcome};

/// Controller for forcing specific storage failures from a test.
#[derive(Debug, Default)]
pub(crate) struct FaultInjector {
    /// Fail the next N existence checks with a transient error.
    pub(crate) fail_next_exists: AtomicUsize,
    /// Fail the next N writes with a transient error, without persisting.
    pub(crate) fail_next_puts: AtomicUsize,
    /// Persist the next N writes but still report a transient error, like a
    /// crash between the write landing and its confirmation.
    pub(crate) fail_after_next_puts: AtomicUsize,
    /// Fail the next N writes with a permanent error.
    pub(crate) deny_next_puts: AtomicUsize,
}

fn consume(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory blob store with injectable failures.
#[derive(Clone)]
pub(crate) struct FlakyStore {
    inner: ObjectStoreBlob,
    faults: Arc<FaultInjector>,
}

impl FlakyStore {
    pub(crate) fn wrapping(inner: ObjectStoreBlob) -> (Self, Arc<FaultInjector>) {
        let faults = Arc::new(FaultInjector::default());
        (
            Self {
                inner,
                faults: Arc::clone(&faults),
            },
            faults,
        )
    }

    fn put_fault(&self) -> Option<(Error, bool)> {
        if consume(&self.faults.deny_next_puts) {
            return Some((
                Error::PermanentStorage("injected permission failure".to_string()),
                false,
            ));
        }
        if consume(&self.faults.fail_next_puts) {
            return Some((
                Error::TransientStorage("injected write failure".to_string()),
                false,
            ));
        }
        if consume(&self.faults.fail_after_next_puts) {
            return Some((
                Error::TransientStorage("injected confirmation loss".to_string()),
                true,
            ));
        }
        None
    }
}

impl BlobStore for FlakyStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        if consume(&self.faults.fail_next_exists) {
            return Err(Error::TransientStorage(
                "injected existence-check failure".to_string(),
            ));
        }
        self.inner.exists(path).await
    }

    async fn put_if_absent(&self, path: &str, bytes: Bytes) -> Result<PutOutcome> {
        match self.put_fault() {
            Some((error, persist)) => {
                if persist {
                    self.inner.put_if_absent(path, bytes).await?;
                }
                Err(error)
            }
            None => self.inner.put_if_absent(path, bytes).await,
        }
    }

    async fn put(&self, path: &str, bytes: Bytes) -> Result<()> {
        match self.put_fault() {
            Some((error, persist)) => {
                if persist {
                    self.inner.put(path, bytes).await?;
                }
                Err(error)
            }
            None => self.inner.put(path, bytes).await,
        }
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        self.inner.get(path).await
    }

    fn supports_create(&self) -> bool {
        self.inner.supports_create()
    }
}
