//! The exactly-once commit path. A flush computes its deterministic object
//! path first, so a batch replayed after a crash recomputes the identical
//! path and recognizes prior success instead of writing twice:
//!
//! 1. existence check — already present means already durable (no-op),
//! 2. serialize and write create-only (or write-then-verify when the backend
//!    has no atomic create),
//! 3. only after durability is confirmed, report the batch's sequence ranges
//!    to the tracker, which advances the upstream cursor.
//!
//! A crash before the write causes redelivery into a fresh write; a crash
//! after the write but before the cursor advance causes redelivery into an
//! existing path, caught by step 1. The cursor therefore never passes data
//! that is not in the store.

use std::sync::Arc;

use backoff::strategy::Exponential;
use tracing::{info, warn};

use crate::batch::PendingBatch;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::partitioner::{PartitionKey, Partitioner};
use crate::storage::{BlobStore, PutOutcome};
use crate::tracker::TrackerHandle;

enum CommitOutcome {
    Written { bytes: usize },
    AlreadyDurable,
}

pub(crate) struct CommitCoordinator<S> {
    format: Arc<dyn Format>,
    partitioner: Arc<dyn Partitioner>,
    store: S,
    retry: RetryConfig,
    tracker: TrackerHandle,
}

impl<S> CommitCoordinator<S>
where
    S: BlobStore + Sync,
{
    pub(crate) fn new(
        format: Arc<dyn Format>,
        partitioner: Arc<dyn Partitioner>,
        store: S,
        retry: RetryConfig,
        tracker: TrackerHandle,
    ) -> Self {
        Self {
            format,
            partitioner,
            store,
            retry,
            tracker,
        }
    }

    /// Flushes one batch. Transient storage errors are retried with backoff;
    /// exhausting the budget or hitting a permanent error fails the flush,
    /// and the caller must halt the pipeline rather than drop the batch.
    pub(crate) async fn flush(&self, key: &PartitionKey, batch: &PendingBatch) -> Result<()> {
        let path = self
            .partitioner
            .path_for(key, batch.start_sequence_id(), self.format.suffix());

        let intervals = Exponential::from_millis(
            self.retry.initial_interval_ms,
            self.retry.max_interval_ms,
            self.retry.factor,
            self.retry.jitter,
            Some(self.retry.max_attempts.saturating_sub(1)),
        );
        let outcome = backoff::retry(
            intervals,
            || self.try_commit(&path, batch),
            Error::is_transient,
        )
        .await
        .inspect_err(|e| warn!(path, %e, "flush failed"))?;

        match outcome {
            CommitOutcome::Written { bytes } => {
                info!(path, records = batch.len(), bytes, "wrote object");
            }
            CommitOutcome::AlreadyDurable => {
                info!(path, "object already present, treating flush as durable");
            }
        }

        for (partition, first, last) in batch.cursor_ranges() {
            self.tracker.durable(partition, first, last).await?;
        }
        Ok(())
    }

    async fn try_commit(&self, path: &str, batch: &PendingBatch) -> Result<CommitOutcome> {
        if self.store.exists(path).await? {
            return Ok(CommitOutcome::AlreadyDurable);
        }
        // serialization is pure, so repeating it on a retry is harmless
        let payload = self.format.serialize(batch.records())?;
        let bytes = payload.len();
        if self.store.supports_create() {
            match self.store.put_if_absent(path, payload).await? {
                PutOutcome::Created => Ok(CommitOutcome::Written { bytes }),
                PutOutcome::AlreadyExists => Ok(CommitOutcome::AlreadyDurable),
            }
        } else {
            self.store.put(path, payload.clone()).await?;
            let stored = self.store.get(path).await?;
            if stored != payload {
                return Err(Error::PermanentStorage(format!(
                    "read-back of {path} does not match the written bytes"
                )));
            }
            Ok(CommitOutcome::Written { bytes })
        }
    }
}
