//! The orchestration loop. Records stream in from the log reader, accumulate
//! in the batch buffer, and flush-ready batches are handed to the committer
//! on spawned tasks.
//!
//! ```text
//! (records) ---> [select loop] ---> (flush tasks) ---> blob store
//!                 |  |    ^                |
//!          append |  |    +--- completions +
//!                 v  v
//!            buffer  ticker (time-based flushes)
//! ```
//!
//! Flushes for distinct keys run fully in parallel; a key with a flush in
//! flight defers its next ready batch until the first one commits, keeping
//! same-key flushes strictly sequential. Ingestion never blocks on storage
//! I/O. Shutdown drains: pending batches are flushed regardless of
//! threshold and in-flight writes are allowed to finish.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::batch::{BatchBuffer, PendingBatch};
use crate::committer::CommitCoordinator;
use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::format::FormatRegistry;
use crate::message::Record;
use crate::partitioner::{self, PartitionKey};
use crate::source::AckerHandle;
use crate::storage::BlobStore;
use crate::tracker::TrackerHandle;

pub struct SinkDriver<S> {
    buffer: BatchBuffer,
    committer: Arc<CommitCoordinator<S>>,
    tracker: TrackerHandle,
    flush_tick: Duration,
    in_flight: HashSet<PartitionKey>,
    deferred: HashMap<PartitionKey, VecDeque<PendingBatch>>,
    flushes: JoinSet<(PartitionKey, Result<()>)>,
}

impl<S> SinkDriver<S>
where
    S: BlobStore + Send + Sync + 'static,
{
    /// Validates the configuration and wires the pipeline components.
    pub fn new(config: &SinkConfig, store: S, acker: AckerHandle) -> Result<Self> {
        config.validate()?;
        let registry = FormatRegistry::builtins(config)?;
        let format = registry.resolve(&config.format_type)?;
        let partitioner = partitioner::from_config(config)?;
        let tracker = TrackerHandle::new(acker);
        let buffer = BatchBuffer::new(
            Arc::clone(&partitioner),
            config.batch_size,
            Duration::from_millis(config.batch_time_ms),
        );
        let committer = Arc::new(CommitCoordinator::new(
            format,
            partitioner,
            store,
            config.retry.clone(),
            tracker.clone(),
        ));
        // poll well below the age threshold so time-based flushes are not
        // late by a whole batch window
        let flush_tick = Duration::from_millis((config.batch_time_ms / 10).clamp(10, 1000));
        Ok(Self {
            buffer,
            committer,
            tracker,
            flush_tick,
            in_flight: HashSet::new(),
            deferred: HashMap::new(),
            flushes: JoinSet::new(),
        })
    }

    /// Runs until the record stream ends or the token is cancelled, then
    /// drains. A flush that exhausts its retry budget fails the pipeline;
    /// the error is returned after in-flight writes have settled.
    pub async fn run(
        mut self,
        mut records: ReceiverStream<Record>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.flush_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("starting sink driver");

        let result = loop {
            tokio::select! {
                maybe_record = records.next() => match maybe_record {
                    Some(record) => {
                        if let Err(e) = self.ingest(record).await {
                            break Err(e);
                        }
                    }
                    None => {
                        info!("record stream ended");
                        break Ok(());
                    }
                },
                _ = ticker.tick() => self.dispatch_ready(),
                Some(done) = self.flushes.join_next(), if !self.flushes.is_empty() => {
                    if let Err(e) = self.complete(done) {
                        break Err(e);
                    }
                }
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    break Ok(());
                }
            }
        };

        match result {
            Ok(()) => self.drain(records).await,
            Err(e) => {
                error!(%e, "sink pipeline failed, halting ingestion");
                cancel.cancel();
                self.settle_in_flight().await;
                Err(e)
            }
        }
    }

    async fn ingest(&mut self, record: Record) -> Result<()> {
        if let Some((partition, start)) = self.buffer.append(record) {
            // fixing the acknowledgment order at ingestion time is what lets
            // commit completions arrive out of order later
            self.tracker.register(partition, start).await?;
        }
        self.dispatch_ready();
        Ok(())
    }

    fn dispatch_ready(&mut self) {
        for (key, batch) in self.buffer.poll_ready(Instant::now()) {
            self.dispatch(key, batch);
        }
    }

    fn dispatch(&mut self, key: PartitionKey, batch: PendingBatch) {
        if self.in_flight.contains(&key) {
            // a key's next batch must not start flushing before the prior
            // one has reported its commit
            self.deferred.entry(key).or_default().push_back(batch);
            return;
        }
        debug!(
            %key,
            records = batch.len(),
            bytes = batch.payload_bytes(),
            "flushing batch"
        );
        self.in_flight.insert(key.clone());
        let committer = Arc::clone(&self.committer);
        self.flushes.spawn(async move {
            let result = committer.flush(&key, &batch).await;
            (key, result)
        });
    }

    fn complete(
        &mut self,
        done: std::result::Result<(PartitionKey, Result<()>), JoinError>,
    ) -> Result<()> {
        let (key, result) = done.map_err(|e| Error::Sink(format!("flush task panicked: {e}")))?;
        self.in_flight.remove(&key);
        result?;
        let next = self.deferred.get_mut(&key).and_then(|queue| queue.pop_front());
        if let Some(batch) = next {
            if self.deferred.get(&key).is_some_and(|queue| queue.is_empty()) {
                self.deferred.remove(&key);
            }
            self.dispatch(key, batch);
        }
        Ok(())
    }

    /// Lets outstanding writes finish without starting deferred ones;
    /// abandoning an in-flight write could leave an ambiguous partial object.
    async fn settle_in_flight(&mut self) {
        while let Some(done) = self.flushes.join_next().await {
            match done {
                Ok((_, Ok(()))) => {}
                Ok((key, Err(e))) => error!(%key, %e, "flush failed while halting"),
                Err(e) => error!(%e, "flush task panicked while halting"),
            }
        }
    }

    async fn drain(mut self, records: ReceiverStream<Record>) -> Result<()> {
        drop(records);
        info!(
            pending = self.buffer.len(),
            in_flight = self.flushes.len(),
            "draining pending batches"
        );
        for (key, batch) in self.buffer.poll_all() {
            self.dispatch(key, batch);
        }

        let mut failure: Option<Error> = None;
        while let Some(done) = self.flushes.join_next().await {
            if let Err(e) = self.complete(done) {
                error!(%e, "flush failed during drain");
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        if !self.tracker.drained().await? {
            return Err(Error::AckOrdering(
                "acknowledgment ranges still pending after drain".to_string(),
            ));
        }
        info!("drain complete");
        Ok(())
    }
}
