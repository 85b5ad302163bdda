//! Per-key accumulation of records into flush-ready batches. The buffer is
//! owned by the driver task alone, so appends never contend with flush I/O;
//! polling removes a batch from the live map, and a fresh accumulator starts
//! for the key on the next append.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::message::{Record, SourcePartition};
use crate::partitioner::{PartitionKey, Partitioner};

/// Accumulator for one partition key. Insertion order is preserved; once the
/// batch is polled out of the buffer it never accepts another record.
#[derive(Debug)]
pub(crate) struct PendingBatch {
    records: Vec<Record>,
    first_arrival: Instant,
    payload_bytes: usize,
    // lowest and highest sequence id per contained source partition
    ranges: BTreeMap<SourcePartition, (i64, i64)>,
}

impl PendingBatch {
    fn new(now: Instant) -> Self {
        Self {
            records: Vec::new(),
            first_arrival: now,
            payload_bytes: 0,
            ranges: BTreeMap::new(),
        }
    }

    /// Appends a record; returns the newly-opened cursor range when this is
    /// the first record of its source partition in this batch.
    fn push(&mut self, record: Record) -> Option<(SourcePartition, i64)> {
        self.payload_bytes += record.payload.len();
        let opened = match self.ranges.get_mut(&record.partition) {
            Some((first, last)) => {
                *first = (*first).min(record.sequence_id);
                *last = (*last).max(record.sequence_id);
                None
            }
            None => {
                self.ranges.insert(
                    record.partition.clone(),
                    (record.sequence_id, record.sequence_id),
                );
                Some((record.partition.clone(), record.sequence_id))
            }
        };
        self.records.push(record);
        opened
    }

    pub(crate) fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Sequence id of the first buffered record; the object path is derived
    /// from it.
    pub(crate) fn start_sequence_id(&self) -> i64 {
        self.records
            .first()
            .map(|r| r.sequence_id)
            .expect("a pending batch always holds at least one record")
    }

    /// The (partition, first, last) sequence ranges contained in this batch.
    pub(crate) fn cursor_ranges(&self) -> impl Iterator<Item = (SourcePartition, i64, i64)> + '_ {
        self.ranges
            .iter()
            .map(|(partition, &(first, last))| (partition.clone(), first, last))
    }

    fn is_ready(&self, now: Instant, batch_size: usize, batch_age: Duration) -> bool {
        self.records.len() >= batch_size || now.duration_since(self.first_arrival) >= batch_age
    }
}

pub(crate) struct BatchBuffer {
    partitioner: Arc<dyn Partitioner>,
    batch_size: usize,
    batch_age: Duration,
    live: HashMap<PartitionKey, PendingBatch>,
}

impl BatchBuffer {
    pub(crate) fn new(
        partitioner: Arc<dyn Partitioner>,
        batch_size: usize,
        batch_age: Duration,
    ) -> Self {
        Self {
            partitioner,
            batch_size,
            batch_age,
            live: HashMap::new(),
        }
    }

    /// Routes the record into the live batch for its key, creating one
    /// lazily. Returns the newly-opened cursor range, if any, so the caller
    /// can register it before any flush of this batch can complete.
    pub(crate) fn append(&mut self, record: Record) -> Option<(SourcePartition, i64)> {
        let key = self.partitioner.key_for(&record);
        self.live
            .entry(key)
            .or_insert_with(|| PendingBatch::new(Instant::now()))
            .push(record)
    }

    /// Removes and returns every batch meeting the count-or-age threshold.
    pub(crate) fn poll_ready(&mut self, now: Instant) -> Vec<(PartitionKey, PendingBatch)> {
        let ready: Vec<PartitionKey> = self
            .live
            .iter()
            .filter(|(_, batch)| batch.is_ready(now, self.batch_size, self.batch_age))
            .map(|(key, _)| key.clone())
            .collect();
        ready
            .into_iter()
            .map(|key| {
                let batch = self.live.remove(&key).expect("polled key is live");
                (key, batch)
            })
            .collect()
    }

    /// Drains every live batch regardless of threshold, for shutdown.
    pub(crate) fn poll_all(&mut self) -> Vec<(PartitionKey, PendingBatch)> {
        self.live.drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }
}
