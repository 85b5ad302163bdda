//! Synthetic log source for local runs and load testing. Emits JSON payloads
//! with per-partition monotonically increasing sequence ids at a fixed rate;
//! acknowledgments are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::message::{AckCursor, Record, SourcePartition};
use crate::source::{LogAcker, LogReader};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub topic: String,
    pub partitions: u16,
    /// Records emitted per tick, spread round-robin over the partitions.
    pub records_per_tick: usize,
    pub tick: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            topic: "demo".to_string(),
            partitions: 2,
            records_per_tick: 10,
            tick: Duration::from_millis(100),
        }
    }
}

pub struct Generator {
    topic: Arc<str>,
    partitions: u16,
    records_per_tick: usize,
    tick: Duration,
    next_sequence: Vec<i64>,
    round_robin: usize,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> (Self, GeneratorAcker) {
        let generator = Self {
            topic: config.topic.into(),
            partitions: config.partitions.max(1),
            records_per_tick: config.records_per_tick.max(1),
            tick: config.tick,
            next_sequence: vec![1; config.partitions.max(1) as usize],
            round_robin: 0,
        };
        (generator, GeneratorAcker)
    }
}

impl LogReader for Generator {
    fn name(&self) -> &'static str {
        "generator"
    }

    async fn read(&mut self) -> Result<Vec<Record>> {
        tokio::time::sleep(self.tick).await;
        let mut records = Vec::with_capacity(self.records_per_tick);
        for _ in 0..self.records_per_tick {
            let partition = (self.round_robin % self.partitions as usize) as u16;
            self.round_robin += 1;
            let sequence_id = self.next_sequence[partition as usize];
            self.next_sequence[partition as usize] += 1;
            records.push(Record::new(
                SourcePartition {
                    topic: Arc::clone(&self.topic),
                    partition,
                },
                sequence_id,
                Utc::now(),
                format!("{{\"value\":{sequence_id}}}"),
            ));
        }
        Ok(records)
    }
}

pub struct GeneratorAcker;

impl LogAcker for GeneratorAcker {
    async fn ack(&mut self, cursor: AckCursor) -> Result<()> {
        debug!(%cursor, "cursor advanced");
        Ok(())
    }
}
