//! Record is the message read from the upstream log. The moment a record is
//! appended to a pending batch its per-partition sequence range is registered
//! with the [crate::tracker], which is what later decides when the upstream
//! acknowledgment cursor may advance past it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Identity of one ordered, independently-sequenced substream of the
/// upstream log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePartition {
    pub topic: Arc<str>,
    pub partition: u16,
}

impl SourcePartition {
    pub fn new(topic: impl Into<Arc<str>>, partition: u16) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for SourcePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// One message from the upstream log.
/// NOTE: It is cheap to clone. Immutable once received.
#[derive(Debug, Clone)]
pub struct Record {
    /// The source partition this record was read from.
    pub partition: SourcePartition,
    /// Monotonically increasing identifier, unique within the source
    /// partition. Not necessarily dense.
    pub sequence_id: i64,
    /// Broker-assigned publish time.
    pub publish_time: DateTime<Utc>,
    /// Opaque payload bytes.
    pub payload: Bytes,
    /// Optional key-value attributes attached by the producer.
    pub properties: Arc<HashMap<String, String>>,
}

impl Record {
    pub fn new(
        partition: SourcePartition,
        sequence_id: i64,
        publish_time: DateTime<Utc>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            partition,
            sequence_id,
            publish_time,
            payload: payload.into(),
            properties: Arc::new(HashMap::new()),
        }
    }
}

/// Cursor advance for one source partition: every sequence id less than or
/// equal to `sequence_id` is durably stored and will not be redelivered
/// after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckCursor {
    pub partition: SourcePartition,
    pub sequence_id: i64,
}

impl fmt::Display for AckCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.sequence_id)
    }
}
