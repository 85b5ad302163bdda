//! blobsink moves a continuous stream of messages from a partitioned log into
//! durable objects in a cloud blob store, guaranteeing that every message ends
//! up in exactly one committed object even across crashes, retries, and
//! at-least-once redelivery from the upstream log.
//!
//! ```text
//! (log source) --[c]--> (driver: batch buffer) --spawn--> (committer) --> blob store
//!                             |                               |
//!                             +--------> tracker <------------+
//!                                           |
//!                                           v
//!                                     (log acker)
//!
//! [c] - channel
//! ```
//!
//! The driver owns the per-key batch accumulators; flushes for distinct keys
//! run in parallel on spawned tasks while flushes for the same key stay
//! strictly sequential. The tracker is the single writer that advances each
//! source partition's acknowledgment cursor, and it never advances past a
//! batch that has not been confirmed durable in the store.

mod batch;
mod committer;
pub mod config;
pub mod driver;
pub mod error;
pub mod format;
pub mod message;
pub mod partitioner;
pub mod source;
pub mod storage;
mod tracker;

pub use crate::error::{Error, Result};
