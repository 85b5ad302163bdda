//! Serializes acknowledgment per source partition. Batch ranges are
//! registered the moment their first record is buffered, in ingestion order,
//! and reported durable when their flush commits. A single actor advances
//! each partition's cursor monotonically, buffering commit completions that
//! finish out of order until every lower range has reported durable. The
//! cursor therefore never moves past data that is not yet in the store.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::{AckCursor, SourcePartition};
use crate::source::AckerHandle;

#[derive(Debug, Clone, Copy)]
enum RangeState {
    /// Buffered or mid-flush.
    Open,
    /// Confirmed in the store; holds the range's last sequence id.
    Durable(i64),
}

#[derive(Default)]
struct PartitionCursor {
    /// Tracked ranges keyed by their first sequence id.
    pending: BTreeMap<i64, RangeState>,
    committed: Option<i64>,
}

enum ActorMessage {
    Register {
        partition: SourcePartition,
        start: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Durable {
        partition: SourcePartition,
        start: i64,
        end: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Drained {
        respond_to: oneshot::Sender<bool>,
    },
}

struct Tracker {
    cursors: HashMap<SourcePartition, PartitionCursor>,
    receiver: mpsc::Receiver<ActorMessage>,
    acker: AckerHandle,
}

impl Tracker {
    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg).await;
        }
    }

    async fn handle_message(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::Register {
                partition,
                start,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_register(partition, start));
            }
            ActorMessage::Durable {
                partition,
                start,
                end,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_durable(partition, start, end).await);
            }
            ActorMessage::Drained { respond_to } => {
                let drained = self.cursors.values().all(|c| c.pending.is_empty());
                let _ = respond_to.send(drained);
            }
        }
    }

    fn handle_register(&mut self, partition: SourcePartition, start: i64) -> Result<()> {
        let cursor = self.cursors.entry(partition.clone()).or_default();
        if cursor.committed.is_some_and(|committed| start <= committed)
            || cursor.pending.contains_key(&start)
        {
            return Err(Error::AckOrdering(format!(
                "range starting at {start} for {partition} is already tracked"
            )));
        }
        cursor.pending.insert(start, RangeState::Open);
        Ok(())
    }

    async fn handle_durable(
        &mut self,
        partition: SourcePartition,
        start: i64,
        end: i64,
    ) -> Result<()> {
        let Some(cursor) = self.cursors.get_mut(&partition) else {
            return Err(Error::AckOrdering(format!(
                "durable report for untracked partition {partition}"
            )));
        };
        match cursor.pending.get_mut(&start) {
            Some(state @ RangeState::Open) => *state = RangeState::Durable(end),
            Some(RangeState::Durable(_)) => {
                return Err(Error::AckOrdering(format!(
                    "range {start}..{end} of {partition} reported durable twice"
                )));
            }
            None => {
                return Err(Error::AckOrdering(format!(
                    "durable report for unregistered range {start}..{end} of {partition}"
                )));
            }
        }

        // advance while the lowest tracked range is durable
        let mut advanced = None;
        while let Some(entry) = cursor.pending.first_entry() {
            let RangeState::Durable(last) = *entry.get() else {
                break;
            };
            advanced = Some(last);
            entry.remove();
        }

        if let Some(sequence_id) = advanced {
            cursor.committed = Some(sequence_id);
            let cursor = AckCursor {
                partition,
                sequence_id,
            };
            // the cursor is level-based, so a failed ack is re-covered by the
            // next advance; the unacked range just redelivers after a restart
            if let Err(e) = self.acker.ack(cursor.clone()).await {
                warn!(%cursor, %e, "failed to acknowledge upstream, will retry on next advance");
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct TrackerHandle {
    sender: mpsc::Sender<ActorMessage>,
}

impl TrackerHandle {
    pub(crate) fn new(acker: AckerHandle) -> Self {
        let (sender, receiver) = mpsc::channel(128);
        let tracker = Tracker {
            cursors: HashMap::new(),
            receiver,
            acker,
        };
        tokio::spawn(tracker.run());
        Self { sender }
    }

    /// Registers a range the moment its first record is buffered; must be
    /// called in ingestion order per source partition.
    pub(crate) async fn register(&self, partition: SourcePartition, start: i64) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let msg = ActorMessage::Register {
            partition,
            start,
            respond_to: tx,
        };
        let _ = self.sender.send(msg).await;
        rx.await
            .map_err(|e| Error::ActorTaskTerminated(e.to_string()))?
    }

    /// Reports a registered range as durably stored.
    pub(crate) async fn durable(
        &self,
        partition: SourcePartition,
        start: i64,
        end: i64,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let msg = ActorMessage::Durable {
            partition,
            start,
            end,
            respond_to: tx,
        };
        let _ = self.sender.send(msg).await;
        rx.await
            .map_err(|e| Error::ActorTaskTerminated(e.to_string()))?
    }

    /// Whether every registered range has been reported durable.
    pub(crate) async fn drained(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(ActorMessage::Drained { respond_to: tx }).await;
        rx.await
            .map_err(|e| Error::ActorTaskTerminated(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SourcePartition;
    use crate::source::test_utils::capturing_acker;

    fn p(partition: u16) -> SourcePartition {
        SourcePartition::new("t", partition)
    }

    #[tokio::test]
    async fn in_order_completion_advances_immediately() {
        let (acker, mut acks) = capturing_acker();
        let tracker = TrackerHandle::new(acker);

        tracker.register(p(0), 1).await.unwrap();
        tracker.durable(p(0), 1, 5).await.unwrap();

        let ack = acks.recv().await.unwrap();
        assert_eq!(ack.partition, p(0));
        assert_eq!(ack.sequence_id, 5);
        assert!(tracker.drained().await.unwrap());
    }

    #[tokio::test]
    async fn out_of_order_completion_is_buffered() {
        let (acker, mut acks) = capturing_acker();
        let tracker = TrackerHandle::new(acker);

        tracker.register(p(0), 1).await.unwrap();
        tracker.register(p(0), 6).await.unwrap();

        // the higher range commits first; the cursor must not move
        tracker.durable(p(0), 6, 9).await.unwrap();
        assert!(acks.try_recv().is_err());
        assert!(!tracker.drained().await.unwrap());

        tracker.durable(p(0), 1, 5).await.unwrap();
        let ack = acks.recv().await.unwrap();
        assert_eq!(ack.sequence_id, 9);
        assert!(tracker.drained().await.unwrap());
    }

    #[tokio::test]
    async fn partitions_advance_independently() {
        let (acker, mut acks) = capturing_acker();
        let tracker = TrackerHandle::new(acker);

        tracker.register(p(0), 1).await.unwrap();
        tracker.register(p(1), 1).await.unwrap();
        tracker.durable(p(1), 1, 3).await.unwrap();

        let ack = acks.recv().await.unwrap();
        assert_eq!(ack.partition, p(1));
        assert_eq!(ack.sequence_id, 3);
    }

    #[tokio::test]
    async fn unregistered_durable_report_is_a_violation() {
        let (acker, _acks) = capturing_acker();
        let tracker = TrackerHandle::new(acker);

        tracker.register(p(0), 1).await.unwrap();
        assert!(matches!(
            tracker.durable(p(0), 2, 5).await,
            Err(Error::AckOrdering(_))
        ));
        assert!(matches!(
            tracker.durable(p(1), 1, 5).await,
            Err(Error::AckOrdering(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_tracking_is_a_violation() {
        let (acker, _acks) = capturing_acker();
        let tracker = TrackerHandle::new(acker);

        tracker.register(p(0), 1).await.unwrap();
        assert!(matches!(
            tracker.register(p(0), 1).await,
            Err(Error::AckOrdering(_))
        ));

        tracker.durable(p(0), 1, 5).await.unwrap();
        // the cursor has passed this range already
        assert!(matches!(
            tracker.register(p(0), 3).await,
            Err(Error::AckOrdering(_))
        ));
    }
}
