//! Boundary to the upstream partitioned log. Read and ack run on separate
//! actors so a blocked read (an idle log) never starves acknowledgments.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::message::{AckCursor, Record};

pub mod generator;

/// Read side of the upstream log.
#[trait_variant::make(LogReader: Send)]
pub trait LocalLogReader {
    /// Name of the backing log implementation.
    fn name(&self) -> &'static str;

    /// Next batch of records; pending until at least one record is available.
    async fn read(&mut self) -> Result<Vec<Record>>;
}

/// Ack side of the upstream log. Advancing the cursor is durable: sequence
/// ids at or below it will not be redelivered after a restart, everything
/// above may be (at-least-once).
#[trait_variant::make(LogAcker: Send)]
pub trait LocalLogAcker {
    async fn ack(&mut self, cursor: AckCursor) -> Result<()>;
}

struct AckActorMessage {
    cursor: AckCursor,
    respond_to: oneshot::Sender<Result<()>>,
}

struct AckActor<A> {
    acker: A,
    receiver: mpsc::Receiver<AckActorMessage>,
}

impl<A> AckActor<A>
where
    A: LogAcker,
{
    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            let result = self.acker.ack(msg.cursor).await;
            let _ = msg.respond_to.send(result);
        }
    }
}

/// Handle to the ack actor; the tracker is its only caller.
#[derive(Clone)]
pub struct AckerHandle {
    sender: mpsc::Sender<AckActorMessage>,
}

impl AckerHandle {
    pub fn new<A>(acker: A) -> Self
    where
        A: LogAcker + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(64);
        tokio::spawn(AckActor { acker, receiver }.run());
        Self { sender }
    }

    pub(crate) async fn ack(&self, cursor: AckCursor) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let msg = AckActorMessage {
            cursor,
            respond_to: tx,
        };
        // Ignore send errors. If send fails, so does the recv.await below.
        let _ = self.sender.send(msg).await;
        rx.await
            .map_err(|e| Error::ActorTaskTerminated(e.to_string()))?
    }
}

/// Pumps records off the reader onto a channel until cancelled or the
/// receiver is dropped. Returns the record stream and the pump's handle.
pub fn streaming_read<R>(
    mut reader: R,
    capacity: usize,
    cancel: CancellationToken,
) -> (ReceiverStream<Record>, JoinHandle<Result<()>>)
where
    R: LogReader + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        info!(source = reader.name(), "starting log reader");
        loop {
            let records = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = reader.name(), "stopping log reader");
                    return Ok(());
                }
                read = reader.read() => read?,
            };
            for record in records {
                if tx.send(record).await.is_err() {
                    // receiver went away, the driver is shutting down
                    return Ok(());
                }
            }
        }
    });
    (ReceiverStream::new(rx), handle)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Forwards every acknowledged cursor to a channel for assertions.
    pub(crate) struct CapturingAcker {
        sender: mpsc::UnboundedSender<AckCursor>,
    }

    impl LogAcker for CapturingAcker {
        async fn ack(&mut self, cursor: AckCursor) -> Result<()> {
            self.sender
                .send(cursor)
                .map_err(|e| Error::Source(e.to_string()))
        }
    }

    pub(crate) fn capturing_acker() -> (AckerHandle, mpsc::UnboundedReceiver<AckCursor>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AckerHandle::new(CapturingAcker { sender: tx }), rx)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::test_utils::capturing_acker;
    use super::*;
    use crate::message::SourcePartition;

    struct ScriptedReader {
        batches: Vec<Vec<Record>>,
    }

    impl LogReader for ScriptedReader {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn read(&mut self) -> Result<Vec<Record>> {
            if self.batches.is_empty() {
                // simulate an idle log
                std::future::pending::<()>().await;
            }
            Ok(self.batches.remove(0))
        }
    }

    #[tokio::test]
    async fn streaming_read_flattens_batches() {
        use tokio_stream::StreamExt;

        let partition = SourcePartition::new("t", 0);
        let reader = ScriptedReader {
            batches: vec![
                vec![
                    Record::new(partition.clone(), 1, Utc::now(), "a"),
                    Record::new(partition.clone(), 2, Utc::now(), "b"),
                ],
                vec![Record::new(partition.clone(), 3, Utc::now(), "c")],
            ],
        };
        let cancel = CancellationToken::new();
        let (mut stream, handle) = streaming_read(reader, 8, cancel.clone());

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(stream.next().await.unwrap().sequence_id);
        }
        assert_eq!(seen, vec![1, 2, 3]);

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn acker_handle_round_trips() {
        let (acker, mut cursors) = capturing_acker();
        let cursor = AckCursor {
            partition: SourcePartition::new("t", 1),
            sequence_id: 10,
        };
        acker.ack(cursor.clone()).await.unwrap();
        assert_eq!(cursors.recv().await, Some(cursor));
    }
}
