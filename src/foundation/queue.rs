use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use crate::foundation::core::Stage;
use crate::foundation::error::{RenderError, RenderResult};

/// One unit on a hand-off channel.
#[derive(Debug)]
pub(crate) enum StageMsg<T> {
    Item(T),
    End,
}

/// Producer half of a bounded FIFO hand-off between two stages.
pub(crate) struct Publisher<T> {
    tx: SyncSender<StageMsg<T>>,
    stage: Stage,
}

/// Consumer half of a bounded FIFO hand-off between two stages.
pub(crate) struct Subscriber<T> {
    rx: Receiver<StageMsg<T>>,
    stage: Stage,
    timeout: Duration,
}

/// Create a bounded hand-off from `producer` to `consumer`.
///
/// `timeout` bounds every receive on the consumer side.
pub(crate) fn hand_off<T>(
    capacity: usize,
    producer: Stage,
    consumer: Stage,
    timeout: Duration,
) -> (Publisher<T>, Subscriber<T>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (
        Publisher {
            tx,
            stage: producer,
        },
        Subscriber {
            rx,
            stage: consumer,
            timeout,
        },
    )
}

impl<T> Publisher<T> {
    /// Block until the consumer has room, then enqueue `item`.
    pub(crate) fn publish(&self, item: T) -> RenderResult<()> {
        self.tx
            .send(StageMsg::Item(item))
            .map_err(|_| RenderError::StageClosed { stage: self.stage })
    }

    /// Send the end-of-stream marker and release the channel.
    pub(crate) fn finish(self) -> RenderResult<()> {
        self.tx
            .send(StageMsg::End)
            .map_err(|_| RenderError::StageClosed { stage: self.stage })
    }
}

impl<T> Subscriber<T> {
    /// Receive the next item, `None` once the producer sent its end marker.
    ///
    /// Waiting longer than the configured timeout is a starvation error, and a producer that
    /// disappears without an end marker is reported as an abort.
    pub(crate) fn next(&self) -> RenderResult<Option<T>> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(StageMsg::Item(item)) => Ok(Some(item)),
            Ok(StageMsg::End) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(RenderError::StarvationTimeout {
                stage: self.stage,
                waited: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(RenderError::StageAborted { stage: self.stage })
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/queue.rs"]
mod tests;
