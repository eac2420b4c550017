use crate::watch::Changed;
use std::time::Duration;
use tokio::sync::mpsc;

/// Forwards changes through a single-slot buffer.
///
/// While the slot is full, further changes are dropped. Every reconciliation
/// recomputes from the current store, so a dropped change loses nothing.
pub(crate) fn coalesce(mut changes: mpsc::Receiver<Changed>) -> mpsc::Receiver<Changed> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while let Some(changed) = changes.recv().await {
            match tx.try_send(changed) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(changed)) => {
                    tracing::trace!(kind = %changed.kind, "Coalesced");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    });
    rx
}

/// Waits for the next batch of changes.
///
/// Once a change arrives, waits out `interval` before draining everything
/// that is already queued, so that a burst of changes results in a single
/// reconciliation. Returns the number of changes in the batch, or `None`
/// once all senders are gone.
pub(crate) async fn next_batch(
    changes: &mut mpsc::Receiver<Changed>,
    interval: Duration,
) -> Option<usize> {
    changes.recv().await?;
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }

    let mut batch = 1;
    while changes.try_recv().is_ok() {
        batch += 1;
    }
    Some(batch)
}
