use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Marks booking counts stale and wakes the debounce timer.
#[derive(Debug)]
pub(crate) struct RecountTrigger {
    dirty: AtomicBool,
    tx: mpsc::UnboundedSender<()>,
}

impl RecountTrigger {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RecountTrigger {
                dirty: AtomicBool::new(false),
                tx,
            },
            rx,
        )
    }

    pub(crate) fn request(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Clears the flag, returning whether it was set.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

/// Single-shot timer restarted by every trigger; `on_fire` runs once `delay` has passed
/// without a new trigger.
///
/// Returns when `cancel` fires or every trigger sender is gone.
pub(crate) async fn debounce<F, Fut>(
    mut triggers: mpsc::UnboundedReceiver<()>,
    delay: Duration,
    cancel: CancellationToken,
    mut on_fire: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    return;
                }
            }
        }

        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = &mut timer => break,
                trigger = triggers.recv() => match trigger {
                    Some(()) => timer.as_mut().reset(Instant::now() + delay),
                    None => return,
                },
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = on_fire() => {}
        }
    }
}
