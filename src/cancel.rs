// src/cancel.rs
//! Cooperative cancellation for fetch work, built on a `watch` channel.
//!
//! ```ignore
//! let (trigger, cancel) = Cancel::pair();
//! let task = fetcher.spawn_background_refresh(cancel, interval);
//! // On shutdown
//! trigger.cancel();
//! ```

use tokio::sync::watch;

/// Cloneable cancellation signal. Every clone observes the same trigger.
#[derive(Debug, Clone)]
pub struct Cancel {
    rx: watch::Receiver<bool>,
}

/// Owning side of a [`Cancel`] pair.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        // send_replace never fails, even with no live receivers.
        self.tx.send_replace(true);
    }
}

impl Cancel {
    pub fn pair() -> (CancelTrigger, Cancel) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, Cancel { rx })
    }

    /// A signal that never fires. Used for background-scoped work that must outlive
    /// whichever caller happened to trigger it.
    pub fn never() -> Cancel {
        let (_tx, rx) = watch::channel(false);
        Cancel { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger fires. Pends forever if the trigger is dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `dur` unless cancelled first. Returns `false` when cancelled.
    pub async fn sleep(&self, dur: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(dur) => true,
        }
    }
}
