use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;

use super::{DriverError, Result};

/// Cooperative cancellation shared by one logical operation and its caller.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fails with `Cancelled` once the signal fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        Ok(())
    }

    /// Resolves when the signal fires.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender is owned by `self`, so this cannot close while we wait.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for `delay` unless the operation is cancelled first.
pub async fn sleep_or_cancel(delay: Duration, signal: &CancellationSignal) -> Result<()> {
    signal.check()?;
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = signal.cancelled() => Err(DriverError::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}
