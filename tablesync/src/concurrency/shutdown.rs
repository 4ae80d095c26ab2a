//! Shutdown signaling for sync runs.
//!
//! Built on a [`watch`] channel holding a flag, so a receiver subscribed after the signal was
//! sent still observes it.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown of every subscribed receiver.
    ///
    /// Succeeds even when nobody is subscribed yet.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Returns the channel to the running state so it can be reused.
    pub fn reset(&self) {
        self.0.send_replace(false);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown was requested.
    ///
    /// Never resolves if every [`ShutdownTx`] is dropped without requesting shutdown.
    pub async fn wait_for_shutdown(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a new shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);

    (ShutdownTx(tx), ShutdownRx(rx))
}
