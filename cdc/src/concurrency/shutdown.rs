//! Shutdown signaling for pipeline workers.
//!
//! Abstracts tokio's watch channels into a pair of shutdown types. The
//! signal carries no payload; it only notifies subscribers that they should
//! stop at the next cooperative checkpoint.

use tokio::sync::watch;

/// Transmitter side of a shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

/// Receiver side of a shutdown channel.
///
/// Workers await [`ShutdownRx::signaled`] in their select loops and check it
/// between iterations for cooperative cancellation.
pub type ShutdownRx = watch::Receiver<()>;

impl ShutdownTx {
    /// Sends the shutdown signal to all subscribers.
    ///
    /// Returns an error when no receivers are alive, which means every worker
    /// has already exited.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver subscribed to this shutdown channel.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
///
/// A watch channel is used so that every subscriber observes the same signal
/// and receivers created after the signal was sent still see it.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Waits until the shutdown signal is received.
pub async fn signaled(rx: &mut ShutdownRx) {
    // A closed channel means the transmitter is gone, which we treat the same
    // as an explicit shutdown.
    let _ = rx.changed().await;
}
