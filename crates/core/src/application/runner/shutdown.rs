// Runner Shutdown Token

use tokio::sync::watch;

/// Stop signal observed between ticks
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if a stop was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the stop signal (returns at once if it was already sent).
    ///
    /// A dropped sender never signals, so the wait then lasts forever.
    pub async fn wait(&mut self) {
        while !self.is_shutdown() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Stop sender held by whoever started the runner
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Cancel the next scheduled tick; a tick already running completes
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
