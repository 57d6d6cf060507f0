use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Holds running tasks and the shutdown channel for the engine.
/// Call `shutdown()` to gracefully stop services.
pub struct ServiceHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl ServiceHandle {
    /// Create a handle together with a receiver clonable by tasks.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = ServiceHandle { shutdown_tx: tx, join_handles: vec![] };
        (handle, rx)
    }

    /// Attach a background task handle (awaited on shutdown).
    pub fn attach(&mut self, h: JoinHandle<anyhow::Result<()>>) {
        self.join_handles.push(h);
    }

    /// Signal shutdown to all tasks and await them sequentially.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        for h in self.join_handles {
            match h.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("service task returned error: {:?}", e),
                Err(e) => tracing::error!("task join error: {:?}", e),
            }
        }
        Ok(())
    }

    /// A cloneable shutdown receiver for tasks that observe shutdown state.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
