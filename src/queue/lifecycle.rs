//! Shutdown coordination.

use std::sync::atomic::Ordering;

use super::TaskQueue;
use super::control::interrupt_entry;

impl TaskQueue {
    /// Stop the queue
    ///
    /// This method performs the shutdown sequence:
    /// 1. Stops accepting and admitting tasks (`add_task` and `start` fail
    ///    with [`Error::ShuttingDown`](crate::Error::ShuttingDown))
    /// 2. Interrupts every unfinished task, emitting one `error` event each
    /// 3. Fires the root cancellation token shared by all running operations
    ///
    /// Snapshots stay readable afterwards. Calling it twice is harmless.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");

        // 1. Stop accepting new tasks
        self.accepting_new.store(false, Ordering::SeqCst);

        // 2. Interrupt everything still in flight or waiting
        let interrupted = {
            let mut registry = self.registry.lock().await;
            let ids = registry.ids().to_vec();
            let mut count = 0usize;
            for id in ids {
                if let Some(entry) = registry.get_mut(id)
                    && !entry.status.is_terminal()
                {
                    interrupt_entry(entry, &self.events);
                    count += 1;
                }
            }
            count
        };

        // 3. Cancel anything derived from the root token
        self.shutdown_token.cancel();

        tracing::info!(interrupted, "Task queue shutdown complete");
    }

    /// Token cancelled when the queue shuts down
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }
}
