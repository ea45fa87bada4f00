//! Background service starters and shutdown.

use crate::store;

use super::Engine;

impl Engine {
    /// Start the comment queue's poll loop
    ///
    /// The interval comes from the settings store (`biliUpload.checkInterval`)
    /// and falls back to the configured one. The loop stops when the engine
    /// shuts down.
    pub async fn start_comment_queue(&self) -> tokio::task::JoinHandle<()> {
        let interval =
            store::check_interval(self.store.as_ref(), self.config.comments.check_interval).await;
        let shutdown = self.queue.shutdown_token().child_token();
        let comments = self.comments.clone();

        let handle = tokio::spawn(async move {
            comments.run(interval, shutdown).await;
        });

        tracing::info!(
            interval_secs = interval.as_secs(),
            "Comment queue background task started"
        );

        handle
    }

    /// Stop admitting tasks, interrupt everything unfinished and stop
    /// background loops
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}
