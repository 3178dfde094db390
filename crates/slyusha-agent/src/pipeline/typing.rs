//! Typing indicator heartbeat.
//!
//! Sends the "typing" chat action immediately and then on a fixed interval
//! until stopped. The loop also stops on its own after `max_duration`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use slyusha_core::types::ChatId;

use super::context::ChatApi;

/// Handle to a running heartbeat. Dropping it stops the loop.
pub struct Heartbeat {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn a heartbeat that calls `tick` every `interval`.
    pub fn start<F, Fut>(interval: Duration, max_duration: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let deadline = tokio::time::sleep(max_duration);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = &mut deadline => {
                        debug!("heartbeat reached its maximum duration");
                        break;
                    }
                    _ = async {
                        tick().await;
                        tokio::time::sleep(interval).await;
                    } => {}
                }
            }
        });
        Self { cancel, task }
    }

    /// Typing indicator for one chat.
    pub fn for_chat(
        api: Arc<dyn ChatApi>,
        chat_id: ChatId,
        interval: Duration,
        max_duration: Duration,
    ) -> Self {
        Self::start(interval, max_duration, move || {
            let api = api.clone();
            async move {
                if let Err(e) = api.send_typing(chat_id).await {
                    warn!(chat_id, error = %e, "typing indicator failed");
                }
            }
        })
    }

    /// Stop the loop. Calling it again has no effect.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(
        interval: Duration,
        max: Duration,
    ) -> (Heartbeat, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let hb = Heartbeat::start(interval, max, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (hb, ticks)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_stopped() {
        let (hb, ticks) = counting(Duration::from_secs(4), Duration::from_secs(120));
        tokio::time::sleep(Duration::from_secs(10)).await;
        // t = 0, 4, 8
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        hb.stop();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(hb.is_finished());
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn double_stop_is_harmless() {
        let (hb, ticks) = counting(Duration::from_secs(4), Duration::from_secs(120));
        tokio::time::sleep(Duration::from_millis(1)).await;
        hb.stop();
        hb.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(hb.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_stops_without_stop_call() {
        let (hb, ticks) = counting(Duration::from_secs(4), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(hb.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_the_loop() {
        let (hb, ticks) = counting(Duration::from_secs(1), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(hb);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
