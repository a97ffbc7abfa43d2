use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Periodic callback on its own task
///
/// The first tick fires one full period after `spawn`. The callback returns
/// false to end the timer; `stop` ends it from outside. After either, no
/// further ticks run.
pub struct TickTimer {
    handle: Option<JoinHandle<()>>,
}

impl TickTimer {
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> BoxFuture<'static, bool> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !on_tick().await {
                    break;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Returns true only on the call that actually stopped the timer
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Format seconds as MM:SS
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
