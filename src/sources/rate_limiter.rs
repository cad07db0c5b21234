use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::warn;

/// Per-minute request budget shared by every clone.
///
/// The budget resets on the wall-clock minute boundary. Callers over budget
/// sleep until the next minute starts.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Window>>,
}

struct Window {
    used: u32,
    minute: u64,
    limit: u32,
}

impl RateLimiter {
    /// A limit of zero disables limiting.
    pub fn new(calls_per_minute: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Window {
                used: 0,
                minute: current_minute(),
                limit: calls_per_minute,
            })),
        }
    }

    /// Wait until one more call fits in the current minute.
    pub async fn acquire(&self, context: &str) {
        loop {
            let wait = {
                let mut window = self.inner.lock().await;
                if window.limit == 0 {
                    return;
                }

                let now = current_minute();
                if now > window.minute {
                    window.used = 0;
                    window.minute = now;
                }

                if window.used < window.limit {
                    window.used += 1;
                    return;
                }

                let into_minute = unix_secs() % 60;
                warn!(
                    "Rate limit reached for {} ({}/{}), waiting {}s",
                    context,
                    window.used,
                    window.limit,
                    60 - into_minute
                );
                Duration::from_secs(60 - into_minute) + Duration::from_millis(100)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Calls still available in the current minute.
    pub async fn remaining(&self) -> u32 {
        let window = self.inner.lock().await;
        if current_minute() > window.minute {
            window.limit
        } else {
            window.limit.saturating_sub(window.used)
        }
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

fn current_minute() -> u64 {
    unix_secs() / 60
}
