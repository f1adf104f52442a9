//! Coarse shared clock.
//!
//! # Responsibilities
//! - Provide a cheap, process-wide millisecond timestamp for timeout math
//! - Refresh on a fixed interval instead of a syscall per inbound byte
//! - Let tests substitute a deterministic manual source

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How often the background refresher updates the shared timestamp.
const REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a millisecond clock. Cloning is cheap; all clones observe the
/// same value. Readings are stale by at most the refresh interval and never
/// decrease.
#[derive(Clone, Debug)]
pub struct Clock {
    millis: Arc<AtomicU64>,
}

impl Clock {
    /// The process-wide clock shared by every endpoint, started on first use.
    pub fn shared() -> Clock {
        static SHARED: OnceLock<Clock> = OnceLock::new();
        SHARED.get_or_init(|| Clock::system(REFRESH_INTERVAL)).clone()
    }

    /// A clock refreshed by a dedicated thread, so readings stay fresh no
    /// matter which runtime (if any) is alive. The thread exits once every
    /// handle has been dropped.
    pub fn system(refresh: Duration) -> Clock {
        let clock = Clock {
            millis: Arc::new(AtomicU64::new(unix_millis())),
        };
        let millis = Arc::downgrade(&clock.millis);
        std::thread::Builder::new()
            .name("clock-refresh".to_string())
            .spawn(move || loop {
                std::thread::sleep(refresh);
                match millis.upgrade() {
                    Some(m) => m.store(unix_millis(), Ordering::Relaxed),
                    None => break,
                }
            })
            .ok();
        clock
    }

    /// A manually driven clock for deterministic tests. Never advances on
    /// its own.
    pub fn manual(epoch_ms: u64) -> Clock {
        Clock {
            millis: Arc::new(AtomicU64::new(epoch_ms)),
        }
    }

    /// Current timestamp in milliseconds.
    pub fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    /// Advance a manual clock by `ms`.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::Relaxed);
    }

    /// Set a manual clock to an absolute value.
    pub fn set(&self, ms: u64) {
        self.millis.store(ms, Ordering::Relaxed);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
