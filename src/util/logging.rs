//! # Protocol Logging Utilities
//!
//! Rate limiting for noisy protocol events and a consistent rendering of
//! frames in debug output.
//!
//! ```rust
//! use iec21_rs::util::logging::{LogThrottle, log_frame};
//!
//! let mut throttle = LogThrottle::new(60_000, 5);
//! if throttle.allow() {
//!     log::warn!("BCC mismatch");
//! }
//! log_frame("tx", b"/?!\r\n");
//! ```

use std::time::Instant;

/// Throttling structure for rate-limiting log messages
///
/// A meter with a dirty optical head can produce a checksum error on every
/// poll; this keeps such bursts out of the logs.
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Messages suppressed in the current window
    suppressed: u32,
    /// Start time of current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            if self.suppressed > 0 {
                log::warn!("{} similar messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count += 1;
        if self.count <= self.cap {
            true
        } else {
            self.suppressed += 1;
            false
        }
    }

    /// Reset the throttle (start new window immediately)
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
        self.suppressed = 0;
    }
}

/// Log frame data for debugging, control characters named.
pub fn log_frame(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 96;

    if !log::log_enabled!(target: "iec::frame", log::Level::Debug) {
        return;
    }

    let display_data = &data[..data.len().min(MAX_LOG_BYTES)];
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!(
        target: "iec::frame",
        "{prefix}: {}{suffix}",
        crate::util::hex::format_iec(display_data)
    );
    log::trace!(
        target: "iec::frame",
        "{prefix}: [{}]",
        crate::util::hex::format_hex_compact(display_data)
    );
}
