//! # Single-Direction Watt Gauge
//!
//! Approximates the current power (W) from a regular feed of absolute,
//! increasing Wh totals, for meters that report totals but no live power.
//!
//! The gauge keeps three anchors, oldest to newest:
//!
//! * `a0`: start of the current measurement series
//! * `a1`: the change before the newest one
//! * `a2`: the newest change
//!
//! Power is `Δwh · 3600000 / Δms` over `a0..a2`, recomputed only when the
//! span holds enough data to make a sensible estimate. The thresholds below
//! were tuned by observing a real meter; they carry no deeper derivation.
//!
//! ```rust
//! use iec21_rs::gauge::WattGauge;
//!
//! let mut gauge = WattGauge::new();
//! gauge.feed(0, 1000);
//! gauge.feed(30_000, 1010);
//! gauge.feed(60_000, 1020);
//! assert_eq!(gauge.power().round(), 1200.0);
//! ```

use crate::constants::MS_PER_HOUR;
use log::warn;

/// Span and delta that make an estimate sensible for high loads.
const FAST_MIN_MS: u64 = 20_000;
const FAST_MIN_WH: u64 = 20;
/// Span and delta that make an estimate sensible for modest loads.
const SLOW_MIN_MS: u64 = 50_000;
const SLOW_MIN_WH: u64 = 2;
/// Beyond this span any delta (even none) is accepted.
const IDLE_MAX_MS: u64 = 300_000;

/// No change for this long: cap the estimate at "one Wh now".
const DECAY_AFTER_MS: u64 = 30_000;

/// A long quiet stretch (a0..a1 with at most one Wh) followed by a short
/// a1..a2 gap means the load just went up; the quiet part is dropped.
const QUIET_GAP_MS: u64 = 60_000;
const QUIET_MAX_WH: u64 = 1;
const BURST_GAP_MS: u64 = 20_000;

/// A (time, cumulative Wh) sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Anchor {
    pub t: u64,
    pub wh: u64,
}

/// Windowed power estimate for one flow direction.
#[derive(Debug, Clone, Default)]
pub struct WattGauge {
    anchors: [Anchor; 3],
    initialized: bool,
    last_poll: u64,
    last_change: Option<u64>,
    watt: f32,
}

impl WattGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest stored total in Wh.
    pub fn energy_total(&self) -> u64 {
        self.anchors[2].wh
    }

    /// Best guess of the current power in W; never negative.
    pub fn power(&self) -> f32 {
        self.watt
    }

    /// Time of the most recent value change, `None` if there was none yet.
    pub fn last_change(&self) -> Option<u64> {
        self.last_change
    }

    /// Time of the most recent sample, changed or not.
    pub fn last_poll(&self) -> u64 {
        self.last_poll
    }

    pub fn anchors(&self) -> [Anchor; 3] {
        self.anchors
    }

    fn span_ms(&self) -> u64 {
        self.anchors[2].t.saturating_sub(self.anchors[0].t)
    }

    fn span_wh(&self) -> u64 {
        self.anchors[2].wh.saturating_sub(self.anchors[0].wh)
    }

    /// Whether `a0..a2` holds enough data for a reasonable estimate.
    pub fn has_enough_data(&self) -> bool {
        let (ms, wh) = (self.span_ms(), self.span_wh());
        (ms >= FAST_MIN_MS && wh >= FAST_MIN_WH)
            || (ms >= SLOW_MIN_MS && wh >= SLOW_MIN_WH)
            || ms >= IDLE_MAX_MS
    }

    fn recalculate_if_sensible(&mut self) {
        if self.has_enough_data() {
            let ms = self.span_ms();
            if ms > 0 {
                self.watt = (self.span_wh() as f64 * MS_PER_HOUR as f64 / ms as f64) as f32;
            }
        }
    }

    /// Feed a sample; do this often.
    pub fn feed(&mut self, time_ms: u64, current_wh: u64) {
        if !self.initialized {
            self.anchors = [Anchor { t: time_ms, wh: current_wh }; 3];
            self.initialized = true;
            self.last_poll = time_ms;
            self.watt = 0.0;
            return;
        }

        self.last_poll = time_ms;
        let newest = self.anchors[2];

        if current_wh == newest.wh {
            let idle = time_ms.saturating_sub(newest.t);
            if idle >= IDLE_MAX_MS {
                self.watt = 0.0;
            } else if idle > DECAY_AFTER_MS {
                // Had a Wh been used up right now, this is what we'd see.
                let ceiling = MS_PER_HOUR as f32 / idle as f32;
                if self.watt > ceiling {
                    self.watt = ceiling;
                }
            }
            return;
        }

        if current_wh < newest.wh {
            warn!(
                "Ignoring decreasing energy total {current_wh} < {} Wh",
                newest.wh
            );
            return;
        }

        self.anchors[1] = newest;
        self.anchors[2] = Anchor {
            t: time_ms,
            wh: current_wh,
        };
        self.last_change = Some(time_ms);

        let [a0, a1, a2] = self.anchors;
        if a1.t.saturating_sub(a0.t) > QUIET_GAP_MS
            && a1.wh - a0.wh <= QUIET_MAX_WH
            && a2.t.saturating_sub(a1.t) < BURST_GAP_MS
        {
            self.anchors[0] = a1;
        }

        self.recalculate_if_sensible();
    }

    /// Start a new measurement interval, typically right after reading
    /// [`power`](Self::power). The cached power is kept.
    pub fn reset(&mut self) {
        if self.has_enough_data() {
            self.anchors[0] = self.anchors[1];
            self.anchors[1] = self.anchors[2];
        }
    }
}
