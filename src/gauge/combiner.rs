//! Import/export power combiner with change hysteresis.

use crate::gauge::window::WattGauge;

/// Below this magnitude a reading around a zero baseline is noise.
const ZERO_BAND_WATT: i32 = 20;

/// Current/previous ratios inside this band are not worth reporting.
const RATIO_LOW: f32 = 0.6;
const RATIO_HIGH: f32 = 1.6;

/// Two [`WattGauge`]s, one per flow direction, combined into a signed net
/// power. Imported power is positive, exported power negative.
#[derive(Debug, Clone, Default)]
pub struct EnergyGauge {
    positive: WattGauge,
    negative: WattGauge,
    baseline: i32,
}

impl EnergyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_positive(&mut self, time_ms: u64, wh: u64) {
        self.positive.feed(time_ms, wh);
    }

    pub fn feed_negative(&mut self, time_ms: u64, wh: u64) {
        self.negative.feed(time_ms, wh);
    }

    /// Feed both directions with one timestamp.
    pub fn feed(&mut self, time_ms: u64, positive_wh: u64, negative_wh: u64) {
        self.feed_positive(time_ms, positive_wh);
        self.feed_negative(time_ms, negative_wh);
    }

    pub fn positive(&self) -> &WattGauge {
        &self.positive
    }

    pub fn negative(&self) -> &WattGauge {
        &self.negative
    }

    pub fn positive_total(&self) -> u64 {
        self.positive.energy_total()
    }

    pub fn negative_total(&self) -> u64 {
        self.negative.energy_total()
    }

    /// Power recorded at the last [`reset`](Self::reset).
    pub fn baseline(&self) -> i32 {
        self.baseline
    }

    /// Net power in W. The direction that changed most recently wins; the
    /// other contributes nothing.
    pub fn instantaneous_power(&self) -> i32 {
        if self.negative.last_change() > self.positive.last_change() {
            -(self.negative.power().round() as i32)
        } else {
            self.positive.power().round() as i32
        }
    }

    /// Whether the power moved enough since the last reset to be reported.
    pub fn is_significant_change(&self) -> bool {
        let current = self.instantaneous_power();
        let previous = self.baseline;

        if (previous < 0 && current > 0) || (previous > 0 && current < 0) {
            return true;
        }
        if previous == 0 {
            return current.abs() >= ZERO_BAND_WATT;
        }

        let ratio = current as f32 / previous as f32;
        !(RATIO_LOW..=RATIO_HIGH).contains(&ratio)
    }

    /// Record the current power as the new baseline and start new
    /// measurement intervals in both directions.
    pub fn reset(&mut self) {
        self.baseline = self.instantaneous_power();
        self.positive.reset();
        self.negative.reset();
    }
}
