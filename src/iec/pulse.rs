//! Optional pulse input
//!
//! Meters blink an LED once per Wh (or fraction). A light sensor on that LED
//! lets the session wake up early from its sleep. The input is optional:
//! [`NoPulseInput`] never reports a pulse.

/// Source of "a pulse just happened" signals.
pub trait PulseInput: Send {
    /// Sample the input; `true` once per detected pulse.
    fn pulse_observed(&mut self) -> bool;

    /// Lowest and highest raw level seen so far, for diagnostics.
    fn extremes(&self) -> Option<(u16, u16)> {
        None
    }
}

impl<I: PulseInput + ?Sized> PulseInput for Box<I> {
    fn pulse_observed(&mut self) -> bool {
        (**self).pulse_observed()
    }

    fn extremes(&self) -> Option<(u16, u16)> {
        (**self).extremes()
    }
}

/// No pulse sensor attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPulseInput;

impl PulseInput for NoPulseInput {
    fn pulse_observed(&mut self) -> bool {
        false
    }
}

/// Rising-edge detector over raw analog samples (an ADC reading of a
/// photodiode, for instance).
pub struct LevelPulseDetector<F>
where
    F: FnMut() -> Option<u16> + Send,
{
    sample: F,
    threshold: u16,
    above: bool,
    extremes: Option<(u16, u16)>,
}

impl<F> LevelPulseDetector<F>
where
    F: FnMut() -> Option<u16> + Send,
{
    /// `sample` returns `None` when the reading failed; such samples are
    /// skipped.
    pub fn new(threshold: u16, sample: F) -> Self {
        LevelPulseDetector {
            sample,
            threshold,
            above: false,
            extremes: None,
        }
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }
}

impl<F> PulseInput for LevelPulseDetector<F>
where
    F: FnMut() -> Option<u16> + Send,
{
    fn pulse_observed(&mut self) -> bool {
        let Some(level) = (self.sample)() else {
            return false;
        };

        self.extremes = Some(match self.extremes {
            Some((lo, hi)) => (lo.min(level), hi.max(level)),
            None => (level, level),
        });

        let was_above = self.above;
        self.above = level >= self.threshold;
        self.above && !was_above
    }

    fn extremes(&self) -> Option<(u16, u16)> {
        self.extremes
    }
}
