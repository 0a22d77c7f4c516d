//! Bernoulli sampling of captured frames.

use crate::config::SamplingSettings;

/// Decides per captured frame whether to keep it.
///
/// A frame is kept iff a uniform draw in `[0, 1)` is below `rate`. At rate
/// 1.0 nothing is drawn or counted. Every `report_every` captured frames the
/// kept/captured ratio is logged and both counters restart.
#[derive(Debug)]
pub struct Sampler {
    rate: f64,
    report_every: u64,
    captured: u64,
    sampled: u64,
    rng: fastrand::Rng,
}

impl Sampler {
    pub fn new(rate: f64, report_every: u64) -> Self {
        Self::with_rng(rate, report_every, fastrand::Rng::new())
    }

    pub fn from_settings(settings: &SamplingSettings) -> Self {
        Self::new(settings.rate, settings.report_every)
    }

    /// Use a caller-provided generator, e.g. a seeded one.
    pub fn with_rng(rate: f64, report_every: u64, rng: fastrand::Rng) -> Self {
        Self {
            rate,
            report_every: report_every.max(1),
            captured: 0,
            sampled: 0,
            rng,
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.rate < 1.0
    }

    /// Returns true if the frame should be written.
    pub fn sample(&mut self) -> bool {
        if !self.is_sampling() {
            return true;
        }

        let keep = self.rng.f64() < self.rate;
        self.captured += 1;
        if keep {
            self.sampled += 1;
        }

        if self.captured >= self.report_every {
            let ratio = self.sampled as f64 / self.captured as f64 * 100.0;
            tracing::info!(
                sampled = self.sampled,
                captured = self.captured,
                "sampling result: {}/{} ({:.2}%)",
                self.sampled,
                self.captured,
                ratio
            );
            self.captured = 0;
            self.sampled = 0;
        }

        keep
    }

    /// Counters of the current reporting window: `(sampled, captured)`.
    pub fn window(&self) -> (u64, u64) {
        (self.sampled, self.captured)
    }
}
