//! See [`RttEstimator`].

use core::time::Duration;

/// Computes a smoothed RTT estimation for a network path.
///
/// The first sample sets the estimate directly. Every later sample is blended
/// in as an exponential moving average:
///
/// ```text
/// rtt = (1 - alpha) * rtt + alpha * sample
/// ```
///
/// Before any samples are provided, every value reads as [`Duration::ZERO`].
///
/// # Examples
///
/// ```
/// # use {tether_transport::rtt::RttEstimator, core::time::Duration};
/// let mut rtt = RttEstimator::new(0.125);
/// assert_eq!(Duration::ZERO, rtt.get());
///
/// rtt.update(Duration::from_secs(1));
/// assert_eq!(Duration::from_secs(1), rtt.get());
///
/// rtt.update(Duration::from_secs(9));
/// assert_eq!(Duration::from_secs(2), rtt.get());
/// assert_eq!(Duration::from_secs(9), rtt.latest());
/// assert_eq!(Duration::from_secs(1), rtt.min());
/// ```
#[derive(Debug, Clone)]
pub struct RttEstimator {
    alpha: f64,
    smoothed: Duration,
    latest: Duration,
    min: Duration,
    samples: usize,
}

impl RttEstimator {
    /// Creates a new estimator which weighs each new sample by `alpha`.
    ///
    /// # Panics
    ///
    /// Panics if `alpha` is not in `(0, 1]`.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "alpha must be in (0, 1]");
        Self {
            alpha,
            smoothed: Duration::ZERO,
            latest: Duration::ZERO,
            min: Duration::ZERO,
            samples: 0,
        }
    }

    /// Gets the current smoothed RTT estimation.
    #[must_use]
    pub const fn get(&self) -> Duration {
        self.smoothed
    }

    /// Gets the most recent RTT sample.
    #[must_use]
    pub const fn latest(&self) -> Duration {
        self.latest
    }

    /// Gets the minimum RTT sample registered so far.
    #[must_use]
    pub const fn min(&self) -> Duration {
        self.min
    }

    /// Gets how many samples have been added.
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Adds an RTT sample to this estimation.
    pub fn update(&mut self, rtt: Duration) {
        self.latest = rtt;
        if self.samples == 0 {
            self.smoothed = rtt;
            self.min = rtt;
        } else {
            self.smoothed = self.smoothed.mul_f64(1.0 - self.alpha) + rtt.mul_f64(self.alpha);
            self.min = self.min.min(rtt);
        }
        self.samples = self.samples.saturating_add(1);
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(0.125)
    }
}
