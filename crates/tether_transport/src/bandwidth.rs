//! See [`BandwidthEstimator`].

use {alloc::collections::VecDeque, core::time::Duration, web_time::Instant};

/// Estimates throughput in one direction over a sliding time window.
///
/// Every packet sent or received is recorded as a `(time, bytes)` sample.
/// Samples older than the window are evicted on each record, and the speed is
/// the sum of the remaining bytes divided by the time between now and the
/// oldest remaining sample.
///
/// # Examples
///
/// ```
/// # use {tether_transport::bandwidth::BandwidthEstimator, core::time::Duration, web_time::Instant};
/// let mut bw = BandwidthEstimator::new(Duration::from_secs(1));
/// let start = Instant::now();
///
/// bw.record(start, 100);
/// // no time has passed yet
/// assert_eq!(0.0, bw.bytes_per_sec());
///
/// bw.record(start + Duration::from_millis(500), 100);
/// assert_eq!(400.0, bw.bytes_per_sec());
/// ```
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    window: Duration,
    samples: VecDeque<Sample>,
    window_bytes: usize,
    bytes_per_sec: f64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: usize,
}

impl BandwidthEstimator {
    /// Creates an estimator with no samples, averaging over `window`.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            window_bytes: 0,
            bytes_per_sec: 0.0,
        }
    }

    /// Length of the sliding window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if there are no samples in the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Speed computed at the last [`BandwidthEstimator::record`], in bytes per
    /// second.
    #[must_use]
    pub const fn bytes_per_sec(&self) -> f64 {
        self.bytes_per_sec
    }

    /// Records that `bytes` were transferred at `now`, and recomputes the
    /// speed.
    pub fn record(&mut self, now: Instant, bytes: usize) {
        self.samples.push_back(Sample { at: now, bytes });
        self.window_bytes = self.window_bytes.saturating_add(bytes);

        while let Some(oldest) = self.samples.front() {
            if now.saturating_duration_since(oldest.at) <= self.window {
                break;
            }
            self.window_bytes -= oldest.bytes;
            self.samples.pop_front();
        }

        let elapsed = self
            .samples
            .front()
            .map_or(Duration::ZERO, |oldest| now.saturating_duration_since(oldest.at));
        self.bytes_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            #[expect(clippy::cast_precision_loss, reason = "precision loss is acceptable")]
            let bytes = self.window_bytes as f64;
            bytes / elapsed.as_secs_f64()
        };
    }
}
