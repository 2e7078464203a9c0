//! Counters and sampled history of an [`Endpoint`]'s activity.

use {
    crate::endpoint::Endpoint,
    core::{num::Saturating, time::Duration},
    derive_more::{Add, AddAssign, Sub, SubAssign},
    ringbuf::{
        HeapRb,
        traits::{Consumer, Observer, RingBuffer},
    },
    web_time::Instant,
};

/// Running totals of what an [`Endpoint`] has sent and received.
///
/// Subtract two snapshots to get the activity between them.
///
/// # Examples
///
/// ```
/// # use {tether_transport::stats::EndpointStats, core::num::Saturating};
/// let before = EndpointStats {
///     packets_sent: Saturating(10),
///     ..Default::default()
/// };
/// let after = EndpointStats {
///     packets_sent: Saturating(25),
///     ..Default::default()
/// };
/// assert_eq!(15, (after - before).packets_sent.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)] // force `#[derive]` on multiple lines
#[derive(Add, AddAssign, Sub, SubAssign)]
pub struct EndpointStats {
    /// Number of packets written.
    pub packets_sent: Saturating<usize>,
    /// Number of packets successfully read.
    pub packets_recv: Saturating<usize>,
    /// Number of our packets which the peer has acknowledged.
    pub packets_acked: Saturating<usize>,
    /// Number of incoming packets which were malformed and discarded.
    pub packets_dropped: Saturating<usize>,
    /// Total bytes of packets written.
    pub bytes_sent: Saturating<usize>,
    /// Total bytes of packets successfully read.
    pub bytes_recv: Saturating<usize>,
    /// Number of messages written into packets, counting every resend.
    pub msgs_sent: Saturating<usize>,
    /// Number of messages read out of packets, counting duplicates.
    pub msgs_recv: Saturating<usize>,
    /// Number of reliable messages which the peer has acknowledged.
    pub msgs_acked: Saturating<usize>,
}

/// Snapshot of an [`Endpoint`]'s state at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct StatsSample {
    /// When this sample was taken.
    pub at: Instant,
    /// Smoothed RTT estimate.
    pub rtt: Duration,
    /// Estimated send speed.
    pub send_bytes_per_sec: f64,
    /// Estimated receive speed.
    pub recv_bytes_per_sec: f64,
    /// Counters at the time of this sample.
    pub total: EndpointStats,
    /// Change in counters since the previous sample.
    pub delta: EndpointStats,
}

/// Bounded history of [`StatsSample`]s.
///
/// This uses a [`HeapRb`] internally to overwrite old samples, and avoid
/// unbounded growth.
///
/// # Examples
///
/// ```
/// # use {tether_transport::{endpoint::Endpoint, stats::StatsHistory, config::EndpointConfig}, web_time::Instant};
/// let endpoint = Endpoint::new("127.0.0.1:25565".parse().unwrap(), EndpointConfig::default()).unwrap();
/// let mut history = StatsHistory::with_capacity(2);
///
/// let now = Instant::now();
/// history.sample(now, &endpoint);
/// history.sample(now, &endpoint);
/// history.sample(now, &endpoint);
/// assert_eq!(2, history.len());
/// ```
pub struct StatsHistory {
    samples: HeapRb<StatsSample>,
}

impl StatsHistory {
    /// Creates an empty history holding up to `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: HeapRb::new(capacity),
        }
    }

    /// Maximum number of samples kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.capacity().get()
    }

    /// Number of samples currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.occupied_len()
    }

    /// Returns `true` if no samples have been taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Gets the newest sample.
    #[must_use]
    pub fn latest(&self) -> Option<&StatsSample> {
        self.samples.iter().next_back()
    }

    /// Iterates over samples from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StatsSample> {
        self.samples.iter()
    }

    /// Takes a sample of `endpoint`, overwriting the oldest sample if full.
    pub fn sample(&mut self, now: Instant, endpoint: &Endpoint) -> StatsSample {
        let total = endpoint.stats();
        let last_total = self.latest().map(|sample| sample.total).unwrap_or_default();
        let sample = StatsSample {
            at: now,
            rtt: endpoint.rtt().get(),
            send_bytes_per_sec: endpoint.send_speed(),
            recv_bytes_per_sec: endpoint.recv_speed(),
            total,
            delta: total - last_total,
        };
        self.samples.push_overwrite(sample);
        sample
    }
}

impl core::fmt::Debug for StatsHistory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StatsHistory")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{channel::ChannelKind, config::EndpointConfig},
        bytes::Bytes,
    };

    #[test]
    fn delta_between_samples() {
        let mut endpoint =
            Endpoint::new("127.0.0.1:25565".parse().unwrap(), EndpointConfig::default()).unwrap();
        let channel = endpoint.add_channel(ChannelKind::Unreliable);
        let mut history = StatsHistory::with_capacity(8);
        let now = Instant::now();

        let first = history.sample(now, &endpoint);
        assert_eq!(EndpointStats::default(), first.delta);

        endpoint.send_message(channel, Bytes::from_static(b"a")).unwrap();
        endpoint.send_message(channel, Bytes::from_static(b"b")).unwrap();
        let mut buf = [0u8; 1024];
        endpoint
            .write_packet(now, &mut crate::bits::BitStream::new(&mut buf[..]))
            .unwrap();

        let second = history.sample(now, &endpoint);
        assert_eq!(1, second.delta.packets_sent.0);
        assert_eq!(2, second.delta.msgs_sent.0);

        let third = history.sample(now, &endpoint);
        assert_eq!(EndpointStats::default(), third.delta);
        assert_eq!(1, third.total.packets_sent.0);
        assert_eq!(3, history.len());
    }
}
