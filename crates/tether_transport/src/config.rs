//! See [`EndpointConfig`].

use {
    crate::packet::{COUNT_BITS, HEADER_BITS, LEN_BITS, MAX_LEN, MESSAGE_ID_BITS},
    core::time::Duration,
    derive_more::{Display, Error},
};

/// Configuration for an [`Endpoint`].
///
/// Both peers of a connection must agree on [`EndpointConfig::max_packet_bytes`]
/// and on the channel layout, since neither is negotiated on the wire. The
/// other values only affect the local side.
///
/// [`Endpoint`]: crate::endpoint::Endpoint
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointConfig {
    /// Maximum length of a single packet, in bytes.
    ///
    /// By default, this is [`tether_io::IP_MTU`].
    pub max_packet_bytes: usize,
    /// Maximum length of a single message payload, in bytes.
    ///
    /// Messages longer than this are rejected by
    /// [`Endpoint::send_message`](crate::endpoint::Endpoint::send_message).
    /// This must leave room in a packet for the header and per-channel
    /// overhead, and may be at most 1023 since lengths are encoded in 10 bits.
    ///
    /// By default, this is 768.
    pub max_message_bytes: usize,
    /// Maximum number of messages, across all channels, written into a single
    /// packet.
    ///
    /// Regardless of this value, a single channel never writes more than
    /// [`u8::MAX`] messages into one packet, since the per-channel count is
    /// encoded in 8 bits.
    ///
    /// By default, this is 256.
    pub max_messages_per_packet: usize,
    /// Minimum time between two sends of the same unacknowledged reliable
    /// message.
    ///
    /// By default, this is 100ms.
    pub resend_interval: Duration,
    /// Weight of a new sample in the smoothed RTT.
    ///
    /// By default, this is 0.125.
    pub rtt_alpha: f64,
    /// Length of the sliding window used to estimate send and receive speed.
    ///
    /// By default, this is 1 second.
    pub bandwidth_window: Duration,
    /// Number of slots in the packet acknowledgement rings.
    ///
    /// This bounds how far apart two packet sequence numbers can be while both
    /// are still tracked.
    ///
    /// By default, this is 256.
    pub packet_buffer_len: usize,
    /// Number of slots in each reliable channel's resend timing and
    /// packet-to-message rings.
    ///
    /// This is also the largest number of reliable messages per channel which
    /// may be in flight at once. Messages past this window stay queued until
    /// older ones are acknowledged.
    ///
    /// By default, this is 1024.
    pub message_buffer_len: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: tether_io::IP_MTU,
            max_message_bytes: 768,
            max_messages_per_packet: 256,
            resend_interval: Duration::from_millis(100),
            rtt_alpha: 0.125,
            bandwidth_window: Duration::from_secs(1),
            packet_buffer_len: 256,
            message_buffer_len: 1024,
        }
    }
}

/// [`EndpointConfig`] describes an endpoint which cannot work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum InvalidConfig {
    /// [`EndpointConfig::max_message_bytes`] cannot be represented by the
    /// 10-bit length prefix.
    #[display("max message length {len} is above the encodable maximum {MAX_LEN}")]
    MessageTooLong {
        /// Configured maximum message length.
        len: usize,
    },
    /// A packet cannot hold the header and one maximum-length reliable message.
    #[display("packet length {packet_bytes} cannot fit a {message_bytes} byte message")]
    PacketTooSmall {
        /// Configured maximum packet length.
        packet_bytes: usize,
        /// Configured maximum message length.
        message_bytes: usize,
    },
    /// One of the counts or ring sizes is zero.
    #[display("`{field}` must be greater than 0")]
    Zero {
        /// Name of the offending field.
        field: &'static str,
    },
    /// One of the ring sizes does not fit into a sequence number.
    #[display("`{field}` must fit into a u32")]
    BufferTooLarge {
        /// Name of the offending field.
        field: &'static str,
    },
    /// [`EndpointConfig::rtt_alpha`] is not in `(0, 1]`.
    #[display("RTT smoothing factor must be in (0, 1]")]
    RttAlpha,
}

impl EndpointConfig {
    /// Sets [`EndpointConfig::max_packet_bytes`] on this value.
    #[must_use]
    pub const fn with_max_packet_bytes(mut self, max_packet_bytes: usize) -> Self {
        self.max_packet_bytes = max_packet_bytes;
        self
    }

    /// Sets [`EndpointConfig::max_message_bytes`] on this value.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    /// Sets [`EndpointConfig::max_messages_per_packet`] on this value.
    #[must_use]
    pub const fn with_max_messages_per_packet(mut self, max_messages_per_packet: usize) -> Self {
        self.max_messages_per_packet = max_messages_per_packet;
        self
    }

    /// Sets [`EndpointConfig::resend_interval`] on this value.
    #[must_use]
    pub const fn with_resend_interval(mut self, resend_interval: Duration) -> Self {
        self.resend_interval = resend_interval;
        self
    }

    /// Sets [`EndpointConfig::rtt_alpha`] on this value.
    #[must_use]
    pub const fn with_rtt_alpha(mut self, rtt_alpha: f64) -> Self {
        self.rtt_alpha = rtt_alpha;
        self
    }

    /// Sets [`EndpointConfig::bandwidth_window`] on this value.
    #[must_use]
    pub const fn with_bandwidth_window(mut self, bandwidth_window: Duration) -> Self {
        self.bandwidth_window = bandwidth_window;
        self
    }

    /// Sets [`EndpointConfig::packet_buffer_len`] on this value.
    #[must_use]
    pub const fn with_packet_buffer_len(mut self, packet_buffer_len: usize) -> Self {
        self.packet_buffer_len = packet_buffer_len;
        self
    }

    /// Sets [`EndpointConfig::message_buffer_len`] on this value.
    #[must_use]
    pub const fn with_message_buffer_len(mut self, message_buffer_len: usize) -> Self {
        self.message_buffer_len = message_buffer_len;
        self
    }

    /// Maximum length of a single packet, in bits.
    #[must_use]
    pub const fn max_packet_bits(&self) -> usize {
        self.max_packet_bytes.saturating_mul(8)
    }

    /// Checks that an endpoint using this configuration can send messages of
    /// the configured maximum length.
    ///
    /// # Errors
    ///
    /// Errors if any value is out of range. See [`InvalidConfig`].
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_transport::config::{EndpointConfig, InvalidConfig};
    ///
    /// EndpointConfig::default().validate().unwrap();
    ///
    /// let config = EndpointConfig::default().with_max_message_bytes(1024);
    /// assert!(matches!(
    ///     config.validate(),
    ///     Err(InvalidConfig::MessageTooLong { len: 1024 })
    /// ));
    /// ```
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        for (field, value) in [
            ("max_packet_bytes", self.max_packet_bytes),
            ("max_messages_per_packet", self.max_messages_per_packet),
            ("packet_buffer_len", self.packet_buffer_len),
            ("message_buffer_len", self.message_buffer_len),
        ] {
            if value == 0 {
                return Err(InvalidConfig::Zero { field });
            }
        }

        if self.max_message_bytes > MAX_LEN {
            return Err(InvalidConfig::MessageTooLong {
                len: self.max_message_bytes,
            });
        }

        let required = HEADER_BITS + COUNT_BITS + LEN_BITS + MESSAGE_ID_BITS + self.max_message_bytes * 8;
        if self.max_packet_bits() < required {
            return Err(InvalidConfig::PacketTooSmall {
                packet_bytes: self.max_packet_bytes,
                message_bytes: self.max_message_bytes,
            });
        }

        if !(self.rtt_alpha > 0.0 && self.rtt_alpha <= 1.0) {
            return Err(InvalidConfig::RttAlpha);
        }

        for (field, len) in [
            ("packet_buffer_len", self.packet_buffer_len),
            ("message_buffer_len", self.message_buffer_len),
        ] {
            if u32::try_from(len).is_err() {
                return Err(InvalidConfig::BufferTooLarge { field });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn defaults() {
        let config = EndpointConfig::default();
        assert_eq!(1024, config.max_packet_bytes);
        assert_eq!(8192, config.max_packet_bits());
        assert_eq!(768, config.max_message_bytes);
        assert_eq!(256, config.max_messages_per_packet);
        assert_eq!(Duration::from_millis(100), config.resend_interval);
        assert!((config.rtt_alpha - 0.125).abs() < f64::EPSILON);
        assert_eq!(Duration::from_millis(1000), config.bandwidth_window);
        assert_eq!(256, config.packet_buffer_len);
        assert_eq!(1024, config.message_buffer_len);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero() {
        assert_matches!(
            EndpointConfig::default().with_packet_buffer_len(0).validate(),
            Err(InvalidConfig::Zero { field: "packet_buffer_len" })
        );
        assert_matches!(
            EndpointConfig::default()
                .with_max_messages_per_packet(0)
                .validate(),
            Err(InvalidConfig::Zero { .. })
        );
    }

    #[test]
    fn packet_must_fit_one_message() {
        // 96 + 8 + 10 + 32 + 768 * 8 = 6290 bits = 786.25 bytes
        assert_matches!(
            EndpointConfig::default().with_max_packet_bytes(786).validate(),
            Err(InvalidConfig::PacketTooSmall { .. })
        );
        EndpointConfig::default()
            .with_max_packet_bytes(787)
            .validate()
            .unwrap();
    }

    #[test]
    fn rtt_alpha_range() {
        for alpha in [0.0, -0.5, 1.5, f64::NAN] {
            assert_matches!(
                EndpointConfig::default().with_rtt_alpha(alpha).validate(),
                Err(InvalidConfig::RttAlpha)
            );
        }
        EndpointConfig::default()
            .with_rtt_alpha(1.0)
            .validate()
            .unwrap();
    }
}
