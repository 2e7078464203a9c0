//! See [`Endpoint`].

mod recv;
mod send;

pub use {recv::*, send::*};
use {
    crate::{
        bandwidth::BandwidthEstimator,
        channel::{Channel, ChannelIndex, ChannelKind, MessageId},
        config::{EndpointConfig, InvalidConfig},
        rtt::RttEstimator,
        seq_buf::SeqBuf,
        stats::EndpointStats,
    },
    alloc::vec::Vec,
    bytes::Bytes,
    core::net::SocketAddr,
    derive_more::{Display, Error},
    log::trace,
    web_time::Instant,
};

/// One side of a connection to a single remote address.
///
/// An endpoint tracks which of its packets the peer has acknowledged, which of
/// the peer's packets it has received, the round-trip time and throughput of
/// the path, and the state of every [`Channel`] multiplexed over it.
///
/// This type performs no I/O and never reads a clock by itself. Every
/// time-dependent operation takes the current time as `now`, and packets are
/// written into and read out of caller-provided buffers. Use
/// [`Endpoint::transmit_packets`] and [`Endpoint::on_datagram_received`] to
/// plug it into a datagram transport.
///
/// # Usage
///
/// - add the same channels, in the same order, on both peers
/// - [`Endpoint::send_message`] to queue messages
/// - poll [`Endpoint::transmit_packets`] periodically, since reliable resends
///   are time-based
/// - pass every datagram from the peer to [`Endpoint::on_datagram_received`]
/// - [`Endpoint::recv_messages`] to drain what has arrived
///
/// Loss, duplication and reordering of datagrams are all handled internally
/// and are never reported as errors.
///
/// Sequence numbers and message IDs never wrap. An endpoint writes at most
/// `u32::MAX` packets, after which [`Endpoint::write_packet`] returns
/// [`WriteError::SeqExhausted`], and each channel assigns at most `u32::MAX`
/// message IDs, after which [`Endpoint::send_message`] returns
/// [`SendError::IdsExhausted`].
///
/// # Examples
///
/// ```
/// use {
///     bytes::Bytes,
///     tether_io::DatagramQueue,
///     tether_transport::{channel::ChannelKind, config::EndpointConfig, endpoint::Endpoint},
///     web_time::Instant,
/// };
///
/// let client_addr = "127.0.0.1:1000".parse().unwrap();
/// let server_addr = "127.0.0.1:2000".parse().unwrap();
/// let mut client = Endpoint::new(server_addr, EndpointConfig::default()).unwrap();
/// let mut server = Endpoint::new(client_addr, EndpointConfig::default()).unwrap();
/// let channel = client.add_channel(ChannelKind::ReliableOrdered);
/// server.add_channel(ChannelKind::ReliableOrdered);
///
/// client.send_message(channel, Bytes::from_static(b"hello")).unwrap();
///
/// let now = Instant::now();
/// let mut wire = DatagramQueue::default();
/// assert_eq!(1, client.transmit_packets(now, &mut wire).unwrap());
/// for datagram in wire.drain() {
///     server.on_datagram_received(now, &datagram.payload).unwrap();
/// }
///
/// assert_eq!(vec![Bytes::from_static(b"hello")], server.recv_messages(channel).unwrap());
/// ```
#[derive(Debug)]
pub struct Endpoint {
    remote: SocketAddr,
    config: EndpointConfig,
    channels: Vec<Channel>,

    // send
    next_packet_seq: u32,
    sent: SeqBuf<bool>,
    last_sent: SeqBuf<Option<Instant>>,
    send_bw: BandwidthEstimator,

    // recv
    recvd: SeqBuf<bool>,
    newest_recv_seq: Option<u32>,
    recv_bw: BandwidthEstimator,

    rtt: RttEstimator,
    stats: EndpointStats,
}

/// Attempted to use a channel which was never added to the [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("invalid {index} - only {len} channels exist")]
pub struct InvalidChannel {
    /// Index which was used.
    pub index: ChannelIndex,
    /// Number of channels on the endpoint.
    pub len: usize,
}

/// Failed to queue a message with [`Endpoint::send_message`].
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, derive_more::From)]
pub enum SendError {
    /// The payload is longer than [`EndpointConfig::max_message_bytes`].
    ///
    /// Messages are never split across packets, so the caller must shorten or
    /// split the message.
    #[display("message too large - {len} / {max} bytes")]
    #[from(ignore)]
    MessageTooLarge {
        /// Length of the payload.
        len: usize,
        /// Configured maximum length.
        max: usize,
    },
    /// See [`InvalidChannel`].
    #[display("{_0}")]
    InvalidChannel(InvalidChannel),
    /// The channel has used up every message ID.
    ///
    /// [`u32::MAX`] is never assigned, so a channel can queue at most
    /// `u32::MAX` messages over its lifetime.
    #[display("{index} has no message IDs left")]
    #[from(ignore)]
    IdsExhausted {
        /// Channel which the message was sent on.
        index: ChannelIndex,
    },
}

impl Endpoint {
    /// Creates an endpoint talking to `remote`, with no channels.
    ///
    /// # Errors
    ///
    /// Errors if the config is invalid. See [`EndpointConfig::validate`].
    pub fn new(remote: SocketAddr, config: EndpointConfig) -> Result<Self, InvalidConfig> {
        config.validate()?;
        Ok(Self {
            remote,
            channels: Vec::new(),

            next_packet_seq: 0,
            sent: SeqBuf::with_capacity(config.packet_buffer_len),
            last_sent: SeqBuf::with_capacity(config.packet_buffer_len),
            send_bw: BandwidthEstimator::new(config.bandwidth_window),

            recvd: SeqBuf::with_capacity(config.packet_buffer_len),
            newest_recv_seq: None,
            recv_bw: BandwidthEstimator::new(config.bandwidth_window),

            rtt: RttEstimator::new(config.rtt_alpha),
            stats: EndpointStats::default(),
            config,
        })
    }

    /// Adds a channel of the given kind, returning its index.
    ///
    /// Channels can't be removed, and the peer must add the same kinds of
    /// channels in the same order.
    pub fn add_channel(&mut self, kind: ChannelKind) -> ChannelIndex {
        let index = ChannelIndex::new(self.channels.len());
        self.channels
            .push(Channel::new(kind, self.config.message_buffer_len));
        index
    }

    /// Address of the peer this endpoint talks to.
    #[must_use]
    pub const fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Configuration this endpoint was created with.
    #[must_use]
    pub const fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// All channels on this endpoint, in index order.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Gets a channel by index.
    ///
    /// # Errors
    ///
    /// Errors if no channel exists at `index`.
    pub fn channel(&self, index: ChannelIndex) -> Result<&Channel, InvalidChannel> {
        self.channels.get(index.into_usize()).ok_or(InvalidChannel {
            index,
            len: self.channels.len(),
        })
    }

    fn channel_mut(&mut self, index: ChannelIndex) -> Result<&mut Channel, InvalidChannel> {
        let len = self.channels.len();
        self.channels
            .get_mut(index.into_usize())
            .ok_or(InvalidChannel { index, len })
    }

    /// Round-trip time estimate for this path.
    #[must_use]
    pub const fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Estimated send speed in bytes per second.
    #[must_use]
    pub const fn send_speed(&self) -> f64 {
        self.send_bw.bytes_per_sec()
    }

    /// Estimated receive speed in bytes per second.
    #[must_use]
    pub const fn recv_speed(&self) -> f64 {
        self.recv_bw.bytes_per_sec()
    }

    /// Running totals of what this endpoint has sent and received.
    #[must_use]
    pub const fn stats(&self) -> EndpointStats {
        self.stats
    }

    /// Sequence number which the next written packet will use.
    #[must_use]
    pub const fn next_packet_seq(&self) -> u32 {
        self.next_packet_seq
    }

    /// Newest packet sequence received from the peer, if any.
    #[must_use]
    pub const fn newest_recv_seq(&self) -> Option<u32> {
        self.newest_recv_seq
    }

    /// Gets whether the peer has acknowledged our packet `seq`.
    ///
    /// Returns [`None`] if the packet was never sent, or is too old to still
    /// be tracked.
    #[must_use]
    pub fn is_packet_acked(&self, seq: u32) -> Option<bool> {
        self.sent.get(seq).copied()
    }

    /// Gets whether we have received the peer's packet `seq`.
    #[must_use]
    pub fn is_packet_received(&self, seq: u32) -> bool {
        self.recvd.get(seq).copied().unwrap_or(false)
    }

    /// Gets how many messages are waiting in a channel's send buffer.
    ///
    /// # Errors
    ///
    /// Errors if no channel exists at `index`.
    pub fn queued_messages(&self, channel: ChannelIndex) -> Result<usize, InvalidChannel> {
        self.channel(channel).map(Channel::queued_messages)
    }

    /// Queues a message to be sent on a channel.
    ///
    /// The message is written into packets by [`Endpoint::write_packet`].
    ///
    /// # Errors
    ///
    /// Errors if the payload is too large, if the channel doesn't exist, or if
    /// the channel has run out of message IDs. The message is not queued in
    /// any of these cases.
    pub fn send_message(
        &mut self,
        channel: ChannelIndex,
        payload: Bytes,
    ) -> Result<MessageId, SendError> {
        let max = self.config.max_message_bytes;
        if payload.len() > max {
            return Err(SendError::MessageTooLarge {
                len: payload.len(),
                max,
            });
        }

        let len = payload.len();
        let target = self.channel_mut(channel)?;
        if target.next_id().0 == u32::MAX {
            return Err(SendError::IdsExhausted { index: channel });
        }
        let id = target.push(payload);
        trace!("Queued {len} byte message {id} on {channel}");
        Ok(MessageId(id))
    }

    /// Drains every message on a channel which is ready to be delivered.
    ///
    /// For an unreliable channel, this is every message received since the
    /// last drain, in arrival order. For a reliable channel, this is every
    /// message following the last delivered one with no gaps. A message which
    /// arrived early stays buffered until all messages before it have also
    /// arrived.
    ///
    /// # Errors
    ///
    /// Errors if the channel doesn't exist.
    pub fn recv_messages(&mut self, channel: ChannelIndex) -> Result<Vec<Bytes>, InvalidChannel> {
        Ok(self.channel_mut(channel)?.drain_recv())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    fn endpoint() -> Endpoint {
        Endpoint::new("127.0.0.1:25565".parse().unwrap(), EndpointConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config() {
        assert_matches!(
            Endpoint::new(
                "127.0.0.1:25565".parse().unwrap(),
                EndpointConfig::default().with_message_buffer_len(0)
            ),
            Err(InvalidConfig::Zero { .. })
        );
    }

    #[test]
    fn channel_indices() {
        let mut endpoint = endpoint();
        let a = endpoint.add_channel(ChannelKind::Unreliable);
        let b = endpoint.add_channel(ChannelKind::ReliableOrdered);
        assert_eq!(0, a.into_usize());
        assert_eq!(1, b.into_usize());
        assert_eq!(ChannelKind::ReliableOrdered, endpoint.channel(b).unwrap().kind());
        assert_eq!(2, endpoint.channels().len());
    }

    #[test]
    fn message_ids_increase() {
        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::ReliableOrdered);
        for i in 0..5 {
            let id = endpoint.send_message(channel, Bytes::new()).unwrap();
            assert_eq!(MessageId(i), id);
        }
        assert_eq!(5, endpoint.queued_messages(channel).unwrap());
    }

    #[test]
    fn message_too_large() {
        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::Unreliable);

        endpoint
            .send_message(channel, Bytes::from(vec![0; 768]))
            .unwrap();
        assert_matches!(
            endpoint.send_message(channel, Bytes::from(vec![0; 769])),
            Err(SendError::MessageTooLarge { len: 769, max: 768 })
        );
        assert_eq!(1, endpoint.queued_messages(channel).unwrap());
    }

    #[test]
    fn message_ids_exhausted() {
        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::ReliableOrdered);
        let Channel::ReliableOrdered(reliable) = &mut endpoint.channels[0] else {
            unreachable!();
        };
        reliable.set_next_id(u32::MAX - 1);

        assert_eq!(
            MessageId(u32::MAX - 1),
            endpoint.send_message(channel, Bytes::new()).unwrap()
        );
        assert_matches!(
            endpoint.send_message(channel, Bytes::new()),
            Err(SendError::IdsExhausted { index }) if index == channel
        );
        assert_eq!(1, endpoint.queued_messages(channel).unwrap());
    }

    #[test]
    fn invalid_channel() {
        let mut endpoint = endpoint();
        let missing = ChannelIndex::new(3);
        assert_matches!(
            endpoint.send_message(missing, Bytes::new()),
            Err(SendError::InvalidChannel(InvalidChannel { len: 0, .. }))
        );
        assert_matches!(endpoint.recv_messages(missing), Err(InvalidChannel { .. }));
        assert_matches!(endpoint.queued_messages(missing), Err(InvalidChannel { .. }));
    }

    #[test]
    fn fresh_state() {
        let endpoint = endpoint();
        assert_eq!(0, endpoint.next_packet_seq());
        assert_eq!(None, endpoint.newest_recv_seq());
        assert_eq!(None, endpoint.is_packet_acked(0));
        assert!(!endpoint.is_packet_received(0));
        assert_eq!(0, endpoint.rtt().samples());
        assert!(endpoint.send_speed().abs() < f64::EPSILON);
    }
}
