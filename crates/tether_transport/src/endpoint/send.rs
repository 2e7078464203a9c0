use {
    super::Endpoint,
    crate::{
        bits::{BitStream, BitsError},
        channel::{Channel, PacketBudget},
        packet::{Acknowledge, COUNT_BITS, HEADER_BITS, PacketHeader},
    },
    alloc::vec,
    core::num::Saturating,
    derive_more::{Display, Error, From},
    log::{trace, warn},
    tether_io::DatagramSink,
    web_time::Instant,
};

/// Failed to write a packet with [`Endpoint::write_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error, From)]
pub enum WriteError {
    /// The packet buffer is too small to hold the header and message counts.
    #[display("failed to encode packet")]
    Encode(BitsError),
    /// Every packet sequence number has been used.
    ///
    /// [`u32::MAX`] is never used as a sequence number, so an endpoint can
    /// write at most `u32::MAX` packets over its lifetime.
    #[display("packet sequence numbers exhausted")]
    #[from(ignore)]
    SeqExhausted,
}

/// Failed to send packets with [`Endpoint::transmit_packets`].
#[derive(Debug, Display)]
pub enum TransmitError {
    /// Failed to write a packet into the packet buffer.
    #[display("failed to write packet")]
    Write(WriteError),
    /// The datagram sink rejected a packet.
    #[display("failed to send packet")]
    Send(anyhow::Error),
}

impl core::error::Error for TransmitError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Write(err) => Some(err),
            Self::Send(err) => Some(err.as_ref()),
        }
    }
}

impl From<WriteError> for TransmitError {
    fn from(value: WriteError) -> Self {
        Self::Write(value)
    }
}

impl Endpoint {
    fn overhead_bits(&self) -> usize {
        HEADER_BITS + COUNT_BITS * self.channels.len()
    }

    fn message_bits(&self) -> usize {
        self.config.max_packet_bits().saturating_sub(self.overhead_bits())
    }

    /// Gets whether any channel has a message which is due to be sent and
    /// would fit into an empty packet.
    ///
    /// Unreliable messages are always due. Reliable messages are due if they
    /// have never been sent, or were last sent at least
    /// [`EndpointConfig::resend_interval`] before `now`.
    ///
    /// [`EndpointConfig::resend_interval`]: crate::config::EndpointConfig::resend_interval
    #[must_use]
    pub fn has_available_data(&self, now: Instant) -> bool {
        let bits = self.message_bits();
        self.channels
            .iter()
            .any(|channel| channel.has_available_data(now, self.config.resend_interval, bits))
    }

    /// Writes the next packet into `dst`, starting at its current offset.
    ///
    /// This always writes a header, acknowledging the peer's packets, and a
    /// message count for every channel. Then as many due messages as fit are
    /// packed in, channel by channel in index order. Unreliable messages are
    /// removed from their send buffer as soon as they are written, while
    /// reliable messages stay buffered until the peer acknowledges them.
    ///
    /// The packet takes up at most [`EndpointConfig::max_packet_bytes`]. After
    /// this returns, [`BitStream::filled`] gives the bytes to send if the
    /// stream started at offset 0.
    ///
    /// Returns `true` if at least one message was written. A packet with no
    /// messages is still valid to send, since it carries acknowledgements.
    ///
    /// # Errors
    ///
    /// Errors if `dst` does not have room for the header and channel counts,
    /// or if the endpoint has used up every packet sequence number. Nothing is
    /// written and the endpoint is unchanged in either case.
    ///
    /// [`EndpointConfig::max_packet_bytes`]: crate::config::EndpointConfig::max_packet_bytes
    pub fn write_packet<B: AsMut<[u8]> + AsRef<[u8]>>(
        &mut self,
        now: Instant,
        dst: &mut BitStream<B>,
    ) -> Result<bool, WriteError> {
        let seq = self.next_packet_seq;
        if seq == u32::MAX {
            return Err(WriteError::SeqExhausted);
        }

        let overhead = self.overhead_bits();
        let start = dst.offset();
        let remaining = dst.remaining_bits();
        if remaining < overhead {
            return Err(WriteError::Encode(BitsError::BufferOverrun {
                end: start.saturating_add(overhead),
                len: dst.len_bits(),
            }));
        }

        let header = PacketHeader {
            seq,
            acks: Acknowledge::from_received(self.newest_recv_seq, &self.recvd),
        };
        header.encode(dst)?;
        self.sent.insert(seq, false);

        let mut budget = PacketBudget {
            bits: self.message_bits().min(remaining - overhead),
            messages: self.config.max_messages_per_packet,
        };
        let mut total = 0;
        for channel in &mut self.channels {
            let count_offset = dst.offset();
            dst.write_u8(0)?;

            let count = match channel {
                Channel::Unreliable(channel) => channel.write(&mut budget, dst)?,
                Channel::ReliableOrdered(channel) => channel.write(
                    seq,
                    now,
                    self.config.resend_interval,
                    &mut budget,
                    dst,
                )?,
            };

            let end = dst.offset();
            dst.set_offset(count_offset);
            // a channel writes at most `u8::MAX` messages
            dst.write_u8(u8::try_from(count).unwrap_or(u8::MAX))?;
            dst.set_offset(end);
            total += count;
        }

        self.last_sent.insert(seq, Some(now));
        self.next_packet_seq = seq + 1;

        let bytes = (dst.offset() - start).div_ceil(8);
        self.send_bw.record(now, bytes);
        self.stats.packets_sent += Saturating(1);
        self.stats.bytes_sent += Saturating(bytes);
        self.stats.msgs_sent += Saturating(total);
        trace!(
            "Wrote packet {seq} to {} with {total} messages, {bytes} bytes, acking {:?}",
            self.remote, header.acks
        );
        Ok(total > 0)
    }

    /// Writes and sends packets to the peer for as long as there are messages
    /// due to be sent which fit into a packet.
    ///
    /// This should be called periodically, since reliable messages only become
    /// due for resending after some time has passed.
    ///
    /// Returns how many packets were sent.
    ///
    /// # Errors
    ///
    /// Errors if the sink fails to send a packet. Packets written before the
    /// failure were already sent, and messages in the failed packet are
    /// treated as lost.
    pub fn transmit_packets(
        &mut self,
        now: Instant,
        mut sink: impl DatagramSink,
    ) -> Result<usize, TransmitError> {
        let mut buf = vec![0u8; self.config.max_packet_bytes];
        let mut sent = 0;
        while self.has_available_data(now) {
            buf.fill(0);
            let mut dst = BitStream::new(buf.as_mut_slice());
            let wrote_messages = self.write_packet(now, &mut dst)?;
            let len = dst.byte_len();

            if let Err(err) = sink.send_datagram(&buf[..len], self.remote) {
                warn!("Failed to send packet to {}: {err:#}", self.remote);
                return Err(TransmitError::Send(err));
            }
            sent += 1;

            if !wrote_messages {
                break;
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{channel::ChannelKind, config::EndpointConfig},
        assert_matches::assert_matches,
        bytes::Bytes,
        core::net::SocketAddr,
        tether_io::DatagramQueue,
    };

    fn endpoint() -> Endpoint {
        Endpoint::new("127.0.0.1:25565".parse().unwrap(), EndpointConfig::default()).unwrap()
    }

    #[test]
    fn empty_packet_is_header_and_counts() {
        let mut endpoint = endpoint();
        endpoint.add_channel(ChannelKind::Unreliable);
        endpoint.add_channel(ChannelKind::ReliableOrdered);

        let now = Instant::now();
        assert!(!endpoint.has_available_data(now));

        let mut dst = BitStream::new(vec![0u8; 1024]);
        assert!(!endpoint.write_packet(now, &mut dst).unwrap());
        assert_eq!(HEADER_BITS + 2 * COUNT_BITS, dst.offset());
        assert_eq!(14, dst.byte_len());
        assert_eq!(1, endpoint.next_packet_seq());
        assert_eq!(Some(false), endpoint.is_packet_acked(0));
    }

    #[test]
    fn too_small_buffer_changes_nothing() {
        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::Unreliable);
        endpoint.send_message(channel, Bytes::from_static(b"x")).unwrap();

        let mut dst = BitStream::new([0u8; 12]);
        assert_matches!(
            endpoint.write_packet(Instant::now(), &mut dst),
            Err(WriteError::Encode(BitsError::BufferOverrun { end: 104, len: 96 }))
        );
        assert_eq!(0, dst.offset());
        assert_eq!(0, endpoint.next_packet_seq());
        assert_eq!(1, endpoint.queued_messages(channel).unwrap());
    }

    #[test]
    fn sequence_exhaustion_is_an_error() {
        let mut endpoint = endpoint();
        endpoint.add_channel(ChannelKind::Unreliable);
        endpoint.next_packet_seq = u32::MAX - 1;

        let now = Instant::now();
        let mut dst = BitStream::new(vec![0u8; 1024]);
        endpoint.write_packet(now, &mut dst).unwrap();
        assert_eq!(u32::MAX, endpoint.next_packet_seq());

        dst.reset();
        assert_matches!(
            endpoint.write_packet(now, &mut dst),
            Err(WriteError::SeqExhausted)
        );
        assert_eq!(0, dst.offset());
        assert_eq!(1, endpoint.stats().packets_sent.0);
    }

    #[test]
    fn small_buffer_limits_budget() {
        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::Unreliable);
        endpoint.send_message(channel, Bytes::from(vec![1; 100])).unwrap();
        endpoint.send_message(channel, Bytes::from(vec![2; 4])).unwrap();

        // header + count + one 4 byte message
        let mut dst = BitStream::new([0u8; 19]);
        assert!(endpoint.write_packet(Instant::now(), &mut dst).unwrap());
        assert_eq!(1, endpoint.queued_messages(channel).unwrap());
    }

    #[test]
    fn transmit_stops_when_drained() {
        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::Unreliable);
        for _ in 0..5 {
            endpoint.send_message(channel, Bytes::from(vec![7; 700])).unwrap();
        }

        let now = Instant::now();
        let mut queue = DatagramQueue::default();
        // one 700 byte message per packet
        assert_eq!(5, endpoint.transmit_packets(now, &mut queue).unwrap());
        assert_eq!(5, queue.len());
        assert!(queue.iter().all(|d| d.to == endpoint.remote()));
        assert!(queue.iter().all(|d| d.payload.len() <= 1024));
        assert_eq!(0, endpoint.queued_messages(channel).unwrap());
        assert_eq!(queue.stats().bytes_sent.0, endpoint.stats().bytes_sent.0);

        // nothing left to send
        assert_eq!(0, endpoint.transmit_packets(now, &mut queue).unwrap());
    }

    #[test]
    fn sink_failure_is_reported() {
        struct Broken;

        impl DatagramSink for Broken {
            fn send_datagram(&mut self, _: &[u8], _: SocketAddr) -> anyhow::Result<()> {
                anyhow::bail!("socket closed")
            }
        }

        let mut endpoint = endpoint();
        let channel = endpoint.add_channel(ChannelKind::Unreliable);
        endpoint.send_message(channel, Bytes::new()).unwrap();
        assert_matches!(
            endpoint.transmit_packets(Instant::now(), Broken),
            Err(TransmitError::Send(_))
        );
    }
}
