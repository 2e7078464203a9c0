use {
    super::Endpoint,
    crate::{
        bits::{BitStream, BitsError},
        channel::{Channel, RecvMessage},
        packet::PacketHeader,
    },
    alloc::vec::Vec,
    core::num::Saturating,
    derive_more::{Display, Error},
    log::{debug, trace},
    web_time::Instant,
};

/// Failed to read a packet with [`Endpoint::read_packet`].
///
/// Packets come from an untrusted peer, so this should be treated as "drop
/// this packet" and never as a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum RecvError {
    /// The packet ended before all of its contents could be read.
    #[display("malformed packet")]
    Decode(BitsError),
    /// The packet used [`u32::MAX`] as its sequence number, which is never
    /// written by a well-behaved peer.
    #[display("packet sequence {seq} is reserved")]
    ReservedSeq {
        /// Sequence number read from the header.
        seq: u32,
    },
}

impl From<BitsError> for RecvError {
    fn from(value: BitsError) -> Self {
        Self::Decode(value)
    }
}

#[derive(Debug)]
struct DecodedPacket {
    header: PacketHeader,
    msgs: Vec<Vec<RecvMessage>>,
}

impl Endpoint {
    /// Reads a packet from `src`, starting at its current offset.
    ///
    /// The whole packet is decoded before any of it is applied. Then this:
    /// - records the packet's sequence as received
    /// - marks our packets which the peer acknowledges, sampling the RTT if
    ///   the newest acknowledged packet was not acknowledged before
    /// - frees reliable messages carried by newly acknowledged packets
    /// - hands every decoded message to its channel
    ///
    /// Use [`Endpoint::recv_messages`] afterwards to drain what is ready to
    /// be delivered.
    ///
    /// Acknowledgements are sticky: once a packet is acked, a later header
    /// with its bit unset does not un-ack it.
    ///
    /// # Errors
    ///
    /// Errors if the packet is truncated or otherwise malformed. In this case
    /// the cursor is moved back to where it started, and the only change to
    /// the endpoint is [`EndpointStats::packets_dropped`] being incremented.
    ///
    /// [`EndpointStats::packets_dropped`]: crate::stats::EndpointStats::packets_dropped
    pub fn read_packet<B: AsRef<[u8]>>(
        &mut self,
        now: Instant,
        src: &mut BitStream<B>,
    ) -> Result<(), RecvError> {
        let start = src.offset();
        let packet = match self.decode_packet(src) {
            Ok(packet) => packet,
            Err(err) => {
                src.set_offset(start);
                self.stats.packets_dropped += Saturating(1);
                debug!("Dropped malformed packet from {}: {err}", self.remote);
                return Err(err);
            }
        };

        let bytes = (src.offset() - start).div_ceil(8);
        self.apply_packet(now, packet, bytes);
        Ok(())
    }

    /// Reads a datagram which arrived from the peer.
    ///
    /// Bytes after the end of the packet are ignored.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::read_packet`].
    pub fn on_datagram_received(&mut self, now: Instant, bytes: &[u8]) -> Result<(), RecvError> {
        self.read_packet(now, &mut BitStream::new(bytes))
    }

    fn decode_packet<B: AsRef<[u8]>>(
        &self,
        src: &mut BitStream<B>,
    ) -> Result<DecodedPacket, RecvError> {
        let header = PacketHeader::decode(src)?;
        if header.seq == u32::MAX {
            return Err(RecvError::ReservedSeq { seq: header.seq });
        }

        let msgs = self
            .channels
            .iter()
            .map(|channel| {
                let count = src.read_u8()?;
                (0..count)
                    .map(|_| RecvMessage::decode(channel.kind(), src))
                    .collect::<Result<Vec<_>, BitsError>>()
            })
            .collect::<Result<Vec<_>, BitsError>>()?;
        Ok(DecodedPacket { header, msgs })
    }

    fn apply_packet(&mut self, now: Instant, packet: DecodedPacket, bytes: usize) {
        let DecodedPacket { header, msgs } = packet;
        let seq = header.seq;

        self.stats.packets_recv += Saturating(1);
        self.stats.bytes_recv += Saturating(bytes);
        self.recv_bw.record(now, bytes);
        self.record_received(seq);

        for (i, acked_seq, acked) in header.acks.entries() {
            if !acked || self.sent.get(acked_seq) != Some(&false) {
                continue;
            }
            self.sent.insert(acked_seq, true);
            self.stats.packets_acked += Saturating(1);

            if i == 0 {
                if let Some(Some(sent_at)) = self.last_sent.get(acked_seq) {
                    let sample = now.saturating_duration_since(*sent_at);
                    self.rtt.update(sample);
                    trace!("RTT sample from packet {acked_seq}: {sample:?}");
                }
            }

            for channel in &mut self.channels {
                if let Channel::ReliableOrdered(channel) = channel {
                    let msgs_acked = channel.on_packet_acked(acked_seq);
                    self.stats.msgs_acked += Saturating(msgs_acked);
                }
            }
        }

        let mut total = 0;
        for (channel, msgs) in self.channels.iter_mut().zip(msgs) {
            total += msgs.len();
            for msg in msgs {
                channel.recv(msg);
            }
        }
        self.stats.msgs_recv += Saturating(total);

        trace!(
            "Read packet {seq} from {} with {total} messages, {bytes} bytes, acking {:?}",
            self.remote, header.acks
        );
    }

    fn record_received(&mut self, seq: u32) {
        let cap = u32::try_from(self.recvd.capacity()).unwrap_or(u32::MAX);
        match self.newest_recv_seq {
            // would evict a newer entry sharing the same slot
            Some(newest) if newest > seq && newest - seq >= cap => {
                trace!("Packet {seq} is too old to be acknowledged, newest is {newest}");
            }
            Some(newest) => {
                self.recvd.insert(seq, true);
                self.newest_recv_seq = Some(newest.max(seq));
            }
            None => {
                self.recvd.insert(seq, true);
                self.newest_recv_seq = Some(seq);
            }
        }
    }
}
