//! Logical message streams multiplexed over a single [`Endpoint`].
//!
//! Channels are identified by their position in the endpoint's channel list.
//! Both peers must add the same kinds of channels in the same order, since
//! channel layout is not negotiated on the wire.
//!
//! [`Endpoint`]: crate::endpoint::Endpoint

use {
    crate::{
        bits::{BitStream, BitsError},
        packet::{LEN_BITS, MAX_CHANNEL_MESSAGES, MESSAGE_ID_BITS},
        seq_buf::SeqBuf,
    },
    alloc::{collections::BTreeMap, vec::Vec},
    bytes::Bytes,
    core::time::Duration,
    derive_more::Display,
    web_time::Instant,
};

/// Delivery guarantees of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum ChannelKind {
    /// Messages are written into at most one packet and never resent.
    ///
    /// Messages may be lost, duplicated, or delivered out of order.
    Unreliable,
    /// Messages are resent until acknowledged, and delivered to the receiver
    /// exactly once, in the order they were sent.
    ReliableOrdered,
}

/// Position of a channel in an endpoint's channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[display("channel #{_0}")]
pub struct ChannelIndex(usize);

impl ChannelIndex {
    /// Creates an index from a raw position.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Gets the raw position of this index.
    #[must_use]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

/// ID assigned to a message when it is queued for sending.
///
/// IDs are assigned per channel, starting at 0 and increasing by 1 for each
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageId(pub u32);

/// Space left in the packet currently being written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PacketBudget {
    pub bits: usize,
    pub messages: usize,
}

impl PacketBudget {
    fn take(&mut self, bits: usize) {
        self.bits -= bits;
        self.messages -= 1;
    }
}

/// Bits taken up by an unreliable message carrying `len` payload bytes.
#[must_use]
pub const fn unreliable_message_bits(len: usize) -> usize {
    LEN_BITS + len * 8
}

/// Bits taken up by a reliable message carrying `len` payload bytes.
#[must_use]
pub const fn reliable_message_bits(len: usize) -> usize {
    LEN_BITS + MESSAGE_ID_BITS + len * 8
}

fn write_len<B: AsMut<[u8]>>(dst: &mut BitStream<B>, len: usize) -> Result<(), BitsError> {
    #[expect(clippy::cast_possible_truncation, reason = "lengths are validated on send")]
    dst.write_uint(len as u32, LEN_BITS as u32)
}

/// Message decoded from a packet, before it is handed to its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecvMessage {
    Unreliable { payload: Bytes },
    Reliable { id: u32, payload: Bytes },
}

impl RecvMessage {
    pub fn decode<B: AsRef<[u8]>>(
        kind: ChannelKind,
        src: &mut BitStream<B>,
    ) -> Result<Self, BitsError> {
        #[expect(clippy::cast_possible_truncation, reason = "`LEN_BITS` is 10")]
        let len = src.read_uint(LEN_BITS as u32)? as usize;
        Ok(match kind {
            ChannelKind::Unreliable => Self::Unreliable {
                payload: src.read_bytes(len)?,
            },
            ChannelKind::ReliableOrdered => {
                let id = src.read_u32()?;
                Self::Reliable {
                    id,
                    payload: src.read_bytes(len)?,
                }
            }
        })
    }

    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        match self {
            Self::Unreliable { .. } => ChannelKind::Unreliable,
            Self::Reliable { .. } => ChannelKind::ReliableOrdered,
        }
    }
}

/// State of a single channel.
#[derive(Debug, Clone)]
pub enum Channel {
    /// See [`ChannelKind::Unreliable`].
    Unreliable(UnreliableChannel),
    /// See [`ChannelKind::ReliableOrdered`].
    ReliableOrdered(ReliableChannel),
}

impl Channel {
    pub(crate) fn new(kind: ChannelKind, message_buffer_len: usize) -> Self {
        match kind {
            ChannelKind::Unreliable => Self::Unreliable(UnreliableChannel::default()),
            ChannelKind::ReliableOrdered => {
                Self::ReliableOrdered(ReliableChannel::new(message_buffer_len))
            }
        }
    }

    /// Gets what kind of channel this is.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        match self {
            Self::Unreliable(_) => ChannelKind::Unreliable,
            Self::ReliableOrdered(_) => ChannelKind::ReliableOrdered,
        }
    }

    /// Gets how many messages are waiting in the send buffer.
    ///
    /// For a reliable channel, this includes messages which were sent but not
    /// yet acknowledged.
    #[must_use]
    pub fn queued_messages(&self) -> usize {
        match self {
            Self::Unreliable(channel) => channel.send_buf.len(),
            Self::ReliableOrdered(channel) => channel.send_buf.len(),
        }
    }

    pub(crate) fn push(&mut self, payload: Bytes) -> u32 {
        match self {
            Self::Unreliable(channel) => channel.push(payload),
            Self::ReliableOrdered(channel) => channel.push(payload),
        }
    }

    pub(crate) fn has_available_data(&self, now: Instant, resend_interval: Duration, bits: usize) -> bool {
        match self {
            Self::Unreliable(channel) => channel.has_available_data(bits),
            Self::ReliableOrdered(channel) => channel.has_available_data(now, resend_interval, bits),
        }
    }

    /// ID which will be assigned to the next queued message.
    #[must_use]
    pub const fn next_id(&self) -> MessageId {
        match self {
            Self::Unreliable(channel) => channel.next_id(),
            Self::ReliableOrdered(channel) => channel.next_id(),
        }
    }

    /// Hands a message to this channel.
    ///
    /// # Panics
    ///
    /// Panics if `msg` was decoded for a different [`ChannelKind`]. Packets
    /// are always decoded using the kind of the channel they are read for.
    pub(crate) fn recv(&mut self, msg: RecvMessage) {
        match (self, msg) {
            (Self::Unreliable(channel), RecvMessage::Unreliable { payload }) => {
                channel.recv_queue.push(payload);
            }
            (Self::ReliableOrdered(channel), RecvMessage::Reliable { id, payload }) => {
                channel.recv(id, payload);
            }
            (channel, msg) => unreachable!(
                "{:?} message handed to {:?} channel",
                msg.kind(),
                channel.kind()
            ),
        }
    }

    pub(crate) fn drain_recv(&mut self) -> Vec<Bytes> {
        match self {
            Self::Unreliable(channel) => core::mem::take(&mut channel.recv_queue),
            Self::ReliableOrdered(channel) => channel.drain_recv(),
        }
    }
}

/// Send and receive state of a [`ChannelKind::Unreliable`] channel.
#[derive(Debug, Clone, Default)]
pub struct UnreliableChannel {
    send_buf: BTreeMap<u32, Bytes>,
    next_id: u32,
    recv_queue: Vec<Bytes>,
}

impl UnreliableChannel {
    /// ID which will be assigned to the next queued message.
    #[must_use]
    pub const fn next_id(&self) -> MessageId {
        MessageId(self.next_id)
    }

    /// Number of received messages waiting to be drained.
    #[must_use]
    pub fn recv_queue_len(&self) -> usize {
        self.recv_queue.len()
    }

    fn push(&mut self, payload: Bytes) -> u32 {
        let id = self.next_id;
        self.send_buf.insert(id, payload);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn has_available_data(&self, bits: usize) -> bool {
        self.send_buf
            .values()
            .any(|msg| unreliable_message_bits(msg.len()) <= bits)
    }

    /// Writes as many queued messages as fit into `budget`, oldest first.
    ///
    /// Written messages are removed from the send buffer immediately.
    pub(crate) fn write<B: AsMut<[u8]>>(
        &mut self,
        budget: &mut PacketBudget,
        dst: &mut BitStream<B>,
    ) -> Result<usize, BitsError> {
        let mut written = Vec::new();
        for (&id, msg) in &self.send_buf {
            if written.len() >= MAX_CHANNEL_MESSAGES || budget.messages == 0 {
                break;
            }
            let bits = unreliable_message_bits(msg.len());
            if bits > budget.bits {
                continue;
            }

            write_len(dst, msg.len())?;
            dst.write_bytes(msg)?;
            budget.take(bits);
            written.push(id);
        }

        for id in &written {
            self.send_buf.remove(id);
        }
        Ok(written.len())
    }
}

/// Send and receive state of a [`ChannelKind::ReliableOrdered`] channel.
///
/// The send window is the range of message IDs from
/// [`ReliableChannel::oldest_unacked`] up to [`ReliableChannel::next_id`].
/// Only the first `message_buffer_len` IDs of that window are ever written
/// into packets, so the resend timing of two in-flight messages never shares
/// a slot.
#[derive(Debug, Clone)]
pub struct ReliableChannel {
    send_buf: BTreeMap<u32, Bytes>,
    next_id: u32,
    oldest_unacked: u32,
    last_sent: SeqBuf<Option<Instant>>,
    packet_messages: SeqBuf<Vec<u32>>,
    // not a ring, so an acked message can always be stored
    recv_buf: BTreeMap<u32, Bytes>,
    next_recv_id: u32,
}

impl ReliableChannel {
    fn new(message_buffer_len: usize) -> Self {
        Self {
            send_buf: BTreeMap::new(),
            next_id: 0,
            oldest_unacked: 0,
            last_sent: SeqBuf::with_capacity(message_buffer_len),
            packet_messages: SeqBuf::with_capacity(message_buffer_len),
            recv_buf: BTreeMap::new(),
            next_recv_id: 0,
        }
    }

    /// ID which will be assigned to the next queued message.
    #[must_use]
    pub const fn next_id(&self) -> MessageId {
        MessageId(self.next_id)
    }

    /// Oldest message ID which has not been acknowledged yet.
    ///
    /// Equal to [`ReliableChannel::next_id`] if every message is acknowledged.
    #[must_use]
    pub const fn oldest_unacked(&self) -> MessageId {
        MessageId(self.oldest_unacked)
    }

    /// ID of the next message to be delivered to the application.
    #[must_use]
    pub const fn next_recv_id(&self) -> MessageId {
        MessageId(self.next_recv_id)
    }

    /// Number of received messages waiting for an earlier message to arrive,
    /// or to be drained.
    #[must_use]
    pub fn buffered_recv(&self) -> usize {
        self.recv_buf.len()
    }

    /// Gets when the message with the given ID was last written into a packet.
    ///
    /// Returns [`None`] if the message has not been sent, or is no longer
    /// tracked.
    #[must_use]
    pub fn last_sent_at(&self, id: MessageId) -> Option<Instant> {
        self.last_sent.get(id.0).copied().flatten()
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&mut self, id: u32) {
        self.next_id = id;
        self.oldest_unacked = id;
        self.next_recv_id = id;
    }

    fn window_end(&self) -> u32 {
        let cap = u32::try_from(self.last_sent.capacity()).unwrap_or(u32::MAX);
        self.next_id.min(self.oldest_unacked.saturating_add(cap))
    }

    fn push(&mut self, payload: Bytes) -> u32 {
        let id = self.next_id;
        self.send_buf.insert(id, payload);
        self.next_id = self.next_id.wrapping_add(1);
        if id < self.window_end() {
            // eligible for the very next packet
            self.last_sent.insert(id, None);
        }
        id
    }

    fn is_resend_due(&self, id: u32, now: Instant, resend_interval: Duration) -> bool {
        match self.last_sent.get(id) {
            Some(Some(sent_at)) => now.saturating_duration_since(*sent_at) >= resend_interval,
            Some(None) | None => true,
        }
    }

    fn window(&self) -> impl Iterator<Item = (u32, &Bytes)> {
        self.send_buf
            .range(self.oldest_unacked..self.window_end())
            .map(|(id, msg)| (*id, msg))
    }

    fn has_available_data(&self, now: Instant, resend_interval: Duration, bits: usize) -> bool {
        self.window().any(|(id, msg)| {
            self.is_resend_due(id, now, resend_interval) && reliable_message_bits(msg.len()) <= bits
        })
    }

    /// Writes as many due messages as fit into `budget`, lowest ID first, and
    /// records which IDs went into packet `seq`.
    ///
    /// Written messages stay in the send buffer until acknowledged.
    pub(crate) fn write<B: AsMut<[u8]>>(
        &mut self,
        seq: u32,
        now: Instant,
        resend_interval: Duration,
        budget: &mut PacketBudget,
        dst: &mut BitStream<B>,
    ) -> Result<usize, BitsError> {
        let mut written = Vec::new();
        for (id, msg) in self.window() {
            if written.len() >= MAX_CHANNEL_MESSAGES || budget.messages == 0 {
                break;
            }
            if !self.is_resend_due(id, now, resend_interval) {
                continue;
            }
            let bits = reliable_message_bits(msg.len());
            if bits > budget.bits {
                continue;
            }

            write_len(dst, msg.len())?;
            dst.write_u32(id)?;
            dst.write_bytes(msg)?;
            budget.take(bits);
            written.push(id);
        }

        for &id in &written {
            self.last_sent.insert(id, Some(now));
        }
        let count = written.len();
        // always overwrite, so a stale list from an older packet is never
        // mistaken for this one
        self.packet_messages.insert(seq, written);
        Ok(count)
    }

    /// Marks every message written into packet `seq` as acknowledged.
    ///
    /// Returns how many messages were newly acknowledged.
    pub(crate) fn on_packet_acked(&mut self, seq: u32) -> usize {
        let mut acked = 0;
        if let Some(ids) = self.packet_messages.get(seq) {
            for id in ids {
                if self.send_buf.remove(id).is_some() {
                    acked += 1;
                }
            }
        }

        while self.oldest_unacked < self.next_id && !self.send_buf.contains_key(&self.oldest_unacked) {
            self.oldest_unacked += 1;
        }
        acked
    }

    fn recv(&mut self, id: u32, payload: Bytes) {
        // already delivered
        if id < self.next_recv_id {
            return;
        }
        self.recv_buf.insert(id, payload);
    }

    fn drain_recv(&mut self) -> Vec<Bytes> {
        let mut msgs = Vec::new();
        while let Some(msg) = self.recv_buf.remove(&self.next_recv_id) {
            msgs.push(msg);
            self.next_recv_id = self.next_recv_id.wrapping_add(1);
        }
        msgs
    }
}
