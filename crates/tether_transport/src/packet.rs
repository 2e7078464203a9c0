//! Packet header layout and acknowledgement bits.
//!
//! Every packet starts with a fixed 96-bit header:
//!
//! | field      | bits | notes                                               |
//! |------------|------|-----------------------------------------------------|
//! | `seq`      | 32   | sequence number of this packet                      |
//! | `last_recv`| 32   | newest packet sequence the sender has received      |
//! | `bits`     | 32   | bit `i` set iff packet `last_recv - i` was received |
//!
//! followed by, for each channel in index order, an 8-bit message count and
//! that many messages. An unreliable message is a 10-bit length followed by
//! the payload bytes; a reliable message is a 10-bit length, a 32-bit message
//! ID, then the payload bytes.

use {
    crate::{
        bits::{BitStream, BitsError},
        seq_buf::SeqBuf,
    },
    alloc::format,
    core::fmt,
};

/// Length of the packet header in bits.
pub const HEADER_BITS: usize = 32 + 32 + 32;

/// Length of the per-channel message count in bits.
pub const COUNT_BITS: usize = 8;

/// Length of the message length prefix in bits.
pub const LEN_BITS: usize = 10;

/// Length of a reliable message's ID in bits.
pub const MESSAGE_ID_BITS: usize = 32;

/// Largest message length which the length prefix can encode.
pub const MAX_LEN: usize = (1 << LEN_BITS) - 1;

/// Largest number of messages a single channel can write into one packet.
pub const MAX_CHANNEL_MESSAGES: usize = u8::MAX as usize;

/// Acknowledgement of up to 32 recently received packets.
///
/// `last_recv` is the newest packet sequence received, and bit `i` of `bits`
/// is set if packet `last_recv - i` was received. Bits for sequence numbers
/// below 0 are always unset.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Acknowledge {
    /// Newest packet sequence received.
    pub last_recv: u32,
    /// Bitfield of which recent packets were received.
    pub bits: u32,
}

/// Header at the start of every packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct PacketHeader {
    /// Sequence number of this packet.
    pub seq: u32,
    /// Which of the peer's packets we have received.
    pub acks: Acknowledge,
}

impl Acknowledge {
    /// Builds the acknowledgement for the current receive state.
    ///
    /// If nothing has been received yet, `last_recv` is 0 and every bit is
    /// unset.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tether_transport::{packet::Acknowledge, seq_buf::SeqBuf};
    /// let mut recvd = SeqBuf::<bool>::with_capacity(256);
    /// assert_eq!(Acknowledge::default(), Acknowledge::from_received(None, &recvd));
    ///
    /// recvd.insert(0, true);
    /// recvd.insert(2, true);
    /// recvd.insert(3, true);
    /// let acks = Acknowledge::from_received(Some(3), &recvd);
    /// assert_eq!(3, acks.last_recv);
    /// assert_eq!(0b1011, acks.bits);
    /// ```
    #[must_use]
    pub fn from_received(newest_recv: Option<u32>, recvd: &SeqBuf<bool>) -> Self {
        let Some(last_recv) = newest_recv else {
            return Self::default();
        };

        let bits = (0..u32::BITS)
            .filter(|&i| {
                last_recv
                    .checked_sub(i)
                    .and_then(|seq| recvd.get(seq))
                    .copied()
                    .unwrap_or(false)
            })
            .fold(0, |bits, i| bits | shl(1, i));
        Self { last_recv, bits }
    }

    /// Gets if a certain sequence has been marked as received.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tether_transport::packet::Acknowledge;
    /// let acks = Acknowledge {
    ///     last_recv: 50,
    ///     bits: 0b101,
    /// };
    /// assert!(acks.is_acked(50));
    /// assert!(!acks.is_acked(49));
    /// assert!(acks.is_acked(48));
    /// assert!(!acks.is_acked(51));
    /// assert!(!acks.is_acked(10));
    /// ```
    #[must_use]
    pub fn is_acked(&self, seq: u32) -> bool {
        self.last_recv
            .checked_sub(seq)
            .is_some_and(|dist| self.bits & shl(1, dist) != 0)
    }

    /// Iterates over every `(i, seq, acked)` triple this value describes, from
    /// `last_recv` backwards.
    ///
    /// Sequences which would be below 0 are skipped.
    pub fn entries(self) -> impl Iterator<Item = (u32, u32, bool)> {
        (0..u32::BITS).filter_map(move |i| {
            let seq = self.last_recv.checked_sub(i)?;
            Some((i, seq, self.bits & shl(1, i) != 0))
        })
    }

    /// Iterates over all sequences marked as received.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tether_transport::packet::Acknowledge;
    /// let acks = Acknowledge {
    ///     last_recv: 50,
    ///     bits: 0b0010010,
    /// };
    /// let mut iter = acks.seqs();
    /// assert_eq!(Some(49), iter.next());
    /// assert_eq!(Some(46), iter.next());
    /// assert_eq!(None, iter.next());
    /// ```
    pub fn seqs(self) -> impl Iterator<Item = u32> {
        self.entries()
            .filter_map(|(_, seq, acked)| acked.then_some(seq))
    }
}

fn shl(n: u32, by: u32) -> u32 {
    // if None, then `by >= 32`, so all the bits get moved out anyway
    n.checked_shl(by).unwrap_or_default()
}

impl fmt::Debug for Acknowledge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Acknowledge")
            .field("last_recv", &self.last_recv)
            .field("bits", &format!("{:032b}", self.bits))
            .finish()
    }
}

impl PacketHeader {
    /// Writes this header.
    ///
    /// # Errors
    ///
    /// Errors if the stream has fewer than [`HEADER_BITS`] bits left.
    pub fn encode<B: AsMut<[u8]>>(&self, dst: &mut BitStream<B>) -> Result<(), BitsError> {
        dst.write_u32(self.seq)?;
        dst.write_u32(self.acks.last_recv)?;
        // bit `i` lands at offset `i` since values are written LSB first
        dst.write_u32(self.acks.bits)?;
        Ok(())
    }

    /// Reads a header.
    ///
    /// # Errors
    ///
    /// Errors if the stream has fewer than [`HEADER_BITS`] bits left.
    pub fn decode<B: AsRef<[u8]>>(src: &mut BitStream<B>) -> Result<Self, BitsError> {
        Ok(Self {
            seq: src.read_u32()?,
            acks: Acknowledge {
                last_recv: src.read_u32()?,
                bits: src.read_u32()?,
            },
        })
    }
}

#[cfg(test)]
#[expect(
    clippy::unreadable_literal,
    reason = "no separators shows the shift logic more clearly"
)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn shl_in_range() {
        assert_eq!(0b1_0, shl(0b01, 1));
        assert_eq!(0b10100000, shl(0b101, 5));
    }

    #[test]
    fn shl_out_of_range() {
        assert_eq!(0b0, shl(0b10101, 32));
        assert_eq!(0b0, shl(0b11111, 33));
    }

    #[test]
    fn entries_skip_negative() {
        let acks = Acknowledge {
            last_recv: 2,
            bits: u32::MAX,
        };
        let seqs = acks.seqs().collect::<Vec<_>>();
        assert_eq!(vec![2, 1, 0], seqs);
        assert_eq!(3, acks.entries().count());
    }

    #[test]
    fn from_received_window() {
        let mut recvd = SeqBuf::<bool>::with_capacity(256);
        for seq in [0, 5, 40, 71, 72] {
            recvd.insert(seq, true);
        }
        let acks = Acknowledge::from_received(Some(72), &recvd);
        // 0, 5 and 40 are more than 31 behind
        assert_eq!(vec![72, 71], acks.seqs().collect::<Vec<_>>());
        assert_eq!(0b11, acks.bits);

        let acks = Acknowledge::from_received(Some(36), &recvd);
        assert_eq!(vec![5], acks.seqs().collect::<Vec<_>>());
    }

    #[test]
    fn header_bits_layout() {
        let header = PacketHeader {
            seq: 0x0403_0201,
            acks: Acknowledge {
                last_recv: 0x0807_0605,
                bits: 0b1,
            },
        };
        let mut s = BitStream::new([0u8; 12]);
        header.encode(&mut s).unwrap();
        assert_eq!(HEADER_BITS, s.offset());
        assert_eq!(
            [1, 2, 3, 4, 5, 6, 7, 8, 1, 0, 0, 0],
            s.into_inner()
        );

        let mut s = BitStream::new([1, 2, 3, 4, 5, 6, 7, 8, 1, 0, 0, 0]);
        assert_eq!(header, PacketHeader::decode(&mut s).unwrap());
    }

    #[test]
    fn truncated_header() {
        let mut s = BitStream::new([0u8; 11]);
        assert_matches!(PacketHeader::decode(&mut s), Err(BitsError::BufferOverrun { .. }));
    }
}
