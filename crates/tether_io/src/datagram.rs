//! Sending and receiving unreliable datagrams to and from a remote address.

use {
    bytes::Bytes,
    core::{net::SocketAddr, num::Saturating},
    derive_more::{Add, AddAssign, Deref, DerefMut, Sub, SubAssign},
    log::trace,
    std::{io, net::UdpSocket},
    web_time::Instant,
};

/// Outgoing half of an unreliable datagram transport.
///
/// The protocol layer only ever needs to hand a finished datagram to the IO
/// layer and forget about it. Whether the datagram actually arrives is not the
/// IO layer's concern - loss, duplication and reordering are all expected.
///
/// # Errors
///
/// Implementations return an error if the datagram could not be handed to the
/// underlying transport at all (e.g. the socket is closed). A datagram which
/// was accepted but later lost is *not* an error.
pub trait DatagramSink {
    /// Sends `payload` as a single datagram to `to`.
    ///
    /// # Errors
    ///
    /// See [`DatagramSink`].
    fn send_datagram(&mut self, payload: &[u8], to: SocketAddr) -> anyhow::Result<()>;
}

impl<T: DatagramSink + ?Sized> DatagramSink for &mut T {
    fn send_datagram(&mut self, payload: &[u8], to: SocketAddr) -> anyhow::Result<()> {
        T::send_datagram(self, payload, to)
    }
}

impl DatagramSink for UdpSocket {
    fn send_datagram(&mut self, payload: &[u8], to: SocketAddr) -> anyhow::Result<()> {
        let sent = self.send_to(payload, to)?;
        if sent != payload.len() {
            anyhow::bail!("only sent {sent} / {} bytes to {to}", payload.len());
        }
        Ok(())
    }
}

/// Incoming datagram pushed up from the IO layer.
#[derive(Debug, Clone)]
pub struct RecvDatagram {
    /// Address which sent this datagram.
    pub from: SocketAddr,
    /// Earliest instant at which we identified this datagram.
    pub recv_at: Instant,
    /// Raw byte data of this datagram.
    pub payload: Bytes,
}

impl RecvDatagram {
    /// Attempts to receive a single datagram from a non-blocking socket.
    ///
    /// `buf` is used as scratch space and must be at least as long as the
    /// largest datagram you expect to receive; anything longer is truncated by
    /// the operating system.
    ///
    /// Returns `Ok(None)` if no datagram is currently available.
    ///
    /// # Errors
    ///
    /// Errors if the socket reports any error other than
    /// [`io::ErrorKind::WouldBlock`].
    pub fn recv_from(socket: &UdpSocket, now: Instant, buf: &mut [u8]) -> io::Result<Option<Self>> {
        match socket.recv_from(buf) {
            Ok((len, from)) => {
                trace!("Received {len} byte datagram from {from}");
                Ok(Some(Self {
                    from,
                    recv_at: now,
                    payload: Bytes::copy_from_slice(&buf[..len]),
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Datagram which was handed to a [`DatagramQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    /// Address the datagram was addressed to.
    pub to: SocketAddr,
    /// Raw byte data of this datagram.
    pub payload: Bytes,
}

/// In-memory [`DatagramSink`] which buffers every datagram sent into it.
///
/// This is useful for driving two endpoints against each other in the same
/// process, or for inspecting exactly what an endpoint put on the wire.
///
/// # Examples
///
/// ```
/// use tether_io::{DatagramQueue, DatagramSink};
///
/// let mut queue = DatagramQueue::default();
/// let to = "127.0.0.1:5000".parse().unwrap();
/// queue.send_datagram(b"hello", to).unwrap();
///
/// assert_eq!(1, queue.len());
/// assert_eq!(to, queue[0].to);
/// assert_eq!(&b"hello"[..], &queue[0].payload[..]);
/// assert_eq!(5, queue.stats().bytes_sent.0);
/// ```
#[derive(Debug, Clone, Default, Deref, DerefMut)]
pub struct DatagramQueue {
    #[deref]
    #[deref_mut]
    datagrams: Vec<SentDatagram>,
    stats: IoStats,
}

impl DatagramQueue {
    /// Gets the statistics of everything sent through this queue so far.
    #[must_use]
    pub const fn stats(&self) -> IoStats {
        self.stats
    }

    /// Removes and returns all buffered datagrams, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = SentDatagram> + '_ {
        self.datagrams.drain(..)
    }
}

impl DatagramSink for DatagramQueue {
    fn send_datagram(&mut self, payload: &[u8], to: SocketAddr) -> anyhow::Result<()> {
        self.stats.datagrams_sent += Saturating(1);
        self.stats.bytes_sent += Saturating(payload.len());
        self.datagrams.push(SentDatagram {
            to,
            payload: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }
}

/// Statistics for datagrams sent through a [`DatagramQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)] // force `#[derive]` on multiple lines
#[derive(Add, AddAssign, Sub, SubAssign)]
pub struct IoStats {
    /// Number of datagrams handed to the queue.
    pub datagrams_sent: Saturating<usize>,
    /// Sum of the byte lengths of datagrams handed to the queue.
    pub bytes_sent: Saturating<usize>,
}
