#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

mod datagram;

pub use {
    self::datagram::*,
    anyhow, bytes,
};

/// Safe estimate for the largest datagram which can be sent over the internet
/// without being fragmented by the IP layer.
///
/// Technically, a network path may have an MTU lower than this value. However,
/// this is unlikely, and should probably be treated as a path that cannot be
/// used.
pub const IP_MTU: usize = 1024;
