#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

extern crate alloc;

pub mod bandwidth;
pub mod bits;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod packet;
pub mod rtt;
pub mod seq_buf;
pub mod stats;

pub use {bytes, tether_io as io};
