//! Reading and writing values at arbitrary bit offsets inside a byte buffer.
//!
//! Values are packed least-significant-bit first: bit `n` of the buffer is bit
//! `n % 8` of byte `n / 8`, and the low bits of a value land on the lower bit
//! offsets. A value may straddle any number of byte boundaries.
//!
//! Every function checks that the whole access fits inside the buffer *before*
//! touching it. If it doesn't, [`BitsError::BufferOverrun`] is returned and the
//! buffer is left unchanged.
//!
//! For reading and writing a sequence of values, use [`BitStream`], which
//! tracks the current bit offset for you.

mod float;
mod stream;

pub use stream::*;
use {
    alloc::{string::String, vec::Vec},
    derive_more::{Display, Error},
};

/// Failed to read or write a value at a bit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum BitsError {
    /// The access would read or write past the end of the buffer.
    ///
    /// When reading a packet, this means the packet was truncated or malformed.
    #[display("buffer overrun - access ends at bit {end} / {len}")]
    BufferOverrun {
        /// Bit offset at which the access would have ended.
        end: usize,
        /// Length of the buffer in bits.
        len: usize,
    },
    /// Attempted to write a string longer than [`MAX_STR_LEN`] bytes.
    #[display("string too long - {len} / {MAX_STR_LEN} bytes")]
    StringTooLong {
        /// Byte length of the string.
        len: usize,
    },
    /// Read a string which was not valid UTF-8.
    #[display("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Byte order used when encoding multi-byte floats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// Maximum byte length of a string written with [`write_str`].
pub const MAX_STR_LEN: usize = u8::MAX as usize;

fn end_of(buf_len: usize, offset: usize, bits: usize) -> Result<usize, BitsError> {
    let len = buf_len.saturating_mul(8);
    match offset.checked_add(bits) {
        Some(end) if end <= len => Ok(end),
        _ => Err(BitsError::BufferOverrun {
            end: offset.saturating_add(bits),
            len,
        }),
    }
}

#[inline]
const fn low_mask(bits: usize) -> u8 {
    debug_assert!(bits > 0 && bits <= 8);
    u8::MAX >> (8 - bits)
}

/// Writes the low `bits` bits of `value` into `buf` starting at bit `offset`.
///
/// Bits already present at the destination are cleared before being written,
/// so writing to the same location twice overwrites rather than accumulates.
///
/// Returns the bit offset just past the written value.
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
///
/// # Panics
///
/// Panics if `bits > 32`.
///
/// # Examples
///
/// ```
/// use tether_transport::bits::{read_uint, write_uint};
///
/// let mut buf = [0u8; 4];
/// // straddles the boundary between byte 0 and byte 1
/// let end = write_uint(&mut buf, 5, 0b1_0110, 5).unwrap();
/// assert_eq!(10, end);
/// assert_eq!(0b1_0110, read_uint(&buf, 5, 5).unwrap());
///
/// // overwrites instead of OR-ing into the old value
/// write_uint(&mut buf, 5, 0b0_1001, 5).unwrap();
/// assert_eq!(0b0_1001, read_uint(&buf, 5, 5).unwrap());
///
/// assert!(write_uint(&mut buf, 30, 0, 3).is_err());
/// ```
pub fn write_uint(buf: &mut [u8], offset: usize, value: u32, bits: u32) -> Result<usize, BitsError> {
    assert!(bits <= u32::BITS, "cannot write more than 32 bits at once");
    let end = end_of(buf.len(), offset, bits as usize)?;

    let mut value = value;
    let mut cursor = offset;
    while cursor < end {
        let bit_index = cursor % 8;
        let chunk = (end - cursor).min(8 - bit_index);
        let mask = low_mask(chunk);
        #[expect(clippy::cast_possible_truncation, reason = "masked down to at most 8 bits")]
        let part = (value & u32::from(mask)) as u8;

        let byte = &mut buf[cursor / 8];
        *byte &= !(mask << bit_index);
        *byte |= part << bit_index;

        value >>= chunk;
        cursor += chunk;
    }
    Ok(end)
}

/// Reads a `bits`-bit unsigned integer from `buf` starting at bit `offset`.
///
/// This is the exact inverse of [`write_uint`].
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
///
/// # Panics
///
/// Panics if `bits > 32`.
pub fn read_uint(buf: &[u8], offset: usize, bits: u32) -> Result<u32, BitsError> {
    assert!(bits <= u32::BITS, "cannot read more than 32 bits at once");
    let end = end_of(buf.len(), offset, bits as usize)?;

    let mut value = 0u32;
    let mut shift = 0usize;
    let mut cursor = offset;
    while cursor < end {
        let bit_index = cursor % 8;
        let chunk = (end - cursor).min(8 - bit_index);
        let part = (buf[cursor / 8] >> bit_index) & low_mask(chunk);
        value |= u32::from(part) << shift;

        shift += chunk;
        cursor += chunk;
    }
    Ok(value)
}

/// Writes a [`u8`] at bit `offset`. See [`write_uint`].
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
pub fn write_u8(buf: &mut [u8], offset: usize, value: u8) -> Result<usize, BitsError> {
    write_uint(buf, offset, u32::from(value), 8)
}

/// Writes a [`u16`] at bit `offset`. See [`write_uint`].
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<usize, BitsError> {
    write_uint(buf, offset, u32::from(value), 16)
}

/// Writes a [`u32`] at bit `offset`. See [`write_uint`].
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<usize, BitsError> {
    write_uint(buf, offset, value, 32)
}

/// Reads a [`u8`] at bit `offset`. See [`read_uint`].
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8, BitsError> {
    #[expect(clippy::cast_possible_truncation, reason = "only 8 bits were read")]
    read_uint(buf, offset, 8).map(|v| v as u8)
}

/// Reads a [`u16`] at bit `offset`. See [`read_uint`].
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16, BitsError> {
    #[expect(clippy::cast_possible_truncation, reason = "only 16 bits were read")]
    read_uint(buf, offset, 16).map(|v| v as u16)
}

/// Reads a [`u32`] at bit `offset`. See [`read_uint`].
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, BitsError> {
    read_uint(buf, offset, 32)
}

/// Writes every byte of `src` as a sequence of 8-bit values starting at bit
/// `offset`, so the array does not need to be byte-aligned.
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`. Nothing is written in
/// this case.
pub fn write_bytes(buf: &mut [u8], offset: usize, src: &[u8]) -> Result<usize, BitsError> {
    end_of(buf.len(), offset, src.len().saturating_mul(8))?;
    src.iter()
        .try_fold(offset, |cursor, byte| write_u8(buf, cursor, *byte))
}

/// Fills `dst` with 8-bit values read starting at bit `offset`.
///
/// Returns the bit offset just past the read bytes.
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`. `dst` is left untouched
/// in this case.
pub fn read_bytes_into(buf: &[u8], offset: usize, dst: &mut [u8]) -> Result<usize, BitsError> {
    let end = end_of(buf.len(), offset, dst.len().saturating_mul(8))?;
    let mut cursor = offset;
    for byte in dst {
        *byte = read_u8(buf, cursor)?;
        cursor += 8;
    }
    Ok(end)
}

/// Reads `len` 8-bit values starting at bit `offset`.
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_bytes(buf: &[u8], offset: usize, len: usize) -> Result<Vec<u8>, BitsError> {
    // check before allocating, `len` may come from untrusted input
    end_of(buf.len(), offset, len.saturating_mul(8))?;
    let mut dst = alloc::vec![0; len];
    read_bytes_into(buf, offset, &mut dst)?;
    Ok(dst)
}

/// Writes a string as an 8-bit byte length followed by its UTF-8 bytes.
///
/// # Errors
///
/// Errors if the string is longer than [`MAX_STR_LEN`] bytes, or if the write
/// would go past the end of `buf`.
///
/// # Examples
///
/// ```
/// use tether_transport::bits::{read_str, write_str};
///
/// let mut buf = [0u8; 16];
/// let end = write_str(&mut buf, 3, "hello").unwrap();
/// assert_eq!(3 + 8 + 5 * 8, end);
/// assert_eq!("hello", read_str(&buf, 3).unwrap());
/// ```
pub fn write_str(buf: &mut [u8], offset: usize, value: &str) -> Result<usize, BitsError> {
    let len = u8::try_from(value.len()).map_err(|_| BitsError::StringTooLong { len: value.len() })?;
    end_of(buf.len(), offset, 8 + value.len() * 8)?;
    let offset = write_u8(buf, offset, len)?;
    write_bytes(buf, offset, value.as_bytes())
}

/// Reads a string written by [`write_str`].
///
/// The bit length consumed is `8 + 8 * s.len()`.
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`, or if the bytes are not
/// valid UTF-8.
pub fn read_str(buf: &[u8], offset: usize) -> Result<String, BitsError> {
    let len = read_u8(buf, offset)?;
    let bytes = read_bytes(buf, offset + 8, usize::from(len))?;
    String::from_utf8(bytes).map_err(|_| BitsError::InvalidUtf8)
}

/// Writes an IEEE-754 half-precision float, converted from `value`.
///
/// Values which cannot be represented are rounded to the nearest half-precision
/// value; values too large become infinity.
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
pub fn write_f16(buf: &mut [u8], offset: usize, value: f32, endian: Endian) -> Result<usize, BitsError> {
    let bits = float::f32_to_f16_bits(value);
    let bytes = match endian {
        Endian::Little => bits.to_le_bytes(),
        Endian::Big => bits.to_be_bytes(),
    };
    write_bytes(buf, offset, &bytes)
}

/// Reads an IEEE-754 half-precision float, widened to an [`f32`].
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_f16(buf: &[u8], offset: usize, endian: Endian) -> Result<f32, BitsError> {
    let mut bytes = [0; 2];
    read_bytes_into(buf, offset, &mut bytes)?;
    let bits = match endian {
        Endian::Little => u16::from_le_bytes(bytes),
        Endian::Big => u16::from_be_bytes(bytes),
    };
    Ok(float::f16_bits_to_f32(bits))
}

/// Writes an IEEE-754 single-precision float.
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
pub fn write_f32(buf: &mut [u8], offset: usize, value: f32, endian: Endian) -> Result<usize, BitsError> {
    let bytes = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    write_bytes(buf, offset, &bytes)
}

/// Reads an IEEE-754 single-precision float.
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_f32(buf: &[u8], offset: usize, endian: Endian) -> Result<f32, BitsError> {
    let mut bytes = [0; 4];
    read_bytes_into(buf, offset, &mut bytes)?;
    Ok(match endian {
        Endian::Little => f32::from_le_bytes(bytes),
        Endian::Big => f32::from_be_bytes(bytes),
    })
}

/// Writes an IEEE-754 double-precision float.
///
/// # Errors
///
/// Errors if the write would go past the end of `buf`.
pub fn write_f64(buf: &mut [u8], offset: usize, value: f64, endian: Endian) -> Result<usize, BitsError> {
    let bytes = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    write_bytes(buf, offset, &bytes)
}

/// Reads an IEEE-754 double-precision float.
///
/// # Errors
///
/// Errors if the read would go past the end of `buf`.
pub fn read_f64(buf: &[u8], offset: usize, endian: Endian) -> Result<f64, BitsError> {
    let mut bytes = [0; 8];
    read_bytes_into(buf, offset, &mut bytes)?;
    Ok(match endian {
        Endian::Little => f64::from_le_bytes(bytes),
        Endian::Big => f64::from_be_bytes(bytes),
    })
}
