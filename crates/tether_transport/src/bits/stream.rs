use {
    super::{BitsError, Endian},
    alloc::string::String,
    bytes::Bytes,
};

/// Cursor over a byte buffer which reads and writes values at bit granularity.
///
/// The stream holds a buffer `B` and a current bit offset. Every successful
/// read or write advances the offset by exactly the number of bits accessed;
/// a failed access leaves both the offset and the buffer untouched.
///
/// `B` may be anything which derefs to a byte slice, i.e. `Vec<u8>`,
/// `&mut [u8]`, `[u8; N]` for writing, or `&[u8]`, [`Bytes`] for reading.
///
/// # Examples
///
/// ```
/// use tether_transport::bits::BitStream;
///
/// let mut w = BitStream::new(vec![0u8; 8]);
/// w.write_uint(0b101, 3).unwrap();
/// w.write_u32(123_456).unwrap();
/// w.write_str("hi").unwrap();
/// assert_eq!(3 + 32 + 8 + 16, w.offset());
/// // number of bytes touched so far
/// assert_eq!(8, w.byte_len());
///
/// let mut r = BitStream::new(w.filled());
/// assert_eq!(0b101, r.read_uint(3).unwrap());
/// assert_eq!(123_456, r.read_u32().unwrap());
/// assert_eq!("hi", r.read_str().unwrap());
/// assert!(r.read_bit().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct BitStream<B> {
    buf: B,
    offset: usize,
    endian: Endian,
}

impl<B> BitStream<B> {
    /// Creates a stream over `buf`, starting at bit offset 0, using
    /// [`Endian::Little`] for floats.
    pub const fn new(buf: B) -> Self {
        Self {
            buf,
            offset: 0,
            endian: Endian::Little,
        }
    }

    /// Sets the byte order used for floats.
    #[must_use]
    pub fn with_endian(self, endian: Endian) -> Self {
        Self { endian, ..self }
    }

    /// Byte order used for floats.
    #[must_use]
    pub const fn endian(&self) -> Endian {
        self.endian
    }

    /// Current bit offset.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Moves the cursor to an absolute bit offset.
    ///
    /// The offset is not validated here; an out-of-range offset makes the
    /// next access fail.
    pub const fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Moves the cursor back to the start of the buffer.
    pub const fn reset(&mut self) {
        self.offset = 0;
    }

    /// Number of whole or partial bytes covered by the bits up to the current
    /// offset.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.offset.div_ceil(8)
    }

    /// Gets a reference to the underlying buffer.
    #[must_use]
    pub const fn get_ref(&self) -> &B {
        &self.buf
    }

    /// Consumes this stream, returning the underlying buffer.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]>> BitStream<B> {
    /// Length of the underlying buffer in bits.
    #[must_use]
    pub fn len_bits(&self) -> usize {
        self.buf.as_ref().len().saturating_mul(8)
    }

    /// Number of bits between the current offset and the end of the buffer.
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.len_bits().saturating_sub(self.offset)
    }

    /// Bytes covered by everything up to the current offset.
    ///
    /// After writing a packet, this is the slice to put on the wire.
    ///
    /// # Panics
    ///
    /// Panics if the offset was manually moved past the end of the buffer.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.buf.as_ref()[..self.byte_len()]
    }

    fn advance<T>(&mut self, bits: usize, value: T) -> T {
        self.offset += bits;
        value
    }

    /// Reads a `bits`-bit unsigned integer. See [`super::read_uint`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_uint(&mut self, bits: u32) -> Result<u32, BitsError> {
        let v = super::read_uint(self.buf.as_ref(), self.offset, bits)?;
        Ok(self.advance(bits as usize, v))
    }

    /// Reads a single bit as a [`bool`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_bit(&mut self) -> Result<bool, BitsError> {
        self.read_uint(1).map(|v| v != 0)
    }

    /// Reads a [`u8`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_u8(&mut self) -> Result<u8, BitsError> {
        let v = super::read_u8(self.buf.as_ref(), self.offset)?;
        Ok(self.advance(8, v))
    }

    /// Reads a [`u16`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_u16(&mut self) -> Result<u16, BitsError> {
        let v = super::read_u16(self.buf.as_ref(), self.offset)?;
        Ok(self.advance(16, v))
    }

    /// Reads a [`u32`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_u32(&mut self) -> Result<u32, BitsError> {
        self.read_uint(32)
    }

    /// Reads a half-precision float, widened to an [`f32`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_f16(&mut self) -> Result<f32, BitsError> {
        let v = super::read_f16(self.buf.as_ref(), self.offset, self.endian)?;
        Ok(self.advance(16, v))
    }

    /// Reads an [`f32`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_f32(&mut self) -> Result<f32, BitsError> {
        let v = super::read_f32(self.buf.as_ref(), self.offset, self.endian)?;
        Ok(self.advance(32, v))
    }

    /// Reads an [`f64`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_f64(&mut self) -> Result<f64, BitsError> {
        let v = super::read_f64(self.buf.as_ref(), self.offset, self.endian)?;
        Ok(self.advance(64, v))
    }

    /// Reads `len` bytes, which need not be byte-aligned.
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, BitsError> {
        let v = super::read_bytes(self.buf.as_ref(), self.offset, len)?;
        Ok(self.advance(len * 8, Bytes::from(v)))
    }

    /// Reads a length-prefixed string. See [`super::read_str`].
    ///
    /// # Errors
    ///
    /// Errors if the read would go past the end of the buffer, or if the string
    /// is not valid UTF-8.
    pub fn read_str(&mut self) -> Result<String, BitsError> {
        let v = super::read_str(self.buf.as_ref(), self.offset)?;
        let bits = 8 + v.len() * 8;
        Ok(self.advance(bits, v))
    }
}

impl<B: AsMut<[u8]>> BitStream<B> {
    fn wrote(&mut self, end: usize) {
        self.offset = end;
    }

    /// Writes the low `bits` bits of `value`. See [`super::write_uint`].
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_uint(&mut self, value: u32, bits: u32) -> Result<(), BitsError> {
        let end = super::write_uint(self.buf.as_mut(), self.offset, value, bits)?;
        self.wrote(end);
        Ok(())
    }

    /// Writes a single bit.
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_bit(&mut self, value: bool) -> Result<(), BitsError> {
        self.write_uint(u32::from(value), 1)
    }

    /// Writes a [`u8`].
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_u8(&mut self, value: u8) -> Result<(), BitsError> {
        self.write_uint(u32::from(value), 8)
    }

    /// Writes a [`u16`].
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_u16(&mut self, value: u16) -> Result<(), BitsError> {
        self.write_uint(u32::from(value), 16)
    }

    /// Writes a [`u32`].
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_u32(&mut self, value: u32) -> Result<(), BitsError> {
        self.write_uint(value, 32)
    }

    /// Writes `value` as a half-precision float.
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_f16(&mut self, value: f32) -> Result<(), BitsError> {
        let end = super::write_f16(self.buf.as_mut(), self.offset, value, self.endian)?;
        self.wrote(end);
        Ok(())
    }

    /// Writes an [`f32`].
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_f32(&mut self, value: f32) -> Result<(), BitsError> {
        let end = super::write_f32(self.buf.as_mut(), self.offset, value, self.endian)?;
        self.wrote(end);
        Ok(())
    }

    /// Writes an [`f64`].
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_f64(&mut self, value: f64) -> Result<(), BitsError> {
        let end = super::write_f64(self.buf.as_mut(), self.offset, value, self.endian)?;
        self.wrote(end);
        Ok(())
    }

    /// Writes every byte of `src`.
    ///
    /// # Errors
    ///
    /// Errors if the write would go past the end of the buffer.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<(), BitsError> {
        let end = super::write_bytes(self.buf.as_mut(), self.offset, src)?;
        self.wrote(end);
        Ok(())
    }

    /// Writes a length-prefixed string. See [`super::write_str`].
    ///
    /// # Errors
    ///
    /// Errors if the string is too long, or if the write would go past the end
    /// of the buffer.
    pub fn write_str(&mut self, value: &str) -> Result<(), BitsError> {
        let end = super::write_str(self.buf.as_mut(), self.offset, value)?;
        self.wrote(end);
        Ok(())
    }
}
