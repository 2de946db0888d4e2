//! BER encoding.
//!
//! Two builders are provided:
//!
//! - [`EncodeBuf`] writes from the end backwards into a growable buffer,
//!   avoiding the need to pre-calculate lengths. Only offsets and owned
//!   bytes are exposed, so no caller can hold a pointer across growth.
//! - [`ForwardWriter`] writes front-to-back into a caller-supplied slice
//!   and fails with `BufferFull` when out of space. It never truncates.
//!
//! Both produce byte-identical output for the same value.

use bytes::Bytes;

use super::length::{encode_length, length_size};
use super::tag;
use crate::error::{Error, Result};
use crate::oid::Oid;

/// Reverse BER builder over a growable buffer.
///
/// Bytes are appended back-to-front, so a constructed type's length is
/// known by the time its header is written and nothing is ever moved. The
/// buffer is flipped once in [`finish`](Self::finish). Callers track
/// positions through [`len`](Self::len) offsets; no borrow into the buffer
/// is handed out, so growth can never invalidate one.
pub struct EncodeBuf {
    buf: Vec<u8>,
}

impl EncodeBuf {
    /// Create a builder with a default scratch capacity.
    pub fn new() -> Self {
        Self::with_capacity(512)
    }

    /// Create a builder with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Prepend a run of bytes, preserving their forward order.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().rev());
    }

    /// Prepend a definite length.
    pub fn push_length(&mut self, len: usize) {
        let (octets, count) = encode_length(len);
        // Already least-significant-first, ready for the reversed buffer.
        self.buf.extend_from_slice(&octets[..count]);
    }

    /// Prepend an identifier octet.
    pub fn push_tag(&mut self, tag: u8) {
        self.buf.push(tag);
    }

    /// Bytes encoded so far. Also serves as the position cookie for
    /// constructed-length accounting.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been encoded.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Prepend a complete primitive TLV.
    fn push_primitive(&mut self, tag: u8, content: &[u8]) {
        self.push_bytes(content);
        self.push_length(content.len());
        self.push_tag(tag);
    }

    /// Encode a constructed type: the closure writes the contents (in
    /// reverse element order), then the header is prepended around them.
    pub fn push_constructed<F>(&mut self, tag: u8, f: F)
    where
        F: FnOnce(&mut Self),
    {
        let content_start = self.len();
        f(self);
        self.push_length(self.len() - content_start);
        self.push_tag(tag);
    }

    /// Encode a SEQUENCE.
    pub fn push_sequence<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.push_constructed(tag::universal::SEQUENCE, f);
    }

    /// Encode an INTEGER in minimal form.
    pub fn push_integer(&mut self, value: i32) {
        let (arr, len) = encode_integer_stack(value);
        self.push_primitive(tag::universal::INTEGER, &arr[4 - len..]);
    }

    /// Encode a BOOLEAN.
    pub fn push_boolean(&mut self, value: bool) {
        self.push_primitive(tag::universal::BOOLEAN, &[if value { 0xFF } else { 0x00 }]);
    }

    /// Encode a Counter64 (application tag, plain unsigned content).
    pub fn push_counter64(&mut self, value: u64) {
        let (arr, len) = encode_unsigned64_stack(value);
        self.push_primitive(tag::application::COUNTER64, &arr[9 - len..]);
    }

    /// Encode an unsigned 32-bit value under the given application tag.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        let (arr, len) = encode_unsigned32_stack(value);
        self.push_primitive(tag, &arr[5 - len..]);
    }

    /// Encode an OCTET STRING.
    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_primitive(tag::universal::OCTET_STRING, data);
    }

    /// Encode a BIT STRING. `data` carries the content octets verbatim
    /// (including the leading unused-bits count).
    pub fn push_bit_string(&mut self, data: &[u8]) {
        self.push_primitive(tag::universal::BIT_STRING, data);
    }

    /// Encode a NULL.
    pub fn push_null(&mut self) {
        self.push_primitive(tag::universal::NULL, &[]);
    }

    /// Encode a zero-length exception value (noSuchObject and friends).
    pub fn push_exception(&mut self, tag: u8) {
        self.push_primitive(tag, &[]);
    }

    /// Encode an OBJECT IDENTIFIER.
    pub fn push_oid(&mut self, oid: &Oid) {
        let arcs = oid.to_ber_smallvec();
        self.push_primitive(tag::universal::OBJECT_IDENTIFIER, &arcs);
    }

    /// Encode an IpAddress.
    pub fn push_ip_address(&mut self, addr: [u8; 4]) {
        self.push_primitive(tag::application::IP_ADDRESS, &addr);
    }

    /// Encode an Opaque with raw contents.
    pub fn push_opaque(&mut self, data: &[u8]) {
        self.push_primitive(tag::application::OPAQUE, data);
    }

    /// Encode an Opaque-wrapped value with the historical tag pair.
    ///
    /// The envelope is `OPAQUE { TAG1, TAG2+app, inner-length, inner }`.
    fn push_opaque_wrapped(&mut self, tag2: u8, inner: &[u8]) {
        let content_len = 2 + length_size(inner.len()) + inner.len();
        self.push_bytes(inner);
        self.push_length(inner.len());
        self.push_tag(tag2);
        self.push_tag(tag::opaque::TAG1);
        self.push_length(content_len);
        self.push_tag(tag::application::OPAQUE);
    }

    /// Encode a float in an opaque envelope (exactly 4 inner bytes).
    pub fn push_opaque_float(&mut self, value: f32) {
        self.push_opaque_wrapped(tag::opaque::FLOAT, &value.to_be_bytes());
    }

    /// Encode a double in an opaque envelope (exactly 8 inner bytes).
    pub fn push_opaque_double(&mut self, value: f64) {
        self.push_opaque_wrapped(tag::opaque::DOUBLE, &value.to_be_bytes());
    }

    /// Encode a Counter64 in an opaque envelope.
    pub fn push_opaque_counter64(&mut self, value: u64) {
        let (arr, len) = encode_unsigned64_stack(value);
        self.push_opaque_wrapped(tag::opaque::COUNTER64, &arr[9 - len..]);
    }

    /// Encode a signed 64-bit integer in an opaque envelope.
    pub fn push_opaque_int64(&mut self, value: i64) {
        let (arr, len) = encode_integer64_stack(value);
        self.push_opaque_wrapped(tag::opaque::INTEGER64, &arr[8 - len..]);
    }

    /// Encode an unsigned 64-bit integer in an opaque envelope.
    pub fn push_opaque_uint64(&mut self, value: u64) {
        let (arr, len) = encode_unsigned64_stack(value);
        self.push_opaque_wrapped(tag::opaque::UNSIGNED64, &arr[9 - len..]);
    }

    /// Flip the buffer into forward order and hand it off.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }

    /// Flip the buffer into forward order as a plain `Vec<u8>`.
    pub fn finish_vec(mut self) -> Vec<u8> {
        self.buf.reverse();
        self.buf
    }
}

impl Default for EncodeBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward BER writer over a fixed caller-supplied buffer.
///
/// Every build method checks the remaining space first and returns
/// [`Error::BufferFull`] without writing anything when the object does not
/// fit. Constructed types take an explicit content length, as the classical
/// forward builders do.
pub struct ForwardWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ForwardWriter<'a> {
    /// Create a writer over `buf`, starting at offset 0.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// The written prefix of the buffer.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.buf.len() - self.pos;
        if needed > available {
            return Err(Error::BufferFull { needed, available });
        }
        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_length(&mut self, len: usize) {
        let (arr, count) = encode_length(len);
        for i in (0..count).rev() {
            self.buf[self.pos] = arr[i];
            self.pos += 1;
        }
    }

    /// Write an identifier and length header for `content_len` content bytes.
    ///
    /// Used for constructed types whose content the caller writes next.
    pub fn build_header(&mut self, tag: u8, content_len: usize) -> Result<()> {
        self.ensure(1 + length_size(content_len))?;
        self.buf[self.pos] = tag;
        self.pos += 1;
        self.put_length(content_len);
        Ok(())
    }

    fn build_primitive(&mut self, tag: u8, content: &[u8]) -> Result<()> {
        self.ensure(1 + length_size(content.len()) + content.len())?;
        self.buf[self.pos] = tag;
        self.pos += 1;
        self.put_length(content.len());
        self.put(content);
        Ok(())
    }

    /// Write a BOOLEAN.
    pub fn build_boolean(&mut self, value: bool) -> Result<()> {
        self.build_primitive(tag::universal::BOOLEAN, &[if value { 0xFF } else { 0x00 }])
    }

    /// Write an INTEGER in minimal form.
    pub fn build_integer(&mut self, value: i32) -> Result<()> {
        let (arr, len) = encode_integer_stack(value);
        self.build_primitive(tag::universal::INTEGER, &arr[4 - len..])
    }

    /// Write an unsigned 32-bit value with the given tag.
    pub fn build_unsigned32(&mut self, tag: u8, value: u32) -> Result<()> {
        let (arr, len) = encode_unsigned32_stack(value);
        self.build_primitive(tag, &arr[5 - len..])
    }

    /// Write a Counter64.
    pub fn build_counter64(&mut self, value: u64) -> Result<()> {
        let (arr, len) = encode_unsigned64_stack(value);
        self.build_primitive(tag::application::COUNTER64, &arr[9 - len..])
    }

    /// Write an OCTET STRING.
    pub fn build_octet_string(&mut self, data: &[u8]) -> Result<()> {
        self.build_primitive(tag::universal::OCTET_STRING, data)
    }

    /// Write a BIT STRING with verbatim content octets.
    pub fn build_bit_string(&mut self, data: &[u8]) -> Result<()> {
        self.build_primitive(tag::universal::BIT_STRING, data)
    }

    /// Write a NULL.
    pub fn build_null(&mut self) -> Result<()> {
        self.build_primitive(tag::universal::NULL, &[])
    }

    /// Write a zero-length exception value.
    pub fn build_exception(&mut self, tag: u8) -> Result<()> {
        self.build_primitive(tag, &[])
    }

    /// Write an OBJECT IDENTIFIER.
    pub fn build_oid(&mut self, oid: &Oid) -> Result<()> {
        let ber = oid.to_ber_smallvec();
        self.build_primitive(tag::universal::OBJECT_IDENTIFIER, &ber)
    }

    /// Write an IpAddress.
    pub fn build_ip_address(&mut self, addr: [u8; 4]) -> Result<()> {
        self.build_primitive(tag::application::IP_ADDRESS, &addr)
    }

    /// Write an Opaque with raw contents.
    pub fn build_opaque(&mut self, data: &[u8]) -> Result<()> {
        self.build_primitive(tag::application::OPAQUE, data)
    }

    fn build_opaque_wrapped(&mut self, tag2: u8, inner: &[u8]) -> Result<()> {
        let content_len = 2 + length_size(inner.len()) + inner.len();
        self.ensure(1 + length_size(content_len) + content_len)?;
        self.buf[self.pos] = tag::application::OPAQUE;
        self.pos += 1;
        self.put_length(content_len);
        self.put(&[tag::opaque::TAG1, tag2]);
        self.put_length(inner.len());
        self.put(inner);
        Ok(())
    }

    /// Write a float in an opaque envelope.
    pub fn build_opaque_float(&mut self, value: f32) -> Result<()> {
        self.build_opaque_wrapped(tag::opaque::FLOAT, &value.to_be_bytes())
    }

    /// Write a double in an opaque envelope.
    pub fn build_opaque_double(&mut self, value: f64) -> Result<()> {
        self.build_opaque_wrapped(tag::opaque::DOUBLE, &value.to_be_bytes())
    }

    /// Write a Counter64 in an opaque envelope.
    pub fn build_opaque_counter64(&mut self, value: u64) -> Result<()> {
        let (arr, len) = encode_unsigned64_stack(value);
        self.build_opaque_wrapped(tag::opaque::COUNTER64, &arr[9 - len..])
    }

    /// Write a signed 64-bit integer in an opaque envelope.
    pub fn build_opaque_int64(&mut self, value: i64) -> Result<()> {
        let (arr, len) = encode_integer64_stack(value);
        self.build_opaque_wrapped(tag::opaque::INTEGER64, &arr[8 - len..])
    }

    /// Write an unsigned 64-bit integer in an opaque envelope.
    pub fn build_opaque_uint64(&mut self, value: u64) -> Result<()> {
        let (arr, len) = encode_unsigned64_stack(value);
        self.build_opaque_wrapped(tag::opaque::UNSIGNED64, &arr[9 - len..])
    }
}

/// Minimal signed content octets for an i32.
///
/// The count of significant bytes is returned alongside the big-endian
/// array; the significant bytes sit at the tail so both builders can slice
/// them directly. Redundant sign octets are dropped: a leading 0x00 whose
/// successor has a clear high bit, or a leading 0xFF whose successor has a
/// set one, carries no information.
#[inline]
pub(crate) fn encode_integer_stack(value: i32) -> ([u8; 4], usize) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    if value >= 0 {
        while start < 3 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
            start += 1;
        }
    } else {
        while start < 3 && bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0 {
            start += 1;
        }
    }
    (bytes, 4 - start)
}

/// Unsigned content octets for a u32.
///
/// Significant bytes sit at the tail of the returned array. A value whose
/// most significant byte has the high bit set gets a 0x00 pad so the
/// content never reads as negative.
#[inline]
pub(crate) fn encode_unsigned32_stack(value: u32) -> ([u8; 5], usize) {
    if value == 0 {
        return ([0; 5], 1);
    }
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 3 && bytes[start] == 0 {
        start += 1;
    }
    let mut padded = [0u8; 5];
    padded[1..].copy_from_slice(&bytes);
    let pad = usize::from(bytes[start] & 0x80 != 0);
    (padded, 4 - start + pad)
}

/// Unsigned content octets for a u64, padded like the 32-bit form.
#[inline]
pub(crate) fn encode_unsigned64_stack(value: u64) -> ([u8; 9], usize) {
    if value == 0 {
        return ([0; 9], 1);
    }
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 && bytes[start] == 0 {
        start += 1;
    }
    let mut padded = [0u8; 9];
    padded[1..].copy_from_slice(&bytes);
    let pad = usize::from(bytes[start] & 0x80 != 0);
    (padded, 8 - start + pad)
}

/// Minimal signed content octets for an i64.
#[inline]
pub(crate) fn encode_integer64_stack(value: i64) -> ([u8; 8], usize) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    if value >= 0 {
        while start < 7 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
            start += 1;
        }
    } else {
        while start < 7 && bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0 {
            start += 1;
        }
    }
    (bytes, 8 - start)
}
