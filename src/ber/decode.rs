//! BER decoding.
//!
//! [`Decoder`] is a cursor over a `Bytes` buffer. Nested constructed types
//! hand out sub-decoders over zero-copy slices of the same buffer.
//!
//! Parsing is permissive in the net-snmp tradition: non-minimal integer
//! and length encodings are accepted, and the integer readers tolerate the
//! application tags the protocol defines as integer-shaped.

use bytes::Bytes;

use super::length::decode_length;
use super::tag;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// A decoded identifier/length header and its contents.
#[derive(Debug, Clone)]
pub struct Tlv {
    /// Effective tag octet. For long-form identifiers this is the class and
    /// form bits with the extension-ID marker; `number` holds the real tag
    /// number.
    pub tag: u8,
    /// Tag number (bits 4-0, or the collapsed long-form number).
    pub number: u32,
    /// Content octets.
    pub content: Bytes,
}

/// BER decoder over an owned byte buffer.
pub struct Decoder {
    data: Bytes,
    offset: usize,
}

impl Decoder {
    /// Create a decoder over the given bytes.
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a decoder over a copied slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// True if all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute offset of the cursor in the original input.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn err(&self, kind: DecodeErrorKind) -> Error {
        Error::decode(self.offset, kind)
    }

    /// Peek at the next identifier octet without consuming it.
    pub fn peek_tag(&self) -> Result<u8> {
        self.data
            .first()
            .copied()
            .ok_or_else(|| self.err(DecodeErrorKind::TruncatedData))
    }

    /// Read one identifier, length, and content region.
    ///
    /// Long-form identifiers (extension-ID marker) are accepted and the
    /// continuation octets collapsed into [`Tlv::number`]. The content
    /// length is validated against the remaining input.
    pub fn read_tlv(&mut self) -> Result<Tlv> {
        let start = self.offset;
        let first = self.peek_tag()?;
        let mut id_len = 1usize;
        let number = if tag::is_extension_id(first) {
            let mut number: u32 = 0;
            loop {
                let byte = *self
                    .data
                    .get(id_len)
                    .ok_or_else(|| Error::decode(start, DecodeErrorKind::TruncatedData))?;
                id_len += 1;
                if number > (u32::MAX >> 7) {
                    return Err(Error::decode(start, DecodeErrorKind::IntegerOverflow));
                }
                number = (number << 7) | u32::from(byte & 0x7F);
                if byte & 0x80 == 0 {
                    break;
                }
            }
            number
        } else {
            u32::from(tag::tag_number(first))
        };

        let (content_len, len_octets) = decode_length(&self.data[id_len..], start + id_len)?;
        let header = id_len + len_octets;
        if content_len > self.data.len() - header {
            return Err(Error::decode(start, DecodeErrorKind::TlvOverflow));
        }

        let mut rest = self.data.split_off(header);
        let content = rest.split_to(content_len);
        std::mem::swap(&mut self.data, &mut rest);
        self.offset = start + header + content_len;

        Ok(Tlv {
            tag: first,
            number,
            content,
        })
    }

    /// Read a TLV and assert its tag.
    pub fn read_expected(&mut self, expected: u8) -> Result<Bytes> {
        let start = self.offset;
        let tlv = self.read_tlv()?;
        if tlv.tag != expected {
            return Err(Error::decode(
                start,
                DecodeErrorKind::UnexpectedTag {
                    expected,
                    actual: tlv.tag,
                },
            ));
        }
        Ok(tlv.content)
    }

    /// Read a SEQUENCE header and return a sub-decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        let start = self.offset;
        let content = self.read_expected(tag::universal::SEQUENCE)?;
        Ok(Decoder {
            data: content,
            // Content begins after the identifier and length octets; the
            // exact header width is not tracked here, start is close enough
            // for diagnostics.
            offset: start,
        })
    }

    /// Read a constructed TLV with the given tag, returning a sub-decoder.
    pub fn read_constructed(&mut self, expected: u8) -> Result<Decoder> {
        let start = self.offset;
        let content = self.read_expected(expected)?;
        Ok(Decoder {
            data: content,
            offset: start,
        })
    }

    /// Read a signed INTEGER, sign-extending from the first content octet.
    ///
    /// Also accepts the integer-shaped application tags (Counter32, Gauge32,
    /// TimeTicks), matching the permissive parser of the original stack.
    pub fn read_integer(&mut self) -> Result<i32> {
        let start = self.offset;
        let tlv = self.read_tlv()?;
        match tlv.tag {
            tag::universal::INTEGER
            | tag::application::COUNTER32
            | tag::application::GAUGE32
            | tag::application::TIMETICKS => parse_i32_content(&tlv.content, start),
            actual => Err(Error::decode(
                start,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::INTEGER,
                    actual,
                },
            )),
        }
    }

    /// Read an unsigned 32-bit value (Counter32, Gauge32, TimeTicks,
    /// or a non-negative INTEGER).
    ///
    /// A first content octet with its high bit set is rejected unless it is
    /// leading-zero padding; negative encodings have no unsigned reading.
    pub fn read_unsigned32(&mut self) -> Result<u32> {
        let start = self.offset;
        let tlv = self.read_tlv()?;
        match tlv.tag {
            tag::application::COUNTER32
            | tag::application::GAUGE32
            | tag::application::TIMETICKS
            | tag::universal::INTEGER => parse_u32_content(&tlv.content, start),
            actual => Err(Error::decode(
                start,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::application::GAUGE32,
                    actual,
                },
            )),
        }
    }

    /// Read a Counter64.
    pub fn read_counter64(&mut self) -> Result<u64> {
        let start = self.offset;
        let content = self.read_expected(tag::application::COUNTER64)?;
        parse_u64_content(&content, start)
    }

    /// Read an OCTET STRING. The constructed form (0x24) is rejected.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let start = self.offset;
        if self.peek_tag()? == tag::universal::OCTET_STRING_CONSTRUCTED {
            return Err(Error::decode(
                start,
                DecodeErrorKind::ConstructedOctetString,
            ));
        }
        self.read_expected(tag::universal::OCTET_STRING)
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        let start = self.offset;
        let content = self.read_expected(tag::universal::OBJECT_IDENTIFIER)?;
        Oid::from_ber(&content)
            .map_err(|_| Error::decode(start, DecodeErrorKind::InvalidOidEncoding))
    }

    /// Read a NULL. Content must be empty.
    pub fn read_null(&mut self) -> Result<()> {
        let start = self.offset;
        let content = self.read_expected(tag::universal::NULL)?;
        if !content.is_empty() {
            return Err(Error::decode(start, DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an IpAddress (application tag, exactly 4 content octets).
    pub fn read_ip_address(&mut self) -> Result<[u8; 4]> {
        let start = self.offset;
        let content = self.read_expected(tag::application::IP_ADDRESS)?;
        if content.len() != 4 {
            return Err(Error::decode(
                start,
                DecodeErrorKind::InvalidIpAddressLength {
                    length: content.len(),
                },
            ));
        }
        Ok([content[0], content[1], content[2], content[3]])
    }
}

/// Parse signed integer content with sign extension.
///
/// Non-minimal encodings (redundant sign octets) are accepted; values that
/// do not fit the target width are rejected.
pub(crate) fn parse_i32_content(content: &[u8], offset: usize) -> Result<i32> {
    if content.is_empty() {
        return Err(Error::decode(offset, DecodeErrorKind::ZeroLengthInteger));
    }
    let canonical = trim_sign_octets(content);
    if canonical.len() > 4 {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    Ok(accumulate_signed(canonical) as i32)
}

/// Drop redundant sign octets: a 0x00 whose successor has a clear high bit,
/// or a 0xFF whose successor has a set high bit, carries no information.
fn trim_sign_octets(content: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < content.len() {
        let cur = content[start];
        let next_high = content[start + 1] & 0x80 != 0;
        if (cur == 0x00 && !next_high) || (cur == 0xFF && next_high) {
            start += 1;
        } else {
            break;
        }
    }
    &content[start..]
}

fn accumulate_signed(content: &[u8]) -> i64 {
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        value = (value << 8) | i64::from(b);
    }
    value
}

/// Parse unsigned content: reject a set high bit unless zero-padded.
pub(crate) fn parse_u32_content(content: &[u8], offset: usize) -> Result<u32> {
    if content.is_empty() {
        return Err(Error::decode(offset, DecodeErrorKind::ZeroLengthInteger));
    }
    if content[0] & 0x80 != 0 {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    let trimmed = trim_leading_zeros(content);
    if trimmed.len() > 4 {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    let mut value: u32 = 0;
    for &b in trimmed {
        value = (value << 8) | u32::from(b);
    }
    Ok(value)
}

/// Parse unsigned 64-bit content.
pub(crate) fn parse_u64_content(content: &[u8], offset: usize) -> Result<u64> {
    if content.is_empty() {
        return Err(Error::decode(offset, DecodeErrorKind::ZeroLengthInteger));
    }
    if content[0] & 0x80 != 0 {
        return Err(Error::decode(offset, DecodeErrorKind::IntegerOverflow));
    }
    let trimmed = trim_leading_zeros(content);
    if trimmed.len() > 8 {
        return Err(Error::decode(
            offset,
            DecodeErrorKind::Integer64TooLong {
                length: content.len(),
            },
        ));
    }
    let mut value: u64 = 0;
    for &b in trimmed {
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

/// Parse signed 64-bit content with sign extension.
pub(crate) fn parse_i64_content(content: &[u8], offset: usize) -> Result<i64> {
    if content.is_empty() {
        return Err(Error::decode(offset, DecodeErrorKind::ZeroLengthInteger));
    }
    let canonical = trim_sign_octets(content);
    if canonical.len() > 8 {
        return Err(Error::decode(
            offset,
            DecodeErrorKind::Integer64TooLong {
                length: content.len(),
            },
        ));
    }
    Ok(accumulate_signed(canonical))
}

fn trim_leading_zeros(content: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < content.len() && content[start] == 0 {
        start += 1;
    }
    &content[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(bytes: &[u8]) -> Decoder {
        Decoder::from_slice(bytes)
    }

    #[test]
    fn test_read_integer_basic() {
        let mut d = decoder(&[0x02, 0x01, 0x2A]);
        assert_eq!(d.read_integer().unwrap(), 42);
        assert!(d.is_empty());
    }

    #[test]
    fn test_read_integer_spec_value() {
        // 02 04 12 34 56 78
        let mut d = decoder(&[0x02, 0x04, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(d.read_integer().unwrap(), 0x1234_5678);
        assert_eq!(d.remaining(), 0);
    }

    #[test]
    fn test_read_integer_negative() {
        let mut d = decoder(&[0x02, 0x01, 0xFF]);
        assert_eq!(d.read_integer().unwrap(), -1);

        let mut d = decoder(&[0x02, 0x02, 0xFF, 0x7F]);
        assert_eq!(d.read_integer().unwrap(), -129);
    }

    #[test]
    fn test_read_integer_accepts_application_tags() {
        let mut d = decoder(&[0x41, 0x01, 0x07]);
        assert_eq!(d.read_integer().unwrap(), 7);

        let mut d = decoder(&[0x43, 0x02, 0x01, 0x00]);
        assert_eq!(d.read_integer().unwrap(), 256);
    }

    #[test]
    fn test_read_integer_non_minimal() {
        // Leading zero before a clear high bit: non-minimal but accepted
        let mut d = decoder(&[0x02, 0x02, 0x00, 0x2A]);
        assert_eq!(d.read_integer().unwrap(), 42);
    }

    #[test]
    fn test_read_integer_zero_length() {
        let mut d = decoder(&[0x02, 0x00]);
        assert!(d.read_integer().is_err());
    }

    #[test]
    fn test_read_unsigned32_leading_zero() {
        // 41 02 00 80 decodes to 0x80
        let mut d = decoder(&[0x41, 0x02, 0x00, 0x80]);
        assert_eq!(d.read_unsigned32().unwrap(), 0x80);
    }

    #[test]
    fn test_read_unsigned32_max() {
        let mut d = decoder(&[0x42, 0x05, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(d.read_unsigned32().unwrap(), u32::MAX);
    }

    #[test]
    fn test_read_unsigned32_rejects_high_bit() {
        let mut d = decoder(&[0x41, 0x04, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(d.read_unsigned32().is_err());
    }

    #[test]
    fn test_read_counter64() {
        let mut d = decoder(&[0x46, 0x09, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(d.read_counter64().unwrap(), u64::MAX);

        let mut d = decoder(&[0x46, 0x01, 0x05]);
        assert_eq!(d.read_counter64().unwrap(), 5);
    }

    #[test]
    fn test_read_octet_string() {
        let mut d = decoder(&[0x04, 0x03, b'a', b'b', b'c']);
        assert_eq!(&d.read_octet_string().unwrap()[..], b"abc");
    }

    #[test]
    fn test_read_octet_string_rejects_constructed() {
        let mut d = decoder(&[0x24, 0x00]);
        assert!(d.read_octet_string().is_err());
    }

    #[test]
    fn test_read_null() {
        let mut d = decoder(&[0x05, 0x00]);
        d.read_null().unwrap();

        let mut d = decoder(&[0x05, 0x01, 0x00]);
        assert!(d.read_null().is_err());
    }

    #[test]
    fn test_read_oid() {
        let mut d = decoder(&[0x06, 0x03, 0x2B, 0x06, 0x01]);
        assert_eq!(d.read_oid().unwrap(), crate::oid!(1, 3, 6, 1));
    }

    #[test]
    fn test_read_ip_address() {
        let mut d = decoder(&[0x40, 0x04, 192, 168, 1, 1]);
        assert_eq!(d.read_ip_address().unwrap(), [192, 168, 1, 1]);

        let mut d = decoder(&[0x40, 0x03, 10, 0, 0]);
        assert!(d.read_ip_address().is_err());
    }

    #[test]
    fn test_truncated_content() {
        let mut d = decoder(&[0x04, 0x05, b'a', b'b']);
        assert!(d.read_octet_string().is_err());
    }

    #[test]
    fn test_sequence_nesting() {
        // SEQUENCE { INTEGER 1, INTEGER 2 }
        let mut d = decoder(&[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
        let mut seq = d.read_sequence().unwrap();
        assert_eq!(seq.read_integer().unwrap(), 1);
        assert_eq!(seq.read_integer().unwrap(), 2);
        assert!(seq.is_empty());
        assert!(d.is_empty());
    }

    #[test]
    fn test_long_form_tag_collapsed() {
        // 9F 48: context|extension followed by number 0x48, empty content
        let mut d = decoder(&[0x9F, 0x48, 0x00]);
        let tlv = d.read_tlv().unwrap();
        assert_eq!(tlv.tag, 0x9F);
        assert_eq!(tlv.number, 0x48);
        assert!(tlv.content.is_empty());
    }

    #[test]
    fn test_tlv_overflow() {
        // Length claims 10 bytes, only 1 present
        let mut d = decoder(&[0x04, 0x0A, 0x00]);
        assert!(matches!(
            d.read_tlv(),
            Err(Error::Decode {
                kind: DecodeErrorKind::TlvOverflow,
                ..
            })
        ));
    }
}
