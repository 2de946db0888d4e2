//! SNMP value types.
//!
//! [`Value`] is the sum type over every kind the wire protocol recognizes,
//! including the historical opaque-wrapped 64-bit and floating point forms.
//! The encoder matches on the variant; the decoder dispatches on the tag.

use bytes::Bytes;

use crate::ber::tag;
use crate::ber::{Decoder, EncodeBuf, ForwardWriter, decode_length};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;

/// Type discriminant for [`Value`], used by the set-phase checkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Integer,
    OctetString,
    BitString,
    Null,
    ObjectIdentifier,
    IpAddress,
    Counter32,
    Gauge32,
    TimeTicks,
    Opaque,
    Counter64,
    OpaqueCounter64,
    OpaqueFloat,
    OpaqueDouble,
    OpaqueInt64,
    OpaqueUint64,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

/// An SNMP value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// ASN.1 BOOLEAN (rare on the wire, kept for completeness).
    Boolean(bool),
    /// Signed 32-bit INTEGER.
    Integer(i32),
    /// OCTET STRING.
    OctetString(Bytes),
    /// BIT STRING, content octets verbatim (leading unused-bits count included).
    BitString(Bytes),
    /// NULL (placeholder in requests).
    Null,
    /// OBJECT IDENTIFIER.
    ObjectIdentifier(Oid),
    /// IpAddress (4 octets, application tag 0).
    IpAddress([u8; 4]),
    /// Counter32 (wraps at 2^32).
    Counter32(u32),
    /// Gauge32 / Unsigned32.
    Gauge32(u32),
    /// TimeTicks in hundredths of a second.
    TimeTicks(u32),
    /// Opaque with unrecognized contents, kept verbatim.
    Opaque(Bytes),
    /// Counter64 (application tag 6, plain encoding).
    Counter64(u64),
    /// Counter64 smuggled through an opaque envelope.
    OpaqueCounter64(u64),
    /// IEEE 754 single in an opaque envelope.
    OpaqueFloat(f32),
    /// IEEE 754 double in an opaque envelope.
    OpaqueDouble(f64),
    /// Signed 64-bit integer in an opaque envelope.
    OpaqueInt64(i64),
    /// Unsigned 64-bit integer in an opaque envelope.
    OpaqueUint64(u64),
    /// noSuchObject exception (response only).
    NoSuchObject,
    /// noSuchInstance exception (response only).
    NoSuchInstance,
    /// endOfMibView exception (response only).
    EndOfMibView,
}

impl Value {
    /// The type discriminant of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::OctetString(_) => ValueKind::OctetString,
            Value::BitString(_) => ValueKind::BitString,
            Value::Null => ValueKind::Null,
            Value::ObjectIdentifier(_) => ValueKind::ObjectIdentifier,
            Value::IpAddress(_) => ValueKind::IpAddress,
            Value::Counter32(_) => ValueKind::Counter32,
            Value::Gauge32(_) => ValueKind::Gauge32,
            Value::TimeTicks(_) => ValueKind::TimeTicks,
            Value::Opaque(_) => ValueKind::Opaque,
            Value::Counter64(_) => ValueKind::Counter64,
            Value::OpaqueCounter64(_) => ValueKind::OpaqueCounter64,
            Value::OpaqueFloat(_) => ValueKind::OpaqueFloat,
            Value::OpaqueDouble(_) => ValueKind::OpaqueDouble,
            Value::OpaqueInt64(_) => ValueKind::OpaqueInt64,
            Value::OpaqueUint64(_) => ValueKind::OpaqueUint64,
            Value::NoSuchObject => ValueKind::NoSuchObject,
            Value::NoSuchInstance => ValueKind::NoSuchInstance,
            Value::EndOfMibView => ValueKind::EndOfMibView,
        }
    }

    /// True for the three RFC 3416 exception values.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// The integer value, if this is an integer-shaped variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => {
                Some(i64::from(*v))
            }
            Value::OpaqueInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Validate the value type against an expected kind (SET reserve phase).
    ///
    /// NULL never passes: a SET carrying NULL has no assignable value.
    pub fn check_type(&self, expected: ValueKind) -> std::result::Result<(), ErrorStatus> {
        if self.kind() == expected && expected != ValueKind::Null {
            Ok(())
        } else {
            Err(ErrorStatus::WrongType)
        }
    }

    /// Validate an octet-string-shaped value's length bounds.
    pub fn check_length(
        &self,
        min: usize,
        max: usize,
    ) -> std::result::Result<(), ErrorStatus> {
        let len = match self {
            Value::OctetString(b) | Value::BitString(b) | Value::Opaque(b) => b.len(),
            Value::ObjectIdentifier(o) => o.len(),
            Value::IpAddress(_) => 4,
            // Fixed-width kinds always satisfy their own length
            _ => return Ok(()),
        };
        if len < min || len > max {
            Err(ErrorStatus::WrongLength)
        } else {
            Ok(())
        }
    }

    /// Validate an integer-shaped value against an inclusive range.
    pub fn check_range(&self, min: i64, max: i64) -> std::result::Result<(), ErrorStatus> {
        match self.as_i64() {
            Some(v) if v >= min && v <= max => Ok(()),
            Some(_) => Err(ErrorStatus::WrongValue),
            None => Err(ErrorStatus::WrongType),
        }
    }

    /// Encode into a reverse buffer.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Boolean(v) => buf.push_boolean(*v),
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::BitString(data) => buf.push_bit_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_ip_address(*addr),
            Value::Counter32(v) => buf.push_unsigned32(tag::application::COUNTER32, *v),
            Value::Gauge32(v) => buf.push_unsigned32(tag::application::GAUGE32, *v),
            Value::TimeTicks(v) => buf.push_unsigned32(tag::application::TIMETICKS, *v),
            Value::Opaque(data) => buf.push_opaque(data),
            Value::Counter64(v) => buf.push_counter64(*v),
            Value::OpaqueCounter64(v) => buf.push_opaque_counter64(*v),
            Value::OpaqueFloat(v) => buf.push_opaque_float(*v),
            Value::OpaqueDouble(v) => buf.push_opaque_double(*v),
            Value::OpaqueInt64(v) => buf.push_opaque_int64(*v),
            Value::OpaqueUint64(v) => buf.push_opaque_uint64(*v),
            Value::NoSuchObject => buf.push_exception(tag::context::NO_SUCH_OBJECT),
            Value::NoSuchInstance => buf.push_exception(tag::context::NO_SUCH_INSTANCE),
            Value::EndOfMibView => buf.push_exception(tag::context::END_OF_MIB_VIEW),
        }
    }

    /// Encode into a forward writer. Fails with `BufferFull` when the value
    /// does not fit, writing nothing.
    pub fn build_forward(&self, w: &mut ForwardWriter<'_>) -> Result<()> {
        match self {
            Value::Boolean(v) => w.build_boolean(*v),
            Value::Integer(v) => w.build_integer(*v),
            Value::OctetString(data) => w.build_octet_string(data),
            Value::BitString(data) => w.build_bit_string(data),
            Value::Null => w.build_null(),
            Value::ObjectIdentifier(oid) => w.build_oid(oid),
            Value::IpAddress(addr) => w.build_ip_address(*addr),
            Value::Counter32(v) => w.build_unsigned32(tag::application::COUNTER32, *v),
            Value::Gauge32(v) => w.build_unsigned32(tag::application::GAUGE32, *v),
            Value::TimeTicks(v) => w.build_unsigned32(tag::application::TIMETICKS, *v),
            Value::Opaque(data) => w.build_opaque(data),
            Value::Counter64(v) => w.build_counter64(*v),
            Value::OpaqueCounter64(v) => w.build_opaque_counter64(*v),
            Value::OpaqueFloat(v) => w.build_opaque_float(*v),
            Value::OpaqueDouble(v) => w.build_opaque_double(*v),
            Value::OpaqueInt64(v) => w.build_opaque_int64(*v),
            Value::OpaqueUint64(v) => w.build_opaque_uint64(*v),
            Value::NoSuchObject => w.build_exception(tag::context::NO_SUCH_OBJECT),
            Value::NoSuchInstance => w.build_exception(tag::context::NO_SUCH_INSTANCE),
            Value::EndOfMibView => w.build_exception(tag::context::END_OF_MIB_VIEW),
        }
    }

    /// Decode the next value from the decoder.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let offset = decoder.offset();
        let tlv = decoder.read_tlv()?;
        match tlv.tag {
            tag::universal::BOOLEAN => {
                if tlv.content.len() != 1 {
                    return Err(Error::decode(offset, DecodeErrorKind::InvalidLength));
                }
                Ok(Value::Boolean(tlv.content[0] != 0))
            }
            tag::universal::INTEGER => {
                Ok(Value::Integer(crate::ber::parse_i32_content(
                    &tlv.content,
                    offset,
                )?))
            }
            tag::universal::OCTET_STRING => Ok(Value::OctetString(tlv.content)),
            tag::universal::OCTET_STRING_CONSTRUCTED => Err(Error::decode(
                offset,
                DecodeErrorKind::ConstructedOctetString,
            )),
            tag::universal::BIT_STRING => Ok(Value::BitString(tlv.content)),
            tag::universal::NULL => {
                if !tlv.content.is_empty() {
                    return Err(Error::decode(offset, DecodeErrorKind::InvalidNull));
                }
                Ok(Value::Null)
            }
            tag::universal::OBJECT_IDENTIFIER => Oid::from_ber(&tlv.content)
                .map(Value::ObjectIdentifier)
                .map_err(|_| Error::decode(offset, DecodeErrorKind::InvalidOidEncoding)),
            tag::application::IP_ADDRESS => {
                if tlv.content.len() != 4 {
                    return Err(Error::decode(
                        offset,
                        DecodeErrorKind::InvalidIpAddressLength {
                            length: tlv.content.len(),
                        },
                    ));
                }
                Ok(Value::IpAddress([
                    tlv.content[0],
                    tlv.content[1],
                    tlv.content[2],
                    tlv.content[3],
                ]))
            }
            tag::application::COUNTER32 => Ok(Value::Counter32(
                crate::ber::parse_u32_content(&tlv.content, offset)?,
            )),
            tag::application::GAUGE32 => Ok(Value::Gauge32(crate::ber::parse_u32_content(
                &tlv.content,
                offset,
            )?)),
            tag::application::TIMETICKS => Ok(Value::TimeTicks(
                crate::ber::parse_u32_content(&tlv.content, offset)?,
            )),
            tag::application::OPAQUE => decode_opaque(tlv.content, offset),
            tag::application::COUNTER64 => Ok(Value::Counter64(
                crate::ber::parse_u64_content(&tlv.content, offset)?,
            )),
            tag::context::NO_SUCH_OBJECT => Ok(Value::NoSuchObject),
            tag::context::NO_SUCH_INSTANCE => Ok(Value::NoSuchInstance),
            tag::context::END_OF_MIB_VIEW => Ok(Value::EndOfMibView),
            actual => Err(Error::decode(
                offset,
                DecodeErrorKind::UnexpectedTag {
                    expected: tag::universal::NULL,
                    actual,
                },
            )),
        }
    }
}

/// Decode Opaque contents, unwrapping the historical typed envelope.
///
/// Unrecognized contents are preserved verbatim as [`Value::Opaque`] so a
/// re-encode reproduces the original bytes.
fn decode_opaque(content: Bytes, offset: usize) -> Result<Value> {
    if content.len() < 3 || content[0] != tag::opaque::TAG1 {
        return Ok(Value::Opaque(content));
    }
    let tag2 = content[1];
    let inner = &content[2..];
    let (inner_len, len_octets) = match decode_length(inner, offset + 2) {
        Ok(v) => v,
        Err(_) => return Ok(Value::Opaque(content)),
    };
    let value = &inner[len_octets..];
    if value.len() != inner_len {
        return Ok(Value::Opaque(content));
    }
    match tag2 {
        tag::opaque::COUNTER64 => Ok(Value::OpaqueCounter64(crate::ber::parse_u64_content(
            value, offset,
        )?)),
        tag::opaque::FLOAT => {
            if value.len() != 4 {
                return Err(Error::decode(
                    offset,
                    DecodeErrorKind::InvalidOpaqueLength {
                        expected: 4,
                        actual: value.len(),
                    },
                ));
            }
            Ok(Value::OpaqueFloat(f32::from_be_bytes([
                value[0], value[1], value[2], value[3],
            ])))
        }
        tag::opaque::DOUBLE => {
            if value.len() != 8 {
                return Err(Error::decode(
                    offset,
                    DecodeErrorKind::InvalidOpaqueLength {
                        expected: 8,
                        actual: value.len(),
                    },
                ));
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(value);
            Ok(Value::OpaqueDouble(f64::from_be_bytes(raw)))
        }
        tag::opaque::INTEGER64 => Ok(Value::OpaqueInt64(crate::ber::parse_i64_content(
            value, offset,
        )?)),
        tag::opaque::UNSIGNED64 => Ok(Value::OpaqueUint64(crate::ber::parse_u64_content(
            value, offset,
        )?)),
        _ => Ok(Value::Opaque(content)),
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{}", s),
                _ => {
                    for b in data.iter() {
                        write!(f, "{:02x}", b)?;
                    }
                    Ok(())
                }
            },
            Value::BitString(data) => {
                for b in data.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(a) => write!(f, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Value::Counter32(v) => write!(f, "{}", v),
            Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => write!(f, "{}", v),
            Value::Opaque(data) => {
                for b in data.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Counter64(v) => write!(f, "{}", v),
            Value::OpaqueCounter64(v) => write!(f, "{}", v),
            Value::OpaqueFloat(v) => write!(f, "{}", v),
            Value::OpaqueDouble(v) => write!(f, "{}", v),
            Value::OpaqueInt64(v) => write!(f, "{}", v),
            Value::OpaqueUint64(v) => write!(f, "{}", v),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::OctetString(Bytes::from(v.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let mut buf = EncodeBuf::new();
        value.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        let decoded = Value::decode(&mut decoder).unwrap();
        assert!(decoder.is_empty(), "trailing bytes after {:?}", decoded);
        decoded
    }

    #[test]
    fn test_roundtrip_integers() {
        for v in [0i32, 1, -1, 127, 128, -128, -129, i32::MAX, i32::MIN] {
            assert_eq!(roundtrip(Value::Integer(v)), Value::Integer(v));
        }
    }

    #[test]
    fn test_roundtrip_unsigned() {
        for v in [0u32, 0x7F, 0x80, 0xFF, 0x100, u32::MAX] {
            assert_eq!(roundtrip(Value::Counter32(v)), Value::Counter32(v));
            assert_eq!(roundtrip(Value::Gauge32(v)), Value::Gauge32(v));
            assert_eq!(roundtrip(Value::TimeTicks(v)), Value::TimeTicks(v));
        }
    }

    #[test]
    fn test_roundtrip_counter64() {
        for v in [0u64, 1, 0x80, u64::from(u32::MAX) + 1, u64::MAX] {
            assert_eq!(roundtrip(Value::Counter64(v)), Value::Counter64(v));
            assert_eq!(
                roundtrip(Value::OpaqueCounter64(v)),
                Value::OpaqueCounter64(v)
            );
            assert_eq!(roundtrip(Value::OpaqueUint64(v)), Value::OpaqueUint64(v));
        }
    }

    #[test]
    fn test_roundtrip_opaque_int64() {
        for v in [0i64, -1, i64::MIN, i64::MAX] {
            assert_eq!(roundtrip(Value::OpaqueInt64(v)), Value::OpaqueInt64(v));
        }
    }

    #[test]
    fn test_roundtrip_float_double() {
        assert_eq!(
            roundtrip(Value::OpaqueFloat(3.5)),
            Value::OpaqueFloat(3.5)
        );
        assert_eq!(
            roundtrip(Value::OpaqueDouble(-2.25)),
            Value::OpaqueDouble(-2.25)
        );
    }

    #[test]
    fn test_roundtrip_misc() {
        assert_eq!(roundtrip(Value::Null), Value::Null);
        assert_eq!(roundtrip(Value::Boolean(true)), Value::Boolean(true));
        assert_eq!(
            roundtrip(Value::OctetString(Bytes::from_static(b"hello"))),
            Value::OctetString(Bytes::from_static(b"hello"))
        );
        assert_eq!(
            roundtrip(Value::BitString(Bytes::from_static(&[0x04, 0xF0]))),
            Value::BitString(Bytes::from_static(&[0x04, 0xF0]))
        );
        assert_eq!(
            roundtrip(Value::IpAddress([10, 0, 0, 1])),
            Value::IpAddress([10, 0, 0, 1])
        );
        assert_eq!(
            roundtrip(Value::ObjectIdentifier(crate::oid!(1, 3, 6, 1, 4, 1))),
            Value::ObjectIdentifier(crate::oid!(1, 3, 6, 1, 4, 1))
        );
        assert_eq!(roundtrip(Value::NoSuchObject), Value::NoSuchObject);
        assert_eq!(roundtrip(Value::NoSuchInstance), Value::NoSuchInstance);
        assert_eq!(roundtrip(Value::EndOfMibView), Value::EndOfMibView);
    }

    #[test]
    fn test_opaque_unknown_contents_preserved() {
        let raw = Bytes::from_static(&[0x01, 0x02, 0x03]);
        assert_eq!(
            roundtrip(Value::Opaque(raw.clone())),
            Value::Opaque(raw)
        );
    }

    #[test]
    fn test_check_type() {
        assert!(Value::Integer(1).check_type(ValueKind::Integer).is_ok());
        assert_eq!(
            Value::Integer(1).check_type(ValueKind::OctetString),
            Err(ErrorStatus::WrongType)
        );
        assert_eq!(
            Value::Null.check_type(ValueKind::Null),
            Err(ErrorStatus::WrongType)
        );
    }

    #[test]
    fn test_check_length() {
        let s = Value::OctetString(Bytes::from_static(b"abc"));
        assert!(s.check_length(0, 255).is_ok());
        assert_eq!(s.check_length(4, 8), Err(ErrorStatus::WrongLength));
        // Fixed-width kinds pass regardless
        assert!(Value::Integer(5).check_length(0, 0).is_ok());
    }

    #[test]
    fn test_check_range() {
        assert!(Value::Integer(5).check_range(1, 6).is_ok());
        assert_eq!(
            Value::Integer(7).check_range(1, 6),
            Err(ErrorStatus::WrongValue)
        );
        assert_eq!(
            Value::Null.check_range(0, 10),
            Err(ErrorStatus::WrongType)
        );
    }

    #[test]
    fn test_display_exceptions() {
        assert_eq!(Value::NoSuchObject.to_string(), "noSuchObject");
        assert_eq!(Value::EndOfMibView.to_string(), "endOfMibView");
    }

    #[test]
    fn test_forward_encode_matches_reverse() {
        let values = [
            Value::Integer(0x1234_5678),
            Value::Counter32(0x80),
            Value::OctetString(Bytes::from_static(b"fwd")),
            Value::ObjectIdentifier(crate::oid!(1, 3, 6, 1, 4, 1, 8072, 3, 3, 7)),
            Value::OpaqueDouble(1.5),
            Value::Counter64(u64::MAX),
            Value::EndOfMibView,
        ];
        for value in values {
            let mut rev = EncodeBuf::new();
            value.encode(&mut rev);
            let expected = rev.finish();

            let mut storage = [0u8; 64];
            let mut fwd = ForwardWriter::new(&mut storage);
            value.build_forward(&mut fwd).unwrap();
            assert_eq!(fwd.written(), &expected[..], "mismatch for {:?}", value);
        }
    }
}
