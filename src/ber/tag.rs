//! BER tag definitions for SNMP.
//!
//! Tag encoding follows X.690 Section 8.1.2:
//! - Bits 7-6: Class (00=Universal, 01=Application, 10=Context-specific, 11=Private)
//! - Bit 5: Primitive (0) or Constructed (1)
//! - Bits 4-0: Tag number (0-30, or 31 for long form)

/// Tag class bits (bits 7-6)
pub mod class {
    /// Universal class (bits 7-6 = 00).
    pub const UNIVERSAL: u8 = 0x00;
    /// Application class (bits 7-6 = 01).
    pub const APPLICATION: u8 = 0x40;
    /// Context-specific class (bits 7-6 = 10).
    pub const CONTEXT_SPECIFIC: u8 = 0x80;
    /// Private class (bits 7-6 = 11).
    pub const PRIVATE: u8 = 0xC0;
}

/// Constructed bit (bit 5)
pub const CONSTRUCTED: u8 = 0x20;

/// Long-form tag marker: all five low bits set, number continues in
/// subsequent 7-bit octets.
pub const EXTENSION_ID: u8 = 0x1F;

/// Universal tags (class bits 00)
pub mod universal {
    /// Boolean type (tag 0x01).
    pub const BOOLEAN: u8 = 0x01;
    /// Integer type (tag 0x02).
    pub const INTEGER: u8 = 0x02;
    /// Bit string type (tag 0x03).
    pub const BIT_STRING: u8 = 0x03;
    /// Octet string type (tag 0x04).
    pub const OCTET_STRING: u8 = 0x04;
    /// Constructed OCTET STRING (0x24) - not supported, should be rejected.
    pub const OCTET_STRING_CONSTRUCTED: u8 = 0x24;
    /// Null type (tag 0x05).
    pub const NULL: u8 = 0x05;
    /// Object identifier type (tag 0x06).
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    /// Sequence type, constructed (tag 0x30).
    pub const SEQUENCE: u8 = 0x30;
}

/// Application tags (class bits 01) - SNMP-specific types
pub mod application {
    /// IP address type (tag 0x40).
    pub const IP_ADDRESS: u8 = 0x40;
    /// 32-bit counter type (tag 0x41).
    pub const COUNTER32: u8 = 0x41;
    /// 32-bit gauge type, also known as Unsigned32 (tag 0x42).
    pub const GAUGE32: u8 = 0x42;
    /// Time ticks type in hundredths of a second (tag 0x43).
    pub const TIMETICKS: u8 = 0x43;
    /// Opaque type for arbitrary ASN.1 data (tag 0x44).
    pub const OPAQUE: u8 = 0x44;
    /// 64-bit counter type (tag 0x46).
    pub const COUNTER64: u8 = 0x46;
    /// Float inside an opaque envelope (tag 0x48).
    pub const FLOAT: u8 = 0x48;
    /// Double inside an opaque envelope (tag 0x49).
    pub const DOUBLE: u8 = 0x49;
    /// Signed 64-bit integer inside an opaque envelope (tag 0x4A).
    pub const INTEGER64: u8 = 0x4A;
    /// Unsigned 64-bit integer inside an opaque envelope (tag 0x4B).
    pub const UNSIGNED64: u8 = 0x4B;
}

/// Opaque envelope tags.
///
/// Historical double-tagging for typed values smuggled through an Opaque
/// octet string: the contents begin with `TAG1` (context class, long-form
/// marker) followed by `TAG2 + application tag` as the continuation octet,
/// then the inner value bytes.
pub mod opaque {
    use super::EXTENSION_ID;
    use super::application;
    use super::class::CONTEXT_SPECIFIC;

    /// First envelope octet (0x9F).
    pub const TAG1: u8 = CONTEXT_SPECIFIC | EXTENSION_ID;
    /// Base for the second envelope octet.
    pub const TAG2: u8 = 0x30;
    /// Second octet for a wrapped Counter64 (0x76).
    pub const COUNTER64: u8 = TAG2 + application::COUNTER64;
    /// Second octet for a wrapped float (0x78).
    pub const FLOAT: u8 = TAG2 + application::FLOAT;
    /// Second octet for a wrapped double (0x79).
    pub const DOUBLE: u8 = TAG2 + application::DOUBLE;
    /// Second octet for a wrapped Integer64 (0x7A).
    pub const INTEGER64: u8 = TAG2 + application::INTEGER64;
    /// Second octet for a wrapped Unsigned64 (0x7B).
    pub const UNSIGNED64: u8 = TAG2 + application::UNSIGNED64;

    /// Wrapped float content length: tag pair, inner length, 4 value bytes.
    pub const FLOAT_LEN: usize = 7;
    /// Wrapped double content length: tag pair, inner length, 8 value bytes.
    pub const DOUBLE_LEN: usize = 11;
}

/// Context-specific tags (class bits 10) - Exception values
pub mod context {
    /// No such object exception (tag 0x80).
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    /// No such instance exception (tag 0x81).
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    /// End of MIB view exception (tag 0x82).
    pub const END_OF_MIB_VIEW: u8 = 0x82;
}

/// PDU tags (context-specific, constructed)
pub mod pdu {
    use super::CONSTRUCTED;
    use super::class::CONTEXT_SPECIFIC;

    /// GET request PDU tag (0xA0).
    pub const GET_REQUEST: u8 = CONTEXT_SPECIFIC | CONSTRUCTED;
    /// GET-NEXT request PDU tag (0xA1).
    pub const GET_NEXT_REQUEST: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x01;
    /// Response PDU tag (0xA2).
    pub const RESPONSE: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x02;
    /// SET request PDU tag (0xA3).
    pub const SET_REQUEST: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x03;
    /// SNMPv1 trap PDU tag (0xA4).
    pub const TRAP_V1: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x04;
    /// GET-BULK request PDU tag (0xA5).
    pub const GET_BULK_REQUEST: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x05;
    /// INFORM request PDU tag (0xA6).
    pub const INFORM_REQUEST: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x06;
    /// SNMPv2c trap PDU tag (0xA7).
    pub const TRAP_V2: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x07;
    /// Report PDU tag (0xA8).
    pub const REPORT: u8 = CONTEXT_SPECIFIC | CONSTRUCTED | 0x08;
}

/// Check if a tag indicates a constructed type
#[inline]
pub const fn is_constructed(tag: u8) -> bool {
    tag & CONSTRUCTED != 0
}

/// Get the class of a tag
#[inline]
pub const fn tag_class(tag: u8) -> u8 {
    tag & 0xC0
}

/// Get the tag number (bits 4-0)
#[inline]
pub const fn tag_number(tag: u8) -> u8 {
    tag & 0x1F
}

/// Check if the identifier octet starts a long-form (multi-octet) tag
#[inline]
pub const fn is_extension_id(tag: u8) -> bool {
    tag & EXTENSION_ID == EXTENSION_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_envelope_values() {
        assert_eq!(opaque::TAG1, 0x9F);
        assert_eq!(opaque::COUNTER64, 0x76);
        assert_eq!(opaque::FLOAT, 0x78);
        assert_eq!(opaque::DOUBLE, 0x79);
        assert_eq!(opaque::INTEGER64, 0x7A);
        assert_eq!(opaque::UNSIGNED64, 0x7B);
    }

    #[test]
    fn test_tag_predicates() {
        assert!(is_constructed(universal::SEQUENCE));
        assert!(!is_constructed(universal::INTEGER));
        assert_eq!(tag_class(application::COUNTER32), class::APPLICATION);
        assert!(is_extension_id(opaque::TAG1));
        assert!(!is_extension_id(universal::OCTET_STRING));
    }
}
