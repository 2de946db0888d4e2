//! PDU and message framing.
//!
//! A community-based message is `SEQUENCE { version, community, PDU }`,
//! where the PDU is a context-constructed TLV carrying request id, error
//! status, error index, and the variable bindings. For GETBULK requests the
//! error-status and error-index slots carry non-repeaters and
//! max-repetitions instead.

use bytes::Bytes;

use crate::ber::tag;
use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};
use crate::version::Version;

/// On-the-wire PDU types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduType {
    /// GET request (0xA0).
    Get,
    /// GETNEXT request (0xA1).
    GetNext,
    /// Response (0xA2).
    Response,
    /// SET request (0xA3).
    Set,
    /// SNMPv1 trap (0xA4).
    TrapV1,
    /// GETBULK request (0xA5).
    GetBulk,
    /// INFORM request (0xA6).
    Inform,
    /// SNMPv2c trap (0xA7).
    TrapV2,
    /// Report (0xA8).
    Report,
}

impl PduType {
    /// Parse from the BER identifier octet.
    pub fn from_tag(value: u8) -> Result<Self> {
        match value {
            tag::pdu::GET_REQUEST => Ok(Self::Get),
            tag::pdu::GET_NEXT_REQUEST => Ok(Self::GetNext),
            tag::pdu::RESPONSE => Ok(Self::Response),
            tag::pdu::SET_REQUEST => Ok(Self::Set),
            tag::pdu::TRAP_V1 => Ok(Self::TrapV1),
            tag::pdu::GET_BULK_REQUEST => Ok(Self::GetBulk),
            tag::pdu::INFORM_REQUEST => Ok(Self::Inform),
            tag::pdu::TRAP_V2 => Ok(Self::TrapV2),
            tag::pdu::REPORT => Ok(Self::Report),
            other => Err(Error::decode(0, DecodeErrorKind::UnknownPduType(other))),
        }
    }

    /// The BER identifier octet.
    pub fn as_tag(&self) -> u8 {
        match self {
            Self::Get => tag::pdu::GET_REQUEST,
            Self::GetNext => tag::pdu::GET_NEXT_REQUEST,
            Self::Response => tag::pdu::RESPONSE,
            Self::Set => tag::pdu::SET_REQUEST,
            Self::TrapV1 => tag::pdu::TRAP_V1,
            Self::GetBulk => tag::pdu::GET_BULK_REQUEST,
            Self::Inform => tag::pdu::INFORM_REQUEST,
            Self::TrapV2 => tag::pdu::TRAP_V2,
            Self::Report => tag::pdu::REPORT,
        }
    }

    /// True for the request types an agent serves.
    pub fn is_agent_request(&self) -> bool {
        matches!(self, Self::Get | Self::GetNext | Self::GetBulk | Self::Set)
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::GetNext => "GETNEXT",
            Self::Response => "RESPONSE",
            Self::Set => "SET",
            Self::TrapV1 => "TRAPv1",
            Self::GetBulk => "GETBULK",
            Self::Inform => "INFORM",
            Self::TrapV2 => "TRAPv2",
            Self::Report => "REPORT",
        };
        write!(f, "{}", name)
    }
}

/// A protocol data unit.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// PDU type tag.
    pub pdu_type: PduType,
    /// Request identifier, echoed in the response.
    pub request_id: i32,
    /// Error status (or non-repeaters for GETBULK).
    pub error_status: i32,
    /// Error index, 1-based (or max-repetitions for GETBULK).
    pub error_index: i32,
    /// Variable bindings in arrival order.
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Create a request PDU with zeroed error fields.
    pub fn request(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Create a GETBULK request.
    pub fn get_bulk(
        request_id: i32,
        non_repeaters: i32,
        max_repetitions: i32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::GetBulk,
            request_id,
            error_status: non_repeaters,
            error_index: max_repetitions,
            varbinds,
        }
    }

    /// Create a response carrying the given varbinds and no error.
    pub fn response(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Create an error response. Per RFC 3416 the request varbinds are
    /// returned unchanged.
    pub fn error_response(
        request_id: i32,
        status: ErrorStatus,
        index: i32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status: status.as_i32(),
            error_index: index,
            varbinds,
        }
    }

    /// GETBULK non-repeaters count (clamped at zero).
    pub fn non_repeaters(&self) -> usize {
        self.error_status.max(0) as usize
    }

    /// GETBULK max-repetitions count (clamped at zero).
    pub fn max_repetitions(&self) -> usize {
        self.error_index.max(0) as usize
    }

    /// The error status as a typed value.
    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// Encode this PDU (context-constructed TLV).
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.as_tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    /// Decode a PDU from its identifier octet onward.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let pdu_tag = decoder.peek_tag()?;
        let pdu_type = PduType::from_tag(pdu_tag)?;
        let mut body = decoder.read_constructed(pdu_tag)?;
        let request_id = body.read_integer()?;
        let error_status = body.read_integer()?;
        let error_index = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;
        Ok(Self {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

/// A community-based message frame.
#[derive(Debug, Clone)]
pub struct Message {
    /// Protocol version from the outer sequence.
    pub version: Version,
    /// Community string (security parameters for v1/v2c).
    pub community: Bytes,
    /// The enclosed PDU.
    pub pdu: Pdu,
}

impl Message {
    /// Create a message.
    pub fn new(version: Version, community: Bytes, pdu: Pdu) -> Self {
        Self {
            version,
            community,
            pdu,
        }
    }

    /// Encode the full message frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_wire());
        });
        buf.finish()
    }

    /// Decode a message frame from raw bytes.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;
        let version = Version::from_wire(seq.read_integer()?)?;
        let community = seq.read_octet_string()?;
        if seq.is_empty() {
            return Err(Error::decode(seq.offset(), DecodeErrorKind::MissingPdu));
        }
        let pdu = Pdu::decode(&mut seq)?;
        Ok(Self {
            version,
            community,
            pdu,
        })
    }
}
