//! Variable bindings.
//!
//! A [`VarBind`] pairs an OID with a value. On the request side the agent
//! decodes bindings strictly (a GET carries NULL placeholders); on the
//! response side the agent is the producer of the RFC 3416 exception
//! bindings, so the constructors for `noSuchObject`, `noSuchInstance`, and
//! `endOfMibView` live here next to the wire form.

use crate::ber::tag;
use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use crate::value::Value;

/// One (name, value) binding.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    /// Name of the bound object.
    pub oid: Oid,
    /// Bound value; an exception marker in responses.
    pub value: Value,
}

impl VarBind {
    /// Bind a value to a name.
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// A NULL placeholder binding, as found in read requests.
    pub fn null(oid: Oid) -> Self {
        Self::new(oid, Value::Null)
    }

    /// Answer a GET whose object type is not served at all.
    pub fn no_such_object(oid: Oid) -> Self {
        Self::new(oid, Value::NoSuchObject)
    }

    /// Answer a GET whose object exists but whose instance does not.
    pub fn no_such_instance(oid: Oid) -> Self {
        Self::new(oid, Value::NoSuchInstance)
    }

    /// Answer a GETNEXT that walked past the last served name.
    pub fn end_of_mib_view(oid: Oid) -> Self {
        Self::new(oid, Value::EndOfMibView)
    }

    /// Replace the value, keeping the name.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// True if the value is one of the exception markers.
    pub fn is_exception(&self) -> bool {
        self.value.is_exception()
    }

    /// Encode as `SEQUENCE { name, value }` into the reverse builder.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        // Reverse order: value content first, then the name, then the
        // sequence header once the content length is known.
        let content_start = buf.len();
        self.value.encode(buf);
        buf.push_oid(&self.oid);
        buf.push_length(buf.len() - content_start);
        buf.push_tag(tag::universal::SEQUENCE);
    }

    /// Exact wire size of this binding.
    ///
    /// Used by the GETBULK driver to keep a response under the message
    /// size cap; the binding is rendered into a scratch builder.
    pub fn encoded_size(&self) -> usize {
        let mut scratch = EncodeBuf::with_capacity(64);
        self.encode(&mut scratch);
        scratch.len()
    }

    /// Decode one binding.
    ///
    /// The sequence must contain exactly a name and a value; bindings with
    /// trailing content are rejected rather than silently truncated.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let oid = seq.read_oid()?;
        let value = Value::decode(&mut seq)?;
        if !seq.is_empty() {
            return Err(Error::decode(
                seq.offset(),
                DecodeErrorKind::TrailingData {
                    remaining: seq.remaining(),
                },
            ));
        }
        Ok(Self { oid, value })
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

/// Position of the first exception binding, if any.
///
/// SNMPv1 has no exception values on the wire; the dispatcher turns the
/// first one into a `noSuchName` error at this index instead.
pub fn first_exception(varbinds: &[VarBind]) -> Option<usize> {
    varbinds.iter().position(VarBind::is_exception)
}

/// Encode a binding list as its outer SEQUENCE.
pub fn encode_varbind_list(buf: &mut EncodeBuf, varbinds: &[VarBind]) {
    let content_start = buf.len();
    // Reverse builder: last binding goes in first.
    for vb in varbinds.iter().rev() {
        vb.encode(buf);
    }
    buf.push_length(buf.len() - content_start);
    buf.push_tag(tag::universal::SEQUENCE);
}

/// Decode a binding list, in arrival order.
pub fn decode_varbind_list(decoder: &mut Decoder) -> Result<Vec<VarBind>> {
    let mut seq = decoder.read_sequence()?;
    let mut varbinds = Vec::with_capacity(4);
    while !seq.is_empty() {
        varbinds.push(VarBind::decode(&mut seq)?);
    }
    Ok(varbinds)
}
