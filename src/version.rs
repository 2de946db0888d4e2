//! SNMP protocol versions.

use crate::error::{DecodeErrorKind, Error, Result};

/// SNMP protocol version.
///
/// The agent serves v1 and v2c community-based messages. The wire value is
/// the version INTEGER from the outer message sequence (0 for v1, 1 for v2c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// SNMPv1 (RFC 1157).
    V1,
    /// SNMPv2c (RFC 3416 operations, community security).
    V2c,
}

impl Version {
    /// Parse from the wire value.
    pub fn from_wire(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::V1),
            1 => Ok(Self::V2c),
            other => Err(Error::decode(0, DecodeErrorKind::UnknownVersion(other))),
        }
    }

    /// The wire value.
    pub fn as_wire(&self) -> i32 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2c => write!(f, "v2c"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        assert_eq!(Version::from_wire(0).unwrap(), Version::V1);
        assert_eq!(Version::from_wire(1).unwrap(), Version::V2c);
        assert_eq!(Version::V1.as_wire(), 0);
        assert_eq!(Version::V2c.as_wire(), 1);
        assert!(Version::from_wire(3).is_err());
    }
}
