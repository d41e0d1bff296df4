//! FiRa protocol types and wire formats.
//!
//! Everything the device understands: status codes and states, the
//! application-configuration parameter catalog with its marshaling rules,
//! control request/response framing, notification frames, and the
//! capability/device-information records.
//!
//! All framing in this module is BER-TLV built on [`crate::tlv`]. Control
//! payload fields use context-class primitive tags; notification frames use
//! private-class constructed top-level tags. Multi-octet integers are
//! little-endian.

pub mod capability;
pub mod command;
pub mod notification;
pub mod params;
pub mod status;

use crate::tlv::TlvBer;

// =============================================================================
// Shared wire helpers
// =============================================================================

pub(crate) fn tlv_u8(tag: u8, value: u8) -> TlvBer {
    TlvBer {
        tag: vec![tag],
        value: vec![value],
    }
}

pub(crate) fn tlv_u16(tag: u8, value: u16) -> TlvBer {
    TlvBer {
        tag: vec![tag],
        value: value.to_le_bytes().to_vec(),
    }
}

pub(crate) fn tlv_u32(tag: u8, value: u32) -> TlvBer {
    TlvBer {
        tag: vec![tag],
        value: value.to_le_bytes().to_vec(),
    }
}

pub(crate) fn tlv_bytes(tag: u8, value: &[u8]) -> TlvBer {
    TlvBer {
        tag: vec![tag],
        value: value.to_vec(),
    }
}

/// First record carrying `tag`, if any
pub(crate) fn find_tag<'a>(records: &'a [TlvBer], tag: u8) -> Option<&'a TlvBer> {
    records.iter().find(|r| r.tag.as_slice() == [tag])
}

pub(crate) fn read_u8(record: &TlvBer, field: &'static str) -> Result<u8, command::CommandError> {
    match record.value.as_slice() {
        [value] => Ok(*value),
        _ => Err(command::CommandError::InvalidField {
            field,
            reason: "expected one byte",
        }),
    }
}

pub(crate) fn read_u16(record: &TlvBer, field: &'static str) -> Result<u16, command::CommandError> {
    match record.value.as_slice() {
        [a, b] => Ok(u16::from_le_bytes([*a, *b])),
        _ => Err(command::CommandError::InvalidField {
            field,
            reason: "expected two bytes",
        }),
    }
}

pub(crate) fn read_u32(record: &TlvBer, field: &'static str) -> Result<u32, command::CommandError> {
    match record.value.as_slice() {
        [a, b, c, d] => Ok(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => Err(command::CommandError::InvalidField {
            field,
            reason: "expected four bytes",
        }),
    }
}
