//! Notification frames.
//!
//! Inbound traffic from the device is a stream of self-contained frames.
//! Each frame is one private-class constructed TLV whose tag selects the
//! notification kind; the children are context-class primitive records for
//! the individual fields. Decoding never touches the channel - the listener
//! hands a complete frame to [`UwbNotification::parse`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::status::{
    MulticastStatusCode, SessionReasonCode, SessionState, UwbDeviceState, UwbStatusCode,
};
use super::{find_tag, tlv_bytes, tlv_u16, tlv_u32, tlv_u8};
use crate::mac::UwbMacAddress;
use crate::tlv::{TlvBer, TlvError};

// =============================================================================
// Errors
// =============================================================================

/// Errors produced while decoding a notification frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Frame tag {0:#04X?} does not name a notification kind")]
    UnknownFrameTag(Vec<u8>),

    #[error("Missing {0} field")]
    MissingField(&'static str),

    #[error("Invalid {field} field: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Tlv(#[from] TlvError),
}

// =============================================================================
// Frame tags
// =============================================================================

const FRAME_GENERIC_STATUS: u8 = 0xE0;
const FRAME_DEVICE_STATUS: u8 = 0xE1;
const FRAME_SESSION_STATUS: u8 = 0xE2;
const FRAME_MULTICAST_LIST_STATUS: u8 = 0xE3;
const FRAME_RANGING_DATA: u8 = 0xE4;

const TAG_STATUS: u8 = 0x80;
const TAG_DEVICE_STATE: u8 = 0x81;
const TAG_SESSION_ID: u8 = 0x82;
const TAG_SESSION_STATE: u8 = 0x83;
const TAG_REASON: u8 = 0x84;
const TAG_SEQUENCE: u8 = 0x85;
const TAG_RANGING_INTERVAL: u8 = 0x86;
/// Constructed, one per measurement
const TAG_MEASUREMENT: u8 = 0xA7;
const TAG_MAC_ADDRESS: u8 = 0x88;
const TAG_DISTANCE: u8 = 0x89;
const TAG_LINE_OF_SIGHT: u8 = 0x8A;
const TAG_AOA_AZIMUTH: u8 = 0x8B;
const TAG_AOA_ELEVATION: u8 = 0x8C;
/// Constructed, one per controlee result
const TAG_CONTROLEE_STATUS: u8 = 0xAD;
const TAG_MULTICAST_STATUS: u8 = 0x8E;
const TAG_REMAINING_SIZE: u8 = 0x8F;

// =============================================================================
// Typed notifications
// =============================================================================

/// Device-side session state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusNotification {
    pub session_id: u32,
    pub state: SessionState,
    pub reason: SessionReasonCode,
}

/// Per-controlee outcome within a multicast-list update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControleeStatus {
    pub mac_address: UwbMacAddress,
    pub status: MulticastStatusCode,
}

/// Result of a multicast-list update for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastListStatusNotification {
    pub session_id: u32,
    /// Free slots left in the device's multicast list
    pub remaining_list_size: u8,
    pub statuses: Vec<ControleeStatus>,
}

/// One peer measurement within a ranging round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangingMeasurement {
    pub mac_address: UwbMacAddress,
    pub status: UwbStatusCode,
    /// Whether the peer was measured in line of sight
    pub line_of_sight: bool,
    pub distance_cm: u16,
    /// Azimuth angle of arrival in centidegrees
    pub aoa_azimuth_centideg: i16,
    /// Elevation angle of arrival in centidegrees
    pub aoa_elevation_centideg: i16,
}

/// Measurements produced by one ranging round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangingData {
    pub session_id: u32,
    /// Monotonic round sequence number
    pub sequence_number: u32,
    /// Ranging interval in effect, milliseconds
    pub current_ranging_interval_ms: u32,
    pub measurements: Vec<RangingMeasurement>,
}

/// A decoded notification frame
#[derive(Debug, Clone, PartialEq)]
pub enum UwbNotification {
    /// Device-level generic status report
    GenericStatus(UwbStatusCode),
    /// Device operational state change
    DeviceStatus(UwbDeviceState),
    SessionStatus(SessionStatusNotification),
    SessionMulticastListStatus(MulticastListStatusNotification),
    RangingData(RangingData),
}

impl UwbNotification {
    /// Session id embedded in the frame, for session-scoped kinds
    pub fn session_id(&self) -> Option<u32> {
        match self {
            UwbNotification::GenericStatus(_) | UwbNotification::DeviceStatus(_) => None,
            UwbNotification::SessionStatus(n) => Some(n.session_id),
            UwbNotification::SessionMulticastListStatus(n) => Some(n.session_id),
            UwbNotification::RangingData(n) => Some(n.session_id),
        }
    }

    /// Serialize into a frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let (frame_tag, children) = match self {
            UwbNotification::GenericStatus(status) => (
                FRAME_GENERIC_STATUS,
                vec![tlv_u8(TAG_STATUS, status.to_u8())],
            ),
            UwbNotification::DeviceStatus(state) => (
                FRAME_DEVICE_STATUS,
                vec![tlv_u8(TAG_DEVICE_STATE, state.to_u8().unwrap_or(0xFF))],
            ),
            UwbNotification::SessionStatus(n) => (
                FRAME_SESSION_STATUS,
                vec![
                    tlv_u32(TAG_SESSION_ID, n.session_id),
                    tlv_u8(TAG_SESSION_STATE, n.state.to_u8()),
                    tlv_u8(TAG_REASON, n.reason.to_u8()),
                ],
            ),
            UwbNotification::SessionMulticastListStatus(n) => {
                let mut children = vec![
                    tlv_u32(TAG_SESSION_ID, n.session_id),
                    tlv_u8(TAG_REMAINING_SIZE, n.remaining_list_size),
                ];
                for entry in &n.statuses {
                    children.push(nested(
                        TAG_CONTROLEE_STATUS,
                        &[
                            tlv_bytes(TAG_MAC_ADDRESS, entry.mac_address.as_bytes()),
                            tlv_u8(TAG_MULTICAST_STATUS, entry.status.to_u8()),
                        ],
                    ));
                }
                (FRAME_MULTICAST_LIST_STATUS, children)
            }
            UwbNotification::RangingData(n) => {
                let mut children = vec![
                    tlv_u32(TAG_SESSION_ID, n.session_id),
                    tlv_u32(TAG_SEQUENCE, n.sequence_number),
                    tlv_u32(TAG_RANGING_INTERVAL, n.current_ranging_interval_ms),
                ];
                for m in &n.measurements {
                    children.push(nested(
                        TAG_MEASUREMENT,
                        &[
                            tlv_bytes(TAG_MAC_ADDRESS, m.mac_address.as_bytes()),
                            tlv_u8(TAG_STATUS, m.status.to_u8()),
                            tlv_u8(TAG_LINE_OF_SIGHT, u8::from(m.line_of_sight)),
                            tlv_u16(TAG_DISTANCE, m.distance_cm),
                            tlv_u16(TAG_AOA_AZIMUTH, m.aoa_azimuth_centideg as u16),
                            tlv_u16(TAG_AOA_ELEVATION, m.aoa_elevation_centideg as u16),
                        ],
                    ));
                }
                (FRAME_RANGING_DATA, children)
            }
        };

        let mut value = Vec::new();
        for child in &children {
            value.extend_from_slice(&child.to_bytes());
        }
        TlvBer {
            tag: vec![frame_tag],
            value,
        }
        .to_bytes()
    }

    /// Decode a complete frame
    pub fn parse(frame: &[u8]) -> Result<UwbNotification, NotificationError> {
        let (record, _) = TlvBer::parse(frame)?;
        let children = record.children()?;
        match record.tag.as_slice() {
            [FRAME_GENERIC_STATUS] => Ok(UwbNotification::GenericStatus(UwbStatusCode::from_u8(
                field_u8(&children, TAG_STATUS, "status")?,
            ))),
            [FRAME_DEVICE_STATUS] => {
                let code = field_u8(&children, TAG_DEVICE_STATE, "device state")?;
                let state =
                    UwbDeviceState::from_u8(code).ok_or(NotificationError::InvalidField {
                        field: "device state",
                        reason: "unknown device state code",
                    })?;
                Ok(UwbNotification::DeviceStatus(state))
            }
            [FRAME_SESSION_STATUS] => {
                let state_code = field_u8(&children, TAG_SESSION_STATE, "session state")?;
                Ok(UwbNotification::SessionStatus(SessionStatusNotification {
                    session_id: field_u32(&children, TAG_SESSION_ID, "session id")?,
                    state: SessionState::from_u8(state_code).ok_or(
                        NotificationError::InvalidField {
                            field: "session state",
                            reason: "unknown session state code",
                        },
                    )?,
                    reason: SessionReasonCode::from_u8(field_u8(&children, TAG_REASON, "reason")?),
                }))
            }
            [FRAME_MULTICAST_LIST_STATUS] => {
                let mut statuses = Vec::new();
                for entry in children
                    .iter()
                    .filter(|r| r.tag.as_slice() == [TAG_CONTROLEE_STATUS])
                {
                    let fields = entry.children()?;
                    statuses.push(ControleeStatus {
                        mac_address: field_mac(&fields, TAG_MAC_ADDRESS)?,
                        status: MulticastStatusCode::from_u8(field_u8(
                            &fields,
                            TAG_MULTICAST_STATUS,
                            "multicast status",
                        )?),
                    });
                }
                Ok(UwbNotification::SessionMulticastListStatus(
                    MulticastListStatusNotification {
                        session_id: field_u32(&children, TAG_SESSION_ID, "session id")?,
                        remaining_list_size: field_u8(
                            &children,
                            TAG_REMAINING_SIZE,
                            "remaining list size",
                        )?,
                        statuses,
                    },
                ))
            }
            [FRAME_RANGING_DATA] => {
                let mut measurements = Vec::new();
                for entry in children
                    .iter()
                    .filter(|r| r.tag.as_slice() == [TAG_MEASUREMENT])
                {
                    let fields = entry.children()?;
                    measurements.push(RangingMeasurement {
                        mac_address: field_mac(&fields, TAG_MAC_ADDRESS)?,
                        status: UwbStatusCode::from_u8(field_u8(&fields, TAG_STATUS, "status")?),
                        line_of_sight: field_u8(&fields, TAG_LINE_OF_SIGHT, "line of sight")? != 0,
                        distance_cm: field_u16(&fields, TAG_DISTANCE, "distance")?,
                        aoa_azimuth_centideg: field_u16(&fields, TAG_AOA_AZIMUTH, "AoA azimuth")?
                            as i16,
                        aoa_elevation_centideg: field_u16(
                            &fields,
                            TAG_AOA_ELEVATION,
                            "AoA elevation",
                        )? as i16,
                    });
                }
                Ok(UwbNotification::RangingData(RangingData {
                    session_id: field_u32(&children, TAG_SESSION_ID, "session id")?,
                    sequence_number: field_u32(&children, TAG_SEQUENCE, "sequence")?,
                    current_ranging_interval_ms: field_u32(
                        &children,
                        TAG_RANGING_INTERVAL,
                        "ranging interval",
                    )?,
                    measurements,
                }))
            }
            other => Err(NotificationError::UnknownFrameTag(other.to_vec())),
        }
    }
}

fn nested(tag: u8, children: &[TlvBer]) -> TlvBer {
    let mut value = Vec::new();
    for child in children {
        value.extend_from_slice(&child.to_bytes());
    }
    TlvBer {
        tag: vec![tag],
        value,
    }
}

fn field<'a>(
    records: &'a [TlvBer],
    tag: u8,
    name: &'static str,
) -> Result<&'a TlvBer, NotificationError> {
    find_tag(records, tag).ok_or(NotificationError::MissingField(name))
}

fn field_u8(records: &[TlvBer], tag: u8, name: &'static str) -> Result<u8, NotificationError> {
    match field(records, tag, name)?.value.as_slice() {
        [v] => Ok(*v),
        _ => Err(NotificationError::InvalidField {
            field: name,
            reason: "expected one byte",
        }),
    }
}

fn field_u16(records: &[TlvBer], tag: u8, name: &'static str) -> Result<u16, NotificationError> {
    match field(records, tag, name)?.value.as_slice() {
        [a, b] => Ok(u16::from_le_bytes([*a, *b])),
        _ => Err(NotificationError::InvalidField {
            field: name,
            reason: "expected two bytes",
        }),
    }
}

fn field_u32(records: &[TlvBer], tag: u8, name: &'static str) -> Result<u32, NotificationError> {
    match field(records, tag, name)?.value.as_slice() {
        [a, b, c, d] => Ok(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => Err(NotificationError::InvalidField {
            field: name,
            reason: "expected four bytes",
        }),
    }
}

fn field_mac(records: &[TlvBer], tag: u8) -> Result<UwbMacAddress, NotificationError> {
    let record = field(records, tag, "mac address")?;
    UwbMacAddress::from_bytes(&record.value).ok_or(NotificationError::InvalidField {
        field: "mac address",
        reason: "address must be 2 or 8 bytes",
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_status_roundtrip() {
        let n = UwbNotification::GenericStatus(UwbStatusCode::CommandRetry);
        assert_eq!(UwbNotification::parse(&n.to_bytes()).unwrap(), n);
        assert_eq!(n.session_id(), None);
    }

    #[test]
    fn test_device_status_roundtrip() {
        let n = UwbNotification::DeviceStatus(UwbDeviceState::Active);
        assert_eq!(UwbNotification::parse(&n.to_bytes()).unwrap(), n);
    }

    #[test]
    fn test_session_status_roundtrip() {
        let n = UwbNotification::SessionStatus(SessionStatusNotification {
            session_id: 0x0102_0304,
            state: SessionState::Active,
            reason: SessionReasonCode::StateChangeWithSessionManagementCommands,
        });
        assert_eq!(UwbNotification::parse(&n.to_bytes()).unwrap(), n);
        assert_eq!(n.session_id(), Some(0x0102_0304));
    }

    #[test]
    fn test_multicast_list_status_roundtrip() {
        let n = UwbNotification::SessionMulticastListStatus(MulticastListStatusNotification {
            session_id: 9,
            remaining_list_size: 6,
            statuses: vec![
                ControleeStatus {
                    mac_address: UwbMacAddress::short([0xAA, 0xBB]),
                    status: MulticastStatusCode::OkUpdate,
                },
                ControleeStatus {
                    mac_address: UwbMacAddress::short([0xCC, 0xDD]),
                    status: MulticastStatusCode::ListFull,
                },
            ],
        });
        assert_eq!(UwbNotification::parse(&n.to_bytes()).unwrap(), n);
    }

    #[test]
    fn test_ranging_data_roundtrip() {
        let n = UwbNotification::RangingData(RangingData {
            session_id: 7,
            sequence_number: 41,
            current_ranging_interval_ms: 200,
            measurements: vec![RangingMeasurement {
                mac_address: UwbMacAddress::short([0x10, 0x20]),
                status: UwbStatusCode::Ok,
                line_of_sight: true,
                distance_cm: 143,
                aoa_azimuth_centideg: -1250,
                aoa_elevation_centideg: 300,
            }],
        });
        assert_eq!(UwbNotification::parse(&n.to_bytes()).unwrap(), n);
    }

    #[test]
    fn test_unknown_frame_tag_rejected() {
        let frame = TlvBer {
            tag: vec![0xEF],
            value: vec![],
        }
        .to_bytes();
        assert!(matches!(
            UwbNotification::parse(&frame),
            Err(NotificationError::UnknownFrameTag(_))
        ));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let n = UwbNotification::DeviceStatus(UwbDeviceState::Ready);
        let bytes = n.to_bytes();
        assert!(UwbNotification::parse(&bytes[..bytes.len() - 1]).is_err());
    }
}
