//! Control request and response framing.
//!
//! Every control operation crossing the channel boundary is identified by a
//! [`ControlOp`] and carries a BER-TLV payload. This module provides the
//! `format_*` / `parse_*` pairs for both directions: the connector formats
//! requests and parses responses; a driver back-end (such as the simulator)
//! parses requests and formats responses.
//!
//! Responses always lead with a status record. Operation-specific records
//! follow only when the status is `Ok`.

use thiserror::Error;

use super::capability::{UwbCapability, UwbDeviceInformation};
use super::params::{
    decode_parameters, encode_parameters, AppConfigParameter, AppConfigParameterType, ParamError,
    ParameterStatus,
};
use super::status::{MulticastAction, SessionState, SessionType, UwbStatusCode};
use super::{find_tag, read_u32, read_u8, tlv_bytes, tlv_u32, tlv_u8};
use crate::mac::UwbMacAddress;
use crate::tlv::{TlvBer, TlvError};

// =============================================================================
// Errors
// =============================================================================

/// Errors produced while framing or un-framing control payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown control opcode {0:#04X}")]
    UnknownOpcode(u8),

    #[error("Missing {0} field")]
    MissingField(&'static str),

    #[error("Invalid {field} field: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error(transparent)]
    Tlv(#[from] TlvError),

    #[error(transparent)]
    Param(#[from] ParamError),
}

// =============================================================================
// Opcodes
// =============================================================================

/// Control operations exposed by the driver channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    Reset,
    GetDeviceInformation,
    GetCapabilities,
    GetSessionCount,
    SessionInitialize,
    SessionDeinitialize,
    SessionGetState,
    SessionGetRangingCount,
    SessionUpdateControllerMulticastList,
    SetApplicationConfigurationParameters,
    GetApplicationConfigurationParameters,
    SessionRangingStart,
    SessionRangingStop,
}

impl ControlOp {
    pub fn code(self) -> u8 {
        match self {
            ControlOp::Reset => 0x00,
            ControlOp::GetDeviceInformation => 0x01,
            ControlOp::GetCapabilities => 0x02,
            ControlOp::GetSessionCount => 0x03,
            ControlOp::SessionInitialize => 0x10,
            ControlOp::SessionDeinitialize => 0x11,
            ControlOp::SessionGetState => 0x12,
            ControlOp::SessionGetRangingCount => 0x13,
            ControlOp::SessionUpdateControllerMulticastList => 0x14,
            ControlOp::SetApplicationConfigurationParameters => 0x15,
            ControlOp::GetApplicationConfigurationParameters => 0x16,
            ControlOp::SessionRangingStart => 0x20,
            ControlOp::SessionRangingStop => 0x21,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CommandError> {
        match code {
            0x00 => Ok(ControlOp::Reset),
            0x01 => Ok(ControlOp::GetDeviceInformation),
            0x02 => Ok(ControlOp::GetCapabilities),
            0x03 => Ok(ControlOp::GetSessionCount),
            0x10 => Ok(ControlOp::SessionInitialize),
            0x11 => Ok(ControlOp::SessionDeinitialize),
            0x12 => Ok(ControlOp::SessionGetState),
            0x13 => Ok(ControlOp::SessionGetRangingCount),
            0x14 => Ok(ControlOp::SessionUpdateControllerMulticastList),
            0x15 => Ok(ControlOp::SetApplicationConfigurationParameters),
            0x16 => Ok(ControlOp::GetApplicationConfigurationParameters),
            0x20 => Ok(ControlOp::SessionRangingStart),
            0x21 => Ok(ControlOp::SessionRangingStop),
            other => Err(CommandError::UnknownOpcode(other)),
        }
    }
}

// =============================================================================
// Field tags (context-class primitive, except where noted)
// =============================================================================

const TAG_SESSION_ID: u8 = 0x80;
const TAG_SESSION_TYPE: u8 = 0x81;
const TAG_ACTION: u8 = 0x82;
const TAG_CONTROLEE: u8 = 0x83;
const TAG_STATUS: u8 = 0x84;
const TAG_SESSION_STATE: u8 = 0x85;
const TAG_RANGING_COUNT: u8 = 0x86;
const TAG_SESSION_COUNT: u8 = 0x87;
const TAG_PARAM_TYPE: u8 = 0x88;
/// Constructed wrapper around a batch of parameter records
const TAG_PARAMETER_SET: u8 = 0xA0;
/// Constructed pair of parameter type + status
const TAG_PARAM_STATUS: u8 = 0xA1;

fn serialize(records: &[TlvBer]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        out.extend_from_slice(&record.to_bytes());
    }
    out
}

fn wrap_constructed(tag: u8, children: &[TlvBer]) -> TlvBer {
    TlvBer {
        tag: vec![tag],
        value: serialize(children),
    }
}

fn require<'a>(records: &'a [TlvBer], tag: u8, field: &'static str) -> Result<&'a TlvBer, CommandError> {
    find_tag(records, tag).ok_or(CommandError::MissingField(field))
}

fn session_id_record(records: &[TlvBer]) -> Result<u32, CommandError> {
    read_u32(require(records, TAG_SESSION_ID, "session id")?, "session id")
}

// =============================================================================
// Request framing
// =============================================================================

/// Payload for operations that carry only a session id
pub fn format_session_id_request(session_id: u32) -> Vec<u8> {
    serialize(&[tlv_u32(TAG_SESSION_ID, session_id)])
}

pub fn parse_session_id_request(payload: &[u8]) -> Result<u32, CommandError> {
    let records = TlvBer::parse_all(payload)?;
    session_id_record(&records)
}

pub fn format_session_initialize_request(session_id: u32, session_type: SessionType) -> Vec<u8> {
    serialize(&[
        tlv_u32(TAG_SESSION_ID, session_id),
        tlv_u8(TAG_SESSION_TYPE, session_type.to_u8()),
    ])
}

pub fn parse_session_initialize_request(
    payload: &[u8],
) -> Result<(u32, SessionType), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let session_id = session_id_record(&records)?;
    let type_code = read_u8(
        require(&records, TAG_SESSION_TYPE, "session type")?,
        "session type",
    )?;
    let session_type = SessionType::from_u8(type_code).ok_or(CommandError::InvalidField {
        field: "session type",
        reason: "unknown session type code",
    })?;
    Ok((session_id, session_type))
}

pub fn format_multicast_update_request(
    session_id: u32,
    action: MulticastAction,
    controlees: &[UwbMacAddress],
) -> Vec<u8> {
    let mut records = vec![
        tlv_u32(TAG_SESSION_ID, session_id),
        tlv_u8(TAG_ACTION, action.to_u8()),
    ];
    for controlee in controlees {
        records.push(tlv_bytes(TAG_CONTROLEE, controlee.as_bytes()));
    }
    serialize(&records)
}

pub fn parse_multicast_update_request(
    payload: &[u8],
) -> Result<(u32, MulticastAction, Vec<UwbMacAddress>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let session_id = session_id_record(&records)?;
    let action_code = read_u8(require(&records, TAG_ACTION, "action")?, "action")?;
    let action = MulticastAction::from_u8(action_code).ok_or(CommandError::InvalidField {
        field: "action",
        reason: "unknown multicast action code",
    })?;

    let mut controlees = Vec::new();
    for record in records.iter().filter(|r| r.tag.as_slice() == [TAG_CONTROLEE]) {
        let address =
            UwbMacAddress::from_bytes(&record.value).ok_or(CommandError::InvalidField {
                field: "controlee",
                reason: "address must be 2 or 8 bytes",
            })?;
        controlees.push(address);
    }
    Ok((session_id, action, controlees))
}

pub fn format_set_app_config_request(session_id: u32, params: &[AppConfigParameter]) -> Vec<u8> {
    serialize(&[
        tlv_u32(TAG_SESSION_ID, session_id),
        tlv_bytes(TAG_PARAMETER_SET, &encode_parameters(params)),
    ])
}

pub fn parse_set_app_config_request(
    payload: &[u8],
) -> Result<(u32, Vec<AppConfigParameter>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let session_id = session_id_record(&records)?;
    let set = require(&records, TAG_PARAMETER_SET, "parameter set")?;
    Ok((session_id, decode_parameters(&set.value)?))
}

pub fn format_get_app_config_request(
    session_id: u32,
    types: &[AppConfigParameterType],
) -> Vec<u8> {
    let mut records = vec![tlv_u32(TAG_SESSION_ID, session_id)];
    for parameter_type in types {
        records.push(tlv_u8(TAG_PARAM_TYPE, parameter_type.code()));
    }
    serialize(&records)
}

pub fn parse_get_app_config_request(
    payload: &[u8],
) -> Result<(u32, Vec<AppConfigParameterType>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let session_id = session_id_record(&records)?;
    let mut types = Vec::new();
    for record in records.iter().filter(|r| r.tag.as_slice() == [TAG_PARAM_TYPE]) {
        let code = read_u8(record, "parameter type")?;
        types.push(AppConfigParameterType::from_code(code).ok_or(ParamError::UnknownType(code))?);
    }
    Ok((session_id, types))
}

// =============================================================================
// Response framing
// =============================================================================

/// Response carrying only a status
pub fn format_status_response(status: UwbStatusCode) -> Vec<u8> {
    serialize(&[tlv_u8(TAG_STATUS, status.to_u8())])
}

pub fn parse_status_response(payload: &[u8]) -> Result<UwbStatusCode, CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = read_u8(require(&records, TAG_STATUS, "status")?, "status")?;
    Ok(UwbStatusCode::from_u8(status))
}

pub fn format_session_state_response(
    status: UwbStatusCode,
    state: Option<SessionState>,
) -> Vec<u8> {
    let mut records = vec![tlv_u8(TAG_STATUS, status.to_u8())];
    if let Some(state) = state {
        records.push(tlv_u8(TAG_SESSION_STATE, state.to_u8()));
    }
    serialize(&records)
}

pub fn parse_session_state_response(
    payload: &[u8],
) -> Result<(UwbStatusCode, Option<SessionState>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);
    let state = match find_tag(&records, TAG_SESSION_STATE) {
        Some(record) => Some(
            SessionState::from_u8(read_u8(record, "session state")?).ok_or(
                CommandError::InvalidField {
                    field: "session state",
                    reason: "unknown session state code",
                },
            )?,
        ),
        None => None,
    };
    Ok((status, state))
}

pub fn format_session_count_response(status: UwbStatusCode, count: u32) -> Vec<u8> {
    serialize(&[
        tlv_u8(TAG_STATUS, status.to_u8()),
        tlv_u32(TAG_SESSION_COUNT, count),
    ])
}

pub fn parse_session_count_response(payload: &[u8]) -> Result<(UwbStatusCode, u32), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);
    let count = match find_tag(&records, TAG_SESSION_COUNT) {
        Some(record) => read_u32(record, "session count")?,
        None => 0,
    };
    Ok((status, count))
}

pub fn format_ranging_count_response(status: UwbStatusCode, count: Option<u32>) -> Vec<u8> {
    let mut records = vec![tlv_u8(TAG_STATUS, status.to_u8())];
    if let Some(count) = count {
        records.push(tlv_u32(TAG_RANGING_COUNT, count));
    }
    serialize(&records)
}

pub fn parse_ranging_count_response(
    payload: &[u8],
) -> Result<(UwbStatusCode, Option<u32>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);
    let count = match find_tag(&records, TAG_RANGING_COUNT) {
        Some(record) => Some(read_u32(record, "ranging count")?),
        None => None,
    };
    Ok((status, count))
}

pub fn format_set_app_config_response(
    status: UwbStatusCode,
    results: &[ParameterStatus],
) -> Vec<u8> {
    let mut records = vec![tlv_u8(TAG_STATUS, status.to_u8())];
    for result in results {
        records.push(wrap_constructed(
            TAG_PARAM_STATUS,
            &[
                tlv_u8(TAG_PARAM_TYPE, result.parameter_type.code()),
                tlv_u8(TAG_STATUS, result.status.to_u8()),
            ],
        ));
    }
    serialize(&records)
}

pub fn parse_set_app_config_response(
    payload: &[u8],
) -> Result<(UwbStatusCode, Vec<ParameterStatus>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);

    let mut results = Vec::new();
    for record in records.iter().filter(|r| r.tag.as_slice() == [TAG_PARAM_STATUS]) {
        let children = record.children()?;
        let code = read_u8(
            require(&children, TAG_PARAM_TYPE, "parameter type")?,
            "parameter type",
        )?;
        let parameter_type =
            AppConfigParameterType::from_code(code).ok_or(ParamError::UnknownType(code))?;
        let status = UwbStatusCode::from_u8(read_u8(
            require(&children, TAG_STATUS, "parameter status")?,
            "parameter status",
        )?);
        results.push(ParameterStatus {
            parameter_type,
            status,
        });
    }
    Ok((status, results))
}

pub fn format_get_app_config_response(
    status: UwbStatusCode,
    params: &[AppConfigParameter],
) -> Vec<u8> {
    serialize(&[
        tlv_u8(TAG_STATUS, status.to_u8()),
        tlv_bytes(TAG_PARAMETER_SET, &encode_parameters(params)),
    ])
}

pub fn parse_get_app_config_response(
    payload: &[u8],
) -> Result<(UwbStatusCode, Vec<AppConfigParameter>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);
    let params = match find_tag(&records, TAG_PARAMETER_SET) {
        Some(set) => decode_parameters(&set.value)?,
        None => Vec::new(),
    };
    Ok((status, params))
}

pub fn format_device_information_response(
    status: UwbStatusCode,
    info: Option<&UwbDeviceInformation>,
) -> Vec<u8> {
    let mut records = vec![tlv_u8(TAG_STATUS, status.to_u8())];
    if let Some(info) = info {
        records.extend(info.to_tlvs());
    }
    serialize(&records)
}

pub fn parse_device_information_response(
    payload: &[u8],
) -> Result<(UwbStatusCode, Option<UwbDeviceInformation>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);
    if !status.is_ok() {
        return Ok((status, None));
    }
    Ok((status, Some(UwbDeviceInformation::from_tlvs(&records)?)))
}

pub fn format_capabilities_response(
    status: UwbStatusCode,
    capability: Option<&UwbCapability>,
) -> Vec<u8> {
    let mut records = vec![tlv_u8(TAG_STATUS, status.to_u8())];
    if let Some(capability) = capability {
        records.extend(capability.to_tlvs());
    }
    serialize(&records)
}

pub fn parse_capabilities_response(
    payload: &[u8],
) -> Result<(UwbStatusCode, Option<UwbCapability>), CommandError> {
    let records = TlvBer::parse_all(payload)?;
    let status = UwbStatusCode::from_u8(read_u8(
        require(&records, TAG_STATUS, "status")?,
        "status",
    )?);
    if !status.is_ok() {
        return Ok((status, None));
    }
    Ok((status, Some(UwbCapability::from_tlvs(&records)?)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fira::params::AppConfigValue;

    #[test]
    fn test_opcode_roundtrip() {
        for op in [
            ControlOp::Reset,
            ControlOp::GetDeviceInformation,
            ControlOp::GetCapabilities,
            ControlOp::GetSessionCount,
            ControlOp::SessionInitialize,
            ControlOp::SessionDeinitialize,
            ControlOp::SessionGetState,
            ControlOp::SessionGetRangingCount,
            ControlOp::SessionUpdateControllerMulticastList,
            ControlOp::SetApplicationConfigurationParameters,
            ControlOp::GetApplicationConfigurationParameters,
            ControlOp::SessionRangingStart,
            ControlOp::SessionRangingStop,
        ] {
            assert_eq!(ControlOp::from_code(op.code()), Ok(op));
        }
        assert!(ControlOp::from_code(0x7F).is_err());
    }

    #[test]
    fn test_session_initialize_roundtrip() {
        let payload = format_session_initialize_request(42, SessionType::RangingSession);
        assert_eq!(
            parse_session_initialize_request(&payload).unwrap(),
            (42, SessionType::RangingSession)
        );
    }

    #[test]
    fn test_session_id_roundtrip() {
        let payload = format_session_id_request(0xDEAD_BEEF);
        assert_eq!(parse_session_id_request(&payload).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_multicast_update_roundtrip() {
        let controlees = vec![
            UwbMacAddress::short([0x10, 0x20]),
            UwbMacAddress::extended([1, 2, 3, 4, 5, 6, 7, 8]),
        ];
        let payload = format_multicast_update_request(7, MulticastAction::Add, &controlees);
        let (session_id, action, parsed) = parse_multicast_update_request(&payload).unwrap();
        assert_eq!(session_id, 7);
        assert_eq!(action, MulticastAction::Add);
        assert_eq!(parsed, controlees);
    }

    #[test]
    fn test_set_app_config_roundtrip() {
        let params = vec![
            AppConfigParameter::number_of_controlees(2),
            AppConfigParameter::dst_mac_address(vec![
                UwbMacAddress::short([0xAA, 0xBB]),
                UwbMacAddress::short([0xCC, 0xDD]),
            ]),
        ];
        let payload = format_set_app_config_request(3, &params);
        let (session_id, parsed) = parse_set_app_config_request(&payload).unwrap();
        assert_eq!(session_id, 3);
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_set_app_config_response_roundtrip() {
        let results = vec![
            ParameterStatus {
                parameter_type: AppConfigParameterType::NumberOfControlees,
                status: UwbStatusCode::Ok,
            },
            ParameterStatus {
                parameter_type: AppConfigParameterType::ChannelNumber,
                status: UwbStatusCode::InvalidRange,
            },
        ];
        let payload = format_set_app_config_response(UwbStatusCode::Ok, &results);
        let (status, parsed) = parse_set_app_config_response(&payload).unwrap();
        assert!(status.is_ok());
        assert_eq!(parsed, results);
    }

    #[test]
    fn test_get_app_config_roundtrip() {
        let types = vec![
            AppConfigParameterType::ChannelNumber,
            AppConfigParameterType::DeviceRole,
        ];
        let payload = format_get_app_config_request(9, &types);
        assert_eq!(parse_get_app_config_request(&payload).unwrap(), (9, types));

        let params = vec![AppConfigParameter::new(
            AppConfigParameterType::ChannelNumber,
            AppConfigValue::U8(9),
        )
        .unwrap()];
        let payload = format_get_app_config_response(UwbStatusCode::Ok, &params);
        let (status, parsed) = parse_get_app_config_response(&payload).unwrap();
        assert!(status.is_ok());
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_session_state_response_roundtrip() {
        let payload =
            format_session_state_response(UwbStatusCode::Ok, Some(SessionState::Initialized));
        assert_eq!(
            parse_session_state_response(&payload).unwrap(),
            (UwbStatusCode::Ok, Some(SessionState::Initialized))
        );

        let payload = format_session_state_response(UwbStatusCode::SessionNotExist, None);
        assert_eq!(
            parse_session_state_response(&payload).unwrap(),
            (UwbStatusCode::SessionNotExist, None)
        );
    }

    #[test]
    fn test_device_information_response_roundtrip() {
        let info = UwbDeviceInformation {
            uci_version: 0x0101,
            ..Default::default()
        };
        let payload = format_device_information_response(UwbStatusCode::Ok, Some(&info));
        let (status, parsed) = parse_device_information_response(&payload).unwrap();
        assert!(status.is_ok());
        assert_eq!(parsed, Some(info));

        let payload = format_device_information_response(UwbStatusCode::Failed, None);
        let (status, parsed) = parse_device_information_response(&payload).unwrap();
        assert_eq!(status, UwbStatusCode::Failed);
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_missing_status_is_malformed() {
        assert!(matches!(
            parse_status_response(&[]),
            Err(CommandError::MissingField("status"))
        ));
    }
}
