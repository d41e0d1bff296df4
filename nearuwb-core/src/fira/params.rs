//! Application configuration parameters and their wire marshaling.
//!
//! Each parameter type has a fixed byte length from a static table (the
//! FiRa application-configuration catalog); the two MAC-address-bearing
//! types are variable-length and derive their length from content instead.
//! A parameter marshals to a single TLV record whose tag byte is the
//! parameter type code and whose value is the little-endian encoding of the
//! payload, or the concatenated address bytes for the variable types.
//!
//! This layer is a translation table plus codec calls - it keeps no state.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mac::UwbMacAddress;
use crate::tlv::{TlvBer, TlvError};

use super::status::UwbStatusCode;

// =============================================================================
// Errors
// =============================================================================

/// Errors produced while marshaling or unmarshaling configuration parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    /// Tag byte does not name a known parameter type
    #[error("Unknown parameter type code {0:#04X}")]
    UnknownType(u8),

    /// Record tag is not a single byte
    #[error("Parameter tag must be one byte, got {0} bytes")]
    BadTag(usize),

    /// Declared length disagrees with the static table
    #[error("{parameter_type:?} expects {expected} value bytes, got {actual}")]
    LengthMismatch {
        parameter_type: AppConfigParameterType,
        expected: usize,
        actual: usize,
    },

    /// Value width does not fit the parameter type
    #[error("Value does not fit {parameter_type:?}: {reason}")]
    InvalidValue {
        parameter_type: AppConfigParameterType,
        reason: &'static str,
    },

    /// Variable-length payload is not a whole number of addresses
    #[error("{parameter_type:?} payload of {actual} bytes is not a whole number of addresses")]
    BadAddressPayload {
        parameter_type: AppConfigParameterType,
        actual: usize,
    },

    /// Underlying TLV failure
    #[error(transparent)]
    Tlv(#[from] TlvError),
}

// =============================================================================
// Parameter catalog
// =============================================================================

/// Application configuration parameter identifiers.
///
/// Codes and lengths follow the FiRa UCI application-configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppConfigParameterType {
    DeviceType,
    RangingRoundUsage,
    StsConfig,
    MultiNodeMode,
    ChannelNumber,
    NumberOfControlees,
    DeviceMacAddress,
    DstMacAddress,
    SlotDuration,
    RangingInterval,
    StsIndex,
    MacFcsType,
    RangingRoundControl,
    AoaResultRequest,
    RangeDataNtfConfig,
    RangeDataNtfProximityNear,
    RangeDataNtfProximityFar,
    DeviceRole,
    RframeConfig,
    PreambleCodeIndex,
    SfdId,
    PsduDataRate,
    PreambleDuration,
    RangingTimeStruct,
    SlotsPerRangingRound,
    TxAdaptivePayloadPower,
    ResponderSlotIndex,
    PrfMode,
    ScheduledMode,
    KeyRotation,
    KeyRotationRate,
    SessionPriority,
    MacAddressMode,
    VendorId,
    StaticStsIv,
    NumberOfStsSegments,
    MaxRangingRoundRetry,
    UwbInitiationTime,
    HoppingMode,
    BlockStrideLength,
    ResultReportConfig,
    InBandTerminationAttemptCount,
    SubSessionId,
    BprfPhrDataRate,
    MaxNumberOfMeasurements,
    StsLength,
}

impl AppConfigParameterType {
    /// Every catalog entry, in code order
    pub const ALL: &'static [AppConfigParameterType] = &[
        AppConfigParameterType::DeviceType,
        AppConfigParameterType::RangingRoundUsage,
        AppConfigParameterType::StsConfig,
        AppConfigParameterType::MultiNodeMode,
        AppConfigParameterType::ChannelNumber,
        AppConfigParameterType::NumberOfControlees,
        AppConfigParameterType::DeviceMacAddress,
        AppConfigParameterType::DstMacAddress,
        AppConfigParameterType::SlotDuration,
        AppConfigParameterType::RangingInterval,
        AppConfigParameterType::StsIndex,
        AppConfigParameterType::MacFcsType,
        AppConfigParameterType::RangingRoundControl,
        AppConfigParameterType::AoaResultRequest,
        AppConfigParameterType::RangeDataNtfConfig,
        AppConfigParameterType::RangeDataNtfProximityNear,
        AppConfigParameterType::RangeDataNtfProximityFar,
        AppConfigParameterType::DeviceRole,
        AppConfigParameterType::RframeConfig,
        AppConfigParameterType::PreambleCodeIndex,
        AppConfigParameterType::SfdId,
        AppConfigParameterType::PsduDataRate,
        AppConfigParameterType::PreambleDuration,
        AppConfigParameterType::RangingTimeStruct,
        AppConfigParameterType::SlotsPerRangingRound,
        AppConfigParameterType::TxAdaptivePayloadPower,
        AppConfigParameterType::ResponderSlotIndex,
        AppConfigParameterType::PrfMode,
        AppConfigParameterType::ScheduledMode,
        AppConfigParameterType::KeyRotation,
        AppConfigParameterType::KeyRotationRate,
        AppConfigParameterType::SessionPriority,
        AppConfigParameterType::MacAddressMode,
        AppConfigParameterType::VendorId,
        AppConfigParameterType::StaticStsIv,
        AppConfigParameterType::NumberOfStsSegments,
        AppConfigParameterType::MaxRangingRoundRetry,
        AppConfigParameterType::UwbInitiationTime,
        AppConfigParameterType::HoppingMode,
        AppConfigParameterType::BlockStrideLength,
        AppConfigParameterType::ResultReportConfig,
        AppConfigParameterType::InBandTerminationAttemptCount,
        AppConfigParameterType::SubSessionId,
        AppConfigParameterType::BprfPhrDataRate,
        AppConfigParameterType::MaxNumberOfMeasurements,
        AppConfigParameterType::StsLength,
    ];

    /// Wire code for this parameter type
    pub const fn code(self) -> u8 {
        match self {
            AppConfigParameterType::DeviceType => 0x00,
            AppConfigParameterType::RangingRoundUsage => 0x01,
            AppConfigParameterType::StsConfig => 0x02,
            AppConfigParameterType::MultiNodeMode => 0x03,
            AppConfigParameterType::ChannelNumber => 0x04,
            AppConfigParameterType::NumberOfControlees => 0x05,
            AppConfigParameterType::DeviceMacAddress => 0x06,
            AppConfigParameterType::DstMacAddress => 0x07,
            AppConfigParameterType::SlotDuration => 0x08,
            AppConfigParameterType::RangingInterval => 0x09,
            AppConfigParameterType::StsIndex => 0x0A,
            AppConfigParameterType::MacFcsType => 0x0B,
            AppConfigParameterType::RangingRoundControl => 0x0C,
            AppConfigParameterType::AoaResultRequest => 0x0D,
            AppConfigParameterType::RangeDataNtfConfig => 0x0E,
            AppConfigParameterType::RangeDataNtfProximityNear => 0x0F,
            AppConfigParameterType::RangeDataNtfProximityFar => 0x10,
            AppConfigParameterType::DeviceRole => 0x11,
            AppConfigParameterType::RframeConfig => 0x12,
            AppConfigParameterType::PreambleCodeIndex => 0x14,
            AppConfigParameterType::SfdId => 0x15,
            AppConfigParameterType::PsduDataRate => 0x16,
            AppConfigParameterType::PreambleDuration => 0x17,
            AppConfigParameterType::RangingTimeStruct => 0x1A,
            AppConfigParameterType::SlotsPerRangingRound => 0x1B,
            AppConfigParameterType::TxAdaptivePayloadPower => 0x1C,
            AppConfigParameterType::ResponderSlotIndex => 0x1E,
            AppConfigParameterType::PrfMode => 0x1F,
            AppConfigParameterType::ScheduledMode => 0x22,
            AppConfigParameterType::KeyRotation => 0x23,
            AppConfigParameterType::KeyRotationRate => 0x24,
            AppConfigParameterType::SessionPriority => 0x25,
            AppConfigParameterType::MacAddressMode => 0x26,
            AppConfigParameterType::VendorId => 0x27,
            AppConfigParameterType::StaticStsIv => 0x28,
            AppConfigParameterType::NumberOfStsSegments => 0x29,
            AppConfigParameterType::MaxRangingRoundRetry => 0x2A,
            AppConfigParameterType::UwbInitiationTime => 0x2B,
            AppConfigParameterType::HoppingMode => 0x2C,
            AppConfigParameterType::BlockStrideLength => 0x2D,
            AppConfigParameterType::ResultReportConfig => 0x2E,
            AppConfigParameterType::InBandTerminationAttemptCount => 0x2F,
            AppConfigParameterType::SubSessionId => 0x30,
            AppConfigParameterType::BprfPhrDataRate => 0x31,
            AppConfigParameterType::MaxNumberOfMeasurements => 0x32,
            AppConfigParameterType::StsLength => 0x35,
        }
    }

    /// Look a parameter type up by its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        AppConfigParameterType::ALL
            .iter()
            .copied()
            .find(|t| t.code() == code)
    }

    /// Required value length from the static table.
    ///
    /// `None` marks the variable-length address-bearing types whose length
    /// comes from content.
    pub const fn expected_length(self) -> Option<usize> {
        match self {
            AppConfigParameterType::DeviceMacAddress | AppConfigParameterType::DstMacAddress => {
                None
            }
            AppConfigParameterType::SlotDuration
            | AppConfigParameterType::RangeDataNtfProximityNear
            | AppConfigParameterType::RangeDataNtfProximityFar
            | AppConfigParameterType::VendorId
            | AppConfigParameterType::MaxRangingRoundRetry
            | AppConfigParameterType::MaxNumberOfMeasurements => Some(2),
            AppConfigParameterType::RangingInterval
            | AppConfigParameterType::StsIndex
            | AppConfigParameterType::UwbInitiationTime
            | AppConfigParameterType::SubSessionId => Some(4),
            AppConfigParameterType::StaticStsIv => Some(6),
            _ => Some(1),
        }
    }
}

// =============================================================================
// Bitmask-valued parameters
// =============================================================================

bitflags! {
    /// RANGING_ROUND_CONTROL bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RangingRoundControl: u8 {
        const RANGING_RESULT_REPORT = 0b0000_0001;
        const CONTROL_MESSAGE       = 0b0000_0010;
        const MEASUREMENT_REPORT    = 0b1000_0000;
    }
}

bitflags! {
    /// RESULT_REPORT_CONFIG bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResultReportConfig: u8 {
        const TOF           = 0b0000_0001;
        const AOA_AZIMUTH   = 0b0000_0010;
        const AOA_ELEVATION = 0b0000_0100;
        const AOA_FOM       = 0b0000_1000;
    }
}

// =============================================================================
// Values
// =============================================================================

/// Typed payload of a configuration parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppConfigValue {
    U8(u8),
    U16(u16),
    U32(u32),
    /// 6-byte payload (static STS initialization vector)
    Bytes6([u8; 6]),
    /// Single device address, length from content
    MacAddress(UwbMacAddress),
    /// Destination address set, length from content
    MacAddressList(Vec<UwbMacAddress>),
}

impl AppConfigValue {
    /// Wire length of this value
    pub fn wire_length(&self) -> usize {
        match self {
            AppConfigValue::U8(_) => 1,
            AppConfigValue::U16(_) => 2,
            AppConfigValue::U32(_) => 4,
            AppConfigValue::Bytes6(_) => 6,
            AppConfigValue::MacAddress(addr) => addr.len(),
            AppConfigValue::MacAddressList(addrs) => addrs.iter().map(UwbMacAddress::len).sum(),
        }
    }

    /// Encode the value. Multi-octet integers are little-endian; addresses
    /// are raw bytes in network order.
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            AppConfigValue::U8(v) => vec![*v],
            AppConfigValue::U16(v) => v.to_le_bytes().to_vec(),
            AppConfigValue::U32(v) => v.to_le_bytes().to_vec(),
            AppConfigValue::Bytes6(v) => v.to_vec(),
            AppConfigValue::MacAddress(addr) => addr.as_bytes().to_vec(),
            AppConfigValue::MacAddressList(addrs) => {
                let mut out = Vec::with_capacity(self.wire_length());
                for addr in addrs {
                    out.extend_from_slice(addr.as_bytes());
                }
                out
            }
        }
    }
}

// =============================================================================
// Parameter
// =============================================================================

/// A single typed configuration parameter, validated against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfigParameter {
    parameter_type: AppConfigParameterType,
    value: AppConfigValue,
}

impl AppConfigParameter {
    /// Pair a type with a value, rejecting width mismatches up front
    pub fn new(
        parameter_type: AppConfigParameterType,
        value: AppConfigValue,
    ) -> Result<Self, ParamError> {
        match parameter_type.expected_length() {
            Some(expected) => {
                let fixed_width = matches!(
                    value,
                    AppConfigValue::U8(_)
                        | AppConfigValue::U16(_)
                        | AppConfigValue::U32(_)
                        | AppConfigValue::Bytes6(_)
                );
                if !fixed_width {
                    return Err(ParamError::InvalidValue {
                        parameter_type,
                        reason: "fixed-length parameter requires an integer payload",
                    });
                }
                if value.wire_length() != expected {
                    return Err(ParamError::LengthMismatch {
                        parameter_type,
                        expected,
                        actual: value.wire_length(),
                    });
                }
            }
            None => {
                let address_bearing = matches!(
                    value,
                    AppConfigValue::MacAddress(_) | AppConfigValue::MacAddressList(_)
                );
                if !address_bearing {
                    return Err(ParamError::InvalidValue {
                        parameter_type,
                        reason: "variable-length parameter requires an address payload",
                    });
                }
            }
        }
        Ok(AppConfigParameter {
            parameter_type,
            value,
        })
    }

    /// Convenience constructor for the peer count parameter
    pub fn number_of_controlees(count: u8) -> Self {
        AppConfigParameter {
            parameter_type: AppConfigParameterType::NumberOfControlees,
            value: AppConfigValue::U8(count),
        }
    }

    /// Convenience constructor for the destination address set
    pub fn dst_mac_address(addresses: Vec<UwbMacAddress>) -> Self {
        AppConfigParameter {
            parameter_type: AppConfigParameterType::DstMacAddress,
            value: AppConfigValue::MacAddressList(addresses),
        }
    }

    /// Convenience constructor for the local device address
    pub fn device_mac_address(address: UwbMacAddress) -> Self {
        AppConfigParameter {
            parameter_type: AppConfigParameterType::DeviceMacAddress,
            value: AppConfigValue::MacAddress(address),
        }
    }

    /// Convenience constructor for RANGING_ROUND_CONTROL
    pub fn ranging_round_control(control: RangingRoundControl) -> Self {
        AppConfigParameter {
            parameter_type: AppConfigParameterType::RangingRoundControl,
            value: AppConfigValue::U8(control.bits()),
        }
    }

    /// Convenience constructor for RESULT_REPORT_CONFIG
    pub fn result_report_config(config: ResultReportConfig) -> Self {
        AppConfigParameter {
            parameter_type: AppConfigParameterType::ResultReportConfig,
            value: AppConfigValue::U8(config.bits()),
        }
    }

    pub fn parameter_type(&self) -> AppConfigParameterType {
        self.parameter_type
    }

    pub fn value(&self) -> &AppConfigValue {
        &self.value
    }

    /// Marshal into a TLV record: tag byte is the parameter code, value is
    /// the wire encoding of the payload.
    ///
    /// The record is assembled directly; parameter codes reuse the full byte
    /// and are not subject to the builder's constructed-bit interpretation.
    pub fn to_tlv(&self) -> TlvBer {
        TlvBer {
            tag: vec![self.parameter_type.code()],
            value: self.value.to_wire(),
        }
    }

    /// Unmarshal from a TLV record, validating the declared length against
    /// the static table
    pub fn from_tlv(record: &TlvBer) -> Result<Self, ParamError> {
        if record.tag.len() != 1 {
            return Err(ParamError::BadTag(record.tag.len()));
        }
        let parameter_type = AppConfigParameterType::from_code(record.tag[0])
            .ok_or(ParamError::UnknownType(record.tag[0]))?;

        let value = match parameter_type.expected_length() {
            Some(expected) => {
                if record.value.len() != expected {
                    return Err(ParamError::LengthMismatch {
                        parameter_type,
                        expected,
                        actual: record.value.len(),
                    });
                }
                match expected {
                    1 => AppConfigValue::U8(record.value[0]),
                    2 => AppConfigValue::U16(u16::from_le_bytes([
                        record.value[0],
                        record.value[1],
                    ])),
                    4 => AppConfigValue::U32(u32::from_le_bytes([
                        record.value[0],
                        record.value[1],
                        record.value[2],
                        record.value[3],
                    ])),
                    _ => {
                        let mut bytes = [0u8; 6];
                        bytes.copy_from_slice(&record.value);
                        AppConfigValue::Bytes6(bytes)
                    }
                }
            }
            None => decode_address_payload(parameter_type, &record.value)?,
        };

        Ok(AppConfigParameter {
            parameter_type,
            value,
        })
    }
}

/// Split a variable-length payload into addresses.
///
/// Short (2-byte) division is preferred; a payload only divisible by the
/// extended size decodes as extended addresses.
fn decode_address_payload(
    parameter_type: AppConfigParameterType,
    payload: &[u8],
) -> Result<AppConfigValue, ParamError> {
    let single = parameter_type == AppConfigParameterType::DeviceMacAddress;
    if single {
        return UwbMacAddress::from_bytes(payload)
            .map(AppConfigValue::MacAddress)
            .ok_or(ParamError::BadAddressPayload {
                parameter_type,
                actual: payload.len(),
            });
    }

    let chunk = if payload.len() % UwbMacAddress::SHORT_LENGTH == 0 {
        UwbMacAddress::SHORT_LENGTH
    } else if payload.len() % UwbMacAddress::EXTENDED_LENGTH == 0 {
        UwbMacAddress::EXTENDED_LENGTH
    } else {
        return Err(ParamError::BadAddressPayload {
            parameter_type,
            actual: payload.len(),
        });
    };

    let mut addresses = Vec::with_capacity(payload.len() / chunk);
    for bytes in payload.chunks_exact(chunk) {
        match UwbMacAddress::from_bytes(bytes) {
            Some(address) => addresses.push(address),
            None => {
                return Err(ParamError::BadAddressPayload {
                    parameter_type,
                    actual: payload.len(),
                })
            }
        }
    }
    Ok(AppConfigValue::MacAddressList(addresses))
}

// =============================================================================
// Parameter sequences
// =============================================================================

/// Concatenate the encodings of a parameter batch.
pub fn encode_parameters(params: &[AppConfigParameter]) -> Vec<u8> {
    let mut out = Vec::new();
    for param in params {
        out.extend_from_slice(&param.to_tlv().to_bytes());
    }
    out
}

/// Split a concatenated parameter batch back into typed parameters.
///
/// Parameter records always carry their type code as a single tag byte, so
/// the split reads one code byte, a BER length and the value - the generic
/// tag parser is not used here (type codes such as `0x1F` would collide with
/// the long-form tag marker).
pub fn decode_parameters(input: &[u8]) -> Result<Vec<AppConfigParameter>, ParamError> {
    let mut params = Vec::new();
    let mut offset = 0;
    while offset < input.len() {
        let code = input[offset];
        offset += 1;
        let (length, consumed) = crate::tlv::parse_length(&input[offset..])?;
        offset += consumed;
        let (value, consumed) = crate::tlv::parse_primitive_value(length, &input[offset..])?;
        offset += consumed;
        params.push(AppConfigParameter::from_tlv(&TlvBer {
            tag: vec![code],
            value,
        })?);
    }
    Ok(params)
}

// =============================================================================
// Per-parameter result
// =============================================================================

/// Outcome of applying one parameter within a batched set request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterStatus {
    pub parameter_type: AppConfigParameterType,
    pub status: UwbStatusCode,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_codes_are_unique() {
        let mut codes: Vec<u8> = AppConfigParameterType::ALL
            .iter()
            .map(|t| t.code())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), AppConfigParameterType::ALL.len());
        for t in AppConfigParameterType::ALL {
            assert_eq!(AppConfigParameterType::from_code(t.code()), Some(*t));
        }
    }

    #[test]
    fn test_table_lengths() {
        use AppConfigParameterType::*;
        assert_eq!(DeviceType.expected_length(), Some(1));
        assert_eq!(NumberOfControlees.expected_length(), Some(1));
        assert_eq!(SlotDuration.expected_length(), Some(2));
        assert_eq!(RangingInterval.expected_length(), Some(4));
        assert_eq!(StaticStsIv.expected_length(), Some(6));
        assert_eq!(DeviceMacAddress.expected_length(), None);
        assert_eq!(DstMacAddress.expected_length(), None);
    }

    #[test]
    fn test_number_of_controlees_encoding() {
        let param = AppConfigParameter::number_of_controlees(2);
        let tlv = param.to_tlv();
        assert_eq!(tlv.tag, vec![0x05]);
        assert_eq!(tlv.value, vec![0x02]);
        assert_eq!(AppConfigParameter::from_tlv(&tlv).unwrap(), param);
    }

    #[test]
    fn test_dst_mac_address_encoding() {
        let param = AppConfigParameter::dst_mac_address(vec![
            UwbMacAddress::short([0xAA, 0xBB]),
            UwbMacAddress::short([0xCC, 0xDD]),
        ]);
        let tlv = param.to_tlv();
        assert_eq!(tlv.tag, vec![0x07]);
        assert_eq!(tlv.value, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(AppConfigParameter::from_tlv(&tlv).unwrap(), param);
    }

    #[test]
    fn test_little_endian_integers() {
        let param = AppConfigParameter::new(
            AppConfigParameterType::RangingInterval,
            AppConfigValue::U32(0x0001_0200),
        )
        .unwrap();
        assert_eq!(param.to_tlv().value, vec![0x00, 0x02, 0x01, 0x00]);

        let param = AppConfigParameter::new(
            AppConfigParameterType::VendorId,
            AppConfigValue::U16(0xBEEF),
        )
        .unwrap();
        assert_eq!(param.to_tlv().value, vec![0xEF, 0xBE]);
    }

    #[test]
    fn test_new_rejects_width_mismatch() {
        let result = AppConfigParameter::new(
            AppConfigParameterType::ChannelNumber,
            AppConfigValue::U16(9),
        );
        assert!(matches!(result, Err(ParamError::LengthMismatch { .. })));

        let result = AppConfigParameter::new(
            AppConfigParameterType::DstMacAddress,
            AppConfigValue::U8(1),
        );
        assert!(matches!(result, Err(ParamError::InvalidValue { .. })));
    }

    #[test]
    fn test_decode_rejects_table_mismatch() {
        // ChannelNumber declares 1 byte in the table; present 2
        let record = TlvBer {
            tag: vec![AppConfigParameterType::ChannelNumber.code()],
            value: vec![0x09, 0x00],
        };
        assert!(matches!(
            AppConfigParameter::from_tlv(&record),
            Err(ParamError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_code() {
        let record = TlvBer {
            tag: vec![0x7B],
            value: vec![0x00],
        };
        assert_eq!(
            AppConfigParameter::from_tlv(&record),
            Err(ParamError::UnknownType(0x7B))
        );
    }

    #[test]
    fn test_decode_extended_address_list() {
        let record = TlvBer {
            tag: vec![AppConfigParameterType::DeviceMacAddress.code()],
            value: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        let param = AppConfigParameter::from_tlv(&record).unwrap();
        assert_eq!(
            param.value(),
            &AppConfigValue::MacAddress(UwbMacAddress::extended([1, 2, 3, 4, 5, 6, 7, 8]))
        );

        // 3 bytes is not a whole number of addresses of either size
        let record = TlvBer {
            tag: vec![AppConfigParameterType::DstMacAddress.code()],
            value: vec![1, 2, 3],
        };
        assert!(matches!(
            AppConfigParameter::from_tlv(&record),
            Err(ParamError::BadAddressPayload { .. })
        ));
    }

    #[test]
    fn test_parameter_sequence_roundtrip() {
        // PrfMode's code 0x1F doubles as the BER long-form tag marker; the
        // sequence decoder must still split it correctly.
        let params = vec![
            AppConfigParameter::number_of_controlees(2),
            AppConfigParameter::new(AppConfigParameterType::PrfMode, AppConfigValue::U8(1))
                .unwrap(),
            AppConfigParameter::dst_mac_address(vec![
                UwbMacAddress::short([0xAA, 0xBB]),
                UwbMacAddress::short([0xCC, 0xDD]),
            ]),
        ];
        let encoded = encode_parameters(&params);
        assert_eq!(decode_parameters(&encoded).unwrap(), params);
    }

    #[test]
    fn test_bitmask_parameters() {
        let param = AppConfigParameter::ranging_round_control(
            RangingRoundControl::RANGING_RESULT_REPORT | RangingRoundControl::CONTROL_MESSAGE,
        );
        assert_eq!(param.to_tlv().value, vec![0b0000_0011]);

        let param = AppConfigParameter::result_report_config(ResultReportConfig::TOF);
        assert_eq!(param.to_tlv().value, vec![0b0000_0001]);
    }
}
