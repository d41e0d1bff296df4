//! FiRa status and state enumerations.
//!
//! Byte-level conversions follow the UCI generic status code assignments.
//! Unknown codes are preserved through the `Other` variants so a newer device
//! never turns into a parse failure at this layer.

use serde::{Deserialize, Serialize};

// =============================================================================
// Status codes
// =============================================================================

/// Status code returned by the device for control and configuration requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UwbStatusCode {
    Ok,
    Rejected,
    Failed,
    SyntaxError,
    InvalidParameter,
    InvalidRange,
    InvalidMessageSize,
    UnknownGid,
    UnknownOid,
    ReadOnly,
    CommandRetry,
    SessionNotExist,
    SessionDuplicate,
    SessionActive,
    MaxSessionsExceeded,
    SessionNotConfigured,
    ActiveSessionsOngoing,
    MulticastListFull,
    AddressNotFound,
    AddressAlreadyPresent,
    RangingTxFailed,
    RangingRxTimeout,
    RangingRxPhyDecodingFailed,
    RangingRxPhyToaFailed,
    RangingRxPhyStsFailed,
    RangingRxMacDecodingFailed,
    RangingRxMacIeDecodingFailed,
    RangingRxMacIeMissing,
    /// Code with no assigned meaning at this layer
    Other(u8),
}

impl UwbStatusCode {
    /// Whether this is the success code
    pub fn is_ok(&self) -> bool {
        matches!(self, UwbStatusCode::Ok)
    }

    /// Wire code for this status
    pub fn to_u8(self) -> u8 {
        match self {
            UwbStatusCode::Ok => 0x00,
            UwbStatusCode::Rejected => 0x01,
            UwbStatusCode::Failed => 0x02,
            UwbStatusCode::SyntaxError => 0x03,
            UwbStatusCode::InvalidParameter => 0x04,
            UwbStatusCode::InvalidRange => 0x05,
            UwbStatusCode::InvalidMessageSize => 0x06,
            UwbStatusCode::UnknownGid => 0x07,
            UwbStatusCode::UnknownOid => 0x08,
            UwbStatusCode::ReadOnly => 0x09,
            UwbStatusCode::CommandRetry => 0x0A,
            UwbStatusCode::SessionNotExist => 0x11,
            UwbStatusCode::SessionDuplicate => 0x12,
            UwbStatusCode::SessionActive => 0x13,
            UwbStatusCode::MaxSessionsExceeded => 0x14,
            UwbStatusCode::SessionNotConfigured => 0x15,
            UwbStatusCode::ActiveSessionsOngoing => 0x16,
            UwbStatusCode::MulticastListFull => 0x17,
            UwbStatusCode::AddressNotFound => 0x18,
            UwbStatusCode::AddressAlreadyPresent => 0x19,
            UwbStatusCode::RangingTxFailed => 0x20,
            UwbStatusCode::RangingRxTimeout => 0x21,
            UwbStatusCode::RangingRxPhyDecodingFailed => 0x22,
            UwbStatusCode::RangingRxPhyToaFailed => 0x23,
            UwbStatusCode::RangingRxPhyStsFailed => 0x24,
            UwbStatusCode::RangingRxMacDecodingFailed => 0x25,
            UwbStatusCode::RangingRxMacIeDecodingFailed => 0x26,
            UwbStatusCode::RangingRxMacIeMissing => 0x27,
            UwbStatusCode::Other(code) => code,
        }
    }

    /// Decode a wire code
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => UwbStatusCode::Ok,
            0x01 => UwbStatusCode::Rejected,
            0x02 => UwbStatusCode::Failed,
            0x03 => UwbStatusCode::SyntaxError,
            0x04 => UwbStatusCode::InvalidParameter,
            0x05 => UwbStatusCode::InvalidRange,
            0x06 => UwbStatusCode::InvalidMessageSize,
            0x07 => UwbStatusCode::UnknownGid,
            0x08 => UwbStatusCode::UnknownOid,
            0x09 => UwbStatusCode::ReadOnly,
            0x0A => UwbStatusCode::CommandRetry,
            0x11 => UwbStatusCode::SessionNotExist,
            0x12 => UwbStatusCode::SessionDuplicate,
            0x13 => UwbStatusCode::SessionActive,
            0x14 => UwbStatusCode::MaxSessionsExceeded,
            0x15 => UwbStatusCode::SessionNotConfigured,
            0x16 => UwbStatusCode::ActiveSessionsOngoing,
            0x17 => UwbStatusCode::MulticastListFull,
            0x18 => UwbStatusCode::AddressNotFound,
            0x19 => UwbStatusCode::AddressAlreadyPresent,
            0x20 => UwbStatusCode::RangingTxFailed,
            0x21 => UwbStatusCode::RangingRxTimeout,
            0x22 => UwbStatusCode::RangingRxPhyDecodingFailed,
            0x23 => UwbStatusCode::RangingRxPhyToaFailed,
            0x24 => UwbStatusCode::RangingRxPhyStsFailed,
            0x25 => UwbStatusCode::RangingRxMacDecodingFailed,
            0x26 => UwbStatusCode::RangingRxMacIeDecodingFailed,
            0x27 => UwbStatusCode::RangingRxMacIeMissing,
            other => UwbStatusCode::Other(other),
        }
    }
}

impl std::fmt::Display for UwbStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UwbStatusCode::Other(code) => write!(f, "unknown status {code:#04X}"),
            other => write!(f, "{other:?}"),
        }
    }
}

// =============================================================================
// Device state
// =============================================================================

/// Operational state of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UwbDeviceState {
    /// Host-side placeholder before the first device status report; has no
    /// wire code
    Uninitialized,
    /// Device is idle and ready for commands
    Ready,
    /// Device has at least one active ranging session
    Active,
    /// Device hit an unrecoverable error and needs a reset
    Error,
}

impl Default for UwbDeviceState {
    fn default() -> Self {
        UwbDeviceState::Uninitialized
    }
}

impl UwbDeviceState {
    /// Wire code, `None` for the host-only [`UwbDeviceState::Uninitialized`]
    pub fn to_u8(self) -> Option<u8> {
        match self {
            UwbDeviceState::Uninitialized => None,
            UwbDeviceState::Ready => Some(0x01),
            UwbDeviceState::Active => Some(0x02),
            UwbDeviceState::Error => Some(0xFF),
        }
    }

    /// Decode a wire code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(UwbDeviceState::Ready),
            0x02 => Some(UwbDeviceState::Active),
            0xFF => Some(UwbDeviceState::Error),
            _ => None,
        }
    }
}

// =============================================================================
// Session state and type
// =============================================================================

/// Lifecycle state of a ranging session.
///
/// `Deinitialized → Initialized → Active`, with `Deinitialized` re-enterable:
/// a deinitialized session may be configured again from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No device-side session exists
    Deinitialized,
    /// Session exists and is configured but not ranging
    Initialized,
    /// Session is actively ranging
    Active,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Deinitialized
    }
}

impl SessionState {
    /// Wire code for this state
    pub fn to_u8(self) -> u8 {
        match self {
            SessionState::Deinitialized => 0x00,
            SessionState::Initialized => 0x01,
            SessionState::Active => 0x02,
        }
    }

    /// Decode a wire code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(SessionState::Deinitialized),
            0x01 => Some(SessionState::Initialized),
            0x02 => Some(SessionState::Active),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Deinitialized => write!(f, "deinitialized"),
            SessionState::Initialized => write!(f, "initialized"),
            SessionState::Active => write!(f, "active"),
        }
    }
}

/// Kind of session requested at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    /// Normal FiRa ranging session
    RangingSession,
    /// Device test mode session
    DeviceTestMode,
}

impl SessionType {
    pub fn to_u8(self) -> u8 {
        match self {
            SessionType::RangingSession => 0x00,
            SessionType::DeviceTestMode => 0xD0,
        }
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(SessionType::RangingSession),
            0xD0 => Some(SessionType::DeviceTestMode),
            _ => None,
        }
    }
}

/// Why a session changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionReasonCode {
    /// Result of an explicit session management command
    StateChangeWithSessionManagementCommands,
    MaxRangingRoundRetryCountReached,
    MaxNumberOfMeasurementsReached,
    ErrorSlotLengthNotSupported,
    ErrorInsufficientSlotsPerRangingRound,
    ErrorMacAddressModeNotSupported,
    ErrorInvalidRangingInterval,
    ErrorInvalidStsConfig,
    ErrorInvalidRframeConfig,
    Other(u8),
}

impl SessionReasonCode {
    pub fn to_u8(self) -> u8 {
        match self {
            SessionReasonCode::StateChangeWithSessionManagementCommands => 0x00,
            SessionReasonCode::MaxRangingRoundRetryCountReached => 0x01,
            SessionReasonCode::MaxNumberOfMeasurementsReached => 0x02,
            SessionReasonCode::ErrorSlotLengthNotSupported => 0x20,
            SessionReasonCode::ErrorInsufficientSlotsPerRangingRound => 0x21,
            SessionReasonCode::ErrorMacAddressModeNotSupported => 0x22,
            SessionReasonCode::ErrorInvalidRangingInterval => 0x23,
            SessionReasonCode::ErrorInvalidStsConfig => 0x24,
            SessionReasonCode::ErrorInvalidRframeConfig => 0x25,
            SessionReasonCode::Other(code) => code,
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => SessionReasonCode::StateChangeWithSessionManagementCommands,
            0x01 => SessionReasonCode::MaxRangingRoundRetryCountReached,
            0x02 => SessionReasonCode::MaxNumberOfMeasurementsReached,
            0x20 => SessionReasonCode::ErrorSlotLengthNotSupported,
            0x21 => SessionReasonCode::ErrorInsufficientSlotsPerRangingRound,
            0x22 => SessionReasonCode::ErrorMacAddressModeNotSupported,
            0x23 => SessionReasonCode::ErrorInvalidRangingInterval,
            0x24 => SessionReasonCode::ErrorInvalidStsConfig,
            0x25 => SessionReasonCode::ErrorInvalidRframeConfig,
            other => SessionReasonCode::Other(other),
        }
    }

    /// Collapse the reason into the coarse end-of-session classification
    /// reported to session observers
    pub fn end_reason(self) -> SessionEndReason {
        match self {
            SessionReasonCode::StateChangeWithSessionManagementCommands => {
                SessionEndReason::Commanded
            }
            SessionReasonCode::MaxRangingRoundRetryCountReached => SessionEndReason::MaxRetryReached,
            SessionReasonCode::MaxNumberOfMeasurementsReached => {
                SessionEndReason::MaxMeasurementsReached
            }
            _ => SessionEndReason::Error,
        }
    }
}

/// Coarse classification of why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEndReason {
    /// The host asked for it
    Commanded,
    MaxRetryReached,
    MaxMeasurementsReached,
    Error,
}

// =============================================================================
// Roles and actions
// =============================================================================

/// Role of the local device within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Responder-like participant
    Controlee,
    /// Session initiator and multicast-list owner
    Controller,
}

impl DeviceType {
    pub fn to_u8(self) -> u8 {
        match self {
            DeviceType::Controlee => 0x00,
            DeviceType::Controller => 0x01,
        }
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(DeviceType::Controlee),
            0x01 => Some(DeviceType::Controller),
            _ => None,
        }
    }
}

/// Multicast-list maintenance operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MulticastAction {
    Add,
    Delete,
}

impl MulticastAction {
    pub fn to_u8(self) -> u8 {
        match self {
            MulticastAction::Add => 0x00,
            MulticastAction::Delete => 0x01,
        }
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(MulticastAction::Add),
            0x01 => Some(MulticastAction::Delete),
            _ => None,
        }
    }
}

/// Per-controlee result of a multicast-list update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MulticastStatusCode {
    OkUpdate,
    ListFull,
    KeyFetchFail,
    SubSessionIdNotFound,
    Other(u8),
}

impl MulticastStatusCode {
    pub fn to_u8(self) -> u8 {
        match self {
            MulticastStatusCode::OkUpdate => 0x00,
            MulticastStatusCode::ListFull => 0x01,
            MulticastStatusCode::KeyFetchFail => 0x02,
            MulticastStatusCode::SubSessionIdNotFound => 0x03,
            MulticastStatusCode::Other(code) => code,
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => MulticastStatusCode::OkUpdate,
            0x01 => MulticastStatusCode::ListFull,
            0x02 => MulticastStatusCode::KeyFetchFail,
            0x03 => MulticastStatusCode::SubSessionIdNotFound,
            other => MulticastStatusCode::Other(other),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_roundtrip() {
        for code in 0x00u8..=0xFF {
            assert_eq!(UwbStatusCode::from_u8(code).to_u8(), code);
        }
        assert!(UwbStatusCode::Ok.is_ok());
        assert!(!UwbStatusCode::Rejected.is_ok());
    }

    #[test]
    fn test_device_state_roundtrip() {
        for state in [
            UwbDeviceState::Ready,
            UwbDeviceState::Active,
            UwbDeviceState::Error,
        ] {
            let code = state.to_u8().unwrap();
            assert_eq!(UwbDeviceState::from_u8(code), Some(state));
        }
        // Uninitialized has no wire representation
        assert_eq!(UwbDeviceState::Uninitialized.to_u8(), None);
        assert_eq!(UwbDeviceState::from_u8(0x00), None);
    }

    #[test]
    fn test_session_state_roundtrip() {
        for state in [
            SessionState::Deinitialized,
            SessionState::Initialized,
            SessionState::Active,
        ] {
            assert_eq!(SessionState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(SessionState::from_u8(0x7E), None);
    }

    #[test]
    fn test_reason_code_roundtrip() {
        for code in 0x00u8..=0xFF {
            assert_eq!(SessionReasonCode::from_u8(code).to_u8(), code);
        }
    }

    #[test]
    fn test_end_reason_classification() {
        assert_eq!(
            SessionReasonCode::StateChangeWithSessionManagementCommands.end_reason(),
            SessionEndReason::Commanded
        );
        assert_eq!(
            SessionReasonCode::ErrorInvalidStsConfig.end_reason(),
            SessionEndReason::Error
        );
    }
}
