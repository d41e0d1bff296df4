//! Device capabilities and identification.
//!
//! [`UwbCapability`] describes what a device can do (roles, node topologies,
//! STS modes, channels); [`UwbDeviceInformation`] identifies the protocol
//! stack it runs. Both are produced by the device in response to the
//! corresponding control requests and cached host-side by the device object.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::command::CommandError;
use super::{find_tag, read_u16, tlv_bytes, tlv_u16, tlv_u8};
use crate::tlv::TlvBer;

// =============================================================================
// Capability flags
// =============================================================================

bitflags! {
    /// Session roles the device can take
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceRoleCapability: u8 {
        const RESPONDER = 0b0000_0001;
        const INITIATOR = 0b0000_0010;
    }
}

bitflags! {
    /// Node topologies the device supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MultiNodeCapability: u8 {
        const UNICAST      = 0b0000_0001;
        const ONE_TO_MANY  = 0b0000_0010;
        const MANY_TO_MANY = 0b0000_0100;
    }
}

bitflags! {
    /// Supported STS configurations
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StsCapability: u8 {
        const STATIC                         = 0b0000_0001;
        const DYNAMIC                        = 0b0000_0010;
        const DYNAMIC_RESPONDER_SPECIFIC_KEY = 0b0000_0100;
        const PROVISIONED                    = 0b0000_1000;
    }
}

bitflags! {
    /// Supported ranging methods
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RangingMethodCapability: u8 {
        const ONE_WAY    = 0b0000_0001;
        const SS_TWR     = 0b0000_0010;
        const DS_TWR     = 0b0000_0100;
    }
}

bitflags! {
    /// Angle-of-arrival measurement support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AoaCapability: u8 {
        const AZIMUTH_90  = 0b0000_0001;
        const AZIMUTH_180 = 0b0000_0010;
        const ELEVATION   = 0b0000_0100;
        const FOM         = 0b0000_1000;
    }
}

// =============================================================================
// Wire tags
// =============================================================================

const TAG_DEVICE_ROLES: u8 = 0x90;
const TAG_MULTI_NODE_MODES: u8 = 0x91;
const TAG_STS_CONFIGURATIONS: u8 = 0x92;
const TAG_RANGING_METHODS: u8 = 0x93;
const TAG_AOA_SUPPORT: u8 = 0x94;
const TAG_CHANNELS: u8 = 0x95;
const TAG_EXTENDED_MAC: u8 = 0x96;
const TAG_UCI_VERSION: u8 = 0x97;
const TAG_MAC_VERSION: u8 = 0x98;
const TAG_PHY_VERSION: u8 = 0x99;
const TAG_UCI_TEST_VERSION: u8 = 0x9A;
const TAG_VENDOR_INFO: u8 = 0x9B;

// =============================================================================
// Capability record
// =============================================================================

/// FiRa capability flags reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UwbCapability {
    pub device_roles: DeviceRoleCapability,
    pub multi_node_modes: MultiNodeCapability,
    pub sts_configurations: StsCapability,
    pub ranging_methods: RangingMethodCapability,
    pub aoa_support: AoaCapability,
    /// Supported channel numbers
    pub channels: Vec<u8>,
    /// Whether 8-byte extended MAC addresses are supported
    pub extended_mac_address: bool,
}

impl Default for UwbCapability {
    fn default() -> Self {
        UwbCapability {
            device_roles: DeviceRoleCapability::empty(),
            multi_node_modes: MultiNodeCapability::empty(),
            sts_configurations: StsCapability::empty(),
            ranging_methods: RangingMethodCapability::empty(),
            aoa_support: AoaCapability::empty(),
            channels: Vec::new(),
            extended_mac_address: false,
        }
    }
}

impl UwbCapability {
    /// Encode as a flat record sequence for a capabilities response
    pub(crate) fn to_tlvs(&self) -> Vec<TlvBer> {
        vec![
            tlv_u8(TAG_DEVICE_ROLES, self.device_roles.bits()),
            tlv_u8(TAG_MULTI_NODE_MODES, self.multi_node_modes.bits()),
            tlv_u8(TAG_STS_CONFIGURATIONS, self.sts_configurations.bits()),
            tlv_u8(TAG_RANGING_METHODS, self.ranging_methods.bits()),
            tlv_u8(TAG_AOA_SUPPORT, self.aoa_support.bits()),
            tlv_bytes(TAG_CHANNELS, &self.channels),
            tlv_u8(TAG_EXTENDED_MAC, u8::from(self.extended_mac_address)),
        ]
    }

    /// Decode from the record sequence of a capabilities response.
    ///
    /// Absent fields default to empty; unknown bits are truncated.
    pub(crate) fn from_tlvs(records: &[TlvBer]) -> Result<Self, CommandError> {
        let flag_byte = |tag: u8, field: &'static str| -> Result<u8, CommandError> {
            match find_tag(records, tag) {
                Some(record) => super::read_u8(record, field),
                None => Ok(0),
            }
        };

        Ok(UwbCapability {
            device_roles: DeviceRoleCapability::from_bits_truncate(flag_byte(
                TAG_DEVICE_ROLES,
                "device roles",
            )?),
            multi_node_modes: MultiNodeCapability::from_bits_truncate(flag_byte(
                TAG_MULTI_NODE_MODES,
                "multi-node modes",
            )?),
            sts_configurations: StsCapability::from_bits_truncate(flag_byte(
                TAG_STS_CONFIGURATIONS,
                "STS configurations",
            )?),
            ranging_methods: RangingMethodCapability::from_bits_truncate(flag_byte(
                TAG_RANGING_METHODS,
                "ranging methods",
            )?),
            aoa_support: AoaCapability::from_bits_truncate(flag_byte(
                TAG_AOA_SUPPORT,
                "AoA support",
            )?),
            channels: find_tag(records, TAG_CHANNELS)
                .map(|r| r.value.clone())
                .unwrap_or_default(),
            extended_mac_address: flag_byte(TAG_EXTENDED_MAC, "extended MAC")? != 0,
        })
    }
}

// =============================================================================
// Device information
// =============================================================================

/// Protocol stack versions reported by the device.
///
/// Version fields are binary-coded `major.minor` pairs as reported.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UwbDeviceInformation {
    pub uci_version: u16,
    pub mac_version: u16,
    pub phy_version: u16,
    pub uci_test_version: u16,
    /// Opaque vendor-specific blob
    pub vendor_specific_info: Vec<u8>,
}

impl UwbDeviceInformation {
    pub(crate) fn to_tlvs(&self) -> Vec<TlvBer> {
        vec![
            tlv_u16(TAG_UCI_VERSION, self.uci_version),
            tlv_u16(TAG_MAC_VERSION, self.mac_version),
            tlv_u16(TAG_PHY_VERSION, self.phy_version),
            tlv_u16(TAG_UCI_TEST_VERSION, self.uci_test_version),
            tlv_bytes(TAG_VENDOR_INFO, &self.vendor_specific_info),
        ]
    }

    pub(crate) fn from_tlvs(records: &[TlvBer]) -> Result<Self, CommandError> {
        let version = |tag: u8, field: &'static str| -> Result<u16, CommandError> {
            match find_tag(records, tag) {
                Some(record) => read_u16(record, field),
                None => Err(CommandError::MissingField(field)),
            }
        };

        Ok(UwbDeviceInformation {
            uci_version: version(TAG_UCI_VERSION, "UCI version")?,
            mac_version: version(TAG_MAC_VERSION, "MAC version")?,
            phy_version: version(TAG_PHY_VERSION, "PHY version")?,
            uci_test_version: version(TAG_UCI_TEST_VERSION, "UCI test version")?,
            vendor_specific_info: find_tag(records, TAG_VENDOR_INFO)
                .map(|r| r.value.clone())
                .unwrap_or_default(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_roundtrip() {
        let capability = UwbCapability {
            device_roles: DeviceRoleCapability::RESPONDER | DeviceRoleCapability::INITIATOR,
            multi_node_modes: MultiNodeCapability::UNICAST | MultiNodeCapability::ONE_TO_MANY,
            sts_configurations: StsCapability::STATIC,
            ranging_methods: RangingMethodCapability::DS_TWR,
            aoa_support: AoaCapability::AZIMUTH_90 | AoaCapability::ELEVATION,
            channels: vec![5, 6, 8, 9],
            extended_mac_address: true,
        };
        let records = capability.to_tlvs();
        assert_eq!(UwbCapability::from_tlvs(&records).unwrap(), capability);
    }

    #[test]
    fn test_capability_defaults_for_absent_fields() {
        let capability = UwbCapability::from_tlvs(&[]).unwrap();
        assert_eq!(capability, UwbCapability::default());
    }

    #[test]
    fn test_device_information_roundtrip() {
        let info = UwbDeviceInformation {
            uci_version: 0x0101,
            mac_version: 0x0130,
            phy_version: 0x0131,
            uci_test_version: 0x0101,
            vendor_specific_info: vec![0xDE, 0xAD],
        };
        let records = info.to_tlvs();
        assert_eq!(UwbDeviceInformation::from_tlvs(&records).unwrap(), info);
    }

    #[test]
    fn test_device_information_requires_versions() {
        assert!(matches!(
            UwbDeviceInformation::from_tlvs(&[]),
            Err(CommandError::MissingField(_))
        ));
    }
}
