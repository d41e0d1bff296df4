//! UWB MAC addresses.
//!
//! FiRa peers are addressed with IEEE 802.15.4 addresses in either the
//! 2-byte short form or the 8-byte extended form. Addresses are carried on
//! the wire as raw byte sequences in network order.

use core::fmt;
use serde::{Deserialize, Serialize};

/// A UWB device address, short or extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UwbMacAddress {
    /// 2-byte short address
    Short([u8; 2]),
    /// 8-byte extended address
    Extended([u8; 8]),
}

impl UwbMacAddress {
    /// Byte length of a short address
    pub const SHORT_LENGTH: usize = 2;

    /// Byte length of an extended address
    pub const EXTENDED_LENGTH: usize = 8;

    /// Create a short address
    pub fn short(bytes: [u8; 2]) -> Self {
        UwbMacAddress::Short(bytes)
    }

    /// Create an extended address
    pub fn extended(bytes: [u8; 8]) -> Self {
        UwbMacAddress::Extended(bytes)
    }

    /// Length of this address in bytes
    pub fn len(&self) -> usize {
        match self {
            UwbMacAddress::Short(_) => Self::SHORT_LENGTH,
            UwbMacAddress::Extended(_) => Self::EXTENDED_LENGTH,
        }
    }

    /// Always false; addresses have a fixed non-zero size
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The raw address bytes in network order
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UwbMacAddress::Short(bytes) => bytes,
            UwbMacAddress::Extended(bytes) => bytes,
        }
    }

    /// Reconstruct an address from raw bytes.
    ///
    /// Returns `None` unless the slice is exactly 2 or 8 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            Self::SHORT_LENGTH => {
                let mut value = [0u8; 2];
                value.copy_from_slice(bytes);
                Some(UwbMacAddress::Short(value))
            }
            Self::EXTENDED_LENGTH => {
                let mut value = [0u8; 8];
                value.copy_from_slice(bytes);
                Some(UwbMacAddress::Extended(value))
            }
            _ => None,
        }
    }
}

impl fmt::Display for UwbMacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.as_bytes();
        for (i, byte) in bytes.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
