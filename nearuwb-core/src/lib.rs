//! # NearUWB Core
//!
//! Platform-independent protocol library for controlling Ultra-Wideband
//! (UWB) ranging radios.
//!
//! This crate contains pure codec and protocol logic with **zero I/O
//! dependencies**: everything that touches an operating system - the driver
//! channel, the notification listener thread, async wrappers - lives in
//! `nearuwb-connector`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  nearuwb-core (platform-independent, no tokio/async deps)   │
//! │  ├── tlv/        (BER-TLV codec)                            │
//! │  ├── fira/       (parameters, commands, notifications)      │
//! │  ├── session/    (session state machine & operations)       │
//! │  ├── device/     (session table, routing, capabilities)     │
//! │  └── UwbChannel  (abstracts the driver channel)             │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!               ┌────────────┴────────────┐
//!               │  nearuwb-connector      │
//!               │  (listener thread,      │
//!               │   simulator, chardev)   │
//!               └─────────────────────────┘
//! ```
//!
//! Data flows application → [`UwbSession`]/[`UwbDevice`] → parameter
//! marshaling ([`fira::params`]) → TLV codec ([`tlv`]) → channel write.
//! Inbound, the connector's listener decodes notification frames
//! ([`fira::notification`]) and fans them out to device- and session-level
//! observers.
//!
//! ## Key Modules
//!
//! - [`tlv`] - BER-TLV parsing, building and serialization
//! - [`fira`] - FiRa protocol types: status codes, the application
//!   configuration parameter catalog, control framing, notifications
//! - [`session`] - Ranging session lifecycle
//! - [`device`] - Device object with notification routing
//! - [`channel`] - Channel boundary and connector traits
//! - [`profile`] - Opaque near-object connection profiles
//!
//! ## Example: Building a TLV Record
//!
//! ```rust
//! use nearuwb_core::tlv::TlvBer;
//!
//! let record = TlvBer::builder()
//!     .set_tag([0x93])
//!     .set_value([0x01, 0x02])
//!     .build()
//!     .unwrap();
//! assert_eq!(record.to_bytes(), vec![0x93, 0x02, 0x01, 0x02]);
//! ```
//!
//! ## Example: Marshaling a Configuration Parameter
//!
//! ```rust
//! use nearuwb_core::fira::params::AppConfigParameter;
//! use nearuwb_core::mac::UwbMacAddress;
//!
//! let param = AppConfigParameter::dst_mac_address(vec![
//!     UwbMacAddress::short([0xAA, 0xBB]),
//!     UwbMacAddress::short([0xCC, 0xDD]),
//! ]);
//! assert_eq!(param.to_tlv().value, vec![0xAA, 0xBB, 0xCC, 0xDD]);
//! ```

pub mod channel;
pub mod device;
pub mod fira;
pub mod mac;
pub mod profile;
pub mod session;
pub mod tlv;

// Re-export commonly used types
pub use channel::{
    CallbackToken, ChannelError, DeviceCommands, SessionCommands, UwbChannel, UwbDriverConnector,
};
pub use device::{DeviceStatus, UwbDevice, UwbDeviceEventCallbacks};
pub use fira::capability::{UwbCapability, UwbDeviceInformation};
pub use fira::notification::{RangingData, RangingMeasurement, UwbNotification};
pub use fira::params::{
    AppConfigParameter, AppConfigParameterType, AppConfigValue, ParamError, ParameterStatus,
};
pub use fira::status::{
    DeviceType, MulticastAction, SessionEndReason, SessionReasonCode, SessionState, SessionType,
    UwbDeviceState, UwbStatusCode,
};
pub use mac::UwbMacAddress;
pub use profile::{NearObjectConnectionScope, NearObjectProfile, NearObjectProfileSecurity};
pub use session::{SessionError, UwbSession, UwbSessionEventCallbacks};
pub use tlv::{TlvBer, TlvError};
