//! Channel boundary and connector interfaces.
//!
//! This module defines the two seams that keep the protocol core free of
//! platform code, in the same spirit as an I/O-provider abstraction:
//!
//! - [`UwbChannel`] is the raw device channel: a synchronous control
//!   round-trip primitive and a blocking, cancelable notification read.
//!   Back-ends implement this over whatever transport the driver exposes
//!   (a simulator, a character device, ...).
//! - [`DeviceCommands`] / [`SessionCommands`] are the typed command surface
//!   a connector offers on top of a channel. Device and session objects in
//!   this crate depend only on these traits.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  nearuwb-core (no I/O)                                       │
//! │   UwbDevice / UwbSession ──► DeviceCommands/SessionCommands  │
//! └───────────────────────────────────────┬──────────────────────┘
//!                                         │ implemented by
//!                             ┌───────────▼───────────┐
//!                             │  nearuwb-connector    │
//!                             │  UwbConnector ──► UwbChannel
//!                             └───────────────────────┘
//! ```

use thiserror::Error;

use crate::device::UwbDeviceEventCallbacks;
use crate::fira::capability::{UwbCapability, UwbDeviceInformation};
use crate::fira::command::{CommandError, ControlOp};
use crate::fira::params::{AppConfigParameter, AppConfigParameterType, ParameterStatus};
use crate::fira::status::{MulticastAction, SessionState, SessionType, UwbStatusCode};
use crate::mac::UwbMacAddress;
use crate::session::UwbSessionEventCallbacks;
use std::sync::Weak;

// =============================================================================
// Errors
// =============================================================================

/// Transport-level failures of the device channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel has been shut down; no further traffic is possible
    #[error("Channel is closed")]
    Closed,

    /// A pending notification read was canceled
    #[error("Pending read was canceled")]
    Canceled,

    /// Transport I/O failure
    #[error("Channel I/O failure: {0}")]
    Io(String),

    /// The device produced bytes this layer cannot understand
    #[error("Malformed device payload: {0}")]
    Malformed(String),
}

impl From<CommandError> for ChannelError {
    fn from(e: CommandError) -> Self {
        ChannelError::Malformed(e.to_string())
    }
}

// =============================================================================
// Raw channel
// =============================================================================

/// A logical communication channel to a UWB driver.
///
/// Exactly two operation shapes exist at this boundary: a synchronous
/// control request/response round trip and an asynchronous notification
/// read. The core depends on nothing else about the transport.
pub trait UwbChannel: Send + Sync {
    /// Issue a control request and block until the device responds.
    ///
    /// The payload and the returned response are BER-TLV encoded per
    /// [`crate::fira::command`].
    fn request(&self, op: ControlOp, payload: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Block until the next notification frame arrives.
    ///
    /// Returns a complete frame. Fails with [`ChannelError::Canceled`] when
    /// [`UwbChannel::cancel_read`] interrupts the wait and with
    /// [`ChannelError::Closed`] when the channel shuts down.
    fn read_notification(&self) -> Result<Vec<u8>, ChannelError>;

    /// Wake a blocked [`UwbChannel::read_notification`] call.
    fn cancel_read(&self);

    /// Stable identity of the backing device.
    ///
    /// Two devices are the same device iff their identities are equal.
    fn identity(&self) -> &str;
}

// =============================================================================
// Callback registration
// =============================================================================

/// Opaque handle for deregistering an event callback.
///
/// Tokens are unique per registration. Deregistering with a stale or unknown
/// token is a no-op, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub(crate) u64);

impl CallbackToken {
    /// Construct a token from its raw id. Intended for connector
    /// implementations; application code only receives tokens.
    pub fn from_raw(id: u64) -> Self {
        CallbackToken(id)
    }

    /// The raw registration id
    pub fn raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Typed command surface
// =============================================================================

/// Device-scoped control requests
pub trait DeviceCommands: Send + Sync {
    /// Reset the device to a clean state, dropping all sessions
    fn reset(&self) -> Result<UwbStatusCode, ChannelError>;

    /// Query protocol stack versions
    fn get_device_information(
        &self,
    ) -> Result<(UwbStatusCode, Option<UwbDeviceInformation>), ChannelError>;

    /// Query FiRa capability flags
    fn get_capabilities(&self) -> Result<(UwbStatusCode, Option<UwbCapability>), ChannelError>;

    /// Number of sessions currently tracked by the device
    fn get_session_count(&self) -> Result<(UwbStatusCode, u32), ChannelError>;
}

/// Session-scoped control requests
pub trait SessionCommands: Send + Sync {
    fn session_initialize(
        &self,
        session_id: u32,
        session_type: SessionType,
    ) -> Result<UwbStatusCode, ChannelError>;

    fn session_deinitialize(&self, session_id: u32) -> Result<UwbStatusCode, ChannelError>;

    fn session_get_state(
        &self,
        session_id: u32,
    ) -> Result<(UwbStatusCode, Option<SessionState>), ChannelError>;

    fn session_get_ranging_count(
        &self,
        session_id: u32,
    ) -> Result<(UwbStatusCode, Option<u32>), ChannelError>;

    fn session_ranging_start(&self, session_id: u32) -> Result<UwbStatusCode, ChannelError>;

    fn session_ranging_stop(&self, session_id: u32) -> Result<UwbStatusCode, ChannelError>;

    fn session_update_multicast_list(
        &self,
        session_id: u32,
        action: MulticastAction,
        controlees: &[UwbMacAddress],
    ) -> Result<UwbStatusCode, ChannelError>;

    /// Apply a batch of configuration parameters.
    ///
    /// The second element carries one status per parameter; individual
    /// parameters fail independently.
    fn set_app_config_parameters(
        &self,
        session_id: u32,
        params: &[AppConfigParameter],
    ) -> Result<(UwbStatusCode, Vec<ParameterStatus>), ChannelError>;

    /// Read configured parameters back
    fn get_app_config_parameters(
        &self,
        session_id: u32,
        types: &[AppConfigParameterType],
    ) -> Result<(UwbStatusCode, Vec<AppConfigParameter>), ChannelError>;
}

/// Full connector surface consumed by [`crate::device::UwbDevice`]:
/// typed commands plus token-based callback registration.
pub trait UwbDriverConnector: DeviceCommands + SessionCommands {
    /// Register device-level observers. The registration holds only a weak
    /// reference; a dropped observer is silently skipped on later dispatch.
    fn register_device_event_callbacks(
        &self,
        callbacks: Weak<dyn UwbDeviceEventCallbacks>,
    ) -> CallbackToken;

    /// Register observers for one session id
    fn register_session_event_callbacks(
        &self,
        session_id: u32,
        callbacks: Weak<dyn UwbSessionEventCallbacks>,
    ) -> CallbackToken;

    /// Remove a registration. Safe to call with a stale token.
    fn deregister_event_callback(&self, token: CallbackToken);

    /// Identity of the backing device, forwarded from the channel
    fn device_name(&self) -> &str;
}
