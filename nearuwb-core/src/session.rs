//! Ranging session lifecycle and operations.
//!
//! A [`UwbSession`] owns the host-side view of one device session: its
//! state machine, peer list and configuration, and it issues the control
//! requests that drive the device-side session. Sessions are created
//! through [`crate::device::UwbDevice::create_session`] and owned by the
//! application; the device only indexes them.
//!
//! # State machine
//!
//! ```text
//! Deinitialized ──configure()──► Initialized ──start_ranging()──► Active
//!       ▲                             ▲                             │
//!       │                             └────────stop_ranging()──────┘
//!       └──────────── deinitialize() (from any live state)
//! ```
//!
//! `Deinitialized` is re-enterable: a deinitialized session may be
//! configured again from scratch. Operations invalid in the current state
//! are rejected before anything is sent to the device, and a failed channel
//! round trip leaves the state at its last known-good value.

use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;

use crate::channel::{ChannelError, SessionCommands};
use crate::fira::notification::{
    MulticastListStatusNotification, RangingData, UwbNotification,
};
use crate::fira::params::{
    AppConfigParameter, AppConfigParameterType, AppConfigValue, ParamError, ParameterStatus,
};
use crate::fira::status::{
    DeviceType, SessionEndReason, SessionReasonCode, SessionState, SessionType, UwbStatusCode,
};
use crate::mac::UwbMacAddress;

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is not allowed in the current state
    #[error("{operation} is not valid in the {state} state")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The device answered with a non-Ok status
    #[error("Device rejected {operation}: {status}")]
    Rejected {
        operation: &'static str,
        status: UwbStatusCode,
    },

    /// One parameter of a batch was rejected by the device
    #[error("Parameter {parameter_type:?} rejected: {status}")]
    ParameterRejected {
        parameter_type: AppConfigParameterType,
        status: UwbStatusCode,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Param(#[from] ParamError),
}

// =============================================================================
// Observer interface
// =============================================================================

/// Events delivered to a session observer.
///
/// All methods default to no-ops so observers implement only what they need.
/// Registrations hold weak references: an observer whose backing storage is
/// released is silently skipped on the next dispatch.
pub trait UwbSessionEventCallbacks: Send + Sync {
    /// Device-side session state changed
    fn on_session_status_changed(
        &self,
        _session_id: u32,
        _state: SessionState,
        _reason: SessionReasonCode,
    ) {
    }

    /// The session left the `Active`/`Initialized` states for good
    fn on_session_ended(&self, _session_id: u32, _reason: SessionEndReason) {}

    /// A ranging round produced measurements
    fn on_ranging_data(&self, _data: &RangingData) {}

    /// The device reported the outcome of a multicast-list update
    fn on_multicast_list_status(&self, _status: &MulticastListStatusNotification) {}
}

// =============================================================================
// Session
// =============================================================================

struct SessionInner {
    state: SessionState,
    peers: Vec<UwbMacAddress>,
    configuration: Vec<AppConfigParameter>,
    sequence: u32,
    ranging_count: u32,
}

/// Host-side handle to one ranging session.
pub struct UwbSession {
    id: u32,
    session_type: SessionType,
    device_type: DeviceType,
    commands: Arc<dyn SessionCommands>,
    callbacks: Weak<dyn UwbSessionEventCallbacks>,
    inner: Mutex<SessionInner>,
}

impl UwbSession {
    /// Create a session handle.
    ///
    /// Usually called through [`crate::device::UwbDevice::create_session`],
    /// which allocates the id and indexes the session.
    pub fn new(
        id: u32,
        device_type: DeviceType,
        session_type: SessionType,
        commands: Arc<dyn SessionCommands>,
        callbacks: Weak<dyn UwbSessionEventCallbacks>,
    ) -> Self {
        UwbSession {
            id,
            session_type,
            device_type,
            commands,
            callbacks,
            inner: Mutex::new(SessionInner {
                state: SessionState::Deinitialized,
                peers: Vec::new(),
                configuration: Vec::new(),
                sequence: 0,
                ranging_count: 0,
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Session id, unique within the owning device
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Role of the local device in this session
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Kind of session requested at initialization
    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    /// Current host-side state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Current peer list
    pub fn peers(&self) -> Vec<UwbMacAddress> {
        self.lock().peers.clone()
    }

    /// Last applied configuration
    pub fn configuration(&self) -> Vec<AppConfigParameter> {
        self.lock().configuration.clone()
    }

    /// Sequence number of the most recent ranging round
    pub fn sequence(&self) -> u32 {
        self.lock().sequence
    }

    /// Number of ranging rounds observed
    pub fn ranging_count(&self) -> u32 {
        self.lock().ranging_count
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Initialize the device-side session and apply a configuration batch.
    ///
    /// Issues a session-init control request, then transmits all supplied
    /// parameters as one batched set request. Per-parameter failures are
    /// reported in the returned status list, not as an operation failure;
    /// each entry is independently Ok or an error kind.
    pub fn configure(
        &self,
        parameters: &[AppConfigParameter],
    ) -> Result<Vec<ParameterStatus>, SessionError> {
        let state = self.state();
        if state != SessionState::Deinitialized {
            return Err(SessionError::InvalidState {
                operation: "configure",
                state,
            });
        }

        let status = self.commands.session_initialize(self.id, self.session_type)?;
        if !status.is_ok() {
            return Err(SessionError::Rejected {
                operation: "session initialize",
                status,
            });
        }
        self.lock().state = SessionState::Initialized;

        let (status, results) = self
            .commands
            .set_app_config_parameters(self.id, parameters)?;
        if !status.is_ok() {
            return Err(SessionError::Rejected {
                operation: "set configuration parameters",
                status,
            });
        }

        let mut inner = self.lock();
        inner.configuration = parameters.to_vec();
        if let Some(peers) = parameters.iter().find_map(|p| match p.value() {
            AppConfigValue::MacAddressList(addresses)
                if p.parameter_type() == AppConfigParameterType::DstMacAddress =>
            {
                Some(addresses.clone())
            }
            _ => None,
        }) {
            inner.peers = peers;
        }
        Ok(results)
    }

    /// Start ranging. Valid from `Initialized` (and a no-op while `Active`).
    pub fn start_ranging(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Deinitialized => Err(SessionError::InvalidState {
                operation: "start ranging",
                state: SessionState::Deinitialized,
            }),
            SessionState::Active => Ok(()),
            SessionState::Initialized => {
                let status = self.commands.session_ranging_start(self.id)?;
                if !status.is_ok() {
                    return Err(SessionError::Rejected {
                        operation: "start ranging",
                        status,
                    });
                }
                self.lock().state = SessionState::Active;
                Ok(())
            }
        }
    }

    /// Stop ranging. Valid from `Active` (and a no-op while `Initialized`).
    pub fn stop_ranging(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Deinitialized => Err(SessionError::InvalidState {
                operation: "stop ranging",
                state: SessionState::Deinitialized,
            }),
            SessionState::Initialized => Ok(()),
            SessionState::Active => {
                let status = self.commands.session_ranging_stop(self.id)?;
                if !status.is_ok() {
                    return Err(SessionError::Rejected {
                        operation: "stop ranging",
                        status,
                    });
                }
                self.lock().state = SessionState::Initialized;
                Ok(())
            }
        }
    }

    /// Tear the device-side session down.
    ///
    /// Idempotent: deinitializing a deinitialized session succeeds without
    /// touching the channel. On success all host-side session data is
    /// cleared so the session can be configured again from scratch.
    pub fn deinitialize(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Deinitialized {
            return Ok(());
        }
        let status = self.commands.session_deinitialize(self.id)?;
        if !status.is_ok() {
            return Err(SessionError::Rejected {
                operation: "session deinitialize",
                status,
            });
        }
        let mut inner = self.lock();
        inner.state = SessionState::Deinitialized;
        inner.peers.clear();
        inner.configuration.clear();
        inner.sequence = 0;
        inner.ranging_count = 0;
        Ok(())
    }

    /// Add a peer and push the full destination list to the device.
    ///
    /// Peer-list updates are full-replace on the wire: the whole
    /// number-of-controlees + destination-address-list pair is re-sent on
    /// every call, never an incremental diff.
    pub fn add_peer(&self, peer: UwbMacAddress) -> Result<(), SessionError> {
        let state = self.state();
        if state == SessionState::Deinitialized {
            return Err(SessionError::InvalidState {
                operation: "add peer",
                state,
            });
        }

        let peers = {
            let mut inner = self.lock();
            if !inner.peers.contains(&peer) {
                inner.peers.push(peer);
            }
            inner.peers.clone()
        };

        let parameters = [
            AppConfigParameter::number_of_controlees(peers.len() as u8),
            AppConfigParameter::dst_mac_address(peers),
        ];
        let (status, results) = self
            .commands
            .set_app_config_parameters(self.id, &parameters)?;
        if !status.is_ok() {
            return Err(SessionError::Rejected {
                operation: "update peer list",
                status,
            });
        }
        if let Some(bad) = results.iter().find(|r| !r.status.is_ok()) {
            return Err(SessionError::ParameterRejected {
                parameter_type: bad.parameter_type,
                status: bad.status,
            });
        }
        Ok(())
    }

    /// Query the device-side state, without touching the host-side machine
    pub fn query_device_state(&self) -> Result<Option<SessionState>, SessionError> {
        let (status, state) = self.commands.session_get_state(self.id)?;
        if !status.is_ok() {
            return Err(SessionError::Rejected {
                operation: "get session state",
                status,
            });
        }
        Ok(state)
    }

    // -------------------------------------------------------------------------
    // Notification intake
    // -------------------------------------------------------------------------

    /// Apply a routed notification and forward it to this session's
    /// observer. Called by the owning device; frames for other sessions are
    /// ignored.
    pub fn on_notification(&self, notification: &UwbNotification) {
        if notification.session_id() != Some(self.id) {
            return;
        }
        match notification {
            UwbNotification::SessionStatus(status) => {
                let previous = {
                    let mut inner = self.lock();
                    let previous = inner.state;
                    inner.state = status.state;
                    previous
                };
                if let Some(callbacks) = self.callbacks.upgrade() {
                    callbacks.on_session_status_changed(self.id, status.state, status.reason);
                    if status.state == SessionState::Deinitialized
                        && previous != SessionState::Deinitialized
                    {
                        callbacks.on_session_ended(self.id, status.reason.end_reason());
                    }
                }
            }
            UwbNotification::RangingData(data) => {
                {
                    let mut inner = self.lock();
                    inner.sequence = data.sequence_number;
                    inner.ranging_count = inner.ranging_count.saturating_add(1);
                }
                if let Some(callbacks) = self.callbacks.upgrade() {
                    callbacks.on_ranging_data(data);
                }
            }
            UwbNotification::SessionMulticastListStatus(status) => {
                if let Some(callbacks) = self.callbacks.upgrade() {
                    callbacks.on_multicast_list_status(status);
                }
            }
            UwbNotification::GenericStatus(_) | UwbNotification::DeviceStatus(_) => {}
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for UwbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UwbSession")
            .field("id", &self.id)
            .field("device_type", &self.device_type)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted command stub that records every wire interaction.
    #[derive(Default)]
    struct StubCommands {
        set_requests: Mutex<Vec<(u32, Vec<AppConfigParameter>)>>,
        fail_transport: std::sync::atomic::AtomicBool,
        reject_start: std::sync::atomic::AtomicBool,
        param_results: Mutex<Vec<ParameterStatus>>,
    }

    impl StubCommands {
        fn transport_guard(&self) -> Result<(), ChannelError> {
            if self.fail_transport.load(Ordering::SeqCst) {
                Err(ChannelError::Io("injected failure".into()))
            } else {
                Ok(())
            }
        }
    }

    impl SessionCommands for StubCommands {
        fn session_initialize(
            &self,
            _session_id: u32,
            _session_type: SessionType,
        ) -> Result<UwbStatusCode, ChannelError> {
            self.transport_guard()?;
            Ok(UwbStatusCode::Ok)
        }

        fn session_deinitialize(&self, _session_id: u32) -> Result<UwbStatusCode, ChannelError> {
            self.transport_guard()?;
            Ok(UwbStatusCode::Ok)
        }

        fn session_get_state(
            &self,
            _session_id: u32,
        ) -> Result<(UwbStatusCode, Option<SessionState>), ChannelError> {
            Ok((UwbStatusCode::Ok, Some(SessionState::Initialized)))
        }

        fn session_get_ranging_count(
            &self,
            _session_id: u32,
        ) -> Result<(UwbStatusCode, Option<u32>), ChannelError> {
            Ok((UwbStatusCode::Ok, Some(0)))
        }

        fn session_ranging_start(&self, _session_id: u32) -> Result<UwbStatusCode, ChannelError> {
            self.transport_guard()?;
            if self.reject_start.load(Ordering::SeqCst) {
                Ok(UwbStatusCode::SessionNotConfigured)
            } else {
                Ok(UwbStatusCode::Ok)
            }
        }

        fn session_ranging_stop(&self, _session_id: u32) -> Result<UwbStatusCode, ChannelError> {
            self.transport_guard()?;
            Ok(UwbStatusCode::Ok)
        }

        fn session_update_multicast_list(
            &self,
            _session_id: u32,
            _action: crate::fira::status::MulticastAction,
            _controlees: &[UwbMacAddress],
        ) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn set_app_config_parameters(
            &self,
            session_id: u32,
            params: &[AppConfigParameter],
        ) -> Result<(UwbStatusCode, Vec<ParameterStatus>), ChannelError> {
            self.transport_guard()?;
            self.set_requests
                .lock()
                .unwrap()
                .push((session_id, params.to_vec()));
            let scripted = self.param_results.lock().unwrap().clone();
            let results = if scripted.is_empty() {
                params
                    .iter()
                    .map(|p| ParameterStatus {
                        parameter_type: p.parameter_type(),
                        status: UwbStatusCode::Ok,
                    })
                    .collect()
            } else {
                scripted
            };
            Ok((UwbStatusCode::Ok, results))
        }

        fn get_app_config_parameters(
            &self,
            _session_id: u32,
            _types: &[AppConfigParameterType],
        ) -> Result<(UwbStatusCode, Vec<AppConfigParameter>), ChannelError> {
            Ok((UwbStatusCode::Ok, Vec::new()))
        }
    }

    struct CountingObserver {
        status_changes: AtomicU32,
        ranging_rounds: AtomicU32,
        ended: AtomicU32,
    }

    impl CountingObserver {
        fn new() -> Arc<Self> {
            Arc::new(CountingObserver {
                status_changes: AtomicU32::new(0),
                ranging_rounds: AtomicU32::new(0),
                ended: AtomicU32::new(0),
            })
        }
    }

    impl UwbSessionEventCallbacks for CountingObserver {
        fn on_session_status_changed(
            &self,
            _session_id: u32,
            _state: SessionState,
            _reason: SessionReasonCode,
        ) {
            self.status_changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_session_ended(&self, _session_id: u32, _reason: SessionEndReason) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }

        fn on_ranging_data(&self, _data: &RangingData) {
            self.ranging_rounds.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_session(
        commands: &Arc<StubCommands>,
        observer: &Arc<CountingObserver>,
    ) -> UwbSession {
        UwbSession::new(
            1,
            DeviceType::Controller,
            SessionType::RangingSession,
            commands.clone(),
            Arc::downgrade(observer) as Weak<dyn UwbSessionEventCallbacks>,
        )
    }

    #[test]
    fn test_start_ranging_requires_configuration() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);

        let result = session.start_ranging();
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
        assert_eq!(session.state(), SessionState::Deinitialized);
        // Nothing was sent to the device
        assert!(commands.set_requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_configure_then_ranging_lifecycle() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);

        let params = vec![AppConfigParameter::number_of_controlees(1)];
        let results = session.configure(&params).unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
        assert_eq!(results.len(), 1);
        assert!(results[0].status.is_ok());

        session.start_ranging().unwrap();
        assert_eq!(session.state(), SessionState::Active);

        // Starting again is a no-op
        session.start_ranging().unwrap();
        assert_eq!(session.state(), SessionState::Active);

        session.stop_ranging().unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_configure_twice_rejected() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);

        session.configure(&[]).unwrap();
        assert!(matches!(
            session.configure(&[]),
            Err(SessionError::InvalidState { .. })
        ));

        // After deinitialization the session is configurable again
        session.deinitialize().unwrap();
        assert_eq!(session.state(), SessionState::Deinitialized);
        session.configure(&[]).unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_per_parameter_failures_are_reported_individually() {
        let commands = Arc::new(StubCommands::default());
        *commands.param_results.lock().unwrap() = vec![
            ParameterStatus {
                parameter_type: AppConfigParameterType::NumberOfControlees,
                status: UwbStatusCode::Ok,
            },
            ParameterStatus {
                parameter_type: AppConfigParameterType::ChannelNumber,
                status: UwbStatusCode::InvalidRange,
            },
        ];
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);

        let params = vec![
            AppConfigParameter::number_of_controlees(1),
            AppConfigParameter::new(AppConfigParameterType::ChannelNumber, AppConfigValue::U8(3))
                .unwrap(),
        ];
        let results = session.configure(&params).unwrap();
        assert!(results[0].status.is_ok());
        assert_eq!(results[1].status, UwbStatusCode::InvalidRange);
    }

    #[test]
    fn test_channel_failure_leaves_state() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);
        session.configure(&[]).unwrap();

        commands.fail_transport.store(true, Ordering::SeqCst);
        assert!(matches!(
            session.start_ranging(),
            Err(SessionError::Channel(_))
        ));
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_device_rejection_leaves_state() {
        let commands = Arc::new(StubCommands::default());
        commands.reject_start.store(true, Ordering::SeqCst);
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);
        session.configure(&[]).unwrap();

        assert!(matches!(
            session.start_ranging(),
            Err(SessionError::Rejected { .. })
        ));
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_add_peer_sends_full_replacement_list() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);
        session.configure(&[]).unwrap();

        let first = UwbMacAddress::short([0xAA, 0xBB]);
        let second = UwbMacAddress::short([0xCC, 0xDD]);
        session.add_peer(first).unwrap();
        session.add_peer(second).unwrap();

        let requests = commands.set_requests.lock().unwrap();
        // configure + two peer updates
        assert_eq!(requests.len(), 3);
        let (_, last) = &requests[2];
        assert_eq!(last.len(), 2);
        assert_eq!(
            last[0],
            AppConfigParameter::number_of_controlees(2),
            "count covers the whole list"
        );
        assert_eq!(
            last[1],
            AppConfigParameter::dst_mac_address(vec![first, second]),
            "full list, not a diff"
        );
        assert_eq!(session.peers(), vec![first, second]);
    }

    #[test]
    fn test_add_peer_requires_initialized_session() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);
        assert!(matches!(
            session.add_peer(UwbMacAddress::short([1, 2])),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_notifications_update_counters_and_forward() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);

        session.on_notification(&UwbNotification::RangingData(RangingData {
            session_id: 1,
            sequence_number: 5,
            current_ranging_interval_ms: 200,
            measurements: vec![],
        }));
        assert_eq!(session.sequence(), 5);
        assert_eq!(session.ranging_count(), 1);
        assert_eq!(observer.ranging_rounds.load(Ordering::SeqCst), 1);

        // A frame for another session is ignored
        session.on_notification(&UwbNotification::RangingData(RangingData {
            session_id: 2,
            sequence_number: 9,
            current_ranging_interval_ms: 200,
            measurements: vec![],
        }));
        assert_eq!(session.sequence(), 5);
        assert_eq!(observer.ranging_rounds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_ended_fires_on_deinit_notification() {
        use crate::fira::notification::SessionStatusNotification;

        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);
        session.configure(&[]).unwrap();

        session.on_notification(&UwbNotification::SessionStatus(SessionStatusNotification {
            session_id: 1,
            state: SessionState::Deinitialized,
            reason: SessionReasonCode::MaxRangingRoundRetryCountReached,
        }));
        assert_eq!(observer.status_changes.load(Ordering::SeqCst), 1);
        assert_eq!(observer.ended.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Deinitialized);
    }

    #[test]
    fn test_dropped_observer_is_skipped_silently() {
        let commands = Arc::new(StubCommands::default());
        let observer = CountingObserver::new();
        let session = make_session(&commands, &observer);
        drop(observer);

        // Dispatch does not fail, the callback is simply gone
        session.on_notification(&UwbNotification::RangingData(RangingData {
            session_id: 1,
            sequence_number: 1,
            current_ranging_interval_ms: 100,
            measurements: vec![],
        }));
        assert_eq!(session.ranging_count(), 1);
    }
}
