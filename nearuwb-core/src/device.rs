//! UWB device: session table, status and notification routing.
//!
//! A [`UwbDevice`] fronts one physical radio reached through a connector.
//! It creates sessions, indexes them by id (holding only weak references -
//! sessions are owned by the application), caches device capabilities and
//! routes inbound notifications:
//!
//! - generic status reports update the last-error field and go to
//!   device-level observers;
//! - device status changes update the device state and go to device-level
//!   observers;
//! - session-scoped notifications are routed to the session with the
//!   embedded id; frames for unknown ids are dropped, counted in a
//!   diagnostic, and never fatal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::channel::{CallbackToken, ChannelError, SessionCommands, UwbDriverConnector};
use crate::fira::capability::{UwbCapability, UwbDeviceInformation};
use crate::fira::notification::UwbNotification;
use crate::fira::status::{DeviceType, SessionType, UwbDeviceState, UwbStatusCode};
use crate::session::{UwbSession, UwbSessionEventCallbacks};

// =============================================================================
// Observer interface
// =============================================================================

/// Events delivered to device-level observers.
///
/// All methods default to no-ops. Registrations hold weak references, so a
/// dropped observer is skipped silently on the next dispatch.
pub trait UwbDeviceEventCallbacks: Send + Sync {
    /// A generic status report arrived
    fn on_status_changed(&self, _status: UwbStatusCode) {}

    /// The device's operational state changed
    fn on_device_status_changed(&self, _state: UwbDeviceState) {}

    /// A session-scoped notification arrived (routing happens downstream)
    fn on_session_notification(&self, _notification: &UwbNotification) {}
}

// =============================================================================
// Status
// =============================================================================

/// Device state plus the last generic error reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub state: UwbDeviceState,
    pub last_error: UwbStatusCode,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus {
            state: UwbDeviceState::Uninitialized,
            last_error: UwbStatusCode::Ok,
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// Host-side handle to one UWB radio.
pub struct UwbDevice {
    connector: Arc<dyn UwbDriverConnector>,
    session_commands: Arc<dyn SessionCommands>,
    sessions: RwLock<HashMap<u32, Weak<UwbSession>>>,
    next_session_id: AtomicU32,
    status: Mutex<DeviceStatus>,
    capabilities: Mutex<Option<UwbCapability>>,
    callbacks: Mutex<Vec<Weak<dyn UwbDeviceEventCallbacks>>>,
    routing_misses: AtomicU64,
    registration: Mutex<Option<CallbackToken>>,
}

impl UwbDevice {
    /// Create a device bound to a connector and subscribe it to the
    /// connector's notification stream.
    pub fn new<C>(connector: Arc<C>) -> Arc<UwbDevice>
    where
        C: UwbDriverConnector + 'static,
    {
        let device = Arc::new(UwbDevice {
            connector: connector.clone() as Arc<dyn UwbDriverConnector>,
            session_commands: connector as Arc<dyn SessionCommands>,
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU32::new(1),
            status: Mutex::new(DeviceStatus::default()),
            capabilities: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            routing_misses: AtomicU64::new(0),
            registration: Mutex::new(None),
        });
        let token = device
            .connector
            .register_device_event_callbacks(Arc::downgrade(&device) as Weak<dyn UwbDeviceEventCallbacks>);
        *lock(&device.registration) = Some(token);
        device
    }

    /// Identity of the backing physical device
    pub fn name(&self) -> &str {
        self.connector.device_name()
    }

    /// Current device status snapshot
    pub fn status(&self) -> DeviceStatus {
        *lock(&self.status)
    }

    /// Number of session-scoped notifications dropped for lack of a
    /// matching session. Diagnostic only.
    pub fn routing_misses(&self) -> u64 {
        self.routing_misses.load(Ordering::Relaxed)
    }

    /// Register an additional device-level observer
    pub fn add_callbacks(&self, callbacks: Weak<dyn UwbDeviceEventCallbacks>) {
        lock(&self.callbacks).push(callbacks);
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Create a new ranging session with no configuration and no peers.
    ///
    /// The session id is device-assigned from a monotonic counter. The
    /// returned session is owned by the caller; the device keeps a weak
    /// index entry for notification routing.
    pub fn create_session(
        &self,
        device_type: DeviceType,
        callbacks: Weak<dyn UwbSessionEventCallbacks>,
    ) -> Arc<UwbSession> {
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(UwbSession::new(
            id,
            device_type,
            SessionType::RangingSession,
            self.session_commands.clone(),
            callbacks,
        ));
        let mut sessions = write(&self.sessions);
        sessions.retain(|_, weak| weak.strong_count() > 0);
        sessions.insert(id, Arc::downgrade(&session));
        session
    }

    /// Look a live session up by id
    pub fn session(&self, session_id: u32) -> Option<Arc<UwbSession>> {
        read(&self.sessions).get(&session_id).and_then(Weak::upgrade)
    }

    /// Ids of sessions that are still alive
    pub fn session_ids(&self) -> Vec<u32> {
        read(&self.sessions)
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Device-level requests
    // -------------------------------------------------------------------------

    /// Reset the device. All device-side sessions are dropped.
    pub fn reset(&self) -> Result<UwbStatusCode, ChannelError> {
        let status = self.connector.reset()?;
        if status.is_ok() {
            lock(&self.status).state = UwbDeviceState::Ready;
            *lock(&self.capabilities) = None;
        }
        Ok(status)
    }

    /// Query the protocol stack versions
    pub fn device_information(
        &self,
    ) -> Result<(UwbStatusCode, Option<UwbDeviceInformation>), ChannelError> {
        self.connector.get_device_information()
    }

    /// FiRa capabilities, queried once and cached
    pub fn get_capabilities(&self) -> Result<Option<UwbCapability>, ChannelError> {
        if let Some(cached) = lock(&self.capabilities).clone() {
            return Ok(Some(cached));
        }
        let (status, capability) = self.connector.get_capabilities()?;
        if status.is_ok() {
            *lock(&self.capabilities) = capability.clone();
        }
        Ok(capability)
    }

    /// Number of sessions the device currently tracks
    pub fn session_count(&self) -> Result<(UwbStatusCode, u32), ChannelError> {
        self.connector.get_session_count()
    }

    // -------------------------------------------------------------------------
    // Notification routing
    // -------------------------------------------------------------------------

    /// Dispatch point for inbound notifications.
    ///
    /// Device-level kinds update local status and fan out to device-level
    /// observers; session-scoped kinds are routed by embedded session id.
    pub fn on_uwb_notification(&self, notification: &UwbNotification) {
        match notification {
            UwbNotification::GenericStatus(status) => {
                lock(&self.status).last_error = *status;
                self.for_each_observer(|observer| observer.on_status_changed(*status));
            }
            UwbNotification::DeviceStatus(state) => {
                lock(&self.status).state = *state;
                self.for_each_observer(|observer| observer.on_device_status_changed(*state));
            }
            UwbNotification::SessionStatus(_)
            | UwbNotification::SessionMulticastListStatus(_)
            | UwbNotification::RangingData(_) => self.route_session_notification(notification),
        }
    }

    fn route_session_notification(&self, notification: &UwbNotification) {
        let Some(session_id) = notification.session_id() else {
            return;
        };
        let session = read(&self.sessions).get(&session_id).and_then(Weak::upgrade);
        match session {
            Some(session) => session.on_notification(notification),
            None => {
                // Unroutable frames are dropped, never fatal
                self.routing_misses.fetch_add(1, Ordering::Relaxed);
                write(&self.sessions).retain(|_, weak| weak.strong_count() > 0);
            }
        }
    }

    /// Snapshot live observers, dropping the dead, then invoke outside the
    /// lock.
    fn for_each_observer(&self, f: impl Fn(&Arc<dyn UwbDeviceEventCallbacks>)) {
        let live: Vec<Arc<dyn UwbDeviceEventCallbacks>> = {
            let mut callbacks = lock(&self.callbacks);
            callbacks.retain(|weak| weak.strong_count() > 0);
            callbacks.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in &live {
            f(observer);
        }
    }
}

impl Drop for UwbDevice {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.registration).take() {
            self.connector.deregister_event_callback(token);
        }
    }
}

impl UwbDeviceEventCallbacks for UwbDevice {
    fn on_status_changed(&self, status: UwbStatusCode) {
        self.on_uwb_notification(&UwbNotification::GenericStatus(status));
    }

    fn on_device_status_changed(&self, state: UwbDeviceState) {
        self.on_uwb_notification(&UwbNotification::DeviceStatus(state));
    }

    fn on_session_notification(&self, notification: &UwbNotification) {
        self.route_session_notification(notification);
    }
}

/// Two devices are equal iff they are backed by the same physical identity,
/// not by configuration contents.
impl PartialEq for UwbDevice {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for UwbDevice {}

impl std::fmt::Debug for UwbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UwbDevice")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("sessions", &self.session_ids())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DeviceCommands, SessionCommands};
    use crate::fira::notification::{RangingData, SessionStatusNotification};
    use crate::fira::params::{AppConfigParameter, AppConfigParameterType, ParameterStatus};
    use crate::fira::status::{MulticastAction, SessionReasonCode, SessionState};
    use crate::mac::UwbMacAddress;
    use std::sync::atomic::AtomicU32;

    /// Connector stub: every command succeeds, registrations are recorded.
    struct StubConnector {
        name: String,
        capability_queries: AtomicU32,
    }

    impl StubConnector {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(StubConnector {
                name: name.to_string(),
                capability_queries: AtomicU32::new(0),
            })
        }
    }

    impl DeviceCommands for StubConnector {
        fn reset(&self) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn get_device_information(
            &self,
        ) -> Result<(UwbStatusCode, Option<UwbDeviceInformation>), ChannelError> {
            Ok((UwbStatusCode::Ok, Some(UwbDeviceInformation::default())))
        }

        fn get_capabilities(
            &self,
        ) -> Result<(UwbStatusCode, Option<UwbCapability>), ChannelError> {
            self.capability_queries.fetch_add(1, Ordering::SeqCst);
            Ok((UwbStatusCode::Ok, Some(UwbCapability::default())))
        }

        fn get_session_count(&self) -> Result<(UwbStatusCode, u32), ChannelError> {
            Ok((UwbStatusCode::Ok, 0))
        }
    }

    impl SessionCommands for StubConnector {
        fn session_initialize(
            &self,
            _session_id: u32,
            _session_type: SessionType,
        ) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn session_deinitialize(&self, _session_id: u32) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn session_get_state(
            &self,
            _session_id: u32,
        ) -> Result<(UwbStatusCode, Option<SessionState>), ChannelError> {
            Ok((UwbStatusCode::Ok, None))
        }

        fn session_get_ranging_count(
            &self,
            _session_id: u32,
        ) -> Result<(UwbStatusCode, Option<u32>), ChannelError> {
            Ok((UwbStatusCode::Ok, None))
        }

        fn session_ranging_start(&self, _session_id: u32) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn session_ranging_stop(&self, _session_id: u32) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn session_update_multicast_list(
            &self,
            _session_id: u32,
            _action: MulticastAction,
            _controlees: &[UwbMacAddress],
        ) -> Result<UwbStatusCode, ChannelError> {
            Ok(UwbStatusCode::Ok)
        }

        fn set_app_config_parameters(
            &self,
            _session_id: u32,
            params: &[AppConfigParameter],
        ) -> Result<(UwbStatusCode, Vec<ParameterStatus>), ChannelError> {
            Ok((
                UwbStatusCode::Ok,
                params
                    .iter()
                    .map(|p| ParameterStatus {
                        parameter_type: p.parameter_type(),
                        status: UwbStatusCode::Ok,
                    })
                    .collect(),
            ))
        }

        fn get_app_config_parameters(
            &self,
            _session_id: u32,
            _types: &[AppConfigParameterType],
        ) -> Result<(UwbStatusCode, Vec<AppConfigParameter>), ChannelError> {
            Ok((UwbStatusCode::Ok, Vec::new()))
        }
    }

    impl UwbDriverConnector for StubConnector {
        fn register_device_event_callbacks(
            &self,
            _callbacks: Weak<dyn UwbDeviceEventCallbacks>,
        ) -> CallbackToken {
            CallbackToken::from_raw(1)
        }

        fn register_session_event_callbacks(
            &self,
            _session_id: u32,
            _callbacks: Weak<dyn UwbSessionEventCallbacks>,
        ) -> CallbackToken {
            CallbackToken::from_raw(2)
        }

        fn deregister_event_callback(&self, _token: CallbackToken) {}

        fn device_name(&self) -> &str {
            &self.name
        }
    }

    struct SessionProbe {
        rounds: AtomicU32,
    }

    impl SessionProbe {
        fn new() -> Arc<Self> {
            Arc::new(SessionProbe {
                rounds: AtomicU32::new(0),
            })
        }
    }

    impl UwbSessionEventCallbacks for SessionProbe {
        fn on_ranging_data(&self, _data: &RangingData) {
            self.rounds.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ranging_frame(session_id: u32) -> UwbNotification {
        UwbNotification::RangingData(RangingData {
            session_id,
            sequence_number: 1,
            current_ranging_interval_ms: 100,
            measurements: vec![],
        })
    }

    #[test]
    fn test_create_session_assigns_unique_ids() {
        let device = UwbDevice::new(StubConnector::new("uwb0"));
        let probe = SessionProbe::new();
        let a = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&probe) as Weak<dyn UwbSessionEventCallbacks>,
        );
        let b = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&probe) as Weak<dyn UwbSessionEventCallbacks>,
        );
        assert_ne!(a.id(), b.id());
        assert_eq!(device.session_ids().len(), 2);
        assert!(device.session(a.id()).is_some());
    }

    #[test]
    fn test_dispatch_isolation_between_sessions() {
        let device = UwbDevice::new(StubConnector::new("uwb0"));
        let probe_a = SessionProbe::new();
        let probe_b = SessionProbe::new();
        let a = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&probe_a) as Weak<dyn UwbSessionEventCallbacks>,
        );
        let _b = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&probe_b) as Weak<dyn UwbSessionEventCallbacks>,
        );

        device.on_uwb_notification(&ranging_frame(a.id()));
        assert_eq!(probe_a.rounds.load(Ordering::SeqCst), 1);
        assert_eq!(probe_b.rounds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_session_id_is_counted_not_fatal() {
        let device = UwbDevice::new(StubConnector::new("uwb0"));
        device.on_uwb_notification(&ranging_frame(777));
        assert_eq!(device.routing_misses(), 1);
    }

    #[test]
    fn test_dropped_session_is_pruned() {
        let device = UwbDevice::new(StubConnector::new("uwb0"));
        let probe = SessionProbe::new();
        let session = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&probe) as Weak<dyn UwbSessionEventCallbacks>,
        );
        let id = session.id();
        drop(session);

        device.on_uwb_notification(&ranging_frame(id));
        assert_eq!(device.routing_misses(), 1);
        assert!(device.session(id).is_none());
        assert!(device.session_ids().is_empty());
    }

    #[test]
    fn test_device_status_updates() {
        let device = UwbDevice::new(StubConnector::new("uwb0"));
        assert_eq!(device.status().state, UwbDeviceState::Uninitialized);

        device.on_uwb_notification(&UwbNotification::DeviceStatus(UwbDeviceState::Ready));
        assert_eq!(device.status().state, UwbDeviceState::Ready);

        device.on_uwb_notification(&UwbNotification::GenericStatus(UwbStatusCode::Failed));
        assert_eq!(device.status().last_error, UwbStatusCode::Failed);
        assert_eq!(device.status().state, UwbDeviceState::Ready);
    }

    #[test]
    fn test_capabilities_are_cached() {
        let connector = StubConnector::new("uwb0");
        let device = UwbDevice::new(connector.clone());

        assert!(device.get_capabilities().unwrap().is_some());
        assert!(device.get_capabilities().unwrap().is_some());
        assert_eq!(connector.capability_queries.load(Ordering::SeqCst), 1);

        // Reset invalidates the cache
        device.reset().unwrap();
        assert!(device.get_capabilities().unwrap().is_some());
        assert_eq!(connector.capability_queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_equality_by_backing_identity() {
        let a = UwbDevice::new(StubConnector::new("uwb0"));
        let b = UwbDevice::new(StubConnector::new("uwb0"));
        let c = UwbDevice::new(StubConnector::new("uwb1"));
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_session_status_routed_to_session_state() {
        let device = UwbDevice::new(StubConnector::new("uwb0"));
        let probe = SessionProbe::new();
        let session = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&probe) as Weak<dyn UwbSessionEventCallbacks>,
        );
        session.configure(&[]).unwrap();

        device.on_uwb_notification(&UwbNotification::SessionStatus(SessionStatusNotification {
            session_id: session.id(),
            state: SessionState::Active,
            reason: SessionReasonCode::StateChangeWithSessionManagementCommands,
        }));
        assert_eq!(session.state(), SessionState::Active);
    }
}
