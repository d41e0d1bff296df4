//! Driver connector and notification dispatcher.
//!
//! [`UwbConnector`] owns the physical channel and a single background
//! listener thread. The listener blocks on the channel's notification read,
//! decodes one frame per wake and fans it out synchronously before waiting
//! for the next frame - so per-session delivery order matches arrival order,
//! while nothing is guaranteed across sessions.
//!
//! The callback registries are guarded by a reader/writer lock. Dispatch
//! takes the reader side just long enough to snapshot the live observers
//! and releases it before invoking anything, so callback code can re-enter
//! the connector without deadlocking.
//!
//! Control requests are synchronous channel round trips. The `submit_*`
//! methods wrap them in a [`ResponseHandle`] driven by the tokio blocking
//! pool; an in-flight request is never forcibly canceled - its handle
//! resolves with the eventual result or a channel-closed error.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use thiserror::Error;

use nearuwb_core::channel::{
    CallbackToken, ChannelError, DeviceCommands, SessionCommands, UwbChannel, UwbDriverConnector,
};
use nearuwb_core::fira::command::{self, ControlOp};
use nearuwb_core::fira::notification::UwbNotification;
use nearuwb_core::fira::params::{AppConfigParameter, AppConfigParameterType, ParameterStatus};
use nearuwb_core::fira::status::{
    MulticastAction, SessionState, SessionType, UwbStatusCode,
};
use nearuwb_core::{
    UwbCapability, UwbDeviceEventCallbacks, UwbDeviceInformation, UwbMacAddress,
    UwbSessionEventCallbacks,
};

use crate::callbacks::CallbackRegistry;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while bringing a connector up
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The notification worker could not be allocated. Fatal to the
    /// connector.
    #[error("Failed to start the notification listener: {0}")]
    ListenerStart(#[from] std::io::Error),
}

// =============================================================================
// Async result handle
// =============================================================================

/// Handle to a control request running on the blocking pool.
///
/// Resolves to the request's typed result. If the worker disappears before
/// producing one, the handle resolves to [`ChannelError::Closed`].
pub struct ResponseHandle<T> {
    handle: tokio::task::JoinHandle<Result<T, ChannelError>>,
}

impl<T> Future for ResponseHandle<T> {
    type Output = Result<T, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

struct ConnectorInner {
    channel: Arc<dyn UwbChannel>,
    registry: RwLock<CallbackRegistry>,
    stop_requested: AtomicBool,
}

/// A logical communication channel with a UWB driver.
pub struct UwbConnector {
    inner: Arc<ConnectorInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl UwbConnector {
    /// Take ownership of a channel and start the notification listener.
    ///
    /// Failing to allocate the listener worker is the one fatal error at
    /// this layer.
    pub fn new(channel: Arc<dyn UwbChannel>) -> Result<Self, ConnectorError> {
        let inner = Arc::new(ConnectorInner {
            channel,
            registry: RwLock::new(CallbackRegistry::new()),
            stop_requested: AtomicBool::new(false),
        });
        let listener_inner = inner.clone();
        let listener = std::thread::Builder::new()
            .name("uwb-notification-listener".into())
            .spawn(move || listen(&listener_inner))?;
        Ok(UwbConnector {
            inner,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Stop the listener and join it.
    ///
    /// The pending notification read is canceled; a dispatch already in
    /// flight completes before this returns. Safe to call more than once.
    pub fn shutdown(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        self.inner.channel.cancel_read();
        let handle = lock(&self.listener).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    // -------------------------------------------------------------------------
    // Async-result wrappers
    // -------------------------------------------------------------------------

    /// Reset the device
    pub fn submit_reset(&self) -> ResponseHandle<UwbStatusCode> {
        self.submit(|inner| inner.reset_blocking())
    }

    /// Query protocol stack versions
    pub fn submit_get_device_information(
        &self,
    ) -> ResponseHandle<(UwbStatusCode, Option<UwbDeviceInformation>)> {
        self.submit(|inner| inner.get_device_information_blocking())
    }

    /// Query FiRa capabilities
    pub fn submit_get_capabilities(
        &self,
    ) -> ResponseHandle<(UwbStatusCode, Option<UwbCapability>)> {
        self.submit(|inner| inner.get_capabilities_blocking())
    }

    /// Query the device-side session count
    pub fn submit_get_session_count(&self) -> ResponseHandle<(UwbStatusCode, u32)> {
        self.submit(|inner| inner.get_session_count_blocking())
    }

    /// Initialize a device-side session
    pub fn submit_session_initialize(
        &self,
        session_id: u32,
        session_type: SessionType,
    ) -> ResponseHandle<UwbStatusCode> {
        self.submit(move |inner| inner.session_initialize_blocking(session_id, session_type))
    }

    /// Tear a device-side session down
    pub fn submit_session_deinitialize(&self, session_id: u32) -> ResponseHandle<UwbStatusCode> {
        self.submit(move |inner| inner.session_id_op_blocking(ControlOp::SessionDeinitialize, session_id))
    }

    /// Start ranging on a session
    pub fn submit_session_ranging_start(&self, session_id: u32) -> ResponseHandle<UwbStatusCode> {
        self.submit(move |inner| inner.session_id_op_blocking(ControlOp::SessionRangingStart, session_id))
    }

    /// Stop ranging on a session
    pub fn submit_session_ranging_stop(&self, session_id: u32) -> ResponseHandle<UwbStatusCode> {
        self.submit(move |inner| inner.session_id_op_blocking(ControlOp::SessionRangingStop, session_id))
    }

    /// Update the controller multicast list
    pub fn submit_session_update_multicast_list(
        &self,
        session_id: u32,
        action: MulticastAction,
        controlees: Vec<UwbMacAddress>,
    ) -> ResponseHandle<UwbStatusCode> {
        self.submit(move |inner| {
            inner.session_update_multicast_list_blocking(session_id, action, &controlees)
        })
    }

    /// Apply a configuration parameter batch
    pub fn submit_set_app_config_parameters(
        &self,
        session_id: u32,
        params: Vec<AppConfigParameter>,
    ) -> ResponseHandle<(UwbStatusCode, Vec<ParameterStatus>)> {
        self.submit(move |inner| inner.set_app_config_parameters_blocking(session_id, &params))
    }

    /// Read configuration parameters back
    pub fn submit_get_app_config_parameters(
        &self,
        session_id: u32,
        types: Vec<AppConfigParameterType>,
    ) -> ResponseHandle<(UwbStatusCode, Vec<AppConfigParameter>)> {
        self.submit(move |inner| inner.get_app_config_parameters_blocking(session_id, &types))
    }

    fn submit<T, F>(&self, f: F) -> ResponseHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&ConnectorInner) -> Result<T, ChannelError> + Send + 'static,
    {
        let inner = self.inner.clone();
        ResponseHandle {
            handle: tokio::task::spawn_blocking(move || f(&inner)),
        }
    }
}

impl Drop for UwbConnector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for UwbConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UwbConnector")
            .field("device", &self.inner.channel.identity())
            .finish()
    }
}

// =============================================================================
// Listener and dispatch
// =============================================================================

fn listen(inner: &ConnectorInner) {
    log::debug!(
        "notification listener started for {}",
        inner.channel.identity()
    );
    loop {
        match inner.channel.read_notification() {
            Ok(frame) => match UwbNotification::parse(&frame) {
                Ok(notification) => dispatch(inner, &notification),
                Err(e) => log::warn!("dropping undecodable notification frame: {e}"),
            },
            Err(error) => {
                if inner.stop_requested.load(Ordering::SeqCst) {
                    break;
                }
                match error {
                    ChannelError::Closed => {
                        log::info!(
                            "notification channel for {} closed",
                            inner.channel.identity()
                        );
                        break;
                    }
                    // Transport hiccup: keep processing subsequent frames
                    other => log::warn!("notification read failed: {other}"),
                }
            }
        }
    }
    log::debug!(
        "notification listener for {} exited",
        inner.channel.identity()
    );
}

/// Fan a decoded notification out to the registered observers.
///
/// The registry lock is held only while snapshotting; callbacks run
/// unlocked. Expired registrations found during the snapshot are purged
/// afterwards under the write lock.
fn dispatch(inner: &ConnectorInner, notification: &UwbNotification) {
    let session_id = notification.session_id();
    let (device_callbacks, session_callbacks, expired) = {
        let registry = read_registry(inner);
        let (device_callbacks, mut expired) = registry.device_snapshot();
        let session_callbacks = match session_id {
            Some(id) => {
                let (live, session_expired) = registry.session_snapshot(id);
                expired.extend(session_expired);
                live
            }
            None => Vec::new(),
        };
        (device_callbacks, session_callbacks, expired)
    };
    if !expired.is_empty() {
        write_registry(inner).purge(&expired);
    }

    match notification {
        UwbNotification::GenericStatus(status) => {
            for callbacks in &device_callbacks {
                callbacks.on_status_changed(*status);
            }
        }
        UwbNotification::DeviceStatus(state) => {
            for callbacks in &device_callbacks {
                callbacks.on_device_status_changed(*state);
            }
        }
        UwbNotification::SessionStatus(status) => {
            for callbacks in &device_callbacks {
                callbacks.on_session_notification(notification);
            }
            for callbacks in &session_callbacks {
                callbacks.on_session_status_changed(status.session_id, status.state, status.reason);
                if status.state == SessionState::Deinitialized {
                    callbacks.on_session_ended(status.session_id, status.reason.end_reason());
                }
            }
        }
        UwbNotification::SessionMulticastListStatus(status) => {
            for callbacks in &device_callbacks {
                callbacks.on_session_notification(notification);
            }
            for callbacks in &session_callbacks {
                callbacks.on_multicast_list_status(status);
            }
        }
        UwbNotification::RangingData(data) => {
            for callbacks in &device_callbacks {
                callbacks.on_session_notification(notification);
            }
            for callbacks in &session_callbacks {
                callbacks.on_ranging_data(data);
            }
        }
    }

    if device_callbacks.is_empty() && session_callbacks.is_empty() {
        if let Some(id) = session_id {
            log::debug!("no observers registered for session {id} notification");
        }
    }
}

// =============================================================================
// Synchronous command round trips
// =============================================================================

impl ConnectorInner {
    fn reset_blocking(&self) -> Result<UwbStatusCode, ChannelError> {
        let response = self.channel.request(ControlOp::Reset, &[])?;
        Ok(command::parse_status_response(&response)?)
    }

    fn get_device_information_blocking(
        &self,
    ) -> Result<(UwbStatusCode, Option<UwbDeviceInformation>), ChannelError> {
        let response = self.channel.request(ControlOp::GetDeviceInformation, &[])?;
        Ok(command::parse_device_information_response(&response)?)
    }

    fn get_capabilities_blocking(
        &self,
    ) -> Result<(UwbStatusCode, Option<UwbCapability>), ChannelError> {
        let response = self.channel.request(ControlOp::GetCapabilities, &[])?;
        Ok(command::parse_capabilities_response(&response)?)
    }

    fn get_session_count_blocking(&self) -> Result<(UwbStatusCode, u32), ChannelError> {
        let response = self.channel.request(ControlOp::GetSessionCount, &[])?;
        Ok(command::parse_session_count_response(&response)?)
    }

    fn session_initialize_blocking(
        &self,
        session_id: u32,
        session_type: SessionType,
    ) -> Result<UwbStatusCode, ChannelError> {
        let payload = command::format_session_initialize_request(session_id, session_type);
        let response = self.channel.request(ControlOp::SessionInitialize, &payload)?;
        Ok(command::parse_status_response(&response)?)
    }

    fn session_id_op_blocking(
        &self,
        op: ControlOp,
        session_id: u32,
    ) -> Result<UwbStatusCode, ChannelError> {
        let payload = command::format_session_id_request(session_id);
        let response = self.channel.request(op, &payload)?;
        Ok(command::parse_status_response(&response)?)
    }

    fn session_get_state_blocking(
        &self,
        session_id: u32,
    ) -> Result<(UwbStatusCode, Option<SessionState>), ChannelError> {
        let payload = command::format_session_id_request(session_id);
        let response = self.channel.request(ControlOp::SessionGetState, &payload)?;
        Ok(command::parse_session_state_response(&response)?)
    }

    fn session_get_ranging_count_blocking(
        &self,
        session_id: u32,
    ) -> Result<(UwbStatusCode, Option<u32>), ChannelError> {
        let payload = command::format_session_id_request(session_id);
        let response = self
            .channel
            .request(ControlOp::SessionGetRangingCount, &payload)?;
        Ok(command::parse_ranging_count_response(&response)?)
    }

    fn session_update_multicast_list_blocking(
        &self,
        session_id: u32,
        action: MulticastAction,
        controlees: &[UwbMacAddress],
    ) -> Result<UwbStatusCode, ChannelError> {
        let payload = command::format_multicast_update_request(session_id, action, controlees);
        let response = self
            .channel
            .request(ControlOp::SessionUpdateControllerMulticastList, &payload)?;
        Ok(command::parse_status_response(&response)?)
    }

    fn set_app_config_parameters_blocking(
        &self,
        session_id: u32,
        params: &[AppConfigParameter],
    ) -> Result<(UwbStatusCode, Vec<ParameterStatus>), ChannelError> {
        let payload = command::format_set_app_config_request(session_id, params);
        let response = self
            .channel
            .request(ControlOp::SetApplicationConfigurationParameters, &payload)?;
        Ok(command::parse_set_app_config_response(&response)?)
    }

    fn get_app_config_parameters_blocking(
        &self,
        session_id: u32,
        types: &[AppConfigParameterType],
    ) -> Result<(UwbStatusCode, Vec<AppConfigParameter>), ChannelError> {
        let payload = command::format_get_app_config_request(session_id, types);
        let response = self
            .channel
            .request(ControlOp::GetApplicationConfigurationParameters, &payload)?;
        Ok(command::parse_get_app_config_response(&response)?)
    }
}

// =============================================================================
// Trait surface consumed by nearuwb-core
// =============================================================================

impl DeviceCommands for UwbConnector {
    fn reset(&self) -> Result<UwbStatusCode, ChannelError> {
        self.inner.reset_blocking()
    }

    fn get_device_information(
        &self,
    ) -> Result<(UwbStatusCode, Option<UwbDeviceInformation>), ChannelError> {
        self.inner.get_device_information_blocking()
    }

    fn get_capabilities(&self) -> Result<(UwbStatusCode, Option<UwbCapability>), ChannelError> {
        self.inner.get_capabilities_blocking()
    }

    fn get_session_count(&self) -> Result<(UwbStatusCode, u32), ChannelError> {
        self.inner.get_session_count_blocking()
    }
}

impl SessionCommands for UwbConnector {
    fn session_initialize(
        &self,
        session_id: u32,
        session_type: SessionType,
    ) -> Result<UwbStatusCode, ChannelError> {
        self.inner
            .session_initialize_blocking(session_id, session_type)
    }

    fn session_deinitialize(&self, session_id: u32) -> Result<UwbStatusCode, ChannelError> {
        self.inner
            .session_id_op_blocking(ControlOp::SessionDeinitialize, session_id)
    }

    fn session_get_state(
        &self,
        session_id: u32,
    ) -> Result<(UwbStatusCode, Option<SessionState>), ChannelError> {
        self.inner.session_get_state_blocking(session_id)
    }

    fn session_get_ranging_count(
        &self,
        session_id: u32,
    ) -> Result<(UwbStatusCode, Option<u32>), ChannelError> {
        self.inner.session_get_ranging_count_blocking(session_id)
    }

    fn session_ranging_start(&self, session_id: u32) -> Result<UwbStatusCode, ChannelError> {
        self.inner
            .session_id_op_blocking(ControlOp::SessionRangingStart, session_id)
    }

    fn session_ranging_stop(&self, session_id: u32) -> Result<UwbStatusCode, ChannelError> {
        self.inner
            .session_id_op_blocking(ControlOp::SessionRangingStop, session_id)
    }

    fn session_update_multicast_list(
        &self,
        session_id: u32,
        action: MulticastAction,
        controlees: &[UwbMacAddress],
    ) -> Result<UwbStatusCode, ChannelError> {
        self.inner
            .session_update_multicast_list_blocking(session_id, action, controlees)
    }

    fn set_app_config_parameters(
        &self,
        session_id: u32,
        params: &[AppConfigParameter],
    ) -> Result<(UwbStatusCode, Vec<ParameterStatus>), ChannelError> {
        self.inner
            .set_app_config_parameters_blocking(session_id, params)
    }

    fn get_app_config_parameters(
        &self,
        session_id: u32,
        types: &[AppConfigParameterType],
    ) -> Result<(UwbStatusCode, Vec<AppConfigParameter>), ChannelError> {
        self.inner
            .get_app_config_parameters_blocking(session_id, types)
    }
}

impl UwbDriverConnector for UwbConnector {
    fn register_device_event_callbacks(
        &self,
        callbacks: Weak<dyn UwbDeviceEventCallbacks>,
    ) -> CallbackToken {
        write_registry(&self.inner).register_device(callbacks)
    }

    fn register_session_event_callbacks(
        &self,
        session_id: u32,
        callbacks: Weak<dyn UwbSessionEventCallbacks>,
    ) -> CallbackToken {
        write_registry(&self.inner).register_session(session_id, callbacks)
    }

    fn deregister_event_callback(&self, token: CallbackToken) {
        write_registry(&self.inner).deregister(token);
    }

    fn device_name(&self) -> &str {
        self.inner.channel.identity()
    }
}

// =============================================================================
// Lock helpers
// =============================================================================

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn read_registry(inner: &ConnectorInner) -> std::sync::RwLockReadGuard<'_, CallbackRegistry> {
    inner
        .registry
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_registry(inner: &ConnectorInner) -> std::sync::RwLockWriteGuard<'_, CallbackRegistry> {
    inner
        .registry
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatorChannel;
    use nearuwb_core::fira::notification::{MulticastListStatusNotification, RangingData};
    use nearuwb_core::fira::status::{DeviceType, SessionEndReason, SessionReasonCode};
    use nearuwb_core::{UwbDevice, UwbDeviceState};
    use std::sync::mpsc::{channel, Sender};
    use std::time::Duration;

    /// Session observer that reports every event on an mpsc channel
    struct ForwardingObserver {
        events: Mutex<Sender<String>>,
    }

    impl ForwardingObserver {
        fn new() -> (Arc<Self>, std::sync::mpsc::Receiver<String>) {
            let (tx, rx) = channel();
            (
                Arc::new(ForwardingObserver {
                    events: Mutex::new(tx),
                }),
                rx,
            )
        }

        fn send(&self, event: String) {
            let _ = lock(&self.events).send(event);
        }
    }

    impl UwbSessionEventCallbacks for ForwardingObserver {
        fn on_session_status_changed(
            &self,
            session_id: u32,
            state: SessionState,
            _reason: SessionReasonCode,
        ) {
            self.send(format!("status:{session_id}:{state}"));
        }

        fn on_session_ended(&self, session_id: u32, _reason: SessionEndReason) {
            self.send(format!("ended:{session_id}"));
        }

        fn on_ranging_data(&self, data: &RangingData) {
            self.send(format!("ranging:{}:{}", data.session_id, data.sequence_number));
        }

        fn on_multicast_list_status(&self, status: &MulticastListStatusNotification) {
            self.send(format!("multicast:{}", status.session_id));
        }
    }

    impl UwbDeviceEventCallbacks for ForwardingObserver {
        fn on_status_changed(&self, status: UwbStatusCode) {
            self.send(format!("generic:{status}"));
        }

        fn on_device_status_changed(&self, state: UwbDeviceState) {
            self.send(format!("device:{state:?}"));
        }
    }

    fn recv(rx: &std::sync::mpsc::Receiver<String>) -> String {
        rx.recv_timeout(Duration::from_secs(5)).expect("event")
    }

    fn start_connector() -> (Arc<SimulatorChannel>, Arc<UwbConnector>) {
        let sim = Arc::new(SimulatorChannel::new("sim0"));
        let connector =
            Arc::new(UwbConnector::new(sim.clone() as Arc<dyn UwbChannel>).unwrap());
        (sim, connector)
    }

    #[test]
    fn test_dispatch_isolation_across_sessions() {
        let (sim, connector) = start_connector();
        let (observer_a, rx_a) = ForwardingObserver::new();
        let (observer_b, rx_b) = ForwardingObserver::new();
        connector.register_session_event_callbacks(
            1,
            Arc::downgrade(&observer_a) as Weak<dyn UwbSessionEventCallbacks>,
        );
        connector.register_session_event_callbacks(
            2,
            Arc::downgrade(&observer_b) as Weak<dyn UwbSessionEventCallbacks>,
        );

        assert!(connector.session_initialize(1, SessionType::RangingSession).unwrap().is_ok());
        assert!(connector.session_initialize(2, SessionType::RangingSession).unwrap().is_ok());
        assert!(connector.session_ranging_start(1).unwrap().is_ok());
        sim.inject_ranging_round(1, vec![]);

        // Session 1 observer sees its own events, in arrival order
        assert_eq!(recv(&rx_a), "status:1:initialized");
        assert_eq!(recv(&rx_a), "status:1:active");
        assert_eq!(recv(&rx_a), "ranging:1:1");

        // Session 2 observer sees only its own initialization
        assert_eq!(recv(&rx_b), "status:2:initialized");
        assert!(rx_b.try_recv().is_err());

        connector.shutdown();
    }

    #[test]
    fn test_device_level_dispatch() {
        let (sim, connector) = start_connector();
        let (observer, rx) = ForwardingObserver::new();
        connector.register_device_event_callbacks(
            Arc::downgrade(&observer) as Weak<dyn UwbDeviceEventCallbacks>,
        );

        sim.inject_generic_status(UwbStatusCode::CommandRetry);
        assert_eq!(recv(&rx), "generic:CommandRetry");

        sim.inject_device_status(UwbDeviceState::Error);
        assert_eq!(recv(&rx), "device:Error");

        connector.shutdown();
    }

    #[test]
    fn test_session_ended_delivered_on_deinitialize() {
        let (_sim, connector) = start_connector();
        let (observer, rx) = ForwardingObserver::new();
        connector.register_session_event_callbacks(
            5,
            Arc::downgrade(&observer) as Weak<dyn UwbSessionEventCallbacks>,
        );

        assert!(connector.session_initialize(5, SessionType::RangingSession).unwrap().is_ok());
        assert!(connector.session_deinitialize(5).unwrap().is_ok());

        assert_eq!(recv(&rx), "status:5:initialized");
        assert_eq!(recv(&rx), "status:5:deinitialized");
        assert_eq!(recv(&rx), "ended:5");

        connector.shutdown();
    }

    #[test]
    fn test_deregistered_and_dropped_observers_are_skipped() {
        let (sim, connector) = start_connector();
        let (observer_kept, rx_kept) = ForwardingObserver::new();
        let (observer_gone, rx_gone) = ForwardingObserver::new();

        let _kept = connector.register_session_event_callbacks(
            1,
            Arc::downgrade(&observer_kept) as Weak<dyn UwbSessionEventCallbacks>,
        );
        let token = connector.register_session_event_callbacks(
            1,
            Arc::downgrade(&observer_gone) as Weak<dyn UwbSessionEventCallbacks>,
        );

        // Deregistration with a valid, then stale, token is a no-op the
        // second time around
        connector.deregister_event_callback(token);
        connector.deregister_event_callback(token);

        assert!(connector.session_initialize(1, SessionType::RangingSession).unwrap().is_ok());
        assert_eq!(recv(&rx_kept), "status:1:initialized");
        assert!(rx_gone.try_recv().is_err());

        // An observer dropped without deregistration is skipped silently
        drop(observer_kept);
        assert!(connector.session_ranging_start(1).unwrap().is_ok());
        sim.inject_ranging_round(1, vec![]);
        // Give the listener a chance to process both frames
        std::thread::sleep(Duration::from_millis(100));
        assert!(rx_kept.try_recv().is_err());

        connector.shutdown();
    }

    #[test]
    fn test_shutdown_is_clean_and_idempotent() {
        let (_sim, connector) = start_connector();
        connector.shutdown();
        connector.shutdown();
    }

    #[test]
    fn test_listener_survives_malformed_frames() {
        let (sim, connector) = start_connector();
        let (observer, rx) = ForwardingObserver::new();
        connector.register_device_event_callbacks(
            Arc::downgrade(&observer) as Weak<dyn UwbDeviceEventCallbacks>,
        );

        sim.inject_raw_frame(vec![0x01, 0x02, 0x03]);
        sim.inject_generic_status(UwbStatusCode::Ok);
        // The malformed frame is dropped; the next frame still arrives
        assert_eq!(recv(&rx), "generic:Ok");

        connector.shutdown();
    }

    #[test]
    fn test_full_stack_device_and_session_routing() {
        let (sim, connector) = start_connector();
        let device = UwbDevice::new(connector.clone());
        let (observer, rx) = ForwardingObserver::new();
        let session = device.create_session(
            DeviceType::Controller,
            Arc::downgrade(&observer) as Weak<dyn UwbSessionEventCallbacks>,
        );

        let results = session
            .configure(&[AppConfigParameter::number_of_controlees(0)])
            .unwrap();
        assert!(results.iter().all(|r| r.status.is_ok()));
        session.start_ranging().unwrap();
        sim.inject_ranging_round(session.id(), vec![]);

        assert_eq!(recv(&rx), format!("status:{}:initialized", session.id()));
        assert_eq!(recv(&rx), format!("status:{}:active", session.id()));
        assert_eq!(recv(&rx), format!("ranging:{}:1", session.id()));

        // Device status followed the ranging start
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(device.status().state, UwbDeviceState::Active);

        connector.shutdown();
    }

    #[tokio::test]
    async fn test_async_result_handles() {
        let (_sim, connector) = start_connector();

        let status = connector.submit_reset().await.unwrap();
        assert!(status.is_ok());

        let (status, info) = connector.submit_get_device_information().await.unwrap();
        assert!(status.is_ok());
        assert!(info.is_some());

        let status = connector
            .submit_session_initialize(3, SessionType::RangingSession)
            .await
            .unwrap();
        assert!(status.is_ok());

        let (status, results) = connector
            .submit_set_app_config_parameters(
                3,
                vec![AppConfigParameter::number_of_controlees(1)],
            )
            .await
            .unwrap();
        assert!(status.is_ok());
        assert_eq!(results.len(), 1);

        let (status, params) = connector
            .submit_get_app_config_parameters(3, vec![])
            .await
            .unwrap();
        assert!(status.is_ok());
        assert_eq!(params.len(), 1);

        connector.shutdown();
    }
}
