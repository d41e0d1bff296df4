//! In-memory simulated driver back-end.
//!
//! [`SimulatorChannel`] implements [`UwbChannel`] entirely in memory: control
//! requests mutate a per-session state table and queue the notification
//! frames a real driver would emit. It backs the test suite and any host
//! without UWB hardware, and is selected at construction time like any other
//! channel back-end.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

use nearuwb_core::channel::{ChannelError, UwbChannel};
use nearuwb_core::fira::command::{self, CommandError, ControlOp};
use nearuwb_core::fira::notification::{
    ControleeStatus, MulticastListStatusNotification, RangingData, RangingMeasurement,
    SessionStatusNotification, UwbNotification,
};
use nearuwb_core::fira::params::{AppConfigParameter, AppConfigParameterType, AppConfigValue};
use nearuwb_core::fira::status::{
    MulticastAction, MulticastStatusCode, SessionReasonCode, SessionState, SessionType,
    UwbDeviceState, UwbStatusCode,
};
use nearuwb_core::{UwbCapability, UwbDeviceInformation};

/// Device-side multicast list capacity
const MULTICAST_LIST_CAPACITY: usize = 8;

/// Ranging interval assumed when none is configured, milliseconds
const DEFAULT_RANGING_INTERVAL_MS: u32 = 200;

/// Channel numbers the simulated radio accepts
const SUPPORTED_CHANNELS: [u8; 4] = [5, 6, 8, 9];

// =============================================================================
// Notification queue
// =============================================================================

struct QueueState {
    frames: VecDeque<Vec<u8>>,
    canceled: bool,
    closed: bool,
}

/// Blocking frame queue with one-shot cancellation
struct NotificationQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl NotificationQueue {
    fn new() -> Self {
        NotificationQueue {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                canceled: false,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn push(&self, frame: Vec<u8>) {
        let mut state = lock_queue(&self.state);
        if state.closed {
            return;
        }
        state.frames.push_back(frame);
        self.available.notify_one();
    }

    fn pop_blocking(&self) -> Result<Vec<u8>, ChannelError> {
        let mut state = lock_queue(&self.state);
        loop {
            if state.canceled {
                state.canceled = false;
                return Err(ChannelError::Canceled);
            }
            if let Some(frame) = state.frames.pop_front() {
                return Ok(frame);
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn cancel(&self) {
        lock_queue(&self.state).canceled = true;
        self.available.notify_all();
    }

    fn close(&self) {
        lock_queue(&self.state).closed = true;
        self.available.notify_all();
    }
}

fn lock_queue(state: &Mutex<QueueState>) -> std::sync::MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// Simulated device state
// =============================================================================

struct SimulatorSession {
    session_type: SessionType,
    state: SessionState,
    sequence: u32,
    ranging_count: u32,
    controlees: Vec<nearuwb_core::UwbMacAddress>,
    parameters: Vec<AppConfigParameter>,
}

impl SimulatorSession {
    fn new(session_type: SessionType) -> Self {
        SimulatorSession {
            session_type,
            state: SessionState::Initialized,
            sequence: 0,
            ranging_count: 0,
            controlees: Vec::new(),
            parameters: Vec::new(),
        }
    }

    fn store_parameter(&mut self, parameter: AppConfigParameter) {
        self.parameters
            .retain(|p| p.parameter_type() != parameter.parameter_type());
        self.parameters.push(parameter);
    }

    fn ranging_interval_ms(&self) -> u32 {
        self.parameters
            .iter()
            .find(|p| p.parameter_type() == AppConfigParameterType::RangingInterval)
            .and_then(|p| match p.value() {
                AppConfigValue::U32(interval) => Some(*interval),
                _ => None,
            })
            .unwrap_or(DEFAULT_RANGING_INTERVAL_MS)
    }
}

struct SimulatorState {
    device_state: UwbDeviceState,
    sessions: HashMap<u32, SimulatorSession>,
    information: UwbDeviceInformation,
    capability: UwbCapability,
}

// =============================================================================
// Channel implementation
// =============================================================================

/// Simulated UWB driver channel.
pub struct SimulatorChannel {
    identity: String,
    state: Mutex<SimulatorState>,
    queue: NotificationQueue,
}

impl SimulatorChannel {
    /// Create a simulator with default device information and capabilities
    pub fn new(identity: impl Into<String>) -> Self {
        use nearuwb_core::fira::capability::{
            AoaCapability, DeviceRoleCapability, MultiNodeCapability, RangingMethodCapability,
            StsCapability,
        };

        SimulatorChannel {
            identity: identity.into(),
            state: Mutex::new(SimulatorState {
                device_state: UwbDeviceState::Ready,
                sessions: HashMap::new(),
                information: UwbDeviceInformation {
                    uci_version: 0x0101,
                    mac_version: 0x0130,
                    phy_version: 0x0131,
                    uci_test_version: 0x0101,
                    vendor_specific_info: Vec::new(),
                },
                capability: UwbCapability {
                    device_roles: DeviceRoleCapability::RESPONDER | DeviceRoleCapability::INITIATOR,
                    multi_node_modes: MultiNodeCapability::UNICAST
                        | MultiNodeCapability::ONE_TO_MANY,
                    sts_configurations: StsCapability::STATIC | StsCapability::DYNAMIC,
                    ranging_methods: RangingMethodCapability::SS_TWR
                        | RangingMethodCapability::DS_TWR,
                    aoa_support: AoaCapability::AZIMUTH_90 | AoaCapability::ELEVATION,
                    channels: SUPPORTED_CHANNELS.to_vec(),
                    extended_mac_address: true,
                },
            }),
            queue: NotificationQueue::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Test and host hooks
    // -------------------------------------------------------------------------

    /// Device-side state of a session, if tracked
    pub fn session_state(&self, session_id: u32) -> Option<SessionState> {
        self.lock().sessions.get(&session_id).map(|s| s.state)
    }

    /// Kind of a tracked session, as requested at initialization
    pub fn session_type(&self, session_id: u32) -> Option<SessionType> {
        self.lock()
            .sessions
            .get(&session_id)
            .map(|s| s.session_type)
    }

    /// Emit one ranging round for an active session.
    ///
    /// Returns false if the session is unknown or not ranging.
    pub fn inject_ranging_round(
        &self,
        session_id: u32,
        measurements: Vec<RangingMeasurement>,
    ) -> bool {
        let frame = {
            let mut state = self.lock();
            let Some(session) = state.sessions.get_mut(&session_id) else {
                return false;
            };
            if session.state != SessionState::Active {
                return false;
            }
            session.sequence = session.sequence.wrapping_add(1);
            session.ranging_count = session.ranging_count.wrapping_add(1);
            UwbNotification::RangingData(RangingData {
                session_id,
                sequence_number: session.sequence,
                current_ranging_interval_ms: session.ranging_interval_ms(),
                measurements,
            })
            .to_bytes()
        };
        self.queue.push(frame);
        true
    }

    /// Emit a device status change
    pub fn inject_device_status(&self, device_state: UwbDeviceState) {
        self.lock().device_state = device_state;
        self.queue
            .push(UwbNotification::DeviceStatus(device_state).to_bytes());
    }

    /// Emit a generic status report
    pub fn inject_generic_status(&self, status: UwbStatusCode) {
        self.queue
            .push(UwbNotification::GenericStatus(status).to_bytes());
    }

    /// Emit arbitrary bytes as a notification frame (for malformed-frame
    /// handling tests)
    pub fn inject_raw_frame(&self, frame: Vec<u8>) {
        self.queue.push(frame);
    }

    /// Close the notification stream permanently
    pub fn close(&self) {
        self.queue.close();
    }

    // -------------------------------------------------------------------------
    // Request handling
    // -------------------------------------------------------------------------

    fn handle(&self, op: ControlOp, payload: &[u8]) -> Result<Vec<u8>, CommandError> {
        match op {
            ControlOp::Reset => {
                {
                    let mut state = self.lock();
                    state.sessions.clear();
                    state.device_state = UwbDeviceState::Ready;
                }
                self.queue
                    .push(UwbNotification::DeviceStatus(UwbDeviceState::Ready).to_bytes());
                Ok(command::format_status_response(UwbStatusCode::Ok))
            }
            ControlOp::GetDeviceInformation => {
                let info = self.lock().information.clone();
                Ok(command::format_device_information_response(
                    UwbStatusCode::Ok,
                    Some(&info),
                ))
            }
            ControlOp::GetCapabilities => {
                let capability = self.lock().capability.clone();
                Ok(command::format_capabilities_response(
                    UwbStatusCode::Ok,
                    Some(&capability),
                ))
            }
            ControlOp::GetSessionCount => {
                let count = self.lock().sessions.len() as u32;
                Ok(command::format_session_count_response(
                    UwbStatusCode::Ok,
                    count,
                ))
            }
            ControlOp::SessionInitialize => {
                let (session_id, session_type) =
                    command::parse_session_initialize_request(payload)?;
                let status = {
                    let mut state = self.lock();
                    match state.sessions.get(&session_id) {
                        Some(existing) if existing.state != SessionState::Deinitialized => {
                            UwbStatusCode::SessionDuplicate
                        }
                        _ => {
                            state
                                .sessions
                                .insert(session_id, SimulatorSession::new(session_type));
                            UwbStatusCode::Ok
                        }
                    }
                };
                if status.is_ok() {
                    self.push_session_status(session_id, SessionState::Initialized);
                }
                Ok(command::format_status_response(status))
            }
            ControlOp::SessionDeinitialize => {
                let session_id = command::parse_session_id_request(payload)?;
                let status = {
                    let mut state = self.lock();
                    match state.sessions.get_mut(&session_id) {
                        None => UwbStatusCode::SessionNotExist,
                        Some(session) => {
                            session.state = SessionState::Deinitialized;
                            session.controlees.clear();
                            session.parameters.clear();
                            UwbStatusCode::Ok
                        }
                    }
                };
                if status.is_ok() {
                    self.push_session_status(session_id, SessionState::Deinitialized);
                }
                Ok(command::format_status_response(status))
            }
            ControlOp::SessionGetState => {
                let session_id = command::parse_session_id_request(payload)?;
                let state = self.lock();
                Ok(match state.sessions.get(&session_id) {
                    Some(session) => {
                        command::format_session_state_response(UwbStatusCode::Ok, Some(session.state))
                    }
                    None => {
                        command::format_session_state_response(UwbStatusCode::SessionNotExist, None)
                    }
                })
            }
            ControlOp::SessionGetRangingCount => {
                let session_id = command::parse_session_id_request(payload)?;
                let state = self.lock();
                Ok(match state.sessions.get(&session_id) {
                    Some(session) => command::format_ranging_count_response(
                        UwbStatusCode::Ok,
                        Some(session.ranging_count),
                    ),
                    None => {
                        command::format_ranging_count_response(UwbStatusCode::SessionNotExist, None)
                    }
                })
            }
            ControlOp::SessionRangingStart => {
                let session_id = command::parse_session_id_request(payload)?;
                let (status, transitioned, device_became_active) = {
                    let mut state = self.lock();
                    let (status, transitioned) = match state.sessions.get_mut(&session_id) {
                        None => (UwbStatusCode::SessionNotExist, false),
                        Some(session) => match session.state {
                            SessionState::Deinitialized => {
                                (UwbStatusCode::SessionNotConfigured, false)
                            }
                            SessionState::Active => (UwbStatusCode::Ok, false),
                            SessionState::Initialized => {
                                session.state = SessionState::Active;
                                (UwbStatusCode::Ok, true)
                            }
                        },
                    };
                    let became_active =
                        transitioned && state.device_state != UwbDeviceState::Active;
                    if became_active {
                        state.device_state = UwbDeviceState::Active;
                    }
                    (status, transitioned, became_active)
                };
                if transitioned {
                    self.push_session_status(session_id, SessionState::Active);
                }
                if device_became_active {
                    self.queue
                        .push(UwbNotification::DeviceStatus(UwbDeviceState::Active).to_bytes());
                }
                Ok(command::format_status_response(status))
            }
            ControlOp::SessionRangingStop => {
                let session_id = command::parse_session_id_request(payload)?;
                let (status, transitioned, device_became_ready) = {
                    let mut state = self.lock();
                    let (status, transitioned) = match state.sessions.get_mut(&session_id) {
                        None => (UwbStatusCode::SessionNotExist, false),
                        Some(session) => {
                            let was_active = session.state == SessionState::Active;
                            if was_active {
                                session.state = SessionState::Initialized;
                            }
                            (UwbStatusCode::Ok, was_active)
                        }
                    };
                    let any_active = state
                        .sessions
                        .values()
                        .any(|s| s.state == SessionState::Active);
                    let became_ready = transitioned && !any_active;
                    if became_ready {
                        state.device_state = UwbDeviceState::Ready;
                    }
                    (status, transitioned, became_ready)
                };
                if transitioned {
                    self.push_session_status(session_id, SessionState::Initialized);
                }
                if device_became_ready {
                    self.queue
                        .push(UwbNotification::DeviceStatus(UwbDeviceState::Ready).to_bytes());
                }
                Ok(command::format_status_response(status))
            }
            ControlOp::SessionUpdateControllerMulticastList => {
                let (session_id, action, controlees) =
                    command::parse_multicast_update_request(payload)?;
                self.update_multicast_list(session_id, action, controlees)
            }
            ControlOp::SetApplicationConfigurationParameters => {
                let (session_id, params) = command::parse_set_app_config_request(payload)?;
                self.set_parameters(session_id, params)
            }
            ControlOp::GetApplicationConfigurationParameters => {
                let (session_id, types) = command::parse_get_app_config_request(payload)?;
                let state = self.lock();
                Ok(match state.sessions.get(&session_id) {
                    None => {
                        command::format_get_app_config_response(UwbStatusCode::SessionNotExist, &[])
                    }
                    Some(session) => {
                        let params: Vec<AppConfigParameter> = session
                            .parameters
                            .iter()
                            .filter(|p| types.is_empty() || types.contains(&p.parameter_type()))
                            .cloned()
                            .collect();
                        command::format_get_app_config_response(UwbStatusCode::Ok, &params)
                    }
                })
            }
        }
    }

    fn set_parameters(
        &self,
        session_id: u32,
        params: Vec<AppConfigParameter>,
    ) -> Result<Vec<u8>, CommandError> {
        let mut multicast_frame = None;
        let response = {
            let mut state = self.lock();
            match state.sessions.get_mut(&session_id) {
                None => command::format_set_app_config_response(UwbStatusCode::SessionNotExist, &[]),
                Some(session) if session.state == SessionState::Active => {
                    command::format_set_app_config_response(UwbStatusCode::SessionActive, &[])
                }
                Some(session) => {
                    let mut results = Vec::with_capacity(params.len());
                    for param in params {
                        let parameter_type = param.parameter_type();
                        let status = match (parameter_type, param.value()) {
                            (AppConfigParameterType::ChannelNumber, AppConfigValue::U8(ch))
                                if !SUPPORTED_CHANNELS.contains(ch) =>
                            {
                                UwbStatusCode::InvalidRange
                            }
                            _ => UwbStatusCode::Ok,
                        };
                        if status.is_ok() {
                            if let (
                                AppConfigParameterType::DstMacAddress,
                                AppConfigValue::MacAddressList(addresses),
                            ) = (parameter_type, param.value())
                            {
                                session.controlees = addresses.clone();
                                multicast_frame = Some(
                                    UwbNotification::SessionMulticastListStatus(
                                        MulticastListStatusNotification {
                                            session_id,
                                            remaining_list_size: (MULTICAST_LIST_CAPACITY
                                                .saturating_sub(addresses.len()))
                                                as u8,
                                            statuses: addresses
                                                .iter()
                                                .map(|&mac_address| ControleeStatus {
                                                    mac_address,
                                                    status: MulticastStatusCode::OkUpdate,
                                                })
                                                .collect(),
                                        },
                                    )
                                    .to_bytes(),
                                );
                            }
                            session.store_parameter(param);
                        }
                        results.push(nearuwb_core::ParameterStatus {
                            parameter_type,
                            status,
                        });
                    }
                    command::format_set_app_config_response(UwbStatusCode::Ok, &results)
                }
            }
        };
        if let Some(frame) = multicast_frame {
            self.queue.push(frame);
        }
        Ok(response)
    }

    fn update_multicast_list(
        &self,
        session_id: u32,
        action: MulticastAction,
        controlees: Vec<nearuwb_core::UwbMacAddress>,
    ) -> Result<Vec<u8>, CommandError> {
        let mut frame = None;
        let status = {
            let mut state = self.lock();
            match state.sessions.get_mut(&session_id) {
                None => UwbStatusCode::SessionNotExist,
                Some(session) => {
                    let mut statuses = Vec::with_capacity(controlees.len());
                    let mut overall = UwbStatusCode::Ok;
                    for controlee in controlees {
                        match action {
                            MulticastAction::Add => {
                                if session.controlees.contains(&controlee) {
                                    statuses.push(ControleeStatus {
                                        mac_address: controlee,
                                        status: MulticastStatusCode::OkUpdate,
                                    });
                                } else if session.controlees.len() >= MULTICAST_LIST_CAPACITY {
                                    statuses.push(ControleeStatus {
                                        mac_address: controlee,
                                        status: MulticastStatusCode::ListFull,
                                    });
                                    overall = UwbStatusCode::MulticastListFull;
                                } else {
                                    session.controlees.push(controlee);
                                    statuses.push(ControleeStatus {
                                        mac_address: controlee,
                                        status: MulticastStatusCode::OkUpdate,
                                    });
                                }
                            }
                            MulticastAction::Delete => {
                                if session.controlees.contains(&controlee) {
                                    session.controlees.retain(|c| *c != controlee);
                                    statuses.push(ControleeStatus {
                                        mac_address: controlee,
                                        status: MulticastStatusCode::OkUpdate,
                                    });
                                } else {
                                    overall = UwbStatusCode::AddressNotFound;
                                }
                            }
                        }
                    }
                    frame = Some(
                        UwbNotification::SessionMulticastListStatus(
                            MulticastListStatusNotification {
                                session_id,
                                remaining_list_size: (MULTICAST_LIST_CAPACITY
                                    .saturating_sub(session.controlees.len()))
                                    as u8,
                                statuses,
                            },
                        )
                        .to_bytes(),
                    );
                    overall
                }
            }
        };
        if let Some(frame) = frame {
            self.queue.push(frame);
        }
        Ok(command::format_status_response(status))
    }

    fn push_session_status(&self, session_id: u32, state: SessionState) {
        self.queue.push(
            UwbNotification::SessionStatus(SessionStatusNotification {
                session_id,
                state,
                reason: SessionReasonCode::StateChangeWithSessionManagementCommands,
            })
            .to_bytes(),
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatorState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl UwbChannel for SimulatorChannel {
    fn request(&self, op: ControlOp, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        match self.handle(op, payload) {
            Ok(response) => Ok(response),
            // A real device answers malformed payloads with a syntax error
            Err(_) => Ok(command::format_status_response(UwbStatusCode::SyntaxError)),
        }
    }

    fn read_notification(&self) -> Result<Vec<u8>, ChannelError> {
        self.queue.pop_blocking()
    }

    fn cancel_read(&self) {
        self.queue.cancel();
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

// =============================================================================
// Tests
// =============================================================================
