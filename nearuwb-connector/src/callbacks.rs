//! Token-based callback registry.
//!
//! Registrations are stored as `(token, weak reference)` pairs in maps keyed
//! by monotonically increasing token ids - never by pointer identity, so
//! there is nothing dangling to compare against. Dispatch snapshots only the
//! still-resolvable references; expired entries surface as a purge list that
//! the caller applies under the write lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use nearuwb_core::{CallbackToken, UwbDeviceEventCallbacks, UwbSessionEventCallbacks};

/// Registry of device- and session-level observers.
///
/// Not internally synchronized; the connector wraps it in a reader/writer
/// lock. Registration and deregistration need the writer side, snapshots
/// only the reader side.
pub(crate) struct CallbackRegistry {
    next_token: u64,
    device: HashMap<u64, Weak<dyn UwbDeviceEventCallbacks>>,
    sessions: HashMap<u64, (u32, Weak<dyn UwbSessionEventCallbacks>)>,
    /// Inverse index: session id → registered token ids
    session_index: HashMap<u32, Vec<u64>>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        CallbackRegistry {
            next_token: 1,
            device: HashMap::new(),
            sessions: HashMap::new(),
            session_index: HashMap::new(),
        }
    }

    fn allocate_token(&mut self) -> CallbackToken {
        let token = CallbackToken::from_raw(self.next_token);
        self.next_token += 1;
        token
    }

    pub(crate) fn register_device(
        &mut self,
        callbacks: Weak<dyn UwbDeviceEventCallbacks>,
    ) -> CallbackToken {
        let token = self.allocate_token();
        self.device.insert(token.raw(), callbacks);
        token
    }

    pub(crate) fn register_session(
        &mut self,
        session_id: u32,
        callbacks: Weak<dyn UwbSessionEventCallbacks>,
    ) -> CallbackToken {
        let token = self.allocate_token();
        self.sessions.insert(token.raw(), (session_id, callbacks));
        self.session_index
            .entry(session_id)
            .or_default()
            .push(token.raw());
        token
    }

    /// Remove a registration. Unknown or stale tokens are a no-op.
    pub(crate) fn deregister(&mut self, token: CallbackToken) {
        let id = token.raw();
        self.device.remove(&id);
        if let Some((session_id, _)) = self.sessions.remove(&id) {
            if let Some(tokens) = self.session_index.get_mut(&session_id) {
                tokens.retain(|&t| t != id);
                if tokens.is_empty() {
                    self.session_index.remove(&session_id);
                }
            }
        }
    }

    /// Resolve the live device-level observers.
    ///
    /// Returns the resolved callbacks and the tokens whose observers have
    /// expired, for purging under the write lock.
    pub(crate) fn device_snapshot(
        &self,
    ) -> (Vec<Arc<dyn UwbDeviceEventCallbacks>>, Vec<CallbackToken>) {
        let mut live = Vec::new();
        let mut expired = Vec::new();
        for (&id, weak) in &self.device {
            match weak.upgrade() {
                Some(callbacks) => live.push(callbacks),
                None => expired.push(CallbackToken::from_raw(id)),
            }
        }
        (live, expired)
    }

    /// Resolve the live observers registered for one session id
    pub(crate) fn session_snapshot(
        &self,
        session_id: u32,
    ) -> (Vec<Arc<dyn UwbSessionEventCallbacks>>, Vec<CallbackToken>) {
        let mut live = Vec::new();
        let mut expired = Vec::new();
        if let Some(tokens) = self.session_index.get(&session_id) {
            for &id in tokens {
                if let Some((_, weak)) = self.sessions.get(&id) {
                    match weak.upgrade() {
                        Some(callbacks) => live.push(callbacks),
                        None => expired.push(CallbackToken::from_raw(id)),
                    }
                }
            }
        }
        (live, expired)
    }

    /// Drop a batch of expired registrations
    pub(crate) fn purge(&mut self, expired: &[CallbackToken]) {
        for &token in expired {
            self.deregister(token);
        }
    }

    /// Whether any registration exists for the session id
    pub(crate) fn has_session_observers(&self, session_id: u32) -> bool {
        self.session_index.contains_key(&session_id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct NopObserver;
    impl UwbSessionEventCallbacks for NopObserver {}
    impl UwbDeviceEventCallbacks for NopObserver {}

    #[test]
    fn test_tokens_are_unique() {
        let mut registry = CallbackRegistry::new();
        let observer: Arc<NopObserver> = Arc::new(NopObserver);
        let a = registry
            .register_device(Arc::downgrade(&observer) as Weak<dyn UwbDeviceEventCallbacks>);
        let b = registry
            .register_session(7, Arc::downgrade(&observer) as Weak<dyn UwbSessionEventCallbacks>);
        assert_ne!(a, b);
    }

    #[test]
    fn test_deregister_is_idempotent_and_stale_safe() {
        let mut registry = CallbackRegistry::new();
        let observer: Arc<NopObserver> = Arc::new(NopObserver);
        let token = registry
            .register_session(7, Arc::downgrade(&observer) as Weak<dyn UwbSessionEventCallbacks>);
        assert!(registry.has_session_observers(7));

        registry.deregister(token);
        assert!(!registry.has_session_observers(7));
        // Stale/unknown tokens are a no-op
        registry.deregister(token);
        registry.deregister(CallbackToken::from_raw(9999));
    }

    #[test]
    fn test_snapshot_isolated_per_session() {
        let mut registry = CallbackRegistry::new();
        let observer: Arc<NopObserver> = Arc::new(NopObserver);
        registry
            .register_session(1, Arc::downgrade(&observer) as Weak<dyn UwbSessionEventCallbacks>);

        let (live, expired) = registry.session_snapshot(1);
        assert_eq!(live.len(), 1);
        assert!(expired.is_empty());

        let (live, _) = registry.session_snapshot(2);
        assert!(live.is_empty());
    }

    #[test]
    fn test_expired_observers_surface_for_purging() {
        let mut registry = CallbackRegistry::new();
        let observer: Arc<NopObserver> = Arc::new(NopObserver);
        registry
            .register_session(1, Arc::downgrade(&observer) as Weak<dyn UwbSessionEventCallbacks>);
        drop(observer);

        let (live, expired) = registry.session_snapshot(1);
        assert!(live.is_empty());
        assert_eq!(expired.len(), 1);

        registry.purge(&expired);
        assert!(!registry.has_session_observers(1));
    }
}
