//! Near-object connection profiles.
//!
//! A profile is an opaque bundle of connection intent supplied by external
//! collaborators (persistence, configuration loaders). The core does not
//! parse or produce the persisted representation; the types here are serde
//! (de)serializable so those collaborators can store them however they like.

use serde::{Deserialize, Serialize};

use crate::fira::params::{AppConfigParameter, AppConfigParameterType, AppConfigValue};

/// The connection scope: a single peer (unicast) or multiple peers
/// (multicast).
///
/// The scope designates support, not an absolute requirement - a multicast
/// profile still permits unicast connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NearObjectConnectionScope {
    Unicast,
    Multicast,
    Unknown,
}

impl Default for NearObjectConnectionScope {
    fn default() -> Self {
        NearObjectConnectionScope::Unicast
    }
}

impl NearObjectConnectionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            NearObjectConnectionScope::Unicast => "unicast",
            NearObjectConnectionScope::Multicast => "multicast",
            NearObjectConnectionScope::Unknown => "unknown",
        }
    }

    pub fn from_str(scope: &str) -> Self {
        match scope {
            "unicast" => NearObjectConnectionScope::Unicast,
            "multicast" => NearObjectConnectionScope::Multicast,
            _ => NearObjectConnectionScope::Unknown,
        }
    }
}

/// Security requirements of a connection.
///
/// When absent from a profile, no security is required and all security
/// features of the device and its peers are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearObjectProfileSecurity {
    /// A secure device is required to host the session
    pub secure_device: bool,
    /// A secure channel is required towards each peer
    pub secure_channel: bool,
}

/// A collection of configuration specifying how to connect to a near object
/// peer or set of peers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearObjectProfile {
    /// Supported connection scope
    pub scope: NearObjectConnectionScope,
    /// Optional security requirement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<NearObjectProfileSecurity>,
}

impl NearObjectProfile {
    /// Profile with an explicit scope and no security configuration
    pub fn new(scope: NearObjectConnectionScope) -> Self {
        NearObjectProfile {
            scope,
            security: None,
        }
    }

    /// Whether two profiles describe the same connection intent
    pub fn is_same(&self, other: &NearObjectProfile) -> bool {
        self == other
    }

    /// Baseline session parameters implied by the profile.
    ///
    /// This is the only interpretation the core performs: the scope selects
    /// the multi-node mode. Everything else in a profile stays opaque.
    pub fn base_parameters(&self) -> Vec<AppConfigParameter> {
        let multi_node_mode = match self.scope {
            NearObjectConnectionScope::Multicast => 1, // one-to-many
            _ => 0,                                    // unicast
        };
        match AppConfigParameter::new(
            AppConfigParameterType::MultiNodeMode,
            AppConfigValue::U8(multi_node_mode),
        ) {
            Ok(param) => vec![param],
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_string_roundtrip() {
        for scope in [
            NearObjectConnectionScope::Unicast,
            NearObjectConnectionScope::Multicast,
            NearObjectConnectionScope::Unknown,
        ] {
            assert_eq!(NearObjectConnectionScope::from_str(scope.as_str()), scope);
        }
        assert_eq!(
            NearObjectConnectionScope::from_str("garbage"),
            NearObjectConnectionScope::Unknown
        );
    }

    #[test]
    fn test_profile_equality() {
        let a = NearObjectProfile::new(NearObjectConnectionScope::Multicast);
        let b = NearObjectProfile::new(NearObjectConnectionScope::Multicast);
        assert!(a.is_same(&b));

        let mut c = b.clone();
        c.security = Some(NearObjectProfileSecurity {
            secure_device: true,
            secure_channel: false,
        });
        assert!(!a.is_same(&c));
    }

    #[test]
    fn test_profile_json_roundtrip() {
        let profile = NearObjectProfile {
            scope: NearObjectConnectionScope::Multicast,
            security: Some(NearObjectProfileSecurity {
                secure_device: true,
                secure_channel: true,
            }),
        };
        let json = serde_json::to_string(&profile).unwrap();
        let parsed: NearObjectProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn test_base_parameters_follow_scope() {
        let unicast = NearObjectProfile::new(NearObjectConnectionScope::Unicast);
        let params = unicast.base_parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].value(), &AppConfigValue::U8(0));

        let multicast = NearObjectProfile::new(NearObjectConnectionScope::Multicast);
        assert_eq!(multicast.base_parameters()[0].value(), &AppConfigValue::U8(1));
    }
}
