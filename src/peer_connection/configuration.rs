use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ice_transport::ice_server::RTCIceServer;

/// A Configuration defines how peer-to-peer communication via PeerConnection
/// is established or re-established.
/// Configurations may be set up once and reused across multiple connections,
/// and are treated as readonly.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCConfiguration {
    /// Defines a slice describing servers available to be used by
    /// ICE, such as STUN and TURN servers. They are validated when the
    /// connection is created and handed to the ICE agent unchanged.
    #[serde(default)]
    pub ice_servers: Vec<RTCIceServer>,
}

impl RTCConfiguration {
    /// validate checks every ICE server. The first failure is returned as an
    /// `InvalidAccessError`.
    pub(crate) fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_configuration_json() {
        let j = r#"{"iceServers":[{"urls":["turn:turn.example.org"],"username":"jch","credential":"topsecret"}]}"#;

        let config: RTCConfiguration = serde_json::from_str(j).expect("valid configuration");
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].username, "jch");
        assert!(config.validate().is_ok());

        let empty: RTCConfiguration = serde_json::from_str("{}").expect("empty configuration");
        assert!(empty.ice_servers.is_empty());
    }

    #[test]
    fn test_configuration_validate_turn_without_credentials() {
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec!["turn:example.com".to_owned()],
                ..Default::default()
            }],
        };

        match config.validate() {
            Err(Error::InvalidAccessError(cause)) => {
                assert_eq!(*cause, Error::ErrNoTurnCredentials)
            }
            other => panic!("expected InvalidAccessError, got {other:?}"),
        }
    }
}
