use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_credential_type::RTCIceCredentialType;

/// OAuthCredential is the time-bound token pair used by
/// `RTCIceCredentialType::Oauth`, <https://tools.ietf.org/html/rfc7635>.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCOAuthCredential {
    /// base64-url encoded MAC key shared with the TURN server
    #[serde(rename = "MACKey")]
    pub mac_key: String,

    /// base64-encoded, encrypted self-contained token
    #[serde(rename = "AccessToken")]
    pub access_token: String,
}

/// The secret handed to a TURN server. Which variant is valid depends on the
/// server's `credential_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RTCIceCredential {
    Password(String),
    Oauth(RTCOAuthCredential),
}

impl From<&str> for RTCIceCredential {
    fn from(password: &str) -> Self {
        RTCIceCredential::Password(password.to_owned())
    }
}

impl From<RTCOAuthCredential> for RTCIceCredential {
    fn from(credential: RTCOAuthCredential) -> Self {
        RTCIceCredential::Oauth(credential)
    }
}

/// ICEServer describes a single STUN and TURN server that can be used by
/// the ICEAgent to establish a connection with a peer.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<RTCIceCredential>,
    pub credential_type: RTCIceCredentialType,
}

/// The credential is decoded as the shape `credentialType` names, so an
/// oauth server carrying a plain string fails to decode.
impl<'de> Deserialize<'de> for RTCIceServer {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum CredentialField {
            Password(String),
            Oauth(RTCOAuthCredential),
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Fields {
            #[serde(default)]
            urls: Vec<String>,
            #[serde(default)]
            username: String,
            #[serde(default)]
            credential: Option<CredentialField>,
            #[serde(default)]
            credential_type: RTCIceCredentialType,
        }

        let fields = Fields::deserialize(deserializer)?;
        let credential = match (fields.credential_type, fields.credential) {
            (_, None) => None,
            (RTCIceCredentialType::Password, Some(CredentialField::Password(password))) => {
                Some(RTCIceCredential::Password(password))
            }
            (RTCIceCredentialType::Oauth, Some(CredentialField::Oauth(credential))) => {
                Some(RTCIceCredential::Oauth(credential))
            }
            (credential_type, Some(_)) => {
                return Err(D::Error::custom(format!(
                    "credential does not match credentialType {credential_type}"
                )));
            }
        };

        Ok(RTCIceServer {
            urls: fields.urls,
            username: fields.username,
            credential,
            credential_type: fields.credential_type,
        })
    }
}

impl RTCIceServer {
    fn parse_url(&self, url_str: &str) -> Result<ice::url::Url> {
        Ok(ice::url::Url::parse_url(url_str)?)
    }

    /// validate checks every url and the credentials TURN urls need. All
    /// failures surface as `InvalidAccessError`.
    pub fn validate(&self) -> Result<()> {
        self.urls()?;
        Ok(())
    }

    /// urls parses the configured urls, filling in TURN credentials.
    pub fn urls(&self) -> Result<Vec<ice::url::Url>> {
        let mut urls = vec![];

        for url_str in &self.urls {
            let mut url = self.parse_url(url_str).map_err(Error::invalid_access)?;
            if url.scheme == ice::url::SchemeType::Turn || url.scheme == ice::url::SchemeType::Turns
            {
                // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3.2)
                let credential = match &self.credential {
                    Some(credential) if !self.username.is_empty() => credential,
                    _ => return Err(Error::invalid_access(Error::ErrNoTurnCredentials)),
                };
                url.username = self.username.clone();

                match (self.credential_type, credential) {
                    // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3.3)
                    (RTCIceCredentialType::Password, RTCIceCredential::Password(password)) => {
                        url.password = password.clone();
                    }
                    // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3.4)
                    (RTCIceCredentialType::Oauth, RTCIceCredential::Oauth(_)) => {}
                    _ => return Err(Error::invalid_access(Error::ErrTurnCredentials)),
                }
            }

            urls.push(url);
        }

        Ok(urls)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn oauth() -> RTCIceCredential {
        RTCOAuthCredential {
            mac_key: "WmtzanB3ZW9peFhtdm42NzUzNG0=".to_owned(),
            access_token: "AAwg3kPHWPfvk9bDFL936wYvkoctMADzQ5VhNDgeMR3+ZlZ35byg972fW8QjpEl7bx91YLBPFsIhsxloWcXPhA==".to_owned(),
        }
        .into()
    }

    #[test]
    fn test_ice_server_validate_success() {
        let tests = vec![
            RTCIceServer {
                urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
                username: "unittest".to_owned(),
                credential: Some("placeholder".into()),
                credential_type: RTCIceCredentialType::Password,
            },
            RTCIceServer {
                urls: vec!["turn:[2001:db8:1234:5678::1]?transport=udp".to_owned()],
                username: "unittest".to_owned(),
                credential: Some("placeholder".into()),
                credential_type: RTCIceCredentialType::Password,
            },
            RTCIceServer {
                urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
                username: "unittest".to_owned(),
                credential: Some(oauth()),
                credential_type: RTCIceCredentialType::Oauth,
            },
            RTCIceServer {
                urls: vec!["turn:example.com".to_owned()],
                username: "u".to_owned(),
                credential: Some("p".into()),
                credential_type: RTCIceCredentialType::Password,
            },
            RTCIceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                ..Default::default()
            },
        ];

        for ice_server in tests {
            assert!(ice_server.validate().is_ok(), "{ice_server:?}");
        }
    }

    #[test]
    fn test_ice_server_urls_carry_credentials() {
        let ice_server = RTCIceServer {
            urls: vec!["turn:example.com".to_owned()],
            username: "u".to_owned(),
            credential: Some("p".into()),
            credential_type: RTCIceCredentialType::Password,
        };
        let urls = ice_server.urls().unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].username, "u");
        assert_eq!(urls[0].password, "p");
    }

    #[test]
    fn test_ice_server_validate_failure() {
        let tests = vec![
            (
                RTCIceServer {
                    urls: vec!["turn:example.com".to_owned()],
                    ..Default::default()
                },
                Error::ErrNoTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
                    username: "unittest".to_owned(),
                    credential: None,
                    credential_type: RTCIceCredentialType::Password,
                },
                Error::ErrNoTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["turns:192.158.29.39".to_owned()],
                    username: String::new(),
                    credential: Some("p".into()),
                    credential_type: RTCIceCredentialType::Password,
                },
                Error::ErrNoTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["turn:example.com".to_owned()],
                    username: "u".to_owned(),
                    credential: Some("p".into()),
                    credential_type: RTCIceCredentialType::Oauth,
                },
                Error::ErrTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["turn:example.com".to_owned()],
                    username: "u".to_owned(),
                    credential: Some(oauth()),
                    credential_type: RTCIceCredentialType::Password,
                },
                Error::ErrTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["turn:example.com".to_owned()],
                    username: "u".to_owned(),
                    credential: Some("p".into()),
                    credential_type: RTCIceCredentialType::Unspecified,
                },
                Error::ErrTurnCredentials,
            ),
        ];

        for (ice_server, expected_err) in tests {
            match ice_server.validate() {
                Err(Error::InvalidAccessError(cause)) => {
                    assert_eq!(*cause, expected_err, "{ice_server:?}");
                }
                other => panic!("expected InvalidAccessError for {ice_server:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_ice_server_validate_failure_err_stun_query() {
        let ice_server = RTCIceServer {
            urls: vec!["stun:google.de?transport=udp".to_owned()],
            username: "unittest".to_owned(),
            credential: None,
            credential_type: RTCIceCredentialType::Oauth,
        };

        match ice_server.validate() {
            Err(Error::InvalidAccessError(cause)) => {
                assert_eq!(*cause, ice::Error::ErrStunQuery);
            }
            other => panic!("expected InvalidAccessError, got {other:?}"),
        }
    }

    #[test]
    fn test_ice_server_json() {
        let server: RTCIceServer = serde_json::from_str(
            r#"{"urls":["turn:turn.example.org"],"username":"jch","credential":"topsecret"}"#,
        )
        .unwrap();
        assert_eq!(server.credential_type, RTCIceCredentialType::Password);
        assert_eq!(server.credential, Some("topsecret".into()));
        assert!(server.validate().is_ok());

        let server: RTCIceServer = serde_json::from_str(
            r#"{"urls":["turn:turn.example.org"],"username":"jch","credential":{"MACKey":"WmtzanB3ZW9peFhtdm42NzUzNG0=","AccessToken":"AAwg3kPHWPfvk9bDFL936wYvkoctMADzQ5VhNDgeMR3+ZlZ35byg972fW8QjpEl7bx91YLBPFsIhsxloWcXPhA=="},"credentialType":"oauth"}"#,
        )
        .unwrap();
        assert_eq!(server.credential_type, RTCIceCredentialType::Oauth);
        assert_eq!(server.credential, Some(oauth()));
        assert!(server.validate().is_ok());

        // the credential shape follows credentialType
        for raw in [
            r#"{"urls":["turn:turn.example.org"],"username":"jch","credential":"p","credentialType":"oauth"}"#,
            r#"{"credentialType":"oauth","credential":"p"}"#,
            r#"{"credential":{"MACKey":"a","AccessToken":"b"}}"#,
            r#"{"credential":"p","credentialType":"unspecified"}"#,
        ] {
            assert!(serde_json::from_str::<RTCIceServer>(raw).is_err(), "{raw}");
        }

        let server: RTCIceServer =
            serde_json::from_str(r#"{"urls":["stun:stun.l.google.com:19302"],"credentialType":"oauth"}"#)
                .unwrap();
        assert_eq!(server.credential, None);

        let encoded = serde_json::to_string(&RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            encoded,
            r#"{"urls":["stun:stun.l.google.com:19302"],"credentialType":"password"}"#
        );
    }
}
