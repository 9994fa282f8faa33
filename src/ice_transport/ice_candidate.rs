use std::fmt;

use ice::candidate::candidate_base::{unmarshal_candidate, CandidateBaseConfig};
use ice::candidate::candidate_host::CandidateHostConfig;
use ice::candidate::candidate_peer_reflexive::CandidatePeerReflexiveConfig;
use ice::candidate::candidate_relay::CandidateRelayConfig;
use ice::candidate::candidate_server_reflexive::CandidateServerReflexiveConfig;
use ice::candidate::Candidate;
use ice::tcp_type::TcpType;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;
use crate::ice_transport::ice_protocol::RTCIceProtocol;

const CANDIDATE_PREFIX: &str = "candidate:";
const CANDIDATE_MIN_FIELDS: usize = 8;
const EMPTY_RELATED_ADDRESS: &str = "-";

/// ICECandidate represents a ice candidate
///
/// <https://w3c.github.io/webrtc-pc/#rtcicecandidate-interface>
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidate {
    #[serde(skip)]
    pub stats_id: String,
    pub foundation: String,
    pub priority: u32,
    pub address: String,
    pub protocol: RTCIceProtocol,
    pub port: u16,
    #[serde(rename = "type")]
    pub typ: RTCIceCandidateType,
    pub component: u16,
    pub related_address: String,
    pub related_port: u16,
    pub tcp_type: String,
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
}

impl RTCIceCandidate {
    /// from_ice converts a candidate produced by the ICE agent, tagging it with
    /// the media section it was gathered for.
    pub fn from_ice(
        candidate: &(dyn Candidate + Send + Sync),
        sdp_mid: &str,
        sdp_mline_index: u16,
    ) -> Result<Self> {
        let typ = RTCIceCandidateType::from(candidate.candidate_type());
        if typ == RTCIceCandidateType::Unspecified {
            return Err(Error::ErrICECandidateTypeUnknown);
        }

        let (related_address, related_port) = match candidate.related_address() {
            Some(ra) if typ.has_related_address() => (ra.address, ra.port),
            _ => (String::new(), 0),
        };

        Ok(RTCIceCandidate {
            stats_id: candidate.id(),
            foundation: candidate.foundation(),
            priority: candidate.priority(),
            address: candidate.address(),
            protocol: RTCIceProtocol::from(candidate.network_type().network_short().as_str()),
            port: candidate.port(),
            typ,
            component: candidate.component(),
            related_address,
            related_port,
            tcp_type: match candidate.tcp_type() {
                TcpType::Unspecified => String::new(),
                t => t.to_string(),
            },
            sdp_mid: sdp_mid.to_owned(),
            sdp_mline_index,
        })
    }

    /// to_ice converts the candidate back into the form the ICE agent consumes.
    pub fn to_ice(&self) -> Result<impl Candidate> {
        let base_config = CandidateBaseConfig {
            candidate_id: self.stats_id.clone(),
            network: self.protocol.to_string(),
            address: self.address.clone(),
            port: self.port,
            component: self.component,
            foundation: self.foundation.clone(),
            priority: self.priority,
            ..Default::default()
        };

        let c = match self.typ {
            RTCIceCandidateType::Host => {
                let config = CandidateHostConfig {
                    base_config,
                    tcp_type: TcpType::from(self.tcp_type.as_str()),
                };
                config.new_candidate_host()?
            }
            RTCIceCandidateType::Srflx => {
                let config = CandidateServerReflexiveConfig {
                    base_config,
                    rel_addr: self.related_address.clone(),
                    rel_port: self.related_port,
                };
                config.new_candidate_server_reflexive()?
            }
            RTCIceCandidateType::Prflx => {
                let config = CandidatePeerReflexiveConfig {
                    base_config,
                    rel_addr: self.related_address.clone(),
                    rel_port: self.related_port,
                };
                config.new_candidate_peer_reflexive()?
            }
            RTCIceCandidateType::Relay => {
                let config = CandidateRelayConfig {
                    base_config,
                    rel_addr: self.related_address.clone(),
                    rel_port: self.related_port,
                    relay_client: None,
                };
                config.new_candidate_relay()?
            }
            RTCIceCandidateType::Unspecified => return Err(Error::ErrICECandidateTypeUnknown),
        };

        Ok(c)
    }

    /// from_wire_form parses an RFC 8445 candidate attribute value with the
    /// ICE agent's grammar. The `candidate:` prefix is optional.
    pub fn from_wire_form(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix(CANDIDATE_PREFIX).unwrap_or(raw);

        // Permissive encoders write an empty related address as "raddr rport N".
        let mut tokens: Vec<&str> = raw.split_whitespace().collect();
        let empty_related_address = tokens
            .iter()
            .skip(CANDIDATE_MIN_FIELDS)
            .position(|t| *t == "raddr")
            .map(|i| i + CANDIDATE_MIN_FIELDS + 1)
            .filter(|&i| tokens.get(i).map_or(true, |t| *t == "rport"));
        if let Some(i) = empty_related_address {
            tokens.insert(i, EMPTY_RELATED_ADDRESS);
        }

        let candidate = unmarshal_candidate(&tokens.join(" ")).map_err(|err| {
            match tokens.get(CANDIDATE_MIN_FIELDS - 1) {
                Some(typ) if RTCIceCandidateType::from(*typ) == RTCIceCandidateType::Unspecified => {
                    Error::ErrICECandidateTypeUnknown
                }
                _ => Error::ErrICECandidateInvalid(format!("{raw}: {err}")),
            }
        })?;

        let mut c = RTCIceCandidate::from_ice(&candidate, "", 0)?;
        // The wire form carries no id, so a parsed candidate has none either.
        c.stats_id.clear();
        if empty_related_address.is_some() {
            c.related_address.clear();
        }
        Ok(c)
    }

    /// from_init parses the candidate carried by an ICECandidateInit and
    /// attaches its media section coordinates.
    pub fn from_init(init: &RTCIceCandidateInit) -> Result<Self> {
        let mut candidate = RTCIceCandidate::from_wire_form(&init.candidate)?;
        candidate.sdp_mid = init.sdp_mid.clone().unwrap_or_default();
        candidate.sdp_mline_index = init.sdp_mline_index.unwrap_or_default();
        Ok(candidate)
    }

    /// to_wire_form serializes the candidate as an RFC 8445 candidate
    /// attribute value, without the `candidate:` prefix.
    pub fn to_wire_form(&self) -> Result<String> {
        let wire = self.to_ice()?.marshal();
        // An empty related address leaves a double space behind.
        Ok(wire.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// to_json returns an ICECandidateInit
    /// per the W3C definition <https://w3c.github.io/webrtc-pc/#dom-rtcicecandidate-tojson>
    ///
    /// A candidate that can't be serialized still produces a value, with an
    /// empty candidate line.
    pub fn to_json(&self) -> RTCIceCandidateInit {
        let wire = match self.to_wire_form() {
            Ok(wire) => wire,
            Err(err) => {
                log::debug!("to_json: {err}");
                String::new()
            }
        };

        RTCIceCandidateInit {
            candidate: format!("{CANDIDATE_PREFIX}{wire}"),
            sdp_mid: Some(self.sdp_mid.clone()),
            sdp_mline_index: Some(self.sdp_mline_index),
            username_fragment: None,
        }
    }
}

impl fmt::Display for RTCIceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Err(err) = self.to_wire_form() {
            return write!(f, "{self:?} failed to convert to ICE: {err}");
        }

        write!(
            f,
            "{} {} {}:{}",
            self.protocol, self.typ, self.address, self.port
        )?;
        if self.typ.has_related_address() {
            write!(
                f,
                " related {}:{}",
                self.related_address, self.related_port
            )?;
        }
        Ok(())
    }
}

/// ICECandidateInit is used to serialize ice candidates
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}
