use std::io::Cursor;

use sdp::description::session::SessionDescription;
use serde::{Deserialize, Serialize};

use super::sdp_type::RTCSdpType;
use crate::error::Result;

/// An offer, answer, pranswer or rollback as exchanged over signaling.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    /// Cached parse of `sdp`, filled by the constructors below.
    #[serde(skip)]
    pub(crate) parsed: Option<SessionDescription>,
}

impl RTCSessionDescription {
    fn with_type(sdp: String, sdp_type: RTCSdpType) -> Result<RTCSessionDescription> {
        let mut desc = RTCSessionDescription {
            sdp,
            sdp_type,
            parsed: None,
        };

        let parsed = desc.unmarshal()?;
        desc.parsed = Some(parsed);

        Ok(desc)
    }

    /// Parses `sdp` and tags it as an answer.
    pub fn answer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::with_type(sdp, RTCSdpType::Answer)
    }

    pub fn offer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::with_type(sdp, RTCSdpType::Offer)
    }

    /// A provisional answer. The final answer may still differ.
    pub fn pranswer(sdp: String) -> Result<RTCSessionDescription> {
        RTCSessionDescription::with_type(sdp, RTCSdpType::Pranswer)
    }

    /// rollback cancels the pending offer on whichever side applies it.
    pub fn rollback() -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Rollback,
            ..Default::default()
        }
    }

    /// from_parsed wraps a description built in memory, keeping the text
    /// form in sync with it.
    pub(crate) fn from_parsed(sdp_type: RTCSdpType, parsed: SessionDescription) -> Self {
        RTCSessionDescription {
            sdp_type,
            sdp: parsed.marshal(),
            parsed: Some(parsed),
        }
    }

    pub fn unmarshal(&self) -> Result<SessionDescription> {
        let mut reader = Cursor::new(self.sdp.as_bytes());
        let parsed = SessionDescription::unmarshal(&mut reader)?;
        Ok(parsed)
    }

    /// parsed returns the structured form, parsing the text when the
    /// description was built by deserialization.
    pub(crate) fn parsed(&self) -> Result<SessionDescription> {
        match &self.parsed {
            Some(parsed) => Ok(parsed.clone()),
            None => self.unmarshal(),
        }
    }
}
