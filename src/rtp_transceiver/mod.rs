#[cfg(test)]
mod rtp_transceiver_test;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::trace;
use portable_atomic::{AtomicBool, AtomicU8};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::Mutex;
use util::sync::Mutex as SyncMutex;

use crate::api::media_engine::NegotiatedMedia;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::*;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;

pub(crate) mod fmtp;
pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver_direction;

/// SSRC represents a synchronization source
/// A synchronization source is a randomly chosen
/// value meant to be globally unique within a particular
/// RTP session. Used to identify a single stream of media.
/// <https://tools.ietf.org/html/rfc3550#section-3>
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// PayloadType identifies the format of the RTP payload and determines
/// its interpretation by the application. Each codec in a RTP Session
/// will have a different PayloadType
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type PayloadType = u8;

/// TYPE_RTCP_FB_TRANSPORT_CC ..
pub const TYPE_RTCP_FB_TRANSPORT_CC: &str = "transport-cc";

/// TYPE_RTCP_FB_GOOG_REMB ..
pub const TYPE_RTCP_FB_GOOG_REMB: &str = "goog-remb";

/// TYPE_RTCP_FB_ACK ..
pub const TYPE_RTCP_FB_ACK: &str = "ack";

/// TYPE_RTCP_FB_CCM ..
pub const TYPE_RTCP_FB_CCM: &str = "ccm";

/// TYPE_RTCP_FB_NACK ..
pub const TYPE_RTCP_FB_NACK: &str = "nack";

/// RTPRtxParameters dictionary contains information relating to retransmission (RTX) settings.
/// <https://draft.ortc.org/#dom-rtcrtprtxparameters>
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpRtxParameters {
    pub ssrc: SSRC,
}

/// RTPCodingParameters describes one encoding of a sender or one decoded
/// stream of a receiver.
/// <http://draft.ortc.org/#dom-rtcrtpcodingparameters>
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpCodingParameters {
    pub rid: SmolStr,
    pub ssrc: SSRC,
    pub payload_type: PayloadType,
    pub rtx: RTCRtpRtxParameters,
}

/// RTPDecodingParameters provides information relating to both encoding and decoding.
/// <http://draft.ortc.org/#dom-rtcrtpdecodingparameters>
pub type RTCRtpDecodingParameters = RTCRtpCodingParameters;

/// RTPEncodingParameters provides information relating to both encoding and decoding.
/// <http://draft.ortc.org/#dom-rtcrtpencodingparameters>
pub type RTCRtpEncodingParameters = RTCRtpCodingParameters;

/// RTPReceiveParameters contains the RTP stack settings used by receivers
#[derive(Debug)]
pub struct RTCRtpReceiveParameters {
    pub encodings: Vec<RTCRtpDecodingParameters>,
}

/// RTPSendParameters contains the RTP stack settings used by senders
#[derive(Debug)]
pub struct RTCRtpSendParameters {
    pub rtp_parameters: RTCRtpParameters,
    pub encodings: Vec<RTCRtpEncodingParameters>,
}

/// RTPTransceiverInit dictionary is used when calling the WebRTC function addTransceiver() to provide configuration options for the new transceiver.
#[derive(Default, Debug, Clone)]
pub struct RTCRtpTransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
    /// One entry per simulcast layer. Only `rid` is read; SSRCs are generated.
    pub send_encodings: Vec<RTCRtpEncodingParameters>,
}

/// RTPTransceiver represents a combination of an RTPSender and an RTPReceiver that share a common mid.
pub struct RTCRtpTransceiver {
    mid: SyncMutex<Option<SmolStr>>,
    sender: Mutex<Option<Arc<RTCRtpSender>>>,
    receiver: Mutex<Arc<RTCRtpReceiver>>,

    direction: AtomicU8,         //RTPTransceiverDirection
    current_direction: AtomicU8, //RTPTransceiverDirection

    codecs: Mutex<Vec<RTCRtpCodecParameters>>, // User provided codecs via set_codec_preferences

    pub(crate) stopped: AtomicBool,
    pub(crate) kind: RTPCodecType,

    media: Arc<NegotiatedMedia>,
}

impl RTCRtpTransceiver {
    pub(crate) fn new(
        receiver: Arc<RTCRtpReceiver>,
        sender: Option<Arc<RTCRtpSender>>,
        direction: RTCRtpTransceiverDirection,
        kind: RTPCodecType,
        codecs: Vec<RTCRtpCodecParameters>,
        media: Arc<NegotiatedMedia>,
    ) -> Arc<Self> {
        Arc::new(RTCRtpTransceiver {
            mid: SyncMutex::new(None),
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),

            direction: AtomicU8::new(direction as u8),
            current_direction: AtomicU8::new(RTCRtpTransceiverDirection::Unspecified as u8),

            codecs: Mutex::new(codecs),
            stopped: AtomicBool::new(false),
            kind,
            media,
        })
    }

    /// set_codec_preferences sets preferred list of supported codecs
    /// if codecs is empty or nil we reset to default from MediaEngine
    pub async fn set_codec_preferences(&self, codecs: Vec<RTCRtpCodecParameters>) -> Result<()> {
        let media_engine_codecs = self.media.get_codecs_by_kind(self.kind);
        for codec in &codecs {
            let (_, match_type) = codec_parameters_fuzzy_search(codec, &media_engine_codecs);
            if match_type == CodecMatch::None {
                return Err(Error::ErrRTPTransceiverCodecUnsupported);
            }
        }

        let mut c = self.codecs.lock().await;
        *c = codecs;
        Ok(())
    }

    /// get_codecs returns the codecs this transceiver offers, the user
    /// preferences filtered through the codec table when any are set.
    pub(crate) async fn get_codecs(&self) -> Vec<RTCRtpCodecParameters> {
        let media_engine_codecs = self.media.get_codecs_by_kind(self.kind);

        let codecs = self.codecs.lock().await;
        if codecs.is_empty() {
            return media_engine_codecs;
        }

        let mut filtered = vec![];
        for codec in &*codecs {
            let (c, match_type) = codec_parameters_fuzzy_search(codec, &media_engine_codecs);
            if match_type != CodecMatch::None {
                filtered.push(c);
            }
        }
        filtered
    }

    /// sender returns the RTPTransceiver's RTPSender if it has one
    pub async fn sender(&self) -> Option<Arc<RTCRtpSender>> {
        let sender = self.sender.lock().await;
        sender.clone()
    }

    pub(crate) async fn set_sender(&self, s: Option<Arc<RTCRtpSender>>) {
        let mut sender = self.sender.lock().await;
        *sender = s;
    }

    /// receiver returns the RTPTransceiver's RTPReceiver
    pub async fn receiver(&self) -> Arc<RTCRtpReceiver> {
        let receiver = self.receiver.lock().await;
        receiver.clone()
    }

    pub(crate) async fn set_receiver(&self, r: Arc<RTCRtpReceiver>) {
        let mut receiver = self.receiver.lock().await;
        *receiver = r;
    }

    /// set_mid sets the RTPTransceiver's mid. Setting the mid it already
    /// carries is a no-op, any other value is an error.
    pub(crate) fn set_mid(&self, mid: SmolStr) -> Result<()> {
        let mut current = self.mid.lock();
        match &*current {
            Some(current) if *current == mid => Ok(()),
            Some(_) => Err(Error::ErrRTPTransceiverCannotChangeMid),
            None => {
                *current = Some(mid);
                Ok(())
            }
        }
    }

    /// clear_mid takes back a mid handed out by a remote offer that was
    /// rolled back before an answer committed it.
    pub(crate) fn clear_mid(&self) {
        let mut mid = self.mid.lock();
        if let Some(mid) = mid.take() {
            trace!("mid {mid} released by rollback");
        }
    }

    /// mid gets the Transceiver's mid value. When not already set, this value will be set in CreateOffer or create_answer.
    pub fn mid(&self) -> Option<SmolStr> {
        self.mid.lock().clone()
    }

    /// kind returns RTPTransceiver's kind.
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// direction returns the RTPTransceiver's desired direction.
    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction.load(Ordering::SeqCst).into()
    }

    /// set_direction changes the direction offered in the next negotiation.
    pub fn set_direction(&self, d: RTCRtpTransceiverDirection) {
        self.set_direction_internal(d);
    }

    pub(crate) fn set_direction_internal(&self, d: RTCRtpTransceiverDirection) -> bool {
        let previous: RTCRtpTransceiverDirection =
            self.direction.swap(d as u8, Ordering::SeqCst).into();

        let changed = d != previous;

        if changed {
            trace!(
                "Changing direction of transceiver from {} to {}",
                previous,
                d
            );
        }

        changed
    }

    /// current_direction returns the RTPTransceiver's current direction as negotiated.
    ///
    /// If this transceiver has never been negotiated or if it's stopped this returns [`RTCRtpTransceiverDirection::Unspecified`].
    pub fn current_direction(&self) -> RTCRtpTransceiverDirection {
        if self.stopped.load(Ordering::SeqCst) {
            return RTCRtpTransceiverDirection::Unspecified;
        }

        self.current_direction.load(Ordering::SeqCst).into()
    }

    pub(crate) fn set_current_direction(&self, d: RTCRtpTransceiverDirection) {
        let previous: RTCRtpTransceiverDirection = self
            .current_direction
            .swap(d as u8, Ordering::SeqCst)
            .into();

        if d != previous {
            trace!(
                "Changing current direction of transceiver from {} to {}",
                previous,
                d,
            );
        }
    }

    /// is_stopped reports whether stop has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// stop irreversibly stops the RTPTransceiver. The slot and its mid
    /// stay in place; calling stop again does nothing.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut errs = vec![];
        if let Some(sender) = self.sender().await {
            if let Err(err) = sender.stop().await {
                errs.push(err);
            }
        }
        if let Err(err) = self.receiver().await.stop() {
            errs.push(err);
        }

        self.set_direction_internal(RTCRtpTransceiverDirection::Inactive);

        crate::error::flatten_errs(errs)
    }

    /// accepts_track reports whether add_track may attach a new sender to
    /// this slot: same kind, not stopped, no sender, and a direction that
    /// can be turned into sending.
    pub(crate) async fn accepts_track(&self, kind: RTPCodecType) -> bool {
        if self.kind != kind || self.is_stopped() {
            return false;
        }
        if self.sender().await.is_some() {
            return false;
        }
        matches!(
            self.direction(),
            RTCRtpTransceiverDirection::Recvonly | RTCRtpTransceiverDirection::Inactive
        )
    }
}

impl fmt::Debug for RTCRtpTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCRtpTransceiver")
            .field("mid", &self.mid())
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("direction", &self.direction)
            .field("current_direction", &self.current_direction)
            .field("codecs", &self.codecs)
            .field("stopped", &self.stopped)
            .field("kind", &self.kind)
            .finish()
    }
}

/// find_by_mid plucks the transceiver carrying `mid` out of the list.
pub(crate) fn find_by_mid(
    mid: &str,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Option<Arc<RTCRtpTransceiver>> {
    let i = local_transceivers
        .iter()
        .position(|t| t.mid().as_deref() == Some(mid))?;
    Some(local_transceivers.remove(i))
}

/// Given a direction+type pluck a transceiver from the passed list
/// if no entry satisfies the requested type+direction return None
pub(crate) fn satisfy_type_and_direction(
    remote_kind: RTPCodecType,
    remote_direction: RTCRtpTransceiverDirection,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Option<Arc<RTCRtpTransceiver>> {
    // Get direction order from most preferred to least
    let get_preferred_directions = || -> Vec<RTCRtpTransceiverDirection> {
        match remote_direction {
            RTCRtpTransceiverDirection::Sendrecv => vec![
                RTCRtpTransceiverDirection::Recvonly,
                RTCRtpTransceiverDirection::Sendrecv,
            ],
            RTCRtpTransceiverDirection::Sendonly => vec![RTCRtpTransceiverDirection::Recvonly],
            RTCRtpTransceiverDirection::Recvonly => vec![
                RTCRtpTransceiverDirection::Sendonly,
                RTCRtpTransceiverDirection::Sendrecv,
            ],
            _ => vec![],
        }
    };

    for possible_direction in get_preferred_directions() {
        for (i, t) in local_transceivers.iter().enumerate() {
            if t.mid().is_none()
                && !t.is_stopped()
                && t.kind == remote_kind
                && possible_direction == t.direction()
            {
                return Some(local_transceivers.remove(i));
            }
        }
    }

    None
}

/// find_by_payload_type is the lookup for sections that carry neither a mid
/// nor an SSRC. The section's formats are matched against the local codec
/// table of its kind; the first unbound transceiver of that kind that offers
/// one of those payload types wins. When nothing matches by payload type the
/// first unbound transceiver of that kind is taken, so sections pair with
/// transceivers in creation order.
pub(crate) async fn find_by_payload_type(
    formats: &[PayloadType],
    kind: RTPCodecType,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Option<Arc<RTCRtpTransceiver>> {
    let mut unbound = vec![];
    for (i, t) in local_transceivers.iter().enumerate() {
        if t.mid().is_none() && !t.is_stopped() && t.kind == kind {
            unbound.push(i);
        }
    }

    for &i in &unbound {
        let codecs = local_transceivers[i].get_codecs().await;
        if codecs.iter().any(|c| formats.contains(&c.payload_type)) {
            return Some(local_transceivers.remove(i));
        }
    }

    let i = *unbound.first()?;
    Some(local_transceivers.remove(i))
}
