
pub mod configuration;
pub(crate) mod operation;
mod peer_connection_internal;
pub(crate) mod router;
pub mod sdp;
pub mod signaling_state;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ::sdp::description::session::{Origin, SessionDescription, ATTR_KEY_GROUP};
use arc_swap::ArcSwapOption;
use interceptor::RTPWriter;
use portable_atomic::{AtomicBool, AtomicIsize, AtomicU8};
use smol_str::SmolStr;
use tokio::sync::{watch, Mutex, RwLock};

use crate::api::media_engine::NegotiatedMedia;
use crate::api::setting_engine::SettingEngine;
use crate::api::API;
use crate::error::{flatten_errs, Error, Result};
use crate::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use crate::ice_transport::ice_connection_state::RTCIceConnectionState;
use crate::ice_transport::RTCIceParameters;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::operation::{Operation, Operations};
use crate::peer_connection::peer_connection_internal::{in_track_handler, PeerConnectionInternal};
use crate::peer_connection::router::{Router, RouterConfig, RouterStats};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::*;
use crate::peer_connection::signaling_state::{
    next_signaling_state, RTCSignalingState, StateChangeOp,
};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{
    find_by_mid, find_by_payload_type, satisfy_type_and_direction, RTCRtpTransceiver,
    RTCRtpTransceiverInit,
};
use crate::track::track_local::TrackLocal;
use crate::track::track_remote::TrackRemote;

pub type OnSignalingStateChangeHdlrFn = Box<
    dyn (FnMut(RTCSignalingState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnICEConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(RTCIceConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnTrackHdlrFn = Box<
    dyn (FnMut(
            Arc<TrackRemote>,
            Arc<RTCRtpReceiver>,
            Arc<RTCRtpTransceiver>,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// PeerConnection represents a WebRTC connection that establishes a
/// peer-to-peer communications with another PeerConnection instance in a
/// browser, or to another endpoint implementing the required protocols.
///
/// Only the media negotiation half lives here: descriptions are applied and
/// generated, transceivers are tracked and incoming RTP/RTCP handed over by
/// the transport is routed to receivers. ICE state and candidates are fed in
/// from outside.
pub struct RTCPeerConnection {
    configuration: RTCConfiguration,

    pub(crate) internal: Arc<PeerConnectionInternal>,
}

impl fmt::Debug for RTCPeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCPeerConnection")
            .field("signaling_state", &self.signaling_state())
            .field("ice_connection_state", &self.ice_connection_state())
            .finish()
    }
}

impl fmt::Display for RTCPeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(RTCPeerConnection {})", self.signaling_state())
    }
}

impl RTCPeerConnection {
    /// creates a PeerConnection with the configuration. ICE servers are
    /// validated before anything is built.
    pub(crate) async fn new(api: &API, configuration: RTCConfiguration) -> Result<Self> {
        configuration.validate()?;

        let internal = PeerConnectionInternal::new(api);
        Ok(RTCPeerConnection {
            configuration,
            internal,
        })
    }

    /// on_signaling_state_change sets an event handler which is invoked when the
    /// peer connection's signaling state changes
    pub fn on_signaling_state_change(&self, f: OnSignalingStateChangeHdlrFn) {
        self.internal
            .on_signaling_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_ice_connection_state_change sets an event handler which is called
    /// when an ICE connection state is changed.
    pub fn on_ice_connection_state_change(&self, f: OnICEConnectionStateChangeHdlrFn) {
        self.internal
            .on_ice_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_track sets an event handler which is called when remote track
    /// arrives from a remote peer. It fires once per bound SSRC, after every
    /// lock is released, so the handler may call back into the connection.
    pub fn on_track(&self, f: OnTrackHdlrFn) {
        self.internal
            .on_track_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// update_ice_connection_state is how the external ICE agent reports its
    /// connection state. Senders of a completed negotiation start once the
    /// state is connected or completed.
    pub async fn update_ice_connection_state(&self, state: RTCIceConnectionState) {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return;
        }

        let previous = self.internal.ice_connection_state.send_replace(state);
        if previous == state {
            return;
        }

        log::info!("ICE connection state changed: {state}");
        if let Some(handler) = self.internal.on_ice_connection_state_change_handler.load_full() {
            let mut f = handler.lock().await;
            f(state).await;
        }
    }

    /// create_offer starts the PeerConnection and generates the localDescription
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createoffer>
    pub async fn create_offer(&self) -> Result<RTCSessionDescription> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let _negotiation = self.internal.negotiation.lock().await;

        let current_transceivers = {
            let rtp_transceivers = self.internal.rtp_transceivers.lock().await;
            rtp_transceivers.clone()
        };

        // mids handed out earlier must never be reused
        {
            let current_remote_description = self.internal.current_remote_description.lock().await;
            if let Some(parsed) = current_remote_description
                .as_ref()
                .and_then(|d| d.parsed.as_ref())
            {
                for media in &parsed.media_descriptions {
                    if let Some(numeric_mid) =
                        get_mid_value(media).and_then(|mid| mid.parse::<isize>().ok())
                    {
                        self.internal
                            .greater_mid
                            .fetch_max(numeric_mid, Ordering::SeqCst);
                    }
                }
            }
        }
        for t in &current_transceivers {
            if let Some(numeric_mid) = t.mid().and_then(|mid| mid.parse::<isize>().ok()) {
                self.internal
                    .greater_mid
                    .fetch_max(numeric_mid, Ordering::SeqCst);
            }
        }

        for t in &current_transceivers {
            if t.mid().is_some() {
                continue;
            }

            let mid = if let Some(generator) = &self.internal.setting_engine.mid_generator {
                let mid = generator(self.internal.greater_mid.load(Ordering::SeqCst));
                if let Ok(numeric_mid) = mid.parse::<isize>() {
                    self.internal
                        .greater_mid
                        .fetch_max(numeric_mid, Ordering::SeqCst);
                }
                mid
            } else {
                let numeric_mid = self.internal.greater_mid.fetch_add(1, Ordering::SeqCst) + 1;
                numeric_mid.to_string()
            };
            t.set_mid(SmolStr::from(mid))?;
        }

        let has_current_remote = self
            .internal
            .current_remote_description
            .lock()
            .await
            .is_some();
        let mut d = if has_current_remote {
            self.internal
                .generate_matched_sdp(current_transceivers, true)
                .await?
        } else {
            self.internal
                .generate_unmatched_sdp(current_transceivers)
                .await?
        };

        {
            let mut sdp_origin = self.internal.sdp_origin.lock().await;
            update_sdp_origin(&mut sdp_origin, &mut d);
        }

        let offer = RTCSessionDescription::from_parsed(RTCSdpType::Offer, d);
        {
            let mut last_offer = self.internal.last_offer.lock().await;
            last_offer.clone_from(&offer.sdp);
        }
        Ok(offer)
    }

    /// create_answer starts the PeerConnection and generates the localDescription
    pub async fn create_answer(&self) -> Result<RTCSessionDescription> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let _negotiation = self.internal.negotiation.lock().await;

        if self.remote_description().await.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        }
        let signaling_state = self.signaling_state();
        if signaling_state != RTCSignalingState::HaveRemoteOffer
            && signaling_state != RTCSignalingState::HaveLocalPranswer
        {
            return Err(Error::ErrIncorrectSignalingState);
        }

        let current_transceivers = {
            let rtp_transceivers = self.internal.rtp_transceivers.lock().await;
            rtp_transceivers.clone()
        };
        let mut d = self
            .internal
            .generate_matched_sdp(current_transceivers, false)
            .await?;

        {
            let mut sdp_origin = self.internal.sdp_origin.lock().await;
            update_sdp_origin(&mut sdp_origin, &mut d);
        }

        let answer = RTCSessionDescription::from_parsed(RTCSdpType::Answer, d);
        {
            let mut last_answer = self.internal.last_answer.lock().await;
            last_answer.clone_from(&answer.sdp);
        }
        Ok(answer)
    }

    /// set_local_description sets the SessionDescription of the local peer.
    /// An empty sdp takes the last offer or answer this connection created.
    pub async fn set_local_description(&self, mut desc: RTCSessionDescription) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        if desc.sdp.is_empty() {
            match desc.sdp_type {
                RTCSdpType::Answer | RTCSdpType::Pranswer => {
                    let last_answer = self.internal.last_answer.lock().await;
                    desc.sdp.clone_from(&last_answer);
                }
                RTCSdpType::Offer => {
                    let last_offer = self.internal.last_offer.lock().await;
                    desc.sdp.clone_from(&last_offer);
                }
                RTCSdpType::Rollback => {}
                RTCSdpType::Unspecified => return Err(Error::ErrPeerConnSDPTypeInvalidValue),
            }
            desc.parsed = None;
        }

        let next_state = {
            let _negotiation = self.internal.negotiation.lock().await;

            let cur = self.signaling_state();
            let next = next_signaling_state(cur, StateChangeOp::SetLocal, desc.sdp_type)?;

            if desc.sdp_type == RTCSdpType::Rollback {
                self.internal.rollback_remote().await;
            } else {
                let parsed = desc.parsed()?;
                section_mids(&parsed)?;
                if desc.sdp_type == RTCSdpType::Answer {
                    self.internal.apply_local_answer(&parsed).await;
                    self.internal.remote_undo.lock().await.take();
                }
                desc.parsed = Some(parsed);
            }

            self.internal
                .commit_description(&desc, StateChangeOp::SetLocal)
                .await;
            self.internal.signaling_state.store(next as u8, Ordering::SeqCst);
            log::debug!("signaling state changed: {cur} -> {next}");

            if next == RTCSignalingState::Stable && desc.sdp_type == RTCSdpType::Answer {
                self.internal.start_senders_when_connected().await?;
            }
            next
        };

        self.internal.do_signaling_state_change(next_state).await;
        Ok(())
    }

    /// local_description returns PendingLocalDescription if it is not null and
    /// otherwise it returns CurrentLocalDescription.
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        if let Some(pending_local_description) = self.pending_local_description().await {
            return Some(pending_local_description);
        }
        self.current_local_description().await
    }

    /// set_remote_description sets the SessionDescription of the remote peer.
    /// The description is validated as a whole before any transceiver is
    /// touched; a failed apply leaves the connection as it was.
    pub async fn set_remote_description(&self, mut desc: RTCSessionDescription) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let next_state = {
            let _negotiation = self.internal.negotiation.lock().await;

            let cur = self.signaling_state();
            if cur == RTCSignalingState::Stable && desc.sdp_type == RTCSdpType::Answer {
                let current_remote_description =
                    self.internal.current_remote_description.lock().await;
                if let Some(current) = &*current_remote_description {
                    if current.sdp_type == RTCSdpType::Answer && current.sdp == desc.sdp {
                        log::debug!("remote answer already applied, ignoring");
                        return Ok(());
                    }
                }
            }

            let next = next_signaling_state(cur, StateChangeOp::SetRemote, desc.sdp_type)?;

            if desc.sdp_type == RTCSdpType::Rollback {
                self.internal.rollback_remote().await;
            } else {
                let parsed = desc.parsed()?;
                let plan = self
                    .internal
                    .plan_remote_description(&parsed, desc.sdp_type)
                    .await?;
                self.internal
                    .apply_remote_description(&parsed, desc.sdp_type, plan)
                    .await?;
                desc.parsed = Some(parsed);
            }

            self.internal
                .commit_description(&desc, StateChangeOp::SetRemote)
                .await;
            self.internal.signaling_state.store(next as u8, Ordering::SeqCst);
            log::debug!("signaling state changed: {cur} -> {next}");

            if next == RTCSignalingState::Stable && desc.sdp_type == RTCSdpType::Answer {
                self.internal.start_senders_when_connected().await?;
            }
            next
        };

        self.internal.do_signaling_state_change(next_state).await;
        Ok(())
    }

    /// remote_description returns pending_remote_description if it is not null and
    /// otherwise it returns current_remote_description.
    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.internal.remote_description().await
    }

    /// senders_started resolves once the sender start step queued by the last
    /// completed negotiation has run. It fails with `ErrConnectionClosed`
    /// when the connection closes first.
    pub async fn senders_started(&self) -> Result<()> {
        self.internal.ops.reached().await
    }

    /// add_ice_candidate accepts an ICE candidate string and adds it
    /// to the existing set of candidates. An empty candidate marks the end
    /// of the remote candidates.
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let remote_description = self
            .remote_description()
            .await
            .ok_or(Error::ErrNoRemoteDescription)?;

        if candidate.candidate.trim().is_empty() {
            log::debug!("end of remote candidates");
            return Ok(());
        }

        if let Some(parsed) = &remote_description.parsed {
            let mids = section_mids(parsed)?;
            match (&candidate.sdp_mid, candidate.sdp_mline_index) {
                (Some(mid), _) => {
                    if !mids.iter().any(|m| m == mid.as_str()) {
                        return Err(Error::ErrICECandidateInvalid(format!(
                            "no media section with mid {mid}"
                        )));
                    }
                }
                (None, Some(index)) => {
                    if index as usize >= mids.len() {
                        return Err(Error::ErrICECandidateInvalid(format!(
                            "no media section at index {index}"
                        )));
                    }
                }
                (None, None) => return Err(Error::ErrICECandidateNoMidOrIndex),
            }
        }

        let c = RTCIceCandidate::from_init(&candidate)?;
        let mut remote_candidates = self.internal.remote_candidates.lock().await;
        if !remote_candidates.contains(&c) {
            log::trace!("added remote candidate {}", candidate.candidate);
            remote_candidates.push(c);
        }
        Ok(())
    }

    /// add_local_candidate hands a gathered candidate to the connection; it
    /// is written into every description generated afterwards. `None` marks
    /// gathering as complete.
    pub async fn add_local_candidate(&self, candidate: Option<RTCIceCandidate>) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        match candidate {
            Some(c) => {
                let mut local_candidates = self.internal.local_candidates.lock().await;
                if !local_candidates.contains(&c) {
                    local_candidates.push(c);
                }
            }
            None => self
                .internal
                .gathering_complete
                .store(true, Ordering::SeqCst),
        }
        Ok(())
    }

    /// remote_candidates returns the candidates learned from the remote
    /// descriptions and from add_ice_candidate.
    pub async fn remote_candidates(&self) -> Vec<RTCIceCandidate> {
        let remote_candidates = self.internal.remote_candidates.lock().await;
        remote_candidates.clone()
    }

    /// local_ice_parameters returns the credentials written into generated
    /// descriptions.
    pub fn local_ice_parameters(&self) -> RTCIceParameters {
        self.internal.ice_parameters.clone()
    }

    /// remote_ice_parameters returns the credentials of the last applied
    /// remote description.
    pub async fn remote_ice_parameters(&self) -> Option<RTCIceParameters> {
        let remote_ice_parameters = self.internal.remote_ice_parameters.lock().await;
        remote_ice_parameters.clone()
    }

    /// get_senders returns the RTPSender that are currently attached to this PeerConnection
    pub async fn get_senders(&self) -> Vec<Arc<RTCRtpSender>> {
        self.internal.get_senders().await
    }

    /// get_receivers returns the RTPReceivers that are currently attached to this PeerConnection
    pub async fn get_receivers(&self) -> Vec<Arc<RTCRtpReceiver>> {
        let mut receivers = vec![];
        let rtp_transceivers = self.internal.rtp_transceivers.lock().await;
        for transceiver in &*rtp_transceivers {
            receivers.push(transceiver.receiver().await);
        }
        receivers
    }

    /// get_transceivers returns the RtpTransceiver that are currently attached to this PeerConnection
    pub async fn get_transceivers(&self) -> Vec<Arc<RTCRtpTransceiver>> {
        let rtp_transceivers = self.internal.rtp_transceivers.lock().await;
        rtp_transceivers.clone()
    }

    /// add_track adds a Track to the PeerConnection. The first transceiver of
    /// the same kind with an empty sender slot that is not sending yet is
    /// reused, so its mid stays stable.
    pub async fn add_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
    ) -> Result<Arc<RTCRtpSender>> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let kind = track.kind();
        {
            let rtp_transceivers = self.internal.rtp_transceivers.lock().await;
            for t in &*rtp_transceivers {
                if t.is_stopped() {
                    continue;
                }
                if let Some(sender) = t.sender().await {
                    if let Some(existing) = sender.track().await {
                        if existing.id() == track.id() && existing.stream_id() == track.stream_id()
                        {
                            return Err(Error::ErrExistingTrack);
                        }
                    }
                }
            }

            for t in &*rtp_transceivers {
                if !t.accepts_track(kind).await {
                    continue;
                }

                let sender = self
                    .internal
                    .new_sender(kind, Some(Arc::clone(&track)), &[]);
                t.set_sender(Some(Arc::clone(&sender))).await;
                t.set_direction_internal(RTCRtpTransceiverDirection::from_send_recv(
                    true,
                    t.direction().has_recv(),
                ));
                log::debug!(
                    "add_track: reusing transceiver mid={:?} for {kind} track {}",
                    t.mid(),
                    track.id()
                );
                return Ok(sender);
            }
        }

        let (_, sender) = self
            .internal
            .new_transceiver_from_track(RTCRtpTransceiverDirection::Sendrecv, track, &[])
            .await?;
        Ok(sender)
    }

    /// remove_track removes a Track from the PeerConnection. The transceiver
    /// stays with its mid and no longer sends.
    pub async fn remove_track(&self, sender: &Arc<RTCRtpSender>) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let rtp_transceivers = self.internal.rtp_transceivers.lock().await;
        for t in &*rtp_transceivers {
            let owned = match t.sender().await {
                Some(s) => Arc::ptr_eq(&s, sender),
                None => false,
            };
            if !owned {
                continue;
            }

            sender.stop().await?;
            t.set_sender(None).await;
            t.set_direction_internal(RTCRtpTransceiverDirection::from_send_recv(
                false,
                t.direction().has_recv(),
            ));
            log::debug!("remove_track: detached sender from mid={:?}", t.mid());
            return Ok(());
        }

        Err(Error::ErrSenderNotCreatedByConnection)
    }

    /// add_transceiver_from_kind Create a new RtpTransceiver and adds it to the set of transceivers.
    pub async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        if kind == RTPCodecType::Unspecified {
            return Err(Error::ErrPeerConnAddTransceiverFromKindSupport);
        }

        let (direction, send_encodings) = match init {
            Some(init) => (init.direction, init.send_encodings),
            None => (RTCRtpTransceiverDirection::Sendrecv, vec![]),
        };

        let receiver = self.internal.new_receiver(kind);
        let t = match direction {
            RTCRtpTransceiverDirection::Sendonly | RTCRtpTransceiverDirection::Sendrecv => {
                if self.internal.media.get_codecs_by_kind(kind).is_empty() {
                    return Err(Error::ErrNoCodecsAvailable);
                }
                let rids: Vec<SmolStr> = send_encodings
                    .iter()
                    .filter(|e| !e.rid.is_empty())
                    .map(|e| e.rid.clone())
                    .collect();
                let sender = self.internal.new_sender(kind, None, &rids);
                self.internal
                    .new_transceiver(receiver, Some(sender), direction, kind)
                    .await
            }
            RTCRtpTransceiverDirection::Recvonly | RTCRtpTransceiverDirection::Inactive => {
                self.internal
                    .new_transceiver(receiver, None, direction, kind)
                    .await
            }
            RTCRtpTransceiverDirection::Unspecified => {
                return Err(Error::ErrPeerConnAddTransceiverFromKindSupport)
            }
        };

        Ok(t)
    }

    /// add_transceiver_from_track Create a new RtpTransceiver(SendRecv or SendOnly) and add it to the set of transceivers.
    /// Several send encodings with distinct rids make a simulcast sender.
    pub async fn add_transceiver_from_track(
        &self,
        track: Arc<dyn TrackLocal + Send + Sync>,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let (direction, send_encodings) = match init {
            Some(init) => (init.direction, init.send_encodings),
            None => (RTCRtpTransceiverDirection::Sendrecv, vec![]),
        };
        if direction != RTCRtpTransceiverDirection::Sendrecv
            && direction != RTCRtpTransceiverDirection::Sendonly
        {
            return Err(Error::ErrPeerConnAddTransceiverFromTrackSupport);
        }

        let rids: Vec<SmolStr> = send_encodings
            .iter()
            .filter(|e| !e.rid.is_empty())
            .map(|e| e.rid.clone())
            .collect();
        let (t, _) = self
            .internal
            .new_transceiver_from_track(direction, track, &rids)
            .await?;
        Ok(t)
    }

    /// route_incoming_packet hands one decrypted packet from the transport to
    /// the router. RTP is delivered to the bound remote track, binding
    /// undeclared SSRCs on the way; RTCP goes to the receivers and senders
    /// it reports on. Bad packets are dropped and counted, never returned.
    pub async fn route_incoming_packet(&self, buf: &[u8]) -> Result<()> {
        self.internal.route_incoming_packet(buf).await
    }

    /// router_stats returns the counters of packets the router dropped.
    pub fn router_stats(&self) -> RouterStats {
        self.internal.router.stats()
    }

    /// get_configuration returns a Configuration object representing the current
    /// configuration of this PeerConnection object.
    pub fn get_configuration(&self) -> &RTCConfiguration {
        &self.configuration
    }

    /// signaling_state attribute returns the signaling state of the
    /// PeerConnection instance.
    pub fn signaling_state(&self) -> RTCSignalingState {
        self.internal.signaling_state.load(Ordering::SeqCst).into()
    }

    /// ice_connection_state returns the ICE connection state last reported
    /// through update_ice_connection_state.
    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        *self.internal.ice_connection_state.borrow()
    }

    /// close ends the PeerConnection. Every transceiver is stopped, remote
    /// track queues are closed and pending sender starts are failed. It
    /// returns only after running on_track handlers have finished, except
    /// when called from inside one.
    pub async fn close(&self) -> Result<()> {
        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #1)
        if self.internal.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #4)
        self.internal
            .signaling_state
            .store(RTCSignalingState::Closed as u8, Ordering::SeqCst);

        // no routed packet reaches a handler from here on
        self.internal.router.close();

        let mut close_errs: Vec<Error> = vec![];

        // the queue is closed before the pending sender start is released so
        // nothing queued behind it runs
        if let Err(err) = self.internal.ops.close().await {
            close_errs.push(Error::new(format!("ops: {err}")));
        }
        self.internal
            .ice_connection_state
            .send_replace(RTCIceConnectionState::Closed);

        // https://www.w3.org/TR/webrtc/#dom-rtcpeerconnection-close (step #5)
        {
            let mut rtp_transceivers = self.internal.rtp_transceivers.lock().await;
            for t in &*rtp_transceivers {
                if let Err(err) = t.stop().await {
                    close_errs.push(Error::new(format!("rtp_transceivers: {err}")));
                }
            }
            rtp_transceivers.clear();
        }

        if in_track_handler() {
            log::debug!("close called from on_track, not waiting for handlers");
        } else {
            let _barrier = self.internal.handler_gate.write().await;
        }

        log::debug!("peer connection closed");
        flatten_errs(close_errs)
    }

    /// CurrentLocalDescription represents the local description that was
    /// successfully negotiated the last time the PeerConnection transitioned
    /// into the stable state plus any local candidates that have been generated
    /// by the ICEAgent since the offer or answer was created.
    pub async fn current_local_description(&self) -> Option<RTCSessionDescription> {
        let current_local_description = self.internal.current_local_description.lock().await;
        current_local_description.clone()
    }

    /// PendingLocalDescription represents a local description that is in the
    /// process of being negotiated plus any local candidates that have been
    /// generated by the ICEAgent since the offer or answer was created. If the
    /// PeerConnection is in the stable state, the value is null.
    pub async fn pending_local_description(&self) -> Option<RTCSessionDescription> {
        let pending_local_description = self.internal.pending_local_description.lock().await;
        pending_local_description.clone()
    }

    /// current_remote_description represents the last remote description that was
    /// successfully negotiated the last time the PeerConnection transitioned
    /// into the stable state plus any remote candidates that have been supplied
    /// via add_icecandidate() since the offer or answer was created.
    pub async fn current_remote_description(&self) -> Option<RTCSessionDescription> {
        let current_remote_description = self.internal.current_remote_description.lock().await;
        current_remote_description.clone()
    }

    /// pending_remote_description represents a remote description that is in the
    /// process of being negotiated, complete with any remote candidates that
    /// have been supplied via add_icecandidate() since the offer or answer was
    /// created. If the PeerConnection is in the stable state, the value is
    /// null.
    pub async fn pending_remote_description(&self) -> Option<RTCSessionDescription> {
        let pending_remote_description = self.internal.pending_remote_description.lock().await;
        pending_remote_description.clone()
    }
}
