use ice::rand::{generate_pwd, generate_ufrag};

use super::*;
use crate::api::media_engine::NegotiatedState;
use crate::peer_connection::router::{
    is_rtcp, DeclaredStream, RemoteRoutes, RemoteSection, TrackEvent,
};
use crate::rtp_transceiver::SSRC;

tokio::task_local! {
    static IN_TRACK_HANDLER: bool;
}

/// in_track_handler reports whether the current task is running an
/// on_track handler.
pub(super) fn in_track_handler() -> bool {
    IN_TRACK_HANDLER.try_with(|v| *v).unwrap_or(false)
}

pub(crate) struct PeerConnectionInternal {
    /// greater_mid is used to generate the next mid
    pub(super) greater_mid: AtomicIsize,
    pub(super) sdp_origin: Mutex<Origin>,
    pub(super) last_offer: Mutex<String>,
    pub(super) last_answer: Mutex<String>,

    pub(super) is_closed: AtomicBool,
    /// ops is an operations queue which will ensure the enqueued actions are
    /// executed in order. It is used for asynchronously, but serially processing
    /// the sender start step of a completed negotiation
    pub(crate) ops: Arc<Operations>,
    pub(super) signaling_state: AtomicU8,
    /// serializes offer/answer generation and description applies
    pub(super) negotiation: Mutex<()>,

    pub(super) ice_connection_state: watch::Sender<RTCIceConnectionState>,
    pub(super) ice_parameters: RTCIceParameters,
    pub(super) local_candidates: Mutex<Vec<RTCIceCandidate>>,
    pub(super) gathering_complete: AtomicBool,
    pub(super) remote_ice_parameters: Mutex<Option<RTCIceParameters>>,
    pub(super) remote_candidates: Mutex<Vec<RTCIceCandidate>>,
    /// what the remote descriptions of the open negotiation round replaced
    pub(super) remote_undo: Mutex<Option<RemoteUndo>>,

    pub(super) current_local_description: Mutex<Option<RTCSessionDescription>>,
    pub(super) current_remote_description: Mutex<Option<RTCSessionDescription>>,
    pub(super) pending_local_description: Mutex<Option<RTCSessionDescription>>,
    pub(super) pending_remote_description: Mutex<Option<RTCSessionDescription>>,

    pub(super) rtp_transceivers: Mutex<Vec<Arc<RTCRtpTransceiver>>>,

    pub(super) on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
    pub(super) on_signaling_state_change_handler:
        ArcSwapOption<Mutex<OnSignalingStateChangeHdlrFn>>,
    pub(super) on_ice_connection_state_change_handler:
        ArcSwapOption<Mutex<OnICEConnectionStateChangeHdlrFn>>,
    /// held shared by every running on_track handler and exclusively by close
    pub(super) handler_gate: Arc<RwLock<()>>,

    pub(super) setting_engine: Arc<SettingEngine>,
    pub(crate) media: Arc<NegotiatedMedia>,
    pub(super) rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
    pub(crate) router: Router,
}

/// RemoteSectionPlan is the outcome of matching one media section of a
/// remote description against the local transceivers.
pub(crate) struct RemoteSectionPlan {
    index: usize,
    mid: SmolStr,
    kind: RTPCodecType,
    direction: RTCRtpTransceiverDirection,
    rejected: bool,
    /// None when a transceiver has to be created for the section
    transceiver: Option<Arc<RTCRtpTransceiver>>,
}

/// RemotePlan holds everything a remote description changes, computed
/// before anything is changed.
pub(crate) struct RemotePlan {
    mids: Vec<SmolStr>,
    sections: Vec<RemoteSectionPlan>,
    media: NegotiatedState,
    ice: RemoteIceDetails,
}

/// RemoteUndo is the state from before the first remote description of a
/// negotiation round that has not been answered yet.
pub(crate) struct RemoteUndo {
    routes: RemoteRoutes,
    media: NegotiatedState,
    ice_parameters: Option<RTCIceParameters>,
    candidates: Vec<RTCIceCandidate>,
    /// transceivers that got their mid in this round
    assigned_mids: Vec<Arc<RTCRtpTransceiver>>,
}

impl PeerConnectionInternal {
    pub(super) fn new(api: &API) -> Arc<Self> {
        let setting_engine = Arc::clone(&api.setting_engine);
        let media = Arc::new(NegotiatedMedia::new(Arc::clone(&api.media_engine)));

        let candidates = &setting_engine.candidates;
        let ice_parameters = RTCIceParameters {
            username_fragment: if candidates.username_fragment.is_empty() {
                generate_ufrag()
            } else {
                candidates.username_fragment.clone()
            },
            password: if candidates.password.is_empty() {
                generate_pwd()
            } else {
                candidates.password.clone()
            },
            ice_lite: candidates.ice_lite,
        };

        let (ice_connection_state, _) = watch::channel(RTCIceConnectionState::New);
        let router = Router::new(RouterConfig::from(&*setting_engine), Arc::clone(&media));

        Arc::new(PeerConnectionInternal {
            greater_mid: AtomicIsize::new(-1),
            sdp_origin: Mutex::new(Default::default()),
            last_offer: Mutex::new(String::new()),
            last_answer: Mutex::new(String::new()),

            is_closed: AtomicBool::new(false),
            ops: Arc::new(Operations::new()),
            signaling_state: AtomicU8::new(RTCSignalingState::Stable as u8),
            negotiation: Mutex::new(()),

            ice_connection_state,
            ice_parameters,
            local_candidates: Mutex::new(vec![]),
            gathering_complete: AtomicBool::new(false),
            remote_ice_parameters: Mutex::new(None),
            remote_candidates: Mutex::new(vec![]),
            remote_undo: Mutex::new(None),

            current_local_description: Mutex::new(None),
            current_remote_description: Mutex::new(None),
            pending_local_description: Mutex::new(None),
            pending_remote_description: Mutex::new(None),

            rtp_transceivers: Mutex::new(vec![]),

            on_track_handler: Arc::new(ArcSwapOption::empty()),
            on_signaling_state_change_handler: ArcSwapOption::empty(),
            on_ice_connection_state_change_handler: ArcSwapOption::empty(),
            handler_gate: Arc::new(RwLock::new(())),

            setting_engine,
            media,
            rtp_writer: api.rtp_writer.clone(),
            router,
        })
    }

    pub(super) async fn remote_description(&self) -> Option<RTCSessionDescription> {
        let pending_remote_description = self.pending_remote_description.lock().await;
        if pending_remote_description.is_some() {
            return pending_remote_description.clone();
        }
        drop(pending_remote_description);

        let current_remote_description = self.current_remote_description.lock().await;
        current_remote_description.clone()
    }

    /// commit_description moves the description into the pending/current
    /// slots the way a successful apply of its type does.
    pub(super) async fn commit_description(&self, desc: &RTCSessionDescription, op: StateChangeOp) {
        let mut current_local = self.current_local_description.lock().await;
        let mut current_remote = self.current_remote_description.lock().await;
        let mut pending_local = self.pending_local_description.lock().await;
        let mut pending_remote = self.pending_remote_description.lock().await;

        match (op, desc.sdp_type) {
            (StateChangeOp::SetLocal, RTCSdpType::Offer | RTCSdpType::Pranswer) => {
                *pending_local = Some(desc.clone());
            }
            (StateChangeOp::SetLocal, RTCSdpType::Answer) => {
                *current_local = Some(desc.clone());
                *current_remote = pending_remote.take();
                *pending_local = None;
            }
            (StateChangeOp::SetLocal, RTCSdpType::Rollback) => {
                *pending_local = None;
            }
            (StateChangeOp::SetRemote, RTCSdpType::Offer | RTCSdpType::Pranswer) => {
                *pending_remote = Some(desc.clone());
            }
            (StateChangeOp::SetRemote, RTCSdpType::Answer) => {
                *current_remote = Some(desc.clone());
                *current_local = pending_local.take();
                *pending_remote = None;
            }
            (StateChangeOp::SetRemote, RTCSdpType::Rollback) => {
                *pending_remote = None;
            }
            (_, RTCSdpType::Unspecified) => {}
        }
    }

    pub(super) fn new_receiver(&self, kind: RTPCodecType) -> Arc<RTCRtpReceiver> {
        Arc::new(RTCRtpReceiver::new(
            kind,
            self.setting_engine.get_receive_mtu(),
            self.setting_engine.get_queue_capacity(),
            Arc::clone(&self.media),
        ))
    }

    pub(super) fn new_sender(
        &self,
        kind: RTPCodecType,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
        rids: &[SmolStr],
    ) -> Arc<RTCRtpSender> {
        Arc::new(RTCRtpSender::new(
            kind,
            track,
            rids,
            Arc::clone(&self.media),
            self.rtp_writer.clone(),
            self.setting_engine.get_queue_capacity(),
        ))
    }

    /// new_transceiver creates a transceiver and appends it to the list.
    pub(super) async fn new_transceiver(
        &self,
        receiver: Arc<RTCRtpReceiver>,
        sender: Option<Arc<RTCRtpSender>>,
        direction: RTCRtpTransceiverDirection,
        kind: RTPCodecType,
    ) -> Arc<RTCRtpTransceiver> {
        let t = RTCRtpTransceiver::new(
            receiver,
            sender,
            direction,
            kind,
            vec![],
            Arc::clone(&self.media),
        );

        let mut rtp_transceivers = self.rtp_transceivers.lock().await;
        rtp_transceivers.push(Arc::clone(&t));
        log::trace!(
            "transceiver {} created: {kind} {direction}",
            rtp_transceivers.len() - 1
        );
        t
    }

    pub(super) async fn new_transceiver_from_track(
        &self,
        direction: RTCRtpTransceiverDirection,
        track: Arc<dyn TrackLocal + Send + Sync>,
        rids: &[SmolStr],
    ) -> Result<(Arc<RTCRtpTransceiver>, Arc<RTCRtpSender>)> {
        let kind = track.kind();
        if kind == RTPCodecType::Unspecified {
            return Err(Error::ErrRTPTransceiverCodecUnsupported);
        }

        let receiver = self.new_receiver(kind);
        let sender = self.new_sender(kind, Some(track), rids);
        let t = self
            .new_transceiver(receiver, Some(Arc::clone(&sender)), direction, kind)
            .await;
        Ok((t, sender))
    }

    pub(super) async fn get_senders(&self) -> Vec<Arc<RTCRtpSender>> {
        let mut senders = vec![];
        let rtp_transceivers = self.rtp_transceivers.lock().await;
        for transceiver in &*rtp_transceivers {
            if let Some(sender) = transceiver.sender().await {
                senders.push(sender);
            }
        }
        senders
    }

    fn populate_params(&self, match_bundle_group: Option<String>) -> PopulateSdpParams {
        PopulateSdpParams {
            is_icelite: self.ice_parameters.ice_lite,
            end_of_candidates: self.gathering_complete.load(Ordering::SeqCst),
            match_bundle_group,
        }
    }

    /// generate_unmatched_sdp generates an offer with one media section per
    /// transceiver, in creation order.
    pub(super) async fn generate_unmatched_sdp(
        &self,
        local_transceivers: Vec<Arc<RTCRtpTransceiver>>,
    ) -> Result<SessionDescription> {
        let d = SessionDescription::new_jsep_session_description(false);

        let media_sections: Vec<MediaSection> = local_transceivers
            .into_iter()
            .filter_map(|t| {
                t.mid().map(|mid| MediaSection {
                    id: mid.to_string(),
                    transceiver: t,
                    rid_map: vec![],
                    offered_direction: None,
                })
            })
            .collect();

        let candidates = self.local_candidates.lock().await.clone();
        let params = self.populate_params(None);
        populate_sdp(
            d,
            &self.media,
            &candidates,
            &self.ice_parameters,
            &media_sections,
            params,
        )
        .await
    }

    /// generate_matched_sdp generates a description that follows the media
    /// sections of the remote description. For an offer the transceivers the
    /// remote description does not know yet are appended; for an answer every
    /// section carries the direction the remote offered so it can be
    /// answered.
    pub(super) async fn generate_matched_sdp(
        &self,
        mut local_transceivers: Vec<Arc<RTCRtpTransceiver>>,
        include_unmatched: bool,
    ) -> Result<SessionDescription> {
        let d = SessionDescription::new_jsep_session_description(false);

        let remote_description = self
            .remote_description()
            .await
            .ok_or(Error::ErrNoRemoteDescription)?;
        let parsed = remote_description.parsed()?;
        let mids = section_mids(&parsed)?;

        let mut media_sections = vec![];
        for (media, mid) in parsed.media_descriptions.iter().zip(mids.iter()) {
            let kind = RTPCodecType::from(media.media_name.media.as_str());
            if kind == RTPCodecType::Unspecified {
                continue;
            }

            let t = find_by_mid(mid, &mut local_transceivers)
                .ok_or(Error::ErrPeerConnTransceiverMidNil)?;
            let offered_direction = if include_unmatched {
                None
            } else {
                Some(remote_direction(media))
            };
            media_sections.push(MediaSection {
                id: mid.to_string(),
                transceiver: t,
                rid_map: get_rids(media),
                offered_direction,
            });
        }

        let match_bundle_group = if include_unmatched {
            for t in local_transceivers {
                if let Some(mid) = t.mid() {
                    media_sections.push(MediaSection {
                        id: mid.to_string(),
                        transceiver: t,
                        rid_map: vec![],
                        offered_direction: None,
                    });
                }
            }
            None
        } else {
            parsed.attribute(ATTR_KEY_GROUP).cloned()
        };

        let candidates = self.local_candidates.lock().await.clone();
        let params = self.populate_params(match_bundle_group);
        populate_sdp(
            d,
            &self.media,
            &candidates,
            &self.ice_parameters,
            &media_sections,
            params,
        )
        .await
    }

    /// apply_local_answer records, per transceiver, the direction our
    /// answer negotiated.
    pub(super) async fn apply_local_answer(&self, parsed: &SessionDescription) {
        let rtp_transceivers = self.rtp_transceivers.lock().await;
        for media in &parsed.media_descriptions {
            let mid = match get_mid_value(media) {
                Some(mid) => mid,
                None => continue,
            };
            if let Some(t) = rtp_transceivers
                .iter()
                .find(|t| t.mid().as_deref() == Some(mid.as_str()))
            {
                let negotiated = if is_rejected(media) {
                    RTCRtpTransceiverDirection::Inactive
                } else {
                    get_peer_direction(media)
                };
                t.set_current_direction(negotiated);
            }
        }
    }

    /// plan_remote_description validates a remote description and matches
    /// its media sections against the local transceivers without changing
    /// either.
    pub(super) async fn plan_remote_description(
        &self,
        parsed: &SessionDescription,
        sdp_type: RTCSdpType,
    ) -> Result<RemotePlan> {
        let mids = section_mids(parsed)?;
        let legacy = !has_mid(parsed);
        let answers_our_offer = matches!(sdp_type, RTCSdpType::Answer | RTCSdpType::Pranswer);

        for (media, mid) in parsed.media_descriptions.iter().zip(mids.iter()) {
            codecs_from_media_description(media)
                .map_err(|err| Error::ErrInvalidDescription(format!("mid {mid}: {err}")))?;

            let kind = RTPCodecType::from(media.media_name.media.as_str());
            if kind == RTPCodecType::Unspecified || is_rejected(media) {
                continue;
            }
            if remote_direction(media).has_send() && !self.media.has_usable_codec(media)? {
                return Err(Error::ErrNoUsableCodecs(mid.to_string()));
            }
        }

        let media = self.media.plan_remote_description(parsed)?;
        let ice = extract_ice_details(parsed)?;

        let mut local_transceivers = {
            let rtp_transceivers = self.rtp_transceivers.lock().await;
            rtp_transceivers.clone()
        };

        let mut sections = vec![];
        for (index, (m, mid)) in parsed
            .media_descriptions
            .iter()
            .zip(mids.iter())
            .enumerate()
        {
            let kind = RTPCodecType::from(m.media_name.media.as_str());
            if kind == RTPCodecType::Unspecified {
                log::debug!("skipping remote section {mid} of unknown kind");
                continue;
            }
            let direction = remote_direction(m);

            let transceiver = if let Some(t) = find_by_mid(mid, &mut local_transceivers) {
                Some(t)
            } else if answers_our_offer {
                return Err(Error::ErrInvalidDescription(format!(
                    "answer carries mid {mid} that was never offered"
                )));
            } else if legacy {
                find_by_payload_type(&payload_types(m), kind, &mut local_transceivers).await
            } else {
                satisfy_type_and_direction(kind, direction, &mut local_transceivers)
            };

            if let Some(t) = &transceiver {
                if t.kind() != kind {
                    return Err(Error::ErrInvalidDescription(format!(
                        "mid {mid} is {kind} but the transceiver is {}",
                        t.kind()
                    )));
                }
            }

            sections.push(RemoteSectionPlan {
                index,
                mid: mid.clone(),
                kind,
                direction,
                rejected: is_rejected(m),
                transceiver,
            });
        }

        Ok(RemotePlan {
            mids,
            sections,
            media,
            ice,
        })
    }

    /// apply_remote_description commits a validated plan: transceivers are
    /// bound or created, receivers of vanished tracks replaced, the router
    /// learns the new sections and SSRCs.
    pub(super) async fn apply_remote_description(
        &self,
        parsed: &SessionDescription,
        sdp_type: RTCSdpType,
        plan: RemotePlan,
    ) -> Result<()> {
        let mut undo = self.remote_undo.lock().await;
        if sdp_type == RTCSdpType::Answer {
            *undo = None;
        } else if undo.is_none() {
            *undo = Some(RemoteUndo {
                routes: self.router.remote_routes(),
                media: self.media.snapshot(),
                ice_parameters: self.remote_ice_parameters.lock().await.clone(),
                candidates: self.remote_candidates.lock().await.clone(),
                assigned_mids: vec![],
            });
        }

        let mut router_sections: Vec<Option<RemoteSection>> =
            vec![None; parsed.media_descriptions.len()];

        for section in plan.sections {
            let media = &parsed.media_descriptions[section.index];

            let t = match section.transceiver {
                Some(t) => t,
                None => {
                    // the remote added a track we do not have yet
                    let local_direction = if section.direction.has_send() {
                        RTCRtpTransceiverDirection::Recvonly
                    } else {
                        RTCRtpTransceiverDirection::Inactive
                    };
                    let receiver = self.new_receiver(section.kind);
                    let t = self
                        .new_transceiver(receiver, None, local_direction, section.kind)
                        .await;
                    log::debug!(
                        "created {} transceiver for remote section {}",
                        section.kind,
                        section.mid
                    );
                    t
                }
            };
            let fresh_mid = t.mid().is_none();
            t.set_mid(section.mid.clone())?;
            if fresh_mid {
                if let Some(undo) = undo.as_mut() {
                    undo.assigned_mids.push(Arc::clone(&t));
                }
            }

            if sdp_type == RTCSdpType::Answer {
                let negotiated = if section.rejected {
                    RTCRtpTransceiverDirection::Inactive
                } else {
                    section.direction.reverse()
                };
                t.set_current_direction(negotiated);
            }

            if t.is_stopped() {
                continue;
            }

            let remote_sends = !section.rejected && section.direction.has_send();
            let receiver = self.refresh_receiver(&t, media, remote_sends).await;
            if remote_sends {
                let rids = get_rids(media)
                    .into_iter()
                    .filter(|r| r.direction == SimulcastDirection::Send)
                    .map(|r| SmolStr::from(r.id))
                    .collect();
                router_sections[section.index] = Some(RemoteSection {
                    mid: section.mid,
                    rids,
                    transceiver: t,
                    receiver,
                });
            }
        }

        let mut declared: Vec<(SSRC, DeclaredStream)> = vec![];
        for details in track_details_from_sdp(parsed, &plan.mids, true) {
            let section = match plan.mids.iter().position(|m| *m == details.mid) {
                Some(section) if router_sections[section].is_some() => section,
                _ => continue,
            };
            for ssrc in &details.ssrcs {
                declared.push((
                    *ssrc,
                    DeclaredStream {
                        section,
                        stream_id: details.stream_id.clone(),
                        track_id: details.id.clone(),
                        repair_of: None,
                    },
                ));
            }
            if let (Some(repair), Some(base)) = (details.repair_ssrc, details.ssrcs.first()) {
                declared.push((
                    repair,
                    DeclaredStream {
                        section,
                        stream_id: details.stream_id.clone(),
                        track_id: details.id.clone(),
                        repair_of: Some(*base),
                    },
                ));
            }
        }

        self.media.commit(plan.media);
        self.router.set_remote(parsed.clone(), router_sections, declared);

        {
            let mut remote_ice_parameters = self.remote_ice_parameters.lock().await;
            *remote_ice_parameters = Some(plan.ice.parameters());
        }
        {
            let mut remote_candidates = self.remote_candidates.lock().await;
            for c in plan.ice.candidates {
                if !remote_candidates.contains(&c) {
                    remote_candidates.push(c);
                }
            }
        }

        Ok(())
    }

    /// rollback_remote undoes the remote descriptions applied since the
    /// last completed negotiation. Transceivers created for them stay in the
    /// list without a mid. Tracks bound to them are dropped.
    pub(super) async fn rollback_remote(&self) {
        let undo = match self.remote_undo.lock().await.take() {
            Some(undo) => undo,
            None => return,
        };

        for t in &undo.assigned_mids {
            t.clear_mid();
            let receiver = t.receiver().await;
            if receiver.tracks().is_empty() {
                continue;
            }
            if let Err(err) = receiver.stop() {
                log::warn!("failed to stop receiver released by rollback: {err}");
            }
            t.set_receiver(self.new_receiver(t.kind())).await;
        }

        let mut routes = undo.routes;
        for section in routes.sections.iter_mut().flatten() {
            section.receiver = section.transceiver.receiver().await;
        }
        self.router.restore_remote(routes);
        self.media.commit(undo.media);
        {
            let mut remote_ice_parameters = self.remote_ice_parameters.lock().await;
            *remote_ice_parameters = undo.ice_parameters;
        }
        {
            let mut remote_candidates = self.remote_candidates.lock().await;
            *remote_candidates = undo.candidates;
        }
        log::debug!(
            "rolled back remote description, {} mids released",
            undo.assigned_mids.len()
        );
    }

    /// refresh_receiver replaces the receiver of a transceiver whose remote
    /// tracks went away: the section stopped sending, or it now declares
    /// SSRCs none of which the bound tracks carry.
    async fn refresh_receiver(
        &self,
        t: &Arc<RTCRtpTransceiver>,
        media: &::sdp::description::media::MediaDescription,
        remote_sends: bool,
    ) -> Arc<RTCRtpReceiver> {
        let receiver = t.receiver().await;
        let tracks = receiver.tracks();
        if tracks.is_empty() {
            return receiver;
        }

        let vanished = if !remote_sends {
            true
        } else if has_explicit_ssrc(media) {
            let declared: Vec<SSRC> = media
                .attributes
                .iter()
                .filter(|a| a.key == "ssrc")
                .filter_map(|a| a.value.as_deref())
                .filter_map(|v| v.split_whitespace().next())
                .filter_map(|s| s.parse::<SSRC>().ok())
                .collect();
            !tracks.iter().any(|track| declared.contains(&track.ssrc()))
        } else {
            false
        };
        if !vanished {
            return receiver;
        }

        if let Err(err) = receiver.stop() {
            log::warn!("failed to stop receiver of mid {:?}: {err}", t.mid());
        }
        let replacement = self.new_receiver(t.kind());
        t.set_receiver(Arc::clone(&replacement)).await;
        log::debug!("replaced receiver of mid {:?}, remote track went away", t.mid());
        replacement
    }

    /// start_senders_when_connected queues the sender start step of a
    /// completed negotiation. It runs once ICE is connected.
    pub(super) async fn start_senders_when_connected(self: &Arc<Self>) -> Result<()> {
        let pci = Arc::clone(self);
        self.ops
            .enqueue(Operation::new(
                move || {
                    let pc = Arc::clone(&pci);
                    Box::pin(async move {
                        if pc.wait_for_ice_connected().await {
                            pc.start_negotiated_senders().await;
                        }
                        false
                    })
                },
                "start negotiated senders",
            ))
            .await
    }

    async fn wait_for_ice_connected(&self) -> bool {
        let mut state = self.ice_connection_state.subscribe();
        loop {
            let current = *state.borrow_and_update();
            if current.is_established() {
                return true;
            }
            if current == RTCIceConnectionState::Closed || self.is_closed.load(Ordering::SeqCst) {
                return false;
            }
            if state.changed().await.is_err() {
                return false;
            }
        }
    }

    /// start_negotiated_senders starts every sender whose section negotiated
    /// a sending direction and stops the sending of the others. Senders that
    /// already started, or were stopped, are left alone.
    async fn start_negotiated_senders(&self) {
        let current_transceivers = {
            let rtp_transceivers = self.rtp_transceivers.lock().await;
            rtp_transceivers.clone()
        };

        for t in current_transceivers {
            if t.is_stopped() {
                continue;
            }
            let (sender, mid) = match (t.sender().await, t.mid()) {
                (Some(sender), Some(mid)) => (sender, mid),
                _ => continue,
            };

            if t.current_direction().has_send() {
                match sender.start(&mid).await {
                    Ok(true) => log::debug!("sender {} started on mid {mid}", sender.id),
                    Ok(false) => {}
                    Err(err) => log::warn!("failed to start sender on mid {mid}: {err}"),
                }
            } else {
                match sender.stop_sending().await {
                    Ok(true) => log::debug!("sender {} paused on mid {mid}", sender.id),
                    Ok(false) => {}
                    Err(err) => log::warn!("failed to stop sender on mid {mid}: {err}"),
                }
            }
        }
    }

    pub(super) async fn route_incoming_packet(&self, buf: &[u8]) -> Result<()> {
        if self.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        if is_rtcp(buf) {
            let senders = self.get_senders().await;
            return self.router.route_rtcp(buf, &senders);
        }

        let events = self.router.route_rtp(buf)?;
        if !events.is_empty() {
            self.do_track(events).await;
        }
        Ok(())
    }

    /// do_track hands new remote tracks to the on_track handler. Handlers
    /// run on their own task, holding a share of the handler gate so close
    /// can wait for them.
    async fn do_track(&self, events: Vec<TrackEvent>) {
        let gate = Arc::clone(&self.handler_gate).read_owned().await;
        if self.is_closed.load(Ordering::SeqCst) {
            return;
        }

        let on_track_handler = Arc::clone(&self.on_track_handler);
        tokio::spawn(IN_TRACK_HANDLER.scope(true, async move {
            let _gate = gate;
            for event in events {
                log::debug!(
                    "got new remote track: id={}, ssrc={}, rid={}",
                    event.track.id(),
                    event.track.ssrc(),
                    event.track.rid()
                );
                if let Some(handler) = on_track_handler.load_full() {
                    let mut f = handler.lock().await;
                    f(event.track, event.receiver, event.transceiver).await;
                } else {
                    log::warn!("on_track unset, unable to handle incoming media streams");
                }
            }
        }));
    }

    pub(super) async fn do_signaling_state_change(&self, new_state: RTCSignalingState) {
        log::info!("signaling state changed to {new_state}");
        if let Some(handler) = self.on_signaling_state_change_handler.load_full() {
            let mut f = handler.lock().await;
            f(new_state).await;
        }
    }
}

/// remote_direction is the direction a media section asks for; a section
/// without a direction attribute is sendrecv.
fn remote_direction(media: &::sdp::description::media::MediaDescription) -> RTCRtpTransceiverDirection {
    match get_peer_direction(media) {
        RTCRtpTransceiverDirection::Unspecified => RTCRtpTransceiverDirection::Sendrecv,
        direction => direction,
    }
}
