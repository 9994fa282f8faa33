#[cfg(test)]
mod router_test;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use interceptor::Attributes;
use portable_atomic::AtomicU64;
use sdp::description::session::SessionDescription;
use sdp::extmap::{SDES_MID_URI, SDES_RTP_STREAM_ID_URI};
use smol_str::SmolStr;
use util::sync::Mutex as SyncMutex;
use util::Unmarshal;

use crate::api::media_engine::NegotiatedMedia;
use crate::api::setting_engine::SettingEngine;
use crate::error::{Error, Result};
use crate::peer_connection::sdp::{
    find_media_section_by_payload_type, has_explicit_ssrc, is_undeclared_eligible,
};
use crate::rtp_transceiver::rtp_codec::RTCRtpHeaderExtensionCapability;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::{RTCPPackets, RTCRtpSender};
use crate::rtp_transceiver::{RTCRtpTransceiver, SSRC};
use crate::track::track_remote::TrackRemote;
use crate::SDES_REPAIR_RTP_STREAM_ID_URI;

/// is_rtcp demultiplexes RTP and RTCP sharing one transport: RTCP packet
/// types occupy 192..=223 in the second octet.
pub(crate) fn is_rtcp(buf: &[u8]) -> bool {
    buf.len() >= 2 && (192..=223).contains(&buf[1])
}

/// RemoteSection is what the router needs to know about one accepted media
/// section of the remote description.
#[derive(Clone)]
pub(crate) struct RemoteSection {
    pub(crate) mid: SmolStr,
    /// rids a stream of this section may be tagged with
    pub(crate) rids: Vec<SmolStr>,
    pub(crate) transceiver: Arc<RTCRtpTransceiver>,
    pub(crate) receiver: Arc<RTCRtpReceiver>,
}

/// DeclaredStream is an SSRC named by an a=ssrc line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DeclaredStream {
    /// index of the media section in the remote description
    pub(crate) section: usize,
    pub(crate) stream_id: String,
    pub(crate) track_id: String,
    /// set for the repair half of an FID group
    pub(crate) repair_of: Option<SSRC>,
}

/// TrackEvent announces a track bound for the first time.
#[derive(Clone)]
pub(crate) struct TrackEvent {
    pub(crate) track: Arc<TrackRemote>,
    pub(crate) receiver: Arc<RTCRtpReceiver>,
    pub(crate) transceiver: Arc<RTCRtpTransceiver>,
}

/// RouterStats counts packets the router could not hand to a reader.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RouterStats {
    /// datagrams that failed to parse as RTP or RTCP
    pub malformed: u64,
    /// packets with no section, track or sender to go to
    pub dropped_unroutable: u64,
    /// probes discarded after their packet budget or lifetime ran out
    pub probes_expired: u64,
    /// probes refused because of the probe limit, or that resolved to an
    /// unknown mid or rid
    pub probes_rejected: u64,
    /// buffered packets evicted because a reader fell behind
    pub queue_overflow: u64,
}

#[derive(Default)]
struct RouterCounters {
    malformed: AtomicU64,
    dropped_unroutable: AtomicU64,
    probes_expired: AtomicU64,
    probes_rejected: AtomicU64,
    queue_overflow: AtomicU64,
}

impl RouterCounters {
    fn snapshot(&self) -> RouterStats {
        RouterStats {
            malformed: self.malformed.load(Ordering::SeqCst),
            dropped_unroutable: self.dropped_unroutable.load(Ordering::SeqCst),
            probes_expired: self.probes_expired.load(Ordering::SeqCst),
            probes_rejected: self.probes_rejected.load(Ordering::SeqCst),
            queue_overflow: self.queue_overflow.load(Ordering::SeqCst),
        }
    }
}

/// RouterConfig bounds the work spent on SSRCs nobody declared.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct RouterConfig {
    /// media packets carrying mid and rid needed before a probe binds
    pub(crate) probe_threshold: usize,
    /// packets a probe may see before it is given up
    pub(crate) probe_budget: usize,
    pub(crate) probe_lifetime: Duration,
    /// probes alive at the same time
    pub(crate) max_probes: usize,
}

impl From<&SettingEngine> for RouterConfig {
    fn from(s: &SettingEngine) -> Self {
        RouterConfig {
            probe_threshold: s.get_probe_threshold(),
            probe_budget: s.get_probe_budget(),
            probe_lifetime: s.get_probe_lifetime(),
            max_probes: s.get_max_probes(),
        }
    }
}

#[derive(Debug, Default, Copy, Clone)]
struct ExtensionIds {
    mid: Option<u8>,
    rid: Option<u8>,
    rsid: Option<u8>,
}

/// The fields of a packet the router looks at, read before any lock is
/// taken.
struct Inbound {
    pkt: rtp::packet::Packet,
    mid: Option<SmolStr>,
    rid: Option<SmolStr>,
    rsid: Option<SmolStr>,
    is_rtx: bool,
}

impl Inbound {
    fn is_padding_only(&self) -> bool {
        self.pkt.payload.is_empty()
    }
}

struct Binding {
    track: Arc<TrackRemote>,
    receiver: Arc<RTCRtpReceiver>,
}

struct Probe {
    first_seen: Instant,
    packets_seen: usize,
    media_packets: usize,
    mid: Option<SmolStr>,
    rid: Option<SmolStr>,
    rsid: Option<SmolStr>,
    buffered: Vec<rtp::packet::Packet>,
}

impl Probe {
    fn new(now: Instant) -> Self {
        Probe {
            first_seen: now,
            packets_seen: 0,
            media_packets: 0,
            mid: None,
            rid: None,
            rsid: None,
            buffered: vec![],
        }
    }
}

enum SsrcState {
    Declared(DeclaredStream),
    Probing(Probe),
    Bound(Binding),
}

/// RemoteRoutes is what one applied remote description installed in the
/// router.
#[derive(Clone, Default)]
pub(crate) struct RemoteRoutes {
    pub(crate) description: Option<SessionDescription>,
    pub(crate) sections: Vec<Option<RemoteSection>>,
    pub(crate) declared: Vec<(SSRC, DeclaredStream)>,
}

#[derive(Default)]
struct RouterState {
    closed: bool,
    description: Option<SessionDescription>,
    /// indexed like the media sections of `description`; rejected or
    /// inactive sections are `None`
    sections: Vec<Option<RemoteSection>>,
    declared: Vec<(SSRC, DeclaredStream)>,
    streams: HashMap<SSRC, SsrcState>,
}

impl RouterState {
    fn section_by_mid(&self, mid: &str) -> Option<(usize, &RemoteSection)> {
        self.sections.iter().enumerate().find_map(|(i, s)| match s {
            Some(s) if s.mid == mid => Some((i, s)),
            _ => None,
        })
    }

    fn probes(&self) -> usize {
        self.streams
            .values()
            .filter(|s| matches!(s, SsrcState::Probing(_)))
            .count()
    }
}

/// Router hands every inbound RTP packet to the track its SSRC is bound to,
/// binding SSRCs on first sight, and every inbound RTCP packet to the
/// senders and receivers it is about.
///
/// All routing state lives behind one lock, so a remote description is
/// installed atomically with respect to packet routing.
pub(crate) struct Router {
    config: RouterConfig,
    media: Arc<NegotiatedMedia>,
    state: SyncMutex<RouterState>,
    counters: RouterCounters,
}

impl Router {
    pub(crate) fn new(config: RouterConfig, media: Arc<NegotiatedMedia>) -> Self {
        Router {
            config,
            media,
            state: SyncMutex::new(RouterState::default()),
            counters: RouterCounters::default(),
        }
    }

    pub(crate) fn stats(&self) -> RouterStats {
        self.counters.snapshot()
    }

    /// set_remote installs the sections and declared SSRCs of a newly applied
    /// remote description. Streams already bound to a receiver that is still
    /// in use stay bound. Probes in flight are kept.
    pub(crate) fn set_remote(
        &self,
        description: SessionDescription,
        sections: Vec<Option<RemoteSection>>,
        declared: Vec<(SSRC, DeclaredStream)>,
    ) {
        self.restore_remote(RemoteRoutes {
            description: Some(description),
            sections,
            declared,
        });
    }

    /// remote_routes returns what the last set_remote installed.
    pub(crate) fn remote_routes(&self) -> RemoteRoutes {
        let state = self.state.lock();
        RemoteRoutes {
            description: state.description.clone(),
            sections: state.sections.clone(),
            declared: state.declared.clone(),
        }
    }

    /// restore_remote puts back routes taken earlier with remote_routes.
    /// Bindings to receivers the restored sections no longer use are
    /// dropped, like on set_remote.
    pub(crate) fn restore_remote(&self, routes: RemoteRoutes) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }

        let RemoteRoutes {
            description,
            sections,
            declared,
        } = routes;
        let in_use = |receiver: &Arc<RTCRtpReceiver>| {
            sections
                .iter()
                .flatten()
                .any(|s| Arc::ptr_eq(&s.receiver, receiver))
        };
        state.streams.retain(|_, s| match s {
            SsrcState::Declared(_) => false,
            SsrcState::Probing(_) => true,
            SsrcState::Bound(b) => in_use(&b.receiver),
        });
        for (ssrc, stream) in &declared {
            state
                .streams
                .entry(*ssrc)
                .or_insert_with(|| SsrcState::Declared(stream.clone()));
        }

        state.description = description;
        state.sections = sections;
        state.declared = declared;
    }

    /// route_rtp routes one RTP packet. Packets that cannot be routed are
    /// counted and dropped; the only error is a closed router. Returns the
    /// tracks that were bound by this packet.
    pub(crate) fn route_rtp(&self, buf: &[u8]) -> Result<Vec<TrackEvent>> {
        let pkt = match rtp::packet::Packet::unmarshal(&mut &buf[..]) {
            Ok(pkt) => pkt,
            Err(err) => {
                self.check_closed()?;
                self.counters.malformed.fetch_add(1, Ordering::SeqCst);
                log::debug!("router: dropping malformed RTP: {err}");
                return Ok(vec![]);
            }
        };
        let inbound = self.inspect(pkt);

        let mut events = vec![];
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::ErrConnectionClosed);
        }

        let now = Instant::now();
        self.expire_probes(&mut state, now);

        let ssrc = inbound.pkt.header.ssrc;
        let next = match state.streams.remove(&ssrc) {
            Some(SsrcState::Bound(binding)) => {
                self.deliver(&binding.track, inbound.pkt);
                Some(SsrcState::Bound(binding))
            }
            Some(SsrcState::Declared(declared)) => {
                self.bind_declared(&state, ssrc, declared, inbound, &mut events)
            }
            Some(SsrcState::Probing(probe)) => {
                self.advance_probe(&state, ssrc, probe, inbound, &mut events)
            }
            None => self.route_unknown(&state, ssrc, inbound, now, &mut events),
        };
        if let Some(next) = next {
            state.streams.insert(ssrc, next);
        }

        Ok(events)
    }

    /// route_rtcp hands a compound RTCP packet to every sender or receiver
    /// owning one of its destination SSRCs.
    pub(crate) fn route_rtcp(&self, buf: &[u8], senders: &[Arc<RTCRtpSender>]) -> Result<()> {
        let pkts = match rtcp::packet::unmarshal(&mut &buf[..]) {
            Ok(pkts) => pkts,
            Err(err) => {
                self.check_closed()?;
                self.counters.malformed.fetch_add(1, Ordering::SeqCst);
                log::debug!("router: dropping malformed RTCP: {err}");
                return Ok(());
            }
        };

        let mut to_senders: Vec<Arc<RTCRtpSender>> = vec![];
        let mut to_receivers: Vec<Arc<RTCRtpReceiver>> = vec![];
        {
            let state = self.state.lock();
            if state.closed {
                return Err(Error::ErrConnectionClosed);
            }

            for ssrc in pkts.iter().flat_map(|p| p.destination_ssrc()) {
                if let Some(sender) = senders.iter().find(|s| s.has_ssrc(ssrc)) {
                    if !to_senders.iter().any(|s| Arc::ptr_eq(s, sender)) {
                        to_senders.push(Arc::clone(sender));
                    }
                } else if let Some(SsrcState::Bound(b)) = state.streams.get(&ssrc) {
                    if !to_receivers.iter().any(|r| Arc::ptr_eq(r, &b.receiver)) {
                        to_receivers.push(Arc::clone(&b.receiver));
                    }
                }
            }
        }

        if to_senders.is_empty() && to_receivers.is_empty() {
            self.counters
                .dropped_unroutable
                .fetch_add(1, Ordering::SeqCst);
            log::debug!("router: {}", Error::ErrRTCPNoDestination);
            return Ok(());
        }

        let batch = || -> RTCPPackets { pkts.iter().map(|p| p.cloned()).collect() };
        for sender in to_senders {
            if sender.deliver_rtcp(batch()) {
                self.counters.queue_overflow.fetch_add(1, Ordering::SeqCst);
            }
        }
        for receiver in to_receivers {
            if receiver.deliver_rtcp(batch()) {
                self.counters.queue_overflow.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(())
    }

    /// close drops every binding and probe. Later packets fail with
    /// `ErrConnectionClosed`.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.streams.clear();
        state.sections.clear();
        state.declared.clear();
        state.description = None;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// pending_probes is the number of unresolved undeclared SSRCs.
    pub(crate) fn pending_probes(&self) -> usize {
        self.state.lock().probes()
    }

    fn check_closed(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn extension_ids(&self) -> ExtensionIds {
        let id_of = |uri: &str| {
            let (id, audio, video) =
                self.media
                    .get_header_extension_id(RTCRtpHeaderExtensionCapability {
                        uri: uri.to_owned(),
                    });
            if (audio || video) && id > 0 {
                u8::try_from(id).ok()
            } else {
                None
            }
        };

        ExtensionIds {
            mid: id_of(SDES_MID_URI),
            rid: id_of(SDES_RTP_STREAM_ID_URI),
            rsid: id_of(SDES_REPAIR_RTP_STREAM_ID_URI),
        }
    }

    fn inspect(&self, pkt: rtp::packet::Packet) -> Inbound {
        let ids = self.extension_ids();
        let read = |id: Option<u8>| {
            id.and_then(|id| pkt.header.get_extension(id))
                .and_then(|value: Bytes| {
                    std::str::from_utf8(&value)
                        .ok()
                        .filter(|s| !s.is_empty())
                        .map(SmolStr::from)
                })
        };
        let mid = read(ids.mid);
        let rid = read(ids.rid);
        let rsid = read(ids.rsid);
        let is_rtx = self
            .media
            .get_codec_by_payload(pkt.header.payload_type)
            .map(|(codec, _)| codec.capability.is_rtx())
            .unwrap_or(false);

        Inbound {
            pkt,
            mid,
            rid,
            rsid,
            is_rtx,
        }
    }

    fn deliver(&self, track: &TrackRemote, pkt: rtp::packet::Packet) {
        if track.deliver(pkt, Attributes::new()) {
            self.counters.queue_overflow.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn drop_unroutable(&self, ssrc: SSRC, reason: &Error) {
        self.counters
            .dropped_unroutable
            .fetch_add(1, Ordering::SeqCst);
        log::debug!("router: dropping packet for ssrc {ssrc}: {reason}");
    }

    fn expire_probes(&self, state: &mut RouterState, now: Instant) {
        let lifetime = self.config.probe_lifetime;
        let before = state.streams.len();
        state.streams.retain(|ssrc, s| match s {
            SsrcState::Probing(p) if now.duration_since(p.first_seen) > lifetime => {
                log::debug!("router: probe for ssrc {ssrc} timed out");
                false
            }
            _ => true,
        });
        let expired = (before - state.streams.len()) as u64;
        if expired > 0 {
            self.counters
                .probes_expired
                .fetch_add(expired, Ordering::SeqCst);
        }
    }

    fn bind_declared(
        &self,
        state: &RouterState,
        ssrc: SSRC,
        declared: DeclaredStream,
        inbound: Inbound,
        events: &mut Vec<TrackEvent>,
    ) -> Option<SsrcState> {
        let section = match state.sections.get(declared.section) {
            Some(Some(section)) => section,
            _ => {
                self.drop_unroutable(ssrc, &Error::ErrPeerConnNoMediaSectionForPayloadType);
                return Some(SsrcState::Declared(declared));
            }
        };

        if let Some(base) = declared.repair_of {
            return match state.streams.get(&base) {
                Some(SsrcState::Bound(b)) => {
                    b.track.set_rtx_ssrc(ssrc);
                    self.deliver(&b.track, inbound.pkt);
                    Some(SsrcState::Bound(Binding {
                        track: Arc::clone(&b.track),
                        receiver: Arc::clone(&b.receiver),
                    }))
                }
                _ => {
                    // nothing to repair yet
                    self.drop_unroutable(ssrc, &Error::ErrPeerConnSimulcastIncomingSSRCFailed);
                    Some(SsrcState::Declared(declared))
                }
            };
        }

        match section.receiver.add_track(ssrc, SmolStr::default()) {
            Ok(track) => {
                track.set_id(declared.track_id.clone());
                track.set_stream_id(declared.stream_id.clone());
                self.deliver(&track, inbound.pkt);
                events.push(TrackEvent {
                    track: Arc::clone(&track),
                    receiver: Arc::clone(&section.receiver),
                    transceiver: Arc::clone(&section.transceiver),
                });
                Some(SsrcState::Bound(Binding {
                    track,
                    receiver: Arc::clone(&section.receiver),
                }))
            }
            Err(err) => {
                self.drop_unroutable(ssrc, &err);
                Some(SsrcState::Declared(declared))
            }
        }
    }

    fn route_unknown(
        &self,
        state: &RouterState,
        ssrc: SSRC,
        inbound: Inbound,
        now: Instant,
        events: &mut Vec<TrackEvent>,
    ) -> Option<SsrcState> {
        let description = match &state.description {
            Some(d) => d,
            None => {
                self.drop_unroutable(ssrc, &Error::ErrPeerConnRemoteDescriptionNil);
                return None;
            }
        };

        // a repair stream for a layer that is already flowing needs no probe
        if let (Some(mid), Some(rsid)) = (&inbound.mid, &inbound.rsid) {
            if let Some((_, section)) = state.section_by_mid(mid) {
                if let Some(track) = section.receiver.track_by_rid(rsid) {
                    return Some(self.bind_repair(track, section, ssrc, vec![inbound.pkt]));
                }
            }
        }

        let index = match &inbound.mid {
            Some(mid) => state.section_by_mid(mid).map(|(i, _)| i),
            None => find_media_section_by_payload_type(description, inbound.pkt.header.payload_type)
                .ok(),
        };
        let (index, section) = match index.and_then(|i| state.sections.get(i)?.as_ref().map(|s| (i, s))) {
            Some(found) => found,
            None => {
                self.drop_unroutable(ssrc, &Error::ErrPeerConnNoMediaSectionForPayloadType);
                return None;
            }
        };

        if is_undeclared_eligible(description, index) {
            return self.bind_undeclared(section, ssrc, inbound, events);
        }

        let explicit_ssrc = description
            .media_descriptions
            .get(index)
            .map(has_explicit_ssrc)
            .unwrap_or(false);
        if explicit_ssrc && section.rids.is_empty() {
            self.drop_unroutable(ssrc, &Error::ErrPeerConnSingleMediaSectionHasExplicitSSRC);
            return None;
        }

        if inbound.mid.is_none() {
            self.drop_unroutable(ssrc, &Error::ErrPeerConnSimulcastMidRTPExtensionRequired);
            return None;
        }
        if state.probes() >= self.config.max_probes {
            self.counters.probes_rejected.fetch_add(1, Ordering::SeqCst);
            log::debug!("router: ssrc {ssrc}: {}", Error::ErrSimulcastProbeOverflow);
            return None;
        }

        self.advance_probe(state, ssrc, Probe::new(now), inbound, events)
    }

    fn bind_undeclared(
        &self,
        section: &RemoteSection,
        ssrc: SSRC,
        inbound: Inbound,
        events: &mut Vec<TrackEvent>,
    ) -> Option<SsrcState> {
        if inbound.is_rtx {
            return match section.receiver.track() {
                Some(track) if track.rtx_ssrc().is_none() => {
                    Some(self.bind_repair(track, section, ssrc, vec![inbound.pkt]))
                }
                _ => {
                    self.drop_unroutable(ssrc, &Error::ErrPeerConnSimulcastIncomingSSRCFailed);
                    None
                }
            };
        }

        if section.receiver.have_received() {
            self.drop_unroutable(ssrc, &Error::ErrPeerConnUndeclaredSectionBound);
            return None;
        }

        match section.receiver.add_track(ssrc, SmolStr::default()) {
            Ok(track) => {
                self.deliver(&track, inbound.pkt);
                events.push(TrackEvent {
                    track: Arc::clone(&track),
                    receiver: Arc::clone(&section.receiver),
                    transceiver: Arc::clone(&section.transceiver),
                });
                Some(SsrcState::Bound(Binding {
                    track,
                    receiver: Arc::clone(&section.receiver),
                }))
            }
            Err(err) => {
                self.drop_unroutable(ssrc, &err);
                None
            }
        }
    }

    fn bind_repair(
        &self,
        track: Arc<TrackRemote>,
        section: &RemoteSection,
        ssrc: SSRC,
        pkts: Vec<rtp::packet::Packet>,
    ) -> SsrcState {
        track.set_rtx_ssrc(ssrc);
        for pkt in pkts {
            self.deliver(&track, pkt);
        }
        SsrcState::Bound(Binding {
            track,
            receiver: Arc::clone(&section.receiver),
        })
    }

    fn advance_probe(
        &self,
        state: &RouterState,
        ssrc: SSRC,
        mut probe: Probe,
        inbound: Inbound,
        events: &mut Vec<TrackEvent>,
    ) -> Option<SsrcState> {
        probe.packets_seen += 1;
        if inbound.mid.is_some() {
            probe.mid.clone_from(&inbound.mid);
        }
        if inbound.rid.is_some() {
            probe.rid.clone_from(&inbound.rid);
        }
        if inbound.rsid.is_some() {
            probe.rsid.clone_from(&inbound.rsid);
        }
        let counts = !inbound.is_padding_only()
            && probe.mid.is_some()
            && (probe.rid.is_some() || probe.rsid.is_some());
        if counts {
            probe.media_packets += 1;
        }
        probe.buffered.push(inbound.pkt);

        if probe.media_packets < self.config.probe_threshold {
            if probe.packets_seen >= self.config.probe_budget {
                self.counters.probes_expired.fetch_add(1, Ordering::SeqCst);
                log::debug!(
                    "router: probe for ssrc {ssrc} gave up after {} packets: {}",
                    probe.packets_seen,
                    Error::ErrPeerConnSimulcastIncomingSSRCFailed
                );
                return None;
            }
            return Some(SsrcState::Probing(probe));
        }

        let section = match probe.mid.as_deref().and_then(|mid| state.section_by_mid(mid)) {
            Some((_, section)) => section,
            None => return self.reject_probe(ssrc, "unknown mid"),
        };

        if let Some(rsid) = &probe.rsid {
            return match section.receiver.track_by_rid(rsid) {
                Some(track) => Some(self.bind_repair(track, section, ssrc, probe.buffered)),
                // the layer it repairs is not bound yet
                None if probe.packets_seen < self.config.probe_budget => {
                    Some(SsrcState::Probing(probe))
                }
                None => self.reject_probe(ssrc, "repaired rid never appeared"),
            };
        }

        let rid = match &probe.rid {
            Some(rid) if section.rids.contains(rid) => rid.clone(),
            _ => return self.reject_probe(ssrc, "rid not offered for this mid"),
        };
        match section.receiver.add_track(ssrc, rid) {
            Ok(track) => {
                if let Some(existing) = section.receiver.track() {
                    track.set_id(existing.id());
                    track.set_stream_id(existing.stream_id());
                }
                for pkt in probe.buffered {
                    self.deliver(&track, pkt);
                }
                events.push(TrackEvent {
                    track: Arc::clone(&track),
                    receiver: Arc::clone(&section.receiver),
                    transceiver: Arc::clone(&section.transceiver),
                });
                Some(SsrcState::Bound(Binding {
                    track,
                    receiver: Arc::clone(&section.receiver),
                }))
            }
            Err(err) => self.reject_probe(ssrc, &err.to_string()),
        }
    }

    fn reject_probe(&self, ssrc: SSRC, reason: &str) -> Option<SsrcState> {
        self.counters.probes_rejected.fetch_add(1, Ordering::SeqCst);
        log::debug!("router: probe for ssrc {ssrc} rejected: {reason}");
        None
    }
}

#[cfg(test)]
impl Router {
    pub(crate) fn bound_ssrcs(&self) -> Vec<SSRC> {
        let state = self.state.lock();
        let mut ssrcs: Vec<SSRC> = state
            .streams
            .iter()
            .filter(|(_, s)| matches!(s, SsrcState::Bound(_)))
            .map(|(ssrc, _)| *ssrc)
            .collect();
        ssrcs.sort_unstable();
        ssrcs
    }
}
