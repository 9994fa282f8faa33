
pub mod sdp_type;
pub mod session_description;

use std::collections::{HashMap, HashSet};
use std::convert::From;
use std::io::BufReader;
use std::sync::Arc;

use sdp::description::common::{Address, ConnectionInformation};
use sdp::description::media::{MediaDescription, MediaName, RangedPort};
use sdp::description::session::*;
use sdp::extmap::ExtMap;
use smol_str::SmolStr;
use url::Url;

use crate::api::media_engine::{NegotiatedMedia, MIME_TYPE_G722, MIME_TYPE_PCMA, MIME_TYPE_PCMU};
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::RTCIceParameters;
use crate::rtp_transceiver::rtp_codec::{
    RTCPFeedback, RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{PayloadType, RTCRtpTransceiver, SSRC};
use crate::{SDP_ATTRIBUTE_RID, SDP_ATTRIBUTE_SIMULCAST};

const ATTR_KEY_ICE_UFRAG: &str = "ice-ufrag";
const ATTR_KEY_ICE_PWD: &str = "ice-pwd";

/// TrackDetails represents any media source that can be represented in a SDP
/// This isn't keyed by SSRC because it also needs to support rid based sources
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct TrackDetails {
    pub(crate) mid: SmolStr,
    pub(crate) kind: RTPCodecType,
    pub(crate) stream_id: String,
    pub(crate) id: String,
    pub(crate) ssrcs: Vec<SSRC>,
    pub(crate) repair_ssrc: Option<SSRC>,
    pub(crate) rids: Vec<SmolStr>,
}

pub(crate) fn filter_track_with_ssrc(incoming_tracks: &mut Vec<TrackDetails>, ssrc: SSRC) {
    incoming_tracks.retain(|x| !x.ssrcs.contains(&ssrc));
}

/// extract all TrackDetails from an SDP. `mids` holds the mid of every media
/// section, in order, as returned by [`section_mids`].
pub(crate) fn track_details_from_sdp(
    s: &SessionDescription,
    mids: &[SmolStr],
    exclude_inactive: bool,
) -> Vec<TrackDetails> {
    let mut incoming_tracks = vec![];

    for (media, mid_value) in s.media_descriptions.iter().zip(mids) {
        let mut tracks_in_media_section: Vec<TrackDetails> = vec![];
        let mut rtx_repair_flows = HashMap::new();

        let mut stream_id = "";
        let mut track_id = "";

        // If media section is recvonly or inactive skip
        if media.attribute(ATTR_KEY_RECV_ONLY).is_some()
            || (exclude_inactive && media.attribute(ATTR_KEY_INACTIVE).is_some())
        {
            continue;
        }

        let codec_type = RTPCodecType::from(media.media_name.media.as_str());
        if codec_type == RTPCodecType::Unspecified {
            continue;
        }

        for attr in &media.attributes {
            match attr.key.as_str() {
                ATTR_KEY_SSRCGROUP => {
                    if let Some(value) = &attr.value {
                        let split: Vec<&str> = value.split(' ').collect();
                        // `a=ssrc-group:FID <base> <rtx>` declares the second
                        // SSRC as the RFC 4588 repair flow of the first.
                        if split.len() == 3 && split[0] == SEMANTIC_TOKEN_FLOW_IDENTIFICATION {
                            let (base_ssrc, rtx_repair_flow) =
                                match (split[1].parse::<u32>(), split[2].parse::<u32>()) {
                                    (Ok(base), Ok(rtx)) => (base, rtx),
                                    _ => {
                                        log::warn!("Failed to parse ssrc-group: {}", value);
                                        continue;
                                    }
                                };
                            rtx_repair_flows.insert(rtx_repair_flow, base_ssrc);
                            // Remove if rtx was added as track before
                            filter_track_with_ssrc(&mut tracks_in_media_section, rtx_repair_flow);
                        }
                    }
                }

                // `a=msid:<stream_id> <track_label>`
                ATTR_KEY_MSID => {
                    if let Some(value) = &attr.value {
                        let mut split = value.split(' ');

                        if let (Some(sid), Some(tid), None) =
                            (split.next(), split.next(), split.next())
                        {
                            stream_id = sid;
                            track_id = tid;
                        }
                    }
                }

                ATTR_KEY_SSRC => {
                    if let Some(value) = &attr.value {
                        let split: Vec<&str> = value.split(' ').collect();
                        let ssrc = match split[0].parse::<u32>() {
                            Ok(ssrc) => ssrc,
                            Err(err) => {
                                log::warn!("Failed to parse SSRC: {}", err);
                                continue;
                            }
                        };

                        if rtx_repair_flows.contains_key(&ssrc) {
                            continue;
                        }

                        if split.len() == 3 && split[1].starts_with("msid:") {
                            stream_id = &split[1]["msid:".len()..];
                            track_id = split[2];
                        }

                        if let Some(track) = tracks_in_media_section
                            .iter_mut()
                            .find(|t| t.ssrcs.contains(&ssrc))
                        {
                            stream_id.clone_into(&mut track.stream_id);
                            track_id.clone_into(&mut track.id);
                        } else {
                            tracks_in_media_section.push(TrackDetails {
                                mid: mid_value.clone(),
                                kind: codec_type,
                                stream_id: stream_id.to_owned(),
                                id: track_id.to_owned(),
                                ssrcs: vec![ssrc],
                                ..Default::default()
                            });
                        }
                    }
                }
                _ => {}
            };
        }
        for (repair, base) in &rtx_repair_flows {
            for track in &mut tracks_in_media_section {
                if track.ssrcs.contains(base) {
                    track.repair_ssrc = Some(*repair);
                }
            }
        }

        // A section using RTP stream ids (RFC 8851) describes one track whose
        // encodings are told apart by rid, whatever a=ssrc lines it carries.
        let rids: Vec<SmolStr> = get_rids(media)
            .iter()
            .filter(|r| r.direction == SimulcastDirection::Send)
            .map(|r| SmolStr::from(&r.id))
            .collect();
        if !rids.is_empty() {
            tracks_in_media_section = vec![TrackDetails {
                mid: mid_value.clone(),
                kind: codec_type,
                stream_id: stream_id.to_owned(),
                id: track_id.to_owned(),
                rids,
                ..Default::default()
            }];
        }

        incoming_tracks.extend(tracks_in_media_section);
    }

    incoming_tracks
}

pub(crate) fn get_rids(media: &MediaDescription) -> Vec<SimulcastRid> {
    let mut rids = vec![];
    let mut simulcast_attr: Option<String> = None;
    for attr in &media.attributes {
        if attr.key.as_str() == SDP_ATTRIBUTE_RID {
            if let Err(err) = attr
                .value
                .as_ref()
                .ok_or(SimulcastRidParseError::SyntaxIdDirSplit)
                .and_then(SimulcastRid::try_from)
                .map(|rid| rids.push(rid))
            {
                log::warn!("Failed to parse RID: {}", err);
            }
        } else if attr.key.as_str() == SDP_ATTRIBUTE_SIMULCAST {
            simulcast_attr.clone_from(&attr.value);
        }
    }

    if let Some(attr) = simulcast_attr {
        let mut split = attr.split(' ');
        while let (Some(_dir), Some(list)) = (split.next(), split.next()) {
            for sc_id in list.split(';').flat_map(|alt| alt.split(',')) {
                let (sc_id, paused) = match sc_id.strip_prefix('~') {
                    Some(sc_id) => (sc_id, true),
                    None => (sc_id, false),
                };

                if let Some(rid) = rids.iter_mut().find(|f| f.id == sc_id) {
                    rid.paused = paused;
                }
            }
        }
    }

    rids
}

/// add_candidates_to_media_descriptions appends every candidate not already
/// present, and `a=end-of-candidates` once gathering is over.
pub(crate) fn add_candidates_to_media_descriptions(
    candidates: &[RTCIceCandidate],
    mut m: MediaDescription,
    end_of_candidates: bool,
) -> Result<MediaDescription> {
    for c in candidates {
        let marshaled = c.to_wire_form()?;
        let exists = m
            .attributes
            .iter()
            .any(|a| a.key == ATTR_KEY_CANDIDATE && a.value.as_deref() == Some(marshaled.as_str()));
        if !exists {
            m = m.with_value_attribute(ATTR_KEY_CANDIDATE.to_owned(), marshaled);
        }
    }

    if !end_of_candidates || m.has_attribute(ATTR_KEY_END_OF_CANDIDATES) {
        return Ok(m);
    }

    Ok(m.with_property_attribute(ATTR_KEY_END_OF_CANDIDATES.to_owned()))
}

pub(crate) struct AddTransceiverSdpParams {
    should_add_candidates: bool,
    mid_value: String,
    end_of_candidates: bool,
    offered_direction: Option<RTCRtpTransceiverDirection>,
}

fn rejected_media_section(kind: RTPCodecType) -> MediaDescription {
    MediaDescription {
        media_name: MediaName {
            media: kind.to_string(),
            port: RangedPort {
                value: 0,
                range: None,
            },
            protos: vec![
                "UDP".to_owned(),
                "TLS".to_owned(),
                "RTP".to_owned(),
                "SAVPF".to_owned(),
            ],
            formats: vec!["0".to_owned()],
        },
        media_title: None,
        // c= is required for every media section, rejected ones included.
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        bandwidth: vec![],
        encryption_key: None,
        attributes: vec![],
    }
}

/// add_transceiver_sdp appends the media section of one transceiver. The
/// returned flag is `false` when the section had to be rejected because no
/// codec of its kind is available.
pub(crate) async fn add_transceiver_sdp(
    d: SessionDescription,
    media: &NegotiatedMedia,
    ice_params: &RTCIceParameters,
    candidates: &[RTCIceCandidate],
    media_section: &MediaSection,
    params: AddTransceiverSdpParams,
) -> Result<(SessionDescription, bool)> {
    let t = &media_section.transceiver;
    let mut m = MediaDescription::new_jsep_media_description(t.kind.to_string(), vec![])
        .with_value_attribute(ATTR_KEY_MID.to_owned(), params.mid_value.clone())
        .with_ice_credentials(
            ice_params.username_fragment.clone(),
            ice_params.password.clone(),
        )
        .with_property_attribute(ATTR_KEY_RTCPMUX.to_owned())
        .with_property_attribute(ATTR_KEY_RTCPRSIZE.to_owned());

    let codecs = t.get_codecs().await;
    for codec in &codecs {
        let name = codec
            .capability
            .mime_type
            .trim_start_matches("audio/")
            .trim_start_matches("video/")
            .to_owned();
        m = m.with_codec(
            codec.payload_type,
            name,
            codec.capability.clock_rate,
            codec.capability.channels,
            codec.capability.sdp_fmtp_line.clone(),
        );

        for feedback in &codec.capability.rtcp_feedback {
            m = m.with_value_attribute(
                "rtcp-fb".to_owned(),
                format!(
                    "{} {} {}",
                    codec.payload_type, feedback.typ, feedback.parameter
                )
                .trim_end()
                .to_owned(),
            );
        }
    }
    if codecs.is_empty() {
        // If we are sender and we have no codecs throw an error early
        if let Some(sender) = t.sender().await {
            if sender.track().await.is_some() {
                return Err(Error::ErrSenderWithNoCodecs);
            }
        }

        // Explicitly reject track if we don't have the codec
        return Ok((d.with_media(rejected_media_section(t.kind)), false));
    }

    let parameters = media.get_rtp_parameters_by_kind(t.kind, t.direction());
    for rtp_extension in &parameters.header_extensions {
        let ext_url = Url::parse(rtp_extension.uri.as_str())?;
        m = m.with_extmap(ExtMap {
            value: rtp_extension.id,
            uri: Some(ext_url),
            ..Default::default()
        });
    }

    if !media_section.rid_map.is_empty() {
        let mut recv_sc_list: Vec<String> = vec![];
        let mut send_sc_list: Vec<String> = vec![];

        for rid in &media_section.rid_map {
            let (list, reply) = match rid.direction {
                // a send rid is answered with a recv rid and the other way round
                SimulcastDirection::Send => (&mut recv_sc_list, "recv"),
                SimulcastDirection::Recv => (&mut send_sc_list, "send"),
            };
            if rid.paused {
                list.push(format!("~{}", rid.id));
            } else {
                list.push(rid.id.clone());
            }
            m = m.with_value_attribute(
                SDP_ATTRIBUTE_RID.to_owned(),
                format!("{} {}", rid.id, reply),
            );
        }

        let mut sc_attr = vec![];
        if !recv_sc_list.is_empty() {
            sc_attr.push(format!("recv {}", recv_sc_list.join(";")));
        }
        if !send_sc_list.is_empty() {
            sc_attr.push(format!("send {}", send_sc_list.join(";")));
        }
        m = m.with_value_attribute(SDP_ATTRIBUTE_SIMULCAST.to_owned(), sc_attr.join(" "));
    }

    if let Some(sender) = t.sender().await {
        if let Some(track) = sender.track().await {
            let encodings = sender.encodings();
            for encoding in encodings {
                m = m.with_media_source(
                    encoding.ssrc,
                    track.stream_id().to_owned(), /* cname */
                    track.stream_id().to_owned(), /* streamLabel */
                    track.id().to_owned(),
                );

                if encoding.rtx.ssrc != 0 {
                    m = m
                        .with_media_source(
                            encoding.rtx.ssrc,
                            track.stream_id().to_owned(),
                            track.stream_id().to_owned(),
                            track.id().to_owned(),
                        )
                        .with_value_attribute(
                            ATTR_KEY_SSRCGROUP.to_owned(),
                            format!(
                                "{} {} {}",
                                SEMANTIC_TOKEN_FLOW_IDENTIFICATION,
                                encoding.ssrc,
                                encoding.rtx.ssrc
                            ),
                        );
                }
            }

            if encodings.len() > 1 {
                let mut send_rids = Vec::with_capacity(encodings.len());
                for encoding in encodings {
                    m = m.with_value_attribute(
                        SDP_ATTRIBUTE_RID.to_owned(),
                        format!("{} send", encoding.rid),
                    );
                    send_rids.push(encoding.rid.to_string());
                }

                m = m.with_value_attribute(
                    SDP_ATTRIBUTE_SIMULCAST.to_owned(),
                    format!("send {}", send_rids.join(";")),
                );
            }

            m = m.with_property_attribute(format!("msid:{} {}", track.stream_id(), track.id()));
        }
    }

    let direction = match params.offered_direction {
        Some(offered_direction) => {
            use RTCRtpTransceiverDirection::*;
            match offered_direction {
                // sendonly is answered with recvonly or inactive, recvonly
                // with sendonly or inactive
                Sendonly | Recvonly => offered_direction.reverse().intersect(t.direction()),
                Sendrecv | Unspecified => t.direction(),
                Inactive => Inactive,
            }
        }
        // Offers reflect the transceiver direction directly, re-offers included.
        None => t.direction(),
    };
    m = m.with_property_attribute(direction.to_string());

    if params.should_add_candidates {
        m = add_candidates_to_media_descriptions(candidates, m, params.end_of_candidates)?;
    }

    Ok((d.with_media(m), true))
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub(crate) enum SimulcastRidParseError {
    /// SyntaxIdDirSplit indicates rid-syntax could not be parsed.
    #[error("RFC8851 mandates rid-syntax        = %s\"a=rid:\" rid-id SP rid-dir")]
    SyntaxIdDirSplit,
    /// UnknownDirection indicates rid-dir was not parsed. Should be "send" or "recv".
    #[error("RFC8851 mandates rid-dir           = %s\"send\" / %s\"recv\"")]
    UnknownDirection,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SimulcastDirection {
    Send,
    Recv,
}

impl TryFrom<&str> for SimulcastDirection {
    type Error = SimulcastRidParseError;
    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "send" => Ok(SimulcastDirection::Send),
            "recv" => Ok(SimulcastDirection::Recv),
            _ => Err(SimulcastRidParseError::UnknownDirection),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SimulcastRid {
    pub(crate) id: String,
    pub(crate) direction: SimulcastDirection,
    pub(crate) params: String,
    pub(crate) paused: bool,
}

impl TryFrom<&String> for SimulcastRid {
    type Error = SimulcastRidParseError;
    fn try_from(value: &String) -> std::result::Result<Self, Self::Error> {
        let mut split = value.split(' ');
        let id = split
            .next()
            .ok_or(SimulcastRidParseError::SyntaxIdDirSplit)?
            .to_owned();
        let direction = SimulcastDirection::try_from(
            split
                .next()
                .ok_or(SimulcastRidParseError::SyntaxIdDirSplit)?,
        )?;
        let params = split.collect();

        Ok(Self {
            id,
            direction,
            params,
            paused: false,
        })
    }
}

fn bundle_match(bundle: Option<&String>, id: &str) -> bool {
    match bundle {
        None => true,
        Some(b) => b.split_whitespace().any(|s| s == id),
    }
}

pub(crate) struct MediaSection {
    pub(crate) id: String,
    pub(crate) transceiver: Arc<RTCRtpTransceiver>,
    pub(crate) rid_map: Vec<SimulcastRid>,
    pub(crate) offered_direction: Option<RTCRtpTransceiverDirection>,
}

#[derive(Default)]
pub(crate) struct PopulateSdpParams {
    pub(crate) is_icelite: bool,
    pub(crate) end_of_candidates: bool,
    pub(crate) match_bundle_group: Option<String>,
}

/// populate_sdp serializes a PeerConnections state into an SDP
pub(crate) async fn populate_sdp(
    mut d: SessionDescription,
    media: &NegotiatedMedia,
    candidates: &[RTCIceCandidate],
    ice_params: &RTCIceParameters,
    media_sections: &[MediaSection],
    params: PopulateSdpParams,
) -> Result<SessionDescription> {
    let mut bundle_ids = vec![];

    for (i, m) in media_sections.iter().enumerate() {
        let section_params = AddTransceiverSdpParams {
            should_add_candidates: i == 0,
            mid_value: m.id.clone(),
            end_of_candidates: params.end_of_candidates,
            offered_direction: m.offered_direction,
        };
        let (d1, should_add_id) =
            add_transceiver_sdp(d, media, ice_params, candidates, m, section_params).await?;
        d = d1;

        if should_add_id {
            if bundle_match(params.match_bundle_group.as_ref(), &m.id) {
                bundle_ids.push(m.id.as_str());
            } else if let Some(desc) = d.media_descriptions.last_mut() {
                desc.media_name.port = RangedPort {
                    value: 0,
                    range: None,
                }
            }
        }
    }

    if params.is_icelite {
        // RFC 5245 S15.3
        d = d.with_value_attribute(ATTR_KEY_ICELITE.to_owned(), ATTR_KEY_ICELITE.to_owned());
    }

    if !bundle_ids.is_empty() {
        d = d.with_value_attribute(
            ATTR_KEY_GROUP.to_owned(),
            format!("BUNDLE {}", bundle_ids.join(" ")),
        );
    }

    Ok(d)
}

pub(crate) fn get_mid_value(media: &MediaDescription) -> Option<&String> {
    for attr in &media.attributes {
        if attr.key == ATTR_KEY_MID {
            return attr.value.as_ref();
        }
    }
    None
}

/// section_mids returns the mid of every media section in order. A
/// description where no section carries a mid gets its section indices as
/// mids, so sections of legacy peers can still be told apart. Mixing
/// sections with and without mid, or repeating a mid, is rejected.
pub(crate) fn section_mids(desc: &SessionDescription) -> Result<Vec<SmolStr>> {
    let mids: Vec<Option<&String>> = desc.media_descriptions.iter().map(get_mid_value).collect();

    if mids.iter().all(|m| m.is_none()) {
        return Ok((0..mids.len()).map(|i| SmolStr::from(i.to_string())).collect());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(mids.len());
    for (i, mid) in mids.into_iter().enumerate() {
        let mid = match mid {
            Some(mid) if !mid.is_empty() => mid,
            _ => return Err(Error::ErrPeerConnRemoteDescriptionWithoutMidValue(i)),
        };
        if !seen.insert(mid.as_str()) {
            return Err(Error::ErrDuplicateMid(mid.clone()));
        }
        out.push(SmolStr::from(mid.as_str()));
    }
    Ok(out)
}

/// has_mid reports whether any section names its mid, as opposed to legacy
/// descriptions where [`section_mids`] made them up.
pub(crate) fn has_mid(desc: &SessionDescription) -> bool {
    desc.media_descriptions
        .iter()
        .any(|m| get_mid_value(m).is_some())
}

pub(crate) fn get_peer_direction(media: &MediaDescription) -> RTCRtpTransceiverDirection {
    for a in &media.attributes {
        let direction = RTCRtpTransceiverDirection::from(a.key.as_str());
        if direction != RTCRtpTransceiverDirection::Unspecified {
            return direction;
        }
    }
    RTCRtpTransceiverDirection::Unspecified
}

/// is_rejected reports a section declined with port zero.
pub(crate) fn is_rejected(media: &MediaDescription) -> bool {
    media.media_name.port.value == 0
}

/// has_explicit_ssrc reports a section that names its streams with a=ssrc.
pub(crate) fn has_explicit_ssrc(media: &MediaDescription) -> bool {
    media.has_attribute(ATTR_KEY_SSRC)
}

/// is_undeclared_eligible reports whether packets of unknown SSRC may be
/// bound to this section without probing: it must be the only section of
/// its kind and declare neither SSRCs nor rids.
pub(crate) fn is_undeclared_eligible(desc: &SessionDescription, index: usize) -> bool {
    let media = match desc.media_descriptions.get(index) {
        Some(media) => media,
        None => return false,
    };
    let kind = media.media_name.media.as_str();
    let same_kind = desc
        .media_descriptions
        .iter()
        .filter(|m| m.media_name.media == kind)
        .count();

    same_kind == 1 && !has_explicit_ssrc(media) && !media.has_attribute(SDP_ATTRIBUTE_RID)
}

/// payload_types lists the numeric formats of a section. Non numeric
/// formats are skipped.
pub(crate) fn payload_types(media: &MediaDescription) -> Vec<PayloadType> {
    media
        .media_name
        .formats
        .iter()
        .filter_map(|f| f.parse::<PayloadType>().ok())
        .collect()
}

/// find_media_section_by_payload_type returns the index of the first section
/// whose format list carries `payload_type`.
pub(crate) fn find_media_section_by_payload_type(
    desc: &SessionDescription,
    payload_type: PayloadType,
) -> Result<usize> {
    desc.media_descriptions
        .iter()
        .position(|m| payload_types(m).contains(&payload_type))
        .ok_or(Error::ErrPeerConnNoMediaSectionForPayloadType)
}

/// extract_ice_details returns the remote ICE credentials and every
/// candidate of the description. Session level credentials come first, then
/// those of the first active section; all active sections must agree.
/// Inactive sections are only a fallback when no active one carries any.
pub(crate) fn extract_ice_details(desc: &SessionDescription) -> Result<RemoteIceDetails> {
    let mut remote_ufrag = desc.attribute(ATTR_KEY_ICE_UFRAG).map(String::as_str);
    let mut remote_pwd = desc.attribute(ATTR_KEY_ICE_PWD).map(String::as_str);
    let mut backup_ufrag = None;
    let mut backup_pwd = None;
    let mut candidates = vec![];

    for (i, m) in desc.media_descriptions.iter().enumerate() {
        let ufrag = m.attribute(ATTR_KEY_ICE_UFRAG).flatten();
        let pwd = m.attribute(ATTR_KEY_ICE_PWD).flatten();

        if m.attribute(ATTR_KEY_INACTIVE).is_some() {
            backup_ufrag = backup_ufrag.or(ufrag);
            backup_pwd = backup_pwd.or(pwd);
        } else {
            remote_ufrag = remote_ufrag.or(ufrag);
            remote_pwd = remote_pwd.or(pwd);
            if ufrag.is_some() && ufrag != remote_ufrag {
                return Err(Error::ErrSessionDescriptionConflictingIceUfrag);
            }
            if pwd.is_some() && pwd != remote_pwd {
                return Err(Error::ErrSessionDescriptionConflictingIcePwd);
            }
        }

        let sdp_mline_index = u16::try_from(i).map_err(|_| {
            Error::ErrInvalidDescription(format!("media section {i} out of range"))
        })?;
        for a in &m.attributes {
            if a.key != ATTR_KEY_CANDIDATE {
                continue;
            }
            if let Some(value) = &a.value {
                let mut candidate = RTCIceCandidate::from_wire_form(value)?;
                candidate.sdp_mid = get_mid_value(m).cloned().unwrap_or_default();
                candidate.sdp_mline_index = sdp_mline_index;
                candidates.push(candidate);
            }
        }
    }

    let username_fragment = remote_ufrag
        .or(backup_ufrag)
        .ok_or(Error::ErrSessionDescriptionMissingIceUfrag)?;
    let password = remote_pwd
        .or(backup_pwd)
        .ok_or(Error::ErrSessionDescriptionMissingIcePwd)?;

    Ok(RemoteIceDetails {
        username_fragment: username_fragment.to_owned(),
        password: password.to_owned(),
        ice_lite: is_lite_set(desc),
        candidates,
    })
}

#[derive(Default, Debug, Clone)]
pub(crate) struct RemoteIceDetails {
    pub(crate) username_fragment: String,
    pub(crate) password: String,
    pub(crate) ice_lite: bool,
    pub(crate) candidates: Vec<RTCIceCandidate>,
}

impl RemoteIceDetails {
    pub(crate) fn parameters(&self) -> RTCIceParameters {
        RTCIceParameters {
            username_fragment: self.username_fragment.clone(),
            password: self.password.clone(),
            ice_lite: self.ice_lite,
        }
    }
}

pub(crate) fn is_lite_set(desc: &SessionDescription) -> bool {
    desc.attributes
        .iter()
        .any(|a| a.key.trim() == ATTR_KEY_ICELITE)
}

/// static_payload_codec covers the RFC 3551 audio payload types a peer may
/// offer without an rtpmap line.
fn static_payload_codec(payload_type: PayloadType) -> Option<(&'static str, u32)> {
    match payload_type {
        0 => Some((MIME_TYPE_PCMU, 8000)),
        8 => Some((MIME_TYPE_PCMA, 8000)),
        9 => Some((MIME_TYPE_G722, 8000)),
        _ => None,
    }
}

pub(crate) fn codecs_from_media_description(
    m: &MediaDescription,
) -> Result<Vec<RTCRtpCodecParameters>> {
    let s = SessionDescription {
        media_descriptions: vec![m.clone()],
        ..Default::default()
    };

    let mut out = vec![];
    for payload_str in &m.media_name.formats {
        let payload_type: PayloadType = payload_str.parse::<u8>()?;
        let codec = match s.get_codec_for_payload_type(payload_type) {
            Ok(codec) => codec,
            Err(err) => {
                if let Some((mime_type, clock_rate)) = static_payload_codec(payload_type) {
                    out.push(RTCRtpCodecParameters {
                        capability: RTCRtpCodecCapability {
                            mime_type: mime_type.to_owned(),
                            clock_rate,
                            ..Default::default()
                        },
                        payload_type,
                    });
                    continue;
                }
                return Err(err.into());
            }
        };

        let channels = codec.encoding_parameters.parse::<u16>().unwrap_or(0);

        let mut feedback = vec![];
        for raw in &codec.rtcp_feedback {
            let mut split = raw.split(' ');
            let typ = split.next().unwrap_or_default().to_owned();
            let parameter = split.next().unwrap_or_default().to_owned();
            feedback.push(RTCPFeedback { typ, parameter });
        }

        out.push(RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: m.media_name.media.clone() + "/" + codec.name.as_str(),
                clock_rate: codec.clock_rate,
                channels,
                sdp_fmtp_line: codec.fmtp.clone(),
                rtcp_feedback: feedback,
            },
            payload_type,
        })
    }

    Ok(out)
}

pub(crate) fn rtp_extensions_from_media_description(
    m: &MediaDescription,
) -> Result<HashMap<String, isize>> {
    let mut out = HashMap::new();

    for a in &m.attributes {
        if a.key == ATTR_KEY_EXT_MAP {
            let a_str = a.to_string();
            let mut reader = BufReader::new(a_str.as_bytes());
            let e = ExtMap::unmarshal(&mut reader)?;

            if let Some(uri) = e.uri {
                out.insert(uri.to_string(), e.value);
            }
        }
    }

    Ok(out)
}

/// update_sdp_origin saves sdp.Origin in PeerConnection when creating 1st local SDP;
/// for subsequent calling, it updates Origin for SessionDescription from saved one
/// and increments session version by one.
/// <https://tools.ietf.org/html/draft-ietf-rtcweb-jsep-25#section-5.2.2>
pub(crate) fn update_sdp_origin(origin: &mut Origin, d: &mut SessionDescription) {
    if origin.session_version == 0 {
        origin.session_version = d.origin.session_version;
        origin.session_id = d.origin.session_id;
    } else {
        d.origin.session_id = origin.session_id;

        origin.session_version += 1;
        d.origin.session_version = origin.session_version;
    }
}
