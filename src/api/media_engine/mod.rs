
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use sdp::description::media::MediaDescription;
use sdp::description::session::SessionDescription;
use util::sync::Mutex as SyncMutex;

use crate::error::{Error, Result};
use crate::peer_connection::sdp::{
    codecs_from_media_description, rtp_extensions_from_media_description,
};
use crate::rtp_transceiver::rtp_codec::{
    codec_parameters_fuzzy_search, CodecMatch, RTCPFeedback, RTCRtpCodecCapability,
    RTCRtpCodecParameters, RTCRtpHeaderExtensionCapability, RTCRtpHeaderExtensionParameters,
    RTCRtpParameters, RTPCodecType,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{fmtp, PayloadType};

/// MIME_TYPE_H264 H264 MIME type.
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_H264: &str = "video/H264";
/// MIME_TYPE_OPUS Opus MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_OPUS: &str = "audio/opus";
/// MIME_TYPE_VP8 VP8 MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_VP8: &str = "video/VP8";
/// MIME_TYPE_VP9 VP9 MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_VP9: &str = "video/VP9";
/// MIME_TYPE_AV1 AV1 MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_AV1: &str = "video/AV1";
/// MIME_TYPE_G722 G722 MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_G722: &str = "audio/G722";
/// MIME_TYPE_PCMU PCMU MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_PCMU: &str = "audio/PCMU";
/// MIME_TYPE_PCMA PCMA MIME type
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_PCMA: &str = "audio/PCMA";
/// MIME_TYPE_VIDEO_RTX retransmission format for video (RFC 4588).
pub const MIME_TYPE_VIDEO_RTX: &str = "video/rtx";

const VALID_EXT_IDS: Range<isize> = 1..15;

#[derive(Default, Debug, Clone)]
pub(crate) struct MediaEngineHeaderExtension {
    pub(crate) uri: String,
    pub(crate) is_audio: bool,
    pub(crate) is_video: bool,
    pub(crate) allowed_direction: Option<RTCRtpTransceiverDirection>,
}

impl MediaEngineHeaderExtension {
    pub fn is_matching_direction(&self, dir: RTCRtpTransceiverDirection) -> bool {
        if let Some(allowed_direction) = self.allowed_direction {
            use RTCRtpTransceiverDirection::*;
            allowed_direction == Inactive && dir == Inactive
                || allowed_direction.has_send() && dir.has_send()
                || allowed_direction.has_recv() && dir.has_recv()
        } else {
            // None means all directions matches.
            true
        }
    }
}

/// A MediaEngine defines the codecs and header extensions a peer connection
/// may negotiate. It is configured once, frozen by `APIBuilder::build`, and
/// shared read-only by every connection of that API. What a particular
/// connection agreed on lives in its [`NegotiatedMedia`].
#[derive(Default, Debug, Clone)]
pub struct MediaEngine {
    pub(crate) video_codecs: Vec<RTCRtpCodecParameters>,
    pub(crate) audio_codecs: Vec<RTCRtpCodecParameters>,
    header_extensions: Vec<MediaEngineHeaderExtension>,
}

impl MediaEngine {
    /// register_default_codecs registers the default codecs supported by webrtc-rs.
    pub fn register_default_codecs(&mut self) -> Result<()> {
        // Default Audio Codecs
        for (mime_type, clock_rate, channels, fmtp, payload_type) in [
            (MIME_TYPE_OPUS, 48000, 2, "minptime=10;useinbandfec=1", 111),
            (MIME_TYPE_G722, 8000, 0, "", 9),
            (MIME_TYPE_PCMU, 8000, 0, "", 0),
            (MIME_TYPE_PCMA, 8000, 0, "", 8),
        ] {
            self.register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: mime_type.to_owned(),
                        clock_rate,
                        channels,
                        sdp_fmtp_line: fmtp.to_owned(),
                        rtcp_feedback: vec![],
                    },
                    payload_type,
                },
                RTPCodecType::Audio,
            )?;
        }

        let video_rtcp_feedback = vec![
            RTCPFeedback {
                typ: "goog-remb".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "ccm".to_owned(),
                parameter: "fir".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "pli".to_owned(),
            },
        ];
        for (mime_type, fmtp, payload_type) in [
            (MIME_TYPE_VP8, "", 96),
            (MIME_TYPE_VP9, "profile-id=0", 98),
            (MIME_TYPE_VP9, "profile-id=1", 100),
            (
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
                102,
            ),
            (
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42001f",
                127,
            ),
            (
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
                125,
            ),
            (
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f",
                108,
            ),
            (
                MIME_TYPE_H264,
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=640032",
                123,
            ),
            (MIME_TYPE_AV1, "profile-id=0", 41),
        ] {
            self.register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: mime_type.to_owned(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: fmtp.to_owned(),
                        rtcp_feedback: video_rtcp_feedback.clone(),
                    },
                    payload_type,
                },
                RTPCodecType::Video,
            )?;
        }

        self.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: "video/ulpfec".to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 116,
            },
            RTPCodecType::Video,
        )
    }

    /// add_codec will append codec if it not exists
    fn add_codec(codecs: &mut Vec<RTCRtpCodecParameters>, codec: RTCRtpCodecParameters) {
        for c in codecs.iter() {
            if c.capability.mime_type == codec.capability.mime_type
                && c.payload_type == codec.payload_type
            {
                return;
            }
        }
        codecs.push(codec);
    }

    /// register_codec adds codec to the MediaEngine
    /// These are the list of codecs supported by this PeerConnection.
    pub fn register_codec(&mut self, codec: RTCRtpCodecParameters, typ: RTPCodecType) -> Result<()> {
        match typ {
            RTPCodecType::Audio => {
                MediaEngine::add_codec(&mut self.audio_codecs, codec);
                Ok(())
            }
            RTPCodecType::Video => {
                MediaEngine::add_codec(&mut self.video_codecs, codec);
                Ok(())
            }
            _ => Err(Error::ErrUnknownType),
        }
    }

    /// Adds a header extension to the MediaEngine
    /// To determine the negotiated value use [`NegotiatedMedia::get_header_extension_id`] after signaling is complete.
    ///
    /// The `allowed_direction` controls for which transceiver directions the extension matches. If
    /// set to `None` it matches all directions. The `SendRecv` direction would match all transceiver
    /// directions apart from `Inactive`. Inactive only matches inactive.
    pub fn register_header_extension(
        &mut self,
        extension: RTCRtpHeaderExtensionCapability,
        typ: RTPCodecType,
        allowed_direction: Option<RTCRtpTransceiverDirection>,
    ) -> Result<()> {
        let index = match self
            .header_extensions
            .iter()
            .position(|ext| ext.uri == extension.uri)
        {
            Some(index) => index,
            None => {
                // We have registered too many extensions
                if self.header_extensions.len() >= (VALID_EXT_IDS.end - 1) as usize {
                    return Err(Error::ErrRegisterHeaderExtensionNoFreeID);
                }
                self.header_extensions.push(MediaEngineHeaderExtension {
                    uri: extension.uri.clone(),
                    allowed_direction,
                    ..Default::default()
                });
                self.header_extensions.len() - 1
            }
        };

        let ext = &mut self.header_extensions[index];
        if ext.allowed_direction != allowed_direction {
            return Err(Error::ErrRegisterHeaderExtensionInvalidDirection);
        }
        if typ == RTPCodecType::Audio {
            ext.is_audio = true;
        } else if typ == RTPCodecType::Video {
            ext.is_video = true;
        }

        Ok(())
    }

    /// register_feedback adds feedback mechanism to already registered codecs.
    pub fn register_feedback(&mut self, feedback: RTCPFeedback, typ: RTPCodecType) {
        match typ {
            RTPCodecType::Video => {
                for v in &mut self.video_codecs {
                    v.capability.rtcp_feedback.push(feedback.clone());
                }
            }
            RTPCodecType::Audio => {
                for a in &mut self.audio_codecs {
                    a.capability.rtcp_feedback.push(feedback.clone());
                }
            }
            _ => {}
        }
    }

    fn codecs(&self, typ: RTPCodecType) -> &[RTCRtpCodecParameters] {
        match typ {
            RTPCodecType::Audio => &self.audio_codecs,
            RTPCodecType::Video => &self.video_codecs,
            RTPCodecType::Unspecified => &[],
        }
    }

    /// Look up a codec of a remote description in the local table
    pub(crate) fn match_remote_codec(
        &self,
        remote_codec: &RTCRtpCodecParameters,
        typ: RTPCodecType,
        exact_matches: &[RTCRtpCodecParameters],
        partial_matches: &[RTCRtpCodecParameters],
    ) -> Result<CodecMatch> {
        let codecs = self.codecs(typ);

        let remote_fmtp = fmtp::parse(
            &remote_codec.capability.mime_type,
            remote_codec.capability.sdp_fmtp_line.as_str(),
        );
        if let Some(apt) = remote_fmtp.parameter("apt") {
            let payload_type = apt.parse::<u8>()?;

            let mut apt_match = CodecMatch::None;
            if exact_matches.iter().any(|c| c.payload_type == payload_type) {
                apt_match = CodecMatch::Exact;
            } else if partial_matches.iter().any(|c| c.payload_type == payload_type) {
                apt_match = CodecMatch::Partial;
            }

            if apt_match == CodecMatch::None {
                return Ok(CodecMatch::None); // not an error, we just ignore this codec we don't support
            }

            // if apt's media codec is partial match, then apt codec must be partial match too
            let (_, mut match_type) = codec_parameters_fuzzy_search(remote_codec, codecs);
            if match_type == CodecMatch::Exact && apt_match == CodecMatch::Partial {
                match_type = CodecMatch::Partial;
            }
            return Ok(match_type);
        }

        let (_, match_type) = codec_parameters_fuzzy_search(remote_codec, codecs);
        Ok(match_type)
    }
}

/// NegotiatedState is what one connection agreed on with its peer.
#[derive(Default, Debug, Clone)]
pub(crate) struct NegotiatedState {
    // If we have attempted to negotiate a codec type yet.
    negotiated_video: bool,
    negotiated_audio: bool,

    negotiated_video_codecs: Vec<RTCRtpCodecParameters>,
    negotiated_audio_codecs: Vec<RTCRtpCodecParameters>,

    proposed_header_extensions: HashMap<isize, MediaEngineHeaderExtension>,
    negotiated_header_extensions: HashMap<isize, MediaEngineHeaderExtension>,
}

impl NegotiatedState {
    fn is_negotiated(&self, typ: RTPCodecType) -> bool {
        match typ {
            RTPCodecType::Audio => self.negotiated_audio,
            RTPCodecType::Video => self.negotiated_video,
            RTPCodecType::Unspecified => false,
        }
    }

    /// Look up a header extension and enable if it exists
    fn update_header_extension(
        &mut self,
        engine: &MediaEngine,
        id: isize,
        extension: &str,
        typ: RTPCodecType,
    ) {
        for local_extension in &engine.header_extensions {
            if local_extension.uri != extension {
                continue;
            }

            let negotiated_ext = self
                .negotiated_header_extensions
                .iter_mut()
                .find(|(_, ext)| ext.uri == extension);

            if let Some(n_ext) = negotiated_ext {
                if *n_ext.0 == id {
                    n_ext.1.is_video |= typ == RTPCodecType::Video;
                    n_ext.1.is_audio |= typ == RTPCodecType::Audio;
                } else {
                    let nid = n_ext.0;
                    log::warn!("Invalid ext id mapping in update_header_extension. {} was negotiated as {}, but was {} in call", extension, nid, id);
                }
            } else if let Some(prev_ext) = self.negotiated_header_extensions.get(&id) {
                log::warn!(
                    "Assigning {} to {} would override previous assignment to {}, no action taken",
                    id,
                    extension,
                    prev_ext.uri
                );
            } else {
                // We either only have a proposal or we have neither proposal nor a negotiated id
                // Accept whatevers the peer suggests
                let h = MediaEngineHeaderExtension {
                    uri: extension.to_owned(),
                    is_audio: local_extension.is_audio && typ == RTPCodecType::Audio,
                    is_video: local_extension.is_video && typ == RTPCodecType::Video,
                    allowed_direction: local_extension.allowed_direction,
                };
                self.negotiated_header_extensions.insert(id, h);
            }

            // Clear any proposals we had for this id
            self.proposed_header_extensions.remove(&id);
        }
    }

    fn push_codecs(&mut self, codecs: Vec<RTCRtpCodecParameters>, typ: RTPCodecType) {
        for codec in codecs {
            if typ == RTPCodecType::Audio {
                MediaEngine::add_codec(&mut self.negotiated_audio_codecs, codec);
            } else if typ == RTPCodecType::Video {
                MediaEngine::add_codec(&mut self.negotiated_video_codecs, codec);
            }
        }
    }

    /// Update from a remote description. The first section of each kind
    /// that shares a codec with the local table fixes the negotiated codecs
    /// and extension ids of that kind.
    fn update_from_remote_description(
        &mut self,
        engine: &MediaEngine,
        desc: &SessionDescription,
    ) -> Result<()> {
        for media in &desc.media_descriptions {
            let typ = RTPCodecType::from(media.media_name.media.to_lowercase().as_str());
            if typ == RTPCodecType::Unspecified || self.is_negotiated(typ) {
                continue;
            }

            let codecs = codecs_from_media_description(media)?;

            let mut exact_matches = vec![];
            let mut partial_matches = vec![];

            for codec in codecs {
                let match_type =
                    engine.match_remote_codec(&codec, typ, &exact_matches, &partial_matches)?;

                if match_type == CodecMatch::Exact {
                    exact_matches.push(codec);
                } else if match_type == CodecMatch::Partial {
                    partial_matches.push(codec);
                }
            }

            // use exact matches when they exist, otherwise fall back to partial
            if !exact_matches.is_empty() {
                self.push_codecs(exact_matches, typ);
            } else if !partial_matches.is_empty() {
                self.push_codecs(partial_matches, typ);
            } else {
                // no match, not negotiated
                continue;
            }

            match typ {
                RTPCodecType::Audio => self.negotiated_audio = true,
                _ => self.negotiated_video = true,
            }

            let extensions = rtp_extensions_from_media_description(media)?;
            for (extension, id) in extensions {
                self.update_header_extension(engine, id, &extension, typ);
            }
        }

        Ok(())
    }
}

/// NegotiatedMedia is the per-connection view of a shared [`MediaEngine`]:
/// the engine's codec table plus what has been agreed with the remote peer.
#[derive(Debug)]
pub struct NegotiatedMedia {
    engine: Arc<MediaEngine>,
    state: SyncMutex<NegotiatedState>,
}

impl NegotiatedMedia {
    pub(crate) fn new(engine: Arc<MediaEngine>) -> Self {
        NegotiatedMedia {
            engine,
            state: SyncMutex::new(NegotiatedState::default()),
        }
    }

    pub fn engine(&self) -> &Arc<MediaEngine> {
        &self.engine
    }

    /// is_negotiated reports whether a remote description fixed the codecs
    /// of this kind yet.
    pub fn is_negotiated(&self, typ: RTPCodecType) -> bool {
        self.state.lock().is_negotiated(typ)
    }

    /// plan_remote_description computes the state that applying `desc`
    /// would produce, without touching the current one.
    pub(crate) fn plan_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<NegotiatedState> {
        let mut next = self.state.lock().clone();
        next.update_from_remote_description(&self.engine, desc)?;
        Ok(next)
    }

    /// snapshot returns the current negotiated state, for a later commit
    /// to restore.
    pub(crate) fn snapshot(&self) -> NegotiatedState {
        self.state.lock().clone()
    }

    pub(crate) fn commit(&self, next: NegotiatedState) {
        let mut state = self.state.lock();
        *state = next;
    }

    /// Update the negotiated state from a remote description
    pub(crate) fn update_from_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        let next = self.plan_remote_description(desc)?;
        self.commit(next);
        Ok(())
    }

    /// has_usable_codec reports whether a section offers at least one media
    /// (non-retransmission) format the local table can handle.
    pub(crate) fn has_usable_codec(&self, media: &MediaDescription) -> Result<bool> {
        let typ = RTPCodecType::from(media.media_name.media.to_lowercase().as_str());
        for codec in codecs_from_media_description(media)? {
            if codec.capability.is_rtx() {
                continue;
            }
            if self.engine.match_remote_codec(&codec, typ, &[], &[])? != CodecMatch::None {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// get_header_extension_id returns the negotiated ID for a header extension.
    /// If the Header Extension isn't enabled ok will be false
    pub fn get_header_extension_id(
        &self,
        extension: RTCRtpHeaderExtensionCapability,
    ) -> (isize, bool, bool) {
        let state = self.state.lock();
        for (id, h) in &state.negotiated_header_extensions {
            if extension.uri == h.uri {
                return (*id, h.is_audio, h.is_video);
            }
        }

        (0, false, false)
    }

    pub(crate) fn get_codec_by_payload(
        &self,
        payload_type: PayloadType,
    ) -> Result<(RTCRtpCodecParameters, RTPCodecType)> {
        let state = self.state.lock();
        for (typ, negotiated, local) in [
            (
                RTPCodecType::Video,
                &state.negotiated_video_codecs,
                &self.engine.video_codecs,
            ),
            (
                RTPCodecType::Audio,
                &state.negotiated_audio_codecs,
                &self.engine.audio_codecs,
            ),
        ] {
            let codecs = if state.is_negotiated(typ) {
                negotiated
            } else {
                local
            };
            if let Some(codec) = codecs.iter().find(|c| c.payload_type == payload_type) {
                return Ok((codec.clone(), typ));
            }
        }

        Err(Error::ErrCodecNotFound)
    }

    pub(crate) fn get_codecs_by_kind(&self, typ: RTPCodecType) -> Vec<RTCRtpCodecParameters> {
        let state = self.state.lock();
        match typ {
            RTPCodecType::Video if state.negotiated_video => {
                state.negotiated_video_codecs.clone()
            }
            RTPCodecType::Audio if state.negotiated_audio => {
                state.negotiated_audio_codecs.clone()
            }
            _ => self.engine.codecs(typ).to_vec(),
        }
    }

    pub(crate) fn get_rtp_parameters_by_kind(
        &self,
        typ: RTPCodecType,
        direction: RTCRtpTransceiverDirection,
    ) -> RTCRtpParameters {
        let mut header_extensions = vec![];

        {
            let mut state = self.state.lock();
            if state.is_negotiated(typ) {
                for (id, e) in &state.negotiated_header_extensions {
                    if e.is_matching_direction(direction)
                        && (e.is_audio && typ == RTPCodecType::Audio
                            || e.is_video && typ == RTPCodecType::Video)
                    {
                        header_extensions.push(RTCRtpHeaderExtensionParameters {
                            id: *id,
                            uri: e.uri.clone(),
                        });
                    }
                }
            } else {
                let state = &mut *state;
                for local_extension in &self.engine.header_extensions {
                    let relevant = local_extension.is_matching_direction(direction)
                        && (local_extension.is_audio && typ == RTPCodecType::Audio
                            || local_extension.is_video && typ == RTPCodecType::Video);

                    if !relevant {
                        continue;
                    }

                    if let Some((id, negotiated_extension)) = state
                        .negotiated_header_extensions
                        .iter_mut()
                        .find(|(_, e)| e.uri == local_extension.uri)
                    {
                        // We have previously negotiated this extension, make sure to record it as
                        // active for the current type
                        negotiated_extension.is_audio |= typ == RTPCodecType::Audio;
                        negotiated_extension.is_video |= typ == RTPCodecType::Video;

                        header_extensions.push(RTCRtpHeaderExtensionParameters {
                            id: *id,
                            uri: negotiated_extension.uri.clone(),
                        });

                        continue;
                    }

                    if let Some((id, proposed_extension)) = state
                        .proposed_header_extensions
                        .iter()
                        .find(|(_, e)| e.uri == local_extension.uri)
                    {
                        // We have previously proposed this extension, re-use it
                        header_extensions.push(RTCRtpHeaderExtensionParameters {
                            id: *id,
                            uri: proposed_extension.uri.clone(),
                        });

                        continue;
                    }

                    // Figure out which (unused id) to propose.
                    let id = VALID_EXT_IDS.clone().find(|id| {
                        !state.negotiated_header_extensions.contains_key(id)
                            && !state.proposed_header_extensions.contains_key(id)
                    });

                    if let Some(id) = id {
                        state
                            .proposed_header_extensions
                            .insert(id, local_extension.clone());

                        header_extensions.push(RTCRtpHeaderExtensionParameters {
                            id,
                            uri: local_extension.uri.clone(),
                        });
                    } else {
                        log::warn!("No available RTP extension ID for {}", local_extension.uri);
                    }
                }
            }
        }

        header_extensions.sort_by_key(|e| e.id);

        RTCRtpParameters {
            header_extensions,
            codecs: self.get_codecs_by_kind(typ),
        }
    }

    pub(crate) fn get_rtp_parameters_by_payload_type(
        &self,
        payload_type: PayloadType,
    ) -> Result<RTCRtpParameters> {
        let (codec, typ) = self.get_codec_by_payload(payload_type)?;

        let mut header_extensions = vec![];
        {
            let state = self.state.lock();
            for (id, e) in &state.negotiated_header_extensions {
                if e.is_audio && typ == RTPCodecType::Audio
                    || e.is_video && typ == RTPCodecType::Video
                {
                    header_extensions.push(RTCRtpHeaderExtensionParameters {
                        uri: e.uri.clone(),
                        id: *id,
                    });
                }
            }
        }
        header_extensions.sort_by_key(|e| e.id);

        Ok(RTCRtpParameters {
            header_extensions,
            codecs: vec![codec],
        })
    }
}
