use bytes::Bytes;
use tokio::sync::Mutex;

use super::*;
use crate::error::flatten_errs;

/// TrackLocalStaticRTP  is a TrackLocal that has a pre-set codec and accepts RTP Packets.
#[derive(Debug)]
pub struct TrackLocalStaticRTP {
    pub(crate) bindings: Mutex<Vec<Arc<TrackBinding>>>,
    codec: RTCRtpCodecCapability,
    id: String,
    rid: Option<String>,
    stream_id: String,
}

impl TrackLocalStaticRTP {
    /// returns a TrackLocalStaticRTP without rid.
    pub fn new(codec: RTCRtpCodecCapability, id: String, stream_id: String) -> Self {
        TrackLocalStaticRTP {
            codec,
            bindings: Mutex::new(vec![]),
            id,
            rid: None,
            stream_id,
        }
    }

    /// returns a TrackLocalStaticRTP with rid.
    pub fn new_with_rid(
        codec: RTCRtpCodecCapability,
        id: String,
        rid: String,
        stream_id: String,
    ) -> Self {
        TrackLocalStaticRTP {
            codec,
            bindings: Mutex::new(vec![]),
            id,
            rid: Some(rid),
            stream_id,
        }
    }

    /// codec gets the Codec of the track
    pub fn codec(&self) -> RTCRtpCodecCapability {
        self.codec.clone()
    }

    /// bindings_ssrc lists the SSRC of every sender this track is bound to.
    pub async fn bindings_ssrc(&self) -> Vec<SSRC> {
        let bindings = self.bindings.lock().await;
        bindings.iter().map(|b| b.ssrc).collect()
    }

    pub async fn any_binding_paused(&self) -> bool {
        let bindings = self.bindings.lock().await;
        bindings.iter().any(|b| b.is_sender_paused())
    }

    async fn write_rtp_to_binding(
        &self,
        p: &rtp::packet::Packet,
        attr: &Attributes,
        binding: &TrackBinding,
    ) -> Result<usize> {
        if binding.is_sender_paused() {
            return Ok(0);
        }

        let mut pkt = p.clone();
        pkt.header.ssrc = binding.ssrc;
        pkt.header.payload_type = binding.payload_type;
        for ext in &binding.hdr_ext_ids {
            pkt.header.set_extension(ext.id, ext.payload.clone())?;
        }

        match &binding.write_stream {
            Some(write_stream) => write_stream.write_rtp_with_attributes(&pkt, attr).await,
            None => Ok(0),
        }
    }
}

#[async_trait]
impl TrackLocal for TrackLocalStaticRTP {
    /// bind is called by the PeerConnection after negotiation is complete
    /// This asserts that the code requested is supported by the remote peer.
    /// If so it setups all the state (SSRC and PayloadType) to have a call
    async fn bind(&self, t: &TrackLocalContext) -> Result<RTCRtpCodecParameters> {
        let parameters = RTCRtpCodecParameters {
            capability: self.codec.clone(),
            ..Default::default()
        };

        let mut hdr_ext_ids = vec![];
        if let (Some(id), Some(mid)) = (
            t.header_extensions()
                .iter()
                .find(|e| e.uri == ::sdp::extmap::SDES_MID_URI)
                .map(|e| e.id as u8),
            t.mid(),
        ) {
            hdr_ext_ids.push(rtp::header::Extension {
                id,
                payload: Bytes::copy_from_slice(mid.as_bytes()),
            });
        }

        if let (Some(id), Some(rid)) = (
            t.header_extensions()
                .iter()
                .find(|e| e.uri == ::sdp::extmap::SDES_RTP_STREAM_ID_URI)
                .map(|e| e.id as u8),
            self.rid(),
        ) {
            hdr_ext_ids.push(rtp::header::Extension {
                id,
                payload: Bytes::copy_from_slice(rid.as_bytes()),
            });
        }

        let (codec, match_type) = codec_parameters_fuzzy_search(&parameters, t.codec_parameters());
        if match_type == CodecMatch::None {
            return Err(Error::ErrUnsupportedCodec);
        }

        let mut bindings = self.bindings.lock().await;
        bindings.push(Arc::new(TrackBinding {
            id: t.id(),
            ssrc: t.ssrc(),
            payload_type: codec.payload_type,
            write_stream: t.write_stream(),
            sender_paused: Arc::clone(&t.paused),
            hdr_ext_ids,
        }));

        Ok(codec)
    }

    /// unbind implements the teardown logic when the track is no longer needed. This happens
    /// because a track has been stopped.
    async fn unbind(&self, t: &TrackLocalContext) -> Result<()> {
        let mut bindings = self.bindings.lock().await;
        match bindings.iter().position(|b| b.id == t.id()) {
            Some(index) => {
                bindings.remove(index);
                Ok(())
            }
            None => Err(Error::ErrUnbindFailed),
        }
    }

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn rid(&self) -> Option<&str> {
        self.rid.as_deref()
    }

    fn stream_id(&self) -> &str {
        self.stream_id.as_str()
    }

    /// kind controls if this TrackLocal is audio or video
    fn kind(&self) -> RTPCodecType {
        if self.codec.mime_type.starts_with("audio/") {
            RTPCodecType::Audio
        } else if self.codec.mime_type.starts_with("video/") {
            RTPCodecType::Video
        } else {
            RTPCodecType::Unspecified
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl TrackLocalWriter for TrackLocalStaticRTP {
    /// write_rtp_with_attributes writes a RTP Packet to every binding of the
    /// track. A failing binding does not stop the others; the errors are
    /// joined into the result.
    async fn write_rtp_with_attributes(
        &self,
        pkt: &rtp::packet::Packet,
        attr: &Attributes,
    ) -> Result<usize> {
        let bindings = {
            let bindings = self.bindings.lock().await;
            bindings.clone()
        };

        let mut n = 0;
        let mut write_errs = vec![];
        for b in bindings {
            match self.write_rtp_to_binding(pkt, attr, &b).await {
                Ok(written) => n += written,
                Err(err) => write_errs.push(err),
            }
        }

        flatten_errs(write_errs)?;
        Ok(n)
    }
}
