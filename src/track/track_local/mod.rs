#[cfg(test)]
mod track_local_static_test;

pub mod track_local_static_rtp;

use std::any::Any;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use interceptor::{Attributes, RTPWriter};
use portable_atomic::AtomicBool;
use smol_str::SmolStr;
use util::Unmarshal;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::*;
use crate::rtp_transceiver::*;

/// Sink for the packets a bound local track produces.
#[async_trait]
pub trait TrackLocalWriter: fmt::Debug {
    /// Attributes travel with the packet to the RTP writer.
    async fn write_rtp_with_attributes(
        &self,
        pkt: &rtp::packet::Packet,
        attr: &Attributes,
    ) -> Result<usize>;

    async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize> {
        let attr = Attributes::new();
        self.write_rtp_with_attributes(pkt, &attr).await
    }

    /// Unmarshals `b` as one RTP packet before writing it.
    async fn write(&self, mut b: &[u8]) -> Result<usize> {
        let pkt = rtp::packet::Packet::unmarshal(&mut b)?;
        let attr = Attributes::new();
        self.write_rtp_with_attributes(&pkt, &attr).await
    }
}

/// What a sender hands to its track on bind and unbind: the negotiated
/// parameters, the SSRC and where packets go.
#[derive(Default, Debug, Clone)]
pub struct TrackLocalContext {
    pub(crate) id: String,
    pub(crate) params: RTCRtpParameters,
    pub(crate) ssrc: SSRC,
    pub(crate) write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
    pub(crate) paused: Arc<AtomicBool>,
    pub(crate) mid: Option<SmolStr>,
}

impl TrackLocalContext {
    /// Codecs both sides agreed on for this media section.
    pub fn codec_parameters(&self) -> &[RTCRtpCodecParameters] {
        &self.params.codecs
    }

    pub fn header_extensions(&self) -> &[RTCRtpHeaderExtensionParameters] {
        &self.params.header_extensions
    }

    pub fn ssrc(&self) -> SSRC {
        self.ssrc
    }

    pub fn write_stream(&self) -> Option<Arc<dyn TrackLocalWriter + Send + Sync>> {
        self.write_stream.clone()
    }

    /// Sender id, stable across bind and unbind.
    pub fn id(&self) -> String {
        self.id.clone()
    }

    pub fn mid(&self) -> Option<&SmolStr> {
        self.mid.as_ref()
    }
}

/// Outbound media source attached to a sender. `TrackLocalStaticRTP`
/// covers the common case of forwarding ready-made RTP.
#[async_trait]
pub trait TrackLocal {
    /// Called when the owning sender starts. Returns the codec the track
    /// will produce, or `ErrUnsupportedCodec` if none of the negotiated
    /// codecs fit.
    async fn bind(&self, t: &TrackLocalContext) -> Result<RTCRtpCodecParameters>;

    /// Called when the sender pauses, stops or swaps the track out.
    async fn unbind(&self, t: &TrackLocalContext) -> Result<()>;

    /// Track id, unique within its stream.
    fn id(&self) -> &str;

    fn rid(&self) -> Option<&str>;

    /// Goes into the `msid` attribute together with `id`.
    fn stream_id(&self) -> &str;

    fn kind(&self) -> RTPCodecType;

    fn as_any(&self) -> &dyn Any;
}

/// One bind of a track to a sender. A track bound to several senders
/// fans each packet out to every binding.
#[derive(Default, Debug)]
pub(crate) struct TrackBinding {
    id: String,
    ssrc: SSRC,
    payload_type: PayloadType,
    write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
    sender_paused: Arc<AtomicBool>,
    hdr_ext_ids: Vec<rtp::header::Extension>,
}

impl TrackBinding {
    pub fn is_sender_paused(&self) -> bool {
        self.sender_paused.load(Ordering::SeqCst)
    }
}

/// InterceptorToTrackLocalWriter hands packets written to a bound track to
/// the outbound RTP writer configured on the API.
pub(crate) struct InterceptorToTrackLocalWriter {
    interceptor_rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
    sender_paused: Arc<AtomicBool>,
}

impl InterceptorToTrackLocalWriter {
    pub(crate) fn new(
        interceptor_rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
        paused: Arc<AtomicBool>,
    ) -> Self {
        InterceptorToTrackLocalWriter {
            interceptor_rtp_writer,
            sender_paused: paused,
        }
    }

    fn is_sender_paused(&self) -> bool {
        self.sender_paused.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for InterceptorToTrackLocalWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorToTrackLocalWriter")
            .field("sender_paused", &self.sender_paused)
            .finish()
    }
}

#[async_trait]
impl TrackLocalWriter for InterceptorToTrackLocalWriter {
    async fn write_rtp_with_attributes(
        &self,
        pkt: &rtp::packet::Packet,
        attr: &Attributes,
    ) -> Result<usize> {
        if self.is_sender_paused() {
            return Ok(0);
        }

        match &self.interceptor_rtp_writer {
            Some(writer) => Ok(writer.write(pkt, attr).await?),
            None => Err(Error::ErrRTPSenderNoTransport),
        }
    }
}
