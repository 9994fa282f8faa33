use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use interceptor::Attributes;
use portable_atomic::{AtomicU32, AtomicU8};
use smol_str::SmolStr;
use util::sync::Mutex as SyncMutex;
use util::Marshal;

use crate::api::media_engine::NegotiatedMedia;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTCRtpParameters, RTPCodecType};
use crate::rtp_transceiver::{PayloadType, SSRC};
use crate::track::packet_queue::PacketQueue;

lazy_static! {
    static ref TRACK_REMOTE_UNIQUE_ID: AtomicUsize = AtomicUsize::new(0);
}

/// TrackRemote represents a single inbound source of media
pub struct TrackRemote {
    tid: usize,

    id: SyncMutex<String>,
    stream_id: SyncMutex<String>,

    receive_mtu: usize,
    payload_type: AtomicU8, //PayloadType,
    kind: AtomicU8,         //RTPCodecType,
    ssrc: AtomicU32,        //SSRC,
    rtx_ssrc: AtomicU32,    //SSRC, 0 while unknown
    codec: SyncMutex<RTCRtpCodecParameters>,
    params: SyncMutex<RTCRtpParameters>,
    rid: SmolStr,

    media: Arc<NegotiatedMedia>,
    queue: PacketQueue<(rtp::packet::Packet, Attributes)>,
}

impl std::fmt::Debug for TrackRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackRemote")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("payload_type", &self.payload_type)
            .field("kind", &self.kind)
            .field("ssrc", &self.ssrc)
            .field("rtx_ssrc", &self.rtx_ssrc)
            .field("codec", &self.codec)
            .field("rid", &self.rid)
            .finish()
    }
}

impl TrackRemote {
    pub(crate) fn new(
        receive_mtu: usize,
        queue_capacity: usize,
        kind: RTPCodecType,
        ssrc: SSRC,
        rid: SmolStr,
        media: Arc<NegotiatedMedia>,
    ) -> Self {
        TrackRemote {
            tid: TRACK_REMOTE_UNIQUE_ID.fetch_add(1, Ordering::SeqCst),
            id: Default::default(),
            stream_id: Default::default(),
            receive_mtu,
            payload_type: Default::default(),
            kind: AtomicU8::new(kind as u8),
            ssrc: AtomicU32::new(ssrc),
            rtx_ssrc: AtomicU32::new(0),
            codec: Default::default(),
            params: Default::default(),
            rid,
            media,
            queue: PacketQueue::new(queue_capacity),
        }
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    /// id is the unique identifier for this Track. This should be unique for the
    /// stream, but doesn't have to globally unique. A common example would be 'audio' or 'video'
    /// and StreamID would be 'desktop' or 'webcam'
    pub fn id(&self) -> String {
        let id = self.id.lock();
        id.clone()
    }

    pub(crate) fn set_id(&self, s: String) {
        let mut id = self.id.lock();
        *id = s;
    }

    /// stream_id is the group this track belongs too. This must be unique
    pub fn stream_id(&self) -> String {
        let stream_id = self.stream_id.lock();
        stream_id.clone()
    }

    pub(crate) fn set_stream_id(&self, s: String) {
        let mut stream_id = self.stream_id.lock();
        *stream_id = s;
    }

    /// rid gets the RTP Stream ID of this Track
    /// With Simulcast you will have multiple tracks with the same ID, but different RID values.
    /// In many cases a TrackRemote will not have an RID, so it is important to assert it is non-zero
    pub fn rid(&self) -> &str {
        self.rid.as_str()
    }

    /// payload_type gets the PayloadType of the track
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type.load(Ordering::SeqCst)
    }

    /// kind gets the Kind of the track
    pub fn kind(&self) -> RTPCodecType {
        self.kind.load(Ordering::SeqCst).into()
    }

    /// ssrc gets the SSRC of the track
    pub fn ssrc(&self) -> SSRC {
        self.ssrc.load(Ordering::SeqCst)
    }

    /// rtx_ssrc is the SSRC retransmissions for this track arrive on, if
    /// one has been seen or declared.
    pub fn rtx_ssrc(&self) -> Option<SSRC> {
        match self.rtx_ssrc.load(Ordering::SeqCst) {
            0 => None,
            ssrc => Some(ssrc),
        }
    }

    pub(crate) fn set_rtx_ssrc(&self, ssrc: SSRC) {
        self.rtx_ssrc.store(ssrc, Ordering::SeqCst);
    }

    /// msid gets the Msid of the track
    pub fn msid(&self) -> String {
        format!("{} {}", self.stream_id(), self.id())
    }

    /// codec gets the Codec of the track
    pub fn codec(&self) -> RTCRtpCodecParameters {
        let codec = self.codec.lock();
        codec.clone()
    }

    pub fn params(&self) -> RTCRtpParameters {
        let p = self.params.lock();
        p.clone()
    }

    /// read_rtp returns the next packet routed to this track, in arrival
    /// order. Fails with `ErrClosedPipe` once the connection is closed and
    /// the buffer is drained.
    pub async fn read_rtp(&self) -> Result<(rtp::packet::Packet, Attributes)> {
        self.queue.pop().await
    }

    /// read copies the next packet, marshaled, into `b`.
    pub async fn read(&self, b: &mut [u8]) -> Result<(usize, Attributes)> {
        let (pkt, attributes) = self.read_rtp().await?;
        let data = pkt.marshal()?;
        if data.len() > b.len() || data.len() > self.receive_mtu {
            return Err(Error::ErrShortBuffer);
        }
        b[..data.len()].copy_from_slice(&data);
        Ok((data.len(), attributes))
    }

    /// deliver queues a routed packet for the reader. Returns `true` when the
    /// oldest buffered packet had to be dropped.
    pub(crate) fn deliver(&self, pkt: rtp::packet::Packet, attributes: Attributes) -> bool {
        if let Err(err) = self.check_and_update_track(&pkt) {
            log::debug!("track {}: {}", self.tid, err);
        }
        self.queue.push((pkt, attributes))
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }

    pub(crate) fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// check_and_update_track checks payloadType for every incoming packet
    /// once a different payloadType is detected the track will be updated.
    /// Retransmission payload types never replace the media codec.
    pub(crate) fn check_and_update_track(&self, pkt: &rtp::packet::Packet) -> Result<()> {
        let payload_type = pkt.header.payload_type;
        if payload_type == self.payload_type() && !self.codec.lock().capability.mime_type.is_empty()
        {
            return Ok(());
        }

        let p = self.media.get_rtp_parameters_by_payload_type(payload_type)?;
        let codec = match p.codecs.first() {
            Some(codec) => codec.clone(),
            None => return Err(Error::ErrCodecNotFound),
        };
        if codec.capability.is_rtx() {
            return Ok(());
        }

        self.payload_type.store(payload_type, Ordering::SeqCst);
        {
            let mut c = self.codec.lock();
            *c = codec;
        }
        {
            let mut params = self.params.lock();
            *params = p;
        }

        Ok(())
    }
}
