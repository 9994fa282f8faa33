
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ice::rand::generate_crypto_random_string;
use interceptor::{Attributes, RTPWriter};
use portable_atomic::{AtomicBool, AtomicU8};
use smol_str::SmolStr;
use tokio::sync::Mutex;

use crate::api::media_engine::NegotiatedMedia;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{
    PayloadType, RTCRtpEncodingParameters, RTCRtpRtxParameters, RTCRtpSendParameters, SSRC,
};
use crate::track::packet_queue::PacketQueue;
use crate::track::track_local::{
    InterceptorToTrackLocalWriter, TrackLocal, TrackLocalContext, TrackLocalWriter,
};

pub(crate) type RTCPPackets = Vec<Box<dyn rtcp::packet::Packet + Send + Sync>>;

/// RTPSender allows an application to control how a given Track is encoded and transmitted to a remote peer
pub struct RTCRtpSender {
    pub(crate) id: String,
    kind: RTPCodecType,

    track: Mutex<Option<Arc<dyn TrackLocal + Send + Sync>>>,
    context: Mutex<TrackLocalContext>,

    encodings: Vec<RTCRtpEncodingParameters>,
    payload_type: AtomicU8,

    media: Arc<NegotiatedMedia>,
    rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,

    started: AtomicBool,
    stopped: AtomicBool,
    pub(crate) paused: Arc<AtomicBool>,

    rtcp: PacketQueue<(RTCPPackets, Attributes)>,
}

impl std::fmt::Debug for RTCRtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCRtpSender")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("encodings", &self.encodings)
            .finish()
    }
}

impl RTCRtpSender {
    /// new creates a sender with one encoding per rid (a single unnamed
    /// encoding when `rids` is empty). Every encoding gets a random SSRC, and
    /// a random RTX SSRC as well when the codec table has a retransmission
    /// codec for `kind`.
    pub(crate) fn new(
        kind: RTPCodecType,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
        rids: &[SmolStr],
        media: Arc<NegotiatedMedia>,
        rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
        rtcp_queue_capacity: usize,
    ) -> Self {
        let id = generate_crypto_random_string(
            32,
            b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
        );

        let with_rtx = media
            .get_codecs_by_kind(kind)
            .iter()
            .any(|c| c.capability.is_rtx());
        let new_encoding = |rid: SmolStr| RTCRtpEncodingParameters {
            rid,
            ssrc: rand::random::<u32>(),
            payload_type: 0,
            rtx: RTCRtpRtxParameters {
                ssrc: if with_rtx { rand::random::<u32>() } else { 0 },
            },
        };
        let encodings = if rids.is_empty() {
            vec![new_encoding(SmolStr::default())]
        } else {
            rids.iter().cloned().map(new_encoding).collect()
        };

        RTCRtpSender {
            id,
            kind,

            track: Mutex::new(track),
            context: Mutex::new(TrackLocalContext::default()),

            encodings,
            payload_type: AtomicU8::new(0),

            media,
            rtp_writer,

            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            paused: Arc::new(AtomicBool::new(true)),

            rtcp: PacketQueue::new(rtcp_queue_capacity),
        }
    }

    /// kind is the media kind of the transceiver this sender belongs to.
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// encodings lists the sender's streams. More than one means simulcast.
    pub fn encodings(&self) -> &[RTCRtpEncodingParameters] {
        &self.encodings
    }

    /// ssrc of the first encoding.
    pub fn ssrc(&self) -> SSRC {
        self.encodings.first().map(|e| e.ssrc).unwrap_or_default()
    }

    /// payload_type is the payload type bound at start, 0 before.
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type.load(Ordering::SeqCst)
    }

    pub(crate) fn has_ssrc(&self, ssrc: SSRC) -> bool {
        self.encodings
            .iter()
            .any(|e| e.ssrc == ssrc || (e.rtx.ssrc != 0 && e.rtx.ssrc == ssrc))
    }

    /// is_started reports whether negotiation activated this sender.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// is_stopped reports whether the sender was stopped for good.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// get_parameters describes the current configuration for the encoding and
    /// transmission of media on the sender's track.
    pub async fn get_parameters(&self) -> RTCRtpSendParameters {
        let payload_type = self.payload_type();
        RTCRtpSendParameters {
            rtp_parameters: self
                .media
                .get_rtp_parameters_by_kind(self.kind, RTCRtpTransceiverDirection::Sendonly),
            encodings: self
                .encodings
                .iter()
                .map(|e| RTCRtpEncodingParameters {
                    payload_type,
                    ..e.clone()
                })
                .collect(),
        }
    }

    /// track returns the RTCRtpTransceiver track, or nil
    pub async fn track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        let track = self.track.lock().await;
        track.clone()
    }

    /// replace_track replaces the track currently being used as the sender's source with a new TrackLocal.
    /// The new track must be of the same media kind (audio, video, etc) and switching the track should not
    /// require negotiation.
    pub async fn replace_track(
        &self,
        track: Option<Arc<dyn TrackLocal + Send + Sync>>,
    ) -> Result<()> {
        if let Some(t) = &track {
            if t.kind() != self.kind {
                return Err(Error::ErrRTPSenderNewTrackHasIncorrectKind);
            }
        }

        let mut current = self.track.lock().await;
        if !self.is_started() {
            *current = track;
            return Ok(());
        }

        let context = {
            let context = self.context.lock().await;
            context.clone()
        };
        if let Some(t) = &*current {
            t.unbind(&context).await?;
        }

        let result = match &track {
            Some(t) => {
                let new_context = TrackLocalContext {
                    params: self
                        .media
                        .get_rtp_parameters_by_kind(self.kind, RTCRtpTransceiverDirection::Sendonly),
                    ..context.clone()
                };
                t.bind(&new_context).await.map(Some)
            }
            None => Ok(None),
        };

        match result {
            Err(err) => {
                // Re-bind the original track
                if let Some(t) = &*current {
                    t.bind(&context).await?;
                }
                Err(err)
            }
            Ok(codec) => {
                if let Some(codec) = codec {
                    // Codec has changed
                    if self.payload_type() != codec.payload_type {
                        self.payload_type.store(codec.payload_type, Ordering::SeqCst);
                        let mut ctx = self.context.lock().await;
                        ctx.params.codecs = vec![codec];
                    }
                }
                *current = track;
                Ok(())
            }
        }
    }

    /// start binds the track to the negotiated codecs of section `mid` and
    /// lets media through. Returns `false` when there was nothing to do:
    /// the sender already runs, or it was stopped by the user.
    pub(crate) async fn start(&self, mid: &SmolStr) -> Result<bool> {
        if self.is_stopped() || self.is_started() {
            return Ok(false);
        }

        let write_stream = Arc::new(InterceptorToTrackLocalWriter::new(
            self.rtp_writer.clone(),
            Arc::clone(&self.paused),
        ));
        let mut context = TrackLocalContext {
            id: self.id.clone(),
            params: self
                .media
                .get_rtp_parameters_by_kind(self.kind, RTCRtpTransceiverDirection::Sendonly),
            ssrc: self.ssrc(),
            write_stream: Some(write_stream as Arc<dyn TrackLocalWriter + Send + Sync>),
            paused: Arc::clone(&self.paused),
            mid: Some(mid.clone()),
        };

        {
            let track = self.track.lock().await;
            if let Some(t) = &*track {
                let codec = t.bind(&context).await?;
                self.payload_type.store(codec.payload_type, Ordering::SeqCst);
                context.params.codecs = vec![codec];
            } else if let Some(codec) = context.params.codecs.first() {
                self.payload_type.store(codec.payload_type, Ordering::SeqCst);
            }
        }

        {
            let mut ctx = self.context.lock().await;
            *ctx = context;
        }

        self.paused.store(false, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        Ok(true)
    }

    /// stop_sending takes a started sender off the wire because its section
    /// went inactive. Unlike stop, a later negotiation may start it again.
    pub(crate) async fn stop_sending(&self) -> Result<bool> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        self.paused.store(true, Ordering::SeqCst);

        let track = self.track().await;
        if let Some(t) = track {
            let context = self.context.lock().await;
            t.unbind(&context).await?;
        }
        Ok(true)
    }

    /// stop irreversibly stops the RTPSender
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.rtcp.close();
        self.stop_sending().await?;
        Ok(())
    }

    /// write_rtp sends a packet on the first encoding, rewriting its SSRC and
    /// payload type to the negotiated ones.
    pub async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize> {
        let ssrc = self.ssrc();
        self.write_rtp_with_ssrc(ssrc, pkt).await
    }

    /// write_rtp_for_rid sends a packet on the simulcast encoding `rid`.
    pub async fn write_rtp_for_rid(&self, rid: &str, pkt: &rtp::packet::Packet) -> Result<usize> {
        let ssrc = match self.encodings.iter().find(|e| e.rid == rid) {
            Some(e) => e.ssrc,
            None => return Err(Error::ErrRTPSenderNoEncoding(rid.to_owned())),
        };
        self.write_rtp_with_ssrc(ssrc, pkt).await
    }

    async fn write_rtp_with_ssrc(&self, ssrc: SSRC, pkt: &rtp::packet::Packet) -> Result<usize> {
        if self.is_stopped() {
            return Err(Error::ErrRTPSenderStopped);
        }
        if !self.is_started() {
            return Err(Error::ErrRTPSenderNotStarted);
        }
        let writer = match &self.rtp_writer {
            Some(writer) => writer,
            None => return Err(Error::ErrRTPSenderNoTransport),
        };

        let mut pkt = pkt.clone();
        pkt.header.ssrc = ssrc;
        pkt.header.payload_type = self.payload_type();
        Ok(writer.write(&pkt, &Attributes::new()).await?)
    }

    /// read_rtcp returns the next batch of RTCP addressed to this sender's
    /// streams.
    pub async fn read_rtcp(&self) -> Result<(RTCPPackets, Attributes)> {
        self.rtcp.pop().await
    }

    /// deliver_rtcp queues feedback routed to this sender. Returns `true`
    /// when the oldest batch was dropped.
    pub(crate) fn deliver_rtcp(&self, pkts: RTCPPackets) -> bool {
        self.rtcp.push((pkts, Attributes::new()))
    }
}
