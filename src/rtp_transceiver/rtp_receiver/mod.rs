
use std::sync::atomic::Ordering;
use std::sync::Arc;

use interceptor::Attributes;
use portable_atomic::AtomicBool;
use smol_str::SmolStr;
use util::sync::Mutex as SyncMutex;

use crate::api::media_engine::NegotiatedMedia;
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_sender::RTCPPackets;
use crate::rtp_transceiver::{RTCRtpDecodingParameters, RTCRtpReceiveParameters, RTCRtpRtxParameters, SSRC};
use crate::track::packet_queue::PacketQueue;
use crate::track::track_remote::TrackRemote;

/// RTPReceiver allows an application to inspect the receipt of a TrackRemote
pub struct RTCRtpReceiver {
    kind: RTPCodecType,
    receive_mtu: usize,
    queue_capacity: usize,

    tracks: SyncMutex<Vec<Arc<TrackRemote>>>,
    stopped: AtomicBool,

    media: Arc<NegotiatedMedia>,
    rtcp: PacketQueue<(RTCPPackets, Attributes)>,
}

impl std::fmt::Debug for RTCRtpReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCRtpReceiver")
            .field("kind", &self.kind)
            .field("tracks", &self.tracks)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl RTCRtpReceiver {
    pub(crate) fn new(
        kind: RTPCodecType,
        receive_mtu: usize,
        queue_capacity: usize,
        media: Arc<NegotiatedMedia>,
    ) -> Self {
        RTCRtpReceiver {
            kind,
            receive_mtu,
            queue_capacity,

            tracks: SyncMutex::new(vec![]),
            stopped: AtomicBool::new(false),

            media,
            rtcp: PacketQueue::new(queue_capacity),
        }
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// get_parameters describes the current configuration for the encoding and
    /// transmission of media on the receiver's track.
    pub fn get_parameters(&self) -> RTCRtpReceiveParameters {
        let tracks = self.tracks.lock();
        RTCRtpReceiveParameters {
            encodings: tracks
                .iter()
                .map(|t| RTCRtpDecodingParameters {
                    rid: SmolStr::from(t.rid()),
                    ssrc: t.ssrc(),
                    payload_type: t.payload_type(),
                    rtx: RTCRtpRtxParameters {
                        ssrc: t.rtx_ssrc().unwrap_or_default(),
                    },
                })
                .collect(),
        }
    }

    /// track returns the RtpTransceiver TrackRemote
    pub fn track(&self) -> Option<Arc<TrackRemote>> {
        let tracks = self.tracks.lock();
        tracks.first().cloned()
    }

    /// tracks returns the RtpTransceiver tracks
    /// A RTPReceiver to support Simulcast may now have multiple tracks
    pub fn tracks(&self) -> Vec<Arc<TrackRemote>> {
        let tracks = self.tracks.lock();
        tracks.clone()
    }

    /// track_by_rid returns the track carrying simulcast layer `rid`.
    pub fn track_by_rid(&self, rid: &str) -> Option<Arc<TrackRemote>> {
        let tracks = self.tracks.lock();
        tracks.iter().find(|t| t.rid() == rid).cloned()
    }

    /// track_by_ssrc matches both the media and the retransmission SSRC.
    pub(crate) fn track_by_ssrc(&self, ssrc: SSRC) -> Option<Arc<TrackRemote>> {
        let tracks = self.tracks.lock();
        tracks
            .iter()
            .find(|t| t.ssrc() == ssrc || t.rtx_ssrc() == Some(ssrc))
            .cloned()
    }

    /// have_received reports whether any stream was ever bound here.
    pub fn have_received(&self) -> bool {
        !self.tracks.lock().is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// add_track binds a resolved `(ssrc, rid)` to this receiver. An SSRC or
    /// a non-empty rid may carry one track only. Several tracks without a rid
    /// share a receiver when one section declares more than one stream.
    /// A stopped receiver accepts none.
    pub(crate) fn add_track(&self, ssrc: SSRC, rid: SmolStr) -> Result<Arc<TrackRemote>> {
        if self.is_stopped() {
            return Err(Error::ErrRTPReceiverStopped);
        }

        let mut tracks = self.tracks.lock();
        if tracks
            .iter()
            .any(|t| t.ssrc() == ssrc || t.rtx_ssrc() == Some(ssrc))
        {
            return Err(Error::ErrRTPReceiverDuplicateSsrc(ssrc));
        }
        if !rid.is_empty() && tracks.iter().any(|t| t.rid() == rid.as_str()) {
            return Err(Error::ErrRTPReceiverDuplicateRid(rid.to_string()));
        }

        let track = Arc::new(TrackRemote::new(
            self.receive_mtu,
            self.queue_capacity,
            self.kind,
            ssrc,
            rid,
            Arc::clone(&self.media),
        ));
        tracks.push(Arc::clone(&track));
        Ok(track)
    }

    /// stop irreversibly stops the RTPReceiver. Readers drain what was
    /// already routed and then see `ErrClosedPipe`.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for track in self.tracks() {
            track.close();
        }
        self.rtcp.close();
        Ok(())
    }

    /// read_rtcp returns the next batch of RTCP whose media source is one of
    /// this receiver's streams.
    pub async fn read_rtcp(&self) -> Result<(RTCPPackets, Attributes)> {
        self.rtcp.pop().await
    }

    pub(crate) fn deliver_rtcp(&self, pkts: RTCPPackets) -> bool {
        self.rtcp.push((pkts, Attributes::new()))
    }
}
