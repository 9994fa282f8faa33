use bytes::Bytes;
use rtp::header::Header;
use rtp::packet::Packet;

use super::track_local_static_rtp::*;
use super::*;
use crate::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use crate::api::APIBuilder;
use crate::ice_transport::ice_connection_state::RTCIceConnectionState;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::peer_connection_test::*;

fn vp8_codec() -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        payload_type: 96,
    }
}

fn context(
    id: &str,
    codecs: Vec<RTCRtpCodecParameters>,
    writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
    paused: bool,
) -> TrackLocalContext {
    let paused = Arc::new(AtomicBool::new(paused));
    TrackLocalContext {
        id: id.to_owned(),
        params: RTCRtpParameters {
            header_extensions: vec![RTCRtpHeaderExtensionParameters {
                uri: ::sdp::extmap::SDES_MID_URI.to_owned(),
                id: 3,
            }],
            codecs,
        },
        ssrc: 5000,
        write_stream: Some(Arc::new(InterceptorToTrackLocalWriter::new(
            writer,
            Arc::clone(&paused),
        ))),
        paused,
        mid: Some(SmolStr::from("0")),
    }
}

fn packet() -> Packet {
    Packet {
        header: Header {
            version: 2,
            sequence_number: 7,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0xaa, 0xbb]),
    }
}

#[tokio::test]
async fn test_track_local_static_bind_unbind() -> Result<()> {
    let track = TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: "video/vp8".to_owned(),
            ..Default::default()
        },
        "video".to_owned(),
        "webrtc-rs".to_owned(),
    );
    assert_eq!(RTPCodecType::Video, track.kind());

    let ctx = context("sender-a", vec![vp8_codec()], None, false);
    let codec = track.bind(&ctx).await?;
    assert_eq!(96, codec.payload_type);
    assert_eq!(vec![5000], track.bindings_ssrc().await);
    assert!(!track.any_binding_paused().await);

    track.unbind(&ctx).await?;
    assert!(track.bindings_ssrc().await.is_empty());
    assert_eq!(Err(Error::ErrUnbindFailed), track.unbind(&ctx).await);

    Ok(())
}

// A track whose codec the remote does not support cannot be bound
#[tokio::test]
async fn test_track_local_static_no_codec_intersection() -> Result<()> {
    let track = TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        "audio".to_owned(),
        "webrtc-rs".to_owned(),
    );

    let ctx = context("sender-a", vec![vp8_codec()], None, false);
    assert_eq!(Err(Error::ErrUnsupportedCodec), track.bind(&ctx).await.map(|_| ()));
    assert!(track.bindings_ssrc().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_track_local_static_write_rewrites_header() -> Result<()> {
    let writer = Arc::new(CaptureWriter::default());
    let track = TrackLocalStaticRTP::new(
        vp8_codec().capability,
        "video".to_owned(),
        "webrtc-rs".to_owned(),
    );

    let ctx = context(
        "sender-a",
        vec![vp8_codec()],
        Some(Arc::clone(&writer) as Arc<dyn RTPWriter + Send + Sync>),
        false,
    );
    track.bind(&ctx).await?;

    let n = track.write_rtp(&packet()).await?;
    assert_eq!(2, n);

    let packets = writer.packets.lock().await;
    assert_eq!(1, packets.len());
    assert_eq!(5000, packets[0].header.ssrc);
    assert_eq!(96, packets[0].header.payload_type);
    assert_eq!(7, packets[0].header.sequence_number);
    assert_eq!(
        Some(Bytes::from_static(b"0")),
        packets[0].header.get_extension(3)
    );

    Ok(())
}

#[tokio::test]
async fn test_track_local_static_paused_binding_drops() -> Result<()> {
    let writer = Arc::new(CaptureWriter::default());
    let track = TrackLocalStaticRTP::new(
        vp8_codec().capability,
        "video".to_owned(),
        "webrtc-rs".to_owned(),
    );

    let ctx = context(
        "sender-a",
        vec![vp8_codec()],
        Some(Arc::clone(&writer) as Arc<dyn RTPWriter + Send + Sync>),
        true,
    );
    track.bind(&ctx).await?;
    assert!(track.any_binding_paused().await);

    assert_eq!(0, track.write_rtp(&packet()).await?);
    assert!(writer.packets.lock().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_track_local_static_without_transport() -> Result<()> {
    let track = TrackLocalStaticRTP::new(
        vp8_codec().capability,
        "video".to_owned(),
        "webrtc-rs".to_owned(),
    );
    let ctx = context("sender-a", vec![vp8_codec()], None, false);
    track.bind(&ctx).await?;

    assert!(track.write_rtp(&packet()).await.is_err());

    Ok(())
}

// Packets written to a track reach the transport once negotiation started its sender
#[tokio::test]
async fn test_track_local_static_write_after_negotiation() -> Result<()> {
    let writer = Arc::new(CaptureWriter::default());
    let api = APIBuilder::new()
        .with_media_engine(media_engine()?)
        .with_rtp_writer(Arc::clone(&writer) as Arc<dyn RTPWriter + Send + Sync>)
        .build();
    let offerer = api.new_peer_connection(RTCConfiguration::default()).await?;
    let answerer = new_pc().await?;

    let track = video_track("video");
    let sender = offerer.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await?;

    // nothing is bound before negotiation
    assert_eq!(0, track.write_rtp(&packet()).await?);

    signal_pair(&offerer, &answerer).await?;
    offerer
        .update_ice_connection_state(RTCIceConnectionState::Connected)
        .await;
    offerer.senders_started().await?;

    assert_eq!(vec![sender.ssrc()], track.bindings_ssrc().await);
    track.write_rtp(&packet()).await?;
    {
        let packets = writer.packets.lock().await;
        assert_eq!(1, packets.len());
        assert_eq!(sender.ssrc(), packets[0].header.ssrc);
        assert_eq!(96, packets[0].header.payload_type);
    }

    // removing the track unbinds it
    offerer.remove_track(&sender).await?;
    assert!(track.bindings_ssrc().await.is_empty());

    offerer.close().await?;
    answerer.close().await?;

    Ok(())
}
