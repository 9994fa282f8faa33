use super::*;
use crate::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_PCMU, MIME_TYPE_VP8};
use crate::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

fn media() -> Result<Arc<NegotiatedMedia>> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    Ok(Arc::new(NegotiatedMedia::new(Arc::new(m))))
}

fn transceiver(
    media: &Arc<NegotiatedMedia>,
    kind: RTPCodecType,
    direction: RTCRtpTransceiverDirection,
    with_sender: bool,
) -> Arc<RTCRtpTransceiver> {
    let receiver = Arc::new(RTCRtpReceiver::new(kind, 1460, 8, Arc::clone(media)));
    let sender = if with_sender {
        Some(Arc::new(RTCRtpSender::new(
            kind,
            None,
            &[],
            Arc::clone(media),
            None,
            8,
        )))
    } else {
        None
    };
    RTCRtpTransceiver::new(receiver, sender, direction, kind, vec![], Arc::clone(media))
}

fn codec(mime_type: &str, clock_rate: u32, payload_type: PayloadType) -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: mime_type.to_owned(),
            clock_rate,
            ..Default::default()
        },
        payload_type,
    }
}

#[tokio::test]
async fn test_rtp_transceiver_set_codec_preferences() -> Result<()> {
    let media = media()?;
    let tr = transceiver(
        &media,
        RTPCodecType::Audio,
        RTCRtpTransceiverDirection::Sendrecv,
        false,
    );

    assert_eq!(4, tr.get_codecs().await.len());

    tr.set_codec_preferences(vec![codec(MIME_TYPE_PCMU, 8000, 0)])
        .await?;
    let codecs = tr.get_codecs().await;
    assert_eq!(1, codecs.len());
    assert_eq!(0, codecs[0].payload_type);

    // a video codec on an audio transceiver is refused and nothing changes
    assert_eq!(
        Err(Error::ErrRTPTransceiverCodecUnsupported),
        tr.set_codec_preferences(vec![codec(MIME_TYPE_VP8, 90000, 96)])
            .await
    );
    assert_eq!(1, tr.get_codecs().await.len());

    // an empty list restores the codec table
    tr.set_codec_preferences(vec![]).await?;
    let codecs = tr.get_codecs().await;
    assert_eq!(4, codecs.len());
    assert_eq!(MIME_TYPE_OPUS, codecs[0].capability.mime_type);

    Ok(())
}

#[test]
fn test_rtp_transceiver_set_mid() -> Result<()> {
    let media = media()?;
    let tr = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        false,
    );
    assert!(tr.mid().is_none());

    tr.set_mid(SmolStr::from("0"))?;
    tr.set_mid(SmolStr::from("0"))?;
    assert_eq!(
        Err(Error::ErrRTPTransceiverCannotChangeMid),
        tr.set_mid(SmolStr::from("1"))
    );
    assert_eq!(Some(SmolStr::from("0")), tr.mid());

    Ok(())
}

#[test]
fn test_rtp_transceiver_directions() -> Result<()> {
    let media = media()?;
    let tr = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        false,
    );

    assert_eq!(RTCRtpTransceiverDirection::Unspecified, tr.current_direction());
    assert!(!tr.set_direction_internal(RTCRtpTransceiverDirection::Sendrecv));
    assert!(tr.set_direction_internal(RTCRtpTransceiverDirection::Recvonly));
    assert_eq!(RTCRtpTransceiverDirection::Recvonly, tr.direction());

    tr.set_current_direction(RTCRtpTransceiverDirection::Recvonly);
    assert_eq!(RTCRtpTransceiverDirection::Recvonly, tr.current_direction());

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_stop() -> Result<()> {
    let media = media()?;
    let tr = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        true,
    );
    tr.set_mid(SmolStr::from("0"))?;
    tr.set_current_direction(RTCRtpTransceiverDirection::Sendrecv);

    tr.stop().await?;
    assert!(tr.is_stopped());
    assert_eq!(RTCRtpTransceiverDirection::Inactive, tr.direction());
    assert_eq!(RTCRtpTransceiverDirection::Unspecified, tr.current_direction());
    assert!(tr.receiver().await.is_stopped());
    assert!(tr.sender().await.map(|s| s.is_stopped()).unwrap_or(false));
    // the slot keeps its mid
    assert_eq!(Some(SmolStr::from("0")), tr.mid());

    tr.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_accepts_track() -> Result<()> {
    let media = media()?;

    let recvonly = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Recvonly,
        false,
    );
    assert!(recvonly.accepts_track(RTPCodecType::Video).await);
    assert!(!recvonly.accepts_track(RTPCodecType::Audio).await);

    let sendrecv = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        false,
    );
    assert!(!sendrecv.accepts_track(RTPCodecType::Video).await);

    let with_sender = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Inactive,
        true,
    );
    assert!(!with_sender.accepts_track(RTPCodecType::Video).await);

    let inactive = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Inactive,
        false,
    );
    assert!(inactive.accepts_track(RTPCodecType::Video).await);
    inactive.stop().await?;
    assert!(!inactive.accepts_track(RTPCodecType::Video).await);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_lookups() -> Result<()> {
    let media = media()?;
    let audio = transceiver(
        &media,
        RTPCodecType::Audio,
        RTCRtpTransceiverDirection::Sendrecv,
        false,
    );
    let video_recv = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Recvonly,
        false,
    );
    let video_send = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendonly,
        false,
    );
    let bound = transceiver(
        &media,
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        false,
    );
    bound.set_mid(SmolStr::from("5"))?;

    let all = vec![
        Arc::clone(&audio),
        Arc::clone(&video_recv),
        Arc::clone(&video_send),
        Arc::clone(&bound),
    ];

    let mut list = all.clone();
    let found = find_by_mid("5", &mut list);
    assert!(found.map(|t| Arc::ptr_eq(&t, &bound)).unwrap_or(false));
    assert_eq!(3, list.len());
    assert!(find_by_mid("9", &mut list).is_none());

    // a remote sender pairs with a local receiver
    let mut list = all.clone();
    let found = satisfy_type_and_direction(
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendonly,
        &mut list,
    );
    assert!(found.map(|t| Arc::ptr_eq(&t, &video_recv)).unwrap_or(false));

    let found = satisfy_type_and_direction(
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Recvonly,
        &mut list,
    );
    assert!(found.map(|t| Arc::ptr_eq(&t, &video_send)).unwrap_or(false));

    // the bound transceiver is never picked up again
    assert!(satisfy_type_and_direction(
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        &mut list,
    )
    .is_none());
    assert!(satisfy_type_and_direction(
        RTPCodecType::Audio,
        RTCRtpTransceiverDirection::Inactive,
        &mut list,
    )
    .is_none());

    let mut list = all.clone();
    audio
        .set_codec_preferences(vec![codec(MIME_TYPE_PCMU, 8000, 0)])
        .await?;
    let found = find_by_payload_type(&[0], RTPCodecType::Audio, &mut list).await;
    assert!(found.map(|t| Arc::ptr_eq(&t, &audio)).unwrap_or(false));

    // no payload type match falls back to creation order
    let found = find_by_payload_type(&[120], RTPCodecType::Video, &mut list).await;
    assert!(found.map(|t| Arc::ptr_eq(&t, &video_recv)).unwrap_or(false));
    assert!(find_by_payload_type(&[111], RTPCodecType::Audio, &mut list)
        .await
        .is_none());

    Ok(())
}
