use std::io::Cursor;

use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtp::header::Header;
use rtp::packet::Packet;
use util::Marshal;

use super::*;
use crate::api::media_engine::{MediaEngine, MIME_TYPE_VIDEO_RTX};
use crate::peer_connection::sdp::{get_rids, section_mids, track_details_from_sdp};
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::PayloadType;

const MID_ID: u8 = 1;
const RID_ID: u8 = 2;
const RSID_ID: u8 = 3;

const SIMULCAST_OFFER: &str = "v=0\r\n\
    o=- 1 1 IN IP4 0.0.0.0\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
    a=mid:0\r\n\
    a=sendonly\r\n\
    a=extmap:1 urn:ietf:params:rtp-hdrext:sdes:mid\r\n\
    a=extmap:2 urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id\r\n\
    a=extmap:3 urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id\r\n\
    a=rtpmap:96 VP8/90000\r\n\
    a=rtpmap:97 rtx/90000\r\n\
    a=fmtp:97 apt=96\r\n\
    a=rid:a send\r\n\
    a=rid:b send\r\n\
    a=simulcast:send a;b\r\n";

const DECLARED_OFFER: &str = "v=0\r\n\
    o=- 1 1 IN IP4 0.0.0.0\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
    a=mid:0\r\n\
    a=sendrecv\r\n\
    a=rtpmap:111 opus/48000/2\r\n\
    a=ssrc:1000 msid:stream audio-track\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
    a=mid:1\r\n\
    a=sendrecv\r\n\
    a=rtpmap:96 VP8/90000\r\n\
    a=rtpmap:97 rtx/90000\r\n\
    a=fmtp:97 apt=96\r\n\
    a=ssrc-group:FID 2000 2001\r\n\
    a=ssrc:2000 msid:stream video-track\r\n\
    a=ssrc:2001 msid:stream video-track\r\n";

const MULTI_STREAM_OFFER: &str = "v=0\r\n\
    o=- 1 1 IN IP4 0.0.0.0\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
    a=mid:0\r\n\
    a=sendonly\r\n\
    a=rtpmap:96 VP8/90000\r\n\
    a=ssrc:1111 msid:s1 t1\r\n\
    a=ssrc:2222 msid:s2 t2\r\n";

const UNDECLARED_OFFER: &str = "v=0\r\n\
    o=- 1 1 IN IP4 0.0.0.0\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
    a=mid:0\r\n\
    a=sendonly\r\n\
    a=rtpmap:96 VP8/90000\r\n\
    a=rtpmap:97 rtx/90000\r\n\
    a=fmtp:97 apt=96\r\n";

fn config() -> RouterConfig {
    RouterConfig {
        probe_threshold: 3,
        probe_budget: 10,
        probe_lifetime: Duration::from_secs(3),
        max_probes: 25,
    }
}

fn media_engine() -> Result<MediaEngine> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    m.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VIDEO_RTX.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: "apt=96".to_owned(),
                rtcp_feedback: vec![],
            },
            payload_type: 97,
        },
        RTPCodecType::Video,
    )?;
    for uri in [
        SDES_MID_URI,
        SDES_RTP_STREAM_ID_URI,
        SDES_REPAIR_RTP_STREAM_ID_URI,
    ] {
        m.register_header_extension(
            RTCRtpHeaderExtensionCapability {
                uri: uri.to_owned(),
            },
            RTPCodecType::Video,
            None,
        )?;
    }
    Ok(m)
}

struct Fixture {
    router: Router,
    sections: Vec<Option<RemoteSection>>,
}

impl Fixture {
    fn receiver(&self, index: usize) -> Arc<RTCRtpReceiver> {
        self.sections[index]
            .as_ref()
            .map(|s| Arc::clone(&s.receiver))
            .unwrap()
    }
}

/// fixture applies `raw` as the remote description the way negotiation
/// does: one receiving transceiver per section, declared SSRCs from a=ssrc.
fn fixture(raw: &str, config: RouterConfig, queue_capacity: usize) -> Result<Fixture> {
    let mut reader = Cursor::new(raw.as_bytes());
    let description = SessionDescription::unmarshal(&mut reader)?;

    let media = Arc::new(NegotiatedMedia::new(Arc::new(media_engine()?)));
    media.update_from_remote_description(&description)?;

    let mids = section_mids(&description)?;
    let mut sections = vec![];
    for (m, mid) in description.media_descriptions.iter().zip(&mids) {
        let kind = RTPCodecType::from(m.media_name.media.as_str());
        let receiver = Arc::new(RTCRtpReceiver::new(
            kind,
            1460,
            queue_capacity,
            Arc::clone(&media),
        ));
        let transceiver = RTCRtpTransceiver::new(
            Arc::clone(&receiver),
            None,
            RTCRtpTransceiverDirection::Recvonly,
            kind,
            vec![],
            Arc::clone(&media),
        );
        transceiver.set_mid(mid.clone())?;
        sections.push(Some(RemoteSection {
            mid: mid.clone(),
            rids: get_rids(m)
                .into_iter()
                .map(|r| SmolStr::from(r.id))
                .collect(),
            transceiver,
            receiver,
        }));
    }

    let mut declared = vec![];
    for details in track_details_from_sdp(&description, &mids, true) {
        let section = mids.iter().position(|m| *m == details.mid).unwrap();
        for ssrc in &details.ssrcs {
            declared.push((
                *ssrc,
                DeclaredStream {
                    section,
                    stream_id: details.stream_id.clone(),
                    track_id: details.id.clone(),
                    repair_of: None,
                },
            ));
        }
        if let (Some(repair), Some(base)) = (details.repair_ssrc, details.ssrcs.first()) {
            declared.push((
                repair,
                DeclaredStream {
                    section,
                    stream_id: details.stream_id.clone(),
                    track_id: details.id.clone(),
                    repair_of: Some(*base),
                },
            ));
        }
    }

    let router = Router::new(config, media);
    router.set_remote(description, sections.clone(), declared);

    Ok(Fixture { router, sections })
}

fn rtp_packet(
    ssrc: SSRC,
    payload_type: PayloadType,
    seq: u16,
    extensions: &[(u8, &str)],
    payload: &[u8],
) -> Result<Bytes> {
    let mut header = Header {
        version: 2,
        payload_type,
        sequence_number: seq,
        ssrc,
        ..Default::default()
    };
    for (id, value) in extensions {
        header.set_extension(*id, Bytes::from(value.to_string()))?;
    }
    let pkt = Packet {
        header,
        payload: Bytes::copy_from_slice(payload),
    };
    Ok(pkt.marshal()?)
}

const VP8: PayloadType = 96;
const RTX: PayloadType = 97;
const OPUS: PayloadType = 111;

/// padding_packet is an RTP packet whose whole payload is padding.
fn padding_packet(ssrc: SSRC, seq: u16, extensions: &[(u8, &str)]) -> Result<Vec<u8>> {
    let mut raw = rtp_packet(ssrc, VP8, seq, extensions, &[])?.to_vec();
    raw[0] |= 0x20;
    raw.extend_from_slice(&[0, 0, 0, 4]);
    Ok(raw)
}

#[test]
fn test_is_rtcp() {
    assert!(is_rtcp(&[0x80, 200]));
    assert!(is_rtcp(&[0x81, 206, 0, 2]));
    assert!(!is_rtcp(&[0x80, 96]));
    assert!(!is_rtcp(&[0x80, 0xe0]));
    assert!(!is_rtcp(&[0x80]));
}

#[tokio::test]
async fn test_router_declared_ssrc_binds_on_first_packet() -> Result<()> {
    let f = fixture(DECLARED_OFFER, config(), 16)?;
    assert!(f.router.bound_ssrcs().is_empty());
    assert!(!f.receiver(0).have_received());

    let events = f.router.route_rtp(&rtp_packet(1000, OPUS, 1, &[], &[1, 2])?)?;
    assert_eq!(1, events.len());
    assert_eq!(1000, events[0].track.ssrc());
    assert_eq!("audio-track", events[0].track.id());
    assert_eq!("stream", events[0].track.stream_id());
    assert!(Arc::ptr_eq(&events[0].receiver, &f.receiver(0)));

    // later packets are delivered without a second event
    let events = f.router.route_rtp(&rtp_packet(1000, OPUS, 2, &[], &[3])?)?;
    assert!(events.is_empty());

    let track = f.receiver(0).track().unwrap();
    let (pkt, _) = track.read_rtp().await?;
    assert_eq!(1, pkt.header.sequence_number);
    let (pkt, _) = track.read_rtp().await?;
    assert_eq!(2, pkt.header.sequence_number);

    // the video stream stays unbound until it sends
    assert!(!f.receiver(1).have_received());
    assert_eq!(vec![1000], f.router.bound_ssrcs());

    Ok(())
}

#[tokio::test]
async fn test_router_declared_repair_follows_base() -> Result<()> {
    let f = fixture(DECLARED_OFFER, config(), 16)?;

    // repair traffic before the base stream has nowhere to go
    let events = f.router.route_rtp(&rtp_packet(2001, RTX, 1, &[], &[9])?)?;
    assert!(events.is_empty());
    assert_eq!(1, f.router.stats().dropped_unroutable);

    let events = f.router.route_rtp(&rtp_packet(2000, VP8, 1, &[], &[1])?)?;
    assert_eq!(1, events.len());
    let events = f.router.route_rtp(&rtp_packet(2001, RTX, 2, &[], &[2])?)?;
    assert!(events.is_empty());

    let receiver = f.receiver(1);
    assert_eq!(1, receiver.tracks().len());
    let track = receiver.track().unwrap();
    assert_eq!(Some(2001), track.rtx_ssrc());
    assert_eq!(2, track.buffered());
    assert_eq!(VP8, track.payload_type());

    Ok(())
}

#[tokio::test]
async fn test_router_undeclared_single_section() -> Result<()> {
    let f = fixture(UNDECLARED_OFFER, config(), 16)?;

    let events = f.router.route_rtp(&rtp_packet(5000, VP8, 1, &[], &[1])?)?;
    assert_eq!(1, events.len());
    assert_eq!(5000, events[0].track.ssrc());
    assert_eq!("", events[0].track.rid());

    // a second media ssrc cannot take the section's only stream
    let events = f.router.route_rtp(&rtp_packet(5001, VP8, 1, &[], &[1])?)?;
    assert!(events.is_empty());
    assert_eq!(1, f.router.stats().dropped_unroutable);

    // retransmissions attach to the bound stream
    let events = f.router.route_rtp(&rtp_packet(5002, RTX, 1, &[], &[1])?)?;
    assert!(events.is_empty());
    let track = f.receiver(0).track().unwrap();
    assert_eq!(Some(5002), track.rtx_ssrc());
    assert_eq!(1, f.receiver(0).tracks().len());

    Ok(())
}

#[tokio::test]
async fn test_router_section_with_several_declared_streams() -> Result<()> {
    let f = fixture(MULTI_STREAM_OFFER, config(), 16)?;

    let first = f.router.route_rtp(&rtp_packet(1111, VP8, 1, &[], &[1])?)?;
    let second = f.router.route_rtp(&rtp_packet(2222, VP8, 1, &[], &[1])?)?;
    assert_eq!(1, first.len());
    assert_eq!(1, second.len());
    assert_eq!(("t1", "s1"), (first[0].track.id().as_str(), first[0].track.stream_id().as_str()));
    assert_eq!(("t2", "s2"), (second[0].track.id().as_str(), second[0].track.stream_id().as_str()));
    assert!(Arc::ptr_eq(&first[0].receiver, &second[0].receiver));

    let receiver = f.receiver(0);
    assert_eq!(2, receiver.tracks().len());
    assert_eq!(Some(2222), receiver.track_by_ssrc(2222).map(|t| t.ssrc()));
    assert_eq!(vec![1111, 2222], f.router.bound_ssrcs());
    assert_eq!(0, f.router.stats().dropped_unroutable);

    // both keep flowing without further events
    assert!(f.router.route_rtp(&rtp_packet(2222, VP8, 2, &[], &[1])?)?.is_empty());
    assert_eq!(2, receiver.track_by_ssrc(2222).map(|t| t.buffered()).unwrap_or(0));

    Ok(())
}

#[tokio::test]
async fn test_router_explicit_ssrc_section_drops_unknown() -> Result<()> {
    let f = fixture(DECLARED_OFFER, config(), 16)?;

    let events = f.router.route_rtp(&rtp_packet(3000, VP8, 1, &[], &[1])?)?;
    assert!(events.is_empty());
    assert_eq!(1, f.router.stats().dropped_unroutable);
    assert_eq!(0, f.router.pending_probes());
    assert!(!f.receiver(1).have_received());

    Ok(())
}

#[tokio::test]
async fn test_router_unknown_payload_type_dropped() -> Result<()> {
    let f = fixture(UNDECLARED_OFFER, config(), 16)?;

    let events = f.router.route_rtp(&rtp_packet(5000, 0, 1, &[], &[1])?)?;
    assert!(events.is_empty());
    assert_eq!(1, f.router.stats().dropped_unroutable);
    assert!(f.router.bound_ssrcs().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_router_probe_threshold_ignores_padding() -> Result<()> {
    let f = fixture(SIMULCAST_OFFER, config(), 16)?;
    let ext = [(MID_ID, "0"), (RID_ID, "a")];

    // padding never counts toward the threshold
    for seq in 0..5 {
        let events = f.router.route_rtp(&padding_packet(7000, seq, &ext)?)?;
        assert!(events.is_empty());
    }
    assert_eq!(1, f.router.pending_probes());

    for seq in 5..7 {
        let events = f.router.route_rtp(&rtp_packet(7000, VP8, seq, &ext, &[1])?)?;
        assert!(events.is_empty());
    }
    let events = f.router.route_rtp(&rtp_packet(7000, VP8, 7, &ext, &[1])?)?;
    assert_eq!(1, events.len());
    assert_eq!("a", events[0].track.rid());
    assert_eq!(0, f.router.pending_probes());

    // buffered probe packets are flushed in arrival order
    let track = f.receiver(0).track_by_rid("a").unwrap();
    assert_eq!(8, track.buffered());
    for seq in 0..8 {
        let (pkt, _) = track.read_rtp().await?;
        assert_eq!(seq, pkt.header.sequence_number);
    }

    Ok(())
}

#[tokio::test]
async fn test_router_probe_budget_expires() -> Result<()> {
    let f = fixture(SIMULCAST_OFFER, config(), 16)?;
    let ext = [(MID_ID, "0"), (RID_ID, "a")];

    for seq in 0..10 {
        f.router.route_rtp(&padding_packet(7000, seq, &ext)?)?;
    }
    assert_eq!(0, f.router.pending_probes());
    assert_eq!(1, f.router.stats().probes_expired);
    assert!(!f.receiver(0).have_received());

    Ok(())
}

#[tokio::test]
async fn test_router_probe_lifetime_expires() -> Result<()> {
    let mut c = config();
    c.probe_lifetime = Duration::from_millis(10);
    let f = fixture(SIMULCAST_OFFER, c, 16)?;

    let ext = [(MID_ID, "0"), (RID_ID, "a")];
    f.router.route_rtp(&rtp_packet(7000, VP8, 0, &ext, &[1])?)?;
    assert_eq!(1, f.router.pending_probes());

    tokio::time::sleep(Duration::from_millis(30)).await;
    // any packet sweeps stale probes
    f.router.route_rtp(&rtp_packet(7001, VP8, 0, &ext, &[1])?)?;
    assert_eq!(1, f.router.stats().probes_expired);
    assert_eq!(1, f.router.pending_probes());

    Ok(())
}

#[tokio::test]
async fn test_router_probe_rejects_unknown_rid() -> Result<()> {
    let f = fixture(SIMULCAST_OFFER, config(), 16)?;
    let ext = [(MID_ID, "0"), (RID_ID, "zzz")];

    for seq in 0..3 {
        let events = f.router.route_rtp(&rtp_packet(7000, VP8, seq, &ext, &[1])?)?;
        assert!(events.is_empty());
    }
    assert_eq!(1, f.router.stats().probes_rejected);
    assert!(!f.receiver(0).have_received());

    Ok(())
}

#[tokio::test]
async fn test_router_probe_requires_mid() -> Result<()> {
    let f = fixture(SIMULCAST_OFFER, config(), 16)?;

    let events = f.router.route_rtp(&rtp_packet(7000, VP8, 0, &[(RID_ID, "a")], &[1])?)?;
    assert!(events.is_empty());
    assert_eq!(0, f.router.pending_probes());
    assert_eq!(1, f.router.stats().dropped_unroutable);

    Ok(())
}

#[tokio::test]
async fn test_router_probe_limit() -> Result<()> {
    let mut c = config();
    c.max_probes = 2;
    let f = fixture(SIMULCAST_OFFER, c, 16)?;
    let ext = [(MID_ID, "0"), (RID_ID, "a")];

    for ssrc in 7000..7005 {
        f.router.route_rtp(&rtp_packet(ssrc, VP8, 0, &ext, &[1])?)?;
    }
    assert_eq!(2, f.router.pending_probes());
    assert_eq!(3, f.router.stats().probes_rejected);

    Ok(())
}

#[tokio::test]
async fn test_router_rid_bound_once() -> Result<()> {
    let f = fixture(SIMULCAST_OFFER, config(), 16)?;
    let ext = [(MID_ID, "0"), (RID_ID, "a")];

    let mut events = vec![];
    for seq in 0..3 {
        events.extend(f.router.route_rtp(&rtp_packet(7000, VP8, seq, &ext, &[1])?)?);
    }
    assert_eq!(1, events.len());

    // another ssrc claiming the same rid does not rebind it
    for seq in 0..3 {
        let events = f.router.route_rtp(&rtp_packet(7100, VP8, seq, &ext, &[1])?)?;
        assert!(events.is_empty());
    }
    assert_eq!(1, f.receiver(0).tracks().len());
    assert_eq!(7000, f.receiver(0).track_by_rid("a").unwrap().ssrc());
    assert_eq!(1, f.router.stats().probes_rejected);

    Ok(())
}

#[tokio::test]
async fn test_router_repair_stream_joins_layer() -> Result<()> {
    let f = fixture(SIMULCAST_OFFER, config(), 16)?;

    let mut events = vec![];
    for (ssrc, rid) in [(7000, "a"), (7001, "b")] {
        for seq in 0..3 {
            events.extend(f.router.route_rtp(&rtp_packet(
                ssrc,
                VP8,
                seq,
                &[(MID_ID, "0"), (RID_ID, rid)],
                &[1],
            )?)?);
        }
    }
    assert_eq!(2, events.len());

    let events = f.router.route_rtp(&rtp_packet(
        8000,
        RTX,
        0,
        &[(MID_ID, "0"), (RSID_ID, "b")],
        &[],
    )?)?;
    assert!(events.is_empty());

    let receiver = f.receiver(0);
    assert_eq!(2, receiver.tracks().len());
    let b = receiver.track_by_rid("b").unwrap();
    assert_eq!(Some(8000), b.rtx_ssrc());
    assert_eq!(None, receiver.track_by_rid("a").unwrap().rtx_ssrc());
    assert_eq!(4, b.buffered());

    Ok(())
}

#[tokio::test]
async fn test_router_malformed_and_closed() -> Result<()> {
    let f = fixture(UNDECLARED_OFFER, config(), 16)?;

    assert!(f.router.route_rtp(&[0x80])?.is_empty());
    f.router.route_rtcp(&[0x80, 200, 0], &[])?;
    assert_eq!(2, f.router.stats().malformed);

    f.router.close();
    assert_eq!(
        Err(Error::ErrConnectionClosed),
        f.router.route_rtp(&rtp_packet(5000, VP8, 1, &[], &[1])?).map(|_| ())
    );
    assert_eq!(
        Err(Error::ErrConnectionClosed),
        f.router.route_rtcp(&[0x80], &[])
    );
    assert!(f.router.bound_ssrcs().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_router_queue_overflow_counted() -> Result<()> {
    let f = fixture(UNDECLARED_OFFER, config(), 2)?;

    for seq in 0..5 {
        f.router.route_rtp(&rtp_packet(5000, VP8, seq, &[], &[1])?)?;
    }
    assert_eq!(3, f.router.stats().queue_overflow);

    // the reader sees the newest packets
    let track = f.receiver(0).track().unwrap();
    let (pkt, _) = track.read_rtp().await?;
    assert_eq!(3, pkt.header.sequence_number);

    Ok(())
}

#[tokio::test]
async fn test_router_rtcp_to_receiver_and_sender() -> Result<()> {
    let f = fixture(UNDECLARED_OFFER, config(), 16)?;
    f.router.route_rtp(&rtp_packet(5000, VP8, 1, &[], &[1])?)?;

    let pli = PictureLossIndication {
        sender_ssrc: 1,
        media_ssrc: 5000,
    };
    f.router.route_rtcp(&pli.marshal()?, &[])?;
    let (pkts, _) = f.receiver(0).read_rtcp().await?;
    assert_eq!(1, pkts.len());
    assert_eq!(vec![5000], pkts[0].destination_ssrc());

    let media = Arc::new(NegotiatedMedia::new(Arc::new(media_engine()?)));
    let sender = Arc::new(RTCRtpSender::new(
        RTPCodecType::Video,
        None,
        &[],
        media,
        None,
        16,
    ));
    let pli = PictureLossIndication {
        sender_ssrc: 1,
        media_ssrc: sender.ssrc(),
    };
    f.router
        .route_rtcp(&pli.marshal()?, &[Arc::clone(&sender)])?;
    let (pkts, _) = sender.read_rtcp().await?;
    assert_eq!(vec![sender.ssrc()], pkts[0].destination_ssrc());

    // nobody owns this one
    let pli = PictureLossIndication {
        sender_ssrc: 1,
        media_ssrc: 4242,
    };
    f.router.route_rtcp(&pli.marshal()?, &[sender])?;
    assert_eq!(1, f.router.stats().dropped_unroutable);

    Ok(())
}

#[tokio::test]
async fn test_router_set_remote_keeps_bindings() -> Result<()> {
    let f = fixture(UNDECLARED_OFFER, config(), 16)?;
    f.router.route_rtp(&rtp_packet(5000, VP8, 1, &[], &[1])?)?;

    let mut reader = Cursor::new(UNDECLARED_OFFER.as_bytes());
    let description = SessionDescription::unmarshal(&mut reader)?;
    f.router.set_remote(description.clone(), f.sections.clone(), vec![]);
    assert_eq!(vec![5000], f.router.bound_ssrcs());

    // a section whose receiver was replaced loses its bindings
    f.router.set_remote(description, vec![None], vec![]);
    assert!(f.router.bound_ssrcs().is_empty());

    Ok(())
}
