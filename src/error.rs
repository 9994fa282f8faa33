use std::num::ParseIntError;

use thiserror::Error;

use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::signaling_state::RTCSignalingState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrUnknownType indicates an error with Unknown info.
    #[error("unknown")]
    ErrUnknownType,

    /// ErrConnectionClosed indicates an operation executed after connection
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    /// ErrNoTurnCredentials indicates that a TURN server URL was provided
    /// without required credentials.
    #[error("turn server credentials required")]
    ErrNoTurnCredentials,

    /// ErrTurnCredentials indicates that provided TURN credentials are partial
    /// or malformed.
    #[error("invalid turn server credentials")]
    ErrTurnCredentials,

    /// InvalidAccessError wraps an ICE server validation failure so callers can
    /// tell configuration problems apart from everything else.
    #[error("invalid access: {0}")]
    InvalidAccessError(Box<Error>),

    /// ErrExistingTrack indicates that a track already exists.
    #[error("track already exists")]
    ErrExistingTrack,

    /// ErrIncorrectSignalingState indicates that the signaling state of PeerConnection is not correct.
    #[error("operation can not be run in current signaling state")]
    ErrIncorrectSignalingState,

    /// ErrSenderNotCreatedByConnection indicates remove_track was called with a
    /// RtpSender not created by this PeerConnection
    #[error("RtpSender not created by this PeerConnection")]
    ErrSenderNotCreatedByConnection,

    /// ErrInvalidDescription indicates a remote or local description that is
    /// malformed or contradicts itself. Nothing is applied.
    #[error("invalid session description: {0}")]
    ErrInvalidDescription(String),

    #[error("set_remote_description called with no ice-ufrag")]
    ErrSessionDescriptionMissingIceUfrag,
    #[error("set_remote_description called with no ice-pwd")]
    ErrSessionDescriptionMissingIcePwd,
    /// Two active media sections carry different ice-ufrag values.
    #[error("set_remote_description called with multiple conflicting ice-ufrag values")]
    ErrSessionDescriptionConflictingIceUfrag,
    #[error("set_remote_description called with multiple conflicting ice-pwd values")]
    ErrSessionDescriptionConflictingIcePwd,

    /// ErrDuplicateMid indicates two media sections in one description share a mid.
    #[error("duplicate mid {0} in session description")]
    ErrDuplicateMid(String),

    /// ErrNoUsableCodecs indicates a media section that wants to send has no
    /// payload type the local codec table understands.
    #[error("no usable codecs for media section {0}")]
    ErrNoUsableCodecs(String),

    /// ErrSenderWithNoCodecs indicates that a RTPSender was created without any codecs. To send media the MediaEngine needs at
    /// least one configured codec.
    #[error("unable to populate media section, RTPSender created with no codecs")]
    ErrSenderWithNoCodecs,

    /// ErrRTPSenderNewTrackHasIncorrectKind indicates that the new track is of a different kind than the previous/original
    #[error("new track must be of the same kind as previous")]
    ErrRTPSenderNewTrackHasIncorrectKind,

    /// ErrRTPSenderNoTransport indicates a write on a sender that has no
    /// outbound transport to write to.
    #[error("no transport bound to sender")]
    ErrRTPSenderNoTransport,

    /// ErrRTPSenderNotStarted indicates a write on a sender that negotiation
    /// has not started yet.
    #[error("sender has not been started")]
    ErrRTPSenderNotStarted,

    /// ErrRTPSenderStopped indicates the sender was already stopped
    #[error("sender has already been stopped")]
    ErrRTPSenderStopped,

    /// ErrRTPSenderNoEncoding indicates the sender has no encoding for the requested rid
    #[error("sender has no encoding for rid {0}")]
    ErrRTPSenderNoEncoding(String),

    /// ErrRTPTransceiverCannotChangeMid indicates that the MID of a transceiver
    /// can't be changed once set
    #[error("errRTPTransceiverCannotChangeMid")]
    ErrRTPTransceiverCannotChangeMid,


    /// ErrRTPTransceiverCodecUnsupported indicates unsupported codec type
    #[error("unsupported codec type by this transceiver")]
    ErrRTPTransceiverCodecUnsupported,

    /// ErrRTPReceiverStopped indicates a track was bound on a receiver that was
    /// already stopped
    #[error("receiver has already been stopped")]
    ErrRTPReceiverStopped,

    /// ErrRTPReceiverDuplicateRid indicates the rid already carries a track on
    /// this receiver
    #[error("rid {0} already bound on this receiver")]
    ErrRTPReceiverDuplicateRid(String),
    #[error("RTPReceiver: ssrc {0} already carries a track")]
    ErrRTPReceiverDuplicateSsrc(u32),
    /// A section without declared SSRCs carries a single stream.
    #[error("undeclared media section already carries a stream")]
    ErrPeerConnUndeclaredSectionBound,

    /// ErrNoRemoteDescription indicates that an operation was rejected because
    /// the remote description is not set
    #[error("remote description is not set")]
    ErrNoRemoteDescription,

    /// ErrSignalingStateCannotRollback indicates a rollback was attempted from
    /// the stable state.
    #[error("can't rollback from stable state")]
    ErrSignalingStateCannotRollback,

    /// ErrSignalingStateProposedTransitionInvalid indicates that the signaling
    /// state machine rejected the proposed transition.
    #[error("invalid proposed signaling state transition: {from} applying {applying} (local: {is_local})")]
    ErrSignalingStateProposedTransitionInvalid {
        from: RTCSignalingState,
        applying: RTCSdpType,
        is_local: bool,
    },

    /// ErrCodecNotFound is returned when a codec search to the Media Engine fails
    #[error("codec not found")]
    ErrCodecNotFound,

    /// ErrRegisterHeaderExtensionInvalidDirection indicates that a extension was registered with different
    /// directions for two different calls.
    #[error("a header extension must be registered with the same direction each time")]
    ErrRegisterHeaderExtensionInvalidDirection,

    /// ErrRegisterHeaderExtensionNoFreeID indicates that there was no extension ID available which
    /// in turn means that all 15 available id(1 through 14) have been used.
    #[error("no header extension ID was free to use(this means the maximum of 15 extensions have been registered)")]
    ErrRegisterHeaderExtensionNoFreeID,

    /// ErrSimulcastProbeOverflow indicates that too many Simulcast probe streams are in flight and the requested SSRC was ignored
    #[error("simulcast probe limit has been reached, new SSRC has been discarded")]
    ErrSimulcastProbeOverflow,

    #[error("remote description has no media section for payload type")]
    ErrPeerConnNoMediaSectionForPayloadType,
    #[error("single media section has an explicit SSRC")]
    ErrPeerConnSingleMediaSectionHasExplicitSSRC,
    #[error("mid RTP Extensions required for Simulcast")]
    ErrPeerConnSimulcastMidRTPExtensionRequired,
    #[error("incoming SSRC failed Simulcast probing")]
    ErrPeerConnSimulcastIncomingSSRCFailed,
    #[error("remote description without mid value for media section {0}")]
    ErrPeerConnRemoteDescriptionWithoutMidValue(usize),
    #[error("remote description is nil")]
    ErrPeerConnRemoteDescriptionNil,
    #[error("invalid value for SDP type")]
    ErrPeerConnSDPTypeInvalidValue,
    #[error("RTPReceiver: RTCP packet without media SSRC")]
    ErrRTCPNoDestination,
    #[error("add_transceiver_from_kind only accepts one RTPTransceiverInit with a known kind and direction")]
    ErrPeerConnAddTransceiverFromKindSupport,
    #[error("add_transceiver_from_track only accepts sendonly or sendrecv directions")]
    ErrPeerConnAddTransceiverFromTrackSupport,
    #[error("no transceiver carries the mid of a remote media section")]
    ErrPeerConnTransceiverMidNil,
    #[error("no codecs registered for the requested kind")]
    ErrNoCodecsAvailable,
    #[error("cannot convert ice.CandidateType into webrtc.ICECandidateType, invalid type")]
    ErrICECandidateTypeUnknown,
    #[error("invalid ice candidate attribute: {0}")]
    ErrICECandidateInvalid(String),
    #[error("ICE candidate has no sdp_mid or sdp_mline_index")]
    ErrICECandidateNoMidOrIndex,
    #[error("io: read/write on closed pipe")]
    ErrClosedPipe,
    #[error("unable to start track, codec is not supported by remote")]
    ErrUnsupportedCodec,
    #[error("failed to unbind TrackLocal from PeerConnection")]
    ErrUnbindFailed,
    #[error("buffer is too short")]
    ErrShortBuffer,

    #[error("{0}")]
    Util(#[from] util::Error),
    #[error("{0}")]
    Ice(#[from] ice::Error),
    #[error("{0}")]
    Sdp(#[from] sdp::Error),
    #[error("{0}")]
    Interceptor(#[from] interceptor::Error),
    #[error("{0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("{0}")]
    Rtp(#[from] rtp::Error),

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("parse url: {0}")]
    ParseUrl(#[from] url::ParseError),

    #[allow(non_camel_case_types)]
    #[error("{0}")]
    new(String),
}


impl From<Error> for interceptor::Error {
    fn from(e: Error) -> Self {
        interceptor::Error::Util(util::Error::from_std(e))
    }
}

impl PartialEq<ice::Error> for Error {
    fn eq(&self, other: &ice::Error) -> bool {
        if let Error::Ice(e) = self {
            return e == other;
        }
        false
    }
}

impl Error {
    /// Wraps an ICE server validation failure into an `InvalidAccessError`.
    pub(crate) fn invalid_access(cause: Error) -> Self {
        match cause {
            Error::InvalidAccessError(_) => cause,
            cause => Error::InvalidAccessError(Box::new(cause)),
        }
    }

    /// is_invalid_description reports whether a failed apply was rejected
    /// because the description itself is unusable.
    pub fn is_invalid_description(&self) -> bool {
        matches!(
            self,
            Error::ErrInvalidDescription(_)
                | Error::ErrDuplicateMid(_)
                | Error::ErrPeerConnRemoteDescriptionWithoutMidValue(_)
                | Error::ErrSessionDescriptionMissingIceUfrag
                | Error::ErrSessionDescriptionMissingIcePwd
                | Error::ErrSessionDescriptionConflictingIceUfrag
                | Error::ErrSessionDescriptionConflictingIcePwd
                | Error::Sdp(_)
        )
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::new(errs_strs.join("\n")))
    }
}
