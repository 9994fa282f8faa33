#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export sub-crates
pub use {ice, interceptor, rtcp, rtp, sdp, util};

pub mod api;
pub mod error;
pub mod ice_transport;
pub mod peer_connection;
pub mod rtp_transceiver;
pub mod track;

pub use error::Error;

#[macro_use]
extern crate lazy_static;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

/// Equal to UDP MTU
pub(crate) const RECEIVE_MTU: usize = 1460;

pub(crate) const SDP_ATTRIBUTE_RID: &str = "rid";
pub(crate) const SDP_ATTRIBUTE_SIMULCAST: &str = "simulcast";
pub(crate) const SDES_REPAIR_RTP_STREAM_ID_URI: &str =
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id";
