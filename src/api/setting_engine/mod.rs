
use std::sync::Arc;

use tokio::time::Duration;

use crate::RECEIVE_MTU;

/// SIMULCAST_PROBE_COUNT is the number of packets an unknown SSRC may send
/// before its probe is abandoned.
pub(crate) const SIMULCAST_PROBE_COUNT: usize = 10;

/// SIMULCAST_MAX_PROBE_ROUTINES caps the number of SSRCs probed at once.
pub(crate) const SIMULCAST_MAX_PROBE_ROUTINES: usize = 25;

pub(crate) const DEFAULT_PROBE_THRESHOLD: usize = 3;
pub(crate) const DEFAULT_PROBE_LIFETIME: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_QUEUE_CAPACITY: usize = 128;

#[derive(Default, Clone)]
pub struct Candidates {
    pub ice_lite: bool,
    pub username_fragment: String,
    pub password: String,
}

/// Simulcast tunes how packets of unknown SSRC are resolved. Zero fields
/// fall back to the defaults.
#[derive(Default, Clone)]
pub struct Simulcast {
    /// media packets carrying mid and rid needed before a probe binds
    pub probe_threshold: usize,
    /// packets a probe may see before it is dropped
    pub probe_budget: usize,
    /// time a probe may stay open
    pub probe_lifetime: Option<Duration>,
    /// concurrent probes
    pub max_probes: usize,
}

/// SettingEngine allows influencing behavior in ways that are not
/// supported by the WebRTC API. This allows us to support additional
/// use-cases without deviating from the WebRTC API elsewhere.
#[derive(Default, Clone)]
pub struct SettingEngine {
    pub(crate) candidates: Candidates,
    pub(crate) simulcast: Simulcast,
    pub(crate) receive_mtu: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) mid_generator: Option<Arc<dyn Fn(isize) -> String + Send + Sync>>,
}

impl SettingEngine {
    /// get_receive_mtu returns the configured MTU. If SettingEngine's MTU is configured to 0 it returns the default
    pub(crate) fn get_receive_mtu(&self) -> usize {
        if self.receive_mtu != 0 {
            self.receive_mtu
        } else {
            RECEIVE_MTU
        }
    }

    pub(crate) fn get_queue_capacity(&self) -> usize {
        if self.queue_capacity != 0 {
            self.queue_capacity
        } else {
            DEFAULT_QUEUE_CAPACITY
        }
    }

    pub(crate) fn get_probe_threshold(&self) -> usize {
        if self.simulcast.probe_threshold != 0 {
            self.simulcast.probe_threshold
        } else {
            DEFAULT_PROBE_THRESHOLD
        }
    }

    pub(crate) fn get_probe_budget(&self) -> usize {
        if self.simulcast.probe_budget != 0 {
            self.simulcast.probe_budget
        } else {
            SIMULCAST_PROBE_COUNT
        }
    }

    pub(crate) fn get_probe_lifetime(&self) -> Duration {
        self.simulcast.probe_lifetime.unwrap_or(DEFAULT_PROBE_LIFETIME)
    }

    pub(crate) fn get_max_probes(&self) -> usize {
        if self.simulcast.max_probes != 0 {
            self.simulcast.max_probes
        } else {
            SIMULCAST_MAX_PROBE_ROUTINES
        }
    }

    /// set_lite configures whether or not the ice agent should be a lite agent
    pub fn set_lite(&mut self, lite: bool) {
        self.candidates.ice_lite = lite;
    }

    /// set_ice_credentials sets a static uFrag/uPwd to be used by generated
    /// descriptions. Random credentials are used when left empty.
    pub fn set_ice_credentials(&mut self, username_fragment: String, password: String) {
        self.candidates.username_fragment = username_fragment;
        self.candidates.password = password;
    }

    /// set_receive_mtu sets the size of read buffer that copies incoming
    /// packets. This is optional. Leave this 0 for the default receive_mtu
    pub fn set_receive_mtu(&mut self, receive_mtu: usize) {
        self.receive_mtu = receive_mtu;
    }

    /// set_queue_capacity bounds the packets buffered per remote track and
    /// the RTCP batches buffered per sender or receiver. The oldest entry is
    /// dropped when a reader falls behind.
    pub fn set_queue_capacity(&mut self, capacity: usize) {
        self.queue_capacity = capacity;
    }

    /// set_simulcast_probe configures the resolution of packets whose SSRC
    /// was not declared: how many media packets with mid and rid must be
    /// seen before binding, and the packet and time budgets of a probe.
    pub fn set_simulcast_probe(
        &mut self,
        threshold: usize,
        budget: usize,
        lifetime: Option<Duration>,
    ) {
        self.simulcast.probe_threshold = threshold;
        self.simulcast.probe_budget = budget;
        self.simulcast.probe_lifetime = lifetime;
    }

    /// set_max_simulcast_probes caps the SSRCs probed at the same time.
    /// Packets of further unknown SSRCs are dropped.
    pub fn set_max_simulcast_probes(&mut self, max_probes: usize) {
        self.simulcast.max_probes = max_probes;
    }

    /// set_mid_generator allows setting a custom generator for mids.
    /// The function receives the largest numeric mid seen so far and must
    /// return a mid not in use yet.
    pub fn set_mid_generator(&mut self, f: impl Fn(isize) -> String + Send + Sync + 'static) {
        self.mid_generator = Some(Arc::new(f));
    }
}
