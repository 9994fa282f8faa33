
pub mod media_engine;
pub mod setting_engine;

use std::sync::Arc;

use interceptor::RTPWriter;
use media_engine::*;
use setting_engine::*;

use crate::error::Result;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::RTCPeerConnection;

/// API bundles the engines every PeerConnection created from it shares.
/// The MediaEngine and SettingEngine are frozen once the API is built.
pub struct API {
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: Arc<MediaEngine>,
    pub(crate) rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
}

impl API {
    /// new_peer_connection creates a new PeerConnection with the provided configuration against the received API object.
    /// ICE servers are validated first and fail with `InvalidAccessError`.
    pub async fn new_peer_connection(
        &self,
        configuration: RTCConfiguration,
    ) -> Result<RTCPeerConnection> {
        RTCPeerConnection::new(self, configuration).await
    }

    /// Returns the internal [`SettingEngine`].
    pub fn setting_engine(&self) -> Arc<SettingEngine> {
        Arc::clone(&self.setting_engine)
    }

    /// Returns the internal [`MediaEngine`].
    pub fn media_engine(&self) -> Arc<MediaEngine> {
        Arc::clone(&self.media_engine)
    }
}

#[derive(Default)]
pub struct APIBuilder {
    setting_engine: Option<Arc<SettingEngine>>,
    media_engine: Option<Arc<MediaEngine>>,
    rtp_writer: Option<Arc<dyn RTPWriter + Send + Sync>>,
}

impl APIBuilder {
    pub fn new() -> Self {
        APIBuilder::default()
    }

    pub fn build(mut self) -> API {
        API {
            setting_engine: if let Some(setting_engine) = self.setting_engine.take() {
                setting_engine
            } else {
                Arc::new(SettingEngine::default())
            },
            media_engine: if let Some(media_engine) = self.media_engine.take() {
                media_engine
            } else {
                Arc::new(MediaEngine::default())
            },
            rtp_writer: self.rtp_writer.take(),
        }
    }

    /// WithSettingEngine allows providing a SettingEngine to the API.
    /// Settings should not be changed after passing the engine to an API.
    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.setting_engine = Some(Arc::new(setting_engine));
        self
    }

    /// WithMediaEngine allows providing a MediaEngine to the API.
    /// The engine is read-only from then on.
    pub fn with_media_engine(mut self, media_engine: MediaEngine) -> Self {
        self.media_engine = Some(Arc::new(media_engine));
        self
    }

    /// with_rtp_writer sets where started senders write their packets,
    /// usually the outbound side of the transport.
    pub fn with_rtp_writer(mut self, rtp_writer: Arc<dyn RTPWriter + Send + Sync>) -> Self {
        self.rtp_writer = Some(rtp_writer);
        self
    }
}
