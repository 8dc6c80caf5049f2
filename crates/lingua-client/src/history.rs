//! History hydration source.

use std::time::Duration;

use async_trait::async_trait;
use lingua_core::{ConfigError, HydrationError};
use lingua_proto::{HistoryRecord, RoomId};

/// Fetches persisted messages of a room, oldest first.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    /// Fetch the room's history.
    async fn fetch(&self, room_id: &RoomId) -> Result<Vec<HistoryRecord>, HydrationError>;
}

/// Options for the HTTP history endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// API base URL; records are read from `{api_base}/api/chat/rooms/{room}/messages`.
    pub api_base: String,
    /// Records requested per fetch.
    pub limit: u32,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            limit: 100,
            timeout: Duration::from_secs(10),
        }
    }
}

impl HistoryConfig {
    /// Check the options are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base.trim();
        if base.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ConfigError::InvalidEndpoint(base.to_string()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// History source that always comes back empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl HistorySource for NoHistory {
    async fn fetch(&self, _room_id: &RoomId) -> Result<Vec<HistoryRecord>, HydrationError> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "transport")]
pub use http::HttpHistorySource;

#[cfg(feature = "transport")]
mod http {
    use async_trait::async_trait;
    use lingua_core::HydrationError;
    use lingua_proto::{HistoryRecord, RoomId};
    use tracing::debug;
    use url::Url;

    use super::{HistoryConfig, HistorySource};
    use crate::transport::TransportError;

    /// History over the relay's REST API.
    #[derive(Debug, Clone)]
    pub struct HttpHistorySource {
        client: reqwest::Client,
        base: Url,
        limit: u32,
    }

    impl HttpHistorySource {
        /// Build a client for `config`.
        pub fn new(config: &HistoryConfig) -> Result<Self, TransportError> {
            let base = Url::parse(config.api_base.trim()).map_err(|e| TransportError::InvalidUrl {
                endpoint: config.api_base.clone(),
                reason: e.to_string(),
            })?;
            let client = reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            Ok(Self { client, base, limit: config.limit })
        }

        /// URL of the room's message list.
        pub fn messages_url(&self, room_id: &RoomId) -> Url {
            let mut url = self.base.clone();
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().extend(["api", "chat", "rooms", room_id.as_str(), "messages"]);
            }
            url
        }
    }

    #[async_trait]
    impl HistorySource for HttpHistorySource {
        async fn fetch(&self, room_id: &RoomId) -> Result<Vec<HistoryRecord>, HydrationError> {
            let url = self.messages_url(room_id);
            debug!(%url, limit = self.limit, "fetching history");

            let response = self
                .client
                .get(url)
                .query(&[("limit", self.limit)])
                .send()
                .await
                .map_err(|e| HydrationError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(HydrationError::Http { status: status.as_u16() });
            }

            response
                .json::<Vec<HistoryRecord>>()
                .await
                .map_err(|e| HydrationError::Decode(e.to_string()))
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(HistoryConfig::default().validate().is_ok());
        let config = HistoryConfig { api_base: "ws://relay".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEndpoint(_))));
        let config = HistoryConfig { api_base: String::new(), ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::EmptyEndpoint));
    }

    #[tokio::test]
    async fn no_history_is_empty() {
        assert!(NoHistory.fetch(&RoomId::new("room_1")).await.unwrap().is_empty());
    }
}
