use crate::config::ZonesConfig;
use crate::zone::sse::{RtdbEvent, SseDecoder};
use crate::zone::{ForbiddenZone, ZoneRegistry, ZoneSize};
use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Where the zone mirror is fed from
pub enum ZoneSource {
    /// Fixed zones from configuration
    Static(Vec<ForbiddenZone>),
    /// Live Realtime Database collection
    Rtdb(RtdbZoneSource),
}

impl ZoneSource {
    pub fn from_config(config: &ZonesConfig, default_size: ZoneSize) -> Self {
        match &config.database_url {
            Some(url) => ZoneSource::Rtdb(RtdbZoneSource::new(
                url,
                &config.path,
                config.auth_token.clone(),
                Duration::from_secs(config.retry_seconds),
                default_size,
            )
            .with_idle_timeout(Duration::from_secs(config.idle_timeout_seconds))),
            None => ZoneSource::Static(config.static_zones.clone()),
        }
    }

    /// Populate the registry once. Failure here is a startup failure.
    pub async fn load_initial(&self, registry: &ZoneRegistry) -> Result<()> {
        match self {
            ZoneSource::Static(zones) => {
                registry.replace_all(zones.clone());
            }
            ZoneSource::Rtdb(source) => {
                // Same path as a root put on the stream, so raw records are kept
                let snapshot = RtdbEvent::Put {
                    path: "/".to_string(),
                    data: source.fetch_snapshot().await?,
                };
                registry
                    .apply_event(&snapshot, source.default_size)
                    .context("Failed to apply zone collection")?;
            }
        }
        info!(zones = registry.len(), "Zone registry loaded");
        Ok(())
    }

    /// Keep the registry in sync until the task is dropped
    pub async fn run(self, registry: Arc<ZoneRegistry>) {
        match self {
            ZoneSource::Static(_) => {}
            ZoneSource::Rtdb(source) => source.run(registry).await,
        }
    }
}

/// Firebase Realtime Database REST streaming client for the zone collection
pub struct RtdbZoneSource {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
    retry: Duration,
    /// Longest silence tolerated on an open stream (keep-alives included)
    idle_timeout: Duration,
    default_size: ZoneSize,
}

impl RtdbZoneSource {
    pub fn new(
        database_url: &str,
        path: &str,
        auth_token: Option<String>,
        retry: Duration,
        default_size: ZoneSize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: rtdb_url(database_url, path),
            auth_token,
            retry,
            idle_timeout: Duration::from_secs(60),
            default_size,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let req = self.client.get(&self.url);
        match &self.auth_token {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        }
    }

    /// One-shot read of the whole collection, as stored
    pub async fn fetch_snapshot(&self) -> Result<serde_json::Value> {
        let data: serde_json::Value = self
            .request()
            .send()
            .await
            .context("Failed to reach zone database")?
            .error_for_status()
            .context("Zone database rejected request")?
            .json()
            .await
            .context("Zone collection is not valid JSON")?;

        Ok(data)
    }

    /// Stream forever; on failure keep last-known zones and retry.
    pub async fn run(self, registry: Arc<ZoneRegistry>) {
        loop {
            match self.stream_once(&registry).await {
                Ok(()) => info!("Zone stream ended, reconnecting"),
                Err(e) => warn!(
                    error = %e,
                    zones = registry.len(),
                    "Zone stream failed; keeping last-known zones"
                ),
            }
            tokio::time::sleep(self.retry).await;
        }
    }

    async fn stream_once(&self, registry: &ZoneRegistry) -> Result<()> {
        let response = timeout(
            self.idle_timeout,
            self.request().header(ACCEPT, "text/event-stream").send(),
        )
        .await
        .map_err(|_| anyhow!("zone stream did not answer within {:?}", self.idle_timeout))?
        .context("Failed to open zone stream")?
            .error_for_status()
            .context("Zone stream rejected")?;

        info!(url = %self.url, "Zone stream opened");

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        // The server sends keep-alive events regularly; silence means a dead link
        while let Some(chunk) = timeout(self.idle_timeout, body.next())
            .await
            .map_err(|_| anyhow!("zone stream silent for {:?}", self.idle_timeout))?
        {
            let chunk = chunk.context("Zone stream read failed")?;
            for sse in decoder.push(&chunk) {
                let event = match RtdbEvent::parse(&sse) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Skipping zone stream event");
                        continue;
                    }
                };

                match &event {
                    RtdbEvent::Cancel(reason) => bail!("zone stream cancelled: {}", reason),
                    RtdbEvent::AuthRevoked => return Err(anyhow!("zone stream credential revoked")),
                    _ => {}
                }

                match registry.apply_event(&event, self.default_size) {
                    Ok(change) if !change.is_empty() => info!(
                        reset = change.reset,
                        upserted = ?change.upserted,
                        removed = ?change.removed,
                        zones = registry.len(),
                        "Zone registry updated"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Skipping zone stream event"),
                }
            }
        }

        Ok(())
    }
}

/// `{database_url}/{path}.json` with stray slashes removed
pub fn rtdb_url(database_url: &str, path: &str) -> String {
    format!(
        "{}/{}.json",
        database_url.trim_end_matches('/'),
        path.trim_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Point3;

    #[test]
    fn test_rtdb_url() {
        assert_eq!(
            rtdb_url("https://db.example.app/", "/uwb/forbidden/zones"),
            "https://db.example.app/uwb/forbidden/zones.json"
        );
    }

    #[tokio::test]
    async fn test_static_source_loads_configured_zones() {
        let config = ZonesConfig {
            static_zones: vec![ForbiddenZone::new(
                "dock",
                Point3::new(1.0, 1.0, 1.0),
                ZoneSize::new(2.0, 2.0, 2.0),
            )],
            ..ZonesConfig::default()
        };
        let source = ZoneSource::from_config(&config, ZoneSize::default());
        assert!(matches!(source, ZoneSource::Static(_)));

        let registry = ZoneRegistry::new();
        source.load_initial(&registry).await.unwrap();
        assert_eq!(registry.get("dock").unwrap().center, Point3::new(1.0, 1.0, 1.0));
    }

    #[tokio::test]
    async fn test_silent_stream_fails_for_retry() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        // Answers with stream headers, then never sends another byte
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let source = RtdbZoneSource::new(
            &format!("http://{}", addr),
            "zones",
            None,
            Duration::from_secs(1),
            ZoneSize::default(),
        )
        .with_idle_timeout(Duration::from_millis(200));
        let registry = ZoneRegistry::with_zones([ForbiddenZone::new(
            "kept",
            Point3::new(1.0, 1.0, 1.0),
            ZoneSize::default(),
        )]);

        let result = tokio::time::timeout(Duration::from_secs(5), source.stream_once(&registry))
            .await
            .expect("stalled stream should give up on its own");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("silent"), "{}", err);

        // Last-known zones survive the failure
        assert!(registry.get("kept").is_some());
        server.abort();
    }

    #[test]
    fn test_database_config_selects_stream_source() {
        let config = ZonesConfig {
            database_url: Some("https://db.example.app".to_string()),
            ..ZonesConfig::default()
        };
        match ZoneSource::from_config(&config, ZoneSize::default()) {
            ZoneSource::Rtdb(source) => {
                assert_eq!(source.url(), "https://db.example.app/uwb/forbidden/zones.json")
            }
            ZoneSource::Static(_) => panic!("expected database source"),
        }
    }
}
