use crate::humanize::ByteSize;
use crate::media::transcode::HlsSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub api: ApiLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
            engine: EngineConfig::default(),
            transcode: TranscodeConfig::default(),
            api: ApiLimits::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory the acquisition engine downloads into; converted HLS
    /// output lands next to the sources and is served from here.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8081".parse().unwrap()
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("data/media")
}

/// Durable state store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
}

impl StoreConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            save_interval_secs: default_save_interval_secs(),
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/items.json")
}

fn default_save_interval_secs() -> u64 {
    30
}

/// Reconciler, event bus, and conversion queue sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_ws_push_interval_secs")]
    pub ws_push_interval_secs: u64,
    /// How long shutdown waits for an in-flight transcode before
    /// abandoning it.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl PipelineConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn ws_push_interval(&self) -> Duration {
        Duration::from_secs(self.ws_push_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            ws_push_interval_secs: default_ws_push_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

fn default_event_capacity() -> usize {
    100
}

fn default_reconcile_interval_secs() -> u64 {
    5
}

fn default_ws_push_interval_secs() -> u64 {
    5
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Acquisition engine daemon endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_engine_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_engine_endpoint(),
            request_timeout_secs: default_engine_timeout_secs(),
        }
    }
}

fn default_engine_endpoint() -> String {
    "http://127.0.0.1:9091".to_string()
}

fn default_engine_timeout_secs() -> u64 {
    30
}

/// ffmpeg/ffprobe parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    #[serde(default = "default_segment_secs")]
    pub segment_secs: u32,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl TranscodeConfig {
    pub fn hls_settings(&self) -> HlsSettings {
        HlsSettings {
            preset: self.preset.clone(),
            crf: self.crf,
            audio_bitrate: self.audio_bitrate.clone(),
            segment_secs: self.segment_secs,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            crf: default_crf(),
            audio_bitrate: default_audio_bitrate(),
            segment_secs: default_segment_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_preset() -> String {
    "superfast".to_string()
}

fn default_crf() -> u8 {
    30
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

fn default_segment_secs() -> u32 {
    4
}

fn default_probe_timeout_secs() -> u64 {
    30
}

/// API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8081");
        assert_eq!(config.store.save_interval(), Duration::from_secs(30));
        assert_eq!(config.pipeline.queue_capacity, 100);
        assert_eq!(config.transcode.crf, 30);
        assert_eq!(config.api.max_payload_bytes.as_u64(), 64 * 1024);
    }

    #[test]
    fn test_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
[server]
bind_addr = "127.0.0.1:9000"

[pipeline]
queue_capacity = 10

[api]
max_payload_bytes = "1MB"
            "#,
        )
        .expect("Failed to parse test config");

        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.pipeline.queue_capacity, 10);
        assert_eq!(config.api.max_payload_bytes.as_u64(), 1024 * 1024);
        // Omitted sections fall back to defaults.
        assert_eq!(config.engine.endpoint, "http://127.0.0.1:9091");
    }

    #[test]
    fn test_hls_settings_from_config() {
        let mut transcode = TranscodeConfig::default();
        transcode.preset = "fast".to_string();
        transcode.segment_secs = 6;

        let settings = transcode.hls_settings();
        assert_eq!(settings.preset, "fast");
        assert_eq!(settings.segment_secs, 6);
        assert_eq!(settings.crf, 30);
    }
}
