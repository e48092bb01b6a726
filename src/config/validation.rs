use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroNotAllowed { field: &'static str },

    #[error("state_file path is empty")]
    EmptyStateFile,

    #[error("media_dir path is empty")]
    EmptyMediaDir,

    #[error("engine endpoint '{endpoint}' is not an http(s) URL")]
    InvalidEngineEndpoint { endpoint: String },

    #[error("crf {crf} is out of range (0-51)")]
    CrfOutOfRange { crf: u8 },

    #[error("max_payload_bytes must be greater than zero")]
    ZeroPayloadLimit,
}

/// Sanity-check a loaded configuration before anything is started.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    let nonzero: &[(&'static str, u64)] = &[
        ("store.save_interval_secs", config.store.save_interval_secs),
        ("pipeline.queue_capacity", config.pipeline.queue_capacity as u64),
        ("pipeline.event_capacity", config.pipeline.event_capacity as u64),
        (
            "pipeline.reconcile_interval_secs",
            config.pipeline.reconcile_interval_secs,
        ),
        (
            "pipeline.ws_push_interval_secs",
            config.pipeline.ws_push_interval_secs,
        ),
        ("engine.request_timeout_secs", config.engine.request_timeout_secs),
        ("transcode.segment_secs", config.transcode.segment_secs as u64),
        (
            "transcode.probe_timeout_secs",
            config.transcode.probe_timeout_secs,
        ),
    ];
    for (field, value) in nonzero {
        if *value == 0 {
            return Err(ValidationError::ZeroNotAllowed { field });
        }
    }

    if config.store.state_file.as_os_str().is_empty() {
        return Err(ValidationError::EmptyStateFile);
    }
    if config.server.media_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyMediaDir);
    }

    let endpoint = config.engine.endpoint.as_str();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ValidationError::InvalidEngineEndpoint {
            endpoint: endpoint.to_string(),
        });
    }

    if config.transcode.crf > 51 {
        return Err(ValidationError::CrfOutOfRange {
            crf: config.transcode.crf,
        });
    }

    if config.api.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroPayloadLimit);
    }

    Ok(())
}
