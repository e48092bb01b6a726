//! API utility functions
//!
//! Pure, stateless helpers for HTTP request processing, kept out of
//! services.rs so they can be unit tested.

use crate::api::error::ApiError;
use crate::humanize::ByteSize;

/// Parses and validates Content-Type header for application/json
///
/// Accepts `application/json` with or without a charset parameter;
/// rejects lookalikes such as `application/jsonp` or `text/json`.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Rejects request bodies above the configured payload limit.
pub fn enforce_payload_limit(data: &[u8], limit: ByteSize) -> Result<(), ApiError> {
    if data.len() as u64 > limit.as_u64() {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("text/plain").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_enforce_payload_limit() {
        let data = vec![0u8; 1000];
        assert!(enforce_payload_limit(&data, ByteSize(1000)).is_ok());
        assert!(enforce_payload_limit(&[], ByteSize(10)).is_ok());

        match enforce_payload_limit(&data, ByteSize(999)) {
            Err(ApiError::PayloadTooLarge(size)) => assert_eq!(size, 1000),
            other => panic!("expected PayloadTooLarge, got {:?}", other.err()),
        }
    }
}
