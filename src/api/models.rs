//! API models for the streambox item endpoints.
//!
//! The external contract is thin: item endpoints serialize
//! [`crate::ledger::MediaItem`] records directly, so the only dedicated
//! shapes here are the add request/response pair and the error/health
//! envelopes.
//!
//! An add submission looks like:
//!
//! ```json
//! { "locator": "magnet:?xt=urn:btih:..." }
//! ```
//!
//! and is answered with the engine-assigned identifier:
//!
//! ```json
//! { "id": "d2474e86..." }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct AddItemRequest {
    pub locator: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AddItemResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
