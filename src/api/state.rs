//! Application state for the API server

use crate::engine::Engine;

/// API server state
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// API version
    pub version: String,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
