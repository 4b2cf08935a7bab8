//! Shared state for the HTTP surface.

use crate::engine::ReleaseEngine;

/// Handler state. The engine is internally reference-counted, so cloning the
/// state per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub engine: ReleaseEngine,
}

impl AppState {
    pub fn new(engine: ReleaseEngine) -> Self {
        Self { engine }
    }
}
