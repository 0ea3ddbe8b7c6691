//! Shared application state for the negotiation server.

use std::sync::Arc;

use negotiator::session::SessionBoundary;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Entry point for every negotiation the server runs.
    pub boundary: Arc<SessionBoundary>,
}

impl AppState {
    pub fn new(boundary: SessionBoundary) -> Self {
        Self {
            boundary: Arc::new(boundary),
        }
    }
}
