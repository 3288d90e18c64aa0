//! Application state shared across request handlers.

use std::sync::Arc;

use rulepool_core::fire::TaskHandler;
use rulepool_core::SchedulerBackend;

use crate::placer::Placer;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    placer: Placer,
    backend: Arc<dyn SchedulerBackend>,
    handler: Arc<dyn TaskHandler>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        placer: Placer,
        backend: Arc<dyn SchedulerBackend>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                placer,
                backend,
                handler,
            }),
        }
    }

    pub fn placer(&self) -> &Placer {
        &self.inner.placer
    }

    /// The backend the placer's pool talks to.
    pub fn backend(&self) -> &dyn SchedulerBackend {
        self.inner.backend.as_ref()
    }

    /// Task run when a rule fires.
    pub fn handler(&self) -> &dyn TaskHandler {
        self.inner.handler.as_ref()
    }
}
