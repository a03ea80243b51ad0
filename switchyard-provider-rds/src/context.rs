//! Shared handles for one provider instance

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::RdsApi;
use crate::waiters::WaitTiming;

/// API handle, cancellation token and poll timing, passed explicitly to
/// every lifecycle and orchestrator operation
#[derive(Clone)]
pub struct RdsContext {
    pub api: Arc<dyn RdsApi>,
    pub cancel: CancellationToken,
    pub timing: WaitTiming,
}

impl RdsContext {
    pub fn new(api: Arc<dyn RdsApi>) -> Self {
        Self {
            api,
            cancel: CancellationToken::new(),
            timing: WaitTiming::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timing(mut self, timing: WaitTiming) -> Self {
        self.timing = timing;
        self
    }
}
