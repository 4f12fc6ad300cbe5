//! Application State
//!
//! Shared state across all handlers.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use voice_gateway_config::Settings;
use voice_gateway_core::PipelineConnector;
use voice_gateway_transport::CallControl;

use crate::metrics::record_active_sessions;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration, readable from any handler
    pub config: Arc<RwLock<Settings>>,
    /// Opens a voice pipeline per call
    pub connector: Arc<dyn PipelineConnector>,
    /// Call-control client for hangup/transfer; absent when not configured
    pub call_control: Option<Arc<dyn CallControl>>,
    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: Settings, connector: Arc<dyn PipelineConnector>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            connector,
            call_control: None,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_call_control(mut self, call_control: Arc<dyn CallControl>) -> Self {
        self.call_control = Some(call_control);
        self
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Reserve a session slot, or `None` when at `max_connections`
    pub fn try_acquire_session(&self) -> Option<SessionSlot> {
        let max = self.config.read().server.max_connections;
        let acquired = self
            .active_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            });

        match acquired {
            Ok(previous) => {
                record_active_sessions(previous + 1);
                Some(SessionSlot {
                    counter: Arc::clone(&self.active_sessions),
                })
            },
            Err(_) => None,
        }
    }
}

/// Occupied session slot, released on drop
pub struct SessionSlot {
    counter: Arc<AtomicUsize>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        let previous = self.counter.fetch_sub(1, Ordering::AcqRel);
        record_active_sessions(previous.saturating_sub(1));
    }
}
