//! Last-mixdown cache
//!
//! Holds at most one mixdown, keyed by the session revision it was rendered
//! from. Every load/unload starts a new revision and invalidates the cache.

use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::services::mixdown::PcmBuffer;

#[derive(Debug)]
struct CachedMixdown {
    revision: Uuid,
    buffer: Arc<PcmBuffer>,
}

/// Failure to reach the cache slot (poisoned lock)
#[derive(Debug, thiserror::Error)]
#[error("render cache unavailable: {0}")]
pub struct CacheError(String);

#[derive(Debug, Default)]
pub struct RenderCache {
    slot: Mutex<Option<CachedMixdown>>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mixdown for `revision`, if that is what the cache holds
    pub fn get(&self, revision: Uuid) -> Option<Arc<PcmBuffer>> {
        let slot = self.slot.lock().ok()?;
        slot.as_ref()
            .filter(|c| c.revision == revision)
            .map(|c| Arc::clone(&c.buffer))
    }

    pub fn store(&self, revision: Uuid, buffer: Arc<PcmBuffer>) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(CachedMixdown { revision, buffer }),
            Err(e) => tracing::warn!("Mixdown not cached: {}", e),
        }
    }

    /// Drop whatever is cached
    pub fn invalidate(&self) -> Result<(), CacheError> {
        let mut slot = self.slot.lock().map_err(|e| CacheError(e.to_string()))?;
        *slot = None;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}
