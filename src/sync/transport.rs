//! Process-wide transport handle.
//!
//! The binary installs its store once at startup with [`init`]. Code that
//! runs before (or without) that gets an in-memory store on first use of
//! [`handle`], so there is exactly one store per process.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use super::store::{KvStore, MemoryStore};

static TRANSPORT: OnceLock<Arc<dyn KvStore>> = OnceLock::new();

/// Installs the process-wide store.
///
/// Returns `false` if a store was already installed, in which case `store`
/// is dropped and the existing one stays in place.
pub fn init(store: Arc<dyn KvStore>) -> bool {
    let installed = TRANSPORT.set(store).is_ok();
    if installed {
        info!("Transport initialized");
    } else {
        debug!("Transport already initialized, keeping existing store");
    }
    installed
}

/// Returns the process-wide store, creating an in-memory one if none was
/// installed.
#[must_use]
pub fn handle() -> Arc<dyn KvStore> {
    Arc::clone(TRANSPORT.get_or_init(|| {
        info!("No transport configured, using in-memory store");
        Arc::new(MemoryStore::new().connect())
    }))
}

/// Returns true once a store is in place.
#[must_use]
pub fn is_initialized() -> bool {
    TRANSPORT.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test: the handle is process-global.
    #[test]
    fn test_init_is_idempotent_and_handle_is_shared() {
        let first = handle();
        assert!(is_initialized());

        let replacement: Arc<dyn KvStore> = Arc::new(MemoryStore::new().connect());
        assert!(!init(replacement));

        let second = handle();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
