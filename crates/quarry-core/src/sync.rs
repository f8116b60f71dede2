//! Coarse shared wrapper around a [`Manager`].
//!
//! The allocators themselves are single-threaded by design. Callers that
//! genuinely need one instance across threads get exactly what the
//! design allows: the whole manager behind a single mutex. Prefer one
//! manager per worker where possible.

use crate::error::AllocError;
use crate::manager::Manager;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to a mutex-guarded [`Manager`].
#[derive(Clone)]
pub struct SharedManager {
    inner: Arc<Mutex<Manager>>,
}

impl SharedManager {
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Manager::new(capacity)?)),
        })
    }

    /// Runs `f` with the manager locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Manager) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
