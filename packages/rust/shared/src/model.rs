//! Owned, lazily loaded inference model handles.
//!
//! Adapters hold a [`ModelHandle`] instead of a process-wide singleton. The
//! first call to [`ModelHandle::acquire`] loads the backend; the run driver
//! calls [`ModelHandle::release`] once the batch is over.

use tracing::{debug, info};

use crate::error::Result;

/// Something that can be loaded into and unloaded from an inference server.
pub trait ModelBackend {
    /// Human-readable model identifier for logs.
    fn describe(&self) -> String;

    fn load(&mut self) -> Result<()>;

    fn unload(&mut self) -> Result<()>;
}

/// Lazy wrapper around a [`ModelBackend`].
#[derive(Debug)]
pub struct ModelHandle<B> {
    backend: B,
    loaded: bool,
}

impl<B: ModelBackend> ModelHandle<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: false,
        }
    }

    /// Load on first use and return the backend.
    ///
    /// A failed load leaves the handle unloaded so the next item retries.
    pub fn acquire(&mut self) -> Result<&B> {
        if !self.loaded {
            info!(model = %self.backend.describe(), "loading model");
            self.backend.load()?;
            self.loaded = true;
        }
        Ok(&self.backend)
    }

    /// Unload if loaded. Safe to call repeatedly.
    pub fn release(&mut self) -> Result<()> {
        if !self.loaded {
            debug!(model = %self.backend.describe(), "model not loaded, nothing to release");
            return Ok(());
        }
        self.loaded = false;
        info!(model = %self.backend.describe(), "releasing model");
        self.backend.unload()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Access the backend without loading it.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
