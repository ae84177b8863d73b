use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StoreError};
use crate::materialize::{HitMaterializer, RowMaterializer};
use crate::relational::RelationalStore;
use crate::text::TextIndex;

/// Everything a search needs from one mailbox.
///
/// Operators take `lock()` around each chunk fetch; it is never held while
/// hits are handed to callers.
pub struct MailboxHandle {
    pub relational: Arc<dyn RelationalStore>,
    pub text: Arc<dyn TextIndex>,
    pub materializer: Arc<dyn HitMaterializer>,
    lock: Mutex<()>,
}

impl MailboxHandle {
    pub fn new(relational: Arc<dyn RelationalStore>, text: Arc<dyn TextIndex>) -> Self {
        Self {
            relational,
            text,
            materializer: Arc::new(RowMaterializer),
            lock: Mutex::new(()),
        }
    }

    pub fn with_materializer(mut self, materializer: Arc<dyn HitMaterializer>) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl std::fmt::Debug for MailboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxHandle").finish_non_exhaustive()
    }
}
