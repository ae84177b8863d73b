//! Record of one executed search.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchManifest {
    pub id: ManifestId,

    /// Hash of the optimized plan's query string.
    pub plan_hash: Hash256,

    pub engine_version: String,

    /// Mode each text-bearing relational leaf settled on, in plan order.
    pub execute_modes: Vec<String>,

    pub hits_returned: u64,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl SearchManifest {
    pub fn new(plan_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            plan_hash,
            engine_version: crate::VERSION.to_string(),
            execute_modes: Vec::new(),
            hits_returned: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, hits_returned: u64, execute_modes: Vec<String>) -> Self {
        self.finished_ms = finished_ms;
        self.hits_returned = hits_returned;
        self.execute_modes = execute_modes;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
