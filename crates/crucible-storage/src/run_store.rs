use std::collections::HashMap;
use std::sync::RwLock;

use crucible_core::record::RunRecord;

/// In-memory, process-lifetime mapping from run id to the final run record.
/// Written exactly once per run at the end of the pipeline; no iteration,
/// no eviction.
#[derive(Debug, Default)]
pub struct RunStore {
    inner: RwLock<HashMap<String, RunRecord>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: RunRecord) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.insert(record.id.clone(), record);
    }

    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.get(run_id).cloned()
    }
}
