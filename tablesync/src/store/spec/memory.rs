use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SyncResult;
use crate::spec::{SpecRow, SyncSpec, parse_spec_rows};
use crate::store::spec::SpecStore;

/// In-memory [`SpecStore`] holding raw rows.
///
/// Rows go through the same parsing and validation as rows read from Postgres.
#[derive(Debug, Clone, Default)]
pub struct MemorySpecStore {
    rows: Arc<Mutex<Vec<SpecRow>>>,
}

impl MemorySpecStore {
    pub fn new(rows: Vec<SpecRow>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub async fn push_row(&self, row: SpecRow) {
        self.rows.lock().await.push(row);
    }

    pub async fn rows(&self) -> Vec<SpecRow> {
        self.rows.lock().await.clone()
    }
}

impl SpecStore for MemorySpecStore {
    async fn load_specs(&self) -> SyncResult<Vec<SyncSpec>> {
        let rows = self.rows.lock().await;

        parse_spec_rows(&rows)
    }
}
