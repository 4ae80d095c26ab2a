use std::future::Future;

use crate::error::SyncResult;
use crate::spec::SyncSpec;

/// Source of the sync specifications driving a run.
///
/// Implementations return a read-only snapshot in a stable order. Every failure, including an
/// unreachable store or a single malformed row, must carry a config-load error kind so the run
/// aborts before touching any table.
pub trait SpecStore {
    fn load_specs(&self) -> impl Future<Output = SyncResult<Vec<SyncSpec>>> + Send;
}
