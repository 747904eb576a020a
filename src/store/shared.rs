//! Snapshot holder with copy-and-swap reload.
//!
//! Readers take an `Arc` snapshot and keep it for the whole query. A reload
//! builds the replacement store completely before swapping the pointer, so a
//! failed reload leaves the current snapshot in place and in-flight queries
//! never observe a half-loaded table.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::analytics::types::AnalyticsResult;

use super::{LoadOptions, RecordSource, RecordStore};

pub struct SharedStore {
    current: RwLock<Arc<RecordStore>>,
}

impl SharedStore {
    pub fn new(store: RecordStore) -> Self {
        Self {
            current: RwLock::new(Arc::new(store)),
        }
    }

    /// The store queries should run against.
    pub fn snapshot(&self) -> Arc<RecordStore> {
        self.current.read().clone()
    }

    /// Reload from `source`; on error the previous snapshot stays current.
    pub fn reload(
        &self,
        source: &dyn RecordSource,
        options: &LoadOptions,
    ) -> AnalyticsResult<Arc<RecordStore>> {
        let fresh = Arc::new(RecordStore::load_with(source, options)?);
        let previous = self.swap(fresh.clone());
        info!(
            previous_rows = previous.table().len(),
            rows = fresh.table().len(),
            "Swapped registration snapshot"
        );
        Ok(fresh)
    }

    /// Install `store` and return the snapshot it replaced.
    pub fn replace(&self, store: RecordStore) -> Arc<RecordStore> {
        self.swap(Arc::new(store))
    }

    fn swap(&self, next: Arc<RecordStore>) -> Arc<RecordStore> {
        std::mem::replace(&mut *self.current.write(), next)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySource;

    fn source(rows: &[(&str, i64)]) -> MemorySource {
        let mut s = MemorySource::default();
        for (date, n) in rows {
            s.push(date, "2W", "Hero", *n);
        }
        s
    }

    #[test]
    fn snapshot_survives_reload() {
        let initial = RecordStore::load(&source(&[("2022-01-01", 5)])).unwrap();
        let shared = SharedStore::new(initial);
        let before = shared.snapshot();

        shared
            .reload(
                &source(&[("2022-01-01", 5), ("2022-02-01", 9)]),
                &LoadOptions::default(),
            )
            .unwrap();

        assert_eq!(before.table().len(), 1);
        assert_eq!(shared.snapshot().table().len(), 2);
    }

    #[test]
    fn failed_reload_keeps_current_snapshot() {
        let shared = SharedStore::new(RecordStore::load(&source(&[("2022-01-01", 5)])).unwrap());
        let err = shared.reload(&source(&[("2022-01-01", -5)]), &LoadOptions::default());
        assert!(err.is_err());
        assert_eq!(shared.snapshot().table().len(), 1);
    }

    #[test]
    fn snapshots_are_shareable_across_threads() {
        let shared = Arc::new(SharedStore::new(
            RecordStore::load(&source(&[("2022-01-01", 5), ("2022-04-01", 6)])).unwrap(),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.snapshot().table().total_registrations().unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 11);
        }
    }
}
