// Engine snapshot - samples and derived series published together
use crate::domain::energy::DerivedSeries;
use crate::domain::series::SampleSeries;
use std::sync::{Arc, PoisonError, RwLock};

/// Samples with the series derived from them. Never mutated after publication.
#[derive(Debug, Default)]
pub struct EngineSnapshot {
    /// Incremented on every publication; 0 is the empty startup snapshot.
    pub generation: u64,
    pub samples: SampleSeries,
    pub derived: DerivedSeries,
}

/// Holds the current snapshot. Readers get an `Arc` to a complete snapshot,
/// so a rebuild in progress is never observed.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<EngineSnapshot>>,
}

impl SnapshotStore {
    pub fn current(&self) -> Arc<EngineSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, samples: SampleSeries, derived: DerivedSeries) -> Arc<EngineSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Arc::new(EngineSnapshot {
            generation: current.generation + 1,
            samples,
            derived,
        });
        *current = snapshot.clone();
        snapshot
    }
}
