// In-process repository implementation
use crate::application::telemetry_repository::{RepositoryError, TelemetryRepository};
use crate::domain::daily::DailyEnergyRecord;
use crate::domain::sample::HeatingSample;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Keeps samples and daily aggregates in ordered maps keyed the same way the
/// database keys them, so upserts are idempotent here too.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    samples: RwLock<BTreeMap<NaiveDateTime, HeatingSample>>,
    daily: RwLock<BTreeMap<NaiveDate, DailyEnergyRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryRepository for MemoryRepository {
    async fn upsert_samples(&self, samples: &[HeatingSample]) -> Result<(), RepositoryError> {
        let mut stored = self.samples.write().await;
        for sample in samples {
            stored.insert(sample.timestamp, sample.clone());
        }
        Ok(())
    }

    async fn load_samples(&self) -> Result<Vec<HeatingSample>, RepositoryError> {
        Ok(self.samples.read().await.values().cloned().collect())
    }

    async fn upsert_daily_records(&self, records: &[DailyEnergyRecord]) -> Result<(), RepositoryError> {
        let mut stored = self.daily.write().await;
        for record in records {
            stored.insert(record.date, record.clone());
        }
        Ok(())
    }

    async fn list_daily_records(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyEnergyRecord>, RepositoryError> {
        Ok(self
            .daily
            .read()
            .await
            .values()
            .filter(|r| from.is_none_or(|from| r.date >= from) && to.is_none_or(|to| r.date <= to))
            .cloned()
            .collect())
    }
}
