// Daily service - Idempotent daily aggregate recompute and listing
use crate::application::snapshot::SnapshotStore;
use crate::application::telemetry_repository::{RepositoryError, TelemetryRepository};
use crate::domain::daily::{DailyEnergyRecord, daily_aggregate, daily_aggregates};
use chrono::NaiveDate;
use std::sync::Arc;

#[derive(Clone)]
pub struct DailyService {
    repository: Arc<dyn TelemetryRepository>,
    store: Arc<SnapshotStore>,
}

impl DailyService {
    pub fn new(repository: Arc<dyn TelemetryRepository>, store: Arc<SnapshotStore>) -> Self {
        Self { repository, store }
    }

    /// Recomputes one date, or every date in the current snapshot, and upserts the records.
    /// One date at a time; a failure leaves earlier dates stored and later ones untouched.
    pub async fn recompute(&self, date: Option<NaiveDate>) -> Result<Vec<DailyEnergyRecord>, RepositoryError> {
        let snapshot = self.store.current();
        let records = match date {
            Some(date) => {
                let record = daily_aggregate(date, snapshot.samples.as_slice(), &snapshot.derived);
                if record.data_points_count == 0 {
                    tracing::debug!("No samples for {}, skipping daily aggregate", date);
                    Vec::new()
                } else {
                    vec![record]
                }
            }
            None if snapshot.samples.is_empty() => {
                tracing::debug!("No samples ingested yet, nothing to recompute");
                Vec::new()
            }
            None => daily_aggregates(snapshot.samples.as_slice(), &snapshot.derived),
        };

        for record in &records {
            self.repository
                .upsert_daily_records(std::slice::from_ref(record))
                .await?;
        }

        tracing::info!("Recomputed {} daily aggregates", records.len());
        Ok(records)
    }

    pub async fn list(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyEnergyRecord>, RepositoryError> {
        self.repository.list_daily_records(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::energy::{DerivationSettings, DerivedSeries};
    use crate::domain::sample::HeatingSample;
    use crate::domain::series::SampleSeries;
    use crate::domain::test_support::{day, dhw_sample, solar_sample};
    use crate::infrastructure::memory_repository::MemoryRepository;
    use pretty_assertions::assert_eq;

    fn service() -> (DailyService, Arc<MemoryRepository>) {
        let mut samples: Vec<HeatingSample> = (0..30).map(|m| solar_sample(m, 50.0, 40.0)).collect();
        samples.extend((1440..1470).map(|m| dhw_sample(m, Some(40.0))));
        let series = SampleSeries::from_samples(samples);
        let settings = DerivationSettings::default();
        let derived = DerivedSeries::derive(series.as_slice(), &settings);
        let store = Arc::new(SnapshotStore::default());
        store.publish(series, derived);

        let repository = Arc::new(MemoryRepository::new());
        (DailyService::new(repository.clone(), store), repository)
    }

    #[tokio::test]
    async fn test_recompute_all_dates_is_idempotent() {
        let (service, repository) = service();

        let first = service.recompute(None).await.expect("recompute");
        let second = service.recompute(None).await.expect("recompute");

        assert_eq!(first, second);
        let stored = repository.list_daily_records(None, None).await.expect("list");
        assert_eq!(stored, first);
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_recompute_single_date() {
        let (service, _) = service();

        let records = service.recompute(Some(day(2024, 3, 2))).await.expect("recompute");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gas_active_minutes, 30);
        assert!(service.recompute(Some(day(2024, 4, 1))).await.expect("recompute").is_empty());
    }
}
