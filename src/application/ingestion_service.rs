// Ingestion service - Parse, merge, derive, publish and persist telemetry batches
use crate::application::snapshot::SnapshotStore;
use crate::application::telemetry_repository::{RepositoryError, TelemetryRepository};
use crate::domain::daily::{DailyEnergyRecord, daily_aggregate};
use crate::domain::energy::{DerivationSettings, DerivedSeries};
use crate::domain::sample::HeatingSample;
use crate::infrastructure::telemetry_parser::{ParseError, ParsePolicy, ParseReport, parse_batch};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    #[serde(flatten)]
    pub parse: ParseReport,
    pub added_samples: usize,
    pub duplicate_samples: usize,
    pub total_samples: usize,
    /// Generation of the snapshot serving reads after this batch.
    pub generation: u64,
    pub affected_dates: Vec<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("telemetry batch rejected: {0}")]
    Parse(#[from] ParseError),
    /// The batch was merged and published, but could not be stored.
    #[error("telemetry batch published but not persisted: {source}")]
    Persistence {
        report: Box<IngestReport>,
        #[source]
        source: RepositoryError,
    },
}

/// Samples published but not yet stored, with the dates whose daily records are stale.
/// Retried on the next ingest, even when that batch adds nothing new.
#[derive(Debug, Default)]
struct Unpersisted {
    samples: Vec<HeatingSample>,
    dates: BTreeSet<NaiveDate>,
}

#[derive(Clone)]
pub struct IngestionService {
    repository: Arc<dyn TelemetryRepository>,
    store: Arc<SnapshotStore>,
    settings: DerivationSettings,
    policy: ParsePolicy,
    // Serializes merge, publish and persist so concurrent batches never drop each other.
    writer: Arc<Mutex<Unpersisted>>,
}

impl IngestionService {
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        store: Arc<SnapshotStore>,
        settings: DerivationSettings,
        policy: ParsePolicy,
    ) -> Self {
        Self {
            repository,
            store,
            settings,
            policy,
            writer: Arc::new(Mutex::new(Unpersisted::default())),
        }
    }

    /// Loads persisted samples and publishes them as the initial snapshot.
    pub async fn hydrate(&self) -> Result<usize, RepositoryError> {
        let stored = self.repository.load_samples().await?;
        let _guard = self.writer.lock().await;

        let outcome = self.store.current().samples.merge(stored);
        if outcome.is_noop() {
            return Ok(0);
        }

        let derived = DerivedSeries::derive(outcome.series.as_slice(), &self.settings);
        let snapshot = self.store.publish(outcome.series, derived);
        tracing::info!(
            "Hydrated snapshot generation {} with {} stored samples",
            snapshot.generation,
            snapshot.samples.len()
        );
        Ok(outcome.added.len())
    }

    pub async fn ingest(&self, raw: &str) -> Result<IngestReport, IngestError> {
        let batch = parse_batch(raw, self.policy)?;
        let mut pending = self.writer.lock().await;

        let current = self.store.current();
        let outcome = current.samples.merge(batch.samples);
        let affected_dates: BTreeSet<NaiveDate> = outcome.added.iter().map(|s| s.date()).collect();

        let snapshot = if outcome.is_noop() {
            if pending.samples.is_empty() && pending.dates.is_empty() {
                tracing::debug!(
                    "Batch added no new samples ({} duplicates), snapshot {} unchanged",
                    outcome.duplicates,
                    current.generation
                );
                return Ok(IngestReport {
                    parse: batch.report,
                    added_samples: 0,
                    duplicate_samples: outcome.duplicates,
                    total_samples: current.samples.len(),
                    generation: current.generation,
                    affected_dates: Vec::new(),
                });
            }
            current
        } else {
            let derived = DerivedSeries::derive(outcome.series.as_slice(), &self.settings);
            let snapshot = self.store.publish(outcome.series, derived);
            tracing::info!(
                "Published snapshot generation {}: {} new samples, {} total",
                snapshot.generation,
                outcome.added.len(),
                snapshot.samples.len()
            );
            snapshot
        };

        let report = IngestReport {
            parse: batch.report,
            added_samples: outcome.added.len(),
            duplicate_samples: outcome.duplicates,
            total_samples: snapshot.samples.len(),
            generation: snapshot.generation,
            affected_dates: affected_dates.iter().copied().collect(),
        };

        let mut samples = std::mem::take(&mut pending.samples);
        samples.extend(outcome.added);
        let mut dates = std::mem::take(&mut pending.dates);
        dates.extend(affected_dates);
        if !samples.is_empty() && report.added_samples == 0 {
            tracing::info!("Retrying {} samples that were published but not stored", samples.len());
        }

        let records: Vec<DailyEnergyRecord> = dates
            .iter()
            .map(|date| daily_aggregate(*date, snapshot.samples.as_slice(), &snapshot.derived))
            .collect();

        if let Err(source) = self.persist(&samples, &records).await {
            tracing::warn!("Persisting batch for generation {} failed: {}", snapshot.generation, source);
            *pending = Unpersisted { samples, dates };
            return Err(IngestError::Persistence {
                report: Box::new(report),
                source,
            });
        }

        Ok(report)
    }

    async fn persist(
        &self,
        samples: &[HeatingSample],
        records: &[DailyEnergyRecord],
    ) -> Result<(), RepositoryError> {
        self.repository.upsert_samples(samples).await?;
        self.repository.upsert_daily_records(records).await?;
        tracing::info!("Upserted {} samples and {} daily records", samples.len(), records.len());
        Ok(())
    }
}
