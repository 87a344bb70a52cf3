// Repository trait for heating telemetry persistence
use crate::domain::daily::DailyEnergyRecord;
use crate::domain::sample::HeatingSample;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// Failure reported by the persistence collaborator. Kept apart from parse failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage request failed: {0}")]
    Transport(String),
    #[error("storage responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("storage query error: {0}")]
    Query(String),
    #[error("could not decode stored data: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Upsert raw samples keyed by timestamp; existing keys are overwritten with identical data.
    async fn upsert_samples(&self, samples: &[HeatingSample]) -> Result<(), RepositoryError>;

    /// All persisted samples, in any order
    async fn load_samples(&self) -> Result<Vec<HeatingSample>, RepositoryError>;

    /// Upsert daily aggregates keyed by date
    async fn upsert_daily_records(&self, records: &[DailyEnergyRecord]) -> Result<(), RepositoryError>;

    /// Daily aggregates within an inclusive date range, sorted by date
    async fn list_daily_records(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyEnergyRecord>, RepositoryError>;
}
