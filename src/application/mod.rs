// Application layer - Use cases over the derivation engine
pub mod analysis_service;
pub mod daily_service;
pub mod ingestion_service;
pub mod snapshot;
pub mod telemetry_repository;
