// Domain layer - Telemetry-to-energy derivation engine
pub mod activity;
pub mod daily;
pub mod decimation;
pub mod energy;
pub mod range;
pub mod sample;
pub mod series;
pub mod subsystem;

#[cfg(test)]
pub mod test_support;
