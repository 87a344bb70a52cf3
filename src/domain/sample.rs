// Heating plant sample domain model
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One minute of plant telemetry. Immutable once ingested; the timestamp is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatingSample {
    pub timestamp: NaiveDateTime,
    pub collector_temp: f64,
    pub outside_temp: f64,
    pub dhw_temp_top: f64,
    pub dhw_temp_bottom: f64,
    pub flow_temp: f64,
    pub flow_temp_setpoint: f64,
    /// Return/boiler sensor "B31", the cold side of the collector loop.
    pub sensor_temp: f64,
    pub return_temp: f64,
    /// Burner firing rate in percent of rated capacity; `None` when the controller had no reading.
    pub boiler_modulation_percent: Option<f64>,
    pub fan_control: f64,
    pub fan_speed: f64,
    pub boiler_pump_speed: f64,
    pub collector_pump_on: bool,
    pub boiler_pump_on: bool,
    pub dhw_pump_on: bool,
    pub burner_state: String,
    pub solar_status: String,
    pub water_pressure: f64,
    /// Monotonic burner start counter.
    pub burner_starts: u64,
}

impl HeatingSample {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Modulation with an absent reading counted as 0%.
    pub fn modulation_percent(&self) -> f64 {
        self.boiler_modulation_percent.unwrap_or(0.0)
    }
}
