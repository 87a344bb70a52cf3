// Shared fixtures for domain tests
use crate::domain::sample::HeatingSample;
use chrono::{Duration, NaiveDate, NaiveDateTime};

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Minutes since 2024-03-01 00:00.
pub fn minute(offset: i64) -> NaiveDateTime {
    day(2024, 3, 1).and_hms_opt(0, 0, 0).expect("valid time") + Duration::minutes(offset)
}

/// An idle sample: every subsystem off, all readings zero.
pub fn sample_at(timestamp: NaiveDateTime) -> HeatingSample {
    HeatingSample {
        timestamp,
        collector_temp: 0.0,
        outside_temp: 0.0,
        dhw_temp_top: 0.0,
        dhw_temp_bottom: 0.0,
        flow_temp: 0.0,
        flow_temp_setpoint: 0.0,
        sensor_temp: 0.0,
        return_temp: 0.0,
        boiler_modulation_percent: None,
        fan_control: 0.0,
        fan_speed: 0.0,
        boiler_pump_speed: 0.0,
        collector_pump_on: false,
        boiler_pump_on: false,
        dhw_pump_on: false,
        burner_state: "Off".to_string(),
        solar_status: "Idle".to_string(),
        water_pressure: 0.0,
        burner_starts: 0,
    }
}

pub fn solar_sample(offset: i64, collector_temp: f64, sensor_temp: f64) -> HeatingSample {
    HeatingSample {
        collector_temp,
        sensor_temp,
        collector_pump_on: true,
        solar_status: "Charging".to_string(),
        ..sample_at(minute(offset))
    }
}

pub fn dhw_sample(offset: i64, modulation: Option<f64>) -> HeatingSample {
    HeatingSample {
        dhw_pump_on: true,
        burner_state: "In operation".to_string(),
        boiler_modulation_percent: modulation,
        ..sample_at(minute(offset))
    }
}

pub fn heating_sample(offset: i64, modulation: Option<f64>) -> HeatingSample {
    HeatingSample {
        burner_state: "In operation".to_string(),
        boiler_modulation_percent: modulation,
        ..sample_at(minute(offset))
    }
}

pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
