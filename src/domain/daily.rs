// Daily energy aggregate - one summary row per calendar date
use crate::domain::energy::DerivedSeries;
use crate::domain::sample::HeatingSample;
use crate::domain::subsystem::Subsystem;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Average, minimum and maximum of one reading over a day. All zero for an empty day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadingStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl ReadingStats {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return Self::default();
        }

        Self {
            avg: sum / count as f64,
            min,
            max,
        }
    }
}

/// Persisted per-date summary. Keyed by `date`; recomputing a date yields the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEnergyRecord {
    pub date: NaiveDate,
    pub solar_energy_kwh: f64,
    pub gas_energy_kwh: f64,
    pub heating_energy_kwh: f64,
    pub solar_active_minutes: usize,
    pub gas_active_minutes: usize,
    pub heating_active_minutes: usize,
    pub collector_temp: ReadingStats,
    pub outside_temp: ReadingStats,
    pub dhw_temp_top: ReadingStats,
    pub flow_temp: ReadingStats,
    pub water_pressure: ReadingStats,
    /// Increase of the burner start counter over the day.
    pub burner_starts: u64,
    pub data_points_count: usize,
}

impl DailyEnergyRecord {
    pub fn energy_kwh(&self, subsystem: Subsystem) -> f64 {
        match subsystem {
            Subsystem::Solar => self.solar_energy_kwh,
            Subsystem::Gas => self.gas_energy_kwh,
            Subsystem::Heating => self.heating_energy_kwh,
        }
    }

    pub fn active_minutes(&self, subsystem: Subsystem) -> usize {
        match subsystem {
            Subsystem::Solar => self.solar_active_minutes,
            Subsystem::Gas => self.gas_active_minutes,
            Subsystem::Heating => self.heating_active_minutes,
        }
    }
}

/// Aggregates the samples recorded on `date`.
///
/// `samples` is the whole chronologically sorted series and `derived` its full-resolution
/// derivation, index-aligned with it. Energy and activity are prefix differences over the
/// day's index window, so the row matches range statistics for the same window.
pub fn daily_aggregate(date: NaiveDate, samples: &[HeatingSample], derived: &DerivedSeries) -> DailyEnergyRecord {
    let start = samples.partition_point(|s| s.date() < date);
    let end = samples.partition_point(|s| s.date() <= date);
    day_record(date, &samples[start..end], derived, start)
}

/// One record per date present in a chronologically sorted slice.
pub fn daily_aggregates(samples: &[HeatingSample], derived: &DerivedSeries) -> Vec<DailyEnergyRecord> {
    let mut offset = 0;
    samples
        .chunk_by(|a, b| a.date() == b.date())
        .map(|day| {
            let record = day_record(day[0].date(), day, derived, offset);
            offset += day.len();
            record
        })
        .collect()
}

fn day_record(date: NaiveDate, day: &[HeatingSample], derived: &DerivedSeries, offset: usize) -> DailyEnergyRecord {
    let window = day.len().checked_sub(1).map(|last| (offset, offset + last));
    let energy = |subsystem| window.map_or(0.0, |(start, end)| derived.energy_between(subsystem, start, end));
    let active = |subsystem| window.map_or(0, |(start, end)| derived.active_between(subsystem, start, end));

    let burner_starts = match (
        day.iter().map(|s| s.burner_starts).min(),
        day.iter().map(|s| s.burner_starts).max(),
    ) {
        (Some(min), Some(max)) => max - min,
        _ => 0,
    };

    DailyEnergyRecord {
        date,
        solar_energy_kwh: energy(Subsystem::Solar),
        gas_energy_kwh: energy(Subsystem::Gas),
        heating_energy_kwh: energy(Subsystem::Heating),
        solar_active_minutes: active(Subsystem::Solar),
        gas_active_minutes: active(Subsystem::Gas),
        heating_active_minutes: active(Subsystem::Heating),
        collector_temp: ReadingStats::from_values(day.iter().map(|s| s.collector_temp)),
        outside_temp: ReadingStats::from_values(day.iter().map(|s| s.outside_temp)),
        dhw_temp_top: ReadingStats::from_values(day.iter().map(|s| s.dhw_temp_top)),
        flow_temp: ReadingStats::from_values(day.iter().map(|s| s.flow_temp)),
        water_pressure: ReadingStats::from_values(day.iter().map(|s| s.water_pressure)),
        burner_starts,
        data_points_count: day.len(),
    }
}
