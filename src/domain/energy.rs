// Derived series - per-sample activity/power and cumulative energy
use crate::domain::sample::HeatingSample;
use crate::domain::subsystem::{PerSubsystem, PlantParameters, Subsystem, SubsystemDefinition};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Nominal sample cadence: one minute, in hours.
pub const NOMINAL_INTERVAL_HOURS: f64 = 1.0 / 60.0;

/// How the time step of each sample is chosen when integrating power into energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    /// Every sample counts as one full minute, regardless of gaps in the data.
    #[default]
    FixedInterval,
    /// Each sample counts for the time elapsed since the previous sample.
    /// The first sample counts as one nominal minute.
    ElapsedTime,
}

/// Everything the derivation needs besides the samples themselves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationSettings {
    pub plant: PlantParameters,
    pub integration_mode: IntegrationMode,
}

/// Activity flags and gated power for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DerivedSample {
    pub solar_active: bool,
    pub gas_active: bool,
    pub house_heating_active: bool,
    pub solar_power_kw: f64,
    pub gas_power_kw: f64,
    pub house_heating_power_kw: f64,
}

impl DerivedSample {
    pub fn classify(sample: &HeatingSample, definitions: &PerSubsystem<SubsystemDefinition>) -> Self {
        let (solar_active, solar_power_kw) = definitions.solar.evaluate(sample);
        let (gas_active, gas_power_kw) = definitions.gas.evaluate(sample);
        let (house_heating_active, house_heating_power_kw) = definitions.heating.evaluate(sample);

        Self {
            solar_active,
            gas_active,
            house_heating_active,
            solar_power_kw,
            gas_power_kw,
            house_heating_power_kw,
        }
    }

    pub fn is_active(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Solar => self.solar_active,
            Subsystem::Gas => self.gas_active,
            Subsystem::Heating => self.house_heating_active,
        }
    }

    pub fn power_kw(&self, subsystem: Subsystem) -> f64 {
        match subsystem {
            Subsystem::Solar => self.solar_power_kw,
            Subsystem::Gas => self.gas_power_kw,
            Subsystem::Heating => self.house_heating_power_kw,
        }
    }
}

/// Time step (hours) attributed to each sample.
pub fn interval_hours(timestamps: &[NaiveDateTime], mode: IntegrationMode) -> Vec<f64> {
    match mode {
        IntegrationMode::FixedInterval => vec![NOMINAL_INTERVAL_HOURS; timestamps.len()],
        IntegrationMode::ElapsedTime => timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| match i.checked_sub(1).map(|prev| timestamps[prev]) {
                Some(prev) => ((*ts - prev).num_seconds().max(0) as f64) / 3600.0,
                None => NOMINAL_INTERVAL_HOURS,
            })
            .collect(),
    }
}

/// Running integral: `cumulative[i] = cumulative[i-1] + power[i] * dt[i]`.
pub fn integrate(power_kw: impl IntoIterator<Item = f64>, dt_hours: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    power_kw
        .into_iter()
        .zip(dt_hours)
        .map(|(power, dt)| {
            total += power.max(0.0) * dt;
            total
        })
        .collect()
}

/// Running count of active samples: `prefix[i]` = active samples in `0..=i`.
fn active_prefix(flags: impl IntoIterator<Item = bool>) -> Vec<usize> {
    let mut count = 0;
    flags
        .into_iter()
        .map(|active| {
            count += usize::from(active);
            count
        })
        .collect()
}

/// Full-resolution derived data, index-aligned with the source samples.
///
/// This is the single source for every energy or activity figure. Display
/// decimation only ever holds indices into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedSeries {
    timestamps: Vec<NaiveDateTime>,
    samples: Vec<DerivedSample>,
    cumulative_kwh: PerSubsystem<Vec<f64>>,
    active_prefix: PerSubsystem<Vec<usize>>,
}

impl DerivedSeries {
    /// Classifies, models power and integrates energy for a chronologically sorted sample slice.
    pub fn derive(samples: &[HeatingSample], settings: &DerivationSettings) -> Self {
        let definitions = SubsystemDefinition::table(&settings.plant);
        let timestamps: Vec<NaiveDateTime> = samples.iter().map(|s| s.timestamp).collect();
        let derived: Vec<DerivedSample> = samples
            .iter()
            .map(|s| DerivedSample::classify(s, &definitions))
            .collect();

        let dt_hours = interval_hours(&timestamps, settings.integration_mode);
        let cumulative_kwh = PerSubsystem::from_fn(|subsystem| {
            integrate(derived.iter().map(|d| d.power_kw(subsystem)), &dt_hours)
        });
        let active_prefix =
            PerSubsystem::from_fn(|subsystem| active_prefix(derived.iter().map(|d| d.is_active(subsystem))));

        Self {
            timestamps,
            samples: derived,
            cumulative_kwh,
            active_prefix,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn samples(&self) -> &[DerivedSample] {
        &self.samples
    }

    pub fn cumulative_kwh(&self, subsystem: Subsystem) -> &[f64] {
        self.cumulative_kwh.get(subsystem)
    }

    pub fn total_energy_kwh(&self, subsystem: Subsystem) -> f64 {
        self.cumulative_kwh(subsystem).last().copied().unwrap_or(0.0)
    }

    pub fn total_active_samples(&self, subsystem: Subsystem) -> usize {
        self.active_prefix.get(subsystem).last().copied().unwrap_or(0)
    }

    /// Energy (kWh) over the inclusive index window, by prefix difference.
    pub fn energy_between(&self, subsystem: Subsystem, start: usize, end: usize) -> f64 {
        prefix_delta(self.cumulative_kwh.get(subsystem), start, end).unwrap_or(0.0)
    }

    /// Active sample count over the inclusive index window, by prefix difference.
    pub fn active_between(&self, subsystem: Subsystem, start: usize, end: usize) -> usize {
        prefix_delta(self.active_prefix.get(subsystem), start, end).unwrap_or(0)
    }
}

fn prefix_delta<T>(prefix: &[T], start: usize, end: usize) -> Option<T>
where
    T: Copy + Default + std::ops::Sub<Output = T>,
{
    if start > end {
        return None;
    }
    let upper = *prefix.get(end)?;
    let lower = match start.checked_sub(1) {
        Some(before) => *prefix.get(before)?,
        None => T::default(),
    };
    Some(upper - lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{
        approx_eq, dhw_sample, heating_sample, minute, sample_at, solar_sample,
    };

    fn mixed_day() -> Vec<HeatingSample> {
        let mut samples = Vec::new();
        for m in 0..240 {
            let sample = match m % 7 {
                0 | 1 => solar_sample(m, 40.0 + (m % 30) as f64, 42.0),
                2 => dhw_sample(m, Some(60.0)),
                3 => dhw_sample(m, None),
                4 => heating_sample(m, Some(25.0)),
                _ => sample_at(minute(m)),
            };
            samples.push(sample);
        }
        samples
    }

    #[test]
    fn test_collector_warming_scenario() {
        let samples = vec![
            solar_sample(0, 50.0, 40.0),
            solar_sample(1, 55.0, 40.0),
            solar_sample(2, 60.0, 40.0),
        ];

        let derived = DerivedSeries::derive(&samples, &DerivationSettings::default());

        let powers: Vec<f64> = derived.samples().iter().map(|d| d.solar_power_kw).collect();
        for (actual, expected) in powers.iter().zip([3.831, 5.745, 7.663]) {
            assert!(approx_eq(*actual, expected, 1e-3), "power {actual} != {expected}");
        }

        let cumulative = derived.cumulative_kwh(Subsystem::Solar);
        for (actual, expected) in cumulative.iter().zip([0.0639, 0.1596, 0.2873]) {
            assert!(approx_eq(*actual, expected, 1e-3), "energy {actual} != {expected}");
        }
    }

    #[test]
    fn test_cumulative_energy_is_monotonic() {
        let derived = DerivedSeries::derive(&mixed_day(), &DerivationSettings::default());

        for subsystem in Subsystem::ALL {
            for pair in derived.cumulative_kwh(subsystem).windows(2) {
                assert!(pair[1] >= pair[0], "{subsystem} energy decreased");
            }
        }
    }

    #[test]
    fn test_gas_and_house_heating_never_overlap() {
        let derived = DerivedSeries::derive(&mixed_day(), &DerivationSettings::default());

        assert!(derived.samples().iter().all(|d| !(d.gas_active && d.house_heating_active)));
        assert!(derived.total_active_samples(Subsystem::Gas) > 0);
        assert!(derived.total_active_samples(Subsystem::Heating) > 0);
    }

    #[test]
    fn test_empty_series_is_all_zero() {
        let derived = DerivedSeries::derive(&[], &DerivationSettings::default());

        assert!(derived.is_empty());
        for subsystem in Subsystem::ALL {
            assert_eq!(derived.total_energy_kwh(subsystem), 0.0);
            assert_eq!(derived.total_active_samples(subsystem), 0);
            assert_eq!(derived.energy_between(subsystem, 0, 0), 0.0);
        }
    }

    #[test]
    fn test_fixed_interval_ignores_gaps() {
        let samples = vec![dhw_sample(0, Some(60.0)), dhw_sample(30, Some(60.0))];

        let derived = DerivedSeries::derive(&samples, &DerivationSettings::default());

        assert!(approx_eq(derived.total_energy_kwh(Subsystem::Gas), 0.2, 1e-9));
    }

    #[test]
    fn test_elapsed_time_integrates_true_gap() {
        let samples = vec![dhw_sample(0, Some(60.0)), dhw_sample(30, Some(60.0))];
        let settings = DerivationSettings {
            integration_mode: IntegrationMode::ElapsedTime,
            ..DerivationSettings::default()
        };

        let derived = DerivedSeries::derive(&samples, &settings);

        // 6 kW for one nominal minute, then 6 kW for 30 minutes.
        assert!(approx_eq(derived.total_energy_kwh(Subsystem::Gas), 0.1 + 3.0, 1e-9));
    }

    #[test]
    fn test_window_queries_use_prefix_difference() {
        let samples: Vec<HeatingSample> = (0..10).map(|m| dhw_sample(m, Some(60.0))).collect();
        let derived = DerivedSeries::derive(&samples, &DerivationSettings::default());

        assert!(approx_eq(derived.energy_between(Subsystem::Gas, 2, 4), 0.3, 1e-9));
        assert_eq!(derived.active_between(Subsystem::Gas, 0, 9), 10);
        assert_eq!(derived.active_between(Subsystem::Gas, 5, 3), 0);
        assert_eq!(derived.active_between(Subsystem::Gas, 5, 30), 0);
    }
}
