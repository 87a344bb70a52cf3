// Subsystem definitions - activity classification and power model
use crate::domain::sample::HeatingSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Energy consumers of the combined solar/gas plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    /// Solar collector loop.
    Solar,
    /// Gas burner charging domestic hot water.
    Gas,
    /// Gas burner heating the house.
    Heating,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [Subsystem::Solar, Subsystem::Gas, Subsystem::Heating];

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Solar => "solar",
            Subsystem::Gas => "gas",
            Subsystem::Heating => "heating",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subsystem `{0}` (expected solar, gas or heating)")]
pub struct UnknownSubsystem(pub String);

impl FromStr for Subsystem {
    type Err = UnknownSubsystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subsystem::ALL
            .into_iter()
            .find(|subsystem| subsystem.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSubsystem(s.to_string()))
    }
}

/// One value per subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerSubsystem<T> {
    pub solar: T,
    pub gas: T,
    pub heating: T,
}

impl<T> PerSubsystem<T> {
    pub fn from_fn(mut f: impl FnMut(Subsystem) -> T) -> Self {
        Self {
            solar: f(Subsystem::Solar),
            gas: f(Subsystem::Gas),
            heating: f(Subsystem::Heating),
        }
    }

    pub fn get(&self, subsystem: Subsystem) -> &T {
        match subsystem {
            Subsystem::Solar => &self.solar,
            Subsystem::Gas => &self.gas,
            Subsystem::Heating => &self.heating,
        }
    }
}

/// Physical constants of the plant used by the power formulas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlantParameters {
    /// Collector loop volume flow (L/min), assuming 1 kg/L.
    pub collector_flow_rate_l_per_min: f64,
    /// Specific heat of the collector fluid (kJ/kg·K).
    pub specific_heat_kj_per_kg_k: f64,
    /// Rated burner output at 100% modulation (kW). Shared by hot water and house heating.
    pub burner_capacity_kw: f64,
}

impl Default for PlantParameters {
    fn default() -> Self {
        Self {
            collector_flow_rate_l_per_min: 5.5,
            specific_heat_kj_per_kg_k: 4.18,
            burner_capacity_kw: 10.0,
        }
    }
}

/// Predicate deciding whether a subsystem is drawing energy for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityRule {
    /// Solar controller reports charging, or the collector pump runs.
    SolarCharging,
    /// Hot water charging pump runs.
    DhwPump,
    /// Burner in operation with a positive modulation while the hot water pump is off.
    SpaceHeating,
}

impl ActivityRule {
    pub fn is_active(self, sample: &HeatingSample) -> bool {
        match self {
            ActivityRule::SolarCharging => {
                sample.solar_status.contains("Charging") || sample.collector_pump_on
            }
            ActivityRule::DhwPump => sample.dhw_pump_on,
            ActivityRule::SpaceHeating => {
                sample.burner_state.contains("operation")
                    && sample.modulation_percent() > 0.0
                    && !sample.dhw_pump_on
            }
        }
    }
}

/// Instantaneous power formula, before activity gating. Never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerFormula {
    /// flow (L/min) × c (kJ/kg·K) × ΔT (K) / 60 s/min = kJ/s = kW,
    /// with ΔT = collector − sensor clamped at 0.
    CollectorLoop {
        flow_rate_l_per_min: f64,
        specific_heat_kj_per_kg_k: f64,
    },
    /// capacity (kW) × modulation / 100.
    Burner { capacity_kw: f64 },
}

impl PowerFormula {
    pub fn power_kw(&self, sample: &HeatingSample) -> f64 {
        match *self {
            PowerFormula::CollectorLoop {
                flow_rate_l_per_min,
                specific_heat_kj_per_kg_k,
            } => {
                let temp_diff_k = sample.collector_temp - sample.sensor_temp;
                if temp_diff_k > 0.0 {
                    flow_rate_l_per_min * specific_heat_kj_per_kg_k * temp_diff_k / 60.0
                } else {
                    0.0
                }
            }
            PowerFormula::Burner { capacity_kw } => {
                (capacity_kw * sample.modulation_percent() / 100.0).max(0.0)
            }
        }
    }
}

/// Activity predicate plus power formula for one subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubsystemDefinition {
    pub subsystem: Subsystem,
    pub activity: ActivityRule,
    pub power: PowerFormula,
}

impl SubsystemDefinition {
    /// The single definition table shared by every consumer of derived figures.
    pub fn table(plant: &PlantParameters) -> PerSubsystem<SubsystemDefinition> {
        let burner = PowerFormula::Burner {
            capacity_kw: plant.burner_capacity_kw,
        };

        PerSubsystem {
            solar: SubsystemDefinition {
                subsystem: Subsystem::Solar,
                activity: ActivityRule::SolarCharging,
                power: PowerFormula::CollectorLoop {
                    flow_rate_l_per_min: plant.collector_flow_rate_l_per_min,
                    specific_heat_kj_per_kg_k: plant.specific_heat_kj_per_kg_k,
                },
            },
            gas: SubsystemDefinition {
                subsystem: Subsystem::Gas,
                activity: ActivityRule::DhwPump,
                power: burner,
            },
            heating: SubsystemDefinition {
                subsystem: Subsystem::Heating,
                activity: ActivityRule::SpaceHeating,
                power: burner,
            },
        }
    }

    /// Activity flag and gated power (kW) for one sample.
    pub fn evaluate(&self, sample: &HeatingSample) -> (bool, f64) {
        let active = self.activity.is_active(sample);
        let power_kw = if active {
            self.power.power_kw(sample)
        } else {
            0.0
        };
        (active, power_kw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{
        approx_eq, dhw_sample, heating_sample, minute, sample_at, solar_sample,
    };

    fn table() -> PerSubsystem<SubsystemDefinition> {
        SubsystemDefinition::table(&PlantParameters::default())
    }

    #[test]
    fn test_solar_power_from_temperature_difference() {
        let (active, power) = table().solar.evaluate(&solar_sample(0, 50.0, 40.0));

        assert!(active);
        assert!(approx_eq(power, 3.8317, 1e-3));
    }

    #[test]
    fn test_solar_power_is_zero_without_positive_difference() {
        for collector in [40.0, 35.0] {
            let (active, power) = table().solar.evaluate(&solar_sample(0, collector, 40.0));
            assert!(active);
            assert_eq!(power, 0.0);
        }
    }

    #[test]
    fn test_solar_active_from_status_or_pump() {
        let mut by_status = sample_at(minute(0));
        by_status.solar_status = "Charging DHW".to_string();
        assert!(ActivityRule::SolarCharging.is_active(&by_status));

        let mut by_pump = sample_at(minute(0));
        by_pump.collector_pump_on = true;
        assert!(ActivityRule::SolarCharging.is_active(&by_pump));

        let mut hot_collector = sample_at(minute(0));
        hot_collector.collector_temp = 80.0;
        hot_collector.dhw_temp_top = 40.0;
        assert!(!ActivityRule::SolarCharging.is_active(&hot_collector));
    }

    #[test]
    fn test_gas_power_follows_modulation() {
        let (active, power) = table().gas.evaluate(&dhw_sample(0, Some(45.0)));

        assert!(active);
        assert_eq!(power, 4.5);
    }

    #[test]
    fn test_missing_modulation_gives_zero_burner_power() {
        let (gas_active, gas_power) = table().gas.evaluate(&dhw_sample(0, None));
        assert!(gas_active);
        assert_eq!(gas_power, 0.0);

        let (heating_active, heating_power) = table().heating.evaluate(&heating_sample(0, None));
        assert!(!heating_active);
        assert_eq!(heating_power, 0.0);
    }

    #[test]
    fn test_house_heating_requires_burner_operation_and_idle_dhw_pump() {
        let definitions = table();

        let (active, power) = definitions.heating.evaluate(&heating_sample(0, Some(30.0)));
        assert!(active);
        assert_eq!(power, 3.0);

        let mut burner_off = heating_sample(0, Some(30.0));
        burner_off.burner_state = "Off".to_string();
        assert!(!definitions.heating.evaluate(&burner_off).0);

        let dhw = dhw_sample(0, Some(30.0));
        assert!(!definitions.heating.evaluate(&dhw).0);
        assert!(definitions.gas.evaluate(&dhw).0);
    }

    #[test]
    fn test_subsystem_from_str() {
        assert_eq!("solar".parse::<Subsystem>(), Ok(Subsystem::Solar));
        assert_eq!(" Heating ".parse::<Subsystem>(), Ok(Subsystem::Heating));
        assert!("boiler".parse::<Subsystem>().is_err());
    }
}
