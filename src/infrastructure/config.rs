use crate::domain::decimation::DEFAULT_DECIMATION_FACTOR;
use crate::domain::energy::{DerivationSettings, IntegrationMode};
use crate::domain::subsystem::PlantParameters;
use crate::infrastructure::telemetry_parser::ParsePolicy;
use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub engine: EngineSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Influx,
    #[default]
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub influx: Option<InfluxSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    pub integration_mode: IntegrationMode,
    pub parse_policy: ParsePolicy,
    /// Display-only sampling factor for chart series.
    pub decimation_factor: usize,
    /// Points per message when streaming a chart series.
    pub max_stream_chunk: usize,
    pub plant: PlantParameters,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            integration_mode: IntegrationMode::default(),
            parse_policy: ParsePolicy::default(),
            decimation_factor: DEFAULT_DECIMATION_FACTOR,
            max_stream_chunk: 500,
            plant: PlantParameters::default(),
        }
    }
}

impl EngineSettings {
    pub fn derivation(&self) -> DerivationSettings {
        DerivationSettings {
            plant: self.plant,
            integration_mode: self.integration_mode,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("server.bind_address `{0}` is not a socket address")]
    BindAddress(String),
    #[error("storage.backend is influx but [storage.influx] is missing")]
    MissingInflux,
    #[error("engine.{0} must be greater than zero")]
    NotPositive(&'static str),
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::BindAddress(self.server.bind_address.clone()))?;

        if self.storage.backend == StorageBackend::Influx && self.storage.influx.is_none() {
            return Err(ConfigError::MissingInflux);
        }

        let engine = &self.engine;
        if engine.decimation_factor == 0 {
            return Err(ConfigError::NotPositive("decimation_factor"));
        }
        if engine.max_stream_chunk == 0 {
            return Err(ConfigError::NotPositive("max_stream_chunk"));
        }
        let plant = &engine.plant;
        for (name, value) in [
            ("plant.collector_flow_rate_l_per_min", plant.collector_flow_rate_l_per_min),
            ("plant.specific_heat_kj_per_kg_k", plant.specific_heat_kj_per_kg_k),
            ("plant.burner_capacity_kw", plant.burner_capacity_kw),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive(name));
            }
        }

        Ok(())
    }
}

/// Reads `config/heating.*` when present, then `HEATING__SECTION__KEY` environment overrides.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/heating").required(false))
        .add_source(
            config::Environment::with_prefix("HEATING")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app: AppConfig = settings.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
