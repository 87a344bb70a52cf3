// InfluxDB repository implementation
use crate::application::telemetry_repository::{RepositoryError, TelemetryRepository};
use crate::domain::daily::{DailyEnergyRecord, ReadingStats};
use crate::domain::sample::HeatingSample;
use crate::domain::subsystem::Subsystem;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;

const SAMPLE_MEASUREMENT: &str = "heating_sample";
const DAILY_MEASUREMENT: &str = "heating_daily";
const WRITE_BATCH_LINES: usize = 5_000;

/// Samples and daily records stored as points keyed by measurement, tags and
/// timestamp, so writing the same point twice overwrites it.
#[derive(Debug, Clone)]
pub struct InfluxRepository {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<Value>>,
}

impl InfluxRepository {
    pub fn new(host: String, token: String, database: String, retention_policy: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token,
            database,
            retention_policy,
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy),
            urlencoding::encode(query)
        )
    }

    fn build_write_url(&self) -> String {
        format!(
            "{}/write?db={}&rp={}&precision=s",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse, RepositoryError> {
        tracing::debug!("Executing InfluxQL query: {}", query);
        let response = self
            .client
            .get(self.build_query_url(query))
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Status { status, body });
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        if let Some(error) = data.results.iter().find_map(|r| r.error.as_ref()) {
            return Err(RepositoryError::Query(error.clone()));
        }

        Ok(data)
    }

    async fn write_lines(&self, lines: &[String]) -> Result<(), RepositoryError> {
        for batch in lines.chunks(WRITE_BATCH_LINES) {
            let response = self
                .client
                .post(self.build_write_url())
                .header("Authorization", format!("Token {}", self.token))
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(batch.join("\n"))
                .send()
                .await
                .map_err(|e| RepositoryError::Transport(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(RepositoryError::Status { status, body });
            }
        }

        tracing::debug!("Wrote {} points to InfluxDB", lines.len());
        Ok(())
    }
}

#[async_trait]
impl TelemetryRepository for InfluxRepository {
    async fn upsert_samples(&self, samples: &[HeatingSample]) -> Result<(), RepositoryError> {
        let lines: Vec<String> = samples.iter().map(sample_line).collect();
        self.write_lines(&lines).await
    }

    async fn load_samples(&self) -> Result<Vec<HeatingSample>, RepositoryError> {
        let query = format!("SELECT * FROM {SAMPLE_MEASUREMENT}");
        let response = self.execute_query(&query).await?;
        let samples = decode_rows(&response, decode_sample)?;
        tracing::info!("Loaded {} stored samples from InfluxDB", samples.len());
        Ok(samples)
    }

    async fn upsert_daily_records(&self, records: &[DailyEnergyRecord]) -> Result<(), RepositoryError> {
        let lines: Vec<String> = records.iter().map(daily_line).collect();
        self.write_lines(&lines).await
    }

    async fn list_daily_records(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyEnergyRecord>, RepositoryError> {
        let query = daily_query(from, to);
        let response = self.execute_query(&query).await?;
        decode_rows(&response, decode_daily)
    }
}

fn epoch_seconds(timestamp: NaiveDateTime) -> i64 {
    timestamp.and_utc().timestamp()
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn sample_line(sample: &HeatingSample) -> String {
    let mut line = format!(
        "{SAMPLE_MEASUREMENT} collector_temp={},outside_temp={},dhw_temp_top={},dhw_temp_bottom={},\
         flow_temp={},flow_temp_setpoint={},sensor_temp={},return_temp={},fan_control={},fan_speed={},\
         boiler_pump_speed={},collector_pump_on={},boiler_pump_on={},dhw_pump_on={},\
         burner_state=\"{}\",solar_status=\"{}\",water_pressure={},burner_starts={}i",
        sample.collector_temp,
        sample.outside_temp,
        sample.dhw_temp_top,
        sample.dhw_temp_bottom,
        sample.flow_temp,
        sample.flow_temp_setpoint,
        sample.sensor_temp,
        sample.return_temp,
        sample.fan_control,
        sample.fan_speed,
        sample.boiler_pump_speed,
        sample.collector_pump_on,
        sample.boiler_pump_on,
        sample.dhw_pump_on,
        escape_string(&sample.burner_state),
        escape_string(&sample.solar_status),
        sample.water_pressure,
        sample.burner_starts,
    );
    if let Some(modulation) = sample.boiler_modulation_percent {
        let _ = write!(line, ",boiler_modulation_percent={modulation}");
    }
    let _ = write!(line, " {}", epoch_seconds(sample.timestamp));
    line
}

fn daily_line(record: &DailyEnergyRecord) -> String {
    let mut fields = Vec::new();
    for subsystem in Subsystem::ALL {
        fields.push(format!("{subsystem}_energy_kwh={}", record.energy_kwh(subsystem)));
        fields.push(format!("{subsystem}_active_minutes={}i", record.active_minutes(subsystem)));
    }
    for (name, stats) in [
        ("collector_temp", &record.collector_temp),
        ("outside_temp", &record.outside_temp),
        ("dhw_temp_top", &record.dhw_temp_top),
        ("flow_temp", &record.flow_temp),
        ("water_pressure", &record.water_pressure),
    ] {
        fields.push(format!(
            "{name}_avg={},{name}_min={},{name}_max={}",
            stats.avg, stats.min, stats.max
        ));
    }
    fields.push(format!("burner_starts={}i", record.burner_starts));
    fields.push(format!("data_points_count={}i", record.data_points_count));

    format!(
        "{DAILY_MEASUREMENT},date={} {} {}",
        record.date.format("%Y-%m-%d"),
        fields.join(","),
        epoch_seconds(midnight(record.date))
    )
}

fn daily_query(from: Option<NaiveDate>, to: Option<NaiveDate>) -> String {
    let mut conditions = Vec::new();
    if let Some(from) = from {
        conditions.push(format!("time >= '{}'", midnight(from).format("%Y-%m-%dT%H:%M:%SZ")));
    }
    if let Some(to) = to {
        conditions.push(format!("time <= '{}'", midnight(to).format("%Y-%m-%dT%H:%M:%SZ")));
    }

    if conditions.is_empty() {
        format!("SELECT * FROM {DAILY_MEASUREMENT}")
    } else {
        format!("SELECT * FROM {DAILY_MEASUREMENT} WHERE {}", conditions.join(" AND "))
    }
}

/// One result row, addressed by column name.
struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Row<'_> {
    fn value(&self, name: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == name)?;
        self.values.get(index).filter(|v| !v.is_null())
    }

    fn missing(name: &str) -> RepositoryError {
        RepositoryError::Decode(format!("missing or invalid column `{name}`"))
    }

    fn f64(&self, name: &str) -> Result<f64, RepositoryError> {
        self.opt_f64(name).ok_or_else(|| Self::missing(name))
    }

    fn opt_f64(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_f64)
    }

    fn u64(&self, name: &str) -> Result<u64, RepositoryError> {
        self.value(name)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
            .ok_or_else(|| Self::missing(name))
    }

    fn bool(&self, name: &str) -> Result<bool, RepositoryError> {
        self.value(name).and_then(Value::as_bool).ok_or_else(|| Self::missing(name))
    }

    fn string(&self, name: &str) -> Result<String, RepositoryError> {
        self.value(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Self::missing(name))
    }

    fn time(&self) -> Result<NaiveDateTime, RepositoryError> {
        let raw = self.value("time").and_then(Value::as_str).ok_or_else(|| Self::missing("time"))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.naive_utc())
            .map_err(|e| RepositoryError::Decode(format!("invalid time `{raw}`: {e}")))
    }

    fn stats(&self, name: &str) -> Result<ReadingStats, RepositoryError> {
        Ok(ReadingStats {
            avg: self.f64(&format!("{name}_avg"))?,
            min: self.f64(&format!("{name}_min"))?,
            max: self.f64(&format!("{name}_max"))?,
        })
    }
}

fn decode_rows<T>(
    response: &InfluxQLResponse,
    decode: impl Fn(&Row<'_>) -> Result<T, RepositoryError>,
) -> Result<Vec<T>, RepositoryError> {
    let mut items = Vec::new();
    for series in response.results.iter().filter_map(|r| r.series.as_ref()).flatten() {
        for values in &series.values {
            let row = Row {
                columns: &series.columns,
                values,
            };
            items.push(decode(&row)?);
        }
    }
    Ok(items)
}

fn decode_sample(row: &Row<'_>) -> Result<HeatingSample, RepositoryError> {
    Ok(HeatingSample {
        timestamp: row.time()?,
        collector_temp: row.f64("collector_temp")?,
        outside_temp: row.f64("outside_temp")?,
        dhw_temp_top: row.f64("dhw_temp_top")?,
        dhw_temp_bottom: row.f64("dhw_temp_bottom")?,
        flow_temp: row.f64("flow_temp")?,
        flow_temp_setpoint: row.f64("flow_temp_setpoint")?,
        sensor_temp: row.f64("sensor_temp")?,
        return_temp: row.f64("return_temp")?,
        boiler_modulation_percent: row.opt_f64("boiler_modulation_percent"),
        fan_control: row.f64("fan_control")?,
        fan_speed: row.f64("fan_speed")?,
        boiler_pump_speed: row.f64("boiler_pump_speed")?,
        collector_pump_on: row.bool("collector_pump_on")?,
        boiler_pump_on: row.bool("boiler_pump_on")?,
        dhw_pump_on: row.bool("dhw_pump_on")?,
        burner_state: row.string("burner_state")?,
        solar_status: row.string("solar_status")?,
        water_pressure: row.f64("water_pressure")?,
        burner_starts: row.u64("burner_starts")?,
    })
}

fn decode_daily(row: &Row<'_>) -> Result<DailyEnergyRecord, RepositoryError> {
    let date = match row.value("date").and_then(Value::as_str) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(format!("invalid date `{raw}`: {e}")))?,
        None => row.time()?.date(),
    };

    Ok(DailyEnergyRecord {
        date,
        solar_energy_kwh: row.f64("solar_energy_kwh")?,
        gas_energy_kwh: row.f64("gas_energy_kwh")?,
        heating_energy_kwh: row.f64("heating_energy_kwh")?,
        solar_active_minutes: row.u64("solar_active_minutes")? as usize,
        gas_active_minutes: row.u64("gas_active_minutes")? as usize,
        heating_active_minutes: row.u64("heating_active_minutes")? as usize,
        collector_temp: row.stats("collector_temp")?,
        outside_temp: row.stats("outside_temp")?,
        dhw_temp_top: row.stats("dhw_temp_top")?,
        flow_temp: row.stats("flow_temp")?,
        water_pressure: row.stats("water_pressure")?,
        burner_starts: row.u64("burner_starts")?,
        data_points_count: row.u64("data_points_count")? as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::daily::daily_aggregate;
    use crate::domain::energy::{DerivationSettings, DerivedSeries};
    use crate::domain::test_support::{day, dhw_sample, minute, sample_at};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn repository() -> InfluxRepository {
        InfluxRepository::new(
            "http://influx:8086/".to_string(),
            "token".to_string(),
            "heating".to_string(),
            "autogen".to_string(),
        )
    }

    #[test]
    fn test_urls() {
        let repo = repository();

        assert_eq!(
            repo.build_write_url(),
            "http://influx:8086/write?db=heating&rp=autogen&precision=s"
        );
        assert_eq!(
            repo.build_query_url("SELECT * FROM heating_sample"),
            "http://influx:8086/query?db=heating&rp=autogen&q=SELECT%20%2A%20FROM%20heating_sample"
        );
    }

    #[test]
    fn test_sample_line_omits_missing_modulation() {
        let mut sample = sample_at(minute(0));
        sample.solar_status = "Say \"hi\"".to_string();

        let line = sample_line(&sample);

        assert!(line.starts_with("heating_sample collector_temp="));
        assert!(!line.contains("boiler_modulation_percent"));
        assert!(line.contains("solar_status=\"Say \\\"hi\\\"\""));
        assert!(line.ends_with(" 1709251200"));
    }

    #[test]
    fn test_sample_line_includes_modulation() {
        let line = sample_line(&dhw_sample(1, Some(42.5)));

        assert!(line.contains(",boiler_modulation_percent=42.5 "));
        assert!(line.contains("dhw_pump_on=true"));
        assert!(line.ends_with(" 1709251260"));
    }

    #[test]
    fn test_daily_line_keyed_by_date() {
        let samples = [dhw_sample(0, Some(50.0))];
        let derived = DerivedSeries::derive(&samples, &DerivationSettings::default());
        let record = daily_aggregate(day(2024, 3, 1), &samples, &derived);

        let line = daily_line(&record);

        assert!(line.starts_with("heating_daily,date=2024-03-01 "));
        assert!(line.contains("gas_active_minutes=1i"));
        assert!(line.contains("collector_temp_avg="));
        assert!(line.ends_with(" 1709251200"));
    }

    #[test]
    fn test_daily_query_bounds() {
        assert_eq!(daily_query(None, None), "SELECT * FROM heating_daily");
        assert_eq!(
            daily_query(Some(day(2024, 3, 1)), Some(day(2024, 3, 2))),
            "SELECT * FROM heating_daily WHERE time >= '2024-03-01T00:00:00Z' AND time <= '2024-03-02T00:00:00Z'"
        );
    }

    #[test]
    fn test_decode_samples() {
        let response: InfluxQLResponse = serde_json::from_value(json!({
            "results": [{
                "series": [{
                    "name": "heating_sample",
                    "columns": [
                        "time", "boiler_modulation_percent", "boiler_pump_on", "boiler_pump_speed",
                        "burner_starts", "burner_state", "collector_pump_on", "collector_temp",
                        "dhw_pump_on", "dhw_temp_bottom", "dhw_temp_top", "fan_control", "fan_speed",
                        "flow_temp", "flow_temp_setpoint", "outside_temp", "return_temp",
                        "sensor_temp", "solar_status", "water_pressure"
                    ],
                    "values": [[
                        "2024-03-01T00:01:00Z", 42.5, true, 0.0,
                        10, "In operation", false, 30.0,
                        true, 35.0, 50.0, 0.0, 0.0,
                        40.0, 45.0, 5.0, 30.0,
                        28.0, "Idle", 1.5
                    ], [
                        "2024-03-01T00:02:00Z", null, false, 0.0,
                        10, "Off", false, 30.0,
                        false, 35.0, 50.0, 0.0, 0.0,
                        40.0, 45.0, 5.0, 30.0,
                        28.0, "Idle", 1.5
                    ]]
                }]
            }]
        }))
        .expect("valid response");

        let samples = decode_rows(&response, decode_sample).expect("decode");

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, minute(1));
        assert_eq!(samples[0].boiler_modulation_percent, Some(42.5));
        assert_eq!(samples[0].burner_starts, 10);
        assert!(samples[0].dhw_pump_on);
        assert_eq!(samples[1].boiler_modulation_percent, None);
        assert_eq!(samples[1].burner_state, "Off");
    }

    #[test]
    fn test_decode_reports_missing_column() {
        let response: InfluxQLResponse = serde_json::from_value(json!({
            "results": [{
                "series": [{
                    "name": "heating_sample",
                    "columns": ["time", "collector_temp"],
                    "values": [["2024-03-01T00:00:00Z", 30.0]]
                }]
            }]
        }))
        .expect("valid response");

        let err = decode_rows(&response, decode_sample).expect_err("incomplete row");

        assert!(matches!(err, RepositoryError::Decode(_)));
    }

    #[test]
    fn test_decode_empty_result() {
        let response: InfluxQLResponse =
            serde_json::from_value(json!({ "results": [{ "statement_id": 0 }] })).expect("valid response");

        assert!(decode_rows(&response, decode_daily).expect("decode").is_empty());
    }
}
