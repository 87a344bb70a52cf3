// Delimited telemetry export parser
use crate::domain::sample::HeatingSample;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marks the header row; data rows are only accepted after it.
pub const HEADER_TOKEN: &str = "Date;Time of day;";
pub const MIN_FIELD_COUNT: usize = 21;

/// What to do with a numeric field that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    /// Coerce the field to 0 and keep the row.
    #[default]
    Lenient,
    /// Reject the whole batch.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("telemetry header `Date;Time of day;` not found")]
    MissingHeader,
    #[error("line {line}: column {column} has invalid value {value:?}")]
    InvalidField {
        line: u64,
        column: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ParseReport {
    pub parsed_rows: usize,
    /// Rows with too few fields, a bad date/time or broken framing.
    pub dropped_rows: usize,
    /// Numeric fields coerced to 0 under the lenient policy.
    pub coerced_fields: usize,
}

#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub samples: Vec<HeatingSample>,
    pub report: ParseReport,
}

/// Column layout of the export, in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Date,
    Time,
    CollectorTemp,
    OutsideTemp,
    DhwTop,
    DhwBottom,
    FlowTemp,
    FlowSetpoint,
    BurnerStarts,
    BoilerModulation,
    FanControl,
    CollectorPump,
    BoilerPump,
    BurnerState,
    SolarStatus,
    WaterPressure,
    DhwPump,
    FanSpeed,
    ReturnTemp,
    BoilerPumpSpeed,
    SensorTemp,
}

impl Column {
    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            Column::Date => "DATE",
            Column::Time => "TIME",
            Column::CollectorTemp => "COLLECTOR_TEMP",
            Column::OutsideTemp => "OUTSIDE_TEMP",
            Column::DhwTop => "DHW_TOP",
            Column::DhwBottom => "DHW_BOTTOM",
            Column::FlowTemp => "FLOW_TEMP",
            Column::FlowSetpoint => "FLOW_SETPOINT",
            Column::BurnerStarts => "BURNER_STARTS",
            Column::BoilerModulation => "BOILER_MODULATION",
            Column::FanControl => "FAN_CONTROL",
            Column::CollectorPump => "COLLECTOR_PUMP",
            Column::BoilerPump => "BOILER_PUMP",
            Column::BurnerState => "BURNER_STATE",
            Column::SolarStatus => "SOLAR_STATUS",
            Column::WaterPressure => "WATER_PRESSURE",
            Column::DhwPump => "DHW_PUMP",
            Column::FanSpeed => "FAN_SPEED",
            Column::ReturnTemp => "RETURN_TEMP",
            Column::BoilerPumpSpeed => "BOILER_PUMP_SPEED",
            Column::SensorTemp => "SENSOR_TEMP",
        }
    }
}

/// Parses a raw export. Rows before the header and malformed rows are skipped and counted.
pub fn parse_batch(raw: &str, policy: ParsePolicy) -> Result<ParsedBatch, ParseError> {
    let Some((header_line, body)) = split_after_header(raw) else {
        if policy == ParsePolicy::Strict {
            return Err(ParseError::MissingHeader);
        }
        tracing::warn!("Telemetry batch has no `{}` header, nothing to ingest", HEADER_TOKEN);
        return Ok(ParsedBatch {
            samples: Vec::new(),
            report: ParseReport::default(),
        });
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut samples = Vec::new();
    let mut report = ParseReport::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("Dropping unreadable telemetry row: {}", e);
                report.dropped_rows += 1;
                continue;
            }
        };
        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = header_line + record.position().map(|p| p.line()).unwrap_or(0);
        let mut row = RowReader {
            record: &record,
            line,
            policy,
            coerced: 0,
        };

        match row.sample()? {
            Some(sample) => {
                report.parsed_rows += 1;
                report.coerced_fields += row.coerced;
                samples.push(sample);
            }
            None => report.dropped_rows += 1,
        }
    }

    if report.dropped_rows > 0 || report.coerced_fields > 0 {
        tracing::warn!(
            "Telemetry batch: {} rows parsed, {} dropped, {} fields coerced to 0",
            report.parsed_rows,
            report.dropped_rows,
            report.coerced_fields
        );
    } else {
        tracing::debug!("Telemetry batch: {} rows parsed", report.parsed_rows);
    }

    Ok(ParsedBatch { samples, report })
}

/// 1-based line number of the header and the text following it.
fn split_after_header(raw: &str) -> Option<(u64, &str)> {
    let mut offset = 0;
    for (number, line) in raw.split_inclusive('\n').enumerate() {
        offset += line.len();
        if line.contains(HEADER_TOKEN) {
            return Some((number as u64 + 1, &raw[offset..]));
        }
    }
    None
}

struct RowReader<'r> {
    record: &'r csv::StringRecord,
    line: u64,
    policy: ParsePolicy,
    coerced: usize,
}

impl RowReader<'_> {
    /// `Ok(None)` for a row that is not a data row.
    fn sample(&mut self) -> Result<Option<HeatingSample>, ParseError> {
        if self.record.len() < MIN_FIELD_COUNT {
            return Ok(None);
        }
        let Some(timestamp) = self.timestamp() else {
            return Ok(None);
        };

        Ok(Some(HeatingSample {
            timestamp,
            collector_temp: self.number(Column::CollectorTemp)?,
            outside_temp: self.number(Column::OutsideTemp)?,
            dhw_temp_top: self.number(Column::DhwTop)?,
            dhw_temp_bottom: self.number(Column::DhwBottom)?,
            flow_temp: self.number(Column::FlowTemp)?,
            flow_temp_setpoint: self.number(Column::FlowSetpoint)?,
            sensor_temp: self.number(Column::SensorTemp)?,
            return_temp: self.number(Column::ReturnTemp)?,
            boiler_modulation_percent: parse_percent(self.field(Column::BoilerModulation)),
            fan_control: self.number(Column::FanControl)?,
            fan_speed: self.number(Column::FanSpeed)?,
            boiler_pump_speed: self.number(Column::BoilerPumpSpeed)?,
            collector_pump_on: parse_switch(self.field(Column::CollectorPump)),
            boiler_pump_on: parse_switch(self.field(Column::BoilerPump)),
            dhw_pump_on: parse_switch(self.field(Column::DhwPump)),
            burner_state: self.field(Column::BurnerState).to_string(),
            solar_status: self.field(Column::SolarStatus).to_string(),
            water_pressure: self.number(Column::WaterPressure)?,
            burner_starts: self.counter(Column::BurnerStarts)?,
        }))
    }

    fn field(&self, column: Column) -> &str {
        self.record.get(column.index()).unwrap_or("")
    }

    fn timestamp(&self) -> Option<NaiveDateTime> {
        let date = self.field(Column::Date);
        if !is_day_first_date(date) {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%d.%m.%Y").ok()?;
        let time = self.field(Column::Time);
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .ok()?;
        Some(date.and_time(time))
    }

    fn number(&mut self, column: Column) -> Result<f64, ParseError> {
        match parse_number(self.field(column)) {
            Some(value) => Ok(value),
            None => self.coerce(column, 0.0),
        }
    }

    fn counter(&mut self, column: Column) -> Result<u64, ParseError> {
        let value = self.field(column);
        match value.parse::<u64>().ok().or_else(|| {
            parse_number(value)
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64)
        }) {
            Some(count) => Ok(count),
            None => self.coerce(column, 0),
        }
    }

    fn coerce<T>(&mut self, column: Column, fallback: T) -> Result<T, ParseError> {
        let value = self.field(column);
        if self.policy == ParsePolicy::Strict {
            return Err(ParseError::InvalidField {
                line: self.line,
                column: column.name(),
                value: value.to_string(),
            });
        }
        tracing::debug!(
            "Line {}: {} value {:?} is not numeric, using 0",
            self.line,
            column.name(),
            value
        );
        self.coerced += 1;
        Ok(fallback)
    }
}

/// `DD.MM.YYYY` shape check.
fn is_day_first_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b'.',
            _ => b.is_ascii_digit(),
        })
}

/// Finite decimal number, accepting a decimal comma.
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value
        .parse::<f64>()
        .or_else(|_| value.replace(',', ".").parse::<f64>())
        .ok()
        .filter(|v| v.is_finite())
}

/// Percent token such as `" 45.0% "`. Placeholders and anything unparsable mean no reading.
pub fn parse_percent(value: &str) -> Option<f64> {
    parse_number(value.trim().trim_end_matches('%'))
}

/// Textual On/Off flag.
pub fn parse_switch(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("on")
}
