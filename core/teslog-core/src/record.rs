//! Record normalizer: one poller line in, one typed snapshot (or a skip) out.
//!
//! ## Mode precedence
//!
//! ```text
//! charger_power != 0 && time_to_full > 0  → Charging
//! shift_state present and not "P"        → Driving
//! is_preconditioning                     → Conditioning
//! charger_power or odometer present      → Standby
//! otherwise                              → Polling
//! ```
//!
//! The order matters: a car plugged in with a drive gear selected is
//! Driving, never Charging. Absent or zero `time_to_full` is not charging.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use teslog_protocol::{
    lookup, lookup_bool, lookup_f64, lookup_i64, lookup_string, paths, Location, Mode,
    SessionType, COMMENT_PREFIX, MIN_LINE_LEN, ONLINE_STATE, RETRIEVAL_TIME_KEY,
};

use crate::error::{Result, TeslogError};
use crate::zone::DisplayZone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooShort,
    Comment,
    Malformed,
    Offline,
    MissingTimestamp,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooShort => "too_short",
            SkipReason::Comment => "comment",
            SkipReason::Malformed => "malformed",
            SkipReason::Offline => "offline",
            SkipReason::MissingTimestamp => "missing_timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Record(Box<Record>),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Keep snapshots whose `state` is not `online`.
    pub want_offline: bool,
}

/// Static vehicle identity and configuration carried by every snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VehicleInfo {
    pub vehicle_id: Option<String>,
    pub vin: Option<String>,
    pub display_name: Option<String>,
    pub car_type: Option<String>,
    pub car_special_type: Option<String>,
    pub perf_config: Option<String>,
    pub has_ludicrous_mode: Option<bool>,
    pub wheel_type: Option<String>,
    pub has_air_suspension: Option<bool>,
    pub exterior_color: Option<String>,
    pub option_codes: Option<String>,
    pub car_version: Option<String>,
}

/// One telemetry snapshot. Field names follow the poller's own naming so the
/// exported field map reads like the source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timets: i64,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub car_locked: Option<bool>,
    #[serde(default)]
    pub odometer: Option<f64>,
    #[serde(default)]
    pub is_user_present: Option<bool>,
    #[serde(default)]
    pub valet_mode: Option<bool>,
    #[serde(default)]
    pub charging_state: Option<String>,
    #[serde(default)]
    pub usable_battery_level: Option<i64>,
    #[serde(default)]
    pub charge_miles_added: Option<f64>,
    #[serde(default)]
    pub charge_energy_added: Option<f64>,
    #[serde(default)]
    pub charge_current_request: Option<f64>,
    #[serde(default)]
    pub charge_time_to_full: Option<f64>,
    #[serde(default)]
    pub charger_power: Option<f64>,
    #[serde(default)]
    pub charge_port_open: Option<bool>,
    #[serde(default)]
    pub charge_port_latch: Option<String>,
    #[serde(default)]
    pub charge_rate: Option<f64>,
    #[serde(default)]
    pub charger_voltage: Option<f64>,
    #[serde(default)]
    pub battery_range: Option<f64>,
    #[serde(default)]
    pub est_battery_range: Option<f64>,
    #[serde(default)]
    pub shift_state: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub gps_as_of: Option<i64>,
    #[serde(default)]
    pub climate_on: Option<bool>,
    #[serde(default)]
    pub preconditioning: Option<bool>,
    #[serde(default)]
    pub inside_temp: Option<f64>,
    #[serde(default)]
    pub outside_temp: Option<f64>,
    #[serde(default)]
    pub battery_heater: Option<bool>,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub car_type: Option<String>,
    #[serde(default)]
    pub car_special_type: Option<String>,
    #[serde(default)]
    pub perf_config: Option<String>,
    #[serde(default)]
    pub has_ludicrous_mode: Option<bool>,
    #[serde(default)]
    pub wheel_type: Option<String>,
    #[serde(default)]
    pub has_air_suspension: Option<bool>,
    #[serde(default)]
    pub exterior_color: Option<String>,
    #[serde(default)]
    pub option_codes: Option<String>,
    #[serde(default)]
    pub car_version: Option<String>,
    #[serde(default)]
    pub distance_unit: Option<String>,
    #[serde(default)]
    pub temp_unit: Option<String>,

    #[serde(skip, default = "default_mode")]
    pub mode: Mode,
    #[serde(skip, default = "default_session_type")]
    pub session_type: SessionType,
    /// Original snapshot, kept for debug forwarding.
    #[serde(skip)]
    pub raw: Value,
}

fn default_mode() -> Mode {
    Mode::Polling
}

fn default_session_type() -> SessionType {
    SessionType::Parked
}

/// Parses one raw poller line. Never fails: anything unusable is a skip.
pub fn normalize(line: &str, options: NormalizeOptions) -> Normalized {
    let text = line.trim_end();
    if text.trim_start().starts_with(COMMENT_PREFIX) {
        return Normalized::Skip(SkipReason::Comment);
    }
    if text.len() < MIN_LINE_LEN {
        return Normalized::Skip(SkipReason::TooShort);
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Normalized::Skip(SkipReason::Malformed),
    };

    let timets = match value.get(RETRIEVAL_TIME_KEY) {
        None | Some(Value::Null) => return Normalized::Skip(SkipReason::MissingTimestamp),
        Some(ts) => match ts.as_i64().or_else(|| ts.as_f64().map(|f| f.trunc() as i64)) {
            Some(ts) => ts,
            None => return Normalized::Skip(SkipReason::Malformed),
        },
    };

    let state = lookup_string(&value, paths::STATE);
    if state.as_deref() != Some(ONLINE_STATE) && !options.want_offline {
        return Normalized::Skip(SkipReason::Offline);
    }

    Normalized::Record(Box::new(Record::from_snapshot(timets, state, value)))
}

impl Record {
    fn from_snapshot(timets: i64, state: Option<String>, raw: Value) -> Self {
        let option_codes = lookup(&raw, paths::OPTION_CODES).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        });

        let mut record = Record {
            timets,
            vehicle_id: lookup_string(&raw, paths::VEHICLE_ID),
            state,
            car_locked: lookup_bool(&raw, paths::CAR_LOCKED),
            odometer: lookup_f64(&raw, paths::ODOMETER),
            is_user_present: lookup_bool(&raw, paths::IS_USER_PRESENT),
            valet_mode: lookup_bool(&raw, paths::VALET_MODE),
            charging_state: lookup_string(&raw, paths::CHARGING_STATE),
            usable_battery_level: lookup_i64(&raw, paths::USABLE_BATTERY_LEVEL),
            charge_miles_added: lookup_f64(&raw, paths::CHARGE_MILES_ADDED),
            charge_energy_added: lookup_f64(&raw, paths::CHARGE_ENERGY_ADDED),
            charge_current_request: lookup_f64(&raw, paths::CHARGE_CURRENT_REQUEST),
            charge_time_to_full: lookup_f64(&raw, paths::TIME_TO_FULL_CHARGE),
            charger_power: lookup_f64(&raw, paths::CHARGER_POWER),
            charge_port_open: lookup_bool(&raw, paths::CHARGE_PORT_DOOR_OPEN),
            charge_port_latch: lookup_string(&raw, paths::CHARGE_PORT_LATCH),
            charge_rate: lookup_f64(&raw, paths::CHARGE_RATE),
            charger_voltage: lookup_f64(&raw, paths::CHARGER_VOLTAGE),
            battery_range: lookup_f64(&raw, paths::BATTERY_RANGE),
            est_battery_range: lookup_f64(&raw, paths::EST_BATTERY_RANGE),
            shift_state: lookup_string(&raw, paths::SHIFT_STATE),
            speed: lookup_f64(&raw, paths::SPEED),
            latitude: lookup_f64(&raw, paths::LATITUDE),
            longitude: lookup_f64(&raw, paths::LONGITUDE),
            heading: lookup_f64(&raw, paths::HEADING),
            gps_as_of: lookup_i64(&raw, paths::GPS_AS_OF),
            climate_on: lookup_bool(&raw, paths::CLIMATE_ON),
            preconditioning: lookup_bool(&raw, paths::PRECONDITIONING),
            inside_temp: lookup_f64(&raw, paths::INSIDE_TEMP),
            outside_temp: lookup_f64(&raw, paths::OUTSIDE_TEMP),
            battery_heater: lookup_bool(&raw, paths::BATTERY_HEATER),
            vin: lookup_string(&raw, paths::VIN),
            display_name: lookup_string(&raw, paths::DISPLAY_NAME),
            car_type: lookup_string(&raw, paths::CAR_TYPE),
            car_special_type: lookup_string(&raw, paths::CAR_SPECIAL_TYPE),
            perf_config: lookup_string(&raw, paths::PERF_CONFIG),
            has_ludicrous_mode: lookup_bool(&raw, paths::HAS_LUDICROUS_MODE),
            wheel_type: lookup_string(&raw, paths::WHEEL_TYPE),
            has_air_suspension: lookup_bool(&raw, paths::HAS_AIR_SUSPENSION),
            exterior_color: lookup_string(&raw, paths::EXTERIOR_COLOR),
            option_codes,
            car_version: lookup_string(&raw, paths::CAR_VERSION),
            distance_unit: lookup_string(&raw, paths::DISTANCE_UNITS),
            temp_unit: lookup_string(&raw, paths::TEMPERATURE_UNITS),
            mode: Mode::Polling,
            session_type: SessionType::Parked,
            raw,
        };
        record.classify();
        record
    }

    /// Exports the record as a flat field map (no raw payload, no derived
    /// classification).
    pub fn to_fields(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(Map::new()),
            Err(source) => Err(TeslogError::Json {
                context: "exporting record fields".to_string(),
                source,
            }),
        }
    }

    /// Rebuilds a record from an exported field map and re-derives its mode.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        let mut record: Record =
            serde_json::from_value(Value::Object(fields)).map_err(|source| TeslogError::Json {
                context: "rebuilding record from fields".to_string(),
                source,
            })?;
        record.classify();
        Ok(record)
    }

    fn classify(&mut self) {
        self.mode = derive_mode(self);
        self.session_type = SessionType::from(self.mode);
    }

    pub fn location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location::new(latitude, longitude)),
            _ => None,
        }
    }

    /// Charge port door open with the latch engaged.
    pub fn plugged_in(&self) -> bool {
        self.charge_port_open == Some(true) && self.charge_port_latch.as_deref() == Some("Engaged")
    }

    /// Odometer reading usable for carry-over (zero readings are ignored).
    pub fn known_odometer(&self) -> Option<f64> {
        self.odometer.filter(|odo| *odo != 0.0)
    }

    pub fn vehicle(&self) -> VehicleInfo {
        VehicleInfo {
            vehicle_id: self.vehicle_id.clone(),
            vin: self.vin.clone(),
            display_name: self.display_name.clone(),
            car_type: self.car_type.clone(),
            car_special_type: self.car_special_type.clone(),
            perf_config: self.perf_config.clone(),
            has_ludicrous_mode: self.has_ludicrous_mode,
            wheel_type: self.wheel_type.clone(),
            has_air_suspension: self.has_air_suspension,
            exterior_color: self.exterior_color.clone(),
            option_codes: self.option_codes.clone(),
            car_version: self.car_version.clone(),
        }
    }

    /// One-line rendering used for per-record debug logging.
    pub fn summary_line(&self, zone: &DisplayZone) -> String {
        let battery = match (self.usable_battery_level, self.battery_range) {
            (Some(level), Some(range)) => format!("{:3}%/{:.2}M", level, range),
            (Some(level), None) => format!("{:3}%", level),
            _ => String::new(),
        };
        let added = match self.charge_energy_added.filter(|e| *e != 0.0) {
            Some(energy) => format!(
                "{:5.2}/{:.1}M",
                energy,
                self.charge_miles_added.unwrap_or(0.0)
            ),
            None => String::new(),
        };
        let rate = match self.charge_rate.filter(|r| *r != 0.0) {
            Some(rate) => format!("{:.0}kW/{:.0}M", self.charger_power.unwrap_or(0.0), rate),
            None => String::new(),
        };
        let odometer = self
            .known_odometer()
            .map(|odo| format!("{:.2}", odo))
            .unwrap_or_default();
        let speed = self
            .speed
            .filter(|s| *s != 0.0)
            .map(|s| format!("{}", s))
            .unwrap_or_default();

        format!(
            "{} {:<8} odo={:<7} spd={:<3} bat={:<12} chg@{:<12} add={}",
            zone.format_ts(self.timets),
            self.mode.as_str(),
            odometer,
            speed,
            battery,
            rate,
            added
        )
    }
}

fn derive_mode(record: &Record) -> Mode {
    let charger_active = record.charger_power.is_some_and(|power| power != 0.0);
    let filling = record.charge_time_to_full.is_some_and(|ttf| ttf > 0.0);
    if charger_active && filling {
        return Mode::Charging;
    }

    if record
        .shift_state
        .as_deref()
        .is_some_and(|shift| !shift.is_empty() && shift != "P")
    {
        return Mode::Driving;
    }

    if record.preconditioning == Some(true) {
        return Mode::Conditioning;
    }

    if record.charger_power.is_some() || record.odometer.is_some() {
        return Mode::Standby;
    }

    Mode::Polling
}
