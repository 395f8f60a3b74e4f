//! Snapshot wire format for teslog.
//!
//! The vehicle poller writes one JSON object per line. This crate owns the
//! key paths into that object and the small vocabulary (`Mode`,
//! `SessionType`, `Location`) every consumer classifies records with, so the
//! normalizer, the store and the CLI cannot drift apart on the schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Top-level capture timestamp key. The misspelling is the poller's.
pub const RETRIEVAL_TIME_KEY: &str = "retrevial_time";

/// Lines shorter than this are never snapshots.
pub const MIN_LINE_LEN: usize = 10;

pub const COMMENT_PREFIX: char = '#';

pub const ONLINE_STATE: &str = "online";

/// Nested key paths into a snapshot.
pub mod paths {
    pub const VEHICLE_ID: &[&str] = &["vehicle_id"];
    pub const STATE: &[&str] = &["state"];
    pub const VIN: &[&str] = &["vin"];
    pub const DISPLAY_NAME: &[&str] = &["display_name"];
    pub const OPTION_CODES: &[&str] = &["option_codes"];

    pub const CAR_LOCKED: &[&str] = &["vehicle_state", "locked"];
    pub const ODOMETER: &[&str] = &["vehicle_state", "odometer"];
    pub const IS_USER_PRESENT: &[&str] = &["vehicle_state", "is_user_present"];
    pub const VALET_MODE: &[&str] = &["vehicle_state", "valet_mode"];
    pub const CAR_VERSION: &[&str] = &["vehicle_state", "car_version"];

    pub const CHARGING_STATE: &[&str] = &["charge_state", "charging_state"];
    pub const USABLE_BATTERY_LEVEL: &[&str] = &["charge_state", "usable_battery_level"];
    pub const CHARGE_MILES_ADDED: &[&str] = &["charge_state", "charge_miles_added_rated"];
    pub const CHARGE_ENERGY_ADDED: &[&str] = &["charge_state", "charge_energy_added"];
    pub const CHARGE_CURRENT_REQUEST: &[&str] = &["charge_state", "charge_current_request"];
    pub const TIME_TO_FULL_CHARGE: &[&str] = &["charge_state", "time_to_full_charge"];
    pub const CHARGER_POWER: &[&str] = &["charge_state", "charger_power"];
    pub const CHARGE_PORT_DOOR_OPEN: &[&str] = &["charge_state", "charge_port_door_open"];
    pub const CHARGE_PORT_LATCH: &[&str] = &["charge_state", "charge_port_latch"];
    pub const CHARGE_RATE: &[&str] = &["charge_state", "charge_rate"];
    pub const CHARGER_VOLTAGE: &[&str] = &["charge_state", "charger_voltage"];
    pub const BATTERY_RANGE: &[&str] = &["charge_state", "battery_range"];
    pub const EST_BATTERY_RANGE: &[&str] = &["charge_state", "est_battery_range"];

    pub const SHIFT_STATE: &[&str] = &["drive_state", "shift_state"];
    pub const SPEED: &[&str] = &["drive_state", "speed"];
    pub const LATITUDE: &[&str] = &["drive_state", "latitude"];
    pub const LONGITUDE: &[&str] = &["drive_state", "longitude"];
    pub const HEADING: &[&str] = &["drive_state", "heading"];
    pub const GPS_AS_OF: &[&str] = &["drive_state", "gps_as_of"];

    pub const CLIMATE_ON: &[&str] = &["climate_state", "is_climate_on"];
    pub const PRECONDITIONING: &[&str] = &["climate_state", "is_preconditioning"];
    pub const INSIDE_TEMP: &[&str] = &["climate_state", "inside_temp"];
    pub const OUTSIDE_TEMP: &[&str] = &["climate_state", "outside_temp"];
    pub const BATTERY_HEATER: &[&str] = &["climate_state", "battery_heater"];

    pub const CAR_TYPE: &[&str] = &["vehicle_config", "car_type"];
    pub const CAR_SPECIAL_TYPE: &[&str] = &["vehicle_config", "car_special_type"];
    pub const PERF_CONFIG: &[&str] = &["vehicle_config", "perf_config"];
    pub const HAS_LUDICROUS_MODE: &[&str] = &["vehicle_config", "has_ludicrous_mode"];
    pub const WHEEL_TYPE: &[&str] = &["vehicle_config", "wheel_type"];
    pub const HAS_AIR_SUSPENSION: &[&str] = &["vehicle_config", "has_air_suspension"];
    pub const EXTERIOR_COLOR: &[&str] = &["vehicle_config", "exterior_color"];

    pub const DISTANCE_UNITS: &[&str] = &["gui_settings", "gui_distance_units"];
    pub const TEMPERATURE_UNITS: &[&str] = &["gui_settings", "gui_temperature_units"];
}

/// Walks `path` through nested objects. Any missing segment (or a
/// non-object along the way) yields `None`; an explicit JSON `null` at the
/// leaf is also treated as absent.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

pub fn lookup_f64(value: &Value, path: &[&str]) -> Option<f64> {
    lookup(value, path).and_then(Value::as_f64)
}

pub fn lookup_i64(value: &Value, path: &[&str]) -> Option<i64> {
    lookup(value, path).and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
}

pub fn lookup_bool(value: &Value, path: &[&str]) -> Option<bool> {
    lookup(value, path).and_then(Value::as_bool)
}

pub fn lookup_string(value: &Value, path: &[&str]) -> Option<String> {
    lookup(value, path).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Instantaneous vehicle activity derived from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Charging,
    Driving,
    Conditioning,
    Standby,
    Polling,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Charging => "Charging",
            Mode::Driving => "Driving",
            Mode::Conditioning => "Conditioning",
            Mode::Standby => "Standby",
            Mode::Polling => "Polling",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Charging" => Some(Mode::Charging),
            "Driving" => Some(Mode::Driving),
            "Conditioning" => Some(Mode::Conditioning),
            "Standby" => Some(Mode::Standby),
            "Polling" => Some(Mode::Polling),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session granularity: `Standby` and `Polling` both collapse to `Parked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Driving,
    Charging,
    Conditioning,
    Parked,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Driving => "Driving",
            SessionType::Charging => "Charging",
            SessionType::Conditioning => "Conditioning",
            SessionType::Parked => "Parked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Driving" => Some(SessionType::Driving),
            "Charging" => Some(SessionType::Charging),
            "Conditioning" => Some(SessionType::Conditioning),
            "Parked" => Some(SessionType::Parked),
            _ => None,
        }
    }
}

impl From<Mode> for SessionType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Charging => SessionType::Charging,
            Mode::Driving => SessionType::Driving,
            Mode::Conditioning => SessionType::Conditioning,
            Mode::Standby | Mode::Polling => SessionType::Parked,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}
