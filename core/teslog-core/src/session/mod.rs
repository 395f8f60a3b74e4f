//! Session model: a maximal run of records sharing one session type.
//!
//! The common fields live on [`Session`]; everything that differs per type
//! lives in [`SessionDetail`], a closed set of four kinds. Lifecycle
//! operations that touch carry-over state are driven by
//! [`crate::tracker::SessionTracker`].

mod kinds;

pub use kinds::{
    ChargeStats, CloseContext, ConditionStats, DrainMetrics, DriveStats, Mean, ParkStats,
    SessionDetail, RATED_BATTERY_SPEC, RATED_RANGE_SPEC,
};

use serde::{Deserialize, Serialize};
use teslog_protocol::{Location, SessionType};

use crate::record::Record;

/// Store/tracker key for snapshots that carry no vehicle id.
pub const UNKNOWN_VEHICLE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// The poller reports `mi/hr` for imperial cars and `km/hr` otherwise.
    pub fn from_gui(value: Option<&str>) -> Self {
        match value {
            Some("mi/hr") | None => DistanceUnit::Miles,
            Some(_) => DistanceUnit::Kilometers,
        }
    }

    pub fn distance_label(&self) -> &'static str {
        match self {
            DistanceUnit::Miles => "mi",
            DistanceUnit::Kilometers => "km",
        }
    }

    pub fn speed_label(&self) -> &'static str {
        match self {
            DistanceUnit::Miles => "mph",
            DistanceUnit::Kilometers => "kph",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TempUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    pub fn from_gui(value: Option<&str>) -> Self {
        match value {
            Some("F") => TempUnit::Fahrenheit,
            _ => TempUnit::Celsius,
        }
    }

    /// Snapshots always carry Celsius; convert for display.
    pub fn display(&self, celsius: f64) -> f64 {
        match self {
            TempUnit::Celsius => celsius,
            TempUnit::Fahrenheit => 9.0 / 5.0 * celsius + 32.0,
        }
    }
}

/// The most recent vehicle state seen inside a session. Doubles as the
/// closing boundary when a session is closed without a triggering record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub ts: i64,
    pub battery_level: Option<i64>,
    pub battery_range: Option<f64>,
    pub odometer: Option<f64>,
    pub location: Option<Location>,
}

impl Observation {
    pub fn from_record(record: &Record) -> Self {
        Self {
            ts: record.timets,
            battery_level: record.usable_battery_level,
            battery_range: record.battery_range,
            odometer: record.known_odometer(),
            location: record.location(),
        }
    }

    /// Newer readings win; absent readings keep the older value.
    pub fn merged_onto(self, older: &Observation) -> Self {
        Self {
            ts: self.ts,
            battery_level: self.battery_level.or(older.battery_level),
            battery_range: self.battery_range.or(older.battery_range),
            odometer: self.odometer.or(older.odometer),
            location: self.location.or(older.location),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_no: u64,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub closed: bool,
    /// Seconds between the last two records fed into this session.
    pub since_last: i64,
    pub start_battery_level: Option<i64>,
    pub start_battery_range: Option<f64>,
    pub end_battery_level: Option<i64>,
    pub end_battery_range: Option<f64>,
    pub start_odo: Option<f64>,
    pub end_odo: Option<f64>,
    pub start_location: Option<Location>,
    pub end_location: Option<Location>,
    /// False when battery level or odometer was unknown at open; such a
    /// session only gets a degraded report.
    pub has_start_data: bool,
    pub distance_unit: DistanceUnit,
    pub temp_unit: TempUnit,
    pub latest: Observation,
    pub detail: SessionDetail,
}

impl Session {
    pub fn session_type(&self) -> SessionType {
        self.detail.session_type()
    }

    pub fn vehicle_key(&self) -> &str {
        self.vehicle_id.as_deref().unwrap_or(UNKNOWN_VEHICLE)
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_ts.saturating_sub(self.start_ts)
    }

    pub fn battery_delta(&self) -> Option<i64> {
        match (self.start_battery_level, self.end_battery_level) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Past-tense label used in reports.
    pub fn verb(&self) -> &'static str {
        match self.session_type() {
            SessionType::Driving => "Drove",
            SessionType::Charging => "Charged",
            SessionType::Conditioning => "Conditioned",
            SessionType::Parked => "Parked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_unit_from_gui_setting() {
        assert_eq!(DistanceUnit::from_gui(Some("mi/hr")), DistanceUnit::Miles);
        assert_eq!(DistanceUnit::from_gui(Some("km/hr")), DistanceUnit::Kilometers);
        assert_eq!(DistanceUnit::Kilometers.speed_label(), "kph");
    }

    #[test]
    fn fahrenheit_conversion() {
        assert_eq!(TempUnit::Fahrenheit.display(100.0), 212.0);
        assert_eq!(TempUnit::Celsius.display(21.5), 21.5);
    }

    #[test]
    fn observation_merge_keeps_older_values_for_gaps() {
        let older = Observation {
            ts: 10,
            battery_level: Some(80),
            battery_range: Some(200.0),
            odometer: Some(100.0),
            location: Some(Location::new(1.0, 2.0)),
        };
        let newer = Observation {
            ts: 20,
            battery_level: Some(79),
            ..Observation::default()
        };
        let merged = newer.merged_onto(&older);
        assert_eq!(merged.ts, 20);
        assert_eq!(merged.battery_level, Some(79));
        assert_eq!(merged.battery_range, Some(200.0));
        assert_eq!(merged.location, Some(Location::new(1.0, 2.0)));
    }
}
