//! Per-kind session behavior.
//!
//! Each kind has three hooks, dispatched by `match` so adding a kind is a
//! compile error until every hook handles it:
//!
//! ```text
//! open     opening record      → initial accumulators
//! observe  same-type record    → accumulate (temps, energy high-water, ...)
//! finish   close boundary      → derived metrics, computed once
//! ```

use serde::{Deserialize, Serialize};
use teslog_protocol::{Location, SessionType};
use tracing::{debug, warn};

use crate::record::Record;

/// Rated range of the reference pack, in the car's distance unit.
pub const RATED_RANGE_SPEC: f64 = 310.0;

/// Usable energy of the reference pack, in Wh.
pub const RATED_BATTERY_SPEC: f64 = 75_000.0;

const SECS_PER_HOUR: f64 = 3600.0;
const SECS_PER_DAY: f64 = 86_400.0;

/// Arithmetic mean accumulated one sample at a time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    pub fn add(&mut self, sample: Option<f64>) {
        if let Some(value) = sample {
            self.sum += value;
            self.count += 1;
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / f64::from(self.count))
        }
    }
}

/// Values a kind needs from the common session fields when it closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseContext {
    pub session_no: u64,
    pub duration_secs: i64,
    pub start_level: Option<i64>,
    pub end_level: Option<i64>,
    pub start_range: Option<f64>,
    pub end_range: Option<f64>,
    pub start_odo: Option<f64>,
    pub end_odo: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveStats {
    pub outside_temp: Mean,
    pub inside_temp: Mean,
    pub max_speed: Option<f64>,

    pub distance: Option<f64>,
    pub avg_outside_temp: Option<f64>,
    pub avg_inside_temp: Option<f64>,
    /// Wh per distance unit; 0 when distance or range is unusable.
    pub energy_per_distance: f64,
    /// Distance units per hour; 0 for zero-length sessions.
    pub avg_speed: f64,
}

impl DriveStats {
    fn observe(&mut self, record: &Record) {
        self.outside_temp.add(record.outside_temp);
        self.inside_temp.add(record.inside_temp);
        if let Some(speed) = record.speed {
            self.max_speed = Some(self.max_speed.map_or(speed, |max| max.max(speed)));
        }
    }

    fn finish(&mut self, ctx: &CloseContext) {
        self.distance = match (ctx.start_odo, ctx.end_odo) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        self.avg_outside_temp = self.outside_temp.value();
        self.avg_inside_temp = self.inside_temp.value();

        let distance = self.distance.unwrap_or(0.0);
        self.energy_per_distance = match (ctx.start_range, ctx.end_range) {
            (Some(start), Some(end)) if distance > 0.0 => {
                (start - end) / RATED_RANGE_SPEC * RATED_BATTERY_SPEC / distance
            }
            _ => 0.0,
        };
        self.avg_speed = if ctx.duration_secs > 0 {
            distance / (ctx.duration_secs as f64 / SECS_PER_HOUR)
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargeStats {
    /// High-water mark of the cumulative energy counter, kWh.
    pub energy_added: Option<f64>,
    pub max_battery_level: Option<i64>,
    pub max_battery_range: Option<f64>,
    pub plugged_in: bool,
    pub regressions: u32,

    pub level_delta: Option<i64>,
    pub range_added: Option<f64>,
    /// kWh per 100% of battery; 0 when the level did not rise.
    pub energy_per_full: f64,
    /// Range gained per hour; 0 when the level did not rise.
    pub range_per_hour: f64,
    /// Average kW over the session; 0 when the level did not rise.
    pub avg_power: f64,
}

impl ChargeStats {
    fn open(record: &Record) -> Self {
        Self {
            energy_added: record.charge_energy_added,
            max_battery_level: record.usable_battery_level,
            max_battery_range: record.battery_range,
            plugged_in: record.plugged_in(),
            ..Self::default()
        }
    }

    fn observe(&mut self, record: &Record, session_no: u64) {
        self.observe_energy(record, session_no);
        if let Some(level) = record.usable_battery_level {
            self.max_battery_level = Some(self.max_battery_level.map_or(level, |m| m.max(level)));
        }
        if let Some(range) = record.battery_range {
            self.max_battery_range = Some(self.max_battery_range.map_or(range, |m| m.max(range)));
        }
        self.plugged_in |= record.plugged_in();
    }

    /// A cumulative counter that goes down is a data anomaly: keep the
    /// previous maximum and carry on.
    fn observe_energy(&mut self, record: &Record, session_no: u64) {
        let Some(value) = record.charge_energy_added else {
            return;
        };
        debug!(session_no, energy_added = value, ts = record.timets, "Charging energy sample");
        match self.energy_added {
            Some(max) if value < max => {
                self.regressions += 1;
                warn!(
                    session_no,
                    energy_added = value,
                    retained = max,
                    ts = record.timets,
                    "Bad charging value: energy added went down"
                );
            }
            _ => self.energy_added = Some(value),
        }
    }

    fn finish(&mut self, ctx: &CloseContext) {
        let top_level = max_option(ctx.end_level, self.max_battery_level);
        self.level_delta = match (top_level, ctx.start_level) {
            (Some(top), Some(start)) => Some(top - start),
            _ => None,
        };
        let top_range = max_option_f64(ctx.end_range, self.max_battery_range);
        self.range_added = match (top_range, ctx.start_range) {
            (Some(top), Some(start)) => Some(top - start),
            _ => None,
        };

        let rising = self.level_delta.is_some_and(|delta| delta > 0);
        let hours = ctx.duration_secs as f64 / SECS_PER_HOUR;
        let energy = self.energy_added.unwrap_or(0.0);

        self.energy_per_full = match self.level_delta {
            Some(delta) if rising => energy * 100.0 / delta as f64,
            _ => 0.0,
        };
        self.range_per_hour = match self.range_added {
            Some(range) if rising && hours > 0.0 => range / hours,
            _ => 0.0,
        };
        self.avg_power = if rising && hours > 0.0 {
            energy / hours
        } else {
            0.0
        };
    }
}

/// Battery drain while the car sits (parked or conditioning).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrainMetrics {
    pub level_delta: Option<i64>,
    pub range_delta: Option<f64>,
    /// Level change normalised to a day; 0 for zero-length sessions.
    pub level_per_day: f64,
    pub range_per_day: f64,
}

impl DrainMetrics {
    fn compute(ctx: &CloseContext) -> Self {
        let level_delta = match (ctx.start_level, ctx.end_level) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        let range_delta = match (ctx.start_range, ctx.end_range) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        let days = ctx.duration_secs as f64 / SECS_PER_DAY;
        let per_day = |delta: f64| if days > 0.0 { delta / days } else { 0.0 };
        Self {
            level_delta,
            range_delta,
            level_per_day: level_delta.map_or(0.0, |d| per_day(d as f64)),
            range_per_day: range_delta.map_or(0.0, per_day),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionStats {
    pub plugged_in: bool,
    pub climate_on: bool,
    pub drain: DrainMetrics,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParkStats {
    /// Where the car sits; falls back to the last known parked location.
    pub location: Option<Location>,
    pub drain: DrainMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "stats")]
pub enum SessionDetail {
    Driving(DriveStats),
    Charging(ChargeStats),
    Conditioning(ConditionStats),
    Parked(ParkStats),
}

impl SessionDetail {
    /// Factory: the opening record's session type selects the kind.
    pub fn open(record: &Record, last_park_location: Option<Location>) -> Self {
        match record.session_type {
            SessionType::Driving => {
                let mut stats = DriveStats::default();
                stats.observe(record);
                SessionDetail::Driving(stats)
            }
            SessionType::Charging => SessionDetail::Charging(ChargeStats::open(record)),
            SessionType::Conditioning => SessionDetail::Conditioning(ConditionStats {
                plugged_in: record.plugged_in(),
                climate_on: record.climate_on == Some(true),
                drain: DrainMetrics::default(),
            }),
            SessionType::Parked => SessionDetail::Parked(ParkStats {
                location: record.location().or(last_park_location),
                drain: DrainMetrics::default(),
            }),
        }
    }

    pub fn session_type(&self) -> SessionType {
        match self {
            SessionDetail::Driving(_) => SessionType::Driving,
            SessionDetail::Charging(_) => SessionType::Charging,
            SessionDetail::Conditioning(_) => SessionType::Conditioning,
            SessionDetail::Parked(_) => SessionType::Parked,
        }
    }

    /// Mid-session record of the same type.
    pub fn observe(&mut self, record: &Record, session_no: u64) {
        match self {
            SessionDetail::Driving(stats) => stats.observe(record),
            SessionDetail::Charging(stats) => stats.observe(record, session_no),
            SessionDetail::Conditioning(stats) => {
                stats.plugged_in |= record.plugged_in();
                stats.climate_on |= record.climate_on == Some(true);
            }
            SessionDetail::Parked(stats) => {
                if let Some(location) = record.location() {
                    stats.location = Some(location);
                }
            }
        }
    }

    /// The record that ends the session still carries samples for some
    /// kinds (temperatures while rolling to a stop, the final energy count).
    pub fn absorb_boundary(&mut self, record: &Record, session_no: u64) {
        match self {
            SessionDetail::Driving(stats) => {
                stats.outside_temp.add(record.outside_temp);
                stats.inside_temp.add(record.inside_temp);
            }
            SessionDetail::Charging(stats) => stats.observe_energy(record, session_no),
            SessionDetail::Conditioning(_) | SessionDetail::Parked(_) => {}
        }
    }

    pub fn finish(&mut self, ctx: &CloseContext) {
        match self {
            SessionDetail::Driving(stats) => stats.finish(ctx),
            SessionDetail::Charging(stats) => stats.finish(ctx),
            SessionDetail::Conditioning(stats) => stats.drain = DrainMetrics::compute(ctx),
            SessionDetail::Parked(stats) => stats.drain = DrainMetrics::compute(ctx),
        }
        debug!(
            session_no = ctx.session_no,
            kind = self.session_type().as_str(),
            "Session metrics computed"
        );
    }
}

fn max_option(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn max_option_f64(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(duration_secs: i64) -> CloseContext {
        CloseContext {
            session_no: 1,
            duration_secs,
            ..CloseContext::default()
        }
    }

    fn record_with_energy(energy: f64) -> Record {
        crate::testing::record_with(
            100,
            teslog_protocol::Mode::Charging,
            serde_json::json!({ "charge_energy_added": energy }),
        )
    }

    #[test]
    fn mean_of_nothing_is_none() {
        let mut mean = Mean::default();
        assert_eq!(mean.value(), None);
        mean.add(None);
        assert_eq!(mean.value(), None);
        mean.add(Some(10.0));
        mean.add(Some(20.0));
        assert_eq!(mean.value(), Some(15.0));
        assert_eq!(mean.count(), 2);
    }

    #[test]
    fn drive_energy_per_distance_uses_rated_pack() {
        let mut stats = DriveStats::default();
        stats.finish(&CloseContext {
            start_range: Some(200.0),
            end_range: Some(169.0),
            start_odo: Some(1000.0),
            end_odo: Some(1025.0),
            ..ctx(1800)
        });
        assert_eq!(stats.distance, Some(25.0));
        // 31 rated miles of a 310 mile / 75 kWh pack over 25 miles
        assert!((stats.energy_per_distance - 300.0).abs() < 1e-9);
        assert!((stats.avg_speed - 50.0).abs() < 1e-9);
    }

    #[test]
    fn drive_without_distance_reports_zero_efficiency() {
        let mut stats = DriveStats::default();
        stats.finish(&CloseContext {
            start_range: Some(200.0),
            end_range: Some(199.0),
            start_odo: Some(1000.0),
            end_odo: Some(1000.0),
            ..ctx(0)
        });
        assert_eq!(stats.energy_per_distance, 0.0);
        assert_eq!(stats.avg_speed, 0.0);
    }

    #[test]
    fn charge_energy_keeps_high_water_mark() {
        let mut stats = ChargeStats::open(&record_with_energy(1.0));
        for energy in [1.2, 0.9, 1.5] {
            stats.observe(&record_with_energy(energy), 1);
        }
        assert_eq!(stats.energy_added, Some(1.5));
        assert_eq!(stats.regressions, 1);
    }

    #[test]
    fn flat_charge_has_zero_ratios() {
        let mut stats = ChargeStats {
            energy_added: Some(0.4),
            ..ChargeStats::default()
        };
        stats.finish(&CloseContext {
            start_level: Some(80),
            end_level: Some(80),
            start_range: Some(240.0),
            end_range: Some(240.0),
            ..ctx(3600)
        });
        assert_eq!(stats.level_delta, Some(0));
        assert_eq!(stats.energy_per_full, 0.0);
        assert_eq!(stats.range_per_hour, 0.0);
        assert_eq!(stats.avg_power, 0.0);
    }

    #[test]
    fn charge_delta_uses_running_max() {
        let mut stats = ChargeStats {
            energy_added: Some(15.0),
            max_battery_level: Some(70),
            max_battery_range: Some(210.0),
            ..ChargeStats::default()
        };
        stats.finish(&CloseContext {
            start_level: Some(50),
            end_level: Some(69),
            start_range: Some(150.0),
            end_range: Some(207.0),
            ..ctx(7200)
        });
        assert_eq!(stats.level_delta, Some(20));
        assert_eq!(stats.range_added, Some(60.0));
        assert!((stats.energy_per_full - 75.0).abs() < 1e-9);
        assert!((stats.range_per_hour - 30.0).abs() < 1e-9);
        assert!((stats.avg_power - 7.5).abs() < 1e-9);
    }

    #[test]
    fn drain_is_normalised_per_day() {
        let drain = DrainMetrics::compute(&CloseContext {
            start_level: Some(80),
            end_level: Some(78),
            start_range: Some(240.0),
            end_range: Some(234.0),
            ..ctx(43_200)
        });
        assert_eq!(drain.level_delta, Some(-2));
        assert!((drain.level_per_day + 4.0).abs() < 1e-9);
        assert!((drain.range_per_day + 12.0).abs() < 1e-9);
    }

    #[test]
    fn zero_length_drain_is_zero() {
        let drain = DrainMetrics::compute(&CloseContext {
            start_level: Some(80),
            end_level: Some(79),
            ..ctx(0)
        });
        assert_eq!(drain.level_per_day, 0.0);
    }
}
