//! Session reporter: one fixed-width line per closed session.
//!
//! Column widths are presentation only; which fields appear per kind is
//! what callers rely on. Unknown values print as `?`, unknown temperatures
//! as `--`. A session without complete starting data only gets the
//! degraded line.

use teslog_protocol::Location;

use crate::error::Result;
use crate::locate::{Locate, UNKNOWN_LOCATION};
use crate::session::{Session, SessionDetail, TempUnit};
use crate::zone::{format_duration, DisplayZone};

const UNKNOWN: &str = "?";

pub fn format_session(session: &Session, zone: &DisplayZone, locator: &dyn Locate) -> Result<String> {
    let head = format!(
        "{:<4}{} +{:<16}",
        session.session_no,
        zone.format_ts(session.start_ts),
        format_duration(session.duration_secs())
    );

    if !session.has_start_data {
        return Ok(format!(
            "{} {:>11} Incomplete Data, no starting information",
            head,
            session.verb()
        ));
    }

    let battery = battery_span(session);
    let dist = session.distance_unit.distance_label();

    let line = match &session.detail {
        SessionDetail::Driving(stats) => {
            let distance = fixed(stats.distance, 5, 1);
            format!(
                "{} {:>11} {} {}{} {:>4.1}{} {:>6.1}wh/{} o:{} i:{} [{} -> {}]",
                head,
                session.verb(),
                battery,
                distance,
                dist,
                stats.avg_speed,
                session.distance_unit.speed_label(),
                stats.energy_per_distance,
                dist,
                temperature(stats.avg_outside_temp, session.temp_unit),
                temperature(stats.avg_inside_temp, session.temp_unit),
                town(locator, session.start_location)?,
                town(locator, session.end_location)?
            )
        }
        SessionDetail::Charging(stats) => format!(
            "{} {:>3}{:>11} {} {}kWh +{}{} {:>5.1}{}/h {:>5.2}kW {:>5.1}kWh/100%",
            head,
            plug_mark(stats.plugged_in),
            session.verb(),
            battery,
            fixed(stats.energy_added, 6, 2),
            fixed(stats.range_added, 5, 1),
            dist,
            stats.range_per_hour,
            dist,
            stats.avg_power,
            stats.energy_per_full
        ),
        SessionDetail::Conditioning(stats) => format!(
            "{} {:>3}{:>11} {} {:>5.1}%/d",
            head,
            plug_mark(stats.plugged_in),
            session.verb(),
            battery,
            stats.drain.level_per_day
        ),
        SessionDetail::Parked(stats) => {
            let location = stats
                .location
                .or(session.end_location)
                .or(session.start_location);
            format!(
                "{} {:>11} {} {:>5.1}%/d {:>6.1}{}/d {}",
                head,
                session.verb(),
                battery,
                stats.drain.level_per_day,
                stats.drain.range_per_day,
                dist,
                address(locator, location)?
            )
        }
    };
    Ok(line)
}

/// `delta% (start% -> end%)`, or `?` when either end is unknown.
fn battery_span(session: &Session) -> String {
    match (session.start_battery_level, session.end_battery_level) {
        (Some(start), Some(end)) => format!("{:3}% ({:3}% ->{:3}%)", end - start, start, end),
        _ => UNKNOWN.to_string(),
    }
}

fn fixed(value: Option<f64>, width: usize, precision: usize) -> String {
    match value {
        Some(value) => format!("{:>width$.precision$}", value),
        None => format!("{:>width$}", UNKNOWN),
    }
}

fn temperature(celsius: Option<f64>, unit: TempUnit) -> String {
    match celsius {
        Some(value) => format!("{:.1}°", unit.display(value)),
        None => "--".to_string(),
    }
}

fn plug_mark(plugged_in: bool) -> &'static str {
    if plugged_in {
        "(+)"
    } else {
        ""
    }
}

fn town(locator: &dyn Locate, location: Option<Location>) -> Result<String> {
    match location {
        Some(location) => locator.town_for(&location),
        None => Ok(UNKNOWN_LOCATION.to_string()),
    }
}

fn address(locator: &dyn Locate, location: Option<Location>) -> Result<String> {
    match location {
        Some(location) => locator.address_for(&location),
        None => Ok(UNKNOWN_LOCATION.to_string()),
    }
}
