//! Session segmentation state machine.
//!
//! One tracker per vehicle stream. It owns the carry-over state that spans
//! sessions and at most one active session:
//!
//! ```text
//! Start ──non-Polling──▶ Open(T)
//! Open(T) ──same T──▶ Open(T)            update, Continued
//! Open(T) ──T' ≠ T──▶ Open(T')           close with boundary, Closed
//! any ──Polling──▶ unchanged             Skipped
//! ```
//!
//! Opening only ever happens on an empty slot (`active.take()` precedes it),
//! so two sessions can never be open at once.

use serde::{Deserialize, Serialize};
use teslog_protocol::{Location, Mode, SessionType};
use tracing::{debug, info};

use crate::error::{Result, TeslogError};
use crate::record::Record;
use crate::session::{
    CloseContext, DistanceUnit, Observation, Session, SessionDetail, TempUnit,
};
use crate::zone::DisplayZone;

/// State that survives across sessions of one vehicle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CarryOver {
    /// Timestamp of the last record fed into open/update.
    pub last_record_ts: Option<i64>,
    /// Timestamp of the last record of any mode, Polling included.
    pub last_seen_ts: Option<i64>,
    pub last_odometer: Option<f64>,
    pub last_park_location: Option<Location>,
    pub last_park_odo: Option<f64>,
    pub session_counter: u64,
    /// Most recent Polling timestamp seen while a session was open.
    pub real_last_ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The record opened or extended the active session.
    Continued,
    /// The record ended the previous session and opened the next one.
    Closed(Box<Session>),
    /// Polling or stale record; no session was touched.
    Skipped,
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    zone: DisplayZone,
    carry: CarryOver,
    active: Option<Session>,
}

impl SessionTracker {
    pub fn new(zone: DisplayZone) -> Self {
        Self {
            zone,
            carry: CarryOver::default(),
            active: None,
        }
    }

    pub fn zone(&self) -> &DisplayZone {
        &self.zone
    }

    pub fn carry_over(&self) -> &CarryOver {
        &self.carry
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    /// Gap before the most recent record of the active session.
    pub fn since_last(&self) -> Option<i64> {
        self.active.as_ref().map(|session| session.since_last)
    }

    pub fn ingest(&mut self, mut record: Record) -> SessionEvent {
        self.carry.last_seen_ts = Some(
            self.carry
                .last_seen_ts
                .map_or(record.timets, |seen| seen.max(record.timets)),
        );

        if record.mode == Mode::Polling {
            if let Some(active) = &self.active {
                if record.timets >= active.end_ts {
                    self.carry.real_last_ts = Some(record.timets);
                }
            }
            debug!(ts = record.timets, "Polling record, vehicle asleep");
            return SessionEvent::Skipped;
        }

        let Some(mut active) = self.active.take() else {
            let session = self.open(&record);
            self.active = Some(session);
            return SessionEvent::Continued;
        };

        if record.timets < active.end_ts {
            debug!(
                session_no = active.session_no,
                ts = record.timets,
                end_ts = active.end_ts,
                "Stale record ignored"
            );
            self.active = Some(active);
            return SessionEvent::Skipped;
        }

        if record.session_type == active.session_type() {
            self.carry.real_last_ts = None;
            self.update(&mut active, &record);
            self.active = Some(active);
            return SessionEvent::Continued;
        }

        if let Some(real_last_ts) = self.carry.real_last_ts.take() {
            if real_last_ts < record.timets {
                debug!(
                    session_no = active.session_no,
                    observed = record.timets,
                    backdated = real_last_ts,
                    "Backdating mode change to last poll"
                );
                record.timets = real_last_ts;
            }
        }

        active.detail.absorb_boundary(&record, active.session_no);
        let boundary = Observation::from_record(&record);
        self.close(&mut active, boundary);

        let next = self.open(&record);
        self.active = Some(next);
        SessionEvent::Closed(Box::new(active))
    }

    /// Closes the active session against its own last observed state.
    pub fn close_at_end(&mut self) -> Option<Session> {
        let mut active = self.active.take()?;
        let boundary = active.latest;
        self.close(&mut active, boundary);
        Some(active)
    }

    /// Restores carry-over state from a persisted session. A session that
    /// was still open becomes the active session again.
    pub fn resume(&mut self, session: Session) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(TeslogError::SessionAlreadyOpen {
                active: active.session_no,
            });
        }

        let carry = &mut self.carry;
        carry.session_counter = carry.session_counter.max(session.session_no);
        carry.last_record_ts = Some(
            carry
                .last_record_ts
                .map_or(session.end_ts, |ts| ts.max(session.end_ts)),
        );
        carry.last_seen_ts = carry.last_seen_ts.max(carry.last_record_ts);
        carry.last_odometer = session
            .end_odo
            .or(session.latest.odometer)
            .or(session.start_odo)
            .or(carry.last_odometer);

        match &session.detail {
            SessionDetail::Driving(_) => {
                if session.closed {
                    carry.last_park_location = session.end_location.or(carry.last_park_location);
                    carry.last_park_odo = session.end_odo.or(carry.last_park_odo);
                }
            }
            SessionDetail::Parked(stats) => {
                carry.last_park_location = stats
                    .location
                    .or(session.latest.location)
                    .or(carry.last_park_location);
                carry.last_park_odo = carry.last_odometer;
            }
            SessionDetail::Charging(_) | SessionDetail::Conditioning(_) => {
                carry.last_park_location = session
                    .latest
                    .location
                    .or(session.start_location)
                    .or(carry.last_park_location);
                carry.last_park_odo = carry.last_odometer;
            }
        }

        info!(
            session_no = session.session_no,
            kind = session.session_type().as_str(),
            closed = session.closed,
            "Resumed from stored session"
        );
        if !session.closed {
            self.active = Some(session);
        }
        Ok(())
    }

    fn open(&mut self, record: &Record) -> Session {
        let carry = &mut self.carry;
        let since_last = carry
            .last_record_ts
            .map_or(0, |last| record.timets.saturating_sub(last));
        carry.last_record_ts = Some(record.timets);
        carry.session_counter += 1;

        let odometer = record.known_odometer();
        if odometer.is_some() {
            carry.last_odometer = odometer;
        }
        let mut start_odo = odometer.or(carry.last_odometer);
        let mut start_location = record.location();

        if record.session_type == SessionType::Driving {
            // GPS lags at drive start; the car really left from where it parked.
            if carry.last_park_location.is_some() {
                start_location = carry.last_park_location;
            }
            if carry.last_park_odo.is_some() {
                start_odo = carry.last_park_odo;
            }
        } else {
            remember_parked(carry, record);
        }

        let has_start_data = record.usable_battery_level.is_some() && start_odo.is_some();
        let session = Session {
            session_no: carry.session_counter,
            vehicle_id: record.vehicle_id.clone(),
            start_ts: record.timets,
            end_ts: record.timets,
            closed: false,
            since_last,
            start_battery_level: record.usable_battery_level,
            start_battery_range: record.battery_range,
            end_battery_level: None,
            end_battery_range: None,
            start_odo,
            end_odo: None,
            start_location,
            end_location: None,
            has_start_data,
            distance_unit: DistanceUnit::from_gui(record.distance_unit.as_deref()),
            temp_unit: TempUnit::from_gui(record.temp_unit.as_deref()),
            latest: Observation::from_record(record),
            detail: SessionDetail::open(record, carry.last_park_location),
        };

        debug!(
            session_no = session.session_no,
            kind = session.session_type().as_str(),
            start = %self.zone.format_ts(session.start_ts),
            since_last,
            complete = has_start_data,
            "Session opened"
        );
        session
    }

    fn update(&mut self, active: &mut Session, record: &Record) {
        let carry = &mut self.carry;
        active.since_last = carry
            .last_record_ts
            .map_or(0, |last| record.timets.saturating_sub(last));
        carry.last_record_ts = Some(record.timets);
        active.end_ts = record.timets;

        if let Some(odometer) = record.known_odometer() {
            carry.last_odometer = Some(odometer);
        }
        if active.start_battery_level.is_none() {
            active.start_battery_level = record.usable_battery_level;
        }
        active.latest = Observation::from_record(record).merged_onto(&active.latest);
        if active.session_type() != SessionType::Driving {
            remember_parked(carry, record);
        }
        active.detail.observe(record, active.session_no);

        debug!(
            session_no = active.session_no,
            kind = active.session_type().as_str(),
            end = %self.zone.format_ts(active.end_ts),
            since_last = active.since_last,
            "Session updated"
        );
    }

    fn close(&mut self, active: &mut Session, boundary: Observation) {
        if boundary.odometer.is_some() {
            self.carry.last_odometer = boundary.odometer;
        }
        let end = boundary.merged_onto(&active.latest);

        active.closed = true;
        active.end_ts = boundary.ts;
        active.end_odo = boundary.odometer.or(self.carry.last_odometer);
        active.end_battery_level = end.battery_level;
        active.end_battery_range = end.battery_range;
        active.end_location = end.location;

        let ctx = CloseContext {
            session_no: active.session_no,
            duration_secs: active.duration_secs(),
            start_level: active.start_battery_level,
            end_level: active.end_battery_level,
            start_range: active.start_battery_range,
            end_range: active.end_battery_range,
            start_odo: active.start_odo,
            end_odo: active.end_odo,
        };
        active.detail.finish(&ctx);

        debug!(
            session_no = active.session_no,
            kind = active.session_type().as_str(),
            end = %self.zone.format_ts(active.end_ts),
            duration_secs = ctx.duration_secs,
            "Session closed"
        );
    }
}

/// Stationary sessions keep the parked position current for the next drive.
fn remember_parked(carry: &mut CarryOver, record: &Record) {
    if let Some(location) = record.location() {
        carry.last_park_location = Some(location);
    }
    if let Some(odometer) = record.known_odometer() {
        carry.last_park_odo = Some(odometer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, record_with};
    use serde_json::json;

    fn parked_at(ts: i64, lat: f64, lon: f64, odo: f64, level: i64) -> Record {
        record_with(
            ts,
            Mode::Standby,
            json!({
                "latitude": lat,
                "longitude": lon,
                "odometer": odo,
                "usable_battery_level": level,
                "battery_range": 200.0,
            }),
        )
    }

    fn driving(ts: i64, extra: serde_json::Value) -> Record {
        record_with(ts, Mode::Driving, extra)
    }

    fn closed(event: SessionEvent) -> Session {
        match event {
            SessionEvent::Closed(session) => *session,
            other => panic!("expected a closed session, got {:?}", other),
        }
    }

    #[test]
    fn first_record_opens_session_one() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        let event = tracker.ingest(parked_at(100, 37.0, -122.0, 1000.0, 80));
        assert_eq!(event, SessionEvent::Continued);
        let active = tracker.active().expect("active session");
        assert_eq!(active.session_no, 1);
        assert_eq!(active.session_type(), SessionType::Parked);
        assert!(active.has_start_data);
        assert_eq!(active.since_last, 0);
    }

    #[test]
    fn polling_touches_nothing_but_last_seen() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(parked_at(100, 37.0, -122.0, 1000.0, 80));
        let before = tracker.carry_over().clone();
        let active_before = tracker.active().cloned();

        let event = tracker.ingest(record_with(
            500,
            Mode::Polling,
            json!({ "latitude": 1.0, "longitude": 1.0 }),
        ));
        assert_eq!(event, SessionEvent::Skipped);

        let after = tracker.carry_over();
        assert_eq!(after.last_seen_ts, Some(500));
        assert_eq!(after.last_odometer, before.last_odometer);
        assert_eq!(after.last_park_location, before.last_park_location);
        assert_eq!(after.last_park_odo, before.last_park_odo);
        assert_eq!(after.session_counter, before.session_counter);
        assert_eq!(tracker.active().cloned(), active_before);
    }

    #[test]
    fn polling_before_any_session_opens_nothing() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        assert_eq!(tracker.ingest(record(10, Mode::Polling)), SessionEvent::Skipped);
        assert!(tracker.active().is_none());
        assert_eq!(tracker.carry_over().session_counter, 0);
    }

    #[test]
    fn sessions_are_contiguous_and_numbered() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        let stream = [
            (100, Mode::Standby),
            (200, Mode::Standby),
            (300, Mode::Driving),
            (400, Mode::Driving),
            (500, Mode::Charging),
            (600, Mode::Conditioning),
            (700, Mode::Standby),
        ];
        let mut closed_sessions = Vec::new();
        for (ts, mode) in stream {
            if let SessionEvent::Closed(session) = tracker.ingest(record(ts, mode)) {
                closed_sessions.push(*session);
            }
            assert!(tracker.active().is_some());
        }

        let numbers: Vec<u64> = closed_sessions.iter().map(|s| s.session_no).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        for pair in closed_sessions.windows(2) {
            assert_eq!(pair[0].end_ts, pair[1].start_ts);
        }
        let active = tracker.active().expect("active");
        assert_eq!(active.session_no, 5);
        assert_eq!(active.start_ts, closed_sessions[3].end_ts);
    }

    #[test]
    fn drive_start_is_backdated_to_parked_position() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(parked_at(100, 37.0, -122.0, 1000.0, 80));
        tracker.ingest(driving(
            200,
            json!({ "odometer": 1000.4, "usable_battery_level": 80, "battery_range": 199.0 }),
        ));

        let drive = tracker.active().expect("drive");
        assert_eq!(drive.session_type(), SessionType::Driving);
        assert_eq!(drive.start_location, Some(Location::new(37.0, -122.0)));
        assert_eq!(drive.start_odo, Some(1000.0));
    }

    #[test]
    fn drive_without_odometer_inherits_parked_odometer() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(parked_at(100, 37.0, -122.0, 1000.0, 80));
        tracker.ingest(driving(200, json!({ "usable_battery_level": 80 })));
        let drive = tracker.active().expect("drive");
        assert!(drive.has_start_data);
        assert_eq!(drive.start_odo, Some(1000.0));
    }

    #[test]
    fn missing_start_data_marks_session_incomplete() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(100, Mode::Standby));
        tracker.ingest(record_with(200, Mode::Standby, json!({ "usable_battery_level": 70 })));
        let session = tracker.active().expect("active");
        assert!(!session.has_start_data);
        assert_eq!(session.start_battery_level, Some(70));
    }

    #[test]
    fn drive_close_computes_distance_and_temps() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(parked_at(0, 37.0, -122.0, 1000.0, 80));
        tracker.ingest(driving(
            100,
            json!({ "usable_battery_level": 80, "battery_range": 200.0, "outside_temp": 10.0 }),
        ));
        tracker.ingest(driving(
            1900,
            json!({ "odometer": 1020.0, "battery_range": 190.0, "outside_temp": 14.0 }),
        ));
        let drive = closed(tracker.ingest(parked_at(3700, 37.1, -122.1, 1025.0, 72)));

        assert_eq!(drive.end_odo, Some(1025.0));
        assert_eq!(drive.end_battery_level, Some(72));
        assert_eq!(drive.end_location, Some(Location::new(37.1, -122.1)));
        match &drive.detail {
            SessionDetail::Driving(stats) => {
                assert_eq!(stats.distance, Some(25.0));
                assert_eq!(stats.avg_outside_temp, Some(12.0));
                assert_eq!(stats.avg_inside_temp, None);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn flat_charge_closes_with_zero_ratio() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        let charging = |ts: i64| {
            record_with(
                ts,
                Mode::Charging,
                json!({
                    "usable_battery_level": 80,
                    "battery_range": 240.0,
                    "odometer": 500.0,
                    "charge_energy_added": 0.3,
                }),
            )
        };
        tracker.ingest(charging(0));
        tracker.ingest(charging(600));
        let session = closed(tracker.ingest(parked_at(1200, 1.0, 1.0, 500.0, 80)));
        match &session.detail {
            SessionDetail::Charging(stats) => {
                assert_eq!(stats.level_delta, Some(0));
                assert_eq!(stats.energy_per_full, 0.0);
                assert_eq!(stats.avg_power, 0.0);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn charging_energy_regression_keeps_maximum() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        for (i, energy) in [1.0, 1.2, 0.9, 1.5].into_iter().enumerate() {
            tracker.ingest(record_with(
                i as i64 * 60,
                Mode::Charging,
                json!({ "charge_energy_added": energy }),
            ));
            if i == 2 {
                match &tracker.active().expect("charging").detail {
                    SessionDetail::Charging(stats) => {
                        assert_eq!(stats.energy_added, Some(1.2));
                    }
                    other => panic!("unexpected detail {:?}", other),
                }
            }
        }
        let session = closed(tracker.ingest(record(600, Mode::Standby)));
        match &session.detail {
            SessionDetail::Charging(stats) => {
                assert_eq!(stats.energy_added, Some(1.5));
                assert_eq!(stats.regressions, 1);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn polling_gap_backdates_mode_change() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(100, Mode::Driving));
        tracker.ingest(record(200, Mode::Driving));
        tracker.ingest(record(300, Mode::Polling));
        tracker.ingest(record(400, Mode::Polling));
        let drive = closed(tracker.ingest(record(9000, Mode::Standby)));

        assert_eq!(drive.end_ts, 400);
        assert_eq!(tracker.active().expect("parked").start_ts, 400);
        assert_eq!(tracker.carry_over().real_last_ts, None);
    }

    #[test]
    fn same_type_record_clears_remembered_poll() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(100, Mode::Driving));
        tracker.ingest(record(150, Mode::Polling));
        tracker.ingest(record(200, Mode::Driving));
        let drive = closed(tracker.ingest(record(300, Mode::Standby)));
        assert_eq!(drive.end_ts, 300);
    }

    #[test]
    fn stale_record_is_skipped() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(100, Mode::Standby));
        tracker.ingest(record(200, Mode::Standby));
        assert_eq!(tracker.ingest(record(150, Mode::Driving)), SessionEvent::Skipped);
        let active = tracker.active().expect("active");
        assert_eq!(active.session_type(), SessionType::Parked);
        assert_eq!(active.end_ts, 200);
    }

    #[test]
    fn since_last_tracks_gaps() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(100, Mode::Standby));
        tracker.ingest(record(13_000, Mode::Standby));
        assert_eq!(tracker.since_last(), Some(12_900));
        tracker.ingest(record(13_060, Mode::Driving));
        assert_eq!(tracker.since_last(), Some(60));
    }

    #[test]
    fn extreme_timestamps_saturate() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(-9_000_000_000_000_000_000, Mode::Standby));
        tracker.ingest(record(9_000_000_000_000_000_000, Mode::Standby));
        assert_eq!(tracker.since_last(), Some(i64::MAX));
        let closed = match tracker.ingest(record(9_100_000_000_000_000_000, Mode::Driving)) {
            SessionEvent::Closed(session) => session,
            other => panic!("expected a closed session, got {:?}", other),
        };
        assert_eq!(closed.duration_secs(), i64::MAX);
    }

    #[test]
    fn close_at_end_uses_last_observation() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(parked_at(100, 37.0, -122.0, 1000.0, 80));
        tracker.ingest(parked_at(86_500, 37.0, -122.0, 1000.0, 78));
        let session = tracker.close_at_end().expect("closed");
        assert!(session.closed);
        assert_eq!(session.end_ts, 86_500);
        assert_eq!(session.end_battery_level, Some(78));
        assert!(tracker.active().is_none());
        assert!(tracker.close_at_end().is_none());
    }

    #[test]
    fn resume_restores_counter_and_active_session() {
        let mut first = SessionTracker::new(DisplayZone::Utc);
        first.ingest(parked_at(100, 37.0, -122.0, 1000.0, 80));
        first.ingest(record(200, Mode::Driving));
        first.ingest(parked_at(300, 37.5, -122.5, 1010.0, 75));
        let stored = first.active().cloned().expect("active");

        let mut second = SessionTracker::new(DisplayZone::Utc);
        second.resume(stored).expect("resume");
        assert_eq!(second.carry_over().session_counter, 3);
        assert_eq!(
            second.carry_over().last_park_location,
            Some(Location::new(37.5, -122.5))
        );
        assert_eq!(second.active().map(|s| s.session_no), Some(3));

        let parked = closed(second.ingest(record(400, Mode::Driving)));
        assert_eq!(parked.session_no, 3);
        let drive = second.active().expect("drive");
        assert_eq!(drive.session_no, 4);
        assert_eq!(drive.start_odo, Some(1010.0));
    }

    #[test]
    fn resume_over_active_session_is_a_contract_violation() {
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record(100, Mode::Standby));
        let stored = tracker.active().cloned().expect("active");
        let err = tracker.resume(stored).expect_err("must refuse");
        assert!(matches!(err, TeslogError::SessionAlreadyOpen { active: 1 }));
    }
}
