//! Stream driver core: raw lines in, session reports out.
//!
//! The pipeline owns one [`SessionTracker`] per vehicle and routes every
//! line through normalize → sinks → tracker → reporter → store. Reading the
//! input (files, stdin, a followed file) is left to the caller.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{BufRead, Write};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, TeslogError};
use crate::locate::Locate;
use crate::record::{normalize, NormalizeOptions, Normalized};
use crate::report::format_session;
use crate::session::{Session, UNKNOWN_VEHICLE};
use crate::sink::RecordSink;
use crate::store::SessionStore;
use crate::tracker::{SessionEvent, SessionTracker};
use crate::zone::{format_duration, DisplayZone};

/// Default gap, in seconds, above which a record is logged as arriving late.
pub const DEFAULT_GAP_ALERT_SECS: i64 = 12_000;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub want_offline: bool,
    /// Write a report line per closed session.
    pub summary: bool,
    pub gap_alert_secs: i64,
    pub zone: DisplayZone,
    /// Close and report every open session in [`Pipeline::finish`].
    pub close_at_end: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            want_offline: false,
            summary: true,
            gap_alert_secs: DEFAULT_GAP_ALERT_SECS,
            zone: DisplayZone::default(),
            close_at_end: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub lines: u64,
    pub records: u64,
    pub skipped: u64,
    pub sessions_closed: u64,
}

pub struct Pipeline<'a, W: Write> {
    options: PipelineOptions,
    locator: &'a dyn Locate,
    store: Option<&'a dyn SessionStore>,
    sinks: Vec<&'a dyn RecordSink>,
    out: W,
    trackers: HashMap<String, SessionTracker>,
    stats: PipelineStats,
}

impl<'a, W: Write> Pipeline<'a, W> {
    pub fn new(options: PipelineOptions, locator: &'a dyn Locate, out: W) -> Self {
        Self {
            options,
            locator,
            store: None,
            sinks: Vec::new(),
            out,
            trackers: HashMap::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn with_store(mut self, store: &'a dyn SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn RecordSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn tracker(&self, vehicle: &str) -> Option<&SessionTracker> {
        self.trackers.get(vehicle)
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Feeds every line of `reader`. Invalid UTF-8 is replaced, not fatal:
    /// such a line fails JSON parsing and is skipped like any malformed one.
    pub fn run<R: BufRead>(&mut self, mut reader: R) -> Result<PipelineStats> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| TeslogError::Io {
                    context: "reading input".to_string(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            self.process_line(&String::from_utf8_lossy(&buf))?;
        }
        Ok(self.stats)
    }

    pub fn process_line(&mut self, line: &str) -> Result<()> {
        self.stats.lines += 1;
        let options = NormalizeOptions {
            want_offline: self.options.want_offline,
        };
        let record = match normalize(line, options) {
            Normalized::Record(record) => *record,
            Normalized::Skip(reason) => {
                self.stats.skipped += 1;
                debug!(line = self.stats.lines, reason = reason.as_str(), "Skipped input line");
                return Ok(());
            }
        };
        self.stats.records += 1;
        debug!("{}", record.summary_line(&self.options.zone));

        for sink in &self.sinks {
            sink.write(record.timets, line)?;
        }

        let key = record
            .vehicle_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_VEHICLE.to_string());
        let ts = record.timets;
        let tracker = match self.trackers.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let tracker = resumed_tracker(self.store, self.options.zone, entry.key())?;
                entry.insert(tracker)
            }
        };

        let event = tracker.ingest(record);
        let since_last = tracker.since_last();
        let active = match (self.store, &event) {
            (Some(_), SessionEvent::Continued | SessionEvent::Closed(_)) => {
                tracker.active().cloned()
            }
            _ => None,
        };

        match event {
            SessionEvent::Skipped => return Ok(()),
            SessionEvent::Continued => {}
            SessionEvent::Closed(session) => {
                self.stats.sessions_closed += 1;
                self.report(&session)?;
                self.persist(&session)?;
            }
        }
        if let Some(active) = &active {
            self.persist(active)?;
        }

        if let Some(since_last) = since_last.filter(|gap| *gap > self.options.gap_alert_secs) {
            debug!(
                since_last,
                gap = %format_duration(since_last),
                ts,
                at = %self.options.zone.format_ts(ts),
                "Large gap since last record"
            );
        }
        Ok(())
    }

    /// Ends the stream. With `close_at_end`, every vehicle's open session is
    /// closed against its last observation and reported.
    pub fn finish(&mut self) -> Result<PipelineStats> {
        if self.options.close_at_end {
            let mut vehicles: Vec<String> = self.trackers.keys().cloned().collect();
            vehicles.sort();
            for vehicle in vehicles {
                let closed = self
                    .trackers
                    .get_mut(&vehicle)
                    .and_then(SessionTracker::close_at_end);
                if let Some(session) = closed {
                    self.stats.sessions_closed += 1;
                    self.report(&session)?;
                    self.persist(&session)?;
                }
            }
        }
        self.out.flush().map_err(|source| TeslogError::Io {
            context: "flushing report output".to_string(),
            source,
        })?;
        info!(
            lines = self.stats.lines,
            records = self.stats.records,
            skipped = self.stats.skipped,
            sessions_closed = self.stats.sessions_closed,
            "Stream finished"
        );
        Ok(self.stats)
    }

    fn report(&mut self, session: &Session) -> Result<()> {
        if !self.options.summary {
            return Ok(());
        }
        let line = format_session(session, &self.options.zone, self.locator)?;
        writeln!(self.out, "{}", line)
            .and_then(|_| self.out.flush())
            .map_err(|source| TeslogError::Io {
                context: "writing session report".to_string(),
                source,
            })
    }

    fn persist(&self, session: &Session) -> Result<()> {
        match self.store {
            Some(store) => store.put(session),
            None => Ok(()),
        }
    }
}

fn resumed_tracker(
    store: Option<&dyn SessionStore>,
    zone: DisplayZone,
    vehicle: &str,
) -> Result<SessionTracker> {
    let mut tracker = SessionTracker::new(zone);
    if let Some(session) = store.map(|store| store.latest(vehicle)).transpose()?.flatten() {
        tracker.resume(session)?;
    }
    Ok(tracker)
}
