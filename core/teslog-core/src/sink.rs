//! Archival sink contract for accepted raw lines.

use std::io::Write;
use std::sync::Mutex;

use crate::error::{Result, TeslogError};

pub trait RecordSink {
    /// Appends one raw snapshot line. `record_ts` picks the time bucket for
    /// sinks that rotate.
    fn write(&self, record_ts: i64, line: &str) -> Result<()>;
}

/// Copies lines to any writer (stdout for `--echo`).
pub struct StreamSink<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> RecordSink for StreamSink<W> {
    fn write(&self, _record_ts: i64, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_| TeslogError::Sink {
            context: "stream sink".to_string(),
            source: std::io::Error::other("writer lock poisoned"),
        })?;
        writeln!(writer, "{}", line.trim_end())
            .and_then(|_| writer.flush())
            .map_err(|source| TeslogError::Sink {
                context: "writing stream sink".to_string(),
                source,
            })
    }
}
