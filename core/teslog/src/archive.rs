//! Hour-rotated archive of raw snapshot lines.
//!
//! Lines land in `<outdir>/YYYY-MM-DD.json`, named by the record's UTC date.
//! The file is reopened at every UTC hour boundary and `cur.json` always
//! points at the file most recently opened.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::DateTime;
use fs_err::{File, OpenOptions};
use tracing::debug;

use teslog_core::{RecordSink, TeslogError};

const CURRENT_LINK: &str = "cur.json";
const HOUR_SECS: i64 = 3600;

pub struct RotatingSink {
    outdir: PathBuf,
    state: Mutex<ArchiveState>,
}

#[derive(Default)]
struct ArchiveState {
    file: Option<File>,
    next_rotation: i64,
}

impl RotatingSink {
    pub fn new(outdir: PathBuf) -> Result<Self, String> {
        fs_err::create_dir_all(&outdir)
            .map_err(|err| format!("Failed to create archive dir: {}", err))?;
        Ok(Self {
            outdir,
            state: Mutex::new(ArchiveState::default()),
        })
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    fn rotate(&self, state: &mut ArchiveState, record_ts: i64) -> teslog_core::Result<()> {
        state.file = None;

        let name = file_name_for(record_ts);
        let path = self.outdir.join(&name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| sink_error("opening archive file", source))?;
        self.refresh_link(&name)?;

        state.file = Some(file);
        state.next_rotation = (record_ts / HOUR_SECS + 1) * HOUR_SECS;
        debug!(path = %path.display(), next_rotation = state.next_rotation, "Rotated archive");
        Ok(())
    }

    #[cfg(unix)]
    fn refresh_link(&self, target: &str) -> teslog_core::Result<()> {
        let link = self.outdir.join(CURRENT_LINK);
        if fs_err::symlink_metadata(&link).is_ok() {
            fs_err::remove_file(&link).map_err(|source| sink_error("removing cur.json", source))?;
        }
        fs_err::os::unix::fs::symlink(target, &link)
            .map_err(|source| sink_error("linking cur.json", source))
    }

    #[cfg(not(unix))]
    fn refresh_link(&self, _target: &str) -> teslog_core::Result<()> {
        Ok(())
    }
}

impl RecordSink for RotatingSink {
    fn write(&self, record_ts: i64, line: &str) -> teslog_core::Result<()> {
        let mut state = self.state.lock().map_err(|_| {
            sink_error("archive", std::io::Error::other("archive lock poisoned"))
        })?;
        if state.file.is_none() || record_ts >= state.next_rotation {
            self.rotate(&mut state, record_ts)?;
        }
        match state.file.as_mut() {
            Some(file) => writeln!(file, "{}", line.trim_end())
                .and_then(|_| file.flush())
                .map_err(|source| sink_error("appending to archive", source)),
            None => Err(sink_error(
                "archive",
                std::io::Error::other("archive file not open"),
            )),
        }
    }
}

fn file_name_for(record_ts: i64) -> String {
    let date = DateTime::from_timestamp(record_ts, 0)
        .map(|utc| utc.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "invalid-date".to_string());
    format!("{}.json", date)
}

fn sink_error(context: &str, source: std::io::Error) -> TeslogError {
    TeslogError::Sink {
        context: context.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2020-09-13 23:30:00 UTC
    const LATE_EVENING: i64 = 1_600_039_800;

    #[test]
    fn names_files_by_utc_date() {
        assert_eq!(file_name_for(0), "1970-01-01.json");
        assert_eq!(file_name_for(LATE_EVENING), "2020-09-13.json");
        assert_eq!(file_name_for(LATE_EVENING + 1800), "2020-09-14.json");
    }

    #[test]
    fn rolls_over_at_midnight() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let sink = RotatingSink::new(temp_dir.path().join("archive")).expect("sink");

        sink.write(LATE_EVENING, "{\"a\":1}\n").expect("write");
        sink.write(LATE_EVENING + 60, "{\"a\":2}").expect("write");
        sink.write(LATE_EVENING + 1800, "{\"a\":3}").expect("write");

        let first = fs_err::read_to_string(sink.outdir().join("2020-09-13.json")).expect("read");
        let second = fs_err::read_to_string(sink.outdir().join("2020-09-14.json")).expect("read");
        assert_eq!(first, "{\"a\":1}\n{\"a\":2}\n");
        assert_eq!(second, "{\"a\":3}\n");
    }

    #[test]
    fn reopening_appends() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let outdir = temp_dir.path().to_path_buf();
        RotatingSink::new(outdir.clone())
            .expect("sink")
            .write(LATE_EVENING, "one")
            .expect("write");
        RotatingSink::new(outdir.clone())
            .expect("sink")
            .write(LATE_EVENING + 5, "two")
            .expect("write");
        let content = fs_err::read_to_string(outdir.join("2020-09-13.json")).expect("read");
        assert_eq!(content, "one\ntwo\n");
    }

    #[cfg(unix)]
    #[test]
    fn current_link_follows_rotation() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let sink = RotatingSink::new(temp_dir.path().to_path_buf()).expect("sink");
        let link = temp_dir.path().join(CURRENT_LINK);

        sink.write(LATE_EVENING, "one").expect("write");
        assert_eq!(
            fs_err::read_link(&link).expect("link"),
            PathBuf::from("2020-09-13.json")
        );

        sink.write(LATE_EVENING + 1800, "two").expect("write");
        assert_eq!(
            fs_err::read_link(&link).expect("link"),
            PathBuf::from("2020-09-14.json")
        );
        assert_eq!(fs_err::read_to_string(&link).expect("read"), "two\n");
    }
}
