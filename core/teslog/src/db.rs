//! SQLite persistence for teslog.
//!
//! One file holds two tables: `sessions`, the durable "last session" store
//! used to resume after a restart, and `geo_cache`, reverse-geocoding
//! results keyed by map tile. Sessions are stored as a JSON payload next to
//! a few indexed columns.

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use teslog_core::{GeoCache, Place, Session, SessionStore, TeslogError, Tile};

pub struct Db {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self {
            path,
            conn: Mutex::new(None),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn upsert_session(&self, session: &Session) -> Result<(), String> {
        self.with_connection(|conn| {
            let payload = serde_json::to_string(session)
                .map_err(|err| format!("Failed to serialize session payload: {}", err))?;

            conn.execute(
                "INSERT INTO sessions \
                    (vehicle_id, session_no, session_type, start_ts, end_ts, closed, payload, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(vehicle_id, session_no) DO UPDATE SET \
                    session_type = excluded.session_type, \
                    start_ts = excluded.start_ts, \
                    end_ts = excluded.end_ts, \
                    closed = excluded.closed, \
                    payload = excluded.payload, \
                    updated_at = excluded.updated_at",
                params![
                    session.vehicle_key(),
                    session.session_no as i64,
                    session.session_type().as_str(),
                    session.start_ts,
                    session.end_ts,
                    session.closed,
                    payload,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|err| format!("Failed to upsert session: {}", err))?;

            Ok(())
        })
    }

    pub fn latest_session(&self, vehicle: &str) -> Result<Option<Session>, String> {
        self.with_connection(|conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM sessions WHERE vehicle_id = ?1 \
                     ORDER BY session_no DESC LIMIT 1",
                    params![vehicle],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| format!("Failed to query latest session: {}", err))?;
            payload.map(|payload| parse_session(&payload)).transpose()
        })
    }

    /// Most recent sessions first, optionally for one vehicle.
    pub fn list_sessions(&self, vehicle: Option<&str>, limit: usize) -> Result<Vec<Session>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT payload FROM sessions \
                     WHERE (?1 IS NULL OR vehicle_id = ?1) \
                     ORDER BY end_ts DESC, session_no DESC LIMIT ?2",
                )
                .map_err(|err| format!("Failed to prepare sessions query: {}", err))?;

            let rows = stmt
                .query_map(params![vehicle, limit as i64], |row| row.get::<_, String>(0))
                .map_err(|err| format!("Failed to read session rows: {}", err))?;

            let mut sessions = Vec::new();
            for row in rows {
                let payload = row.map_err(|err| format!("Failed to decode session row: {}", err))?;
                sessions.push(parse_session(&payload)?);
            }
            Ok(sessions)
        })
    }

    /// Deletes stored sessions (all, or one vehicle's). Returns the count.
    pub fn erase_sessions(&self, vehicle: Option<&str>) -> Result<usize, String> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE (?1 IS NULL OR vehicle_id = ?1)",
                params![vehicle],
            )
            .map_err(|err| format!("Failed to erase sessions: {}", err))
        })
    }

    pub fn get_place(&self, tile_key: &str) -> Result<Option<Place>, String> {
        self.with_connection(|conn| {
            let payload: Option<String> = conn
                .query_row(
                    "SELECT payload FROM geo_cache WHERE tile = ?1",
                    params![tile_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| format!("Failed to query geocode cache: {}", err))?;
            payload
                .map(|payload| {
                    serde_json::from_str(&payload)
                        .map_err(|err| format!("Failed to parse cached place: {}", err))
                })
                .transpose()
        })
    }

    pub fn put_place(&self, tile_key: &str, place: &Place) -> Result<(), String> {
        self.with_connection(|conn| {
            let payload = serde_json::to_string(place)
                .map_err(|err| format!("Failed to serialize place: {}", err))?;
            conn.execute(
                "INSERT INTO geo_cache (tile, payload, created_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(tile) DO UPDATE SET payload = excluded.payload",
                params![tile_key, payload, Utc::now().to_rfc3339()],
            )
            .map_err(|err| format!("Failed to store cached place: {}", err))?;
            Ok(())
        })
    }

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS sessions (
                    vehicle_id TEXT NOT NULL,
                    session_no INTEGER NOT NULL,
                    session_type TEXT NOT NULL,
                    start_ts INTEGER NOT NULL,
                    end_ts INTEGER NOT NULL,
                    closed INTEGER NOT NULL DEFAULT 0,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (vehicle_id, session_no)
                 );
                 CREATE INDEX IF NOT EXISTS sessions_end_ts ON sessions (end_ts);
                 CREATE TABLE IF NOT EXISTS geo_cache (
                    tile TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    created_at TEXT NOT NULL
                 );
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|_| "Database connection lock poisoned".to_string())?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        match slot.as_mut() {
            Some(conn) => op(conn),
            None => Err("Database connection unavailable".to_string()),
        }
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create teslog data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;

        Ok(conn)
    }
}

fn parse_session(payload: &str) -> Result<Session, String> {
    serde_json::from_str(payload).map_err(|err| format!("Failed to parse session payload: {}", err))
}

impl SessionStore for Db {
    fn put(&self, session: &Session) -> teslog_core::Result<()> {
        self.upsert_session(session).map_err(TeslogError::Store)
    }

    fn latest(&self, vehicle: &str) -> teslog_core::Result<Option<Session>> {
        self.latest_session(vehicle).map_err(TeslogError::Store)
    }
}

impl GeoCache for Db {
    fn get(&self, tile: &Tile) -> teslog_core::Result<Option<Place>> {
        self.get_place(&tile.key()).map_err(TeslogError::Locate)
    }

    fn put(&self, tile: &Tile, place: &Place) -> teslog_core::Result<()> {
        self.put_place(&tile.key(), place).map_err(TeslogError::Locate)
    }
}
