//! Durable "last session" store contract.
//!
//! The tracker persists every closed session and the active one, keyed by
//! vehicle and session number, so a restarted process can pick up where it
//! left off.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Result, TeslogError};
use crate::session::Session;

pub trait SessionStore {
    /// Inserts or replaces the session with the same vehicle and number.
    fn put(&self, session: &Session) -> Result<()>;

    /// Session with the highest number for `vehicle`.
    fn latest(&self, vehicle: &str) -> Result<Option<Session>>;
}

/// In-process store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<BTreeMap<(String, u64), Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn put(&self, session: &Session) -> Result<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| TeslogError::Store("session store lock poisoned".to_string()))?;
        sessions.insert(
            (session.vehicle_key().to_string(), session.session_no),
            session.clone(),
        );
        Ok(())
    }

    fn latest(&self, vehicle: &str) -> Result<Option<Session>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| TeslogError::Store("session store lock poisoned".to_string()))?;
        Ok(sessions
            .range((vehicle.to_string(), 0)..=(vehicle.to_string(), u64::MAX))
            .next_back()
            .map(|(_, session)| session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_with;
    use crate::tracker::SessionTracker;
    use crate::zone::DisplayZone;
    use serde_json::json;
    use teslog_protocol::Mode;

    #[test]
    fn latest_is_highest_number_per_vehicle() {
        let store = MemoryStore::new();
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        for (ts, mode) in [(100, Mode::Standby), (200, Mode::Driving), (300, Mode::Standby)] {
            tracker.ingest(record_with(ts, mode, json!({ "vehicle_id": "7" })));
            store.put(tracker.active().expect("active")).expect("put");
        }
        let mut other = SessionTracker::new(DisplayZone::Utc);
        other.ingest(record_with(50, Mode::Standby, json!({ "vehicle_id": "8" })));
        store.put(other.active().expect("active")).expect("put");

        let latest = store.latest("7").expect("latest").expect("session");
        assert_eq!(latest.session_no, 3);
        assert_eq!(store.latest("8").expect("latest").map(|s| s.session_no), Some(1));
        assert_eq!(store.latest("9").expect("latest"), None);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn put_replaces_same_session() {
        let store = MemoryStore::new();
        let mut tracker = SessionTracker::new(DisplayZone::Utc);
        tracker.ingest(record_with(100, Mode::Standby, json!({})));
        store.put(tracker.active().expect("active")).expect("put");
        tracker.ingest(record_with(200, Mode::Standby, json!({})));
        store.put(tracker.active().expect("active")).expect("put");

        assert_eq!(store.len(), 1);
        let latest = store.latest("unknown").expect("latest").expect("session");
        assert_eq!(latest.end_ts, 200);
    }
}
