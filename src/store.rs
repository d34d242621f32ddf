//! Durable session storage.
//!
//! Two string-keyed slots in a local SQLite file, mirroring the app's
//! original pair of browser-storage keys: the serialized session aggregate
//! and the last-reminder date stamp. A full reset deletes both.
//!
//! Failures here are never fatal to a session: callers log them and keep the
//! in-memory state authoritative.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::state::SessionState;

pub const SESSION_STATE_KEY: &str = "session_state";
pub const LAST_REMINDED_KEY: &str = "last_reminded_date";

const DATE_FMT: &str = "%Y-%m-%d";

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))
    }

    /// Create or open the store file, creating parent directories and the
    /// schema as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory {:?}", parent))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open session store at {:?}", path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row("SELECT value FROM slots WHERE key = ?1", [key], |row| {
            row.get(0)
        });

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM slots WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Overwrite the persisted aggregate with a fresh snapshot.
    pub fn save_session(&self, state: &SessionState) -> Result<()> {
        let blob = serde_json::to_string(state).context("Failed to serialize session state")?;
        self.put(SESSION_STATE_KEY, &blob)
    }

    /// Load the raw saved aggregate, if any.
    ///
    /// Returns the undecoded JSON so the caller can merge it field-by-field
    /// with defaults; a blob that is not even JSON is treated as absent.
    pub fn load_session(&self) -> Result<Option<Value>> {
        let Some(raw) = self.get(SESSION_STATE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Saved session blob is not valid JSON, starting fresh: {}", e);
                Ok(None)
            }
        }
    }

    pub fn load_reminder_date(&self) -> Result<Option<NaiveDate>> {
        let Some(raw) = self.get(LAST_REMINDED_KEY)? else {
            return Ok(None);
        };
        Ok(NaiveDate::parse_from_str(raw.trim(), DATE_FMT).ok())
    }

    pub fn save_reminder_date(&self, date: NaiveDate) -> Result<()> {
        self.put(LAST_REMINDED_KEY, &date.format(DATE_FMT).to_string())
    }

    /// Delete both durable slots. The reset path; irreversible.
    pub fn clear(&self) -> Result<()> {
        self.delete(SESSION_STATE_KEY)?;
        self.delete(LAST_REMINDED_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::AgentId;
    use crate::state::Message;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("clover_{}_{}.db", name, uuid::Uuid::new_v4()));
        path
    }

    #[test]
    fn session_round_trips_through_the_store() {
        let path = temp_db_path("round_trip");
        let store = SessionStore::open(&path).expect("store init");

        let mut state = SessionState::default();
        state.day = 5;
        state
            .histories
            .get_mut(&AgentId::Ren)
            .unwrap()
            .push(Message::from_user("checking in"));

        store.save_session(&state).expect("save");
        let loaded = store.load_session().expect("load").expect("present");
        assert_eq!(SessionState::from_saved(loaded), state);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_session_loads_as_none() {
        let path = temp_db_path("missing");
        let store = SessionStore::open(&path).expect("store init");
        assert!(store.load_session().expect("load").is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn garbage_session_blob_loads_as_none() {
        let path = temp_db_path("garbage");
        let store = SessionStore::open(&path).expect("store init");
        store.put(SESSION_STATE_KEY, "{{not json").expect("put");
        assert!(store.load_session().expect("load").is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reminder_slot_is_independent_of_the_session_slot() {
        let path = temp_db_path("reminder");
        let store = SessionStore::open(&path).expect("store init");

        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        store.save_reminder_date(date).expect("save reminder");
        store
            .save_session(&SessionState::default())
            .expect("save session");

        assert_eq!(store.load_reminder_date().expect("load"), Some(date));
        assert!(store.load_session().expect("load").is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn clear_removes_both_slots() {
        let path = temp_db_path("clear");
        let store = SessionStore::open(&path).expect("store init");

        store
            .save_session(&SessionState::default())
            .expect("save session");
        store
            .save_reminder_date(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
            .expect("save reminder");

        store.clear().expect("clear");
        assert!(store.load_session().expect("load").is_none());
        assert!(store.load_reminder_date().expect("load").is_none());

        let _ = std::fs::remove_file(&path);
    }
}
