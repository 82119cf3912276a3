//! Alert persistence.
//!
//! The pipeline only ever appends: alerts are stored once at creation and
//! read back for review. No update or delete paths exist.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{Alert, AlertType, GestureKind};

/// A persisted alert with its storage id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    #[serde(flatten)]
    pub alert: Alert,
}

pub trait AlertStore: Send {
    /// Append one alert; returns its id.
    fn store(&mut self, alert: &Alert) -> Result<i64>;

    /// Most recent alerts first, at most `limit`.
    fn query_recent(&self, limit: usize) -> Result<Vec<StoredAlert>>;

    /// Alert by id, or `None` when absent.
    fn query_by_id(&self, id: i64) -> Result<Option<StoredAlert>>;
}

// -------------------- SQLite --------------------

pub struct SqliteAlertStore {
    conn: Connection,
}

impl SqliteAlertStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS alerts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              alert_type TEXT NOT NULL,
              created_at TEXT NOT NULL,
              latitude REAL NOT NULL,
              longitude REAL NOT NULL,
              snapshot_path TEXT,
              male_count INTEGER NOT NULL,
              female_count INTEGER NOT NULL,
              gesture TEXT,
              confidence REAL
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);
            "#,
        )?;
        Ok(())
    }

}

struct RawAlertRow {
    id: i64,
    alert_type: String,
    created_at: String,
    latitude: f64,
    longitude: f64,
    snapshot_path: Option<String>,
    male_count: i64,
    female_count: i64,
    gesture: Option<String>,
    confidence: Option<f64>,
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAlertRow> {
    Ok(RawAlertRow {
        id: row.get(0)?,
        alert_type: row.get(1)?,
        created_at: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        snapshot_path: row.get(5)?,
        male_count: row.get(6)?,
        female_count: row.get(7)?,
        gesture: row.get(8)?,
        confidence: row.get(9)?,
    })
}

fn into_stored(raw: RawAlertRow) -> Result<StoredAlert> {
    let alert_type = AlertType::parse(&raw.alert_type).ok_or_else(|| {
        anyhow!("corrupt alert row {}: unknown type '{}'", raw.id, raw.alert_type)
    })?;
    let timestamp = DateTime::parse_from_rfc3339(&raw.created_at)
        .map_err(|e| anyhow!("corrupt alert row {}: bad timestamp: {}", raw.id, e))?
        .with_timezone(&Local);
    let gesture = match raw.gesture {
        Some(name) => Some(GestureKind::parse(&name).ok_or_else(|| {
            anyhow!("corrupt alert row {}: unknown gesture '{}'", raw.id, name)
        })?),
        None => None,
    };
    Ok(StoredAlert {
        id: raw.id,
        alert: Alert {
            alert_type,
            timestamp,
            latitude: raw.latitude,
            longitude: raw.longitude,
            snapshot_path: raw.snapshot_path,
            male_count: raw.male_count as u32,
            female_count: raw.female_count as u32,
            gesture,
            confidence: raw.confidence.map(|c| c as f32),
        },
    })
}

impl AlertStore for SqliteAlertStore {
    fn store(&mut self, alert: &Alert) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO alerts(alert_type, created_at, latitude, longitude,
                               snapshot_path, male_count, female_count, gesture, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                alert.alert_type.as_str(),
                alert.timestamp.to_rfc3339(),
                alert.latitude,
                alert.longitude,
                alert.snapshot_path,
                alert.male_count as i64,
                alert.female_count as i64,
                alert.gesture.map(|g| g.as_str()),
                alert.confidence.map(|c| c as f64),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<StoredAlert>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, alert_type, created_at, latitude, longitude, snapshot_path,
                    male_count, female_count, gesture, confidence
             FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(into_stored(read_raw_row(row)?)?);
        }
        Ok(out)
    }

    fn query_by_id(&self, id: i64) -> Result<Option<StoredAlert>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, alert_type, created_at, latitude, longitude, snapshot_path,
                    male_count, female_count, gesture, confidence
             FROM alerts WHERE id = ?1",
        )?;
        let raw = stmt.query_row(params![id], read_raw_row).optional()?;
        match raw {
            Some(raw) => Ok(Some(into_stored(raw)?)),
            None => Ok(None),
        }
    }
}

// -------------------- In-memory (tests) --------------------

#[derive(Default)]
pub struct InMemoryAlertStore {
    alerts: Vec<StoredAlert>,
    next_id: i64,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self {
            alerts: Vec::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl AlertStore for InMemoryAlertStore {
    fn store(&mut self, alert: &Alert) -> Result<i64> {
        let id = self.next_id;
        self.next_id += 1;
        self.alerts.push(StoredAlert {
            id,
            alert: alert.clone(),
        });
        Ok(id)
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<StoredAlert>> {
        let mut out: Vec<StoredAlert> = self.alerts.clone();
        out.sort_by(|a, b| {
            b.alert
                .timestamp
                .cmp(&a.alert.timestamp)
                .then(b.id.cmp(&a.id))
        });
        out.truncate(limit);
        Ok(out)
    }

    fn query_by_id(&self, id: i64) -> Result<Option<StoredAlert>> {
        Ok(self.alerts.iter().find(|a| a.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample_alert(alert_type: AlertType, offset_secs: i64) -> Alert {
        Alert {
            alert_type,
            timestamp: Local::now() + ChronoDuration::seconds(offset_secs),
            latitude: 12.9716,
            longitude: 77.5946,
            snapshot_path: Some("alert_frames/alert_test.jpg".to_string()),
            male_count: 2,
            female_count: 1,
            gesture: None,
            confidence: None,
        }
    }

    #[test]
    fn sqlite_store_round_trips_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("alerts.db");
        let mut store = SqliteAlertStore::open(db.to_str().unwrap()).unwrap();

        let mut alert = sample_alert(AlertType::Distress, 0);
        alert.gesture = Some(GestureKind::ThumbPalm);
        alert.confidence = Some(0.92);
        let id = store.store(&alert).unwrap();

        let loaded = store.query_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.alert.alert_type, AlertType::Distress);
        assert_eq!(loaded.alert.gesture, Some(GestureKind::ThumbPalm));
        assert_eq!(loaded.alert.male_count, 2);
        assert_eq!(loaded.alert.female_count, 1);
        assert_eq!(loaded.alert.confidence, Some(0.92));
        assert_eq!(
            loaded.alert.timestamp.timestamp(),
            alert.timestamp.timestamp()
        );
    }

    #[test]
    fn sqlite_query_recent_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("alerts.db");
        let mut store = SqliteAlertStore::open(db.to_str().unwrap()).unwrap();

        store.store(&sample_alert(AlertType::LoneWomanNight, -20)).unwrap();
        store.store(&sample_alert(AlertType::WomanSurrounded, -10)).unwrap();
        store.store(&sample_alert(AlertType::Distress, 0)).unwrap();

        let recent = store.query_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].alert.alert_type, AlertType::Distress);
        assert_eq!(recent[1].alert.alert_type, AlertType::WomanSurrounded);
    }

    #[test]
    fn sqlite_stores_missing_snapshot_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("alerts.db");
        let mut store = SqliteAlertStore::open(db.to_str().unwrap()).unwrap();

        let mut alert = sample_alert(AlertType::WomanSurroundedSpatial, 0);
        alert.snapshot_path = None;
        let id = store.store(&alert).unwrap();
        let loaded = store.query_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.alert.snapshot_path, None);
    }

    #[test]
    fn query_by_unknown_id_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("alerts.db");
        let store = SqliteAlertStore::open(db.to_str().unwrap()).unwrap();
        assert!(store.query_by_id(999).unwrap().is_none());
    }

    #[test]
    fn in_memory_store_matches_sqlite_ordering() {
        let mut store = InMemoryAlertStore::new();
        store.store(&sample_alert(AlertType::LoneWomanNight, -20)).unwrap();
        store.store(&sample_alert(AlertType::Distress, 0)).unwrap();
        let recent = store.query_recent(5).unwrap();
        assert_eq!(recent[0].alert.alert_type, AlertType::Distress);
        assert_eq!(store.len(), 2);
    }
}
