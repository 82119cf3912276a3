//! Alert creation.
//!
//! The factory turns a triggering frame plus orchestrator state into one
//! immutable `Alert`: it saves an annotated snapshot, resolves a coarse
//! location, hands the record to the persistence store and keeps a bounded
//! in-process buffer of recent alerts for cheap status queries.
//!
//! Snapshot and geolocation are synchronous, blocking calls. The cooldown
//! already bounds how often this path runs; moving the I/O onto a queued
//! worker lane is the follow-up for deployments where a slow lookup must
//! never stall capture.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;

use crate::frame::Frame;
use crate::geo::Geolocator;
use crate::storage::AlertStore;
use crate::{Alert, AlertType, GenderCounts, GestureKind};

/// Upper bound on the in-process recent-alerts buffer.
const RECENT_BUFFER_CAP: usize = 256;

pub struct AlertFactory {
    snapshot_dir: PathBuf,
    geolocator: Box<dyn Geolocator>,
    store: Box<dyn AlertStore>,
    recent: VecDeque<Alert>,
}

impl AlertFactory {
    pub fn new<P: AsRef<Path>>(
        snapshot_dir: P,
        geolocator: Box<dyn Geolocator>,
        store: Box<dyn AlertStore>,
    ) -> Self {
        Self {
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
            geolocator,
            store,
            recent: VecDeque::new(),
        }
    }

    /// Create, persist and return one alert.
    ///
    /// The snapshot write is recoverable: on failure the alert is still
    /// recorded, with `snapshot_path` left empty. Geolocation failure never
    /// surfaces at all; it degrades to (0.0, 0.0) inside the provider.
    pub fn create_alert(
        &mut self,
        frame: &Frame,
        alert_type: AlertType,
        gesture: Option<GestureKind>,
        counts: GenderCounts,
        confidence: Option<f32>,
    ) -> Result<Alert> {
        let timestamp = Local::now();
        let snapshot_path = match self.save_snapshot(frame) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("snapshot write failed, recording alert without image: {e:#}");
                None
            }
        };
        let (latitude, longitude) = self.geolocator.locate();

        let alert = Alert {
            alert_type,
            timestamp,
            latitude,
            longitude,
            snapshot_path,
            male_count: counts.male,
            female_count: counts.female,
            gesture,
            confidence,
        };

        let id = self.store.store(&alert)?;
        log::info!(
            "alert #{} type={} males={} females={} gesture={:?} snapshot={}",
            id,
            alert.alert_type.as_str(),
            alert.male_count,
            alert.female_count,
            alert.gesture.map(|g| g.as_str()),
            alert.snapshot_path.as_deref().unwrap_or("<none>")
        );

        if self.recent.len() == RECENT_BUFFER_CAP {
            self.recent.pop_front();
        }
        self.recent.push_back(alert.clone());
        Ok(alert)
    }

    fn save_snapshot(&self, frame: &Frame) -> Result<String> {
        std::fs::create_dir_all(&self.snapshot_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let path = self.snapshot_dir.join(format!("alert_{stamp}.jpg"));
        frame.save_jpeg(&path)?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Most recent alerts first, from the in-process buffer.
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    pub fn store(&self) -> &dyn AlertStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::StaticGeolocator;
    use crate::storage::InMemoryAlertStore;

    fn factory_with_dir(dir: &Path) -> AlertFactory {
        AlertFactory::new(
            dir,
            Box::new(StaticGeolocator::new(48.85, 2.35)),
            Box::new(InMemoryAlertStore::new()),
        )
    }

    #[test]
    fn alert_carries_state_and_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let mut factory = factory_with_dir(&tmp.path().join("frames"));
        let frame = Frame::new(32, 32);
        let alert = factory
            .create_alert(
                &frame,
                AlertType::Distress,
                Some(GestureKind::Wave),
                GenderCounts { male: 0, female: 1 },
                Some(0.88),
            )
            .unwrap();
        assert_eq!(alert.alert_type, AlertType::Distress);
        assert_eq!(alert.gesture, Some(GestureKind::Wave));
        assert_eq!((alert.latitude, alert.longitude), (48.85, 2.35));
        let path = alert.snapshot_path.expect("snapshot saved");
        assert!(std::path::Path::new(&path).exists());
        assert_eq!(factory.store().query_recent(5).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_failure_still_records_alert() {
        let tmp = tempfile::tempdir().unwrap();
        // A plain file where the snapshot directory should be.
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"occupied").unwrap();

        let mut factory = factory_with_dir(&blocker);
        let alert = factory
            .create_alert(
                &Frame::new(16, 16),
                AlertType::LoneWomanNight,
                None,
                GenderCounts { male: 0, female: 1 },
                None,
            )
            .unwrap();
        assert_eq!(alert.snapshot_path, None);
        assert_eq!(factory.store().query_recent(5).unwrap().len(), 1);
    }

    #[test]
    fn recent_buffer_returns_newest_first_up_to_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut factory = factory_with_dir(&tmp.path().join("frames"));
        let frame = Frame::new(8, 8);
        for ty in [
            AlertType::LoneWomanNight,
            AlertType::WomanSurrounded,
            AlertType::Distress,
        ] {
            factory
                .create_alert(&frame, ty, None, GenderCounts::default(), None)
                .unwrap();
        }
        let recent = factory.recent_alerts(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].alert_type, AlertType::Distress);
        assert_eq!(recent[1].alert_type, AlertType::WomanSurrounded);
    }
}
