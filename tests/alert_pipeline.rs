use std::time::Instant;

use safewatch::geo::StaticGeolocator;
use safewatch::storage::{AlertStore, SqliteAlertStore};
use safewatch::{
    AlertFactory, AlertType, DetectionConfig, FaceDetection, Frame, Gender, SafetyDetector,
    StubFaceBackend, StubHandBackend,
};

#[test]
fn fired_alert_is_durable_and_snapshot_is_jpeg() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("alerts.db");
    let snapshot_dir = tmp.path().join("frames");

    let store = SqliteAlertStore::open(db_path.to_str().unwrap()).unwrap();
    let factory = AlertFactory::new(
        &snapshot_dir,
        Box::new(StaticGeolocator::new(12.9716, 77.5946)),
        Box::new(store),
    );
    let mut faces = StubFaceBackend::new();
    faces.push_frame(vec![FaceDetection {
        x: 100,
        y: 100,
        w: 40,
        h: 40,
        gender: Gender::Female,
        confidence: 0.9,
    }]);
    let mut detector = SafetyDetector::new(
        DetectionConfig::default(),
        Box::new(faces),
        Box::new(StubHandBackend::new()),
        factory,
    )
    .unwrap();

    let mut frame = Frame::new(320, 240);
    let alert = detector
        .process_frame_at(&mut frame, Instant::now(), 23)
        .unwrap()
        .expect("alert fires");
    assert_eq!(alert.alert_type, AlertType::LoneWomanNight);

    let snapshot_path = alert.snapshot_path.as_deref().expect("snapshot saved");
    let bytes = std::fs::read(snapshot_path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "snapshot starts with JPEG SOI");

    // Readers open their own connection to the same database.
    let reader = SqliteAlertStore::open(db_path.to_str().unwrap()).unwrap();
    let stored = reader.query_recent(10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].alert.alert_type, AlertType::LoneWomanNight);
    assert_eq!(stored[0].alert.female_count, 1);
    assert_eq!(stored[0].alert.latitude, 12.9716);
    assert_eq!(stored[0].alert.snapshot_path.as_deref(), Some(snapshot_path));

    let by_id = reader.query_by_id(stored[0].id).unwrap().unwrap();
    assert_eq!(by_id.alert.alert_type, AlertType::LoneWomanNight);
}

#[test]
fn stored_alert_serializes_flat_json() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("alerts.db");
    let mut store = SqliteAlertStore::open(db_path.to_str().unwrap()).unwrap();

    store
        .store(&safewatch::Alert {
            alert_type: AlertType::Distress,
            timestamp: chrono::Local::now(),
            latitude: 0.0,
            longitude: 0.0,
            snapshot_path: None,
            male_count: 2,
            female_count: 1,
            gesture: Some(safewatch::GestureKind::ThumbPalm),
            confidence: Some(0.7),
        })
        .unwrap();

    let stored = store.query_recent(1).unwrap();
    let json = serde_json::to_value(&stored[0]).unwrap();
    // Alert fields sit next to the id, not nested under an "alert" key.
    assert!(json["id"].as_i64().is_some());
    assert_eq!(json["alert_type"], "distress");
    assert_eq!(json["gesture"], "thumb_palm");
    assert_eq!(json["male_count"], 2);
}
