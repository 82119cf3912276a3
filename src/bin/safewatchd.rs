//! safewatchd - safety monitoring daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured camera source
//! 2. Runs face/gender and hand/gesture detection on each frame
//! 3. Evaluates alert rules (distress gesture, night-context rules)
//! 4. Persists fired alerts with snapshot and coarse location
//! 5. Serves current status and stored alerts over a local HTTP API

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use safewatch::{
    api::{ApiConfig, ApiServer},
    geo::IpGeolocator,
    ingest::SourceConfig,
    AlertFactory, CameraSource, SafetyDetector, SafewatchConfig, SqliteAlertStore,
    StubFaceBackend, StubHandBackend,
};
use safewatch::detect::{FaceGenderBackend, HandBackend};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SafewatchConfig::load()?;
    log::info!(
        "safewatchd v{} starting. db={} source={}",
        env!("CARGO_PKG_VERSION"),
        cfg.db_path,
        cfg.source.url
    );

    let store = SqliteAlertStore::open(&cfg.db_path)?;
    let factory = AlertFactory::new(
        &cfg.snapshot_dir,
        Box::new(IpGeolocator::new()),
        Box::new(store),
    );

    let (mut face_backend, mut hand_backend) = build_backends(&cfg)?;
    face_backend.warm_up()?;
    hand_backend.warm_up()?;
    log::info!(
        "detection backends: faces={} hands={} gestures={}",
        face_backend.name(),
        hand_backend.name(),
        if cfg.detection.gesture_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    let mut detector = SafetyDetector::new(cfg.detection, face_backend, hand_backend, factory)?;

    let status = Arc::new(Mutex::new(detector.status()));
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
            db_path: cfg.db_path.clone(),
        },
        status.clone(),
    )
    .spawn()?;
    log::info!("status api listening on {}", api_handle.addr);

    let mut source = CameraSource::new(SourceConfig {
        url: cfg.source.url.clone(),
        target_fps: cfg.source.target_fps,
        width: cfg.source.width,
        height: cfg.source.height,
    })?;
    source.connect()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })?;

    let frame_interval = if cfg.source.target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((1000 / cfg.source.target_fps).max(1) as u64)
    };
    let mut last_health_log = Instant::now();

    log::info!("safewatchd running");
    while running.load(Ordering::SeqCst) {
        let frame_started = Instant::now();
        // A failed or exhausted source ends the loop; shutdown still runs.
        let mut frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("camera source ended, stopping");
                break;
            }
            Err(err) => {
                log::error!("camera read failed, stopping: {err:#}");
                break;
            }
        };

        if let Some(alert) = detector.process_frame(&mut frame)? {
            log::warn!(
                "ALERT {}: males={} females={} gesture={:?}",
                alert.alert_type.as_str(),
                alert.male_count,
                alert.female_count,
                alert.gesture.map(|g| g.as_str())
            );
        }

        if let Ok(mut guard) = status.lock() {
            *guard = detector.status();
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} url={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.source
            );
            last_health_log = Instant::now();
        }

        let elapsed = frame_started.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }

    log::info!("safewatchd shutting down");
    api_handle.stop()?;
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn build_backends(
    cfg: &SafewatchConfig,
) -> Result<(Box<dyn FaceGenderBackend>, Box<dyn HandBackend>)> {
    use safewatch::{TractFaceBackend, TractHandBackend};

    let models = &cfg.models;
    match (
        models.face_model_path.as_deref(),
        models.gender_model_path.as_deref(),
        models.hand_model_path.as_deref(),
    ) {
        (Some(face), Some(gender), Some(hand)) => {
            let face_backend = TractFaceBackend::new(face, gender)?
                .with_threshold(cfg.detection.confidence_threshold);
            let hand_backend = TractHandBackend::new(hand)?;
            Ok((Box::new(face_backend), Box::new(hand_backend)))
        }
        (None, None, None) => Ok(stub_backends()),
        _ => Err(anyhow::anyhow!(
            "model configuration incomplete: face, gender and hand model paths must all be set"
        )),
    }
}

#[cfg(not(feature = "backend-tract"))]
fn build_backends(
    cfg: &SafewatchConfig,
) -> Result<(Box<dyn FaceGenderBackend>, Box<dyn HandBackend>)> {
    if cfg.models.face_model_path.is_some()
        || cfg.models.gender_model_path.is_some()
        || cfg.models.hand_model_path.is_some()
    {
        log::warn!("model paths configured but the backend-tract feature is disabled; using stub backends");
    }
    Ok(stub_backends())
}

fn stub_backends() -> (Box<dyn FaceGenderBackend>, Box<dyn HandBackend>) {
    (
        Box::new(StubFaceBackend::new()),
        Box::new(StubHandBackend::new()),
    )
}
