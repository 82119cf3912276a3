//! The stateful detection orchestrator.
//!
//! `SafetyDetector` runs the full per-frame sequence: face/gender pass,
//! hand/gesture pass, annotation, cooldown gate, rule evaluation and alert
//! creation. All mutable pipeline state lives here and is owned by the single
//! processing thread; external readers get synchronized snapshots through
//! [`SafetyDetector::status`].

use std::time::Instant;

use anyhow::Result;
use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};

use crate::alert::AlertFactory;
use crate::annotate;
use crate::config::DetectionConfig;
use crate::detect::gesture::classify_gesture;
use crate::detect::{FaceGenderBackend, HandBackend};
use crate::frame::Frame;
use crate::{
    Alert, AlertType, FaceDetection, Gender, GenderCounts, GestureKind, GestureState, Handedness,
};

/// Proximity radius of the spatial surround check, in source pixels on each
/// axis independently. Resolution-dependent: the same scene reads as closer
/// at higher capture resolutions.
const SURROUND_RADIUS_PX: u32 = 100;

/// Whether `hour` (0-23) falls in the night window. The window wraps
/// midnight when `start > end`, e.g. 20 -> 6 covers 20..24 and 0..6. The end
/// hour is exclusive.
pub fn is_night_hour(hour: u32, start: u32, end: u32) -> bool {
    if start > end {
        hour >= start || hour < end
    } else {
        hour >= start && hour < end
    }
}

/// Serializable snapshot of the orchestrator state, published to the API
/// thread through an `Arc<Mutex<DetectorStatus>>`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectorStatus {
    pub counts: GenderCounts,
    pub gesture: GestureState,
    pub faces: Vec<FaceDetection>,
    pub frames_processed: u64,
    pub alerts_fired: u64,
}

pub struct SafetyDetector {
    config: DetectionConfig,
    face_backend: Box<dyn FaceGenderBackend>,
    hand_backend: Box<dyn HandBackend>,
    factory: AlertFactory,
    last_alert_time: Option<Instant>,
    current_counts: GenderCounts,
    person_boxes: Vec<FaceDetection>,
    current_gesture: GestureState,
    frames_processed: u64,
    alerts_fired: u64,
}

impl SafetyDetector {
    pub fn new(
        config: DetectionConfig,
        face_backend: Box<dyn FaceGenderBackend>,
        hand_backend: Box<dyn HandBackend>,
        factory: AlertFactory,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            face_backend,
            hand_backend,
            factory,
            last_alert_time: None,
            current_counts: GenderCounts::default(),
            person_boxes: Vec::new(),
            current_gesture: GestureState::default(),
            frames_processed: 0,
            alerts_fired: 0,
        })
    }

    /// Face/gender pass. Overwrites the current counts and boxes (never
    /// accumulates across frames) and draws a labeled box per kept face.
    /// Detections under the configured confidence threshold are dropped.
    pub fn detect_genders(&mut self, frame: &mut Frame) -> Result<()> {
        let faces =
            self.face_backend
                .detect_faces(frame.as_raw(), frame.width(), frame.height())?;
        self.person_boxes.clear();
        let mut counts = GenderCounts::default();
        for face in faces {
            if face.confidence < self.config.confidence_threshold {
                continue;
            }
            match face.gender {
                Gender::Male => counts.male += 1,
                Gender::Female => counts.female += 1,
            }
            annotate::draw_face(frame, &face);
            self.person_boxes.push(face);
        }
        self.current_counts = counts;
        Ok(())
    }

    /// Hand/gesture pass. Skipped entirely (state reset to empty) when
    /// gestures are disabled in the configuration.
    ///
    /// Handedness labels arrive raw from the backend and are drawn
    /// mirror-corrected, but gesture rules only run against hands whose RAW
    /// label is Right (the subject's actual left hand). The asymmetry is the
    /// documented signal policy, not an oversight. First match across hands
    /// wins; the state confidence is the maximum handedness score over all
    /// detected hands regardless of which one gestured.
    pub fn detect_gestures(&mut self, frame: &mut Frame) -> Result<Option<GestureKind>> {
        if !self.config.gesture_enabled {
            self.current_gesture = GestureState::default();
            return Ok(None);
        }
        let hands =
            self.hand_backend
                .detect_hands(frame.as_raw(), frame.width(), frame.height())?;
        let mut state = GestureState {
            hands_count: hands.len() as u32,
            ..GestureState::default()
        };
        for hand in &hands {
            annotate::draw_hand(frame, hand);
            state.confidence = state.confidence.max(hand.score);
            // When several raw-Right hands gesture in one frame, the first
            // match is kept; later hands never replace it.
            if state.kind.is_none() && hand.raw_handedness == Handedness::Right {
                if let Some(kind) =
                    classify_gesture(&hand.landmarks, &self.config.gesture_thresholds)
                {
                    state.detected = true;
                    state.kind = Some(kind);
                    annotate::draw_gesture_banner(frame, hand, kind);
                }
            }
        }
        self.current_gesture = state;
        Ok(state.kind)
    }

    /// Full per-frame sequence against the wall clock.
    pub fn process_frame(&mut self, frame: &mut Frame) -> Result<Option<Alert>> {
        self.process_frame_at(frame, Instant::now(), Local::now().hour())
    }

    /// Clock-injected variant of [`process_frame`](Self::process_frame);
    /// `now` feeds the cooldown gate and `local_hour` the night window.
    ///
    /// Exactly one alert or none per call. The cooldown gate runs after the
    /// detection passes (so counts and gesture state stay current during
    /// cooldown) but before rule evaluation, suppressing every category
    /// uniformly. A fired alert of any category resets the clock for all.
    pub fn process_frame_at(
        &mut self,
        frame: &mut Frame,
        now: Instant,
        local_hour: u32,
    ) -> Result<Option<Alert>> {
        self.detect_genders(frame)?;
        let gesture = self.detect_gestures(frame)?;
        self.frames_processed += 1;

        if let Some(last) = self.last_alert_time {
            if now.duration_since(last) <= self.config.alert_cooldown {
                return Ok(None);
            }
        }

        let counts = self.current_counts;
        let night = is_night_hour(
            local_hour,
            self.config.night_start_hour,
            self.config.night_end_hour,
        );
        let alert_type = if gesture.is_some() {
            Some(AlertType::Distress)
        } else if night && counts.female == 1 && counts.male == 0 {
            Some(AlertType::LoneWomanNight)
        } else if night && counts.female == 1 && counts.male >= 2 {
            Some(AlertType::WomanSurrounded)
        } else if night && counts.female == 1 && counts.male >= 1 && self.spatially_surrounded() {
            Some(AlertType::WomanSurroundedSpatial)
        } else {
            None
        };
        let Some(alert_type) = alert_type else {
            return Ok(None);
        };

        let confidence = match alert_type {
            AlertType::Distress => Some(self.current_gesture.confidence),
            _ => None,
        };
        let alert = self
            .factory
            .create_alert(frame, alert_type, gesture, counts, confidence)?;
        self.last_alert_time = Some(now);
        self.alerts_fired += 1;
        Ok(Some(alert))
    }

    /// Whether the first female box in detection order has any male box with
    /// its top-left corner within [`SURROUND_RADIUS_PX`] on both axes.
    ///
    /// "First in detection order" is inherited behavior; there is no
    /// canonical ordering (leftmost, largest) imposed on top of it.
    fn spatially_surrounded(&self) -> bool {
        let Some(woman) = self
            .person_boxes
            .iter()
            .find(|face| face.gender == Gender::Female)
        else {
            return false;
        };
        self.person_boxes
            .iter()
            .filter(|face| face.gender == Gender::Male)
            .any(|man| {
                man.x.abs_diff(woman.x) < SURROUND_RADIUS_PX
                    && man.y.abs_diff(woman.y) < SURROUND_RADIUS_PX
            })
    }

    pub fn current_counts(&self) -> GenderCounts {
        self.current_counts
    }

    pub fn current_gesture(&self) -> GestureState {
        self.current_gesture
    }

    pub fn person_boxes(&self) -> &[FaceDetection] {
        &self.person_boxes
    }

    pub fn factory(&self) -> &AlertFactory {
        &self.factory
    }

    pub fn status(&self) -> DetectorStatus {
        DetectorStatus {
            counts: self.current_counts,
            gesture: self.current_gesture,
            faces: self.person_boxes.clone(),
            frames_processed: self.frames_processed,
            alerts_fired: self.alerts_fired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{StubFaceBackend, StubHandBackend};
    use crate::geo::StaticGeolocator;
    use crate::storage::InMemoryAlertStore;

    fn face(x: u32, y: u32, gender: Gender) -> FaceDetection {
        FaceDetection {
            x,
            y,
            w: 40,
            h: 40,
            gender,
            confidence: 0.9,
        }
    }

    fn detector_with(
        config: DetectionConfig,
        faces: StubFaceBackend,
        hands: StubHandBackend,
        snapshot_dir: &std::path::Path,
    ) -> SafetyDetector {
        let factory = AlertFactory::new(
            snapshot_dir,
            Box::new(StaticGeolocator::new(0.0, 0.0)),
            Box::new(InMemoryAlertStore::new()),
        );
        SafetyDetector::new(config, Box::new(faces), Box::new(hands), factory).unwrap()
    }

    #[test]
    fn night_window_wraps_midnight() {
        for hour in [20, 21, 23, 0, 3, 5] {
            assert!(is_night_hour(hour, 20, 6), "hour {hour} should be night");
        }
        for hour in [6, 12, 19] {
            assert!(!is_night_hour(hour, 20, 6), "hour {hour} should be day");
        }
    }

    #[test]
    fn night_window_without_wraparound() {
        assert!(is_night_hour(2, 1, 5));
        assert!(!is_night_hour(5, 1, 5));
        assert!(!is_night_hour(0, 1, 5));
    }

    #[test]
    fn low_confidence_faces_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut faces = StubFaceBackend::new();
        faces.push_frame(vec![
            face(10, 10, Gender::Female),
            FaceDetection {
                confidence: 0.2,
                ..face(200, 10, Gender::Male)
            },
        ]);
        let mut detector = detector_with(
            DetectionConfig::default(),
            faces,
            StubHandBackend::new(),
            tmp.path(),
        );
        let mut frame = Frame::new(640, 480);
        detector.detect_genders(&mut frame).unwrap();
        assert_eq!(detector.current_counts(), GenderCounts { male: 0, female: 1 });
        assert_eq!(detector.person_boxes().len(), 1);
    }

    #[test]
    fn zero_faces_yield_zero_counts_and_no_count_alert() {
        let tmp = tempfile::tempdir().unwrap();
        let mut detector = detector_with(
            DetectionConfig::default(),
            StubFaceBackend::new(),
            StubHandBackend::new(),
            tmp.path(),
        );
        let mut frame = Frame::new(64, 64);
        // Night hour, empty scene.
        let alert = detector
            .process_frame_at(&mut frame, Instant::now(), 23)
            .unwrap();
        assert!(alert.is_none());
        assert_eq!(detector.current_counts(), GenderCounts::default());
    }

    #[test]
    fn spatial_check_uses_first_female_and_per_axis_radius() {
        let tmp = tempfile::tempdir().unwrap();
        let mut faces = StubFaceBackend::new();
        // Male at 99px on both axes from the first female: surrounded.
        faces.push_frame(vec![
            face(100, 100, Gender::Female),
            face(199, 199, Gender::Male),
        ]);
        // Male at exactly 100px on one axis: not surrounded.
        faces.push_frame(vec![
            face(100, 100, Gender::Female),
            face(200, 150, Gender::Male),
        ]);
        let mut hands = StubHandBackend::new();
        hands.push_frame(vec![]);
        hands.push_frame(vec![]);
        let mut detector =
            detector_with(DetectionConfig::default(), faces, hands, tmp.path());
        let mut frame = Frame::new(640, 480);
        detector.detect_genders(&mut frame).unwrap();
        assert!(detector.spatially_surrounded());
        detector.detect_genders(&mut frame).unwrap();
        assert!(!detector.spatially_surrounded());
    }

    #[test]
    fn gesture_pass_skipped_when_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let mut hands = StubHandBackend::new();
        let mut waving = StubHandBackend::observation(Handedness::Right, 0.95);
        waving.landmarks[crate::LANDMARK_INDEX_TIP] = (0.1, 0.5);
        waving.landmarks[crate::LANDMARK_PINKY_TIP] = (0.9, 0.5);
        hands.push_frame(vec![waving]);
        let config = DetectionConfig {
            gesture_enabled: false,
            ..DetectionConfig::default()
        };
        let mut detector = detector_with(config, StubFaceBackend::new(), hands, tmp.path());
        let mut frame = Frame::new(64, 64);
        let gesture = detector.detect_gestures(&mut frame).unwrap();
        assert_eq!(gesture, None);
        assert_eq!(detector.current_gesture(), GestureState::default());
    }

    #[test]
    fn gestures_ignored_on_raw_left_hands() {
        let tmp = tempfile::tempdir().unwrap();
        let mut hands = StubHandBackend::new();
        let mut waving = StubHandBackend::observation(Handedness::Left, 0.95);
        waving.landmarks[crate::LANDMARK_INDEX_TIP] = (0.1, 0.5);
        waving.landmarks[crate::LANDMARK_PINKY_TIP] = (0.9, 0.5);
        hands.push_frame(vec![waving]);
        let mut detector = detector_with(
            DetectionConfig::default(),
            StubFaceBackend::new(),
            hands,
            tmp.path(),
        );
        let mut frame = Frame::new(64, 64);
        assert_eq!(detector.detect_gestures(&mut frame).unwrap(), None);
        let state = detector.current_gesture();
        assert!(!state.detected);
        assert_eq!(state.hands_count, 1);
        // Handedness score still tracked for the frame.
        assert_eq!(state.confidence, 0.95);
    }

    #[test]
    fn first_matching_hand_wins_across_hands() {
        let tmp = tempfile::tempdir().unwrap();
        let mut thumb = StubHandBackend::observation(Handedness::Right, 0.8);
        thumb.landmarks[crate::LANDMARK_THUMB_TIP] = (0.52, 0.88);
        let mut wave = StubHandBackend::observation(Handedness::Right, 0.95);
        wave.landmarks[crate::LANDMARK_INDEX_TIP] = (0.1, 0.5);
        wave.landmarks[crate::LANDMARK_PINKY_TIP] = (0.9, 0.5);
        let mut hands = StubHandBackend::new();
        hands.push_frame(vec![thumb, wave]);

        let mut detector = detector_with(
            DetectionConfig::default(),
            StubFaceBackend::new(),
            hands,
            tmp.path(),
        );
        let mut frame = Frame::new(640, 480);
        let gesture = detector.detect_gestures(&mut frame).unwrap();
        assert_eq!(gesture, Some(GestureKind::ThumbPalm));
        let state = detector.current_gesture();
        assert_eq!(state.kind, Some(GestureKind::ThumbPalm));
        assert_eq!(state.hands_count, 2);
        // Confidence still tracks the maximum score over all hands.
        assert_eq!(state.confidence, 0.95);
    }

    #[test]
    fn status_snapshot_reflects_frame_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut faces = StubFaceBackend::new();
        faces.push_frame(vec![face(10, 10, Gender::Male)]);
        let mut detector = detector_with(
            DetectionConfig::default(),
            faces,
            StubHandBackend::new(),
            tmp.path(),
        );
        let mut frame = Frame::new(640, 480);
        detector
            .process_frame_at(&mut frame, Instant::now(), 12)
            .unwrap();
        let status = detector.status();
        assert_eq!(status.counts, GenderCounts { male: 1, female: 0 });
        assert_eq!(status.faces.len(), 1);
        assert_eq!(status.frames_processed, 1);
        assert_eq!(status.alerts_fired, 0);
    }
}
