//! Scripted backends for tests and stub deployments.
//!
//! Each backend holds a queue of per-frame results. A call pops the next
//! scripted frame; an empty queue yields no detections. This keeps detector
//! tests deterministic without model artifacts.

use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::{FaceGenderBackend, HandBackend};
use crate::{FaceDetection, HandObservation, Handedness, HAND_LANDMARK_COUNT};

/// Landmark layout of an open, resting hand that matches no gesture rule
/// under the default thresholds. Test scripts mutate individual landmarks
/// from this base.
pub fn neutral_landmarks() -> [(f32, f32); HAND_LANDMARK_COUNT] {
    let mut landmarks = [(0.5_f32, 0.7_f32); HAND_LANDMARK_COUNT];
    landmarks[crate::LANDMARK_WRIST] = (0.5, 0.9);
    landmarks[crate::LANDMARK_THUMB_TIP] = (0.62, 0.65);
    landmarks[crate::LANDMARK_INDEX_TIP] = (0.55, 0.5);
    landmarks[crate::LANDMARK_PINKY_TIP] = (0.68, 0.55);
    landmarks
}

/// Scripted face/gender backend.
#[derive(Default)]
pub struct StubFaceBackend {
    script: VecDeque<Vec<FaceDetection>>,
}

impl StubFaceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the detections to report for the next frame.
    pub fn push_frame(&mut self, faces: Vec<FaceDetection>) {
        self.script.push_back(faces);
    }
}

impl FaceGenderBackend for StubFaceBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect_faces(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<FaceDetection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

/// Scripted hand-landmark backend.
#[derive(Default)]
pub struct StubHandBackend {
    script: VecDeque<Vec<HandObservation>>,
}

impl StubHandBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the observations to report for the next frame.
    pub fn push_frame(&mut self, hands: Vec<HandObservation>) {
        self.script.push_back(hands);
    }

    /// A neutral-pose observation, convenient base for test scripts.
    pub fn observation(raw_handedness: Handedness, score: f32) -> HandObservation {
        HandObservation {
            landmarks: neutral_landmarks(),
            raw_handedness,
            score,
        }
    }
}

impl HandBackend for StubHandBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect_hands(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<HandObservation>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gender;

    #[test]
    fn face_script_pops_in_order_then_empties() {
        let mut backend = StubFaceBackend::new();
        backend.push_frame(vec![FaceDetection {
            x: 10,
            y: 10,
            w: 40,
            h: 40,
            gender: Gender::Female,
            confidence: 0.9,
        }]);
        let first = backend.detect_faces(&[], 640, 480).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].gender, Gender::Female);
        assert!(backend.detect_faces(&[], 640, 480).unwrap().is_empty());
    }

    #[test]
    fn hand_script_reports_raw_handedness() {
        let mut backend = StubHandBackend::new();
        backend.push_frame(vec![StubHandBackend::observation(Handedness::Right, 0.8)]);
        let hands = backend.detect_hands(&[], 640, 480).unwrap();
        assert_eq!(hands[0].raw_handedness, Handedness::Right);
        assert_eq!(hands[0].actual_handedness(), Handedness::Left);
    }
}
