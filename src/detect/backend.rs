use anyhow::Result;

use crate::{FaceDetection, HandObservation};

/// Maximum number of simultaneous hands a backend may report.
pub const MAX_HANDS: usize = 2;

/// Minimum detection confidence for a hand to be reported.
pub const MIN_HAND_DETECTION_CONFIDENCE: f32 = 0.7;

/// Minimum tracking confidence for landmark continuity between frames.
/// Backends that do not track across frames ignore this.
pub const MIN_HAND_TRACKING_CONFIDENCE: f32 = 0.5;

/// Face detection + gender classification backend.
///
/// Stateless per call: implementations must treat the pixel slice as
/// read-only and ephemeral, and must not retain detections across calls.
pub trait FaceGenderBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect face regions and classify each as male/female with confidence.
    fn detect_faces(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Hand landmark detection backend.
///
/// Reports up to [`MAX_HANDS`] observations per frame, each with 21
/// normalized landmarks and a RAW (un-mirrored) handedness label. Mirror
/// correction is the orchestrator's concern, not the backend's.
pub trait HandBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect hands and their landmark positions.
    fn detect_hands(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<HandObservation>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
