//! Detection backends and gesture geometry.
//!
//! Backends are black-box scorers over pretrained models: they take raw RGB
//! pixels and return detections, and hold no state across frames beyond what
//! inference requires. All temporal/decision logic lives in the orchestrator.

mod backend;
mod backends;
pub mod gesture;

pub use backend::{
    FaceGenderBackend, HandBackend, MAX_HANDS, MIN_HAND_DETECTION_CONFIDENCE,
    MIN_HAND_TRACKING_CONFIDENCE,
};
pub use backends::{neutral_landmarks, StubFaceBackend, StubHandBackend};

#[cfg(feature = "backend-tract")]
pub use backends::{TractFaceBackend, TractHandBackend};
