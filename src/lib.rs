//! safewatch - real-time video safety monitoring
//!
//! The pipeline processes one frame at a time:
//!
//! 1. Face detection + gender classification (counts, boxes)
//! 2. Hand landmark detection + gesture classification
//! 3. Overlay annotation on the shared frame buffer
//! 4. Alert decision (cooldown gate, rule precedence, night window)
//! 5. Alert creation (snapshot, coarse geolocation, persistence)
//!
//! # Module Structure
//!
//! - `frame`: RGB raster frames and JPEG encoding
//! - `ingest`: frame sources (synthetic stub, HTTP MJPEG)
//! - `detect`: detection backends and gesture geometry
//! - `detector`: the stateful orchestrator (`SafetyDetector`)
//! - `alert`: alert factory (snapshot + geolocation + persistence handoff)
//! - `storage`: append-only alert stores (SQLite, in-memory)
//! - `api`: read-only status/alerts HTTP endpoint

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub mod alert;
pub mod annotate;
pub mod api;
pub mod config;
pub mod detect;
pub mod detector;
pub mod frame;
pub mod geo;
pub mod ingest;
pub mod storage;

pub use alert::AlertFactory;
pub use config::{DetectionConfig, GestureThresholds, SafewatchConfig};
pub use detect::{FaceGenderBackend, HandBackend, StubFaceBackend, StubHandBackend};
#[cfg(feature = "backend-tract")]
pub use detect::{TractFaceBackend, TractHandBackend};
pub use detector::{DetectorStatus, SafetyDetector};
pub use frame::Frame;
pub use geo::{Geolocator, IpGeolocator, StaticGeolocator};
pub use ingest::{CameraSource, SourceConfig};
pub use storage::{AlertStore, InMemoryAlertStore, SqliteAlertStore, StoredAlert};

// -------------------- Gender --------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Display label drawn next to face boxes.
    pub fn display_label(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
        }
    }
}

/// Per-frame gender tally. Overwritten every frame, never accumulated.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenderCounts {
    pub male: u32,
    pub female: u32,
}

/// One detected face with its classified gender.
///
/// Box coordinates are pixel units in the source frame, x/y at top-left.
/// Recomputed every frame; the current frame's set is the only retained state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FaceDetection {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub gender: Gender,
    pub confidence: f32,
}

// -------------------- Hands --------------------

/// MediaPipe-style hand landmark indices (21 points per hand).
pub const LANDMARK_WRIST: usize = 0;
pub const LANDMARK_THUMB_TIP: usize = 4;
pub const LANDMARK_INDEX_TIP: usize = 8;
pub const LANDMARK_PINKY_TIP: usize = 20;
pub const HAND_LANDMARK_COUNT: usize = 21;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Camera mirror correction.
    ///
    /// A front-facing camera presents a mirrored view, so the raw classifier
    /// label names the opposite of the subject's anatomical hand: raw "Left"
    /// is the subject's right hand and vice versa.
    pub fn mirrored(&self) -> Handedness {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

/// One detected hand: 21 landmark positions in normalized image coordinates
/// (0..1 on both axes), the raw handedness label as produced by the
/// classifier (NOT mirror-corrected), and its classification score.
#[derive(Clone, Debug)]
pub struct HandObservation {
    pub landmarks: [(f32, f32); HAND_LANDMARK_COUNT],
    pub raw_handedness: Handedness,
    pub score: f32,
}

impl HandObservation {
    /// The subject's actual hand side after mirror correction.
    pub fn actual_handedness(&self) -> Handedness {
        self.raw_handedness.mirrored()
    }

    pub fn wrist(&self) -> (f32, f32) {
        self.landmarks[LANDMARK_WRIST]
    }
}

// -------------------- Gestures --------------------

/// Fixed distress-gesture vocabulary.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    ThumbPalm,
    Wave,
    ThumbFolded,
}

impl GestureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureKind::ThumbPalm => "thumb_palm",
            GestureKind::Wave => "wave",
            GestureKind::ThumbFolded => "thumb_folded",
        }
    }

    pub fn parse(s: &str) -> Option<GestureKind> {
        match s {
            "thumb_palm" => Some(GestureKind::ThumbPalm),
            "wave" => Some(GestureKind::Wave),
            "thumb_folded" => Some(GestureKind::ThumbFolded),
            _ => None,
        }
    }
}

/// Latest frame's gesture findings. Overwritten every frame regardless of
/// whether an alert fires; read by the status API.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GestureState {
    pub detected: bool,
    #[serde(rename = "type")]
    pub kind: Option<GestureKind>,
    /// Maximum handedness-classification score across all detected hands,
    /// independent of which hand (if any) produced a gesture.
    pub confidence: f32,
    pub hands_count: u32,
}

// -------------------- Alerts --------------------

/// Alert taxonomy. Closed set; stored by snake_case name.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Distress,
    LoneWomanNight,
    WomanSurrounded,
    WomanSurroundedSpatial,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Distress => "distress",
            AlertType::LoneWomanNight => "lone_woman_night",
            AlertType::WomanSurrounded => "woman_surrounded",
            AlertType::WomanSurroundedSpatial => "woman_surrounded_spatial",
        }
    }

    pub fn parse(s: &str) -> Option<AlertType> {
        match s {
            "distress" => Some(AlertType::Distress),
            "lone_woman_night" => Some(AlertType::LoneWomanNight),
            "woman_surrounded" => Some(AlertType::WomanSurrounded),
            "woman_surrounded_spatial" => Some(AlertType::WomanSurroundedSpatial),
            _ => None,
        }
    }
}

/// An alert record. Immutable once created; owned by the persistence layer
/// after `AlertStore::store`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    /// Local civil time with zone offset.
    pub timestamp: DateTime<Local>,
    /// Best-effort coarse location; (0.0, 0.0) when lookup failed.
    pub latitude: f64,
    pub longitude: f64,
    /// Path of the saved annotated snapshot. `None` when the snapshot write
    /// failed; the alert is still recorded.
    pub snapshot_path: Option<String>,
    pub male_count: u32,
    pub female_count: u32,
    pub gesture: Option<GestureKind>,
    pub confidence: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handedness_mirror_inverts_both_ways() {
        assert_eq!(Handedness::Left.mirrored(), Handedness::Right);
        assert_eq!(Handedness::Right.mirrored(), Handedness::Left);
    }

    #[test]
    fn alert_type_names_round_trip() {
        for ty in [
            AlertType::Distress,
            AlertType::LoneWomanNight,
            AlertType::WomanSurrounded,
            AlertType::WomanSurroundedSpatial,
        ] {
            assert_eq!(AlertType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(AlertType::parse("unknown"), None);
    }

    #[test]
    fn gesture_kind_names_round_trip() {
        for kind in [GestureKind::ThumbPalm, GestureKind::Wave, GestureKind::ThumbFolded] {
            assert_eq!(GestureKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn gesture_state_serializes_type_field() {
        let state = GestureState {
            detected: true,
            kind: Some(GestureKind::Wave),
            confidence: 0.9,
            hands_count: 1,
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["type"], "wave");
        assert_eq!(json["hands_count"], 1);
    }
}
