//! Geometric distress-gesture rules.
//!
//! A gesture is read off a single hand's landmark geometry against the
//! configured thresholds. Rules are evaluated in a fixed precedence order and
//! the first match wins; later rules are not evaluated once one matches.
//!
//! The caller applies these rules ONLY to hands whose RAW handedness label is
//! "Right", i.e. the subject's actual left hand after mirror correction. That
//! asymmetry is deliberate policy (the signal vocabulary is defined for the
//! left hand), not a bug.

use crate::config::GestureThresholds;
use crate::{
    GestureKind, HAND_LANDMARK_COUNT, LANDMARK_INDEX_TIP, LANDMARK_PINKY_TIP, LANDMARK_THUMB_TIP,
    LANDMARK_WRIST,
};

/// Euclidean distance between two normalized landmark positions.
fn dist(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Classify one hand's landmarks as a distress gesture, or none.
///
/// Precedence: thumb-to-palm, then wave, then thumb-folded.
pub fn classify_gesture(
    landmarks: &[(f32, f32); HAND_LANDMARK_COUNT],
    thresholds: &GestureThresholds,
) -> Option<GestureKind> {
    let wrist = landmarks[LANDMARK_WRIST];
    let thumb_tip = landmarks[LANDMARK_THUMB_TIP];
    let index_tip = landmarks[LANDMARK_INDEX_TIP];
    let pinky_tip = landmarks[LANDMARK_PINKY_TIP];

    // 1. Thumb touching palm (closed fist).
    if dist(thumb_tip, wrist) < thresholds.thumb_palm {
        return Some(GestureKind::ThumbPalm);
    }

    // 2. Waving gesture (fingers spread).
    if dist(index_tip, pinky_tip) > thresholds.wave {
        return Some(GestureKind::Wave);
    }

    // 3. Thumb folded across the palm.
    if thumb_tip.0 < wrist.0 && (thumb_tip.1 - wrist.1).abs() < thresholds.thumb_folded {
        return Some(GestureKind::ThumbFolded);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::neutral_landmarks;

    fn thresholds() -> GestureThresholds {
        GestureThresholds::default()
    }

    #[test]
    fn neutral_hand_is_no_gesture() {
        assert_eq!(classify_gesture(&neutral_landmarks(), &thresholds()), None);
    }

    #[test]
    fn thumb_near_wrist_is_thumb_palm() {
        let mut lm = neutral_landmarks();
        let wrist = lm[LANDMARK_WRIST];
        lm[LANDMARK_THUMB_TIP] = (wrist.0 + 0.02, wrist.1 - 0.03);
        assert_eq!(
            classify_gesture(&lm, &thresholds()),
            Some(GestureKind::ThumbPalm)
        );
    }

    #[test]
    fn spread_fingers_are_wave() {
        let mut lm = neutral_landmarks();
        lm[LANDMARK_INDEX_TIP] = (0.3, 0.4);
        lm[LANDMARK_PINKY_TIP] = (0.75, 0.45);
        assert_eq!(classify_gesture(&lm, &thresholds()), Some(GestureKind::Wave));
    }

    #[test]
    fn thumb_left_of_wrist_at_same_height_is_thumb_folded() {
        let mut lm = neutral_landmarks();
        let wrist = lm[LANDMARK_WRIST];
        // Left of the wrist, nearly level with it, but not close enough for
        // the thumb-palm rule.
        lm[LANDMARK_THUMB_TIP] = (wrist.0 - 0.2, wrist.1 + 0.05);
        assert_eq!(
            classify_gesture(&lm, &thresholds()),
            Some(GestureKind::ThumbFolded)
        );
    }

    #[test]
    fn thumb_palm_takes_precedence_over_wave() {
        let mut lm = neutral_landmarks();
        let wrist = lm[LANDMARK_WRIST];
        lm[LANDMARK_THUMB_TIP] = (wrist.0, wrist.1 - 0.04);
        lm[LANDMARK_INDEX_TIP] = (0.2, 0.4);
        lm[LANDMARK_PINKY_TIP] = (0.8, 0.4);
        assert_eq!(
            classify_gesture(&lm, &thresholds()),
            Some(GestureKind::ThumbPalm)
        );
    }

    #[test]
    fn custom_threshold_widens_thumb_palm_match() {
        let mut lm = neutral_landmarks();
        let wrist = lm[LANDMARK_WRIST];
        lm[LANDMARK_THUMB_TIP] = (wrist.0 + 0.04, wrist.1 - 0.05);
        let loose = GestureThresholds {
            thumb_palm: 0.2,
            ..GestureThresholds::default()
        };
        assert_eq!(classify_gesture(&lm, &loose), Some(GestureKind::ThumbPalm));
        // Same geometry under a tight threshold does not match thumb-palm.
        let tight = GestureThresholds {
            thumb_palm: 0.02,
            ..GestureThresholds::default()
        };
        assert_ne!(classify_gesture(&lm, &tight), Some(GestureKind::ThumbPalm));
    }
}
