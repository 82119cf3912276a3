#![cfg(feature = "backend-tract")]

//! Tract-based backends for ONNX inference.
//!
//! These backends load local model files and perform inference on RGB
//! frames. They do no network I/O and no disk writes beyond model loading.
//! Model-load failures are fatal at startup and name the missing artifact.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{FaceGenderBackend, HandBackend, MIN_HAND_DETECTION_CONFIDENCE};
use crate::frame::Frame;
use crate::{FaceDetection, Gender, HandObservation, Handedness, HAND_LANDMARK_COUNT};

/// Face-detector input size (model fixed).
const FACE_INPUT_W: u32 = 320;
const FACE_INPUT_H: u32 = 320;
/// Candidate boxes overlapping at least this much are treated as neighbors.
const NEIGHBOR_IOU: f32 = 0.3;
/// Minimum neighbor votes for a face region to survive grouping.
const MIN_NEIGHBORS: usize = 5;
/// Minimum face size in pixels (either axis).
const MIN_FACE_SIZE: u32 = 30;
/// Raw candidate score floor, applied before neighbor grouping.
const CANDIDATE_SCORE_FLOOR: f32 = 0.5;

/// Gender-classifier input size and per-channel means (B, G, R order, as the
/// classifier was trained on BGR crops).
const GENDER_INPUT: u32 = 227;
const GENDER_MEAN_BGR: [f32; 3] = [78.426_337_760_3, 87.768_914_374_4, 114.895_847_746];

/// Hand-landmark model input size (model fixed).
const HAND_INPUT: u32 = 224;

fn load_model(
    model_path: &Path,
    channels: usize,
    height: u32,
    width: u32,
) -> Result<TypedSimplePlan<TypedModel>> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, channels, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// NCHW f32 tensor from an RGB image, values scaled to 0..1.
fn rgb_tensor(image: &RgbImage) -> Tensor {
    let (width, height) = image.dimensions();
    let input = tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    );
    input.into_tensor()
}

// -------------------- Face + gender --------------------

#[derive(Clone, Copy, Debug)]
struct Candidate {
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Cascade-style neighbor grouping: candidates that mutually overlap are one
/// region; regions with fewer than `min_neighbors` supporters are noise.
/// Surviving regions are averaged, weighted by nothing fancier than count.
fn group_neighbors(mut candidates: Vec<Candidate>, min_neighbors: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut groups: Vec<Vec<Candidate>> = Vec::new();
    for cand in candidates {
        match groups
            .iter_mut()
            .find(|group| iou(&group[0], &cand) >= NEIGHBOR_IOU)
        {
            Some(group) => group.push(cand),
            None => groups.push(vec![cand]),
        }
    }
    groups
        .into_iter()
        .filter(|group| group.len() >= min_neighbors)
        .map(|group| {
            let n = group.len() as f32;
            Candidate {
                score: group.iter().map(|c| c.score).fold(0.0, f32::max),
                x1: group.iter().map(|c| c.x1).sum::<f32>() / n,
                y1: group.iter().map(|c| c.y1).sum::<f32>() / n,
                x2: group.iter().map(|c| c.x2).sum::<f32>() / n,
                y2: group.iter().map(|c| c.y2).sum::<f32>() / n,
            }
        })
        .collect()
}

/// ONNX face detector + binary gender classifier.
///
/// The detector head emits raw multi-scale candidates as rows of
/// `[score, x1, y1, x2, y2]` in coordinates normalized to the input; the
/// classical cascade parameters (scale step 1.1 equivalent, 5-neighbor vote,
/// 30px minimum face) are applied as post-filters here. Each surviving face
/// is cropped, resized to 227x227 and scored by the gender classifier
/// (softmax over {male, female}); argmax is the label, its probability the
/// confidence.
pub struct TractFaceBackend {
    face_model: TypedSimplePlan<TypedModel>,
    gender_model: TypedSimplePlan<TypedModel>,
    confidence_threshold: f32,
}

impl TractFaceBackend {
    /// Load both models from disk and prepare them for inference.
    pub fn new<P: AsRef<Path>>(face_model_path: P, gender_model_path: P) -> Result<Self> {
        let face_model = load_model(face_model_path.as_ref(), 3, FACE_INPUT_H, FACE_INPUT_W)?;
        let gender_model = load_model(gender_model_path.as_ref(), 3, GENDER_INPUT, GENDER_INPUT)?;
        Ok(Self {
            face_model,
            gender_model,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default gender-confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn face_candidates(&mut self, image: &RgbImage) -> Result<Vec<Candidate>> {
        let resized = image::imageops::resize(image, FACE_INPUT_W, FACE_INPUT_H, FilterType::Triangle);
        let outputs = self
            .face_model
            .run(tvec!(rgb_tensor(&resized).into()))
            .context("face detector inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("face detector produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("face detector output tensor was not f32")?;
        let flat: Vec<f32> = view.iter().copied().collect();
        let mut candidates = Vec::new();
        for row in flat.chunks_exact(5) {
            let cand = Candidate {
                score: row[0],
                x1: row[1],
                y1: row[2],
                x2: row[3],
                y2: row[4],
            };
            if cand.score >= CANDIDATE_SCORE_FLOOR && cand.x2 > cand.x1 && cand.y2 > cand.y1 {
                candidates.push(cand);
            }
        }
        Ok(candidates)
    }

    fn classify_face(&mut self, frame: &Frame, face: &FaceRegion) -> Result<(Gender, f32)> {
        let crop = frame.crop(face.x, face.y, face.w, face.h);
        let resized =
            image::imageops::resize(crop.image(), GENDER_INPUT, GENDER_INPUT, FilterType::Triangle);
        // BGR channel order with per-channel mean subtraction, matching the
        // classifier's training pipeline.
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, GENDER_INPUT as usize, GENDER_INPUT as usize),
            |(_, channel, y, x)| {
                let rgb_channel = 2 - channel;
                resized.get_pixel(x as u32, y as u32)[rgb_channel] as f32 - GENDER_MEAN_BGR[channel]
            },
        )
        .into_tensor();
        let outputs = self
            .gender_model
            .run(tvec!(input.into()))
            .context("gender classifier inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("gender classifier produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("gender classifier output tensor was not f32")?;
        let probs: Vec<f32> = view.iter().copied().collect();
        if probs.len() != 2 {
            return Err(anyhow!(
                "gender classifier must produce a 2-way distribution, got {} values",
                probs.len()
            ));
        }
        // Distribution order is [male, female].
        if probs[0] >= probs[1] {
            Ok((Gender::Male, probs[0]))
        } else {
            Ok((Gender::Female, probs[1]))
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct FaceRegion {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl FaceGenderBackend for TractFaceBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_faces(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceDetection>> {
        let frame = Frame::from_rgb(pixels.to_vec(), width, height)?;
        let candidates = self.face_candidates(frame.image())?;
        let grouped = group_neighbors(candidates, MIN_NEIGHBORS);

        let mut detections = Vec::new();
        for cand in grouped {
            let x1 = (cand.x1.clamp(0.0, 1.0) * width as f32) as u32;
            let y1 = (cand.y1.clamp(0.0, 1.0) * height as f32) as u32;
            let x2 = (cand.x2.clamp(0.0, 1.0) * width as f32) as u32;
            let y2 = (cand.y2.clamp(0.0, 1.0) * height as f32) as u32;
            let region = FaceRegion {
                x: x1,
                y: y1,
                w: x2.saturating_sub(x1),
                h: y2.saturating_sub(y1),
            };
            if region.w < MIN_FACE_SIZE || region.h < MIN_FACE_SIZE {
                continue;
            }
            let (gender, confidence) = self.classify_face(&frame, &region)?;
            if confidence < self.confidence_threshold {
                continue;
            }
            detections.push(FaceDetection {
                x: region.x,
                y: region.y,
                w: region.w,
                h: region.h,
                gender,
                confidence,
            });
        }
        Ok(detections)
    }
}

// -------------------- Hand landmarks --------------------

/// ONNX 21-landmark hand model with presence and handedness heads.
///
/// Expected outputs: `[1, 63]` landmark coordinates in input-pixel units
/// (x, y, z per landmark), `[1, 1]` hand-presence score, `[1, 1]` raw
/// handedness probability (P of the raw "Right" label, un-mirrored).
///
/// Runs a single full-frame pass and reports at most one observation; a
/// palm-proposal stage for true two-hand support is not implemented here
/// (the scripted backend covers multi-hand paths in tests).
pub struct TractHandBackend {
    model: TypedSimplePlan<TypedModel>,
    min_detection_confidence: f32,
}

impl TractHandBackend {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model = load_model(model_path.as_ref(), 3, HAND_INPUT, HAND_INPUT)?;
        Ok(Self {
            model,
            min_detection_confidence: MIN_HAND_DETECTION_CONFIDENCE,
        })
    }
}

impl HandBackend for TractHandBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_hands(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<HandObservation>> {
        let frame = Frame::from_rgb(pixels.to_vec(), width, height)?;
        let resized =
            image::imageops::resize(frame.image(), HAND_INPUT, HAND_INPUT, FilterType::Triangle);
        let outputs = self
            .model
            .run(tvec!(rgb_tensor(&resized).into()))
            .context("hand landmark inference failed")?;
        if outputs.len() < 3 {
            return Err(anyhow!(
                "hand model must produce landmarks, score and handedness outputs, got {}",
                outputs.len()
            ));
        }

        let score = outputs[1]
            .to_array_view::<f32>()
            .context("hand score output was not f32")?
            .iter()
            .copied()
            .next()
            .unwrap_or(0.0);
        if score < self.min_detection_confidence {
            return Ok(Vec::new());
        }

        let coords = outputs[0]
            .to_array_view::<f32>()
            .context("hand landmark output was not f32")?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        if flat.len() < HAND_LANDMARK_COUNT * 3 {
            return Err(anyhow!(
                "hand model produced {} landmark values, expected {}",
                flat.len(),
                HAND_LANDMARK_COUNT * 3
            ));
        }
        let mut landmarks = [(0.0_f32, 0.0_f32); HAND_LANDMARK_COUNT];
        for (i, landmark) in landmarks.iter_mut().enumerate() {
            // x, y, z triplets in input-pixel units; normalize to 0..1.
            landmark.0 = flat[i * 3] / HAND_INPUT as f32;
            landmark.1 = flat[i * 3 + 1] / HAND_INPUT as f32;
        }

        let right_prob = outputs[2]
            .to_array_view::<f32>()
            .context("handedness output was not f32")?
            .iter()
            .copied()
            .next()
            .unwrap_or(0.5);
        let raw_handedness = if right_prob >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };

        Ok(vec![HandObservation {
            landmarks,
            raw_handedness,
            score,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(score: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Candidate {
        Candidate { score, x1, y1, x2, y2 }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = cand(0.9, 0.1, 0.1, 0.5, 0.5);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = cand(0.9, 0.0, 0.0, 0.2, 0.2);
        let b = cand(0.9, 0.5, 0.5, 0.9, 0.9);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn grouping_drops_regions_without_enough_neighbors() {
        let mut candidates = Vec::new();
        // Five near-identical candidates around one face.
        for i in 0..5 {
            let jitter = i as f32 * 0.005;
            candidates.push(cand(0.8, 0.1 + jitter, 0.1, 0.4 + jitter, 0.4));
        }
        // One stray candidate elsewhere.
        candidates.push(cand(0.9, 0.7, 0.7, 0.95, 0.95));
        let grouped = group_neighbors(candidates, MIN_NEIGHBORS);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].x1 < 0.2);
    }
}
