//! Overlay drawing for annotated frames.
//!
//! Pure side-effecting transforms on the shared frame buffer: face boxes
//! with gender labels, hand landmark skeletons, hand-side labels and gesture
//! banners. No decision logic lives here, and drawing never fails; anything
//! that would land outside the frame is clipped.

use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::frame::Frame;
use crate::{FaceDetection, Gender, GestureKind, HandObservation, Handedness};

pub const COLOR_FEMALE: Rgb<u8> = Rgb([0, 255, 0]);
pub const COLOR_MALE: Rgb<u8> = Rgb([0, 0, 255]);
pub const COLOR_SKELETON: Rgb<u8> = Rgb([255, 255, 255]);
pub const COLOR_LANDMARK: Rgb<u8> = Rgb([255, 0, 0]);
pub const COLOR_HAND_LABEL: Rgb<u8> = Rgb([255, 255, 0]);
pub const COLOR_BANNER: Rgb<u8> = Rgb([255, 0, 0]);
pub const COLOR_BANNER_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// MediaPipe 21-landmark hand skeleton edges.
const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 17),
];

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const TEXT_SCALE: u32 = 2;

fn gender_color(gender: Gender) -> Rgb<u8> {
    match gender {
        Gender::Female => COLOR_FEMALE,
        Gender::Male => COLOR_MALE,
    }
}

/// Hollow box (2px) plus a `GENDER: conf` label above a detected face.
pub fn draw_face(frame: &mut Frame, face: &FaceDetection) {
    let color = gender_color(face.gender);
    if face.w == 0 || face.h == 0 {
        return;
    }
    let image = frame.image_mut();
    let (width, height) = image.dimensions();
    let x = face.x.min(width.saturating_sub(1)) as i32;
    let y = face.y.min(height.saturating_sub(1)) as i32;
    let w = face.w.min(width - x as u32);
    let h = face.h.min(height - y as u32);
    draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w.max(1), h.max(1)), color);
    if w > 2 && h > 2 {
        draw_hollow_rect_mut(
            image,
            Rect::at(x + 1, y + 1).of_size(w - 2, h - 2),
            color,
        );
    }
    let label = format!("{}: {:.2}", face.gender.display_label(), face.confidence);
    let label_y = y - (GLYPH_H * TEXT_SCALE) as i32 - 3;
    draw_text(frame, x, label_y, &label, color);
}

/// Landmark skeleton and dots for one detected hand, plus the corrected
/// hand-side label near the wrist.
pub fn draw_hand(frame: &mut Frame, hand: &HandObservation) {
    let (width, height) = (frame.width() as f32, frame.height() as f32);
    let image = frame.image_mut();
    for &(a, b) in &HAND_CONNECTIONS {
        let pa = hand.landmarks[a];
        let pb = hand.landmarks[b];
        draw_line_segment_mut(
            image,
            (pa.0 * width, pa.1 * height),
            (pb.0 * width, pb.1 * height),
            COLOR_SKELETON,
        );
    }
    for &(lx, ly) in hand.landmarks.iter() {
        let cx = (lx * width) as i32;
        let cy = (ly * height) as i32;
        if cx >= 1 && cy >= 1 {
            draw_filled_rect_mut(
                image,
                Rect::at(cx - 1, cy - 1).of_size(3, 3),
                COLOR_LANDMARK,
            );
        }
    }

    let (wx, wy) = hand.wrist();
    let label = match hand.actual_handedness() {
        Handedness::Left => "LEFT HAND",
        Handedness::Right => "RIGHT HAND",
    };
    let x = (wx * width) as i32 + 10;
    let y = (wy * height) as i32 + 20;
    draw_text(frame, x, y, label, COLOR_HAND_LABEL);
}

/// Filled banner with the gesture name, anchored above the triggering
/// hand's wrist.
pub fn draw_gesture_banner(frame: &mut Frame, hand: &HandObservation, kind: GestureKind) {
    let (wx, wy) = hand.wrist();
    let cx = (wx * frame.width() as f32) as i32;
    let cy = (wy * frame.height() as f32) as i32;
    let text = format!("GESTURE: {}", kind.as_str().to_uppercase());
    let text_w = text_width(&text);
    let text_h = GLYPH_H * TEXT_SCALE;

    let banner_x = cx - 10;
    let banner_y = cy - text_h as i32 - 15;
    let banner = clip_rect(
        frame,
        banner_x,
        banner_y,
        text_w + 20,
        text_h + 10,
    );
    if let Some(rect) = banner {
        draw_filled_rect_mut(frame.image_mut(), rect, COLOR_BANNER);
    }
    draw_text(frame, cx, banner_y + 5, &text, COLOR_BANNER_TEXT);
}

/// Pixel width of a rendered string.
pub fn text_width(text: &str) -> u32 {
    text.chars().count() as u32 * (GLYPH_W + 1) * TEXT_SCALE
}

/// Render text with the embedded 5x7 glyph set. Glyphs falling outside the
/// frame are clipped pixel by pixel.
pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let image = frame.image_mut();
    let (width, height) = image.dimensions();
    let mut pen_x = x;
    for ch in text.chars() {
        let rows = glyph(ch.to_ascii_uppercase());
        for (row_idx, row) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if row & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                for sy in 0..TEXT_SCALE {
                    for sx in 0..TEXT_SCALE {
                        let px = pen_x + (col * TEXT_SCALE + sx) as i32;
                        let py = y + (row_idx as u32 * TEXT_SCALE + sy) as i32;
                        if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        pen_x += ((GLYPH_W + 1) * TEXT_SCALE) as i32;
    }
}

fn clip_rect(frame: &Frame, x: i32, y: i32, w: u32, h: u32) -> Option<Rect> {
    let fw = frame.width() as i32;
    let fh = frame.height() as i32;
    let x1 = x.max(0);
    let y1 = y.max(0);
    let x2 = (x + w as i32).min(fw);
    let y2 = (y + h as i32).min(fh);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

/// 5x7 bitmap rows for one glyph; unknown characters render as blank.
fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b00100, 0b00100, 0b00000, 0b00100, 0b00100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00110],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        _ => [0; 7],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubHandBackend;

    #[test]
    fn face_box_paints_gender_color() {
        let mut frame = Frame::new(100, 100);
        let face = FaceDetection {
            x: 20,
            y: 30,
            w: 40,
            h: 40,
            gender: Gender::Female,
            confidence: 0.9,
        };
        draw_face(&mut frame, &face);
        assert_eq!(*frame.image().get_pixel(20, 30), COLOR_FEMALE);
        assert_eq!(*frame.image().get_pixel(59, 69), COLOR_FEMALE);
    }

    #[test]
    fn face_box_at_frame_edge_does_not_panic() {
        let mut frame = Frame::new(64, 64);
        let face = FaceDetection {
            x: 60,
            y: 0,
            w: 50,
            h: 50,
            gender: Gender::Male,
            confidence: 0.7,
        };
        draw_face(&mut frame, &face);
    }

    #[test]
    fn hand_overlay_touches_the_frame() {
        let mut frame = Frame::new(200, 200);
        let hand = StubHandBackend::observation(crate::Handedness::Right, 0.9);
        draw_hand(&mut frame, &hand);
        let painted = frame
            .as_raw()
            .iter()
            .any(|&b| b != 0);
        assert!(painted);
    }

    #[test]
    fn banner_near_edge_is_clipped_not_panicking() {
        let mut frame = Frame::new(80, 40);
        let mut hand = StubHandBackend::observation(crate::Handedness::Right, 0.9);
        hand.landmarks[crate::LANDMARK_WRIST] = (0.02, 0.05);
        draw_gesture_banner(&mut frame, &hand, GestureKind::Wave);
    }

    #[test]
    fn text_width_scales_with_length() {
        assert!(text_width("GESTURE: WAVE") > text_width("WAVE"));
    }
}
