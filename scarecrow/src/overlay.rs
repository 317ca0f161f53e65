//! Frame annotation: detection boxes, labels, and the HUD line.
//!
//! Rectangles go through `imageproc`; text is a built-in 5x7 bitmap font so
//! no font asset ships with the engine. Everything clips at the frame edge.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const HUD_COLOR: Rgb<u8> = Rgb([255, 80, 40]);

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;

/// Hollow detection box with its class label above the top edge.
pub fn draw_detection(frame: &mut RgbImage, bbox: &BoundingBox, label: &str) {
    let x = bbox.x1.round() as i32;
    let y = bbox.y1.round() as i32;
    let width = bbox.width().round().max(1.0) as u32;
    let height = bbox.height().round().max(1.0) as u32;
    draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(width, height), BOX_COLOR);

    let (cx, cy) = bbox.center();
    draw_marker(frame, cx.round() as i32, cy.round() as i32);

    let label_y = (y - GLYPH_HEIGHT - 2).max(0);
    draw_text(frame, x, label_y, label, BOX_COLOR);
}

/// Filled square at the target center.
fn draw_marker(frame: &mut RgbImage, cx: i32, cy: i32) {
    draw_filled_rect_mut(frame, Rect::at(cx - 2, cy - 2).of_size(5, 5), BOX_COLOR);
}

/// Status line in the top-left corner.
pub fn draw_hud(frame: &mut RgbImage, line: &str) {
    draw_text(frame, 4, 4, line, HUD_COLOR);
}

/// Render `text` in the bitmap font, uppercased, clipped at frame edges.
pub fn draw_text(frame: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let mut pen_x = x;
    for ch in text.chars() {
        let glyph = glyph_rows(ch.to_ascii_uppercase());
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = pen_x + col;
                let py = y + row as i32;
                if px >= 0 && py >= 0 && (px as u32) < frame.width() && (py as u32) < frame.height()
                {
                    frame.put_pixel(px as u32, py as u32, color);
                }
            }
        }
        pen_x += GLYPH_ADVANCE;
    }
}

/// 5x7 glyph rows, bit 4 leftmost. Unknown characters render blank.
fn glyph_rows(ch: char) -> [u8; GLYPH_HEIGHT as usize] {
    match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        _ => [0x00; GLYPH_HEIGHT as usize],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> RgbImage {
        RgbImage::new(64, 48)
    }

    #[test]
    fn test_text_marks_pixels() {
        let mut frame = blank();
        draw_text(&mut frame, 2, 2, "A1", HUD_COLOR);
        let lit = frame.pixels().filter(|p| **p == HUD_COLOR).count();
        assert!(lit > 0);
    }

    #[test]
    fn test_text_clips_at_edges() {
        let mut frame = blank();
        // Off the left/top and off the right: must not panic.
        draw_text(&mut frame, -3, -3, "EDGE", HUD_COLOR);
        draw_text(&mut frame, 60, 44, "EDGE", HUD_COLOR);
    }

    #[test]
    fn test_detection_box_outlines_target() {
        let mut frame = blank();
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        draw_detection(&mut frame, &bbox, "bird");
        assert_eq!(*frame.get_pixel(10, 20), BOX_COLOR);
        assert_eq!(*frame.get_pixel(20, 30), BOX_COLOR); // center marker
    }

    #[test]
    fn test_hud_renders_in_corner() {
        let mut frame = blank();
        draw_hud(&mut frame, "PAN 90.0");
        let lit = frame
            .enumerate_pixels()
            .filter(|(_, y, p)| *y < 12 && **p == HUD_COLOR)
            .count();
        assert!(lit > 0);
    }
}
