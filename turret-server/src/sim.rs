//! Synthetic camera and detector for bench runs.
//!
//! `SimCamera` renders a flat field with color-keyed actors: a target blob
//! gliding back and forth, and periodically a protected-class band that must
//! suppress firing. `SimDetector` recovers the boxes by exact color match,
//! so the whole control stack runs end to end with no hardware and no
//! inference model.

use std::time::Duration;

use image::{Rgb, RgbImage};
use scarecrow::overlay;
use scarecrow::{BoundingBox, Camera, CameraError, Detection, Detections, Detector, DetectError};

const FIELD_COLOR: Rgb<u8> = Rgb([46, 88, 48]);
const BIRD_COLOR: Rgb<u8> = Rgb([200, 30, 30]);
const PERSON_COLOR: Rgb<u8> = Rgb([30, 30, 200]);

const BIRD_W: u32 = 96;
const BIRD_H: u32 = 72;

/// Frames per left-to-right-and-back glide of the target.
const GLIDE_PERIOD: u64 = 240;
/// The target rests off-frame for this many frames out of each period.
const REST_FRAMES: u64 = 40;
/// A protected actor walks through once per this many frames.
const PERSON_PERIOD: u64 = 600;
const PERSON_FRAMES: u64 = 60;

/// Endless synthetic feed, paced to roughly the requested frame rate.
pub struct SimCamera {
    width: u32,
    height: u32,
    frame_period: Duration,
    tick: u64,
}

impl SimCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_period: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            tick: 0,
        }
    }

    /// Target x-position for a tick: triangle wave across the usable width.
    fn bird_x(&self, tick: u64) -> Option<u32> {
        let phase = tick % GLIDE_PERIOD;
        if phase >= GLIDE_PERIOD - REST_FRAMES {
            return None;
        }
        let travel = self.width - BIRD_W;
        let half = (GLIDE_PERIOD - REST_FRAMES) / 2;
        let step = f64::from(travel) / half as f64;
        let x = if phase < half {
            phase as f64 * step
        } else {
            (GLIDE_PERIOD - REST_FRAMES - phase) as f64 * step
        };
        Some(x as u32)
    }

    fn person_x(&self, tick: u64) -> Option<u32> {
        let phase = tick % PERSON_PERIOD;
        if phase >= PERSON_FRAMES {
            return None;
        }
        let travel = self.width.saturating_sub(BIRD_W);
        Some((phase * u64::from(travel) / PERSON_FRAMES) as u32)
    }

    fn render(&self, tick: u64) -> RgbImage {
        let mut frame = RgbImage::from_pixel(self.width, self.height, FIELD_COLOR);
        // Target sits in the lower half so its lower edge clears the
        // fire-control height gate when centered.
        let bird_y = self.height * 11 / 20;
        if let Some(x) = self.bird_x(tick) {
            fill_rect(&mut frame, x, bird_y, BIRD_W, BIRD_H, BIRD_COLOR);
        }
        if let Some(x) = self.person_x(tick) {
            let person_h = self.height * 2 / 5;
            fill_rect(
                &mut frame,
                x,
                self.height - person_h,
                BIRD_W / 2,
                person_h,
                PERSON_COLOR,
            );
        }
        frame
    }
}

impl Camera for SimCamera {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        std::thread::sleep(self.frame_period);
        let frame = self.render(self.tick);
        self.tick += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {}
}

fn fill_rect(frame: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for py in y..(y + h).min(frame.height()) {
        for px in x..(x + w).min(frame.width()) {
            frame.put_pixel(px, py, color);
        }
    }
}

/// Recovers the synthetic actors by exact color match.
#[derive(Debug, Default)]
pub struct SimDetector;

impl SimDetector {
    fn find_color(frame: &RgbImage, color: Rgb<u8>) -> Option<BoundingBox> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut hit = false;
        for (x, y, pixel) in frame.enumerate_pixels() {
            if *pixel == color {
                hit = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        hit.then(|| {
            BoundingBox::new(
                min_x as f32,
                min_y as f32,
                (max_x + 1) as f32,
                (max_y + 1) as f32,
            )
        })
    }
}

impl Detector for SimDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detections, DetectError> {
        let mut items = Vec::new();
        if let Some(bbox) = Self::find_color(frame, BIRD_COLOR) {
            items.push(Detection {
                class_name: "bird".to_string(),
                confidence: 0.95,
                bbox,
            });
        }
        if let Some(bbox) = Self::find_color(frame, PERSON_COLOR) {
            items.push(Detection {
                class_name: "person".to_string(),
                confidence: 0.95,
                bbox,
            });
        }

        let mut annotated = frame.clone();
        for detection in &items {
            let label = format!(
                "{} {:.0}%",
                detection.class_name,
                detection.confidence * 100.0
            );
            overlay::draw_detection(&mut annotated, &detection.bbox, &label);
        }
        Ok(Detections { annotated, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_recovers_drawn_blob() {
        let mut frame = RgbImage::from_pixel(640, 480, FIELD_COLOR);
        fill_rect(&mut frame, 272, 204, BIRD_W, BIRD_H, BIRD_COLOR);

        let mut detector = SimDetector;
        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.items.len(), 1);
        let bbox = detections.items[0].bbox;
        assert_eq!(bbox.x1, 272.0);
        assert_eq!(bbox.y1, 204.0);
        assert_eq!(bbox.width(), BIRD_W as f32);
        assert_eq!(bbox.height(), BIRD_H as f32);
    }

    #[test]
    fn test_camera_glides_target_across_the_field() {
        let camera = SimCamera::new(640, 480, 30);
        let near_start = camera.bird_x(1).unwrap();
        let mid = camera.bird_x((GLIDE_PERIOD - REST_FRAMES) / 2).unwrap();
        assert!(near_start < 60);
        assert_eq!(mid, 640 - BIRD_W);
        // Off-frame rest at the tail of the period.
        assert!(camera.bird_x(GLIDE_PERIOD - 1).is_none());
    }

    #[test]
    fn test_protected_actor_appears_periodically() {
        let camera = SimCamera::new(640, 480, 30);
        assert!(camera.person_x(10).is_some());
        assert!(camera.person_x(PERSON_FRAMES + 5).is_none());

        let mut detector = SimDetector;
        let detections = detector.detect(&camera.render(10)).unwrap();
        assert!(detections
            .items
            .iter()
            .any(|d| d.class_name == "person"));
    }
}
