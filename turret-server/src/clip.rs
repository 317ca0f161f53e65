//! Fire-event clip export as MJPEG-in-AVI.
//!
//! A hand-built RIFF writer: `avih`/`strh`/`strf` headers, one `00dc` JPEG
//! chunk per frame, and an `idx1` index. Every common player opens it and
//! the only encoder involved is the JPEG one already in the tree.

use std::path::Path;

use scarecrow::{ClipError, ClipSink, FrameRecord};

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

/// AVI/MJPG implementation of the engine's clip sink.
pub struct AviClipSink {
    jpeg_quality: u8,
}

impl AviClipSink {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl Default for AviClipSink {
    fn default() -> Self {
        Self::new(85)
    }
}

impl ClipSink for AviClipSink {
    fn extension(&self) -> &'static str {
        "avi"
    }

    fn write_clip(
        &self,
        frames: &[FrameRecord],
        fps: f64,
        path: &Path,
    ) -> Result<(), ClipError> {
        let Some(first) = frames.first() else {
            return Err(ClipError::Encode("no frames to write".to_string()));
        };
        let jpegs: Vec<Vec<u8>> = frames
            .iter()
            .map(|record| {
                let mut jpeg = Vec::new();
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut jpeg,
                    self.jpeg_quality,
                );
                encoder
                    .encode_image(record.frame.as_ref())
                    .map_err(|e| ClipError::Encode(e.to_string()))?;
                Ok(jpeg)
            })
            .collect::<Result<_, ClipError>>()?;

        let (width, height) = first.frame.dimensions();
        let avi = build_avi(&jpegs, width, height, fps);
        std::fs::write(path, avi)?;
        Ok(())
    }
}

fn build_avi(jpegs: &[Vec<u8>], width: u32, height: u32, fps: f64) -> Vec<u8> {
    let frame_count = jpegs.len() as u32;
    let max_chunk = jpegs.iter().map(Vec::len).max().unwrap_or(0) as u32;

    // Each movi chunk: fourcc + size + data padded to an even byte.
    let padded = |len: usize| len + (len & 1);
    let movi_payload: usize = jpegs.iter().map(|j| 8 + padded(j.len())).sum();
    let movi_size = 4 + movi_payload;
    let hdrl_size = 4 + (8 + 56) + (8 + 4 + (8 + 56) + (8 + 40));
    let idx_size = 16 * jpegs.len();
    let riff_size = 4 + (8 + hdrl_size) + (8 + movi_size) + (8 + idx_size);

    let mut out = Vec::with_capacity(riff_size + 8);
    out.extend_from_slice(b"RIFF");
    push_u32(&mut out, riff_size as u32);
    out.extend_from_slice(b"AVI ");

    // hdrl
    out.extend_from_slice(b"LIST");
    push_u32(&mut out, hdrl_size as u32);
    out.extend_from_slice(b"hdrl");

    out.extend_from_slice(b"avih");
    push_u32(&mut out, 56);
    push_u32(&mut out, (1_000_000.0 / fps) as u32); // microseconds per frame
    push_u32(&mut out, (fps * f64::from(max_chunk)) as u32); // max bytes/sec
    push_u32(&mut out, 0); // padding granularity
    push_u32(&mut out, AVIF_HASINDEX);
    push_u32(&mut out, frame_count);
    push_u32(&mut out, 0); // initial frames
    push_u32(&mut out, 1); // streams
    push_u32(&mut out, max_chunk);
    push_u32(&mut out, width);
    push_u32(&mut out, height);
    for _ in 0..4 {
        push_u32(&mut out, 0); // reserved
    }

    // strl
    out.extend_from_slice(b"LIST");
    push_u32(&mut out, (4 + (8 + 56) + (8 + 40)) as u32);
    out.extend_from_slice(b"strl");

    out.extend_from_slice(b"strh");
    push_u32(&mut out, 56);
    out.extend_from_slice(b"vids");
    out.extend_from_slice(b"MJPG");
    push_u32(&mut out, 0); // flags
    push_u16(&mut out, 0); // priority
    push_u16(&mut out, 0); // language
    push_u32(&mut out, 0); // initial frames
    push_u32(&mut out, 1_000_000); // scale
    push_u32(&mut out, (fps * 1_000_000.0) as u32); // rate
    push_u32(&mut out, 0); // start
    push_u32(&mut out, frame_count); // length
    push_u32(&mut out, max_chunk);
    push_u32(&mut out, u32::MAX); // quality: default
    push_u32(&mut out, 0); // sample size
    push_u16(&mut out, 0); // rcFrame left
    push_u16(&mut out, 0); // top
    push_u16(&mut out, width as u16); // right
    push_u16(&mut out, height as u16); // bottom

    out.extend_from_slice(b"strf");
    push_u32(&mut out, 40);
    push_u32(&mut out, 40); // BITMAPINFOHEADER size
    push_u32(&mut out, width);
    push_u32(&mut out, height);
    push_u16(&mut out, 1); // planes
    push_u16(&mut out, 24); // bits per pixel
    out.extend_from_slice(b"MJPG"); // compression
    push_u32(&mut out, width * height * 3);
    for _ in 0..4 {
        push_u32(&mut out, 0); // pels/clr fields
    }

    // movi
    out.extend_from_slice(b"LIST");
    push_u32(&mut out, movi_size as u32);
    out.extend_from_slice(b"movi");
    let mut offsets = Vec::with_capacity(jpegs.len());
    let mut offset = 4u32; // from the 'movi' fourcc to the first chunk
    for jpeg in jpegs {
        offsets.push(offset);
        out.extend_from_slice(b"00dc");
        push_u32(&mut out, jpeg.len() as u32);
        out.extend_from_slice(jpeg);
        if jpeg.len() & 1 == 1 {
            out.push(0);
        }
        offset += (8 + padded(jpeg.len())) as u32;
    }

    // idx1
    out.extend_from_slice(b"idx1");
    push_u32(&mut out, idx_size as u32);
    for (jpeg, chunk_offset) in jpegs.iter().zip(offsets) {
        out.extend_from_slice(b"00dc");
        push_u32(&mut out, AVIIF_KEYFRAME);
        push_u32(&mut out, chunk_offset);
        push_u32(&mut out, jpeg.len() as u32);
    }

    out
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    fn records(count: usize) -> Vec<FrameRecord> {
        (0..count)
            .map(|i| FrameRecord {
                frame: Arc::new(RgbImage::from_pixel(16, 12, Rgb([i as u8 * 20, 90, 40]))),
                timestamp: i as f64 * 0.1,
            })
            .collect()
    }

    #[test]
    fn test_written_file_has_riff_avi_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fire_event_test.avi");
        let sink = AviClipSink::default();
        sink.write_clip(&records(5), 10.0, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        // Declared RIFF size matches the file.
        let declared = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(declared + 8, bytes.len());
    }

    #[test]
    fn test_header_carries_frame_count_and_dimensions() {
        let frames = records(7);
        let jpegs: Vec<Vec<u8>> = frames
            .iter()
            .map(|r| {
                let mut jpeg = Vec::new();
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 85)
                    .encode_image(r.frame.as_ref())
                    .unwrap();
                jpeg
            })
            .collect();
        let avi = build_avi(&jpegs, 16, 12, 10.0);

        // avih starts at byte 24 (RIFF header 12 + LIST header 12); frame
        // count is its fifth field, width/height its ninth and tenth.
        let avih = 24 + 8;
        let field = |n: usize| {
            u32::from_le_bytes(avi[avih + 4 * n..avih + 4 * n + 4].try_into().unwrap())
        };
        assert_eq!(field(4), 7);
        assert_eq!(field(8), 16);
        assert_eq!(field(9), 12);
    }

    #[test]
    fn test_index_points_at_every_chunk() {
        let jpegs = vec![vec![0xFFu8; 11], vec![0xFFu8; 20]];
        let avi = build_avi(&jpegs, 16, 12, 5.0);

        let idx = avi.windows(4).position(|w| w == b"idx1").unwrap();
        let entries = u32::from_le_bytes(avi[idx + 4..idx + 8].try_into().unwrap()) / 16;
        assert_eq!(entries, 2);

        // Second entry's offset: 4 + (8 + 12 padded) from 'movi'.
        let second = idx + 8 + 16;
        let offset = u32::from_le_bytes(avi[second + 8..second + 12].try_into().unwrap());
        assert_eq!(offset, 4 + 8 + 12);
    }
}
