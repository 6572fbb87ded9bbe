// Image pipeline: decode → transform → resize → BGR pixel buffers
// Produces device-ready frames for still images, solid colors and GIFs

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use idisplay_transport::protocol::SIDE;
use idisplay_transport::{PixelBuffer, PixelBufferError, Rgb};

/// Delays at or above this are kept as-is
const MIN_GIF_DELAY_MS: u32 = 200;

/// Delay substituted for short or missing GIF delays
const FALLBACK_GIF_DELAY_MS: u32 = 100;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Animation has no frames")]
    NoFrames,

    #[error(transparent)]
    PixelBuffer(#[from] PixelBufferError),
}

/// One device-ready image with its display time
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: PixelBuffer,
    pub delay_ms: u32,
}

/// Clockwise rotation applied before resizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {other}")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(r: Rotation) -> u16 {
        r.degrees()
    }
}

/// Geometry applied to every decoded image
///
/// Serialized form is part of the frame cache key, so field order matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformOptions {
    #[serde(default)]
    pub rotate: Rotation,
    #[serde(default)]
    pub flip_vertical: bool,
    /// Nearest-neighbour resampling instead of triangle
    #[serde(default)]
    pub nearest: bool,
}

impl TransformOptions {
    fn filter(&self) -> FilterType {
        if self.nearest {
            FilterType::Nearest
        } else {
            FilterType::Triangle
        }
    }

    fn apply(&self, img: DynamicImage) -> DynamicImage {
        let img = match self.rotate {
            Rotation::None => img,
            Rotation::Cw90 => img.rotate90(),
            Rotation::Cw180 => img.rotate180(),
            Rotation::Cw270 => img.rotate270(),
        };
        let img = if self.flip_vertical { img.flipv() } else { img };
        img.resize_exact(SIDE as u32, SIDE as u32, self.filter())
    }
}

/// GIF delays below 200 ms (including 0) play at 100 ms
pub fn clamp_delay_ms(ms: u32) -> u32 {
    if ms < MIN_GIF_DELAY_MS {
        FALLBACK_GIF_DELAY_MS
    } else {
        ms
    }
}

/// Convert a GIF frame delay in hundredths of a second
pub fn delay_from_centiseconds(cs: u16) -> u32 {
    clamp_delay_ms(u32::from(cs) * 10)
}

/// Transform an image and pack it as BGR
fn to_pixel_buffer(img: DynamicImage, options: &TransformOptions) -> Result<PixelBuffer, PipelineError> {
    let rgba = options.apply(img).to_rgba8();
    let mut bgr = Vec::with_capacity(SIDE * SIDE * 3);
    for px in rgba.pixels() {
        let [r, g, b, _a] = px.0;
        bgr.extend_from_slice(&[b, g, r]);
    }
    Ok(PixelBuffer::from_bgr(bgr)?)
}

/// Decode a still image (png, jpeg, bmp, or the first GIF frame)
pub fn from_static_image(bytes: &[u8], options: &TransformOptions) -> Result<PixelBuffer, PipelineError> {
    let img = image::load_from_memory(bytes)?;
    to_pixel_buffer(img, options)
}

/// Read and decode a still image file
pub fn from_image_file<P: AsRef<Path>>(
    path: P,
    options: &TransformOptions,
) -> Result<PixelBuffer, PipelineError> {
    let bytes = std::fs::read(path.as_ref())?;
    from_static_image(&bytes, options)
}

/// A buffer filled with one color
pub fn from_solid_color(color: Rgb) -> PixelBuffer {
    PixelBuffer::solid(color)
}

/// Decode every GIF frame, composited onto the full canvas
pub fn from_gif_all_frames(bytes: &[u8], options: &TransformOptions) -> Result<Vec<Frame>, PipelineError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let decoded = decoder.into_frames().collect_frames()?;

    let mut frames = Vec::with_capacity(decoded.len());
    for frame in decoded {
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay_ms = clamp_delay_ms(numer / denom.max(1));
        let img = DynamicImage::ImageRgba8(frame.into_buffer());
        frames.push(Frame {
            pixels: to_pixel_buffer(img, options)?,
            delay_ms,
        });
    }

    if frames.is_empty() {
        return Err(PipelineError::NoFrames);
    }
    Ok(frames)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::borrow::Cow;

    const RED: [u8; 3] = [255, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    /// One GIF frame filled with palette entry `index` (0 = red, 1 = blue)
    pub(crate) fn gif_frame(w: u16, h: u16, left: u16, top: u16, index: u8, delay: u16) -> gif::Frame<'static> {
        gif::Frame {
            width: w,
            height: h,
            left,
            top,
            delay,
            palette: Some([RED, BLUE].concat()),
            buffer: Cow::Owned(vec![index; w as usize * h as usize]),
            ..gif::Frame::default()
        }
    }

    pub(crate) fn encode_gif(width: u16, height: u16, frames: &[gif::Frame<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, width, height, &[]).unwrap();
            encoder.set_repeat(gif::Repeat::Infinite).unwrap();
            for f in frames {
                encoder.write_frame(f).unwrap();
            }
        }
        out
    }

    /// Valid 8x8 GIF with a global palette and no frames
    pub(crate) fn encode_empty_gif() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, 8, 8, &[RED, BLUE].concat()).unwrap();
            encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        }
        out
    }

    fn pixel(buf: &PixelBuffer, x: usize, y: usize) -> [u8; 3] {
        let i = (y * SIDE + x) * 3;
        let b = buf.as_bytes();
        [b[i], b[i + 1], b[i + 2]]
    }

    fn nearest() -> TransformOptions {
        TransformOptions {
            nearest: true,
            ..Default::default()
        }
    }

    #[test]
    fn gif_delays_follow_minimum_rule() {
        let bytes = encode_gif(
            8,
            8,
            &[
                gif_frame(8, 8, 0, 0, 0, 50),
                gif_frame(8, 8, 0, 0, 1, 5),
                gif_frame(8, 8, 0, 0, 0, 300),
            ],
        );
        let frames = from_gif_all_frames(&bytes, &TransformOptions::default()).unwrap();
        let delays: Vec<u32> = frames.iter().map(|f| f.delay_ms).collect();
        assert_eq!(delays, vec![500, 100, 3000]);
        assert!(frames.iter().all(|f| f.pixels.len() == SIDE * SIDE * 3));
    }

    #[test]
    fn delay_rule_edges() {
        assert_eq!(clamp_delay_ms(0), 100);
        assert_eq!(clamp_delay_ms(199), 100);
        assert_eq!(clamp_delay_ms(200), 200);
        assert_eq!(delay_from_centiseconds(0), 100);
        assert_eq!(delay_from_centiseconds(20), 200);
    }

    #[test]
    fn partial_frames_composite_over_previous() {
        let bytes = encode_gif(
            8,
            8,
            &[gif_frame(8, 8, 0, 0, 0, 10), gif_frame(4, 4, 0, 0, 1, 10)],
        );
        let frames = from_gif_all_frames(&bytes, &nearest()).unwrap();
        assert_eq!(frames.len(), 2);

        // BGR: red = 00 00 ff, blue = ff 00 00
        assert_eq!(pixel(&frames[0].pixels, 0, 0), [0, 0, 255]);
        assert_eq!(pixel(&frames[1].pixels, 0, 0), [255, 0, 0]);
        assert_eq!(pixel(&frames[1].pixels, SIDE - 1, SIDE - 1), [0, 0, 255]);
    }

    #[test]
    fn rotation_and_flip_are_applied_before_resize() {
        let mut img = image::RgbImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgb(RED));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let plain = from_static_image(&png, &nearest()).unwrap();
        assert_eq!(pixel(&plain, 0, 0), [0, 0, 255]);

        let rotated = TransformOptions {
            rotate: Rotation::Cw90,
            ..nearest()
        };
        let buf = from_static_image(&png, &rotated).unwrap();
        assert_eq!(pixel(&buf, SIDE - 1, 0), [0, 0, 255]);
        assert_eq!(pixel(&buf, 0, 0), [0, 0, 0]);

        let rotated_flipped = TransformOptions {
            flip_vertical: true,
            ..rotated
        };
        let buf = from_static_image(&png, &rotated_flipped).unwrap();
        assert_eq!(pixel(&buf, SIDE - 1, SIDE - 1), [0, 0, 255]);
    }

    #[test]
    fn solid_color_is_bgr() {
        let buf = from_solid_color(Rgb::new(0x12, 0x34, 0x56));
        assert!(buf.as_bytes().chunks(3).all(|px| px == [0x56, 0x34, 0x12]));
    }

    #[test]
    fn undecodable_bytes_fail() {
        assert!(matches!(
            from_static_image(b"not an image", &TransformOptions::default()),
            Err(PipelineError::Decode(_))
        ));
        assert!(from_gif_all_frames(b"GIF89a", &TransformOptions::default()).is_err());
    }

    #[test]
    fn zero_frame_gif_is_no_frames() {
        assert!(matches!(
            from_gif_all_frames(&encode_empty_gif(), &TransformOptions::default()),
            Err(PipelineError::NoFrames)
        ));
    }

    #[test]
    fn rotation_serializes_as_degrees() {
        let opts = TransformOptions {
            rotate: Rotation::Cw270,
            flip_vertical: true,
            nearest: false,
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert_eq!(json, r#"{"rotate":270,"flip_vertical":true,"nearest":false}"#);
        assert!(serde_json::from_str::<TransformOptions>(r#"{"rotate":45}"#).is_err());
    }
}
