//! Protocol constants and report framing for the Infinitton iDisplay
//!
//! The wire format was recovered from USB captures. The header templates are
//! kept byte-for-byte; only the offsets documented here are interpreted.
//!
//! ```text
//! image upload buffer (0x3EA2 bytes, sent as two output reports)
//! +---------+----------------------+---------+----------------------+-----+
//! | HEADER1 | pixels[0..7946]      | HEADER2 | pixels[7946..15552]  | 0.. |
//! | 71 B    | offset 71            | 0x1F51  | offset 0x1F62        |     |
//! +---------+----------------------+---------+----------------------+-----+
//!  \_______ report 1: 0x1F51 B ___/ \________ report 2: 0x1F51 B ________/
//! ```
//!
//! The tail of report 2 past the last pixel byte is zero padding.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::types::{ButtonIndex, PixelBuffer};

/// USB identification
pub mod device {
    pub const VENDOR_ID: u16 = 0xFFFF;
    pub const PRODUCT_ID: u16 = 0x1F40;
}

/// Feature report command bytes
pub mod cmd {
    pub const SET_BRIGHTNESS: u8 = 0x11;
    pub const COMMIT_IMAGE: u8 = 0x12;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            SET_BRIGHTNESS => "SET_BRIGHTNESS",
            COMMIT_IMAGE => "COMMIT_IMAGE",
            _ => "UNKNOWN",
        }
    }
}

/// Pauses between the writes of one image upload
pub mod timing {
    use std::time::Duration;

    /// Pause after each image report. Anything under a millisecond only yields
    /// to the runtime.
    pub const WRITE_PAUSE: Duration = Duration::from_micros(100);
}

/// Buttons on the panel
pub const BUTTON_COUNT: usize = 15;

/// Edge length of a button image in pixels
pub const SIDE: usize = 72;

/// Bytes in one button image (BGR, no padding)
pub const PIXEL_BYTES: usize = SIDE * SIDE * 3;

/// Size of the brightness feature report
pub const BRIGHTNESS_REPORT_SIZE: usize = 0x1F;

/// Size of the commit feature report
// TODO: check on hardware whether a 34-byte commit with byte 1 = 0x01 behaves differently
pub const COMMIT_REPORT_SIZE: usize = 33;

/// Full image upload buffer size
pub const IMAGE_BUFFER_SIZE: usize = 0x3EA2;

/// Offset where the buffer is split into two output reports (and where HEADER2 sits)
pub const IMAGE_SPLIT_OFFSET: usize = 0x1F51;

/// Bitmap size advertised by HEADER1 and repeated in the commit report
pub const BITMAP_FILE_SIZE: u16 = 0x3CF6;

/// Offset of the magic sequence inside both headers
pub const MAGIC_OFFSET: usize = 9;

pub const MAGIC: [u8; 8] = [0x55, 0xAA, 0xAA, 0x55, 0x11, 0x22, 0x33, 0x44];

/// First report header: report id, chunk descriptor, magic, then a
/// BITMAPFILEHEADER + BITMAPINFOHEADER for a 72x72 24-bit image
pub const HEADER1: [u8; 71] = [
    0x02, 0x00, 0x00, 0x00, 0x00, 0x40, 0x1f, 0x00, 0x00, 0x55, 0xaa, 0xaa, 0x55, 0x11, 0x22, 0x33,
    0x44, 0x42, 0x4d, 0xf6, 0x3c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x36, 0x00, 0x00, 0x00, 0x28,
    0x00, 0x00, 0x00, 0x48, 0x00, 0x00, 0x00, 0x48, 0x00, 0x00, 0x00, 0x01, 0x00, 0x18, 0x00, 0x00,
    0x00, 0x00, 0x00, 0xc0, 0x3c, 0x00, 0x00, 0xc4, 0x0e, 0x00, 0x00, 0xc4, 0x0e, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Second report header: report id, chunk descriptor, magic
pub const HEADER2: [u8; 17] = [
    0x02, 0x40, 0x1f, 0x00, 0x00, 0xb6, 0x1d, 0x00, 0x00, 0x55, 0xaa, 0xaa, 0x55, 0x11, 0x22, 0x33,
    0x44,
];

/// Pixel bytes carried by the first report
pub const PIXEL_PART1_LEN: usize = IMAGE_SPLIT_OFFSET - HEADER1.len();

/// Pixel bytes carried by the second report
pub const PIXEL_PART2_LEN: usize = PIXEL_BYTES - PIXEL_PART1_LEN;

const _: () = assert!(PIXEL_PART2_LEN + HEADER2.len() <= IMAGE_BUFFER_SIZE - IMAGE_SPLIT_OFFSET);

/// Bitmask in input report bytes 1-2 (big-endian) for buttons 1..=15
pub const BUTTON_CODES: [u16; BUTTON_COUNT] = [
    0x100, 0x200, 0x400, 0x800, 0x1000, 0x2000, 0x4000, 0x8000, 0x1, 0x2, 0x4, 0x8, 0x10, 0x20,
    0x40,
];

// =============================================================================
// Image upload
// =============================================================================

/// Image upload buffer for one button, ready to be sent as two output reports
#[derive(Clone)]
pub struct ImageReports {
    buf: Vec<u8>,
}

impl ImageReports {
    /// First output report: HEADER1 and the first pixel slice
    pub fn first(&self) -> &[u8] {
        &self.buf[..IMAGE_SPLIT_OFFSET]
    }

    /// Second output report: HEADER2, the remaining pixels, zero padding
    pub fn second(&self) -> &[u8] {
        &self.buf[IMAGE_SPLIT_OFFSET..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Frame a pixel buffer into the two-part image upload
pub fn build_image_reports(pixels: &PixelBuffer) -> ImageReports {
    let pixels = pixels.as_bytes();
    let mut buf = vec![0u8; IMAGE_BUFFER_SIZE];

    buf[..HEADER1.len()].copy_from_slice(&HEADER1);
    buf[IMAGE_SPLIT_OFFSET..IMAGE_SPLIT_OFFSET + HEADER2.len()].copy_from_slice(&HEADER2);

    buf[HEADER1.len()..IMAGE_SPLIT_OFFSET].copy_from_slice(&pixels[..PIXEL_PART1_LEN]);
    let part2 = IMAGE_SPLIT_OFFSET + HEADER2.len();
    buf[part2..part2 + PIXEL_PART2_LEN].copy_from_slice(&pixels[PIXEL_PART1_LEN..]);

    ImageReports { buf }
}

/// Recover the pixel payload from the two output reports of an upload
///
/// Returns `None` if either report is too short or lacks its header.
pub fn extract_pixels(first: &[u8], second: &[u8]) -> Option<Vec<u8>> {
    if !is_image_report(first, 1) || !is_image_report(second, 2) {
        return None;
    }
    if first.len() < IMAGE_SPLIT_OFFSET || second.len() < HEADER2.len() + PIXEL_PART2_LEN {
        return None;
    }
    let mut pixels = Vec::with_capacity(PIXEL_BYTES);
    pixels.extend_from_slice(&first[HEADER1.len()..IMAGE_SPLIT_OFFSET]);
    pixels.extend_from_slice(&second[HEADER2.len()..HEADER2.len() + PIXEL_PART2_LEN]);
    Some(pixels)
}

/// Check whether an output report starts with image header `part` (1 or 2)
pub fn is_image_report(data: &[u8], part: u8) -> bool {
    match part {
        1 => data.starts_with(&HEADER1),
        2 => data.starts_with(&HEADER2),
        _ => false,
    }
}

// =============================================================================
// Feature reports (zerocopy)
// =============================================================================

/// COMMIT_IMAGE (0x12): selects the button the uploaded image applies to
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CommitReport {
    cmd: u8,
    _reserved0: [u8; 3],
    button: u8,
    _reserved1: [u8; 11],
    /// Little-endian copy of HEADER1's bitmap size field
    image_size: [u8; 2],
    _reserved2: [u8; 15],
}

const _: () = assert!(std::mem::size_of::<CommitReport>() == COMMIT_REPORT_SIZE);

impl CommitReport {
    pub fn new(button: ButtonIndex) -> Self {
        Self {
            cmd: cmd::COMMIT_IMAGE,
            _reserved0: [0; 3],
            button: button.get(),
            _reserved1: [0; 11],
            image_size: BITMAP_FILE_SIZE.to_le_bytes(),
            _reserved2: [0; 15],
        }
    }

    pub fn button(&self) -> u8 {
        self.button
    }
}

/// SET_BRIGHTNESS (0x11): backlight level in percent
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BrightnessReport {
    cmd: u8,
    level: u8,
    _reserved: [u8; 29],
}

const _: () = assert!(std::mem::size_of::<BrightnessReport>() == BRIGHTNESS_REPORT_SIZE);

impl BrightnessReport {
    pub fn new(percent: u8) -> Self {
        Self {
            cmd: cmd::SET_BRIGHTNESS,
            level: percent,
            _reserved: [0; 29],
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

/// Build the commit report that follows an image upload
pub fn build_commit_report(button: ButtonIndex) -> [u8; COMMIT_REPORT_SIZE] {
    let mut out = [0u8; COMMIT_REPORT_SIZE];
    out.copy_from_slice(CommitReport::new(button).as_bytes());
    out
}

/// Build the brightness feature report
pub fn build_brightness_report(percent: u8) -> [u8; BRIGHTNESS_REPORT_SIZE] {
    let mut out = [0u8; BRIGHTNESS_REPORT_SIZE];
    out.copy_from_slice(BrightnessReport::new(percent).as_bytes());
    out
}

/// Human-readable summary of a feature report
pub fn describe_feature_report(data: &[u8]) -> String {
    match data.first().copied() {
        Some(cmd::COMMIT_IMAGE) if data.len() >= COMMIT_REPORT_SIZE => {
            match CommitReport::read_from_bytes(&data[..COMMIT_REPORT_SIZE]) {
                Ok(r) => format!("COMMIT_IMAGE button={}", r.button()),
                Err(_) => "COMMIT_IMAGE (unreadable)".to_string(),
            }
        }
        Some(cmd::SET_BRIGHTNESS) if data.len() >= 2 => {
            format!("SET_BRIGHTNESS level={}%", data[1])
        }
        Some(c) => format!("{} (0x{c:02X}, {} bytes)", cmd::name(c), data.len()),
        None => "empty feature report".to_string(),
    }
}

/// Human-readable summary of an output report
pub fn describe_output_report(data: &[u8]) -> String {
    if is_image_report(data, 1) {
        format!("IMAGE part 1/2 ({} bytes)", data.len())
    } else if is_image_report(data, 2) {
        format!("IMAGE part 2/2 ({} bytes)", data.len())
    } else {
        format!("output report ({} bytes)", data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    fn button(n: u8) -> ButtonIndex {
        ButtonIndex::new(n).unwrap()
    }

    #[test]
    fn header_templates_match_documented_layout() {
        assert_eq!(HEADER1.len(), 71);
        assert_eq!(HEADER2.len(), 17);
        assert_eq!(&HEADER1[MAGIC_OFFSET..MAGIC_OFFSET + 8], &MAGIC);
        assert_eq!(&HEADER2[MAGIC_OFFSET..MAGIC_OFFSET + 8], &MAGIC);
        // "BM" + file size
        assert_eq!(&HEADER1[17..19], b"BM");
        assert_eq!(u16::from_le_bytes([HEADER1[19], HEADER1[20]]), BITMAP_FILE_SIZE);
        // 72x72, 24 bpp
        assert_eq!(HEADER1[35], SIDE as u8);
        assert_eq!(HEADER1[39], SIDE as u8);
        assert_eq!(HEADER1[45], 24);
    }

    #[test]
    fn image_reports_have_fixed_size_and_headers() {
        let pixels = PixelBuffer::from_bgr((0..PIXEL_BYTES).map(|i| (i % 251) as u8).collect())
            .unwrap();
        let reports = build_image_reports(&pixels);
        let buf = reports.as_bytes();

        assert_eq!(buf.len(), IMAGE_BUFFER_SIZE);
        assert_eq!(&buf[..71], &HEADER1);
        assert_eq!(&buf[IMAGE_SPLIT_OFFSET..IMAGE_SPLIT_OFFSET + 17], &HEADER2);
        assert_eq!(reports.first().len(), IMAGE_SPLIT_OFFSET);
        assert_eq!(reports.second().len(), IMAGE_BUFFER_SIZE - IMAGE_SPLIT_OFFSET);

        assert_eq!(&buf[71..IMAGE_SPLIT_OFFSET], &pixels.as_bytes()[..PIXEL_PART1_LEN]);
        let p2 = IMAGE_SPLIT_OFFSET + 17;
        assert_eq!(&buf[p2..p2 + PIXEL_PART2_LEN], &pixels.as_bytes()[PIXEL_PART1_LEN..]);
        assert!(buf[p2 + PIXEL_PART2_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn extract_pixels_recovers_payload() {
        let pixels = PixelBuffer::solid(Rgb::new(9, 8, 7));
        let reports = build_image_reports(&pixels);
        let back = extract_pixels(reports.first(), reports.second()).unwrap();
        assert_eq!(back, pixels.as_bytes());

        assert!(extract_pixels(reports.second(), reports.first()).is_none());
        assert!(extract_pixels(&reports.first()[..100], reports.second()).is_none());
    }

    #[test]
    fn commit_report_layout() {
        let report = build_commit_report(button(3));
        assert_eq!(report.len(), 33);
        assert_eq!(report[0], 0x12);
        assert_eq!(report[4], 3);
        assert_eq!(&report[16..18], &[0xF6, 0x3C]);
        for (i, &b) in report.iter().enumerate() {
            if ![0, 4, 16, 17].contains(&i) {
                assert_eq!(b, 0, "byte {i} should be zero");
            }
        }
    }

    #[test]
    fn brightness_report_layout() {
        let report = build_brightness_report(75);
        assert_eq!(report.len(), 31);
        assert_eq!(report[0], 0x11);
        assert_eq!(report[1], 75);
        assert!(report[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn solid_red_on_button_three() {
        let pixels = PixelBuffer::solid(Rgb::new(255, 0, 0));
        let reports = build_image_reports(&pixels);
        let commit = build_commit_report(button(3));
        assert_eq!(commit[4], 3);

        let payload = extract_pixels(reports.first(), reports.second()).unwrap();
        assert_eq!(payload.len(), PIXEL_BYTES);
        assert!(payload.chunks_exact(3).all(|px| px == [0, 0, 255]));
    }

    #[test]
    fn describe_reports() {
        assert_eq!(
            describe_feature_report(&build_commit_report(button(7))),
            "COMMIT_IMAGE button=7"
        );
        assert_eq!(
            describe_feature_report(&build_brightness_report(40)),
            "SET_BRIGHTNESS level=40%"
        );
        let reports = build_image_reports(&PixelBuffer::solid(Rgb::BLACK));
        assert!(describe_output_report(reports.first()).starts_with("IMAGE part 1/2"));
        assert!(describe_output_report(reports.second()).starts_with("IMAGE part 2/2"));
    }
}
