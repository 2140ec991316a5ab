//! CPU drawing for the preview stream: hand skeleton, pinch line, volume bar
//! and a status footer, rendered with a small built-in bitmap font.

use anyhow::{Result, anyhow};
use image::{ImageBuffer, Rgba, RgbaImage};
use ml_core::{HAND_CONNECTIONS, HandObservation, LandmarkPoint};
use video_ingest::Frame;

use crate::control::metric::{GestureCalibration, interpolate};

/// Volume bar geometry in canvas pixels: `(left, top, right, bottom)`.
pub const VOLUME_BAR: (i32, i32, i32, i32) = (50, 150, 85, 400);
/// Baseline of the `<volume>%` caption.
pub const VOLUME_TEXT_ORIGIN: (i32, i32) = (40, 430);

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;

const SKELETON_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const JOINT_COLOR: Rgba<u8> = Rgba([230, 40, 40, 255]);
const TIP_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
const PINCH_LINE_COLOR: Rgba<u8> = Rgba([200, 200, 0, 255]);
const BAR_OUTLINE_COLOR: Rgba<u8> = Rgba([30, 30, 30, 255]);
const BAR_FILL_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FOOTER_BG: Rgba<u8> = Rgba([0, 0, 0, 180]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Live,
    Paused,
    NoSignal,
}

impl StreamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Live => "LIVE",
            StreamStatus::Paused => "PAUSED",
            StreamStatus::NoSignal => "NO SIGNAL",
        }
    }
}

/// Hand overlay inputs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct HandOverlay<'a> {
    pub hand: &'a HandObservation,
    pub distance_px: f64,
    pub volume_percent: u8,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameFooter {
    pub frame_number: u64,
    pub fps: f32,
    pub status: StreamStatus,
}

/// Render the overlay onto a copy of `frame`.
pub fn annotate_frame(
    frame: &Frame,
    overlay: Option<HandOverlay<'_>>,
    footer: FrameFooter,
    calibration: &GestureCalibration,
) -> Result<RgbaImage> {
    let width = u32::try_from(frame.width).map_err(|_| anyhow!("negative frame width"))?;
    let height = u32::try_from(frame.height).map_err(|_| anyhow!("negative frame height"))?;
    let rgba = bgr_to_rgba(&frame.data);
    let mut image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_vec(width, height, rgba)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;

    if let Some(overlay) = overlay {
        draw_hand(&mut image, overlay.hand);
        if let Some((thumb, index)) = overlay.hand.pinch_pair() {
            draw_line(&mut image, thumb, index, 3, PINCH_LINE_COLOR);
            fill_circle(&mut image, thumb, 8, TIP_COLOR);
            fill_circle(&mut image, index, 8, TIP_COLOR);
        }
        draw_volume_bar(&mut image, overlay.distance_px, calibration);
        let caption = format!("{}%", overlay.volume_percent);
        let (x, baseline) = VOLUME_TEXT_ORIGIN;
        draw_label(&mut image, x, baseline - GLYPH_HEIGHT * 3, &caption, 3, TEXT_COLOR);
    }

    draw_footer(&mut image, footer);
    Ok(image)
}

/// Top edge of the volume bar fill for a pinch distance.
pub fn volume_bar_top(distance_px: f64, calibration: &GestureCalibration) -> i32 {
    let (_, top, _, bottom) = VOLUME_BAR;
    interpolate(
        distance_px,
        calibration.domain(),
        (f64::from(bottom), f64::from(top)),
    )
    .clamp(f64::from(top), f64::from(bottom))
    .round() as i32
}

fn draw_hand(image: &mut RgbaImage, hand: &HandObservation) {
    for &(a, b) in HAND_CONNECTIONS.iter() {
        if let (Some(p), Some(q)) = (hand.point(a), hand.point(b)) {
            draw_line(image, p, q, 2, SKELETON_COLOR);
        }
    }
    for point in hand.points() {
        fill_circle(image, *point, 3, JOINT_COLOR);
    }
}

fn draw_volume_bar(image: &mut RgbaImage, distance_px: f64, calibration: &GestureCalibration) {
    let (left, top, right, bottom) = VOLUME_BAR;
    let fill_top = volume_bar_top(distance_px, calibration);
    fill_rect(image, left, fill_top, right, bottom, BAR_FILL_COLOR);
    draw_rectangle(image, left, top, right, bottom, BAR_OUTLINE_COLOR);
    draw_rectangle(image, left + 1, top + 1, right - 1, bottom - 1, BAR_OUTLINE_COLOR);
}

fn draw_footer(image: &mut RgbaImage, footer: FrameFooter) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let info = format!(
        "FRAME {:06}  FPS {:4.1}  {}",
        footer.frame_number,
        footer.fps,
        footer.status.as_str()
    );
    let info_width = (info.chars().count() as i32 * GLYPH_ADVANCE).min(width);
    let info_x = (width - info_width - 4).max(0);
    let info_y = (height - 12).max(0);
    fill_rect(
        image,
        info_x,
        info_y - 1,
        info_x + info_width + 4,
        info_y + GLYPH_HEIGHT + 1,
        FOOTER_BG,
    );
    let color = match footer.status {
        StreamStatus::Live => TEXT_COLOR,
        StreamStatus::Paused => Rgba([255, 200, 0, 255]),
        StreamStatus::NoSignal => Rgba([255, 60, 60, 255]),
    };
    draw_label(image, info_x + 2, info_y, &info, 1, color);
}

pub(crate) fn bgr_to_rgba(input: &[u8]) -> Vec<u8> {
    let pixels = input.len() / 3;
    let mut output = Vec::with_capacity(pixels * 4);
    for chunk in input.chunks_exact(3) {
        output.extend_from_slice(&[chunk[2], chunk[1], chunk[0], 255]);
    }
    output
}

fn put_pixel(image: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        *image.get_pixel_mut(x as u32, y as u32) = color;
    }
}

fn draw_rectangle(
    image: &mut RgbaImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    for x in left..=right {
        put_pixel(image, x, top, color);
        put_pixel(image, x, bottom, color);
    }
    for y in top..=bottom {
        put_pixel(image, left, y, color);
        put_pixel(image, right, y, color);
    }
}

fn fill_rect(
    image: &mut RgbaImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    let (left, right) = (left.max(0), right.min(max_x));
    let (top, bottom) = (top.max(0), bottom.min(max_y));
    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn fill_circle(image: &mut RgbaImage, center: LandmarkPoint, radius: i32, color: Rgba<u8>) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put_pixel(image, center.x + dx, center.y + dy, color);
            }
        }
    }
}

/// Bresenham line stamped with a square brush of `thickness` pixels.
fn draw_line(
    image: &mut RgbaImage,
    from: LandmarkPoint,
    to: LandmarkPoint,
    thickness: i32,
    color: Rgba<u8>,
) {
    let half = thickness.max(1) / 2;
    let (mut x, mut y) = (from.x, from.y);
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        for oy in -half..=half {
            for ox in -half..=half {
                put_pixel(image, x + ox, y + oy, color);
            }
        }
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_label(image: &mut RgbaImage, mut x: i32, y: i32, text: &str, scale: i32, color: Rgba<u8>) {
    let scale = scale.max(1);
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = x + col * scale;
                        let py = y + row as i32 * scale;
                        fill_rect(image, px, py, px + scale - 1, py + scale - 1, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'G' => Some([
            0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111,
        ]),
        'I' => Some([
            0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        'U' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'V' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '%' => Some([
            0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011,
        ]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0; 7]),
        _ => None,
    }
}
