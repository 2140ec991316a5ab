//! JPEG encoding and multipart framing for the preview stream.

use actix_web::web::Bytes;
use anyhow::{Result, anyhow};
use image::{DynamicImage, RgbaImage, codecs::jpeg::JpegEncoder};

use crate::control::data::FramePacket;

pub const MULTIPART_BOUNDARY: &str = "frame";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encode an annotated canvas as JPEG. Quality is clamped to `1..=100`.
pub fn encode_jpeg(image: RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut buffer = Vec::with_capacity(rgb.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// One multipart part carrying a single JPEG frame.
pub fn multipart_chunk(packet: &FramePacket) -> Bytes {
    let mut payload = Vec::with_capacity(packet.jpeg.len() + 96);
    payload.extend_from_slice(b"--");
    payload.extend_from_slice(MULTIPART_BOUNDARY.as_bytes());
    payload.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n");
    payload.extend_from_slice(format!("X-Sequence: {}\r\n\r\n", packet.frame_number).as_bytes());
    payload.extend_from_slice(&packet.jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}
