//! Canny edge detection over an encoded image.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use super::{Transform, TransformError};
use crate::message::ControlParameters;

/// JPEG quality of the returned edge map.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Decodes the payload, runs Canny with the session thresholds and returns
/// the edge map as a JPEG.
///
/// Any format enabled in the `image` dependency is accepted. Thresholds given
/// in reverse order are swapped.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    quality: u8,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the output JPEG quality (1-100).
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for EdgeDetector {
    fn apply(&self, payload: &[u8], params: ControlParameters) -> Result<Bytes, TransformError> {
        let image = image::load_from_memory(payload)
            .map_err(|e| TransformError::InvalidImage(e.to_string()))?;
        let gray = image.to_luma8();

        let (low, high) = ordered(params);
        let edges = imageproc::edges::canny(&gray, low, high);

        let mut out = Vec::with_capacity(payload.len() / 2);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&edges)
            .map_err(|e| TransformError::Encode(e.to_string()))?;

        tracing::trace!(
            width = edges.width(),
            height = edges.height(),
            low,
            high,
            encoded = out.len(),
            "edge map encoded"
        );
        Ok(Bytes::from(out))
    }
}

fn ordered(params: ControlParameters) -> (f32, f32) {
    let low = params.min_threshold.min(params.max_threshold) as f32;
    let high = params.min_threshold.max(params.max_threshold) as f32;
    (low, high)
}
