//! Image normalization into the recognition model's input layout.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{ArrayView4, ShapeError};
use thiserror::Error;

/// Square input resolution the embedding model was trained on.
pub const INPUT_SIZE: usize = 160;
const INPUT_CHANNELS: usize = 3;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_SCALE: f32 = 128.0; // FaceNet scaling, NOT 127.5

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("invalid image: {width}x{height} has a zero dimension")]
    InvalidImage { width: u32, height: u32 },
}

/// Preprocessed model input: NHWC `[1, 160, 160, 3]`, channel-interleaved RGB.
#[derive(Debug, Clone)]
pub struct FaceTensor {
    data: Vec<f32>,
}

impl FaceTensor {
    /// Number of scalars in a tensor (`160 * 160 * 3`).
    pub const LEN: usize = INPUT_SIZE * INPUT_SIZE * INPUT_CHANNELS;
    pub const SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS];

    /// Flat row-major values: `[r, g, b, r, g, b, ...]` pixel by pixel.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Shaped NHWC view for the inference runtime.
    pub fn view(&self) -> Result<ArrayView4<'_, f32>, ShapeError> {
        ArrayView4::from_shape(Self::SHAPE, &self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Resize `image` to 160x160 and map every channel byte through
/// `(v - 127.5) / 128.0`.
pub fn prepare(image: &RgbImage) -> Result<FaceTensor, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::InvalidImage { width, height });
    }

    let size = INPUT_SIZE as u32;
    if width < size || height < size {
        tracing::debug!(width, height, "upscaling image below model input size");
    }

    // Bilinear, matching the filtered scaling the model was fed in training.
    let resized = if (width, height) == (size, size) {
        image.clone()
    } else {
        imageops::resize(image, size, size, FilterType::Triangle)
    };

    // The raw RGB buffer is already row-major and channel-interleaved.
    let data: Vec<f32> = resized.as_raw().iter().map(|&v| normalize(v)).collect();
    debug_assert_eq!(data.len(), FaceTensor::LEN);

    Ok(FaceTensor { data })
}

fn normalize(value: u8) -> f32 {
    (value as f32 - PIXEL_MEAN) / PIXEL_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    // (0 - 127.5) / 128 and (255 - 127.5) / 128
    const LOWER: f32 = -0.99609375;
    const UPPER: f32 = 0.99609375;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_prepare_output_length() {
        for (w, h) in [(160, 160), (640, 480), (161, 999), (32, 20), (1, 1)] {
            let tensor = prepare(&gradient(w, h)).unwrap();
            assert_eq!(tensor.len(), FaceTensor::LEN, "{w}x{h}");
            assert_eq!(tensor.as_slice().len(), 160 * 160 * 3);
            assert_eq!(tensor.view().unwrap().shape(), &FaceTensor::SHAPE);
        }
    }

    #[test]
    fn test_prepare_values_within_bound() {
        let tensor = prepare(&gradient(400, 300)).unwrap();
        for &v in tensor.as_slice() {
            assert!((-1.00391..=1.00391).contains(&v), "value {v} out of range");
        }
    }

    #[test]
    fn test_normalization_extremes() {
        assert_eq!(normalize(0), LOWER);
        assert_eq!(normalize(255), UPPER);
        // 128 - 127.5 = 0.5, / 128 = 0.00390625
        assert_eq!(normalize(128), 0.00390625);
    }

    #[test]
    fn test_prepare_channel_interleaved_row_major() {
        // Native size skips resampling, so every pixel maps 1:1.
        let img = RgbImage::from_fn(160, 160, |x, y| {
            if (x, y) == (2, 1) {
                Rgb([255, 0, 128])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let flat = prepare(&img).unwrap();
        let flat = flat.as_slice();
        let base = (160 + 2) * 3;
        assert_eq!(flat[base], UPPER);
        assert_eq!(flat[base + 1], LOWER);
        assert_eq!(flat[base + 2], 0.00390625);
        assert_eq!(flat[0], LOWER);
    }

    #[test]
    fn test_prepare_uniform_image_stays_uniform() {
        let img = RgbImage::from_pixel(480, 640, Rgb([200, 100, 50]));
        let tensor = prepare(&img).unwrap();
        for px in tensor.as_slice().chunks_exact(3) {
            assert_eq!(px, &[normalize(200), normalize(100), normalize(50)]);
        }
    }

    #[test]
    fn test_prepare_rejects_zero_dimension() {
        assert_eq!(
            prepare(&RgbImage::new(0, 10)).unwrap_err(),
            PreprocessError::InvalidImage { width: 0, height: 10 }
        );
        assert!(prepare(&RgbImage::new(10, 0)).is_err());
        assert!(prepare(&RgbImage::new(0, 0)).is_err());
    }
}
