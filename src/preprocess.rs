//! Decoding and sanity checks applied to uploads before they reach the model.

use image::imageops::{self, FilterType};
use ndarray::{Array3, ArrayView3, Axis};
use thiserror::Error;

pub const MSG_NOT_COLOR: &str = "Invalid image format. Please upload a color image.";
pub const MSG_TOO_DARK: &str = "Image is too dark. Please upload a clearer photo of a potato leaf.";
pub const MSG_TOO_BRIGHT: &str = "Image is too bright/overexposed. Please upload a clearer photo.";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("decoded buffer has unexpected shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Reason a decoded image was judged implausible as a leaf photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{}", MSG_NOT_COLOR)]
    NotColor,
    #[error("{}", MSG_TOO_DARK)]
    TooDark,
    #[error("{}", MSG_TOO_BRIGHT)]
    TooBright,
}

/// Mean pixel intensity bounds an upload must fall within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessRange {
    pub min: f32,
    pub max: f32,
}

impl Default for BrightnessRange {
    fn default() -> Self {
        Self {
            min: 30.0,
            max: 240.0,
        }
    }
}

/// Square RGB image laid out as `[height, width, channel]`.
#[derive(Debug, Clone)]
pub struct LeafImage {
    pixels: Array3<u8>,
}

impl LeafImage {
    pub fn from_pixels(pixels: Array3<u8>) -> Self {
        Self { pixels }
    }

    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub fn size(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn channels(&self) -> usize {
        self.pixels.shape()[2]
    }

    /// Per-channel mean intensity.
    pub fn channel_means(&self) -> Vec<f32> {
        self.pixels
            .axis_iter(Axis(2))
            .map(|channel| {
                let count = channel.len().max(1) as f64;
                let sum: f64 = channel.iter().map(|&v| f64::from(v)).sum();
                (sum / count) as f32
            })
            .collect()
    }

    pub fn brightness(&self) -> f32 {
        let means = self.channel_means();
        debug_assert!(!means.is_empty(), "brightness of an image with no channels");
        means.iter().sum::<f32>() / means.len() as f32
    }
}

/// Decodes an upload of any supported format into a `size` x `size` RGB image.
/// Alpha is dropped and grayscale is expanded.
pub fn read_file_as_image(data: &[u8], size: u32) -> Result<LeafImage, ImageError> {
    let decoded = image::load_from_memory(data)?;
    let rgb = decoded.to_rgb8();
    let resized = imageops::resize(&rgb, size, size, FilterType::CatmullRom);

    let side = size as usize;
    let pixels = Array3::from_shape_vec((side, side, 3), resized.into_raw())?;
    Ok(LeafImage::from_pixels(pixels))
}

pub fn validate_leaf_image(image: &LeafImage, range: &BrightnessRange) -> Result<(), Rejection> {
    if image.channels() != 3 {
        return Err(Rejection::NotColor);
    }

    let brightness = image.brightness();
    if brightness < range.min {
        return Err(Rejection::TooDark);
    }
    if brightness > range.max {
        return Err(Rejection::TooBright);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn solid(rgb: [u8; 3]) -> LeafImage {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb(rgb))));
        read_file_as_image(&bytes, 16).unwrap()
    }

    #[test]
    fn resizes_to_square() {
        let bytes = encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            40,
            10,
            Rgb([90, 140, 60]),
        )));
        let image = read_file_as_image(&bytes, 32).unwrap();
        assert_eq!(image.pixels().shape(), &[32, 32, 3]);
    }

    #[test]
    fn rgba_and_grayscale_become_rgb() {
        let rgba = encode(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            8,
            Rgba([10, 200, 30, 128]),
        )));
        let image = read_file_as_image(&rgba, 8).unwrap();
        assert_eq!(image.channels(), 3);
        assert_eq!(image.pixels()[[0, 0, 1]], 200);

        let gray = encode(DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([77]))));
        let image = read_file_as_image(&gray, 8).unwrap();
        assert_eq!(image.channels(), 3);
        assert_eq!(image.channel_means(), vec![77.0, 77.0, 77.0]);
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        assert!(matches!(
            read_file_as_image(b"definitely not a png", 8),
            Err(ImageError::Decode(_))
        ));
        assert!(read_file_as_image(&[], 8).is_err());
    }

    #[test]
    fn brightness_is_mean_of_channel_means() {
        let image = solid([30, 60, 90]);
        assert_eq!(image.channel_means(), vec![30.0, 60.0, 90.0]);
        assert_eq!(image.brightness(), 60.0);
    }

    #[test]
    fn brightness_gate() {
        let range = BrightnessRange::default();
        assert_eq!(validate_leaf_image(&solid([0, 0, 0]), &range), Err(Rejection::TooDark));
        assert_eq!(
            validate_leaf_image(&solid([255, 255, 255]), &range),
            Err(Rejection::TooBright)
        );
        assert_eq!(validate_leaf_image(&solid([80, 140, 50]), &range), Ok(()));
        // bounds are inclusive
        assert_eq!(validate_leaf_image(&solid([30, 30, 30]), &range), Ok(()));
        assert_eq!(validate_leaf_image(&solid([240, 240, 240]), &range), Ok(()));
    }

    #[test]
    fn non_rgb_array_is_rejected() {
        let image = LeafImage::from_pixels(Array3::from_elem((4, 4, 4), 120));
        assert_eq!(
            validate_leaf_image(&image, &BrightnessRange::default()),
            Err(Rejection::NotColor)
        );
    }

    #[test]
    fn channelless_array_fails_format_check_first() {
        let image = LeafImage::from_pixels(Array3::from_elem((2, 2, 0), 0));
        assert_eq!(
            validate_leaf_image(&image, &BrightnessRange::default()),
            Err(Rejection::NotColor)
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "no channels")]
    fn brightness_of_channelless_array_is_a_bug() {
        LeafImage::from_pixels(Array3::from_elem((2, 2, 0), 0)).brightness();
    }
}
