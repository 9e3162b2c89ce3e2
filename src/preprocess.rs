use image::{imageops, imageops::FilterType};
use ndarray::Array4;

use crate::errors::PredictError;

/// Spatial size the classifier was trained on. A mismatch is not detected at
/// runtime, it only degrades predictions.
pub const INPUT_SIZE: u32 = 222;

/// Decodes an uploaded image into a `[1, 222, 222, 3]` tensor in `[0, 1]`.
///
/// The image is stretched to the square input (no letterboxing) with a
/// bicubic filter, channels last.
pub fn preprocess(bytes: &[u8]) -> Result<Array4<f32>, PredictError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let size = INPUT_SIZE as usize;
    let tensor = Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
        let pixel = resized.get_pixel(x as u32, y as u32);
        pixel[c] as f32 / 255.0
    });
    Ok(tensor)
}
