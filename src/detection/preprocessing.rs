use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::open;

/// Convert image to single-channel intensity
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce sensor noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Binarize with Otsu's threshold. Pixels strictly above the level become
/// foreground (255). Returns the image and the level used.
pub fn binarize_otsu(img: &GrayImage) -> (GrayImage, u8) {
    let level = otsu_level(img);
    let binary = GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    (binary, level)
}

/// Morphological opening with a square structuring element of the given
/// radius (radius 1 is a 3x3 kernel)
pub fn remove_speckles(img: &GrayImage, radius: u8) -> GrayImage {
    open(img, Norm::LInf, radius)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}
