//! RGBA-in, RGBA-out image filters for the camera pipeline.
//!
//! Every entry point is synchronous and writes into a caller-owned output
//! buffer of the same dimensions as the input. Nothing is retained between
//! calls, so the functions are safe to call from whichever thread owns the
//! buffers.

mod canny;

use image::{imageops, RgbaImage};

pub use canny::CannyThresholds;

/// Version string reported to callers that want to log which filter library is loaded.
pub const LIBRARY_VERSION: &str = concat!("edgeproc ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("output buffer is {output_width}x{output_height} but input is {input_width}x{input_height}")]
    DimensionMismatch {
        input_width: u32,
        input_height: u32,
        output_width: u32,
        output_height: u32,
    },
    #[error("low threshold {low} exceeds high threshold {high}")]
    InvalidThresholds { low: u32, high: u32 },
}

/// Returns the library version, e.g. `edgeproc 0.1.0`.
pub fn library_version() -> &'static str {
    LIBRARY_VERSION
}

/// Canny edge detection: grayscale, 5x5 Gaussian (sigma 1.5), Sobel gradient,
/// non-maximum suppression and hysteresis. Edges are written as opaque white
/// on opaque black.
pub fn process_edge_detect(
    input: &RgbaImage,
    output: &mut RgbaImage,
    thresholds: CannyThresholds,
) -> Result<(), ProcessError> {
    check_dimensions(input, output)?;
    thresholds.validate()?;

    let gray = imageops::grayscale(input);
    let edges = canny::detect(&gray, thresholds);
    for (pixel, edge) in output.pixels_mut().zip(edges.iter()) {
        let value = if *edge { 255 } else { 0 };
        pixel.0 = [value, value, value, 255];
    }
    Ok(())
}

/// Luma conversion broadcast back to RGBA with an opaque alpha channel.
pub fn process_grayscale(input: &RgbaImage, output: &mut RgbaImage) -> Result<(), ProcessError> {
    check_dimensions(input, output)?;

    let gray = imageops::grayscale(input);
    for (pixel, luma) in output.pixels_mut().zip(gray.pixels()) {
        let value = luma.0[0];
        pixel.0 = [value, value, value, 255];
    }
    Ok(())
}

fn check_dimensions(input: &RgbaImage, output: &RgbaImage) -> Result<(), ProcessError> {
    if input.dimensions() != output.dimensions() {
        return Err(ProcessError::DimensionMismatch {
            input_width: input.width(),
            input_height: input.height(),
            output_width: output.width(),
            output_height: output.height(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn split_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn grayscale_uses_luma_and_opaque_alpha() {
        let input = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 10]));
        let mut output = RgbaImage::new(4, 2);
        process_grayscale(&input, &mut output).unwrap();
        let pixel = output.get_pixel(1, 1).0;
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
        assert!(pixel[0] > 0 && pixel[0] < 255);
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn edge_detect_marks_vertical_boundary() {
        let input = split_image(32, 16);
        let mut output = RgbaImage::new(32, 16);
        process_edge_detect(&input, &mut output, CannyThresholds::default()).unwrap();

        let row = 8;
        let edge_columns: Vec<u32> = (0..32)
            .filter(|&x| output.get_pixel(x, row).0[0] == 255)
            .collect();
        assert!(!edge_columns.is_empty(), "expected an edge on row {row}");
        assert!(edge_columns.iter().all(|&x| (13..=18).contains(&x)));
        assert_eq!(output.get_pixel(2, row).0, [0, 0, 0, 255]);
        assert_eq!(output.get_pixel(29, row).0, [0, 0, 0, 255]);
    }

    #[test]
    fn flat_image_has_no_edges() {
        let input = RgbaImage::from_pixel(16, 16, Rgba([90, 120, 30, 255]));
        let mut output = RgbaImage::new(16, 16);
        process_edge_detect(&input, &mut output, CannyThresholds::default()).unwrap();
        assert!(output.pixels().all(|pixel| pixel.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn rejects_mismatched_output() {
        let input = RgbaImage::new(8, 8);
        let mut output = RgbaImage::new(8, 4);
        let err = process_grayscale(&input, &mut output).unwrap_err();
        assert!(matches!(err, ProcessError::DimensionMismatch { output_height: 4, .. }));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let input = RgbaImage::new(8, 8);
        let mut output = RgbaImage::new(8, 8);
        let err = process_edge_detect(&input, &mut output, CannyThresholds::new(200, 100))
            .unwrap_err();
        assert_eq!(err, ProcessError::InvalidThresholds { low: 200, high: 100 });
    }

    #[test]
    fn version_names_the_library() {
        assert!(library_version().starts_with("edgeproc "));
    }
}
