//! Capture-format to RGBA conversion.
//!
//! YUV input is treated as full-range BT.601, which is what camera sensors
//! hand out for preview streams. Planes may carry row padding and, for the
//! chroma planes, a pixel stride larger than one; the last row of a plane is
//! allowed to stop right after its last sample.

use crate::buffers::PixelBuffer;
use crate::frame::{Frame, PixelFormat, Plane};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame has zero dimensions ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("{format:?} frames need {expected} planes, got {actual}")]
    PlaneCount {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("plane {plane} has row stride {row_stride} and pixel stride {pixel_stride}, too small for {samples} samples per row")]
    InvalidStride {
        plane: usize,
        row_stride: usize,
        pixel_stride: usize,
        samples: usize,
    },
    #[error("plane {plane} holds {actual} bytes but needs at least {required}")]
    PlaneTooSmall {
        plane: usize,
        required: usize,
        actual: usize,
    },
    #[error("target buffer is {target_width}x{target_height} but frame is {width}x{height}")]
    TargetMismatch {
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },
}

/// Geometry one plane must satisfy.
struct PlaneShape {
    columns: usize,
    rows: usize,
    /// Bytes read at each sample position.
    sample_bytes: usize,
}

fn plane_shapes(format: PixelFormat, width: usize, height: usize) -> Vec<PlaneShape> {
    let chroma_columns = width.div_ceil(2);
    let chroma_rows = height.div_ceil(2);
    match format {
        PixelFormat::Yuv420 => vec![
            PlaneShape { columns: width, rows: height, sample_bytes: 1 },
            PlaneShape { columns: chroma_columns, rows: chroma_rows, sample_bytes: 1 },
            PlaneShape { columns: chroma_columns, rows: chroma_rows, sample_bytes: 1 },
        ],
        PixelFormat::Nv12 => vec![
            PlaneShape { columns: width, rows: height, sample_bytes: 1 },
            PlaneShape { columns: chroma_columns, rows: chroma_rows, sample_bytes: 2 },
        ],
        PixelFormat::Rgba8 => vec![PlaneShape { columns: width, rows: height, sample_bytes: 4 }],
    }
}

/// Checks plane count, strides and plane lengths against the frame size.
pub fn validate(frame: &Frame) -> Result<(), FrameError> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(FrameError::Empty { width, height });
    }

    let format = frame.format();
    let planes = frame.planes();
    if planes.len() != format.plane_count() {
        return Err(FrameError::PlaneCount {
            format,
            expected: format.plane_count(),
            actual: planes.len(),
        });
    }

    let shapes = plane_shapes(format, width as usize, height as usize);
    for (index, (plane, shape)) in planes.iter().zip(shapes.iter()).enumerate() {
        let invalid_stride = || FrameError::InvalidStride {
            plane: index,
            row_stride: plane.row_stride,
            pixel_stride: plane.pixel_stride,
            samples: shape.columns,
        };
        let row_span = (shape.columns - 1)
            .checked_mul(plane.pixel_stride)
            .and_then(|span| span.checked_add(shape.sample_bytes))
            .ok_or_else(invalid_stride)?;
        if plane.pixel_stride < shape.sample_bytes || plane.row_stride < row_span {
            return Err(invalid_stride());
        }

        // A span that does not fit in usize can never fit in the plane either.
        let required = (shape.rows - 1)
            .checked_mul(plane.row_stride)
            .and_then(|offset| offset.checked_add(row_span))
            .unwrap_or(usize::MAX);
        if plane.data.len() < required {
            return Err(FrameError::PlaneTooSmall {
                plane: index,
                required,
                actual: plane.data.len(),
            });
        }
    }
    Ok(())
}

/// Converts `frame` into `target`, which must already have the frame's size.
pub fn to_rgba(frame: &Frame, target: &mut PixelBuffer) -> Result<(), FrameError> {
    validate(frame)?;
    if target.resolution() != frame.resolution() {
        return Err(FrameError::TargetMismatch {
            width: frame.width(),
            height: frame.height(),
            target_width: target.width(),
            target_height: target.height(),
        });
    }

    let planes = frame.planes();
    match frame.format() {
        PixelFormat::Yuv420 => convert_yuv(frame, target, |column, row| {
            (
                sample(&planes[1], column, row),
                sample(&planes[2], column, row),
            )
        }),
        PixelFormat::Nv12 => convert_yuv(frame, target, |column, row| {
            let offset = row * planes[1].row_stride + column * planes[1].pixel_stride;
            (planes[1].data[offset], planes[1].data[offset + 1])
        }),
        PixelFormat::Rgba8 => copy_rgba(&planes[0], target),
    }
    Ok(())
}

fn sample(plane: &Plane, column: usize, row: usize) -> u8 {
    plane.data[row * plane.row_stride + column * plane.pixel_stride]
}

fn convert_yuv<F>(frame: &Frame, target: &mut PixelBuffer, chroma: F)
where
    F: Fn(usize, usize) -> (u8, u8),
{
    let width = frame.width() as usize;
    let luma = &frame.planes()[0];
    for (row, pixels) in target.as_bytes_mut().chunks_exact_mut(width * 4).enumerate() {
        for (column, pixel) in pixels.chunks_exact_mut(4).enumerate() {
            let y = sample(luma, column, row);
            let (u, v) = chroma(column / 2, row / 2);
            pixel.copy_from_slice(&yuv_to_rgba(y, u, v));
        }
    }
}

fn copy_rgba(plane: &Plane, target: &mut PixelBuffer) {
    let row_bytes = target.width() as usize * 4;
    let pixel_stride = plane.pixel_stride;
    for (row, pixels) in target.as_bytes_mut().chunks_exact_mut(row_bytes).enumerate() {
        let start = row * plane.row_stride;
        if pixel_stride == 4 {
            pixels.copy_from_slice(&plane.data[start..start + row_bytes]);
            continue;
        }
        for (column, pixel) in pixels.chunks_exact_mut(4).enumerate() {
            let offset = start + column * pixel_stride;
            pixel.copy_from_slice(&plane.data[offset..offset + 4]);
        }
    }
}

/// Full-range BT.601 YCbCr to opaque RGBA.
pub fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [to_channel(r), to_channel(g), to_channel(b), 255]
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yuv420_frame(width: u32, height: u32, y: u8, u: u8, v: u8, padding: usize) -> Frame {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let luma_stride = w + padding;
        let chroma_stride = cw + padding;
        Frame::new(
            width,
            height,
            PixelFormat::Yuv420,
            vec![
                Plane::new(vec![y; luma_stride * h], luma_stride, 1),
                Plane::new(vec![u; chroma_stride * ch], chroma_stride, 1),
                Plane::new(vec![v; chroma_stride * ch], chroma_stride, 1),
            ],
        )
    }

    #[test]
    fn neutral_chroma_is_gray() {
        assert_eq!(yuv_to_rgba(128, 128, 128), [128, 128, 128, 255]);
        assert_eq!(yuv_to_rgba(0, 128, 128), [0, 0, 0, 255]);
        assert_eq!(yuv_to_rgba(255, 128, 128), [255, 255, 255, 255]);
    }

    #[test]
    fn strong_red_chroma_saturates_red() {
        let [r, g, b, a] = yuv_to_rgba(76, 85, 255);
        assert!(r >= 250, "red was {r}");
        assert!(g < 10, "green was {g}");
        assert!(b < 10, "blue was {b}");
        assert_eq!(a, 255);
    }

    #[test]
    fn converts_padded_yuv420() {
        let frame = yuv420_frame(6, 4, 128, 128, 128, 10);
        let mut target = PixelBuffer::new(6, 4);
        to_rgba(&frame, &mut target).unwrap();
        assert!(target.as_bytes().chunks(4).all(|pixel| pixel == [128, 128, 128, 255]));
    }

    #[test]
    fn nv12_matches_planar_conversion() {
        let (width, height) = (4u32, 2u32);
        let luma: Vec<u8> = (0..8).map(|value| value * 30).collect();
        let u = [90u8, 160];
        let v = [200u8, 40];

        let planar = Frame::new(
            width,
            height,
            PixelFormat::Yuv420,
            vec![
                Plane::new(luma.clone(), 4, 1),
                Plane::new(u.to_vec(), 2, 1),
                Plane::new(v.to_vec(), 2, 1),
            ],
        );
        let interleaved = Frame::new(
            width,
            height,
            PixelFormat::Nv12,
            vec![
                Plane::new(luma, 4, 1),
                Plane::new(vec![u[0], v[0], u[1], v[1]], 4, 2),
            ],
        );

        let mut planar_rgba = PixelBuffer::new(width, height);
        let mut interleaved_rgba = PixelBuffer::new(width, height);
        to_rgba(&planar, &mut planar_rgba).unwrap();
        to_rgba(&interleaved, &mut interleaved_rgba).unwrap();
        assert_eq!(planar_rgba, interleaved_rgba);
    }

    #[test]
    fn rgba_rows_skip_padding() {
        let mut data = vec![0u8; 2 * 12];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[12..20].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        let frame = Frame::new(2, 2, PixelFormat::Rgba8, vec![Plane::new(data, 12, 4)]);
        let mut target = PixelBuffer::new(2, 2);
        to_rgba(&frame, &mut target).unwrap();
        assert_eq!(target.as_bytes(), (1..=16).collect::<Vec<u8>>().as_slice());
    }

    #[test]
    fn last_row_may_omit_padding() {
        let mut frame = yuv420_frame(4, 2, 10, 128, 128, 4);
        let planes: Vec<Plane> = frame
            .planes()
            .iter()
            .map(|plane| {
                let mut data = plane.data.clone();
                data.truncate(data.len() - 4);
                Plane::new(data, plane.row_stride, plane.pixel_stride)
            })
            .collect();
        frame = Frame::new(4, 2, PixelFormat::Yuv420, planes);
        assert_eq!(validate(&frame), Ok(()));
    }

    #[test]
    fn rejects_short_chroma_plane() {
        let frame = Frame::new(
            4,
            4,
            PixelFormat::Yuv420,
            vec![
                Plane::new(vec![0; 16], 4, 1),
                Plane::new(vec![0; 4], 2, 1),
                Plane::new(vec![0; 3], 2, 1),
            ],
        );
        assert_eq!(
            validate(&frame),
            Err(FrameError::PlaneTooSmall { plane: 2, required: 4, actual: 3 })
        );
    }

    #[test]
    fn rejects_wrong_plane_count_and_empty_frames() {
        let frame = Frame::new(2, 2, PixelFormat::Nv12, vec![Plane::new(vec![0; 4], 2, 1)]);
        assert!(matches!(validate(&frame), Err(FrameError::PlaneCount { expected: 2, actual: 1, .. })));

        let empty = Frame::new(0, 4, PixelFormat::Rgba8, Vec::new());
        assert_eq!(validate(&empty), Err(FrameError::Empty { width: 0, height: 4 }));
    }

    #[test]
    fn rejects_overlapping_rows() {
        let frame = Frame::new(4, 1, PixelFormat::Rgba8, vec![Plane::new(vec![0; 16], 8, 4)]);
        assert!(matches!(validate(&frame), Err(FrameError::InvalidStride { plane: 0, .. })));
    }

    #[test]
    fn huge_strides_are_rejected_not_overflowed() {
        let rows = Frame::new(
            2,
            2,
            PixelFormat::Rgba8,
            vec![Plane::new(vec![0; 16], usize::MAX - 2, 4)],
        );
        assert_eq!(
            validate(&rows),
            Err(FrameError::PlaneTooSmall { plane: 0, required: usize::MAX, actual: 16 })
        );

        let pixels = Frame::new(
            3,
            1,
            PixelFormat::Rgba8,
            vec![Plane::new(vec![0; 16], 16, usize::MAX / 2 + 1)],
        );
        assert!(matches!(validate(&pixels), Err(FrameError::InvalidStride { plane: 0, .. })));

        let mut target = PixelBuffer::new(2, 2);
        assert!(to_rgba(&rows, &mut target).is_err());
    }

    #[test]
    fn rejects_target_of_other_size() {
        let frame = yuv420_frame(4, 4, 0, 128, 128, 0);
        let mut target = PixelBuffer::new(2, 2);
        assert!(matches!(
            to_rgba(&frame, &mut target),
            Err(FrameError::TargetMismatch { target_width: 2, .. })
        ));
    }
}
