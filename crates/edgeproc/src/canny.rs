use image::GrayImage;

use crate::ProcessError;

const BLUR_RADIUS: usize = 2;
const BLUR_SIGMA: f32 = 1.5;

/// Hysteresis thresholds applied to the L1 gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CannyThresholds {
    pub low: u32,
    pub high: u32,
}

impl CannyThresholds {
    pub fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    pub(crate) fn validate(&self) -> Result<(), ProcessError> {
        if self.low > self.high {
            return Err(ProcessError::InvalidThresholds {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

impl Default for CannyThresholds {
    fn default() -> Self {
        Self::new(50, 150)
    }
}

/// Returns one flag per pixel, row-major, `true` where an edge survived hysteresis.
pub(crate) fn detect(gray: &GrayImage, thresholds: CannyThresholds) -> Vec<bool> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let luma: Vec<f32> = gray.as_raw().iter().map(|&value| value as f32).collect();
    let blurred = gaussian_blur(&luma, width, height);
    let (magnitude, direction) = sobel(&blurred, width, height);
    let thin = suppress_non_maxima(&magnitude, &direction, width, height);
    hysteresis(&thin, width, height, thresholds)
}

fn gaussian_kernel() -> [f32; 2 * BLUR_RADIUS + 1] {
    let mut kernel = [0.0; 2 * BLUR_RADIUS + 1];
    let denominator = 2.0 * BLUR_SIGMA * BLUR_SIGMA;
    for (index, weight) in kernel.iter_mut().enumerate() {
        let offset = index as f32 - BLUR_RADIUS as f32;
        *weight = (-(offset * offset) / denominator).exp();
    }
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Separable blur with edge clamping.
fn gaussian_blur(source: &[f32], width: usize, height: usize) -> Vec<f32> {
    let kernel = gaussian_kernel();
    let mut horizontal = vec![0.0; source.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp_index(x as isize + k as isize - BLUR_RADIUS as isize, width);
                acc += source[y * width + sx] * weight;
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut output = vec![0.0; source.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp_index(y as isize + k as isize - BLUR_RADIUS as isize, height);
                acc += horizontal[sy * width + x] * weight;
            }
            output[y * width + x] = acc;
        }
    }
    output
}

/// Gradient direction quantised to the four neighbour axes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
    Diagonal,
    AntiDiagonal,
}

fn sobel(source: &[f32], width: usize, height: usize) -> (Vec<f32>, Vec<Axis>) {
    let sample = |x: isize, y: isize| -> f32 {
        source[clamp_index(y, height) * width + clamp_index(x, width)]
    };

    let mut magnitude = vec![0.0; source.len()];
    let mut direction = vec![Axis::Horizontal; source.len()];
    for py in 0..height {
        for px in 0..width {
            let x = px as isize;
            let y = py as isize;
            let tl = sample(x - 1, y - 1);
            let tm = sample(x, y - 1);
            let tr = sample(x + 1, y - 1);
            let ml = sample(x - 1, y);
            let mr = sample(x + 1, y);
            let bl = sample(x - 1, y + 1);
            let bm = sample(x, y + 1);
            let br = sample(x + 1, y + 1);

            let gx = -tl - 2.0 * ml - bl + tr + 2.0 * mr + br;
            let gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
            let index = py * width + px;
            magnitude[index] = gx.abs() + gy.abs();
            direction[index] = quantise(gx, gy);
        }
    }
    (magnitude, direction)
}

fn quantise(gx: f32, gy: f32) -> Axis {
    // tan(22.5deg) and tan(67.5deg)
    const TAN_LOW: f32 = 0.414_213_56;
    const TAN_HIGH: f32 = 2.414_213_6;
    let ax = gx.abs();
    let ay = gy.abs();
    if ay <= ax * TAN_LOW {
        Axis::Horizontal
    } else if ay >= ax * TAN_HIGH {
        Axis::Vertical
    } else if (gx > 0.0) == (gy > 0.0) {
        Axis::Diagonal
    } else {
        Axis::AntiDiagonal
    }
}

fn suppress_non_maxima(magnitude: &[f32], direction: &[Axis], width: usize, height: usize) -> Vec<f32> {
    let at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0.0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    let mut output = vec![0.0; magnitude.len()];
    for py in 0..height {
        for px in 0..width {
            let index = py * width + px;
            let value = magnitude[index];
            if value <= 0.0 {
                continue;
            }
            let (x, y) = (px as isize, py as isize);
            let (before, after) = match direction[index] {
                Axis::Horizontal => (at(x - 1, y), at(x + 1, y)),
                Axis::Vertical => (at(x, y - 1), at(x, y + 1)),
                Axis::Diagonal => (at(x - 1, y - 1), at(x + 1, y + 1)),
                Axis::AntiDiagonal => (at(x + 1, y - 1), at(x - 1, y + 1)),
            };
            // Ties resolve towards the earlier neighbour so plateaus stay one pixel wide.
            if value > before && value >= after {
                output[index] = value;
            }
        }
    }
    output
}

fn hysteresis(magnitude: &[f32], width: usize, height: usize, thresholds: CannyThresholds) -> Vec<bool> {
    let low = thresholds.low as f32;
    let high = thresholds.high as f32;
    let mut edges = vec![false; magnitude.len()];
    let mut stack = Vec::new();

    for (index, &value) in magnitude.iter().enumerate() {
        if value > high && !edges[index] {
            edges[index] = true;
            stack.push(index);
            while let Some(current) = stack.pop() {
                let cx = (current % width) as isize;
                let cy = (current / width) as isize;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let nx = cx + dx;
                        let ny = cy + dy;
                        if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                            continue;
                        }
                        let neighbour = ny as usize * width + nx as usize;
                        if !edges[neighbour] && magnitude[neighbour] > low {
                            edges[neighbour] = true;
                            stack.push(neighbour);
                        }
                    }
                }
            }
        }
    }
    edges
}

fn clamp_index(value: isize, len: usize) -> usize {
    value.clamp(0, len as isize - 1) as usize
}
