//! Tensor kernels for convolution, pooling, softmax and region detection.
//!
//! Tensors are row-major `(rows, columns, channels)`, channels innermost.
//! Padding is implicit: coordinates outside the input read as zero.

use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeResult, GraphForgeError};
use crate::graph::TensorShape;
use crate::invalid_argument;
use crate::math::Real;

pub fn softmax<T: Real>(values: &[T]) -> Vec<T> {
    let max = match crate::math::linalg::max(values) {
        Some(m) => m,
        None => return Vec::new(),
    };
    let exps: Vec<T> = values.iter().map(|&v| (v - max).exp()).collect();
    let total = crate::math::linalg::sum(&exps);
    exps.into_iter().map(|e| e / total).collect()
}

/// Output extent of a sliding window along one dimension
fn window_output(input: usize, window: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = padding.checked_mul(2)?.checked_add(input)?;
    if stride == 0 || window == 0 || window > padded {
        None
    } else {
        Some((padded - window) / stride + 1)
    }
}

/// Geometry of a spatial sliding window (convolution or pooling)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub input_shape: TensorShape,
    pub output_shape: TensorShape,
    pub window: usize,
    pub stride: usize,
    pub padding: usize,
}

impl WindowGeometry {
    /// Derive the output shape; `output_channels` is the filter count for
    /// convolutions and the input channel count for pooling.
    pub fn new(
        input_shape: TensorShape,
        window: usize,
        stride: usize,
        padding: usize,
        output_channels: usize,
    ) -> ForgeResult<Self> {
        let rows = window_output(input_shape.rows, window, stride, padding);
        let columns = window_output(input_shape.columns, window, stride, padding);
        match (rows, columns) {
            (Some(rows), Some(columns)) => Ok(Self {
                input_shape,
                output_shape: TensorShape::new(rows, columns, output_channels),
                window,
                stride,
                padding,
            }),
            _ => Err(invalid_argument!(
                "window {} stride {} padding {} does not fit input {}",
                window,
                stride,
                padding,
                input_shape
            )),
        }
    }

    /// Input coordinate for output position `out` and window offset `k`
    fn input_index(&self, out: usize, k: usize, limit: usize) -> Option<usize> {
        (out * self.stride + k)
            .checked_sub(self.padding)
            .filter(|&i| i < limit)
    }
}

/// Filters are laid out `[filter][row][column][input channel]`.
pub fn convolve<T: Real>(
    geometry: &WindowGeometry,
    input: &[T],
    filters: &[T],
    binarize_input: bool,
) -> Vec<T> {
    let in_shape = geometry.input_shape;
    let out_shape = geometry.output_shape;
    let fs = geometry.window;
    let channels = in_shape.channels;
    let filter_volume = fs * fs * channels;
    let mut output = vec![T::zero(); out_shape.size()];

    for r in 0..out_shape.rows {
        for c in 0..out_shape.columns {
            for f in 0..out_shape.channels {
                let filter = &filters[f * filter_volume..(f + 1) * filter_volume];
                let mut sum = T::zero();
                for i in 0..fs {
                    let Some(ir) = geometry.input_index(r, i, in_shape.rows) else {
                        continue;
                    };
                    for j in 0..fs {
                        let Some(ic) = geometry.input_index(c, j, in_shape.columns) else {
                            continue;
                        };
                        for ch in 0..channels {
                            let mut x = input[in_shape.offset(ir, ic, ch)];
                            if binarize_input {
                                x = if x >= T::zero() { T::one() } else { -T::one() };
                            }
                            sum += filter[(i * fs + j) * channels + ch] * x;
                        }
                    }
                }
                output[out_shape.offset(r, c, f)] = sum;
            }
        }
    }
    output
}

/// Replace each filter by `sign(w) * mean(|w|)` over that filter
pub fn binarize_filters(filters: &[f64], filter_volume: usize) -> Vec<f64> {
    filters
        .chunks(filter_volume.max(1))
        .flat_map(|filter| {
            let scale = filter.iter().map(|w| w.abs()).sum::<f64>() / filter.len() as f64;
            filter
                .iter()
                .map(move |&w| if w >= 0.0 { scale } else { -scale })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingType {
    Max,
    Mean,
}

impl PoolingType {
    pub fn name(&self) -> &'static str {
        match self {
            PoolingType::Max => "max",
            PoolingType::Mean => "mean",
        }
    }
}

impl fmt::Display for PoolingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PoolingType {
    type Err = GraphForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "max" => Ok(PoolingType::Max),
            "mean" | "average" => Ok(PoolingType::Mean),
            other => Err(GraphForgeError::arg_parse("pooling", other, "expected max or mean")),
        }
    }
}

/// Max pooling ignores padding; mean pooling divides by the full window area
pub fn pool<T: Real>(geometry: &WindowGeometry, pooling: PoolingType, input: &[T]) -> Vec<T> {
    let in_shape = geometry.input_shape;
    let out_shape = geometry.output_shape;
    let area = T::from_f64((geometry.window * geometry.window) as f64);
    let mut output = vec![T::zero(); out_shape.size()];

    for r in 0..out_shape.rows {
        for c in 0..out_shape.columns {
            for ch in 0..out_shape.channels {
                let mut best: Option<T> = None;
                let mut sum = T::zero();
                for i in 0..geometry.window {
                    let Some(ir) = geometry.input_index(r, i, in_shape.rows) else {
                        continue;
                    };
                    for j in 0..geometry.window {
                        let Some(ic) = geometry.input_index(c, j, in_shape.columns) else {
                            continue;
                        };
                        let x = input[in_shape.offset(ir, ic, ch)];
                        sum += x;
                        best = Some(best.map_or(x, |b| b.max(x)));
                    }
                }
                output[out_shape.offset(r, c, ch)] = match pooling {
                    PoolingType::Max => best.unwrap_or_else(T::zero),
                    PoolingType::Mean => sum / area,
                };
            }
        }
    }
    output
}

/// Grid geometry of a region-detection output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDetectionParameters {
    pub width: usize,
    pub height: usize,
    pub num_boxes_per_cell: usize,
    pub num_classes: usize,
    pub num_coordinates: usize,
}

impl RegionDetectionParameters {
    /// Channels per box: coordinates, objectness, class scores
    pub fn box_size(&self) -> usize {
        self.num_coordinates
            .saturating_add(1)
            .saturating_add(self.num_classes)
    }

    pub fn shape(&self) -> TensorShape {
        TensorShape::new(
            self.height,
            self.width,
            self.num_boxes_per_cell.saturating_mul(self.box_size()),
        )
    }
}

/// Sigmoid on box centers and objectness, exp on box sizes, softmax over
/// class scores
pub fn region_detection<T: Real>(params: &RegionDetectionParameters, input: &[T]) -> Vec<T> {
    let sigmoid = |x: T| T::one() / (T::one() + (-x).exp());
    let mut output = input.to_vec();
    let box_size = params.box_size();
    for cell in output.chunks_mut(params.num_boxes_per_cell * box_size) {
        for region in cell.chunks_mut(box_size) {
            for (k, value) in region.iter_mut().take(params.num_coordinates).enumerate() {
                *value = if k < 2 { sigmoid(*value) } else { value.exp() };
            }
            let objectness = params.num_coordinates;
            region[objectness] = sigmoid(region[objectness]);
            let classes = softmax(&region[objectness + 1..]);
            region[objectness + 1..].copy_from_slice(&classes);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_geometry() {
        let g = WindowGeometry::new(TensorShape::new(5, 5, 2), 3, 1, 1, 4).unwrap();
        assert_eq!(g.output_shape, TensorShape::new(5, 5, 4));
        let g = WindowGeometry::new(TensorShape::new(4, 4, 1), 2, 2, 0, 1).unwrap();
        assert_eq!(g.output_shape, TensorShape::new(2, 2, 1));
        assert!(WindowGeometry::new(TensorShape::new(2, 2, 1), 3, 1, 0, 1).is_err());
    }

    #[test]
    fn test_convolution_identity_filter() {
        let g = WindowGeometry::new(TensorShape::new(3, 3, 1), 3, 1, 1, 1).unwrap();
        let input: Vec<f64> = (1..=9).map(f64::from).collect();
        let mut filter = vec![0.0; 9];
        filter[4] = 1.0;
        assert_eq!(convolve(&g, &input, &filter, false), input);
    }

    #[test]
    fn test_convolution_sums_with_zero_padding() {
        let g = WindowGeometry::new(TensorShape::new(2, 2, 1), 3, 1, 1, 1).unwrap();
        let input = [1.0f32, 2.0, 3.0, 4.0];
        let output = convolve(&g, &input, &[1.0; 9], false);
        assert_eq!(output, vec![10.0; 4]);
        let binary = convolve(&g, &[-1.0f32, 2.0, 3.0, -4.0], &[1.0; 9], true);
        assert_eq!(binary, vec![0.0; 4]);
    }

    #[test]
    fn test_binarize_filters() {
        let filters = binarize_filters(&[1.0, -3.0, 2.0, 2.0], 2);
        assert_eq!(filters, vec![2.0, -2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_pooling() {
        let g = WindowGeometry::new(TensorShape::new(2, 2, 1), 2, 2, 0, 1).unwrap();
        let input = [1.0f64, 5.0, -3.0, 2.0];
        assert_eq!(pool(&g, PoolingType::Max, &input), vec![5.0]);
        assert_eq!(pool(&g, PoolingType::Mean, &input), vec![1.25]);
    }

    #[test]
    fn test_region_detection_normalizes_classes() {
        let params = RegionDetectionParameters {
            width: 1,
            height: 1,
            num_boxes_per_cell: 1,
            num_classes: 2,
            num_coordinates: 4,
        };
        let out = region_detection(&params, &[0.0f64, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(&out[..5], &[0.5, 0.5, 1.0, 1.0, 0.5]);
        assert!((out[5] - 0.5).abs() < 1e-12);
    }
}
