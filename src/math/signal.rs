//! Signal-processing helpers: FFT, DCT, windows and triangular filter banks.

use std::f64::consts::PI;

use crate::error::ForgeResult;
use crate::invalid_argument;

/// Magnitudes of the discrete Fourier transform of a power-of-two length signal
pub fn fft_magnitude(signal: &[f64]) -> ForgeResult<Vec<f64>> {
    let n = signal.len();
    if n == 0 || !n.is_power_of_two() {
        return Err(invalid_argument!("FFT length must be a power of two, got {}", n));
    }

    let bits = n.trailing_zeros();
    let mut re = vec![0.0; n];
    let mut im = vec![0.0; n];
    for (i, &x) in signal.iter().enumerate() {
        let j = if bits == 0 {
            0
        } else {
            i.reverse_bits() >> (usize::BITS - bits)
        };
        re[j] = x;
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        for start in (0..n).step_by(len) {
            for k in 0..len / 2 {
                let (w_im, w_re) = (angle * k as f64).sin_cos();
                let a = start + k;
                let b = a + len / 2;
                let t_re = w_re * re[b] - w_im * im[b];
                let t_im = w_re * im[b] + w_im * re[b];
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
            }
        }
        len <<= 1;
    }

    Ok(re.iter().zip(&im).map(|(r, i)| r.hypot(*i)).collect())
}

/// Orthonormal DCT-II basis, `num_filters x window_size`, row-major
pub fn dct_matrix(num_filters: usize, window_size: usize) -> Vec<f64> {
    let n = window_size as f64;
    let mut matrix = Vec::with_capacity(num_filters * window_size);
    for k in 0..num_filters {
        let scale = if k == 0 {
            (1.0 / n).sqrt()
        } else {
            (2.0 / n).sqrt()
        };
        for i in 0..window_size {
            matrix.push(scale * (PI / n * (i as f64 + 0.5) * k as f64).cos());
        }
    }
    matrix
}

/// Symmetric Hamming window
pub fn hamming_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    let denominator = (size - 1) as f64;
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denominator).cos())
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

/// Frequency scale of a filter bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScale {
    Linear,
    Mel,
}

/// Triangular filters over `window_size` spectrum bins covering
/// `[0, sample_rate / 2]`, evenly spaced on `scale`. Row `i` holds the
/// weights of filter `i`.
pub fn triangular_filter_bank(
    scale: FilterScale,
    window_size: usize,
    sample_rate: f64,
    num_filters: usize,
) -> ForgeResult<Vec<Vec<f64>>> {
    if window_size == 0 || num_filters == 0 {
        return Err(invalid_argument!(
            "filter bank needs a non-empty window and at least one filter"
        ));
    }
    if !(sample_rate > 0.0) {
        return Err(invalid_argument!("sample rate must be positive, got {}", sample_rate));
    }

    let nyquist = sample_rate / 2.0;
    let (low, high) = match scale {
        FilterScale::Linear => (0.0, nyquist),
        FilterScale::Mel => (hz_to_mel(0.0), hz_to_mel(nyquist)),
    };
    let bin_hz = nyquist / window_size as f64;
    let edges: Vec<f64> = (0..num_filters + 2)
        .map(|i| low + (high - low) * i as f64 / (num_filters + 1) as f64)
        .map(|p| match scale {
            FilterScale::Linear => p,
            FilterScale::Mel => mel_to_hz(p),
        })
        .collect();

    Ok((0..num_filters)
        .map(|f| {
            let (left, center, right) = (edges[f], edges[f + 1], edges[f + 2]);
            (0..window_size)
                .map(|bin| {
                    let hz = bin as f64 * bin_hz;
                    if hz <= left || hz >= right {
                        0.0
                    } else if hz <= center {
                        (hz - left) / (center - left)
                    } else {
                        (right - hz) / (right - center)
                    }
                })
                .collect()
        })
        .collect())
}
