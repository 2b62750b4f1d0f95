//! Strided linear algebra and reductions.

use super::Real;

/// `y = A x` for a row-major `rows x columns` matrix with leading dimension
/// `row_stride`, reading every `increment`-th element of `x`.
pub fn matrix_vector_multiply<T: Real>(
    rows: usize,
    columns: usize,
    matrix: &[T],
    row_stride: usize,
    vector: &[T],
    increment: usize,
) -> Vec<T> {
    (0..rows)
        .map(|r| {
            let row = &matrix[r * row_stride..r * row_stride + columns];
            let mut sum = T::zero();
            for (c, &a) in row.iter().enumerate() {
                sum += a * vector[c * increment];
            }
            sum
        })
        .collect()
}

pub fn dot<T: Real>(a: &[T], b: &[T]) -> T {
    let mut sum = T::zero();
    for (&x, &y) in a.iter().zip(b) {
        sum += x * y;
    }
    sum
}

pub fn sum<T: Real>(values: &[T]) -> T {
    let mut total = T::zero();
    for &v in values {
        total += v;
    }
    total
}

/// Largest element; `None` for an empty slice
pub fn max<T: Real>(values: &[T]) -> Option<T> {
    values.iter().copied().reduce(|a, b| a.max(b))
}

pub fn mean<T: Real>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        None
    } else {
        Some(sum(values) / T::from_f64(values.len() as f64))
    }
}

/// Sum of squared differences
pub fn squared_distance<T: Real>(a: &[T], b: &[T]) -> T {
    let mut total = T::zero();
    for (&x, &y) in a.iter().zip(b) {
        let d = x - y;
        total += d * d;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_vector_multiply() {
        let matrix = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = matrix_vector_multiply(2, 3, &matrix, 3, &[1.0, 0.0, -1.0], 1);
        assert_eq!(y, vec![-2.0, -2.0]);
    }

    #[test]
    fn test_strided_access() {
        // 2x2 block of a 2x3 matrix, vector read with stride 2
        let matrix = [1.0f64, 2.0, 99.0, 3.0, 4.0, 99.0];
        let vector = [1.0, -7.0, 1.0];
        let y = matrix_vector_multiply(2, 2, &matrix, 3, &vector, 2);
        assert_eq!(y, vec![3.0, 7.0]);
    }

    #[test]
    fn test_reductions() {
        let values = [1.0f64, 5.0, -2.0];
        assert_eq!(sum(&values), 4.0);
        assert_eq!(max(&values), Some(5.0));
        assert_eq!(mean::<f64>(&[]), None);
        assert_eq!(dot(&values, &values), 30.0);
        assert_eq!(squared_distance(&[1.0f32, 1.0], &[0.0, 3.0]), 5.0);
    }
}
