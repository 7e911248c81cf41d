//! Naive dot-product kernel over a flattened output range.

use std::ops::Range;

use crate::Matrix;

/// Computes `A x B` for the flattened output indices in `elements`.
///
/// `out[idx - elements.start]` receives element `(idx / n, idx % n)` where `n`
/// is `b.cols()`. Each element is accumulated from `0.0` over increasing `k`,
/// so the result does not depend on how the index space was split.
///
/// # Panics
///
/// Panics if `out.len() != elements.len()`, if `a.cols() != b.rows()` or if
/// `elements` reaches past `a.rows() * b.cols()`.
pub fn multiply_range(a: &Matrix, b: &Matrix, elements: Range<usize>, out: &mut [f64]) {
    assert_eq!(out.len(), elements.len(), "output slice does not match range");
    assert_eq!(a.cols(), b.rows(), "inner dimensions differ");
    let n = b.cols();
    assert!(elements.end <= a.rows() * n, "range exceeds output size");

    let inner = a.cols();
    let a_data = a.as_slice();
    let b_data = b.as_slice();
    for (slot, idx) in out.iter_mut().zip(elements) {
        let (i, j) = (idx / n, idx % n);
        let a_row = &a_data[i * inner..(i + 1) * inner];
        let mut sum = 0.0;
        for (k, a_ik) in a_row.iter().enumerate() {
            sum += a_ik * b_data[k * n + j];
        }
        *slot = sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Matrix, Matrix) {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]]).unwrap();
        (a, b)
    }

    #[test]
    fn full_range_matches_textbook_product() {
        let (a, b) = sample();
        let mut out = vec![0.0; 4];
        multiply_range(&a, &b, 0..4, &mut out);
        assert_eq!(out, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn partial_range_writes_only_its_elements() {
        let (a, b) = sample();
        let mut out = vec![0.0; 2];
        multiply_range(&a, &b, 1..3, &mut out);
        assert_eq!(out, vec![22.0, 43.0]);
    }

    #[test]
    fn rectangular_shapes() {
        let a = Matrix::from_rows(vec![vec![1.0, 0.0, 2.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let mut out = vec![0.0; 2];
        multiply_range(&a, &b, 0..2, &mut out);
        assert_eq!(out, vec![11.0, 14.0]);
    }

    #[test]
    #[should_panic(expected = "range exceeds output size")]
    fn range_past_the_end_panics() {
        let (a, b) = sample();
        let mut out = vec![0.0; 2];
        multiply_range(&a, &b, 3..5, &mut out);
    }
}
