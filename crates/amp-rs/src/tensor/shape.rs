//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use serde::{Deserialize, Serialize};

/// Stores the logical dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty, ensuring every tensor has at least one axis.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape { dims }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major (C-order) strides for a densely packed layout, in elements.
    pub fn row_major_strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }

    /// Returns the shape with its axis order reversed (full transpose).
    pub fn reversed(&self) -> Shape {
        let mut dims = self.dims.clone();
        dims.reverse();
        Shape { dims }
    }
}

/// Enumerates element offsets in logical (row-major index) order for a
/// buffer addressed through the given strides.
///
/// For a densely packed layout this is just `0..n`; a transposed view yields
/// the gather order that materializes the permutation.
pub(crate) fn offsets_in_logical_order(dims: &[usize], strides: &[usize]) -> Vec<usize> {
    debug_assert_eq!(dims.len(), strides.len());
    let total: usize = dims.iter().product();
    let mut offsets = Vec::with_capacity(total);
    if total == 0 {
        return offsets;
    }
    let mut index = vec![0usize; dims.len()];
    loop {
        let offset = index
            .iter()
            .zip(strides.iter())
            .map(|(i, s)| i * s)
            .sum::<usize>();
        offsets.push(offset);
        // Odometer increment over the logical index, last axis fastest.
        let mut axis = dims.len();
        loop {
            if axis == 0 {
                return offsets;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}
