//! Conversion between OpenCV matrices and ndarray tensors.

use crate::{Error, Result};
use ndarray::Array3;
use opencv::core::{Mat, Vec3f, CV_32FC3};
use opencv::prelude::*;
use std::borrow::Cow;

/// Convert a `CV_32FC3` Mat into an `H x W x 3` array
///
/// Non-continuous matrices (ROIs) are copied first.
///
/// # Errors
///
/// Returns an error if the Mat is empty, not `CV_32FC3`, or its data cannot
/// be accessed
pub fn mat_to_array3_f32(mat: &Mat) -> Result<Array3<f32>> {
    if mat.typ() != CV_32FC3 {
        return Err(Error::InvalidInput(format!(
            "Expected a CV_32FC3 matrix, got type {}",
            mat.typ()
        )));
    }
    let rows = usize::try_from(mat.rows()).unwrap_or(0);
    let cols = usize::try_from(mat.cols()).unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidInput(format!(
            "Invalid Mat dimensions: {}x{}",
            mat.rows(),
            mat.cols()
        )));
    }

    let continuous = if mat.is_continuous() {
        Cow::Borrowed(mat)
    } else {
        Cow::Owned(mat.try_clone()?)
    };
    let data: Vec<f32> = continuous
        .data_typed::<Vec3f>()?
        .iter()
        .flat_map(|pixel| pixel.0)
        .collect();

    Array3::from_shape_vec((rows, cols, 3), data)
        .map_err(|e| Error::InvalidInput(format!("Failed to create array from Mat: {e}")))
}
