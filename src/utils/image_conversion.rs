//! Image conversion utilities for `OpenCV` Mat and ndarray interoperability.

use super::safe_cast::{i32_to_usize, usize_to_i32};
use crate::Result;
use ndarray::Array2;
use opencv::core::{Mat, Scalar, CV_32FC1, CV_8UC1};
use opencv::prelude::*;

/// Convert a single-channel `u8` array with shape (height, width) into a
/// `CV_8UC1` Mat
///
/// # Errors
/// * Returns error if the array is too large for `OpenCV` or Mat creation fails
pub fn array2_u8_to_mat(array: &Array2<u8>) -> Result<Mat> {
    let (rows, cols) = array.dim();
    let mut mat = Mat::new_rows_cols_with_default(usize_to_i32(rows)?, usize_to_i32(cols)?, CV_8UC1, Scalar::all(0.0))?;

    for ((row, col), &value) in array.indexed_iter() {
        *mat.at_2d_mut::<u8>(usize_to_i32(row)?, usize_to_i32(col)?)? = value;
    }

    Ok(mat)
}

/// Convert a `CV_8UC1` Mat into an ndarray with shape (height, width)
///
/// # Errors
/// * Returns error if the Mat is not single-channel 8-bit
pub fn mat_to_array2_u8(mat: &Mat) -> Result<Array2<u8>> {
    let (rows, cols) = checked_dims(mat)?;
    let mut array = Array2::<u8>::zeros((rows, cols));

    for ((row, col), value) in array.indexed_iter_mut() {
        *value = *mat.at_2d::<u8>(usize_to_i32(row)?, usize_to_i32(col)?)?;
    }

    Ok(array)
}

/// Convert a single-channel `f32` array into a `CV_32FC1` Mat
///
/// # Errors
/// * Returns error if the array is too large for `OpenCV` or Mat creation fails
pub fn array2_f32_to_mat(array: &Array2<f32>) -> Result<Mat> {
    let (rows, cols) = array.dim();
    let mut mat = Mat::new_rows_cols_with_default(usize_to_i32(rows)?, usize_to_i32(cols)?, CV_32FC1, Scalar::all(0.0))?;

    for ((row, col), &value) in array.indexed_iter() {
        *mat.at_2d_mut::<f32>(usize_to_i32(row)?, usize_to_i32(col)?)? = value;
    }

    Ok(mat)
}

/// Convert a `CV_32FC1` Mat into an ndarray with shape (height, width)
///
/// # Errors
/// * Returns error if the Mat is not single-channel 32-bit float
pub fn mat_to_array2_f32(mat: &Mat) -> Result<Array2<f32>> {
    let (rows, cols) = checked_dims(mat)?;
    let mut array = Array2::<f32>::zeros((rows, cols));

    for ((row, col), value) in array.indexed_iter_mut() {
        *value = *mat.at_2d::<f32>(usize_to_i32(row)?, usize_to_i32(col)?)?;
    }

    Ok(array)
}

fn checked_dims(mat: &Mat) -> Result<(usize, usize)> {
    if mat.channels() != 1 {
        return Err(crate::Error::InvalidInput(format!(
            "Expected a single-channel Mat, got {} channels",
            mat.channels()
        )));
    }
    Ok((i32_to_usize(mat.rows())?, i32_to_usize(mat.cols())?))
}
