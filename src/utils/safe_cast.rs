//! Checked conversions between image indices, `OpenCV` coordinates, and floats

use crate::{Error, Result};

/// Safely convert usize to i32 with overflow checking
///
/// # Errors
///
/// Returns an error if the value exceeds i32::MAX
pub fn usize_to_i32(value: usize) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in i32")))
}

/// Convert an `OpenCV` coordinate or size to an index
///
/// # Errors
///
/// Returns an error if the value is negative
pub fn i32_to_usize(value: i32) -> Result<usize> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Negative value {value} cannot be used as an index")))
}

/// Round a sub-pixel coordinate to the nearest pixel of a `width` x `height`
/// image, or `None` when it falls outside
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn round_to_pixel(x: f32, y: f32, width: usize, height: usize) -> Option<(usize, usize)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let (rx, ry) = (x.round(), y.round());
    if rx < 0.0 || ry < 0.0 || rx >= width as f32 || ry >= height as f32 {
        return None;
    }
    Some((rx as usize, ry as usize))
}
