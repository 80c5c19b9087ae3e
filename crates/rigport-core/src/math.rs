//! Numeric helpers for decoding authored data

use glam::{Mat4, Vec2, Vec3};

/// Number of decimal digits kept when quantizing imported attributes.
pub const QUANTIZE_DIGITS: i32 = 5;

/// Round `value` to `digits` decimal places.
///
/// The value is scaled by `10^digits`, rounded to the nearest integer with
/// ties going to the even neighbour, and scaled back.
pub fn round_to_digits(value: f32, digits: i32) -> f32 {
    let scale = 10f32.powi(digits);
    (value * scale).round_ties_even() / scale
}

/// Component-wise decimal rounding for vector types.
pub trait RoundToDigits {
    fn round_to_digits(self, digits: i32) -> Self;
}

impl RoundToDigits for Vec3 {
    fn round_to_digits(self, digits: i32) -> Self {
        Vec3::new(
            round_to_digits(self.x, digits),
            round_to_digits(self.y, digits),
            round_to_digits(self.z, digits),
        )
    }
}

impl RoundToDigits for Vec2 {
    fn round_to_digits(self, digits: i32) -> Self {
        Vec2::new(round_to_digits(self.x, digits), round_to_digits(self.y, digits))
    }
}

/// Decode 16 floats laid out row-major (`index = 4 * row + col`).
///
/// Returns `None` unless exactly 16 values are supplied.
pub fn mat4_from_row_major(values: &[f32]) -> Option<Mat4> {
    let array: &[f32; 16] = values.try_into().ok()?;
    // glam stores columns, so read the rows in as columns and flip.
    Some(Mat4::from_cols_array(array).transpose())
}
