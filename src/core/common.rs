//! Common numeric types and constants.

/// Use 32-bit precision for floating point numbers.
pub type Float = f32;

/// Infinity (∞)
pub const INFINITY: Float = Float::INFINITY;

/// PI (π)
pub const PI: Float = std::f32::consts::PI;

/// 2*PI (2π)
pub const TWO_PI: Float = PI * 2.0;

/// 4*PI (4π)
pub const FOUR_PI: Float = PI * 4.0;

/// 1/PI (1/π)
pub const INV_PI: Float = 1.0 / PI;

/// Euler's number (e)
pub const E: Float = std::f32::consts::E;

/// Offset applied to ray origins and distance comparisons to avoid
/// self-intersection.
pub const EPSILON: Float = 1e-4;
