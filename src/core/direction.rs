//! Packed spherical directions.
//!
//! A unit vector compresses into 16 bits: an 8-bit azimuth φ ∈ [−π, π] and
//! an 8-bit polar angle θ ∈ [0, π]. Decoding indexes a precomputed table of
//! 65,536 unit vectors, so no trigonometry runs in the query hot loop.

use crate::core::common::{Float, PI, TWO_PI};
use glam::Vec3;

lazy_static! {
    /// Decode table mapping every packed (φ, θ) byte pair to a unit vector.
    static ref DIRECTION_TABLE: Vec<Vec3> = build_direction_table();
}

/// Packs a unit vector into a 16-bit direction index.
///
/// * `v` - The unit vector.
pub fn pack_direction(v: Vec3) -> u16 {
    let phi = (255.0 * (v.y.atan2(v.x) + PI) / TWO_PI).round() as u16;
    let theta = (255.0 * v.z.clamp(-1.0, 1.0).acos() / PI).round() as u16;
    phi * 256 + theta
}

/// Returns the unit vector for a packed direction index.
///
/// * `direction` - The packed index.
pub fn unpack_direction(direction: u16) -> Vec3 {
    DIRECTION_TABLE[direction as usize]
}

/// Builds the spherical-to-cartesian decode table. The final normalization
/// absorbs quantization error.
fn build_direction_table() -> Vec<Vec3> {
    let mut table = Vec::with_capacity(65536);
    for phi in 0..256 {
        let true_phi = (phi as Float * TWO_PI / 255.0) - PI;
        for theta in 0..256 {
            let true_theta = theta as Float * PI / 255.0;
            let v = Vec3::new(
                true_theta.sin() * true_phi.cos(),
                true_theta.sin() * true_phi.sin(),
                true_theta.cos(),
            );
            table.push(v.normalize_or_zero());
        }
    }
    table
}
