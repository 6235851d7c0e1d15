//! The stored photon record.

use crate::core::direction::{pack_direction, unpack_direction};
use crate::core::rgb::Rgb;
use crate::core::rgbe::{rgb_to_rgbe, rgbe_to_rgb, Rgbe};
use glam::Vec3;

/// Which photon map a photon belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MapKind {
    /// Diffuse deposits from paths of any order; estimates indirect diffuse
    /// illumination.
    Global,

    /// Deposits whose path touched at least one non-diffuse surface before
    /// landing on a diffuse one.
    Caustic,
}

/// A single stored light bounce: 12 bytes of position, 4 bytes of packed
/// power, 2 bytes of packed incoming direction.
#[derive(Copy, Clone, Debug)]
pub struct Photon {
    /// World position of the deposit.
    pub position: Vec3,

    /// Carried power, RGBE packed.
    pub rgbe: Rgbe,

    /// Packed unit direction the photon arrived along.
    pub direction: u16,
}

impl Photon {
    /// Creates a photon record.
    ///
    /// * `position` - World position of the deposit.
    /// * `power`    - Carried power.
    /// * `incoming` - Unit direction the photon arrived along.
    pub fn new(position: Vec3, power: Rgb, incoming: Vec3) -> Self {
        Self {
            position,
            rgbe: rgb_to_rgbe(power),
            direction: pack_direction(incoming),
        }
    }

    /// Returns the carried power.
    pub fn power(&self) -> Rgb {
        rgbe_to_rgb(self.rgbe)
    }

    /// Replaces the carried power.
    ///
    /// * `power` - The new power.
    pub fn set_power(&mut self, power: Rgb) {
        self.rgbe = rgb_to_rgbe(power);
    }

    /// Returns the unit direction the photon arrived along.
    pub fn incoming_direction(&self) -> Vec3 {
        unpack_direction(self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip() {
        let p = Photon::new(
            Vec3::new(1.0, 2.0, 3.0),
            Rgb::new(0.25, 0.5, 0.75),
            Vec3::new(0.0, 0.0, -1.0),
        );
        let power = p.power();
        assert!((power.r - 0.25).abs() < 0.01);
        assert!((power.g - 0.5).abs() < 0.01);
        assert!((power.b - 0.75).abs() < 0.01);
        assert!(p.incoming_direction().dot(-Vec3::Z) > 0.999);
    }
}
