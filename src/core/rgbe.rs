//! Shared-exponent RGBE color packing.
//!
//! Ward's 4-byte encoding: three mantissa bytes share one exponent byte.
//! Photons store their power in this form, so a deposited photon costs 4
//! bytes instead of 12 for the color.

use crate::core::common::Float;
use crate::core::rgb::Rgb;

/// A packed RGBE color. `[0, 0, 0, 0]` denotes exact black; any other value
/// has a nonzero exponent byte.
pub type Rgbe = [u8; 4];

/// Smallest channel magnitude that still packs to a nonzero value.
const MIN_PACKABLE: Float = 1e-32;

/// Packs a linear RGB color into 4-byte RGBE.
///
/// * `rgb` - The color. Channels are assumed non-negative.
pub fn rgb_to_rgbe(rgb: Rgb) -> Rgbe {
    let max = rgb.max_channel();
    if max < MIN_PACKABLE {
        return [0, 0, 0, 0];
    }

    let (mantissa, exponent) = frexp(max);
    let scale = 256.0 * mantissa / max;
    [
        (rgb.r * scale) as u8,
        (rgb.g * scale) as u8,
        (rgb.b * scale) as u8,
        (exponent + 128) as u8,
    ]
}

/// Unpacks a 4-byte RGBE color into linear RGB.
///
/// * `rgbe` - The packed color.
pub fn rgbe_to_rgb(rgbe: Rgbe) -> Rgb {
    if rgbe[3] == 0 {
        return Rgb::BLACK;
    }

    let inverse = exp2i(rgbe[3] as i32 - 128 - 8);
    Rgb::new(
        rgbe[0] as Float * inverse,
        rgbe[1] as Float * inverse,
        rgbe[2] as Float * inverse,
    )
}

/// Decomposes a finite positive value into a mantissa in `[0.5, 1)` and a
/// power-of-two exponent such that `v = mantissa * 2^exponent`.
fn frexp(v: Float) -> (Float, i32) {
    let bits = v.to_bits();
    let biased = ((bits >> 23) & 0xff) as i32;
    if biased == 0 {
        // Subnormal. Scale into the normal range first.
        let (mantissa, exponent) = frexp(v * exp2i(25));
        return (mantissa, exponent - 25);
    }
    let mantissa = Float::from_bits((bits & 0x807f_ffff) | 0x3f00_0000);
    (mantissa, biased - 126)
}

/// Returns `2^n` as a `Float`.
fn exp2i(n: i32) -> Float {
    (2.0 as Float).powi(n)
}
