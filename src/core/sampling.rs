//! Bounce directions, Fresnel, and importance sampling.
//!
//! All kernels are total: degenerate inputs are clamped and total internal
//! reflection falls back to the reflective bounce.
//!
//! Throughout, `view` is the unit vector from the eye (or previous bounce)
//! into the surface and `cos_theta = normal · (−view)`. A negative
//! `cos_theta` means the ray hit the back side; the kernels flip the normal
//! onto the incident side themselves.

use crate::core::common::{Float, PI, TWO_PI};
use crate::core::geometry::{perpendicular_axis, rotate_about};
use crate::core::rng::WorkerRng;
use glam::Vec3;
use rand::Rng;

/// Schlick's approximation of the fraction of light reflected at a
/// dielectric interface.
///
/// * `cos_theta` - Cosine of the incidence angle.
/// * `ir_mat`    - Index of refraction of the material.
/// * `ir_air`    - Index of refraction of the exterior medium.
pub fn reflection_coeff(cos_theta: Float, ir_mat: Float, ir_air: Float) -> Float {
    let r0 = ((ir_air - ir_mat) / (ir_air + ir_mat)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cos_theta.abs()).powi(5)
}

/// Returns the direction of a perfect reflective bounce.
///
/// * `normal`    - Surface normal.
/// * `view`      - Unit vector from the eye into the surface.
/// * `cos_theta` - `normal · (−view)`.
pub fn reflective_bounce(mut normal: Vec3, view: Vec3, mut cos_theta: Float) -> Vec3 {
    // Flip normal to the incident side of the surface.
    if cos_theta < 0.0 {
        normal = -normal;
        cos_theta = -cos_theta;
    }

    (view + normal * (2.0 * cos_theta)).normalize_or_zero()
}

/// Returns the direction of a perfect transmissive bounce, or the reflective
/// bounce past the critical angle.
///
/// * `normal`    - Surface normal.
/// * `view`      - Unit vector from the eye into the surface.
/// * `cos_theta` - `normal · (−view)`.
/// * `ir_mat`    - Index of refraction of the material.
/// * `ir_air`    - Index of refraction of the exterior medium.
pub fn transmissive_bounce(
    mut normal: Vec3,
    view: Vec3,
    mut cos_theta: Float,
    ir_mat: Float,
    ir_air: Float,
) -> Vec3 {
    // Ratio of refraction indices depends on whether the ray is entering or
    // leaving the material.
    let eta = if cos_theta < 0.0 {
        normal = -normal;
        cos_theta = -cos_theta;
        ir_mat / ir_air
    } else {
        ir_air / ir_mat
    };

    let theta = cos_theta.clamp(-1.0, 1.0).acos();
    let sin_phi = eta * theta.sin();
    if !(-1.0..=1.0).contains(&sin_phi) {
        // Total internal reflection.
        return reflective_bounce(normal, view, cos_theta);
    }

    let phi = sin_phi.asin();
    let parallel = (view + normal * cos_theta).normalize_or_zero();
    (parallel * phi.tan() - normal).normalize_or_zero()
}

/// Samples a direction from the cosine-weighted hemisphere about the normal.
/// The normal is flipped onto the incident side when `cos_theta` is
/// negative.
///
/// * `rng`       - Worker random number generator.
/// * `normal`    - Surface normal.
/// * `cos_theta` - `normal · (−view)`.
pub fn diffuse_importance_sample(rng: &mut WorkerRng, mut normal: Vec3, cos_theta: Float) -> Vec3 {
    if cos_theta < 0.0 {
        normal = -normal;
    }

    let theta = rng.gen::<Float>().sqrt().acos();
    let phi = TWO_PI * rng.gen::<Float>();

    let perpendicular = perpendicular_axis(normal);
    let result = perpendicular * theta.sin() + normal * theta.cos();
    rotate_about(result, normal, phi).normalize_or_zero()
}

/// Samples a direction from the Phong lobe about an exact bounce direction
/// (Lafortune & Williams, 1994).
///
/// The lobe narrows near grazing angles: the perturbation is scaled by
/// `1 − (2/π)·acos|cos θ|` so the sample cannot cross the surface, which
/// also mimics the increased sharpness of real specular reflection at
/// grazing incidence.
///
/// * `rng`       - Worker random number generator.
/// * `exact`     - Exact bounce direction.
/// * `shininess` - Phong exponent.
/// * `cos_theta` - `normal · (−view)` at the surface.
pub fn specular_importance_sample(
    rng: &mut WorkerRng,
    exact: Vec3,
    shininess: Float,
    cos_theta: Float,
) -> Vec3 {
    let angle_limit = 1.0 - cos_theta.abs().clamp(0.0, 1.0).acos() * 2.0 / PI;

    let alpha = rng
        .gen::<Float>()
        .powf(1.0 / (shininess + 1.0))
        .clamp(-1.0, 1.0)
        .acos()
        * angle_limit;
    let phi = TWO_PI * rng.gen::<Float>();

    let perpendicular = perpendicular_axis(exact);
    let result = perpendicular * alpha.sin() + exact * alpha.cos();
    rotate_about(result, exact, phi).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::worker_rng;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const IR_AIR: Float = 1.0;

    fn unit(x: Float, y: Float, z: Float) -> Vec3 {
        Vec3::new(x, y, z).normalize()
    }

    #[test]
    fn schlick_endpoints() {
        let r0 = ((IR_AIR - 1.5) / (IR_AIR + 1.5) as Float).powi(2);
        assert_relative_eq!(reflection_coeff(1.0, 1.5, IR_AIR), r0, epsilon = 1e-6);
        assert_relative_eq!(reflection_coeff(0.0, 1.5, IR_AIR), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn schlick_monotone_in_angle() {
        let mut last = reflection_coeff(1.0, 1.5, IR_AIR);
        for i in 1..=100 {
            let cos_theta = 1.0 - i as Float / 100.0;
            let r = reflection_coeff(cos_theta, 1.5, IR_AIR);
            assert!(r >= last);
            last = r;
        }
    }

    #[test]
    fn grazing_reflection_dominates() {
        // At an 85° viewing angle more than half the light reflects; at
        // normal incidence less than a tenth does.
        let grazing = (85.0f32).to_radians().cos();
        assert!(reflection_coeff(grazing, 1.5, IR_AIR) > 0.5);
        assert!(reflection_coeff(1.0, 1.5, IR_AIR) < 0.1);
    }

    proptest! {
        #[test]
        fn reflective_bounce_laws(
            nx in -1.0f32..1.0, ny in -1.0f32..1.0, nz in -1.0f32..1.0,
            vx in -1.0f32..1.0, vy in -1.0f32..1.0, vz in -1.0f32..1.0,
        ) {
            let n = Vec3::new(nx, ny, nz);
            let v = Vec3::new(vx, vy, vz);
            prop_assume!(n.length() > 1e-2 && v.length() > 1e-2);
            let n = n.normalize();
            let v = v.normalize();
            let cos_theta = n.dot(-v);
            prop_assume!(cos_theta.abs() > 1e-3);

            let r = reflective_bounce(n, v, cos_theta);

            // Unit length, mirrored angle, and coplanar with (n, v).
            prop_assert!((r.length() - 1.0).abs() < 1e-4);
            prop_assert!((n.dot(r) - (-n.dot(v))).abs() < 1e-4);
            prop_assert!(r.dot(n.cross(v)).abs() < 1e-4);
        }

        #[test]
        fn snells_law(angle_deg in 1.0f32..40.0) {
            // Entering glass below the critical angle.
            let n = Vec3::Z;
            let theta = angle_deg.to_radians();
            let v = Vec3::new(theta.sin(), 0.0, -theta.cos());
            let cos_theta = n.dot(-v);

            let t = transmissive_bounce(n, v, cos_theta, 1.5, IR_AIR);
            let sin_out = t.cross(-n).length();
            prop_assert!((IR_AIR * theta.sin() - 1.5 * sin_out).abs() < 1e-5);
            // Refraction continues into the surface.
            prop_assert!(t.z < 0.0);
        }
    }

    #[test]
    fn refraction_below_critical_angle_leaving_glass() {
        // Leaving glass at 30° from the normal still refracts; the critical
        // angle for η = 1.5 is 41.8°.
        let n = Vec3::Z;
        let theta = (30.0f32).to_radians();
        // Back side hit: travelling along +z out of the material.
        let v = Vec3::new(theta.sin(), 0.0, theta.cos());
        let cos_theta = n.dot(-v);
        assert!(cos_theta < 0.0);

        let t = transmissive_bounce(n, v, cos_theta, 1.5, IR_AIR);
        let sin_out = t.cross(n).length();
        assert_relative_eq!(1.5 * theta.sin(), IR_AIR * sin_out, epsilon = 1e-5);
    }

    #[test]
    fn total_internal_reflection_matches_reflective_bounce() {
        // Leaving glass at 60°, past the 41.8° critical angle.
        let n = Vec3::Z;
        let theta = (60.0f32).to_radians();
        let v = Vec3::new(theta.sin(), 0.0, theta.cos());
        let cos_theta = n.dot(-v);

        let t = transmissive_bounce(n, v, cos_theta, 1.5, IR_AIR);
        let r = reflective_bounce(n, v, cos_theta);
        assert!((t - r).length() < 1e-6);
    }

    #[test]
    fn diffuse_samples_stay_in_hemisphere() {
        let mut rng = worker_rng(7, 0);
        let n = unit(0.3, -0.5, 0.8);
        for _ in 0..1000 {
            let d = diffuse_importance_sample(&mut rng, n, 1.0);
            assert!((d.length() - 1.0).abs() < 1e-4);
            assert!(d.dot(n) >= 0.0);
        }
        // Flipped when the surface is viewed from behind.
        for _ in 0..1000 {
            let d = diffuse_importance_sample(&mut rng, n, -1.0);
            assert!(d.dot(n) <= 0.0);
        }
    }

    #[test]
    fn specular_samples_concentrate_around_exact() {
        let mut rng = worker_rng(11, 0);
        let exact = unit(0.0, 0.6, 0.8);
        let mut mean_cos = 0.0;
        for _ in 0..1000 {
            let d = specular_importance_sample(&mut rng, exact, 1000.0, 1.0);
            assert!((d.length() - 1.0).abs() < 1e-4);
            mean_cos += d.dot(exact) / 1000.0;
        }
        assert!(mean_cos > 0.99);
    }
}
