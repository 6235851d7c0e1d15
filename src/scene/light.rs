//! Light sources.
//!
//! Lights are a closed tagged variant; every consumer matches exhaustively.
//! The reflection helpers here ignore occlusion. Shadowing lives in the
//! direct-illumination sampler, which combines these with shadow rays.

use crate::core::common::{Float, EPSILON, PI, TWO_PI, FOUR_PI};
use crate::core::geometry::perpendicular_axis;
use crate::core::rgb::Rgb;
use crate::core::rng::WorkerRng;
use crate::scene::Brdf;
use glam::Vec3;
use rand::Rng;

/// Fields shared by every light variant.
#[derive(Clone, Debug)]
pub struct LightBase {
    /// Light color.
    pub color: Rgb,

    /// Intensity scale.
    pub intensity: Float,

    /// Whether the light contributes at all.
    pub active: bool,

    /// Constant attenuation coefficient.
    pub constant_attenuation: Float,

    /// Linear attenuation coefficient.
    pub linear_attenuation: Float,

    /// Quadratic attenuation coefficient.
    pub quadratic_attenuation: Float,
}

impl Default for LightBase {
    fn default() -> Self {
        Self {
            color: Rgb::WHITE,
            intensity: 1.0,
            active: true,
            constant_attenuation: 1.0,
            linear_attenuation: 0.0,
            quadratic_attenuation: 0.0,
        }
    }
}

impl LightBase {
    /// Returns the intensity attenuated over a distance.
    ///
    /// * `d` - Distance from the light sample point.
    pub fn attenuated_intensity(&self, d: Float) -> Float {
        let denom = self.constant_attenuation
            + d * self.linear_attenuation
            + d * d * self.quadratic_attenuation;
        if denom > 0.0 {
            self.intensity / denom
        } else {
            self.intensity
        }
    }
}

/// A light shining along a fixed direction from infinitely far away.
#[derive(Clone, Debug)]
pub struct DirectionalLight {
    pub base: LightBase,

    /// Unit direction of travel of the light.
    pub direction: Vec3,
}

/// An isotropic point light.
#[derive(Clone, Debug)]
pub struct PointLight {
    pub base: LightBase,

    /// Position.
    pub position: Vec3,
}

/// A point light restricted to a cone with a Phong-like drop-off.
#[derive(Clone, Debug)]
pub struct SpotLight {
    pub base: LightBase,

    /// Position.
    pub position: Vec3,

    /// Unit direction of the cone axis.
    pub direction: Vec3,

    /// Drop-off exponent across the cone.
    pub drop_off_rate: Float,

    /// Cut-off angle of the cone, in radians.
    pub cut_off_angle: Float,
}

/// A disk-shaped area light emitting from one side.
#[derive(Clone, Debug)]
pub struct AreaDiskLight {
    pub base: LightBase,

    /// Center of the disk.
    pub position: Vec3,

    /// Unit normal of the emissive side.
    pub direction: Vec3,

    /// Disk radius.
    pub radius: Float,
}

/// A parallelogram area light emitting from one side.
#[derive(Clone, Debug)]
pub struct AreaRectLight {
    pub base: LightBase,

    /// Center of the parallelogram.
    pub position: Vec3,

    /// Unit normal of the emissive side (primary × secondary).
    pub direction: Vec3,

    /// Unit primary edge axis.
    pub primary_axis: Vec3,

    /// Unit secondary edge axis.
    pub secondary_axis: Vec3,

    /// Length along the primary axis.
    pub primary_length: Float,

    /// Length along the secondary axis.
    pub secondary_length: Float,
}

impl AreaDiskLight {
    /// Returns unit vectors spanning the plane of the disk.
    pub fn plane_axes(&self) -> (Vec3, Vec3) {
        plane_axes(self.direction)
    }

    /// Returns a uniform point on the disk, lifted off the surface by a
    /// small offset along the normal.
    ///
    /// * `rng` - Worker random number generator.
    pub fn sample_point(&self, rng: &mut WorkerRng) -> Vec3 {
        let (u, v) = self.plane_axes();
        let (r1, r2) = sample_unit_disk(rng);
        self.position
            + u * (r1 * self.radius)
            + v * (r2 * self.radius)
            + self.direction * EPSILON
    }

    /// Surface area of the disk.
    pub fn area(&self) -> Float {
        PI * self.radius * self.radius
    }
}

impl AreaRectLight {
    /// Returns the edge axes scaled by the edge lengths.
    pub fn scaled_axes(&self) -> (Vec3, Vec3) {
        (
            self.primary_axis * self.primary_length,
            self.secondary_axis * self.secondary_length,
        )
    }

    /// Returns a uniform point on the parallelogram, lifted off the surface
    /// by a small offset along the normal.
    ///
    /// * `rng` - Worker random number generator.
    pub fn sample_point(&self, rng: &mut WorkerRng) -> Vec3 {
        let (a1, a2) = self.scaled_axes();
        let r1 = rng.gen::<Float>() - 0.5;
        let r2 = rng.gen::<Float>() - 0.5;
        self.position + a1 * r1 + a2 * r2 + self.direction * EPSILON
    }

    /// Surface area of the parallelogram.
    pub fn area(&self) -> Float {
        let (a1, a2) = self.scaled_axes();
        a1.cross(a2).length()
    }
}

/// A scene light.
#[derive(Clone, Debug)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
    AreaDisk(AreaDiskLight),
    AreaRect(AreaRectLight),
}

/// Relation of a shaded point to the surface of an area light.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LightSurface {
    /// The point is not on the light.
    Miss,

    /// The point is on the emissive side of the light.
    Front,

    /// The point is on the non-emissive back of the light.
    Back,
}

impl Light {
    /// Returns the shared fields.
    pub fn base(&self) -> &LightBase {
        match self {
            Light::Directional(l) => &l.base,
            Light::Point(l) => &l.base,
            Light::Spot(l) => &l.base,
            Light::AreaDisk(l) => &l.base,
            Light::AreaRect(l) => &l.base,
        }
    }

    /// Returns true if the light contributes to the scene.
    pub fn is_active(&self) -> bool {
        self.base().active
    }

    /// Returns the total emitted power: the sum of color channels scaled by
    /// the emitting area and the solid-angle flux of the variant.
    ///
    /// * `scene_radius` - Bounding radius of the scene; defines the emitting
    ///                    area of directional lights.
    pub fn power(&self, scene_radius: Float) -> Float {
        let color = self.base().color;
        let (area, flux) = match self {
            Light::Directional(_) => (PI * scene_radius * scene_radius, 1.0),
            Light::Point(_) => (1.0, FOUR_PI),
            Light::Spot(l) => {
                // Flux through the cone.
                let s = l.drop_off_rate;
                let c = l.cut_off_angle;
                (1.0, TWO_PI / (s + 1.0) * (1.0 - c.cos().powf(s + 1.0)))
            }
            Light::AreaDisk(l) => (l.area(), TWO_PI),
            Light::AreaRect(l) => (l.area(), TWO_PI),
        };
        color.sum() * area * flux
    }

    /// Returns the attenuated intensity arriving at a point, including the
    /// cone drop-off of spot lights.
    ///
    /// * `point` - The lit point.
    pub fn intensity_at(&self, point: Vec3) -> Float {
        match self {
            Light::Directional(l) => l.base.intensity,
            Light::Point(l) => l.base.attenuated_intensity(l.position.distance(point)),
            Light::Spot(l) => {
                let to_point = (point - l.position).normalize_or_zero();
                let cos_angle = to_point.dot(l.direction);
                if cos_angle < l.cut_off_angle.cos() {
                    return 0.0;
                }
                l.base.attenuated_intensity(l.position.distance(point))
                    * cos_angle.max(0.0).powf(l.drop_off_rate)
            }
            Light::AreaDisk(l) => l.base.attenuated_intensity(l.position.distance(point)),
            Light::AreaRect(l) => l.base.attenuated_intensity(l.position.distance(point)),
        }
    }

    /// Returns the unit direction from a point toward the light.
    ///
    /// * `point` - The lit point.
    pub fn direction_from(&self, point: Vec3) -> Vec3 {
        match self {
            Light::Directional(l) => -l.direction,
            Light::Point(l) => (l.position - point).normalize_or_zero(),
            Light::Spot(l) => (l.position - point).normalize_or_zero(),
            Light::AreaDisk(l) => (l.position - point).normalize_or_zero(),
            Light::AreaRect(l) => (l.position - point).normalize_or_zero(),
        }
    }

    /// Tests whether a shaded point lies on the surface of this light.
    ///
    /// * `point` - The shaded point.
    /// * `eye`   - The position the point is viewed from; decides which side
    ///             of the light the viewer sees.
    pub fn surface_hit(&self, point: Vec3, eye: Vec3) -> LightSurface {
        match self {
            Light::AreaDisk(l) => {
                let v = point - l.position;
                let on_plane = v.normalize_or_zero().dot(l.direction).abs() < EPSILON;
                if on_plane && v.length() <= l.radius {
                    emitting_side(l.direction, point, eye)
                } else {
                    LightSurface::Miss
                }
            }
            Light::AreaRect(l) => {
                let v = point - l.position;
                let a1_component = v.dot(l.primary_axis);
                let a2_component = v.dot(l.secondary_axis);
                let on_plane = v.normalize_or_zero().dot(l.direction).abs() < EPSILON;
                if on_plane
                    && a1_component.abs() * 2.0 <= l.primary_length
                    && a2_component.abs() * 2.0 <= l.secondary_length
                {
                    emitting_side(l.direction, point, eye)
                } else {
                    LightSurface::Miss
                }
            }
            _ => LightSurface::Miss,
        }
    }

    /// Returns the direct Phong reflection from this light at a point,
    /// ignoring occlusion. Point-like variants evaluate analytically; area
    /// variants average unoccluded samples over the emitting surface.
    ///
    /// * `brdf`        - Material at the point.
    /// * `eye`         - View position.
    /// * `point`       - The lit point.
    /// * `normal`      - Surface normal at the point.
    /// * `rng`         - Worker random number generator.
    /// * `max_samples` - Sample budget for area variants.
    pub fn reflection(
        &self,
        brdf: &Brdf,
        eye: Vec3,
        point: Vec3,
        normal: Vec3,
        rng: &mut WorkerRng,
        max_samples: usize,
    ) -> Rgb {
        if !self.is_active() {
            return Rgb::BLACK;
        }
        match self {
            Light::Directional(_) | Light::Point(_) | Light::Spot(_) => {
                self.point_reflection(brdf, eye, point, normal)
            }
            Light::AreaDisk(_) | Light::AreaRect(_) => {
                self.sampled_reflection(brdf, eye, point, normal, rng, max_samples)
            }
        }
    }

    /// Analytic Phong reflection for point-like lights.
    fn point_reflection(&self, brdf: &Brdf, eye: Vec3, point: Vec3, normal: Vec3) -> Rgb {
        let intensity = self.intensity_at(point);
        let l = self.direction_from(point);
        let color = self.base().color;

        let nl = normal.dot(l);
        let mut result = (intensity * nl.abs()) * brdf.diffuse * color;

        if brdf.is_specular() {
            let r = normal * (2.0 * nl) - l;
            let v = (eye - point).normalize_or_zero();
            let vr = v.dot(r);
            if vr > 0.0 {
                result += (intensity * vr.powf(brdf.shininess)) * brdf.specular * color;
            }
        }
        result
    }

    /// Monte Carlo mean of the Phong reflection over an area light's
    /// emitting surface.
    fn sampled_reflection(
        &self,
        brdf: &Brdf,
        eye: Vec3,
        point: Vec3,
        normal: Vec3,
        rng: &mut WorkerRng,
        max_samples: usize,
    ) -> Rgb {
        let (center, light_norm, area) = match self {
            Light::AreaDisk(l) => (l.position, l.direction, l.area()),
            Light::AreaRect(l) => (l.position, l.direction, l.area()),
            _ => unreachable!(),
        };

        // The back side does not emit.
        if light_norm.dot(point - center) < 0.0 {
            return Rgb::BLACK;
        }

        let base = self.base();
        let mut result = Rgb::BLACK;

        if brdf.is_diffuse() {
            let samples = (max_samples as Float / 2.0).ceil() as usize;
            let mut sum = Rgb::BLACK;
            for _ in 0..samples {
                let sample_point = self.sample_surface_point(rng);
                let (intensity, l) = area_sample_intensity(base, light_norm, sample_point, point);
                sum += (intensity * normal.dot(l).abs() / PI) * brdf.diffuse * base.color;
            }
            if samples > 0 {
                result += sum * (area / samples as Float);
            }
        }

        if brdf.is_specular() {
            let v = (eye - point).normalize_or_zero();
            let mut sum = Rgb::BLACK;
            for _ in 0..max_samples {
                let sample_point = self.sample_surface_point(rng);
                let (intensity, l) = area_sample_intensity(base, light_norm, sample_point, point);
                let nl = normal.dot(l);
                let r = normal * (2.0 * nl) - l;
                let vr = v.dot(r);
                if vr <= 0.0 {
                    continue;
                }
                sum += (intensity * vr.powf(brdf.shininess)) * brdf.specular * base.color;
            }
            if max_samples > 0 {
                result += sum * (area / max_samples as Float);
            }
        }

        result
    }

    /// Returns a uniform point on the emitting surface of an area variant.
    ///
    /// * `rng` - Worker random number generator.
    pub fn sample_surface_point(&self, rng: &mut WorkerRng) -> Vec3 {
        match self {
            Light::AreaDisk(l) => l.sample_point(rng),
            Light::AreaRect(l) => l.sample_point(rng),
            _ => unreachable!("only area lights have an emitting surface"),
        }
    }
}

/// Attenuated intensity of an area-light sample, weighted by the cosine
/// emission falloff, and the unit direction toward the sample.
pub(crate) fn area_sample_intensity(
    base: &LightBase,
    light_norm: Vec3,
    sample_point: Vec3,
    point: Vec3,
) -> (Float, Vec3) {
    let d = point.distance(sample_point);
    let intensity = base.attenuated_intensity(d);
    let l = (sample_point - point).normalize_or_zero();

    // Weight by the probability of this emission direction.
    (intensity * light_norm.dot(-l) * 2.0, l)
}

fn emitting_side(light_norm: Vec3, point: Vec3, eye: Vec3) -> LightSurface {
    if light_norm.dot(eye - point) <= 0.0 {
        LightSurface::Back
    } else {
        LightSurface::Front
    }
}

/// Returns unit vectors spanning the plane perpendicular to a normal.
pub(crate) fn plane_axes(light_norm: Vec3) -> (Vec3, Vec3) {
    let u = perpendicular_axis(light_norm);
    (u, u.cross(light_norm).normalize())
}

/// Returns coordinates uniformly distributed in the unit disk, by rejection
/// from the enclosing square.
fn sample_unit_disk(rng: &mut WorkerRng) -> (Float, Float) {
    loop {
        let r1 = rng.gen::<Float>() * 2.0 - 1.0;
        let r2 = rng.gen::<Float>() * 2.0 - 1.0;
        if r1 * r1 + r2 * r2 <= 1.0 {
            return (r1, r2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::worker_rng;
    use approx::assert_relative_eq;

    fn rect_light() -> Light {
        Light::AreaRect(AreaRectLight {
            base: LightBase::default(),
            position: Vec3::new(0.0, 0.0, 1.0),
            direction: -Vec3::Z,
            primary_axis: Vec3::X,
            secondary_axis: -Vec3::Y,
            primary_length: 1.0,
            secondary_length: 1.0,
        })
    }

    #[test]
    fn attenuation_denominator() {
        let base = LightBase {
            constant_attenuation: 1.0,
            linear_attenuation: 2.0,
            quadratic_attenuation: 1.0,
            intensity: 8.0,
            ..LightBase::default()
        };
        assert_relative_eq!(base.attenuated_intensity(1.0), 2.0);
        // Degenerate all-zero coefficients fall back to unattenuated.
        let degenerate = LightBase { constant_attenuation: 0.0, ..base };
        assert_relative_eq!(degenerate.attenuated_intensity(0.0), 8.0);
    }

    #[test]
    fn spot_cone_cutoff() {
        let light = Light::Spot(SpotLight {
            base: LightBase::default(),
            position: Vec3::ZERO,
            direction: -Vec3::Z,
            drop_off_rate: 1.0,
            cut_off_angle: 0.5,
        });
        assert!(light.intensity_at(Vec3::new(0.0, 0.0, -1.0)) > 0.0);
        // Perpendicular to the axis is far outside the cone.
        assert_eq!(light.intensity_at(Vec3::new(1.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn rect_surface_sides() {
        let light = rect_light();
        let on_light = Vec3::new(0.25, 0.25, 1.0);
        let below = Vec3::new(0.0, 0.0, 0.0);
        let above = Vec3::new(0.0, 0.0, 2.0);

        assert_eq!(light.surface_hit(on_light, below), LightSurface::Front);
        assert_eq!(light.surface_hit(on_light, above), LightSurface::Back);
        assert_eq!(light.surface_hit(Vec3::new(5.0, 0.0, 1.0), below), LightSurface::Miss);
    }

    #[test]
    fn rect_samples_lie_on_light() {
        let light = rect_light();
        let mut rng = worker_rng(3, 0);
        for _ in 0..100 {
            let p = light.sample_surface_point(&mut rng);
            assert!(p.x.abs() <= 0.5 && p.y.abs() <= 0.5);
            assert_relative_eq!(p.z, 1.0 - EPSILON, epsilon = 1e-5);
        }
    }

    #[test]
    fn power_formulas() {
        let point = Light::Point(PointLight { base: LightBase::default(), position: Vec3::ZERO });
        assert_relative_eq!(point.power(1.0), 3.0 * FOUR_PI, epsilon = 1e-3);

        let rect = rect_light();
        assert_relative_eq!(rect.power(1.0), 3.0 * TWO_PI, epsilon = 1e-3);
    }
}
