//! Direct illumination and shadow sampling.
//!
//! Per-light reflectance with occlusion. Point-like lights get a single
//! shadow ray; disk and rect area lights distribute light samples over
//! their surface for soft shadows, with an optional round of shadow-only
//! rays refining the visibility fraction. Inside Monte Carlo recursion the
//! sample budget drops to two light samples and no extra shadow rays.

use crate::core::common::{Float, EPSILON, PI};
use crate::core::geometry::Ray;
use crate::core::rgb::Rgb;
use crate::integrators::raytracer::{RayTracer, Worker};
use crate::scene::light::{area_sample_intensity, Light, LightSurface};
use crate::scene::Brdf;
use glam::Vec3;

impl RayTracer<'_> {
    /// Accumulates direct illumination from every light, plus the BRDF
    /// emission term when the point is not the dark back side of an area
    /// light.
    ///
    /// * `worker`         - Worker state.
    /// * `point`          - Shaded point.
    /// * `normal`         - Surface normal.
    /// * `eye`            - Position the point is viewed from.
    /// * `color`          - Accumulates the result.
    /// * `brdf`           - Material at the point.
    /// * `in_monte_carlo` - Whether the caller is inside a Monte Carlo
    ///                      recursion.
    #[allow(clippy::too_many_arguments)]
    pub fn direct_illumination(
        &self,
        worker: &mut Worker,
        point: Vec3,
        normal: Vec3,
        eye: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        in_monte_carlo: bool,
    ) {
        let mut should_emit = true;

        for light in self.scene.lights() {
            // A point on an area light emits instead of reflecting.
            match light.surface_hit(point, eye) {
                LightSurface::Front => continue,
                LightSurface::Back => {
                    should_emit = false;
                    continue;
                }
                LightSurface::Miss => {}
            }
            self.compute_illumination(worker, color, light, brdf, eye, point, normal, in_monte_carlo);
        }

        if should_emit {
            *color += brdf.emission;
        }
    }

    /// Reflectance from one light, with occlusion when shadows apply.
    #[allow(clippy::too_many_arguments)]
    fn compute_illumination(
        &self,
        worker: &mut Worker,
        color: &mut Rgb,
        light: &Light,
        brdf: &Brdf,
        eye: Vec3,
        point: Vec3,
        normal: Vec3,
        in_monte_carlo: bool,
    ) {
        if !light.is_active() {
            return;
        }
        let config = self.config;

        let compute_shadows =
            config.shadows && (!in_monte_carlo || config.recursive_shadows);

        // Deep bounces get a reduced budget to keep recursion tractable.
        let (num_light_samples, num_extra_shadow_samples) = if in_monte_carlo {
            (2, 0)
        } else {
            (config.light_test, config.shadow_test)
        };

        if !compute_shadows {
            *color +=
                light.reflection(brdf, eye, point, normal, &mut worker.rng, num_light_samples);
            return;
        }

        // Pick the shadow-test point for single-ray occlusion; soft-shadowed
        // area lights distribute the test over their surface instead.
        let point_on_light = match light {
            Light::Directional(l) => point - l.direction * self.scene_radius * 3.0,
            Light::Point(l) => l.position,
            Light::Spot(l) => l.position,
            Light::AreaDisk(l) => {
                if config.soft_shadows {
                    self.soft_area_reflection(
                        worker,
                        light,
                        color,
                        brdf,
                        eye,
                        point,
                        normal,
                        num_light_samples,
                        num_extra_shadow_samples,
                    );
                    return;
                }
                l.position + l.direction * EPSILON
            }
            Light::AreaRect(l) => {
                if config.soft_shadows {
                    self.soft_area_reflection(
                        worker,
                        light,
                        color,
                        brdf,
                        eye,
                        point,
                        normal,
                        num_light_samples,
                        num_extra_shadow_samples,
                    );
                    return;
                }
                l.position + l.direction * EPSILON
            }
        };

        if self.ray_illumination_test(worker, point, point_on_light) {
            *color +=
                light.reflection(brdf, eye, point, normal, &mut worker.rng, num_light_samples);
        }
    }

    /// Soft-shadowed reflectance from a disk or rect area light.
    ///
    /// Light samples double as shadow tests; unoccluded ones accumulate
    /// diffuse and specular reflectance (specular with double the sample
    /// count). Extra shadow-only rays then refine the visibility fraction,
    /// which scales this light's contribution.
    #[allow(clippy::too_many_arguments)]
    fn soft_area_reflection(
        &self,
        worker: &mut Worker,
        light: &Light,
        color: &mut Rgb,
        brdf: &Brdf,
        eye: Vec3,
        point: Vec3,
        normal: Vec3,
        num_light_samples: usize,
        num_extra_shadow_samples: usize,
    ) {
        let (center, light_norm, area) = match light {
            Light::AreaDisk(l) => (l.position, l.direction, l.area()),
            Light::AreaRect(l) => (l.position, l.direction, l.area()),
            _ => return,
        };

        // The back side does not emit.
        if light_norm.dot(point - center) < 0.0 {
            return;
        }

        let base = light.base();
        let mut contribution = Rgb::BLACK;
        let mut total_samples = 0usize;
        let mut total_hits = 0usize;

        if brdf.is_diffuse() {
            let mut weight = 0.0;
            let mut hits = 0usize;
            for _ in 0..num_light_samples {
                let sample_point = light.sample_surface_point(&mut worker.rng);
                if self.ray_illumination_test(worker, point, sample_point) {
                    hits += 1;
                    let (intensity, l) =
                        area_sample_intensity(base, light_norm, sample_point, point);
                    weight += intensity * normal.dot(l).abs();
                }
            }
            if hits > 0 {
                contribution +=
                    weight * brdf.diffuse * base.color * (area / hits as Float / PI);
            }
            total_hits += hits;
            total_samples += num_light_samples;
        }

        if brdf.is_specular() {
            let num_specular_samples = num_light_samples * 2;
            let v = (eye - point).normalize_or_zero();
            let mut weight = 0.0;
            let mut hits = 0usize;
            for _ in 0..num_specular_samples {
                let sample_point = light.sample_surface_point(&mut worker.rng);
                if self.ray_illumination_test(worker, point, sample_point) {
                    hits += 1;
                    let (intensity, l) =
                        area_sample_intensity(base, light_norm, sample_point, point);
                    let nl = normal.dot(l);
                    let r = normal * (2.0 * nl) - l;
                    let vr = v.dot(r);
                    if vr <= 0.0 {
                        continue;
                    }
                    weight += intensity * vr.powf(brdf.shininess);
                }
            }
            if hits > 0 {
                // The (n+2)/2π Phong normalization is omitted; it raises
                // variance sharply.
                contribution += weight * brdf.specular * base.color * (area / hits as Float);
            }
            total_hits += hits;
            total_samples += num_specular_samples;
        }

        let mut hits = 0usize;
        for _ in 0..num_extra_shadow_samples {
            let sample_point = light.sample_surface_point(&mut worker.rng);
            if self.ray_illumination_test(worker, point, sample_point) {
                hits += 1;
            }
        }
        total_hits += hits;
        total_samples += num_extra_shadow_samples;

        // Scale this light's contribution by the observed visibility.
        if total_samples > 0 {
            contribution *= total_hits as Float / total_samples as Float;
        }
        *color += contribution;
    }

    /// Tests visibility between a scene point and a point on a light.
    /// Returns true when nothing intervenes.
    ///
    /// * `worker`         - Worker state.
    /// * `point_in_scene` - The shaded point.
    /// * `point_on_light` - The light sample point.
    pub fn ray_illumination_test(
        &self,
        worker: &mut Worker,
        point_in_scene: Vec3,
        point_on_light: Vec3,
    ) -> bool {
        let unoccluded_len = point_on_light.distance(point_in_scene);

        let ray = Ray::between(point_on_light, point_in_scene);
        worker.counters.shadow += 1;

        match self.scene.intersect(&ray) {
            Some(hit) => (hit.t - unoccluded_len).abs() < EPSILON * (1.0 + unoccluded_len),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RenderConfig;
    use crate::photons::PhotonMaps;
    use crate::scene::simple::{SimpleScene, Surface};
    use crate::scene::{AreaRectLight, Camera, LightBase, PointLight};
    use crate::scene::SceneOracle;

    fn test_camera() -> Camera {
        Camera {
            eye: Vec3::new(0.0, 0.0, 5.0),
            towards: -Vec3::Z,
            up: Vec3::Y,
            xfov: 0.5,
            yfov: 0.5,
        }
    }

    fn diffuse_brdf() -> Brdf {
        Brdf { diffuse: Rgb::new(0.8, 0.8, 0.8), ..Brdf::default() }
    }

    /// Floor at z = 0 with a rect light overhead; optionally a blocking
    /// quad between them.
    fn shadow_scene(with_blocker: bool) -> SimpleScene {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let floor = scene.add_material(diffuse_brdf());
        scene.add_surface(Surface::Quad {
            corner: Vec3::new(-10.0, -10.0, 0.0),
            edge_u: Vec3::new(20.0, 0.0, 0.0),
            edge_v: Vec3::new(0.0, 20.0, 0.0),
            normal: Vec3::Z,
            material: floor,
        });
        if with_blocker {
            let blocker = scene.add_material(diffuse_brdf());
            scene.add_surface(Surface::Quad {
                corner: Vec3::new(-5.0, -5.0, 1.0),
                edge_u: Vec3::new(10.0, 0.0, 0.0),
                edge_v: Vec3::new(0.0, 10.0, 0.0),
                normal: Vec3::Z,
                material: blocker,
            });
        }
        scene.add_light(crate::scene::Light::AreaRect(AreaRectLight {
            base: LightBase::default(),
            position: Vec3::new(0.0, 0.0, 2.0),
            direction: -Vec3::Z,
            primary_axis: Vec3::X,
            secondary_axis: -Vec3::Y,
            primary_length: 1.0,
            secondary_length: 1.0,
        }));
        scene.update_bounds();
        scene
    }

    fn lit_color(scene: &SimpleScene, config: &RenderConfig) -> Rgb {
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(scene, config, &maps);
        let mut worker = Worker::new(1, 0);
        let mut color = Rgb::BLACK;
        tracer.direct_illumination(
            &mut worker,
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::Z,
            Vec3::new(0.0, 0.0, 5.0),
            &mut color,
            &diffuse_brdf(),
            false,
        );
        color
    }

    #[test]
    fn unoccluded_area_light_converges_to_full_visibility() {
        // With no occluder, the soft-shadowed result approaches the
        // shadow-free reflectance as samples grow.
        let scene = shadow_scene(false);
        let many_samples = RenderConfig { light_test: 256, shadow_test: 256, ..RenderConfig::default() };
        let no_shadows = RenderConfig { shadows: false, light_test: 256, ..RenderConfig::default() };

        let soft = lit_color(&scene, &many_samples);
        let free = lit_color(&scene, &no_shadows);

        assert!(soft.mean() > 0.0);
        let relative = (soft.mean() - free.mean()).abs() / free.mean();
        assert!(relative < 0.15, "soft {:?} vs unshadowed {:?}", soft, free);
    }

    #[test]
    fn fully_occluded_point_is_dark() {
        let scene = shadow_scene(true);
        let config = RenderConfig { light_test: 64, shadow_test: 64, ..RenderConfig::default() };
        let color = lit_color(&scene, &config);
        assert!(color.mean() < 1e-6, "occluded point got {:?}", color);
    }

    #[test]
    fn point_on_light_emits_instead_of_reflecting() {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let emissive = scene.add_material(Brdf {
            emission: Rgb::new(2.0, 2.0, 2.0),
            diffuse: Rgb::new(0.1, 0.1, 0.1),
            ..Brdf::default()
        });
        scene.add_surface(Surface::Quad {
            corner: Vec3::new(-0.5, 0.5, 2.0),
            edge_u: Vec3::new(1.0, 0.0, 0.0),
            edge_v: Vec3::new(0.0, -1.0, 0.0),
            normal: -Vec3::Z,
            material: emissive,
        });
        scene.add_light(crate::scene::Light::AreaRect(AreaRectLight {
            base: LightBase::default(),
            position: Vec3::new(0.0, 0.0, 2.0),
            direction: -Vec3::Z,
            primary_axis: Vec3::X,
            secondary_axis: -Vec3::Y,
            primary_length: 1.0,
            secondary_length: 1.0,
        }));
        scene.update_bounds();

        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);
        let mut worker = Worker::new(2, 0);

        // Seen from below: the point is on the emissive side.
        let mut color = Rgb::BLACK;
        tracer.direct_illumination(
            &mut worker,
            Vec3::new(0.0, 0.0, 2.0),
            -Vec3::Z,
            Vec3::new(0.0, 0.0, -5.0),
            &mut color,
            &scene.intersect(&Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z)).unwrap().brdf.clone(),
            false,
        );
        assert_eq!(color, Rgb::new(2.0, 2.0, 2.0));

        // Seen from above: the back side stays dark.
        let mut color = Rgb::BLACK;
        tracer.direct_illumination(
            &mut worker,
            Vec3::new(0.0, 0.0, 2.0),
            -Vec3::Z,
            Vec3::new(0.0, 0.0, 5.0),
            &mut color,
            &diffuse_brdf(),
            false,
        );
        assert!(color.is_black());
    }

    #[test]
    fn point_light_shadow_ray() {
        let mut scene = shadow_scene(false);
        scene.add_light(crate::scene::Light::Point(PointLight {
            base: LightBase::default(),
            position: Vec3::new(0.0, 0.0, 3.0),
        }));

        let config = RenderConfig { soft_shadows: false, ..RenderConfig::default() };
        let color = lit_color(&scene, &config);
        assert!(color.mean() > 0.0);
    }
}
