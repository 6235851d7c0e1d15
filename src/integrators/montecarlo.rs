//! Monte Carlo path tracing.
//!
//! Two entry points share one Russian-roulette structure. The primary walk
//! accumulates direct and caustic light at every hit, then branches:
//! diffuse terminates into an indirect photon-map lookup, transmissive and
//! specular continue with an energy-conserving throughput update, and the
//! remaining probability absorbs the path. The indirect-sampling walk
//! passes through specular and transmissive surfaces only, queries the
//! global map at its first diffuse interaction, and returns.

use crate::core::common::Float;
use crate::core::geometry::Ray;
use crate::core::rgb::Rgb;
use crate::core::sampling::*;
use crate::integrators::raytracer::{RayTracer, Worker};
use rand::Rng;

impl RayTracer<'_> {
    /// Path-traces a ray, accumulating its radiance contribution scaled by
    /// the evolving path throughput.
    ///
    /// * `worker` - Worker state.
    /// * `ray`    - The ray to follow.
    /// * `color`  - Accumulates the result.
    pub fn path_trace(&self, worker: &mut Worker, ray: &mut Ray, color: &mut Rgb) {
        let config = self.config;
        if !config.monte_carlo {
            return;
        }

        let mut total_weight = Rgb::WHITE;

        for _ in 0..config.max_monte_depth {
            let hit = match self.scene.intersect(ray) {
                Some(hit) => hit,
                None => {
                    // Escaped into the background.
                    *color += total_weight * self.scene.background();
                    break;
                }
            };
            worker.counters.monte += 1;

            let brdf = hit.brdf;
            let view = (hit.point - ray.origin).normalize_or_zero();
            let cos_theta = hit.normal.dot(-view);

            // Terms sampled at every path vertex.
            let mut color_buffer = Rgb::BLACK;
            if config.ambient {
                color_buffer += self.scene_ambient;
            }
            if brdf.is_diffuse() || brdf.is_specular() {
                self.direct_illumination(
                    worker,
                    hit.point,
                    hit.normal,
                    ray.origin,
                    &mut color_buffer,
                    brdf,
                    true,
                );
            }
            if self.caustic_enabled() && brdf.is_diffuse() {
                self.caustic_illumination(
                    worker,
                    hit.point,
                    hit.normal,
                    &mut color_buffer,
                    brdf,
                    view,
                    cos_theta,
                );
            }
            *color += color_buffer * total_weight;

            // Fresnel carries the reflected share of transmission to the
            // specular branch.
            let mut r_coeff = 0.0;
            if config.specular && config.transmissive && config.fresnel && brdf.is_transparent() {
                r_coeff = reflection_coeff(cos_theta, brdf.index_of_refraction, config.ir_air);
            }

            let prob_diffuse = brdf.diffuse.max_channel();
            let mut prob_transmission = brdf.transmission.max_channel();
            let prob_specular = brdf.specular.max_channel() + r_coeff * prob_transmission;
            prob_transmission *= 1.0 - r_coeff;
            let prob_total = prob_diffuse
                + prob_transmission
                + prob_specular
                + brdf.emission.max_channel()
                + config.prob_absorb;

            let mut rand: Float = worker.rng.gen();
            if prob_total > 1.0 {
                rand *= prob_total;
            }

            let sampled_bounce;
            if rand < prob_diffuse {
                // Terminate into an indirect lookup at this diffuse hit.
                if self.indirect_enabled() {
                    let mut color_buffer = Rgb::BLACK;
                    self.indirect_illumination(
                        worker,
                        hit.point,
                        hit.normal,
                        &mut color_buffer,
                        brdf,
                        cos_theta,
                        true,
                    );
                    *color += color_buffer * total_weight / prob_diffuse;
                } else if self.photon_viz_enabled() && config.fast_global {
                    let mut color_buffer = Rgb::BLACK;
                    self.estimate_global_illumination(
                        worker,
                        hit.point,
                        hit.normal,
                        &mut color_buffer,
                        brdf,
                        view,
                        cos_theta,
                    );
                    *color += color_buffer * total_weight / prob_diffuse;
                }
                break;
            } else if rand < prob_diffuse + prob_transmission {
                if !config.transmissive {
                    break;
                }
                let exact = transmissive_bounce(
                    hit.normal,
                    view,
                    cos_theta,
                    brdf.index_of_refraction,
                    config.ir_air,
                );
                sampled_bounce = if config.distrib_transmissive {
                    specular_importance_sample(&mut worker.rng, exact, brdf.shininess, cos_theta)
                } else {
                    exact
                };
                worker.counters.transmissive += 1;
                total_weight *= brdf.transmission * ((1.0 - r_coeff) / prob_transmission);
            } else if rand < prob_diffuse + prob_transmission + prob_specular {
                if !config.specular {
                    break;
                }
                let exact = reflective_bounce(hit.normal, view, cos_theta);
                sampled_bounce = if config.distrib_specular {
                    specular_importance_sample(&mut worker.rng, exact, brdf.shininess, cos_theta)
                } else {
                    exact
                };
                worker.counters.specular += 1;
                total_weight *=
                    (brdf.specular + brdf.transmission * r_coeff) / prob_specular;
            } else {
                // Absorbed.
                break;
            }

            *ray = Ray::bounced(hit.point, sampled_bounce);
        }
    }

    /// Bounces through specular and transmissive surfaces until the first
    /// diffuse interaction, queries the global photon map there, and
    /// returns the estimate scaled by throughput and divided by the chosen
    /// branch probability.
    ///
    /// * `worker` - Worker state.
    /// * `ray`    - The ray to follow.
    /// * `color`  - Accumulates the result.
    pub fn indirect_sample(&self, worker: &mut Worker, ray: &mut Ray, color: &mut Rgb) {
        let config = self.config;
        let map = match self.maps.global.as_ref() {
            Some(map) => map,
            None => return,
        };

        let mut total_weight = Rgb::WHITE;

        for _ in 0..config.max_monte_depth {
            let hit = match self.scene.intersect(ray) {
                Some(hit) => hit,
                None => {
                    *color += total_weight * self.scene.background();
                    break;
                }
            };
            worker.counters.monte += 1;

            let brdf = hit.brdf;
            let view = (hit.point - ray.origin).normalize_or_zero();
            let cos_theta = hit.normal.dot(-view);

            let mut r_coeff = 0.0;
            if config.fresnel && brdf.is_transparent() {
                r_coeff = reflection_coeff(cos_theta, brdf.index_of_refraction, config.ir_air);
            }

            let prob_diffuse = brdf.diffuse.max_channel();
            let mut prob_transmission = brdf.transmission.max_channel();
            let prob_specular = brdf.specular.max_channel() + r_coeff * prob_transmission;
            prob_transmission *= 1.0 - r_coeff;
            let prob_total = prob_diffuse
                + prob_transmission
                + prob_specular
                + brdf.emission.max_channel()
                + config.prob_absorb;

            let mut rand: Float = worker.rng.gen();
            if prob_total > 1.0 {
                rand *= prob_total;
            }

            let sampled_bounce;
            if rand < prob_diffuse {
                // First diffuse interaction: sample the map and stop.
                let mut color_buffer = Rgb::BLACK;
                let exact = reflective_bounce(hit.normal, view, cos_theta);
                if config.irradiance_cache {
                    self.estimate_cached_radiance(
                        hit.point,
                        hit.normal,
                        &mut color_buffer,
                        brdf,
                        exact,
                        cos_theta,
                        map,
                        config.global_estimate_dist,
                    );
                } else {
                    self.estimate_radiance(
                        hit.point,
                        hit.normal,
                        &mut color_buffer,
                        brdf,
                        exact,
                        cos_theta,
                        map,
                        config.global_estimate_size,
                        config.global_estimate_dist,
                        config.global_filter,
                    );
                }
                *color += color_buffer * total_weight / prob_diffuse;
                break;
            } else if rand < prob_diffuse + prob_transmission {
                let exact = transmissive_bounce(
                    hit.normal,
                    view,
                    cos_theta,
                    brdf.index_of_refraction,
                    config.ir_air,
                );
                sampled_bounce = if config.distrib_transmissive {
                    specular_importance_sample(&mut worker.rng, exact, brdf.shininess, cos_theta)
                } else {
                    exact
                };
                worker.counters.transmissive += 1;
                total_weight *= brdf.transmission * ((1.0 - r_coeff) / prob_transmission);
            } else if rand < prob_diffuse + prob_transmission + prob_specular {
                let exact = reflective_bounce(hit.normal, view, cos_theta);
                sampled_bounce = if config.distrib_specular {
                    specular_importance_sample(&mut worker.rng, exact, brdf.shininess, cos_theta)
                } else {
                    exact
                };
                worker.counters.specular += 1;
                total_weight *=
                    (brdf.specular + brdf.transmission * r_coeff) / prob_specular;
            } else {
                break;
            }

            *ray = Ray::bounced(hit.point, sampled_bounce);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RenderConfig;
    use crate::photons::PhotonMaps;
    use crate::scene::simple::{SimpleScene, Surface};
    use crate::scene::{Brdf, Camera, LightBase, PointLight};
    use glam::Vec3;

    fn test_camera() -> Camera {
        Camera {
            eye: Vec3::new(0.0, 0.0, 5.0),
            towards: -Vec3::Z,
            up: Vec3::Y,
            xfov: 0.5,
            yfov: 0.5,
        }
    }

    /// Empty scene: every path escapes into the background immediately.
    #[test]
    fn background_weighted_by_throughput() {
        let mut scene =
            SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::new(0.25, 0.5, 0.75));
        let m = scene.add_material(Brdf::default());
        // A surface far away from the test ray.
        scene.add_surface(Surface::Sphere {
            center: Vec3::new(100.0, 0.0, 0.0),
            radius: 1.0,
            material: m,
        });
        scene.update_bounds();

        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);
        let mut worker = Worker::new(5, 0);

        let mut color = Rgb::BLACK;
        let mut ray = Ray::new(Vec3::ZERO, Vec3::Z);
        tracer.path_trace(&mut worker, &mut ray, &mut color);
        assert_eq!(color, Rgb::new(0.25, 0.5, 0.75));
    }

    #[test]
    fn disabled_monte_carlo_contributes_nothing() {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::WHITE);
        let m = scene.add_material(Brdf::default());
        scene.add_surface(Surface::Sphere { center: Vec3::ZERO, radius: 1.0, material: m });
        scene.update_bounds();

        let config = RenderConfig { monte_carlo: false, ..RenderConfig::default() };
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);
        let mut worker = Worker::new(6, 0);

        let mut color = Rgb::BLACK;
        let mut ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        tracer.path_trace(&mut worker, &mut ray, &mut color);
        assert!(color.is_black());
        assert_eq!(worker.counters.monte, 0);
    }

    /// A closed diffuse box lit by a point light: the path-traced mean is
    /// insensitive to the minimum absorption probability (Russian roulette
    /// reweighting keeps the estimator unbiased).
    #[test]
    fn absorption_probability_does_not_bias_the_mean() {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let walls = scene.add_material(Brdf {
            diffuse: Rgb::new(0.6, 0.6, 0.6),
            ..Brdf::default()
        });
        // An enclosing box of inward-facing quads.
        let s = 4.0;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::new(-s, -s, -s), Vec3::new(2.0 * s, 0.0, 0.0), Vec3::new(0.0, 2.0 * s, 0.0)),
            (Vec3::new(-s, -s, s), Vec3::new(0.0, 2.0 * s, 0.0), Vec3::new(2.0 * s, 0.0, 0.0)),
            (Vec3::new(-s, -s, -s), Vec3::new(0.0, 0.0, 2.0 * s), Vec3::new(2.0 * s, 0.0, 0.0)),
            (Vec3::new(-s, s, -s), Vec3::new(2.0 * s, 0.0, 0.0), Vec3::new(0.0, 0.0, 2.0 * s)),
            (Vec3::new(-s, -s, -s), Vec3::new(0.0, 2.0 * s, 0.0), Vec3::new(0.0, 0.0, 2.0 * s)),
            (Vec3::new(s, -s, -s), Vec3::new(0.0, 0.0, 2.0 * s), Vec3::new(0.0, 2.0 * s, 0.0)),
        ];
        for (corner, eu, ev) in faces {
            scene.add_surface(Surface::Quad {
                corner,
                edge_u: eu,
                edge_v: ev,
                normal: eu.cross(ev).normalize(),
                material: walls,
            });
        }
        scene.add_light(crate::scene::Light::Point(PointLight {
            base: LightBase { intensity: 4.0, ..LightBase::default() },
            position: Vec3::new(0.0, 0.0, 2.0),
        }));
        scene.update_bounds();

        let maps = PhotonMaps::empty();
        let mut means = Vec::new();
        for (seed, prob_absorb) in [(21u64, 0.005f32), (22, 0.05), (23, 0.2)] {
            let config = RenderConfig {
                prob_absorb,
                indirect: false,
                caustic: false,
                ..RenderConfig::default()
            };
            let tracer = RayTracer::new(&scene, &config, &maps);
            let mut worker = Worker::new(seed, 0);

            let samples = 1000;
            let mut mean: Float = 0.0;
            for _ in 0..samples {
                let mut color = Rgb::BLACK;
                let mut ray = Ray::new(Vec3::new(0.0, 0.0, 0.0), -Vec3::Z);
                tracer.path_trace(&mut worker, &mut ray, &mut color);
                mean += color.mean() / samples as Float;
            }
            means.push(mean);
        }

        for pair in means.windows(2) {
            let relative = (pair[0] - pair[1]).abs() / pair[0].max(pair[1]);
            assert!(relative < 0.2, "means diverged: {:?}", means);
        }
    }
}
