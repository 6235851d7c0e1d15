//! The rendering-equation evaluator.
//!
//! At every primary hit the evaluator composes ambient, direct, specular,
//! transmissive, indirect, and caustic terms. Specular and transmissive
//! terms recurse into the Monte Carlo path tracer; indirect terms sample
//! the global photon map through short secondary walks; caustic terms query
//! the caustic map in place.

use crate::app::RenderConfig;
use crate::core::common::Float;
use crate::core::geometry::Ray;
use crate::core::rgb::Rgb;
use crate::core::rng::{worker_rng, WorkerRng};
use crate::core::sampling::*;
use crate::photons::PhotonMaps;
use crate::scene::{Brdf, Hit, SceneOracle};
use crate::stats::RayCounters;
use glam::Vec3;

/// Per-worker mutable state threaded through the evaluator call chain.
pub struct Worker {
    /// Random number generator.
    pub rng: WorkerRng,

    /// Ray counts, folded into the shared totals at worker exit.
    pub counters: RayCounters,
}

impl Worker {
    /// Creates the state for one worker.
    ///
    /// * `base_seed` - Render-wide base seed.
    /// * `worker_id` - Worker index.
    pub fn new(base_seed: u64, worker_id: usize) -> Self {
        Self {
            rng: worker_rng(base_seed, worker_id),
            counters: RayCounters::default(),
        }
    }
}

/// The shared, immutable render state every worker evaluates against.
pub struct RayTracer<'a> {
    /// The scene.
    pub scene: &'a dyn SceneOracle,

    /// Render configuration.
    pub config: &'a RenderConfig,

    /// The built photon maps.
    pub maps: &'a PhotonMaps,

    /// Bounding radius of the scene.
    pub scene_radius: Float,

    /// Scene-wide ambient color.
    pub scene_ambient: Rgb,
}

impl<'a> RayTracer<'a> {
    /// Creates an evaluator over a scene and its photon maps.
    ///
    /// * `scene`  - The scene.
    /// * `config` - Render configuration.
    /// * `maps`   - The built photon maps.
    pub fn new(scene: &'a dyn SceneOracle, config: &'a RenderConfig, maps: &'a PhotonMaps) -> Self {
        Self {
            scene,
            config,
            maps,
            scene_radius: scene.bounding_radius(),
            scene_ambient: scene.ambient(),
        }
    }

    /// Indirect illumination runs only with a built global map.
    pub fn indirect_enabled(&self) -> bool {
        self.config.indirect && self.maps.global.is_some()
    }

    /// Caustic illumination runs only with a built caustic map.
    pub fn caustic_enabled(&self) -> bool {
        self.config.caustic && self.maps.caustic.is_some()
    }

    /// Direct photon-map visualization runs only with a built global map.
    pub fn photon_viz_enabled(&self) -> bool {
        self.config.photon_viz && self.maps.global.is_some()
    }

    /// Evaluates the rendering equation at a primary hit.
    ///
    /// * `worker` - Worker state.
    /// * `hit`    - The primary intersection.
    /// * `eye`    - Eye position the hit is viewed from.
    /// * `color`  - Accumulates the resulting radiance.
    pub fn ray_trace(&self, worker: &mut Worker, hit: &Hit, eye: Vec3, color: &mut Rgb) {
        let config = self.config;
        let brdf = hit.brdf;

        if config.ambient {
            *color += self.scene_ambient;
        }

        let view = (hit.point - eye).normalize_or_zero();
        let cos_theta = hit.normal.dot(-view);
        let mut r_coeff = 0.0;

        if config.ambient && brdf.is_ambient() {
            *color += brdf.ambient;
        }
        if config.direct && (brdf.is_diffuse() || brdf.is_specular()) {
            self.direct_illumination(worker, hit.point, hit.normal, eye, color, brdf, false);
        }
        if config.transmissive && brdf.is_transparent() {
            // The Fresnel split carries the reflected share over to the
            // specular term.
            if config.specular && config.fresnel {
                r_coeff = reflection_coeff(cos_theta, brdf.index_of_refraction, config.ir_air);
            }
            if r_coeff < 1.0 {
                self.transmissive_illumination(
                    worker,
                    hit.point,
                    hit.normal,
                    color,
                    brdf,
                    view,
                    cos_theta,
                    1.0 - r_coeff,
                );
            }
        }
        if config.specular && (brdf.is_specular() || r_coeff > 0.0) {
            self.specular_illumination(
                worker, hit.point, hit.normal, color, brdf, view, cos_theta, r_coeff,
            );
        }
        if self.indirect_enabled() && brdf.is_diffuse() {
            self.indirect_illumination(worker, hit.point, hit.normal, color, brdf, cos_theta, false);
        }
        if self.caustic_enabled() && brdf.is_diffuse() {
            self.caustic_illumination(worker, hit.point, hit.normal, color, brdf, view, cos_theta);
        }
        if self.photon_viz_enabled() && brdf.is_diffuse() {
            self.estimate_global_illumination(
                worker, hit.point, hit.normal, color, brdf, view, cos_theta,
            );
        }
    }

    /// Transmissive term: distributes refracted samples into the path
    /// tracer, with the budget scaled by the term's contribution.
    #[allow(clippy::too_many_arguments)]
    pub fn transmissive_illumination(
        &self,
        worker: &mut Worker,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        view: Vec3,
        cos_theta: Float,
        t_coeff: Float,
    ) {
        let config = self.config;
        let exact =
            transmissive_bounce(normal, view, cos_theta, brdf.index_of_refraction, config.ir_air);

        // Low-contribution lobes get fewer samples.
        let total_weight = brdf.transmission * t_coeff;
        let budget = config.transmissive_test as Float;
        let num_samples =
            ((budget * total_weight.max_channel() + budget) / 2.0).ceil() as usize;

        let mut buffer = Rgb::BLACK;
        for _ in 0..num_samples {
            let sampled = if config.distrib_transmissive {
                specular_importance_sample(&mut worker.rng, exact, brdf.shininess, cos_theta)
            } else {
                exact
            };
            let mut ray = Ray::bounced(point, sampled);
            self.path_trace(worker, &mut ray, &mut buffer);
            worker.counters.transmissive += 1;
        }
        *color += buffer / num_samples as Float * total_weight;
    }

    /// Specular term: mirror of the transmissive term, including the
    /// Fresnel-reflected share of transmission.
    #[allow(clippy::too_many_arguments)]
    pub fn specular_illumination(
        &self,
        worker: &mut Worker,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        view: Vec3,
        cos_theta: Float,
        r_coeff: Float,
    ) {
        let config = self.config;
        let exact = reflective_bounce(normal, view, cos_theta);

        let total_weight = brdf.transmission * r_coeff + brdf.specular;
        let budget = config.specular_test as Float;
        let num_samples =
            ((budget * total_weight.max_channel() + budget) / 2.0).ceil() as usize;

        let mut buffer = Rgb::BLACK;
        for _ in 0..num_samples {
            let sampled = if config.distrib_specular {
                specular_importance_sample(&mut worker.rng, exact, brdf.shininess, cos_theta)
            } else {
                exact
            };
            let mut ray = Ray::bounced(point, sampled);
            self.path_trace(worker, &mut ray, &mut buffer);
            worker.counters.specular += 1;
        }
        *color += buffer / num_samples as Float * total_weight;
    }

    /// Indirect diffuse term: cosine-sampled secondary walks that query the
    /// global photon map at their first diffuse interaction.
    pub fn indirect_illumination(
        &self,
        worker: &mut Worker,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        cos_theta: Float,
        in_monte_carlo: bool,
    ) {
        if !brdf.is_diffuse() {
            return;
        }

        let total_weight = brdf.diffuse;
        let num_samples = if in_monte_carlo {
            1
        } else {
            let budget = self.config.indirect_test as Float;
            ((budget * total_weight.max_channel() + budget) / 2.0).ceil() as usize
        };

        let mut buffer = Rgb::BLACK;
        for _ in 0..num_samples {
            let sampled = diffuse_importance_sample(&mut worker.rng, normal, cos_theta);
            let mut ray = Ray::bounced(point, sampled);
            self.indirect_sample(worker, &mut ray, &mut buffer);
            worker.counters.indirect += 1;
        }
        *color += buffer / num_samples as Float * total_weight;
    }

    /// Caustic term: queries the caustic map in place.
    pub fn caustic_illumination(
        &self,
        worker: &mut Worker,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        view: Vec3,
        cos_theta: Float,
    ) {
        if !brdf.is_diffuse() {
            return;
        }
        let map = match self.maps.caustic.as_ref() {
            Some(map) => map,
            None => return,
        };
        let config = self.config;

        let exact = reflective_bounce(normal, view, cos_theta);
        self.estimate_radiance(
            point,
            normal,
            color,
            brdf,
            exact,
            cos_theta,
            map,
            config.caustic_estimate_size,
            config.caustic_estimate_dist,
            config.caustic_filter,
        );
        worker.counters.caustic += 1;
    }

    /// Direct visualization of the global map at a diffuse hit.
    pub fn estimate_global_illumination(
        &self,
        worker: &mut Worker,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        view: Vec3,
        cos_theta: Float,
    ) {
        if !brdf.is_diffuse() {
            return;
        }
        let map = match self.maps.global.as_ref() {
            Some(map) => map,
            None => return,
        };
        let config = self.config;

        let exact = reflective_bounce(normal, view, cos_theta);
        if config.irradiance_cache {
            self.estimate_cached_radiance(
                point,
                normal,
                color,
                brdf,
                exact,
                cos_theta,
                map,
                config.global_estimate_dist,
            );
        } else {
            self.estimate_radiance(
                point,
                normal,
                color,
                brdf,
                exact,
                cos_theta,
                map,
                config.global_estimate_size,
                config.global_estimate_dist,
                config.global_filter,
            );
            worker.counters.indirect += 1;
        }
    }
}
