//! Photon emission and tracing.
//!
//! Each worker emits photons from every light in rounds, slowly approaching
//! its share of the stored-photon target, and scatters each photon through
//! the scene with Russian roulette. Deposits land in a worker-local buffer
//! that flushes in bulk into the shared store. After all workers join, the
//! arrays are normalized by the total light power and indexed with k-d
//! trees.

use crate::app::RenderConfig;
use crate::core::common::Float;
use crate::core::geometry::Ray;
use crate::core::rgb::Rgb;
use crate::core::rng::{worker_rng, WorkerRng};
use crate::core::sampling::*;
use crate::photons::kdtree::PhotonKdTree;
use crate::photons::photon::{MapKind, Photon};
use crate::photons::store::{LocalPhotonBuffer, PhotonStore};
use crate::scene::{Light, SceneOracle};
use glam::Vec3;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rayon::prelude::*;
use std::time::Instant;

/// Rejection attempts for spot-light cone sampling before the drop-off is
/// cheated to the cut-off angle.
const SPOT_SAMPLE_ATTEMPTS: usize = 20;

/// Consecutive empty emission rounds before a map is given up on.
const MAX_EMPTY_ROUNDS: usize = 10;

/// The built photon maps. A map that was not requested, or whose emission
/// produced no photons, is absent; the corresponding illumination mode is
/// disabled for the render.
#[derive(Default)]
pub struct PhotonMaps {
    /// Diffuse deposits from paths of any order.
    pub global: Option<PhotonKdTree>,

    /// Deposits reached through at least one non-diffuse bounce.
    pub caustic: Option<PhotonKdTree>,
}

impl PhotonMaps {
    /// Maps with no photons at all.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Traces photons into the scene and builds the requested photon maps.
///
/// * `scene`     - The scene.
/// * `config`    - Render configuration.
/// * `pool`      - Worker thread pool sized to `config.threads`.
/// * `base_seed` - Render-wide RNG seed.
pub fn map_photons(
    scene: &dyn SceneOracle,
    config: &RenderConfig,
    pool: &rayon::ThreadPool,
    base_seed: u64,
) -> PhotonMaps {
    if !config.wants_global_map() && !config.wants_caustic_map() {
        return PhotonMaps::empty();
    }
    if scene.lights().is_empty() {
        return PhotonMaps::empty();
    }

    // Photons are allocated across lights proportional to emitted power.
    let scene_radius = scene.bounding_radius();
    let light_powers: Vec<Float> = scene
        .lights()
        .iter()
        .map(|l| if l.is_active() { l.power(scene_radius) } else { 0.0 })
        .collect();
    let total_power: Float = light_powers.iter().sum();
    if total_power <= 0.0 {
        return PhotonMaps::empty();
    }

    let global_target = if config.wants_global_map() { config.global_photon_count } else { 0 };
    let caustic_target = if config.wants_caustic_map() { config.caustic_photon_count } else { 0 };

    let start = Instant::now();
    let store = PhotonStore::new();
    let threads = config.threads;

    pool.install(|| {
        (0..threads).into_par_iter().for_each(|worker_id| {
            // Worker 0 takes the division remainder of each target.
            let share = |target: usize| {
                let per_thread = target / threads;
                if worker_id == 0 {
                    per_thread + target % threads
                } else {
                    per_thread
                }
            };
            let mut worker = EmissionWorker {
                scene,
                config,
                store: &store,
                light_powers: &light_powers,
                total_power,
                rng: worker_rng(base_seed, worker_id),
                worker_id,
            };
            worker.run(share(global_target), share(caustic_target));
        });
    });
    let trace_duration = start.elapsed();

    // Freeze the arrays, reintroduce absolute power, and build the indexes.
    let global_emitted = store.emitted(MapKind::Global);
    let caustic_emitted = store.emitted(MapKind::Caustic);
    let (global, caustic) = store.into_arrays();

    let kd_start = Instant::now();
    let maps = PhotonMaps {
        global: build_map(MapKind::Global, global, total_power, global_emitted, global_target),
        caustic: build_map(MapKind::Caustic, caustic, total_power, caustic_emitted, caustic_target),
    };
    let kd_duration = kd_start.elapsed();

    if config.verbose {
        println!("Built photon maps ...");
        println!("  Photon Tracing = {:.2} seconds", trace_duration.as_secs_f32());
        println!("  KdTree Construction = {:.2} seconds", kd_duration.as_secs_f32());
        if let Some(map) = maps.global.as_ref() {
            println!("  # Global Photons Stored = {}", map.len());
        }
        if let Some(map) = maps.caustic.as_ref() {
            println!("  # Caustic Photons Stored = {}", map.len());
        }
    }

    maps
}

/// Normalizes a frozen photon array by the total light power and builds its
/// k-d tree. Returns `None` when the map was not requested or stored
/// nothing, disabling the corresponding illumination mode.
fn build_map(
    kind: MapKind,
    mut photons: Vec<Photon>,
    total_power: Float,
    emitted: u64,
    target: usize,
) -> Option<PhotonKdTree> {
    if target == 0 {
        return None;
    }
    if photons.is_empty() || emitted == 0 {
        warn!("{kind:?} photon map stored no photons; its illumination mode is disabled");
        return None;
    }

    let photon_power = total_power / emitted as Float;
    for photon in photons.iter_mut() {
        photon.set_power(photon.power() * photon_power);
    }
    Some(PhotonKdTree::build(photons))
}

/// Per-worker photon emission state.
struct EmissionWorker<'a> {
    scene: &'a dyn SceneOracle,
    config: &'a RenderConfig,
    store: &'a PhotonStore,
    light_powers: &'a [Float],
    total_power: Float,
    rng: WorkerRng,
    worker_id: usize,
}

impl EmissionWorker<'_> {
    /// Runs the global and caustic emission phases for this worker's share
    /// of the targets.
    fn run(&mut self, global_target: usize, caustic_target: usize) {
        if global_target > 0 {
            // The average path deposits a few photons; start high and let
            // the measured rate take over.
            self.emit_until(global_target, MapKind::Global, 4.0);
        }
        if caustic_target > 0 {
            self.emit_until(
                caustic_target,
                MapKind::Caustic,
                self.config.max_photon_depth as Float,
            );
        }
    }

    /// The adaptive emission loop: launches rounds sized from the measured
    /// stored-per-emitted rate until this worker's stored target is reached,
    /// halving the rate estimate on empty rounds and giving up after
    /// [`MAX_EMPTY_ROUNDS`] consecutive failures.
    ///
    /// * `target` - Stored-photon target for this worker.
    /// * `kind`   - Destination map.
    /// * `rate`   - Initial overestimate of the stored-per-emitted rate.
    fn emit_until(&mut self, target: usize, kind: MapKind, mut rate: Float) {
        let progress = self.phase_progress(target, kind);

        let scene = self.scene;
        let light_powers = self.light_powers;
        let total_power = self.total_power;

        let mut buffer = LocalPhotonBuffer::new(kind);
        let mut stored = 0usize;
        let mut emitted = 0u64;
        let mut slowdown: Float = 1.0;
        let mut empty_rounds = 0usize;

        while stored < target && empty_rounds < MAX_EMPTY_ROUNDS {
            let goal = ((target - stored) as Float / rate / slowdown) as usize + 1;

            let stored_before = stored;
            for (light, power) in scene.lights().iter().zip(light_powers) {
                let num_photons = (goal as Float * power / total_power).ceil() as usize;
                self.emit_photons(num_photons, light, kind, &mut buffer, &mut stored);
                emitted += num_photons as u64;
            }

            if stored > stored_before && emitted > 0 {
                empty_rounds = 0;
                rate = stored as Float / emitted as Float;
                // Approach slowly for the first 75% to avoid overshooting.
                slowdown = if rate < 0.75 { 2.0 } else { 1.0 };
            } else {
                rate /= 2.0;
                empty_rounds += 1;
            }

            if let Some(bar) = progress.as_ref() {
                bar.set_position(stored.min(target) as u64);
            }
        }

        buffer.flush(self.store);
        self.store.add_emitted(kind, emitted);

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }
    }

    /// Progress bar for an emission phase; only worker 0 reports.
    fn phase_progress(&self, target: usize, kind: MapKind) -> Option<ProgressBar> {
        if !self.config.verbose || self.worker_id != 0 {
            return None;
        }
        let name = match kind {
            MapKind::Global => "Global photons",
            MapKind::Caustic => "Caustic photons",
        };
        let bar = ProgressBar::new(target as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:25.cyan.bold} [{bar:40.green/white}] {pos:>8}/{len:8}")
                .progress_chars("█▓▒░  "),
        );
        bar.set_message(name);
        Some(bar)
    }

    /// Emits photons from one light into one map.
    ///
    /// * `num_photons` - Photons to emit.
    /// * `light`       - The light.
    /// * `kind`        - Destination map.
    /// * `buffer`      - Worker-local photon buffer.
    /// * `stored`      - Worker's stored-photon counter for this phase.
    fn emit_photons(
        &mut self,
        num_photons: usize,
        light: &Light,
        kind: MapKind,
        buffer: &mut LocalPhotonBuffer,
        stored: &mut usize,
    ) {
        if !light.is_active() || num_photons == 0 {
            return;
        }

        // Photons leave the light as unit-power carriers; absolute power is
        // reintroduced by the normalization pass after tracing.
        let photon = light.base().color.normalized_l1();

        match light {
            Light::Directional(l) => {
                // Emit from a large disk behind the scene.
                let radius = self.scene.bounding_radius();
                let center = self.scene.centroid() - l.direction * radius * 3.0;
                let (u, v) = crate::scene::light::plane_axes(l.direction);
                for _ in 0..num_photons {
                    let (r1, r2) = self.sample_unit_disk();
                    let origin = center + u * (r1 * radius) + v * (r2 * radius);
                    let ray = Ray::bounced(origin, l.direction);
                    self.photon_trace(ray, photon, kind, buffer, stored);
                }
            }
            Light::Point(l) => {
                for _ in 0..num_photons {
                    let direction = self.sample_unit_sphere();
                    let ray = Ray::new(l.position, direction);
                    self.photon_trace(ray, photon, kind, buffer, stored);
                }
            }
            Light::Spot(l) => {
                let cutoff = l.cut_off_angle.cos().abs();
                for _ in 0..num_photons {
                    let mut attempts_left = SPOT_SAMPLE_ATTEMPTS;
                    let mut direction = specular_importance_sample(
                        &mut self.rng,
                        l.direction,
                        l.drop_off_rate,
                        1.0,
                    );
                    while direction.dot(l.direction) < cutoff && attempts_left > 0 {
                        direction = specular_importance_sample(
                            &mut self.rng,
                            l.direction,
                            l.drop_off_rate,
                            1.0,
                        );
                        attempts_left -= 1;
                    }
                    if attempts_left == 0 {
                        // Cheat the drop-off to stay inside the cone.
                        direction = specular_importance_sample(
                            &mut self.rng,
                            l.direction,
                            l.drop_off_rate,
                            cutoff,
                        );
                    }
                    let ray = Ray::new(l.position, direction);
                    self.photon_trace(ray, photon, kind, buffer, stored);
                }
            }
            Light::AreaDisk(l) => {
                for _ in 0..num_photons {
                    let origin = l.sample_point(&mut self.rng);
                    let direction = diffuse_importance_sample(&mut self.rng, l.direction, 1.0);
                    let ray = Ray::new(origin, direction);
                    self.photon_trace(ray, photon, kind, buffer, stored);
                }
            }
            Light::AreaRect(l) => {
                for _ in 0..num_photons {
                    let origin = l.sample_point(&mut self.rng);
                    let direction = diffuse_importance_sample(&mut self.rng, l.direction, 1.0);
                    let ray = Ray::new(origin, direction);
                    self.photon_trace(ray, photon, kind, buffer, stored);
                }
            }
        }
    }

    /// Scatters one photon through the scene, depositing at diffuse
    /// surfaces according to the map's discipline.
    ///
    /// * `ray`    - Emission ray.
    /// * `photon` - Initial carried color.
    /// * `kind`   - Destination map.
    /// * `buffer` - Worker-local photon buffer.
    /// * `stored` - Worker's stored-photon counter for this phase.
    fn photon_trace(
        &mut self,
        mut ray: Ray,
        mut photon: Rgb,
        kind: MapKind,
        buffer: &mut LocalPhotonBuffer,
        stored: &mut usize,
    ) {
        let config = self.config;

        // Global maps deposit from the first diffuse hit; caustic maps only
        // once the path has taken a non-diffuse bounce. Fast-global skips
        // the first bounce to leave it to direct estimation.
        let mut can_store = kind == MapKind::Global && !config.fast_global;

        for _ in 0..config.max_photon_depth {
            let hit = match self.scene.intersect(&ray) {
                Some(hit) => hit,
                None => break,
            };
            let brdf = hit.brdf;
            let view = (hit.point - ray.origin).normalize_or_zero();
            let cos_theta = hit.normal.dot(-view);

            if brdf.is_diffuse() && can_store {
                buffer.store(Photon::new(hit.point, photon, view), self.store);
                *stored += 1;
            }

            // Fresnel carries the reflected share of transmission over to
            // the specular branch.
            let mut r_coeff = 0.0;
            if config.fresnel && brdf.is_transparent() {
                r_coeff = reflection_coeff(cos_theta, brdf.index_of_refraction, config.ir_air);
            }

            let max_channel = photon.max_channel();
            if max_channel <= 0.0 {
                break;
            }
            let prob_diffuse = (brdf.diffuse * photon).max_channel() / max_channel;
            let mut prob_transmission = (brdf.transmission * photon).max_channel() / max_channel;
            let prob_specular =
                (brdf.specular * photon).max_channel() / max_channel + r_coeff * prob_transmission;
            prob_transmission *= 1.0 - r_coeff;
            let prob_total =
                prob_diffuse + prob_transmission + prob_specular + config.prob_absorb;

            // Scale the draw up rather than normalizing the probabilities;
            // scaling down would also change the weight updates below.
            let mut rand: Float = self.rng.gen();
            if prob_total > 1.0 {
                rand *= prob_total;
            }

            let sampled_bounce;
            if rand < prob_diffuse {
                // Caustic paths end at their first diffuse interaction.
                if kind == MapKind::Caustic {
                    break;
                }
                can_store = true;
                sampled_bounce = diffuse_importance_sample(&mut self.rng, hit.normal, cos_theta);
                photon = photon * brdf.diffuse / prob_diffuse;
            } else if rand < prob_diffuse + prob_transmission {
                if kind == MapKind::Caustic {
                    can_store = true;
                }
                let exact = transmissive_bounce(
                    hit.normal,
                    view,
                    cos_theta,
                    brdf.index_of_refraction,
                    config.ir_air,
                );
                sampled_bounce = if config.distrib_transmissive {
                    specular_importance_sample(&mut self.rng, exact, brdf.shininess, cos_theta)
                } else {
                    exact
                };
                photon = photon * brdf.transmission / prob_transmission;
            } else if rand < prob_diffuse + prob_transmission + prob_specular {
                if kind == MapKind::Caustic {
                    can_store = true;
                }
                let exact = reflective_bounce(hit.normal, view, cos_theta);
                sampled_bounce = if config.distrib_specular {
                    specular_importance_sample(&mut self.rng, exact, brdf.shininess, cos_theta)
                } else {
                    exact
                };
                photon = photon * brdf.specular / prob_specular;
            } else {
                // Absorbed.
                break;
            }

            ray = Ray::bounced(hit.point, sampled_bounce);
        }
    }

    /// Uniform direction on the unit sphere by rejection in the unit cube.
    fn sample_unit_sphere(&mut self) -> Vec3 {
        loop {
            let v = Vec3::new(
                self.rng.gen::<Float>() * 2.0 - 1.0,
                self.rng.gen::<Float>() * 2.0 - 1.0,
                self.rng.gen::<Float>() * 2.0 - 1.0,
            );
            if v.length_squared() <= 1.0 && v.length_squared() > 0.0 {
                return v.normalize();
            }
        }
    }

    /// Uniform coordinates in the unit disk by rejection in the square.
    fn sample_unit_disk(&mut self) -> (Float, Float) {
        loop {
            let r1 = self.rng.gen::<Float>() * 2.0 - 1.0;
            let r2 = self.rng.gen::<Float>() * 2.0 - 1.0;
            if r1 * r1 + r2 * r2 <= 1.0 {
                return (r1, r2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::simple::{SimpleScene, Surface};
    use crate::scene::{AreaRectLight, Brdf, Camera, LightBase, PointLight};

    fn test_pool(threads: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    fn test_camera() -> Camera {
        Camera {
            eye: Vec3::new(0.0, 0.0, 5.0),
            towards: -Vec3::Z,
            up: Vec3::Y,
            xfov: 0.5,
            yfov: 0.5,
        }
    }

    fn diffuse_material() -> Brdf {
        Brdf { diffuse: Rgb::new(0.5, 0.5, 0.5), ..Brdf::default() }
    }

    fn glass_material() -> Brdf {
        Brdf {
            diffuse: Rgb::BLACK,
            transmission: Rgb::WHITE,
            index_of_refraction: 1.5,
            shininess: 1.0e6,
            ..Brdf::default()
        }
    }

    /// A huge diffuse floor under a small downward rect light.
    fn floor_and_rect_light() -> SimpleScene {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let floor = scene.add_material(diffuse_material());
        scene.add_surface(Surface::Quad {
            corner: Vec3::new(-100.0, -100.0, 0.0),
            edge_u: Vec3::new(200.0, 0.0, 0.0),
            edge_v: Vec3::new(0.0, 200.0, 0.0),
            normal: Vec3::Z,
            material: floor,
        });
        scene.add_light(crate::scene::Light::AreaRect(AreaRectLight {
            base: LightBase::default(),
            position: Vec3::new(0.0, 0.0, 1.0),
            direction: -Vec3::Z,
            primary_axis: Vec3::X,
            secondary_axis: -Vec3::Y,
            primary_length: 1.0,
            secondary_length: 1.0,
        }));
        scene.update_bounds();
        scene
    }

    fn single_bounce_config(target: usize) -> RenderConfig {
        RenderConfig {
            caustic: false,
            global_photon_count: target,
            max_photon_depth: 1,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn stored_power_matches_emitted_power() {
        // With depth one, every photon that reaches the floor deposits its
        // full unit carrier exactly once, so the normalized map holds the
        // light's total power.
        let scene = floor_and_rect_light();
        let config = single_bounce_config(2000);
        let pool = test_pool(1);

        let maps = map_photons(&scene, &config, &pool, 99);
        let map = maps.global.expect("global map should build");
        assert!(map.len() >= 2000);

        let stored_power: Float = map.photons().iter().map(|p| p.power().sum()).sum();
        let total_power = scene.lights()[0].power(scene.bounding_radius());
        let relative_error = (stored_power - total_power).abs() / total_power;
        assert!(
            relative_error < 0.05,
            "stored {stored_power} vs emitted {total_power}"
        );
    }

    #[test]
    fn photon_counts_stable_across_thread_counts() {
        let scene = floor_and_rect_light();
        let config_base = single_bounce_config(1200);

        let mut counts = Vec::new();
        for threads in [1usize, 2, 4] {
            let config = RenderConfig { threads, ..config_base.clone() };
            let pool = test_pool(threads);
            let maps = map_photons(&scene, &config, &pool, 7);
            counts.push(maps.global.expect("global map should build").len());
        }

        for &count in &counts {
            // Every worker meets its share of the target; overshoot is
            // bounded by the adaptive round size.
            assert!(count >= 1200);
            assert!(count < 1800, "stored {count} photons for target 1200");
        }
    }

    #[test]
    fn caustic_map_needs_a_specular_chain() {
        // An all-diffuse scene can never feed the caustic map; the mode is
        // disabled instead of looping forever.
        let scene = floor_and_rect_light();
        let config = RenderConfig {
            indirect: false,
            photon_viz: false,
            caustic_photon_count: 50,
            max_photon_depth: 4,
            ..RenderConfig::default()
        };
        let pool = test_pool(1);

        let maps = map_photons(&scene, &config, &pool, 5);
        assert!(maps.global.is_none());
        assert!(maps.caustic.is_none());
    }

    #[test]
    fn caustic_photons_focus_under_a_glass_sphere() {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let floor = scene.add_material(diffuse_material());
        let glass = scene.add_material(glass_material());
        scene.add_surface(Surface::Quad {
            corner: Vec3::new(-50.0, -50.0, 0.0),
            edge_u: Vec3::new(100.0, 0.0, 0.0),
            edge_v: Vec3::new(0.0, 100.0, 0.0),
            normal: Vec3::Z,
            material: floor,
        });
        scene.add_surface(Surface::Sphere {
            center: Vec3::new(0.0, 0.0, 2.0),
            radius: 1.0,
            material: glass,
        });
        scene.add_light(crate::scene::Light::Point(PointLight {
            base: LightBase::default(),
            position: Vec3::new(0.0, 0.0, 5.0),
        }));
        scene.update_bounds();

        let config = RenderConfig {
            indirect: false,
            photon_viz: false,
            caustic_photon_count: 500,
            max_photon_depth: 8,
            ..RenderConfig::default()
        };
        let pool = test_pool(1);
        let maps = map_photons(&scene, &config, &pool, 13);
        let caustic = maps.caustic.expect("caustic map should build");
        assert!(caustic.len() >= 500);

        // The lens concentrates photons near the axis below the sphere.
        let below = caustic.k_nearest_within(Vec3::ZERO, 1.0, usize::MAX).len();
        let outside = caustic
            .k_nearest_within(Vec3::new(20.0, 20.0, 0.0), 1.0, usize::MAX)
            .len();
        assert!(below > 10);
        assert!(below > 2 * outside.max(1));
    }
}
