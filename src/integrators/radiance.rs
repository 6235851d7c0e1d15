//! Photon-map radiance estimation.
//!
//! A k-nearest density estimate: photons inside the search radius are run
//! through a Phong-like BRDF and summed, then normalized by the disk the
//! photons were gathered from. Cone and gaussian kernels weight photons
//! down with distance to sharpen the estimate. The cached variant returns
//! the single nearest correctly-oriented photon for fast, noisy previews.

use crate::app::EstimateFilter;
use crate::core::common::{Float, E, EPSILON, PI};
use crate::core::rgb::Rgb;
use crate::integrators::raytracer::RayTracer;
use crate::photons::{Photon, PhotonKdTree};
use crate::scene::Brdf;
use glam::Vec3;

/// Cone filter constant k (Jensen).
const FILTER_CONST_K: Float = 1.1;

/// Gaussian filter scale α (Jensen).
const FILTER_CONST_A: Float = 0.918;

/// Gaussian filter falloff β (Jensen).
const FILTER_CONST_B: Float = 1.953;

impl RayTracer<'_> {
    /// Estimates reflected radiance at a point from a photon map.
    ///
    /// * `point`         - The estimate point.
    /// * `normal`        - Surface normal at the point.
    /// * `color`         - Accumulates the estimate.
    /// * `brdf`          - Material at the point.
    /// * `exact_bounce`  - Mirror reflection of the view direction; drives
    ///                     the specular lobe of the per-photon BRDF.
    /// * `cos_theta`     - Sign of the viewing side; photons arriving from
    ///                     the other side are discarded.
    /// * `photon_map`    - The map to query.
    /// * `estimate_size` - Maximum photons per estimate.
    /// * `estimate_dist` - Search radius.
    /// * `filter`        - Density filter kernel.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_radiance(
        &self,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        exact_bounce: Vec3,
        cos_theta: Float,
        photon_map: &PhotonKdTree,
        estimate_size: usize,
        estimate_dist: Float,
        filter: EstimateFilter,
    ) {
        let nearby = photon_map.k_nearest_within(point, estimate_dist, estimate_size);
        if nearby.is_empty() {
            return;
        }

        // Radius of the gathered disk; the configured radius when the
        // gather came up short of its photon count.
        let mut max_dist_squared = EPSILON;
        if nearby.len() < estimate_size {
            max_dist_squared = estimate_dist * estimate_dist;
        } else {
            for neighbor in nearby.iter() {
                if neighbor.distance_squared > max_dist_squared {
                    max_dist_squared = neighbor.distance_squared;
                }
            }
        }

        let (fweight_c1, fweight_c2) = match filter {
            EstimateFilter::Disk => (1.0, 1.0),
            EstimateFilter::Cone => (1.0 / (FILTER_CONST_K * max_dist_squared.sqrt()), 1.0),
            EstimateFilter::Gauss => (E.powf(-FILTER_CONST_B), 1.0 / (2.0 * max_dist_squared)),
        };

        let mut estimate = Rgb::BLACK;
        let mut total_fweight = 0.0;
        for neighbor in nearby.iter() {
            let photon = &photon_map.photons()[neighbor.index];

            let incident = photon.incoming_direction();
            if wrong_side(normal, incident, cos_theta) {
                continue;
            }

            let mut photon_color =
                photon_contribution(photon, incident, normal, brdf, exact_bounce);

            match filter {
                EstimateFilter::Disk => {}
                EstimateFilter::Cone => {
                    photon_color *= 1.0 - fweight_c1 * neighbor.distance_squared.sqrt();
                }
                EstimateFilter::Gauss => {
                    let falloff = fweight_c1.powf(fweight_c2 * neighbor.distance_squared);
                    let weight = 1.0 - (1.0 - falloff) / (1.0 - fweight_c1);
                    photon_color *= weight;
                    total_fweight += weight;
                }
            }
            estimate += photon_color;
        }

        match filter {
            EstimateFilter::Disk => {
                estimate /= PI * max_dist_squared;
            }
            EstimateFilter::Cone => {
                estimate /= (1.0 - 2.0 / 3.0 / FILTER_CONST_K) * PI * max_dist_squared;
            }
            EstimateFilter::Gauss => {
                if total_fweight > 0.0 {
                    estimate *= FILTER_CONST_A * (nearby.len() as Float / total_fweight)
                        / (PI * max_dist_squared);
                }
            }
        }

        *color += estimate;
    }

    /// The cached estimate: the contribution of the single nearest photon
    /// whose incoming direction is on the viewing side.
    ///
    /// * `point`        - The estimate point.
    /// * `normal`       - Surface normal at the point.
    /// * `color`        - Accumulates the estimate.
    /// * `brdf`         - Material at the point.
    /// * `exact_bounce` - Mirror reflection of the view direction.
    /// * `cos_theta`    - Sign of the viewing side.
    /// * `photon_map`   - The map to query.
    /// * `estimate_dist`- Search radius.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_cached_radiance(
        &self,
        point: Vec3,
        normal: Vec3,
        color: &mut Rgb,
        brdf: &Brdf,
        exact_bounce: Vec3,
        cos_theta: Float,
        photon_map: &PhotonKdTree,
        estimate_dist: Float,
    ) {
        let mut search_from = 0.0;
        loop {
            let (photon, distance) =
                match photon_map.closest_beyond(point, search_from, estimate_dist) {
                    Some(found) => found,
                    None => return,
                };

            let incident = photon.incoming_direction();
            if !wrong_side(normal, incident, cos_theta) {
                *color += photon_contribution(photon, incident, normal, brdf, exact_bounce);
                return;
            }
            // Wrong-side photon: resume the search just past it.
            search_from = distance + EPSILON;
        }
    }

}

/// True when a photon arrived from the far side of the surface relative to
/// the viewer.
fn wrong_side(normal: Vec3, incident: Vec3, cos_theta: Float) -> bool {
    let perp_component = normal.dot(incident);
    (cos_theta < 0.0 && perp_component < 0.0) || (cos_theta > 0.0 && perp_component > 0.0)
}

/// One photon's contribution through the Phong-like BRDF.
fn photon_contribution(
    photon: &Photon,
    incident: Vec3,
    normal: Vec3,
    brdf: &Brdf,
    exact_bounce: Vec3,
) -> Rgb {
    let perp_component = normal.dot(incident);

    // Specular alignment, clamped to the front lobe.
    let cos_alpha = exact_bounce.dot(-incident).max(0.0);

    photon.power()
        * (perp_component.abs() * brdf.diffuse
            + cos_alpha.powf(brdf.shininess) * brdf.specular)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RenderConfig;
    use crate::photons::PhotonMaps;
    use crate::scene::simple::{SimpleScene, Surface};
    use crate::scene::Camera;

    fn test_scene() -> SimpleScene {
        let mut scene = SimpleScene::new(
            Camera {
                eye: Vec3::new(0.0, 0.0, 5.0),
                towards: -Vec3::Z,
                up: Vec3::Y,
                xfov: 0.5,
                yfov: 0.5,
            },
            Rgb::BLACK,
            Rgb::BLACK,
        );
        let m = scene.add_material(Brdf::default());
        scene.add_surface(Surface::Quad {
            corner: Vec3::new(-10.0, -10.0, 0.0),
            edge_u: Vec3::new(20.0, 0.0, 0.0),
            edge_v: Vec3::new(0.0, 20.0, 0.0),
            normal: Vec3::Z,
            material: m,
        });
        scene.update_bounds();
        scene
    }

    /// A ring of photons around the origin, all arriving straight down.
    fn ring_map(count: usize, radius: Float, power: Float) -> PhotonKdTree {
        let photons = (0..count)
            .map(|i| {
                let angle = i as Float / count as Float * 2.0 * PI;
                Photon::new(
                    Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0),
                    Rgb::new(power, power, power),
                    -Vec3::Z,
                )
            })
            .collect();
        PhotonKdTree::build(photons)
    }

    fn diffuse_brdf() -> Brdf {
        Brdf { diffuse: Rgb::WHITE, ..Brdf::default() }
    }

    #[test]
    fn disk_estimate_density() {
        let scene = test_scene();
        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);

        // 100 unit-power photons inside radius 0.5: the disk estimate sees
        // all of them; the gather radius is the configured 1.0 because the
        // requested count was not reached.
        let map = ring_map(100, 0.5, 1.0);
        let mut color = Rgb::BLACK;
        tracer.estimate_radiance(
            Vec3::ZERO,
            Vec3::Z,
            &mut color,
            &diffuse_brdf(),
            Vec3::Z,
            1.0,
            &map,
            200,
            1.0,
            EstimateFilter::Disk,
        );
        let expected = 100.0 / PI;
        assert!((color.r - expected).abs() / expected < 0.02, "got {:?}", color);
    }

    #[test]
    fn wrong_side_photons_are_discarded() {
        let scene = test_scene();
        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);

        // Photons arriving from below the surface contribute nothing to a
        // viewer above it.
        let photons = vec![Photon::new(Vec3::new(0.1, 0.0, 0.0), Rgb::WHITE, Vec3::Z)];
        let map = PhotonKdTree::build(photons);

        let mut color = Rgb::BLACK;
        tracer.estimate_radiance(
            Vec3::ZERO,
            Vec3::Z,
            &mut color,
            &diffuse_brdf(),
            Vec3::Z,
            1.0,
            &map,
            10,
            1.0,
            EstimateFilter::Disk,
        );
        assert!(color.is_black());
    }

    #[test]
    fn cone_filter_tightens_the_estimate() {
        let scene = test_scene();
        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);
        let map = ring_map(64, 0.9, 1.0);

        let mut disk = Rgb::BLACK;
        let mut cone = Rgb::BLACK;
        for (filter, color) in
            [(EstimateFilter::Disk, &mut disk), (EstimateFilter::Cone, &mut cone)]
        {
            tracer.estimate_radiance(
                Vec3::ZERO,
                Vec3::Z,
                color,
                &diffuse_brdf(),
                Vec3::Z,
                1.0,
                &map,
                64,
                1.0,
                filter,
            );
        }
        // Every photon sits near the rim, where the cone weight is small.
        assert!(cone.r < disk.r);
        assert!(cone.r > 0.0);
    }

    #[test]
    fn cached_estimate_skips_wrong_side_photons() {
        let scene = test_scene();
        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);

        // The nearest photon arrives from below; the next one from above.
        let photons = vec![
            Photon::new(Vec3::new(0.1, 0.0, 0.0), Rgb::WHITE, Vec3::Z),
            Photon::new(Vec3::new(0.3, 0.0, 0.0), Rgb::WHITE, -Vec3::Z),
        ];
        let map = PhotonKdTree::build(photons);

        let mut color = Rgb::BLACK;
        tracer.estimate_cached_radiance(
            Vec3::ZERO,
            Vec3::Z,
            &mut color,
            &diffuse_brdf(),
            Vec3::Z,
            1.0,
            &map,
            1.0,
        );
        assert!(color.r > 0.9 && color.r < 1.1, "got {:?}", color);
    }

    #[test]
    fn gauss_filter_normalizes_by_total_weight() {
        let scene = test_scene();
        let config = RenderConfig::default();
        let maps = PhotonMaps::empty();
        let tracer = RayTracer::new(&scene, &config, &maps);

        // Photons all at the same distance get equal gaussian weights, so
        // the (n / Σw) normalization cancels and only α and the disk term
        // remain.
        let map = ring_map(32, 0.5, 1.0);
        let mut color = Rgb::BLACK;
        tracer.estimate_radiance(
            Vec3::ZERO,
            Vec3::Z,
            &mut color,
            &diffuse_brdf(),
            Vec3::Z,
            1.0,
            &map,
            32,
            1.0,
            EstimateFilter::Gauss,
        );
        let max_dist_squared = 0.25;
        let expected = FILTER_CONST_A * 32.0 / (PI * max_dist_squared);
        assert!((color.r - expected).abs() / expected < 0.02, "got {:?}", color);
    }
}
