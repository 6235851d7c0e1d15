//! Program options and render configuration.

use crate::core::common::{Float, EPSILON};
use clap::{Parser, ValueEnum};

/// Density-estimate filter kernels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EstimateFilter {
    /// Flat disk: divide the sum by π·r².
    Disk,

    /// Cone filter: photons weighted down linearly with distance.
    Cone,

    /// Gaussian filter centered on the estimate point.
    Gauss,
}

/// Command line options.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Options {
    /// Path to the scene description.
    #[arg(help = "Input scene file")]
    pub scene: String,

    /// Path to the output image.
    #[arg(help = "Output image file")]
    pub image: String,

    /// Number of worker threads.
    #[arg(long, short = 't', value_name = "NUM", default_value_t = 1)]
    pub threads: usize,

    /// Anti-alias by supersampling 4^K eye rays per pixel.
    #[arg(long, value_name = "K", default_value_t = 2)]
    pub aa: u32,

    /// Output image dimensions in pixels.
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"],
          default_values_t = [1024, 1024])]
    pub resolution: Vec<usize>,

    /// Print rendering statistics.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Normalize material reflectance channels to at most one on load.
    #[arg(long)]
    pub real: bool,

    /// Refractive index of the exterior medium.
    #[arg(long, value_name = "X", default_value_t = 1.0)]
    pub ir: Float,

    /// Disable the Fresnel split between reflection and transmission.
    #[arg(long)]
    pub no_fresnel: bool,

    /// Disable the ambient term.
    #[arg(long)]
    pub no_ambient: bool,

    /// Disable direct illumination.
    #[arg(long)]
    pub no_direct: bool,

    /// Disable transmissive illumination.
    #[arg(long)]
    pub no_transmissive: bool,

    /// Disable specular illumination.
    #[arg(long)]
    pub no_specular: bool,

    /// Disable indirect illumination.
    #[arg(long)]
    pub no_indirect: bool,

    /// Disable caustic illumination.
    #[arg(long)]
    pub no_caustic: bool,

    /// Visualize the global photon map directly.
    #[arg(long)]
    pub photon_viz: bool,

    /// Visualize the global map while skipping first-bounce storage; cheap
    /// approximate global illumination.
    #[arg(long)]
    pub fast_global: bool,

    /// Disable Monte Carlo path tracing.
    #[arg(long)]
    pub no_monte: bool,

    /// Maximum Monte Carlo path depth.
    #[arg(long = "md", value_name = "N", default_value_t = 128)]
    pub max_monte_depth: usize,

    /// Minimum absorption probability per bounce.
    #[arg(long = "absorb", value_name = "P", default_value_t = 0.005)]
    pub prob_absorb: Float,

    /// Disable shadow tests inside Monte Carlo recursion.
    #[arg(long = "no-rs")]
    pub no_recursive_shadows: bool,

    /// Disable importance-sampled transmissive perturbation.
    #[arg(long = "no-dt")]
    pub no_distrib_transmissive: bool,

    /// Disable importance-sampled specular perturbation.
    #[arg(long = "no-ds")]
    pub no_distrib_specular: bool,

    /// Transmissive samples per primary hit.
    #[arg(long = "tt", value_name = "N", default_value_t = 128)]
    pub transmissive_test: usize,

    /// Specular samples per primary hit.
    #[arg(long = "st", value_name = "N", default_value_t = 128)]
    pub specular_test: usize,

    /// Indirect samples per primary hit.
    #[arg(long = "it", value_name = "N", default_value_t = 256)]
    pub indirect_test: usize,

    /// Target stored photons for the global map.
    #[arg(long = "global", value_name = "N", default_value_t = 1920)]
    pub global_photon_count: usize,

    /// Target stored photons for the caustic map.
    #[arg(long = "caustic", value_name = "N", default_value_t = 300_000)]
    pub caustic_photon_count: usize,

    /// Maximum photon path depth.
    #[arg(long = "pd", value_name = "N", default_value_t = 128)]
    pub max_photon_depth: usize,

    /// Global-map estimate size (photons per lookup).
    #[arg(long = "gs", value_name = "N", default_value_t = 50)]
    pub global_estimate_size: usize,

    /// Global-map estimate radius.
    #[arg(long = "gd", value_name = "X", default_value_t = 2.5)]
    pub global_estimate_dist: Float,

    /// Caustic-map estimate size (photons per lookup).
    #[arg(long = "cs", value_name = "N", default_value_t = 200)]
    pub caustic_estimate_size: usize,

    /// Caustic-map estimate radius.
    #[arg(long = "cd", value_name = "X", default_value_t = 1.0)]
    pub caustic_estimate_dist: Float,

    /// Filter kernel for global-map estimates.
    #[arg(long, value_enum, default_value_t = EstimateFilter::Cone)]
    pub global_filter: EstimateFilter,

    /// Filter kernel for caustic-map estimates.
    #[arg(long, value_enum, default_value_t = EstimateFilter::Disk)]
    pub caustic_filter: EstimateFilter,

    /// Use the cached single-photon radiance estimate (fast, noisy).
    #[arg(long)]
    pub cache: bool,

    /// Disable shadows entirely.
    #[arg(long)]
    pub no_shadow: bool,

    /// Disable soft shadows for area lights.
    #[arg(long)]
    pub no_ss: bool,

    /// Light samples per area light.
    #[arg(long = "lt", value_name = "N", default_value_t = 128)]
    pub light_test: usize,

    /// Extra shadow-only rays per area light.
    #[arg(long = "ss", value_name = "N", default_value_t = 128)]
    pub shadow_test: usize,
}

/// The immutable render configuration, constructed once at argument-parse
/// time and borrowed everywhere.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub threads: usize,
    pub aa: u32,
    pub width: usize,
    pub height: usize,
    pub verbose: bool,
    pub real_material: bool,

    pub ir_air: Float,
    pub fresnel: bool,

    pub ambient: bool,
    pub direct: bool,
    pub transmissive: bool,
    pub specular: bool,
    pub indirect: bool,
    pub caustic: bool,

    pub photon_viz: bool,
    pub fast_global: bool,

    pub monte_carlo: bool,
    pub max_monte_depth: usize,
    pub prob_absorb: Float,
    pub recursive_shadows: bool,
    pub distrib_transmissive: bool,
    pub transmissive_test: usize,
    pub distrib_specular: bool,
    pub specular_test: usize,
    pub indirect_test: usize,

    pub global_photon_count: usize,
    pub caustic_photon_count: usize,
    pub max_photon_depth: usize,

    pub global_estimate_size: usize,
    pub global_estimate_dist: Float,
    pub global_filter: EstimateFilter,
    pub caustic_estimate_size: usize,
    pub caustic_estimate_dist: Float,
    pub caustic_filter: EstimateFilter,
    pub irradiance_cache: bool,

    pub shadows: bool,
    pub soft_shadows: bool,
    pub light_test: usize,
    pub shadow_test: usize,
}

impl RenderConfig {
    /// Returns true if the global photon map is needed at all.
    pub fn wants_global_map(&self) -> bool {
        self.indirect || self.photon_viz
    }

    /// Returns true if the caustic photon map is needed.
    pub fn wants_caustic_map(&self) -> bool {
        self.caustic
    }
}

impl From<&Options> for RenderConfig {
    fn from(options: &Options) -> Self {
        let threads = match options.threads {
            0 => {
                warn!("invalid thread count 0; using 1");
                1
            }
            n => n,
        };

        Self {
            threads,
            aa: options.aa,
            width: options.resolution[0].max(1),
            height: options.resolution[1].max(1),
            verbose: options.verbose,
            real_material: options.real,
            ir_air: if options.ir > 0.0 { options.ir } else { EPSILON },
            fresnel: !options.no_fresnel,
            ambient: !options.no_ambient,
            direct: !options.no_direct,
            transmissive: !options.no_transmissive,
            specular: !options.no_specular,
            indirect: !options.no_indirect,
            caustic: !options.no_caustic,
            // Fast global needs direct visualization on to have any effect.
            photon_viz: options.photon_viz || options.fast_global,
            fast_global: options.fast_global,
            monte_carlo: !options.no_monte,
            max_monte_depth: options.max_monte_depth.max(1),
            prob_absorb: options.prob_absorb.max(0.0),
            recursive_shadows: !options.no_recursive_shadows,
            distrib_transmissive: !options.no_distrib_transmissive,
            transmissive_test: options.transmissive_test.max(1),
            distrib_specular: !options.no_distrib_specular,
            specular_test: options.specular_test.max(1),
            indirect_test: options.indirect_test.max(1),
            global_photon_count: options.global_photon_count.max(1),
            caustic_photon_count: options.caustic_photon_count.max(1),
            max_photon_depth: options.max_photon_depth.max(1),
            global_estimate_size: options.global_estimate_size.max(1),
            global_estimate_dist: options.global_estimate_dist.max(EPSILON),
            global_filter: options.global_filter,
            caustic_estimate_size: options.caustic_estimate_size.max(1),
            caustic_estimate_dist: options.caustic_estimate_dist.max(EPSILON),
            caustic_filter: options.caustic_filter,
            irradiance_cache: options.cache,
            shadows: !options.no_shadow,
            soft_shadows: !options.no_ss,
            light_test: options.light_test.max(1),
            shadow_test: options.shadow_test,
        }
    }
}

impl Default for RenderConfig {
    /// The defaults of the command surface, for tests and library use.
    fn default() -> Self {
        Self {
            threads: 1,
            aa: 2,
            width: 1024,
            height: 1024,
            verbose: false,
            real_material: false,
            ir_air: 1.0,
            fresnel: true,
            ambient: true,
            direct: true,
            transmissive: true,
            specular: true,
            indirect: true,
            caustic: true,
            photon_viz: false,
            fast_global: false,
            monte_carlo: true,
            max_monte_depth: 128,
            prob_absorb: 0.005,
            recursive_shadows: true,
            distrib_transmissive: true,
            transmissive_test: 128,
            distrib_specular: true,
            specular_test: 128,
            indirect_test: 256,
            global_photon_count: 1920,
            caustic_photon_count: 300_000,
            max_photon_depth: 128,
            global_estimate_size: 50,
            global_estimate_dist: 2.5,
            global_filter: EstimateFilter::Cone,
            caustic_estimate_size: 200,
            caustic_estimate_dist: 1.0,
            caustic_filter: EstimateFilter::Disk,
            irradiance_cache: false,
            shadows: true,
            soft_shadows: true,
            light_test: 128,
            shadow_test: 128,
        }
    }
}
