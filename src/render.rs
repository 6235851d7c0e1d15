//! The frame driver.
//!
//! Renders an anti-aliased frame: eye rays are shot through a supersampled
//! viewport (4^aa rays per output pixel), pixel columns are statically
//! assigned to workers by stride, and the supersampled buffer is folded
//! down with a box filter. Worker 0 owns the progress bar; ray counters
//! fold into the shared totals at worker exit.

use crate::app::RenderConfig;
use crate::core::common::Float;
use crate::core::rgb::Rgb;
use crate::integrators::{RayTracer, Worker};
use crate::photons::PhotonMaps;
use crate::scene::{SceneOracle, Viewport};
use crate::stats::RenderStats;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A rendered frame of linear RGB pixels, row-major from the bottom-left.
pub struct Frame {
    /// Width in pixels.
    pub width: usize,

    /// Height in pixels.
    pub height: usize,

    /// Pixels, indexed `j * width + i`.
    pub pixels: Vec<Rgb>,
}

impl Frame {
    /// Returns the pixel at `(i, j)`.
    pub fn pixel(&self, i: usize, j: usize) -> Rgb {
        self.pixels[j * self.width + i]
    }

    /// Mean channel value over the frame.
    pub fn mean(&self) -> Float {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().map(|p| p.mean()).sum::<Float>() / self.pixels.len() as Float
    }

    /// Converts to an 8-bit image, flipping to the top-left origin.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let mut img = image::RgbImage::new(self.width as u32, self.height as u32);
        for j in 0..self.height {
            for i in 0..self.width {
                let c = self.pixel(i, j).clamped();
                img.put_pixel(
                    i as u32,
                    (self.height - 1 - j) as u32,
                    image::Rgb([
                        (c.r * 255.0).round() as u8,
                        (c.g * 255.0).round() as u8,
                        (c.b * 255.0).round() as u8,
                    ]),
                );
            }
        }
        img
    }
}

/// Renders the scene into a frame.
///
/// * `scene`     - The scene.
/// * `config`    - Render configuration.
/// * `maps`      - The built photon maps.
/// * `pool`      - Worker thread pool sized to `config.threads`.
/// * `base_seed` - Render-wide RNG seed.
/// * `stats`     - Shared ray-count totals.
pub fn render_image(
    scene: &dyn SceneOracle,
    config: &RenderConfig,
    maps: &PhotonMaps,
    pool: &rayon::ThreadPool,
    base_seed: u64,
    stats: &RenderStats,
) -> Frame {
    let aa_factor = 1usize << config.aa;
    let scaled_width = config.width * aa_factor;
    let scaled_height = config.height * aa_factor;
    let viewport = Viewport { width: scaled_width, height: scaled_height };

    let tracer = RayTracer::new(scene, config, maps);
    let eye = scene.camera().eye;
    let background = scene.background();
    let threads = config.threads;

    let progress = if config.verbose {
        let bar = ProgressBar::new(scaled_width as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:25.cyan.bold} [{bar:40.green/white}] {pos:>5}/{len:5} ({elapsed})")
                .progress_chars("█▓▒░  "),
        );
        bar.set_message("Rendering");
        bar
    } else {
        ProgressBar::hidden()
    };
    let columns_completed = AtomicUsize::new(0);

    // Each worker renders the pixel columns congruent to its id.
    let column_sets: Vec<Vec<(usize, Vec<Rgb>)>> = pool.install(|| {
        (0..threads)
            .into_par_iter()
            .map(|worker_id| {
                let mut worker = Worker::new(base_seed, worker_id);
                let mut columns = Vec::new();

                for i in (worker_id..scaled_width).step_by(threads.max(1)) {
                    let mut column = vec![background; scaled_height];
                    for (j, pixel) in column.iter_mut().enumerate() {
                        let ray = scene.camera().world_ray(i, j, &viewport);
                        if let Some(hit) = scene.intersect(&ray) {
                            let mut color = Rgb::BLACK;
                            tracer.ray_trace(&mut worker, &hit, eye, &mut color);
                            *pixel = color;
                            worker.counters.primary += 1;
                        }
                    }
                    columns.push((i, column));

                    let done = columns_completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if worker_id == 0 {
                        progress.set_position(done as u64);
                    }
                }

                stats.add(&worker.counters);
                columns
            })
            .collect()
    });
    progress.finish_and_clear();

    // Box-filter the supersampled columns down to the output resolution.
    let box_weight = 1.0 / (aa_factor * aa_factor) as Float;
    let mut frame = Frame {
        width: config.width,
        height: config.height,
        pixels: vec![Rgb::BLACK; config.width * config.height],
    };
    for columns in column_sets {
        for (i, column) in columns {
            let u = i / aa_factor;
            for (j, color) in column.into_iter().enumerate() {
                let v = j / aa_factor;
                frame.pixels[v * frame.width + u] += color.clamped() * box_weight;
            }
        }
    }

    frame
}
