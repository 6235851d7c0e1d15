//! Photon-mapping renderer binary.

#[macro_use]
extern crate log;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use photonmap::app::{Options, RenderConfig};
use photonmap::photons::map_photons;
use photonmap::render::render_image;
use photonmap::scene::simple::load_scene;
use photonmap::scene::SceneOracle;
use photonmap::stats::RenderStats;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

fn main() {
    env_logger::init();

    let options = match Options::try_parse() {
        Ok(options) => options,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            return;
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(-1);
        }
    };

    if let Err(e) = run(&options) {
        error!("{e:#}");
        eprintln!("{e:#}");
        std::process::exit(-1);
    }
}

fn run(options: &Options) -> anyhow::Result<()> {
    let config = RenderConfig::from(options);

    let start = Instant::now();
    let scene = load_scene(&options.scene, config.real_material)
        .with_context(|| format!("unable to load scene {}", options.scene))?;
    if config.verbose {
        println!("Read scene from {} ...", options.scene);
        println!("  Time = {:.2} seconds", start.elapsed().as_secs_f32());
        println!("  # Lights = {}", scene.lights().len());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .context("unable to build worker thread pool")?;

    // Seeded from the clock; workers derive deterministic per-worker
    // streams from this.
    let base_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed);

    let maps = map_photons(&scene, &config, &pool, base_seed);

    let stats = RenderStats::new();
    let render_start = Instant::now();
    if config.verbose {
        println!("Rendering image ...");
    }
    let frame = render_image(&scene, &config, &maps, &pool, base_seed, &stats);
    if config.verbose {
        println!("Rendered image ...");
        println!("  Time = {:.2} seconds", render_start.elapsed().as_secs_f32());
        stats.report(&config);
    }

    let write_start = Instant::now();
    frame
        .to_rgb_image()
        .save(&options.image)
        .with_context(|| format!("unable to write image {}", options.image))?;
    if config.verbose {
        println!("Wrote image to {} ...", options.image);
        println!("  Time = {:.2} seconds", write_start.elapsed().as_secs_f32());
        println!("  Width = {}", frame.width);
        println!("  Height = {}", frame.height);
    }

    Ok(())
}
