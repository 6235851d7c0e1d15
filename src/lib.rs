//! A photon-mapping renderer.
//!
//! The engine combines a photon-tracing preprocess with a multi-threaded
//! Monte Carlo path tracer. Photons are emitted from the scene lights,
//! scattered with Russian roulette, and deposited into two maps (global and
//! caustic) indexed by k-d trees. The renderer then shoots supersampled eye
//! rays and evaluates the rendering equation at each hit: ambient, direct
//! (with soft shadows), specular and transmissive inter-reflection with
//! Fresnel, diffuse indirect radiance from the global map, and caustics from
//! the caustic map.
//!
//! Scene description, image encoding, and linear algebra are external
//! collaborators: the engine only sees the [`scene::SceneOracle`] trait,
//! the `image` crate, and `glam`.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod app;
pub mod core;
pub mod integrators;
pub mod photons;
pub mod render;
pub mod scene;
pub mod stats;
