//! Light-transport integrators.
//!
//! [`raytracer::RayTracer`] is the rendering-equation evaluator; the other
//! modules hold its direct-illumination, Monte Carlo, and radiance-estimate
//! methods.

pub mod direct;
pub mod montecarlo;
pub mod radiance;
pub mod raytracer;

pub use raytracer::{RayTracer, Worker};
