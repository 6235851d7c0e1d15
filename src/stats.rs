//! Ray counters.
//!
//! Workers count rays in plain per-worker integers and fold them into the
//! shared atomic totals once, at worker exit, keeping atomics out of the
//! hot loops.

use crate::app::RenderConfig;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-worker ray counts.
#[derive(Copy, Clone, Debug, Default)]
pub struct RayCounters {
    /// Primary eye rays that hit the scene.
    pub primary: u64,

    /// Shadow rays.
    pub shadow: u64,

    /// Monte Carlo path-trace rays.
    pub monte: u64,

    /// Transmissive bounce samples.
    pub transmissive: u64,

    /// Specular bounce samples.
    pub specular: u64,

    /// Indirect-illumination samples.
    pub indirect: u64,

    /// Caustic-map lookups.
    pub caustic: u64,
}

/// Shared totals, updated atomically at worker exit.
#[derive(Default)]
pub struct RenderStats {
    pub primary: AtomicU64,
    pub shadow: AtomicU64,
    pub monte: AtomicU64,
    pub transmissive: AtomicU64,
    pub specular: AtomicU64,
    pub indirect: AtomicU64,
    pub caustic: AtomicU64,
}

impl RenderStats {
    /// Creates zeroed totals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a worker's counts into the totals.
    ///
    /// * `counters` - The worker's counts.
    pub fn add(&self, counters: &RayCounters) {
        self.primary.fetch_add(counters.primary, Ordering::Relaxed);
        self.shadow.fetch_add(counters.shadow, Ordering::Relaxed);
        self.monte.fetch_add(counters.monte, Ordering::Relaxed);
        self.transmissive.fetch_add(counters.transmissive, Ordering::Relaxed);
        self.specular.fetch_add(counters.specular, Ordering::Relaxed);
        self.indirect.fetch_add(counters.indirect, Ordering::Relaxed);
        self.caustic.fetch_add(counters.caustic, Ordering::Relaxed);
    }

    /// Prints the per-category ray counts the way the verbose render report
    /// expects them.
    ///
    /// * `config` - Render configuration; disabled categories are skipped.
    pub fn report(&self, config: &RenderConfig) {
        let mut total = self.primary.load(Ordering::Relaxed);
        println!("  # Screen Rays = {}", total);
        if config.shadows {
            let count = self.shadow.load(Ordering::Relaxed);
            println!("  # Shadow Rays = {}", count);
            total += count;
        }
        if config.monte_carlo {
            let count = self.monte.load(Ordering::Relaxed);
            println!("  # Monte Carlo Rays = {}", count);
            total += count;
        }
        if config.transmissive {
            let count = self.transmissive.load(Ordering::Relaxed);
            println!("  # Transmissive Samples = {}", count);
            total += count;
        }
        if config.specular {
            let count = self.specular.load(Ordering::Relaxed);
            println!("  # Specular Samples = {}", count);
            total += count;
        }
        if config.indirect {
            let count = self.indirect.load(Ordering::Relaxed);
            println!("  # Indirect Samples = {}", count);
            total += count;
        }
        if config.caustic {
            let count = self.caustic.load(Ordering::Relaxed);
            println!("  # Caustic Samples = {}", count);
            total += count;
        }
        println!("Total Rays: {}", total);
    }
}
