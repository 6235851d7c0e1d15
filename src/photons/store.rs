//! Shared photon arrays and per-worker buffering.
//!
//! Workers never touch the shared arrays photon by photon. Each emission job
//! owns a fixed-capacity local buffer; when it fills (or the job ends) the
//! whole buffer is appended to the destination array under the one shared
//! mutex, amortizing the lock to O(1) per photon.

use crate::photons::photon::{MapKind, Photon};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Capacity of a worker's local photon buffer.
pub const LOCAL_BUFFER_CAPACITY: usize = 100_000;

#[derive(Default)]
struct Arrays {
    global: Vec<Photon>,
    caustic: Vec<Photon>,
}

/// The shared destination for deposited photons.
///
/// Both arrays live behind a single mutex; emitted-photon totals are plain
/// atomics updated once per emission phase.
#[derive(Default)]
pub struct PhotonStore {
    arrays: Mutex<Arrays>,

    /// Photons emitted toward the global map, across all workers.
    pub global_emitted: AtomicU64,

    /// Photons emitted toward the caustic map, across all workers.
    pub caustic_emitted: AtomicU64,
}

impl PhotonStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a worker's buffered photons to the destination array and
    /// clears the buffer.
    ///
    /// * `kind`    - Destination map.
    /// * `photons` - The worker's local buffer.
    pub fn flush(&self, kind: MapKind, photons: &mut Vec<Photon>) {
        if photons.is_empty() {
            return;
        }
        let mut arrays = self.arrays.lock().unwrap_or_else(|e| e.into_inner());
        match kind {
            MapKind::Global => arrays.global.append(photons),
            MapKind::Caustic => arrays.caustic.append(photons),
        }
    }

    /// Records photons emitted toward a map.
    ///
    /// * `kind`  - Destination map.
    /// * `count` - Number of photons emitted.
    pub fn add_emitted(&self, kind: MapKind, count: u64) {
        match kind {
            MapKind::Global => self.global_emitted.fetch_add(count, Ordering::Relaxed),
            MapKind::Caustic => self.caustic_emitted.fetch_add(count, Ordering::Relaxed),
        };
    }

    /// Returns photons emitted toward a map so far.
    pub fn emitted(&self, kind: MapKind) -> u64 {
        match kind {
            MapKind::Global => self.global_emitted.load(Ordering::Relaxed),
            MapKind::Caustic => self.caustic_emitted.load(Ordering::Relaxed),
        }
    }

    /// Freezes the store and returns the (global, caustic) photon arrays.
    /// Call only after all emission workers have joined.
    pub fn into_arrays(self) -> (Vec<Photon>, Vec<Photon>) {
        let arrays = self.arrays.into_inner().unwrap_or_else(|e| e.into_inner());
        (arrays.global, arrays.caustic)
    }
}

/// A worker-owned photon buffer bound to one destination map.
pub struct LocalPhotonBuffer {
    kind: MapKind,
    photons: Vec<Photon>,
}

impl LocalPhotonBuffer {
    /// Creates an empty buffer for a destination map.
    ///
    /// * `kind` - Destination map.
    pub fn new(kind: MapKind) -> Self {
        Self {
            kind,
            photons: Vec::with_capacity(LOCAL_BUFFER_CAPACITY),
        }
    }

    /// Stores a photon, flushing to the shared store first if the buffer is
    /// full.
    ///
    /// * `photon` - The photon to store.
    /// * `store`  - The shared store.
    pub fn store(&mut self, photon: Photon, store: &PhotonStore) {
        if self.photons.len() >= LOCAL_BUFFER_CAPACITY {
            store.flush(self.kind, &mut self.photons);
        }
        self.photons.push(photon);
    }

    /// Flushes any buffered photons to the shared store.
    ///
    /// * `store` - The shared store.
    pub fn flush(&mut self, store: &PhotonStore) {
        store.flush(self.kind, &mut self.photons);
    }
}
