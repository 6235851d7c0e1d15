//! A static k-d tree over deposited photons.
//!
//! The tree is built once over the frozen photon array: at every node the
//! range is partitioned around its median along the widest axis of the
//! range's bounding box. The node layout is implicit: the pivot of a range
//! `[lo, hi)` sits at `(lo + hi) / 2` and its split axis lives in a parallel
//! array, so no pointers are stored. Queries are read-only and safe from
//! any number of threads at once.

use crate::core::common::Float;
use crate::photons::photon::Photon;
use glam::Vec3;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A query result: a photon index with its squared distance to the query
/// point.
#[derive(Copy, Clone, Debug)]
pub struct Neighbor {
    /// Index into the tree's photon array.
    pub index: usize,

    /// Squared distance from the query point.
    pub distance_squared: Float,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.distance_squared == other.distance_squared
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_squared.total_cmp(&other.distance_squared)
    }
}

/// A k-d tree owning its photons in pivot order.
pub struct PhotonKdTree {
    photons: Vec<Photon>,
    axes: Vec<u8>,
}

impl PhotonKdTree {
    /// Builds the tree, consuming and reordering the photon array.
    ///
    /// * `photons` - The frozen photon array.
    pub fn build(mut photons: Vec<Photon>) -> Self {
        let len = photons.len();
        let mut axes = vec![0u8; len];
        if len > 1 {
            build_range(&mut photons, &mut axes, 0, len);
        }
        Self { photons, axes }
    }

    /// Number of photons in the tree.
    pub fn len(&self) -> usize {
        self.photons.len()
    }

    /// Returns true if the tree holds no photons.
    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    /// The photons, in tree order.
    pub fn photons(&self) -> &[Photon] {
        &self.photons
    }

    /// Returns up to `k` nearest photons within `max_dist` of a point, in
    /// arbitrary order, with their squared distances.
    ///
    /// * `point`    - Query point.
    /// * `max_dist` - Search radius.
    /// * `k`        - Maximum number of results.
    pub fn k_nearest_within(&self, point: Vec3, max_dist: Float, k: usize) -> Vec<Neighbor> {
        if self.photons.is_empty() || k == 0 {
            return Vec::new();
        }
        let capacity = k.saturating_add(1).min(self.photons.len() + 1);
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(capacity);
        let mut radius_squared = max_dist * max_dist;
        self.nearest_in_range(0, self.photons.len(), point, k, &mut radius_squared, &mut heap);
        heap.into_vec()
    }

    fn nearest_in_range(
        &self,
        lo: usize,
        hi: usize,
        point: Vec3,
        k: usize,
        radius_squared: &mut Float,
        heap: &mut BinaryHeap<Neighbor>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = (lo + hi) / 2;
        let pivot = &self.photons[mid];

        let distance_squared = point.distance_squared(pivot.position);
        if distance_squared <= *radius_squared {
            heap.push(Neighbor { index: mid, distance_squared });
            if heap.len() > k {
                heap.pop();
                // A full heap shrinks the search radius to its worst entry.
                if let Some(worst) = heap.peek() {
                    *radius_squared = worst.distance_squared;
                }
            }
        }

        let axis = self.axes[mid] as usize;
        let delta = point[axis] - pivot.position[axis];
        let (near, far) = if delta < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.nearest_in_range(near.0, near.1, point, k, radius_squared, heap);
        if delta * delta <= *radius_squared {
            self.nearest_in_range(far.0, far.1, point, k, radius_squared, heap);
        }
    }

    /// Returns the closest photon whose distance from the point lies in
    /// `[min_dist, max_dist]`, with its distance.
    ///
    /// * `point`    - Query point.
    /// * `min_dist` - Lower distance bound (inclusive).
    /// * `max_dist` - Upper distance bound (inclusive).
    pub fn closest_beyond(
        &self,
        point: Vec3,
        min_dist: Float,
        max_dist: Float,
    ) -> Option<(&Photon, Float)> {
        if self.photons.is_empty() {
            return None;
        }
        let mut best: Option<Neighbor> = None;
        let mut radius_squared = max_dist * max_dist;
        self.closest_in_range(
            0,
            self.photons.len(),
            point,
            min_dist * min_dist,
            &mut radius_squared,
            &mut best,
        );
        best.map(|n| (&self.photons[n.index], n.distance_squared.sqrt()))
    }

    fn closest_in_range(
        &self,
        lo: usize,
        hi: usize,
        point: Vec3,
        min_squared: Float,
        radius_squared: &mut Float,
        best: &mut Option<Neighbor>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = (lo + hi) / 2;
        let pivot = &self.photons[mid];

        let distance_squared = point.distance_squared(pivot.position);
        if distance_squared >= min_squared && distance_squared <= *radius_squared {
            *best = Some(Neighbor { index: mid, distance_squared });
            *radius_squared = distance_squared;
        }

        let axis = self.axes[mid] as usize;
        let delta = point[axis] - pivot.position[axis];
        let (near, far) = if delta < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.closest_in_range(near.0, near.1, point, min_squared, radius_squared, best);
        if delta * delta <= *radius_squared {
            self.closest_in_range(far.0, far.1, point, min_squared, radius_squared, best);
        }
    }
}

/// Recursively partitions `[lo, hi)` around its median along the widest
/// axis of the range.
fn build_range(photons: &mut [Photon], axes: &mut [u8], lo: usize, hi: usize) {
    if hi - lo <= 1 {
        return;
    }

    let mut min = photons[lo].position;
    let mut max = photons[lo].position;
    for photon in &photons[lo + 1..hi] {
        min = min.min(photon.position);
        max = max.max(photon.position);
    }
    let extent = max - min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    let mid = (lo + hi) / 2;
    photons[lo..hi].select_nth_unstable_by(mid - lo, |a, b| {
        a.position[axis].total_cmp(&b.position[axis])
    });
    axes[mid] = axis as u8;

    build_range(photons, axes, lo, mid);
    build_range(photons, axes, mid + 1, hi);
}
