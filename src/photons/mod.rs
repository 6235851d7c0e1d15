//! Photon storage, spatial indexing, and tracing.

pub mod kdtree;
pub mod photon;
pub mod store;
pub mod tracer;

pub use kdtree::PhotonKdTree;
pub use photon::{MapKind, Photon};
pub use store::{LocalPhotonBuffer, PhotonStore, LOCAL_BUFFER_CAPACITY};
pub use tracer::{map_photons, PhotonMaps};
