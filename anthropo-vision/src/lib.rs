pub mod classical;
pub mod face;
pub mod landmarks;
pub mod mesh;
pub mod model;
pub mod yunet;

// Re-export commonly used types
pub use classical::ClassicalDetector;
pub use face::{FaceBox, FaceDetector, Roi};
pub use landmarks::{Landmark, LandmarkSet, LandmarkSource, SENTINEL};
pub use mesh::MeshDetector;
