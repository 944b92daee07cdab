pub mod batch;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod inference;
pub mod schema;
pub mod server;

pub use batch::{Batch, BatchReport};
pub use classifier::{Classifier, OnnxClassifier};
pub use dataset::{CsvSink, OutputPolicy, RecordKind};
pub use error::{Error, Result};
pub use features::{compute_features, euclidean_distance, resolve_landmark, Distance, FeatureVector, Point};
pub use inference::{InferenceAdapter, Prediction};
pub use schema::{Anatomy, Schema};

// Re-export vision types for convenience
pub use anthropo_vision::{Landmark, LandmarkSet, LandmarkSource, SENTINEL};
