//! Landmarks-in, prediction-out adapter in front of a trained classifier.

use anthropo_vision::{Landmark, LandmarkSet};
use serde::{Deserialize, Serialize};

use crate::classifier::Classifier;
use crate::error::{Error, Result};
use crate::features::compute_features;
use crate::schema::Schema;

#[derive(Debug, Deserialize)]
struct PredictPayload {
    #[serde(rename = "faceMesh")]
    face_mesh: Option<Vec<Vec<f32>>>,
}

/// Parse a `{"faceMesh": [[x, y, z], ...]}` body into a landmark set.
///
/// Points may carry two or three coordinates.
pub fn parse_landmarks(body: &[u8]) -> Result<LandmarkSet> {
    let payload: PredictPayload =
        serde_json::from_slice(body).map_err(|e| Error::MalformedPayload(e.to_string()))?;
    let points = payload.face_mesh.ok_or(Error::MissingField("faceMesh"))?;

    points
        .iter()
        .enumerate()
        .map(|(i, p)| match p.as_slice() {
            [x, y] => Ok(Landmark::new(*x, *y)),
            [x, y, z] => Ok(Landmark::with_depth(*x, *y, *z)),
            _ => Err(Error::MalformedPayload(format!(
                "point {} has {} coordinates",
                i,
                p.len()
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(LandmarkSet::new)
}

/// Serializable landmark list, `[x, y]` or `[x, y, z]` per point.
pub fn landmarks_to_json(set: &LandmarkSet) -> Vec<Vec<f32>> {
    set.points
        .iter()
        .map(|p| match p.z {
            Some(z) => vec![p.x, p.y, z],
            None => vec![p.x, p.y],
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: u8,
    pub confidence: f32,
}

impl Prediction {
    pub fn from_probability(p: f32) -> Self {
        Self {
            prediction: if p >= 0.5 { 1 } else { 0 },
            confidence: p,
        }
    }
}

pub struct InferenceAdapter {
    schema: Schema,
    expected_features: usize,
    classifier: Box<dyn Classifier + Send>,
}

impl InferenceAdapter {
    pub fn new(schema: Schema, expected_features: usize, classifier: Box<dyn Classifier + Send>) -> Self {
        let produced = schema.catalogue().len();
        if produced != expected_features {
            log::warn!(
                "classifier expects {} features but the {} layout produces {}; every request will be rejected",
                expected_features,
                schema,
                produced
            );
        }
        Self {
            schema,
            expected_features,
            classifier,
        }
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn expected_features(&self) -> usize {
        self.expected_features
    }

    pub fn predict(&mut self, landmarks: &LandmarkSet) -> Result<Prediction> {
        let features = compute_features(landmarks, self.schema)?;
        if features.len() != self.expected_features {
            return Err(Error::SchemaMismatch(format!(
                "expected {} features, got {}",
                self.expected_features,
                features.len()
            )));
        }
        if features.invalid_count() > 0 {
            log::debug!("{} invalid distance(s) sent as -1", features.invalid_count());
        }

        let p = self.classifier.predict(&features.to_vec())?;
        Ok(Prediction::from_probability(p))
    }

    pub fn predict_json(&mut self, body: &[u8]) -> Result<Prediction> {
        let landmarks = parse_landmarks(body)?;
        self.predict(&landmarks)
    }
}
