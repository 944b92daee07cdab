//! 468-point dense face mesh (MediaPipe face landmark model, ONNX export).
//!
//! The model takes a 192x192 RGB crop in [0, 1], channels last, and
//! returns two tensors: 1404 values (x, y, z per point, in crop pixels)
//! and a face-presence logit.

use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::face::{FaceDetector, Roi};
use crate::landmarks::{Landmark, LandmarkSet, LandmarkSource};
use crate::model;

pub const NUM_LANDMARKS: usize = 468;
const NUM_DIMS: usize = 3;
const INPUT_SIZE: u32 = 192;
const ROI_SCALE: f32 = 1.5;
const PRESENCE_THRESHOLD: f32 = 0.5;

pub struct MeshDetector {
    faces: FaceDetector,
    session: Session,
}

impl MeshDetector {
    pub fn new(faces: FaceDetector, model_path: &Path) -> Result<Self> {
        Ok(Self {
            faces,
            session: model::session_from_file(model_path).context("load face mesh model")?,
        })
    }
}

impl LandmarkSource for MeshDetector {
    fn num_landmarks(&self) -> usize {
        NUM_LANDMARKS
    }

    /// Only the best face is meshed, matching single-face static capture.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<LandmarkSet>> {
        let faces = self.faces.detect(image)?;
        let Some(best) = faces.first() else {
            return Ok(vec![]);
        };

        let roi = Roi::around(best, ROI_SCALE);
        let crop = roi.crop(image, INPUT_SIZE);
        let input = Value::from_array(rgb_interleaved_unit(&crop)?)?;
        let outputs = self.session.run(ort::inputs![input])?;

        if let Some((_name, presence_logit)) = outputs.iter().nth(1) {
            let (_shape, flag) = presence_logit.try_extract_tensor::<f32>()?;
            let presence = flag.last().copied().map(sigmoid).unwrap_or(0.0);
            if presence <= PRESENCE_THRESHOLD {
                log::debug!("mesh presence {:.3} below threshold", presence);
                return Ok(vec![]);
            }
        }

        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let (width, height) = image.dimensions();
        Ok(vec![project(data, &roi, width, height)?])
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// NHWC RGB scaled to [0, 1].
fn rgb_interleaved_unit(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let data: Vec<f32> = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    Ok(Array4::from_shape_vec((1, h as usize, w as usize, 3), data)?)
}

/// Map crop-space mesh output to image pixels; depth is divided by the
/// model input size.
fn project(values: &[f32], roi: &Roi, width: u32, height: u32) -> Result<LandmarkSet> {
    if values.len() < NUM_LANDMARKS * NUM_DIMS {
        anyhow::bail!(
            "incompatible mesh model: {} outputs, expected {}",
            values.len(),
            NUM_LANDMARKS * NUM_DIMS
        );
    }
    let size = INPUT_SIZE as f32;
    Ok(values
        .chunks_exact(NUM_DIMS)
        .take(NUM_LANDMARKS)
        .map(|p| {
            let (x, y) = roi.to_image(p[0], p[1], size);
            Landmark::from_pixel(x, y, Some(p[2] / size), width, height)
        })
        .collect())
}
