//! 68-point (iBUG layout) landmark regression on detected face boxes.

use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::face::{FaceDetector, Roi};
use crate::landmarks::{Landmark, LandmarkSet, LandmarkSource};
use crate::model;

pub const NUM_LANDMARKS: usize = 68;
const INPUT_SIZE: u32 = 112;
const ROI_SCALE: f32 = 1.2;

/// Face detector followed by a 68-point regressor.
///
/// The regressor takes a 112x112 RGB crop in [0, 1] (NCHW) and returns 136
/// values: x0, y0, x1, y1, ... normalized to the crop.
pub struct ClassicalDetector {
    faces: FaceDetector,
    session: Session,
}

impl ClassicalDetector {
    pub fn new(faces: FaceDetector, model_path: &Path) -> Result<Self> {
        Ok(Self {
            faces,
            session: model::session_from_file(model_path).context("load 68-point model")?,
        })
    }

    fn regress(&mut self, img: &DynamicImage, roi: &Roi) -> Result<LandmarkSet> {
        let crop = roi.crop(img, INPUT_SIZE);
        let input = Value::from_array(rgb_planar_unit(&crop)?)?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let (width, height) = img.dimensions();
        project(data, roi, width, height)
    }
}

impl LandmarkSource for ClassicalDetector {
    fn num_landmarks(&self) -> usize {
        NUM_LANDMARKS
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<LandmarkSet>> {
        let faces = self.faces.detect(image)?;
        let mut sets = Vec::with_capacity(faces.len());
        for face in &faces {
            let roi = Roi::around(face, ROI_SCALE);
            sets.push(self.regress(image, &roi)?);
        }
        Ok(sets)
    }
}

/// Planar RGB scaled to [0, 1].
fn rgb_planar_unit(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = px[c] as f32 / 255.0;
        }
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Map crop-normalized regressor output to image pixels.
fn project(values: &[f32], roi: &Roi, width: u32, height: u32) -> Result<LandmarkSet> {
    if values.len() < NUM_LANDMARKS * 2 {
        anyhow::bail!(
            "incompatible 68-point model: {} outputs, expected {}",
            values.len(),
            NUM_LANDMARKS * 2
        );
    }
    Ok(values
        .chunks_exact(2)
        .take(NUM_LANDMARKS)
        .map(|xy| {
            let (x, y) = roi.to_image(xy[0], xy[1], 1.0);
            Landmark::from_pixel(x, y, None, width, height)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_into_roi() {
        let roi = Roi {
            x: 100.0,
            y: 40.0,
            size: 200.0,
        };
        let mut values = vec![0.5f32; NUM_LANDMARKS * 2];
        values[0] = 0.0;
        values[1] = 0.0;
        values[2] = 1.2; // x beyond the right edge of a 320px image

        let set = project(&values, &roi, 320, 240).unwrap();
        assert_eq!(set.len(), NUM_LANDMARKS);
        assert_eq!(set[0], Landmark::new(100.0, 40.0));
        assert!(set[1].is_sentinel());
        assert_eq!(set[2], Landmark::new(200.0, 140.0));
        assert!(!set.has_depth());
    }

    #[test]
    fn short_output_is_rejected() {
        let roi = Roi {
            x: 0.0,
            y: 0.0,
            size: 10.0,
        };
        assert!(project(&[0.0; 10], &roi, 10, 10).is_err());
    }

    #[test]
    fn planar_layout() {
        let img = RgbImage::from_pixel(2, 1, image::Rgb([255, 0, 51]));
        let arr = rgb_planar_unit(&img).unwrap();
        assert_eq!(arr.shape(), &[1, 3, 1, 2]);
        assert_eq!(arr[[0, 0, 0, 1]], 1.0);
        assert_eq!(arr[[0, 1, 0, 0]], 0.0);
        assert!((arr[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
    }
}
