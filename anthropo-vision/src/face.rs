use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::{model, yunet};

/// YuNet ONNX exports take a fixed 640x640 input.
const INPUT_SIZE: u32 = 640;

/// A face found by the detector, in original image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub keypoints: [f32; 10], // eyes, nose tip, mouth corners
}

/// Square region of interest in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Roi {
    /// Square around the face centre, side = longest box edge * `scale`.
    pub fn around(face: &FaceBox, scale: f32) -> Self {
        let [x, y, w, h] = face.bbox;
        let size = w.max(h) * scale;
        Self {
            x: x + w / 2.0 - size / 2.0,
            y: y + h / 2.0 - size / 2.0,
            size,
        }
    }

    /// Crop the region (black outside the image) and resize to `out` x `out`.
    pub fn crop(&self, img: &DynamicImage, out: u32) -> RgbImage {
        let side = self.size.ceil().max(1.0) as u32;
        let mut canvas = RgbImage::new(side, side);
        let rgb = img.to_rgb8();
        image::imageops::overlay(
            &mut canvas,
            &rgb,
            -(self.x.round() as i64),
            -(self.y.round() as i64),
        );
        image::imageops::resize(&canvas, out, out, image::imageops::FilterType::Triangle)
    }

    /// Map a position in a model input of side `input_size` back to the image.
    pub fn to_image(&self, u: f32, v: f32, input_size: f32) -> (f32, f32) {
        let k = self.size / input_size;
        (self.x + u * k, self.y + v * k)
    }
}

/// Placement of the original image inside the square detector canvas.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    /// Normalized canvas coordinate to original image pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        let size = INPUT_SIZE as f32;
        (
            (x * size - self.offset_x) / self.scale,
            (y * size - self.offset_y) / self.scale,
        )
    }
}

/// Pad the image to a square canvas without distortion.
fn letterbox(img: &DynamicImage) -> (RgbImage, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = INPUT_SIZE as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    let resized = img
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let offset_x = (INPUT_SIZE - new_w) / 2;
    let offset_y = (INPUT_SIZE - new_h) / 2;
    let mut canvas = RgbImage::new(INPUT_SIZE, INPUT_SIZE);
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Planar BGR in [0, 255], the layout YuNet was trained on.
fn bgr_planar(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        data[i] = px[2] as f32;
        data[plane + i] = px[1] as f32;
        data[2 * plane + i] = px[0] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// YuNet face detector. Plays the role of the cascade stage for both
/// landmark backends.
pub struct FaceDetector {
    session: Session,
    score_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn from_file(path: &Path, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        Ok(Self {
            session: model::session_from_file(path).context("load face detector")?,
            score_threshold,
            nms_threshold,
        })
    }

    /// Detect faces, highest score first.
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (canvas, lb) = letterbox(img);
        let input = Value::from_array(bgr_planar(&canvas)?)?;
        let outputs = self.session.run(ort::inputs![input])?;

        let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            output_data.push((shape.iter().copied().collect(), data.to_vec()));
        }
        let output_refs: Vec<(&[i64], &[f32])> = output_data
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let raw = yunet::decode(&output_refs, INPUT_SIZE as usize, self.score_threshold)?;
        let faces: Vec<FaceBox> = raw
            .into_iter()
            .map(|r| {
                let (x, y) = lb.unmap(r.bbox[0], r.bbox[1]);
                let (x2, y2) = lb.unmap(r.bbox[0] + r.bbox[2], r.bbox[1] + r.bbox[3]);
                let mut keypoints = [0.0f32; 10];
                for k in 0..5 {
                    let (kx, ky) = lb.unmap(r.keypoints[k * 2], r.keypoints[k * 2 + 1]);
                    keypoints[k * 2] = kx;
                    keypoints[k * 2 + 1] = ky;
                }
                FaceBox {
                    bbox: [x, y, x2 - x, y2 - y],
                    score: r.score,
                    keypoints,
                }
            })
            .collect();

        log::debug!("detector kept {} candidate face(s)", faces.len());
        Ok(nms(&faces, self.nms_threshold))
    }
}

/// Non-maximum suppression. Output is sorted by descending score.
pub fn nms(faces: &[FaceBox], iou_threshold: f32) -> Vec<FaceBox> {
    let mut sorted = faces.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(bbox: [f32; 4], score: f32) -> FaceBox {
        FaceBox {
            bbox,
            score,
            keypoints: [0.0; 10],
        }
    }

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let v = iou(&a, &b);
        assert!(v > 0.0 && v < 1.0);
        assert_eq!(iou(&a, &[100.0, 100.0, 10.0, 10.0]), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_first() {
        let faces = vec![
            face([12.0, 12.0, 20.0, 20.0], 0.8),
            face([10.0, 10.0, 20.0, 20.0], 0.9),
            face([100.0, 100.0, 20.0, 20.0], 0.85),
        ];
        let kept = nms(&faces, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.85);
    }

    #[test]
    fn letterbox_round_trips_corners() {
        let img = DynamicImage::new_rgb8(320, 160);
        let (canvas, lb) = letterbox(&img);
        assert_eq!(canvas.dimensions(), (640, 640));
        // image occupies rows 160..480 of the canvas
        let (x, y) = lb.unmap(0.0, 160.0 / 640.0);
        assert!(x.abs() < 1e-3 && y.abs() < 1e-3);
        let (x, y) = lb.unmap(1.0, 480.0 / 640.0);
        assert!((x - 320.0).abs() < 1e-3 && (y - 160.0).abs() < 1e-3);
    }

    #[test]
    fn roi_is_square_and_centred() {
        let roi = Roi::around(&face([100.0, 50.0, 40.0, 80.0], 1.0), 1.5);
        assert_eq!(roi.size, 120.0);
        assert_eq!(roi.x + roi.size / 2.0, 120.0);
        assert_eq!(roi.y + roi.size / 2.0, 90.0);
        let (x, y) = roi.to_image(96.0, 0.0, 192.0);
        assert_eq!(x, roi.x + 60.0);
        assert_eq!(y, roi.y);
    }

    #[test]
    fn crop_outside_image_is_black() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, image::Rgb([200, 200, 200])));
        let roi = Roi {
            x: -10.0,
            y: -10.0,
            size: 20.0,
        };
        let crop = roi.crop(&img, 20);
        assert_eq!(crop.get_pixel(0, 0)[0], 0);
        assert_eq!(crop.get_pixel(15, 15)[0], 200);
    }
}
