//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: every cell of the stride 8/16/32 grids predicts a
//! box and five keypoints relative to the cell. The ONNX export emits twelve
//! tensors in the order cls_8, cls_16, cls_32, obj_8, obj_16, obj_32,
//! bbox_8, bbox_16, bbox_32, kps_8, kps_16, kps_32, each shaped
//! `[1, H*W, C]` with C = 1, 1, 4, 10.
//!
//! Decoding (OpenCV `FaceDetectorYN`):
//! score = sqrt(clamp(cls) * clamp(obj))
//! cx = (col + dx) * stride, cy = (row + dy) * stride
//! w = exp(dw) * stride, h = exp(dh) * stride

use anyhow::Result;
use ndarray::ArrayView2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// A decoded face in normalized `[0, 1]` coordinates of the square input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFace {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub keypoints: [f32; 10],
}

fn head<'a>(
    outputs: &'a [(&[i64], &[f32])],
    slot: usize,
    cells: usize,
    channels: usize,
) -> Result<ArrayView2<'a, f32>> {
    let (shape, data) = outputs
        .get(slot)
        .ok_or_else(|| anyhow::anyhow!("missing yunet output {}", slot))?;
    if data.len() != cells * channels {
        anyhow::bail!(
            "yunet output {} has shape {:?}, expected [1, {}, {}]",
            slot,
            shape,
            cells,
            channels
        );
    }
    Ok(ArrayView2::from_shape((cells, channels), *data)?)
}

/// Decode all grid cells scoring at least `score_threshold`.
pub fn decode(
    outputs: &[(&[i64], &[f32])],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<RawFace>> {
    if outputs.len() < 12 {
        anyhow::bail!("yunet produced {} outputs, expected 12", outputs.len());
    }

    let norm = input_size as f32;
    let mut faces = Vec::new();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let side = input_size / stride;
        let cells = side * side;

        let cls = head(outputs, level, cells, 1)?;
        let obj = head(outputs, level + 3, cells, 1)?;
        let bbox = head(outputs, level + 6, cells, 4)?;
        let kps = head(outputs, level + 9, cells, 10)?;

        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score =
                    (cls[[idx, 0]].clamp(0.0, 1.0) * obj[[idx, 0]].clamp(0.0, 1.0)).sqrt();
                if score < score_threshold {
                    continue;
                }

                let s = stride as f32;
                let cx = (col as f32 + bbox[[idx, 0]]) * s;
                let cy = (row as f32 + bbox[[idx, 1]]) * s;
                let w = bbox[[idx, 2]].exp() * s;
                let h = bbox[[idx, 3]].exp() * s;

                let mut keypoints = [0.0f32; 10];
                for k in 0..5 {
                    keypoints[k * 2] = (col as f32 + kps[[idx, k * 2]]) * s / norm;
                    keypoints[k * 2 + 1] = (row as f32 + kps[[idx, k * 2 + 1]]) * s / norm;
                }

                faces.push(RawFace {
                    bbox: [(cx - w / 2.0) / norm, (cy - h / 2.0) / norm, w / norm, h / norm],
                    score,
                    keypoints,
                });
            }
        }
    }

    Ok(faces)
}
