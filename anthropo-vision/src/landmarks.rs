//! Landmark types shared by every detector backend.

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Coordinate value marking a point that is out of the image or undetected.
pub const SENTINEL: f32 = -1.0;

/// A detected anatomical point in pixel space, with optional depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: Option<f32>,
}

impl Landmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }

    pub const fn with_depth(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub const fn sentinel() -> Self {
        Self::new(SENTINEL, SENTINEL)
    }

    /// True when the 2D position is the `(-1, -1)` marker. Depth is ignored.
    pub fn is_sentinel(&self) -> bool {
        self.x == SENTINEL && self.y == SENTINEL
    }

    /// Build a landmark from a raw detector position, truncating to whole
    /// pixels and replacing anything outside `width` x `height` with the
    /// sentinel. Depth survives the replacement.
    pub fn from_pixel(x: f32, y: f32, z: Option<f32>, width: u32, height: u32) -> Self {
        let inside = x.is_finite()
            && y.is_finite()
            && x >= 0.0
            && y >= 0.0
            && x < width as f32
            && y < height as f32;
        if !inside {
            return Self {
                x: SENTINEL,
                y: SENTINEL,
                z,
            };
        }
        Self {
            x: x.trunc(),
            y: y.trunc(),
            z,
        }
    }
}

/// Ordered landmarks of one face. Index positions are fixed by the detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Landmark> {
        self.points.get(idx)
    }

    /// Whether every point carries a depth value.
    pub fn has_depth(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.z.is_some())
    }

    pub fn sentinel_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_sentinel()).count()
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

impl FromIterator<Landmark> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Anything that turns an image into per-face landmark sets.
///
/// An empty result means no face was found; that is not an error.
pub trait LandmarkSource {
    /// Number of points in every set this source produces.
    fn num_landmarks(&self) -> usize;

    /// Detect faces in `image`, best face first.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<LandmarkSet>>;
}

impl<T: LandmarkSource + ?Sized> LandmarkSource for Box<T> {
    fn num_landmarks(&self) -> usize {
        (**self).num_landmarks()
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<LandmarkSet>> {
        (**self).detect(image)
    }
}
