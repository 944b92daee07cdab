//! Anthropometric feature derivation.
//!
//! Maps a raw landmark set onto named anatomical points and measures the
//! catalogue of pairwise distances for its layout. Every distance goes
//! through [`euclidean_distance`], so a sentinel point always yields
//! [`Distance::Invalid`].

use anthropo_vision::{LandmarkSet, SENTINEL};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::{Anatomy, LandmarkRef, Schema};

/// A 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const SENTINEL: Point = Point {
        x: SENTINEL,
        y: SENTINEL,
    };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Result of measuring one distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    Valid(f32),
    /// One of the points was undetected or out of frame.
    Invalid,
}

impl Distance {
    /// Numeric encoding used in datasets and model input: invalid is -1.
    pub fn value(&self) -> f32 {
        match *self {
            Distance::Valid(d) => d,
            Distance::Invalid => -1.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Distance::Valid(_))
    }
}

pub fn euclidean_distance(p1: &Point, p2: &Point) -> Distance {
    if p1.is_sentinel() || p2.is_sentinel() {
        return Distance::Invalid;
    }
    let dx = p1.x - p2.x;
    let dy = p1.y - p2.y;
    Distance::Valid((dx * dx + dy * dy).sqrt())
}

fn raw_point(set: &LandmarkSet, idx: usize) -> Result<Point> {
    let lm = set.get(idx).ok_or(Error::IndexOutOfRange {
        index: idx,
        len: set.len(),
    })?;
    Ok(Point::new(lm.x, lm.y))
}

fn check_coverage(set: &LandmarkSet, schema: Schema) -> Result<()> {
    let needed = schema.max_index();
    if set.len() <= needed {
        return Err(Error::IndexOutOfRange {
            index: needed,
            len: set.len(),
        });
    }
    Ok(())
}

/// Resolve a named anatomical point.
///
/// Fails with [`Error::IndexOutOfRange`] when the set is too short for the
/// layout's table, which means the detector and table do not match. A
/// midpoint touching a sentinel resolves to the sentinel.
pub fn resolve_landmark(set: &LandmarkSet, schema: Schema, anatomy: Anatomy) -> Result<Point> {
    check_coverage(set, schema)?;
    let reference = schema.lookup(anatomy).ok_or_else(|| {
        Error::SchemaMismatch(format!("{} is not defined for the {} layout", anatomy.name(), schema))
    })?;

    match reference {
        LandmarkRef::Index(i) => raw_point(set, i),
        LandmarkRef::Midpoint(a, b) => {
            let (pa, pb) = (raw_point(set, a)?, raw_point(set, b)?);
            if pa.is_sentinel() || pb.is_sentinel() {
                return Ok(Point::SENTINEL);
            }
            Ok(pa.midpoint(&pb))
        }
    }
}

/// Catalogue-ordered named distances for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: Schema,
    values: Vec<Distance>,
}

impl FeatureVector {
    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.schema.feature_names()
    }

    pub fn get(&self, name: &str) -> Option<Distance> {
        self.schema
            .catalogue()
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| self.values.get(i).copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Distance)> + '_ {
        self.names().zip(self.values.iter().copied())
    }

    /// Model input: catalogue order, invalid as -1.
    pub fn to_vec(&self) -> Vec<f32> {
        self.values.iter().map(Distance::value).collect()
    }

    pub fn invalid_count(&self) -> usize {
        self.values.iter().filter(|d| !d.is_valid()).count()
    }
}

/// Measure every distance of the layout's catalogue.
///
/// Pure: the same landmark set always gives the same vector.
pub fn compute_features(set: &LandmarkSet, schema: Schema) -> Result<FeatureVector> {
    check_coverage(set, schema)?;

    let mut values = Vec::with_capacity(schema.catalogue().len());
    for spec in schema.catalogue() {
        let from = resolve_landmark(set, schema, spec.from)?;
        let to = resolve_landmark(set, schema, spec.to)?;
        values.push(euclidean_distance(&from, &to));
    }

    Ok(FeatureVector { schema, values })
}
