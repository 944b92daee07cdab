//! Anatomical index tables and feature catalogues for each detector layout.
//!
//! "Left" and "Right" are the subject's anatomical sides throughout, so a
//! subject-left point appears on the right half of a frontal photo.

use serde::{Deserialize, Serialize};

/// Named anatomical points used by the feature catalogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anatomy {
    Trichion,
    Glabella,
    FrontozygomaticusLeft,
    FrontozygomaticusRight,
    EndoCanthusLeft,
    EndoCanthusRight,
    ExoCanthusLeft,
    ExoCanthusRight,
    UpperPhiltrum,
    AlareLeft,
    AlareRight,
    LowerPhiltrum,
    ChristaPhiltriLeft,
    ChristaPhiltriRight,
    CheilionLeft,
    CheilionRight,
    Pogonion,
    Menton,
    FaceWidthLeft,
    FaceWidthRight,
}

impl Anatomy {
    pub fn name(&self) -> &'static str {
        match self {
            Anatomy::Trichion => "Trichion",
            Anatomy::Glabella => "Glabella",
            Anatomy::FrontozygomaticusLeft => "Frontozygomaticus Left",
            Anatomy::FrontozygomaticusRight => "Frontozygomaticus Right",
            Anatomy::EndoCanthusLeft => "Endo Canthus Left",
            Anatomy::EndoCanthusRight => "Endo Canthus Right",
            Anatomy::ExoCanthusLeft => "Exo Canthus Left",
            Anatomy::ExoCanthusRight => "Exo Canthus Right",
            Anatomy::UpperPhiltrum => "Upper Philtrum",
            Anatomy::AlareLeft => "Alare Left",
            Anatomy::AlareRight => "Alare Right",
            Anatomy::LowerPhiltrum => "Lower Philtrum",
            Anatomy::ChristaPhiltriLeft => "Christa Philtri Left",
            Anatomy::ChristaPhiltriRight => "Christa Philtri Right",
            Anatomy::CheilionLeft => "Cheilion Left",
            Anatomy::CheilionRight => "Cheilion Right",
            Anatomy::Pogonion => "Pogonion",
            Anatomy::Menton => "Menton",
            Anatomy::FaceWidthLeft => "Face Width Left",
            Anatomy::FaceWidthRight => "Face Width Right",
        }
    }
}

/// Where a named point comes from in a raw landmark set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkRef {
    Index(usize),
    /// Arithmetic mean of two raw points.
    Midpoint(usize, usize),
}

impl LandmarkRef {
    pub fn max_index(&self) -> usize {
        match *self {
            LandmarkRef::Index(i) => i,
            LandmarkRef::Midpoint(a, b) => a.max(b),
        }
    }
}

/// One catalogue entry: a named distance between two anatomical points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub from: Anatomy,
    pub to: Anatomy,
}

const fn feature(name: &'static str, from: Anatomy, to: Anatomy) -> FeatureSpec {
    FeatureSpec { name, from, to }
}

use Anatomy::*;

// iBUG 68-point layout, 0-based.
const CLASSICAL_TABLE: &[(Anatomy, LandmarkRef)] = &[
    (Glabella, LandmarkRef::Midpoint(21, 22)),
    (UpperPhiltrum, LandmarkRef::Index(33)),
    (Menton, LandmarkRef::Index(8)),
    (LowerPhiltrum, LandmarkRef::Index(51)),
    (EndoCanthusLeft, LandmarkRef::Index(42)),
    (EndoCanthusRight, LandmarkRef::Index(39)),
    (ExoCanthusLeft, LandmarkRef::Index(45)),
    (ExoCanthusRight, LandmarkRef::Index(36)),
    (AlareLeft, LandmarkRef::Index(35)),
    (AlareRight, LandmarkRef::Index(31)),
    (CheilionLeft, LandmarkRef::Index(54)),
    (CheilionRight, LandmarkRef::Index(48)),
];

// MediaPipe face mesh layout, 0-based. Left/Right here are the names the
// training columns were built with, not the subject's side; the classifier
// depends on these exact indices.
const MESH_TABLE: &[(Anatomy, LandmarkRef)] = &[
    (FaceWidthLeft, LandmarkRef::Index(356)),
    (FaceWidthRight, LandmarkRef::Index(127)),
    (Trichion, LandmarkRef::Index(10)),
    (Glabella, LandmarkRef::Index(9)),
    (FrontozygomaticusLeft, LandmarkRef::Index(300)),
    (FrontozygomaticusRight, LandmarkRef::Index(70)),
    (EndoCanthusLeft, LandmarkRef::Index(133)),
    (EndoCanthusRight, LandmarkRef::Index(362)),
    (ExoCanthusLeft, LandmarkRef::Index(263)),
    (ExoCanthusRight, LandmarkRef::Index(33)),
    (UpperPhiltrum, LandmarkRef::Index(19)),
    (AlareLeft, LandmarkRef::Index(294)),
    (AlareRight, LandmarkRef::Index(64)),
    (LowerPhiltrum, LandmarkRef::Index(0)),
    (ChristaPhiltriLeft, LandmarkRef::Index(267)),
    (ChristaPhiltriRight, LandmarkRef::Index(37)),
    (CheilionLeft, LandmarkRef::Index(61)),
    (CheilionRight, LandmarkRef::Index(291)),
    (Pogonion, LandmarkRef::Index(199)),
    (Menton, LandmarkRef::Index(152)),
];

const CLASSICAL_CATALOGUE: &[FeatureSpec] = &[
    feature("middle_facial_height", Glabella, UpperPhiltrum),
    feature("lower_facial_height", UpperPhiltrum, Menton),
    feature("philtrum", UpperPhiltrum, LowerPhiltrum),
    feature("intercanthal_width", EndoCanthusLeft, EndoCanthusRight),
    feature("biocular_width", ExoCanthusLeft, ExoCanthusRight),
    feature("nasal_width", AlareLeft, AlareRight),
    feature("mouth_width", CheilionLeft, CheilionRight),
];

// Column order is the classifier's input order. Some pairs repeat under a
// second name; both columns are part of the trained input.
const MESH_CATALOGUE: &[FeatureSpec] = &[
    feature("upper_facial_height", Trichion, Glabella),
    feature("middle_facial_height", Glabella, Menton),
    feature("intercanthal_width", EndoCanthusLeft, EndoCanthusRight),
    feature("biocular_width", ExoCanthusLeft, ExoCanthusRight),
    feature("nasal_width", AlareLeft, AlareRight),
    feature("mouth_width", CheilionLeft, CheilionRight),
    feature("philtrum_height", UpperPhiltrum, LowerPhiltrum),
    feature("eye_left_width", ExoCanthusLeft, EndoCanthusLeft),
    feature("eye_right_width", EndoCanthusRight, ExoCanthusRight),
    feature("endo_canthus_glabella_left", EndoCanthusLeft, Glabella),
    feature("endo_canthus_glabella_right", Glabella, EndoCanthusRight),
    feature("exo_canthus_christa_philtri_left", ChristaPhiltriLeft, ExoCanthusLeft),
    feature("exo_canthus_christa_philtri_right", ExoCanthusRight, ChristaPhiltriRight),
    feature("alare_left_lower_philtrum", AlareLeft, LowerPhiltrum),
    feature("glabella_alare_right", Glabella, AlareRight),
    feature("glabella_christa_philtri_left", Glabella, ChristaPhiltriLeft),
    feature("glabella_lower_philtrum", Glabella, LowerPhiltrum),
    feature("glabella_christa_philtri_right", Glabella, ChristaPhiltriRight),
    feature("christa_philtri_right_alare_left", AlareLeft, ChristaPhiltriRight),
    feature("christa_philtri_right_cheilion_left", CheilionLeft, ChristaPhiltriRight),
    feature("christa_philtri_left_cheilion_right", ChristaPhiltriLeft, CheilionRight),
    feature("christa_philtri_left_lower_philtrum", LowerPhiltrum, ChristaPhiltriLeft),
    feature("cheilion_left_lower_philtrum", CheilionLeft, LowerPhiltrum),
    feature("cheilion_left_christa_philtri_right", CheilionLeft, ChristaPhiltriRight),
    feature("cheilion_left_christa_philtri_left", CheilionLeft, ChristaPhiltriLeft),
    feature("cheilion_left_cheilion_right", CheilionLeft, CheilionRight),
    feature("cheilion_left_pogonion", CheilionLeft, Pogonion),
    feature("cheilion_right_lower_philtrum", CheilionRight, LowerPhiltrum),
    feature("cheilion_right_christa_philtri_right", CheilionRight, ChristaPhiltriRight),
    feature("cheilion_right_christa_philtri_left", CheilionRight, ChristaPhiltriLeft),
    feature("frontozygomaticus_endo_cantus_left", FrontozygomaticusLeft, ExoCanthusLeft),
    feature("frontozygomaticus_exo_cantus_left", FrontozygomaticusLeft, ExoCanthusLeft),
    feature("frontozygomaticus_left_alare_right", FrontozygomaticusLeft, AlareRight),
    feature("frontozygomaticus_left_cheilion_right", FrontozygomaticusLeft, CheilionRight),
    feature("frontozygomaticus_endo_cantus_right", FrontozygomaticusRight, EndoCanthusRight),
    feature("frontozygomaticus_exo_cantus_right", FrontozygomaticusRight, ExoCanthusRight),
    feature("frontozygomaticus_right_cheilion_left", FrontozygomaticusRight, CheilionLeft),
    feature("face_height", Trichion, Menton),
    feature("face_width", FaceWidthLeft, FaceWidthRight),
];

/// Detector layout. The two index tables must never be mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    /// Face box + 68-point regressor.
    Classical,
    /// 468-point dense face mesh.
    Mesh,
}

impl Schema {
    pub fn landmark_count(&self) -> usize {
        match self {
            Schema::Classical => 68,
            Schema::Mesh => 468,
        }
    }

    /// Whether raw rows for this layout carry a depth column.
    pub fn has_depth(&self) -> bool {
        matches!(self, Schema::Mesh)
    }

    pub fn table(&self) -> &'static [(Anatomy, LandmarkRef)] {
        match self {
            Schema::Classical => CLASSICAL_TABLE,
            Schema::Mesh => MESH_TABLE,
        }
    }

    pub fn catalogue(&self) -> &'static [FeatureSpec] {
        match self {
            Schema::Classical => CLASSICAL_CATALOGUE,
            Schema::Mesh => MESH_CATALOGUE,
        }
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &'static str> {
        self.catalogue().iter().map(|f| f.name)
    }

    pub fn lookup(&self, anatomy: Anatomy) -> Option<LandmarkRef> {
        self.table()
            .iter()
            .find(|(a, _)| *a == anatomy)
            .map(|(_, r)| *r)
    }

    /// Highest raw index the table touches.
    pub fn max_index(&self) -> usize {
        self.table()
            .iter()
            .map(|(_, r)| r.max_index())
            .max()
            .unwrap_or(0)
    }

    /// Pick the layout matching a detector's point count.
    pub fn for_landmark_count(n: usize) -> Option<Self> {
        [Schema::Classical, Schema::Mesh]
            .into_iter()
            .find(|s| s.landmark_count() == n)
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schema::Classical => write!(f, "classical"),
            Schema::Mesh => write!(f, "mesh"),
        }
    }
}
