//! Folder-to-CSV batch accumulation.

use std::fs;
use std::path::{Path, PathBuf};

use anthropo_vision::{LandmarkSet, LandmarkSource};
use log::{info, warn};

use crate::dataset::{self, CsvSink, OutputPolicy, RecordKind};
use crate::error::{Error, Result};
use crate::features::compute_features;
use crate::schema::Schema;

pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Outcome of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub written: usize,
    pub skipped_empty: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.written + self.skipped_empty + self.failed
    }
}

enum Outcome {
    Written,
    NoFace,
}

/// Runs a landmark source over every image in a folder and appends one
/// labelled row per image with a detectable face.
pub struct Batch<S: LandmarkSource> {
    source: S,
    schema: Schema,
    kind: RecordKind,
    extensions: Vec<String>,
}

impl<S: LandmarkSource> Batch<S> {
    /// Fails with [`Error::SchemaMismatch`] when the source's landmark count
    /// does not fit the layout.
    pub fn new(source: S, schema: Schema, kind: RecordKind) -> Result<Self> {
        if source.num_landmarks() != schema.landmark_count() {
            return Err(Error::SchemaMismatch(format!(
                "detector yields {} landmarks, {} layout needs {}",
                source.num_landmarks(),
                schema,
                schema.landmark_count()
            )));
        }
        Ok(Self {
            source,
            schema,
            kind,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        })
    }

    pub fn with_extensions<I, T>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn run(
        &mut self,
        folder: &Path,
        label: u8,
        output: &Path,
        policy: OutputPolicy,
    ) -> Result<BatchReport> {
        if label > 1 {
            return Err(Error::MalformedPayload(format!(
                "class label must be 0 or 1, got {}",
                label
            )));
        }

        let images = list_images(folder, &self.extensions)?;
        info!(
            "{} image(s) in {} (class {}, {} layout)",
            images.len(),
            folder.display(),
            label,
            self.schema
        );

        dataset::prepare_output(output, policy)?;
        let mut sink = CsvSink::open(output, &dataset::header(self.schema, self.kind))?;
        let mut report = BatchReport::default();
        let first = sink.last_sample() + 1;
        if first > 1 {
            info!("continuing after sample {} in {}", first - 1, output.display());
        }

        for (i, path) in images.iter().enumerate() {
            let sample = first + i;
            match self.process(path, sample, label, &mut sink) {
                Ok(Outcome::Written) => report.written += 1,
                Ok(Outcome::NoFace) => {
                    warn!("{}: no face detected, skipping", path.display());
                    report.skipped_empty += 1;
                }
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "wrote {} row(s) to {} ({} without face, {} failed)",
            report.written,
            output.display(),
            report.skipped_empty,
            report.failed
        );
        Ok(report)
    }

    fn process(
        &mut self,
        path: &Path,
        sample: usize,
        label: u8,
        sink: &mut CsvSink,
    ) -> Result<Outcome> {
        let img = image::open(path)?;
        let mut faces = self.source.detect(&img)?;
        if faces.is_empty() {
            return Ok(Outcome::NoFace);
        }
        let face: LandmarkSet = faces.swap_remove(0);

        let row = match self.kind {
            RecordKind::Raw => dataset::raw_row(sample, label, &face, self.schema)?,
            RecordKind::Features => {
                let features = compute_features(&face, self.schema)?;
                dataset::feature_row(sample, label, &features)
            }
        };
        sink.append(&row)?;
        Ok(Outcome::Written)
    }
}

/// Image files directly inside `folder`, sorted by file name.
pub fn list_images(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::FileNotFound(folder.to_path_buf()));
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}
