//! CSV datasets: raw landmark rows and derived feature rows.
//!
//! Raw classical rows are `amostra, class, X1..X68, Y1..Y68`; raw mesh rows
//! are `amostra, class, X0, Y0, Z0, ..., X467, Y467, Z467`; feature rows are
//! `samples, class, <catalogue names>`. One file holds one schema.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anthropo_vision::{Landmark, LandmarkSet};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::schema::Schema;

/// What a dataset row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordKind {
    /// Flattened landmark coordinates.
    Raw,
    /// Catalogue distances.
    Features,
}

/// What to do with an output file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPolicy {
    /// Delete it and start over.
    #[default]
    Recreate,
    /// Keep its rows and add more; its header must match.
    Append,
}

pub fn raw_header(schema: Schema) -> Vec<String> {
    let n = schema.landmark_count();
    let mut cols = vec!["amostra".to_string(), "class".to_string()];
    match schema {
        Schema::Classical => {
            cols.extend((1..=n).map(|i| format!("X{}", i)));
            cols.extend((1..=n).map(|i| format!("Y{}", i)));
        }
        Schema::Mesh => {
            for i in 0..n {
                cols.push(format!("X{}", i));
                cols.push(format!("Y{}", i));
                cols.push(format!("Z{}", i));
            }
        }
    }
    cols
}

pub fn feature_header(schema: Schema) -> Vec<String> {
    let mut cols = vec!["samples".to_string(), "class".to_string()];
    cols.extend(schema.feature_names().map(str::to_string));
    cols
}

pub fn header(schema: Schema, kind: RecordKind) -> Vec<String> {
    match kind {
        RecordKind::Raw => raw_header(schema),
        RecordKind::Features => feature_header(schema),
    }
}

pub fn raw_row(sample: usize, label: u8, set: &LandmarkSet, schema: Schema) -> Result<Vec<String>> {
    let n = schema.landmark_count();
    if set.len() != n {
        return Err(Error::SchemaMismatch(format!(
            "{} layout expects {} landmarks, got {}",
            schema,
            n,
            set.len()
        )));
    }

    let mut row = vec![sample.to_string(), label.to_string()];
    match schema {
        Schema::Classical => {
            row.extend(set.points.iter().map(|p| p.x.to_string()));
            row.extend(set.points.iter().map(|p| p.y.to_string()));
        }
        Schema::Mesh => {
            for p in &set.points {
                let z = p
                    .z
                    .ok_or_else(|| Error::SchemaMismatch("mesh rows need depth values".into()))?;
                row.push(p.x.to_string());
                row.push(p.y.to_string());
                row.push(z.to_string());
            }
        }
    }
    Ok(row)
}

pub fn feature_row(sample: usize, label: u8, features: &FeatureVector) -> Vec<String> {
    let mut row = vec![sample.to_string(), label.to_string()];
    row.extend(features.to_vec().iter().map(|v| v.to_string()));
    row
}

/// Remove a stale output file when the policy asks for it.
pub fn prepare_output(path: &Path, policy: OutputPolicy) -> Result<()> {
    if policy == OutputPolicy::Recreate && path.exists() {
        log::info!("removing existing output {}", path.display());
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Append-only CSV writer that owns the header.
///
/// A new or empty file gets the header on open; an existing file must start
/// with exactly the same header.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    columns: usize,
    written: usize,
    last_sample: usize,
}

impl CsvSink {
    pub fn open(path: &Path, header: &[String]) -> Result<Self> {
        let has_content = path.exists() && fs::metadata(path)?.len() > 0;
        let mut last_sample = 0;

        if has_content {
            let (existing, last) = scan_existing(path)?;
            if existing != header {
                return Err(Error::SchemaMismatch(format!(
                    "{} has {} columns starting {:?}, expected {} starting {:?}",
                    path.display(),
                    existing.len(),
                    existing.iter().take(3).collect::<Vec<_>>(),
                    header.len(),
                    header.iter().take(3).collect::<Vec<_>>()
                )));
            }
            last_sample = last;
        } else if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if !has_content {
            writer.write_record(header)?;
            writer.flush()?;
            log::debug!("created {} with {} columns", path.display(), header.len());
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            columns: header.len(),
            written: 0,
            last_sample,
        })
    }

    /// Write one row and flush it to disk.
    pub fn append(&mut self, row: &[String]) -> Result<()> {
        if row.len() != self.columns {
            return Err(Error::SchemaMismatch(format!(
                "row has {} fields, {} expects {}",
                row.len(),
                self.path.display(),
                self.columns
            )));
        }
        self.writer.write_record(row)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Rows appended through this sink.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sample index already in the file when it was opened, 0 for a
    /// new file. New rows continue numbering after it.
    pub fn last_sample(&self) -> usize {
        self.last_sample
    }
}

/// Header and highest sample index of an existing dataset.
fn scan_existing(path: &Path) -> Result<(Vec<String>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => return Ok((vec![], 0)),
    };

    let mut last = 0;
    for record in records {
        last = last.max(parse_sample(&record?)?);
    }
    Ok((header, last))
}

fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn parse_sample(record: &csv::StringRecord) -> Result<usize> {
    let raw = record.get(0).unwrap_or("");
    raw.trim().parse::<usize>().map_err(|e| Error::InvalidRecord {
        line: record_line(record),
        reason: format!("sample index {:?}: {}", raw, e),
    })
}

/// Number of data rows (header excluded).
pub fn count_rows(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut n = 0;
    for record in reader.records() {
        record?;
        n += 1;
    }
    Ok(n)
}

/// One row of a raw landmark dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub sample: usize,
    pub label: u8,
    pub landmarks: LandmarkSet,
}

/// Read a raw landmark dataset back into landmark sets.
pub fn read_raw_landmarks(path: &Path, schema: Schema) -> Result<Vec<RawSample>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let expected = raw_header(schema);
    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if found != expected {
        return Err(Error::SchemaMismatch(format!(
            "{} is not a raw {} landmark file ({} columns, expected {})",
            path.display(),
            schema,
            found.len(),
            expected.len()
        )));
    }

    let n = schema.landmark_count();
    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record);
        let bad = |reason: String| Error::InvalidRecord { line, reason };

        let field = |i: usize| -> Result<f32> {
            let raw = record.get(i).unwrap_or("");
            raw.trim()
                .parse::<f32>()
                .map_err(|e| bad(format!("column {}: {:?}: {}", expected[i], raw, e)))
        };

        let sample = parse_sample(&record)?;
        let label = field(1)?;
        if label != 0.0 && label != 1.0 {
            return Err(bad(format!("class must be 0 or 1, got {}", label)));
        }

        let mut points = Vec::with_capacity(n);
        for i in 0..n {
            let lm = match schema {
                Schema::Classical => Landmark::new(field(2 + i)?, field(2 + n + i)?),
                Schema::Mesh => Landmark::with_depth(
                    field(2 + i * 3)?,
                    field(3 + i * 3)?,
                    field(4 + i * 3)?,
                ),
            };
            points.push(lm);
        }

        samples.push(RawSample {
            sample,
            label: label as u8,
            landmarks: LandmarkSet::new(points),
        });
    }

    log::debug!("read {} raw sample(s) from {}", samples.len(), path.display());
    Ok(samples)
}

/// Convert a raw landmark dataset into a feature dataset.
///
/// Returns the number of rows written.
pub fn measure_file(input: &Path, output: &Path, schema: Schema, policy: OutputPolicy) -> Result<usize> {
    let samples = read_raw_landmarks(input, schema)?;
    prepare_output(output, policy)?;
    let mut sink = CsvSink::open(output, &feature_header(schema))?;

    for s in &samples {
        let features = crate::features::compute_features(&s.landmarks, schema)?;
        if features.invalid_count() > 0 {
            log::debug!(
                "sample {}: {} invalid distance(s)",
                s.sample,
                features.invalid_count()
            );
        }
        sink.append(&feature_row(s.sample, s.label, &features))?;
    }

    Ok(sink.written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_features;

    fn classical_set() -> LandmarkSet {
        (0..68).map(|i| Landmark::new(i as f32, 100.0 + i as f32)).collect()
    }

    fn mesh_set() -> LandmarkSet {
        (0..468)
            .map(|i| Landmark::with_depth(i as f32, (i * 2) as f32, -0.25))
            .collect()
    }

    #[test]
    fn raw_headers() {
        let h = raw_header(Schema::Classical);
        assert_eq!(h.len(), 2 + 136);
        assert_eq!(&h[..3], &["amostra", "class", "X1"]);
        assert_eq!(h[2 + 68], "Y1");
        assert_eq!(h.last().unwrap(), "Y68");

        let h = raw_header(Schema::Mesh);
        assert_eq!(h.len(), 2 + 468 * 3);
        assert_eq!(&h[2..6], &["X0", "Y0", "Z0", "X1"]);
        assert_eq!(h.last().unwrap(), "Z467");
    }

    #[test]
    fn feature_header_matches_catalogue() {
        let h = feature_header(Schema::Mesh);
        assert_eq!(h.len(), 41);
        assert_eq!(h[0], "samples");
        assert_eq!(h[2], "upper_facial_height");
        assert_eq!(h[40], "face_width");
    }

    #[test]
    fn raw_rows_follow_header_layout() {
        let row = raw_row(3, 1, &classical_set(), Schema::Classical).unwrap();
        assert_eq!(row.len(), raw_header(Schema::Classical).len());
        assert_eq!(&row[..3], &["3", "1", "0"]);
        assert_eq!(row[2 + 68], "100");

        let row = raw_row(1, 0, &mesh_set(), Schema::Mesh).unwrap();
        assert_eq!(&row[5..8], &["1", "2", "-0.25"]);
    }

    #[test]
    fn raw_row_rejects_wrong_layout() {
        assert!(matches!(
            raw_row(1, 0, &classical_set(), Schema::Mesh),
            Err(Error::SchemaMismatch(_))
        ));
        let flat: LandmarkSet = (0..468).map(|i| Landmark::new(i as f32, 0.0)).collect();
        assert!(raw_row(1, 0, &flat, Schema::Mesh).is_err());
    }

    #[test]
    fn header_written_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/features.csv");
        let header = feature_header(Schema::Classical);
        let fv = compute_features(&classical_set(), Schema::Classical).unwrap();

        let mut sink = CsvSink::open(&path, &header).unwrap();
        sink.append(&feature_row(1, 0, &fv)).unwrap();
        sink.append(&feature_row(2, 0, &fv)).unwrap();
        drop(sink);

        let mut sink = CsvSink::open(&path, &header).unwrap();
        sink.append(&feature_row(3, 1, &fv)).unwrap();
        assert_eq!(sink.written(), 1);
        drop(sink);

        assert_eq!(count_rows(&path).unwrap(), 3);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("samples,class").count(), 1);
    }

    #[test]
    fn mixing_schemas_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        CsvSink::open(&path, &feature_header(Schema::Classical)).unwrap();
        let err = CsvSink::open(&path, &feature_header(Schema::Mesh)).err().unwrap();
        assert!(matches!(err, Error::SchemaMismatch(_)));

        let mut sink = CsvSink::open(&path, &feature_header(Schema::Classical)).unwrap();
        assert!(sink.append(&["1".to_string()]).is_err());
    }

    #[test]
    fn recreate_policy_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.csv");
        fs::write(&path, "old,header\n1,2\n").unwrap();
        prepare_output(&path, OutputPolicy::Append).unwrap();
        assert!(path.exists());
        prepare_output(&path, OutputPolicy::Recreate).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn raw_file_reads_back_and_measures() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        let mut sink = CsvSink::open(&raw, &raw_header(Schema::Mesh)).unwrap();
        let set = mesh_set();
        sink.append(&raw_row(1, 0, &set, Schema::Mesh).unwrap()).unwrap();
        sink.append(&raw_row(4, 1, &set, Schema::Mesh).unwrap()).unwrap();
        drop(sink);

        let samples = read_raw_landmarks(&raw, Schema::Mesh).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].sample, 4);
        assert_eq!(samples[1].label, 1);
        assert_eq!(samples[0].landmarks, set);

        let out = dir.path().join("distances.csv");
        let n = measure_file(&raw, &out, Schema::Mesh, OutputPolicy::Recreate).unwrap();
        assert_eq!(n, 2);
        assert_eq!(count_rows(&out).unwrap(), 2);

        assert!(matches!(
            read_raw_landmarks(&raw, Schema::Classical),
            Err(Error::SchemaMismatch(_))
        ));
        assert!(matches!(
            read_raw_landmarks(&dir.path().join("nope.csv"), Schema::Mesh),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn reopened_sink_reports_last_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.csv");
        let header = feature_header(Schema::Classical);
        let fv = compute_features(&classical_set(), Schema::Classical).unwrap();

        let mut sink = CsvSink::open(&path, &header).unwrap();
        assert_eq!(sink.last_sample(), 0);
        sink.append(&feature_row(4, 0, &fv)).unwrap();
        sink.append(&feature_row(2, 0, &fv)).unwrap();
        drop(sink);

        assert_eq!(CsvSink::open(&path, &header).unwrap().last_sample(), 4);
    }

    #[test]
    fn fractional_sample_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        let mut sink = CsvSink::open(&raw, &raw_header(Schema::Classical)).unwrap();
        let mut row = raw_row(1, 0, &classical_set(), Schema::Classical).unwrap();
        row[0] = "1.7".to_string();
        sink.append(&row).unwrap();
        row[0] = "-3".to_string();
        sink.append(&row).unwrap();
        drop(sink);

        let err = read_raw_landmarks(&raw, Schema::Classical).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { line: 2, .. }));
        assert!(matches!(
            CsvSink::open(&raw, &raw_header(Schema::Classical)).err(),
            Some(Error::InvalidRecord { .. })
        ));
    }

    #[test]
    fn bad_label_is_reported_with_line() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        let mut sink = CsvSink::open(&raw, &raw_header(Schema::Classical)).unwrap();
        let mut row = raw_row(1, 0, &classical_set(), Schema::Classical).unwrap();
        row[1] = "7".to_string();
        sink.append(&row).unwrap();
        drop(sink);

        let err = read_raw_landmarks(&raw, Schema::Classical).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { line: 2, .. }));
    }
}
