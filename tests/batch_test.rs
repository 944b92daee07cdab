use std::fs;
use std::path::Path;

use anthropo::{
    dataset, Batch, BatchReport, Error, Landmark, LandmarkSet, LandmarkSource, OutputPolicy,
    RecordKind, Schema,
};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

/// Finds a "face" in any image whose top-left pixel is not black.
struct PixelFaces {
    points: usize,
}

impl LandmarkSource for PixelFaces {
    fn num_landmarks(&self) -> usize {
        self.points
    }

    fn detect(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<LandmarkSet>> {
        let px = image.get_pixel(0, 0);
        if px[0] == 0 && px[1] == 0 && px[2] == 0 {
            return Ok(vec![]);
        }
        let base = px[0] as f32;
        let set = (0..self.points)
            .map(|i| Landmark::with_depth(base + (i % 20) as f32, (i / 20) as f32, 0.0))
            .collect();
        Ok(vec![set])
    }
}

fn write_image(dir: &Path, name: &str, shade: u8) {
    RgbImage::from_pixel(16, 16, Rgb([shade, shade, shade]))
        .save(dir.join(name))
        .unwrap();
}

fn rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn faceless_images_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("positive");
    fs::create_dir(&images).unwrap();
    write_image(&images, "01.png", 10);
    write_image(&images, "02.png", 0);
    write_image(&images, "03.jpg", 30);
    write_image(&images, "04.png", 0);
    write_image(&images, "05.png", 50);

    let out = dir.path().join("features.csv");
    let mut batch = Batch::new(PixelFaces { points: 468 }, Schema::Mesh, RecordKind::Features).unwrap();
    let report = batch.run(&images, 1, &out, OutputPolicy::Recreate).unwrap();

    assert_eq!(
        report,
        BatchReport {
            written: 3,
            skipped_empty: 2,
            failed: 0
        }
    );

    let rows = rows(&out);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r[1] == "1"));
    assert!(rows.iter().all(|r| r.len() == 2 + 39));
    let samples: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(samples, ["1", "3", "5"]);
}

#[test]
fn unreadable_files_do_not_abort() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 20);
    fs::write(dir.path().join("b.png"), b"truncated garbage").unwrap();
    fs::write(dir.path().join("readme.md"), b"ignored").unwrap();
    write_image(dir.path(), "c.png", 40);

    let out = dir.path().join("out").join("raw.csv");
    let mut batch = Batch::new(PixelFaces { points: 68 }, Schema::Classical, RecordKind::Raw).unwrap();
    let report = batch.run(dir.path(), 0, &out, OutputPolicy::Recreate).unwrap();

    assert_eq!(report.written, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total(), 3);

    let samples = dataset::read_raw_landmarks(&out, Schema::Classical).unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].sample, 1);
    assert_eq!(samples[1].sample, 3);
    assert_eq!(samples[1].landmarks[0], Landmark::new(40.0, 0.0));
}

#[test]
fn two_classes_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let (neg, pos) = (dir.path().join("neg"), dir.path().join("pos"));
    fs::create_dir(&neg).unwrap();
    fs::create_dir(&pos).unwrap();
    write_image(&neg, "n1.png", 5);
    write_image(&neg, "n2.png", 6);
    write_image(&pos, "p1.png", 7);

    let out = dir.path().join("dataset.csv");
    let mut batch = Batch::new(PixelFaces { points: 468 }, Schema::Mesh, RecordKind::Features).unwrap();
    batch.run(&neg, 0, &out, OutputPolicy::Recreate).unwrap();
    batch.run(&pos, 1, &out, OutputPolicy::Append).unwrap();

    let rows = rows(&out);
    let labels: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
    assert_eq!(labels, ["0", "0", "1"]);
    let samples: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(samples, ["1", "2", "3"]);
    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("samples,")).count(), 1);

    // recreate drops what was there
    batch.run(&pos, 1, &out, OutputPolicy::Recreate).unwrap();
    assert_eq!(dataset::count_rows(&out).unwrap(), 1);
}

#[test]
fn appended_runs_keep_sample_indices_increasing() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("imgs");
    fs::create_dir(&images).unwrap();
    write_image(&images, "a.png", 11);
    write_image(&images, "b.png", 0);
    write_image(&images, "c.png", 12);

    let out = dir.path().join("raw.csv");
    let mut batch = Batch::new(PixelFaces { points: 68 }, Schema::Classical, RecordKind::Raw).unwrap();
    batch.run(&images, 0, &out, OutputPolicy::Recreate).unwrap();
    batch.run(&images, 1, &out, OutputPolicy::Append).unwrap();

    let samples: Vec<usize> = dataset::read_raw_landmarks(&out, Schema::Classical)
        .unwrap()
        .iter()
        .map(|s| s.sample)
        .collect();
    assert_eq!(samples, [1, 3, 4, 6]);
}

#[test]
fn appending_another_layout_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "x.png", 9);
    let out = dir.path().join("mixed.csv");

    Batch::new(PixelFaces { points: 68 }, Schema::Classical, RecordKind::Features)
        .unwrap()
        .run(dir.path(), 0, &out, OutputPolicy::Recreate)
        .unwrap();

    let err = Batch::new(PixelFaces { points: 468 }, Schema::Mesh, RecordKind::Features)
        .unwrap()
        .run(dir.path(), 0, &out, OutputPolicy::Append)
        .unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
}

#[test]
fn detector_and_layout_must_agree() {
    let res = Batch::new(PixelFaces { points: 68 }, Schema::Mesh, RecordKind::Raw);
    assert!(matches!(res, Err(Error::SchemaMismatch(_))));
}

#[test]
fn missing_folder_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut batch = Batch::new(PixelFaces { points: 68 }, Schema::Classical, RecordKind::Raw).unwrap();
    let err = batch
        .run(&dir.path().join("nope"), 0, &dir.path().join("o.csv"), OutputPolicy::Recreate)
        .unwrap_err();
    assert!(matches!(err, Error::FileNotFound(_)));
}

#[test]
fn custom_extensions() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 9);
    write_image(dir.path(), "b.jpg", 9);
    let out = dir.path().join("o.csv");

    let mut batch = Batch::new(PixelFaces { points: 68 }, Schema::Classical, RecordKind::Raw)
        .unwrap()
        .with_extensions([".JPG"]);
    let report = batch.run(dir.path(), 0, &out, OutputPolicy::Recreate).unwrap();
    assert_eq!(report.written, 1);
}
