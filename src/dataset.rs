//! Loader for the Helen annotated face dataset.
//!
//! An annotation file looks like:
//!
//! ```text
//! 100032540_1
//! 563.53 , 411.97
//! 564.69 , 426.35
//! ...
//! ```
//!
//! The first line names the image (file stem, no extension); each following
//! line is one landmark in 1-based pixel coordinates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::error::{Error, Result};
use crate::types::{Landmark, Point};

/// Read a Helen annotation file.
///
/// Returns the image name from the header line and the landmarks, named
/// `"1"`, `"2"`, ... in file order and shifted to 0-based coordinates.
pub fn read_helen_landmarks<P: AsRef<Path>>(path: P) -> Result<(String, Vec<Landmark>)> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| Error::LandmarkFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_helen_landmarks(&text, path)
}

fn parse_helen_landmarks(text: &str, path: &Path) -> Result<(String, Vec<Landmark>)> {
    let mut lines = text.lines();
    let name = lines.next().unwrap_or_default().trim_end().to_string();

    let mut landmarks = Vec::with_capacity(194);
    for (offset, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let point = parse_point(line).ok_or_else(|| Error::LandmarkFormat {
            path: path.to_path_buf(),
            line: offset + 2,
            content: line.to_string(),
        })?;
        // Annotations use the 1-based Matlab convention for pixel coordinates
        let point = Point::new(point.x - 1.0, point.y - 1.0);
        landmarks.push(Landmark::new((landmarks.len() + 1).to_string(), point));
    }

    Ok((name, landmarks))
}

fn parse_point(line: &str) -> Option<Point> {
    let (x, y) = line.split_once(',')?;
    let x: f32 = x.trim().parse().ok()?;
    let y: f32 = y.trim().parse().ok()?;
    Some(Point::new(x, y))
}

/// Access to an annotated image collection.
pub trait LandmarkDataset {
    /// Number of annotated images.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image paths, index-aligned with [`LandmarkDataset::landmarks`].
    fn filenames(&self) -> &[PathBuf];

    fn landmarks(&self) -> &[Vec<Landmark>];

    /// Path of image `index`.
    fn filename(&self, index: usize) -> Result<&Path> {
        let filenames = self.filenames();
        filenames.get(index).map(PathBuf::as_path).ok_or_else(|| {
            Error::DatasetMismatch(format!(
                "image index {index} out of range for {} images",
                filenames.len()
            ))
        })
    }

    /// Decode image `index` as 8-bit grayscale.
    fn load_image(&self, index: usize) -> Result<GrayImage>;
}

/// The Helen dataset: a directory of `.jpg` images and a directory of `.txt`
/// annotations paired by image name.
#[derive(Debug, Clone)]
pub struct HelenDataset {
    filenames: Vec<PathBuf>,
    landmarks: Vec<Vec<Landmark>>,
}

impl HelenDataset {
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(image_dir: P, annotation_dir: Q) -> Result<Self> {
        let mut filenames = list_files(image_dir.as_ref(), "jpg")?;
        filenames.sort();

        let mut annotations: HashMap<String, Vec<Landmark>> = HashMap::new();
        for path in list_files(annotation_dir.as_ref(), "txt")? {
            let (name, landmarks) = read_helen_landmarks(&path)?;
            annotations.insert(name, landmarks);
        }

        if filenames.len() != annotations.len() {
            return Err(Error::DatasetMismatch(format!(
                "{} images but {} annotations",
                filenames.len(),
                annotations.len()
            )));
        }

        let mut landmarks = Vec::with_capacity(filenames.len());
        for file in &filenames {
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let lmk = annotations.remove(&stem).ok_or_else(|| {
                Error::DatasetMismatch(format!("no annotation for image {}", file.display()))
            })?;
            landmarks.push(lmk);
        }

        tracing::info!(
            images = filenames.len(),
            "loaded Helen annotations"
        );

        Ok(Self {
            filenames,
            landmarks,
        })
    }
}

impl LandmarkDataset for HelenDataset {
    fn len(&self) -> usize {
        self.filenames.len()
    }

    fn filenames(&self) -> &[PathBuf] {
        &self.filenames
    }

    fn landmarks(&self) -> &[Vec<Landmark>] {
        &self.landmarks
    }

    fn load_image(&self, index: usize) -> Result<GrayImage> {
        Ok(image::open(self.filename(index)?)?.to_luma8())
    }
}

fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().is_some_and(|e| e == extension)
        {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sdm_dataset_{}_{}", name, std::process::id()));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parse_shifts_to_zero_based() {
        let text = "img_1\r\n10.5 , 20.0\n1 , 1\n\n";
        let (name, lmks) = parse_helen_landmarks(text, Path::new("a.txt")).unwrap();

        assert_eq!(name, "img_1");
        assert_eq!(lmks.len(), 2);
        assert_eq!(lmks[0].name, "1");
        assert_eq!(lmks[0].point, Point::new(9.5, 19.0));
        assert_eq!(lmks[1].name, "2");
        assert_eq!(lmks[1].point, Point::new(0.0, 0.0));
    }

    #[test]
    fn malformed_line_reports_position() {
        let text = "img_1\n10 , 20\n10 20\n";
        let err = parse_helen_landmarks(text, Path::new("a.txt")).unwrap_err();
        match err {
            Error::LandmarkFormat { line, content, .. } => {
                assert_eq!(line, 3);
                assert_eq!(content, "10 20");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_named() {
        let err = read_helen_landmarks("/nonexistent/annotation.txt").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/annotation.txt"));
    }

    #[test]
    fn open_pairs_images_by_stem() {
        let dir = scratch_dir("pairs");
        let images = dir.join("images");
        let annotations = dir.join("annotation");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&annotations).unwrap();

        for name in ["b", "a"] {
            GrayImage::new(8, 8).save(images.join(format!("{name}.jpg"))).unwrap();
        }
        // Annotation file names do not need to match; the header line does.
        fs::write(annotations.join("1.txt"), "a\n2 , 3\n").unwrap();
        fs::write(annotations.join("2.txt"), "b\n4 , 5\n").unwrap();
        fs::write(annotations.join("notes.md"), "ignored").unwrap();

        let dataset = HelenDataset::open(&images, &annotations).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.filenames()[0].ends_with("a.jpg"));
        assert_eq!(dataset.landmarks()[0][0].point, Point::new(1.0, 2.0));
        assert_eq!(dataset.landmarks()[1][0].point, Point::new(3.0, 4.0));

        let img = dataset.load_image(1).unwrap();
        assert_eq!(img.dimensions(), (8, 8));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn out_of_range_image_is_an_error() {
        let dir = scratch_dir("range");
        GrayImage::new(4, 4).save(dir.join("a.jpg")).unwrap();
        fs::write(dir.join("a.txt"), "a\n1 , 1\n").unwrap();

        let dataset = HelenDataset::open(&dir, &dir).unwrap();
        assert!(matches!(dataset.filename(1), Err(Error::DatasetMismatch(_))));
        assert!(matches!(dataset.load_image(1), Err(Error::DatasetMismatch(_))));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let dir = scratch_dir("mismatch");
        GrayImage::new(4, 4).save(dir.join("a.jpg")).unwrap();
        fs::write(dir.join("a.txt"), "a\n1 , 1\n").unwrap();
        fs::write(dir.join("b.txt"), "b\n1 , 1\n").unwrap();

        let err = HelenDataset::open(&dir, &dir).unwrap_err();
        assert!(matches!(err, Error::DatasetMismatch(_)));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unpaired_image_is_an_error() {
        let dir = scratch_dir("unpaired");
        GrayImage::new(4, 4).save(dir.join("a.jpg")).unwrap();
        fs::write(dir.join("a.txt"), "zzz\n1 , 1\n").unwrap();

        let err = HelenDataset::open(&dir, &dir).unwrap_err();
        assert!(matches!(err, Error::DatasetMismatch(_)));

        fs::remove_dir_all(dir).ok();
    }
}
