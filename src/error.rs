use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Could not open landmark file {path}: {source}")]
    LandmarkFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Landmark format error in {path} at line {line}: {content:?}")]
    LandmarkFormat {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Dataset mismatch: {0}")]
    DatasetMismatch(String),

    #[error("Face detector error: {0}")]
    Detector(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Linear system is singular (stage {stage})")]
    SingularSystem { stage: usize },

    #[error("Degenerate shape: {0}")]
    DegenerateShape(String),

    #[error("HOG extraction failed: {0}")]
    Hog(String),

    #[error("No training samples: none of the {total} images had a valid face")]
    NoTrainingSamples { total: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
