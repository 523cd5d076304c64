use image::{GrayImage, ImageReader};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Empty file: {path}")]
    Empty { path: String },
}

/// A decoded image reduced to what the metrics need.
#[derive(Debug, Clone)]
pub struct ProbedImage {
    pub width: u32,
    pub height: u32,
    pub gray: GrayImage,
}

impl ProbedImage {
    pub fn from_gray(gray: GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self {
            width,
            height,
            gray,
        }
    }
}

/// Read only the header to get dimensions.
pub fn dimensions(path: &Path) -> Result<(u32, u32), ProbeError> {
    ensure_non_empty(path)?;
    let dims = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(dims)
}

/// Fully decode `path` into a grayscale grid. The source file is only read.
pub fn probe(path: &Path) -> Result<ProbedImage, ProbeError> {
    ensure_non_empty(path)?;
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(ProbedImage::from_gray(image.to_luma8()))
}

fn ensure_non_empty(path: &Path) -> Result<(), ProbeError> {
    if fs::metadata(path)?.len() == 0 {
        return Err(ProbeError::Empty {
            path: path.to_string_lossy().to_string(),
        });
    }
    Ok(())
}
