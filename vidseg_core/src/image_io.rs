use crate::primitives::{ImageBuffer, ImageFormat};
use anyhow::Result;
use hashbrown::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image `{0}` is not available.")]
    NotFound(String),
    #[error("Mismatched image shape for `{path}`: got {got:?}, expected {expected:?}.")]
    SizeMismatch {
        path: String,
        got: (usize, usize),
        expected: (usize, usize),
    },
}

/// Decodes frames referenced by dataset records.
pub trait ImageReader: Send + Sync {
    fn read(&self, path: &str, format: ImageFormat) -> Result<ImageBuffer>;
}

/// Serves pre-decoded frames by path.
#[derive(Debug, Default, Clone)]
pub struct InMemoryImageReader {
    images: HashMap<String, ImageBuffer>,
}

impl InMemoryImageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, image: ImageBuffer) {
        self.images.insert(path.to_string(), image);
    }
}

impl ImageReader for InMemoryImageReader {
    fn read(&self, path: &str, _format: ImageFormat) -> Result<ImageBuffer> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| ImageError::NotFound(path.to_string()).into())
    }
}

/// Produces zero-filled frames; used to dry-run annotation processing
/// without decoding pixels.
#[derive(Debug, Clone)]
pub struct BlankImageReader {
    default_size: (usize, usize),
    sizes: HashMap<String, (usize, usize)>,
}

impl BlankImageReader {
    pub fn new(default_size: (usize, usize)) -> Self {
        Self {
            default_size,
            sizes: HashMap::new(),
        }
    }

    pub fn with_size(mut self, path: &str, size: (usize, usize)) -> Self {
        self.sizes.insert(path.to_string(), size);
        self
    }
}

impl ImageReader for BlankImageReader {
    fn read(&self, path: &str, format: ImageFormat) -> Result<ImageBuffer> {
        let (h, w) = self.sizes.get(path).copied().unwrap_or(self.default_size);
        Ok(ImageBuffer::blank(h, w, format))
    }
}

/// Fails when a decoded frame disagrees with the size declared by its record.
pub fn check_image_size(path: &str, expected: (usize, usize), image: &ImageBuffer) -> Result<()> {
    if image.shape() != expected {
        return Err(ImageError::SizeMismatch {
            path: path.to_string(),
            got: image.shape(),
            expected,
        }
        .into());
    }
    Ok(())
}
