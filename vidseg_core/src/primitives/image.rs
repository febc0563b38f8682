use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    #[default]
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "BGR")]
    Bgr,
    #[serde(rename = "L")]
    L,
}

impl ImageFormat {
    pub fn channels(&self) -> usize {
        match self {
            ImageFormat::Rgb | ImageFormat::Bgr => 3,
            ImageFormat::L => 1,
        }
    }
}

/// Decoded frame pixels in `HWC` order.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    height: usize,
    width: usize,
    format: ImageFormat,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(height: usize, width: usize, format: ImageFormat, data: Vec<u8>) -> Result<Self> {
        let expected = height * width * format.channels();
        if data.len() != expected {
            bail!(
                "Image of size {}x{}x{} requires {} bytes, got {}",
                height,
                width,
                format.channels(),
                expected,
                data.len()
            );
        }
        Ok(Self {
            height,
            width,
            format,
            data,
        })
    }

    pub fn blank(height: usize, width: usize, format: ImageFormat) -> Self {
        Self {
            height,
            width,
            format,
            data: vec![0; height * width * format.channels()],
        }
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_width(&self) -> usize {
        self.width
    }

    /// `(height, width)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn get_format(&self) -> ImageFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let c = self.channels();
        let start = (y * self.width + x) * c;
        &self.data[start..start + c]
    }

    pub(crate) fn map_pixels<F>(&self, height: usize, width: usize, source: F) -> Self
    where
        F: Fn(usize, usize) -> Option<(usize, usize)>,
    {
        let c = self.channels();
        let mut data = vec![0; height * width * c];
        for y in 0..height {
            for x in 0..width {
                if let Some((sx, sy)) = source(x, y) {
                    let dst = (y * width + x) * c;
                    data[dst..dst + c].copy_from_slice(self.pixel(sx, sy));
                }
            }
        }
        Self {
            height,
            width,
            format: self.format,
            data,
        }
    }

    /// Planar `CHW` copy of the pixels, the layout consumed by models.
    pub fn to_chw(&self) -> Vec<u8> {
        let c = self.channels();
        let plane = self.height * self.width;
        let mut out = vec![0; plane * c];
        for (i, px) in self.data.chunks_exact(c).enumerate() {
            for (ch, v) in px.iter().enumerate() {
                out[ch * plane + i] = *v;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_check() {
        assert!(ImageBuffer::new(2, 2, ImageFormat::Rgb, vec![0; 11]).is_err());
        let img = ImageBuffer::new(1, 2, ImageFormat::Rgb, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.pixel(1, 0), &[4, 5, 6]);
        assert_eq!(img.to_chw(), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_grayscale() {
        let img = ImageBuffer::blank(3, 4, ImageFormat::L);
        assert_eq!(img.data().len(), 12);
        assert_eq!(img.shape(), (3, 4));
    }
}
