use geo::{BoundingRect, Contains, LineString, Polygon};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MaskError {
    #[error("A polygon must have an even number of coordinates and at least 3 points, got {0} values.")]
    InvalidPolygon(usize),
    #[error("RLE counts cover {covered} pixels, but the mask of size {height}x{width} has {expected}.")]
    RleSizeMismatch {
        height: usize,
        width: usize,
        covered: usize,
        expected: usize,
    },
    #[error("RLE string contains a negative run length at position {0}.")]
    NegativeRun(usize),
    #[error("RLE string is malformed at byte {0}.")]
    MalformedRle(usize),
}

/// Binary instance mask, one byte per pixel in row-major order.
///
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BitMask {
    height: usize,
    width: usize,
    data: Vec<u8>,
}

impl BitMask {
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            data: vec![0; height * width],
        }
    }

    pub fn from_data(height: usize, width: usize, data: Vec<u8>) -> Option<Self> {
        if data.len() != height * width {
            return None;
        }
        Some(Self {
            height,
            width,
            data,
        })
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[y * self.width + x] = value as u8;
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|v| **v != 0).count()
    }

    pub fn is_nonempty(&self) -> bool {
        self.data.iter().any(|v| *v != 0)
    }

    /// Marks every pixel whose centre lies inside any of the rings.
    ///
    /// Each ring is a flat `[x0, y0, x1, y1, ...]` list in pixel coordinates.
    pub fn from_polygons(
        polygons: &[Vec<f32>],
        height: usize,
        width: usize,
    ) -> Result<Self, MaskError> {
        let mut mask = Self::empty(height, width);
        for ring in polygons {
            if ring.len() % 2 != 0 || ring.len() < 6 {
                return Err(MaskError::InvalidPolygon(ring.len()));
            }
            let poly = Polygon::new(
                LineString::from(
                    ring.chunks_exact(2)
                        .map(|c| (c[0] as f64, c[1] as f64))
                        .collect::<Vec<_>>(),
                ),
                vec![],
            );
            let Some(rect) = poly.bounding_rect() else {
                continue;
            };
            let x_from = rect.min().x.floor().max(0.0) as usize;
            let y_from = rect.min().y.floor().max(0.0) as usize;
            let x_to = (rect.max().x.ceil().max(0.0) as usize).min(width);
            let y_to = (rect.max().y.ceil().max(0.0) as usize).min(height);
            for y in y_from..y_to {
                for x in x_from..x_to {
                    let centre = geo::Point::new(x as f64 + 0.5, y as f64 + 0.5);
                    if poly.contains(&centre) {
                        mask.set(x, y, true);
                    }
                }
            }
        }
        Ok(mask)
    }

    /// Decodes uncompressed COCO run lengths (column-major, background first).
    pub fn from_rle_counts(counts: &[u32], height: usize, width: usize) -> Result<Self, MaskError> {
        let expected = height * width;
        let covered = counts.iter().map(|c| *c as usize).sum::<usize>();
        if covered != expected {
            return Err(MaskError::RleSizeMismatch {
                height,
                width,
                covered,
                expected,
            });
        }
        let mut mask = Self::empty(height, width);
        let mut pos = 0usize;
        for (i, run) in counts.iter().enumerate() {
            let run = *run as usize;
            if i % 2 == 1 {
                for p in pos..pos + run {
                    mask.set(p / height, p % height, true);
                }
            }
            pos += run;
        }
        Ok(mask)
    }

    /// Decodes the compressed COCO RLE string form.
    pub fn from_rle_string(counts: &str, height: usize, width: usize) -> Result<Self, MaskError> {
        let decoded = decode_rle_string(counts)?;
        Self::from_rle_counts(&decoded, height, width)
    }

    pub fn flip_horizontal(&self) -> Self {
        let mut out = Self::empty(self.height, self.width);
        for y in 0..self.height {
            for x in 0..self.width {
                out.data[y * self.width + x] = self.data[y * self.width + (self.width - 1 - x)];
            }
        }
        out
    }

    pub fn flip_vertical(&self) -> Self {
        let mut out = Self::empty(self.height, self.width);
        for y in 0..self.height {
            let src = (self.height - 1 - y) * self.width;
            out.data[y * self.width..(y + 1) * self.width]
                .copy_from_slice(&self.data[src..src + self.width]);
        }
        out
    }

    /// Nearest-neighbour resize.
    pub fn resize(&self, new_height: usize, new_width: usize) -> Self {
        let mut out = Self::empty(new_height, new_width);
        if self.height == 0 || self.width == 0 {
            return out;
        }
        for y in 0..new_height {
            let sy = (y * self.height / new_height).min(self.height - 1);
            for x in 0..new_width {
                let sx = (x * self.width / new_width).min(self.width - 1);
                out.data[y * new_width + x] = self.data[sy * self.width + sx];
            }
        }
        out
    }

    /// Crops the `(x0, y0, width, height)` window; parts outside the mask stay empty.
    pub fn crop(&self, x0: usize, y0: usize, width: usize, height: usize) -> Self {
        let mut out = Self::empty(height, width);
        for y in 0..height.min(self.height.saturating_sub(y0)) {
            for x in 0..width.min(self.width.saturating_sub(x0)) {
                out.data[y * width + x] = self.data[(y0 + y) * self.width + x0 + x];
            }
        }
        out
    }
}

fn decode_rle_string(s: &str) -> Result<Vec<u32>, MaskError> {
    let bytes = s.as_bytes();
    let mut counts: Vec<i64> = Vec::with_capacity(bytes.len());
    let mut p = 0usize;
    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k = 0u32;
        let mut more = true;
        while more && p < bytes.len() {
            if 5 * k >= i64::BITS {
                return Err(MaskError::MalformedRle(p));
            }
            let c = bytes[p] as i64 - 48;
            x |= (c & 0x1f) << (5 * k);
            more = c & 0x20 != 0;
            p += 1;
            k += 1;
            if !more && (c & 0x10) != 0 {
                x |= (-1i64)
                    .checked_shl(5 * k)
                    .ok_or(MaskError::MalformedRle(p - 1))?;
            }
        }
        let m = counts.len();
        if m > 2 {
            x = x
                .checked_add(counts[m - 2])
                .ok_or(MaskError::MalformedRle(p - 1))?;
        }
        counts.push(x);
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| u32::try_from(c).map_err(|_| MaskError::NegativeRun(i)))
        .collect()
}
