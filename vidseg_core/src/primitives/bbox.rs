use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum BoxMode {
    #[default]
    #[serde(rename = "XYXY_ABS")]
    XyxyAbs,
    #[serde(rename = "XYWH_ABS")]
    XywhAbs,
}

/// Axis-aligned box in absolute `XYXY` coordinates.
///
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub const ZERO: BBox = BBox {
        x0: 0.0,
        y0: 0.0,
        x1: 0.0,
        y1: 0.0,
    };

    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_mode(values: &[f32], mode: BoxMode) -> Result<Self> {
        if values.len() != 4 {
            bail!("A box must have 4 elements, got {}", values.len());
        }
        Ok(match mode {
            BoxMode::XyxyAbs => Self::new(values[0], values[1], values[2], values[3]),
            BoxMode::XywhAbs => Self::new(
                values[0],
                values[1],
                values[0] + values[2],
                values[1] + values[3],
            ),
        })
    }

    pub fn to_mode(&self, mode: BoxMode) -> [f32; 4] {
        match mode {
            BoxMode::XyxyAbs => [self.x0, self.y0, self.x1, self.y1],
            BoxMode::XywhAbs => [self.x0, self.y0, self.get_width(), self.get_height()],
        }
    }

    pub fn get_width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn get_height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn get_area(&self) -> f32 {
        self.get_width().max(0.0) * self.get_height().max(0.0)
    }

    /// Both sides must exceed `threshold`.
    pub fn is_nonempty(&self, threshold: f32) -> bool {
        self.get_width() > threshold && self.get_height() > threshold
    }

    /// Clamps the box to the `(height, width)` image.
    pub fn clip(&self, image_size: (usize, usize)) -> Self {
        let (h, w) = (image_size.0 as f32, image_size.1 as f32);
        Self {
            x0: self.x0.clamp(0.0, w),
            y0: self.y0.clamp(0.0, h),
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
        }
    }

    /// Smallest box covering the given points, reordering the corners when
    /// a transform flips the axes.
    pub fn enclosing(points: &[(f32, f32)]) -> Self {
        if points.is_empty() {
            return Self::ZERO;
        }
        let mut r = Self::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, y) in points {
            r.x0 = r.x0.min(*x);
            r.y0 = r.y0.min(*y);
            r.x1 = r.x1.max(*x);
            r.y1 = r.y1.max(*y);
        }
        r
    }

    pub fn corners(&self) -> [(f32, f32); 4] {
        [
            (self.x0, self.y0),
            (self.x1, self.y0),
            (self.x0, self.y1),
            (self.x1, self.y1),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_xywh() {
        let b = BBox::from_mode(&[10.0, 20.0, 5.0, 4.0], BoxMode::XywhAbs).unwrap();
        assert_eq!(b, BBox::new(10.0, 20.0, 15.0, 24.0));
        assert_eq!(b.to_mode(BoxMode::XywhAbs), [10.0, 20.0, 5.0, 4.0]);
        assert_eq!(b.get_area(), 20.0);
    }

    #[test]
    fn test_wrong_length() {
        assert!(BBox::from_mode(&[1.0, 2.0, 3.0], BoxMode::XyxyAbs).is_err());
    }

    #[test]
    fn test_nonempty() {
        assert!(!BBox::ZERO.is_nonempty(1e-5));
        assert!(!BBox::new(0.0, 0.0, 0.0, 10.0).is_nonempty(1e-5));
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0).is_nonempty(1e-5));
        assert!(!BBox::new(0.0, 0.0, 1.0, 1.0).is_nonempty(1.0));
    }

    #[test]
    fn test_clip() {
        let b = BBox::new(-5.0, -1.0, 50.0, 8.0).clip((10, 20));
        assert_eq!(b, BBox::new(0.0, 0.0, 20.0, 8.0));
    }

    #[test]
    fn test_enclosing() {
        let b = BBox::enclosing(&[(5.0, 1.0), (2.0, 7.0)]);
        assert_eq!(b, BBox::new(2.0, 1.0, 5.0, 7.0));
        assert_eq!(BBox::enclosing(&[]), BBox::ZERO);
    }
}
