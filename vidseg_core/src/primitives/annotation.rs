use crate::consts::DUMMY_INSTANCE_ID;
use crate::primitives::{BBox, BitMask, BoxMode};
use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Uncompressed(Vec<u32>),
    Compressed(String),
}

/// COCO run-length encoded mask, `size` is `[height, width]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rle {
    pub size: [usize; 2],
    pub counts: RleCounts,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    Polygons(Vec<Vec<f32>>),
    Rle(Rle),
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        match self {
            Segmentation::Polygons(p) => p.iter().all(|r| r.is_empty()),
            Segmentation::Rle(_) => false,
        }
    }

    pub fn to_mask(&self, height: usize, width: usize) -> Result<BitMask> {
        match self {
            Segmentation::Polygons(p) => {
                let rings = p.iter().filter(|r| !r.is_empty()).cloned().collect::<Vec<_>>();
                Ok(BitMask::from_polygons(&rings, height, width)?)
            }
            Segmentation::Rle(rle) => {
                if rle.size != [height, width] {
                    bail!(
                        "RLE of size {:?} does not match the frame of size {}x{}",
                        rle.size,
                        height,
                        width
                    );
                }
                Ok(match &rle.counts {
                    RleCounts::Uncompressed(c) => BitMask::from_rle_counts(c, height, width)?,
                    RleCounts::Compressed(s) => BitMask::from_rle_string(s, height, width)?,
                })
            }
        }
    }
}

/// One observation of an object in one frame, as stored in the dataset catalog.
///
#[derive(Debug, Clone, PartialEq, derive_builder::Builder, serde::Serialize, serde::Deserialize)]
pub struct Annotation {
    /// Persistent instance id, stable across the frames of a video.
    pub id: i64,
    pub category_id: i64,
    #[builder(default)]
    pub bbox: [f32; 4],
    #[builder(default)]
    pub bbox_mode: BoxMode,
    #[builder(default)]
    pub segmentation: Option<Segmentation>,
    #[builder(default)]
    pub iscrowd: bool,
}

impl Annotation {
    pub fn get_box(&self) -> Result<BBox> {
        BBox::from_mode(&self.bbox, self.bbox_mode)
    }
}

/// Annotation after geometric augmentation, ready to be placed into a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: i64,
    pub category_id: i64,
    pub bbox: BBox,
    pub mask: Option<BitMask>,
}

impl Instance {
    /// Placeholder for a slot whose instance does not appear in the frame.
    pub fn dummy(num_classes: i64, image_size: (usize, usize), with_mask: bool) -> Self {
        Self {
            id: DUMMY_INSTANCE_ID,
            category_id: num_classes,
            bbox: BBox::ZERO,
            mask: with_mask.then(|| BitMask::empty(image_size.0, image_size.1)),
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.id == DUMMY_INSTANCE_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let a = AnnotationBuilder::default()
            .id(5)
            .category_id(2)
            .build()
            .unwrap();
        assert!(!a.iscrowd);
        assert_eq!(a.bbox_mode, BoxMode::XyxyAbs);
        assert!(a.segmentation.is_none());
    }

    #[test]
    fn test_segmentation_json() {
        let p: Segmentation = serde_json::from_str("[[0, 0, 2, 0, 2, 2]]").unwrap();
        assert!(matches!(p, Segmentation::Polygons(_)));
        let r: Segmentation =
            serde_json::from_str(r#"{"size": [2, 2], "counts": [2, 2]}"#).unwrap();
        assert_eq!(r.to_mask(2, 2).unwrap().count_nonzero(), 2);
        let s: Segmentation = serde_json::from_str(r#"{"size": [2, 2], "counts": "22"}"#).unwrap();
        assert_eq!(s.to_mask(2, 2).unwrap().count_nonzero(), 2);
        assert!(s.to_mask(3, 2).is_err());
    }

    #[test]
    fn test_dummy() {
        let d = Instance::dummy(40, (4, 5), true);
        assert!(d.is_dummy());
        assert_eq!(d.category_id, 40);
        assert_eq!(d.bbox, BBox::ZERO);
        assert!(!d.mask.unwrap().is_nonempty());
        assert!(Instance::dummy(40, (4, 5), false).mask.is_none());
    }
}
