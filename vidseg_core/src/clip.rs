use crate::consts::DUMMY_INSTANCE_ID;
use crate::primitives::{BBox, BitMask, ImageBuffer, Instance};
use crate::remap::CategoryRemap;
use serde::Serialize;

/// Ground truth of one frame, one entry per slot.
///
/// `gt_masks` either has one mask per slot or is empty, which stands for a
/// `(0, height, width)` mask stack.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInstances {
    image_size: (usize, usize),
    pub gt_boxes: Vec<BBox>,
    pub gt_classes: Vec<i64>,
    pub gt_ids: Vec<i64>,
    pub gt_masks: Vec<BitMask>,
}

impl FrameInstances {
    pub fn new(image_size: (usize, usize)) -> Self {
        Self {
            image_size,
            gt_boxes: Vec::new(),
            gt_classes: Vec::new(),
            gt_ids: Vec::new(),
            gt_masks: Vec::new(),
        }
    }

    /// Masks are kept only when every instance carries one.
    pub fn from_instances(instances: Vec<Instance>, image_size: (usize, usize)) -> Self {
        let with_masks = !instances.is_empty() && instances.iter().all(|i| i.mask.is_some());
        let mut res = Self::new(image_size);
        for instance in instances {
            res.gt_boxes.push(instance.bbox);
            res.gt_classes.push(instance.category_id);
            res.gt_ids.push(instance.id);
            if with_masks {
                if let Some(mask) = instance.mask {
                    res.gt_masks.push(mask);
                }
            }
        }
        res
    }

    /// `(height, width)`
    pub fn image_size(&self) -> (usize, usize) {
        self.image_size
    }

    pub fn len(&self) -> usize {
        self.gt_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gt_ids.is_empty()
    }

    pub fn has_masks(&self) -> bool {
        !self.gt_masks.is_empty()
    }

    /// Slots holding an instance which is present and valid in this frame.
    pub fn live_count(&self) -> usize {
        self.gt_ids
            .iter()
            .filter(|id| **id != DUMMY_INSTANCE_ID)
            .count()
    }

    /// Translates the classes of real slots into the target label space.
    pub fn remap_classes(&mut self, remap: &CategoryRemap) {
        for (class, id) in self.gt_classes.iter_mut().zip(self.gt_ids.iter()) {
            if *id != DUMMY_INSTANCE_ID {
                *class = remap.map(*class);
            }
        }
    }
}

/// One mapped clip, ready to be batched by the training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSample {
    pub video_id: i64,
    pub height: usize,
    pub width: usize,
    pub video_len: usize,
    pub frame_idx: Vec<usize>,
    pub file_names: Vec<String>,
    pub image: Vec<ImageBuffer>,
    /// Empty in inference mode.
    pub instances: Vec<FrameInstances>,
}

impl ClipSample {
    /// Slot count shared by all frames, `None` when no instances were produced.
    pub fn slot_count(&self) -> Option<usize> {
        self.instances.first().map(|i| i.len())
    }

    pub fn summary(&self) -> ClipSummary {
        ClipSummary {
            video_id: self.video_id,
            video_len: self.video_len,
            frame_idx: self.frame_idx.clone(),
            image_sizes: self.image.iter().map(|i| i.shape()).collect(),
            slot_count: self.slot_count().unwrap_or(0),
            live_instances: self.instances.iter().map(|i| i.live_count()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipSummary {
    pub video_id: i64,
    pub video_len: usize,
    pub frame_idx: Vec<usize>,
    pub image_sizes: Vec<(usize, usize)>,
    pub slot_count: usize,
    pub live_instances: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_instances() {
        let real = Instance {
            id: 3,
            category_id: 1,
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            mask: Some(BitMask::empty(2, 2)),
        };
        let fi = FrameInstances::from_instances(
            vec![real.clone(), Instance::dummy(40, (2, 2), true)],
            (2, 2),
        );
        assert_eq!(fi.len(), 2);
        assert!(fi.has_masks());
        assert_eq!(fi.live_count(), 1);
        assert_eq!(fi.gt_classes, vec![1, 40]);

        let fi = FrameInstances::from_instances(
            vec![real, Instance::dummy(40, (2, 2), false)],
            (2, 2),
        );
        assert!(!fi.has_masks());
        assert_eq!(fi.image_size(), (2, 2));
    }
}
