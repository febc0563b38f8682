use crate::clip::FrameInstances;
use crate::consts::{DEFAULT_BOX_THRESHOLD, DUMMY_INSTANCE_ID};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("Either box or mask filtering must be enabled.")]
    NothingToFilterBy,
    #[error("Frame has {slots} slots but {masks} masks.")]
    MaskCountMismatch { slots: usize, masks: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfiguration {
    pub by_box: bool,
    pub by_mask: bool,
    pub box_threshold: f32,
}

impl Default for FilterConfiguration {
    fn default() -> Self {
        Self {
            by_box: true,
            by_mask: true,
            box_threshold: DEFAULT_BOX_THRESHOLD,
        }
    }
}

/// Per-slot verdict: `true` when the slot survives every enabled test.
pub fn nonempty_mask(instances: &FrameInstances, conf: &FilterConfiguration) -> Result<Vec<bool>> {
    if !conf.by_box && !conf.by_mask {
        return Err(FilterError::NothingToFilterBy.into());
    }
    let mut keep = vec![true; instances.len()];
    if conf.by_box {
        for (k, b) in keep.iter_mut().zip(instances.gt_boxes.iter()) {
            *k &= b.is_nonempty(conf.box_threshold);
        }
    }
    if conf.by_mask && instances.has_masks() {
        if instances.gt_masks.len() != instances.len() {
            return Err(FilterError::MaskCountMismatch {
                slots: instances.len(),
                masks: instances.gt_masks.len(),
            }
            .into());
        }
        for (k, m) in keep.iter_mut().zip(instances.gt_masks.iter()) {
            *k &= m.is_nonempty();
        }
    }
    Ok(keep)
}

/// Invalidates the id of every empty slot. Slots are never removed.
pub fn filter_empty_instances(
    mut instances: FrameInstances,
    conf: &FilterConfiguration,
) -> Result<FrameInstances> {
    let keep = nonempty_mask(&instances, conf)?;
    for (id, k) in instances.gt_ids.iter_mut().zip(keep) {
        if !k {
            *id = DUMMY_INSTANCE_ID;
        }
    }
    Ok(instances)
}
