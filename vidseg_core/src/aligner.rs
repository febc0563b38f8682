use crate::consts::DUMMY_INSTANCE_ID;
use crate::primitives::{Annotation, Instance};
use anyhow::Result;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AlignError {
    #[error("Instance id `{0}` is not part of the clip slot mapping.")]
    UnknownInstance(i64),
    #[error("Instance id `{0}` is reserved for absent instances and cannot be assigned a slot.")]
    ReservedId(i64),
}

/// Order in which the observed instance ids receive their slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOrder {
    /// Ids sorted ascending; reproducible across runs.
    #[default]
    Ascending,
    /// Order of first appearance across the selected frames.
    FirstSeen,
    /// Hash set iteration order, which changes from process to process.
    Unordered,
}

/// Dense mapping from persistent instance id to slot index for one clip.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotMap {
    slots: HashMap<i64, usize>,
    ids: Vec<i64>,
}

impl SlotMap {
    /// Builds the mapping from the union of non-crowd ids of the given frames.
    pub fn from_frames<'a, I>(frames: I, order: SlotOrder) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [Annotation]>,
    {
        let mut seen = Vec::new();
        for anno in frames.into_iter().flatten().filter(|a| !a.iscrowd) {
            if anno.id == DUMMY_INSTANCE_ID {
                return Err(AlignError::ReservedId(anno.id).into());
            }
            seen.push(anno.id);
        }
        let ids = match order {
            SlotOrder::Ascending => {
                seen.sort_unstable();
                seen.dedup();
                seen
            }
            SlotOrder::FirstSeen => {
                let mut known = HashSet::with_capacity(seen.len());
                seen.retain(|id| known.insert(*id));
                seen
            }
            SlotOrder::Unordered => seen
                .into_iter()
                .collect::<HashSet<_>>()
                .into_iter()
                .collect(),
        };
        Ok(Self::from_ids(ids))
    }

    /// Slot `i` holds id `i`, for clips synthesized from a single image.
    pub fn identity(count: usize) -> Self {
        Self::from_ids((0..count as i64).collect())
    }

    fn from_ids(ids: Vec<i64>) -> Self {
        let slots = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self { slots, ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn slot_of(&self, id: i64) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Ids in slot order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}

/// Places each instance into its slot; slots without an instance get a dummy.
pub fn align_instances(
    instances: Vec<Instance>,
    slots: &SlotMap,
    num_classes: i64,
    image_size: (usize, usize),
    with_mask: bool,
) -> Result<Vec<Instance>> {
    let mut aligned = (0..slots.len())
        .map(|_| Instance::dummy(num_classes, image_size, with_mask))
        .collect::<Vec<_>>();
    for instance in instances {
        let slot = slots
            .slot_of(instance.id)
            .ok_or(AlignError::UnknownInstance(instance.id))?;
        aligned[slot] = instance;
    }
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{AnnotationBuilder, BBox};
    use crate::test::gen_annotation;

    fn instance(id: i64) -> Instance {
        Instance {
            id,
            category_id: 1,
            bbox: BBox::new(0.0, 0.0, 2.0, 2.0),
            mask: None,
        }
    }

    #[test]
    fn test_union_over_frames() {
        let a = vec![gen_annotation(5, 1), gen_annotation(7, 1)];
        let b = vec![gen_annotation(7, 1), gen_annotation(9, 2)];
        let map = SlotMap::from_frames([a.as_slice(), b.as_slice()], SlotOrder::Ascending).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.ids(), &[5, 7, 9]);
        assert_eq!(map.slot_of(9), Some(2));
        assert_eq!(map.slot_of(1), None);
    }

    #[test]
    fn test_first_seen_order() {
        let a = vec![gen_annotation(9, 1), gen_annotation(3, 1)];
        let b = vec![gen_annotation(3, 1), gen_annotation(1, 2)];
        let map = SlotMap::from_frames([a.as_slice(), b.as_slice()], SlotOrder::FirstSeen).unwrap();
        assert_eq!(map.ids(), &[9, 3, 1]);
    }

    #[test]
    fn test_unordered_is_bijective() {
        let a = (0..20).map(|i| gen_annotation(i * 3, 1)).collect::<Vec<_>>();
        let map = SlotMap::from_frames([a.as_slice(), a.as_slice()], SlotOrder::Unordered).unwrap();
        assert_eq!(map.len(), 20);
        let mut slots = map.ids().iter().map(|id| map.slot_of(*id).unwrap()).collect::<Vec<_>>();
        slots.sort_unstable();
        assert_eq!(slots, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_crowd_excluded() {
        let crowd = AnnotationBuilder::default()
            .id(4)
            .category_id(1)
            .iscrowd(true)
            .build()
            .unwrap();
        let a = vec![gen_annotation(2, 1), crowd];
        let map = SlotMap::from_frames([a.as_slice()], SlotOrder::Ascending).unwrap();
        assert_eq!(map.ids(), &[2]);
    }

    #[test]
    fn test_reserved_id() {
        let a = vec![gen_annotation(-1, 1)];
        let err = SlotMap::from_frames([a.as_slice()], SlotOrder::Ascending).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AlignError>(),
            Some(&AlignError::ReservedId(-1))
        );
    }

    #[test]
    fn test_align_with_dummies() {
        let map = SlotMap::identity(0);
        assert!(map.is_empty());
        let map = SlotMap::from_ids(vec![5, 7, 9]);
        let aligned = align_instances(vec![instance(9), instance(5)], &map, 40, (4, 4), true).unwrap();
        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned[0].id, 5);
        assert_eq!(aligned[2].id, 9);
        assert!(aligned[1].is_dummy());
        assert_eq!(aligned[1].category_id, 40);
        assert_eq!(aligned[1].bbox, BBox::ZERO);
        assert_eq!(aligned[1].mask.as_ref().unwrap().get_height(), 4);
    }

    #[test]
    fn test_align_unknown() {
        let map = SlotMap::identity(2);
        let err = align_instances(vec![instance(3)], &map, 40, (4, 4), false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AlignError>(),
            Some(&AlignError::UnknownInstance(3))
        );
    }
}
