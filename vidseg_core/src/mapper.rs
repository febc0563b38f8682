use crate::aligner::{align_instances, SlotMap, SlotOrder};
use crate::clip::{ClipSample, FrameInstances};
use crate::consts::{DEFAULT_NUM_CLASSES, PSEUDO_VIDEO_LENGTH_MAX, PSEUDO_VIDEO_LENGTH_MIN};
use crate::dataset::{ImageRecord, VideoRecord};
use crate::filter::{filter_empty_instances, FilterConfiguration};
use crate::image_io::{check_image_size, ImageReader};
use crate::primitives::{Annotation, ImageFormat};
use crate::remap::CategoryRemap;
use crate::sampler::{FrameSampler, SamplerConfiguration};
use crate::transforms::{
    build_augmentation, build_pseudo_augmentation, transform_instance_annotation,
    AugmentationConfiguration, AugmentationList, TransformList,
};
use anyhow::Result;
use log::{debug, info};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MapperError {
    #[error("Video {video_id} has no {what} for frame {frame}, only {available} available.")]
    FrameOutOfRange {
        video_id: i64,
        what: &'static str,
        frame: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfiguration {
    pub is_train: bool,
    pub image_format: ImageFormat,
    pub use_instance_mask: bool,
    /// Also the category of dummy slots.
    pub num_classes: i64,
    pub slot_order: SlotOrder,
    pub sampler: SamplerConfiguration,
    pub filter: FilterConfiguration,
}

impl Default for MapperConfiguration {
    fn default() -> Self {
        Self {
            is_train: true,
            image_format: ImageFormat::Rgb,
            use_instance_mask: true,
            num_classes: DEFAULT_NUM_CLASSES,
            slot_order: SlotOrder::Ascending,
            sampler: SamplerConfiguration::default(),
            filter: FilterConfiguration::default(),
        }
    }
}

fn mode_name(is_train: bool) -> &'static str {
    if is_train {
        "training"
    } else {
        "inference"
    }
}

/// Builds the ground truth of one frame from its raw annotations.
fn frame_instances(
    conf: &MapperConfiguration,
    remap: Option<&CategoryRemap>,
    annotations: Vec<(i64, &Annotation)>,
    transforms: &TransformList,
    slots: &SlotMap,
) -> Result<FrameInstances> {
    let image_size = transforms.output_size();
    let instances = annotations
        .into_iter()
        .map(|(id, anno)| {
            let mut instance =
                transform_instance_annotation(anno, transforms, conf.use_instance_mask)?;
            instance.id = id;
            Ok(instance)
        })
        .collect::<Result<Vec<_>>>()?;
    let aligned = align_instances(
        instances,
        slots,
        conf.num_classes,
        image_size,
        conf.use_instance_mask,
    )?;
    let mut frame = FrameInstances::from_instances(aligned, image_size);
    if let Some(remap) = remap {
        frame.remap_classes(remap);
    }
    filter_empty_instances(frame, &conf.filter)
}

/// Maps a video record into a clip of sampled, augmented frames whose
/// instances share one slot layout.
///
pub struct VideoClipMapper {
    conf: MapperConfiguration,
    sampler: FrameSampler,
    augmentations: AugmentationList,
    clip_consistent: bool,
    reader: Arc<dyn ImageReader>,
    remap: Option<CategoryRemap>,
}

impl VideoClipMapper {
    pub fn new(
        conf: MapperConfiguration,
        augmentations: AugmentationList,
        reader: Arc<dyn ImageReader>,
        remap: Option<CategoryRemap>,
    ) -> Result<Self> {
        let sampler = FrameSampler::new(conf.sampler.clone())?;
        info!(
            "[VideoClipMapper] Augmentations used in {}: {:?}",
            mode_name(conf.is_train),
            augmentations
        );
        Ok(Self {
            conf,
            sampler,
            augmentations,
            clip_consistent: false,
            reader,
            remap,
        })
    }

    pub fn from_configuration(
        conf: MapperConfiguration,
        augmentation: &AugmentationConfiguration,
        reader: Arc<dyn ImageReader>,
        remap: Option<CategoryRemap>,
    ) -> Result<Self> {
        let augmentations = build_augmentation(augmentation, conf.is_train)?;
        Ok(Self::new(conf, augmentations, reader, remap)?
            .with_clip_consistent(augmentation.clip_consistent))
    }

    /// When set, frames of one clip with equal size share the transforms of
    /// the first frame.
    pub fn with_clip_consistent(mut self, clip_consistent: bool) -> Self {
        self.clip_consistent = clip_consistent;
        self
    }

    pub fn get_configuration(&self) -> &MapperConfiguration {
        &self.conf
    }

    fn frame_annotations<'a>(
        record: &'a VideoRecord,
        frame: usize,
    ) -> Result<&'a [Annotation]> {
        record
            .annotations
            .get(frame)
            .map(|a| a.as_slice())
            .ok_or_else(|| {
                MapperError::FrameOutOfRange {
                    video_id: record.video_id,
                    what: "annotations",
                    frame,
                    available: record.annotations.len(),
                }
                .into()
            })
    }

    pub fn map(&self, record: &VideoRecord, rng: &mut dyn RngCore) -> Result<ClipSample> {
        let is_train = self.conf.is_train;
        let frame_idx = self.sampler.clip_indices(record.length, is_train, rng)?;

        let slots = if is_train {
            let frames = frame_idx
                .iter()
                .map(|i| Self::frame_annotations(record, *i))
                .collect::<Result<Vec<_>>>()?;
            Some(SlotMap::from_frames(frames, self.conf.slot_order)?)
        } else {
            None
        };

        let mut clip = ClipSample {
            video_id: record.video_id,
            height: record.height,
            width: record.width,
            video_len: record.length,
            frame_idx: frame_idx.clone(),
            file_names: Vec::with_capacity(frame_idx.len()),
            image: Vec::with_capacity(frame_idx.len()),
            instances: Vec::with_capacity(frame_idx.len()),
        };

        let mut shared: Option<TransformList> = None;
        for &frame in &frame_idx {
            let path = record.file_names.get(frame).ok_or(MapperError::FrameOutOfRange {
                video_id: record.video_id,
                what: "file",
                frame,
                available: record.file_names.len(),
            })?;
            let image = self.reader.read(path, self.conf.image_format)?;
            check_image_size(path, (record.height, record.width), &image)?;

            let reusable = shared
                .as_ref()
                .filter(|t| self.clip_consistent && t.input_size() == image.shape())
                .cloned();
            let transforms = match reusable {
                Some(t) => t,
                None => {
                    let t = self.augmentations.draw(image.shape(), rng)?;
                    if self.clip_consistent && shared.is_none() {
                        shared = Some(t.clone());
                    }
                    t
                }
            };
            clip.image.push(transforms.apply_image(&image));
            clip.file_names.push(path.clone());

            let Some(slots) = &slots else {
                continue;
            };
            let annotations = Self::frame_annotations(record, frame)?
                .iter()
                .filter(|a| !a.iscrowd)
                .map(|a| (a.id, a))
                .collect();
            clip.instances.push(frame_instances(
                &self.conf,
                self.remap.as_ref(),
                annotations,
                &transforms,
                slots,
            )?);
        }
        debug!(
            "Video {} mapped to frames {:?} with {} slots",
            record.video_id,
            clip.frame_idx,
            slots.as_ref().map_or(0, |s| s.len())
        );
        Ok(clip)
    }
}

/// Turns a still image into a pseudo clip: every virtual frame is an
/// independently augmented copy and instance `i` keeps slot `i`.
///
pub struct ImageClipMapper {
    conf: MapperConfiguration,
    sampler: FrameSampler,
    augmentations: AugmentationList,
    reader: Arc<dyn ImageReader>,
    remap: Option<CategoryRemap>,
}

impl ImageClipMapper {
    pub fn new(
        conf: MapperConfiguration,
        augmentations: AugmentationList,
        reader: Arc<dyn ImageReader>,
        remap: Option<CategoryRemap>,
    ) -> Result<Self> {
        let sampler = FrameSampler::new(conf.sampler.clone())?;
        info!(
            "[ImageClipMapper] Augmentations used in {}: {:?}",
            mode_name(conf.is_train),
            augmentations
        );
        Ok(Self {
            conf,
            sampler,
            augmentations,
            reader,
            remap,
        })
    }

    pub fn from_configuration(
        conf: MapperConfiguration,
        augmentation: &AugmentationConfiguration,
        reader: Arc<dyn ImageReader>,
        remap: Option<CategoryRemap>,
    ) -> Result<Self> {
        let augmentations = build_pseudo_augmentation(augmentation, conf.is_train)?;
        Self::new(conf, augmentations, reader, remap)
    }

    pub fn get_configuration(&self) -> &MapperConfiguration {
        &self.conf
    }

    pub fn map(&self, record: &ImageRecord, rng: &mut dyn RngCore) -> Result<ClipSample> {
        let is_train = self.conf.is_train;
        let frame_num = self.conf.sampler.sampling_frame_num;
        let image = self.reader.read(&record.file_name, self.conf.image_format)?;
        check_image_size(&record.file_name, (record.height, record.width), &image)?;

        let (video_len, frame_idx) = if is_train {
            let video_len = rng.random_range(PSEUDO_VIDEO_LENGTH_MIN..PSEUDO_VIDEO_LENGTH_MAX);
            (video_len, self.sampler.select_frames(video_len, rng)?)
        } else {
            (frame_num, FrameSampler::all_frames(frame_num))
        };

        let annotations = record
            .annotations
            .iter()
            .filter(|a| !a.iscrowd)
            .collect::<Vec<_>>();
        let slots = SlotMap::identity(annotations.len());

        let mut clip = ClipSample {
            video_id: record.image_id,
            height: record.height,
            width: record.width,
            video_len,
            frame_idx,
            file_names: vec![record.file_name.clone(); frame_num],
            image: Vec::with_capacity(frame_num),
            instances: Vec::with_capacity(frame_num),
        };
        for _ in 0..frame_num {
            let (frame, transforms) = self.augmentations.apply(&image, rng)?;
            clip.image.push(frame);
            if !is_train {
                continue;
            }
            let positional = annotations
                .iter()
                .enumerate()
                .map(|(pos, a)| (pos as i64, *a))
                .collect();
            clip.instances.push(frame_instances(
                &self.conf,
                self.remap.as_ref(),
                positional,
                &transforms,
                &slots,
            )?);
        }
        debug!(
            "Image {} mapped to a pseudo clip of {} frames with {} slots",
            record.image_id,
            frame_num,
            slots.len()
        );
        Ok(clip)
    }
}
