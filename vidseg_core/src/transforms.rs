use crate::primitives::{Annotation, BBox, BitMask, ImageBuffer, Instance, Segmentation};
use anyhow::Result;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error("At least one short edge length is required.")]
    NoShortEdgeLengths,
    #[error("Range sampling expects exactly two short edge lengths, got {0}.")]
    InvalidShortEdgeRange(usize),
    #[error("Short edge range [{0}, {1}] is descending.")]
    DescendingShortEdgeRange(usize, usize),
    #[error("Crop size {0:?} is invalid for crop type {1:?}.")]
    InvalidCropSize([f32; 2], CropType),
    #[error("Flip probability must be within [0, 1], got {0}.")]
    InvalidProbability(f64),
    #[error("Cannot augment an empty image of size {0}x{1}.")]
    EmptyImage(usize, usize),
}

/// A deterministic geometric transform, replayable on images and annotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    NoOp,
    HFlip {
        width: usize,
    },
    VFlip {
        height: usize,
    },
    Resize {
        height: usize,
        width: usize,
        new_height: usize,
        new_width: usize,
    },
    Crop {
        x0: usize,
        y0: usize,
        width: usize,
        height: usize,
    },
}

impl Transform {
    /// `(height, width)` of the result for an input of `size`.
    pub fn output_size(&self, size: (usize, usize)) -> (usize, usize) {
        match self {
            Transform::NoOp | Transform::HFlip { .. } | Transform::VFlip { .. } => size,
            Transform::Resize {
                new_height,
                new_width,
                ..
            } => (*new_height, *new_width),
            Transform::Crop { width, height, .. } => (*height, *width),
        }
    }

    pub fn apply_image(&self, image: &ImageBuffer) -> ImageBuffer {
        let (h, w) = image.shape();
        match *self {
            Transform::NoOp => image.clone(),
            Transform::HFlip { .. } => image.map_pixels(h, w, |x, y| Some((w - 1 - x, y))),
            Transform::VFlip { .. } => image.map_pixels(h, w, |x, y| Some((x, h - 1 - y))),
            Transform::Resize {
                new_height,
                new_width,
                ..
            } => image.map_pixels(new_height, new_width, |x, y| {
                Some((
                    (x * w / new_width).min(w - 1),
                    (y * h / new_height).min(h - 1),
                ))
            }),
            Transform::Crop {
                x0,
                y0,
                width,
                height,
            } => image.map_pixels(height, width, |x, y| {
                let (sx, sy) = (x0 + x, y0 + y);
                (sx < w && sy < h).then_some((sx, sy))
            }),
        }
    }

    pub fn apply_coords(&self, points: &mut [(f32, f32)]) {
        for (x, y) in points.iter_mut() {
            match *self {
                Transform::NoOp => {}
                Transform::HFlip { width } => *x = width as f32 - *x,
                Transform::VFlip { height } => *y = height as f32 - *y,
                Transform::Resize {
                    height,
                    width,
                    new_height,
                    new_width,
                } => {
                    *x *= new_width as f32 / width as f32;
                    *y *= new_height as f32 / height as f32;
                }
                Transform::Crop { x0, y0, .. } => {
                    *x -= x0 as f32;
                    *y -= y0 as f32;
                }
            }
        }
    }

    pub fn apply_mask(&self, mask: &BitMask) -> BitMask {
        match *self {
            Transform::NoOp => mask.clone(),
            Transform::HFlip { .. } => mask.flip_horizontal(),
            Transform::VFlip { .. } => mask.flip_vertical(),
            Transform::Resize {
                new_height,
                new_width,
                ..
            } => mask.resize(new_height, new_width),
            Transform::Crop {
                x0,
                y0,
                width,
                height,
            } => mask.crop(x0, y0, width, height),
        }
    }
}

/// Transforms drawn for one frame, in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformList {
    input_size: (usize, usize),
    transforms: Vec<Transform>,
}

impl TransformList {
    pub fn new(input_size: (usize, usize), transforms: Vec<Transform>) -> Self {
        Self {
            input_size,
            transforms,
        }
    }

    pub fn input_size(&self) -> (usize, usize) {
        self.input_size
    }

    pub fn output_size(&self) -> (usize, usize) {
        self.transforms
            .iter()
            .fold(self.input_size, |size, t| t.output_size(size))
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn apply_image(&self, image: &ImageBuffer) -> ImageBuffer {
        self.transforms
            .iter()
            .fold(image.clone(), |img, t| t.apply_image(&img))
    }

    pub fn apply_box(&self, bbox: &BBox) -> BBox {
        let mut corners = bbox.corners();
        for t in &self.transforms {
            t.apply_coords(&mut corners);
        }
        BBox::enclosing(&corners)
    }

    pub fn apply_polygons(&self, polygons: &[Vec<f32>]) -> Vec<Vec<f32>> {
        polygons
            .iter()
            .map(|ring| {
                let mut points = ring
                    .chunks_exact(2)
                    .map(|c| (c[0], c[1]))
                    .collect::<Vec<_>>();
                for t in &self.transforms {
                    t.apply_coords(&mut points);
                }
                points.into_iter().flat_map(|(x, y)| [x, y]).collect()
            })
            .collect()
    }

    pub fn apply_mask(&self, mask: &BitMask) -> BitMask {
        self.transforms
            .iter()
            .fold(mask.clone(), |m, t| t.apply_mask(&m))
    }
}

/// Replays the frame's transforms on one raw annotation.
///
/// The box is converted to `XYXY_ABS` and clipped to the output frame. With
/// `with_mask`, the segmentation is transformed and rasterized; a missing
/// segmentation yields an empty mask.
pub fn transform_instance_annotation(
    annotation: &Annotation,
    transforms: &TransformList,
    with_mask: bool,
) -> Result<Instance> {
    let output_size = transforms.output_size();
    let bbox = transforms
        .apply_box(&annotation.get_box()?)
        .clip(output_size);
    let mask = if with_mask {
        let (h, w) = output_size;
        Some(match &annotation.segmentation {
            None => BitMask::empty(h, w),
            Some(Segmentation::Polygons(p)) => {
                let rings = p.iter().filter(|r| !r.is_empty()).cloned().collect::<Vec<_>>();
                BitMask::from_polygons(&transforms.apply_polygons(&rings), h, w)?
            }
            Some(rle) => {
                let (ih, iw) = transforms.input_size();
                transforms.apply_mask(&rle.to_mask(ih, iw)?)
            }
        })
    } else {
        None
    };
    Ok(Instance {
        id: annotation.id,
        category_id: annotation.category_id,
        bbox,
        mask,
    })
}

pub trait Augmentation: Debug + Send + Sync {
    /// Draws a transform for an image of `image_size` (`(height, width)`).
    fn get_transform(&self, image_size: (usize, usize), rng: &mut dyn RngCore)
        -> Result<Transform>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStyle {
    #[default]
    Choice,
    Range,
}

/// Resizes the shorter side to a sampled length, capping the longer one.
#[derive(Debug, Clone)]
pub struct ResizeShortestEdge {
    short_edge_length: Vec<usize>,
    max_size: usize,
    sample_style: SampleStyle,
}

impl ResizeShortestEdge {
    pub fn new(short_edge_length: Vec<usize>, max_size: usize, sample_style: SampleStyle) -> Result<Self> {
        if short_edge_length.is_empty() {
            return Err(TransformError::NoShortEdgeLengths.into());
        }
        if sample_style == SampleStyle::Range && short_edge_length.len() != 2 {
            return Err(TransformError::InvalidShortEdgeRange(short_edge_length.len()).into());
        }
        if sample_style == SampleStyle::Range && short_edge_length[0] > short_edge_length[1] {
            return Err(TransformError::DescendingShortEdgeRange(
                short_edge_length[0],
                short_edge_length[1],
            )
            .into());
        }
        Ok(Self {
            short_edge_length,
            max_size,
            sample_style,
        })
    }

    pub fn output_shape(height: usize, width: usize, short_edge: usize, max_size: usize) -> (usize, usize) {
        let (h, w) = (height as f64, width as f64);
        let size = short_edge as f64;
        let scale = size / h.min(w);
        let (mut new_h, mut new_w) = if h < w {
            (size, scale * w)
        } else {
            (scale * h, size)
        };
        let longest = new_h.max(new_w);
        if longest > max_size as f64 {
            let scale = max_size as f64 / longest;
            new_h *= scale;
            new_w *= scale;
        }
        ((new_h + 0.5) as usize, (new_w + 0.5) as usize)
    }
}

impl Augmentation for ResizeShortestEdge {
    fn get_transform(&self, image_size: (usize, usize), rng: &mut dyn RngCore) -> Result<Transform> {
        let (height, width) = image_size;
        if height == 0 || width == 0 {
            return Err(TransformError::EmptyImage(height, width).into());
        }
        let short_edge = match self.sample_style {
            SampleStyle::Choice => {
                self.short_edge_length[rng.random_range(0..self.short_edge_length.len())]
            }
            SampleStyle::Range => {
                rng.random_range(self.short_edge_length[0]..=self.short_edge_length[1])
            }
        };
        if short_edge == 0 {
            return Ok(Transform::NoOp);
        }
        let (new_height, new_width) = Self::output_shape(height, width, short_edge, self.max_size);
        Ok(Transform::Resize {
            height,
            width,
            new_height,
            new_width,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipDirection {
    #[default]
    Horizontal,
    Vertical,
    None,
}

#[derive(Debug, Clone)]
pub struct RandomFlip {
    prob: f64,
    direction: FlipDirection,
}

impl RandomFlip {
    pub fn new(prob: f64, direction: FlipDirection) -> Result<Self> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(TransformError::InvalidProbability(prob).into());
        }
        Ok(Self { prob, direction })
    }
}

impl Augmentation for RandomFlip {
    fn get_transform(&self, image_size: (usize, usize), rng: &mut dyn RngCore) -> Result<Transform> {
        if !rng.random_bool(self.prob) {
            return Ok(Transform::NoOp);
        }
        Ok(match self.direction {
            FlipDirection::Horizontal => Transform::HFlip {
                width: image_size.1,
            },
            FlipDirection::Vertical => Transform::VFlip {
                height: image_size.0,
            },
            FlipDirection::None => Transform::NoOp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropType {
    Relative,
    RelativeRange,
    Absolute,
    #[default]
    AbsoluteRange,
}

#[derive(Debug, Clone)]
pub struct RandomCrop {
    crop_type: CropType,
    size: [f32; 2],
}

impl RandomCrop {
    pub fn new(crop_type: CropType, size: [f32; 2]) -> Result<Self> {
        let valid = match crop_type {
            CropType::Relative | CropType::RelativeRange => {
                size.iter().all(|s| *s > 0.0 && *s <= 1.0)
            }
            CropType::Absolute => size.iter().all(|s| *s >= 1.0),
            CropType::AbsoluteRange => size[0] >= 1.0 && size[0] <= size[1],
        };
        if !valid {
            return Err(TransformError::InvalidCropSize(size, crop_type).into());
        }
        Ok(Self { crop_type, size })
    }

    /// `(height, width)` of the crop for an image of `image_size`.
    fn crop_size(&self, image_size: (usize, usize), rng: &mut dyn RngCore) -> (usize, usize) {
        let (h, w) = image_size;
        let [a, b] = self.size;
        match self.crop_type {
            CropType::Relative => (
                ((h as f32 * a + 0.5) as usize).max(1),
                ((w as f32 * b + 0.5) as usize).max(1),
            ),
            CropType::RelativeRange => {
                let ch = rng.random_range(a..=1.0);
                let cw = rng.random_range(b..=1.0);
                (
                    ((h as f32 * ch + 0.5) as usize).max(1),
                    ((w as f32 * cw + 0.5) as usize).max(1),
                )
            }
            CropType::Absolute => ((a as usize).min(h), (b as usize).min(w)),
            CropType::AbsoluteRange => {
                let (lo, hi) = (a as usize, b as usize);
                (
                    rng.random_range(lo.min(h)..=hi.min(h)),
                    rng.random_range(lo.min(w)..=hi.min(w)),
                )
            }
        }
    }
}

impl Augmentation for RandomCrop {
    fn get_transform(&self, image_size: (usize, usize), rng: &mut dyn RngCore) -> Result<Transform> {
        let (h, w) = image_size;
        if h == 0 || w == 0 {
            return Err(TransformError::EmptyImage(h, w).into());
        }
        let (height, width) = self.crop_size(image_size, rng);
        let y0 = rng.random_range(0..=h - height);
        let x0 = rng.random_range(0..=w - width);
        Ok(Transform::Crop {
            x0,
            y0,
            width,
            height,
        })
    }
}

/// Augmentations applied in sequence, each seeing the previous output size.
#[derive(Debug, Default)]
pub struct AugmentationList {
    augmentations: Vec<Box<dyn Augmentation>>,
}

impl AugmentationList {
    pub fn new(augmentations: Vec<Box<dyn Augmentation>>) -> Self {
        Self { augmentations }
    }

    pub fn len(&self) -> usize {
        self.augmentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.augmentations.is_empty()
    }

    pub fn draw(&self, image_size: (usize, usize), rng: &mut dyn RngCore) -> Result<TransformList> {
        let mut size = image_size;
        let mut transforms = Vec::with_capacity(self.augmentations.len());
        for aug in &self.augmentations {
            let t = aug.get_transform(size, rng)?;
            size = t.output_size(size);
            transforms.push(t);
        }
        Ok(TransformList::new(image_size, transforms))
    }

    /// Augments the image, returning the transforms for replay on annotations.
    pub fn apply(
        &self,
        image: &ImageBuffer,
        rng: &mut dyn RngCore,
    ) -> Result<(ImageBuffer, TransformList)> {
        let transforms = self.draw(image.shape(), rng)?;
        Ok((transforms.apply_image(image), transforms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropConfiguration {
    pub crop_type: CropType,
    pub size: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudoAugmentationConfiguration {
    pub min_size_train: Vec<usize>,
    pub max_size_train: usize,
    pub min_size_train_sampling: SampleStyle,
    pub crop: CropConfiguration,
}

impl Default for PseudoAugmentationConfiguration {
    fn default() -> Self {
        Self {
            min_size_train: vec![480, 512, 544, 576, 608, 640, 672, 704, 736, 768],
            max_size_train: 768,
            min_size_train_sampling: SampleStyle::Choice,
            crop: CropConfiguration {
                crop_type: CropType::AbsoluteRange,
                size: [384.0, 600.0],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfiguration {
    pub min_size_train: Vec<usize>,
    pub max_size_train: usize,
    pub min_size_train_sampling: SampleStyle,
    pub min_size_test: usize,
    pub max_size_test: usize,
    pub random_flip: FlipDirection,
    pub crop: Option<CropConfiguration>,
    /// Reuse the first frame's transforms for every same-sized frame of a clip.
    pub clip_consistent: bool,
    pub pseudo: PseudoAugmentationConfiguration,
}

impl Default for AugmentationConfiguration {
    fn default() -> Self {
        Self {
            min_size_train: vec![360, 480],
            max_size_train: 768,
            min_size_train_sampling: SampleStyle::Choice,
            min_size_test: 360,
            max_size_test: 640,
            random_flip: FlipDirection::Horizontal,
            crop: None,
            clip_consistent: true,
            pseudo: PseudoAugmentationConfiguration::default(),
        }
    }
}

fn flip(conf: &AugmentationConfiguration) -> Result<Option<Box<dyn Augmentation>>> {
    Ok(match conf.random_flip {
        FlipDirection::None => None,
        direction => Some(Box::new(RandomFlip::new(0.5, direction)?) as Box<dyn Augmentation>),
    })
}

/// Augmentations for frames of real videos.
pub fn build_augmentation(conf: &AugmentationConfiguration, is_train: bool) -> Result<AugmentationList> {
    let mut augs: Vec<Box<dyn Augmentation>> = Vec::new();
    if !is_train {
        augs.push(Box::new(ResizeShortestEdge::new(
            vec![conf.min_size_test],
            conf.max_size_test,
            SampleStyle::Choice,
        )?));
        return Ok(AugmentationList::new(augs));
    }
    if let Some(crop) = &conf.crop {
        augs.push(Box::new(RandomCrop::new(crop.crop_type, crop.size)?));
    }
    augs.push(Box::new(ResizeShortestEdge::new(
        conf.min_size_train.clone(),
        conf.max_size_train,
        conf.min_size_train_sampling,
    )?));
    if let Some(f) = flip(conf)? {
        augs.push(f);
    }
    Ok(AugmentationList::new(augs))
}

/// Augmentations turning one still image into differently perturbed frames.
pub fn build_pseudo_augmentation(
    conf: &AugmentationConfiguration,
    is_train: bool,
) -> Result<AugmentationList> {
    if !is_train {
        return build_augmentation(conf, false);
    }
    let pseudo = &conf.pseudo;
    let resize = || {
        ResizeShortestEdge::new(
            pseudo.min_size_train.clone(),
            pseudo.max_size_train,
            pseudo.min_size_train_sampling,
        )
    };
    let mut augs: Vec<Box<dyn Augmentation>> = vec![
        Box::new(resize()?),
        Box::new(RandomCrop::new(pseudo.crop.crop_type, pseudo.crop.size)?),
        Box::new(resize()?),
    ];
    if let Some(f) = flip(conf)? {
        augs.push(f);
    }
    Ok(AugmentationList::new(augs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{AnnotationBuilder, BoxMode, ImageFormat};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_resize_shape() {
        assert_eq!(ResizeShortestEdge::output_shape(720, 1280, 360, 1000), (360, 640));
        assert_eq!(ResizeShortestEdge::output_shape(100, 1000, 50, 200), (20, 200));
        assert_eq!(ResizeShortestEdge::output_shape(40, 20, 10, 100), (20, 10));
    }

    #[test]
    fn test_hflip_box_and_image() {
        let mut data = vec![0u8; 2 * 3];
        data[0] = 7;
        let img = ImageBuffer::new(2, 3, ImageFormat::L, data).unwrap();
        let t = TransformList::new((2, 3), vec![Transform::HFlip { width: 3 }]);
        assert_eq!(t.apply_image(&img).pixel(2, 0), &[7]);
        assert_eq!(
            t.apply_box(&BBox::new(0.0, 0.0, 1.0, 2.0)),
            BBox::new(2.0, 0.0, 3.0, 2.0)
        );
    }

    #[test]
    fn test_crop_then_resize_box() {
        let t = TransformList::new(
            (10, 10),
            vec![
                Transform::Crop {
                    x0: 2,
                    y0: 2,
                    width: 4,
                    height: 4,
                },
                Transform::Resize {
                    height: 4,
                    width: 4,
                    new_height: 8,
                    new_width: 8,
                },
            ],
        );
        assert_eq!(t.output_size(), (8, 8));
        assert_eq!(
            t.apply_box(&BBox::new(3.0, 3.0, 5.0, 5.0)),
            BBox::new(2.0, 2.0, 6.0, 6.0)
        );
    }

    #[test]
    fn test_transform_annotation_cropped_out() {
        let anno = AnnotationBuilder::default()
            .id(1)
            .category_id(0)
            .bbox([8.0, 8.0, 2.0, 2.0])
            .bbox_mode(BoxMode::XywhAbs)
            .segmentation(Some(Segmentation::Polygons(vec![vec![
                8.0, 8.0, 10.0, 8.0, 10.0, 10.0, 8.0, 10.0,
            ]])))
            .build()
            .unwrap();
        let t = TransformList::new(
            (10, 10),
            vec![Transform::Crop {
                x0: 0,
                y0: 0,
                width: 5,
                height: 5,
            }],
        );
        let inst = transform_instance_annotation(&anno, &t, true).unwrap();
        assert!(!inst.bbox.is_nonempty(1e-5));
        assert!(!inst.mask.unwrap().is_nonempty());

        let identity = TransformList::new((10, 10), vec![Transform::NoOp]);
        let inst = transform_instance_annotation(&anno, &identity, true).unwrap();
        assert_eq!(inst.bbox, BBox::new(8.0, 8.0, 10.0, 10.0));
        assert_eq!(inst.mask.unwrap().count_nonzero(), 4);
    }

    #[test]
    fn test_missing_segmentation_gives_empty_mask() {
        let anno = AnnotationBuilder::default()
            .id(1)
            .category_id(0)
            .bbox([0.0, 0.0, 2.0, 2.0])
            .build()
            .unwrap();
        let t = TransformList::new((4, 4), vec![]);
        let inst = transform_instance_annotation(&anno, &t, true).unwrap();
        assert_eq!(inst.mask.unwrap().get_height(), 4);
        assert!(transform_instance_annotation(&anno, &t, false)
            .unwrap()
            .mask
            .is_none());
    }

    #[test]
    fn test_random_crop_within_image() {
        let crop = RandomCrop::new(CropType::AbsoluteRange, [3.0, 6.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            match crop.get_transform((5, 20), &mut rng).unwrap() {
                Transform::Crop {
                    x0,
                    y0,
                    width,
                    height,
                } => {
                    assert!((3..=5).contains(&height));
                    assert!((3..=6).contains(&width));
                    assert!(y0 + height <= 5);
                    assert!(x0 + width <= 20);
                }
                t => panic!("unexpected transform {:?}", t),
            }
        }
        assert!(RandomCrop::new(CropType::Relative, [0.0, 0.5]).is_err());
    }

    #[test]
    fn test_build_augmentation() {
        let conf = AugmentationConfiguration::default();
        assert_eq!(build_augmentation(&conf, true).unwrap().len(), 2);
        assert_eq!(build_augmentation(&conf, false).unwrap().len(), 1);
        assert_eq!(build_pseudo_augmentation(&conf, true).unwrap().len(), 4);
        let augs = build_augmentation(&conf, false).unwrap();
        let img = ImageBuffer::blank(720, 1280, ImageFormat::Rgb);
        let mut rng = StdRng::seed_from_u64(0);
        let (out, t) = augs.apply(&img, &mut rng).unwrap();
        assert_eq!(out.shape(), (360, 640));
        assert_eq!(t.output_size(), (360, 640));
    }

    #[test]
    fn test_range_style_requires_two_lengths() {
        assert!(ResizeShortestEdge::new(vec![1, 2, 3], 10, SampleStyle::Range).is_err());
        assert!(ResizeShortestEdge::new(vec![], 10, SampleStyle::Choice).is_err());
        let err = ResizeShortestEdge::new(vec![800, 640], 1333, SampleStyle::Range).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransformError>(),
            Some(&TransformError::DescendingShortEdgeRange(800, 640))
        );
        assert!(ResizeShortestEdge::new(vec![640, 640], 1333, SampleStyle::Range).is_ok());
    }

    #[test]
    fn test_descending_train_range_fails_at_build() {
        let conf = AugmentationConfiguration {
            min_size_train: vec![800, 640],
            min_size_train_sampling: SampleStyle::Range,
            ..Default::default()
        };
        assert!(build_augmentation(&conf, true).is_err());
    }
}
