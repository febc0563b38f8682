use crate::primitives::{Annotation, BoxMode, Segmentation};
use crate::remap::DatasetMetadata;
use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatasetError {
    #[error("No records found in `{0}`.")]
    Empty(String),
    #[error("Video {video_id} declares {length} frames but lists {files} files.")]
    LengthMismatch {
        video_id: i64,
        length: usize,
        files: usize,
    },
}

/// One video of the catalog; `annotations[i]` lists the objects of frame `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub video_id: i64,
    pub height: usize,
    pub width: usize,
    pub length: usize,
    pub file_names: Vec<String>,
    pub annotations: Vec<Vec<Annotation>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub image_id: i64,
    pub height: usize,
    pub width: usize,
    pub file_name: String,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
struct CategoryJson {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct YtvisVideoJson {
    id: i64,
    width: usize,
    height: usize,
    #[serde(default)]
    length: Option<usize>,
    file_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct YtvisAnnotationJson {
    id: i64,
    video_id: i64,
    category_id: i64,
    #[serde(default)]
    iscrowd: u8,
    #[serde(default)]
    bboxes: Vec<Option<Vec<f32>>>,
    #[serde(default)]
    segmentations: Vec<Option<Segmentation>>,
}

#[derive(Debug, Deserialize)]
struct YtvisJson {
    videos: Vec<YtvisVideoJson>,
    #[serde(default)]
    annotations: Vec<YtvisAnnotationJson>,
    categories: Vec<CategoryJson>,
}

#[derive(Debug, Deserialize)]
struct CocoImageJson {
    id: i64,
    file_name: String,
    height: usize,
    width: usize,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotationJson {
    id: i64,
    image_id: i64,
    category_id: i64,
    bbox: Vec<f32>,
    #[serde(default)]
    iscrowd: u8,
    #[serde(default)]
    segmentation: Option<Segmentation>,
}

#[derive(Debug, Deserialize)]
struct CocoJson {
    images: Vec<CocoImageJson>,
    #[serde(default)]
    annotations: Vec<CocoAnnotationJson>,
    categories: Vec<CategoryJson>,
}

fn metadata_of(dataset_name: &str, categories: &[CategoryJson]) -> DatasetMetadata {
    let categories = categories
        .iter()
        .map(|c| (c.id, c.name.clone()))
        .collect::<Vec<_>>();
    DatasetMetadata::from_categories(dataset_name, &categories)
}

fn join_root(image_root: &str, file_name: &str) -> String {
    Path::new(image_root)
        .join(file_name)
        .to_string_lossy()
        .into_owned()
}

fn read_catalog(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset catalog `{}`", path.display()))
}

#[derive(Debug, Deserialize)]
struct CategoriesJson {
    categories: Vec<CategoryJson>,
}

/// Reads only the category list of a catalog, either format.
pub fn load_metadata(path: &Path, dataset_name: &str) -> Result<DatasetMetadata> {
    let json = read_catalog(path)?;
    let catalog: CategoriesJson = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse categories of `{}`", path.display()))?;
    Ok(metadata_of(dataset_name, &catalog.categories))
}

/// Loads a YouTube-VIS / OVIS style video catalog.
pub fn load_ytvis_json(
    path: &Path,
    image_root: &str,
    dataset_name: &str,
) -> Result<(Vec<VideoRecord>, DatasetMetadata)> {
    let json = read_catalog(path)?;
    let res = parse_ytvis_json(&json, image_root, dataset_name)
        .with_context(|| format!("Failed to parse `{}`", path.display()))?;
    info!(
        "Loaded {} videos in YTVIS format from {}",
        res.0.len(),
        path.display()
    );
    Ok(res)
}

pub fn parse_ytvis_json(
    json: &str,
    image_root: &str,
    dataset_name: &str,
) -> Result<(Vec<VideoRecord>, DatasetMetadata)> {
    let catalog: YtvisJson = serde_json::from_str(json)?;
    let metadata = metadata_of(dataset_name, &catalog.categories);

    let mut records = Vec::with_capacity(catalog.videos.len());
    let mut positions = HashMap::with_capacity(catalog.videos.len());
    for video in catalog.videos {
        let length = video.length.unwrap_or(video.file_names.len());
        if length != video.file_names.len() {
            return Err(DatasetError::LengthMismatch {
                video_id: video.id,
                length,
                files: video.file_names.len(),
            }
            .into());
        }
        positions.insert(video.id, records.len());
        records.push(VideoRecord {
            video_id: video.id,
            height: video.height,
            width: video.width,
            length,
            file_names: video
                .file_names
                .iter()
                .map(|f| join_root(image_root, f))
                .collect(),
            annotations: vec![Vec::new(); length],
        });
    }
    if records.is_empty() {
        return Err(DatasetError::Empty(dataset_name.to_string()).into());
    }

    for anno in catalog.annotations {
        let Some(&pos) = positions.get(&anno.video_id) else {
            warn!(
                "Annotation {} refers to unknown video {}, skipped",
                anno.id, anno.video_id
            );
            continue;
        };
        let record = &mut records[pos];
        let category_id = metadata.contiguous_id(anno.category_id)?;
        let frames = anno.bboxes.len().max(anno.segmentations.len());
        if frames > record.length {
            warn!(
                "Track {} has {} frames, video {} only {}; extra frames are ignored",
                anno.id, frames, record.video_id, record.length
            );
        }
        for frame_idx in 0..frames.min(record.length) {
            let bbox = anno.bboxes.get(frame_idx).cloned().flatten();
            let segm = anno.segmentations.get(frame_idx).cloned().flatten();
            let (Some(bbox), Some(segm)) = (bbox, segm) else {
                continue;
            };
            let Ok(bbox) = <[f32; 4]>::try_from(bbox.as_slice()) else {
                warn!(
                    "Track {} has a malformed box in frame {}, skipped",
                    anno.id, frame_idx
                );
                continue;
            };
            record.annotations[frame_idx].push(Annotation {
                id: anno.id,
                category_id,
                bbox,
                bbox_mode: BoxMode::XywhAbs,
                segmentation: Some(segm),
                iscrowd: anno.iscrowd != 0,
            });
        }
    }
    Ok((records, metadata))
}

/// Loads a COCO instance catalog.
pub fn load_coco_json(
    path: &Path,
    image_root: &str,
    dataset_name: &str,
) -> Result<(Vec<ImageRecord>, DatasetMetadata)> {
    let json = read_catalog(path)?;
    let res = parse_coco_json(&json, image_root, dataset_name)
        .with_context(|| format!("Failed to parse `{}`", path.display()))?;
    info!(
        "Loaded {} images in COCO format from {}",
        res.0.len(),
        path.display()
    );
    Ok(res)
}

pub fn parse_coco_json(
    json: &str,
    image_root: &str,
    dataset_name: &str,
) -> Result<(Vec<ImageRecord>, DatasetMetadata)> {
    let catalog: CocoJson = serde_json::from_str(json)?;
    let metadata = metadata_of(dataset_name, &catalog.categories);

    let mut positions = HashMap::with_capacity(catalog.images.len());
    let mut records = catalog
        .images
        .into_iter()
        .enumerate()
        .map(|(i, img)| {
            positions.insert(img.id, i);
            ImageRecord {
                image_id: img.id,
                height: img.height,
                width: img.width,
                file_name: join_root(image_root, &img.file_name),
                annotations: Vec::new(),
            }
        })
        .collect::<Vec<_>>();
    if records.is_empty() {
        return Err(DatasetError::Empty(dataset_name.to_string()).into());
    }

    for anno in catalog.annotations {
        let Some(&pos) = positions.get(&anno.image_id) else {
            warn!(
                "Annotation {} refers to unknown image {}, skipped",
                anno.id, anno.image_id
            );
            continue;
        };
        let Ok(bbox) = <[f32; 4]>::try_from(anno.bbox.as_slice()) else {
            warn!("Annotation {} has a malformed box, skipped", anno.id);
            continue;
        };
        records[pos].annotations.push(Annotation {
            id: anno.id,
            category_id: metadata.contiguous_id(anno.category_id)?,
            bbox,
            bbox_mode: BoxMode::XywhAbs,
            segmentation: anno.segmentation,
            iscrowd: anno.iscrowd != 0,
        });
    }
    Ok((records, metadata))
}
