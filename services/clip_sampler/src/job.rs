use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use vidseg_core::clip::ClipSummary;
use vidseg_core::dataset::{load_coco_json, load_metadata, load_ytvis_json, ImageRecord, VideoRecord};
use vidseg_core::image_io::BlankImageReader;
use vidseg_core::mapper::{ImageClipMapper, VideoClipMapper};
use vidseg_core::record_seed;
use vidseg_core::remap::{CategoryRemap, DatasetMetadata};

use crate::configuration::{CatalogConfiguration, CatalogKind, ServiceConfiguration};

enum Catalog {
    Videos(Vec<VideoRecord>),
    Images(Vec<ImageRecord>),
}

impl Catalog {
    fn load(conf: &CatalogConfiguration) -> Result<(Self, DatasetMetadata)> {
        let path = Path::new(&conf.path);
        Ok(match conf.kind {
            CatalogKind::Video => {
                let (records, meta) = load_ytvis_json(path, &conf.image_root, &conf.dataset_name)?;
                (Catalog::Videos(records), meta)
            }
            CatalogKind::Image => {
                let (records, meta) = load_coco_json(path, &conf.image_root, &conf.dataset_name)?;
                (Catalog::Images(records), meta)
            }
        })
    }

    /// Frames are never decoded: every file yields a blank frame of its
    /// declared size.
    fn blank_reader(&self) -> BlankImageReader {
        match self {
            Catalog::Videos(videos) => videos.iter().fold(BlankImageReader::new((1, 1)), |r, v| {
                v.file_names
                    .iter()
                    .fold(r, |r, f| r.with_size(f, (v.height, v.width)))
            }),
            Catalog::Images(images) => images
                .iter()
                .fold(BlankImageReader::new((1, 1)), |r, i| {
                    r.with_size(&i.file_name, (i.height, i.width))
                }),
        }
    }
}

enum ClipMapper {
    Video(VideoClipMapper, Vec<VideoRecord>),
    Image(ImageClipMapper, Vec<ImageRecord>),
}

pub struct ClipJob {
    mapper: ClipMapper,
    seed: u64,
    clips_per_record: usize,
    workers: Option<usize>,
}

impl ClipJob {
    pub fn new(conf: &ServiceConfiguration) -> Result<Self> {
        let (catalog, metadata) = Catalog::load(&conf.catalog)?;
        let remap = match &conf.remap {
            Some(target) => {
                let target_meta = load_metadata(Path::new(&target.path), &target.dataset_name)?;
                let remap = CategoryRemap::new(&metadata, &target_meta)?;
                info!(
                    "Remapping {} categories of {} into {}",
                    remap.len(),
                    metadata.name,
                    target_meta.name
                );
                Some(remap)
            }
            None => None,
        };
        let reader = Arc::new(catalog.blank_reader());
        let mapper = match catalog {
            Catalog::Videos(records) => ClipMapper::Video(
                VideoClipMapper::from_configuration(
                    conf.mapper.clone(),
                    &conf.augmentation,
                    reader,
                    remap,
                )?,
                records,
            ),
            Catalog::Images(records) => ClipMapper::Image(
                ImageClipMapper::from_configuration(
                    conf.mapper.clone(),
                    &conf.augmentation,
                    reader,
                    remap,
                )?,
                records,
            ),
        };
        Ok(Self {
            mapper,
            seed: conf.sampling.seed,
            clips_per_record: conf.sampling.clips_per_record,
            workers: conf.sampling.workers,
        })
    }

    pub fn record_count(&self) -> usize {
        match &self.mapper {
            ClipMapper::Video(_, records) => records.len(),
            ClipMapper::Image(_, records) => records.len(),
        }
    }

    fn map_record(&self, pos: usize, round: usize) -> Result<ClipSummary> {
        let seed = |id: i64| StdRng::seed_from_u64(record_seed(self.seed, &id.to_string(), round as u64));
        let clip = match &self.mapper {
            ClipMapper::Video(mapper, records) => {
                let record = &records[pos];
                mapper.map(record, &mut seed(record.video_id))?
            }
            ClipMapper::Image(mapper, records) => {
                let record = &records[pos];
                mapper.map(record, &mut seed(record.image_id))?
            }
        };
        debug!("Record {} round {} mapped", clip.video_id, round);
        Ok(clip.summary())
    }

    /// Maps every record `clips_per_record` times; the output order follows
    /// the catalog regardless of the worker count.
    pub fn run(&self) -> Result<Vec<ClipSummary>> {
        let tasks = (0..self.record_count())
            .flat_map(|pos| (0..self.clips_per_record).map(move |round| (pos, round)))
            .collect::<Vec<_>>();
        let map_all = || {
            tasks
                .par_iter()
                .map(|(pos, round)| self.map_record(*pos, *round))
                .collect::<Result<Vec<_>>>()
        };
        match self.workers {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()?
                .install(map_all),
            None => map_all(),
        }
    }
}
