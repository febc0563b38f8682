use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use twelf::{config, Layer};
use vidseg_core::mapper::MapperConfiguration;
use vidseg_core::remap::DatasetFamily;
use vidseg_core::transforms::AugmentationConfiguration;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// YouTube-VIS style catalog of annotated videos.
    Video,
    /// COCO style catalog of still images turned into pseudo clips.
    Image,
}

fn default_image_root() -> String {
    String::new()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogConfiguration {
    pub kind: CatalogKind,
    pub path: String,
    #[serde(default = "default_image_root")]
    pub image_root: String,
    pub dataset_name: String,
}

/// Category list of the label space clips are translated into.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemapConfiguration {
    pub path: String,
    pub dataset_name: String,
}

fn default_seed() -> u64 {
    42
}

fn default_clips_per_record() -> usize {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SamplingConfiguration {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_clips_per_record")]
    pub clips_per_record: usize,
    pub workers: Option<usize>,
}

fn default_sampling() -> SamplingConfiguration {
    SamplingConfiguration {
        seed: default_seed(),
        clips_per_record: default_clips_per_record(),
        workers: None,
    }
}

fn default_mapper() -> MapperConfiguration {
    MapperConfiguration::default()
}

fn default_augmentation() -> AugmentationConfiguration {
    AugmentationConfiguration::default()
}

#[config]
#[derive(Debug, Serialize, Clone)]
pub struct ServiceConfiguration {
    pub catalog: CatalogConfiguration,
    #[serde(default = "default_mapper")]
    pub mapper: MapperConfiguration,
    #[serde(default = "default_augmentation")]
    pub augmentation: AugmentationConfiguration,
    #[serde(default = "default_sampling")]
    pub sampling: SamplingConfiguration,
    pub remap: Option<RemapConfiguration>,
}

impl ServiceConfiguration {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.sampling.clips_per_record == 0 {
            bail!("At least one clip per record must be requested!");
        }
        if self.sampling.workers == Some(0) {
            bail!("Worker count must be positive when set!");
        }
        self.mapper.sampler.validate()?;
        if let Some(remap) = &self.remap {
            DatasetFamily::from_name(&self.catalog.dataset_name)?;
            DatasetFamily::from_name(&remap.dataset_name)?;
        }
        Ok(())
    }

    pub fn new(path: &str) -> Result<Self> {
        let conf = Self::with_layers(&[Layer::Json(path.into())]).with_context(|| {
            let cwd = std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            format!(
                "Failed to load configuration from {}, current working directory: {}",
                path, cwd
            )
        })?;
        conf.validate()?;
        Ok(conf)
    }
}
