use crate::consts::IGNORE_CATEGORY_ID;
use anyhow::Result;
use hashbrown::HashMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RemapError {
    #[error("Dataset `{0}` does not belong to a known dataset family.")]
    UnknownFamily(String),
    #[error("Remapping categories from `{0}` to `{1}` is not supported.")]
    Unsupported(DatasetFamily, DatasetFamily),
    #[error("Dataset `{dataset}` has no category with id {id}.")]
    UnknownCategory { dataset: String, id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFamily {
    Coco,
    Ytvis2019,
    Ytvis2021,
    Ovis,
}

impl DatasetFamily {
    /// Resolves a registered dataset name such as `ytvis_2019_train`.
    pub fn from_name(name: &str) -> Result<Self> {
        let family = if name.starts_with("coco") {
            DatasetFamily::Coco
        } else if name.starts_with("ytvis_2019") {
            DatasetFamily::Ytvis2019
        } else if name.starts_with("ytvis_2021") {
            DatasetFamily::Ytvis2021
        } else if name.starts_with("ovis") {
            DatasetFamily::Ovis
        } else {
            return Err(RemapError::UnknownFamily(name.to_string()).into());
        };
        Ok(family)
    }
}

impl fmt::Display for DatasetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetFamily::Coco => "coco",
            DatasetFamily::Ytvis2019 => "ytvis_2019",
            DatasetFamily::Ytvis2021 => "ytvis_2021",
            DatasetFamily::Ovis => "ovis",
        };
        write!(f, "{name}")
    }
}

lazy_static! {
    static ref COCO_TO_YTVIS_2019: Vec<(i64, i64)> = vec![
        (1, 1), (2, 21), (3, 6), (4, 21), (5, 28), (7, 17), (8, 29), (9, 34), (17, 14),
        (18, 8), (19, 18), (21, 15), (22, 32), (23, 20), (24, 30), (25, 22), (35, 33),
        (36, 33), (41, 5), (42, 27), (43, 40),
    ];
    static ref COCO_TO_YTVIS_2021: Vec<(i64, i64)> = vec![
        (1, 26), (2, 23), (3, 5), (4, 23), (5, 1), (7, 36), (8, 37), (9, 4), (16, 3),
        (17, 6), (18, 9), (19, 19), (21, 7), (22, 12), (23, 2), (24, 40), (25, 18),
        (34, 14), (35, 31), (36, 31), (41, 29), (42, 33), (43, 34),
    ];
    static ref COCO_TO_OVIS: Vec<(i64, i64)> = vec![
        (1, 1), (2, 21), (3, 25), (4, 22), (5, 23), (6, 25), (8, 25), (9, 24), (17, 3),
        (18, 4), (19, 5), (20, 6), (21, 7), (22, 8), (23, 9), (24, 10), (25, 11),
    ];
}

/// Dataset-id pairs for a source/target family combination.
pub fn builtin_table(src: DatasetFamily, tgt: DatasetFamily) -> Option<&'static [(i64, i64)]> {
    match (src, tgt) {
        (DatasetFamily::Coco, DatasetFamily::Ytvis2019) => Some(COCO_TO_YTVIS_2019.as_slice()),
        (DatasetFamily::Coco, DatasetFamily::Ytvis2021) => Some(COCO_TO_YTVIS_2021.as_slice()),
        (DatasetFamily::Coco, DatasetFamily::Ovis) => Some(COCO_TO_OVIS.as_slice()),
        _ => None,
    }
}

/// Category bookkeeping of one registered dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub name: String,
    pub thing_classes: Vec<String>,
    pub thing_dataset_id_to_contiguous_id: HashMap<i64, i64>,
}

impl DatasetMetadata {
    /// Contiguous ids follow the ascending order of dataset ids.
    pub fn from_categories(name: &str, categories: &[(i64, String)]) -> Self {
        let mut sorted = categories.to_vec();
        sorted.sort_by_key(|(id, _)| *id);
        let thing_dataset_id_to_contiguous_id = sorted
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i as i64))
            .collect();
        Self {
            name: name.to_string(),
            thing_classes: sorted.into_iter().map(|(_, n)| n).collect(),
            thing_dataset_id_to_contiguous_id,
        }
    }

    pub fn contiguous_id(&self, dataset_id: i64) -> Result<i64> {
        self.thing_dataset_id_to_contiguous_id
            .get(&dataset_id)
            .copied()
            .ok_or_else(|| {
                RemapError::UnknownCategory {
                    dataset: self.name.clone(),
                    id: dataset_id,
                }
                .into()
            })
    }
}

/// Lookup from source contiguous ids to target contiguous ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRemap {
    table: HashMap<i64, i64>,
}

impl CategoryRemap {
    pub fn new(src: &DatasetMetadata, tgt: &DatasetMetadata) -> Result<Self> {
        let src_family = DatasetFamily::from_name(&src.name)?;
        let tgt_family = DatasetFamily::from_name(&tgt.name)?;
        let pairs = builtin_table(src_family, tgt_family)
            .ok_or(RemapError::Unsupported(src_family, tgt_family))?;
        let mut table = HashMap::with_capacity(pairs.len());
        for (s, t) in pairs {
            table.insert(src.contiguous_id(*s)?, tgt.contiguous_id(*t)?);
        }
        Ok(Self { table })
    }

    pub fn from_table(table: HashMap<i64, i64>) -> Self {
        Self { table }
    }

    /// Classes absent from the table become the ignore label.
    pub fn map(&self, class: i64) -> i64 {
        self.table.get(&class).copied().unwrap_or(IGNORE_CATEGORY_ID)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
