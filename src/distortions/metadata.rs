//! # 畸变元数据
//!
//! `distortion_metadata.json` 记录一次生成所用的参数，以及每个缺陷、
//! 每个电荷态的畸变球与各试探结构的畸变规格。重复生成时与已有文件合并：
//! 已存在的条目保留，新条目追加。
//!
//! ```json
//! {
//!   "parameters": { "seed": 42, ... },
//!   "defects": {
//!     "v_Cd": {
//!       "kind": "Vacancy",
//!       "charges": {
//!         "0": { "neighbours": [...], "distortions": { "Rattled": {...} } }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/generate.rs`, `commands/regenerate.rs` 使用
//! - 使用 `serde_json` 与 `utils/atomic.rs`

use crate::distortions::config::{DistortionConfig, DistortionParameters};
use crate::distortions::generator::GenerationResult;
use crate::distortions::neighbours::NeighbourRule;
use crate::error::{Result, ShakeError};
use crate::models::{Defect, DefectKind, DistortionKind, DistortionLabel, Neighbour};
use crate::utils::atomic;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const METADATA_FILE: &str = "distortion_metadata.json";

/// 单个试探结构的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialMetadata {
    #[serde(flatten)]
    pub kind: DistortionKind,
    /// 未被随机扰动的原子索引
    #[serde(default)]
    pub unperturbed_atoms: Vec<usize>,
}

/// 一个电荷态的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeMetadata {
    pub rule: Option<NeighbourRule>,
    #[serde(default)]
    pub neighbours: Vec<Neighbour>,
    #[serde(default)]
    pub distortions: BTreeMap<DistortionLabel, TrialMetadata>,
}

/// 一个缺陷的记录；只追加过传播结构的缺陷没有位点信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefectMetadata {
    pub kind: Option<DefectKind>,
    pub element: Option<String>,
    pub site: Option<[f64; 3]>,
    pub site_index: Option<usize>,
    #[serde(default)]
    pub charges: BTreeMap<i32, ChargeMetadata>,
}

impl DefectMetadata {
    pub fn for_defect(defect: &Defect) -> Self {
        DefectMetadata {
            kind: Some(defect.kind),
            element: Some(defect.element.clone()),
            site: Some(defect.site),
            site_index: defect.site_index,
            charges: BTreeMap::new(),
        }
    }
}

/// 元数据文件内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionMetadata {
    pub parameters: DistortionParameters,
    #[serde(default)]
    pub defects: BTreeMap<String, DefectMetadata>,
}

impl DistortionMetadata {
    pub fn new(config: &DistortionConfig) -> Self {
        DistortionMetadata {
            parameters: DistortionParameters::from(config),
            defects: BTreeMap::new(),
        }
    }

    /// 记录一个条目的生成结果，替换该电荷态已有的记录
    pub fn record_generation(&mut self, defect: &Defect, result: &GenerationResult) {
        let distortions = result
            .trials
            .iter()
            .map(|trial| {
                let label = trial.spec.label.clone();
                let unperturbed_atoms = result
                    .unperturbed_atoms
                    .get(&label)
                    .cloned()
                    .unwrap_or_default();
                (
                    label,
                    TrialMetadata {
                        kind: trial.spec.kind.clone(),
                        unperturbed_atoms,
                    },
                )
            })
            .collect();

        let record = ChargeMetadata {
            rule: Some(result.sphere.rule),
            neighbours: result.sphere.neighbours.clone(),
            distortions,
        };

        let entry = self
            .defects
            .entry(defect.name.clone())
            .or_insert_with(DefectMetadata::default);
        if entry.kind.is_none() {
            let charges = std::mem::take(&mut entry.charges);
            *entry = DefectMetadata {
                charges,
                ..DefectMetadata::for_defect(defect)
            };
        }
        entry.charges.insert(result.charge, record);
    }

    /// 追加一个试探结构（如跨电荷态传播的结构）；标签已存在时返回 false
    pub fn append_trial(
        &mut self,
        defect_name: &str,
        charge: i32,
        label: DistortionLabel,
        trial: TrialMetadata,
    ) -> bool {
        let charges = &mut self
            .defects
            .entry(defect_name.to_string())
            .or_default()
            .charges;
        let record = charges.entry(charge).or_insert_with(|| ChargeMetadata {
            rule: None,
            neighbours: Vec::new(),
            distortions: BTreeMap::new(),
        });

        if record.distortions.contains_key(&label) {
            return false;
        }
        record.distortions.insert(label, trial);
        true
    }

    /// 并入旧文件中本次没有覆盖的条目；返回两次生成参数是否不同
    pub fn merge(&mut self, older: DistortionMetadata) -> bool {
        let differs = older.parameters != self.parameters;

        for (name, old_defect) in older.defects {
            match self.defects.get_mut(&name) {
                None => {
                    self.defects.insert(name, old_defect);
                }
                Some(current) => {
                    for (charge, old_charge) in old_defect.charges {
                        match current.charges.get_mut(&charge) {
                            None => {
                                current.charges.insert(charge, old_charge);
                            }
                            Some(record) => {
                                for (label, trial) in old_charge.distortions {
                                    record.distortions.entry(label).or_insert(trial);
                                }
                            }
                        }
                    }
                }
            }
        }

        differs
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ShakeError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 读取已有文件；不存在时返回 None
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic::write_atomic(path, json.as_bytes())
    }
}
