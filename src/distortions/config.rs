//! # 畸变配置
//!
//! 所有可配置项都是具名字段并带默认值，可从 TOML 文件读取或在代码中构造。
//! 未识别的键会被收集并作为警告报告，不会导致错误。读取后执行 `validate()`
//! 拒绝不一致的取值。
//!
//! ```toml
//! bond_distortions = [-0.3, 0.0, 0.3]
//! stdev = 0.25
//! d_min = 2.25
//! seed = 42
//! local_rattle = false
//!
//! [oxidation_states]
//! Sn = 2
//!
//! # generate-all 中按缺陷名覆盖电荷与位点
//! [defects.v_Cd]
//! charges = [-2, -1, 0]
//! defect_index = 0
//! ```
//!
//! ## 依赖关系
//! - 被 `distortions/generator.rs`, `analysis/consolidate.rs`, `commands/` 使用
//! - 使用 `serde` + `toml`

use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShakeError};
use crate::models::DistortionLabel;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 默认键畸变范围 ±60%
pub const DEFAULT_DISTORTION_RANGE: f64 = 0.6;

/// 畸变与分析配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DistortionConfig {
    /// 键畸变分数列表（如 -0.3 表示压缩 30%）；缺省时由 `distortion_increment` 生成
    pub bond_distortions: Option<Vec<f64>>,

    /// 生成 -0.6..=0.6 键畸变序列的步长
    pub distortion_increment: f64,

    /// 随机扰动标准差 (Å)；缺省为体相键长的 10%
    #[serde(alias = "width")]
    pub stdev: Option<f64>,

    /// 随机扰动允许的最小原子间距 (Å)；缺省为体相键长的 80%
    pub d_min: Option<f64>,

    /// 邻居搜索半径 (Å)
    pub nbr_cutoff: f64,

    /// 显式指定畸变邻居数，覆盖价电子规则
    pub num_nearest_neighbours: Option<usize>,

    /// 显式指定参与随机扰动的原子索引
    pub active_atoms: Option<Vec<usize>>,

    /// 只畸变这些元素的邻居
    pub distorted_elements: Option<Vec<String>>,

    /// 每轮随机扰动的最大尝试次数
    #[serde(alias = "n_iter")]
    pub max_attempts: usize,

    /// 单个原子的最大位移 (Å)
    pub max_disp: f64,

    /// 每轮失败后标准差的缩放因子
    pub decay_factor: f64,

    /// 额外的衰减轮数
    pub decay_rounds: u32,

    pub seed: u64,

    /// 只扰动缺陷附近 `nbr_cutoff` 内的原子
    pub local_rattle: bool,

    /// 空位生成 `Dimer` 试探结构
    pub dimer: bool,

    /// 二聚体键长 (Å)
    pub dimer_bond_length: f64,

    /// 判定能量降低所需的最小能量差 (eV)
    pub min_e_diff: f64,

    /// 同时传播亚稳态畸变
    pub metastable: bool,

    /// 电荷态范围两端的扩展数
    pub padding: u32,

    /// 显式电荷态
    pub charges: Option<Vec<i32>>,

    /// 元素氧化态覆盖
    pub oxidation_states: BTreeMap<String, i32>,

    /// 按缺陷名覆盖的额外电子数（替代 -q_ox）
    pub number_electrons: BTreeMap<String, i32>,

    /// 结构匹配的位置容差（以 (V/N)^(1/3) 为单位）
    pub stol: f64,

    /// 按缺陷名给出的电荷与位点
    pub defects: BTreeMap<String, DefectSettings>,

    /// 未识别的键
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        DistortionConfig {
            bond_distortions: None,
            distortion_increment: 0.1,
            stdev: None,
            d_min: None,
            nbr_cutoff: 5.0,
            num_nearest_neighbours: None,
            active_atoms: None,
            distorted_elements: None,
            max_attempts: 5000,
            max_disp: 2.0,
            decay_factor: 0.5,
            decay_rounds: 3,
            seed: 42,
            local_rattle: false,
            dimer: true,
            dimer_bond_length: 2.0,
            min_e_diff: 0.05,
            metastable: false,
            padding: 1,
            charges: None,
            oxidation_states: BTreeMap::new(),
            number_electrons: BTreeMap::new(),
            stol: 0.1,
            defects: BTreeMap::new(),
            unknown: BTreeMap::new(),
        }
    }
}

impl DistortionConfig {
    /// 从 TOML 文件读取；未识别的键作为警告返回
    pub fn load(path: &Path) -> Result<(Self, Diagnostics)> {
        let content = fs::read_to_string(path).map_err(|e| ShakeError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// 从 TOML 字符串读取
    pub fn from_toml_str(content: &str, source: &str) -> Result<(Self, Diagnostics)> {
        let config: DistortionConfig = toml::from_str(content)?;
        let mut diagnostics = Diagnostics::new();

        for key in config.unknown.keys() {
            diagnostics.warn(source, format!("unrecognised option '{}' ignored", key));
        }
        for (a, b) in config.colliding_bond_distortions() {
            diagnostics.warn(
                source,
                format!(
                    "bond distortions {} and {} both map to {}; only one trial is generated",
                    a,
                    b,
                    DistortionLabel::bond(a)
                ),
            );
        }

        config.validate()?;
        Ok((config, diagnostics))
    }

    /// 检查取值是否一致
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ShakeError::InvalidConfig(msg));

        if let Some(stdev) = self.stdev {
            if !(stdev >= 0.0) {
                return invalid(format!("stdev must be non-negative, got {}", stdev));
            }
        }
        if let Some(d_min) = self.d_min {
            if !(d_min >= 0.0) {
                return invalid(format!("d_min must be non-negative, got {}", d_min));
            }
        }
        if let Some(list) = &self.bond_distortions {
            if let Some(bad) = list.iter().find(|p| !(**p > -1.0) || !p.is_finite()) {
                return invalid(format!(
                    "bond distortion {} would collapse neighbours onto the defect site",
                    bad
                ));
            }
        }
        if !(self.distortion_increment > 0.0) {
            return invalid("distortion_increment must be positive".to_string());
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1".to_string());
        }
        if !(self.decay_factor > 0.0 && self.decay_factor < 1.0) {
            return invalid(format!(
                "decay_factor must lie in (0, 1), got {}",
                self.decay_factor
            ));
        }
        if !(self.nbr_cutoff > 0.0) {
            return invalid("nbr_cutoff must be positive".to_string());
        }
        if !(self.max_disp > 0.0) {
            return invalid("max_disp must be positive".to_string());
        }
        if !(self.dimer_bond_length > 0.0) {
            return invalid("dimer_bond_length must be positive".to_string());
        }
        if !(self.min_e_diff >= 0.0) {
            return invalid("min_e_diff must be non-negative".to_string());
        }
        if !(self.stol > 0.0) {
            return invalid("stol must be positive".to_string());
        }
        for (name, settings) in &self.defects {
            if settings.charges.is_some() && settings.charge.is_some() {
                return invalid(format!("defects.{}: give 'charges' or 'charge', not both", name));
            }
            if settings.defect_index.is_some() && settings.defect_coords.is_some() {
                return invalid(format!(
                    "defects.{}: give 'defect_index' or 'defect_coords', not both",
                    name
                ));
            }
        }
        Ok(())
    }

    /// 取整到千分位后落在同一标签的不同键畸变分数，按 (先出现, 后出现) 返回
    pub fn colliding_bond_distortions(&self) -> Vec<(f64, f64)> {
        let mut seen: BTreeMap<i32, f64> = BTreeMap::new();
        let mut collisions = Vec::new();
        for &p in self.bond_distortions.iter().flatten() {
            let key = (p * 1000.0).round() as i32;
            match seen.get(&key) {
                Some(&first) if first != p => collisions.push((first, p)),
                Some(_) => {}
                None => {
                    seen.insert(key, p);
                }
            }
        }
        collisions
    }

    /// 实际使用的键畸变分数（按千分位去重、升序）
    pub fn bond_distortion_fractions(&self) -> Vec<f64> {
        let mut permille: Vec<i32> = match &self.bond_distortions {
            Some(list) => list.iter().map(|p| (p * 1000.0).round() as i32).collect(),
            None => {
                let steps = (DEFAULT_DISTORTION_RANGE / self.distortion_increment + 1e-9).floor() as i32;
                (-steps..=steps)
                    .map(|i| (i as f64 * self.distortion_increment * 1000.0).round() as i32)
                    .collect()
            }
        };
        permille.sort_unstable();
        permille.dedup();
        permille.into_iter().map(|p| p as f64 / 1000.0).collect()
    }

    /// 随机扰动标准差
    pub fn stdev_for(&self, bulk_bond_length: f64) -> f64 {
        self.stdev.unwrap_or(0.1 * bulk_bond_length)
    }

    /// 最小允许原子间距
    pub fn d_min_for(&self, bulk_bond_length: f64) -> f64 {
        self.d_min.unwrap_or(0.8 * bulk_bond_length)
    }
}

/// 单个缺陷的电荷与位点设置
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DefectSettings {
    pub charges: Option<Vec<i32>>,
    /// 单个电荷态的简写
    pub charge: Option<i32>,
    pub defect_index: Option<usize>,
    pub defect_coords: Option<[f64; 3]>,
}

impl DefectSettings {
    /// 设置中给出的电荷态
    pub fn charges(&self) -> Option<Vec<i32>> {
        self.charges
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| self.charge.map(|q| vec![q]))
    }
}

/// 写入元数据的畸变参数快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionParameters {
    pub bond_distortions: Vec<f64>,
    pub stdev: Option<f64>,
    pub d_min: Option<f64>,
    pub nbr_cutoff: f64,
    pub num_nearest_neighbours: Option<usize>,
    pub distorted_elements: Option<Vec<String>>,
    pub local_rattle: bool,
    pub max_attempts: usize,
    pub max_disp: f64,
    pub decay_factor: f64,
    pub decay_rounds: u32,
    pub seed: u64,
    pub dimer_bond_length: f64,
}

impl From<&DistortionConfig> for DistortionParameters {
    fn from(config: &DistortionConfig) -> Self {
        DistortionParameters {
            bond_distortions: config.bond_distortion_fractions(),
            stdev: config.stdev,
            d_min: config.d_min,
            nbr_cutoff: config.nbr_cutoff,
            num_nearest_neighbours: config.num_nearest_neighbours,
            distorted_elements: config.distorted_elements.clone(),
            local_rattle: config.local_rattle,
            max_attempts: config.max_attempts,
            max_disp: config.max_disp,
            decay_factor: config.decay_factor,
            decay_rounds: config.decay_rounds,
            seed: config.seed,
            dimer_bond_length: config.dimer_bond_length,
        }
    }
}
