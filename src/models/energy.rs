//! # 弛豫能量记录
//!
//! 外部弛豫完成后解析得到的最终能量。记录缺失表示“尚未弛豫”，
//! 永远不会被当作零能量或基态处理。
//!
//! ## 依赖关系
//! - 被 `parsers/outcar.rs`, `parsers/castep_out.rs` 填充
//! - 被 `analysis/` 与 `commands/` 使用
//! - 使用 `serde_json` 持久化

use crate::error::{Result, ShakeError};
use crate::models::distortion::DistortionLabel;
use crate::utils::atomic;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 单个试探结构的能量记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRecord {
    pub label: DistortionLabel,
    /// 最终能量 (eV)
    pub final_energy: Option<f64>,
    /// 几何优化是否收敛
    pub converged: bool,
}

/// 基态畸变
#[derive(Debug, Clone, PartialEq)]
pub struct GroundStateResult {
    pub label: DistortionLabel,
    pub energy: f64,
    /// 相对 `Unperturbed` 的能量差 (eV)；`Unperturbed` 缺失时为 None
    pub energy_diff: Option<f64>,
}

/// 一个缺陷条目下所有试探结构的能量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefectEnergies {
    pub records: BTreeMap<DistortionLabel, EnergyRecord>,
}

impl DefectEnergies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: EnergyRecord) {
        self.records.insert(record.label.clone(), record);
    }

    /// 有能量的记录数
    pub fn parsed_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.final_energy.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed_count() == 0
    }

    pub fn energy(&self, label: &DistortionLabel) -> Option<f64> {
        self.records.get(label).and_then(|r| r.final_energy)
    }

    pub fn unperturbed(&self) -> Option<f64> {
        self.energy(&DistortionLabel::Unperturbed)
    }

    /// 相对 `Unperturbed` 的能量；缺少参考时返回 None
    pub fn relative(&self, label: &DistortionLabel) -> Option<f64> {
        Some(self.energy(label)? - self.unperturbed()?)
    }

    /// 能量最低的标签；并列时取规范顺序中靠前者
    pub fn ground_state(&self) -> Option<GroundStateResult> {
        let (label, energy) = self
            .records
            .iter()
            .filter_map(|(label, r)| r.final_energy.map(|e| (label, e)))
            .fold(None, |best: Option<(&DistortionLabel, f64)>, (label, e)| {
                match best {
                    Some((_, b)) if b <= e => best,
                    _ => Some((label, e)),
                }
            })?;

        Some(GroundStateResult {
            label: label.clone(),
            energy,
            energy_diff: self.unperturbed().map(|u| energy - u),
        })
    }

    /// 从 JSON 文件读取
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ShakeError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 原子写入 JSON 文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic::write_atomic(path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: DistortionLabel, energy: Option<f64>) -> EnergyRecord {
        EnergyRecord {
            label,
            final_energy: energy,
            converged: energy.is_some(),
        }
    }

    #[test]
    fn test_ground_state_relative_to_unperturbed() {
        let mut energies = DefectEnergies::new();
        energies.insert(record(DistortionLabel::Unperturbed, Some(-100.0)));
        energies.insert(record(DistortionLabel::bond(-0.3), Some(-100.08)));
        energies.insert(record(DistortionLabel::bond(0.3), Some(-99.9)));
        energies.insert(record(DistortionLabel::Rattled, None));

        let gs = energies.ground_state().unwrap();
        assert_eq!(gs.label, DistortionLabel::bond(-0.3));
        assert!((gs.energy_diff.unwrap() + 0.08).abs() < 1e-9);
        assert_eq!(energies.parsed_count(), 3);
    }

    #[test]
    fn test_ground_state_without_unperturbed() {
        let mut energies = DefectEnergies::new();
        energies.insert(record(DistortionLabel::bond(-0.55), Some(-5.0)));

        let gs = energies.ground_state().unwrap();
        assert_eq!(gs.energy_diff, None);
    }

    #[test]
    fn test_empty_energies_have_no_ground_state() {
        let mut energies = DefectEnergies::new();
        energies.insert(record(DistortionLabel::Unperturbed, None));
        assert!(energies.is_empty());
        assert!(energies.ground_state().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("v_Cd_0_energies.json");

        let mut energies = DefectEnergies::new();
        energies.insert(record(DistortionLabel::Unperturbed, Some(-1.0)));
        energies.save(&path).unwrap();

        let loaded = DefectEnergies::load(&path).unwrap();
        assert_eq!(loaded, energies);
    }
}
