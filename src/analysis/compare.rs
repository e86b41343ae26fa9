//! # 能量 / 结构对比
//!
//! 对一个缺陷条目的所有弛豫结构，相对参考结构计算原子位移，
//! 并与最终能量一起列表。缺少能量的标签保留为空值行并标记。
//!
//! ## 依赖关系
//! - 被 `commands/analyse.rs` 使用
//! - 使用 `analysis/matcher.rs` 重新匹配原子
//! - 使用 `csv` 输出表格

use crate::analysis::matcher::match_atoms;
use crate::error::{Result, ShakeError};
use crate::models::{Crystal, DefectEnergies, DistortionLabel};
use crate::utils::atomic;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// 计入总位移的单原子位移阈值 (Å)
pub const DISPLACEMENT_THRESHOLD: f64 = 0.1;

/// 对比表的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub label: DistortionLabel,
    /// 最终能量 (eV)
    pub energy: Option<f64>,
    /// 相对 `Unperturbed` 的能量 (eV)
    pub delta_energy: Option<f64>,
    /// 平均原子位移 (Å)
    pub mean_displacement: Option<f64>,
    /// 最大原子位移 (Å)
    pub max_displacement: Option<f64>,
    /// 超过阈值的位移之和 (Å)
    pub total_displacement: Option<f64>,
    pub converged: Option<bool>,
    pub missing_energy: bool,
}

/// 位移统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacements {
    pub mean: f64,
    pub max: f64,
    pub total: f64,
}

/// 两个结构之间的原子位移；原子数或组成不同时返回 None
pub fn displacements(reference: &Crystal, structure: &Crystal) -> Option<Displacements> {
    if reference.num_atoms() != structure.num_atoms()
        || reference.composition() != structure.composition()
    {
        return None;
    }
    let matched = match_atoms(reference, structure);
    if matched.is_empty() {
        return Some(Displacements {
            mean: 0.0,
            max: 0.0,
            total: 0.0,
        });
    }

    let distances: Vec<f64> = matched.iter().map(|m| m.2).collect();
    Some(Displacements {
        mean: distances.iter().sum::<f64>() / distances.len() as f64,
        max: distances.iter().copied().fold(0.0, f64::max),
        total: distances
            .iter()
            .filter(|&&d| d > DISPLACEMENT_THRESHOLD)
            .sum(),
    })
}

/// 生成对比表，按规范标签顺序排列
pub fn compare(
    structures: &BTreeMap<DistortionLabel, Crystal>,
    energies: &DefectEnergies,
    reference: &DistortionLabel,
) -> Result<Vec<ComparisonRow>> {
    let reference_structure = structures
        .get(reference)
        .ok_or_else(|| ShakeError::ReferenceNotFound(reference.to_string()))?;

    let labels: BTreeSet<&DistortionLabel> =
        structures.keys().chain(energies.records.keys()).collect();

    let rows = labels
        .into_iter()
        .map(|label| {
            let disp = structures
                .get(label)
                .and_then(|s| displacements(reference_structure, s));
            let energy = energies.energy(label);
            ComparisonRow {
                label: label.clone(),
                energy,
                delta_energy: energies.relative(label),
                mean_displacement: disp.map(|d| d.mean),
                max_displacement: disp.map(|d| d.max),
                total_displacement: disp.map(|d| d.total),
                converged: energies.records.get(label).map(|r| r.converged),
                missing_energy: energy.is_none(),
            }
        })
        .collect();

    Ok(rows)
}

/// 把对比表写成 CSV
pub fn write_csv(rows: &[ComparisonRow], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ShakeError::Other(format!("failed to flush CSV buffer: {}", e)))?;
    atomic::write_atomic(path, &bytes)
}
