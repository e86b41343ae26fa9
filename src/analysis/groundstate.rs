//! # 基态与能量降低畸变
//!
//! 判定规则：基态能量低于 `Unperturbed − min_e_diff` 时标记为能量降低。
//! 开启 `metastable` 后，键畸变序列中的每个局部极小、以及其他低于阈值的
//! 标签（`Rattled`, `Dimer`, 传播标签）也会被标记。
//!
//! ## 依赖关系
//! - 被 `analysis/consolidate.rs`, `commands/groundstate.rs` 使用
//! - 使用 `models/energy.rs`

use crate::models::{DefectEnergies, DistortionLabel, GroundStateResult};

/// 能量最低的畸变
pub fn ground_state(energies: &DefectEnergies) -> Option<GroundStateResult> {
    energies.ground_state()
}

/// 能量降低的标签，按规范顺序；缺少 `Unperturbed` 能量时为空
pub fn energy_lowering_labels(
    energies: &DefectEnergies,
    min_e_diff: f64,
    metastable: bool,
) -> Vec<DistortionLabel> {
    let unperturbed = match energies.unperturbed() {
        Some(e) => e,
        None => return Vec::new(),
    };
    let threshold = unperturbed - min_e_diff;

    let mut flagged = Vec::new();
    if let Some(ground) = energies.ground_state() {
        if ground.energy < threshold && ground.label != DistortionLabel::Unperturbed {
            flagged.push(ground.label);
        }
    }

    if metastable {
        // 键畸变序列（按百分比升序）中的局部极小
        let series: Vec<(&DistortionLabel, f64)> = energies
            .records
            .iter()
            .filter(|(label, _)| matches!(label, DistortionLabel::BondDistortion(_)))
            .filter_map(|(label, r)| r.final_energy.map(|e| (label, e)))
            .collect();

        for (i, &(label, e)) in series.iter().enumerate() {
            let left = i.checked_sub(1).map(|j| series[j].1);
            let right = series.get(i + 1).map(|s| s.1);
            let is_minimum = left.map_or(true, |l| e <= l) && right.map_or(true, |r| e <= r);
            if is_minimum && e < threshold && !flagged.contains(label) {
                flagged.push(label.clone());
            }
        }

        for (label, record) in &energies.records {
            let below = record.final_energy.map_or(false, |e| e < threshold);
            let other = !matches!(
                label,
                DistortionLabel::BondDistortion(_) | DistortionLabel::Unperturbed
            );
            if below && other && !flagged.contains(label) {
                flagged.push(label.clone());
            }
        }
    }

    flagged.sort();
    flagged
}
