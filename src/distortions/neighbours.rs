//! # 畸变邻居选择
//!
//! 从缺陷位点出发按最小镜像距离排序选取邻居（“畸变球”），
//! 仅限 `distorted_elements` 且都在 `nbr_cutoff` 之内。
//!
//! 邻居数的确定顺序：
//! 1. `num_nearest_neighbours` 显式给出
//! 2. 价电子规则：n_e = −q_ox + q（`number_electrons` 可覆盖 −q_ox），
//!    |n_e| ≤ 4 时取 |n_e|，否则取 8 − |n_e|
//! 3. 无氧化态估计时取第一配位壳层（最近距离 10% 以内）
//!
//! ## 依赖关系
//! - 被 `distortions/generator.rs` 使用
//! - 使用 `models/defect.rs`, `distortions/config.rs`

use crate::distortions::config::DistortionConfig;
use crate::error::{Result, ShakeError};
use crate::models::{DefectCapabilities, DefectEntry, Neighbour};

use serde::{Deserialize, Serialize};

/// 第一配位壳层相对最近距离的容差
const FIRST_SHELL_TOLERANCE: f64 = 0.1;

/// 邻居数的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighbourRule {
    /// 显式给出
    Fixed(usize),
    /// 由额外电子数推算
    Electrons(i32),
    /// 第一配位壳层
    FirstShell,
}

/// 畸变球
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourSphere {
    pub rule: NeighbourRule,
    /// 被畸变的邻居，按距离升序
    pub neighbours: Vec<Neighbour>,
}

impl NeighbourSphere {
    pub fn indices(&self) -> Vec<usize> {
        self.neighbours.iter().map(|n| n.index).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }
}

/// 价电子规则：额外电子数对应的畸变邻居数
pub fn neighbours_for_electrons(electrons: i32) -> usize {
    let n = electrons.unsigned_abs() as usize;
    if n <= 4 {
        n
    } else {
        8usize.saturating_sub(n)
    }
}

/// 缺陷条目的额外电子数；无法估计时返回 None
pub fn electron_count(entry: &DefectEntry, config: &DistortionConfig) -> Option<i32> {
    let defect = &entry.defect;
    match config.number_electrons.get(&defect.name) {
        Some(&n) => Some(n + entry.charge),
        None => Some(defect.kind.electron_count(defect.oxidation_state?, entry.charge)),
    }
}

/// `cutoff` 内的候选邻居（未截断）
pub fn candidate_neighbours(entry: &DefectEntry, config: &DistortionConfig) -> Vec<Neighbour> {
    let defect = &entry.defect;
    defect.kind.find_neighbours(
        defect,
        config.nbr_cutoff,
        config.distorted_elements.as_deref(),
    )
}

/// 选取畸变球；需要邻居但一个都没有时返回 `InsufficientNeighbours`
pub fn select_neighbours(entry: &DefectEntry, config: &DistortionConfig) -> Result<NeighbourSphere> {
    let rule = match config.num_nearest_neighbours {
        Some(n) => NeighbourRule::Fixed(n),
        None => match electron_count(entry, config) {
            Some(n_e) => NeighbourRule::Electrons(n_e),
            None => NeighbourRule::FirstShell,
        },
    };

    let wanted = match rule {
        NeighbourRule::Fixed(n) => Some(n),
        NeighbourRule::Electrons(n_e) => Some(neighbours_for_electrons(n_e)),
        NeighbourRule::FirstShell => None,
    };

    // 完全电离的缺陷不做键畸变
    if wanted == Some(0) {
        return Ok(NeighbourSphere {
            rule,
            neighbours: Vec::new(),
        });
    }

    let candidates = candidate_neighbours(entry, config);
    if candidates.is_empty() {
        let elements = config
            .distorted_elements
            .as_ref()
            .map(|els| format!(" of elements {:?}", els))
            .unwrap_or_default();
        return Err(ShakeError::InsufficientNeighbours {
            entry: entry.name.clone(),
            reason: format!(
                "no atoms{} within nbr_cutoff = {:.2} Å of the defect site",
                elements, config.nbr_cutoff
            ),
        });
    }

    let neighbours = match wanted {
        Some(n) => candidates.into_iter().take(n).collect(),
        None => {
            let nearest = candidates[0].distance;
            candidates
                .into_iter()
                .take_while(|c| c.distance <= nearest * (1.0 + FIRST_SHELL_TOLERANCE))
                .collect()
        }
    };

    Ok(NeighbourSphere { rule, neighbours })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Crystal, Defect, DefectKind, Lattice};
    use std::sync::Arc;

    /// 10 Å 立方胞，空位在原点，周围有不同距离的 Te 与 Cd
    fn vacancy_entry(charge: i32, oxidation_state: Option<i32>) -> DefectEntry {
        let lattice = Lattice::cubic(10.0);
        let atoms = vec![
            Atom::new("Te", [0.25, 0.0, 0.0]),
            Atom::new("Te", [0.0, 0.26, 0.0]),
            Atom::new("Te", [0.0, 0.0, 0.27]),
            Atom::new("Te", [0.0, 0.0, 0.73]),
            Atom::new("Cd", [0.5, 0.5, 0.5]),
        ];
        let structure = Crystal::new("v_Cd", lattice, atoms);
        let mut bulk = structure.clone();
        bulk.atoms.push(Atom::new("Cd", [0.0, 0.0, 0.0]));
        let defect = Defect {
            name: "v_Cd".to_string(),
            kind: DefectKind::Vacancy,
            element: "Cd".to_string(),
            site: [0.0, 0.0, 0.0],
            site_index: Some(5),
            original_element: None,
            bulk,
            structure,
            oxidation_state,
        };
        DefectEntry::new(Arc::new(defect), charge)
    }

    #[test]
    fn test_electron_rule() {
        assert_eq!(neighbours_for_electrons(0), 0);
        assert_eq!(neighbours_for_electrons(2), 2);
        assert_eq!(neighbours_for_electrons(-3), 3);
        assert_eq!(neighbours_for_electrons(4), 4);
        assert_eq!(neighbours_for_electrons(6), 2);
    }

    #[test]
    fn test_neutral_vacancy_distorts_two_neighbours() {
        let entry = vacancy_entry(0, Some(-2));
        let sphere = select_neighbours(&entry, &DistortionConfig::default()).unwrap();

        assert_eq!(sphere.rule, NeighbourRule::Electrons(2));
        assert_eq!(sphere.indices(), vec![0, 1]);
        // 每个邻居都在截断半径内
        assert!(sphere.neighbours.iter().all(|n| n.distance <= 5.0));
    }

    #[test]
    fn test_fully_ionised_vacancy_has_empty_sphere() {
        let entry = vacancy_entry(-2, Some(-2));
        let sphere = select_neighbours(&entry, &DistortionConfig::default()).unwrap();
        assert!(sphere.is_empty());
    }

    #[test]
    fn test_number_electrons_override() {
        let entry = vacancy_entry(0, Some(-2));
        let mut config = DistortionConfig::default();
        config.number_electrons.insert("v_Cd".to_string(), 3);
        let sphere = select_neighbours(&entry, &config).unwrap();
        assert_eq!(sphere.neighbours.len(), 3);
    }

    #[test]
    fn test_first_shell_without_oxidation_state() {
        let entry = vacancy_entry(0, None);
        let sphere = select_neighbours(&entry, &DistortionConfig::default()).unwrap();

        // 2.5, 2.6, 2.7, 2.7(0.73 → -0.27) Å 均在 2.75 Å 内
        assert_eq!(sphere.rule, NeighbourRule::FirstShell);
        assert_eq!(sphere.neighbours.len(), 4);
    }

    #[test]
    fn test_fixed_count_and_element_filter() {
        let entry = vacancy_entry(0, Some(-2));
        let config = DistortionConfig {
            num_nearest_neighbours: Some(1),
            distorted_elements: Some(vec!["Cd".to_string()]),
            nbr_cutoff: 9.0,
            ..Default::default()
        };
        let sphere = select_neighbours(&entry, &config).unwrap();
        assert_eq!(sphere.indices(), vec![4]);
    }

    #[test]
    fn test_empty_sphere_is_an_error() {
        let entry = vacancy_entry(0, Some(-2));
        let config = DistortionConfig {
            nbr_cutoff: 1.0,
            ..Default::default()
        };
        let err = select_neighbours(&entry, &config).unwrap_err();
        assert!(matches!(err, ShakeError::InsufficientNeighbours { .. }));
    }
}
