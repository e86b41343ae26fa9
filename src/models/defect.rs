//! # 点缺陷数据模型
//!
//! 缺陷类型是封闭的枚举（空位 / 替位 / 间隙），通过 `DefectCapabilities`
//! 提供与类型相关的能力：邻居搜索、电荷态边界、是否生成二聚体畸变。
//! 类型在识别阶段确定一次，之后所有阶段共享同一个不可变的 `Defect`。
//!
//! ## 依赖关系
//! - 被 `defects/`, `distortions/`, `commands/` 使用
//! - 使用 `models/structure.rs`

use crate::models::structure::Crystal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 缺陷类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefectKind {
    Vacancy,
    Substitution,
    Interstitial,
}

impl std::fmt::Display for DefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefectKind::Vacancy => write!(f, "Vacancy"),
            DefectKind::Substitution => write!(f, "Substitution"),
            DefectKind::Interstitial => write!(f, "Interstitial"),
        }
    }
}

/// 缺陷位点附近的一个原子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    /// 在缺陷超胞中的原子索引
    pub index: usize,
    pub element: String,
    /// 到缺陷位点的最小镜像距离 (Å)
    pub distance: f64,
}

/// 与缺陷类型相关的能力接口
pub trait DefectCapabilities {
    /// 按距离升序返回 `cutoff` 内的邻居，可按元素过滤；缺陷原子本身不计入
    fn find_neighbours(
        &self,
        defect: &Defect,
        cutoff: f64,
        elements: Option<&[String]>,
    ) -> Vec<Neighbour>;

    /// 由形式氧化态给出的电荷态范围 `[min(0, q) - padding, max(0, q) + padding]`
    fn charge_state_bounds(&self, oxidation_state: i32, padding: u32) -> (i32, i32);

    /// 是否生成 `Dimer` 试探结构
    fn supports_dimer(&self) -> bool;

    /// 电荷态 `charge` 下相对完全电离时的额外电子数 `-q_ox + charge`
    fn electron_count(&self, oxidation_state: i32, charge: i32) -> i32;
}

impl DefectCapabilities for DefectKind {
    fn find_neighbours(
        &self,
        defect: &Defect,
        cutoff: f64,
        elements: Option<&[String]>,
    ) -> Vec<Neighbour> {
        let excluded = match self {
            // 空位位点上没有原子
            DefectKind::Vacancy => None,
            DefectKind::Substitution | DefectKind::Interstitial => defect.site_index,
        };

        let structure = &defect.structure;
        let mut neighbours: Vec<Neighbour> = structure
            .atoms
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != excluded)
            .filter(|(_, atom)| {
                elements.map_or(true, |els| els.iter().any(|e| e == &atom.element))
            })
            .map(|(i, atom)| Neighbour {
                index: i,
                element: atom.element.clone(),
                distance: structure.lattice.distance(defect.site, atom.position),
            })
            .filter(|n| n.distance <= cutoff && n.distance > 1e-8)
            .collect();

        neighbours.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        neighbours
    }

    fn charge_state_bounds(&self, oxidation_state: i32, padding: u32) -> (i32, i32) {
        let padding = padding as i32;
        match self {
            DefectKind::Vacancy | DefectKind::Substitution | DefectKind::Interstitial => (
                oxidation_state.min(0) - padding,
                oxidation_state.max(0) + padding,
            ),
        }
    }

    fn supports_dimer(&self) -> bool {
        matches!(self, DefectKind::Vacancy)
    }

    fn electron_count(&self, oxidation_state: i32, charge: i32) -> i32 {
        match self {
            DefectKind::Vacancy | DefectKind::Substitution | DefectKind::Interstitial => {
                charge - oxidation_state
            }
        }
    }
}

/// 已识别的点缺陷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defect {
    /// 缺陷名称（如 `v_Cd`, `In_Cd`, `Cd_i`）
    pub name: String,

    pub kind: DefectKind,

    /// 缺陷位点元素（空位为被移除的元素）
    pub element: String,

    /// 位点分数坐标：空位在体相坐标系，其余在缺陷超胞坐标系
    pub site: [f64; 3],

    /// 位点索引：空位为体相中的索引，其余为缺陷超胞中的索引
    pub site_index: Option<usize>,

    /// 替位缺陷被替换的体相元素
    pub original_element: Option<String>,

    /// 体相超胞
    pub bulk: Crystal,

    /// 缺陷超胞
    pub structure: Crystal,

    /// 形式氧化态（未估计时为 None）
    pub oxidation_state: Option<i32>,
}

impl Defect {
    /// 按类型生成默认名称
    pub fn default_name(kind: DefectKind, element: &str, original: Option<&str>) -> String {
        match kind {
            DefectKind::Vacancy => format!("v_{}", element),
            DefectKind::Substitution => format!("{}_{}", element, original.unwrap_or("X")),
            DefectKind::Interstitial => format!("{}_i", element),
        }
    }

    /// 覆盖缺陷名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 位点描述，用于日志
    pub fn site_description(&self) -> String {
        format!(
            "{} at [{:.3}, {:.3}, {:.3}]",
            self.element, self.site[0], self.site[1], self.site[2]
        )
    }
}

/// 某一电荷态下的缺陷
#[derive(Debug, Clone)]
pub struct DefectEntry {
    pub defect: Arc<Defect>,
    pub charge: i32,
    /// `{defect_name}_{charge}`，如 `v_Cd_-1`
    pub name: String,
}

impl DefectEntry {
    pub fn new(defect: Arc<Defect>, charge: i32) -> Self {
        let name = entry_name(&defect.name, charge);
        DefectEntry {
            defect,
            charge,
            name,
        }
    }
}

/// 电荷态格式化：正电荷带 `+` 号
pub fn format_charge(charge: i32) -> String {
    if charge > 0 {
        format!("+{}", charge)
    } else {
        charge.to_string()
    }
}

/// 缺陷目录名 `{defect_name}_{charge}`
pub fn entry_name(defect_name: &str, charge: i32) -> String {
    format!("{}_{}", defect_name, format_charge(charge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::structure::{Atom, Lattice};

    fn interstitial_defect() -> Defect {
        let lattice = Lattice::cubic(10.0);
        let atoms = vec![
            Atom::new("Cd", [0.0, 0.0, 0.0]),
            Atom::new("Te", [0.25, 0.0, 0.0]),
            Atom::new("Te", [0.0, 0.3, 0.0]),
            Atom::new("Cd", [0.5, 0.5, 0.5]),
        ];
        let structure = Crystal::new("Cd_i", lattice, atoms);
        let bulk = structure.clone();
        Defect {
            name: "Cd_i".to_string(),
            kind: DefectKind::Interstitial,
            element: "Cd".to_string(),
            site: [0.0, 0.0, 0.0],
            site_index: Some(0),
            original_element: None,
            bulk,
            structure,
            oxidation_state: Some(2),
        }
    }

    #[test]
    fn test_format_charge() {
        assert_eq!(format_charge(0), "0");
        assert_eq!(format_charge(2), "+2");
        assert_eq!(format_charge(-1), "-1");
        assert_eq!(entry_name("v_Cd", -2), "v_Cd_-2");
    }

    #[test]
    fn test_find_neighbours_excludes_defect_atom() {
        let defect = interstitial_defect();
        let neighbours = defect.kind.find_neighbours(&defect, 4.0, None);

        let indices: Vec<usize> = neighbours.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!((neighbours[0].distance - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_find_neighbours_filters_elements() {
        let defect = interstitial_defect();
        let only_cd = vec!["Cd".to_string()];
        let neighbours = defect.kind.find_neighbours(&defect, 20.0, Some(&only_cd));

        assert_eq!(neighbours.len(), 1);
        assert_eq!(neighbours[0].index, 3);
    }

    #[test]
    fn test_charge_state_bounds() {
        assert_eq!(DefectKind::Vacancy.charge_state_bounds(-2, 1), (-3, 1));
        assert_eq!(DefectKind::Interstitial.charge_state_bounds(2, 1), (-1, 3));
        assert_eq!(DefectKind::Substitution.charge_state_bounds(0, 0), (0, 0));
    }

    #[test]
    fn test_only_vacancies_support_dimers() {
        assert!(DefectKind::Vacancy.supports_dimer());
        assert!(!DefectKind::Substitution.supports_dimer());
        assert!(!DefectKind::Interstitial.supports_dimer());
    }

    #[test]
    fn test_electron_count() {
        // V_Cd^0: 两个额外电子；V_Cd^-2 完全电离
        assert_eq!(DefectKind::Vacancy.electron_count(-2, 0), 2);
        assert_eq!(DefectKind::Vacancy.electron_count(-2, -2), 0);
        assert_eq!(DefectKind::Interstitial.electron_count(2, 0), -2);
    }
}
