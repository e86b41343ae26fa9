//! # 形式氧化态估计
//!
//! 缺陷的形式氧化态用于推算默认电荷态范围与畸变邻居数。
//! 内置估计器使用常见氧化态表，并允许按元素覆盖。
//!
//! ## 依赖关系
//! - 被 `defects/charges.rs`, `distortions/neighbours.rs`, `commands/generate.rs` 使用
//! - 使用 `models/defect.rs`

use crate::models::DefectKind;
use std::collections::BTreeMap;

/// 常见氧化态（每个元素取最常见的一个值）
const COMMON_OXIDATION_STATES: &[(&str, i32)] = &[
    ("H", 1), ("Li", 1), ("Na", 1), ("K", 1), ("Rb", 1), ("Cs", 1), ("Ag", 1), ("Cu", 2),
    ("Au", 1), ("Tl", 1),
    ("Be", 2), ("Mg", 2), ("Ca", 2), ("Sr", 2), ("Ba", 2), ("Zn", 2), ("Cd", 2), ("Hg", 2),
    ("Mn", 2), ("Co", 2), ("Ni", 2), ("Pb", 2), ("Pd", 2), ("Eu", 2),
    ("B", 3), ("Al", 3), ("Ga", 3), ("In", 3), ("Sc", 3), ("Y", 3), ("La", 3), ("Fe", 3),
    ("Cr", 3), ("Bi", 3), ("Ce", 3), ("Gd", 3),
    ("C", 4), ("Si", 4), ("Ge", 4), ("Sn", 4), ("Ti", 4), ("Zr", 4), ("Hf", 4),
    ("V", 5), ("Nb", 5), ("Ta", 5),
    ("Mo", 6), ("W", 6),
    ("N", -3), ("P", -3), ("As", -3), ("Sb", -3),
    ("O", -2), ("S", -2), ("Se", -2), ("Te", -2),
    ("F", -1), ("Cl", -1), ("Br", -1), ("I", -1),
];

/// 氧化态估计接口
pub trait OxidationEstimator {
    /// 单个元素的氧化态；未知时返回 None
    fn element_oxidation_state(&self, element: &str) -> Option<i32>;

    /// 缺陷的形式氧化态
    ///
    /// 空位 −ox(X)，替位 ox(A) − ox(B)，间隙 ox(X)
    fn defect_oxidation_state(
        &self,
        kind: DefectKind,
        element: &str,
        original_element: Option<&str>,
    ) -> Option<i32> {
        let ox = self.element_oxidation_state(element)?;
        match kind {
            DefectKind::Vacancy => Some(-ox),
            DefectKind::Interstitial => Some(ox),
            DefectKind::Substitution => {
                let host = self.element_oxidation_state(original_element?)?;
                Some(ox - host)
            }
        }
    }
}

/// 基于常见氧化态表的估计器
#[derive(Debug, Clone, Default)]
pub struct CommonOxidationStates {
    overrides: BTreeMap<String, i32>,
}

impl CommonOxidationStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用户指定的氧化态优先于内置表
    pub fn with_overrides(overrides: BTreeMap<String, i32>) -> Self {
        CommonOxidationStates { overrides }
    }
}

impl OxidationEstimator for CommonOxidationStates {
    fn element_oxidation_state(&self, element: &str) -> Option<i32> {
        if let Some(&ox) = self.overrides.get(element) {
            return Some(ox);
        }
        COMMON_OXIDATION_STATES
            .iter()
            .find(|(symbol, _)| *symbol == element)
            .map(|(_, ox)| *ox)
    }
}
