//! # 结构匹配
//!
//! 判断两个结构在数值容差内是否几何等价，考虑原子重排与周期性。
//!
//! 算法：
//! 1. 晶格（相对容差 1e-3）与元素多重集必须相同
//! 2. 遍历晶格自同构 W 与“最稀有元素的一个原子映射到同种原子”的平移
//! 3. 每种元素内按原子顺序贪心地匹配最近的未用原子，取最大位移
//! 4. 度量 = 最大位移 / (V/N)^(1/3)
//!
//! 度量 < 0.8·stol 为等价；落在 stol ±20% 内为临界（按不等价处理并警告）。
//!
//! ## 依赖关系
//! - 被 `analysis/compare.rs`, `analysis/consolidate.rs` 使用
//! - 使用 `models/structure.rs`

use crate::models::structure::apply_int_matrix;
use crate::models::{Crystal, Lattice};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 晶格比较的相对容差
pub const LATTICE_TOLERANCE: f64 = 1e-3;

/// 等价阈值相对 stol 的比例
const EQUIVALENT_FRACTION: f64 = 0.8;

/// 临界区上限相对 stol 的比例
const BORDERLINE_FRACTION: f64 = 1.2;

/// 匹配结论
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    Equivalent { metric: f64 },
    /// 接近容差边界，按不等价处理
    Borderline { metric: f64 },
    /// 晶格或组成不同时没有度量
    Distinct { metric: Option<f64> },
}

impl MatchOutcome {
    pub fn is_equivalent(&self) -> bool {
        matches!(self, MatchOutcome::Equivalent { .. })
    }

    pub fn metric(&self) -> Option<f64> {
        match *self {
            MatchOutcome::Equivalent { metric } | MatchOutcome::Borderline { metric } => {
                Some(metric)
            }
            MatchOutcome::Distinct { metric } => metric,
        }
    }
}

type IntMatrix = [[i32; 3]; 3];

/// 结构匹配器
///
/// 同一缺陷的所有结构共用一个晶格，自同构按晶格缓存，多次比较只枚举一次。
#[derive(Debug)]
pub struct StructureMatcher {
    /// 位置容差，以 (V/N)^(1/3) 为单位
    pub stol: f64,
    pub lattice_tol: f64,
    automorphisms: Mutex<Vec<(Lattice, Arc<Vec<IntMatrix>>)>>,
}

impl Clone for StructureMatcher {
    fn clone(&self) -> Self {
        StructureMatcher {
            stol: self.stol,
            lattice_tol: self.lattice_tol,
            automorphisms: Mutex::new(Vec::new()),
        }
    }
}

impl Default for StructureMatcher {
    fn default() -> Self {
        StructureMatcher::new(0.1)
    }
}

impl StructureMatcher {
    pub fn new(stol: f64) -> Self {
        StructureMatcher {
            stol,
            lattice_tol: LATTICE_TOLERANCE,
            automorphisms: Mutex::new(Vec::new()),
        }
    }

    /// 晶格自同构，按晶格缓存
    fn cached_automorphisms(&self, lattice: &Lattice) -> Arc<Vec<IntMatrix>> {
        {
            let cache = self.automorphisms.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((_, ops)) = cache
                .iter()
                .find(|(l, _)| l.approx_eq(lattice, self.lattice_tol))
            {
                return Arc::clone(ops);
            }
        }

        let ops = Arc::new(lattice.automorphisms(self.lattice_tol));
        let mut cache = self.automorphisms.lock().unwrap_or_else(|e| e.into_inner());
        cache.push((lattice.clone(), Arc::clone(&ops)));
        ops
    }

    /// 比较两个结构
    pub fn compare(&self, a: &Crystal, b: &Crystal) -> MatchOutcome {
        if a.num_atoms() != b.num_atoms()
            || a.composition() != b.composition()
            || !a.lattice.approx_eq(&b.lattice, self.lattice_tol)
        {
            return MatchOutcome::Distinct { metric: None };
        }

        let scale = match a.volume_per_atom() {
            Some(v) => v.cbrt(),
            None => return MatchOutcome::Equivalent { metric: 0.0 },
        };
        let cutoff = BORDERLINE_FRACTION * self.stol * scale;

        let max_disp = match self.best_max_displacement(a, b, cutoff) {
            Some(d) => d,
            None => return MatchOutcome::Distinct { metric: None },
        };

        let metric = max_disp / scale;
        if metric < EQUIVALENT_FRACTION * self.stol {
            MatchOutcome::Equivalent { metric }
        } else if metric <= BORDERLINE_FRACTION * self.stol {
            MatchOutcome::Borderline { metric }
        } else {
            MatchOutcome::Distinct {
                metric: Some(metric),
            }
        }
    }

    /// 所有对称操作与平移中最小的“最大位移”；全部超过 `cutoff` 时返回 None
    fn best_max_displacement(&self, a: &Crystal, b: &Crystal, cutoff: f64) -> Option<f64> {
        let lattice = &a.lattice;
        let b_by_species = species_indices(b);
        let anchor_species = a
            .composition()
            .into_iter()
            .min_by(|x, y| x.1.cmp(&y.1).then_with(|| x.0.cmp(&y.0)))
            .map(|(element, _)| element)?;
        let anchor = a.atoms.iter().position(|atom| atom.element == anchor_species)?;
        let targets = b_by_species.get(anchor_species.as_str())?;

        let mut best: Option<f64> = None;
        for w in self.cached_automorphisms(lattice).iter() {
            let rotated: Vec<[f64; 3]> = a
                .atoms
                .iter()
                .map(|atom| apply_int_matrix(atom.position, w))
                .collect();

            for &t in targets {
                let target = b.atoms[t].position;
                let shift = [
                    target[0] - rotated[anchor][0],
                    target[1] - rotated[anchor][1],
                    target[2] - rotated[anchor][2],
                ];
                let bound = best.map_or(cutoff, |b| b.min(cutoff));

                if let Some(d) = assign_max(a, b, &rotated, shift, &b_by_species, bound) {
                    best = Some(best.map_or(d, |b| b.min(d)));
                    if d < 1e-8 {
                        return best;
                    }
                }
            }
        }
        best
    }
}

/// 按元素分组的原子索引
fn species_indices(crystal: &Crystal) -> BTreeMap<&str, Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, atom) in crystal.atoms.iter().enumerate() {
        groups.entry(atom.element.as_str()).or_default().push(i);
    }
    groups
}

/// 给定变换后的贪心匹配；最大位移超过 `bound` 时提前放弃
fn assign_max(
    a: &Crystal,
    b: &Crystal,
    rotated: &[[f64; 3]],
    shift: [f64; 3],
    b_by_species: &BTreeMap<&str, Vec<usize>>,
    bound: f64,
) -> Option<f64> {
    let lattice = &a.lattice;
    let mut used = vec![false; b.num_atoms()];
    let mut max = 0.0_f64;

    for (i, atom) in a.atoms.iter().enumerate() {
        let p = [
            rotated[i][0] + shift[0],
            rotated[i][1] + shift[1],
            rotated[i][2] + shift[2],
        ];
        let candidates = b_by_species.get(atom.element.as_str())?;

        let (j, d) = candidates
            .iter()
            .filter(|&&j| !used[j])
            .map(|&j| (j, lattice.distance(p, b.atoms[j].position)))
            .min_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(std::cmp::Ordering::Equal))?;

        if d > bound {
            return None;
        }
        used[j] = true;
        max = max.max(d);
    }
    Some(max)
}

/// 逐元素全局贪心匹配：所有同种原子对按距离升序，依次配对未用原子
///
/// 返回 `(a 中索引, b 中索引, 距离)`，按 a 的索引排序。
pub fn match_atoms(a: &Crystal, b: &Crystal) -> Vec<(usize, usize, f64)> {
    let lattice = &a.lattice;
    let b_by_species = species_indices(b);
    let mut matched = Vec::with_capacity(a.num_atoms());

    for (element, a_indices) in species_indices(a) {
        let b_indices = match b_by_species.get(element) {
            Some(list) => list,
            None => continue,
        };

        let mut pairs: Vec<(usize, usize, f64)> = a_indices
            .iter()
            .flat_map(|&i| {
                b_indices
                    .iter()
                    .map(move |&j| (i, j, lattice.distance(a.atoms[i].position, b.atoms[j].position)))
            })
            .collect();
        pairs.sort_by(|x, y| {
            x.2.partial_cmp(&y.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.0.cmp(&y.0))
                .then(x.1.cmp(&y.1))
        });

        let mut a_used = vec![false; a.num_atoms()];
        let mut b_used = vec![false; b.num_atoms()];
        for (i, j, d) in pairs {
            if !a_used[i] && !b_used[j] {
                a_used[i] = true;
                b_used[j] = true;
                matched.push((i, j, d));
            }
        }
    }

    matched.sort_by_key(|m| m.0);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    /// 8 原子的 NaCl 惯用胞，Na 在 0 号位置略有位移
    fn rocksalt(shift: f64) -> Crystal {
        let mut atoms = Vec::new();
        for (x, y, z) in [(0.0, 0.0, 0.0), (0.5, 0.5, 0.0), (0.5, 0.0, 0.5), (0.0, 0.5, 0.5)] {
            atoms.push(Atom::new("Na", [x, y, z]));
        }
        for (x, y, z) in [(0.5, 0.0, 0.0), (0.0, 0.5, 0.0), (0.0, 0.0, 0.5), (0.5, 0.5, 0.5)] {
            atoms.push(Atom::new("Cl", [x, y, z]));
        }
        atoms[0].position[0] += shift;
        Crystal::new("NaCl", Lattice::cubic(5.6), atoms)
    }

    #[test]
    fn test_identical_structures_match() {
        let matcher = StructureMatcher::new(0.1);
        let outcome = matcher.compare(&rocksalt(0.0), &rocksalt(0.0));
        assert!(outcome.is_equivalent());
        assert!(outcome.metric().unwrap() < 1e-8);
    }

    #[test]
    fn test_permuted_and_translated_structures_match() {
        let matcher = StructureMatcher::new(0.1);
        let a = rocksalt(0.01);
        let mut b = a.clone();
        b.atoms.reverse();
        for atom in &mut b.atoms {
            atom.position[1] += 0.5;
        }
        assert!(matcher.compare(&a, &b).is_equivalent());
    }

    #[test]
    fn test_symmetry_equivalent_distortions_match() {
        // 沿 +x 与 -x 的同幅位移由镜面操作联系
        let matcher = StructureMatcher::new(0.1);
        let outcome = matcher.compare(&rocksalt(0.03), &rocksalt(-0.03));
        assert!(outcome.is_equivalent());
    }

    #[test]
    fn test_borderline_and_distinct() {
        let matcher = StructureMatcher::new(0.1);
        // (V/N)^(1/3) = 2.8 Å；位移 0.3 Å → 度量约 0.107
        let borderline = matcher.compare(&rocksalt(0.0), &rocksalt(0.3 / 5.6));
        assert!(matches!(borderline, MatchOutcome::Borderline { .. }));

        let distinct = matcher.compare(&rocksalt(0.0), &rocksalt(0.1));
        assert!(matches!(distinct, MatchOutcome::Distinct { .. }));
        assert!(!distinct.is_equivalent());
    }

    #[test]
    fn test_automorphisms_computed_once_per_lattice() {
        let matcher = StructureMatcher::new(0.1);
        assert!(matcher.compare(&rocksalt(0.0), &rocksalt(0.01)).is_equivalent());
        assert!(matcher.compare(&rocksalt(0.02), &rocksalt(-0.02)).is_equivalent());

        let first = matcher.cached_automorphisms(&Lattice::cubic(5.6));
        let second = matcher.cached_automorphisms(&Lattice::cubic(5.6));
        assert!(Arc::ptr_eq(&first, &second));
        // 立方晶格的 48 个点群操作
        assert_eq!(first.len(), 48);
        assert_eq!(matcher.automorphisms.lock().unwrap().len(), 1);

        let other = matcher.cached_automorphisms(&Lattice::cubic(6.0));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(matcher.automorphisms.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_different_composition_is_distinct() {
        let matcher = StructureMatcher::new(0.1);
        let mut b = rocksalt(0.0);
        b.atoms[0].element = "K".to_string();
        assert_eq!(
            matcher.compare(&rocksalt(0.0), &b),
            MatchOutcome::Distinct { metric: None }
        );
    }

    #[test]
    fn test_match_atoms_handles_permutation() {
        let a = rocksalt(0.02);
        let mut b = a.clone();
        b.atoms.swap(1, 3);
        let matched = match_atoms(&a, &b);

        assert_eq!(matched.len(), 8);
        assert_eq!(matched[1].1, 3);
        assert_eq!(matched[3].1, 1);
        assert!(matched.iter().all(|m| m.2 < 1e-9));
    }
}
