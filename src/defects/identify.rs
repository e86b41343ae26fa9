//! # 缺陷识别
//!
//! 比较缺陷超胞与体相超胞，确定缺陷类型、元素与位点。
//!
//! - 原子数差 −1 / 0 / +1 分别对应空位 / 替位 / 间隙
//! - 组分差给出被移除或新增的元素
//! - 自动匹配：每个候选位点的得分是它到另一个超胞中最近同种原子的最小镜像
//!   距离，得分最高者即缺陷位点；第二名与最高分相差不足 0.1 Å 时视为歧义
//! - 也可以显式给出索引或分数坐标（空位在体相坐标系，其余在缺陷超胞坐标系）
//!
//! ## 依赖关系
//! - 被 `commands/generate.rs` 使用
//! - 使用 `models/structure.rs`, `models/defect.rs`

use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShakeError};
use crate::models::{Crystal, Defect, DefectKind};

/// 第二候选位点与最佳得分之差小于该值时视为歧义 (Å)
pub const AMBIGUITY_MARGIN: f64 = 0.1;

/// 识别结果
#[derive(Debug, Clone)]
pub struct Identification {
    pub defect: Defect,
    pub diagnostics: Diagnostics,
}

/// 组分差：(缺陷中多出的元素, 缺陷中缺少的元素)
fn composition_difference(defect: &Crystal, bulk: &Crystal) -> (Vec<String>, Vec<String>) {
    let d = defect.composition();
    let b = bulk.composition();

    let mut elements: Vec<&String> = d.keys().chain(b.keys()).collect();
    elements.sort();
    elements.dedup();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    for el in elements {
        let nd = *d.get(el).unwrap_or(&0) as i64;
        let nb = *b.get(el).unwrap_or(&0) as i64;
        for _ in 0..(nd - nb).max(0) {
            added.push(el.clone());
        }
        for _ in 0..(nb - nd).max(0) {
            removed.push(el.clone());
        }
    }
    (added, removed)
}

/// 原子到另一个结构中最近同种原子的距离；没有同种原子时为无穷大
fn nearest_same_species(position: [f64; 3], element: &str, other: &Crystal) -> f64 {
    other
        .atoms
        .iter()
        .filter(|a| a.element == element)
        .map(|a| other.lattice.distance(position, a.position))
        .fold(f64::INFINITY, f64::min)
}

/// 距离给定坐标最近的原子索引
fn nearest_atom(crystal: &Crystal, position: [f64; 3]) -> Option<(usize, f64)> {
    crystal
        .atoms
        .iter()
        .enumerate()
        .map(|(i, a)| (i, crystal.lattice.distance(position, a.position)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// 在 `frame` 中挑选得分最高的 `element` 原子
fn best_matching_site(frame: &Crystal, element: &str, other: &Crystal) -> Result<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = frame
        .atoms
        .iter()
        .enumerate()
        .filter(|(_, a)| a.element == element)
        .map(|(i, a)| (i, nearest_same_species(a.position, element, other)))
        .collect();

    if scored.is_empty() {
        return Err(ShakeError::InvalidDefect(format!(
            "no {} atom to match in {}",
            element, frame.name
        )));
    }

    // 得分降序，相同得分按索引
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let (best_index, best) = scored[0];
    let close = scored
        .iter()
        .filter(|(_, s)| *s >= best - AMBIGUITY_MARGIN)
        .count();
    if close > 1 {
        return Err(ShakeError::AmbiguousSite {
            candidates: close,
            best,
        });
    }

    Ok((best_index, best))
}

fn single(elements: &[String], what: &str) -> Result<String> {
    match elements {
        [el] => Ok(el.clone()),
        _ => Err(ShakeError::InvalidDefect(format!(
            "expected exactly one {} species, found {:?}",
            what, elements
        ))),
    }
}

/// 识别缺陷
pub fn identify(
    defect_structure: &Crystal,
    bulk: &Crystal,
    index: Option<usize>,
    coords: Option<[f64; 3]>,
) -> Result<Identification> {
    let mut diagnostics = Diagnostics::new();
    let diff = defect_structure.num_atoms() as i64 - bulk.num_atoms() as i64;

    let kind = match diff {
        -1 => DefectKind::Vacancy,
        0 => DefectKind::Substitution,
        1 => DefectKind::Interstitial,
        _ => {
            return Err(ShakeError::InvalidDefect(format!(
                "defect supercell has {} atoms and bulk has {}; only single point defects \
                 (difference of -1, 0 or +1) are supported",
                defect_structure.num_atoms(),
                bulk.num_atoms()
            )))
        }
    };

    if !defect_structure.lattice.approx_eq(&bulk.lattice, 1e-2) {
        diagnostics.warn(
            &defect_structure.name,
            "defect and bulk lattices differ; site matching uses the bulk lattice",
        );
    }

    let (added, removed) = composition_difference(defect_structure, bulk);

    // 空位在体相坐标系中定位，其余在缺陷超胞中定位
    let frame = match kind {
        DefectKind::Vacancy => bulk,
        DefectKind::Substitution | DefectKind::Interstitial => defect_structure,
    };

    let (site_index, site) = match (index, coords) {
        (Some(i), _) => {
            let atom = frame.atoms.get(i).ok_or_else(|| {
                ShakeError::InvalidArgument(format!(
                    "defect index {} out of range ({} atoms in {})",
                    i,
                    frame.num_atoms(),
                    frame.name
                ))
            })?;
            (i, atom.position)
        }
        (None, Some(c)) => {
            let (i, d) = nearest_atom(frame, c).ok_or_else(|| {
                ShakeError::InvalidDefect(format!("{} has no atoms", frame.name))
            })?;
            if d > 0.5 {
                diagnostics.warn(
                    &defect_structure.name,
                    format!("nearest atom to the given coordinates is {:.2} Å away", d),
                );
            }
            match kind {
                DefectKind::Vacancy => (i, c),
                _ => (i, frame.atoms[i].position),
            }
        }
        (None, None) => {
            let (element, other) = match kind {
                DefectKind::Vacancy => (single(&removed, "removed")?, defect_structure),
                _ => (single(&added, "added")?, bulk),
            };
            let (i, score) = best_matching_site(frame, &element, other)?;
            diagnostics.info(
                &defect_structure.name,
                format!(
                    "auto-matched {} site {} (index {}, {:.2} Å from the nearest {} in the {})",
                    kind,
                    element,
                    i,
                    score,
                    element,
                    if kind == DefectKind::Vacancy { "defect cell" } else { "bulk" }
                ),
            );
            (i, frame.atoms[i].position)
        }
    };

    let element = frame.atoms[site_index].element.clone();
    if let (DefectKind::Vacancy, [expected]) = (kind, removed.as_slice()) {
        if *expected != element {
            diagnostics.warn(
                &defect_structure.name,
                format!("site {} holds {} but the composition lacks {}", site_index, element, expected),
            );
        }
    }

    let original_element = match kind {
        DefectKind::Substitution => {
            let (i, _) = nearest_atom(bulk, site).ok_or_else(|| {
                ShakeError::InvalidDefect(format!("{} has no atoms", bulk.name))
            })?;
            Some(bulk.atoms[i].element.clone())
        }
        _ => None,
    };

    if kind == DefectKind::Substitution && original_element.as_deref() == Some(element.as_str()) {
        return Err(ShakeError::InvalidDefect(format!(
            "site {} holds {} in both the defect and bulk supercells",
            site_index, element
        )));
    }

    let name = Defect::default_name(kind, &element, original_element.as_deref());
    let defect = Defect {
        name,
        kind,
        element,
        site,
        site_index: Some(site_index),
        original_element,
        bulk: bulk.clone(),
        structure: defect_structure.clone(),
        oxidation_state: None,
    };

    Ok(Identification {
        defect,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    fn rocksalt() -> Crystal {
        let atoms = vec![
            Atom::new("Na", [0.0, 0.0, 0.0]),
            Atom::new("Na", [0.5, 0.5, 0.0]),
            Atom::new("Na", [0.5, 0.0, 0.5]),
            Atom::new("Na", [0.0, 0.5, 0.5]),
            Atom::new("Cl", [0.5, 0.0, 0.0]),
            Atom::new("Cl", [0.0, 0.5, 0.0]),
            Atom::new("Cl", [0.0, 0.0, 0.5]),
            Atom::new("Cl", [0.5, 0.5, 0.5]),
        ];
        Crystal::new("NaCl", Lattice::cubic(5.64), atoms)
    }

    #[test]
    fn test_identify_vacancy() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms.remove(1);
        // 邻近原子轻微弛豫
        defect.atoms[3].position[0] += 0.01;

        let id = identify(&defect, &bulk, None, None).unwrap();
        assert_eq!(id.defect.kind, DefectKind::Vacancy);
        assert_eq!(id.defect.name, "v_Na");
        assert_eq!(id.defect.site_index, Some(1));
        assert_eq!(id.defect.site, [0.5, 0.5, 0.0]);
        assert!(!id.diagnostics.is_empty());
    }

    #[test]
    fn test_identify_substitution() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms[2].element = "K".to_string();

        let id = identify(&defect, &bulk, None, None).unwrap();
        assert_eq!(id.defect.kind, DefectKind::Substitution);
        assert_eq!(id.defect.name, "K_Na");
        assert_eq!(id.defect.site_index, Some(2));
        assert_eq!(id.defect.original_element.as_deref(), Some("Na"));
    }

    #[test]
    fn test_identify_antisite() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms[7].element = "Na".to_string();
        // Na 多 1，Cl 少 1
        let id = identify(&defect, &bulk, None, None).unwrap();
        assert_eq!(id.defect.name, "Na_Cl");
        assert_eq!(id.defect.site_index, Some(7));
    }

    #[test]
    fn test_identify_interstitial() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms.push(Atom::new("Na", [0.25, 0.25, 0.25]));

        let id = identify(&defect, &bulk, None, None).unwrap();
        assert_eq!(id.defect.kind, DefectKind::Interstitial);
        assert_eq!(id.defect.name, "Na_i");
        assert_eq!(id.defect.site_index, Some(8));
    }

    #[test]
    fn test_identify_explicit_coords_for_vacancy() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms.remove(1);

        let id = identify(&defect, &bulk, None, Some([0.5, 0.5, 0.01])).unwrap();
        assert_eq!(id.defect.site_index, Some(1));
        assert_eq!(id.defect.site, [0.5, 0.5, 0.01]);
    }

    #[test]
    fn test_identify_explicit_index_in_defect_frame() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms.push(Atom::new("Na", [0.25, 0.25, 0.25]));

        let id = identify(&defect, &bulk, Some(8), None).unwrap();
        assert_eq!(id.defect.site, [0.25, 0.25, 0.25]);
        assert!(identify(&defect, &bulk, Some(42), None).is_err());
    }

    #[test]
    fn test_ambiguous_site() {
        let lattice = Lattice::cubic(10.0);
        let bulk = Crystal::new(
            "bulk",
            lattice.clone(),
            vec![
                Atom::new("Na", [0.0, 0.0, 0.0]),
                Atom::new("Na", [0.5, 0.5, 0.5]),
            ],
        );
        // 剩下的 Na 位于两个体相位点的正中间
        let defect = Crystal::new(
            "defect",
            lattice,
            vec![Atom::new("Na", [0.25, 0.25, 0.25])],
        );

        let err = identify(&defect, &bulk, None, None).unwrap_err();
        assert!(matches!(err, ShakeError::AmbiguousSite { candidates: 2, .. }));
    }

    #[test]
    fn test_invalid_atom_count_difference() {
        let bulk = rocksalt();
        let mut defect = bulk.clone();
        defect.atoms.truncate(6);
        assert!(matches!(
            identify(&defect, &bulk, None, None).unwrap_err(),
            ShakeError::InvalidDefect(_)
        ));
    }
}
