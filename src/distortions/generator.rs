//! # 畸变生成器
//!
//! 对一个缺陷条目（缺陷 + 电荷态）生成一族试探结构：
//! - `Unperturbed`：原始结构（不扰动）
//! - `Bond_Distortion_{p}%`：畸变球内邻居的键畸变，再叠加随机扰动
//! - `Dimer`：空位的两个最近邻拉成二聚体，再叠加随机扰动
//! - `Rattled`：只做随机扰动
//!
//! 每个试探结构的随机种子为 `seed` 加上由标签决定的偏移，
//! 因此结果与生成顺序、线程调度无关。
//!
//! ## 依赖关系
//! - 被 `commands/generate.rs`, `tests/workflow.rs` 使用
//! - 使用 `distortions/{config, neighbours, bond, rattle}.rs`

use crate::diagnostics::Diagnostics;
use crate::distortions::bond::{apply_bond_distortion, apply_dimer};
use crate::distortions::config::DistortionConfig;
use crate::distortions::neighbours::{
    candidate_neighbours, select_neighbours, NeighbourRule, NeighbourSphere,
};
use crate::distortions::rattle::{rattle, RattleSettings};
use crate::error::{Result, ShakeError};
use crate::models::{
    Crystal, DefectCapabilities, DefectEntry, DefectKind, DistortionKind, DistortionLabel,
    DistortionSpec, RattleParams, TrialStructure,
};

use std::collections::BTreeMap;

/// 一个缺陷条目的生成结果
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub entry_name: String,
    pub charge: i32,
    pub sphere: NeighbourSphere,
    /// 按规范标签顺序排列
    pub trials: Vec<TrialStructure>,
    /// 每个标签下未被随机扰动的原子
    pub unperturbed_atoms: BTreeMap<DistortionLabel, Vec<usize>>,
    pub diagnostics: Diagnostics,
}

impl GenerationResult {
    pub fn labels(&self) -> Vec<DistortionLabel> {
        self.trials.iter().map(|t| t.spec.label.clone()).collect()
    }

    pub fn trial(&self, label: &DistortionLabel) -> Option<&TrialStructure> {
        self.trials.iter().find(|t| &t.spec.label == label)
    }
}

/// 每个标签的随机种子偏移
fn trial_seed(base: u64, label: &DistortionLabel) -> u64 {
    let offset = match label {
        DistortionLabel::Rattled => 0,
        DistortionLabel::Dimer => 1,
        DistortionLabel::BondDistortion(permille) => 2 + (*permille + 1000).max(0) as u64,
        DistortionLabel::Unperturbed | DistortionLabel::Propagated { .. } => 0,
    };
    base.wrapping_add(offset)
}

/// 畸变生成器
#[derive(Debug, Clone)]
pub struct DistortionGenerator {
    config: DistortionConfig,
}

/// 单个条目生成时共享的上下文
struct EntryContext<'a> {
    entry: &'a DefectEntry,
    stdev: f64,
    d_min: f64,
    /// 缺陷原子本身（空位没有）
    defect_atom: Option<usize>,
}

impl DistortionGenerator {
    pub fn new(config: DistortionConfig) -> Result<Self> {
        config.validate()?;
        Ok(DistortionGenerator { config })
    }

    pub fn config(&self) -> &DistortionConfig {
        &self.config
    }

    /// 为一个缺陷条目生成全部试探结构
    pub fn generate(&self, entry: &DefectEntry) -> Result<GenerationResult> {
        let defect = &entry.defect;
        let mut diagnostics = Diagnostics::new();

        let bond_length = defect
            .bulk
            .bond_length()
            .or_else(|| defect.structure.bond_length());
        let (stdev, d_min) = match (self.config.stdev, self.config.d_min, bond_length) {
            (Some(s), Some(d), _) => (s, d),
            (_, _, Some(b)) => (self.config.stdev_for(b), self.config.d_min_for(b)),
            _ => {
                return Err(ShakeError::InvalidConfig(format!(
                    "{}: cannot estimate the bulk bond length; set stdev and d_min explicitly",
                    entry.name
                )))
            }
        };

        let ctx = EntryContext {
            entry,
            stdev,
            d_min,
            defect_atom: match defect.kind {
                DefectKind::Vacancy => None,
                DefectKind::Substitution | DefectKind::Interstitial => defect.site_index,
            },
        };

        let sphere = select_neighbours(entry, &self.config)?;
        log::debug!(
            "{}: distorting {} neighbours {:?}",
            entry.name,
            sphere.neighbours.len(),
            sphere.indices()
        );

        let mut trials = Vec::new();
        let mut unperturbed_atoms = BTreeMap::new();

        if sphere.is_empty() {
            let reason = match sphere.rule {
                NeighbourRule::Electrons(_) => "no extra electrons to localise",
                _ => "zero neighbours requested",
            };
            diagnostics.info(
                &entry.name,
                format!("{}; only Unperturbed and Rattled trials are generated", reason),
            );
        } else {
            let excluded = sphere.indices();
            for fraction in self.config.bond_distortion_fractions() {
                let label = DistortionLabel::bond(fraction);
                let distorted =
                    apply_bond_distortion(&defect.structure, defect.site, &sphere.neighbours, fraction);
                let (structure, rattle_params, untouched) =
                    self.rattle_trial(&ctx, &distorted, &label, &excluded, &mut diagnostics);

                let kind = match rattle_params {
                    Some(rattle) => DistortionKind::Combined { fraction, rattle },
                    None => DistortionKind::BondDistortion { fraction },
                };
                unperturbed_atoms.insert(label.clone(), untouched);
                trials.push(self.trial(entry, label, kind, structure));
            }
        }

        if self.config.dimer && defect.kind.supports_dimer() {
            let candidates = candidate_neighbours(entry, &self.config);
            if candidates.len() >= 2 {
                let pair = [candidates[0].index, candidates[1].index];
                let dimer = apply_dimer(
                    &defect.structure,
                    pair[0],
                    pair[1],
                    self.config.dimer_bond_length,
                );
                let label = DistortionLabel::Dimer;
                let (structure, rattle, untouched) =
                    self.rattle_trial(&ctx, &dimer, &label, &pair, &mut diagnostics);
                let kind = DistortionKind::Dimer {
                    bond_length: self.config.dimer_bond_length,
                    rattle,
                };
                unperturbed_atoms.insert(label.clone(), untouched);
                trials.push(self.trial(entry, label, kind, structure));
            } else {
                diagnostics.warn(
                    &entry.name,
                    "fewer than two neighbours within nbr_cutoff; Dimer trial skipped",
                );
            }
        }

        if stdev > 0.0 {
            let label = DistortionLabel::Rattled;
            let base = defect.structure.wrapped();
            let (structure, rattle, untouched) =
                self.rattle_trial(&ctx, &base, &label, &[], &mut diagnostics);
            if let Some(params) = rattle {
                unperturbed_atoms.insert(label.clone(), untouched);
                trials.push(self.trial(entry, label, DistortionKind::Rattle(params), structure));
            }
        } else {
            diagnostics.info(&entry.name, "stdev = 0; rattling disabled, Rattled trial skipped");
        }

        let all: Vec<usize> = (0..defect.structure.num_atoms()).collect();
        unperturbed_atoms.insert(DistortionLabel::Unperturbed, all);
        trials.push(self.trial(
            entry,
            DistortionLabel::Unperturbed,
            DistortionKind::Unperturbed,
            defect.structure.wrapped(),
        ));

        trials.sort_by(|a, b| a.spec.label.cmp(&b.spec.label));

        Ok(GenerationResult {
            entry_name: entry.name.clone(),
            charge: entry.charge,
            sphere,
            trials,
            unperturbed_atoms,
            diagnostics,
        })
    }

    fn trial(
        &self,
        entry: &DefectEntry,
        label: DistortionLabel,
        kind: DistortionKind,
        mut structure: Crystal,
    ) -> TrialStructure {
        structure.name = format!("{} {}", entry.name, label);
        TrialStructure {
            entry_name: entry.name.clone(),
            charge: entry.charge,
            spec: DistortionSpec { label, kind },
            structure,
        }
    }

    /// 参与随机扰动的原子
    fn active_atoms(&self, ctx: &EntryContext<'_>, excluded: &[usize]) -> Vec<usize> {
        let structure = &ctx.entry.defect.structure;
        let n = structure.num_atoms();

        if let Some(active) = &self.config.active_atoms {
            return active.iter().copied().filter(|&i| i < n).collect();
        }

        let site = ctx.entry.defect.site;
        (0..n)
            .filter(|&i| Some(i) != ctx.defect_atom && !excluded.contains(&i))
            .filter(|&i| {
                !self.config.local_rattle
                    || structure.lattice.distance(site, structure.atoms[i].position)
                        <= self.config.nbr_cutoff
            })
            .collect()
    }

    /// 对已畸变的结构做随机扰动；返回结构、扰动参数与未被扰动的原子
    fn rattle_trial(
        &self,
        ctx: &EntryContext<'_>,
        base: &Crystal,
        label: &DistortionLabel,
        excluded: &[usize],
        diagnostics: &mut Diagnostics,
    ) -> (Crystal, Option<RattleParams>, Vec<usize>) {
        let n = base.num_atoms();
        if ctx.stdev <= 0.0 {
            return (base.wrapped(), None, (0..n).collect());
        }

        let active = self.active_atoms(ctx, excluded);
        let settings = RattleSettings {
            stdev: ctx.stdev,
            d_min: ctx.d_min,
            max_disp: self.config.max_disp,
            max_attempts: self.config.max_attempts,
            decay_factor: self.config.decay_factor,
            decay_rounds: self.config.decay_rounds,
            seed: trial_seed(self.config.seed, label),
        };
        let outcome = rattle(base, &active, &settings);

        if !outcome.stuck.is_empty() {
            diagnostics.warn(
                &ctx.entry.name,
                format!(
                    "{}: {} atoms could not satisfy d_min = {:.3} Å and were left in place {:?}",
                    label,
                    outcome.stuck.len(),
                    ctx.d_min,
                    outcome.stuck
                ),
            );
        }

        let mut untouched: Vec<usize> = (0..n)
            .filter(|i| !active.contains(i) || outcome.stuck.contains(i))
            .collect();
        untouched.sort_unstable();

        let params = RattleParams {
            seed: settings.seed,
            stdev: ctx.stdev,
        };
        (outcome.structure, Some(params), untouched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Defect, Lattice};
    use std::sync::Arc;

    /// 简单立方 5×5×5 超胞（a = 2.0 Å）去掉原点原子
    fn vacancy_entry(charge: i32) -> DefectEntry {
        let mut atoms = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    atoms.push(Atom::new(
                        "Po",
                        [i as f64 / 5.0, j as f64 / 5.0, k as f64 / 5.0],
                    ));
                }
            }
        }
        let bulk = Crystal::new("bulk", Lattice::cubic(10.0), atoms);
        let mut structure = bulk.clone();
        structure.atoms.remove(0);
        structure.name = "v_Po".to_string();

        let defect = Defect {
            name: "v_Po".to_string(),
            kind: DefectKind::Vacancy,
            element: "Po".to_string(),
            site: [0.0, 0.0, 0.0],
            site_index: Some(0),
            original_element: None,
            bulk,
            structure,
            oxidation_state: Some(-2),
        };
        DefectEntry::new(Arc::new(defect), charge)
    }

    fn config() -> DistortionConfig {
        DistortionConfig {
            bond_distortions: Some(vec![-0.3, 0.0, 0.3]),
            stdev: Some(0.1),
            d_min: Some(1.2),
            ..Default::default()
        }
    }

    #[test]
    fn test_labels_and_composition() {
        let generator = DistortionGenerator::new(config()).unwrap();
        let result = generator.generate(&vacancy_entry(0)).unwrap();

        let names: Vec<String> = result.labels().iter().map(|l| l.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "Bond_Distortion_-30.0%",
                "Bond_Distortion_0.0%",
                "Bond_Distortion_30.0%",
                "Dimer",
                "Rattled",
                "Unperturbed",
            ]
        );

        let input = &result.trials[0].structure;
        for trial in &result.trials {
            assert_eq!(trial.structure.num_atoms(), 124);
            assert_eq!(trial.structure.composition(), input.composition());
            for atom in &trial.structure.atoms {
                assert!(atom.position.iter().all(|&x| (0.0..1.0).contains(&x)));
            }
        }
        assert_eq!(result.sphere.neighbours.len(), 2);
    }

    #[test]
    fn test_rattled_structures_respect_d_min() {
        let generator = DistortionGenerator::new(config()).unwrap();
        let result = generator.generate(&vacancy_entry(0)).unwrap();
        assert!(!result.diagnostics.has_warnings());

        for label in [DistortionLabel::Rattled, DistortionLabel::bond(0.3)] {
            let trial = result.trial(&label).unwrap();
            assert!(trial.structure.min_pair_distance().unwrap() >= 1.2 - 1e-9);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = DistortionGenerator::new(config()).unwrap();
        let a = generator.generate(&vacancy_entry(0)).unwrap();
        let b = generator.generate(&vacancy_entry(0)).unwrap();
        for (x, y) in a.trials.iter().zip(b.trials.iter()) {
            assert_eq!(x.structure, y.structure);
            assert_eq!(x.spec, y.spec);
        }
    }

    #[test]
    fn test_zero_distortion_without_rattle_is_identity() {
        let config = DistortionConfig {
            stdev: Some(0.0),
            ..config()
        };
        let generator = DistortionGenerator::new(config).unwrap();
        let entry = vacancy_entry(0);
        let result = generator.generate(&entry).unwrap();

        let zero = result.trial(&DistortionLabel::bond(0.0)).unwrap();
        assert_eq!(
            zero.spec.kind,
            DistortionKind::BondDistortion { fraction: 0.0 }
        );
        let input = &entry.defect.structure;
        for (a, b) in zero.structure.atoms.iter().zip(input.atoms.iter()) {
            assert!(input.lattice.distance(a.position, b.position) < 1e-6);
        }
        assert!(result.trial(&DistortionLabel::Rattled).is_none());
    }

    #[test]
    fn test_bond_distortion_only_moves_sphere() {
        let config = DistortionConfig {
            stdev: Some(0.0),
            ..config()
        };
        let generator = DistortionGenerator::new(config).unwrap();
        let entry = vacancy_entry(0);
        let result = generator.generate(&entry).unwrap();
        let sphere = result.sphere.indices();

        let trial = result.trial(&DistortionLabel::bond(-0.3)).unwrap();
        let input = &entry.defect.structure;
        for (i, (a, b)) in trial.structure.atoms.iter().zip(input.atoms.iter()).enumerate() {
            let moved = input.lattice.distance(a.position, b.position) > 1e-9;
            assert_eq!(moved, sphere.contains(&i));
        }
        for n in &result.sphere.neighbours {
            let d = input.lattice.distance(entry.defect.site, trial.structure.atoms[n.index].position);
            assert!((d - 0.7 * n.distance).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fully_ionised_entry() {
        let generator = DistortionGenerator::new(config()).unwrap();
        let result = generator.generate(&vacancy_entry(-2)).unwrap();

        let names: Vec<String> = result.labels().iter().map(|l| l.to_string()).collect();
        assert_eq!(names, vec!["Dimer", "Rattled", "Unperturbed"]);
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn test_rattle_excludes_distorted_neighbours() {
        let generator = DistortionGenerator::new(config()).unwrap();
        let result = generator.generate(&vacancy_entry(0)).unwrap();
        let untouched = &result.unperturbed_atoms[&DistortionLabel::bond(-0.3)];
        for i in result.sphere.indices() {
            assert!(untouched.contains(&i));
        }
        assert_eq!(result.unperturbed_atoms[&DistortionLabel::Unperturbed].len(), 124);
    }
}
