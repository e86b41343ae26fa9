//! # 跨电荷态整合
//!
//! 对每个缺陷的所有电荷态：
//! 1. 扫描：读取能量，标记能量降低的畸变（见 `analysis/groundstate.rs`）
//! 2. 分组：按弛豫后的几何结构把不同电荷态的标记结果分组，先遇到者为代表
//! 3. 传播：每组代表结构提议给组外的每个电荷态，标签为 `{基础标签}_from_{源电荷}`
//! 4. 去重：目标电荷态已有等价结构（弛豫后或初始）或本次已提议等价结构时，
//!    只记录重复引用，不再生成
//!
//! 没有任何能量的电荷态不作为来源，但仍可作为传播目标。
//!
//! ## 依赖关系
//! - 被 `commands/parse.rs`（regenerate）, `tests/workflow.rs` 使用
//! - 使用 `analysis/{groundstate, matcher}.rs`
//! - 使用 `rayon` 并行处理不同缺陷

use crate::analysis::groundstate::energy_lowering_labels;
use crate::analysis::matcher::{MatchOutcome, StructureMatcher};
use crate::diagnostics::Diagnostics;
use crate::distortions::config::DistortionConfig;
use crate::models::{entry_name, Crystal, DefectEnergies, DistortionKind, DistortionLabel};

use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// 一个电荷态的输入数据
#[derive(Debug, Clone)]
pub struct ChargeStateData {
    pub charge: i32,
    pub energies: DefectEnergies,
    /// 弛豫后的结构
    pub relaxed: BTreeMap<DistortionLabel, Crystal>,
    /// 已生成的试探结构（弛豫前）
    pub initial: BTreeMap<DistortionLabel, Crystal>,
}

/// 一个缺陷所有电荷态的输入数据
#[derive(Debug, Clone)]
pub struct DefectData {
    pub name: String,
    pub charges: Vec<ChargeStateData>,
}

/// 每个缺陷的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Stage {
    Scanned,
    EnergyLoweringFound,
    Propagated,
    Deduplicated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scanned => "scanned",
            Stage::EnergyLoweringFound => "energy lowering found",
            Stage::Propagated => "propagated",
            Stage::Deduplicated => "deduplicated",
        };
        write!(f, "{}", name)
    }
}

/// 被标记为能量降低的畸变
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedDistortion {
    pub charge: i32,
    pub label: DistortionLabel,
    /// 相对 `Unperturbed` 的能量 (eV)
    pub energy_diff: f64,
}

/// 几何等价的一组标记结果，第一个成员为代表
#[derive(Debug, Clone)]
pub struct DistortionGroup {
    pub members: Vec<(i32, DistortionLabel)>,
    pub structure: Crystal,
}

impl DistortionGroup {
    pub fn source(&self) -> (i32, &DistortionLabel) {
        let (charge, label) = &self.members[0];
        (*charge, label)
    }

    fn contains_charge(&self, charge: i32) -> bool {
        self.members.iter().any(|(c, _)| *c == charge)
    }
}

/// 提议的新试探结构
#[derive(Debug, Clone)]
pub struct Proposal {
    pub target_charge: i32,
    pub label: DistortionLabel,
    pub source_charge: i32,
    pub source_label: DistortionLabel,
    pub structure: Crystal,
}

impl Proposal {
    pub fn kind(&self) -> DistortionKind {
        DistortionKind::FromChargeState {
            source_charge: self.source_charge,
            source_label: self.source_label.clone(),
        }
    }
}

/// 因等价结构已存在而跳过的提议
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRef {
    pub target_charge: i32,
    pub label: DistortionLabel,
    /// 目标电荷态中等价的已有标签或本次提议
    pub equivalent_to: DistortionLabel,
}

/// 一个缺陷的整合结果
#[derive(Debug, Clone)]
pub struct DefectReport {
    pub name: String,
    pub stage: Stage,
    pub flagged: Vec<FlaggedDistortion>,
    pub groups: Vec<DistortionGroup>,
    pub proposals: Vec<Proposal>,
    pub duplicates: Vec<DuplicateRef>,
    pub diagnostics: Diagnostics,
}

impl DefectReport {
    fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            log::debug!("{}: {} → {}", self.name, self.stage, stage);
            self.stage = stage;
        }
    }

    pub fn is_flagged(&self, charge: i32) -> bool {
        self.flagged.iter().any(|f| f.charge == charge)
    }
}

/// 跨电荷态整合器
#[derive(Debug, Clone)]
pub struct Consolidator {
    pub min_e_diff: f64,
    pub metastable: bool,
    pub matcher: StructureMatcher,
}

impl Consolidator {
    pub fn new(min_e_diff: f64, metastable: bool, stol: f64) -> Self {
        Consolidator {
            min_e_diff,
            metastable,
            matcher: StructureMatcher::new(stol),
        }
    }

    pub fn from_config(config: &DistortionConfig) -> Self {
        Self::new(config.min_e_diff, config.metastable, config.stol)
    }

    /// 并行处理多个缺陷，结果与输入顺序一致
    pub fn run(&self, defects: &[DefectData]) -> Vec<DefectReport> {
        defects
            .par_iter()
            .map(|defect| self.consolidate_defect(defect))
            .collect()
    }

    /// 处理单个缺陷
    pub fn consolidate_defect(&self, defect: &DefectData) -> DefectReport {
        let mut charges: Vec<&ChargeStateData> = defect.charges.iter().collect();
        charges.sort_by_key(|c| c.charge);

        let mut report = DefectReport {
            name: defect.name.clone(),
            stage: Stage::Scanned,
            flagged: Vec::new(),
            groups: Vec::new(),
            proposals: Vec::new(),
            duplicates: Vec::new(),
            diagnostics: Diagnostics::new(),
        };

        let sources = self.scan(&defect.name, &charges, &mut report);
        if report.flagged.is_empty() {
            return report;
        }
        report.advance(Stage::EnergyLoweringFound);

        self.group(&defect.name, sources, &mut report);
        self.propagate(&defect.name, &charges, &mut report);
        report
    }

    /// 标记能量降低的畸变；返回带弛豫结构的来源
    fn scan(
        &self,
        name: &str,
        charges: &[&ChargeStateData],
        report: &mut DefectReport,
    ) -> Vec<(i32, DistortionLabel, Crystal)> {
        let mut sources = Vec::new();

        for data in charges {
            let entry = entry_name(name, data.charge);
            if data.energies.is_empty() {
                report
                    .diagnostics
                    .info(&entry, "no energies parsed; skipped as a propagation source");
                continue;
            }
            let unperturbed = match data.energies.unperturbed() {
                Some(e) => e,
                None => {
                    report.diagnostics.warn(
                        &entry,
                        "Unperturbed energy missing; energy lowering cannot be assessed",
                    );
                    continue;
                }
            };

            for label in energy_lowering_labels(&data.energies, self.min_e_diff, self.metastable) {
                let energy_diff = data.energies.energy(&label).map_or(0.0, |e| e - unperturbed);
                log::info!(
                    "{}: energy lowering distortion {} ({:.3} eV)",
                    entry,
                    label,
                    energy_diff
                );

                report.flagged.push(FlaggedDistortion {
                    charge: data.charge,
                    label: label.clone(),
                    energy_diff,
                });

                match data.relaxed.get(&label) {
                    Some(structure) => sources.push((data.charge, label, structure.clone())),
                    None => report.diagnostics.warn(
                        &entry,
                        format!("relaxed structure for {} missing; not propagated", label),
                    ),
                }
            }
        }
        sources
    }

    /// 按几何等价分组，先遇到者为代表
    fn group(
        &self,
        name: &str,
        sources: Vec<(i32, DistortionLabel, Crystal)>,
        report: &mut DefectReport,
    ) {
        for (charge, label, structure) in sources {
            let mut joined = false;
            for group in report.groups.iter_mut() {
                match self.matcher.compare(&group.structure, &structure) {
                    MatchOutcome::Equivalent { .. } => {
                        group.members.push((charge, label.clone()));
                        joined = true;
                        break;
                    }
                    MatchOutcome::Borderline { metric } => {
                        let (src_charge, src_label) = group.source();
                        report.diagnostics.warn(
                            entry_name(name, charge),
                            format!(
                                "{} is borderline equivalent to {} of charge {} (metric {:.3}); treated as distinct",
                                label, src_label, src_charge, metric
                            ),
                        );
                    }
                    MatchOutcome::Distinct { .. } => {}
                }
            }
            if !joined {
                report.groups.push(DistortionGroup {
                    members: vec![(charge, label)],
                    structure,
                });
            }
        }
    }

    /// 把每组代表结构提议给组外电荷态并去重
    fn propagate(&self, name: &str, charges: &[&ChargeStateData], report: &mut DefectReport) {
        let mut considered = false;
        let groups = report.groups.clone();

        for group in &groups {
            let (source_charge, source_label) = group.source();
            let label = DistortionLabel::propagated(source_label, source_charge);

            for target in charges.iter().filter(|t| !group.contains_charge(t.charge)) {
                considered = true;
                report.advance(Stage::Propagated);
                let entry = entry_name(name, target.charge);

                let (existing, borderline) = self.find_equivalent(target, &group.structure, report);
                match existing {
                    Some(existing) => {
                        log::info!("{}: {} duplicates {}; skipped", entry, label, existing);
                        report.duplicates.push(DuplicateRef {
                            target_charge: target.charge,
                            label: label.clone(),
                            equivalent_to: existing,
                        });
                    }
                    None => {
                        for (other, metric) in borderline {
                            report.diagnostics.warn(
                                &entry,
                                format!(
                                    "{} is borderline equivalent to {} (metric {:.3}); treated as distinct",
                                    label, other, metric
                                ),
                            );
                        }
                        let mut structure = group.structure.clone();
                        structure.name = format!("{} {}", entry, label);
                        report.proposals.push(Proposal {
                            target_charge: target.charge,
                            label: label.clone(),
                            source_charge,
                            source_label: source_label.clone(),
                            structure,
                        });
                    }
                }
            }
        }

        if considered {
            report.advance(Stage::Deduplicated);
        }
    }

    /// 在目标电荷态的已有结构与本次提议中查找等价结构；同时返回临界匹配
    fn find_equivalent(
        &self,
        target: &ChargeStateData,
        candidate: &Crystal,
        report: &DefectReport,
    ) -> (Option<DistortionLabel>, Vec<(DistortionLabel, f64)>) {
        let existing = target.relaxed.iter().chain(target.initial.iter());
        let proposed = report
            .proposals
            .iter()
            .filter(|p| p.target_charge == target.charge)
            .map(|p| (&p.label, &p.structure));

        let mut borderline = Vec::new();
        let found = existing.chain(proposed).find_map(|(label, structure)| {
            match self.matcher.compare(structure, candidate) {
                MatchOutcome::Equivalent { .. } => Some(label.clone()),
                MatchOutcome::Borderline { metric } => {
                    borderline.push((label.clone(), metric));
                    None
                }
                MatchOutcome::Distinct { .. } => None,
            }
        });
        (found, borderline)
    }
}
