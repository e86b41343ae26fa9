//! # regenerate 子命令实现
//!
//! 在所有电荷态中找出能量降低的畸变，把其弛豫结构作为新的试探结构
//! 写到其他电荷态目录 `{entry}/{label}_from_{q}/`，跳过几何等价的重复结构，
//! 并在畸变元数据中追加记录。
//!
//! ## 依赖关系
//! - 使用 `cli/analyse.rs` 定义的参数
//! - 使用 `batch/collector.rs`, `analysis/consolidate.rs`, `distortions/metadata.rs`
//! - 使用 `utils/output.rs`

use crate::analysis::{Consolidator, DefectData, DefectReport};
use crate::batch::collector::load_charge_state;
use crate::batch::{DefectCollector, DefectDir};
use crate::cli::analyse::RegenerateArgs;
use crate::diagnostics::Diagnostics;
use crate::distortions::{DistortionMetadata, TrialMetadata, METADATA_FILE};
use crate::error::Result;
use crate::models::{entry_name, Crystal, DistortionLabel};
use crate::parsers::{write_structure_file, DftCode};
use crate::utils::output;

use std::collections::BTreeMap;
use std::path::Path;
use tabled::{Table, Tabled};

/// 整合结果表的一行
#[derive(Debug, Clone, Tabled)]
struct ReportRow {
    #[tabled(rename = "Defect")]
    defect: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Energy lowering")]
    flagged: String,
    #[tabled(rename = "New trials")]
    proposals: usize,
    #[tabled(rename = "Duplicates")]
    duplicates: usize,
    #[tabled(rename = "Warnings")]
    warnings: usize,
}

impl From<&DefectReport> for ReportRow {
    fn from(report: &DefectReport) -> Self {
        let flagged = if report.flagged.is_empty() {
            "-".to_string()
        } else {
            report
                .flagged
                .iter()
                .map(|f| format!("{} ({}, {:.2} eV)", f.label, f.charge, f.energy_diff))
                .collect::<Vec<_>>()
                .join("; ")
        };
        ReportRow {
            defect: report.name.clone(),
            stage: report.stage.to_string(),
            flagged,
            proposals: report.proposals.len(),
            duplicates: report.duplicates.len(),
            warnings: report.diagnostics.warnings().count(),
        }
    }
}

/// 执行 regenerate
pub fn execute(args: RegenerateArgs) -> Result<()> {
    output::print_header("Propagating Energy-Lowering Distortions");

    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(min_energy) = args.min_energy {
        config.min_e_diff = min_energy;
    }
    config.metastable |= args.metastable;

    let root = &args.target.path;
    let code = args.target.code;
    let groups = DefectCollector::new(root.clone())
        .with_defect(args.target.defect.as_deref())
        .collect_grouped()?;
    if groups.is_empty() {
        output::print_warning(&format!(
            "No defect directories found in '{}'",
            root.display()
        ));
        return Ok(());
    }

    let (data, loading): (Vec<DefectData>, Vec<Diagnostics>) =
        load_defects(&groups, code).into_iter().unzip();
    let mut reports = Consolidator::from_config(&config).run(&data);
    for (report, diagnostics) in reports.iter_mut().zip(loading) {
        report.diagnostics.extend(diagnostics);
    }

    let rows: Vec<ReportRow> = reports.iter().map(ReportRow::from).collect();
    println!("{}", Table::new(&rows));

    let written = write_proposals(&reports, &groups, code)?;
    if written.is_empty() {
        output::print_info("No new trial structures to write.");
        return Ok(());
    }

    let metadata_path = root.join(METADATA_FILE);
    let mut metadata = DistortionMetadata::load_if_exists(&metadata_path)?
        .unwrap_or_else(|| DistortionMetadata::new(&config));
    for (defect, charge, label, trial) in written.iter().cloned() {
        metadata.append_trial(&defect, charge, label, trial);
    }
    metadata.save(&metadata_path)?;

    output::print_done(&format!(
        "{} new trial structures written; rerun the relaxations for them",
        written.len()
    ));
    Ok(())
}

/// 读取每个缺陷的全部电荷态，连同读取时的诊断
fn load_defects(
    groups: &BTreeMap<String, Vec<DefectDir>>,
    code: DftCode,
) -> Vec<(DefectData, Diagnostics)> {
    groups
        .iter()
        .map(|(name, dirs)| {
            let mut diagnostics = Diagnostics::new();
            let charges = dirs
                .iter()
                .map(|dir| load_charge_state(dir, code, &mut diagnostics))
                .collect();
            let data = DefectData {
                name: name.clone(),
                charges,
            };
            (data, diagnostics)
        })
        .collect()
}

/// (缺陷名, 目标电荷, 标签, 元数据)
type Written = (String, i32, DistortionLabel, TrialMetadata);

/// 写出所有提议结构，返回写出的记录
fn write_proposals(
    reports: &[DefectReport],
    groups: &BTreeMap<String, Vec<DefectDir>>,
    code: DftCode,
) -> Result<Vec<Written>> {
    let mut written = Vec::new();

    for report in reports {
        let dirs = match groups.get(&report.name) {
            Some(dirs) => dirs,
            None => continue,
        };
        for proposal in &report.proposals {
            let target = match dirs.iter().find(|d| d.folder.charge == proposal.target_charge) {
                Some(dir) => dir.path.as_path(),
                None => continue,
            };
            write_proposal(target, &proposal.label.to_string(), code, &proposal.structure)?;
            output::print_success(&format!(
                "{}: {} from {} of charge {}",
                entry_name(&report.name, proposal.target_charge),
                proposal.label,
                proposal.source_label,
                proposal.source_charge
            ));
            written.push((
                report.name.clone(),
                proposal.target_charge,
                proposal.label.clone(),
                TrialMetadata {
                    kind: proposal.kind(),
                    unperturbed_atoms: Vec::new(),
                },
            ));
        }
    }
    Ok(written)
}

fn write_proposal(
    entry_dir: &Path,
    label: &str,
    code: DftCode,
    structure: &Crystal,
) -> Result<()> {
    let path = entry_dir.join(label).join(code.input_structure());
    write_structure_file(code, &path, structure)
}
