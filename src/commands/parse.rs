//! # parse 子命令实现
//!
//! 解析每个缺陷目录中各畸变的最终能量，保存为 `{entry}_energies.json`。
//!
//! ## 依赖关系
//! - 使用 `cli/analyse.rs` 定义的参数
//! - 使用 `batch/collector.rs` 扫描目录, `batch/runner.rs` 并行解析
//! - 使用 `utils/output.rs`

use crate::batch::collector::parse_energies;
use crate::batch::{BatchResult, BatchRunner, DefectCollector, DefectDir, ProcessResult};
use crate::cli::analyse::ParseArgs;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::models::DefectEnergies;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 解析结果表的一行
#[derive(Debug, Clone, Tabled)]
struct ParseRow {
    #[tabled(rename = "Entry")]
    entry: String,
    #[tabled(rename = "Parsed")]
    parsed: String,
    #[tabled(rename = "Lowest")]
    lowest: String,
    #[tabled(rename = "ΔE (eV)")]
    delta: String,
    #[tabled(rename = "Warnings")]
    warnings: usize,
}

/// 执行 parse
pub fn execute(args: ParseArgs) -> Result<()> {
    output::print_header("Parsing Relaxation Energies");

    let dirs = DefectCollector::new(args.target.path.clone())
        .with_defect(args.target.defect.as_deref())
        .collect()?;
    if dirs.is_empty() {
        output::print_warning(&format!(
            "No defect directories found in '{}'",
            args.target.path.display()
        ));
        return Ok(());
    }
    output::print_info(&format!(
        "Scanning {} defect directories for {} outputs...",
        dirs.len(),
        args.target.code
    ));

    let code = args.target.code;
    let runner = BatchRunner::new(args.jobs);
    let parsed = runner.map(&dirs, "Parsing", |dir| {
        let mut diagnostics = Diagnostics::new();
        let energies = parse_energies(dir, code, &mut diagnostics);
        (energies, diagnostics)
    })?;

    let mut rows = Vec::new();
    let mut batch = BatchResult::default();
    for (dir, (energies, diagnostics)) in dirs.iter().zip(parsed) {
        let entry = dir.entry_name();
        if energies.is_empty() {
            output::print_skip(&format!("{}: no {} outputs", entry, code));
            batch.merge(ProcessResult::Skipped(entry));
            continue;
        }
        match save(dir, &energies) {
            Ok(()) => {
                rows.push(row(dir, &energies, &diagnostics));
                batch.merge(ProcessResult::Success(entry));
            }
            Err(e) => batch.merge(ProcessResult::Failed(entry, e.to_string())),
        }
    }

    if !rows.is_empty() {
        println!("{}", Table::new(&rows));
    }
    for (entry, err) in &batch.failures {
        output::print_error(&format!("{}: {}", entry, err));
    }
    output::print_done(&format!(
        "Energies saved for {} of {} entries ({} skipped, {} failed)",
        batch.success,
        batch.total(),
        batch.skipped,
        batch.failed
    ));
    Ok(())
}

fn save(dir: &DefectDir, energies: &DefectEnergies) -> Result<()> {
    let path = dir.energies_path();
    energies.save(&path)?;
    log::debug!("saved {}", path.display());
    Ok(())
}

fn row(dir: &DefectDir, energies: &DefectEnergies, diagnostics: &Diagnostics) -> ParseRow {
    let ground = energies.ground_state();
    ParseRow {
        entry: dir.entry_name(),
        parsed: format!("{}/{}", energies.parsed_count(), dir.labels.len()),
        lowest: ground
            .as_ref()
            .map(|g| g.label.to_string())
            .unwrap_or_else(|| "-".to_string()),
        delta: ground
            .and_then(|g| g.energy_diff)
            .map(|d| format!("{:.3}", d))
            .unwrap_or_else(|| "-".to_string()),
        warnings: diagnostics.warnings().count(),
    }
}
