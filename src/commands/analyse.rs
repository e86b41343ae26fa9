//! # analyse 子命令实现
//!
//! 对每个缺陷条目，列出各畸变的最终能量、相对 `Unperturbed` 的能量差，
//! 以及相对参考结构的原子位移，并写出 `{entry}/{entry}.csv`。
//!
//! ## 依赖关系
//! - 使用 `cli/analyse.rs` 定义的参数
//! - 使用 `batch/collector.rs`, `analysis/compare.rs`
//! - 使用 `utils/output.rs`

use crate::analysis::{compare, write_csv, ComparisonRow};
use crate::batch::collector::{load_energies, load_relaxed};
use crate::batch::{DefectCollector, DefectDir};
use crate::cli::analyse::AnalyseArgs;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShakeError};
use crate::models::DistortionLabel;
use crate::parsers::DftCode;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 对比表的显示行
#[derive(Debug, Clone, Tabled)]
struct CompareRow {
    #[tabled(rename = "Distortion")]
    label: String,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "ΔE (eV)")]
    delta: String,
    #[tabled(rename = "Mean disp (Å)")]
    mean: String,
    #[tabled(rename = "Max disp (Å)")]
    max: String,
    #[tabled(rename = "Σ disp (Å)")]
    total: String,
    #[tabled(rename = "Converged")]
    converged: String,
}

fn fmt(value: Option<f64>, digits: usize) -> String {
    value
        .map(|v| format!("{:.*}", digits, v))
        .unwrap_or_else(|| "-".to_string())
}

impl From<&ComparisonRow> for CompareRow {
    fn from(row: &ComparisonRow) -> Self {
        CompareRow {
            label: row.label.to_string(),
            energy: if row.missing_energy {
                "missing".to_string()
            } else {
                fmt(row.energy, 4)
            },
            delta: fmt(row.delta_energy, 3),
            mean: fmt(row.mean_displacement, 3),
            max: fmt(row.max_displacement, 3),
            total: fmt(row.total_displacement, 3),
            converged: match row.converged {
                Some(true) => "yes".to_string(),
                Some(false) => "no".to_string(),
                None => "-".to_string(),
            },
        }
    }
}

/// 执行 analyse
pub fn execute(args: AnalyseArgs) -> Result<()> {
    output::print_header("Analysing Relaxed Distortions");

    let reference = DistortionLabel::parse(&args.ref_struct)?;
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

    let mut analysed = 0;
    for dir in &dirs {
        match analyse_dir(dir, args.target.code, &reference, !args.no_csv) {
            Ok(()) => analysed += 1,
            Err(e) => output::print_warning(&format!("{}: {}", dir.entry_name(), e)),
        }
    }

    output::print_done(&format!("Analysed {} of {} entries", analysed, dirs.len()));
    Ok(())
}

fn analyse_dir(
    dir: &DefectDir,
    code: DftCode,
    reference: &DistortionLabel,
    write: bool,
) -> Result<()> {
    let entry = dir.entry_name();
    let mut diagnostics = Diagnostics::new();
    let energies = load_energies(dir, code, &mut diagnostics);
    let structures = load_relaxed(dir, code, &mut diagnostics);

    if energies.is_empty() && structures.is_empty() {
        return Err(ShakeError::Other(format!(
            "no {} outputs or relaxed structures",
            code
        )));
    }

    let rows = compare(&structures, &energies, reference)?;

    output::print_header(&entry);
    let display: Vec<CompareRow> = rows.iter().map(CompareRow::from).collect();
    println!("{}", Table::new(&display));

    let missing = rows.iter().filter(|r| r.missing_energy).count();
    if missing > 0 {
        output::print_warning(&format!("{} distortion(s) without a final energy", missing));
    }

    if write {
        let path = dir.path.join(format!("{}.csv", entry));
        write_csv(&rows, &path)?;
        output::print_success(&format!("Table saved to '{}'", path.display()));
    }
    Ok(())
}
