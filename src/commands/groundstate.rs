//! # groundstate 子命令实现
//!
//! 把每个缺陷条目中能量最低的弛豫结构写到 `{entry}/Groundstate/`，
//! 作为后续高精度计算的起点。
//!
//! ## 依赖关系
//! - 使用 `cli/analyse.rs` 定义的参数
//! - 使用 `batch/collector.rs`, `analysis/groundstate.rs`, `parsers/`
//! - 使用 `utils/output.rs`

use crate::analysis::ground_state;
use crate::batch::collector::load_energies;
use crate::batch::{DefectCollector, DefectDir};
use crate::cli::analyse::GroundstateArgs;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShakeError};
use crate::parsers::{parse_structure_file, write_structure_file, DftCode};
use crate::utils::output;

use std::path::PathBuf;
use tabled::{Table, Tabled};

/// 基态表的一行
#[derive(Debug, Clone, Tabled)]
struct GroundRow {
    #[tabled(rename = "Entry")]
    entry: String,
    #[tabled(rename = "Ground state")]
    label: String,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "ΔE (eV)")]
    delta: String,
}

/// 执行 groundstate
pub fn execute(args: GroundstateArgs) -> Result<()> {
    output::print_header("Writing Ground-State Structures");

    let dirs = DefectCollector::new(args.target.path.clone())
        .with_defect(args.target.defect.as_deref())
        .collect()?;

    let mut rows = Vec::new();
    for dir in &dirs {
        match write_ground_state(dir, args.target.code, &args.folder) {
            Ok(row) => rows.push(row),
            Err(e) => output::print_warning(&format!("{}: {}", dir.entry_name(), e)),
        }
    }

    if rows.is_empty() {
        output::print_warning("No ground-state structures written.");
        return Ok(());
    }
    println!("{}", Table::new(&rows));
    output::print_done(&format!(
        "{} ground-state structures written to '{}/' folders",
        rows.len(),
        args.folder
    ));
    Ok(())
}

/// 写出一个条目的基态结构；弛豫结构缺失时报错
fn write_ground_state(dir: &DefectDir, code: DftCode, folder: &str) -> Result<GroundRow> {
    let mut diagnostics = Diagnostics::new();
    let energies = load_energies(dir, code, &mut diagnostics);
    let ground = ground_state(&energies)
        .ok_or_else(|| ShakeError::Other("no parsed energies".to_string()))?;

    let source: PathBuf = dir
        .label_dir(&ground.label)
        .map(|d| d.join(code.relaxed_structure()))
        .ok_or_else(|| ShakeError::Other(format!("no folder for {}", ground.label)))?;
    let structure = parse_structure_file(&source)?;

    let target = dir.path.join(folder).join(code.input_structure());
    write_structure_file(code, &target, &structure)?;
    log::info!("{}: {} -> {}", dir.entry_name(), source.display(), target.display());

    Ok(GroundRow {
        entry: dir.entry_name(),
        label: ground.label.to_string(),
        energy: format!("{:.4}", ground.energy),
        delta: ground
            .energy_diff
            .map(|d| format!("{:.3}", d))
            .unwrap_or_else(|| "-".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Crystal, DefectEnergies, DistortionLabel, EnergyRecord, Lattice};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ground_state_written_to_folder() {
        let root = TempDir::new().unwrap();
        let entry = root.path().join("v_Cd_0");
        let crystal = Crystal::new(
            "relaxed",
            Lattice::cubic(6.5),
            vec![Atom::new("Te", [0.25, 0.25, 0.25])],
        );
        for label in [DistortionLabel::Unperturbed, DistortionLabel::bond(-0.3)] {
            let d = entry.join(label.to_string());
            fs::create_dir_all(&d).unwrap();
            write_structure_file(DftCode::Vasp, &d.join("CONTCAR"), &crystal).unwrap();
        }
        let mut energies = DefectEnergies::new();
        energies.insert(EnergyRecord {
            label: DistortionLabel::Unperturbed,
            final_energy: Some(-10.0),
            converged: true,
        });
        energies.insert(EnergyRecord {
            label: DistortionLabel::bond(-0.3),
            final_energy: Some(-10.5),
            converged: true,
        });
        energies.save(&entry.join("v_Cd_0_energies.json")).unwrap();

        let dirs = DefectCollector::new(entry.clone()).collect().unwrap();
        let row = write_ground_state(&dirs[0], DftCode::Vasp, "Groundstate").unwrap();

        assert_eq!(row.label, "Bond_Distortion_-30.0%");
        assert_eq!(row.delta, "-0.500");
        let written = parse_structure_file(&entry.join("Groundstate/POSCAR")).unwrap();
        assert_eq!(written.num_atoms(), 1);
    }
}
