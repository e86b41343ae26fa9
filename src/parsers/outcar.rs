//! # VASP OUTCAR 解析器
//!
//! 从 OUTCAR 中提取弛豫的最终能量 `energy(sigma->0)` 与收敛状态。
//! 离子步中断的 OUTCAR 仍会给出最后一个离子步的能量，但 `converged`
//! 为 false。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `commands/parse.rs` 使用
//! - 使用 `models/energy.rs`

use crate::error::{Result, ShakeError};
use crate::models::{DistortionLabel, EnergyRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// 解析 VASP OUTCAR 文件
pub fn parse_outcar(path: &Path, label: &DistortionLabel) -> Result<EnergyRecord> {
    let file = File::open(path).map_err(|e| ShakeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let reader = BufReader::new(file);
    let lines = reader.lines().map_while(|l| l.ok());
    Ok(scan_outcar(lines, label))
}

/// 逐行扫描 OUTCAR 内容
pub fn scan_outcar<I, S>(lines: I, label: &DistortionLabel) -> EnergyRecord
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut final_energy: Option<f64> = None;
    let mut converged = false;

    for line in lines {
        let line = line.as_ref();

        // "reached required accuracy - stopping structural energy minimisation"
        if line.contains("reached required accuracy") {
            converged = true;
        }

        // "energy  without entropy=     -123.456789  energy(sigma->0) =     -123.456789"
        if line.contains("energy  without entropy") {
            if let Some(pos) = line.find("energy(sigma->0)") {
                if let Some(val) = extract_number_after(&line[pos..], "=") {
                    final_energy = Some(val);
                }
            }
        }
    }

    EnergyRecord {
        label: label.clone(),
        final_energy,
        converged,
    }
}

/// 从字符串中提取指定标记之后的数字
fn extract_number_after(s: &str, marker: &str) -> Option<f64> {
    let pos = s.find(marker)?;
    s[pos + marker.len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTCAR: &str = "\
 FREE ENERGIE OF THE ION-ELECTRON SYSTEM (eV)
  energy  without entropy=     -205.10000000  energy(sigma->0) =     -205.11000000
 FREE ENERGIE OF THE ION-ELECTRON SYSTEM (eV)
  energy  without entropy=     -205.40000000  energy(sigma->0) =     -205.41234567
 reached required accuracy - stopping structural energy minimisation
";

    #[test]
    fn test_last_energy_and_convergence() {
        let label = DistortionLabel::bond(-0.3);
        let record = scan_outcar(OUTCAR.lines(), &label);

        assert_eq!(record.label, label);
        assert!((record.final_energy.unwrap() + 205.41234567).abs() < 1e-9);
        assert!(record.converged);
    }

    #[test]
    fn test_unfinished_relaxation() {
        let partial: Vec<&str> = OUTCAR.lines().take(2).collect();
        let record = scan_outcar(partial, &DistortionLabel::Unperturbed);

        assert!((record.final_energy.unwrap() + 205.11).abs() < 1e-9);
        assert!(!record.converged);
    }

    #[test]
    fn test_no_energy() {
        let record = scan_outcar(["running on 4 nodes"], &DistortionLabel::Rattled);
        assert_eq!(record.final_energy, None);
    }
}
