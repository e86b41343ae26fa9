//! # CASTEP .castep 输出解析器
//!
//! 从 .castep 输出中提取几何优化的最终能量。优先使用 `Final Enthalpy`
//! （几何优化结束时输出），否则使用最后一个 `Final energy`。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `commands/parse.rs` 使用
//! - 使用 `models/energy.rs`

use crate::error::{Result, ShakeError};
use crate::models::{DistortionLabel, EnergyRecord};
use std::fs;
use std::path::Path;

/// 解析 CASTEP .castep 输出文件
pub fn parse_castep_output(path: &Path, label: &DistortionLabel) -> Result<EnergyRecord> {
    let content = fs::read_to_string(path).map_err(|e| ShakeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(scan_castep(&content, label))
}

/// 扫描 .castep 内容
pub fn scan_castep(content: &str, label: &DistortionLabel) -> EnergyRecord {
    let mut final_enthalpy: Option<f64> = None;
    let mut final_energy: Option<f64> = None;
    let mut converged = false;

    // 从后往前找最终值
    for line in content.lines().rev() {
        // "LBFGS: Geometry optimization completed successfully."
        if line.contains("Geometry optimization completed successfully") {
            converged = true;
        }

        // "LBFGS: Final Enthalpy     = -1234.56789012     eV"
        if final_enthalpy.is_none() && line.contains("Final Enthalpy") {
            final_enthalpy = extract_value_after_eq(line);
        }

        // "Final energy, E             =  -1234.56789012     eV"
        if final_energy.is_none() && line.contains("Final energy") {
            final_energy = extract_value_after_eq(line);
        }
    }

    EnergyRecord {
        label: label.clone(),
        final_energy: final_enthalpy.or(final_energy),
        converged,
    }
}

/// 提取等号后的数值
fn extract_value_after_eq(s: &str) -> Option<f64> {
    let pos = s.find('=')?;
    s[pos + 1..].split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_optimisation_output() {
        let content = "\
Final energy, E             =  -1200.10000000     eV
Final energy, E             =  -1200.50000000     eV
 LBFGS: Final Enthalpy     = -1200.55000000     eV
 LBFGS: Geometry optimization completed successfully.
";
        let record = scan_castep(content, &DistortionLabel::Dimer);
        assert!((record.final_energy.unwrap() + 1200.55).abs() < 1e-9);
        assert!(record.converged);
    }

    #[test]
    fn test_single_point_energy() {
        let content = "Final energy, E             =  -99.5     eV\n";
        let record = scan_castep(content, &DistortionLabel::Unperturbed);
        assert!((record.final_energy.unwrap() + 99.5).abs() < 1e-9);
        assert!(!record.converged);
    }
}
