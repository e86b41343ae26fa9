//! # 解析器模块
//!
//! 结构文件（POSCAR/CONTCAR, .cell）的读写与 DFT 输出（OUTCAR, .castep）
//! 的能量提取。`DftCode` 决定每个试探结构目录中的文件名约定。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/collector.rs` 使用
//! - 使用 `models/` 数据模型, `utils/atomic.rs`
//! - 子模块: poscar, cell, outcar, castep_out

pub mod castep_out;
pub mod cell;
pub mod outcar;
pub mod poscar;

use crate::error::{Result, ShakeError};
use crate::models::{Crystal, DistortionLabel, EnergyRecord};
use crate::utils::atomic;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 支持的 DFT 程序
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DftCode {
    Vasp,
    Castep,
}

impl DftCode {
    /// 试探结构（弛豫前）的文件名
    pub fn input_structure(&self) -> &'static str {
        match self {
            DftCode::Vasp => "POSCAR",
            DftCode::Castep => "castep.cell",
        }
    }

    /// 弛豫后结构的文件名
    pub fn relaxed_structure(&self) -> &'static str {
        match self {
            DftCode::Vasp => "CONTCAR",
            DftCode::Castep => "castep-out.cell",
        }
    }

    /// 结构转为该程序的文本格式
    pub fn structure_string(&self, crystal: &Crystal) -> String {
        match self {
            DftCode::Vasp => poscar::to_poscar_string(crystal),
            DftCode::Castep => cell::to_cell_string(crystal),
        }
    }

    /// 在目录中查找 DFT 输出文件
    pub fn find_output(&self, dir: &Path) -> Option<PathBuf> {
        match self {
            DftCode::Vasp => {
                let outcar = dir.join("OUTCAR");
                outcar.is_file().then_some(outcar)
            }
            DftCode::Castep => {
                let pattern = dir.join("*.castep");
                let mut found: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
                    .ok()?
                    .filter_map(|p| p.ok())
                    .collect();
                found.sort();
                found.into_iter().next()
            }
        }
    }

    /// 解析 DFT 输出中的最终能量
    pub fn parse_energy(&self, path: &Path, label: &DistortionLabel) -> Result<EnergyRecord> {
        match self {
            DftCode::Vasp => outcar::parse_outcar(path, label),
            DftCode::Castep => castep_out::parse_castep_output(path, label),
        }
    }
}

impl std::fmt::Display for DftCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DftCode::Vasp => write!(f, "vasp"),
            DftCode::Castep => write!(f, "castep"),
        }
    }
}

/// 从文件路径推断格式并解析
pub fn parse_structure_file(path: &Path) -> Result<Crystal> {
    if !path.exists() {
        return Err(ShakeError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "cell" => cell::parse_cell_file(path),
        "vasp" | "poscar" => poscar::parse_poscar_file(path),
        _ => {
            // POSCAR/CONTCAR 通常没有扩展名
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("POSCAR") || name.starts_with("CONTCAR") || ext.is_empty() {
                return poscar::parse_poscar_file(path);
            }
            Err(ShakeError::UnsupportedFormat(format!(
                "Cannot determine format for: {}",
                path.display()
            )))
        }
    }
}

/// 按 DFT 程序约定写出结构文件（原子写入）
pub fn write_structure_file(code: DftCode, path: &Path, crystal: &Crystal) -> Result<()> {
    atomic::write_atomic(path, code.structure_string(crystal).as_bytes())
}
