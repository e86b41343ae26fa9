//! # 数据模型模块
//!
//! 定义晶体结构、点缺陷、畸变标签与能量记录的数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `defects/`, `distortions/`, `analysis/`, `commands/` 使用
//! - 子模块: structure, defect, distortion, energy

pub mod defect;
pub mod distortion;
pub mod energy;
pub mod structure;

pub use defect::{
    entry_name, format_charge, Defect, DefectCapabilities, DefectEntry, DefectKind, Neighbour,
};
pub use distortion::{DistortionKind, DistortionLabel, DistortionSpec, RattleParams, TrialStructure};
pub use energy::{DefectEnergies, EnergyRecord, GroundStateResult};
pub use structure::{Atom, Crystal, Lattice};
