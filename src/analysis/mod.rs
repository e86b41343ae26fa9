//! # 弛豫结果分析模块
//!
//! 对外部弛豫的结果做能量/结构对比、基态判定、结构匹配与跨电荷态整合。
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 子模块: matcher, compare, groundstate, consolidate

pub mod compare;
pub mod consolidate;
pub mod groundstate;
pub mod matcher;

pub use compare::{compare, write_csv, ComparisonRow};
pub use consolidate::{
    ChargeStateData, Consolidator, DefectData, DefectReport, DuplicateRef, Proposal, Stage,
};
pub use groundstate::{energy_lowering_labels, ground_state};
pub use matcher::{match_atoms, MatchOutcome, StructureMatcher};
