//! # defect-shake - 点缺陷对称性破缺畸变搜索
//!
//! 为点缺陷的每个电荷态生成一族试探结构（键畸变、二聚体、随机扰动），
//! 在外部 DFT 弛豫完成后解析能量、比较结构，并把能量降低的畸变
//! 传播到其他电荷态。
//!
//! ## 依赖关系
//! ```text
//! lib.rs
//!   ├── cli/          (命令行参数定义)
//!   ├── commands/     (命令执行逻辑)
//!   ├── defects/      (缺陷识别、电荷态、目录名解析)
//!   ├── distortions/  (邻居选择、键畸变、随机扰动、生成器、元数据)
//!   ├── analysis/     (结构匹配、能量对比、跨电荷态整合)
//!   ├── batch/        (目录收集与并行执行)
//!   ├── parsers/      (POSCAR / .cell / OUTCAR / .castep)
//!   ├── models/       (数据模型)
//!   ├── diagnostics.rs
//!   ├── utils/        (输出、进度条、原子写入)
//!   └── error.rs      (错误处理)
//! ```

pub mod analysis;
pub mod batch;
pub mod cli;
pub mod commands;
pub mod defects;
pub mod diagnostics;
pub mod distortions;
pub mod error;
pub mod models;
pub mod parsers;
pub mod utils;

pub use error::{Result, ShakeError};
