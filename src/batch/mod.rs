//! # 批量处理模块
//!
//! 提供缺陷目录的批量收集与并行处理能力。
//!
//! ## 功能
//! - 扫描输出根目录下的缺陷目录与畸变标签子目录
//! - 读取能量与弛豫结构
//! - 并行处理
//! - 进度反馈与统计
//!
//! ## 依赖关系
//! - 被各命令模块使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;

pub use collector::{DefectCollector, DefectDir};
pub use runner::{BatchResult, BatchRunner, ProcessResult};
