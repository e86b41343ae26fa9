//! # 工具函数模块
//!
//! 提供美化输出、进度条、原子文件写入等工具。
//!
//! ## 依赖关系
//! - 被 `commands/` 及持久化相关模块使用
//! - 子模块: output, progress, atomic

pub mod atomic;
pub mod output;
pub mod progress;
