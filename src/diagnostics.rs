//! # 诊断事件列表
//!
//! 替代全局警告：每个操作都返回一份结构化的诊断列表，调用方（CLI、库、测试）
//! 可以直接检查，而不必依赖全局日志器。每条诊断同时转发到 `log` 门面。
//!
//! ## 依赖关系
//! - 被 `defects/`, `distortions/`, `analysis/` 使用
//! - 使用 `log` crate

use serde::{Deserialize, Serialize};

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Info,
    Warning,
}

/// 单条诊断
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    /// 触发者（缺陷条目名、配置文件等）
    pub scope: String,
    pub message: String,
}

/// 诊断列表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条信息
    pub fn info(&mut self, scope: impl Into<String>, message: impl Into<String>) {
        let scope = scope.into();
        let message = message.into();
        log::info!("{}: {}", scope, message);
        self.events.push(Diagnostic {
            level: Level::Info,
            scope,
            message,
        });
    }

    /// 记录一条警告
    pub fn warn(&mut self, scope: impl Into<String>, message: impl Into<String>) {
        let scope = scope.into();
        let message = message.into();
        log::warn!("{}: {}", scope, message);
        self.events.push(Diagnostic {
            level: Level::Warning,
            scope,
            message,
        });
    }

    /// 合并另一份诊断列表（不重复转发日志）
    pub fn extend(&mut self, other: Diagnostics) {
        self.events.extend(other.events);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter().filter(|d| d.level == Level::Warning)
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
