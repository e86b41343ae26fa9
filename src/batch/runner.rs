//! # 批量执行器
//!
//! 并行执行批量任务（每个缺陷条目或缺陷目录一个任务）。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代，结果顺序与输入一致
//! - 进度条显示
//! - 单个任务失败不影响其他任务，错误收集后汇总报告
//!
//! ## 依赖关系
//! - 被 `commands/generate.rs`, `commands/parse.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{Result, ShakeError};
use crate::utils::progress;

use rayon::prelude::*;

/// 单个任务处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult {
    /// 处理成功
    Success(String),
    /// 跳过（如已存在）
    Skipped(String),
    /// 处理失败
    Failed(String, String), // (任务名, 错误信息)
}

/// 批量处理结果统计
#[derive(Debug, Default)]
pub struct BatchResult {
    /// 成功数量
    pub success: usize,
    /// 跳过数量
    pub skipped: usize,
    /// 失败数量
    pub failed: usize,
    /// 失败详情
    pub failures: Vec<(String, String)>,
}

impl BatchResult {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Success(_) => self.success += 1,
            ProcessResult::Skipped(_) => self.skipped += 1,
            ProcessResult::Failed(name, err) => {
                self.failed += 1;
                self.failures.push((name, err));
            }
        }
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
    /// 是否显示进度条
    progress: bool,
}

impl BatchRunner {
    /// 创建新的批量执行器；`jobs` 为 0 时使用全部 CPU
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self {
            jobs,
            progress: true,
        }
    }

    /// 关闭进度条（测试与库调用）
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    /// 并行处理任务列表，返回每个任务的输出（顺序与输入一致）
    pub fn map<T, R, F>(&self, items: &[T], message: &str, processor: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let pb = if self.progress {
            progress::create_progress_bar(items.len() as u64, message)
        } else {
            indicatif::ProgressBar::hidden()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| ShakeError::Other(format!("failed to build thread pool: {}", e)))?;

        let results: Vec<R> = pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let result = processor(item);
                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();
        Ok(results)
    }
}
