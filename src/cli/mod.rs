//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `generate`: 为单个缺陷生成试探畸变结构
//! - `generate-all`: 为目录中的所有缺陷生成试探畸变结构
//! - `parse`: 解析弛豫能量并保存
//! - `analyse`: 各畸变的能量与结构比较
//! - `groundstate`: 导出能量最低的弛豫结构
//! - `regenerate`: 跨电荷态传播能量降低的畸变
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: generate, analyse

pub mod analyse;
pub mod generate;

use clap::{Parser, Subcommand};

/// defect-shake - 点缺陷对称性破缺畸变搜索
#[derive(Parser)]
#[command(name = "dshake")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(
    about = "Generate and analyse symmetry-breaking trial distortions for point defects",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Generate trial distortions for one defect
    Generate(generate::GenerateArgs),

    /// Generate trial distortions for every defect structure in a directory
    GenerateAll(generate::GenerateAllArgs),

    /// Parse final energies of the relaxed trial structures
    Parse(analyse::ParseArgs),

    /// Compare energies and structures of the relaxed distortions
    Analyse(analyse::AnalyseArgs),

    /// Write the lowest-energy relaxed structure of each defect directory
    Groundstate(analyse::GroundstateArgs),

    /// Propagate energy-lowering distortions to the other charge states
    Regenerate(analyse::RegenerateArgs),
}
