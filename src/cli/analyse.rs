//! # 弛豫后分析子命令 CLI 定义
//!
//! `parse`, `analyse`, `groundstate`, `regenerate` 都作用于生成命令的输出根目录
//! （或其中的单个缺陷目录）。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/` 相应模块

use crate::parsers::DftCode;

use clap::Args;
use std::path::PathBuf;

/// 定位缺陷目录的公共参数
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Output root directory, or a single defect directory
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Only process this defect (e.g. v_Cd or v_Cd_0)
    #[arg(short, long)]
    pub defect: Option<String>,

    /// DFT code used for the relaxations
    #[arg(long, value_enum, default_value = "vasp")]
    pub code: DftCode,
}

/// parse 子命令参数
#[derive(Args, Debug)]
pub struct ParseArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,
}

/// analyse 子命令参数
#[derive(Args, Debug)]
pub struct AnalyseArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Reference distortion for displacements (e.g. Unperturbed, Bond_Distortion_-30.0%)
    #[arg(long, default_value = "Unperturbed")]
    pub ref_struct: String,

    /// Skip writing the per-defect CSV files
    #[arg(long, default_value_t = false)]
    pub no_csv: bool,
}

/// groundstate 子命令参数
#[derive(Args, Debug)]
pub struct GroundstateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Name of the folder the ground-state structure is written to
    #[arg(long, default_value = "Groundstate")]
    pub folder: String,
}

/// regenerate 子命令参数
#[derive(Args, Debug)]
pub struct RegenerateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// TOML file with distortion parameters
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Minimum energy lowering (eV) for a distortion to be propagated
    #[arg(long)]
    pub min_energy: Option<f64>,

    /// Also propagate metastable distortions
    #[arg(long, default_value_t = false)]
    pub metastable: bool,
}
