//! # generate / generate-all 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/generate.rs`

use crate::defects::ChargeRequest;
use crate::parsers::DftCode;

use clap::Args;
use std::path::PathBuf;

/// 电荷态参数（两个生成命令共用）
#[derive(Args, Debug, Clone)]
pub struct ChargeArgs {
    /// Charge states to generate (e.g. --charge -2,-1,0)
    #[arg(short = 'q', long = "charge", value_delimiter = ',', allow_hyphen_values = true)]
    pub charges: Vec<i32>,

    /// Lowest charge state (requires --max-charge)
    #[arg(long, allow_negative_numbers = true)]
    pub min_charge: Option<i32>,

    /// Highest charge state (requires --min-charge)
    #[arg(long, allow_negative_numbers = true)]
    pub max_charge: Option<i32>,

    /// Extra charge states on each side of the oxidation-state range
    #[arg(long)]
    pub padding: Option<u32>,
}

impl ChargeArgs {
    /// 转为电荷请求；命令行未给出 padding 时使用配置值
    pub fn to_request(&self, config_padding: u32) -> ChargeRequest {
        ChargeRequest {
            charges: (!self.charges.is_empty()).then(|| self.charges.clone()),
            min_charge: self.min_charge,
            max_charge: self.max_charge,
            padding: self.padding.unwrap_or(config_padding),
        }
    }
}

/// generate 子命令参数
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Defect supercell structure file (POSCAR or .cell)
    #[arg(short, long)]
    pub defect: PathBuf,

    /// Bulk supercell structure file (POSCAR or .cell)
    #[arg(short, long)]
    pub bulk: PathBuf,

    #[command(flatten)]
    pub charge: ChargeArgs,

    /// Index of the defect site (bulk frame for vacancies, defect frame otherwise)
    #[arg(long)]
    pub defect_index: Option<usize>,

    /// Fractional coordinates of the defect site
    #[arg(long, num_args = 3, value_names = ["A", "B", "C"], allow_negative_numbers = true)]
    pub defect_coords: Option<Vec<f64>>,

    /// Defect name (default: derived from the defect type, e.g. v_Cd)
    #[arg(short, long)]
    pub name: Option<String>,

    /// DFT code the trial structures are written for
    #[arg(long, value_enum, default_value = "vasp")]
    pub code: DftCode,

    /// TOML file with distortion parameters
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output root directory
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,
}

impl GenerateArgs {
    pub fn coords(&self) -> Option<[f64; 3]> {
        match self.defect_coords.as_deref() {
            Some(&[a, b, c]) => Some([a, b, c]),
            _ => None,
        }
    }
}

/// generate-all 子命令参数
#[derive(Args, Debug)]
pub struct GenerateAllArgs {
    /// Directory of defect structures: files, or subdirectories holding one structure each
    #[arg(short, long)]
    pub defects: PathBuf,

    /// Bulk supercell structure file (POSCAR or .cell)
    #[arg(short, long)]
    pub bulk: PathBuf,

    #[command(flatten)]
    pub charge: ChargeArgs,

    /// DFT code the trial structures are written for
    #[arg(long, value_enum, default_value = "vasp")]
    pub code: DftCode,

    /// TOML file with distortion parameters
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output root directory
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,
}
