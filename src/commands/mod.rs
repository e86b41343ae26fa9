//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `defects/`, `distortions/`, `analysis/`, `batch/`, `utils/`
//! - 子模块: generate, parse, analyse, groundstate, regenerate

pub mod analyse;
pub mod generate;
pub mod groundstate;
pub mod parse;
pub mod regenerate;

use crate::cli::Commands;
use crate::distortions::DistortionConfig;
use crate::error::Result;
use crate::utils::output;

use std::path::Path;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Generate(args) => generate::execute(args),
        Commands::GenerateAll(args) => generate::execute_all(args),
        Commands::Parse(args) => parse::execute(args),
        Commands::Analyse(args) => analyse::execute(args),
        Commands::Groundstate(args) => groundstate::execute(args),
        Commands::Regenerate(args) => regenerate::execute(args),
    }
}

/// 读取配置文件；未给出时使用默认参数
fn load_config(path: Option<&Path>) -> Result<DistortionConfig> {
    let config = match path {
        Some(path) => {
            let (config, diagnostics) = DistortionConfig::load(path)?;
            output::print_info(&format!("Loaded parameters from '{}'", path.display()));
            if diagnostics.has_warnings() {
                output::print_warning(&format!(
                    "{} unrecognised option(s) in '{}' ignored",
                    diagnostics.warnings().count(),
                    path.display()
                ));
            }
            config
        }
        None => DistortionConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
