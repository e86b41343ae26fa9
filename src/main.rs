//! # dshake - 点缺陷畸变搜索命令行工具
//!
//! ## 子命令
//! - `generate`     - 为单个缺陷生成试探畸变结构
//! - `generate-all` - 为目录中的所有缺陷生成试探畸变结构
//! - `parse`        - 解析弛豫能量
//! - `analyse`      - 能量与结构对比
//! - `groundstate`  - 导出能量最低的弛豫结构
//! - `regenerate`   - 跨电荷态传播能量降低的畸变
//!
//! 日志级别由 `RUST_LOG` 控制，默认 `info`。

use clap::Parser;
use defect_shake::cli::Cli;
use defect_shake::{commands, utils};

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
