//! # 统一错误处理模块
//!
//! 定义 defect-shake 的所有错误类型，使用 `thiserror` 派生。
//!
//! 错误按作用范围分为：
//! - 输入歧义（缺陷位点无法唯一确定）
//! - 几何不可行（畸变球为空）
//! - 配置不一致（电荷范围、冲突的电荷来源、非法参数）
//! - I/O 与解析错误
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// defect-shake 统一错误类型
#[derive(Error, Debug)]
pub enum ShakeError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Cannot resolve defect name from '{name}': {reason}")]
    NameParse { name: String, reason: String },

    #[error("Unrecognised distortion label: {0}")]
    InvalidLabel(String),

    // ─────────────────────────────────────────────────────────────
    // 缺陷识别错误
    // ─────────────────────────────────────────────────────────────
    #[error(
        "Defect site is ambiguous: {candidates} candidate sites match equally well \
         (best score {best:.3} Å). Specify the defect index or coordinates explicitly."
    )]
    AmbiguousSite { candidates: usize, best: f64 },

    #[error("Invalid defect supercell: {0}")]
    InvalidDefect(String),

    // ─────────────────────────────────────────────────────────────
    // 畸变生成错误
    // ─────────────────────────────────────────────────────────────
    #[error("No neighbours to distort for {entry}: {reason}")]
    InsufficientNeighbours { entry: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid charge range: {0}")]
    InvalidChargeRange(String),

    #[error(
        "Charge states were specified both on the command line ({cli:?}) \
         and in the config file ({config:?})"
    )]
    ConflictingCharges { cli: Vec<i32>, config: Vec<i32> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // 分析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Reference structure '{0}' not found among the relaxed structures")]
    ReferenceNotFound(String),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ShakeError>;
