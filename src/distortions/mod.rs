//! # 畸变生成模块
//!
//! 由缺陷条目生成键畸变、二聚体与随机扰动的试探结构。
//!
//! ## 依赖关系
//! - 被 `commands/`, `analysis/` 使用
//! - 子模块: config, neighbours, bond, rattle, generator, metadata

pub mod bond;
pub mod config;
pub mod generator;
pub mod metadata;
pub mod neighbours;
pub mod rattle;

pub use config::{DefectSettings, DistortionConfig, DistortionParameters};
pub use generator::{DistortionGenerator, GenerationResult};
pub use metadata::{DistortionMetadata, TrialMetadata, METADATA_FILE};
pub use neighbours::{select_neighbours, NeighbourRule, NeighbourSphere};
pub use rattle::{rattle, RattleOutcome, RattleSettings};
