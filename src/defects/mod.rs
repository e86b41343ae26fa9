//! # 缺陷模块
//!
//! 缺陷识别、电荷态枚举、氧化态估计与缺陷目录名解析。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/collector.rs` 使用
//! - 使用 `models/`, `diagnostics.rs`
//! - 子模块: identify, charges, oxidation, naming

pub mod charges;
pub mod identify;
pub mod naming;
pub mod oxidation;

pub use charges::{
    charge_states, defect_entries, estimate_oxidation_state, resolve_charge_request, ChargeRequest,
};
pub use identify::{identify, Identification};
pub use naming::{parse_defect_folder, DefectFolder};
pub use oxidation::{CommonOxidationStates, OxidationEstimator};
