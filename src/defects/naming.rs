//! # 缺陷目录名解析
//!
//! 目录名 `{defect_name}_{charge}` 的解析。按顺序尝试多种命名策略，
//! 每种策略返回 `Result`，第一个成功的结果生效。
//!
//! 支持的命名：
//! - 标准命名：`v_Cd_0`, `In_Cd_+1`, `Cd_i_C3v_-2`, `v_Te_s1_+2`
//! - 旧式命名：`vac_1_Cd_0`, `sub_1_In_on_Cd_1`, `Int_Cd_1_2`
//! - 通用命名：任意前缀加 `_{charge}`
//!
//! ## 依赖关系
//! - 被 `batch/collector.rs`, `commands/` 使用
//! - 使用 `regex`

use crate::error::{Result, ShakeError};
use crate::models::DefectKind;

use regex::Regex;
use std::sync::OnceLock;

/// 解析出的缺陷目录信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectFolder {
    /// 缺陷名（不含电荷）
    pub defect_name: String,
    pub charge: i32,
    /// 能从名称推断时给出缺陷类型
    pub kind: Option<DefectKind>,
}

type Strategy = fn(&str) -> Result<DefectFolder>;

/// 命名策略，按优先级排列
const STRATEGIES: &[(&str, Strategy)] = &[
    ("standard", parse_standard),
    ("legacy", parse_legacy),
    ("generic", parse_generic),
];

/// 解析缺陷目录名
pub fn parse_defect_folder(name: &str) -> Result<DefectFolder> {
    let mut reasons = Vec::new();
    for (strategy, parse) in STRATEGIES {
        match parse(name) {
            Ok(folder) => return Ok(folder),
            Err(e) => reasons.push(format!("{}: {}", strategy, e)),
        }
    }

    Err(ShakeError::NameParse {
        name: name.to_string(),
        reason: reasons.join("; "),
    })
}

fn name_error(name: &str, reason: &str) -> ShakeError {
    ShakeError::NameParse {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_charge(name: &str, text: &str) -> Result<i32> {
    text.trim_start_matches('+')
        .parse()
        .map_err(|_| name_error(name, "invalid charge"))
}

fn parse_standard(name: &str) -> Result<DefectFolder> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^((v)_[A-Z][a-z]?|[A-Z][a-z]?_(i)|[A-Z][a-z]?_[A-Z][a-z]?)((?:_[A-Za-z0-9.]+?)*)_([+-]?\d+)$",
        )
        .expect("valid regex")
    });

    let caps = re
        .captures(name)
        .ok_or_else(|| name_error(name, "not a v_X / A_B / X_i name"))?;

    let kind = if caps.get(2).is_some() {
        DefectKind::Vacancy
    } else if caps.get(3).is_some() {
        DefectKind::Interstitial
    } else {
        DefectKind::Substitution
    };

    Ok(DefectFolder {
        defect_name: format!("{}{}", &caps[1], &caps[4]),
        charge: parse_charge(name, &caps[5])?,
        kind: Some(kind),
    })
}

fn parse_legacy(name: &str) -> Result<DefectFolder> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^(vac_\d+_[A-Z][a-z]?|sub_\d+_[A-Z][a-z]?_on_[A-Z][a-z]?|Int_[A-Z][a-z]?_\d+)_([+-]?\d+)$",
        )
        .expect("valid regex")
    });

    let caps = re
        .captures(name)
        .ok_or_else(|| name_error(name, "not a vac_/sub_/Int_ name"))?;

    let defect_name = caps[1].to_string();
    let kind = if defect_name.starts_with("vac_") {
        DefectKind::Vacancy
    } else if defect_name.starts_with("sub_") {
        DefectKind::Substitution
    } else {
        DefectKind::Interstitial
    };

    Ok(DefectFolder {
        defect_name,
        charge: parse_charge(name, &caps[2])?,
        kind: Some(kind),
    })
}

fn parse_generic(name: &str) -> Result<DefectFolder> {
    let (prefix, charge) = name
        .rsplit_once('_')
        .ok_or_else(|| name_error(name, "no '_{charge}' suffix"))?;
    if prefix.is_empty() {
        return Err(name_error(name, "empty defect name"));
    }

    Ok(DefectFolder {
        defect_name: prefix.to_string(),
        charge: parse_charge(name, charge)?,
        kind: None,
    })
}
