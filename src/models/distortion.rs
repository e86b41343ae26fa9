//! # 畸变标签与试探结构
//!
//! 标签既是输出子目录名，也是元数据与能量记录的键：
//! `Unperturbed`, `Rattled`, `Dimer`, `Bond_Distortion_-30.0%`，
//! 以及跨电荷态传播得到的 `Bond_Distortion_-30.0%_from_+1`。
//!
//! 标签的全序即报告中的规范顺序：键畸变按百分比升序，其后 `Dimer`、
//! `Rattled`、传播标签，`Unperturbed` 排在最后。
//!
//! ## 依赖关系
//! - 被 `distortions/`, `analysis/`, `commands/` 使用
//! - 使用 `models/structure.rs`, `models/defect.rs`
//! - 使用 `regex` 解析标签

use crate::error::{Result, ShakeError};
use crate::models::defect::format_charge;
use crate::models::structure::Crystal;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// 畸变标签
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DistortionLabel {
    Unperturbed,
    Rattled,
    Dimer,
    /// 键畸变，单位为千分之一（-300 即 -30.0%）
    BondDistortion(i32),
    /// 从其他电荷态传播而来
    Propagated {
        base: Box<DistortionLabel>,
        source_charge: i32,
    },
}

impl DistortionLabel {
    /// 从畸变分数（如 -0.3）构造键畸变标签
    pub fn bond(fraction: f64) -> Self {
        DistortionLabel::BondDistortion((fraction * 1000.0).round() as i32)
    }

    /// 传播标签；嵌套的传播标签会被展开到其基础标签
    pub fn propagated(base: &DistortionLabel, source_charge: i32) -> Self {
        DistortionLabel::Propagated {
            base: Box::new(base.base().clone()),
            source_charge,
        }
    }

    /// 键畸变分数
    pub fn fraction(&self) -> Option<f64> {
        match self.base() {
            DistortionLabel::BondDistortion(permille) => Some(*permille as f64 / 1000.0),
            _ => None,
        }
    }

    /// 去掉传播后缀的基础标签
    pub fn base(&self) -> &DistortionLabel {
        match self {
            DistortionLabel::Propagated { base, .. } => base.base(),
            other => other,
        }
    }

    /// 规范排序键
    fn sort_key(&self) -> (u8, u8, i32, i32) {
        fn group(label: &DistortionLabel) -> (u8, i32) {
            match label {
                DistortionLabel::BondDistortion(p) => (0, *p),
                DistortionLabel::Dimer => (1, 0),
                DistortionLabel::Rattled => (2, 0),
                DistortionLabel::Propagated { base, .. } => group(base),
                DistortionLabel::Unperturbed => (4, 0),
            }
        }

        match self {
            DistortionLabel::Propagated {
                base,
                source_charge,
            } => {
                let (g, p) = group(base);
                (3, g, p, *source_charge)
            }
            DistortionLabel::Unperturbed => (4, 0, 0, 0),
            other => {
                let (g, p) = group(other);
                (g, 0, p, 0)
            }
        }
    }

    /// 解析目录名；无法识别时返回 `InvalidLabel`
    pub fn parse(text: &str) -> Result<Self> {
        static BOND: OnceLock<Regex> = OnceLock::new();
        static NAMED: OnceLock<Regex> = OnceLock::new();

        let bond = BOND.get_or_init(|| {
            Regex::new(r"^Bond_Distortion_(-?\d+(?:\.\d+)?)%(?:_from_([+-]?\d+))?$")
                .expect("valid regex")
        });
        let named = NAMED.get_or_init(|| {
            Regex::new(r"^(Unperturbed|Rattled|Dimer)(?:_from_([+-]?\d+))?$").expect("valid regex")
        });

        let (base, from) = if let Some(caps) = bond.captures(text) {
            let pct: f64 = caps[1]
                .parse()
                .map_err(|_| ShakeError::InvalidLabel(text.to_string()))?;
            (
                DistortionLabel::BondDistortion((pct * 10.0).round() as i32),
                caps.get(2).map(|m| m.as_str().to_string()),
            )
        } else if let Some(caps) = named.captures(text) {
            let base = match &caps[1] {
                "Unperturbed" => DistortionLabel::Unperturbed,
                "Rattled" => DistortionLabel::Rattled,
                _ => DistortionLabel::Dimer,
            };
            (base, caps.get(2).map(|m| m.as_str().to_string()))
        } else {
            return Err(ShakeError::InvalidLabel(text.to_string()));
        };

        match from {
            Some(charge) => {
                let source_charge: i32 = charge
                    .trim_start_matches('+')
                    .parse()
                    .map_err(|_| ShakeError::InvalidLabel(text.to_string()))?;
                Ok(DistortionLabel::propagated(&base, source_charge))
            }
            None => Ok(base),
        }
    }
}

impl fmt::Display for DistortionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistortionLabel::Unperturbed => write!(f, "Unperturbed"),
            DistortionLabel::Rattled => write!(f, "Rattled"),
            DistortionLabel::Dimer => write!(f, "Dimer"),
            DistortionLabel::BondDistortion(permille) => {
                write!(f, "Bond_Distortion_{:.1}%", *permille as f64 / 10.0)
            }
            DistortionLabel::Propagated {
                base,
                source_charge,
            } => write!(f, "{}_from_{}", base, format_charge(*source_charge)),
        }
    }
}

impl Ord for DistortionLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for DistortionLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for DistortionLabel {
    type Error = ShakeError;

    fn try_from(value: String) -> Result<Self> {
        DistortionLabel::parse(&value)
    }
}

impl From<DistortionLabel> for String {
    fn from(label: DistortionLabel) -> Self {
        label.to_string()
    }
}

/// 随机扰动参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RattleParams {
    pub seed: u64,
    /// 高斯分布标准差 (Å)
    pub stdev: f64,
}

/// 畸变类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DistortionKind {
    Unperturbed,
    BondDistortion {
        fraction: f64,
    },
    Rattle(RattleParams),
    Combined {
        fraction: f64,
        rattle: RattleParams,
    },
    Dimer {
        bond_length: f64,
        rattle: Option<RattleParams>,
    },
    FromChargeState {
        source_charge: i32,
        source_label: DistortionLabel,
    },
}

/// 畸变规格：纯值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionSpec {
    pub label: DistortionLabel,
    #[serde(flatten)]
    pub kind: DistortionKind,
}

/// 试探结构
#[derive(Debug, Clone)]
pub struct TrialStructure {
    /// 所属缺陷条目名 `{defect_name}_{charge}`
    pub entry_name: String,
    pub charge: i32,
    pub spec: DistortionSpec,
    pub structure: Crystal,
}
