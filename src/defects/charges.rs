//! # 电荷态枚举
//!
//! 显式电荷列表 > 最小/最大电荷范围 > 氧化态估计加 padding。
//!
//! ## 依赖关系
//! - 被 `commands/generate.rs` 使用
//! - 使用 `defects/oxidation.rs`, `models/defect.rs`

use crate::defects::oxidation::OxidationEstimator;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShakeError};
use crate::models::{Defect, DefectCapabilities, DefectEntry};

use std::sync::Arc;

/// 默认在氧化态范围两端各扩展的电荷数
pub const DEFAULT_PADDING: u32 = 1;

/// 电荷态请求
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub charges: Option<Vec<i32>>,
    pub min_charge: Option<i32>,
    pub max_charge: Option<i32>,
    pub padding: u32,
}

impl Default for ChargeRequest {
    fn default() -> Self {
        ChargeRequest {
            charges: None,
            min_charge: None,
            max_charge: None,
            padding: DEFAULT_PADDING,
        }
    }
}

impl ChargeRequest {
    /// 是否显式指定了电荷（列表或范围）
    pub fn is_explicit(&self) -> bool {
        self.charges.as_ref().is_some_and(|c| !c.is_empty())
            || self.min_charge.is_some()
            || self.max_charge.is_some()
    }
}

/// 合并命令行与配置文件中的电荷设置；两处都指定时报错
pub fn resolve_charge_request(
    cli: ChargeRequest,
    config_charges: Option<Vec<i32>>,
) -> Result<ChargeRequest> {
    let config_charges = config_charges.filter(|c| !c.is_empty());

    match config_charges {
        Some(config) if cli.is_explicit() => {
            let mut cli_charges = cli.charges.clone().unwrap_or_default();
            cli_charges.extend(cli.min_charge);
            cli_charges.extend(cli.max_charge);
            Err(ShakeError::ConflictingCharges {
                cli: cli_charges,
                config,
            })
        }
        Some(config) => Ok(ChargeRequest {
            charges: Some(config),
            ..cli
        }),
        None => Ok(cli),
    }
}

/// 估计缺陷的形式氧化态
pub fn estimate_oxidation_state(defect: &Defect, estimator: &dyn OxidationEstimator) -> Option<i32> {
    estimator.defect_oxidation_state(
        defect.kind,
        &defect.element,
        defect.original_element.as_deref(),
    )
}

/// 展开缺陷需要计算的电荷态（升序、去重）
pub fn charge_states(
    defect: &Defect,
    request: &ChargeRequest,
    estimator: &dyn OxidationEstimator,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<i32>> {
    if let Some(charges) = request.charges.as_ref().filter(|c| !c.is_empty()) {
        let mut charges = charges.clone();
        charges.sort_unstable();
        charges.dedup();
        return Ok(charges);
    }

    match (request.min_charge, request.max_charge) {
        (Some(a), Some(b)) => return Ok((a.min(b)..=a.max(b)).collect()),
        (Some(_), None) | (None, Some(_)) => {
            return Err(ShakeError::InvalidChargeRange(format!(
                "{}: both min and max charge must be given (min = {:?}, max = {:?})",
                defect.name, request.min_charge, request.max_charge
            )))
        }
        (None, None) => {}
    }

    let oxidation_state = match defect
        .oxidation_state
        .or_else(|| estimate_oxidation_state(defect, estimator))
    {
        Some(ox) => ox,
        None => {
            diagnostics.warn(
                &defect.name,
                "Could not estimate the formal oxidation state; using 0 with padding",
            );
            0
        }
    };

    let (lo, hi) = defect
        .kind
        .charge_state_bounds(oxidation_state, request.padding);
    Ok((lo..=hi).collect())
}

/// 补全氧化态后按电荷态展开为缺陷条目
pub fn defect_entries(
    mut defect: Defect,
    request: &ChargeRequest,
    estimator: &dyn OxidationEstimator,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<DefectEntry>> {
    if defect.oxidation_state.is_none() {
        defect.oxidation_state = estimate_oxidation_state(&defect, estimator);
    }
    let charges = charge_states(&defect, request, estimator, diagnostics)?;
    let defect = Arc::new(defect);
    Ok(charges
        .into_iter()
        .map(|charge| DefectEntry::new(Arc::clone(&defect), charge))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defects::oxidation::CommonOxidationStates;
    use crate::models::{Atom, Crystal, DefectKind, Lattice};

    fn defect(kind: DefectKind, element: &str, original: Option<&str>) -> Defect {
        let crystal = Crystal::new("x", Lattice::cubic(5.0), vec![Atom::new("Te", [0.0; 3])]);
        Defect {
            name: Defect::default_name(kind, element, original),
            kind,
            element: element.to_string(),
            site: [0.5; 3],
            site_index: None,
            original_element: original.map(|s| s.to_string()),
            bulk: crystal.clone(),
            structure: crystal,
            oxidation_state: None,
        }
    }

    #[test]
    fn test_explicit_charges_sorted_and_deduplicated() {
        let request = ChargeRequest {
            charges: Some(vec![0, -2, -1, 0]),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let est = CommonOxidationStates::new();
        let charges =
            charge_states(&defect(DefectKind::Vacancy, "Cd", None), &request, &est, &mut diags)
                .unwrap();
        assert_eq!(charges, vec![-2, -1, 0]);
    }

    #[test]
    fn test_min_max_in_either_order() {
        let request = ChargeRequest {
            min_charge: Some(2),
            max_charge: Some(-1),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let est = CommonOxidationStates::new();
        let charges =
            charge_states(&defect(DefectKind::Vacancy, "Cd", None), &request, &est, &mut diags)
                .unwrap();
        assert_eq!(charges, vec![-1, 0, 1, 2]);
    }

    #[test]
    fn test_only_min_is_an_error() {
        let request = ChargeRequest {
            min_charge: Some(-2),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let est = CommonOxidationStates::new();
        let err =
            charge_states(&defect(DefectKind::Vacancy, "Cd", None), &request, &est, &mut diags)
                .unwrap_err();
        assert!(matches!(err, ShakeError::InvalidChargeRange(_)));
    }

    #[test]
    fn test_oxidation_state_with_padding() {
        let mut diags = Diagnostics::new();
        let est = CommonOxidationStates::new();

        // V_Cd: ox = -2 → [-3, 1]
        let charges = charge_states(
            &defect(DefectKind::Vacancy, "Cd", None),
            &ChargeRequest::default(),
            &est,
            &mut diags,
        )
        .unwrap();
        assert_eq!(charges, vec![-3, -2, -1, 0, 1]);

        // In_Cd: ox = +1, padding 0 → [0, 1]
        let request = ChargeRequest {
            padding: 0,
            ..Default::default()
        };
        let charges = charge_states(
            &defect(DefectKind::Substitution, "In", Some("Cd")),
            &request,
            &est,
            &mut diags,
        )
        .unwrap();
        assert_eq!(charges, vec![0, 1]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unknown_oxidation_state_warns() {
        let mut diags = Diagnostics::new();
        let est = CommonOxidationStates::new();
        let charges = charge_states(
            &defect(DefectKind::Interstitial, "Og", None),
            &ChargeRequest::default(),
            &est,
            &mut diags,
        )
        .unwrap();
        assert_eq!(charges, vec![-1, 0, 1]);
        assert!(diags.has_warnings());
    }

    #[test]
    fn test_conflicting_charge_sources() {
        let cli = ChargeRequest {
            charges: Some(vec![0]),
            ..Default::default()
        };
        let err = resolve_charge_request(cli, Some(vec![-1, 0])).unwrap_err();
        assert!(matches!(err, ShakeError::ConflictingCharges { .. }));

        let merged = resolve_charge_request(ChargeRequest::default(), Some(vec![-1])).unwrap();
        assert_eq!(merged.charges, Some(vec![-1]));

        let only_cli = ChargeRequest {
            min_charge: Some(0),
            max_charge: Some(1),
            ..Default::default()
        };
        assert_eq!(resolve_charge_request(only_cli.clone(), None).unwrap(), only_cli);
    }

    #[test]
    fn test_defect_entries_share_defect() {
        let mut diags = Diagnostics::new();
        let est = CommonOxidationStates::new();
        let request = ChargeRequest {
            padding: 0,
            ..Default::default()
        };
        let entries = defect_entries(
            defect(DefectKind::Vacancy, "Cd", None),
            &request,
            &est,
            &mut diags,
        )
        .unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["v_Cd_-2", "v_Cd_-1", "v_Cd_0"]);
        assert_eq!(entries[0].defect.oxidation_state, Some(-2));
        assert!(Arc::ptr_eq(&entries[0].defect, &entries[2].defect));
    }
}
