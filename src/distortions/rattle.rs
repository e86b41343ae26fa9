//! # 约束随机扰动 (rattle)
//!
//! 对每个活动原子依次抽取三维高斯位移（笛卡尔，标准差 σ）：
//! - 位移长度超过 `max_disp`，或任一最小镜像原子间距小于 `d_min` 时拒绝重抽
//! - 每轮最多 `max_attempts` 次；失败后 σ 乘以 `decay_factor` 再试，
//!   共 `decay_rounds` 轮额外尝试
//! - 仍失败的原子留在原位并记录下来（警告，不是错误）
//!
//! 随机数流由 `StdRng::seed_from_u64(seed)` 产生，相同种子的结果逐位一致。
//!
//! ## 依赖关系
//! - 被 `distortions/generator.rs` 使用
//! - 使用 `rand` + `rand_distr`

use crate::models::structure::{norm, wrap_frac};
use crate::models::Crystal;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// 随机扰动参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RattleSettings {
    pub stdev: f64,
    pub d_min: f64,
    pub max_disp: f64,
    pub max_attempts: usize,
    pub decay_factor: f64,
    pub decay_rounds: u32,
    pub seed: u64,
}

/// 扰动结果
#[derive(Debug, Clone)]
pub struct RattleOutcome {
    pub structure: Crystal,
    /// 用尽尝试次数、留在原位的原子
    pub stuck: Vec<usize>,
}

/// 候选位置与其他所有原子的最小镜像距离是否都不小于 `d_min`
fn satisfies_d_min(
    crystal: &Crystal,
    frac: &[[f64; 3]],
    index: usize,
    candidate: [f64; 3],
    d_min: f64,
) -> bool {
    frac.iter()
        .enumerate()
        .all(|(j, other)| j == index || crystal.lattice.distance(candidate, *other) >= d_min)
}

/// 对 `active` 中的原子做约束随机扰动
pub fn rattle(structure: &Crystal, active: &[usize], settings: &RattleSettings) -> RattleOutcome {
    let lattice = &structure.lattice;
    let mut frac: Vec<[f64; 3]> = structure.atoms.iter().map(|a| a.position).collect();
    let mut stuck = Vec::new();

    if settings.stdev <= 0.0 {
        return RattleOutcome {
            structure: structure.wrapped(),
            stuck,
        };
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);

    for &i in active {
        if i >= frac.len() {
            continue;
        }
        let origin = lattice.frac_to_cart(frac[i]);

        let mut sigma = settings.stdev;
        let mut placed = false;

        'rounds: for _ in 0..=settings.decay_rounds {
            let normal = match Normal::new(0.0, sigma) {
                Ok(n) => n,
                Err(_) => break,
            };

            for _ in 0..settings.max_attempts {
                let d = [
                    normal.sample(&mut rng),
                    normal.sample(&mut rng),
                    normal.sample(&mut rng),
                ];
                if norm(d) > settings.max_disp {
                    continue;
                }

                let candidate =
                    lattice.cart_to_frac([origin[0] + d[0], origin[1] + d[1], origin[2] + d[2]]);
                if satisfies_d_min(structure, &frac, i, candidate, settings.d_min) {
                    frac[i] = candidate;
                    placed = true;
                    break 'rounds;
                }
            }

            sigma *= settings.decay_factor;
        }

        if !placed {
            stuck.push(i);
        }
    }

    let mut rattled = structure.clone();
    for (atom, position) in rattled.atoms.iter_mut().zip(frac) {
        atom.position = wrap_frac(position);
    }

    RattleOutcome {
        structure: rattled,
        stuck,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    fn grid() -> Crystal {
        let mut atoms = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    atoms.push(Atom::new(
                        "Si",
                        [i as f64 / 3.0, j as f64 / 3.0, k as f64 / 3.0],
                    ));
                }
            }
        }
        Crystal::new("grid", Lattice::cubic(9.0), atoms)
    }

    fn settings(seed: u64) -> RattleSettings {
        RattleSettings {
            stdev: 0.25,
            d_min: 2.4,
            max_disp: 2.0,
            max_attempts: 5000,
            decay_factor: 0.5,
            decay_rounds: 3,
            seed,
        }
    }

    fn displacement(a: &Crystal, b: &Crystal, i: usize) -> f64 {
        a.lattice.distance(a.atoms[i].position, b.atoms[i].position)
    }

    #[test]
    fn test_rattle_respects_d_min() {
        let crystal = grid();
        let active: Vec<usize> = (0..crystal.num_atoms()).collect();
        let outcome = rattle(&crystal, &active, &settings(42));

        assert!(outcome.stuck.is_empty());
        assert!(outcome.structure.min_pair_distance().unwrap() >= 2.4 - 1e-9);
        assert_eq!(outcome.structure.num_atoms(), 27);
        // 确实发生了位移
        let moved = (0..27)
            .filter(|&i| displacement(&crystal, &outcome.structure, i) > 1e-6)
            .count();
        assert!(moved > 20);
    }

    #[test]
    fn test_rattle_is_deterministic() {
        let crystal = grid();
        let active: Vec<usize> = (0..crystal.num_atoms()).collect();
        let a = rattle(&crystal, &active, &settings(7));
        let b = rattle(&crystal, &active, &settings(7));
        let c = rattle(&crystal, &active, &settings(8));

        assert_eq!(a.structure, b.structure);
        assert_ne!(a.structure, c.structure);
    }

    #[test]
    fn test_inactive_atoms_stay() {
        let crystal = grid();
        let outcome = rattle(&crystal, &[0, 1], &settings(1));
        for i in 2..27 {
            assert!(displacement(&crystal, &outcome.structure, i) < 1e-9);
        }
    }

    #[test]
    fn test_unsatisfiable_d_min_leaves_atoms_in_place() {
        let crystal = grid();
        let mut s = settings(3);
        // 格点间距 3 Å，d_min 无法满足
        s.d_min = 5.0;
        s.max_attempts = 10;
        let outcome = rattle(&crystal, &[4], &s);

        assert_eq!(outcome.stuck, vec![4]);
        assert!(displacement(&crystal, &outcome.structure, 4) < 1e-9);
    }

    #[test]
    fn test_zero_stdev_disables_rattle() {
        let crystal = grid();
        let mut s = settings(3);
        s.stdev = 0.0;
        let outcome = rattle(&crystal, &[0, 1, 2], &s);
        assert_eq!(outcome.structure, crystal.wrapped());
    }
}
