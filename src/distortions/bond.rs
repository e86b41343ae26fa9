//! # 键畸变与二聚体
//!
//! 键畸变：每个邻居沿“位点 → 邻居”的最小镜像向量 v 移动到 `site + (1+p)·v`，
//! 其余原子不动。二聚体：把两个最近邻对称地拉近到给定键长。
//!
//! ## 依赖关系
//! - 被 `distortions/generator.rs` 使用
//! - 使用 `models/structure.rs`

use crate::models::structure::{norm, wrap_frac};
use crate::models::{Crystal, Neighbour};

/// 对畸变球中的邻居施加键畸变，返回坐标折回 [0, 1) 的新结构
pub fn apply_bond_distortion(
    structure: &Crystal,
    site: [f64; 3],
    neighbours: &[Neighbour],
    fraction: f64,
) -> Crystal {
    let lattice = &structure.lattice;
    let site_cart = lattice.frac_to_cart(site);
    let scale = 1.0 + fraction;

    let mut distorted = structure.wrapped();
    for n in neighbours {
        let v = lattice.min_image_vector(site, structure.atoms[n.index].position);
        let target = [
            site_cart[0] + scale * v[0],
            site_cart[1] + scale * v[1],
            site_cart[2] + scale * v[2],
        ];
        distorted.atoms[n.index].position = wrap_frac(lattice.cart_to_frac(target));
    }
    distorted
}

/// 把两个原子沿它们的连线对称移动，使间距为 `bond_length`
pub fn apply_dimer(structure: &Crystal, first: usize, second: usize, bond_length: f64) -> Crystal {
    let lattice = &structure.lattice;
    let a = structure.atoms[first].position;
    let b = structure.atoms[second].position;

    let ab = lattice.min_image_vector(a, b);
    let length = norm(ab);
    let mut dimer = structure.wrapped();
    if length < 1e-8 {
        return dimer;
    }

    let a_cart = lattice.frac_to_cart(a);
    let shift = 0.5 * (length - bond_length) / length;
    let new_a = [
        a_cart[0] + shift * ab[0],
        a_cart[1] + shift * ab[1],
        a_cart[2] + shift * ab[2],
    ];
    let new_b = [
        a_cart[0] + (1.0 - shift) * ab[0],
        a_cart[1] + (1.0 - shift) * ab[1],
        a_cart[2] + (1.0 - shift) * ab[2],
    ];

    dimer.atoms[first].position = wrap_frac(lattice.cart_to_frac(new_a));
    dimer.atoms[second].position = wrap_frac(lattice.cart_to_frac(new_b));
    dimer
}
