//! # 晶体结构数据模型
//!
//! 超胞晶格 + 原子列表（元素、分数坐标）。核心算法从不从零构造结构，
//! 只对外部给定的结构做坐标变换，因此原子数与元素多重集始终不变。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `defects/`, `distortions/`, `analysis/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let gamma_rad = gamma.to_radians();
        let cos_gamma = gamma_rad.cos();
        let sin_gamma = gamma_rad.sin();

        let a_vec = [a, 0.0, 0.0];
        let b_vec = [b * cos_gamma, b * sin_gamma, 0.0];

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [a_vec, b_vec, [c1, c2, c3]],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 立方晶格
    pub fn cubic(a: f64) -> Self {
        Self::from_vectors([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(a_vec);
        let b = norm(b_vec);
        let c = norm(c_vec);

        let alpha = (dot(b_vec, c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(a_vec, c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(a_vec, b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 计算晶格体积（带符号的行列式）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }

    /// 晶格矩阵的逆矩阵；奇异时返回 None
    pub fn inverse(&self) -> Option<[[f64; 3]; 3]> {
        let m = self.matrix;
        let det = self.volume();
        if det.abs() < 1e-10 {
            return None;
        }

        Some([
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
            ],
        ])
    }

    /// 分数坐标转笛卡尔坐标（行向量约定：r = f · M）
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标；奇异晶格时原样返回
    pub fn cart_to_frac(&self, cart: [f64; 3]) -> [f64; 3] {
        let inv = match self.inverse() {
            Some(inv) => inv,
            None => return cart,
        };
        [
            cart[0] * inv[0][0] + cart[1] * inv[1][0] + cart[2] * inv[2][0],
            cart[0] * inv[0][1] + cart[1] * inv[1][1] + cart[2] * inv[2][1],
            cart[0] * inv[0][2] + cart[1] * inv[1][2] + cart[2] * inv[2][2],
        ]
    }

    /// 最小镜像位移向量（笛卡尔，从 `from` 指向 `to`）
    ///
    /// 先把分数差折回 [-0.5, 0.5)，再检查相邻 27 个镜像，斜晶胞下同样正确。
    pub fn min_image_vector(&self, from: [f64; 3], to: [f64; 3]) -> [f64; 3] {
        let mut delta = [0.0; 3];
        for k in 0..3 {
            let d = to[k] - from[k];
            delta[k] = d - d.round();
        }

        let mut best = self.frac_to_cart(delta);
        let mut best_len = dot(best, best);
        for i in -1..=1 {
            for j in -1..=1 {
                for k in -1..=1 {
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let shifted = [delta[0] + i as f64, delta[1] + j as f64, delta[2] + k as f64];
                    let cart = self.frac_to_cart(shifted);
                    let len = dot(cart, cart);
                    if len < best_len {
                        best = cart;
                        best_len = len;
                    }
                }
            }
        }
        best
    }

    /// 最小镜像距离（Å）
    pub fn distance(&self, a: [f64; 3], b: [f64; 3]) -> f64 {
        norm(self.min_image_vector(a, b))
    }

    /// 度规张量 G = M · Mᵀ
    pub fn metric(&self) -> [[f64; 3]; 3] {
        let m = self.matrix;
        let mut g = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                g[i][j] = dot(m[i], m[j]);
            }
        }
        g
    }

    /// 判断两个晶格是否相同（逐元素相对容差）
    pub fn approx_eq(&self, other: &Lattice, rel_tol: f64) -> bool {
        let scale = self
            .matrix
            .iter()
            .map(|row| norm(*row))
            .fold(0.0_f64, f64::max)
            .max(1e-12);
        self.matrix
            .iter()
            .flatten()
            .zip(other.matrix.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= rel_tol * scale)
    }

    /// 晶格自同构：元素取自 {-1, 0, 1}、|det| = 1 且保持度规的整数矩阵 W
    ///
    /// 分数坐标按 `f → f · W` 变换后笛卡尔距离不变。单位矩阵总是排在第一个。
    pub fn automorphisms(&self, rel_tol: f64) -> Vec<[[i32; 3]; 3]> {
        const IDENTITY: [[i32; 3]; 3] = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];

        let g = self.metric();
        let scale = (0..3).map(|i| g[i][i]).fold(0.0_f64, f64::max).max(1e-12);
        let tol = rel_tol * scale;

        let mut ops = vec![IDENTITY];
        for code in 0..3usize.pow(9) {
            let mut w = [[0i32; 3]; 3];
            let mut rest = code;
            for row in w.iter_mut() {
                for entry in row.iter_mut() {
                    *entry = (rest % 3) as i32 - 1;
                    rest /= 3;
                }
            }
            if w == IDENTITY || int_det(&w).abs() != 1 {
                continue;
            }

            // W G Wᵀ
            let preserved = (0..3).all(|i| {
                (0..3).all(|j| {
                    let mut sum = 0.0;
                    for k in 0..3 {
                        for l in 0..3 {
                            sum += w[i][k] as f64 * g[k][l] * w[j][l] as f64;
                        }
                    }
                    (sum - g[i][j]).abs() <= tol
                })
            });
            if preserved {
                ops.push(w);
            }
        }
        ops
    }
}

fn int_det(m: &[[i32; 3]; 3]) -> i32 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// 分数坐标乘以整数矩阵（行向量约定）
pub fn apply_int_matrix(frac: [f64; 3], w: &[[i32; 3]; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (k, value) in out.iter_mut().enumerate() {
        *value = (0..3).map(|i| frac[i] * w[i][k] as f64).sum();
    }
    out
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: [f64; 3],
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    /// 结构名称
    pub name: String,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表
    pub atoms: Vec<Atom>,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// 元素多重集
    pub fn composition(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        self.composition()
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 两个原子间的最小镜像距离
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.lattice
            .distance(self.atoms[i].position, self.atoms[j].position)
    }

    /// 坐标折回 [0, 1) 的副本
    pub fn wrapped(&self) -> Crystal {
        let mut out = self.clone();
        for atom in &mut out.atoms {
            atom.position = wrap_frac(atom.position);
        }
        out
    }

    /// 最短原子间距离；少于两个原子时返回 None
    pub fn min_pair_distance(&self) -> Option<f64> {
        let n = self.atoms.len();
        let mut best: Option<f64> = None;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.distance(i, j);
                best = Some(best.map_or(d, |b| b.min(d)));
            }
        }
        best
    }

    /// 体相键长估计：所有原子间最短距离
    pub fn bond_length(&self) -> Option<f64> {
        self.min_pair_distance()
    }

    /// 每原子体积 (Å³)
    pub fn volume_per_atom(&self) -> Option<f64> {
        if self.atoms.is_empty() {
            return None;
        }
        Some(self.lattice.volume().abs() / self.atoms.len() as f64)
    }
}

/// 将分数坐标折回 [0, 1)
pub fn wrap_frac(frac: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for k in 0..3 {
        let mut v = frac[k] - frac[k].floor();
        // floor 的舍入可能给出 1.0
        if v >= 1.0 {
            v -= 1.0;
        }
        out[k] = v;
    }
    out
}

pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_from_parameters_cubic() {
        let lattice = Lattice::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0);
        let (a, b, c, alpha, beta, gamma) = lattice.parameters();

        assert!((a - 5.0).abs() < 1e-6);
        assert!((b - 5.0).abs() < 1e-6);
        assert!((c - 5.0).abs() < 1e-6);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((beta - 90.0).abs() < 1e-6);
        assert!((gamma - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_volume_cubic() {
        let lattice = Lattice::cubic(5.0);
        // 5^3 = 125
        assert!((lattice.volume().abs() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_frac_cart_inverse() {
        let lattice = Lattice::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0);
        let frac = [0.1, 0.7, 0.35];
        let back = lattice.cart_to_frac(lattice.frac_to_cart(frac));
        for k in 0..3 {
            assert!((back[k] - frac[k]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_min_image_distance_across_boundary() {
        let lattice = Lattice::cubic(10.0);
        let d = lattice.distance([0.05, 0.0, 0.0], [0.95, 0.0, 0.0]);
        assert!((d - 1.0).abs() < 1e-9);

        let v = lattice.min_image_vector([0.05, 0.0, 0.0], [0.95, 0.0, 0.0]);
        assert!((v[0] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_image_distance_skewed_cell() {
        // 60° 斜晶胞中，简单折回后的向量不一定最短
        let lattice = Lattice::from_parameters(4.0, 4.0, 4.0, 60.0, 60.0, 60.0);
        let d = lattice.distance([0.0, 0.0, 0.0], [0.5, 0.5, 0.0]);
        let brute = (-2..=2)
            .flat_map(|i| (-2..=2).flat_map(move |j| (-2..=2).map(move |k| (i, j, k))))
            .map(|(i, j, k)| {
                norm(lattice.frac_to_cart([0.5 + i as f64, 0.5 + j as f64, k as f64]))
            })
            .fold(f64::INFINITY, f64::min);
        assert!((d - brute).abs() < 1e-9);
    }

    #[test]
    fn test_lattice_automorphisms() {
        let cubic = Lattice::cubic(5.0).automorphisms(1e-3);
        assert_eq!(cubic.len(), 48);
        assert_eq!(cubic[0], [[1, 0, 0], [0, 1, 0], [0, 0, 1]]);

        let tetragonal = Lattice::from_vectors([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 6.0]]);
        assert_eq!(tetragonal.automorphisms(1e-3).len(), 16);

        let p = apply_int_matrix([0.1, 0.2, 0.3], &[[0, 1, 0], [1, 0, 0], [0, 0, -1]]);
        assert_eq!(p, [0.2, 0.1, -0.3]);
    }

    #[test]
    fn test_wrap_frac() {
        let w = wrap_frac([-0.25, 1.5, 0.999_999_999_999_999_9]);
        assert!((w[0] - 0.75).abs() < 1e-12);
        assert!((w[1] - 0.5).abs() < 1e-12);
        assert!(w[2] >= 0.0 && w[2] < 1.0);
    }

    #[test]
    fn test_crystal_formula_and_composition() {
        let atoms = vec![
            Atom::new("Na", [0.0, 0.0, 0.0]),
            Atom::new("Na", [0.5, 0.5, 0.0]),
            Atom::new("Cl", [0.5, 0.0, 0.0]),
        ];
        let crystal = Crystal::new("NaCl", Lattice::cubic(5.0), atoms);

        assert_eq!(crystal.formula(), "ClNa2");
        assert_eq!(crystal.composition()["Na"], 2);
    }

    #[test]
    fn test_min_pair_distance() {
        let atoms = vec![
            Atom::new("Fe", [0.0, 0.0, 0.0]),
            Atom::new("Fe", [0.5, 0.5, 0.5]),
        ];
        let crystal = Crystal::new("Fe", Lattice::cubic(2.87), atoms);
        let d = crystal.min_pair_distance().unwrap();
        assert!((d - 2.87 * 3f64.sqrt() / 2.0).abs() < 1e-9);
    }
}
