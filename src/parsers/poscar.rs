//! # VASP POSCAR 格式解析与写出
//!
//! 读入缺陷 / 体相超胞，写出试探结构；CONTCAR 与 POSCAR 格式相同。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! 写出时按原子顺序输出连续的元素块（允许 `Cd Te Cd` 这样重复的块），
//! 保证原子索引与元数据中的索引一致。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{Result, ShakeError};
use crate::models::{Atom, Crystal, Lattice};
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<Crystal> {
    let content = fs::read_to_string(path).map_err(|e| ShakeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_poscar_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str, source: &str) -> Result<Crystal> {
    let fail = |reason: String| ShakeError::ParseError {
        format: "poscar".to_string(),
        path: source.to_string(),
        reason,
    };

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < 8 {
        return Err(fail("File too short".to_string()));
    }

    let name = lines[0].trim().to_string();

    // 负的缩放因子表示目标体积
    let scale_raw: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| fail("Invalid scaling factor".to_string()))?;

    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .take(3)
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(fail(format!("Invalid lattice vector at line {}", 3 + i)));
        }
        *row = [parts[0], parts[1], parts[2]];
    }

    let scale = if scale_raw < 0.0 {
        let volume = Lattice::from_vectors(matrix).volume().abs();
        (scale_raw.abs() / volume).cbrt()
    } else {
        scale_raw
    };
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v *= scale;
        }
    }
    let lattice = Lattice::from_vectors(matrix);

    // Line 5: 元素符号 (VASP 5+) 或原子数 (VASP 4)
    let line5: Vec<&str> = lines[5].split_whitespace().collect();
    if line5.is_empty() {
        return Err(fail("Missing species line".to_string()));
    }
    let (elements, counts, mut coord_line) = if line5[0].parse::<usize>().is_ok() {
        // VASP 4 没有元素行，用注释行中的符号补齐，否则使用占位符
        let counts: Vec<usize> = line5.iter().filter_map(|s| s.parse().ok()).collect();
        let from_comment: Vec<String> = name
            .split_whitespace()
            .take(counts.len())
            .map(|s| s.to_string())
            .collect();
        let elements = if from_comment.len() == counts.len() {
            from_comment
        } else {
            (0..counts.len()).map(|i| format!("X{}", i + 1)).collect()
        };
        (elements, counts, 6)
    } else {
        let elements: Vec<String> = line5
            .iter()
            // POTCAR 风格的 `Cd_GW` 等后缀
            .map(|s| s.split(['_', '/']).next().unwrap_or(s).to_string())
            .collect();
        let counts: Vec<usize> = lines[6]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        (elements, counts, 7)
    };

    if elements.len() != counts.len() {
        return Err(fail(format!(
            "{} species but {} counts",
            elements.len(),
            counts.len()
        )));
    }

    if lines.len() > coord_line
        && lines[coord_line]
            .trim()
            .to_lowercase()
            .starts_with('s')
    {
        coord_line += 1;
    }

    if lines.len() <= coord_line {
        return Err(fail("Missing coordinate type line".to_string()));
    }

    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');

    let total: usize = counts.iter().sum();
    let mut atoms: Vec<Atom> = Vec::with_capacity(total);
    let mut position_lines = lines[coord_line + 1..]
        .iter()
        .filter(|l| !l.trim().is_empty());

    for (element, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let line = position_lines.next().ok_or_else(|| {
                fail(format!("Expected {} positions, found {}", total, atoms.len()))
            })?;
            let parts: Vec<f64> = line
                .split_whitespace()
                .take(3)
                .filter_map(|s| s.parse().ok())
                .collect();
            if parts.len() < 3 {
                return Err(fail(format!("Invalid position line: '{}'", line.trim())));
            }

            let position = if is_cartesian {
                lattice.cart_to_frac([parts[0] * scale, parts[1] * scale, parts[2] * scale])
            } else {
                [parts[0], parts[1], parts[2]]
            };
            atoms.push(Atom::new(element.clone(), position));
        }
    }

    Ok(Crystal::new(name, lattice, atoms))
}

/// 将 Crystal 转换为 POSCAR 字符串（分数坐标，保持原子顺序）
pub fn to_poscar_string(crystal: &Crystal) -> String {
    // 连续的同种元素合并为一个块
    let mut blocks: Vec<(&str, usize)> = Vec::new();
    for atom in &crystal.atoms {
        match blocks.last_mut() {
            Some((el, n)) if *el == atom.element => *n += 1,
            _ => blocks.push((atom.element.as_str(), 1)),
        }
    }

    let mut result = String::new();
    result.push_str(&format!("{}\n", crystal.name));
    result.push_str("1.0\n");

    for row in &crystal.lattice.matrix {
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }

    let symbols: Vec<&str> = blocks.iter().map(|(el, _)| *el).collect();
    let counts: Vec<String> = blocks.iter().map(|(_, n)| n.to_string()).collect();
    result.push_str(&format!("   {}\n", symbols.join("   ")));
    result.push_str(&format!("   {}\n", counts.join("   ")));
    result.push_str("Direct\n");

    for atom in &crystal.atoms {
        let p = atom.position;
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}  {}\n",
            p[0], p[1], p[2], atom.element
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
4 4
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.5
0.0 0.5 0.5
0.5 0.0 0.0
0.0 0.5 0.0
0.0 0.0 0.5
0.5 0.5 0.5
"#;
        let crystal = parse_poscar_content(content, "NaCl").unwrap();
        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.atoms.len(), 8);
        assert_eq!(crystal.composition()["Na"], 4);
        assert_eq!(crystal.composition()["Cl"], 4);
    }

    #[test]
    fn test_parse_poscar_with_scale_and_cartesian() {
        let content = r#"Si
2.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Si
2
Cartesian
0.0 0.0 0.0
1.0 1.0 1.0
"#;
        let crystal = parse_poscar_content(content, "Si").unwrap();
        let (a, _, _, _, _, _) = crystal.lattice.parameters();
        assert!((a - 4.0).abs() < 1e-9);
        // 笛卡尔坐标同样乘以缩放因子：(2,2,2) / 4 = 0.5
        assert!((crystal.atoms[1].position[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_poscar_selective_dynamics() {
        let content = r#"Fe with selective
1.0
2.87 0.0 0.0
0.0 2.87 0.0
0.0 0.0 2.87
Fe
2
Selective dynamics
Direct
0.0 0.0 0.0 T T T
0.5 0.5 0.5 F F F
"#;
        let crystal = parse_poscar_content(content, "Fe").unwrap();
        assert_eq!(crystal.atoms.len(), 2);
    }

    #[test]
    fn test_parse_poscar_truncated_positions() {
        let content = r#"Fe
1.0
2.87 0.0 0.0
0.0 2.87 0.0
0.0 0.0 2.87
Fe
3
Direct
0.0 0.0 0.0
0.5 0.5 0.5
"#;
        assert!(parse_poscar_content(content, "Fe").is_err());
    }

    #[test]
    fn test_writer_keeps_interleaved_order() {
        let atoms = vec![
            Atom::new("Cd", [0.0, 0.0, 0.0]),
            Atom::new("Te", [0.25, 0.25, 0.25]),
            Atom::new("Cd", [0.5, 0.5, 0.0]),
        ];
        let crystal = Crystal::new("mixed", Lattice::cubic(6.5), atoms);

        let text = to_poscar_string(&crystal);
        let parsed = parse_poscar_content(&text, "mixed").unwrap();

        let order: Vec<&str> = parsed.atoms.iter().map(|a| a.element.as_str()).collect();
        assert_eq!(order, vec!["Cd", "Te", "Cd"]);
        assert!((parsed.atoms[2].position[1] - 0.5).abs() < 1e-9);
    }
}
