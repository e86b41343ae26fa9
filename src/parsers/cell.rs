//! # CASTEP .cell 格式解析与写出
//!
//! CASTEP 计算的输入结构 `castep.cell` 与弛豫结构 `castep-out.cell`
//! 都使用此格式。
//!
//! ## .cell 格式说明
//! ```text
//! %BLOCK LATTICE_CART
//! ang
//! a1 a2 a3
//! b1 b2 b3
//! c1 c2 c3
//! %ENDBLOCK LATTICE_CART
//!
//! %BLOCK POSITIONS_FRAC
//! Element x y z
//! ...
//! %ENDBLOCK POSITIONS_FRAC
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{Result, ShakeError};
use crate::models::{Atom, Crystal, Lattice};
use std::fs;
use std::path::Path;

const BOHR_TO_ANG: f64 = 0.529_177_210_903;

/// 解析 .cell 文件
pub fn parse_cell_file(path: &Path) -> Result<Crystal> {
    let content = fs::read_to_string(path).map_err(|e| ShakeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_cell_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 .cell 格式
pub fn parse_cell_content(content: &str, source: &str) -> Result<Crystal> {
    let fail = |reason: &str| ShakeError::ParseError {
        format: "cell".to_string(),
        path: source.to_string(),
        reason: reason.to_string(),
    };

    let lattice = if let Some(block) = read_block(content, "LATTICE_CART") {
        let (scale, rows) = split_unit(&block);
        let mut matrix = [[0.0; 3]; 3];
        let mut filled = 0;
        for (row, values) in matrix.iter_mut().zip(rows.iter().map(|l| numbers(l))) {
            if values.len() < 3 {
                return Err(fail("Invalid LATTICE_CART row"));
            }
            *row = [values[0] * scale, values[1] * scale, values[2] * scale];
            filled += 1;
        }
        if filled < 3 {
            return Err(fail("Incomplete LATTICE_CART block"));
        }
        Lattice::from_vectors(matrix)
    } else if let Some(block) = read_block(content, "LATTICE_ABC") {
        let (scale, rows) = split_unit(&block);
        let params: Vec<f64> = rows.iter().flat_map(|l| numbers(l)).collect();
        if params.len() < 6 {
            return Err(fail(
                "Incomplete LATTICE_ABC block (need a b c alpha beta gamma)",
            ));
        }
        Lattice::from_parameters(
            params[0] * scale,
            params[1] * scale,
            params[2] * scale,
            params[3],
            params[4],
            params[5],
        )
    } else {
        return Err(fail("Missing LATTICE_CART or LATTICE_ABC block"));
    };

    let atoms = if let Some(block) = read_block(content, "POSITIONS_FRAC") {
        parse_positions(&block)
            .into_iter()
            .map(|(el, p)| Atom::new(el, p))
            .collect()
    } else if let Some(block) = read_block(content, "POSITIONS_ABS") {
        let (scale, rows) = split_unit(&block);
        parse_positions(&rows)
            .into_iter()
            .map(|(el, p)| Atom::new(el, lattice.cart_to_frac([p[0] * scale, p[1] * scale, p[2] * scale])))
            .collect()
    } else {
        return Err(fail("Missing POSITIONS_FRAC or POSITIONS_ABS block"));
    };

    let name = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source)
        .to_string();

    Ok(Crystal::new(name, lattice, atoms))
}

/// 读取 `%BLOCK name` 与 `%ENDBLOCK name` 之间的有效行（去掉注释与空行）
fn read_block(content: &str, block_name: &str) -> Option<Vec<String>> {
    let mut inside = false;
    let mut rows = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_uppercase();
        let mut words = upper.split_whitespace();

        match (words.next(), words.next()) {
            (Some("%BLOCK"), Some(name)) if name == block_name => {
                inside = true;
                continue;
            }
            (Some("%ENDBLOCK"), Some(name)) if inside && name == block_name => {
                return Some(rows);
            }
            _ => {}
        }

        if inside {
            let data = trimmed.split(['#', '!']).next().unwrap_or("").trim();
            if !data.is_empty() {
                rows.push(data.to_string());
            }
        }
    }

    None
}

/// 分离可选的单位行，返回到 Å 的换算因子
fn split_unit(rows: &[String]) -> (f64, Vec<String>) {
    match rows.first().map(|r| r.to_lowercase()) {
        Some(unit) if unit == "ang" => (1.0, rows[1..].to_vec()),
        Some(unit) if unit == "bohr" => (BOHR_TO_ANG, rows[1..].to_vec()),
        Some(unit) if unit == "nm" => (10.0, rows[1..].to_vec()),
        _ => (1.0, rows.to_vec()),
    }
}

fn numbers(line: &str) -> Vec<f64> {
    line.split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// 解析 `Element x y z` 行；`Cd:1` 之类的标签只保留元素
fn parse_positions(rows: &[String]) -> Vec<(String, [f64; 3])> {
    rows.iter()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            let element = parts[0].split(':').next().unwrap_or(parts[0]).to_string();
            let x = parts[1].parse::<f64>().ok()?;
            let y = parts[2].parse::<f64>().ok()?;
            let z = parts[3].parse::<f64>().ok()?;
            Some((element, [x, y, z]))
        })
        .collect()
}

/// 将 Crystal 转换为 .cell 格式字符串
pub fn to_cell_string(crystal: &Crystal) -> String {
    let mut result = String::new();
    result.push_str(&format!("# {}\n", crystal.name));

    result.push_str("%BLOCK LATTICE_CART\nang\n");
    for row in &crystal.lattice.matrix {
        result.push_str(&format!(
            "{:16.10} {:16.10} {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }
    result.push_str("%ENDBLOCK LATTICE_CART\n\n");

    result.push_str("%BLOCK POSITIONS_FRAC\n");
    for atom in &crystal.atoms {
        result.push_str(&format!(
            "{:4} {:16.10} {:16.10} {:16.10}\n",
            atom.element, atom.position[0], atom.position[1], atom.position[2]
        ));
    }
    result.push_str("%ENDBLOCK POSITIONS_FRAC\n");

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_lattice_cart() {
        let content = r#"
%BLOCK LATTICE_CART
ang
5.0 0.0 0.0
0.0 5.0 0.0
0.0 0.0 5.0
%ENDBLOCK LATTICE_CART

%BLOCK POSITIONS_FRAC
Na 0.0 0.0 0.0
Cl 0.5 0.5 0.5
%ENDBLOCK POSITIONS_FRAC
"#;
        let crystal = parse_cell_content(content, "NaCl.cell").unwrap();
        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.atoms.len(), 2);

        let (a, b, c, _, _, _) = crystal.lattice.parameters();
        assert!((a - 5.0).abs() < 0.01);
        assert!((b - 5.0).abs() < 0.01);
        assert!((c - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_cell_lattice_abc() {
        let content = r#"
%block lattice_abc
5.64 5.64 5.64
90.0 90.0 90.0
%endblock lattice_abc

%BLOCK POSITIONS_FRAC
Na 0.0 0.0 0.0
Cl 0.5 0.5 0.5
%ENDBLOCK POSITIONS_FRAC
"#;
        let crystal = parse_cell_content(content, "NaCl").unwrap();
        let (a, _, _, alpha, beta, gamma) = crystal.lattice.parameters();

        assert!((a - 5.64).abs() < 0.01);
        assert!((alpha - 90.0).abs() < 0.01);
        assert!((beta - 90.0).abs() < 0.01);
        assert!((gamma - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_cell_absolute_positions_in_bohr() {
        let content = r#"
%BLOCK LATTICE_CART
ang
4.0 0.0 0.0
0.0 4.0 0.0
0.0 0.0 4.0
%ENDBLOCK LATTICE_CART
%BLOCK POSITIONS_ABS
bohr
Si 0.0 0.0 0.0
Si 1.889726124565 0.0 0.0
%ENDBLOCK POSITIONS_ABS
"#;
        let crystal = parse_cell_content(content, "Si").unwrap();
        // 1.8897 bohr = 1 Å = 0.25 a
        assert!((crystal.atoms[1].position[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_parse_cell_missing_positions() {
        let content = r#"
%BLOCK LATTICE_CART
3.0 0.0 0.0
0.0 3.0 0.0
0.0 0.0 3.0
%ENDBLOCK LATTICE_CART
"#;
        assert!(parse_cell_content(content, "empty").is_err());
    }

    #[test]
    fn test_cell_writer_output_parses() {
        let lattice = Lattice::from_parameters(4.0, 4.0, 4.0, 90.0, 90.0, 90.0);
        let atoms = vec![
            Atom::new("Si", [0.0, 0.0, 0.0]),
            Atom::new("Si", [0.25, 0.25, 0.25]),
        ];
        let crystal = Crystal::new("Si-diamond", lattice, atoms);

        let cell_str = to_cell_string(&crystal);
        let parsed = parse_cell_content(&cell_str, "castep.cell").unwrap();

        assert_eq!(parsed.atoms.len(), 2);
        assert!((parsed.atoms[1].position[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_parse_cell_with_comments() {
        let content = r#"
# This is a comment
! Another comment
%BLOCK LATTICE_CART
ang
3.0 0.0 0.0
0.0 3.0 0.0
0.0 0.0 3.0
%ENDBLOCK LATTICE_CART

%BLOCK POSITIONS_FRAC
# Fe at origin
Fe 0.0 0.0 0.0 ! spin
%ENDBLOCK POSITIONS_FRAC
"#;
        let crystal = parse_cell_content(content, "Fe").unwrap();
        assert_eq!(crystal.atoms.len(), 1);
        assert_eq!(crystal.atoms[0].element, "Fe");
    }
}
