//! # 缺陷目录收集器
//!
//! 扫描输出根目录，收集 `{defect_name}_{charge}` 缺陷目录及其中的
//! 畸变标签子目录，并读取能量与结构。
//!
//! ```text
//! root/
//! ├── v_Cd_0/
//! │   ├── Bond_Distortion_-30.0%/{POSCAR, CONTCAR, OUTCAR}
//! │   ├── Unperturbed/
//! │   └── v_Cd_0_energies.json
//! └── v_Cd_-1/
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/` 调用
//! - 使用 `walkdir` 遍历目录
//! - 使用 `defects/naming.rs` 解析目录名, `parsers/` 读取文件

use crate::analysis::ChargeStateData;
use crate::defects::{parse_defect_folder, DefectFolder};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShakeError};
use crate::models::{entry_name, Crystal, DefectEnergies, DistortionLabel};
use crate::parsers::{parse_structure_file, DftCode};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 一个缺陷目录
#[derive(Debug, Clone)]
pub struct DefectDir {
    pub path: PathBuf,
    pub folder: DefectFolder,
    /// 畸变标签子目录，按规范顺序
    pub labels: Vec<(DistortionLabel, PathBuf)>,
}

impl DefectDir {
    /// 目录名 `{defect_name}_{charge}`
    pub fn entry_name(&self) -> String {
        entry_name(&self.folder.defect_name, self.folder.charge)
    }

    /// 能量记录文件 `{entry_name}_energies.json`
    pub fn energies_path(&self) -> PathBuf {
        self.path.join(format!("{}_energies.json", self.entry_name()))
    }

    pub fn label_dir(&self, label: &DistortionLabel) -> Option<&Path> {
        self.labels
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| p.as_path())
    }
}

/// 缺陷目录收集器
pub struct DefectCollector {
    /// 输出根目录，或单个缺陷目录
    root: PathBuf,
    /// 只收集该缺陷名
    defect: Option<String>,
}

impl DefectCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root, defect: None }
    }

    /// 只收集指定缺陷（目录名或缺陷名均可）
    pub fn with_defect(mut self, defect: Option<&str>) -> Self {
        self.defect = defect.map(str::to_string);
        self
    }

    /// 收集所有缺陷目录，按缺陷名与电荷排序
    ///
    /// 根目录本身就是缺陷目录时只返回它。无法识别的目录名被跳过。
    pub fn collect(&self) -> Result<Vec<DefectDir>> {
        if !self.root.is_dir() {
            return Err(ShakeError::DirectoryNotFound {
                path: self.root.display().to_string(),
            });
        }

        if let Some(dir) = self.as_defect_dir(&self.root) {
            return Ok(vec![dir]);
        }

        let mut dirs: Vec<DefectDir> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| self.as_defect_dir(e.path()))
            .filter(|dir| self.wanted(dir))
            .collect();

        dirs.sort_by(|a, b| {
            a.folder
                .defect_name
                .cmp(&b.folder.defect_name)
                .then(a.folder.charge.cmp(&b.folder.charge))
        });
        Ok(dirs)
    }

    /// 按缺陷名分组
    pub fn collect_grouped(&self) -> Result<BTreeMap<String, Vec<DefectDir>>> {
        let mut groups: BTreeMap<String, Vec<DefectDir>> = BTreeMap::new();
        for dir in self.collect()? {
            groups
                .entry(dir.folder.defect_name.clone())
                .or_default()
                .push(dir);
        }
        Ok(groups)
    }

    fn wanted(&self, dir: &DefectDir) -> bool {
        match &self.defect {
            None => true,
            Some(name) => &dir.folder.defect_name == name || &dir.entry_name() == name,
        }
    }

    /// 目录名可解析且至少含一个标签子目录时视为缺陷目录
    fn as_defect_dir(&self, path: &Path) -> Option<DefectDir> {
        let name = path.file_name()?.to_str()?;
        let folder = match parse_defect_folder(name) {
            Ok(folder) => folder,
            Err(e) => {
                log::debug!("{}", e);
                return None;
            }
        };
        let labels = label_dirs(path);
        if labels.is_empty() {
            return None;
        }
        Some(DefectDir {
            path: path.to_path_buf(),
            folder,
            labels,
        })
    }
}

/// 目录下可解析为畸变标签的子目录，按规范顺序
pub fn label_dirs(dir: &Path) -> Vec<(DistortionLabel, PathBuf)> {
    let mut labels: Vec<(DistortionLabel, PathBuf)> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?;
            let label = DistortionLabel::parse(name).ok()?;
            Some((label, e.path().to_path_buf()))
        })
        .collect();
    labels.sort_by(|a, b| a.0.cmp(&b.0));
    labels
}

/// 解析缺陷目录下所有 DFT 输出中的能量；没有输出的标签不记录
pub fn parse_energies(dir: &DefectDir, code: DftCode, diagnostics: &mut Diagnostics) -> DefectEnergies {
    let entry = dir.entry_name();
    let mut energies = DefectEnergies::new();

    for (label, path) in &dir.labels {
        let output = match code.find_output(path) {
            Some(output) => output,
            None => {
                log::debug!("{}: no {} output for {}", entry, code, label);
                continue;
            }
        };
        match code.parse_energy(&output, label) {
            Ok(record) => {
                if record.final_energy.is_none() {
                    diagnostics.warn(&entry, format!("{}: no final energy in {}", label, output.display()));
                } else if !record.converged {
                    diagnostics.warn(&entry, format!("{}: relaxation not converged", label));
                }
                energies.insert(record);
            }
            Err(e) => diagnostics.warn(&entry, format!("{}: {}", label, e)),
        }
    }
    energies
}

/// 能量：优先解析 DFT 输出，没有任何输出时读取已保存的能量文件
pub fn load_energies(dir: &DefectDir, code: DftCode, diagnostics: &mut Diagnostics) -> DefectEnergies {
    let parsed = parse_energies(dir, code, diagnostics);
    if !parsed.records.is_empty() {
        return parsed;
    }
    let saved = dir.energies_path();
    if saved.is_file() {
        match DefectEnergies::load(&saved) {
            Ok(energies) => return energies,
            Err(e) => diagnostics.warn(dir.entry_name(), e.to_string()),
        }
    }
    parsed
}

/// 读取每个标签目录中名为 `file_name` 的结构
fn load_structures(
    dir: &DefectDir,
    file_name: &str,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<DistortionLabel, Crystal> {
    let mut structures = BTreeMap::new();
    for (label, path) in &dir.labels {
        let file = path.join(file_name);
        if !file.is_file() {
            continue;
        }
        match parse_structure_file(&file) {
            Ok(crystal) => {
                structures.insert(label.clone(), crystal);
            }
            Err(e) => diagnostics.warn(dir.entry_name(), format!("{}: {}", label, e)),
        }
    }
    structures
}

/// 弛豫后的结构
pub fn load_relaxed(
    dir: &DefectDir,
    code: DftCode,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<DistortionLabel, Crystal> {
    load_structures(dir, code.relaxed_structure(), diagnostics)
}

/// 读取整合所需的一个电荷态的全部数据
pub fn load_charge_state(dir: &DefectDir, code: DftCode, diagnostics: &mut Diagnostics) -> ChargeStateData {
    ChargeStateData {
        charge: dir.folder.charge,
        energies: load_energies(dir, code, diagnostics),
        relaxed: load_relaxed(dir, code, diagnostics),
        initial: load_structures(dir, code.input_structure(), diagnostics),
    }
}
