//! # generate / generate-all 子命令实现
//!
//! 识别缺陷、展开电荷态、并行生成试探结构，写出
//! `{path}/{entry}/{label}/{POSCAR | castep.cell}` 并更新畸变元数据。
//!
//! ## 功能
//! - 单个缺陷（显式索引 / 坐标，或自动匹配位点）
//! - 缺陷目录批量生成：文件或子目录，名称取自文件名 / 目录名，
//!   配置 `[defects.<name>]` 可逐个指定电荷与位点
//! - 与已有 `distortion_metadata.json` 合并
//!
//! ## 依赖关系
//! - 使用 `cli/generate.rs` 定义的参数
//! - 使用 `defects/`, `distortions/`, `parsers/`, `batch/runner.rs`
//! - 使用 `utils/output.rs`

use crate::batch::{BatchResult, BatchRunner, ProcessResult};
use crate::cli::generate::{GenerateAllArgs, GenerateArgs};
use crate::defects::{
    defect_entries, identify, resolve_charge_request, ChargeRequest, CommonOxidationStates,
    OxidationEstimator,
};
use crate::diagnostics::Diagnostics;
use crate::distortions::{
    DefectSettings, DistortionConfig, DistortionGenerator, DistortionMetadata, GenerationResult,
    METADATA_FILE,
};
use crate::error::{Result, ShakeError};
use crate::models::{Crystal, DefectEntry};
use crate::parsers::{parse_structure_file, write_structure_file, DftCode};
use crate::utils::output;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use walkdir::WalkDir;

/// 生成结果表的一行
#[derive(Debug, Clone, Tabled)]
struct EntryRow {
    #[tabled(rename = "Entry")]
    entry: String,
    #[tabled(rename = "Distorted neighbours")]
    neighbours: String,
    #[tabled(rename = "Trials")]
    trials: usize,
    #[tabled(rename = "Warnings")]
    warnings: usize,
}

/// 一次生成的汇总
#[derive(Debug)]
pub struct GenerationSummary {
    /// 成功条目的生成结果，顺序与输入一致
    pub results: Vec<GenerationResult>,
    pub batch: BatchResult,
    /// 已有元数据文件的生成参数与本次不同
    pub parameters_changed: bool,
}

/// 执行 generate
pub fn execute(args: GenerateArgs) -> Result<()> {
    output::print_header("Generating Trial Distortions");

    let config = super::load_config(args.config.as_deref())?;
    let request =
        resolve_charge_request(args.charge.to_request(config.padding), config.charges.clone())?;

    let bulk = parse_structure_file(&args.bulk)?;
    let structure = parse_structure_file(&args.defect)?;
    let identification = identify(&structure, &bulk, args.defect_index, args.coords())?;

    let mut defect = identification.defect;
    if let Some(name) = &args.name {
        defect = defect.with_name(name.clone());
    }
    output::print_info(&format!(
        "Identified {} {} ({})",
        defect.kind,
        defect.name,
        defect.site_description()
    ));

    let estimator = CommonOxidationStates::with_overrides(config.oxidation_states.clone());
    let mut diagnostics = identification.diagnostics;
    let defect_name = defect.name.clone();
    let entries = defect_entries(defect, &request, &estimator, &mut diagnostics)?;
    output::print_info(&format!(
        "Charge states: {}",
        entries
            .iter()
            .map(|e| e.charge.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let runner = BatchRunner::new(args.jobs);
    let mut summary = generate_entries(&entries, &config, args.code, &args.path, &runner)?;
    let setup = BTreeMap::from([(defect_name, diagnostics)]);
    attach_setup_diagnostics(&mut summary, &entries, &setup);
    report(&summary, &args.path)
}

/// 执行 generate-all
pub fn execute_all(args: GenerateAllArgs) -> Result<()> {
    output::print_header("Generating Trial Distortions (all defects)");

    let config = super::load_config(args.config.as_deref())?;
    let request =
        resolve_charge_request(args.charge.to_request(config.padding), config.charges.clone())?;
    let bulk = parse_structure_file(&args.bulk)?;

    let sources = defect_sources(&args.defects)?;
    if sources.is_empty() {
        return Err(ShakeError::Other(format!(
            "no defect structures found in '{}'",
            args.defects.display()
        )));
    }
    output::print_info(&format!(
        "Found {} defect structures in '{}'",
        sources.len(),
        args.defects.display()
    ));

    let estimator = CommonOxidationStates::with_overrides(config.oxidation_states.clone());
    let mut used_names = BTreeSet::new();
    let mut entries: Vec<DefectEntry> = Vec::new();
    let mut setup: BTreeMap<String, Diagnostics> = BTreeMap::new();

    for source in &sources {
        let mut diagnostics = Diagnostics::new();
        match source_entries(
            source,
            &bulk,
            &config,
            &request,
            &estimator,
            &mut used_names,
            &mut diagnostics,
        ) {
            Ok(found) => {
                if let Some(first) = found.first() {
                    setup.insert(first.defect.name.clone(), diagnostics);
                }
                entries.extend(found);
            }
            Err(e) => output::print_warning(&format!("{}: {}", source.path.display(), e)),
        }
    }

    for name in config.defects.keys() {
        let matched = setup.contains_key(name)
            || sources.iter().any(|s| s.name.as_deref() == Some(name.as_str()));
        if !matched {
            output::print_warning(&format!(
                "settings for defect '{}' match no structure in '{}'",
                name,
                args.defects.display()
            ));
        }
    }

    let runner = BatchRunner::new(args.jobs);
    let mut summary = generate_entries(&entries, &config, args.code, &args.path, &runner)?;
    attach_setup_diagnostics(&mut summary, &entries, &setup);
    report(&summary, &args.path)
}

/// 识别一个结构来源并展开电荷态
///
/// 配置 `[defects.<name>]` 中的位点与电荷优先于自动匹配与全局电荷设置。
/// 按来源名查找；查不到时电荷设置再按识别出的缺陷名查找。
fn source_entries(
    source: &DefectSource,
    bulk: &Crystal,
    config: &DistortionConfig,
    request: &ChargeRequest,
    estimator: &dyn OxidationEstimator,
    used_names: &mut BTreeSet<String>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<DefectEntry>> {
    let structure = parse_structure_file(&source.path)?;
    let settings = source.name.as_ref().and_then(|n| config.defects.get(n));
    let (index, coords) = settings.map_or((None, None), |s| (s.defect_index, s.defect_coords));

    let identification = identify(&structure, bulk, index, coords)?;
    diagnostics.extend(identification.diagnostics);
    let defect = identification.defect;

    let settings = settings.or_else(|| config.defects.get(&defect.name));
    let request = match settings.and_then(DefectSettings::charges) {
        Some(charges) => ChargeRequest {
            charges: Some(charges),
            min_charge: None,
            max_charge: None,
            padding: request.padding,
        },
        None => request.clone(),
    };

    let base = source.name.clone().unwrap_or_else(|| defect.name.clone());
    let name = unique_name(&base, used_names);
    defect_entries(defect.with_name(name), &request, estimator, diagnostics)
}

/// 把识别与电荷阶段的诊断并入对应缺陷的每个条目
fn attach_setup_diagnostics(
    summary: &mut GenerationSummary,
    entries: &[DefectEntry],
    setup: &BTreeMap<String, Diagnostics>,
) {
    let defect_of: BTreeMap<&str, &str> = entries
        .iter()
        .map(|e| (e.name.as_str(), e.defect.name.as_str()))
        .collect();
    for result in &mut summary.results {
        if let Some(diagnostics) = defect_of
            .get(result.entry_name.as_str())
            .and_then(|defect| setup.get(*defect))
        {
            result.diagnostics.extend(diagnostics.clone());
        }
    }
}

/// 生成并写出所有条目的试探结构，然后合并保存元数据
///
/// 单个条目失败不影响其他条目；失败记录在 `batch.failures` 中。
pub fn generate_entries(
    entries: &[DefectEntry],
    config: &DistortionConfig,
    code: DftCode,
    root: &Path,
    runner: &BatchRunner,
) -> Result<GenerationSummary> {
    let generator = DistortionGenerator::new(config.clone())?;

    let outcomes = runner.map(entries, "Generating", |entry| -> Result<GenerationResult> {
        let result = generator.generate(entry)?;
        write_trials(&result, code, root)?;
        Ok(result)
    })?;

    let mut metadata = DistortionMetadata::new(config);
    let mut batch = BatchResult::default();
    let mut results = Vec::new();

    for (entry, outcome) in entries.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                metadata.record_generation(&entry.defect, &result);
                batch.merge(ProcessResult::Success(entry.name.clone()));
                results.push(result);
            }
            Err(e) => batch.merge(ProcessResult::Failed(entry.name.clone(), e.to_string())),
        }
    }

    let mut parameters_changed = false;
    if !results.is_empty() {
        let path = root.join(METADATA_FILE);
        if let Some(older) = DistortionMetadata::load_if_exists(&path)? {
            parameters_changed = metadata.merge(older);
        }
        metadata.save(&path)?;
    }

    Ok(GenerationSummary {
        results,
        batch,
        parameters_changed,
    })
}

/// 写出一个条目的全部试探结构，已存在的文件被覆盖
pub fn write_trials(result: &GenerationResult, code: DftCode, root: &Path) -> Result<()> {
    let entry_dir = root.join(&result.entry_name);
    for trial in &result.trials {
        let path = entry_dir
            .join(trial.spec.label.to_string())
            .join(code.input_structure());
        write_structure_file(code, &path, &trial.structure)?;
    }
    Ok(())
}

fn report(summary: &GenerationSummary, root: &Path) -> Result<()> {
    for (name, err) in &summary.batch.failures {
        output::print_error(&format!("{}: {}", name, err));
    }
    if summary.results.is_empty() {
        return Err(ShakeError::Other("no trial structures were generated".to_string()));
    }

    let rows: Vec<EntryRow> = summary
        .results
        .iter()
        .map(|r| EntryRow {
            entry: r.entry_name.clone(),
            neighbours: describe_neighbours(r),
            trials: r.trials.len(),
            warnings: r.diagnostics.warnings().count(),
        })
        .collect();
    println!("{}", Table::new(&rows));

    if summary.parameters_changed {
        output::print_warning(&format!(
            "'{}' was written with different parameters; older entries were kept",
            METADATA_FILE
        ));
    }
    output::print_done(&format!(
        "{} of {} entries written to '{}'",
        summary.batch.success,
        summary.batch.total(),
        root.display()
    ));
    Ok(())
}

/// 如 `2 Te` 或 `3 Te, 1 Cd`
fn describe_neighbours(result: &GenerationResult) -> String {
    if result.sphere.is_empty() {
        return "-".to_string();
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for n in &result.sphere.neighbours {
        *counts.entry(n.element.as_str()).or_default() += 1;
    }
    counts
        .iter()
        .map(|(el, n)| format!("{} {}", n, el))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 缺陷目录中的一个结构来源
#[derive(Debug, Clone, PartialEq)]
struct DefectSource {
    /// 取自文件名或目录名；通用文件名（如 `POSCAR`）为 None
    name: Option<String>,
    path: PathBuf,
}

fn is_structure_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    name.starts_with("POSCAR")
        || name.starts_with("CONTCAR")
        || matches!(ext.as_str(), "cell" | "vasp" | "poscar")
}

/// 由文件名推断缺陷名：`POSCAR_v_Cd` → `v_Cd`, `In_Cd.vasp` → `In_Cd`
fn name_from_file(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = stem
        .strip_prefix("POSCAR")
        .or_else(|| stem.strip_prefix("CONTCAR"))
        .unwrap_or(stem)
        .trim_start_matches(['_', '-', '.']);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// 子目录中的结构文件：POSCAR 优先，其次 CONTCAR，再次任意 .cell
fn structure_in_dir(dir: &Path) -> Option<PathBuf> {
    for name in ["POSCAR", "CONTCAR"] {
        let path = dir.join(name);
        if path.is_file() {
            return Some(path);
        }
    }
    let pattern = dir.join("*.cell");
    let mut cells: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .ok()?
        .filter_map(|p| p.ok())
        .collect();
    cells.sort();
    cells.into_iter().next()
}

/// 列出缺陷目录中的结构来源，按名称排序
fn defect_sources(dir: &Path) -> Result<Vec<DefectSource>> {
    if !dir.is_dir() {
        return Err(ShakeError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let sources = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            if e.file_type().is_dir() {
                let name = e.file_name().to_str().map(str::to_string);
                structure_in_dir(path).map(|path| DefectSource { name, path })
            } else if is_structure_file(path) {
                Some(DefectSource {
                    name: name_from_file(path),
                    path: path.to_path_buf(),
                })
            } else {
                None
            }
        })
        .collect();
    Ok(sources)
}

/// 重名时追加 `_s1`, `_s2`, ...
fn unique_name(base: &str, used: &mut BTreeSet<String>) -> String {
    let mut name = base.to_string();
    let mut n = 1;
    while used.contains(&name) {
        name = format!("{}_s{}", base, n);
        n += 1;
    }
    used.insert(name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortions::{NeighbourRule, NeighbourSphere};
    use crate::models::{Atom, Lattice};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_name_from_file() {
        assert_eq!(name_from_file(Path::new("POSCAR_v_Cd")), Some("v_Cd".to_string()));
        assert_eq!(name_from_file(Path::new("In_Cd.vasp")), Some("In_Cd".to_string()));
        assert_eq!(name_from_file(Path::new("Te_i.cell")), Some("Te_i".to_string()));
        assert_eq!(name_from_file(Path::new("POSCAR")), None);
    }

    #[test]
    fn test_unique_name() {
        let mut used = BTreeSet::new();
        assert_eq!(unique_name("v_Cd", &mut used), "v_Cd");
        assert_eq!(unique_name("v_Cd", &mut used), "v_Cd_s1");
        assert_eq!(unique_name("v_Cd", &mut used), "v_Cd_s2");
        assert_eq!(unique_name("Te_i", &mut used), "Te_i");
    }

    /// 两个 Na 位点到剩余原子等距，自动匹配无法区分
    fn ambiguous_vacancy(dir: &Path) -> (Crystal, DefectSource) {
        let lattice = Lattice::cubic(10.0);
        let bulk = Crystal::new(
            "bulk",
            lattice.clone(),
            vec![
                Atom::new("Na", [0.0, 0.0, 0.0]),
                Atom::new("Na", [0.5, 0.5, 0.5]),
            ],
        );
        let defect = Crystal::new("v_Na", lattice, vec![Atom::new("Na", [0.25, 0.25, 0.25])]);
        let path = dir.join("POSCAR_v_Na");
        write_structure_file(DftCode::Vasp, &path, &defect).unwrap();
        let source = DefectSource {
            name: Some("v_Na".to_string()),
            path,
        };
        (bulk, source)
    }

    #[test]
    fn test_ambiguous_site_resolved_by_defect_settings() {
        let dir = TempDir::new().unwrap();
        let (bulk, source) = ambiguous_vacancy(dir.path());
        let estimator = CommonOxidationStates::with_overrides(BTreeMap::new());
        let request = ChargeRequest::default();

        let config = DistortionConfig::default();
        let err = source_entries(
            &source,
            &bulk,
            &config,
            &request,
            &estimator,
            &mut BTreeSet::new(),
            &mut Diagnostics::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ShakeError::AmbiguousSite { .. }));

        let toml = "[defects.v_Na]\ndefect_index = 1\ncharges = [-1, 0]\n";
        let (config, _) = DistortionConfig::from_toml_str(toml, "shake.toml").unwrap();
        let entries = source_entries(
            &source,
            &bulk,
            &config,
            &request,
            &estimator,
            &mut BTreeSet::new(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["v_Na_-1", "v_Na_0"]);
        assert_eq!(entries[0].defect.site_index, Some(1));
        assert_eq!(entries[0].defect.site, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_defect_settings_charge_shorthand_overrides_request() {
        let dir = TempDir::new().unwrap();
        let (bulk, source) = ambiguous_vacancy(dir.path());
        let estimator = CommonOxidationStates::with_overrides(BTreeMap::new());
        let request = ChargeRequest {
            charges: Some(vec![-1, 0, 1]),
            ..Default::default()
        };

        let toml = "[defects.v_Na]\ndefect_coords = [0.0, 0.0, 0.0]\ncharge = 0\n";
        let (config, _) = DistortionConfig::from_toml_str(toml, "shake.toml").unwrap();
        let entries = source_entries(
            &source,
            &bulk,
            &config,
            &request,
            &estimator,
            &mut BTreeSet::new(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "v_Na_0");
        assert_eq!(entries[0].defect.site_index, Some(0));
    }

    #[test]
    fn test_setup_diagnostics_reach_every_entry() {
        let dir = TempDir::new().unwrap();
        let (bulk, source) = ambiguous_vacancy(dir.path());
        let toml = "[defects.v_Na]\ndefect_index = 0\ncharges = [-1, 0]\n";
        let (config, _) = DistortionConfig::from_toml_str(toml, "shake.toml").unwrap();
        let entries = source_entries(
            &source,
            &bulk,
            &config,
            &ChargeRequest::default(),
            &CommonOxidationStates::new(),
            &mut BTreeSet::new(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        let mut setup_diagnostics = Diagnostics::new();
        setup_diagnostics.warn("v_Na", "defect and bulk lattices differ");
        let setup = BTreeMap::from([("v_Na".to_string(), setup_diagnostics)]);

        let mut summary = GenerationSummary {
            results: entries
                .iter()
                .map(|e| GenerationResult {
                    entry_name: e.name.clone(),
                    charge: e.charge,
                    sphere: NeighbourSphere {
                        rule: NeighbourRule::Electrons(0),
                        neighbours: Vec::new(),
                    },
                    trials: Vec::new(),
                    unperturbed_atoms: BTreeMap::new(),
                    diagnostics: Diagnostics::new(),
                })
                .collect(),
            batch: BatchResult::default(),
            parameters_changed: false,
        };
        attach_setup_diagnostics(&mut summary, &entries, &setup);

        assert_eq!(summary.results.len(), 2);
        assert!(summary
            .results
            .iter()
            .all(|r| r.diagnostics.warnings().count() == 1));
    }

    #[test]
    fn test_defect_sources() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("v_Te")).unwrap();
        fs::write(root.join("v_Te/POSCAR"), "").unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("POSCAR_v_Cd"), "").unwrap();
        fs::write(root.join("Te_i.cell"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let sources = defect_sources(root).unwrap();
        let names: Vec<Option<&str>> = sources.iter().map(|s| s.name.as_deref()).collect();
        assert_eq!(names, vec![Some("v_Cd"), Some("Te_i"), Some("v_Te")]);
        assert_eq!(sources[2].path, root.join("v_Te/POSCAR"));
    }
}
