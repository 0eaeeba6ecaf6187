#![forbid(unsafe_code)]

//! Source discovery and per-unit translation.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use ferrite_ast::LineIndex;
use ferrite_backend_rust::{BinTarget, RustArtifacts, render_cargo_manifest};
use ferrite_core::{ApiTable, TranslateOptions};
use ferrite_rir::Dependency;
use miette::{IntoDiagnostic, NamedSource};
use rayon::prelude::*;
use tracing::{debug, info, info_span};

pub const SOURCE_EXTENSION: &str = "ts";

/// One input file and the Rust module name derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unit {
    pub path: PathBuf,
    pub module_name: String,
}

pub struct UnitOutput {
    pub unit: Unit,
    pub result: miette::Result<RustArtifacts>,
}

/// Expands directories (recursively) into `.ts` files, sorted and
/// de-duplicated. Explicit file arguments are taken as given.
pub fn discover(paths: &[PathBuf]) -> miette::Result<Vec<Unit>> {
    let mut files = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            collect_dir(path, &mut files)?;
        } else if path.is_file() {
            files.insert(path.clone());
        } else {
            return Err(miette::miette!("no such file or directory: {}", path.display()));
        }
    }

    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut units = Vec::with_capacity(files.len());
    for path in files {
        let module_name = module_name(&path);
        if let Some(previous) = by_name.insert(module_name.clone(), path.clone()) {
            return Err(miette::miette!(
                "{} and {} would both be written as `{module_name}.rs`",
                previous.display(),
                path.display()
            ));
        }
        units.push(Unit { path, module_name });
    }
    Ok(units)
}

fn collect_dir(dir: &Path, out: &mut BTreeSet<PathBuf>) -> miette::Result<()> {
    for entry in fs::read_dir(dir).into_diagnostic()? {
        let path = entry.into_diagnostic()?.path();
        let hidden = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|n| n.starts_with('.') || n == "node_modules");
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_dir(&path, out)?;
        } else if is_source_file(&path) {
            out.insert(path);
        }
    }
    Ok(())
}

fn is_source_file(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(SOURCE_EXTENSION)) && !is_declaration_file(path)
}

/// `.d.ts` files declare types only.
fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|n| n.ends_with(".d.ts"))
}

/// File stem as a Rust identifier: `user-service.ts` -> `user_service`.
pub fn module_name(path: &Path) -> String {
    let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or("unit");
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Translates every unit in parallel. Units share nothing but the
/// read-only options and table; results come back in input order.
pub fn translate_all(
    units: &[Unit],
    options: &TranslateOptions,
    api: &ApiTable,
) -> Vec<UnitOutput> {
    let _span = info_span!("translate_all", units = units.len()).entered();
    units
        .par_iter()
        .map(|unit| UnitOutput {
            unit: unit.clone(),
            result: translate_file(&unit.path, options, api),
        })
        .collect()
}

pub fn translate_file(
    path: &Path,
    options: &TranslateOptions,
    api: &ApiTable,
) -> miette::Result<RustArtifacts> {
    let src = fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))?;
    translate_source(&path.display().to_string(), src, options, api)
}

pub fn translate_source(
    name: &str,
    src: String,
    options: &TranslateOptions,
    api: &ApiTable,
) -> miette::Result<RustArtifacts> {
    let _span = info_span!("unit", name).entered();
    let source = NamedSource::new(name, src.clone());

    let program =
        ferrite_parse::parse_source(&src).map_err(|e| e.with_source_code(source.clone()))?;
    debug!(items = program.items.len(), "parsed");

    let module = ferrite_core::translate_unit(&program, options, api).map_err(|failed| {
        let lines = LineIndex::new(name, &src);
        for err in &failed.errors {
            debug!(location = %lines.location(err.span()), kind = ?err.kind(), "diagnostic");
        }
        miette::Report::new(failed).with_source_code(source.clone())
    })?;
    let artifacts = ferrite_backend_rust::emit_module(&module).map_err(miette::Report::new)?;
    info!(bytes = artifacts.source.len(), "translated");
    Ok(artifacts)
}

/// Writes `<out_dir>/<module>.rs` for each translated unit, plus a
/// `Cargo.toml` when `package` is given.
pub fn write_outputs(
    out_dir: &Path,
    outputs: &[(&Unit, &RustArtifacts)],
    package: Option<&str>,
) -> miette::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("failed to create {}", out_dir.display())))?;

    let mut written = Vec::with_capacity(outputs.len() + 1);
    let mut deps: BTreeSet<Dependency> = BTreeSet::new();
    let mut bins = Vec::new();
    for (unit, artifacts) in outputs {
        let file_name = format!("{}.rs", unit.module_name);
        let path = out_dir.join(&file_name);
        fs::write(&path, &artifacts.source)
            .into_diagnostic()
            .map_err(|e| e.wrap_err(format!("failed to write {}", path.display())))?;
        debug!(path = %path.display(), "wrote unit");
        written.push(path);

        deps.extend(artifacts.dependencies.iter().copied());
        if artifacts.has_main {
            bins.push(BinTarget {
                name: unit.module_name.clone(),
                path: file_name,
            });
        }
    }

    if let Some(package) = package {
        let path = out_dir.join("Cargo.toml");
        fs::write(&path, render_cargo_manifest(package, &bins, &deps))
            .into_diagnostic()
            .map_err(|e| e.wrap_err(format!("failed to write {}", path.display())))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_are_identifiers() {
        assert_eq!(module_name(Path::new("src/user-service.ts")), "user_service");
        assert_eq!(module_name(Path::new("2fa.ts")), "_2fa");
        assert_eq!(module_name(Path::new("Main.ts")), "main");
    }

    #[test]
    fn discovery_walks_directories_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("nested")).expect("mkdir");
        fs::create_dir_all(root.join("node_modules/pkg")).expect("mkdir");
        let files = [
            "b.ts",
            "a.ts",
            "nested/c.ts",
            "types.d.ts",
            "notes.md",
            "node_modules/pkg/x.ts",
        ];
        for file in files {
            fs::write(root.join(file), "").expect("write");
        }

        let units = discover(&[root.to_path_buf()]).expect("discover");
        let names: Vec<&str> = units.iter().map(|u| u.module_name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn colliding_module_names_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("x")).expect("mkdir");
        fs::write(dir.path().join("util.ts"), "").expect("write");
        fs::write(dir.path().join("x/util.ts"), "").expect("write");
        assert!(discover(&[dir.path().to_path_buf()]).is_err());
    }

    #[test]
    fn failures_stay_with_their_unit() {
        let options = TranslateOptions::default();
        let api = ApiTable::standard(&options);
        let good_src = "export function one(): number { return 1; }\n";
        let good = translate_source("good.ts", good_src.into(), &options, &api);
        assert!(good.expect("good").source.contains("pub fn one() -> f64"));

        let bad_src = "function f(): void { eval(\"x\"); }\n";
        let bad = translate_source("bad.ts", bad_src.into(), &options, &api);
        let report = bad.expect_err("bad");
        assert!(report.to_string().contains("1 error"), "{report}");
    }
}
