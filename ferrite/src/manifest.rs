#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use ferrite_core::{MappingRule, TranslateOptions};
use miette::Diagnostic;
use thiserror::Error;

pub const MANIFEST_NAME: &str = "ferrite.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(ferrite::manifest))]
pub struct ManifestError {
    pub message: String,
}

/// `ferrite.toml` with every path made absolute against its directory.
#[derive(Clone, Debug, Default)]
pub struct ResolvedManifest {
    pub manifest_path: Option<PathBuf>,
    pub project_root: PathBuf,

    /// Package name for a generated `Cargo.toml`.
    pub name: Option<String>,
    pub sources: Vec<PathBuf>,

    pub out_dir: Option<PathBuf>,
    pub cargo_manifest: bool,

    pub options: TranslateOptions,
    /// Extra mapping rows, consulted before the standard table.
    pub mappings: Vec<MappingRule>,
}

impl ResolvedManifest {
    pub fn empty(project_root: PathBuf) -> Self {
        Self {
            project_root,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    project: Project,

    #[serde(default)]
    output: Output,

    #[serde(default)]
    translate: TranslateOptions,

    #[serde(default)]
    mapping: Vec<MappingRule>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Project {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Output {
    #[serde(default)]
    dir: Option<String>,

    #[serde(default)]
    cargo_manifest: bool,
}

/// Nearest `ferrite.toml` at or above `start`.
pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !cur.pop() {
            return None;
        }
    }
}

pub fn load_resolved_manifest(start: &Path) -> Result<ResolvedManifest, ManifestError> {
    let project_root = if start.is_file() {
        start.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
    } else {
        start.to_path_buf()
    };

    let Some(manifest_path) = find_manifest(&project_root) else {
        return Ok(ResolvedManifest::empty(project_root));
    };
    load_manifest_file(&manifest_path)
}

pub fn load_manifest_file(manifest_path: &Path) -> Result<ResolvedManifest, ManifestError> {
    let manifest_dir = manifest_path
        .parent()
        .ok_or_else(|| ManifestError {
            message: "manifest has no parent directory".to_string(),
        })?
        .to_path_buf();

    let raw = fs::read_to_string(manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;
    let parsed: Manifest = toml::from_str(&raw).map_err(|e| ManifestError {
        message: format!("failed to parse {}: {e}", manifest_path.display()),
    })?;

    let mut sources: Vec<PathBuf> = parsed
        .project
        .sources
        .iter()
        .map(|s| resolve_path(&manifest_dir, s))
        .collect();
    sources.dedup();

    Ok(ResolvedManifest {
        manifest_path: Some(manifest_path.to_path_buf()),
        name: parsed.project.name,
        sources,
        out_dir: parsed.output.dir.map(|d| resolve_path(&manifest_dir, &d)),
        cargo_manifest: parsed.output.cargo_manifest,
        options: parsed.translate,
        mappings: parsed.mapping,
        project_root: manifest_dir,
    })
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() { pb } else { base.join(pb) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_core::{AsyncFallback, Rounding};

    fn write(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join(MANIFEST_NAME);
        fs::write(&path, text).expect("write manifest");
        path
    }

    #[test]
    fn sections_resolve_against_the_manifest_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            r#"
[project]
name = "demo"
sources = ["src", "extra/one.ts"]

[output]
dir = "out"
cargo_manifest = true

[translate]
async_fallback = "block-on"
rounding = "half-away-from-zero"

[[mapping]]
receiver = "namespace:lodash"
name = "clamp"
arity = 3
rewrite = { template = "f64::clamp({0}, {1}, {2})" }
result = "number"
"#,
        );

        let nested = dir.path().join("src");
        fs::create_dir_all(&nested).expect("mkdir");
        let m = load_resolved_manifest(&nested).expect("manifest");

        assert_eq!(m.project_root, dir.path());
        assert_eq!(m.name.as_deref(), Some("demo"));
        assert_eq!(m.sources, vec![dir.path().join("src"), dir.path().join("extra/one.ts")]);
        assert_eq!(m.out_dir, Some(dir.path().join("out")));
        assert!(m.cargo_manifest);
        assert_eq!(m.options.async_fallback, AsyncFallback::BlockOn);
        assert_eq!(m.options.rounding, Rounding::HalfAwayFromZero);
        assert_eq!(m.mappings.len(), 1);
    }

    #[test]
    fn missing_manifest_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = load_resolved_manifest(dir.path()).expect("manifest");
        assert!(m.manifest_path.is_none());
        assert!(m.sources.is_empty());
        assert_eq!(m.options, TranslateOptions::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "[output]\nfolder = \"out\"\n");
        let err = load_manifest_file(&path).unwrap_err();
        assert!(err.message.contains("failed to parse"), "{}", err.message);
    }
}
