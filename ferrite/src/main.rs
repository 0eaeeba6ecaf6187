#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use ferrite_core::{ApiTable, AsyncFallback, Rounding, TextLength, TranslateOptions};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod driver;
mod manifest;

use driver::{Unit, UnitOutput};
use manifest::ResolvedManifest;

#[derive(Parser, Debug)]
#[command(name = "ferrite", version, about = "Translate a TypeScript subset into Rust source")]
struct Cli {
    /// More log output (`-v` info, `-vv` debug). `FERRITE_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Use this manifest instead of searching for `ferrite.toml`.
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    #[command(flatten)]
    translate: TranslateArgs,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Overrides for the manifest's `[translate]` table.
#[derive(Args, Debug)]
struct TranslateArgs {
    /// Synchronous callers of async functions: `reject` or `block-on`
    #[arg(long, global = true)]
    async_fallback: Option<AsyncFallback>,

    /// What `text.length` counts: `utf16`, `chars` or `bytes`
    #[arg(long, global = true)]
    text_length: Option<TextLength>,

    /// `Math.round` on half-way values: `half-up` or `half-away-from-zero`
    #[arg(long, global = true)]
    rounding: Option<Rounding>,
}

impl TranslateArgs {
    fn apply(&self, options: &mut TranslateOptions) {
        if let Some(v) = self.async_fallback {
            options.async_fallback = v;
        }
        if let Some(v) = self.text_length {
            options.text_length = v;
        }
        if let Some(v) = self.rounding {
            options.rounding = v;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Translate and report diagnostics without writing output
    Check {
        /// Source files or directories (default: the manifest's sources, or `.`)
        paths: Vec<PathBuf>,
    },
    /// Translate and write one `.rs` file per unit
    Build {
        /// Source files or directories (default: the manifest's sources, or `.`)
        paths: Vec<PathBuf>,

        /// Output directory (default: `[output] dir`, or `ferrite-out`)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Print generated sources instead of writing files
        #[arg(long, default_value_t = false, conflicts_with = "out_dir")]
        stdout: bool,

        /// Also write a `Cargo.toml` for the output directory
        #[arg(long, default_value_t = false)]
        cargo: bool,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("FERRITE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manifest = match &cli.manifest {
        Some(path) => manifest::load_manifest_file(path)?,
        None => manifest::load_resolved_manifest(&std::env::current_dir().into_diagnostic()?)?,
    };
    if let Some(path) = &manifest.manifest_path {
        info!(manifest = %path.display(), "using manifest");
    }

    let mut options = manifest.options.clone();
    cli.translate.apply(&mut options);
    let mut api = ApiTable::standard(&options);
    for rule in &manifest.mappings {
        api.insert(rule.clone());
    }

    match cli.cmd {
        Cmd::Check { paths } => {
            let units = driver::discover(&input_paths(paths, &manifest))?;
            let outputs = driver::translate_all(&units, &options, &api);
            let failed = report_failures(&outputs);
            finish(units.len(), failed)
        }
        Cmd::Build {
            paths,
            out_dir,
            stdout,
            cargo,
        } => {
            let units = driver::discover(&input_paths(paths, &manifest))?;
            let outputs = driver::translate_all(&units, &options, &api);
            let failed = report_failures(&outputs);

            let translated: Vec<(&Unit, &ferrite_backend_rust::RustArtifacts)> = outputs
                .iter()
                .filter_map(|o| o.result.as_ref().ok().map(|a| (&o.unit, a)))
                .collect();

            if stdout {
                print_sources(&translated)?;
            } else if failed == 0 {
                let out_dir = out_dir
                    .or_else(|| manifest.out_dir.clone())
                    .unwrap_or_else(|| manifest.project_root.join("ferrite-out"));
                let package = if cargo || manifest.cargo_manifest {
                    Some(package_name(&manifest, &out_dir))
                } else {
                    None
                };
                let written = driver::write_outputs(&out_dir, &translated, package.as_deref())?;
                info!(files = written.len(), out_dir = %out_dir.display(), "build finished");
            } else {
                warn!("nothing written: some units failed");
            }
            finish(units.len(), failed)
        }
    }
}

fn input_paths(paths: Vec<PathBuf>, manifest: &ResolvedManifest) -> Vec<PathBuf> {
    if !paths.is_empty() {
        return paths;
    }
    if !manifest.sources.is_empty() {
        return manifest.sources.clone();
    }
    vec![manifest.project_root.clone()]
}

fn package_name(manifest: &ResolvedManifest, out_dir: &Path) -> String {
    if let Some(name) = &manifest.name {
        return name.clone();
    }
    out_dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| {
            n.to_ascii_lowercase()
                .replace(|c: char| !c.is_ascii_alphanumeric() && c != '-', "-")
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "ferrite-out".to_string())
}

/// Prints each failed unit's diagnostics; returns how many failed.
fn report_failures(outputs: &[UnitOutput]) -> usize {
    let mut failed = 0;
    for output in outputs {
        if let Err(report) = &output.result {
            failed += 1;
            eprintln!("{report:?}");
        }
    }
    failed
}

fn print_sources(
    translated: &[(&Unit, &ferrite_backend_rust::RustArtifacts)],
) -> miette::Result<()> {
    let mut out = io::stdout().lock();
    for (i, (unit, artifacts)) in translated.iter().enumerate() {
        if translated.len() > 1 {
            if i > 0 {
                writeln!(out).into_diagnostic()?;
            }
            let path = unit.path.display();
            writeln!(out, "// ---- {}.rs ({path})", unit.module_name).into_diagnostic()?;
        }
        out.write_all(artifacts.source.as_bytes()).into_diagnostic()?;
    }
    out.flush().into_diagnostic()
}

fn finish(total: usize, failed: usize) -> miette::Result<()> {
    if failed > 0 {
        return Err(miette::miette!("{failed} of {total} unit(s) failed to translate"));
    }
    if total == 0 {
        warn!("no source files found");
    }
    Ok(())
}
