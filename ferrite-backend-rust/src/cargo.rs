#![forbid(unsafe_code)]

//! `Cargo.toml` for a directory of generated units.

use std::collections::BTreeSet;

use ferrite_rir::Dependency;

/// A generated unit built as its own binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinTarget {
    pub name: String,
    /// Relative to the manifest.
    pub path: String,
}

fn requirement(dep: Dependency) -> &'static str {
    match dep {
        Dependency::Serde => "{ version = \"1\", features = [\"derive\"] }",
        Dependency::SerdeJson => "\"1\"",
        Dependency::Reqwest => "{ version = \"0.12\", features = [\"json\"] }",
        Dependency::Tokio => "{ version = \"1\", features = [\"macros\", \"rt-multi-thread\"] }",
        Dependency::Rand => "\"0.8\"",
        Dependency::Futures => "\"0.3\"",
    }
}

/// Renders the manifest. The HTTP helpers need `tokio` and `serde` even when
/// no unit names them, so those are added alongside `reqwest`.
pub fn render_cargo_manifest(
    package: &str,
    bins: &[BinTarget],
    deps: &BTreeSet<Dependency>,
) -> String {
    let mut deps = deps.clone();
    if deps.contains(&Dependency::Reqwest) {
        deps.extend([Dependency::Serde, Dependency::SerdeJson, Dependency::Tokio]);
    }

    let mut out = String::new();
    out.push_str("[package]\n");
    out.push_str(&format!("name = {package:?}\n"));
    out.push_str("version = \"0.1.0\"\n");
    out.push_str("edition = \"2021\"\n");
    out.push_str("autobins = false\n");

    for bin in bins {
        out.push_str("\n[[bin]]\n");
        out.push_str(&format!("name = {:?}\n", bin.name));
        out.push_str(&format!("path = {:?}\n", bin.path));
    }

    out.push_str("\n[dependencies]\n");
    for dep in deps {
        out.push_str(dep.crate_name());
        out.push_str(" = ");
        out.push_str(requirement(dep));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_bins_and_dependencies_in_order() {
        let bins = vec![BinTarget {
            name: "class_state".into(),
            path: "class_state.rs".into(),
        }];
        let deps = BTreeSet::from([Dependency::Rand, Dependency::Serde]);
        let manifest = render_cargo_manifest("demo", &bins, &deps);
        assert!(manifest.starts_with("[package]\nname = \"demo\"\n"));
        assert!(manifest.contains("[[bin]]\nname = \"class_state\"\npath = \"class_state.rs\"\n"));
        let serde = manifest.find("serde =").expect("serde");
        let rand = manifest.find("rand =").expect("rand");
        assert!(serde < rand);
    }

    #[test]
    fn http_pulls_in_its_runtime_crates() {
        let manifest = render_cargo_manifest("demo", &[], &BTreeSet::from([Dependency::Reqwest]));
        for name in ["serde =", "serde_json =", "reqwest =", "tokio ="] {
            assert!(manifest.contains(name), "{name}");
        }
        assert!(manifest.contains("features = [\"json\"]"));
    }
}
