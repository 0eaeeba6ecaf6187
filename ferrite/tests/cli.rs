#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn ferrite(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ferrite"))
        .args(args)
        .current_dir(dir)
        .env_remove("FERRITE_LOG")
        .output()
        .expect("run ferrite")
}

const COUNTER: &str = "class Counter {
  count: number = 0;
  increment(): void { this.count += 1; }
}
const c = new Counter();
c.increment();
console.log(`count = ${c.count}`);
";

#[test]
fn build_writes_one_file_per_unit_and_a_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("counter.ts"), COUNTER).expect("write");
    let utils = "export function twice(x: number): number { return x * 2; }\n";
    fs::write(dir.path().join("math-utils.ts"), utils).expect("write");

    let out = ferrite(dir.path(), &["build", ".", "--out-dir", "out", "--cargo"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let counter = fs::read_to_string(dir.path().join("out/counter.rs")).expect("counter.rs");
    assert!(counter.contains("fn increment(&mut self)"), "{counter}");
    assert!(counter.contains("let mut c = Counter::new();"), "{counter}");

    let utils = fs::read_to_string(dir.path().join("out/math_utils.rs")).expect("math_utils.rs");
    assert!(utils.contains("pub fn twice(x: f64) -> f64 {\n    x * 2.0\n}"), "{utils}");

    let cargo = fs::read_to_string(dir.path().join("out/Cargo.toml")).expect("Cargo.toml");
    assert!(cargo.contains("name = \"out\""), "{cargo}");
    assert!(cargo.contains("[[bin]]\nname = \"counter\"\npath = \"counter.rs\""), "{cargo}");
    assert!(!cargo.contains("math_utils"), "{cargo}");
}

#[test]
fn failing_units_exit_non_zero_and_write_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = "export function one(): number { return 1; }\n";
    fs::write(dir.path().join("good.ts"), good).expect("write");
    let bad = "function f(): void { lodash.chunk([1], 1); }\n";
    fs::write(dir.path().join("bad.ts"), bad).expect("write");

    let out = ferrite(dir.path(), &["build", "--out-dir", "out"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("lodash.chunk"), "{stderr}");
    assert!(stderr.contains("1 of 2 unit(s) failed"), "{stderr}");
    assert!(!dir.path().join("out").exists());
}

#[test]
fn check_reports_parse_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("broken.ts"), "function (: number {\n").expect("write");
    let out = ferrite(dir.path(), &["check", "broken.ts"]);
    assert!(!out.status.success());
}

#[test]
fn stdout_mode_prints_the_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("hello.ts"), "console.log(\"hi\");\n").expect("write");
    let out = ferrite(dir.path(), &["build", "hello.ts", "--stdout"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("fn main() {\n    println!(\"hi\");\n}\n"), "{stdout}");
    assert!(!dir.path().join("ferrite-out").exists());
}

#[test]
fn manifest_options_and_flags_combine() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("ferrite.toml"),
        "[project]\nname = \"demo\"\nsources = [\"src\"]\n\n\
         [output]\ndir = \"gen\"\ncargo_manifest = true\n",
    )
    .expect("write manifest");
    fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    fs::write(
        dir.path().join("src/round.ts"),
        "export function r(x: number): number { return Math.round(x); }\n",
    )
    .expect("write");

    let out = ferrite(dir.path(), &["build", "--rounding", "half-away-from-zero"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let source = fs::read_to_string(dir.path().join("gen/round.rs")).expect("round.rs");
    assert!(source.contains("f64::round(x)"), "{source}");
    assert!(!source.contains("ferrite_rt"), "{source}");
    let cargo = fs::read_to_string(dir.path().join("gen/Cargo.toml")).expect("Cargo.toml");
    assert!(cargo.contains("name = \"demo\""), "{cargo}");
}
