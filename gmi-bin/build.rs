// version string in the form "gmi-bin 0.1.0 (main:1a2b3c4+, release build, linux [x86_64])"

use std::env::consts::{ARCH, OS};
use std::process::Command;

#[cfg(debug_assertions)]
const BUILD_TYPE: &str = "debug";
#[cfg(not(debug_assertions))]
const BUILD_TYPE: &str = "release";

fn main() {
    let git_info = match (get_branch_name(), get_commit_hash()) {
        (Some(branch), Some(hash)) => format!(
            "{}:{}{}, ",
            branch,
            hash,
            if is_working_tree_clean() { "" } else { "+" }
        ),
        _ => String::new(),
    };
    let version_string = format!(
        "{} {} ({}{} build, {} [{}])",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        git_info,
        BUILD_TYPE,
        OS,
        ARCH,
    );
    println!("cargo:rustc-env=VERSION_STRING={}", version_string);
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .output()
        .ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    } else {
        None
    }
}

fn get_commit_hash() -> Option<String> {
    git(&["log", "-1", "--pretty=format:%h"])
}

fn get_branch_name() -> Option<String> {
    git(&["rev-parse", "--abbrev-ref", "HEAD"])
}

fn is_working_tree_clean() -> bool {
    Command::new("git")
        .args(["diff", "--quiet", "--exit-code"])
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .status()
        .map(|s| s.success())
        .unwrap_or(true)
}
