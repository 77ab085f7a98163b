use std::env;
use std::process::Command;

/// Set to pin the commit shown in the dashboard footer (e.g. in CI images
/// built without a `.git` directory).
const COMMIT_OVERRIDE: &str = "EQVIZ_COMMIT";

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed={COMMIT_OVERRIDE}");
    // Workspace root is two levels up from this crate.
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let hash = env::var(COMMIT_OVERRIDE)
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_COMMIT_HASH={hash}");
}
