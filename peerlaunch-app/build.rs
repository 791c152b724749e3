use std::process::Command;

/// Packagers building from a source tarball can pin the hash here.
const HASH_OVERRIDE: &str = "PEERLAUNCH_GIT_HASH";

fn main() {
    println!("cargo:rerun-if-env-changed={HASH_OVERRIDE}");

    let hash = match std::env::var(HASH_OVERRIDE) {
        Ok(pinned) if !pinned.trim().is_empty() => pinned.trim().to_string(),
        _ => git_hash(),
    };

    println!("cargo:rustc-env=GIT_HASH={hash}");
}

fn git_hash() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => {
            println!("cargo:warning=Unable to determine git hash, using 'unknown'");
            String::from("unknown")
        }
    }
}
