//! ---
//! blinker_section: "15-testing"
//! blinker_subsection: "integration-tests"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Repository layout and reference configuration checks."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use blinker_common::AppConfig;

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn read(path: &str) -> String {
    let full = repo_root().join(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

fn rust_sources(dir: &Path, found: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            rust_sources(&path, found);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            found.push(path);
        }
    }
}

#[test]
fn reference_config_matches_defaults() {
    let config = AppConfig::from_str(&read("configs/led-blinker.toml")).unwrap();
    let defaults = AppConfig::default();
    assert_eq!(config.deployment.name, defaults.deployment.name);
    assert_eq!(config.deployment.base_id, defaults.deployment.base_id);
    assert_eq!(config.cycle.interval, Duration::from_millis(1000));
    assert_eq!(config.components.rate_group_divisors, defaults.components.rate_group_divisors);
    assert_eq!(config.components.uplink_buffers.bins, defaults.components.uplink_buffers.bins);
    assert_eq!(config.components.health_watchdog_code, 0x123);
    assert!(config.comm.host.is_none());
    assert!(config.memory.budget.is_none());
}

#[test]
fn sources_carry_frontmatter() {
    let mut sources = Vec::new();
    for dir in ["crates", "bin", "tests"] {
        rust_sources(&repo_root().join(dir), &mut sources);
    }
    assert!(!sources.is_empty());
    for source in sources {
        let content = fs::read_to_string(&source).unwrap();
        assert!(
            content.starts_with("//! ---\n//! blinker_section:"),
            "{} must include frontmatter header",
            source.display()
        );
    }
}

#[test]
fn manifests_carry_frontmatter() {
    for manifest in [
        "Cargo.toml",
        "tests/Cargo.toml",
        "bin/led-blinker/Cargo.toml",
        "crates/blinker-common/Cargo.toml",
        "crates/blinker-mem/Cargo.toml",
        "crates/blinker-rt/Cargo.toml",
        "crates/blinker-transport/Cargo.toml",
        "crates/blinker-topology/Cargo.toml",
        "crates/blinker-deployment/Cargo.toml",
    ] {
        assert!(
            read(manifest).starts_with("# ---"),
            "{manifest} must include frontmatter header"
        );
    }
}
