//! Scripted stand-ins for the tool under test, the validator and git.

#![allow(dead_code)]

use bmtest::schema::{Fixture, HarnessConfig, ValidatorConfig};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Behaves like a well-formed build_master release.
pub const BUILD_MASTER: &str = r#"#!/bin/sh
cmd="$1"
[ $# -gt 0 ] && shift
force=0
dir=.
name=
id=
cpp=0
for a in "$@"; do
    case "$a" in
        --force) force=1 ;;
        --create-cpp) cpp=1 ;;
        --directory=*) dir="${a#--directory=}" ;;
        --name=*) name="${a#--name=}" ;;
        --canonical_name=*) id="${a#--canonical_name=}" ;;
    esac
done

case "$cmd" in
    --version)
        echo "Build Master 1.4.2"
        echo "Build Type: Release"
        echo "Git Commit ID: 0123abcd"
        ;;
    init)
        if [ -f "$dir/build_master.json" ] && [ "$force" -eq 0 ]; then
            echo "Error: $dir/build_master.json already exists, use --force to overwrite" >&2
            exit 1
        fi
        if [ "$cpp" -eq 1 ]; then h=hpp; s=cpp; else h=h; s=c; fi
        mkdir -p "$dir/source" "$dir/include/$id" || exit 1
        printf '{"project_name":"%s","canonical_name":"%s"}\n' "$name" "$id" > "$dir/build_master.json"
        : > "$dir/include/$id/api_defines.$h"
        : > "$dir/include/$id/defines.$h"
        : > "$dir/source/main.$s"
        echo "Project Name = $name"
        ;;
    --update-meson-build)
        if [ ! -f "$dir/build_master.json" ]; then
            echo "Error: no build_master.json found in $dir" >&2
            exit 1
        fi
        if [ -f "$dir/meson.build" ] && [ "$force" -eq 0 ]; then
            echo "Info: meson.build is upto date"
            exit 0
        fi
        echo "project('fake', 'c')" > "$dir/meson.build"
        ;;
    *)
        echo "Error: unknown command $cmd" >&2
        exit 2
        ;;
esac
"#;

/// Accepts a directory holding a meson.build, and refuses to reconfigure an
/// existing build directory the way `meson setup` does.
pub const VALIDATOR: &str = r#"#!/bin/sh
[ -f meson.build ] || { echo "ERROR: no meson.build" >&2; exit 1; }
[ -d build ] && { echo "ERROR: directory already configured" >&2; exit 1; }
mkdir build
"#;

/// `git clone <url> <dest>` copying from `$FIXTURE_ROOT/<repo name>`.
pub const GIT: &str = r#"#!/bin/sh
[ "$1" = clone ] || exit 129
repo=$(basename "$2" .git)
src="$FIXTURE_ROOT/$repo"
[ -d "$src" ] || { echo "fatal: repository '$2' not found" >&2; exit 128; }
mkdir -p "$3" && cp -R "$src/." "$3"
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// A directory with the three stand-ins and a fixture tree.
pub struct Stand {
    pub dir: TempDir,
    pub tool: PathBuf,
    pub validator: PathBuf,
    pub git: PathBuf,
}

impl Stand {
    pub fn new() -> Self {
        Self::with_tool(BUILD_MASTER)
    }

    pub fn with_tool(tool_body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        let tool = write_script(&bin, "build_master", tool_body);
        let validator = write_script(&bin, "validate", VALIDATOR);
        let git = write_script(&bin, "git", GIT);
        fs::create_dir(dir.path().join("fixtures")).unwrap();
        Self {
            dir,
            tool,
            validator,
            git,
        }
    }

    pub fn fixture_root(&self) -> PathBuf {
        self.dir.path().join("fixtures")
    }

    /// Publish a fixture repository containing a manifest.
    pub fn add_fixture(&self, name: &str) {
        let repo = self.fixture_root().join(name);
        fs::create_dir_all(repo.join("source")).unwrap();
        fs::write(
            repo.join("build_master.json"),
            format!("{{\"project_name\":\"{name}\"}}\n"),
        )
        .unwrap();
    }

    pub fn config(&self, fixtures: &[&str]) -> HarnessConfig {
        let mut env = HashMap::new();
        env.insert(
            "FIXTURE_ROOT".to_string(),
            self.fixture_root().display().to_string(),
        );
        HarnessConfig {
            tool: self.tool.display().to_string(),
            git: self.git.display().to_string(),
            validator: ValidatorConfig {
                program: self.validator.display().to_string(),
                args: Vec::new(),
                directory_flag: None,
            },
            timeout: 30,
            env,
            fixtures: fixtures
                .iter()
                .map(|name| Fixture {
                    url: format!("https://git.example.com/ravi688/{name}.git"),
                    name: None,
                })
                .collect(),
            ..HarnessConfig::default()
        }
    }

    /// The same configuration as YAML, for driving the binary.
    pub fn config_yaml(&self, fixtures: &[&str]) -> String {
        serde_yaml::to_string(&self.config(fixtures)).unwrap()
    }
}
