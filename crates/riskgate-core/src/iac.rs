//! Infrastructure-as-code discovery.
//!
//! Recognized formats:
//! - Terraform: `*.tf`, `*.tf.json`
//! - CloudFormation: YAML/JSON/`.template` files declaring `AWSTemplateFormatVersion`
//! - Kubernetes/Helm: YAML under `k8s/`, `kubernetes/`, `helm/`, `charts/`, `manifests/`
//! - Pulumi (`Pulumi.yaml`) and CDK (`cdk.json`) project files

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

const SKIP_DIRS: &[&str] = &[".git", ".terraform", "node_modules", "target", "vendor", ".venv"];
const MANIFEST_DIRS: &[&str] = &["k8s", "kubernetes", "helm", "charts", "manifests"];
const PROJECT_FILES: &[&str] = &["Pulumi.yaml", "Pulumi.yml", "cdk.json"];
const MAX_DEPTH: usize = 16;
const SNIFF_BYTES: usize = 64 * 1024;

fn cloudformation_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r#"(?m)^\s*"?AWSTemplateFormatVersion"?\s*:"#).ok())
        .as_ref()
}

/// Find IaC files under `root`, returned relative to `root` and sorted.
pub fn discover_iac_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, root, 0, false, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(
    root: &Path,
    dir: &Path,
    depth: usize,
    in_manifest_dir: bool,
    found: &mut Vec<PathBuf>,
) -> io::Result<()> {
    if depth > MAX_DEPTH {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if SKIP_DIRS.contains(&name.as_str()) {
                continue;
            }
            let manifest = in_manifest_dir || MANIFEST_DIRS.contains(&name.as_str());
            walk(root, &path, depth + 1, manifest, found)?;
        } else if file_type.is_file() && is_iac_file(&path, &name, in_manifest_dir) {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            found.push(relative);
        }
    }
    Ok(())
}

fn is_iac_file(path: &Path, name: &str, in_manifest_dir: bool) -> bool {
    if name.ends_with(".tf") || name.ends_with(".tf.json") {
        return true;
    }
    if PROJECT_FILES.contains(&name) {
        return true;
    }
    let yaml = name.ends_with(".yaml") || name.ends_with(".yml");
    if yaml && in_manifest_dir {
        return true;
    }
    if yaml || name.ends_with(".json") || name.ends_with(".template") {
        return declares_cloudformation(path);
    }
    false
}

fn declares_cloudformation(path: &Path) -> bool {
    let Ok(head) = read_head(path) else {
        return false;
    };
    let text = String::from_utf8_lossy(&head);
    match cloudformation_marker() {
        Some(marker) => marker.is_match(&text),
        None => text.contains("AWSTemplateFormatVersion"),
    }
}

/// Read at most `SNIFF_BYTES` from the start of `path`.
fn read_head(path: &Path) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    fs::File::open(path)?
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}
