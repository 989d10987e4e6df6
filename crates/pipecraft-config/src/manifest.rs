//! Dependency manifest (jsonnetfile.json) parsing and library root derivation.
//!
//! Two checkout layouts exist:
//! - legacy: every dependency is reachable directly under the library
//!   directory, which is the only root.
//! - host-grouped: each dependency lives at
//!   `<library-dir>/<host>/<owner>/<repo>[/<subdir>]`, and the directory one
//!   level above each checkout becomes a root, so imports read `repo/file`.

use crate::resolver::SearchRoots;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A parsed dependency manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default = "default_legacy_imports")]
    pub legacy_imports: bool,
}

fn default_legacy_imports() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub source: Source,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Git {
        remote: String,
        #[serde(default)]
        subdir: String,
    },
    Local {
        directory: String,
    },
}

impl Manifest {
    /// Load a manifest. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> ConfigResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Self::parse(&text, path).map(Some)
    }

    /// Parse manifest text; `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> ConfigResult<Self> {
        let manifest: Manifest =
            serde_json::from_str(text).map_err(|e| ConfigError::ManifestParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        for dependency in &manifest.dependencies {
            dependency
                .checkout_name()
                .map_err(|message| ConfigError::ManifestParse {
                    path: path.to_path_buf(),
                    message,
                })?;
        }

        Ok(manifest)
    }
}

impl Dependency {
    /// Checkout path of this dependency below the library directory, e.g.
    /// `github.com/org/repo/subdir`.
    pub fn checkout_name(&self) -> Result<String, String> {
        match &self.source {
            Source::Git { remote, subdir } => {
                let base = git_checkout_name(remote)?;
                let subdir = subdir.trim_matches('/');
                if subdir.is_empty() {
                    Ok(base)
                } else {
                    Ok(format!("{}/{}", base, subdir))
                }
            }
            Source::Local { directory } => Path::new(directory)
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
                .ok_or_else(|| format!("local dependency '{}' has no directory name", directory)),
        }
    }
}

/// `https://user@github.com/org/repo.git`, `ssh://git@github.com/org/repo` and
/// `git@github.com:org/repo.git` all become `github.com/org/repo`.
fn git_checkout_name(remote: &str) -> Result<String, String> {
    let without_scheme = match remote.split_once("://") {
        Some((_, rest)) => rest.to_string(),
        // scp-like syntax: user@host:path
        None => remote.replacen(':', "/", 1),
    };
    let without_user = match without_scheme.split_once('@') {
        Some((_, rest)) => rest,
        None => without_scheme.as_str(),
    };
    let name = without_user
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .trim_matches('/');

    if name.split('/').filter(|part| !part.is_empty()).count() < 2 {
        return Err(format!("cannot derive a checkout path from remote '{}'", remote));
    }
    Ok(name.to_string())
}

/// Library roots for a manifest, in first-seen order without duplicates.
pub fn library_roots(project_root: &Path, library_dir: &str, manifest: &Manifest) -> Vec<PathBuf> {
    let library = project_root.join(library_dir);

    if manifest.legacy_imports {
        return vec![library];
    }

    let mut roots: Vec<PathBuf> = Vec::new();
    for dependency in &manifest.dependencies {
        // Names were validated when the manifest was parsed.
        let Ok(name) = dependency.checkout_name() else {
            continue;
        };
        let checkout = library.join(name);
        let parent = checkout.parent().map(Path::to_path_buf).unwrap_or(library.clone());
        if !roots.contains(&parent) {
            roots.push(parent);
        }
    }
    roots
}

/// The full search root list for a project: the project root itself, then
/// the manifest's library roots.
pub fn search_roots(
    project_root: &Path,
    library_dir: &str,
    manifest: Option<&Manifest>,
) -> SearchRoots {
    let mut roots = SearchRoots::new();
    roots.push(project_root.to_path_buf());
    if let Some(manifest) = manifest {
        for root in library_roots(project_root, library_dir, manifest) {
            roots.push(root);
        }
    }
    debug!(roots = ?roots, "Derived search roots");
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manifest(json: &str) -> Manifest {
        Manifest::parse(json, Path::new("jsonnetfile.json")).unwrap()
    }

    #[test]
    fn test_legacy_layout_has_single_root() {
        let m = manifest(
            r#"{
                "version": 1,
                "dependencies": [
                    {"source": {"git": {"remote": "https://github.com/org-1/lib1.git"}}, "version": "main"},
                    {"source": {"git": {"remote": "https://github.com/org-2/lib2.git"}}, "version": "main"}
                ],
                "legacyImports": true
            }"#,
        );

        let roots = library_roots(Path::new("/project"), "vendor", &m);
        assert_eq!(roots, vec![PathBuf::from("/project/vendor")]);
    }

    #[test]
    fn test_grouped_layout_uses_parent_of_each_checkout() {
        let m = manifest(
            r#"{
                "version": 1,
                "dependencies": [
                    {"source": {"git": {"remote": "https://github.com/org-1/lib1"}}, "version": "main"},
                    {"source": {"git": {"remote": "https://github.com/org-2/lib2"}}, "version": "main"}
                ],
                "legacyImports": false
            }"#,
        );

        let roots = library_roots(Path::new("/project"), "vendor", &m);
        assert_eq!(
            roots,
            vec![
                PathBuf::from("/project/vendor/github.com/org-1"),
                PathBuf::from("/project/vendor/github.com/org-2"),
            ]
        );
    }

    #[test]
    fn test_grouped_layout_deduplicates_in_first_seen_order() {
        let m = manifest(
            r#"{
                "dependencies": [
                    {"source": {"git": {"remote": "git@github.com:org-2/a.git"}}},
                    {"source": {"git": {"remote": "https://github.com/org-1/b"}}},
                    {"source": {"git": {"remote": "ssh://git@github.com/org-2/c"}}}
                ],
                "legacyImports": false
            }"#,
        );

        let roots = library_roots(Path::new("/p"), "vendor", &m);
        assert_eq!(
            roots,
            vec![
                PathBuf::from("/p/vendor/github.com/org-2"),
                PathBuf::from("/p/vendor/github.com/org-1"),
            ]
        );
    }

    #[test]
    fn test_subdir_is_part_of_checkout() {
        let m = manifest(
            r#"{
                "dependencies": [
                    {"source": {"git": {"remote": "https://github.com/org/mono.git", "subdir": "libs/pipelines"}}}
                ],
                "legacyImports": false
            }"#,
        );

        assert_eq!(
            m.dependencies[0].checkout_name().unwrap(),
            "github.com/org/mono/libs/pipelines"
        );
        assert_eq!(
            library_roots(Path::new("/p"), "vendor", &m),
            vec![PathBuf::from("/p/vendor/github.com/org/mono/libs")]
        );
    }

    #[test]
    fn test_legacy_imports_defaults_to_true() {
        let m = manifest(r#"{"version": 1, "dependencies": []}"#);
        assert!(m.legacy_imports);
    }

    #[test]
    fn test_local_dependency_name() {
        let m = manifest(
            r#"{"dependencies": [{"source": {"local": {"directory": "../shared/stages"}}}]}"#,
        );
        assert_eq!(m.dependencies[0].checkout_name().unwrap(), "stages");
    }

    #[test]
    fn test_search_roots_start_with_project_root() {
        let m = manifest(r#"{"dependencies": [], "legacyImports": true}"#);
        let roots = search_roots(Path::new("/p"), "vendor", Some(&m));
        assert_eq!(
            roots.as_slice(),
            &[PathBuf::from("/p"), PathBuf::from("/p/vendor")]
        );

        let roots = search_roots(Path::new("/p"), "vendor", None);
        assert_eq!(roots.as_slice(), &[PathBuf::from("/p")]);
    }

    #[test]
    fn test_malformed_manifest() {
        let result = Manifest::parse("{not json", Path::new("jsonnetfile.json"));
        assert!(matches!(result, Err(ConfigError::ManifestParse { .. })));

        let result = Manifest::parse(
            r#"{"dependencies": [{"source": {"git": {"remote": "nohost"}}}]}"#,
            Path::new("jsonnetfile.json"),
        );
        assert!(matches!(result, Err(ConfigError::ManifestParse { .. })));
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Manifest::load(&dir.path().join("jsonnetfile.json")).unwrap();
        assert_eq!(loaded, None);
    }
}
