//! Per-attempt isolated workspaces.
//!
//! A workspace is a fresh directory under the run root, seeded from the
//! experiment's template. Submitted files are resolved against the root and
//! rejected if they would land outside it. Workspaces are never cleaned up
//! automatically so they can be inspected after a run.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::domain::{ExperimentSpec, ReproError, Result, SubmittedFile};

/// Default environment variable that receives dependency search paths.
pub const DEFAULT_SEARCH_PATH_VAR: &str = "PYTHONPATH";

/// Where workspaces are allocated and how their environment is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    /// Shared parent directory for all attempt directories.
    pub run_root: PathBuf,

    /// Environment variable extended with the spec's dependency paths.
    pub search_path_var: String,
}

impl WorkspaceSettings {
    pub fn new(run_root: impl Into<PathBuf>) -> Self {
        Self {
            run_root: run_root.into(),
            search_path_var: DEFAULT_SEARCH_PATH_VAR.to_string(),
        }
    }

    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }
}

/// An isolated directory tree for one evaluation attempt.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    env: BTreeMap<OsString, OsString>,
}

impl Workspace {
    /// Allocate a unique directory under the run root and copy the
    /// template into it.
    pub fn create(spec: &ExperimentSpec, settings: &WorkspaceSettings) -> Result<Self> {
        let template = &spec.workspace_template;
        if !template.is_dir() {
            return Err(ReproError::WorkspaceInit {
                path: template.clone(),
                reason: "template directory not found".to_string(),
            });
        }

        let init_err = |path: &Path, e: std::io::Error| ReproError::WorkspaceInit {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(&settings.run_root).map_err(|e| init_err(&settings.run_root, e))?;
        let dir = settings
            .run_root
            .join(format!("{}_{}", spec.id, Uuid::new_v4().simple()));
        std::fs::create_dir(&dir).map_err(|e| init_err(&dir, e))?;
        let root = dir.canonicalize().map_err(|e| init_err(&dir, e))?;

        copy_tree(template, &root).map_err(|e| init_err(template, e))?;

        let env = build_environment(&settings.search_path_var, &spec.dependencies).map_err(
            |reason| ReproError::WorkspaceInit {
                path: root.clone(),
                reason,
            },
        )?;

        debug!(experiment = %spec.id, workspace = %root.display(), "workspace created");
        Ok(Self { root, env })
    }

    /// Canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Process environment extended with the spec's dependency paths.
    pub fn environment(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Resolve `rel` against the root, failing if the result escapes it.
    ///
    /// Both lexical escapes (`..`, absolute paths) and escapes through
    /// existing symlinks are rejected.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let escape = || ReproError::PathEscape {
            path: rel.to_string(),
        };

        let raw = Path::new(rel);
        let relative = if raw.is_absolute() {
            raw.strip_prefix(&self.root).map_err(|_| escape())?
        } else {
            raw
        };
        let cleaned = normalize_components(relative).ok_or_else(escape)?;
        let target = self.root.join(&cleaned);

        // Follow whatever part of the path already exists on disk.
        let mut existing = target.as_path();
        while !existing.exists() {
            existing = match existing.parent() {
                Some(parent) => parent,
                None => return Err(escape()),
            };
        }
        let resolved = existing.canonicalize()?;
        if !resolved.starts_with(&self.root) {
            return Err(escape());
        }
        Ok(target)
    }

    /// Write submitted files into the workspace, in order.
    ///
    /// Each path is checked before its file is written. On a containment
    /// failure the offending entry is not written; earlier entries stay.
    pub fn apply_submission(&self, files: &[SubmittedFile]) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let target = self.resolve(&file.path)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &file.content)?;
            written.push(file.path.clone());
        }
        Ok(written)
    }
}

/// Lexically normalize a relative path. `None` if it is empty, absolute, or
/// climbs above its base.
pub(crate) fn normalize_relative(rel: &str) -> Option<PathBuf> {
    normalize_components(Path::new(rel))
}

fn normalize_components(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

fn build_environment(
    var: &str,
    dependencies: &[PathBuf],
) -> std::result::Result<BTreeMap<OsString, OsString>, String> {
    let mut env: BTreeMap<OsString, OsString> = std::env::vars_os().collect();
    if dependencies.is_empty() {
        return Ok(env);
    }

    let key = OsString::from(var);
    let mut paths: Vec<PathBuf> = env
        .get(&key)
        .filter(|existing| !existing.is_empty())
        .map(|existing| std::env::split_paths(existing).collect())
        .unwrap_or_default();
    paths.extend(dependencies.iter().cloned());

    let joined = std::env::join_paths(paths).map_err(|e| e.to_string())?;
    env.insert(key, joined);
    Ok(env)
}

/// Recursively copy `src` into the existing directory `dst`.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            std::fs::create_dir_all(&to)?;
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Sorted relative paths of every file under `base`.
pub(crate) fn list_files(base: &Path) -> std::io::Result<Vec<PathBuf>> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(base, &path, out)?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(base, base, &mut files)?;
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn spec_with_template(template: &Path) -> ExperimentSpec {
        ExperimentSpec::new("exp", "Experiment", template)
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("a/b.json"), Some(PathBuf::from("a/b.json")));
        assert_eq!(normalize_relative("./a/../b.json"), Some(PathBuf::from("b.json")));
        assert_eq!(normalize_relative("../b.json"), None);
        assert_eq!(normalize_relative("a/../../b.json"), None);
        assert_eq!(normalize_relative("/etc/passwd"), None);
        assert_eq!(normalize_relative(""), None);
    }

    #[test]
    fn test_create_copies_template() {
        let template = tempdir().unwrap();
        std::fs::create_dir_all(template.path().join("data")).unwrap();
        std::fs::write(template.path().join("data/points.csv"), "x,y\n").unwrap();
        let runs = tempdir().unwrap();

        let ws = Workspace::create(
            &spec_with_template(template.path()),
            &WorkspaceSettings::new(runs.path()),
        )
        .unwrap();

        assert!(ws.root().join("data/points.csv").exists());
        assert!(ws.root().starts_with(runs.path().canonicalize().unwrap()));
        let name = ws.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("exp_"));
    }

    #[test]
    fn test_create_allocates_distinct_directories() {
        let template = tempdir().unwrap();
        let runs = tempdir().unwrap();
        let spec = spec_with_template(template.path());
        let settings = WorkspaceSettings::new(runs.path());

        let a = Workspace::create(&spec, &settings).unwrap();
        let b = Workspace::create(&spec, &settings).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_create_fails_without_template() {
        let runs = tempdir().unwrap();
        let err = Workspace::create(
            &spec_with_template(&runs.path().join("missing")),
            &WorkspaceSettings::new(runs.path()),
        )
        .unwrap_err();
        assert!(matches!(err, ReproError::WorkspaceInit { .. }));
    }

    #[test]
    fn test_apply_submission_writes_nested_files_in_order() {
        let template = tempdir().unwrap();
        std::fs::write(template.path().join("run.py"), "old").unwrap();
        let runs = tempdir().unwrap();
        let ws = Workspace::create(
            &spec_with_template(template.path()),
            &WorkspaceSettings::new(runs.path()),
        )
        .unwrap();

        let files = vec![
            SubmittedFile {
                path: "run.py".into(),
                content: "new".into(),
            },
            SubmittedFile {
                path: "pkg/util/helpers.py".into(),
                content: "x = 1".into(),
            },
        ];
        let written = ws.apply_submission(&files).unwrap();

        assert_eq!(written, vec!["run.py", "pkg/util/helpers.py"]);
        assert_eq!(std::fs::read_to_string(ws.root().join("run.py")).unwrap(), "new");
        assert!(ws.root().join("pkg/util/helpers.py").exists());
    }

    #[test]
    fn test_apply_submission_rejects_parent_escape() {
        let template = tempdir().unwrap();
        let runs = tempdir().unwrap();
        let ws = Workspace::create(
            &spec_with_template(template.path()),
            &WorkspaceSettings::new(runs.path()),
        )
        .unwrap();

        let files = vec![SubmittedFile {
            path: "../escaped.txt".into(),
            content: "nope".into(),
        }];
        let err = ws.apply_submission(&files).unwrap_err();
        assert!(matches!(err, ReproError::PathEscape { .. }));
        assert!(!ws.root().parent().unwrap().join("escaped.txt").exists());
    }

    #[test]
    fn test_apply_submission_rejects_absolute_outside_root() {
        let template = tempdir().unwrap();
        let runs = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let ws = Workspace::create(
            &spec_with_template(template.path()),
            &WorkspaceSettings::new(runs.path()),
        )
        .unwrap();

        let target = outside.path().join("abs.txt");
        let files = vec![SubmittedFile {
            path: target.to_string_lossy().into_owned(),
            content: "nope".into(),
        }];
        assert!(matches!(
            ws.apply_submission(&files).unwrap_err(),
            ReproError::PathEscape { .. }
        ));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_submission_rejects_symlink_escape() {
        let template = tempdir().unwrap();
        let runs = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let ws = Workspace::create(
            &spec_with_template(template.path()),
            &WorkspaceSettings::new(runs.path()),
        )
        .unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.root().join("link")).unwrap();

        let files = vec![SubmittedFile {
            path: "link/evil.txt".into(),
            content: "nope".into(),
        }];
        assert!(matches!(
            ws.apply_submission(&files).unwrap_err(),
            ReproError::PathEscape { .. }
        ));
        assert!(!outside.path().join("evil.txt").exists());
    }

    #[test]
    fn test_environment_appends_dependencies_after_existing_value() {
        let template = tempdir().unwrap();
        let runs = tempdir().unwrap();
        let var = "REPRO_TEST_SEARCH_PATH_APPEND";
        std::env::set_var(var, "/existing/lib");

        let spec = spec_with_template(template.path()).with_dependency("/shared/libs");
        let ws = Workspace::create(
            &spec,
            &WorkspaceSettings::new(runs.path()).with_search_path_var(var),
        )
        .unwrap();

        let value = ws.environment().get(&OsString::from(var)).unwrap();
        let paths: Vec<PathBuf> = std::env::split_paths(value).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/existing/lib"), PathBuf::from("/shared/libs")]
        );
    }

    #[test]
    fn test_environment_untouched_without_dependencies() {
        let template = tempdir().unwrap();
        let runs = tempdir().unwrap();
        let var = "REPRO_TEST_SEARCH_PATH_UNSET";
        std::env::remove_var(var);

        let ws = Workspace::create(
            &spec_with_template(template.path()),
            &WorkspaceSettings::new(runs.path()).with_search_path_var(var),
        )
        .unwrap();
        assert!(ws.environment().get(&OsString::from(var)).is_none());
    }

    #[test]
    fn test_list_files_sorted_relative() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/z.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let files = list_files(dir.path()).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b/z.txt")]);
    }
}
