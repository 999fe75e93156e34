// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Component, Path, PathBuf};

use conductor_model::{Error, ErrorKind, Result};

/// Resolves requested workdirs against a sandbox root.
///
/// Paths never escape `root_dir`.  When an allow-list is configured, the
/// resolved path must equal or live under one of the allowed directories;
/// an empty allow-list permits anything under the root.
#[derive(Debug)]
pub struct WorkdirResolver {
    root_dir: PathBuf,
    allowed_abs: Vec<PathBuf>,
    allow_all_under: bool,
    default_abs: PathBuf,
}

impl WorkdirResolver {
    pub fn new(root_dir: &Path, allowed: &[String], default_workdir: &str) -> Result<Self> {
        const OP: &str = "shell.workdir_resolver";

        let root_dir = clean_path(root_dir);
        let mut resolver = Self {
            root_dir: root_dir.clone(),
            allowed_abs: Vec::new(),
            allow_all_under: allowed.is_empty(),
            default_abs: PathBuf::new(),
        };

        for entry in allowed {
            let clean = clean_path(Path::new(entry));
            if entry.is_empty() || clean == Path::new(".") {
                resolver.allow_all_under = true;
                resolver.allowed_abs.clear();
                break;
            }
            let abs = clean_path(&root_dir.join(&clean));
            if !abs.starts_with(&root_dir) {
                return Err(Error::new(
                    OP,
                    ErrorKind::NotAuthorized,
                    "allowed workdir escapes root dir",
                ));
            }
            resolver.allowed_abs.push(abs);
        }

        let default_abs = resolver.normalize(default_workdir)?;
        if !resolver.allow_all_under && !resolver.is_allowed(&default_abs) {
            return Err(Error::new(OP, ErrorKind::NotAuthorized, "default workdir not allowed"));
        }
        resolver.default_abs = ensure_dir(&default_abs)?;

        Ok(resolver)
    }

    /// Resolve a requested workdir to an absolute, vetted, existing directory.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        const OP: &str = "shell.resolve_workdir";

        let target = if requested.trim().is_empty() {
            self.default_abs.clone()
        } else {
            self.normalize(requested)?
        };

        if !self.allow_all_under && !self.is_allowed(&target) {
            return Err(Error::new(OP, ErrorKind::NotAuthorized, "workdir not allowed"));
        }

        ensure_dir(&target)
    }

    fn is_allowed(&self, abs: &Path) -> bool {
        self.allowed_abs.iter().any(|allowed| abs.starts_with(allowed))
    }

    /// Clean the path, join relative paths onto the root, and reject
    /// anything that lands outside the root.
    fn normalize(&self, path: &str) -> Result<PathBuf> {
        const OP: &str = "shell.normalize_workdir";

        if path.trim().is_empty() {
            return Ok(self.root_dir.clone());
        }

        let clean = clean_path(Path::new(path));
        let abs = if clean.is_absolute() {
            clean
        } else {
            clean_path(&self.root_dir.join(clean))
        };

        if !abs.starts_with(&self.root_dir) {
            return Err(Error::new(OP, ErrorKind::NotAuthorized, "workdir escapes root dir"));
        }

        Ok(abs)
    }
}

/// Lexical path cleaning: drops `.` segments and resolves `..` against the
/// preceding component.  No filesystem access, no symlink resolution.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !path.is_absolute() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn ensure_dir(path: &Path) -> Result<PathBuf> {
    const OP: &str = "shell.ensure_dir";

    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(path.to_path_buf()),
        Ok(_) => Err(Error::new(
            OP,
            ErrorKind::Invalid,
            format!("workdir {} must be a directory", path.display()),
        )),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::new(
            OP,
            ErrorKind::NotFound,
            format!("workdir {} does not exist", path.display()),
        )),
        Err(err) => Err(Error::internal(OP, err)),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
