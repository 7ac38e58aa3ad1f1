use anyhow::{Context, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Include/exclude globs evaluated against root-relative, `/`-separated paths.
#[derive(Debug, Clone)]
pub struct PatternSet {
    include: GlobSet,
    exclude: GlobSet,
    /// Directories whose whole subtree an exclude pattern removes
    /// (`foo/**` prunes `foo`).
    prune: GlobSet,
    empty: bool,
}

impl PatternSet {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let mut prune = GlobSetBuilder::new();
        for pattern in exclude {
            if let Some(dir) = pattern.strip_suffix("/**") {
                if !dir.is_empty() {
                    prune.add(build_glob(dir)?);
                }
            }
        }
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
            prune: prune.build().context("build prune globs")?,
            empty: include.is_empty(),
        })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        !self.empty && self.include.is_match(rel_path) && !self.exclude.is_match(rel_path)
    }

    fn prunes_dir(&self, rel_path: &str) -> bool {
        self.prune.is_match(rel_path)
    }
}

fn build_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob pattern: {pattern}"))
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(build_glob(pattern)?);
    }
    builder.build().context("build glob set")
}

/// Enumerates files under `roots` selected by `patterns`.
///
/// Gitignore rules are not consulted; only the globs decide. Paths come back
/// absolute, sorted by relative path within a root, roots in the order
/// given, without duplicates. Walk errors are logged and skipped.
pub fn scan_roots(roots: &[PathBuf], patterns: &PatternSet) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for root in roots {
        for path in scan_root(root, patterns) {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }
    out
}

fn scan_root(root: &Path, patterns: &PatternSet) -> Vec<PathBuf> {
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "scan root is not a directory");
        return Vec::new();
    }
    let prune_root = root.to_path_buf();
    let prune = patterns.clone();
    let walker = WalkBuilder::new(root)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .hidden(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            match crate::util::normalize_rel_path(&prune_root, entry.path()) {
                Ok(rel) => !prune.prunes_dir(&rel),
                Err(_) => true,
            }
        })
        .build();

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "walk error");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(rel_path) = crate::util::normalize_rel_path(root, entry.path()) else {
            continue;
        };
        if patterns.matches(&rel_path) {
            files.push((rel_path, entry.path().to_path_buf()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    tracing::debug!(root = %root.display(), files = files.len(), "scanned root");
    files.into_iter().map(|(_, path)| path).collect()
}

/// Whether `path` lies under one of `roots` and is selected by `patterns`.
pub fn is_eligible(roots: &[PathBuf], patterns: &PatternSet, path: &Path) -> bool {
    roots.iter().any(|root| {
        crate::util::normalize_rel_path(root, path)
            .map(|rel| patterns.matches(&rel))
            .unwrap_or(false)
    })
}
