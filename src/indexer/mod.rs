use crate::config::Config;
use crate::model::{ControllerDescriptor, ParseResult};
use crate::source::{BufferOverlay, SourceProvider};
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub mod http;
pub mod marker;
pub mod nest;
pub mod scan;

/// Per-file controller cache over one or more workspace roots.
///
/// Entries are replaced wholesale on re-parse and never merged. A file that
/// fails to read or parse simply has no entry.
pub struct FileIndex<S = BufferOverlay> {
    roots: Vec<PathBuf>,
    patterns: scan::PatternSet,
    extractor: nest::NestExtractor,
    source: S,
    cache: HashMap<PathBuf, ControllerDescriptor>,
}

impl<S: SourceProvider> FileIndex<S> {
    pub fn new(roots: Vec<PathBuf>, config: &Config, source: S) -> Result<Self> {
        let roots = roots
            .into_iter()
            .map(crate::util::canonical_or_self)
            .collect();
        Ok(Self {
            roots,
            patterns: scan::PatternSet::new(&config.file_patterns, &config.exclude_patterns)?,
            extractor: nest::NestExtractor::new()?,
            source,
            cache: HashMap::new(),
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Swaps the include/exclude globs. On error the old patterns stay.
    pub fn set_patterns(&mut self, config: &Config) -> Result<()> {
        self.patterns = scan::PatternSet::new(&config.file_patterns, &config.exclude_patterns)?;
        Ok(())
    }

    pub fn is_eligible(&self, path: &Path) -> bool {
        scan::is_eligible(&self.roots, &self.patterns, path)
    }

    /// Parses every selected file (cached where possible) and aggregates the
    /// controllers and routes in enumeration order.
    pub fn scan_workspace(&mut self) -> ParseResult {
        let started = Instant::now();
        let files = scan::scan_roots(&self.roots, &self.patterns);
        let mut result = ParseResult::default();
        for path in &files {
            if let Some(controller) = self.get_or_parse(path, false) {
                result.routes.extend(controller.routes.iter().cloned());
                result.controllers.push(controller);
            }
        }
        tracing::info!(
            files = files.len(),
            controllers = result.controllers.len(),
            routes = result.routes.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "workspace scanned"
        );
        result
    }

    /// Returns the cached descriptor for `path`, parsing on a miss or when
    /// `force_refresh` is set. Only found controllers are cached.
    pub fn get_or_parse(
        &mut self,
        path: &Path,
        force_refresh: bool,
    ) -> Option<ControllerDescriptor> {
        if !force_refresh {
            if let Some(cached) = self.cache.get(path) {
                tracing::trace!(path = %path.display(), "cache hit");
                return Some(cached.clone());
            }
        }
        self.invalidate(path);
        let source = match self.source.read(path) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "read failed");
                return None;
            }
        };
        let controller = self.extractor.parse(path, &source)?;
        self.cache.insert(path.to_path_buf(), controller.clone());
        Some(controller)
    }

    pub fn invalidate(&mut self, path: &Path) {
        if self.cache.remove(path).is_some() {
            tracing::debug!(path = %path.display(), "cache entry invalidated");
        }
    }

    pub fn dispose(&mut self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache.contains_key(path)
    }
}
