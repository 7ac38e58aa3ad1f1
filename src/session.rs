use crate::config::Config;
use crate::grouping::GroupingEngine;
use crate::indexer::FileIndex;
use crate::model::{Location, MatchedRoute, RouteDescriptor, SearchResult, ViewState};
use crate::search::FuzzySearchEngine;
use crate::source::{BufferOverlay, SourceProvider};
use crate::store::{RouteIndexStore, RoutesChanged};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("file no longer exists: {}", .0.display())]
    MissingFile(PathBuf),
}

/// One explorer session: the route store plus the search and grouping
/// engines that follow it.
///
/// The engines only see a new route set after [`SearchSession::refresh`]
/// drains the store's change notifications.
pub struct SearchSession<S = BufferOverlay> {
    store: RouteIndexStore<S>,
    changes: Receiver<RoutesChanged>,
    search: FuzzySearchEngine,
    grouping: GroupingEngine,
}

impl SearchSession<BufferOverlay> {
    /// Builds a session over `roots` with an empty buffer overlay and runs
    /// the initial scan.
    pub fn open(roots: Vec<PathBuf>, config: &Config) -> Result<Self> {
        let index = FileIndex::new(roots, config, BufferOverlay::new())?;
        let mut session = Self::new(RouteIndexStore::new(index));
        session.refresh();
        Ok(session)
    }
}

impl<S: SourceProvider> SearchSession<S> {
    pub fn new(mut store: RouteIndexStore<S>) -> Self {
        let changes = store.subscribe();
        let search = FuzzySearchEngine::new(store.routes());
        let grouping = GroupingEngine::new(store.controllers());
        Self {
            store,
            changes,
            search,
            grouping,
        }
    }

    pub fn store(&self) -> &RouteIndexStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RouteIndexStore<S> {
        &mut self.store
    }

    /// Rescans and applies any route-set change. Returns whether the route
    /// set changed.
    pub fn refresh(&mut self) -> bool {
        let changed = self.store.refresh();
        while let Ok(event) = self.changes.try_recv() {
            self.search.update_index(event.routes);
        }
        // Identities ignore owner and handler names, so a quiet refresh can
        // still carry a renamed class or handler.
        if !changed {
            self.search.update_index(self.store.routes());
        }
        self.grouping.update_controllers(self.store.controllers());
        changed
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.store.index_mut().invalidate(path);
    }

    pub fn is_eligible(&self, path: &Path) -> bool {
        self.store.index().is_eligible(path)
    }

    /// Swaps the file patterns and drops every cached entry. The caller
    /// refreshes afterwards.
    pub fn apply_config(&mut self, config: &Config) -> Result<()> {
        let index = self.store.index_mut();
        index.set_patterns(config)?;
        index.dispose();
        Ok(())
    }

    pub fn search_with_grouping(&mut self, query: &str) -> SearchResult {
        self.grouping.set_search_query(query);
        if query.trim().is_empty() {
            return self.grouping.build_initial_result();
        }
        let matched = self.search.search(query);
        self.grouping.build_result(matched, query)
    }

    pub fn search_flat(&mut self, query: &str) -> Vec<MatchedRoute> {
        self.grouping.set_search_query(query);
        self.search.search(query)
    }

    pub fn toggle_owner_expansion(&mut self, owner: &str) -> ViewState {
        self.grouping.toggle_owner_expansion(owner)
    }

    pub fn toggle_display_mode(&mut self) -> ViewState {
        self.grouping.toggle_display_mode()
    }

    pub fn view_state(&self) -> ViewState {
        self.grouping.view_state()
    }

    /// Source position of a route's handler.
    pub fn locate_route(&self, route: &RouteDescriptor) -> Result<Location, NavigationError> {
        ensure_exists(&route.source_file)?;
        Ok(Location {
            path: route.source_file.clone(),
            line: route.line,
            column: route.column,
        })
    }

    /// Start of a controller file.
    pub fn locate_file(&self, path: &Path) -> Result<Location, NavigationError> {
        ensure_exists(path)?;
        Ok(Location {
            path: path.to_path_buf(),
            line: 1,
            column: 0,
        })
    }
}

fn ensure_exists(path: &Path) -> Result<(), NavigationError> {
    if path.is_file() {
        Ok(())
    } else {
        tracing::warn!(path = %path.display(), "navigation target missing");
        Err(NavigationError::MissingFile(path.to_path_buf()))
    }
}
