use crate::model::{
    ControllerDescriptor, GroupedResult, MatchedRoute, SearchResult, ViewState,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Groups search results by controller and owns the session's view state.
///
/// Every controller is expanded unless the user collapsed it; search
/// relevance never changes expansion.
pub struct GroupingEngine {
    controllers: Arc<Vec<ControllerDescriptor>>,
    view_state: ViewState,
    user_collapsed: HashSet<String>,
}

impl GroupingEngine {
    pub fn new(controllers: Arc<Vec<ControllerDescriptor>>) -> Self {
        let mut engine = Self {
            controllers,
            view_state: ViewState::default(),
            user_collapsed: HashSet::new(),
        };
        engine.sync_expanded_owners();
        engine
    }

    /// Collapse state is keyed by name, so it survives controllers coming
    /// and going.
    pub fn update_controllers(&mut self, controllers: Arc<Vec<ControllerDescriptor>>) {
        self.controllers = controllers;
        self.sync_expanded_owners();
    }

    pub fn view_state(&self) -> ViewState {
        self.view_state.clone()
    }

    pub fn set_search_query(&mut self, query: &str) -> ViewState {
        self.view_state.search_query = query.to_string();
        self.view_state()
    }

    pub fn toggle_display_mode(&mut self) -> ViewState {
        self.view_state.display_mode = self.view_state.display_mode.toggled();
        self.view_state()
    }

    pub fn toggle_owner_expansion(&mut self, owner: &str) -> ViewState {
        if !self.user_collapsed.remove(owner) {
            self.user_collapsed.insert(owner.to_string());
        }
        self.sync_expanded_owners();
        self.view_state.focused_owner = if self.is_expanded(owner) {
            Some(owner.to_string())
        } else {
            None
        };
        self.view_state()
    }

    pub fn is_expanded(&self, owner: &str) -> bool {
        !self.user_collapsed.contains(owner)
    }

    /// Groups `matched` by owning controller, in controller order.
    ///
    /// For a non-blank query, controllers without matches are dropped and the
    /// rest are ordered by descending match score.
    pub fn build_result(&mut self, matched: Vec<MatchedRoute>, query: &str) -> SearchResult {
        let searching = !query.trim().is_empty();
        let mut by_owner: HashMap<&str, Vec<&MatchedRoute>> = HashMap::new();
        for route in &matched {
            by_owner
                .entry(route.route.owner_name.as_str())
                .or_default()
                .push(route);
        }

        let mut grouped = Vec::new();
        for controller in self.controllers.iter() {
            let routes: Vec<MatchedRoute> = by_owner
                .get(controller.name.as_str())
                .map(|routes| routes.iter().map(|route| (*route).clone()).collect())
                .unwrap_or_default();
            if routes.is_empty() && searching {
                continue;
            }
            let match_score = match_score(&routes);
            grouped.push(GroupedResult {
                owner_name: controller.name.clone(),
                base_path: controller.base_path.clone(),
                source_file: controller.source_file.clone(),
                matched_routes: routes,
                total_routes_in_owner: controller.routes.len(),
                is_expanded: self.is_expanded(&controller.name),
                match_score,
            });
        }

        if searching {
            // Stable sort keeps controller order between equal scores.
            grouped.sort_by(|a, b| {
                let a_empty = a.matched_routes.is_empty();
                let b_empty = b.matched_routes.is_empty();
                a_empty.cmp(&b_empty).then_with(|| {
                    b.match_score
                        .partial_cmp(&a.match_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            });
        }

        self.sync_expanded_owners();
        SearchResult {
            grouped,
            total_matches: matched.len(),
            flat: matched,
            display_mode: self.view_state.display_mode,
            total_endpoints: self.total_endpoints(),
        }
    }

    /// One group per controller holding all of its routes, unranked.
    pub fn build_initial_result(&mut self) -> SearchResult {
        let mut grouped = Vec::with_capacity(self.controllers.len());
        let mut flat = Vec::new();
        for controller in self.controllers.iter() {
            let routes: Vec<MatchedRoute> = controller
                .routes
                .iter()
                .cloned()
                .map(MatchedRoute::unhighlighted)
                .collect();
            flat.extend(routes.iter().cloned());
            grouped.push(GroupedResult {
                owner_name: controller.name.clone(),
                base_path: controller.base_path.clone(),
                source_file: controller.source_file.clone(),
                matched_routes: routes,
                total_routes_in_owner: controller.routes.len(),
                is_expanded: self.is_expanded(&controller.name),
                match_score: 0.0,
            });
        }
        self.sync_expanded_owners();
        let total = self.total_endpoints();
        SearchResult {
            grouped,
            flat,
            display_mode: self.view_state.display_mode,
            total_matches: total,
            total_endpoints: total,
        }
    }

    fn total_endpoints(&self) -> usize {
        self.controllers
            .iter()
            .map(|controller| controller.routes.len())
            .sum()
    }

    fn sync_expanded_owners(&mut self) {
        self.view_state.expanded_owners = self
            .controllers
            .iter()
            .filter(|controller| !self.user_collapsed.contains(&controller.name))
            .map(|controller| controller.name.clone())
            .collect();
    }
}

/// Mean matched-character count per matched route; 0 for no routes.
fn match_score(routes: &[MatchedRoute]) -> f64 {
    if routes.is_empty() {
        return 0.0;
    }
    let total: usize = routes.iter().map(|route| route.matched_positions).sum();
    total as f64 / routes.len() as f64
}
