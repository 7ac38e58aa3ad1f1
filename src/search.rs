use crate::model::{HighlightSpan, MatchedRoute, RouteDescriptor};
use nucleo_matcher::pattern::{Atom, AtomKind, CaseMatching, Normalization};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use std::sync::Arc;

pub const FULL_PATH_KEY: &str = "fullPath";

/// Fuzzy matcher over route full paths.
///
/// Holds its own snapshot of the route list; searches keep using that
/// snapshot until [`FuzzySearchEngine::update_index`] is called.
pub struct FuzzySearchEngine {
    matcher: Matcher,
    routes: Arc<Vec<RouteDescriptor>>,
}

impl FuzzySearchEngine {
    pub fn new(routes: Arc<Vec<RouteDescriptor>>) -> Self {
        Self {
            matcher: Matcher::new(Config::DEFAULT.match_paths()),
            routes,
        }
    }

    pub fn update_index(&mut self, routes: Arc<Vec<RouteDescriptor>>) {
        tracing::debug!(routes = routes.len(), "search index rebuilt");
        self.routes = routes;
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Case-insensitive fuzzy search. A blank query returns every route in
    /// index order without highlights; otherwise matches are ordered by
    /// descending score, ties kept in index order.
    ///
    /// The whole query is one subsequence: inner whitespace is matched
    /// literally, not split into independent terms.
    pub fn search(&mut self, query: &str) -> Vec<MatchedRoute> {
        if query.trim().is_empty() {
            return self
                .routes
                .iter()
                .cloned()
                .map(MatchedRoute::unhighlighted)
                .collect();
        }
        let atom = Atom::new(
            query.trim(),
            CaseMatching::Ignore,
            Normalization::Smart,
            AtomKind::Fuzzy,
            false,
        );
        let mut buf = Vec::new();
        let mut indices = Vec::new();
        let mut scored: Vec<(u16, usize, usize, Vec<(usize, usize)>)> = Vec::new();
        for (idx, route) in self.routes.iter().enumerate() {
            indices.clear();
            let haystack = Utf32Str::new(&route.full_path, &mut buf);
            let Some(score) = atom.indices(haystack, &mut self.matcher, &mut indices) else {
                continue;
            };
            let ranges = merge_positions(&mut indices);
            scored.push((score, idx, indices.len(), ranges));
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        tracing::debug!(query, matches = scored.len(), "fuzzy search");
        scored
            .into_iter()
            .map(|(_, idx, matched_positions, ranges)| MatchedRoute {
                route: self.routes[idx].clone(),
                highlight_spans: if ranges.is_empty() {
                    Vec::new()
                } else {
                    vec![HighlightSpan {
                        field_key: FULL_PATH_KEY.to_string(),
                        ranges,
                    }]
                },
                matched_positions,
            })
            .collect()
    }
}

/// Sorts and merges matched character positions into `(start, end)` ranges.
/// Positions separated by at most one unmatched character share a range.
pub fn merge_positions(positions: &mut Vec<u32>) -> Vec<(usize, usize)> {
    positions.sort_unstable();
    positions.dedup();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &pos in positions.iter() {
        let pos = pos as usize;
        match ranges.last_mut() {
            Some(last) if last.1 + 1 >= pos => last.1 = last.1.max(pos + 1),
            _ => ranges.push((pos, pos + 1)),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn route(method: &str, full_path: &str) -> RouteDescriptor {
        RouteDescriptor {
            http_method: method.to_string(),
            declared_path: String::new(),
            full_path: full_path.to_string(),
            source_file: PathBuf::from("/repo/a.controller.ts"),
            line: 1,
            column: 0,
            owner_name: "AController".to_string(),
            handler_name: "handler".to_string(),
            parameters: Vec::new(),
            path_parameters: Vec::new(),
        }
    }

    #[test]
    fn merges_adjacent_and_single_gap_positions() {
        assert_eq!(merge_positions(&mut vec![7, 8]), vec![(7, 9)]);
        assert_eq!(merge_positions(&mut vec![3, 1, 1]), vec![(1, 4)]);
        assert_eq!(merge_positions(&mut vec![0, 5, 6]), vec![(0, 1), (5, 7)]);
        assert!(merge_positions(&mut Vec::new()).is_empty());
    }

    #[test]
    fn blank_query_returns_all_routes_in_order() {
        let routes = Arc::new(vec![route("GET", "/b"), route("POST", "/a")]);
        let mut engine = FuzzySearchEngine::new(routes);
        let results = engine.search("   ");
        let paths: Vec<_> = results.iter().map(|m| m.route.full_path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/a"]);
        assert!(results.iter().all(|m| m.highlight_spans.is_empty()));
    }

    #[test]
    fn search_is_case_insensitive_and_highlights() {
        let routes = Arc::new(vec![route("GET", "/cats/:id"), route("POST", "/cats")]);
        let mut engine = FuzzySearchEngine::new(routes);
        let results = engine.search("ID");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].route.full_path, "/cats/:id");
        assert_eq!(results[0].highlight_spans[0].field_key, FULL_PATH_KEY);
        assert_eq!(results[0].highlight_spans[0].ranges, vec![(7, 9)]);
    }

    #[test]
    fn query_tokens_must_match_in_order() {
        let mut engine = FuzzySearchEngine::new(Arc::new(vec![route("GET", "/cats/:id")]));
        assert!(engine.search("id cats").is_empty());
        assert!(engine.search("cats id").is_empty());
        assert_eq!(engine.search("catsid").len(), 1);
    }

    #[test]
    fn gap_merged_ranges_keep_raw_match_count() {
        let mut engine = FuzzySearchEngine::new(Arc::new(vec![route("GET", "/c_t")]));
        let results = engine.search("ct");
        assert_eq!(results[0].highlight_spans[0].ranges, vec![(1, 4)]);
        assert_eq!(results[0].matched_positions, 2);
    }

    #[test]
    fn contiguous_match_ranks_above_scattered_match() {
        let routes = Arc::new(vec![
            route("GET", "/sessions/order/type"),
            route("GET", "/users/sort"),
        ]);
        let mut engine = FuzzySearchEngine::new(routes);
        let results = engine.search("sort");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].route.full_path, "/users/sort");
    }

    #[test]
    fn search_uses_last_built_index() {
        let mut engine = FuzzySearchEngine::new(Arc::new(vec![route("GET", "/dogs")]));
        assert_eq!(engine.search("dogs").len(), 1);
        engine.update_index(Arc::new(vec![route("GET", "/cats")]));
        assert!(engine.search("dogs").is_empty());
        assert_eq!(engine.search("cats").len(), 1);
    }
}
