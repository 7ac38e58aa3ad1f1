use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParameter {
    pub name: String,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    pub http_method: String,
    pub declared_path: String,
    pub full_path: String,
    pub source_file: PathBuf,
    /// 1-based line of the handler name.
    pub line: usize,
    /// 0-based column of the handler name.
    pub column: usize,
    pub owner_name: String,
    pub handler_name: String,
    pub parameters: Vec<RouteParameter>,
    pub path_parameters: Vec<String>,
}

impl RouteDescriptor {
    /// Identity used for route-set change detection: `"METHOD /full/path"`.
    pub fn identity(&self) -> String {
        format!("{} {}", self.http_method, self.full_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerDescriptor {
    pub name: String,
    pub base_path: String,
    pub source_file: PathBuf,
    pub routes: Vec<RouteDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseResult {
    pub controllers: Vec<ControllerDescriptor>,
    pub routes: Vec<RouteDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSpan {
    pub field_key: String,
    /// `(start, end_exclusive)` character ranges.
    pub ranges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRoute {
    pub route: RouteDescriptor,
    pub highlight_spans: Vec<HighlightSpan>,
    /// Number of query characters matched, before range merging.
    #[serde(skip)]
    pub matched_positions: usize,
}

impl MatchedRoute {
    pub fn unhighlighted(route: RouteDescriptor) -> Self {
        Self {
            route,
            highlight_spans: Vec::new(),
            matched_positions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Flat,
    Grouped,
}

impl DisplayMode {
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Flat => DisplayMode::Grouped,
            DisplayMode::Grouped => DisplayMode::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedResult {
    pub owner_name: String,
    pub base_path: String,
    pub source_file: PathBuf,
    pub matched_routes: Vec<MatchedRoute>,
    pub total_routes_in_owner: usize,
    pub is_expanded: bool,
    pub match_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub grouped: Vec<GroupedResult>,
    pub flat: Vec<MatchedRoute>,
    pub display_mode: DisplayMode,
    pub total_matches: usize,
    pub total_endpoints: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub display_mode: DisplayMode,
    pub expanded_owners: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_owner: Option<String>,
    pub search_query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
}
