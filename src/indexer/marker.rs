use crate::model::ParamKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Controller,
    Verb(&'static str),
    Source(ParamKind),
}

struct MarkerEntry {
    name: &'static str,
    marker: Marker,
}

static MARKERS: &[MarkerEntry] = &[
    MarkerEntry {
        name: "Controller",
        marker: Marker::Controller,
    },
    MarkerEntry {
        name: "Get",
        marker: Marker::Verb("GET"),
    },
    MarkerEntry {
        name: "Post",
        marker: Marker::Verb("POST"),
    },
    MarkerEntry {
        name: "Put",
        marker: Marker::Verb("PUT"),
    },
    MarkerEntry {
        name: "Delete",
        marker: Marker::Verb("DELETE"),
    },
    MarkerEntry {
        name: "Patch",
        marker: Marker::Verb("PATCH"),
    },
    MarkerEntry {
        name: "Head",
        marker: Marker::Verb("HEAD"),
    },
    MarkerEntry {
        name: "Options",
        marker: Marker::Verb("OPTIONS"),
    },
    MarkerEntry {
        name: "All",
        marker: Marker::Verb("ALL"),
    },
    MarkerEntry {
        name: "Param",
        marker: Marker::Source(ParamKind::Path),
    },
    MarkerEntry {
        name: "Query",
        marker: Marker::Source(ParamKind::Query),
    },
    MarkerEntry {
        name: "Body",
        marker: Marker::Source(ParamKind::Body),
    },
];

/// Resolves a decorator identifier to its marker. Matching is case-sensitive.
pub fn resolve(name: &str) -> Option<Marker> {
    MARKERS
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.marker)
}
