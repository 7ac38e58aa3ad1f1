/// Joins a controller base path and a handler path into a route's full path.
///
/// The result always starts with `/`. An empty handler path yields the base
/// path itself, and a root base path (`/` or empty) yields the handler path.
pub fn combine_paths(base: &str, route: &str) -> String {
    let base = with_leading_slash(base);
    if route.is_empty() {
        return base;
    }
    let route = with_leading_slash(route);
    if base == "/" {
        route
    } else {
        format!("{base}{route}")
    }
}

fn with_leading_slash(raw: &str) -> String {
    if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    }
}

/// Returns every `:name` token of `path` in order of appearance.
///
/// A token starts with an ASCII letter or `_` and continues over word
/// characters; a `:` not followed by a valid start character is skipped.
pub fn extract_path_parameters(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = path.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if ch != ':' {
            continue;
        }
        let Some(&(start, first)) = chars.peek() else {
            break;
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            continue;
        }
        let mut end = start;
        while let Some(&(idx, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        out.push(path[start..end].to_string());
    }
    out
}
