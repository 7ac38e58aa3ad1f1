use crate::indexer::http;
use crate::indexer::marker::{self, Marker};
use crate::model::{ControllerDescriptor, ParamKind, RouteDescriptor, RouteParameter};
use anyhow::Result;
use std::path::Path;
use tree_sitter::{Node, Parser};

const UNKNOWN_CONTROLLER: &str = "UnknownController";
const UNKNOWN_HANDLER: &str = "unknown";

/// Extracts decorated controllers from TypeScript sources.
///
/// Holds one parser per grammar; `.tsx` files go through the TSX grammar so
/// that JSX in the same file does not break the class walk.
pub struct NestExtractor {
    typescript: Parser,
    tsx: Parser,
}

impl NestExtractor {
    pub fn new() -> Result<Self> {
        let mut typescript = Parser::new();
        typescript.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?;
        let mut tsx = Parser::new();
        tsx.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())?;
        Ok(Self { typescript, tsx })
    }

    /// Parses one file. Returns the first decorated controller, or `None`
    /// when the file has none or the text could not be parsed.
    pub fn parse(&mut self, path: &Path, source: &str) -> Option<ControllerDescriptor> {
        let parser = if is_tsx(path) {
            &mut self.tsx
        } else {
            &mut self.typescript
        };
        let Some(tree) = parser.parse(source, None) else {
            tracing::warn!(path = %path.display(), "parser produced no tree");
            return None;
        };
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!(path = %path.display(), "syntax errors, extracting best effort");
        }
        let controller = find_controller(root, path, source);
        match &controller {
            Some(found) => tracing::debug!(
                path = %path.display(),
                controller = %found.name,
                routes = found.routes.len(),
                "controller extracted"
            ),
            None => tracing::trace!(path = %path.display(), "no controller"),
        }
        controller
    }
}

fn is_tsx(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("tsx")
}

fn find_controller(root: Node<'_>, path: &Path, source: &str) -> Option<ControllerDescriptor> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if is_class_node(node) {
            if let Some(controller) = controller_from_class(node, path, source) {
                return Some(controller);
            }
        }
        // Reverse so the walk visits children in source order.
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

/// `export default class {}` parses as a `class` expression under the export.
fn is_class_node(node: Node<'_>) -> bool {
    match node.kind() {
        "class_declaration" | "abstract_class_declaration" => true,
        "class" => node
            .parent()
            .is_some_and(|parent| parent.kind() == "export_statement"),
        _ => false,
    }
}

fn controller_from_class(
    node: Node<'_>,
    path: &Path,
    source: &str,
) -> Option<ControllerDescriptor> {
    let decorator = class_decorators(node)
        .into_iter()
        .filter_map(|decorator| decorator_call(decorator, source))
        .find(|call| marker::resolve(&call.name) == Some(Marker::Controller))?;
    let name = node
        .child_by_field_name("name")
        .map(|name| node_text(name, source))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_CONTROLLER.to_string());
    let base_path = decorator.path(source);
    let mut controller = ControllerDescriptor {
        name,
        base_path,
        source_file: path.to_path_buf(),
        routes: Vec::new(),
    };
    if let Some(body) = node.child_by_field_name("body") {
        controller.routes = routes_from_body(body, &controller, source);
    }
    Some(controller)
}

fn class_decorators(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    // `@Controller() export class X {}` hangs the decorator on the export.
    if let Some(parent) = node.parent() {
        if parent.kind() == "export_statement" {
            out.extend(decorator_children(parent));
        }
    }
    out.extend(decorator_children(node));
    out
}

fn decorator_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            out.push(child);
        }
    }
    out
}

fn routes_from_body(
    body: Node<'_>,
    controller: &ControllerDescriptor,
    source: &str,
) -> Vec<RouteDescriptor> {
    let mut routes = Vec::new();
    let mut pending: Vec<Node<'_>> = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        match child.kind() {
            "decorator" => pending.push(child),
            "comment" => {}
            "method_definition" => {
                let mut decorators = std::mem::take(&mut pending);
                decorators.extend(decorator_children(child));
                if let Some(route) = route_from_method(child, &decorators, controller, source) {
                    routes.push(route);
                }
            }
            _ => pending.clear(),
        }
    }
    routes
}

fn route_from_method(
    node: Node<'_>,
    decorators: &[Node<'_>],
    controller: &ControllerDescriptor,
    source: &str,
) -> Option<RouteDescriptor> {
    let (verb, call) = decorators.iter().find_map(|decorator| {
        let call = decorator_call(*decorator, source)?;
        match marker::resolve(&call.name) {
            Some(Marker::Verb(verb)) => Some((verb, call)),
            _ => None,
        }
    })?;
    let name_node = node.child_by_field_name("name")?;
    let handler_name = match name_node.kind() {
        "property_identifier" | "private_property_identifier" => node_text(name_node, source),
        _ => UNKNOWN_HANDLER.to_string(),
    };
    let declared_path = call.path(source);
    let full_path = http::combine_paths(&controller.base_path, &declared_path);
    let path_parameters = http::extract_path_parameters(&full_path);
    let position = name_node.start_position();
    let parameters = node
        .child_by_field_name("parameters")
        .map(|params| extract_parameters(params, source))
        .unwrap_or_default();
    Some(RouteDescriptor {
        http_method: verb.to_string(),
        declared_path,
        full_path,
        source_file: controller.source_file.clone(),
        line: position.row + 1,
        column: position.column,
        owner_name: controller.name.clone(),
        handler_name,
        parameters,
        path_parameters,
    })
}

fn extract_parameters(node: Node<'_>, source: &str) -> Vec<RouteParameter> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for param in node.named_children(&mut cursor) {
        let optional = match param.kind() {
            "required_parameter" => false,
            "optional_parameter" => true,
            _ => continue,
        };
        let Some(pattern) = param.child_by_field_name("pattern") else {
            continue;
        };
        if pattern.kind() != "identifier" {
            continue;
        }
        // Last recognized source decorator wins; undecorated means query.
        let mut kind = ParamKind::Query;
        for decorator in decorator_children(param) {
            let Some(call) = decorator_call(decorator, source) else {
                continue;
            };
            if let Some(Marker::Source(source_kind)) = marker::resolve(&call.name) {
                kind = source_kind;
            }
        }
        out.push(RouteParameter {
            name: node_text(pattern, source),
            kind,
            declared_type: declared_type(param, source),
            optional,
        });
    }
    out
}

fn declared_type(param: Node<'_>, source: &str) -> Option<String> {
    let annotation = param.child_by_field_name("type").or_else(|| {
        let mut cursor = param.walk();
        param
            .named_children(&mut cursor)
            .find(|child| child.kind() == "type_annotation")
    })?;
    let text = node_text(annotation, source);
    let text = text.trim_start_matches(':').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

struct DecoratorCall<'a> {
    name: String,
    /// `None` for a bare decorator (`@Get`), `Some` for call style.
    arguments: Option<Vec<Node<'a>>>,
}

impl DecoratorCall<'_> {
    /// Path carried by the decorator's first argument: a string literal, or
    /// the `path` property of an object literal. Anything else is `""`.
    fn path(&self, source: &str) -> String {
        let Some(first) = self.arguments.as_ref().and_then(|args| args.first()) else {
            return String::new();
        };
        let path = match first.kind() {
            "string" => extract_string_literal(*first, source),
            "object" => object_property_string(*first, "path", source),
            _ => None,
        };
        path.unwrap_or_default()
    }
}

fn decorator_call<'a>(node: Node<'a>, source: &str) -> Option<DecoratorCall<'a>> {
    let mut cursor = node.walk();
    let expression = node.named_children(&mut cursor).next()?;
    match expression.kind() {
        "call_expression" => {
            let function = expression.child_by_field_name("function")?;
            let name = last_segment(&node_text(function, source));
            Some(DecoratorCall {
                name,
                arguments: Some(call_arguments(expression)),
            })
        }
        "identifier" | "member_expression" => Some(DecoratorCall {
            name: last_segment(&node_text(expression, source)),
            arguments: None,
        }),
        _ => None,
    }
}

fn last_segment(raw: &str) -> String {
    raw.rsplit('.').next().unwrap_or(raw).trim().to_string()
}

fn call_arguments(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let Some(args) = node.child_by_field_name("arguments") else {
        return out;
    };
    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        if child.kind() != "comment" {
            out.push(child);
        }
    }
    out
}

fn object_property_string(node: Node<'_>, key: &str, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "pair" {
            continue;
        }
        let Some(key_node) = child.child_by_field_name("key") else {
            continue;
        };
        let key_text = node_text(key_node, source);
        let key_text = key_text.trim_matches('"').trim_matches('\'');
        if key_text != key {
            continue;
        }
        let Some(value_node) = child.child_by_field_name("value") else {
            continue;
        };
        if value_node.kind() != "string" {
            continue;
        }
        if let Some(value) = extract_string_literal(value_node, source) {
            return Some(value);
        }
    }
    None
}

fn extract_string_literal(node: Node<'_>, source: &str) -> Option<String> {
    let raw = node_text(node, source);
    unquote_string_literal(&raw)
}

fn unquote_string_literal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }
    let first = trimmed.chars().next()?;
    if first == '"' || first == '\'' {
        let last = trimmed.chars().last()?;
        if last == first {
            return Some(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    None
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}
