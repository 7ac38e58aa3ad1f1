use crate::model::RouteDescriptor;
use crate::session::SearchSession;
use crate::store::RoutesChanged;
use crate::util;
use crate::watch::{self, ChangeEvent, ChangeNotifier, WatchConfig};
use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Instant;

const METHODS: &[&str] = &[
    "list_methods",
    "search",
    "search_flat",
    "view_state",
    "toggle_owner",
    "toggle_display_mode",
    "refresh",
    "routes",
    "controllers",
    "locate_route",
    "locate_file",
    "buffer_open",
    "buffer_update",
    "buffer_close",
    "file_event",
];

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    message: String,
}

/// Unsolicited line pushed to the client; carries no id.
#[derive(Serialize)]
struct RpcNotification {
    method: &'static str,
    params: Value,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct QueryParams {
    query: String,
}

#[derive(Deserialize)]
struct OwnerParams {
    #[serde(alias = "name", alias = "ownerName")]
    owner: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteRefParams {
    #[serde(alias = "method")]
    http_method: String,
    #[serde(alias = "path")]
    full_path: String,
}

#[derive(Deserialize)]
struct PathParams {
    path: PathBuf,
}

#[derive(Deserialize)]
struct BufferParams {
    path: PathBuf,
    text: String,
    #[serde(default)]
    version: i64,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum FileEventKind {
    Created,
    Deleted,
    Saved,
}

#[derive(Deserialize)]
struct FileEventParams {
    kind: FileEventKind,
    path: PathBuf,
}

enum Message {
    Line(String),
    Changes(Vec<ChangeEvent>),
    InputClosed,
}

/// Runs the JSONL server over stdin/stdout until stdin closes.
///
/// Requests and watcher batches arrive on one channel and are handled in
/// order on this thread.
pub fn serve(
    session: SearchSession,
    notifier: ChangeNotifier,
    watch_config: WatchConfig,
) -> Result<()> {
    let roots = session.store().index().roots().to_vec();
    let (tx, rx) = mpsc::channel();

    let watch_tx = tx.clone();
    let _watcher = watch::start(roots, notifier, watch_config, move |batch| {
        watch_tx.send(Message::Changes(batch)).is_ok()
    })?;
    spawn_stdin_reader(tx);

    let mut app = App::new(session);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_loop(&mut app, &rx, &mut out)
}

/// Handles one request against `session` and returns the response line.
pub fn call(session: SearchSession, method: String, params_raw: &str, id_raw: &str) -> Result<String> {
    let params: Value = serde_json::from_str(params_raw).with_context(|| "parse params JSON")?;
    let id = parse_value(id_raw);
    let mut app = App::new(session);
    let response = app.handle_request(RpcRequest { id, method, params });
    Ok(serde_json::to_string(&response)?)
}

fn spawn_stdin_reader(tx: Sender<Message>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(error = %err, "stdin error");
                    break;
                }
            };
            if tx.send(Message::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Message::InputClosed);
    });
}

fn run_loop<W: Write>(app: &mut App, rx: &Receiver<Message>, out: &mut W) -> Result<()> {
    for message in rx {
        match message {
            Message::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<RpcRequest>(&line) {
                    Ok(request) => app.handle_request(request),
                    Err(err) => error_response(Value::Null, &format!("invalid request: {err}")),
                };
                writeln!(out, "{}", serde_json::to_string(&response)?)?;
            }
            Message::Changes(batch) => {
                ChangeNotifier::apply_batch(&mut app.session, batch);
            }
            Message::InputClosed => break,
        }
        for notification in app.drain_notifications() {
            writeln!(out, "{}", serde_json::to_string(&notification)?)?;
        }
        out.flush()?;
    }
    Ok(())
}

struct App {
    session: SearchSession,
    changes: Receiver<RoutesChanged>,
}

impl App {
    fn new(mut session: SearchSession) -> Self {
        let changes = session.store_mut().subscribe();
        Self { session, changes }
    }

    fn handle_request(&mut self, req: RpcRequest) -> RpcResponse {
        let id = req.id.clone();
        match handle_method(&mut self.session, &req.method, req.params) {
            Ok(value) => RpcResponse {
                id,
                result: Some(value),
                error: None,
            },
            Err(err) => error_response(id, &err.to_string()),
        }
    }

    /// After any store change since the last drain, re-runs the current
    /// query and pushes one `routesChanged` line with the fresh
    /// `searchResult` and `viewState`.
    fn drain_notifications(&mut self) -> Vec<RpcNotification> {
        let drained = self.changes.try_iter().count();
        if drained == 0 {
            return Vec::new();
        }
        let query = self.session.view_state().search_query;
        let search_result = self.session.search_with_grouping(&query);
        let view_state = self.session.view_state();
        tracing::debug!(changes = drained, query = %query, "pushing refreshed search result");
        vec![RpcNotification {
            method: "routesChanged",
            params: json!({
                "searchResult": search_result,
                "viewState": view_state,
            }),
        }]
    }
}

pub fn handle_method(session: &mut SearchSession, method: &str, params: Value) -> Result<Value> {
    let start = Instant::now();
    let value = match method {
        "list_methods" => json!(METHODS),
        "search" => {
            let params: QueryParams = parse_params(params)?;
            json!(session.search_with_grouping(&params.query))
        }
        "search_flat" => {
            let params: QueryParams = parse_params(params)?;
            json!(session.search_flat(&params.query))
        }
        "view_state" => json!(session.view_state()),
        "toggle_owner" => {
            let params: OwnerParams = parse_params(params)?;
            json!(session.toggle_owner_expansion(&params.owner))
        }
        "toggle_display_mode" => json!(session.toggle_display_mode()),
        "refresh" => {
            let changed = session.refresh();
            json!({
                "changed": changed,
                "totalEndpoints": session.store().routes().len(),
            })
        }
        "routes" => serde_json::to_value(session.store().routes().as_slice())?,
        "controllers" => serde_json::to_value(session.store().controllers().as_slice())?,
        "locate_route" => {
            let params: RouteRefParams = parse_params(params)?;
            let route = find_route(session, &params)?;
            json!(session.locate_route(&route)?)
        }
        "locate_file" => {
            let params: PathParams = parse_params(params)?;
            let path = resolve_path(session, &params.path);
            json!(session.locate_file(&path)?)
        }
        "buffer_open" | "buffer_update" => {
            let params: BufferParams = parse_params(params)?;
            let path = resolve_path(session, &params.path);
            let overlay = session.store_mut().index_mut().source_mut();
            if method == "buffer_open" {
                overlay.open(path.clone(), params.text, params.version);
            } else {
                overlay.update(path.clone(), params.text, params.version);
            }
            let refreshed = ChangeNotifier::apply(session, ChangeEvent::Saved(path));
            json!({ "refreshed": refreshed })
        }
        "buffer_close" => {
            let params: PathParams = parse_params(params)?;
            let path = resolve_path(session, &params.path);
            session.store_mut().index_mut().source_mut().close(&path);
            let refreshed = ChangeNotifier::apply(session, ChangeEvent::Saved(path));
            json!({ "refreshed": refreshed })
        }
        "file_event" => {
            let params: FileEventParams = parse_params(params)?;
            let path = resolve_path(session, &params.path);
            let event = match params.kind {
                FileEventKind::Created => ChangeEvent::Created(path),
                FileEventKind::Deleted => ChangeEvent::Deleted(path),
                FileEventKind::Saved => ChangeEvent::Saved(path),
            };
            let refreshed = ChangeNotifier::apply(session, event);
            json!({ "refreshed": refreshed })
        }
        _ => return Err(anyhow!("unknown method: {method}")),
    };
    tracing::debug!(
        method,
        duration_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    Ok(value)
}

/// Missing params count as an empty object so all-default structs parse.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).context("invalid params")
}

fn find_route(session: &SearchSession, params: &RouteRefParams) -> Result<RouteDescriptor> {
    let method = params.http_method.to_uppercase();
    session
        .store()
        .routes()
        .iter()
        .find(|route| route.http_method == method && route.full_path == params.full_path)
        .cloned()
        .ok_or_else(|| anyhow!("unknown route: {method} {}", params.full_path))
}

/// Relative paths resolve against the first root; existing files are
/// canonicalized to match the cache keys.
fn resolve_path(session: &SearchSession, raw: &Path) -> PathBuf {
    let path = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        match session.store().index().roots().first() {
            Some(root) => root.join(raw),
            None => raw.to_path_buf(),
        }
    };
    util::canonical_or_self(path)
}

fn error_response(id: Value, message: &str) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            message: message.to_string(),
        }),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const CATS: &str = r#"import { Controller, Get, Post, Param } from '@nestjs/common';

@Controller('cats')
export class CatsController {
  @Get(':id')
  findOne(@Param('id') id: string) {}

  @Post()
  create() {}
}
"#;

    fn app_with_cats() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cats.controller.ts"), CATS).unwrap();
        let session = SearchSession::open(vec![dir.path().to_path_buf()], &Config::default()).unwrap();
        (dir, App::new(session))
    }

    fn lines(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn search_returns_grouped_result() {
        let (_dir, mut app) = app_with_cats();
        let value = handle_method(&mut app.session, "search", json!({ "query": "id" })).unwrap();
        assert_eq!(value["totalMatches"], 1);
        assert_eq!(value["totalEndpoints"], 2);
        assert_eq!(value["grouped"][0]["ownerName"], "CatsController");
        assert_eq!(value["flat"][0]["route"]["fullPath"], "/cats/:id");
        assert_eq!(value["displayMode"], "flat");
    }

    #[test]
    fn missing_params_use_defaults() {
        let (_dir, mut app) = app_with_cats();
        let value = handle_method(&mut app.session, "search_flat", Value::Null).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn locate_route_by_identity() {
        let (_dir, mut app) = app_with_cats();
        let value = handle_method(
            &mut app.session,
            "locate_route",
            json!({ "httpMethod": "get", "fullPath": "/cats/:id" }),
        )
        .unwrap();
        assert_eq!(value["line"], 6);
        assert_eq!(value["column"], 2);

        let err = handle_method(
            &mut app.session,
            "locate_route",
            json!({ "method": "DELETE", "path": "/cats" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown route"));
    }

    #[test]
    fn buffer_edits_change_routes_before_save() {
        let (dir, mut app) = app_with_cats();
        let path = dir.path().join("cats.controller.ts");
        let edited = CATS.replace("@Post()", "@Post('bulk')");
        let value = handle_method(
            &mut app.session,
            "buffer_open",
            json!({ "path": path, "text": edited, "version": 1 }),
        )
        .unwrap();
        assert_eq!(value["refreshed"], true);
        let routes = handle_method(&mut app.session, "routes", Value::Null).unwrap();
        assert_eq!(routes[1]["fullPath"], "/cats/bulk");

        handle_method(&mut app.session, "buffer_close", json!({ "path": path })).unwrap();
        let routes = handle_method(&mut app.session, "routes", Value::Null).unwrap();
        assert_eq!(routes[1]["fullPath"], "/cats");
    }

    #[test]
    fn unknown_method_is_an_error() {
        let (_dir, mut app) = app_with_cats();
        assert!(handle_method(&mut app.session, "nope", Value::Null).is_err());
    }

    #[test]
    fn loop_writes_responses_and_change_notifications() {
        let (dir, mut app) = app_with_cats();
        let (tx, rx) = mpsc::channel();
        tx.send(Message::Line(r#"{"id":1,"method":"view_state"}"#.to_string()))
            .unwrap();
        tx.send(Message::Line("not json".to_string())).unwrap();
        std::fs::write(
            dir.path().join("dogs.controller.ts"),
            "@Controller('dogs')\nexport class DogsController {\n  @Get()\n  list() {}\n}\n",
        )
        .unwrap();
        let created = util::canonical_or_self(dir.path().join("dogs.controller.ts"));
        tx.send(Message::Changes(vec![ChangeEvent::Created(created)]))
            .unwrap();
        tx.send(Message::InputClosed).unwrap();

        let mut out = Vec::new();
        run_loop(&mut app, &rx, &mut out).unwrap();
        let lines = lines(out);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"]["displayMode"], "flat");
        assert!(lines[1]["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid request"));
        assert_eq!(lines[2]["method"], "routesChanged");
        assert_eq!(lines[2]["params"]["searchResult"]["totalEndpoints"], 3);
        assert_eq!(lines[2]["params"]["viewState"]["displayMode"], "flat");
    }

    #[test]
    fn change_push_reruns_the_current_query() {
        let (dir, mut app) = app_with_cats();
        let (tx, rx) = mpsc::channel();
        tx.send(Message::Line(
            r#"{"id":1,"method":"search","params":{"query":"dogs"}}"#.to_string(),
        ))
        .unwrap();
        std::fs::write(
            dir.path().join("dogs.controller.ts"),
            "@Controller('dogs')\nexport class DogsController {\n  @Get()\n  list() {}\n}\n",
        )
        .unwrap();
        let created = util::canonical_or_self(dir.path().join("dogs.controller.ts"));
        tx.send(Message::Changes(vec![ChangeEvent::Created(created)]))
            .unwrap();
        tx.send(Message::InputClosed).unwrap();

        let mut out = Vec::new();
        run_loop(&mut app, &rx, &mut out).unwrap();
        let lines = lines(out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"]["totalMatches"], 0);
        let params = &lines[1]["params"];
        assert_eq!(params["viewState"]["searchQuery"], "dogs");
        assert_eq!(params["searchResult"]["totalMatches"], 1);
        assert_eq!(
            params["searchResult"]["grouped"][0]["ownerName"],
            "DogsController"
        );
    }
}
