//! Request routing: dispatch `/api/*` to [`crate::handlers`],
//! stream `/api/events` as Server-Sent-Events, and fall back
//! to static file serving with directory-traversal protection for
//! everything else.
//!
//! tiny_http hands out owned [`tiny_http::Request`] values from one
//! `Server::recv_timeout` loop; each request is dispatched on its own
//! thread so a slow body read or git subprocess never stalls the accept
//! loop, while the loop itself doubles as the 1 Hz broadcast tick
//! (`heartbeat`/`countdown`) and the no-client timeout check — the same
//! "fold background work into the existing tick" shape
//! [`sparkle_git::scheduler::CommitScheduler`] already uses for its own
//! debounce deadline.

use crate::json::ErrorBody;
use crate::state::DaemonState;
use crate::{handlers, portfile, static_files, timeout};
use serde_json::Value;
use sparkle_core::SparkleError;
use std::io::Read;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

/// Bind the HTTP listener and run the daemon's accept loop until shutdown
///.
///
/// # Errors
/// Returns [`crate::lifecycle::StartError::Bind`] if no port can be bound.
pub fn serve(state: Arc<DaemonState>, requested_port: Option<u16>) -> Result<(), crate::lifecycle::StartError> {
    let addr = format!("127.0.0.1:{}", requested_port.unwrap_or(0));
    let server = Server::http(&addr).map_err(|err| {
        crate::lifecycle::StartError::Bind(std::io::Error::new(std::io::ErrorKind::AddrInUse, err.to_string()))
    })?;

    let port = server
        .server_addr()
        .to_ip()
        .map(|a| a.port())
        .unwrap_or(requested_port.unwrap_or(0));
    state.set_port(port);
    if let Err(err) = portfile::write(&state.data_dir, port) {
        tracing::warn!(error = %err, "failed to write last_port.data");
    }
    tracing::info!(port, "sparkle daemon listening");

    loop {
        match server.recv_timeout(Duration::from_secs(1)) {
            Ok(Some(request)) => {
                let state = state.clone();
                std::thread::spawn(move || dispatch(state, request));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "error accepting connection");
                break;
            }
        }

        tick(&state);
        if state.is_shutting_down() && state.sse.subscriber_count() == 0 {
            break;
        }
    }

    Ok(())
}

/// How often (in 1 Hz ticks) the tick loop scans for event files this
/// process never authored and never invalidated via a fetch — e.g. another
/// local process sharing the same worktree. Coarser than the heartbeat/countdown cadence since a
/// directory scan is comparatively expensive.
const RECONCILE_EVERY_TICKS: u64 = 5;

/// Broadcast `heartbeat`/`countdown`, expire the no-client timer, and
/// periodically reconcile externally-written event files.
fn tick(state: &DaemonState) {
    state.sse.broadcast("heartbeat", &serde_json::json!({"timestamp": sparkle_core::clock::next_timestamp()}));

    if state.next_tick() % RECONCILE_EVERY_TICKS == 0 {
        if let Err(err) = state.api.manager().reconcile_untracked() {
            tracing::warn!(error = %err, "failed to reconcile externally-written event files");
        }
    }

    let countdown = if state.api.manager().is_rebuilding() {
        "Updating...".to_string()
    } else if state.git.is_scheduled() {
        "Syncing...".to_string()
    } else {
        match state.timeout.remaining() {
            Some(remaining) => timeout::format_countdown(remaining),
            None => "Syncing...".to_string(),
        }
    };
    state.sse.broadcast("countdown", &serde_json::json!({"countdown": countdown}));

    if state.timeout.expired() && !state.is_shutting_down() {
        tracing::info!("no clients connected, shutting down");
        begin_shutdown(state);
    }
}

fn begin_shutdown(state: &DaemonState) {
    state.begin_shutdown();
    state.sse.close_all();
}

fn dispatch(state: Arc<DaemonState>, mut request: tiny_http::Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = split_query(&url);

    if state.is_shutting_down() {
        respond_error(request, &SparkleError::ShuttingDown);
        return;
    }

    if method == Method::Get && path == "/api/events" {
        serve_sse(state, request);
        return;
    }

    if path.starts_with("/api/") {
        let mut body = Vec::new();
        if method == Method::Post {
            if let Err(err) = request.as_reader().read_to_end(&mut body) {
                tracing::warn!(error = %err, "failed to read request body");
            }
        }
        let result = dispatch_api(&state, &method, path, query, &body);
        note_activity(&state);
        respond_result(request, result);
        return;
    }

    serve_static(&state, request, path);
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// A request other than `/api/shutdown` resets the idle clock when no
/// subscribers are connected.
fn note_activity(state: &DaemonState) {
    if state.sse.subscriber_count() == 0 {
        state.timeout.restart();
    }
}

#[allow(clippy::too_many_lines)]
fn dispatch_api(
    state: &Arc<DaemonState>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> Result<Value, SparkleError> {
    match (method, path) {
        (Method::Get, "/api/ping") => handlers::ping(state, body),
        (Method::Get, "/api/status") => handlers::status(state, body),
        (Method::Get, "/api/serverInfo") => handlers::server_info(state, body),
        (Method::Get, "/api/version") => handlers::version(state, body),
        (Method::Get, "/api/allItems") => handlers::all_items(state, query_param(query, "search")),
        (Method::Get, "/api/pendingWork") => handlers::pending_work(state, body),
        (Method::Get, "/api/roots") => handlers::roots(state, body),
        (Method::Get, "/api/dag") => handlers::dag(state, query_param(query, "referenceId").unwrap_or_default()),
        (Method::Get, "/api/allowedStatuses") => handlers::allowed_statuses(state, body),
        (Method::Get, "/api/getTakers") => handlers::get_takers(state, body),
        (Method::Get, "/api/aggregateStatus") => handlers::aggregate_status(state, body),
        (Method::Get, "/api/getLastChange") => handlers::get_last_change(state, body),
        (Method::Post, "/api/createItem") => handlers::create_item(state, body),
        (Method::Post, "/api/getItemDetails") => handlers::get_item_details(state, body),
        (Method::Post, "/api/alterTagline" | "/api/updateTagline") => handlers::alter_tagline(state, body),
        (Method::Post, "/api/addEntry") => handlers::add_entry(state, body),
        (Method::Post, "/api/updateStatus") => handlers::update_status(state, body),
        (Method::Post, "/api/addDependency") => handlers::add_dependency(state, body),
        (Method::Post, "/api/removeDependency") => handlers::remove_dependency(state, body),
        (Method::Post, "/api/addMonitor") => handlers::add_monitor(state, body),
        (Method::Post, "/api/removeMonitor") => handlers::remove_monitor(state, body),
        (Method::Post, "/api/ignoreItem") => handlers::ignore_item(state, body),
        (Method::Post, "/api/unignoreItem") => handlers::unignore_item(state, body),
        (Method::Post, "/api/takeItem") => handlers::take_item(state, body),
        (Method::Post, "/api/surrenderItem") => handlers::surrender_item(state, body),
        (Method::Post, "/api/updateStatuses") => handlers::update_statuses(state, body),
        (Method::Post, "/api/config/get") | (Method::Get, "/api/config/get") => handlers::config_get(state, body),
        (Method::Post, "/api/config/setProject") => {
            let result = handlers::config_set_project(state, body);
            if result.is_ok() {
                schedule_port_change_shutdown(state);
            }
            result
        }
        (Method::Post, "/api/config/notifyChange") => handlers::config_notify_change(state, body),
        (Method::Post, "/api/getPotentialDependencies") => handlers::get_potential_dependencies(state, body),
        (Method::Post, "/api/getPotentialDependents") => handlers::get_potential_dependents(state, body),
        (Method::Post, "/api/getItemAuditTrail") => handlers::get_item_audit_trail(state, body),
        (Method::Post, "/api/fetch") => handlers::fetch(state, body),
        (Method::Post, "/api/shutdown") => {
            begin_shutdown(state);
            Ok(serde_json::json!({}))
        }
        (Method::Post, "/api/internal/aggregateUpdated") => handlers::internal_aggregate_updated(state, body),
        (Method::Post, "/log" | "/api/clientLog") => handlers::client_log(state, body),
        _ => Err(SparkleError::not_found(path)),
    }
}

/// Port reconfiguration: broadcast `portChanging`, wait for
/// clients to receive it, then shut down. The launcher/user restarts.
fn schedule_port_change_shutdown(state: &Arc<DaemonState>) {
    let old_port = state.port();
    state.sse.broadcast(
        "portChanging",
        &serde_json::json!({"oldPort": old_port, "newPort": Value::Null}),
    );
    let state = state.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(500));
        state.begin_shutdown();
        state.sse.close_all();
    });
}

fn respond_result(request: tiny_http::Request, result: Result<Value, SparkleError>) {
    match result {
        Ok(value) => {
            let body = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("static header is always valid");
            let response = Response::from_string(body).with_status_code(200).with_header(header);
            let _ = request.respond(add_cors(response));
        }
        Err(err) => respond_error(request, &err),
    }
}

fn respond_error(request: tiny_http::Request, err: &SparkleError) {
    let rebuilding = matches!(err, SparkleError::ConcurrencyConflict).then_some(true);
    let body = ErrorBody {
        reason: err.reason(),
        message: err.to_string(),
        rebuilding,
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());
    let header =
        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("static header is always valid");
    let response = Response::from_string(json).with_status_code(err.http_status()).with_header(header);
    let _ = request.respond(add_cors(response));
}

fn add_cors<R: Read>(response: Response<R>) -> Response<R> {
    response.with_header(
        Header::from_bytes(&b"Access-Control-Allow-Origin"[..], &b"*"[..]).expect("static header is always valid"),
    )
}

/// `GET /api/events`: subscribe to the SSE hub and stream frames until the
/// client disconnects or the daemon shuts down. Cancels the
/// no-client timer for the duration of the connection.
fn serve_sse(state: Arc<DaemonState>, request: tiny_http::Request) {
    let (id, rx) = state.sse.subscribe();
    state.timeout.cancel();
    state.sse.send_to(id, crate::sse::format_frame("connected", &serde_json::json!({"status": "ok"})));
    let gitstatus = serde_json::json!({"active": true, "reason": "unknown", "timestamp": sparkle_core::clock::next_timestamp()});
    state.sse.send_to(id, crate::sse::format_frame("gitStatus", &gitstatus));

    let header =
        Header::from_bytes(&b"Content-Type"[..], &b"text/event-stream"[..]).expect("static header is always valid");
    let cache_header =
        Header::from_bytes(&b"Cache-Control"[..], &b"no-cache"[..]).expect("static header is always valid");
    let reader = SseReader { rx, leftover: Vec::new() };
    let response = Response::empty(200)
        .with_data(reader, None)
        .with_header(header)
        .with_header(cache_header);
    let response = add_cors(response);
    let _ = request.respond(response);

    state.sse.unsubscribe(id);
    if state.sse.subscriber_count() == 0 {
        state.timeout.restart();
    }
}

/// Minimal "configure me" surface:
/// serves `ping`/`version`/`serverInfo`/`config/get`/`config/setProject`
/// and a static placeholder page, everything else answers 503. Once a
/// project config is written the caller should restart the process so
/// `lifecycle::launch` can bootstrap the worktree and the full API.
///
/// # Errors
/// Returns [`crate::lifecycle::StartError::Bind`] if no port can be bound.
pub fn serve_unconfigured(
    repo_root: std::path::PathBuf,
    static_dir: Option<std::path::PathBuf>,
    requested_port: Option<u16>,
) -> Result<(), crate::lifecycle::StartError> {
    let addr = format!("127.0.0.1:{}", requested_port.unwrap_or(0));
    let server = Server::http(&addr).map_err(|err| {
        crate::lifecycle::StartError::Bind(std::io::Error::new(std::io::ErrorKind::AddrInUse, err.to_string()))
    })?;
    let port = server
        .server_addr()
        .to_ip()
        .map(|a| a.port())
        .unwrap_or(requested_port.unwrap_or(0));
    tracing::info!(port, "sparkle daemon listening (unconfigured)");

    loop {
        let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(1)) else {
            continue;
        };
        let method = request.method().clone();
        let url = request.url().to_string();
        let (path, _query) = split_query(&url);

        let reconfigured = match (&method, path) {
            (Method::Get, "/api/ping") => {
                respond_result(request, Ok(serde_json::json!({"status": "ok"})));
                false
            }
            (Method::Get, "/api/version") => {
                respond_result(request, Ok(serde_json::json!({"version": env!("CARGO_PKG_VERSION")})));
                false
            }
            (Method::Get, "/api/serverInfo") => {
                respond_result(request, Ok(serde_json::json!({"version": env!("CARGO_PKG_VERSION"), "port": port})));
                false
            }
            (Method::Get | Method::Post, "/api/config/get") => {
                respond_result(request, Err(SparkleError::ConfigMissing));
                false
            }
            (Method::Post, "/api/config/setProject") => {
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                match handle_set_project(&repo_root, &body) {
                    Ok(value) => {
                        respond_result(request, Ok(value));
                        true
                    }
                    Err(err) => {
                        respond_result(request, Err(err));
                        false
                    }
                }
            }
            (Method::Get, p) if !p.starts_with("/api/") => {
                serve_configure_me_page(request);
                false
            }
            _ => {
                respond_result(request, Err(SparkleError::ConfigMissing));
                false
            }
        };

        if reconfigured {
            tracing::info!("project configured; restart the daemon to serve the full API");
            return Ok(());
        }
    }
}

fn handle_set_project(repo_root: &std::path::Path, body: &[u8]) -> Result<Value, SparkleError> {
    let req: crate::json::ConfigSetProjectRequest = serde_json::from_slice(body)
        .map_err(|err| SparkleError::validation(format!("malformed request body: {err}")))?;
    let project = sparkle_core::config::ProjectConfig {
        git_branch: req.git_branch,
        directory: req.directory,
        worktree_path: req.worktree_path.unwrap_or_else(|| ".sparkle-worktree".to_string()),
    };
    sparkle_core::config::save_project_config(repo_root, &project)
        .map_err(|source| SparkleError::Fatal { message: source.to_string() })?;
    Ok(serde_json::to_value(project).expect("ProjectConfig always serialises"))
}

fn serve_configure_me_page(request: tiny_http::Request) {
    const PAGE: &str = "<!doctype html><html><head><title>Sparkle</title></head>\
<body><h1>Sparkle is not configured for this repository</h1>\
<p>POST a <code>sparkle_config</code> to <code>/api/config/setProject</code>, then restart the daemon.</p>\
</body></html>";
    let header =
        Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]).expect("static header is always valid");
    let _ = request.respond(Response::from_string(PAGE).with_header(header));
}

/// Adapts the SSE hub's per-subscriber [`Receiver`] to [`Read`] so
/// tiny_http can stream it as a chunked response body.
struct SseReader {
    rx: Receiver<crate::sse::Frame>,
    leftover: Vec<u8>,
}

impl Read for SseReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv() {
                Ok(frame) => self.leftover = frame.into_bytes(),
                Err(_) => return Ok(0),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

fn serve_static(state: &DaemonState, request: tiny_http::Request, path: &str) {
    let Some(root) = state.static_dir.as_deref() else {
        let body = "sparkle daemon: no static directory configured";
        let _ = request.respond(Response::from_string(body).with_status_code(404));
        return;
    };
    match static_files::resolve(root, path) {
        Some(file_path) => match std::fs::read(&file_path) {
            Ok(contents) => {
                let content_type = static_files::content_type(&file_path);
                let header = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                    .expect("content type header is always valid");
                let _ = request.respond(Response::from_data(contents).with_header(header));
            }
            Err(_) => {
                let _ = request.respond(Response::from_string("not found").with_status_code(404));
            }
        },
        None => {
            let _ = request.respond(Response::from_string("not found").with_status_code(404));
        }
    }
}
