//! HTTP miner front-end, grounded in `handleLoginRPC`-adjacent routing in
//! `examples/original_source/server/proxy/proxy.go` (`/{login}/{worker}`)
//! and `handlers.go`'s `handleGetWorkRPC`/`handleTCPSubmitRPC`/
//! `handleGetBlockByNumberRPC`/`handleUnknownRPC`.
//!
//! Uses `axum` for routing: the teacher does not expose a raw HTTP server,
//! but its bespoke `/:login/:worker` path shape matches a mining-pool
//! front-end more closely than a hand-rolled hyper `service_fn` would.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};

use crate::policy::Policy;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, MALFORMED_POW, METHOD_NOT_FOUND, WORK_NOT_READY};
use crate::state::ProxyState;
use crate::validate::{sanitize_worker, validate_login};

use super::{decode_requests, encode_responses, parse_submit_params, request_id};

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/:login/:worker", post(handle_with_worker))
        .route("/:login", post(handle_login_only))
        .with_state(state)
}

pub async fn serve(state: Arc<ProxyState>) -> std::io::Result<()> {
    let addr = state.config.http_listen_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "http front-end listening");
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(std::io::Error::other)
}

async fn handle_with_worker(
    State(state): State<Arc<ProxyState>>,
    Path((login, worker)): Path<(String, String)>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    dispatch(state, &login, Some(&worker), peer, &headers, body).await
}

async fn handle_login_only(
    State(state): State<Arc<ProxyState>>,
    Path(login): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    dispatch(state, &login, None, peer, &headers, body).await
}

async fn dispatch(
    state: Arc<ProxyState>,
    login_raw: &str,
    worker_raw: Option<&str>,
    peer: SocketAddr,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let ip = resolve_ip(&state, headers, peer);
    if state.policy.is_banned(&ip) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(login) = validate_login(login_raw) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let worker = sanitize_worker(worker_raw);

    if headers_exceed_limit(headers, state.config.limit_headers_size) {
        return StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.into_response();
    }

    let body_bytes = match axum::body::to_bytes(body, state.config.limit_body_size).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::EXPECTATION_FAILED.into_response(),
    };

    let requests = decode_requests(&body_bytes);
    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        responses.push(handle_request(&state, &login, &worker, &ip, request).await);
    }
    encode_responses(&responses).into_response()
}

/// `handleTCPSubmitRPC`'s method table, replayed over HTTP.
async fn handle_request(
    state: &Arc<ProxyState>,
    login: &str,
    worker: &str,
    ip: &str,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    let id = request_id(&request);
    match request.method.as_str() {
        "eth_getWork" => match state.get_work() {
            Ok(work) => JsonRpcResponse::result(id, json!(work)),
            Err(_) => JsonRpcResponse::error(id, WORK_NOT_READY),
        },
        "eth_getBlockByNumber" => match state.pending_block() {
            Some((number, difficulty)) => JsonRpcResponse::result(id, json!({ "number": number, "difficulty": difficulty })),
            None => JsonRpcResponse::result(id, Value::Null),
        },
        "eth_submitWork" => submit_work(state, login, worker, ip, id, request.params).await,
        "eth_submitHashrate" => JsonRpcResponse::result(id, Value::Bool(true)),
        _ => {
            state.policy.apply_malformed_policy(ip);
            JsonRpcResponse::error(id, METHOD_NOT_FOUND)
        }
    }
}

async fn submit_work(
    state: &Arc<ProxyState>,
    login: &str,
    worker: &str,
    ip: &str,
    id: Value,
    params: Option<Value>,
) -> JsonRpcResponse {
    let submission = match parse_submit_params(params) {
        Some(submission) => submission,
        None => {
            state.policy.apply_malformed_policy(ip);
            return JsonRpcResponse::error(id, MALFORMED_POW);
        }
    };

    match state.submit_share(login, worker, submission).await {
        Ok(None) => JsonRpcResponse::error(id, WORK_NOT_READY),
        Ok(Some(outcome)) => {
            let policy_ok = state.policy.apply_share_policy(ip, !outcome.exists && outcome.valid);
            let (accepted, error) = crate::state::encode_submit_reply(outcome, policy_ok);
            match error {
                Some(error) => JsonRpcResponse::error(id, error),
                None => JsonRpcResponse::result(id, Value::Bool(accepted)),
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "share classification failed");
            state.policy.apply_malformed_policy(ip);
            JsonRpcResponse::error(id, INVALID_PARAMS)
        }
    }
}

fn headers_exceed_limit(headers: &HeaderMap, limit: usize) -> bool {
    let total: usize = headers.iter().map(|(name, value)| name.as_str().len() + value.len()).sum();
    total > limit
}

fn resolve_ip(state: &ProxyState, headers: &HeaderMap, peer: SocketAddr) -> String {
    if state.config.behind_reverse_proxy {
        if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
            if let Some(first) = forwarded.split(',').next() {
                return first.trim().to_string();
            }
        }
    }
    peer.ip().to_string()
}
