//! Stratum-style TCP front-end, grounded in
//! `examples/original_source/server/proxy/stratum.go`
//! (`handleClient`/`handleLoginRPC`/`handleTCPSubmitRPC`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, BLACKLISTED, INVALID_LOGIN, INVALID_PARAMS, MALFORMED_POW, METHOD_NOT_FOUND,
    NOT_SUBSCRIBED, WORK_NOT_READY,
};
use crate::policy::Policy;
use crate::session::Session;
use crate::state::ProxyState;
use crate::validate::{sanitize_worker, validate_login};

use super::{parse_submit_params, request_id};

pub async fn serve(state: Arc<ProxyState>) -> std::io::Result<()> {
    if !state.config.stratum.enabled {
        tracing::info!("stratum front-end disabled");
        return Ok(());
    }
    let addr = state.config.stratum.listen_addr.clone();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "stratum front-end listening");

    let conn_permits = Arc::new(Semaphore::new(state.config.stratum.max_conn));
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        let conn_permits = Arc::clone(&conn_permits);
        tokio::spawn(async move {
            let Ok(permit) = conn_permits.try_acquire_owned() else {
                tracing::warn!(%peer, "stratum connection cap reached");
                return;
            };
            if let Err(err) = handle_connection(&state, stream, peer).await {
                tracing::debug!(%peer, error = %err, "stratum connection closed");
            }
            drop(permit);
        });
    }
}

async fn handle_connection(state: &Arc<ProxyState>, stream: TcpStream, peer: SocketAddr) -> std::io::Result<()> {
    let ip = peer.ip().to_string();
    if state.policy.is_banned(&ip) || !state.policy.apply_limit_policy(&ip) {
        return Ok(());
    }
    stream.set_nodelay(true).ok();
    let (read_half, write_half) = stream.into_split();
    let session = Arc::new(Session::new(state.sessions.next_id(), ip, Box::new(write_half)));
    state.sessions.insert(Arc::clone(&session));

    let result = read_loop(state, &session, read_half).await;
    state.sessions.remove(session.id);
    result
}

async fn read_loop(
    state: &Arc<ProxyState>,
    session: &Arc<Session>,
    read_half: tokio::net::tcp::OwnedReadHalf,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    // +1 so a line that is exactly at the limit still reads in full and
    // gets banned by the length check below, rather than being silently
    // truncated to exactly `max_req_size` by the read bound itself.
    let max_line_len = state.config.stratum.max_req_size as u64 + 1;
    loop {
        line.clear();
        let deadline = state.config.stratum.timeout;
        let bytes_read = match read_line_with_idle_timeout(&mut reader, &mut line, session, deadline, max_line_len).await
        {
            Some(result) => result?,
            None => {
                tracing::debug!(session = session.id, ip = %session.ip, "stratum read timeout");
                return Ok(());
            }
        };
        if bytes_read == 0 {
            return Ok(());
        }
        if line.len() > state.config.stratum.max_req_size {
            tracing::warn!(ip = %session.ip, "request flood, banning");
            state.policy.ban_client(&session.ip);
            return Ok(());
        }
        session.touch();

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(_) => {
                state.policy.apply_malformed_policy(&session.ip);
                session.write_line(&JsonRpcResponse::error(Value::Null, INVALID_PARAMS)).await?;
                continue;
            }
        };

        let id = request_id(&request);
        let (response, close) = handle_request(state, session, id, request).await;
        session.write_line(&response).await?;
        if close {
            return Ok(());
        }
    }
}

/// Reads the next line bounded to `max_line_len` bytes (mirroring the
/// original's `bufio.NewReaderSize(conn, MaxReqSize)`, which caps the read
/// itself rather than checking an already-buffered line's length), while
/// racing it against the connection's idle deadline. The deadline is
/// re-read from `session.idle_for()` each time the sleep branch fires, so
/// a broadcast push's `session.touch()` genuinely postpones the timeout
/// instead of only the next inbound line doing so.
async fn read_line_with_idle_timeout(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    line: &mut String,
    session: &Session,
    deadline: Duration,
    max_line_len: u64,
) -> Option<std::io::Result<usize>> {
    loop {
        let idle = session.idle_for();
        if idle >= deadline {
            return None;
        }
        tokio::select! {
            result = (&mut *reader).take(max_line_len).read_line(line) => return Some(result),
            _ = tokio::time::sleep(deadline - idle) => continue,
        }
    }
}

/// `handleTCPSubmitRPC`'s method table, stratum flavor: logins arrive over
/// the wire rather than in the path, and a crossed ban threshold closes
/// the connection rather than just answering with an error.
async fn handle_request(
    state: &Arc<ProxyState>,
    session: &Arc<Session>,
    id: Value,
    request: JsonRpcRequest,
) -> (JsonRpcResponse, bool) {
    match request.method.as_str() {
        "mining.subscribe" | "eth_submitLogin" => (handle_login(state, session, id, request), false),
        "eth_getWork" => {
            let response = match state.get_work() {
                Ok(work) => JsonRpcResponse::result(id, json!(work)),
                Err(_) => JsonRpcResponse::error(id, WORK_NOT_READY),
            };
            (response, false)
        }
        "eth_submitWork" => handle_submit(state, session, id, request.params).await,
        "eth_submitHashrate" => (JsonRpcResponse::result(id, Value::Bool(true)), false),
        _ => {
            state.policy.apply_malformed_policy(&session.ip);
            (JsonRpcResponse::error(id, METHOD_NOT_FOUND), false)
        }
    }
}

/// `handleLoginRPC`: the login may carry a `.`/`/`-separated worker suffix
/// (e.g. `0xabc...worker1`), which overrides the request's `worker` field.
fn handle_login(state: &Arc<ProxyState>, session: &Arc<Session>, id: Value, request: JsonRpcRequest) -> JsonRpcResponse {
    let login_param =
        request.params.as_ref().and_then(|v| v.as_array()).and_then(|params| params.first()).and_then(|v| v.as_str());

    let Some(login_param) = login_param else {
        state.policy.apply_malformed_policy(&session.ip);
        return JsonRpcResponse::error(id, INVALID_PARAMS);
    };

    let (login_part, worker_override) = split_login_worker(login_param);
    let Some(login) = validate_login(login_part) else {
        state.policy.apply_malformed_policy(&session.ip);
        return JsonRpcResponse::error(id, INVALID_LOGIN);
    };

    if !state.policy.apply_login_policy(&login, &session.ip) {
        return JsonRpcResponse::error(id, BLACKLISTED);
    }

    let worker = sanitize_worker(worker_override.as_deref().or(request.worker.as_deref()));
    session.register(login, worker);
    JsonRpcResponse::result(id, Value::Bool(true))
}

fn split_login_worker(raw: &str) -> (&str, Option<String>) {
    for sep in ['.', '/'] {
        if let Some(idx) = raw.find(sep) {
            return (&raw[..idx], Some(raw[idx + 1..].to_string()));
        }
    }
    (raw, None)
}

async fn handle_submit(
    state: &Arc<ProxyState>,
    session: &Arc<Session>,
    id: Value,
    params: Option<Value>,
) -> (JsonRpcResponse, bool) {
    if !session.is_registered() {
        return (JsonRpcResponse::error(id, NOT_SUBSCRIBED), false);
    }

    let submission = match parse_submit_params(params) {
        Some(submission) => submission,
        None => {
            state.policy.apply_malformed_policy(&session.ip);
            return (JsonRpcResponse::error(id, MALFORMED_POW), false);
        }
    };

    let login = session.login().unwrap_or_default();
    let worker = session.worker();

    match state.submit_share(&login, &worker, submission).await {
        Ok(None) => (JsonRpcResponse::error(id, WORK_NOT_READY), false),
        Ok(Some(outcome)) => {
            let policy_ok = state.policy.apply_share_policy(&session.ip, !outcome.exists && outcome.valid);
            let (accepted, error) = crate::state::encode_submit_reply(outcome, policy_ok);
            // Only "invalid share, ban threshold crossed" closes the connection
            // (spec.md §4.6); duplicates never ban (§7), and a valid share that
            // crosses the threshold only adds an error, it does not disconnect.
            let close = !outcome.exists && !outcome.valid && !policy_ok;
            if close {
                state.policy.ban_client(&session.ip);
            }
            let response = match error {
                Some(error) => JsonRpcResponse::error(id, error),
                None => JsonRpcResponse::result(id, Value::Bool(accepted)),
            };
            (response, close)
        }
        Err(err) => {
            tracing::warn!(error = %err, "share classification failed");
            state.policy.apply_malformed_policy(&session.ip);
            (JsonRpcResponse::error(id, INVALID_PARAMS), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_login_on_dot_or_slash_separator() {
        assert_eq!(split_login_worker("0xabc.rig1"), ("0xabc", Some("rig1".to_string())));
        assert_eq!(split_login_worker("0xabc/rig1"), ("0xabc", Some("rig1".to_string())));
        assert_eq!(split_login_worker("0xabc"), ("0xabc", None));
    }
}
