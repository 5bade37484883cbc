//! Long-lived JSON-lines service.
//!
//! Keeps one [`Engine`] alive so cached workspace state and escalation
//! counters persist across requests of a host session.

use crate::core::error::WorkgateError;
use crate::core::rpc::{RpcRequest, RpcResponse};
use crate::plugins::decide::{Action, Engine};
use serde::Deserialize;
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct ActionParams {
    #[serde(flatten)]
    action: Action,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    #[serde(default)]
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextParams {
    text: String,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

fn params<T: for<'de> Deserialize<'de>>(req: &RpcRequest) -> Result<T, RpcResponse> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| RpcResponse::err(req.id.clone(), "invalid_params", e.to_string()))
}

fn to_result<T: serde::Serialize>(id: &str, value: &T) -> RpcResponse {
    match serde_json::to_value(value) {
        Ok(v) => RpcResponse::ok(id, v),
        Err(e) => RpcResponse::err(id, "internal", e.to_string()),
    }
}

/// Handle one request. Never fails; problems become error responses.
pub fn handle_request(engine: &Engine, req: &RpcRequest, default_cwd: &Path) -> RpcResponse {
    let id = req.id.as_str();
    let with_session = |mut action: Action| {
        if action.session_id.is_none() {
            action.session_id = req.session.clone();
        }
        action
    };
    match req.op.as_str() {
        "ping" => RpcResponse::ok(id, json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") })),
        "evaluate" => match params::<ActionParams>(req) {
            Ok(p) => {
                let cwd = p.cwd.unwrap_or_else(|| default_cwd.to_path_buf());
                let decision = engine.evaluate(&with_session(p.action), &cwd);
                to_result(id, &decision)
            }
            Err(resp) => resp,
        },
        "observe" => match params::<ActionParams>(req) {
            Ok(p) => {
                let cwd = p.cwd.unwrap_or_else(|| default_cwd.to_path_buf());
                engine.observe(&p.action, &cwd);
                RpcResponse::ok(id, json!({ "observed": true }))
            }
            Err(resp) => resp,
        },
        "end_session" => match params::<SessionParams>(req) {
            Ok(p) => {
                let session = p
                    .session
                    .or_else(|| req.session.clone())
                    .unwrap_or_else(|| crate::plugins::decide::DEFAULT_SESSION.to_string());
                RpcResponse::ok(id, json!({ "ended": engine.end_session(&session) }))
            }
            Err(resp) => resp,
        },
        "classify" => match params::<TextParams>(req) {
            Ok(p) => to_result(id, &engine.classifier().classify(&p.text)),
            Err(resp) => resp,
        },
        "intent" => match params::<TextParams>(req) {
            Ok(p) => {
                let cwd = p.cwd.unwrap_or_else(|| default_cwd.to_path_buf());
                let result = engine
                    .workspace(&cwd)
                    .and_then(|ws| engine.analyzer().analyze(&p.text, &ws));
                match result {
                    Ok(intent) => to_result(id, &intent),
                    Err(e) => RpcResponse::err(id, e.kind(), e.to_string()),
                }
            }
            Err(resp) => resp,
        },
        other => RpcResponse::err(id, "unknown_op", format!("unknown op '{}'", other)),
    }
}

/// Serve requests until `input` reaches EOF.
pub fn serve<R: BufRead, W: Write>(
    engine: &Engine,
    input: R,
    mut output: W,
    default_cwd: &Path,
) -> Result<usize, WorkgateError> {
    let mut handled = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(req) => {
                tracing::debug!(op = %req.op, id = %req.id, "request");
                handle_request(engine, &req, default_cwd)
            }
            Err(e) => RpcResponse::err("unknown", "invalid_request", e.to_string()),
        };
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        handled += 1;
    }
    tracing::debug!(handled, "input closed");
    Ok(handled)
}
