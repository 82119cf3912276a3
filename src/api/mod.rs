//! Read-only status and alerts HTTP API.
//!
//! A small hand-rolled HTTP/1.1 server on its own thread, serving
//! projections of detector state and the alert store:
//!
//! - `GET /health`: liveness probe
//! - `GET /counts`: current gender counts
//! - `GET /gesture`: current gesture state
//! - `GET /alerts?limit=N`: recent alerts, most recent first
//! - `GET /alerts/<id>`: one alert by id
//! - `GET /alerts/<id>/snapshot`: the alert's JPEG snapshot
//!
//! Live detector state arrives through a shared `Arc<Mutex<DetectorStatus>>`
//! written once per frame by the processing thread; alerts are read through
//! the server's own store connection. When bound to loopback, non-loopback
//! peers are rejected.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detector::DetectorStatus;
use crate::storage::{AlertStore, SqliteAlertStore};

const MAX_REQUEST_BYTES: usize = 8192;
const DEFAULT_ALERT_LIMIT: usize = 20;
const MAX_ALERT_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub db_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8797".to_string(),
            db_path: "safewatch.db".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    status: Arc<Mutex<DetectorStatus>>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, status: Arc<Mutex<DetectorStatus>>) -> Self {
        Self { cfg, status }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let status = self.status.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, status, shutdown_thread) {
                log::error!("status api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    status: Arc<Mutex<DetectorStatus>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    // The API thread reads alerts through its own connection; the processing
    // thread keeps its write connection to the same database.
    let store = SqliteAlertStore::open(&cfg.db_path)?;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &store, &status) {
                    log::warn!("status api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    store: &SqliteAlertStore,
    status: &Arc<Mutex<DetectorStatus>>,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/counts" => {
            let counts = current_status(status)?.counts;
            let payload = serde_json::to_vec(&counts)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/gesture" => {
            let gesture = current_status(status)?.gesture;
            let payload = serde_json::to_vec(&gesture)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/alerts" => {
            let limit = match parse_limit(&request) {
                Ok(limit) => limit,
                Err(_) => {
                    return write_json_response(&mut stream, 400, r#"{"error":"bad_limit"}"#);
                }
            };
            let alerts = store.query_recent(limit)?;
            let payload = serde_json::to_vec(&alerts)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        path => handle_alert_path(&mut stream, store, path),
    }
}

fn handle_alert_path(stream: &mut TcpStream, store: &SqliteAlertStore, path: &str) -> Result<()> {
    let Some(rest) = path.strip_prefix("/alerts/") else {
        return write_json_response(stream, 404, r#"{"error":"not_found"}"#);
    };
    let (id_part, want_snapshot) = match rest.strip_suffix("/snapshot") {
        Some(id_part) => (id_part, true),
        None => (rest, false),
    };
    let Ok(id) = id_part.parse::<i64>() else {
        return write_json_response(stream, 400, r#"{"error":"bad_alert_id"}"#);
    };
    let Some(stored) = store.query_by_id(id)? else {
        return write_json_response(stream, 404, r#"{"error":"not_found"}"#);
    };

    if !want_snapshot {
        let payload = serde_json::to_vec(&stored)?;
        return write_response(stream, 200, "application/json", &payload);
    }

    let Some(path) = stored.alert.snapshot_path.as_deref() else {
        return write_json_response(stream, 404, r#"{"error":"no_snapshot"}"#);
    };
    match std::fs::read(path) {
        Ok(bytes) => write_response(stream, 200, "image/jpeg", &bytes),
        Err(err) => {
            log::warn!("snapshot file missing for alert {}: {}", id, err);
            write_json_response(stream, 404, r#"{"error":"snapshot_missing"}"#)
        }
    }
}

fn current_status(status: &Arc<Mutex<DetectorStatus>>) -> Result<DetectorStatus> {
    let guard = status
        .lock()
        .map_err(|_| anyhow!("detector status lock poisoned"))?;
    Ok(guard.clone())
}

fn parse_limit(request: &HttpRequest) -> Result<usize> {
    let Some(query) = request.raw_path.split('?').nth(1) else {
        return Ok(DEFAULT_ALERT_LIMIT);
    };
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == "limit" {
                let limit: usize = v.parse().map_err(|_| anyhow!("invalid limit '{}'", v))?;
                return Ok(limit.min(MAX_ALERT_LIMIT));
            }
        }
    }
    Ok(DEFAULT_ALERT_LIMIT)
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        raw_path: raw_path.to_string(),
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    raw_path: String,
}
