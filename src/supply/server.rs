//! Minimal HTTP listener for the supply endpoints
//!
//! Routes:
//! - `GET /api/supply/kite`
//! - `GET /api/supply/hai`
//!
//! One request per connection, answered then closed. The request head must
//! arrive within `REQUEST_TIMEOUT` and no line may exceed `MAX_LINE_BYTES`.

use eyre::{eyre, Result};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{handle_supply, HttpResponse, SupplyConfig, SupplyToken};
use crate::chain::ChainReader;

const ROUTE_PREFIX: &str = "/api/supply/";

/// Max header lines read before giving up on a request
const MAX_HEADER_LINES: usize = 100;

/// Longest request or header line accepted
const MAX_LINE_BYTES: u64 = 8 * 1024;

/// Time a client gets to send its request head
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept (fd exhaustion and the like)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct SupplyContext {
    pub chain: Arc<dyn ChainReader>,
    /// Tokens with a usable config; others answer 503
    pub configs: HashMap<SupplyToken, SupplyConfig>,
    pub cache_control: bool,
}

/// Answer one request
pub async fn respond(ctx: &SupplyContext, method: &str, target: &str) -> HttpResponse {
    let path = target.split('?').next().unwrap_or(target);

    let Some(name) = path.strip_prefix(ROUTE_PREFIX) else {
        return HttpResponse::text(404, "Not Found");
    };
    let Ok(token) = name.trim_end_matches('/').parse::<SupplyToken>() else {
        return HttpResponse::text(404, "Not Found");
    };
    if method != "GET" {
        return HttpResponse::text(405, "Method Not Allowed");
    }

    match ctx.configs.get(&token) {
        Some(config) => handle_supply(ctx.chain.as_ref(), config, ctx.cache_control).await,
        None => HttpResponse::text(503, format!("{} supply is not configured", token)),
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

fn encode(response: &HttpResponse) -> String {
    let mut out = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
    for (name, value) in &response.headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    out.push_str("Connection: close\r\n\r\n");
    out.push_str(&response.body);
    out
}

async fn read_capped_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = (&mut *reader).take(MAX_LINE_BYTES).read_line(&mut line).await?;
    if read as u64 == MAX_LINE_BYTES && !line.ends_with('\n') {
        return Err(eyre!("request line exceeds {} bytes", MAX_LINE_BYTES));
    }
    Ok(line)
}

/// Request line; headers are drained since the routes take no body
async fn read_head<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_capped_line(reader).await?;
    for _ in 0..MAX_HEADER_LINES {
        let line = read_capped_line(reader).await?;
        if line.trim().is_empty() {
            break;
        }
    }
    Ok(request_line)
}

async fn handle_connection<S>(ctx: Arc<SupplyContext>, stream: S, timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);

    let request_line = match tokio::time::timeout(timeout, read_head(&mut reader)).await {
        Ok(head) => head,
        Err(_) => return Err(eyre!("no request within {:?}", timeout)),
    };

    let response = match request_line {
        Ok(line) => {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(method), Some(target)) => {
                    debug!("{} {}", method, target);
                    respond(&ctx, method, target).await
                }
                _ => HttpResponse::text(400, "Bad Request"),
            }
        }
        Err(e) => {
            debug!("rejecting request: {}", e);
            HttpResponse::text(400, "Bad Request")
        }
    };

    let stream = reader.get_mut();
    stream.write_all(encode(&response).as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// `None` after a failed accept; the caller keeps listening
async fn accept_next<T>(accepted: io::Result<T>) -> Option<T> {
    match accepted {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!("accept failed: {}", e);
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}

/// Accept connections forever on an already-bound listener
pub async fn serve_listener(listener: TcpListener, ctx: Arc<SupplyContext>) -> Result<()> {
    loop {
        let Some((stream, peer)) = accept_next(listener.accept().await).await else {
            continue;
        };
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(ctx, stream, REQUEST_TIMEOUT).await {
                warn!("supply request from {} failed: {}", peer, e);
            }
        });
    }
}

pub async fn serve(addr: &str, ctx: Arc<SupplyContext>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Supply endpoints listening on http://{}{}{{kite,hai}}", listener.local_addr()?, ROUTE_PREFIX);
    serve_listener(listener, ctx).await
}
