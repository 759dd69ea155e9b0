//! TCP transport with newline-delimited JSON framing. Each connection runs
//! in its own task; requests on one connection are answered in order.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::methods::MethodHandler;
use super::protocol::{Request, Response};

/// Longest accepted request line, newline included.
pub const MAX_LINE_BYTES: u64 = 1024 * 1024;

pub struct Transport {
    listener: TcpListener,
    handler: Arc<MethodHandler>,
}

impl Transport {
    pub async fn bind(bind_addr: SocketAddr, handler: MethodHandler) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the shutdown signal fires.
    pub async fn listen(&self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "RPC server listening");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Client connected");
                            let handler = self.handler.clone();
                            let shutdown = shutdown.resubscribe();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, handler, shutdown).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection error");
                                }
                                debug!(peer = %peer_addr, "Client disconnected");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// One newline-terminated frame read from a connection.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    /// `MAX_LINE_BYTES` were read without reaching a newline.
    TooLong,
    NotUtf8,
    Eof,
}

async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Frame> {
    buf.clear();
    let bytes_read = reader.take(MAX_LINE_BYTES).read_until(b'\n', buf).await?;

    if bytes_read == 0 {
        return Ok(Frame::Eof);
    }
    if bytes_read as u64 == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
        return Ok(Frame::TooLong);
    }
    match std::str::from_utf8(buf) {
        Ok(line) => Ok(Frame::Line(line.to_string())),
        Err(_) => Ok(Frame::NotUtf8),
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<MethodHandler>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, &mut buf) => frame?,
            _ = shutdown.recv() => break,
        };

        let line = match frame {
            Frame::Line(line) => line,
            Frame::Eof => break,
            Frame::TooLong => {
                warn!(peer = %peer_addr, "Request line too long, closing connection");
                write_response(&mut writer, &Response::invalid_request(Value::Null)).await?;
                break;
            }
            Frame::NotUtf8 => {
                warn!(peer = %peer_addr, "Request line is not valid UTF-8");
                write_response(&mut writer, &Response::parse_error()).await?;
                continue;
            }
        };

        if let Some(response) = dispatch_line(&handler, &line, peer_addr).await {
            write_response(&mut writer, &response).await?;
        }
    }

    Ok(())
}

/// Answer one request line. Blank lines and notifications yield nothing.
async fn dispatch_line(
    handler: &MethodHandler,
    line: &str,
    peer_addr: SocketAddr,
) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "Unparseable request");
            return Some(Response::parse_error());
        }
    };

    if let Err(reason) = request.validate() {
        warn!(peer = %peer_addr, method = %request.method, reason, "Rejected request");
        return Some(Response::invalid_request(request.id.unwrap_or(Value::Null)));
    }

    debug!(peer = %peer_addr, method = %request.method, notification = request.is_notification(), "Request");
    if request.is_notification() {
        handler.handle(request).await;
        return None;
    }
    Some(handler.handle(request).await)
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> anyhow::Result<()> {
    let mut response_json = serde_json::to_string(response)?;
    response_json.push('\n');
    writer.write_all(response_json.as_bytes()).await?;
    Ok(())
}
